//! The numeric opcode table.
//!
//! Every single-byte numeric opcode of the MVP (0x45–0xC4), the
//! sign-extension operators, and the `0xFC`-prefixed saturating truncations.
//! The decoder keeps all of them so real modules parse; the code generator
//! decides which ones it can lower.

use serde::{Deserialize, Serialize};

macro_rules! numeric_ops {
    (
        plain { $($byte:literal => $name:ident, $mnemonic:literal;)* }
        saturating { $($sub:literal => $sat:ident, $sat_mnemonic:literal;)* }
    ) => {
        /// A numeric, comparison, or conversion operator.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum NumericOp {
            $($name,)*
            $($sat,)*
        }

        impl NumericOp {
            /// Look up a single-byte numeric opcode.
            pub fn from_opcode(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Look up the sub-opcode following the `0xFC` prefix.
            pub fn from_saturating(sub: u32) -> Option<Self> {
                match sub {
                    $($sub => Some(Self::$sat),)*
                    _ => None,
                }
            }

            /// The text-format name, e.g. `i32.add`.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Self::$name => $mnemonic,)*
                    $(Self::$sat => $sat_mnemonic,)*
                }
            }
        }
    };
}

numeric_ops! {
    plain {
        0x45 => I32Eqz, "i32.eqz";
        0x46 => I32Eq, "i32.eq";
        0x47 => I32Ne, "i32.ne";
        0x48 => I32LtS, "i32.lt_s";
        0x49 => I32LtU, "i32.lt_u";
        0x4A => I32GtS, "i32.gt_s";
        0x4B => I32GtU, "i32.gt_u";
        0x4C => I32LeS, "i32.le_s";
        0x4D => I32LeU, "i32.le_u";
        0x4E => I32GeS, "i32.ge_s";
        0x4F => I32GeU, "i32.ge_u";
        0x50 => I64Eqz, "i64.eqz";
        0x51 => I64Eq, "i64.eq";
        0x52 => I64Ne, "i64.ne";
        0x53 => I64LtS, "i64.lt_s";
        0x54 => I64LtU, "i64.lt_u";
        0x55 => I64GtS, "i64.gt_s";
        0x56 => I64GtU, "i64.gt_u";
        0x57 => I64LeS, "i64.le_s";
        0x58 => I64LeU, "i64.le_u";
        0x59 => I64GeS, "i64.ge_s";
        0x5A => I64GeU, "i64.ge_u";
        0x5B => F32Eq, "f32.eq";
        0x5C => F32Ne, "f32.ne";
        0x5D => F32Lt, "f32.lt";
        0x5E => F32Gt, "f32.gt";
        0x5F => F32Le, "f32.le";
        0x60 => F32Ge, "f32.ge";
        0x61 => F64Eq, "f64.eq";
        0x62 => F64Ne, "f64.ne";
        0x63 => F64Lt, "f64.lt";
        0x64 => F64Gt, "f64.gt";
        0x65 => F64Le, "f64.le";
        0x66 => F64Ge, "f64.ge";
        0x67 => I32Clz, "i32.clz";
        0x68 => I32Ctz, "i32.ctz";
        0x69 => I32Popcnt, "i32.popcnt";
        0x6A => I32Add, "i32.add";
        0x6B => I32Sub, "i32.sub";
        0x6C => I32Mul, "i32.mul";
        0x6D => I32DivS, "i32.div_s";
        0x6E => I32DivU, "i32.div_u";
        0x6F => I32RemS, "i32.rem_s";
        0x70 => I32RemU, "i32.rem_u";
        0x71 => I32And, "i32.and";
        0x72 => I32Or, "i32.or";
        0x73 => I32Xor, "i32.xor";
        0x74 => I32Shl, "i32.shl";
        0x75 => I32ShrS, "i32.shr_s";
        0x76 => I32ShrU, "i32.shr_u";
        0x77 => I32Rotl, "i32.rotl";
        0x78 => I32Rotr, "i32.rotr";
        0x79 => I64Clz, "i64.clz";
        0x7A => I64Ctz, "i64.ctz";
        0x7B => I64Popcnt, "i64.popcnt";
        0x7C => I64Add, "i64.add";
        0x7D => I64Sub, "i64.sub";
        0x7E => I64Mul, "i64.mul";
        0x7F => I64DivS, "i64.div_s";
        0x80 => I64DivU, "i64.div_u";
        0x81 => I64RemS, "i64.rem_s";
        0x82 => I64RemU, "i64.rem_u";
        0x83 => I64And, "i64.and";
        0x84 => I64Or, "i64.or";
        0x85 => I64Xor, "i64.xor";
        0x86 => I64Shl, "i64.shl";
        0x87 => I64ShrS, "i64.shr_s";
        0x88 => I64ShrU, "i64.shr_u";
        0x89 => I64Rotl, "i64.rotl";
        0x8A => I64Rotr, "i64.rotr";
        0x8B => F32Abs, "f32.abs";
        0x8C => F32Neg, "f32.neg";
        0x8D => F32Ceil, "f32.ceil";
        0x8E => F32Floor, "f32.floor";
        0x8F => F32Trunc, "f32.trunc";
        0x90 => F32Nearest, "f32.nearest";
        0x91 => F32Sqrt, "f32.sqrt";
        0x92 => F32Add, "f32.add";
        0x93 => F32Sub, "f32.sub";
        0x94 => F32Mul, "f32.mul";
        0x95 => F32Div, "f32.div";
        0x96 => F32Min, "f32.min";
        0x97 => F32Max, "f32.max";
        0x98 => F32Copysign, "f32.copysign";
        0x99 => F64Abs, "f64.abs";
        0x9A => F64Neg, "f64.neg";
        0x9B => F64Ceil, "f64.ceil";
        0x9C => F64Floor, "f64.floor";
        0x9D => F64Trunc, "f64.trunc";
        0x9E => F64Nearest, "f64.nearest";
        0x9F => F64Sqrt, "f64.sqrt";
        0xA0 => F64Add, "f64.add";
        0xA1 => F64Sub, "f64.sub";
        0xA2 => F64Mul, "f64.mul";
        0xA3 => F64Div, "f64.div";
        0xA4 => F64Min, "f64.min";
        0xA5 => F64Max, "f64.max";
        0xA6 => F64Copysign, "f64.copysign";
        0xA7 => I32WrapI64, "i32.wrap_i64";
        0xA8 => I32TruncF32S, "i32.trunc_f32_s";
        0xA9 => I32TruncF32U, "i32.trunc_f32_u";
        0xAA => I32TruncF64S, "i32.trunc_f64_s";
        0xAB => I32TruncF64U, "i32.trunc_f64_u";
        0xAC => I64ExtendI32S, "i64.extend_i32_s";
        0xAD => I64ExtendI32U, "i64.extend_i32_u";
        0xAE => I64TruncF32S, "i64.trunc_f32_s";
        0xAF => I64TruncF32U, "i64.trunc_f32_u";
        0xB0 => I64TruncF64S, "i64.trunc_f64_s";
        0xB1 => I64TruncF64U, "i64.trunc_f64_u";
        0xB2 => F32ConvertI32S, "f32.convert_i32_s";
        0xB3 => F32ConvertI32U, "f32.convert_i32_u";
        0xB4 => F32ConvertI64S, "f32.convert_i64_s";
        0xB5 => F32ConvertI64U, "f32.convert_i64_u";
        0xB6 => F32DemoteF64, "f32.demote_f64";
        0xB7 => F64ConvertI32S, "f64.convert_i32_s";
        0xB8 => F64ConvertI32U, "f64.convert_i32_u";
        0xB9 => F64ConvertI64S, "f64.convert_i64_s";
        0xBA => F64ConvertI64U, "f64.convert_i64_u";
        0xBB => F64PromoteF32, "f64.promote_f32";
        0xBC => I32ReinterpretF32, "i32.reinterpret_f32";
        0xBD => I64ReinterpretF64, "i64.reinterpret_f64";
        0xBE => F32ReinterpretI32, "f32.reinterpret_i32";
        0xBF => F64ReinterpretI64, "f64.reinterpret_i64";
        0xC0 => I32Extend8S, "i32.extend8_s";
        0xC1 => I32Extend16S, "i32.extend16_s";
        0xC2 => I64Extend8S, "i64.extend8_s";
        0xC3 => I64Extend16S, "i64.extend16_s";
        0xC4 => I64Extend32S, "i64.extend32_s";
    }
    saturating {
        0 => I32TruncSatF32S, "i32.trunc_sat_f32_s";
        1 => I32TruncSatF32U, "i32.trunc_sat_f32_u";
        2 => I32TruncSatF64S, "i32.trunc_sat_f64_s";
        3 => I32TruncSatF64U, "i32.trunc_sat_f64_u";
        4 => I64TruncSatF32S, "i64.trunc_sat_f32_s";
        5 => I64TruncSatF32U, "i64.trunc_sat_f32_u";
        6 => I64TruncSatF64S, "i64.trunc_sat_f64_s";
        7 => I64TruncSatF64U, "i64.trunc_sat_f64_u";
    }
}

impl std::fmt::Display for NumericOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_boundaries() {
        assert_eq!(NumericOp::from_opcode(0x45), Some(NumericOp::I32Eqz));
        assert_eq!(NumericOp::from_opcode(0x6A), Some(NumericOp::I32Add));
        assert_eq!(NumericOp::from_opcode(0xC4), Some(NumericOp::I64Extend32S));
        assert_eq!(NumericOp::from_opcode(0x44), None);
        assert_eq!(NumericOp::from_opcode(0xC5), None);
    }

    #[test]
    fn test_saturating_sub_opcodes_are_distinct() {
        let ops: Vec<_> = (0..8).filter_map(NumericOp::from_saturating).collect();
        assert_eq!(ops.len(), 8);
        assert_eq!(ops[0].mnemonic(), "i32.trunc_sat_f32_s");
        assert_eq!(ops[7].mnemonic(), "i64.trunc_sat_f64_u");
        assert_eq!(NumericOp::from_saturating(8), None);
    }

    #[test]
    fn test_mnemonic_display() {
        assert_eq!(NumericOp::I32ShrU.to_string(), "i32.shr_u");
        assert_eq!(NumericOp::F64ConvertI64U.to_string(), "f64.convert_i64_u");
    }
}
