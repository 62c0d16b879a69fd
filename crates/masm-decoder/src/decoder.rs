//! Module-level decoding: preamble, sections, and the final consistency
//! checks.

use masm_types::ast::{
    Data, Elem, ElemType, Export, ExportKind, Func, FuncType, Global, GlobalType, Import,
    ImportDesc, Limits, Module, TableType, ValueType,
};
use masm_types::{DecodeError, Result};

use crate::instr::{read_expr, read_value_type};
use crate::reader::Reader;

const MAGIC: &[u8; 4] = b"\0asm";
const VERSION: u32 = 1;

/// Upper bound on the declared locals of a single function.
pub const MAX_FUNCTION_LOCALS: u64 = 50_000;

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// Decode a binary WebAssembly module.
///
/// Sections must appear in the canonical order; custom sections may appear
/// anywhere between them and are skipped.
pub fn decode(bytes: &[u8]) -> Result<Module> {
    let mut decoder = Decoder::new(bytes);
    decoder.decode()
}

// ══════════════════════════════════════════════════════════════════════════════
// Decoder
// ══════════════════════════════════════════════════════════════════════════════

/// Known section ids in the order they must appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SectionId {
    Type = 1,
    Import = 2,
    Function = 3,
    Table = 4,
    Memory = 5,
    Global = 6,
    Export = 7,
    Start = 8,
    Element = 9,
    Code = 10,
    Data = 11,
}

const SECTION_ORDER: [SectionId; 11] = [
    SectionId::Type,
    SectionId::Import,
    SectionId::Function,
    SectionId::Table,
    SectionId::Memory,
    SectionId::Global,
    SectionId::Export,
    SectionId::Start,
    SectionId::Element,
    SectionId::Code,
    SectionId::Data,
];

const CUSTOM_SECTION: u8 = 0;

/// One code-section entry before it is zipped with its type index.
struct Code {
    locals: Vec<ValueType>,
    body: masm_types::ast::Expr,
}

struct Decoder<'a> {
    r: Reader<'a>,
    module: Module,
    /// Function-section type indices.
    func_types: Vec<u32>,
    /// Code-section entries.
    codes: Vec<Code>,
}

impl<'a> Decoder<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            r: Reader::new(bytes),
            module: Module::default(),
            func_types: Vec::new(),
            codes: Vec::new(),
        }
    }

    fn decode(&mut self) -> Result<Module> {
        self.read_preamble()?;
        self.skip_custom_sections()?;

        for id in SECTION_ORDER {
            if self.r.peek() == Some(id as u8) {
                self.r.read_byte()?;
                self.read_section(id)?;
                self.skip_custom_sections()?;
            }
        }

        if !self.r.at_end() {
            return Err(self.r.error("junk after last section"));
        }
        if self.func_types.len() != self.codes.len() {
            return Err(self
                .r
                .error("function and code sections have inconsistent lengths"));
        }

        let mut module = std::mem::take(&mut self.module);
        module.funcs = std::mem::take(&mut self.func_types)
            .into_iter()
            .zip(std::mem::take(&mut self.codes))
            .map(|(ty, code)| Func {
                ty,
                locals: code.locals,
                body: code.body,
            })
            .collect();

        tracing::debug!(
            types = module.types.len(),
            imports = module.imports.len(),
            funcs = module.funcs.len(),
            mems = module.mems.len(),
            "decoded module"
        );
        Ok(module)
    }

    fn read_preamble(&mut self) -> Result<()> {
        let magic = self.r.read_bytes(4)?;
        if magic != MAGIC {
            return Err(DecodeError::new(0, "malformed magic header"));
        }
        let raw = self.r.read_bytes(4)?;
        let version = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if version != VERSION {
            return Err(DecodeError::new(4, format!("unsupported version {version}")));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Section framing
    // ─────────────────────────────────────────────────────────────

    fn skip_custom_sections(&mut self) -> Result<()> {
        while self.r.peek() == Some(CUSTOM_SECTION) {
            self.r.read_byte()?;
            let size = self.r.read_u32()? as usize;
            let end = self.r.offset() + size;
            let name = self.r.read_name()?;
            if self.r.offset() > end {
                return Err(self.r.error("name of custom section too long"));
            }
            tracing::trace!(name = %name, size, "skipping custom section");
            self.r.skip_to(end)?;
        }
        Ok(())
    }

    /// Decode a size-prefixed section body and check that it ends exactly
    /// where its size says it does.
    fn read_section(&mut self, id: SectionId) -> Result<()> {
        let size = self.r.read_u32()? as usize;
        let end = self.r.offset() + size;
        match id {
            SectionId::Type => {
                self.module.types = self.r.read_vec(read_func_type)?;
            }
            SectionId::Import => {
                self.module.imports = self.r.read_vec(read_import)?;
            }
            SectionId::Function => {
                self.func_types = self.r.read_vec(Reader::read_u32)?;
            }
            SectionId::Table => {
                self.module.tables = self.r.read_vec(read_table_type)?;
            }
            SectionId::Memory => {
                self.module.mems = self.r.read_vec(read_limits)?;
            }
            SectionId::Global => {
                self.module.globals = self.r.read_vec(read_global)?;
            }
            SectionId::Export => {
                self.module.exports = self.r.read_vec(read_export)?;
            }
            SectionId::Start => {
                self.module.start = Some(self.r.read_u32()?);
            }
            SectionId::Element => {
                self.module.elems = self.r.read_vec(read_elem)?;
            }
            SectionId::Code => {
                self.codes = self.r.read_vec(read_code)?;
            }
            SectionId::Data => {
                self.module.data = self.r.read_vec(read_data)?;
            }
        }
        if self.r.offset() != end {
            return Err(self.r.error("size mismatch"));
        }
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Section entries
// ══════════════════════════════════════════════════════════════════════════════

const FUNC_TYPE_FORM: i8 = -0x20;
const FUNCREF: i8 = -0x10;

fn read_func_type(r: &mut Reader<'_>) -> Result<FuncType> {
    let at = r.offset();
    if r.read_s7()? != FUNC_TYPE_FORM {
        return Err(DecodeError::new(at, "malformed function type"));
    }
    let params = r.read_vec(read_value_type)?;
    let results = r.read_vec(read_value_type)?;
    Ok(FuncType { params, results })
}

fn read_limits(r: &mut Reader<'_>) -> Result<Limits> {
    let at = r.offset();
    match r.read_byte()? {
        0x00 => Ok(Limits {
            min: r.read_u32()?,
            max: None,
        }),
        0x01 => {
            let min = r.read_u32()?;
            let max = r.read_u32()?;
            Ok(Limits {
                min,
                max: Some(max),
            })
        }
        _ => Err(DecodeError::new(at, "malformed limits")),
    }
}

fn read_table_type(r: &mut Reader<'_>) -> Result<TableType> {
    let at = r.offset();
    if r.read_s7()? != FUNCREF {
        return Err(DecodeError::new(at, "malformed element type"));
    }
    Ok(TableType {
        elem: ElemType::FuncRef,
        limits: read_limits(r)?,
    })
}

fn read_global_type(r: &mut Reader<'_>) -> Result<GlobalType> {
    let value_type = read_value_type(r)?;
    let at = r.offset();
    let mutable = match r.read_byte()? {
        0x00 => false,
        0x01 => true,
        _ => return Err(DecodeError::new(at, "malformed global type")),
    };
    Ok(GlobalType {
        value_type,
        mutable,
    })
}

fn read_import(r: &mut Reader<'_>) -> Result<Import> {
    let module = r.read_name()?;
    let name = r.read_name()?;
    let at = r.offset();
    let desc = match r.read_byte()? {
        0x00 => ImportDesc::Func { ty: r.read_u32()? },
        0x01 => ImportDesc::Table {
            ty: read_table_type(r)?,
        },
        0x02 => ImportDesc::Mem {
            limits: read_limits(r)?,
        },
        0x03 => ImportDesc::Global {
            ty: read_global_type(r)?,
        },
        _ => return Err(DecodeError::new(at, "malformed import descriptor")),
    };
    Ok(Import { module, name, desc })
}

fn read_global(r: &mut Reader<'_>) -> Result<Global> {
    let ty = read_global_type(r)?;
    let init = read_expr(r)?;
    Ok(Global { ty, init })
}

fn read_export(r: &mut Reader<'_>) -> Result<Export> {
    let name = r.read_name()?;
    let at = r.offset();
    let kind = match r.read_byte()? {
        0x00 => ExportKind::Func,
        0x01 => ExportKind::Table,
        0x02 => ExportKind::Mem,
        0x03 => ExportKind::Global,
        _ => return Err(DecodeError::new(at, "malformed export descriptor")),
    };
    let index = r.read_u32()?;
    Ok(Export { name, kind, index })
}

fn read_elem(r: &mut Reader<'_>) -> Result<Elem> {
    let table = r.read_u32()?;
    let offset = read_expr(r)?;
    let init = r.read_vec(Reader::read_u32)?;
    Ok(Elem {
        table,
        offset,
        init,
    })
}

fn read_code(r: &mut Reader<'_>) -> Result<Code> {
    let size = r.read_u32()? as usize;
    let end = r.offset() + size;

    let mut locals = Vec::new();
    let mut total: u64 = 0;
    let groups = r.read_u32()?;
    for _ in 0..groups {
        let count = r.read_u32()?;
        total += u64::from(count);
        if total > MAX_FUNCTION_LOCALS {
            return Err(r.error("too many locals"));
        }
        let ty = read_value_type(r)?;
        locals.extend(std::iter::repeat(ty).take(count as usize));
    }
    let body = read_expr(r)?;

    if r.offset() != end {
        return Err(r.error("size mismatch"));
    }
    Ok(Code { locals, body })
}

fn read_data(r: &mut Reader<'_>) -> Result<Data> {
    let mem = r.read_u32()?;
    let offset = read_expr(r)?;
    let len = r.read_u32()? as usize;
    let init = r.read_bytes(len)?.to_vec();
    Ok(Data { mem, offset, init })
}
