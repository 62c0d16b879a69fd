//! Byte cursor with LEB128 primitives.

use masm_types::{DecodeError, Result, MAX_NESTING_DEPTH};

/// A forward-only cursor over the input bytes.
///
/// All reads are bounds-checked; running off the end produces
/// `"unexpected end of input"` at the current offset.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// Structured instructions currently open.
    depth: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            depth: 0,
        }
    }

    /// Current byte offset.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Build an error located at the current offset.
    pub fn error(&self, message: impl Into<String>) -> DecodeError {
        DecodeError::new(self.pos, message)
    }

    /// Open a structured instruction whose opcode is at `at`.
    pub fn enter(&mut self, at: usize) -> Result<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(DecodeError::new(at, "nesting too deep"));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // ─────────────────────────────────────────────────────────────
    // Raw bytes
    // ─────────────────────────────────────────────────────────────

    pub fn read_byte(&mut self) -> Result<u8> {
        let byte = self
            .peek()
            .ok_or_else(|| self.error("unexpected end of input"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| self.error("unexpected end of input"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Move the cursor to an absolute offset inside the input.
    pub fn skip_to(&mut self, offset: usize) -> Result<()> {
        if offset > self.bytes.len() {
            return Err(self.error("unexpected end of input"));
        }
        self.pos = offset;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // LEB128
    // ─────────────────────────────────────────────────────────────

    /// Read an unsigned LEB128 integer of at most `bits` bits.
    ///
    /// At most `ceil(bits / 7)` groups are accepted.
    pub fn read_unsigned(&mut self, bits: u32) -> Result<u64> {
        let max_groups = bits.div_ceil(7);
        let mut result: u128 = 0;
        let mut shift = 0u32;
        let mut groups = 0u32;
        loop {
            if groups == max_groups {
                return Err(self.error("integer representation too long"));
            }
            let byte = self.read_byte()?;
            result |= u128::from(byte & 0x7F) << shift;
            shift += 7;
            groups += 1;
            if byte & 0x80 == 0 {
                break;
            }
        }
        if result >= 1u128 << bits {
            return Err(DecodeError::new(self.pos - 1, "integer too large"));
        }
        Ok(result as u64)
    }

    /// Read a signed LEB128 integer of at most `bits` bits.
    ///
    /// The value is sign-extended from the last group read, then checked
    /// against `[-2^(bits-1), 2^(bits-1))`.
    pub fn read_signed(&mut self, bits: u32) -> Result<i64> {
        let max_groups = bits.div_ceil(7);
        let mut result: i128 = 0;
        let mut shift = 0u32;
        let mut groups = 0u32;
        let mut last: u8;
        loop {
            if groups == max_groups {
                return Err(self.error("integer representation too long"));
            }
            last = self.read_byte()?;
            result |= i128::from(last & 0x7F) << shift;
            shift += 7;
            groups += 1;
            if last & 0x80 == 0 {
                break;
            }
        }
        if last & 0x40 != 0 {
            result |= -1i128 << shift;
        }
        let bound = 1i128 << (bits - 1);
        if result < -bound || result >= bound {
            return Err(DecodeError::new(self.pos - 1, "integer too large"));
        }
        Ok(result as i64)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_unsigned(32).map(|v| v as u32)
    }

    pub fn read_s7(&mut self) -> Result<i8> {
        self.read_signed(7).map(|v| v as i8)
    }

    pub fn read_s32(&mut self) -> Result<i32> {
        self.read_signed(32).map(|v| v as i32)
    }

    pub fn read_s33(&mut self) -> Result<i64> {
        self.read_signed(33)
    }

    pub fn read_s64(&mut self) -> Result<i64> {
        self.read_signed(64)
    }

    // ─────────────────────────────────────────────────────────────
    // Composite values
    // ─────────────────────────────────────────────────────────────

    /// Length-prefixed UTF-8 string.
    pub fn read_name(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let start = self.pos;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| DecodeError::new(start, "malformed UTF-8 encoding"))
    }

    /// Length-prefixed vector; each element is produced by `item`.
    pub fn read_vec<T>(
        &mut self,
        mut item: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let count = self.read_u32()? as usize;
        // Reservation is bounded by the remaining input, not the declared count.
        let mut items = Vec::with_capacity(count.min(self.bytes.len() - self.pos));
        for _ in 0..count {
            items.push(item(self)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bytes_past_end() {
        let mut r = Reader::new(&[1, 2]);
        let err = r.read_bytes(3).unwrap_err();
        assert_eq!(err.message, "unexpected end of input");
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn test_read_name_rejects_invalid_utf8() {
        let mut r = Reader::new(&[2, 0xC3, 0x28]);
        let err = r.read_name().unwrap_err();
        assert_eq!(err.message, "malformed UTF-8 encoding");
        assert_eq!(err.offset, 1);
    }

    #[test]
    fn test_read_vec_reads_count_items() {
        let mut r = Reader::new(&[3, 7, 8, 9]);
        let items = r.read_vec(|r| r.read_byte()).unwrap();
        assert_eq!(items, vec![7, 8, 9]);
        assert!(r.at_end());
    }

    #[test]
    fn test_s7_value_type_tags() {
        let mut r = Reader::new(&[0x7F, 0x40]);
        assert_eq!(r.read_s7().unwrap(), -1);
        assert_eq!(r.read_s7().unwrap(), -64);
    }
}
