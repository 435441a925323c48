//! # Linear Memory
//!
//! Zero-initialized, word-aligned scratch memory of one call frame.
//!
//! Memory only grows through [`Memory::resize`]; the interpreter charges
//! the expansion cost before calling it, so reads and writes here never
//! grow memory on their own.

use crate::errors::VmError;

/// Default memory limit (16 MiB).
pub const MAX_MEMORY_SIZE: usize = 16 * 1024 * 1024;

/// Word size in bytes (32 bytes = 256 bits).
pub const WORD_SIZE: usize = 32;

/// Byte-addressable frame memory.
#[derive(Clone, Debug)]
pub struct Memory {
    data: Vec<u8>,
    limit: usize,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    /// Creates an empty memory limited to [`MAX_MEMORY_SIZE`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(MAX_MEMORY_SIZE)
    }

    /// Creates an empty memory limited to `limit` bytes.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
        }
    }

    /// Returns the current memory size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if memory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the memory size in 32-byte words.
    #[must_use]
    pub fn word_size(&self) -> usize {
        self.data.len() / WORD_SIZE
    }

    /// Maximum size in bytes.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Grows memory so that `end` bytes are addressable, rounded up to a
    /// whole word. Never shrinks.
    ///
    /// # Errors
    ///
    /// `MemoryLimitExceeded` if the rounded size is above the limit.
    pub fn resize(&mut self, end: usize) -> Result<(), VmError> {
        if end <= self.data.len() {
            return Ok(());
        }
        let new_len = end.div_ceil(WORD_SIZE) * WORD_SIZE;
        if new_len > self.limit {
            return Err(VmError::MemoryLimitExceeded {
                requested: new_len as u64,
                max: self.limit as u64,
            });
        }
        self.data.resize(new_len, 0);
        Ok(())
    }

    /// Reads 32 bytes at `offset`, zero-padded past the end.
    #[must_use]
    pub fn read_word(&self, offset: usize) -> [u8; 32] {
        let mut word = [0u8; 32];
        let bytes = self.read_bytes(offset, WORD_SIZE);
        word.copy_from_slice(&bytes);
        word
    }

    /// Reads `size` bytes at `offset`, zero-padded past the end.
    #[must_use]
    pub fn read_bytes(&self, offset: usize, size: usize) -> Vec<u8> {
        let mut out = vec![0u8; size];
        if offset < self.data.len() {
            let available = (self.data.len() - offset).min(size);
            out[..available].copy_from_slice(&self.data[offset..offset + available]);
        }
        out
    }

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// `MemoryLimitExceeded` if the write would reach past the limit.
    pub fn write_byte(&mut self, offset: usize, value: u8) -> Result<(), VmError> {
        self.resize(offset.saturating_add(1))?;
        self.data[offset] = value;
        Ok(())
    }

    /// Writes a 32-byte word.
    ///
    /// # Errors
    ///
    /// `MemoryLimitExceeded` if the write would reach past the limit.
    pub fn write_word(&mut self, offset: usize, value: &[u8; 32]) -> Result<(), VmError> {
        self.write_bytes(offset, value)
    }

    /// Writes `data` at `offset`.
    ///
    /// # Errors
    ///
    /// `MemoryLimitExceeded` if the write would reach past the limit.
    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<(), VmError> {
        if data.is_empty() {
            return Ok(());
        }
        let end = offset.saturating_add(data.len());
        self.resize(end)?;
        self.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Writes exactly `size` bytes at `offset`, taken from `source` starting
    /// at `source_offset`. Bytes past the end of `source` are written as
    /// zero; nothing beyond `offset + size` is touched.
    ///
    /// # Errors
    ///
    /// `MemoryLimitExceeded` if the write would reach past the limit.
    pub fn write_padded(
        &mut self,
        offset: usize,
        size: usize,
        source: &[u8],
        source_offset: usize,
    ) -> Result<(), VmError> {
        if size == 0 {
            return Ok(());
        }
        let end = offset.saturating_add(size);
        self.resize(end)?;
        let target = &mut self.data[offset..end];
        target.fill(0);
        if source_offset < source.len() {
            let available = (source.len() - source_offset).min(size);
            target[..available]
                .copy_from_slice(&source[source_offset..source_offset + available]);
        }
        Ok(())
    }

    /// Returns the whole memory.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_rounds_to_words() {
        let mut mem = Memory::new();
        mem.resize(10).unwrap();
        assert_eq!(mem.len(), 32);
        assert_eq!(mem.word_size(), 1);

        mem.resize(33).unwrap();
        assert_eq!(mem.len(), 64);

        // never shrinks
        mem.resize(1).unwrap();
        assert_eq!(mem.len(), 64);
    }

    #[test]
    fn test_read_write_word() {
        let mut mem = Memory::new();
        let word = [0x11u8; 32];
        mem.write_word(0, &word).unwrap();
        assert_eq!(mem.read_word(0), word);
    }

    #[test]
    fn test_reads_past_end_are_zero() {
        let mut mem = Memory::new();
        mem.write_byte(31, 0xaa).unwrap();
        let word = mem.read_word(16);
        assert_eq!(word[15], 0xaa);
        assert_eq!(word[16..], [0u8; 16]);
        assert_eq!(mem.read_bytes(100, 4), vec![0; 4]);
    }

    #[test]
    fn test_write_padded_zero_fills_shortfall() {
        let mut mem = Memory::new();
        mem.write_bytes(0, &[0xff; 64]).unwrap();

        mem.write_padded(0, 8, &[1, 2, 3], 0).unwrap();
        assert_eq!(mem.read_bytes(0, 9), vec![1, 2, 3, 0, 0, 0, 0, 0, 0xff]);

        mem.write_padded(32, 4, &[1, 2, 3], 2).unwrap();
        assert_eq!(mem.read_bytes(32, 5), vec![3, 0, 0, 0, 0xff]);

        mem.write_padded(40, 2, &[1, 2, 3], 10).unwrap();
        assert_eq!(mem.read_bytes(40, 3), vec![0, 0, 0xff]);
    }

    #[test]
    fn test_write_padded_truncates_long_source() {
        let mut mem = Memory::new();
        mem.write_padded(0, 2, &[9, 8, 7, 6], 0).unwrap();
        assert_eq!(mem.read_bytes(0, 4), vec![9, 8, 0, 0]);
    }

    #[test]
    fn test_limit() {
        let mut mem = Memory::with_limit(64);
        assert!(mem.resize(64).is_ok());
        assert!(matches!(
            mem.resize(65),
            Err(VmError::MemoryLimitExceeded { .. })
        ));
    }
}
