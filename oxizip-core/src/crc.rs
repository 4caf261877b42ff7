//! CRC-32 (ISO 3309) as used by ZIP and GZIP.
//!
//! The polynomial arithmetic lives in `crc32fast`; this type only gives it the
//! incremental `new / update / value` shape the container code is written
//! against.

/// Incremental CRC-32 hasher.
#[derive(Debug, Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Crc32 {
    /// Create a new CRC-32 hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the initial state.
    pub fn reset(&mut self) {
        self.hasher.reset();
    }

    /// Feed more data.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Current checksum value, without consuming the hasher.
    pub fn value(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Finalize and return the checksum.
    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }

    /// Compute the CRC-32 of a buffer in one call.
    pub fn compute(data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(Crc32::compute(b""), 0);
        assert_eq!(Crc32::compute(b"123456789"), 0xCBF43926);
        assert_eq!(Crc32::compute(b"Hello, World!"), 0xEC4AC3D0);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut crc = Crc32::new();
        crc.update(b"Hello, ");
        assert_ne!(crc.value(), Crc32::compute(b"Hello, World!"));
        crc.update(b"World!");
        assert_eq!(crc.value(), Crc32::compute(b"Hello, World!"));
        assert_eq!(crc.finalize(), 0xEC4AC3D0);
    }

    #[test]
    fn test_reset() {
        let mut crc = Crc32::new();
        crc.update(b"garbage");
        crc.reset();
        assert_eq!(crc.value(), 0);
    }
}
