use byteorder::{ByteOrder, LittleEndian};

/// Header at the start of every log file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileHeader {
    pub magic: u32,
    pub version: u32,
    /// Log file index; the first component of every LSN in the file
    pub index: u32,
}

impl LogFileHeader {
    /// "SDBL" in ASCII
    pub const MAGIC: u32 = 0x5344_424C;
    pub const VERSION: u32 = 1;
    pub const HEADER_SIZE: u32 = 16;

    pub fn new(index: u32) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            index,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::HEADER_SIZE as usize] {
        let mut buf = [0u8; Self::HEADER_SIZE as usize];
        LittleEndian::write_u32(&mut buf[0..4], self.magic);
        LittleEndian::write_u32(&mut buf[4..8], self.version);
        LittleEndian::write_u32(&mut buf[8..12], self.index);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::HEADER_SIZE as usize {
            return None;
        }
        Some(Self {
            magic: LittleEndian::read_u32(&buf[0..4]),
            version: LittleEndian::read_u32(&buf[4..8]),
            index: LittleEndian::read_u32(&buf[8..12]),
        })
    }

    pub fn validate(&self, expected_index: u32) -> bool {
        self.magic == Self::MAGIC && self.version == Self::VERSION && self.index == expected_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_bytes() {
        let header = LogFileHeader::new(42);
        let parsed = LogFileHeader::from_bytes(&header.to_bytes()).unwrap();
        assert!(parsed.validate(42));
        assert!(!parsed.validate(41));
        assert!(LogFileHeader::from_bytes(&[0u8; 8]).is_none());
    }
}
