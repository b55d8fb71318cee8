use byteorder::{ByteOrder, LittleEndian};
use twox_hash::XxHash32;

/// Bytes preceding each record: payload length and checksum
pub const FRAME_HEADER_SIZE: usize = 8;

const CHECKSUM_SEED: u32 = 0x5344_4221;

pub fn log_file_name(base_name: &str, index: u32) -> String {
    format!("{}_{:06}.log", base_name, index)
}

pub fn anchor_file_name(base_name: &str) -> String {
    format!("{}.anchor", base_name)
}

/// Parse the index back out of a log file name
pub fn parse_log_file_name(base_name: &str, file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix(base_name)?
        .strip_prefix('_')?
        .strip_suffix(".log")?
        .parse()
        .ok()
}

pub fn checksum(bytes: &[u8]) -> u32 {
    XxHash32::oneshot(CHECKSUM_SEED, bytes)
}

/// Wrap an encoded record as `[len][checksum][bytes]`
pub fn encode_frame(bytes: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; FRAME_HEADER_SIZE + bytes.len()];
    LittleEndian::write_u32(&mut frame[0..4], bytes.len() as u32);
    LittleEndian::write_u32(&mut frame[4..8], checksum(bytes));
    frame[FRAME_HEADER_SIZE..].copy_from_slice(bytes);
    frame
}

/// Split a frame header into payload length and checksum. A zero length
/// never occurs in a written frame and marks unused space.
pub fn decode_frame_header(header: &[u8]) -> Option<(usize, u32)> {
    if header.len() < FRAME_HEADER_SIZE {
        return None;
    }
    let len = LittleEndian::read_u32(&header[0..4]) as usize;
    if len == 0 {
        return None;
    }
    Some((len, LittleEndian::read_u32(&header[4..8])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(log_file_name("simpledbm", 7), "simpledbm_000007.log");
        assert_eq!(parse_log_file_name("simpledbm", "simpledbm_000007.log"), Some(7));
        assert_eq!(parse_log_file_name("simpledbm", "other_000007.log"), None);
        assert_eq!(parse_log_file_name("simpledbm", "simpledbm.anchor"), None);
    }

    #[test]
    fn test_frame_checksum() {
        let frame = encode_frame(b"record");
        let (len, sum) = decode_frame_header(&frame).unwrap();
        assert_eq!(len, 6);
        assert_eq!(sum, checksum(&frame[FRAME_HEADER_SIZE..]));
        assert_ne!(sum, checksum(b"recorc"));
        assert!(decode_frame_header(&[0u8; 8]).is_none());
    }
}
