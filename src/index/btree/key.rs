// SimpleDBM B-Tree Keys
//
// Keys and locations are opaque byte strings. Their ordering, parsing and
// display come from factories registered by type code.

use std::cmp::Ordering;
use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

pub const STRING_KEY_TYPE: u16 = 10;
pub const INT_KEY_TYPE: u16 = 11;
pub const ROW_LOCATION_TYPE: u16 = 20;

/// Supplies ordering and text conversion for one kind of index key
pub trait KeyFactory: Send + Sync {
    fn type_code(&self) -> u16;
    fn name(&self) -> &'static str;
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
    /// Encode a key from its text form, `None` if the text is not a valid key
    fn parse(&self, text: &str) -> Option<Vec<u8>>;
    fn format(&self, bytes: &[u8]) -> String;
}

/// Supplies ordering and text conversion for one kind of location
pub trait LocationFactory: Send + Sync {
    fn type_code(&self) -> u16;
    fn name(&self) -> &'static str;
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
    fn parse(&self, text: &str) -> Option<Vec<u8>>;
    fn format(&self, bytes: &[u8]) -> String;
}

/// A key stored in the tree. `Infinity` sorts above every value and is the
/// high key of the rightmost node of each level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKey {
    Value(Vec<u8>),
    Infinity,
}

impl IndexKey {
    pub fn is_infinity(&self) -> bool {
        matches!(self, IndexKey::Infinity)
    }

    pub fn compare(&self, other: &IndexKey, factory: &dyn KeyFactory) -> Ordering {
        match (self, other) {
            (IndexKey::Infinity, IndexKey::Infinity) => Ordering::Equal,
            (IndexKey::Infinity, _) => Ordering::Greater,
            (_, IndexKey::Infinity) => Ordering::Less,
            (IndexKey::Value(a), IndexKey::Value(b)) => factory.compare(a, b),
        }
    }

    pub fn display(&self, factory: &dyn KeyFactory) -> String {
        match self {
            IndexKey::Infinity => "<INFINITY>".to_string(),
            IndexKey::Value(bytes) => factory.format(bytes),
        }
    }
}

/// Address of the data an index entry points at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location(pub Vec<u8>);

impl Location {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// UTF-8 string keys ordered bytewise
pub struct StringKeyFactory;

impl KeyFactory for StringKeyFactory {
    fn type_code(&self) -> u16 {
        STRING_KEY_TYPE
    }

    fn name(&self) -> &'static str {
        "string"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn parse(&self, text: &str) -> Option<Vec<u8>> {
        Some(text.as_bytes().to_vec())
    }

    fn format(&self, bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Signed 64-bit integer keys
pub struct IntKeyFactory;

impl IntKeyFactory {
    pub fn encode(value: i64) -> Vec<u8> {
        let mut buf = vec![0u8; 8];
        BigEndian::write_i64(&mut buf, value);
        buf
    }

    fn decode(bytes: &[u8]) -> i64 {
        if bytes.len() < 8 {
            return i64::MIN;
        }
        BigEndian::read_i64(bytes)
    }
}

impl KeyFactory for IntKeyFactory {
    fn type_code(&self) -> u16 {
        INT_KEY_TYPE
    }

    fn name(&self) -> &'static str {
        "int"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        Self::decode(a).cmp(&Self::decode(b))
    }

    fn parse(&self, text: &str) -> Option<Vec<u8>> {
        text.trim().parse::<i64>().ok().map(Self::encode)
    }

    fn format(&self, bytes: &[u8]) -> String {
        Self::decode(bytes).to_string()
    }
}

/// Row locations as unsigned 64-bit row ids
pub struct RowLocationFactory;

impl RowLocationFactory {
    pub fn encode(row_id: u64) -> Location {
        let mut buf = vec![0u8; 8];
        BigEndian::write_u64(&mut buf, row_id);
        Location(buf)
    }

    pub fn decode(location: &[u8]) -> u64 {
        if location.len() < 8 {
            return 0;
        }
        BigEndian::read_u64(location)
    }
}

impl LocationFactory for RowLocationFactory {
    fn type_code(&self) -> u16 {
        ROW_LOCATION_TYPE
    }

    fn name(&self) -> &'static str {
        "row"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        Self::decode(a).cmp(&Self::decode(b))
    }

    fn parse(&self, text: &str) -> Option<Vec<u8>> {
        text.trim().parse::<u64>().ok().map(|id| Self::encode(id).0)
    }

    fn format(&self, bytes: &[u8]) -> String {
        Self::decode(bytes).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infinity_sorts_last() {
        let factory = StringKeyFactory;
        let a = IndexKey::Value(b"a".to_vec());
        let z = IndexKey::Value(b"zzzz".to_vec());
        assert_eq!(a.compare(&z, &factory), Ordering::Less);
        assert_eq!(z.compare(&IndexKey::Infinity, &factory), Ordering::Less);
        assert_eq!(IndexKey::Infinity.compare(&IndexKey::Infinity, &factory), Ordering::Equal);
        assert_eq!(IndexKey::Infinity.display(&factory), "<INFINITY>");
    }

    #[test]
    fn test_int_keys_order_numerically() {
        let factory = IntKeyFactory;
        let neg = factory.parse("-5").unwrap();
        let pos = factory.parse(" 12 ").unwrap();
        assert_eq!(factory.compare(&neg, &pos), Ordering::Less);
        assert_eq!(factory.format(&pos), "12");
        assert!(factory.parse("twelve").is_none());
    }

    #[test]
    fn test_row_locations() {
        let factory = RowLocationFactory;
        let loc = RowLocationFactory::encode(300);
        assert_eq!(factory.format(loc.as_bytes()), "300");
        assert_eq!(factory.parse("300"), Some(loc.0.clone()));
        assert_eq!(loc.to_string(), "000000000000012c");
    }
}
