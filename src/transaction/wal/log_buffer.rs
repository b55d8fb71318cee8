// SimpleDBM Log Buffer
//
// Holds framed records between insert and flush. Records are kept in LSN
// order; a flush drains the whole buffer.

use crate::common::types::Lsn;

/// Configuration for log buffer behavior
#[derive(Debug, Clone)]
pub struct LogBufferConfig {
    /// Buffered bytes that trigger a synchronous flush from the inserting thread
    pub flush_threshold: usize,
}

impl Default for LogBufferConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 1024 * 1024, // 1 MB
        }
    }
}

/// A framed record waiting to be written
#[derive(Debug, Clone)]
pub struct BufferedRecord {
    pub lsn: Lsn,
    pub frame: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct LogBuffer {
    records: Vec<BufferedRecord>,
    bytes: usize,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, lsn: Lsn, frame: Vec<u8>) {
        debug_assert!(self.records.last().is_none_or(|last| last.lsn < lsn));
        self.bytes += frame.len();
        self.records.push(BufferedRecord { lsn, frame });
    }

    /// Frame of a record still in the buffer
    pub fn find(&self, lsn: Lsn) -> Option<&[u8]> {
        self.records
            .binary_search_by(|r| r.lsn.cmp(&lsn))
            .ok()
            .map(|i| self.records[i].frame.as_slice())
    }

    /// Remove and return everything buffered
    pub fn drain(&mut self) -> Vec<BufferedRecord> {
        self.bytes = 0;
        std::mem::take(&mut self.records)
    }

    /// Put back records returned by `drain` ahead of anything buffered since
    pub fn restore(&mut self, mut records: Vec<BufferedRecord>) {
        self.bytes += records.iter().map(|r| r.frame.len()).sum::<usize>();
        records.append(&mut self.records);
        self.records = records;
    }

    pub fn size(&self) -> usize {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn should_flush(&self, config: &LogBufferConfig) -> bool {
        self.bytes >= config.flush_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_and_drain() {
        let mut buffer = LogBuffer::new();
        buffer.push(Lsn::new(1, 16), vec![1; 10]);
        buffer.push(Lsn::new(1, 26), vec![2; 20]);
        assert_eq!(buffer.size(), 30);
        assert_eq!(buffer.find(Lsn::new(1, 26)), Some(&[2u8; 20][..]));
        assert_eq!(buffer.find(Lsn::new(1, 20)), None);

        let config = LogBufferConfig { flush_threshold: 25 };
        assert!(buffer.should_flush(&config));

        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert!(buffer.is_empty());
        assert_eq!(buffer.size(), 0);
    }
}
