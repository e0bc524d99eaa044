use std::{
    fs::File,
    io::Write,
    path::Path,
};

use crate::EngineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogDirection {
    None,
    Incoming,
    Outgoing,
}

/// Byte-for-byte transcript of the transport traffic of one session.
/// Outgoing runs are introduced by ">>>", incoming runs by "<<<".
pub struct TransferLog {
    writer: Box<dyn Write + Send>,
    direction: LogDirection,
}

impl TransferLog {
    pub fn create(path: &Path) -> EngineResult<Self> {
        Ok(Self::with_writer(Box::new(File::create(path)?)))
    }

    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer,
            direction: LogDirection::None,
        }
    }

    pub fn log_incoming(&mut self, b: u8) {
        if self.direction != LogDirection::Incoming {
            self.direction = LogDirection::Incoming;
            self.put(b"\r\n<<<\r\n");
        }
        self.put(&[b]);
    }

    pub fn log_outgoing(&mut self, bytes: &[u8]) {
        if self.direction != LogDirection::Outgoing {
            self.direction = LogDirection::Outgoing;
            self.put(b"\r\n>>>\r\n");
        }
        self.put(bytes);
    }

    fn put(&mut self, bytes: &[u8]) {
        if let Err(err) = self.writer.write_all(bytes) {
            log::error!("Failed to write transfer log: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_direction_markers() {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let mut log = TransferLog::with_writer(Box::new(SharedBuf(buf.clone())));
        log.log_outgoing(b"C");
        log.log_incoming(1);
        log.log_incoming(2);
        log.log_outgoing(b"\x06");
        assert_eq!(
            b"\r\n>>>\r\nC\r\n<<<\r\n\x01\x02\r\n>>>\r\n\x06".to_vec(),
            buf.lock().unwrap().clone()
        );
    }
}
