pub mod com;
pub mod crc;
pub mod options;
pub mod protocol;

pub type EngineResult<T> = anyhow::Result<T>;

pub use com::{Com, ComResult};
pub use options::{PortType, TransferSettings};
pub use protocol::file_io::{DiskFileSink, DiskFileSource, FileSink, FileSource};
pub use protocol::xmodem::{
    TransferMode, TransmissionError, XmodemConfiguration, XmodemSession, XmodemVariant,
};
pub use protocol::{Clock, ProgressDisplay, SystemClock, TransferInformation};
