use std::io;

#[cfg(test)]
pub mod test_com;
#[cfg(test)]
pub use test_com::*;

pub type ComResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Byte transport the protocol engine talks through (serial line, telnet
/// socket, pipe). All reads are non blocking.
pub trait Com {
    fn get_name(&self) -> &'static str;

    /// Returns `None` when no byte is buffered.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// May write fewer bytes than given; the caller retries the rest.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Throw away everything buffered on the input side.
    fn discard_buffer(&mut self) -> io::Result<()>;
}
