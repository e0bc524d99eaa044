use std::time::{Duration, Instant};

pub mod file_io;
pub mod transfer_log;
pub mod xmodem;

pub use file_io::*;
pub use transfer_log::*;
pub use xmodem::*;

/// Time source for the engine. The session arms a single deadline through
/// it; the surrounding scheduler watches the deadline and calls
/// `on_timeout` when it passes. Arming replaces any previous deadline.
pub trait Clock {
    fn now_ms(&self) -> u64;
    fn arm_deadline(&mut self, ms: u64);
}

pub struct SystemClock {
    epoch: Instant,
    deadline: Option<Instant>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            deadline: None,
        }
    }

    /// Polled by the scheduler; `true` once the armed deadline has
    /// passed, `false` while it is pending or nothing is armed.
    pub fn deadline_elapsed(&self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn arm_deadline(&mut self, ms: u64) {
        self.deadline = Some(Instant::now() + Duration::from_millis(ms));
    }
}

/// Progress callbacks the session drives while a transfer is running.
pub trait ProgressDisplay {
    fn set_protocol_name(&mut self, name: &str);
    fn set_file_name(&mut self, name: &str);
    fn on_packet(&mut self, packet_num: u32);
    fn on_bytes(&mut self, byte_count: u64);
    fn on_percent(&mut self, percent: u8);
    fn on_elapsed(&mut self, elapsed_secs: u64, bps: u64);
}

/// Plain record of the latest progress values, for callers that poll
/// instead of rendering callbacks directly.
#[derive(Debug, Clone, Default)]
pub struct TransferInformation {
    pub protocol_name: String,
    pub file_name: String,
    pub packet_num: u32,
    pub bytes_transfered: u64,
    pub percent: u8,
    pub elapsed_secs: u64,
    pub bps: u64,
}

impl TransferInformation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressDisplay for TransferInformation {
    fn set_protocol_name(&mut self, name: &str) {
        self.protocol_name = name.to_string();
    }

    fn set_file_name(&mut self, name: &str) {
        self.file_name = name.to_string();
    }

    fn on_packet(&mut self, packet_num: u32) {
        self.packet_num = packet_num;
    }

    fn on_bytes(&mut self, byte_count: u64) {
        self.bytes_transfered = byte_count;
    }

    fn on_percent(&mut self, percent: u8) {
        self.percent = percent;
    }

    fn on_elapsed(&mut self, elapsed_secs: u64, bps: u64) {
        self.elapsed_secs = elapsed_secs;
        self.bps = bps;
    }
}
