use std::path::PathBuf;

use crate::{
    com::{Com, ComResult},
    crc,
    options::{PortType, TransferSettings},
    protocol::{
        file_io::{FileSink, FileSource},
        transfer_log::TransferLog,
        Clock, ProgressDisplay,
    },
};

pub mod constants;
mod error;
mod rx;
mod sx;

use constants::{CANCEL_SEQUENCE, DEFAULT_BLOCK_LENGTH, EXT_BLOCK_LENGTH, PKT_BUF_LENGTH};
pub use error::TransmissionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Send,
    Receive,
    Terminated,
}

/// The four legal combinations of payload length and check type. The pair
/// is derived from the tag, so it cannot get out of sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmodemVariant {
    Checksum,
    Crc,
    Crc1k,
    Cksum1k,
}

impl XmodemVariant {
    pub fn data_len(self) -> usize {
        match self {
            XmodemVariant::Checksum | XmodemVariant::Crc => DEFAULT_BLOCK_LENGTH,
            XmodemVariant::Crc1k | XmodemVariant::Cksum1k => EXT_BLOCK_LENGTH,
        }
    }

    pub fn check_len(self) -> usize {
        match self {
            XmodemVariant::Checksum | XmodemVariant::Cksum1k => 1,
            XmodemVariant::Crc | XmodemVariant::Crc1k => 2,
        }
    }

    pub fn use_crc(self) -> bool {
        self.check_len() == 2
    }

    pub fn get_protocol_name(self) -> &'static str {
        match self {
            XmodemVariant::Checksum => "XMODEM (checksum)",
            XmodemVariant::Crc => "XMODEM (CRC)",
            XmodemVariant::Crc1k => "XMODEM (1k)",
            XmodemVariant::Cksum1k => "XMODEM (1k*)",
        }
    }

    fn calc_check(self, data: &[u8]) -> u16 {
        if self.check_len() == 1 {
            u16::from(crc::get_checksum(data))
        } else {
            crc::get_crc16(data)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PacketReadState {
    AwaitHeader,
    AwaitBlock,
    AwaitBlockComplement,
    AwaitData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NakMode {
    SendNak,
    SendC,
}

pub(crate) enum FileHandle {
    None,
    Source(Box<dyn FileSource>),
    Sink(Box<dyn FileSink>),
}

#[derive(Clone, Copy)]
pub struct XmodemConfiguration {
    pub variant: XmodemVariant,
    pub text_mode: bool,
}

/// One XMODEM transfer, either direction.
///
/// The session never blocks: the surrounding scheduler calls [`parse`]
/// whenever transport bytes may be available and [`on_timeout`] when the
/// armed deadline passes. Both return `false` once the transfer is over;
/// [`is_success`] tells how it ended.
///
/// [`parse`]: XmodemSession::parse
/// [`on_timeout`]: XmodemSession::on_timeout
/// [`is_success`]: XmodemSession::is_success
pub struct XmodemSession {
    mode: TransferMode,
    variant: XmodemVariant,
    text_mode: bool,

    read_state: PacketReadState,
    pkt_in: [u8; PKT_BUF_LENGTH],
    pkt_out: [u8; PKT_BUF_LENGTH],
    pkt_buf_ptr: usize,
    pkt_buf_count: usize,

    pkt_num: u8,
    pkt_num_sent: u8,
    pkt_num_offset: u32,

    nak_mode: NakMode,
    nak_count: i32,
    can_count: u8,
    cr_recv: bool,

    byte_count: u64,
    file_size: u64,
    start_time: u64,
    errors: usize,

    t_short: u64,
    t_long: u64,
    t_very_long: u64,
    t_init: u64,
    t_init_crc: u64,

    rcv_command: Option<String>,
    log_transfer: bool,
    log_path: Option<PathBuf>,

    file: FileHandle,
    log: Option<TransferLog>,
    success: bool,
    failure: Option<TransmissionError>,
}

impl XmodemSession {
    pub fn new(config: XmodemConfiguration, settings: &TransferSettings) -> Self {
        let (t_short, t_long) = if settings.port_type == PortType::Tcp {
            (settings.timeout_very_long, settings.timeout_very_long)
        } else {
            (settings.timeout_short, settings.timeout_long)
        };

        Self {
            mode: TransferMode::Terminated,
            variant: config.variant,
            text_mode: config.text_mode,
            read_state: PacketReadState::AwaitHeader,
            pkt_in: [0; PKT_BUF_LENGTH],
            pkt_out: [0; PKT_BUF_LENGTH],
            pkt_buf_ptr: 0,
            pkt_buf_count: 0,
            pkt_num: 0,
            pkt_num_sent: 0,
            pkt_num_offset: 0,
            nak_mode: NakMode::SendNak,
            nak_count: 0,
            can_count: 0,
            cr_recv: false,
            byte_count: 0,
            file_size: 0,
            start_time: 0,
            errors: 0,
            t_short,
            t_long,
            t_very_long: settings.timeout_very_long,
            t_init: settings.timeout_init,
            t_init_crc: settings.timeout_init_crc,
            rcv_command: settings.rcv_command.clone(),
            log_transfer: settings.log_transfer,
            log_path: settings.log_path.clone(),
            file: FileHandle::None,
            log: None,
            success: false,
            failure: None,
        }
    }

    /// Starts the receiving role: takes ownership of the sink, sends the
    /// first negotiation byte ('C' or NAK) and arms the initial deadline.
    pub fn initiate_recv(
        &mut self,
        com: &mut dyn Com,
        clock: &mut dyn Clock,
        progress: &mut dyn ProgressDisplay,
        sink: Box<dyn FileSink>,
        file_name: &str,
    ) -> ComResult<()> {
        self.reset_counters(clock);
        self.open_log()?;
        self.file = FileHandle::Sink(sink);
        self.mode = TransferMode::Receive;

        progress.set_file_name(file_name);
        self.set_variant(self.variant, progress);

        if self.variant.use_crc() {
            self.nak_mode = NakMode::SendC;
            self.nak_count = 3;
        } else {
            self.nak_mode = NakMode::SendNak;
            self.nak_count = 10;
        }
        self.send_nak(com, clock, progress)?;
        Ok(())
    }

    /// Starts the sending role: takes ownership of the source, writes the
    /// optional remote receive command and waits for the first request.
    pub fn initiate_send(
        &mut self,
        com: &mut dyn Com,
        clock: &mut dyn Clock,
        progress: &mut dyn ProgressDisplay,
        source: Box<dyn FileSource>,
        file_name: &str,
    ) -> ComResult<()> {
        self.reset_counters(clock);
        self.open_log()?;
        self.file_size = source.size();
        self.file = FileHandle::Source(source);
        self.mode = TransferMode::Send;

        progress.set_file_name(file_name);
        self.set_variant(self.variant, progress);

        if let Some(cmd) = self.rcv_command.clone() {
            let kickoff = format!("{cmd} {file_name}\r");
            self.write(com, kickoff.as_bytes())?;
        }

        clock.arm_deadline(self.t_very_long);
        Ok(())
    }

    /// Consumes whatever the transport has buffered and advances the
    /// state machine. `Ok(false)` means the session is over.
    pub fn parse(
        &mut self,
        com: &mut dyn Com,
        clock: &mut dyn Clock,
        progress: &mut dyn ProgressDisplay,
    ) -> ComResult<bool> {
        match self.mode {
            TransferMode::Receive => self.read_packet(com, clock, progress),
            TransferMode::Send => self.send_packet(com, clock, progress),
            TransferMode::Terminated => Ok(false),
        }
    }

    /// Called by the scheduler when the armed deadline has passed.
    pub fn on_timeout(
        &mut self,
        com: &mut dyn Com,
        clock: &mut dyn Clock,
        progress: &mut dyn ProgressDisplay,
    ) -> ComResult<bool> {
        match self.mode {
            TransferMode::Send => {
                self.failure = Some(TransmissionError::Timeout);
                self.finish();
                Ok(false)
            }
            TransferMode::Receive => {
                self.send_nak(com, clock, progress)?;
                Ok(self.mode != TransferMode::Terminated)
            }
            TransferMode::Terminated => Ok(false),
        }
    }

    /// Aborts the transfer from this side.
    pub fn cancel(&mut self, com: &mut dyn Com) -> ComResult<()> {
        if self.mode == TransferMode::Terminated {
            return Ok(());
        }
        self.abort(com, TransmissionError::Cancel)
    }

    pub fn is_finished(&self) -> bool {
        self.mode == TransferMode::Terminated
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn failure(&self) -> Option<TransmissionError> {
        self.failure
    }

    pub fn variant(&self) -> XmodemVariant {
        self.variant
    }

    pub fn errors(&self) -> usize {
        self.errors
    }

    pub fn bytes_transfered(&self) -> u64 {
        self.byte_count
    }

    fn reset_counters(&mut self, clock: &dyn Clock) {
        self.read_state = PacketReadState::AwaitHeader;
        self.pkt_buf_ptr = 0;
        self.pkt_buf_count = 0;
        self.pkt_num = 0;
        self.pkt_num_sent = 0;
        self.pkt_num_offset = 0;
        self.can_count = 0;
        self.cr_recv = false;
        self.byte_count = 0;
        self.file_size = 0;
        self.errors = 0;
        self.start_time = clock.now_ms();
        self.success = false;
        self.failure = None;
    }

    fn open_log(&mut self) -> ComResult<()> {
        if self.log_transfer {
            let path = self
                .log_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("XMODEM.LOG"));
            self.log = Some(TransferLog::create(&path)?);
        }
        Ok(())
    }

    pub(crate) fn set_variant(&mut self, variant: XmodemVariant, progress: &mut dyn ProgressDisplay) {
        self.variant = variant;
        progress.set_protocol_name(variant.get_protocol_name());
    }

    pub(crate) fn read_byte(&mut self, com: &mut dyn Com) -> ComResult<Option<u8>> {
        let b = com.read_byte()?;
        if let Some(b) = b {
            if let Some(log) = &mut self.log {
                log.log_incoming(b);
            }
        }
        Ok(b)
    }

    pub(crate) fn write(&mut self, com: &mut dyn Com, buf: &[u8]) -> ComResult<usize> {
        let written = com.write(buf)?;
        if written > 0 {
            if let Some(log) = &mut self.log {
                log.log_outgoing(&buf[..written]);
            }
        }
        Ok(written)
    }

    pub(crate) fn check_packet(&self) -> bool {
        let data_len = self.variant.data_len();
        let check = self.variant.calc_check(&self.pkt_in[3..3 + data_len]);
        if self.variant.check_len() == 1 {
            self.pkt_in[3 + data_len] == check as u8
        } else {
            self.pkt_in[3 + data_len] == (check >> 8) as u8
                && self.pkt_in[3 + data_len + 1] == check as u8
        }
    }

    pub(crate) fn report_rate(&self, clock: &dyn Clock, progress: &mut dyn ProgressDisplay) {
        let elapsed_ms = clock.now_ms().saturating_sub(self.start_time);
        let bps = if elapsed_ms > 0 {
            self.byte_count * 1000 / elapsed_ms
        } else {
            0
        };
        progress.on_elapsed(elapsed_ms / 1000, bps);
    }

    /// Sends the cancel run and tears the session down.
    pub(crate) fn abort(
        &mut self,
        com: &mut dyn Com,
        reason: TransmissionError,
    ) -> ComResult<()> {
        log::error!("transfer aborted: {reason}");
        self.write(com, &CANCEL_SEQUENCE)?;
        self.failure = Some(reason);
        self.finish();
        Ok(())
    }

    pub(crate) fn finish(&mut self) {
        match &mut self.file {
            FileHandle::Source(source) => source.close(),
            FileHandle::Sink(sink) => sink.close(),
            FileHandle::None => {}
        }
        self.file = FileHandle::None;
        self.log = None;
        self.mode = TransferMode::Terminated;
    }
}
