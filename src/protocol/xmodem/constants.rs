pub const SOH: u8 = 0x01;
pub const STX: u8 = 0x02;
pub const EOT: u8 = 0x04;
pub const ACK: u8 = 0x06;
pub const BS: u8 = 0x08;
pub const LF: u8 = 0x0A;
pub const CR: u8 = 0x0D;
pub const NAK: u8 = 0x15;
pub const CAN: u8 = 0x18;
pub const CPMEOF: u8 = 0x1A;
pub const CRC_REQUEST: u8 = b'C';

pub const DEFAULT_BLOCK_LENGTH: usize = 128;
pub const EXT_BLOCK_LENGTH: usize = 1024;

/// Header + largest payload + CRC, with one byte of slack.
pub const PKT_BUF_LENGTH: usize = 3 + EXT_BLOCK_LENGTH + 2 + 1;

/// Five cancels and five backspaces; the backspaces wipe whatever the
/// remote shell buffered from the CAN run.
pub const CANCEL_SEQUENCE: [u8; 10] = [CAN, CAN, CAN, CAN, CAN, BS, BS, BS, BS, BS];
