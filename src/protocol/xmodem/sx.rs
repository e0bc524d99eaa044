use crate::{
    com::{Com, ComResult},
    protocol::{Clock, ProgressDisplay},
};

use super::{
    constants::{ACK, CAN, CPMEOF, CRC_REQUEST, DEFAULT_BLOCK_LENGTH, EOT, NAK, SOH, STX},
    FileHandle, TransferMode, TransmissionError, XmodemSession, XmodemVariant,
};

impl XmodemSession {
    pub(crate) fn send_packet(
        &mut self,
        com: &mut dyn Com,
        clock: &mut dyn Clock,
        progress: &mut dyn ProgressDisplay,
    ) -> ComResult<bool> {
        if self.pkt_buf_count == 0 {
            let mut send_flag = false;
            while !send_flag {
                let Some(b) = self.read_byte(com)? else {
                    return Ok(true);
                };
                if b == CAN {
                    self.can_count += 1;
                    if self.can_count > 2 {
                        self.failure = Some(TransmissionError::RemoteCancel);
                        self.finish();
                        return Ok(false);
                    }
                    continue;
                }
                self.can_count = 0;
                match b {
                    ACK => {
                        if matches!(self.file, FileHandle::None) {
                            // the EOT went through
                            self.success = true;
                            self.finish();
                            return Ok(false);
                        } else if self.pkt_num_sent == self.pkt_num.wrapping_add(1) {
                            self.pkt_num = self.pkt_num_sent;
                            if self.pkt_num == 0 {
                                self.pkt_num_offset += 256;
                            }
                            send_flag = true;
                        }
                    }
                    NAK => {
                        if self.pkt_num == 0 && self.pkt_num_offset == 0 && self.pkt_num_sent == 0 {
                            // the receiver asked for plain checksum
                            match self.variant {
                                XmodemVariant::Crc => {
                                    self.set_variant(XmodemVariant::Checksum, progress);
                                }
                                XmodemVariant::Crc1k => {
                                    self.set_variant(XmodemVariant::Cksum1k, progress);
                                }
                                _ => {}
                            }
                        } else {
                            self.errors += 1;
                        }
                        send_flag = true;
                    }
                    CRC_REQUEST => {
                        if self.pkt_num == 0 && self.pkt_num_offset == 0 && self.pkt_num_sent == 0 {
                            match self.variant {
                                XmodemVariant::Checksum => {
                                    self.set_variant(XmodemVariant::Crc, progress);
                                }
                                XmodemVariant::Cksum1k => {
                                    self.set_variant(XmodemVariant::Crc1k, progress);
                                }
                                _ => {}
                            }
                            send_flag = true;
                        }
                    }
                    _ => {}
                }
            }
            clock.arm_deadline(self.t_very_long);

            while self.read_byte(com)?.is_some() {}

            if self.pkt_num_sent == self.pkt_num {
                self.stage_next_packet()?;
            } else {
                self.restage_packet();
            }
            self.pkt_buf_ptr = 0;
        }

        // a NAK or C could have arrived while we were staging, consume it
        while self.read_byte(com)?.is_some() {}

        while self.pkt_buf_count > 0 {
            let b = self.pkt_out[self.pkt_buf_ptr];
            let written = self.write(com, &[b])?;
            if written == 0 {
                break;
            }
            self.pkt_buf_ptr += 1;
            self.pkt_buf_count -= 1;
        }

        if self.pkt_buf_count == 0 {
            if self.pkt_num_sent == 0 {
                progress.on_packet(self.pkt_num_offset + 256);
            } else {
                progress.on_packet(self.pkt_num_offset + u32::from(self.pkt_num_sent));
            }
            progress.on_bytes(self.byte_count);
            if self.file_size > 0 {
                let percent = (self.byte_count * 100 / self.file_size).min(100) as u8;
                progress.on_percent(percent);
            }
            self.report_rate(clock, progress);
        }

        Ok(true)
    }

    /// Builds the next data packet from the source, or stages a lone EOT
    /// once the source is drained.
    fn stage_next_packet(&mut self) -> ComResult<()> {
        let data_len = self.variant.data_len();
        self.pkt_num_sent = self.pkt_num_sent.wrapping_add(1);

        let mut n = 0;
        if let FileHandle::Source(source) = &mut self.file {
            while n < data_len && source.is_open() {
                let read = source.read(&mut self.pkt_out[3 + n..3 + data_len])?;
                if read == 0 {
                    break;
                }
                n += read;
            }
        }

        if n > 0 {
            self.byte_count += n as u64;
            self.pkt_out[0] = if data_len == DEFAULT_BLOCK_LENGTH {
                SOH
            } else {
                STX
            };
            self.pkt_out[1] = self.pkt_num_sent;
            self.pkt_out[2] = !self.pkt_num_sent;
            for slot in &mut self.pkt_out[3 + n..3 + data_len] {
                *slot = CPMEOF;
            }

            let check = self.variant.calc_check(&self.pkt_out[3..3 + data_len]);
            if self.variant.check_len() == 1 {
                self.pkt_out[3 + data_len] = check as u8;
            } else {
                self.pkt_out[3 + data_len] = (check >> 8) as u8;
                self.pkt_out[3 + data_len + 1] = check as u8;
            }
            self.pkt_buf_count = 3 + data_len + self.variant.check_len();
        } else {
            if let FileHandle::Source(source) = &mut self.file {
                source.close();
            }
            self.file = FileHandle::None;
            self.pkt_out[0] = EOT;
            self.pkt_buf_count = 1;
        }
        Ok(())
    }

    fn restage_packet(&mut self) {
        self.pkt_buf_count = if self.pkt_out[0] == EOT {
            1
        } else {
            3 + self.variant.data_len() + self.variant.check_len()
        };
    }
}
