use crate::{
    com::{Com, ComResult},
    protocol::{Clock, ProgressDisplay},
};

use super::{
    constants::{ACK, CAN, CPMEOF, CR, CRC_REQUEST, EOT, LF, NAK, SOH, STX},
    FileHandle, NakMode, PacketReadState, TransferMode, TransmissionError, XmodemSession,
    XmodemVariant,
};

impl XmodemSession {
    /// Re-requests the current packet. Counts down the retry budget; when
    /// a CRC mode receiver runs out it falls back to checksum once, after
    /// that the transfer is aborted.
    pub(crate) fn send_nak(
        &mut self,
        com: &mut dyn Com,
        clock: &mut dyn Clock,
        progress: &mut dyn ProgressDisplay,
    ) -> ComResult<()> {
        com.discard_buffer()?;

        self.nak_count -= 1;
        if self.nak_count < 0 {
            if self.nak_mode == NakMode::SendC {
                self.set_variant(XmodemVariant::Checksum, progress);
                self.nak_mode = NakMode::SendNak;
                self.nak_count = 9;
            } else {
                self.abort(com, TransmissionError::TooManyRetries)?;
                return Ok(());
            }
        }

        let (b, timeout) = if self.nak_mode == NakMode::SendNak {
            let t = if self.pkt_num == 0 && self.pkt_num_offset == 0 {
                self.t_init
            } else {
                self.t_long
            };
            (NAK, t)
        } else {
            (CRC_REQUEST, self.t_init_crc)
        };
        self.write(com, &[b])?;
        self.read_state = PacketReadState::AwaitHeader;
        clock.arm_deadline(timeout);
        Ok(())
    }

    pub(crate) fn read_packet(
        &mut self,
        com: &mut dyn Com,
        clock: &mut dyn Clock,
        progress: &mut dyn ProgressDisplay,
    ) -> ComResult<bool> {
        let mut got_pkt = false;
        while !got_pkt {
            if self.mode != TransferMode::Receive {
                // a nested cancel already tore the session down
                return Ok(true);
            }
            let Some(b) = self.read_byte(com)? else {
                break;
            };
            match self.read_state {
                PacketReadState::AwaitHeader => match b {
                    SOH => {
                        self.pkt_in[0] = b;
                        self.read_state = PacketReadState::AwaitBlock;
                        match self.variant {
                            XmodemVariant::Crc1k => self.set_variant(XmodemVariant::Crc, progress),
                            XmodemVariant::Cksum1k => {
                                self.set_variant(XmodemVariant::Checksum, progress);
                            }
                            _ => {}
                        }
                        clock.arm_deadline(self.t_short);
                        self.can_count = 0;
                    }
                    STX => {
                        self.pkt_in[0] = b;
                        self.read_state = PacketReadState::AwaitBlock;
                        match self.variant {
                            XmodemVariant::Crc => self.set_variant(XmodemVariant::Crc1k, progress),
                            XmodemVariant::Checksum => {
                                self.set_variant(XmodemVariant::Cksum1k, progress);
                            }
                            _ => {}
                        }
                        clock.arm_deadline(self.t_short);
                        self.can_count = 0;
                    }
                    EOT => {
                        self.success = true;
                        self.write(com, &[ACK])?;
                        self.finish();
                        return Ok(false);
                    }
                    CAN => {
                        self.can_count += 1;
                        if self.can_count > 2 {
                            self.failure = Some(TransmissionError::RemoteCancel);
                            self.finish();
                            return Ok(false);
                        }
                    }
                    _ => {
                        // line noise, drop everything buffered and retry
                        com.discard_buffer()?;
                        return Ok(true);
                    }
                },
                PacketReadState::AwaitBlock => {
                    self.pkt_in[1] = b;
                    self.read_state = PacketReadState::AwaitBlockComplement;
                    clock.arm_deadline(self.t_short);
                }
                PacketReadState::AwaitBlockComplement => {
                    self.pkt_in[2] = b;
                    if (b ^ self.pkt_in[1]) == 0xFF {
                        self.pkt_buf_ptr = 3;
                        self.pkt_buf_count = self.variant.data_len() + self.variant.check_len();
                        self.read_state = PacketReadState::AwaitData;
                        clock.arm_deadline(self.t_short);
                    } else {
                        self.errors += 1;
                        self.send_nak(com, clock, progress)?;
                    }
                }
                PacketReadState::AwaitData => {
                    self.pkt_in[self.pkt_buf_ptr] = b;
                    self.pkt_buf_ptr += 1;
                    self.pkt_buf_count -= 1;
                    if self.pkt_buf_count == 0 {
                        self.read_state = PacketReadState::AwaitHeader;
                        clock.arm_deadline(self.t_long);
                        got_pkt = true;
                    } else {
                        clock.arm_deadline(self.t_short);
                    }
                }
            }
        }

        if !got_pkt {
            return Ok(true);
        }
        self.process_packet(com, clock, progress)
    }

    fn process_packet(
        &mut self,
        com: &mut dyn Com,
        clock: &mut dyn Clock,
        progress: &mut dyn ProgressDisplay,
    ) -> ComResult<bool> {
        // Some senders push a block numbered 0 before the data; request
        // the real first block again with a fresh retry budget.
        if self.pkt_in[1] == 0 && self.pkt_num == 0 && self.pkt_num_offset == 0 {
            self.nak_count = if self.nak_mode == NakMode::SendNak { 10 } else { 3 };
            self.send_nak(com, clock, progress)?;
            return Ok(self.mode == TransferMode::Receive);
        }

        if !self.check_packet() {
            self.errors += 1;
            self.send_nak(com, clock, progress)?;
            return Ok(self.mode == TransferMode::Receive);
        }

        let d = self.pkt_in[1].wrapping_sub(self.pkt_num);
        if d > 1 {
            let expected = self.pkt_num.wrapping_add(1);
            self.abort(com, TransmissionError::BlockNumberGap(self.pkt_in[1], expected))?;
            return Ok(false);
        }

        self.write(com, &[ACK])?;
        self.nak_mode = NakMode::SendNak;
        self.nak_count = 10;

        if d == 0 {
            // retransmission of the block we already took
            return Ok(true);
        }
        self.pkt_num = self.pkt_in[1];
        if self.pkt_num == 0 {
            self.pkt_num_offset += 256;
        }

        let mut count = self.variant.data_len();
        if self.text_mode {
            while count > 0 && self.pkt_in[2 + count] == CPMEOF {
                count -= 1;
            }
        }

        if let FileHandle::Sink(sink) = &mut self.file {
            if self.text_mode {
                for i in 0..count {
                    let b = self.pkt_in[3 + i];
                    if b == LF && !self.cr_recv {
                        sink.write(&[CR])?;
                    }
                    if self.cr_recv && b != LF {
                        sink.write(&[LF])?;
                    }
                    self.cr_recv = b == CR;
                    sink.write(&[b])?;
                }
            } else {
                sink.write(&self.pkt_in[3..3 + count])?;
            }
        }
        self.byte_count += count as u64;

        progress.on_packet(self.pkt_num_offset + u32::from(self.pkt_num));
        progress.on_bytes(self.byte_count);
        self.report_rate(clock, progress);

        clock.arm_deadline(self.t_long);
        Ok(true)
    }
}
