use std::{
    fs,
    path::{Path, PathBuf},
};

use serde_derive::{Deserialize, Serialize};

use crate::EngineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PortType {
    #[default]
    Serial,
    Tcp,
}

/// Transfer tuning shared by all sessions: timeout ladder, the optional
/// command used to start the remote receiver, and transcript logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Receiver timeout (ms) before the first packet in checksum mode.
    pub timeout_init: u64,
    /// Receiver timeout (ms) between 'C' requests in CRC mode.
    pub timeout_init_crc: u64,
    /// Timeout (ms) between bytes of a packet.
    pub timeout_short: u64,
    /// Timeout (ms) between packets.
    pub timeout_long: u64,
    /// Sender side timeout (ms) waiting for the receiver to answer.
    pub timeout_very_long: u64,
    /// Command written to the transport before sending, e.g. "rx".
    /// The file name and a trailing CR are appended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rcv_command: Option<String>,
    pub log_transfer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    /// On `Tcp` the short/long timeouts are widened to `timeout_very_long`.
    pub port_type: PortType,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            timeout_init: 10_000,
            timeout_init_crc: 3_000,
            timeout_short: 10_000,
            timeout_long: 20_000,
            timeout_very_long: 60_000,
            rcv_command: None,
            log_transfer: false,
            log_path: None,
            port_type: PortType::Serial,
        }
    }
}

impl TransferSettings {
    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn store(&self, path: &Path) -> EngineResult<()> {
        fs::write(path, toml::to_string(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_roundtrip() {
        let mut settings = TransferSettings::default();
        settings.rcv_command = Some("rx".to_string());
        settings.port_type = PortType::Tcp;
        let text = toml::to_string(&settings).unwrap();
        let parsed: TransferSettings = toml::from_str(&text).unwrap();
        assert_eq!(settings, parsed);
    }

    #[test]
    fn test_partial_settings() {
        let parsed: TransferSettings = toml::from_str("timeout_long = 30000").unwrap();
        assert_eq!(30_000, parsed.timeout_long);
        assert_eq!(10_000, parsed.timeout_init);
    }
}
