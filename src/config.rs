//! Connection and protocol settings for a single receiver device.
//!
//! Settings can be built in code with [`Config::new`] or read from a TOML
//! file with [`Config::from_file`]. Only `address` is mandatory:
//!
//! ```toml
//! address = "192.168.1.20"
//! subtitles = true
//! send_timeout = 15
//! ```

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};

use crate::error::Result;

/// Identifier of the Default Media Receiver application.
pub const DEFAULT_MEDIA_RECEIVER: &str = "CC1AD845";

#[serde_as]
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host name or IP address of the receiver device.
    pub address: String,

    /// TLS control port of the receiver device.
    pub port: u16,

    /// Source id stamped on every outbound frame.
    pub sender_id: String,

    /// Destination id of the receiver platform itself.
    pub receiver_id: String,

    /// Application launched (or reused) during negotiation.
    pub app_id: String,

    /// MIME type announced for loaded content.
    pub content_type: String,

    /// Whether subtitles are enabled when loading new content.
    pub subtitles: bool,

    /// Upper bound on TCP connect plus TLS handshake.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub connect_timeout: Duration,

    /// Upper bound on waiting for a correlated reply. `None` waits until
    /// the reply arrives or the connection dies.
    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    pub send_timeout: Option<Duration>,
}

impl Config {
    /// Default TLS control port of receiver devices.
    pub const DEFAULT_PORT: u16 = 8009;

    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Reads settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: Self::DEFAULT_PORT,
            sender_id: "sender-0".to_owned(),
            receiver_id: "receiver-0".to_owned(),
            app_id: DEFAULT_MEDIA_RECEIVER.to_owned(),
            content_type: "video/x-matroska".to_owned(),
            subtitles: false,
            connect_timeout: Duration::from_secs(10),
            send_timeout: None,
        }
    }
}
