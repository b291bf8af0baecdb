//! Wire protocol spoken with Cast receiver devices.
//!
//! # Protocol Structure
//!
//! Every message is a [`CastMessage`] envelope prefixed by its length:
//!
//! ```text
//! +----------------+------------------------------------------+
//! | u32 big-endian | protobuf CastMessage                     |
//! | body length    | {version, source, destination, namespace,|
//! |                |  payload type, UTF-8 JSON payload}       |
//! +----------------+------------------------------------------+
//! ```
//!
//! * **Framing** ([`codec`]): length prefix and envelope encoding
//! * **Messages** ([`messages`]): JSON documents carried in the payload
//! * **Namespaces** ([`Namespace`]): sub-protocol selection
//!
//! [`CastMessage`]: cast_channel::CastMessage

use std::{fmt, str::FromStr};

use crate::error::Error;

pub mod codec;
pub mod messages;
pub mod protos;

pub use codec::Envelope;
pub use protos::cast_channel;

/// Sub-protocols multiplexed over a single receiver connection.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Namespace {
    /// Virtual connection setup and teardown (`CONNECT`/`CLOSE`).
    Connection,

    /// Keep-alive exchanged with the receiver (`PING`/`PONG`).
    Heartbeat,

    /// Receiver platform control: applications and volume.
    Receiver,

    /// Media session control and status.
    Media,
}

impl Namespace {
    /// Wire value for [`Namespace::Connection`].
    const CONNECTION: &'static str = "urn:x-cast:com.google.cast.tp.connection";

    /// Wire value for [`Namespace::Heartbeat`].
    const HEARTBEAT: &'static str = "urn:x-cast:com.google.cast.tp.heartbeat";

    /// Wire value for [`Namespace::Receiver`].
    const RECEIVER: &'static str = "urn:x-cast:com.google.cast.receiver";

    /// Wire value for [`Namespace::Media`].
    const MEDIA: &'static str = "urn:x-cast:com.google.cast.media";

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => Self::CONNECTION,
            Self::Heartbeat => Self::HEARTBEAT,
            Self::Receiver => Self::RECEIVER,
            Self::Media => Self::MEDIA,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = Error;

    /// Parses a namespace URN as found in a received envelope.
    ///
    /// # Errors
    ///
    /// Will return `Err` if `s` is not one of the namespaces this client
    /// speaks.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let variant = match s {
            Self::CONNECTION => Self::Connection,
            Self::HEARTBEAT => Self::Heartbeat,
            Self::RECEIVER => Self::Receiver,
            Self::MEDIA => Self::Media,
            _ => return Err(Self::Err::unimplemented(format!("namespace `{s}`"))),
        };

        Ok(variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn namespaces_parse_from_their_wire_value() {
        for namespace in [
            Namespace::Connection,
            Namespace::Heartbeat,
            Namespace::Receiver,
            Namespace::Media,
        ] {
            assert_eq!(namespace.to_string().parse::<Namespace>().unwrap(), namespace);
        }
    }

    #[test]
    fn foreign_namespaces_are_unimplemented() {
        let err = "urn:x-cast:com.google.cast.multizone"
            .parse::<Namespace>()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unimplemented);
    }
}
