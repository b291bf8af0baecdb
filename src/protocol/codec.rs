//! Length-prefixed envelope framing.
//!
//! A frame is a 4-byte big-endian body length followed by exactly that many
//! bytes of a serialized [`CastMessage`]. Writers must emit prefix and body
//! as one unit: [`Envelope::to_frame`] returns both in a single buffer so
//! that one `write_all` under the write lock suffices.

use protobuf::Message;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::cast_channel::{
    cast_message::{PayloadType, ProtocolVersion},
    CastMessage,
};
use crate::error::{Error, Result};

/// Length of the big-endian body length prefix.
pub const PREFIX_LEN: usize = 4;

/// Largest body a receiver device accepts or sends.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Decoded form of a text envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
    pub namespace: String,
    pub source_id: String,
    pub destination_id: String,
    /// UTF-8 JSON document.
    pub payload: String,
}

impl Envelope {
    #[must_use]
    pub fn new(
        namespace: impl Into<String>,
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            payload: payload.into(),
        }
    }

    /// Serializes the envelope without length prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if Protocol Buffer serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut message = CastMessage::new();
        message.set_protocol_version(ProtocolVersion::CASTV2_1_0);
        message.set_source_id(self.source_id.clone());
        message.set_destination_id(self.destination_id.clone());
        message.set_namespace(self.namespace.clone());
        message.set_payload_type(PayloadType::STRING);
        message.set_payload_utf8(self.payload.clone());

        message.write_to_bytes().map_err(Into::into)
    }

    /// Serializes the envelope with its length prefix, ready for the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the body exceeds
    /// [`MAX_FRAME_SIZE`].
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        let body = self.encode()?;
        let len = check_len(body.len())?;

        let mut frame = Vec::with_capacity(PREFIX_LEN + body.len());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    /// Parses an envelope body (without length prefix).
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a valid `CastMessage` or carries a
    /// binary payload.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let mut message = CastMessage::parse_from_bytes(body)?;
        if message.payload_type() != PayloadType::STRING {
            return Err(Error::unimplemented(format!(
                "binary payload on {}",
                message.namespace()
            )));
        }

        Ok(Self {
            namespace: message.take_namespace(),
            source_id: message.take_source_id(),
            destination_id: message.take_destination_id(),
            payload: message.take_payload_utf8(),
        })
    }
}

fn check_len(len: usize) -> Result<u32> {
    if len > MAX_FRAME_SIZE {
        return Err(Error::out_of_range(format!(
            "frame of {len} bytes exceeds maximum of {MAX_FRAME_SIZE} bytes"
        )));
    }

    u32::try_from(len).map_err(|e| Error::out_of_range(e.to_string()))
}

/// Reads one frame body, blocking until it is complete.
///
/// Any short read is fatal: the stream is out of sync from then on.
///
/// # Errors
///
/// Returns an error if the peer closes the stream or fails mid-frame, or if
/// the announced length exceeds [`MAX_FRAME_SIZE`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0; PREFIX_LEN];
    reader.read_exact(&mut prefix).await?;

    let len = u32::from_be_bytes(prefix) as usize;
    check_len(len)?;

    let mut body = vec![0; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn envelope(payload: String) -> Envelope {
        Envelope::new(
            "urn:x-cast:com.google.cast.media",
            "sender-0",
            "web-5",
            payload,
        )
    }

    #[tokio::test]
    async fn frames_survive_the_wire_for_all_payload_sizes() {
        for size in [0, 1, 127, 128, 2_048, 2_049, 16_384, 60_000] {
            let original = envelope("x".repeat(size));
            let frame = original.to_frame().unwrap();

            let announced = u32::from_be_bytes(frame[..PREFIX_LEN].try_into().unwrap());
            assert_eq!(announced as usize, frame.len() - PREFIX_LEN);

            let mut reader = frame.as_slice();
            let body = read_frame(&mut reader).await.unwrap();
            assert!(reader.is_empty());
            assert_eq!(Envelope::decode(&body).unwrap(), original);
        }
    }

    #[tokio::test]
    async fn consecutive_frames_are_read_one_at_a_time() {
        let first = envelope(r#"{"type":"PING"}"#.to_owned());
        let second = envelope(r#"{"type":"PONG"}"#.to_owned());
        let mut wire = first.to_frame().unwrap();
        wire.extend(second.to_frame().unwrap());

        let mut reader = wire.as_slice();
        let body = read_frame(&mut reader).await.unwrap();
        assert_eq!(Envelope::decode(&body).unwrap(), first);
        let body = read_frame(&mut reader).await.unwrap();
        assert_eq!(Envelope::decode(&body).unwrap(), second);
    }

    #[tokio::test]
    async fn short_reads_are_fatal() {
        let frame = envelope("{}".to_owned()).to_frame().unwrap();

        let mut truncated_body = &frame[..frame.len() - 1];
        let err = read_frame(&mut truncated_body).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::DataLoss);

        let mut truncated_prefix = &frame[..2];
        assert!(read_frame(&mut truncated_prefix).await.is_err());
    }

    #[tokio::test]
    async fn oversized_frames_are_rejected() {
        let announced = u32::try_from(MAX_FRAME_SIZE + 1).unwrap().to_be_bytes();
        let mut reader = &announced[..];
        let err = read_frame(&mut reader).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);

        let err = envelope("x".repeat(MAX_FRAME_SIZE)).to_frame().unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);
    }

    #[test]
    fn garbage_bodies_do_not_decode() {
        assert!(Envelope::decode(&[0xff, 0xff, 0xff]).is_err());
    }
}
