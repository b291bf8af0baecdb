//! The reader task: sole consumer of the inbound half of a connection.
//!
//! One task runs per live connection. It decodes frames in arrival order,
//! answers heartbeats, tracks media and receiver status, and hands replies
//! to the callers waiting for them. It ends on the first read error, after
//! declaring the connection dead.

use std::{
    sync::{Arc, LazyLock, PoisonError},
    time::Instant,
};

use regex_lite::Regex;
use serde_json::Value;
use tokio::io::ReadHalf;

use crate::{
    error::Error,
    protocol::{
        codec,
        messages::{
            self, MediaStatusMessage, ReceiverStatusMessage, Request, CLOSE, MEDIA_STATUS, PING,
            RECEIVER_STATUS,
        },
        Envelope, Namespace,
    },
    remote::Shared,
    transport::Stream,
};

/// Finds the request id in payloads that are not valid JSON.
static REQUEST_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""requestId"\s*:\s*(\d+)"#).expect("request id pattern"));

pub(crate) async fn run(shared: Arc<Shared>, mut reader: ReadHalf<Box<dyn Stream>>, generation: u64) {
    let reason = loop {
        match codec::read_frame(&mut reader).await {
            Ok(body) => dispatch(&shared, &body).await,
            Err(e) => break e,
        }
    };

    if shared.is_closing() {
        debug!("reader stopped: {reason}");
    } else {
        error!("connection lost: {reason}");
    }
    shared.reader_exited(generation, &reason.to_string()).await;
}

async fn dispatch(shared: &Shared, body: &[u8]) {
    let envelope = match Envelope::decode(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("discarding undecodable frame: {e}");
            return;
        }
    };

    trace!(
        "{} -> {} ({}): {}",
        envelope.source_id,
        envelope.destination_id,
        envelope.namespace,
        envelope.payload
    );

    let value = match serde_json::from_str::<Value>(&envelope.payload) {
        Ok(value) => value,
        Err(e) => {
            warn!("discarding unparsable payload on {}: {e}", envelope.namespace);
            // Do not leave a caller waiting forever on a reply it will never
            // get in decodable form.
            if let Some(request_id) = salvage_request_id(&envelope.payload) {
                shared.state().pending.resolve(
                    request_id,
                    Err(Error::data_loss(format!(
                        "reply to request {request_id} is not valid JSON: {e}"
                    ))),
                );
            }
            return;
        }
    };

    let namespace = envelope.namespace.parse::<Namespace>().ok();
    let kind = messages::message_type(&value);
    let mut event = None;

    match (namespace, kind) {
        (Some(Namespace::Heartbeat), Some(PING)) => {
            // Answered here, before the next frame is read; the receiver
            // drops senders that miss pongs.
            match Request::Pong.to_payload() {
                Ok(pong) => {
                    if let Err(e) = shared
                        .write_frame(Namespace::Heartbeat, &envelope.source_id, pong)
                        .await
                    {
                        warn!("could not answer heartbeat: {e}");
                    }
                }
                Err(e) => warn!("could not answer heartbeat: {e}"),
            }
            return;
        }

        (Some(Namespace::Connection), Some(CLOSE)) => {
            info!("{} closed the virtual connection", envelope.source_id);
            shared.invalidate("virtual connection closed by device");
        }

        (Some(Namespace::Media), Some(MEDIA_STATUS)) => match MediaStatusMessage::from_value(&value)
        {
            Ok(status) => {
                if let Some(entry) = status.entry() {
                    event = Some(shared.state().media.apply(entry, Instant::now()));
                }
            }
            Err(e) => warn!("ignoring malformed media status: {e}"),
        },

        (Some(Namespace::Receiver), Some(RECEIVER_STATUS)) => {
            match ReceiverStatusMessage::from_value(&value) {
                Ok(status) => {
                    if let Some(volume) = status.status.volume {
                        let mut state = shared.state();
                        state.volume.level = volume.level.or(state.volume.level);
                        state.volume.muted = volume.muted.or(state.volume.muted);
                    }
                }
                Err(e) => warn!("ignoring malformed receiver status: {e}"),
            }
        }

        _ => {}
    }

    // Id 0 is what devices put on unsolicited status pushes.
    if let Some(request_id) = messages::request_id(&value).filter(|&id| id != 0) {
        shared.state().pending.resolve(request_id, Ok(value));
    }

    if let Some(event) = event {
        let callback = shared
            .callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(&event);
        }
    }
}

fn salvage_request_id(payload: &str) -> Option<u32> {
    REQUEST_ID
        .captures(payload)
        .and_then(|captures| captures.get(1))
        .and_then(|id| id.as_str().parse().ok())
        .filter(|&id| id != 0)
}
