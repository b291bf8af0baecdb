//! JSON documents carried in envelope payloads.
//!
//! Outbound messages are strongly typed ([`Request`]). Inbound payloads are
//! parsed into a generic [`Value`] first, because the reader must route
//! every document by `type` and `requestId` regardless of its shape; typed
//! views ([`ReceiverStatusMessage`], [`MediaStatusMessage`]) are then
//! deserialized from that value where the contents matter.
//!
//! # Wire Format
//!
//! ```json
//! {"type": "PLAY", "requestId": 7, "mediaSessionId": 1}
//! {"type": "MEDIA_STATUS", "requestId": 7, "status": [{"playerState": "PLAYING", ...}]}
//! ```

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DefaultOnError, DeserializeFromStr, SerializeDisplay};

use crate::error::{Error, Result};

/// Message `type` of heartbeat pings.
pub const PING: &str = "PING";

/// Message `type` of virtual connection teardown.
pub const CLOSE: &str = "CLOSE";

/// Message `type` of media status pushes and replies.
pub const MEDIA_STATUS: &str = "MEDIA_STATUS";

/// Message `type` of receiver status pushes and replies.
pub const RECEIVER_STATUS: &str = "RECEIVER_STATUS";

/// Track id announced for the subtitle track of loaded content.
pub const SUBTITLE_TRACK_ID: u32 = 1;

/// Outbound messages.
///
/// Variants carrying a `request_id` expect a correlated reply; the others
/// are fire-and-forget.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Request {
    /// Opens a virtual connection to the destination.
    Connect { origin: Origin },

    /// Closes the virtual connection to the destination.
    Close,

    /// Answers a heartbeat `PING` from the receiver.
    Pong,

    /// Asks the receiver platform for running applications and volume.
    GetStatus { request_id: u32 },

    /// Starts an application on the receiver platform.
    Launch { request_id: u32, app_id: String },

    /// Changes the receiver volume level or mute state.
    SetVolume { request_id: u32, volume: Volume },

    /// Loads content into the media application.
    Load {
        request_id: u32,
        session_id: String,
        media: MediaInformation,
        #[serde(skip_serializing_if = "Option::is_none")]
        active_track_ids: Option<Vec<u32>>,
        autoplay: bool,
        current_time: f64,
    },

    Play { request_id: u32, media_session_id: u64 },
    Pause { request_id: u32, media_session_id: u64 },
    Stop { request_id: u32, media_session_id: u64 },

    /// Selects the active text tracks; an empty list disables subtitles.
    EditTracksInfo {
        request_id: u32,
        media_session_id: u64,
        active_track_ids: Vec<u32>,
    },
}

impl Request {
    #[must_use]
    pub fn connect() -> Self {
        Self::Connect {
            origin: Origin::default(),
        }
    }

    /// Returns the correlation id of requests that expect a reply.
    #[must_use]
    pub fn request_id(&self) -> Option<u32> {
        match self {
            Self::Connect { .. } | Self::Close | Self::Pong => None,
            Self::GetStatus { request_id }
            | Self::Launch { request_id, .. }
            | Self::SetVolume { request_id, .. }
            | Self::Load { request_id, .. }
            | Self::Play { request_id, .. }
            | Self::Pause { request_id, .. }
            | Self::Stop { request_id, .. }
            | Self::EditTracksInfo { request_id, .. } => Some(*request_id),
        }
    }

    /// Serializes the request into its payload text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_payload(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}

/// Origin of a virtual connection. Always empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {}

/// Receiver volume. Either field may be absent in both directions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

/// Content descriptor sent with [`Request::Load`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInformation {
    pub content_id: String,
    pub stream_type: String,
    pub content_type: String,
    pub metadata: Metadata,
    pub custom_data: CustomData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tracks: Vec<Track>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_track_style: Option<TextTrackStyle>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
}

/// Application data echoed back by the receiver in media status.
///
/// Other senders may store anything here, so a `uuid` of another type reads
/// as absent instead of failing the whole status.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomData {
    #[serde_as(deserialize_as = "DefaultOnError")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub track_id: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: String,
    pub language: String,
    pub name: String,
    pub track_content_id: String,
    pub track_content_type: String,
}

impl Track {
    /// English WebVTT subtitles served from `url`.
    #[must_use]
    pub fn subtitles(url: impl Into<String>) -> Self {
        Self {
            track_id: SUBTITLE_TRACK_ID,
            kind: "TEXT".to_owned(),
            subtype: "SUBTITLES".to_owned(),
            language: "en-US".to_owned(),
            name: "English".to_owned(),
            track_content_id: url.into(),
            track_content_type: "text/vtt".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextTrackStyle {
    pub background_color: String,
    pub edge_type: String,
    pub edge_color: String,
    pub font_scale: f64,
}

impl Default for TextTrackStyle {
    /// Outlined text on a transparent background.
    fn default() -> Self {
        Self {
            background_color: "#00000000".to_owned(),
            edge_type: "OUTLINE".to_owned(),
            edge_color: "#000000FF".to_owned(),
            font_scale: 1.1,
        }
    }
}

/// Player state as reported in media status.
///
/// States this client does not know are preserved verbatim.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub enum PlayerState {
    #[default]
    Idle,
    Buffering,
    Loading,
    Playing,
    Paused,
    Other(String),
}

impl PlayerState {
    /// Whether the state means content is being played or about to be.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Buffering | Self::Playing)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Buffering => write!(f, "BUFFERING"),
            Self::Loading => write!(f, "LOADING"),
            Self::Playing => write!(f, "PLAYING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Other(state) => write!(f, "{state}"),
        }
    }
}

impl FromStr for PlayerState {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let state = match s {
            "IDLE" => Self::Idle,
            "BUFFERING" => Self::Buffering,
            "LOADING" => Self::Loading,
            "PLAYING" => Self::Playing,
            "PAUSED" => Self::Paused,
            other => Self::Other(other.to_owned()),
        };

        Ok(state)
    }
}

/// Payload of a `RECEIVER_STATUS` message.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ReceiverStatusMessage {
    #[serde(default)]
    pub status: ReceiverStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ReceiverStatus {
    #[serde(default)]
    pub applications: Vec<Application>,
    pub volume: Option<Volume>,
}

/// A running application as listed by the receiver platform.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub app_id: String,
    pub session_id: Option<String>,
    pub transport_id: Option<String>,
    pub display_name: Option<String>,
}

impl ReceiverStatusMessage {
    /// Parses a receiver status out of a generic payload document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not have the expected shape.
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::deserialize(value).map_err(Into::into)
    }

    /// The first listed application, which is the one in the foreground.
    #[must_use]
    pub fn application(&self) -> Option<&Application> {
        self.status.applications.first()
    }
}

/// Payload of a `MEDIA_STATUS` message.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct MediaStatusMessage {
    #[serde(default)]
    pub status: Vec<MediaStatusEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStatusEntry {
    pub media_session_id: Option<u64>,
    pub player_state: Option<PlayerState>,
    pub idle_reason: Option<String>,
    pub current_time: Option<f64>,
    pub active_track_ids: Option<Vec<u32>>,
    pub media: Option<MediaSummary>,
}

/// The part of the media descriptor echoed back in status that matters here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSummary {
    pub content_id: Option<String>,
    pub custom_data: Option<CustomData>,
}

impl MediaStatusMessage {
    /// Parses a media status out of a generic payload document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not have the expected shape.
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::deserialize(value).map_err(Into::into)
    }

    /// The first status entry, which is authoritative.
    #[must_use]
    pub fn entry(&self) -> Option<&MediaStatusEntry> {
        self.status.first()
    }
}

impl MediaStatusEntry {
    /// The content uuid threaded through custom data at load time.
    #[must_use]
    pub fn uuid(&self) -> Option<&str> {
        self.media
            .as_ref()
            .and_then(|media| media.custom_data.as_ref())
            .and_then(|data| data.uuid.as_deref())
            .filter(|uuid| !uuid.is_empty())
    }
}

/// Returns the `type` field of a payload document.
#[must_use]
pub fn message_type(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

/// Returns the `requestId` field of a payload document.
#[must_use]
pub fn request_id(value: &Value) -> Option<u32> {
    value
        .get("requestId")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
}

/// Returns the player state of a `MEDIA_STATUS` reply.
///
/// Other message types, and status replies without entries, yield `None`.
#[must_use]
pub fn player_state(reply: &Value) -> Option<PlayerState> {
    if message_type(reply) != Some(MEDIA_STATUS) {
        return None;
    }

    MediaStatusMessage::from_value(reply)
        .ok()?
        .entry()?
        .player_state
        .clone()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn control_messages_serialize_to_their_wire_shape() {
        assert_eq!(
            serde_json::to_value(Request::connect()).unwrap(),
            json!({"type": "CONNECT", "origin": {}})
        );
        assert_eq!(
            serde_json::to_value(Request::Pong).unwrap(),
            json!({"type": "PONG"})
        );
        assert_eq!(
            serde_json::to_value(Request::Launch {
                request_id: 3,
                app_id: "CC1AD845".to_owned()
            })
            .unwrap(),
            json!({"type": "LAUNCH", "requestId": 3, "appId": "CC1AD845"})
        );
        assert_eq!(
            serde_json::to_value(Request::EditTracksInfo {
                request_id: 9,
                media_session_id: 2,
                active_track_ids: vec![],
            })
            .unwrap(),
            json!({"type": "EDIT_TRACKS_INFO", "requestId": 9, "mediaSessionId": 2, "activeTrackIds": []})
        );
    }

    #[test]
    fn load_carries_the_media_descriptor() {
        let request = Request::Load {
            request_id: 4,
            session_id: "session".to_owned(),
            media: MediaInformation {
                content_id: "http://host:8080/stream/abc".to_owned(),
                stream_type: "buffered".to_owned(),
                content_type: "video/x-matroska".to_owned(),
                metadata: Metadata {
                    title: "Title".to_owned(),
                },
                custom_data: CustomData {
                    uuid: Some("abc".to_owned()),
                },
                tracks: vec![Track::subtitles("http://host:8080/subs/abc")],
                text_track_style: Some(TextTrackStyle::default()),
            },
            active_track_ids: None,
            autoplay: true,
            current_time: 0.0,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "LOAD");
        assert_eq!(value["sessionId"], "session");
        assert_eq!(value["media"]["contentId"], "http://host:8080/stream/abc");
        assert_eq!(value["media"]["customData"]["uuid"], "abc");
        assert_eq!(value["media"]["metadata"]["title"], "Title");
        assert_eq!(value["media"]["tracks"][0]["type"], "TEXT");
        assert_eq!(value["media"]["tracks"][0]["trackId"], 1);
        assert_eq!(value["media"]["textTrackStyle"]["edgeType"], "OUTLINE");
        assert_eq!(value["autoplay"], true);
        assert!(value.get("activeTrackIds").is_none());
        assert_eq!(request.request_id(), Some(4));
    }

    #[test]
    fn only_commands_carry_request_ids() {
        assert_eq!(Request::connect().request_id(), None);
        assert_eq!(Request::Pong.request_id(), None);
        assert_eq!(Request::GetStatus { request_id: 0 }.request_id(), Some(0));
    }

    #[test]
    fn player_state_reads_the_first_status_entry() {
        let reply = json!({
            "type": "MEDIA_STATUS",
            "requestId": 1,
            "status": [
                {"mediaSessionId": 1, "playerState": "BUFFERING"},
                {"mediaSessionId": 2, "playerState": "PLAYING"}
            ]
        });
        assert_eq!(player_state(&reply), Some(PlayerState::Buffering));

        let empty = json!({"type": "MEDIA_STATUS", "status": []});
        assert_eq!(player_state(&empty), None);

        let other = json!({"type": "RECEIVER_STATUS", "status": {}});
        assert_eq!(player_state(&other), None);
    }

    #[test]
    fn unknown_player_states_are_preserved() {
        let state: PlayerState = "SEEKING".parse().unwrap();
        assert_eq!(state, PlayerState::Other("SEEKING".to_owned()));
        assert_eq!(state.to_string(), "SEEKING");
    }

    #[test]
    fn receiver_status_lists_applications() {
        let value = json!({
            "type": "RECEIVER_STATUS",
            "requestId": 2,
            "status": {
                "applications": [{
                    "appId": "CC1AD845",
                    "displayName": "Default Media Receiver",
                    "sessionId": "7E2FF513",
                    "transportId": "web-5"
                }],
                "volume": {"level": 0.5, "muted": false}
            }
        });

        let status = ReceiverStatusMessage::from_value(&value).unwrap();
        let app = status.application().unwrap();
        assert_eq!(app.app_id, "CC1AD845");
        assert_eq!(app.transport_id.as_deref(), Some("web-5"));
        assert_eq!(app.session_id.as_deref(), Some("7E2FF513"));
        assert_eq!(status.status.volume.unwrap().level, Some(0.5));
        assert_eq!(request_id(&value), Some(2));
    }

    #[test]
    fn empty_uuids_are_ignored() {
        let entry = MediaStatusEntry {
            media: Some(MediaSummary {
                content_id: None,
                custom_data: Some(CustomData {
                    uuid: Some(String::new()),
                }),
            }),
            ..MediaStatusEntry::default()
        };
        assert_eq!(entry.uuid(), None);
    }

    #[test]
    fn foreign_custom_data_does_not_discard_the_status() {
        let value = json!({
            "type": "MEDIA_STATUS",
            "status": [{"playerState": "PLAYING", "media": {"customData": {"uuid": 7}}}]
        });

        let status = MediaStatusMessage::from_value(&value).unwrap();
        assert_eq!(status.status[0].player_state, Some(PlayerState::Playing));
        assert_eq!(status.status[0].uuid(), None);
        assert_eq!(player_state(&value), Some(PlayerState::Playing));
    }
}
