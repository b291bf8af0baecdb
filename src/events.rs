//! Media status events pushed by the receiver device.
//!
//! Every `MEDIA_STATUS` message the receiver sends, whether as a reply to a
//! command or unsolicited, produces one [`MediaEvent`]. Register a callback
//! with [`Client::set_media_status_callback`] to observe them:
//!
//! ```rust
//! use castctl::{events::MediaEvent, protocol::messages::PlayerState};
//!
//! fn on_status(event: &MediaEvent) {
//!     if event.player_state == Some(PlayerState::Idle) {
//!         if let Some(uuid) = &event.uuid {
//!             println!("{uuid} finished: {:?}", event.idle_reason);
//!         }
//!     }
//! }
//! ```
//!
//! Callbacks run on the reader task: they must not block, and must not await
//! commands on the same client.
//!
//! [`Client::set_media_status_callback`]: crate::remote::Client::set_media_status_callback

use std::sync::Arc;

use crate::protocol::messages::PlayerState;

/// A single media status notification.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MediaEvent {
    /// Player state reported by the device.
    ///
    /// `None` when the status omitted it, as partial updates do.
    pub player_state: Option<PlayerState>,

    /// Why the player went idle, e.g. `FINISHED`, `CANCELLED` or `ERROR`.
    pub idle_reason: Option<String>,

    /// Content the status belongs to.
    ///
    /// For an idle status this is the content that was tracked *before*
    /// the status cleared it, so observers learn what just ended.
    pub uuid: Option<String>,
}

/// Callback invoked with every [`MediaEvent`].
pub type MediaStatusCallback = Arc<dyn Fn(&MediaEvent) + Send + Sync>;
