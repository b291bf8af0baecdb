//! Client for a single receiver device.
//!
//! A [`Client`] owns one framed connection at a time and a reader task that
//! consumes it. Any number of callers may issue commands concurrently: each
//! correlated request registers a waiter before it is written, and the
//! reader hands the matching reply back by request id. Replies may arrive
//! in any order.
//!
//! Commands that need an application session negotiate one on first use,
//! reconnecting first if the previous connection died. Negotiation is
//! serialized: concurrent commands on an uninitialized client perform it
//! once.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> castctl::error::Result<()> {
//! use castctl::{config::Config, remote::Client};
//!
//! let client = Client::connect(Config::new("192.168.1.20")).await?;
//! if client.load("http://192.168.1.10:8080/stream/abc", "Big Buck Bunny", "abc").await {
//!     client.pause().await;
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```

use std::{
    fmt,
    net::IpAddr,
    sync::{
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock,
    },
    time::{Duration, Instant},
};

use serde_json::Value;
use tokio::{
    io::{AsyncWriteExt, WriteHalf},
    task::JoinHandle,
};
use url::Url;

use crate::{
    config::Config,
    correlator::Correlator,
    error::{Error, Result},
    events::{MediaEvent, MediaStatusCallback},
    media::MediaStatus,
    protocol::{
        messages::{
            self, CustomData, MediaInformation, Metadata, PlayerState, ReceiverStatusMessage,
            Request, TextTrackStyle, Track, Volume, SUBTITLE_TRACK_ID,
        },
        Envelope, Namespace,
    },
    reader,
    session::{self, Session},
    transport::{Connector, Stream, TlsConnector},
};

/// Stream type of loaded content.
const STREAM_TYPE: &str = "buffered";

/// How long [`Client::close`] waits for the device to close its end.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to a receiver device. Cheap to clone; all clones share the
/// same connection.
#[derive(Clone)]
pub struct Client {
    handle: Arc<Handle>,
}

/// Stops the reader when the last client handle goes away.
struct Handle {
    shared: Arc<Shared>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.shared.abort_reader();
    }
}

/// State shared between client handles and the reader task.
pub(crate) struct Shared {
    config: Config,
    connector: Box<dyn Connector>,

    /// Coarse lock over everything the reader and callers both touch.
    /// Never held across an await.
    state: Mutex<State>,

    /// Write half of the live connection, if any. Whole frames are written
    /// while holding it.
    link: tokio::sync::Mutex<Option<Link>>,

    reader: Mutex<Option<JoinHandle<()>>>,
    negotiation: tokio::sync::Mutex<()>,

    next_request_id: AtomicU32,
    generation: AtomicU64,
    closing: AtomicBool,

    pub(crate) callback: RwLock<Option<MediaStatusCallback>>,
}

pub(crate) struct Link {
    writer: WriteHalf<Box<dyn Stream>>,
    generation: u64,
}

#[derive(Debug, Default)]
pub(crate) struct State {
    pub(crate) pending: Correlator,

    /// Present once negotiation fully succeeded.
    pub(crate) session: Option<Session>,

    pub(crate) media: MediaStatus,
    pub(crate) volume: Volume,

    /// Whether loaded content starts with subtitles enabled.
    pub(crate) subtitles: bool,

    pub(crate) local_address: Option<IpAddr>,
}

impl Shared {
    fn new(config: Config, connector: Box<dyn Connector>) -> Self {
        let state = State {
            subtitles: config.subtitles,
            ..State::default()
        };

        Self {
            config,
            connector,
            state: Mutex::new(state),
            link: tokio::sync::Mutex::new(None),
            reader: Mutex::new(None),
            negotiation: tokio::sync::Mutex::new(()),
            next_request_id: AtomicU32::new(1),
            generation: AtomicU64::new(0),
            closing: AtomicBool::new(false),
            callback: RwLock::new(None),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Hands out request ids, skipping 0 which devices use on unsolicited
    /// messages.
    fn next_request_id(&self) -> u32 {
        loop {
            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    async fn is_connected(&self) -> bool {
        self.link.lock().await.is_some()
    }

    /// Opens a new connection and starts its reader.
    async fn connect(self: &Arc<Self>) -> Result<()> {
        let transport = self.connector.connect().await?;

        // Join the reader of the previous connection before replacing it.
        let previous = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = previous {
            previous.abort();
            let _ = previous.await;
        }

        let (read_half, write_half) = tokio::io::split(transport.stream);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        *self.link.lock().await = Some(Link {
            writer: write_half,
            generation,
        });

        {
            let mut state = self.state();
            state.local_address = transport.local_addr.map(|addr| addr.ip());
            state.session = None;
        }

        let handle = tokio::spawn(reader::run(Arc::clone(self), read_half, generation));
        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        debug!("connection {generation} established");
        Ok(())
    }

    /// Writes one frame. A failed write declares the connection dead.
    pub(crate) async fn write_frame(
        &self,
        namespace: Namespace,
        destination: &str,
        payload: String,
    ) -> Result<()> {
        let envelope = Envelope::new(
            namespace.as_str(),
            &self.config.sender_id,
            destination,
            payload,
        );
        let frame = envelope.to_frame()?;

        let mut link = self.link.lock().await;
        let Some(active) = link.as_mut() else {
            return Err(Error::unavailable("not connected"));
        };

        trace!(
            "{} -> {} ({}): {}",
            envelope.source_id,
            envelope.destination_id,
            envelope.namespace,
            envelope.payload
        );

        let generation = active.generation;
        let written = match active.writer.write_all(&frame).await {
            Ok(()) => active.writer.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            error!("write failed: {e}");
            *link = None;
            drop(link);

            if self.generation.load(Ordering::Acquire) == generation {
                self.abort_reader();
                self.invalidate("write failed");
            }
            return Err(e.into());
        }

        Ok(())
    }

    /// Sends `request` and, if it carries a request id, waits for the
    /// correlated reply. Fire-and-forget requests yield `Value::Null`.
    pub(crate) async fn send(
        &self,
        namespace: Namespace,
        destination: &str,
        request: &Request,
    ) -> Result<Value> {
        let payload = request.to_payload()?;
        let waiter = request
            .request_id()
            .map(|request_id| (request_id, self.state().pending.register(request_id)));

        if let Err(e) = self.write_frame(namespace, destination, payload).await {
            if let Some((request_id, _)) = waiter {
                self.state().pending.unregister(request_id);
            }
            return Err(e);
        }

        let Some((request_id, waiter)) = waiter else {
            return Ok(Value::Null);
        };

        let reply = match self.config.send_timeout {
            Some(timeout) => {
                if let Ok(reply) = tokio::time::timeout(timeout, waiter).await {
                    reply
                } else {
                    self.state().pending.unregister(request_id);
                    return Err(Error::deadline_exceeded(format!(
                        "no reply to request {request_id} within {timeout:?}"
                    )));
                }
            }
            None => waiter.await,
        };

        reply.map_err(|_| Error::aborted(format!("request {request_id} abandoned")))?
    }

    /// Forgets the session and releases every waiter.
    pub(crate) fn invalidate(&self, reason: &str) {
        let mut state = self.state();
        if state.session.take().is_some() {
            debug!("session invalidated: {reason}");
        }
        state.pending.release_all(reason);
    }

    /// Called by the reader of connection `generation` when it stops.
    pub(crate) async fn reader_exited(&self, generation: u64, reason: &str) {
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }

        {
            let mut link = self.link.lock().await;
            if link.as_ref().is_some_and(|link| link.generation == generation) {
                *link = None;
            }
        }
        self.invalidate(reason);
    }

    fn abort_reader(&self) {
        if let Some(handle) = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            handle.abort();
        }
    }
}

impl Client {
    /// Connects to the device described by `config` over TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be reached.
    pub async fn connect(config: Config) -> Result<Self> {
        let connector = TlsConnector::new(&config)?;
        Self::with_connector(config, connector).await
    }

    /// Connects through `connector`, which is also used for reconnecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the first connection cannot be opened.
    pub async fn with_connector<C>(config: Config, connector: C) -> Result<Self>
    where
        C: Connector,
    {
        let shared = Arc::new(Shared::new(config, Box::new(connector)));
        shared.connect().await?;

        Ok(Self {
            handle: Arc::new(Handle { shared }),
        })
    }

    fn shared(&self) -> &Arc<Shared> {
        &self.handle.shared
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared().config
    }

    /// Negotiates an application session, unless one is established.
    ///
    /// Returns `false` if negotiation failed; the reason is logged.
    pub async fn init(&self) -> bool {
        match self.negotiate().await {
            Ok(_) => true,
            Err(e) => {
                error!("session negotiation failed: {e}");
                false
            }
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.shared().state().session.is_some()
    }

    /// The negotiated session, if any.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.shared().state().session.clone()
    }

    async fn ensure_session(&self) -> Result<Session> {
        let session = self.shared().state().session.clone();
        match session {
            Some(session) => Ok(session),
            None => self.negotiate().await,
        }
    }

    async fn negotiate(&self) -> Result<Session> {
        let shared = self.shared();
        let _negotiating = shared.negotiation.lock().await;

        // Someone else may have negotiated while we queued.
        let established = shared.state().session.clone();
        if let Some(session) = established {
            return Ok(session);
        }

        if shared.is_closing() {
            return Err(Error::cancelled("client is closed"));
        }

        shared.state().pending.release_all("renegotiating session");

        let receiver = shared.config.receiver_id.as_str();
        let mut retried = false;
        loop {
            if !shared.is_connected().await {
                info!("reconnecting");
                shared.connect().await?;
            }

            match shared
                .send(Namespace::Connection, receiver, &Request::connect())
                .await
            {
                Ok(_) => break,
                Err(e) if !retried => {
                    warn!("connect to {receiver} failed, retrying: {e}");
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        }

        let app_id = shared.config.app_id.as_str();
        let reply = shared
            .send(
                Namespace::Receiver,
                receiver,
                &Request::GetStatus {
                    request_id: shared.next_request_id(),
                },
            )
            .await?;
        let mut status = ReceiverStatusMessage::from_value(&reply)?;

        if session::is_running(&status, app_id) {
            debug!("{app_id} already running");
        } else {
            info!("launching {app_id}");
            let reply = shared
                .send(
                    Namespace::Receiver,
                    receiver,
                    &Request::Launch {
                        request_id: shared.next_request_id(),
                        app_id: app_id.to_owned(),
                    },
                )
                .await?;
            status = ReceiverStatusMessage::from_value(&reply)?;
        }

        if let Some(volume) = status.status.volume {
            shared.state().volume = volume;
        }

        let session = Session::from_status(&status)?;
        shared
            .send(
                Namespace::Connection,
                &session.transport_id,
                &Request::connect(),
            )
            .await?;

        info!(
            "session {} established on {}",
            session.session_id, session.transport_id
        );
        shared.state().session = Some(session.clone());
        Ok(session)
    }

    /// Loads `url` into the media application and starts playback.
    ///
    /// `uuid` identifies the content in later status notifications. A
    /// subtitle track is announced at the same location, with a leading
    /// `stream` path segment replaced by `subs`.
    ///
    /// Returns `true` if the device reports buffering or playing.
    pub async fn load(&self, url: &str, title: &str, uuid: &str) -> bool {
        let result: Result<Option<PlayerState>> = async {
            let content = Url::parse(url)?;
            let session = self.ensure_session().await?;
            let shared = self.shared();
            let subtitles = shared.state().subtitles;

            let request = Request::Load {
                request_id: shared.next_request_id(),
                session_id: session.session_id.clone(),
                media: MediaInformation {
                    content_id: url.to_owned(),
                    stream_type: STREAM_TYPE.to_owned(),
                    content_type: shared.config.content_type.clone(),
                    metadata: Metadata {
                        title: title.to_owned(),
                    },
                    custom_data: CustomData {
                        uuid: Some(uuid.to_owned()),
                    },
                    tracks: subtitle_url(&content)
                        .map(Track::subtitles)
                        .into_iter()
                        .collect(),
                    text_track_style: Some(TextTrackStyle::default()),
                },
                active_track_ids: subtitles.then(|| vec![SUBTITLE_TRACK_ID]),
                autoplay: true,
                current_time: 0.0,
            };

            let reply = shared
                .send(Namespace::Media, &session.transport_id, &request)
                .await?;
            Ok(messages::player_state(&reply))
        }
        .await;

        acknowledged("load", result, PlayerState::is_active)
    }

    /// Returns `true` if the device reports buffering or playing.
    pub async fn play(&self) -> bool {
        self.media_command(
            "play",
            |request_id, media_session_id| Request::Play {
                request_id,
                media_session_id,
            },
            PlayerState::is_active,
        )
        .await
    }

    /// Returns `true` if the device reports paused.
    pub async fn pause(&self) -> bool {
        self.media_command(
            "pause",
            |request_id, media_session_id| Request::Pause {
                request_id,
                media_session_id,
            },
            |state| *state == PlayerState::Paused,
        )
        .await
    }

    /// Returns `true` if the device reports idle.
    pub async fn stop(&self) -> bool {
        self.media_command(
            "stop",
            |request_id, media_session_id| Request::Stop {
                request_id,
                media_session_id,
            },
            |state| *state == PlayerState::Idle,
        )
        .await
    }

    /// Enables or disables the subtitle track of the loaded content.
    ///
    /// Returns `true` once the device answers with a media status.
    pub async fn set_subtitles(&self, enabled: bool) -> bool {
        self.media_command(
            "subtitles",
            |request_id, media_session_id| Request::EditTracksInfo {
                request_id,
                media_session_id,
                active_track_ids: if enabled {
                    vec![SUBTITLE_TRACK_ID]
                } else {
                    vec![]
                },
            },
            |_| true,
        )
        .await
    }

    /// Whether content loaded from now on starts with subtitles enabled.
    pub fn set_subtitle_preference(&self, enabled: bool) {
        self.shared().state().subtitles = enabled;
    }

    /// Asks the media application for its status, which updates the
    /// tracked media state like any other status message.
    ///
    /// Returns `true` once the device answers with a media status.
    pub async fn refresh(&self) -> bool {
        let result: Result<Value> = async {
            let session = self.ensure_session().await?;
            let shared = self.shared();
            let request = Request::GetStatus {
                request_id: shared.next_request_id(),
            };
            shared
                .send(Namespace::Media, &session.transport_id, &request)
                .await
        }
        .await;

        match result {
            Ok(reply) if messages::message_type(&reply) == Some(messages::MEDIA_STATUS) => true,
            Ok(_) => {
                warn!("refresh: reply carries no media status");
                false
            }
            Err(e) => {
                error!("refresh failed: {e}");
                false
            }
        }
    }

    async fn media_command<F, A>(&self, command: &str, build: F, accept: A) -> bool
    where
        F: FnOnce(u32, u64) -> Request,
        A: Fn(&PlayerState) -> bool,
    {
        let result: Result<Option<PlayerState>> = async {
            let session = self.ensure_session().await?;
            let shared = self.shared();
            let media_session_id = shared
                .state()
                .media
                .media_session_id
                .ok_or_else(|| Error::failed_precondition("no media loaded"))?;

            let request = build(shared.next_request_id(), media_session_id);
            let reply = shared
                .send(Namespace::Media, &session.transport_id, &request)
                .await?;
            Ok(messages::player_state(&reply))
        }
        .await;

        acknowledged(command, result, accept)
    }

    /// Sets the receiver volume, from 0.0 to 1.0.
    ///
    /// Returns `true` if the device reports the new level.
    pub async fn set_volume(&self, level: f64) -> bool {
        let result: Result<Volume> = async {
            if !(0.0..=1.0).contains(&level) {
                return Err(Error::out_of_range(format!(
                    "volume {level} not in 0.0..=1.0"
                )));
            }

            self.receiver_command(|request_id| Request::SetVolume {
                request_id,
                volume: Volume {
                    level: Some(level),
                    muted: None,
                },
            })
            .await
        }
        .await;

        match result {
            Ok(volume) if volume.level.is_some_and(|now| (now - level).abs() < 0.01) => true,
            Ok(volume) => {
                warn!("volume: device reports {:?}", volume.level);
                false
            }
            Err(e) => {
                error!("volume failed: {e}");
                false
            }
        }
    }

    /// Returns `true` if the device reports the new mute state.
    pub async fn set_muted(&self, muted: bool) -> bool {
        let result = self
            .receiver_command(|request_id| Request::SetVolume {
                request_id,
                volume: Volume {
                    level: None,
                    muted: Some(muted),
                },
            })
            .await;

        match result {
            Ok(volume) if volume.muted == Some(muted) => true,
            Ok(volume) => {
                warn!("mute: device reports {:?}", volume.muted);
                false
            }
            Err(e) => {
                error!("mute failed: {e}");
                false
            }
        }
    }

    async fn receiver_command<F>(&self, build: F) -> Result<Volume>
    where
        F: FnOnce(u32) -> Request,
    {
        self.ensure_session().await?;
        let shared = self.shared();
        let request = build(shared.next_request_id());
        let reply = shared
            .send(Namespace::Receiver, &shared.config.receiver_id, &request)
            .await?;

        ReceiverStatusMessage::from_value(&reply)?
            .status
            .volume
            .ok_or_else(|| Error::data_loss("reply carries no volume"))
    }

    /// Last reported volume level.
    #[must_use]
    pub fn volume(&self) -> Option<f64> {
        self.shared().state().volume.level
    }

    /// Last reported mute state.
    #[must_use]
    pub fn muted(&self) -> Option<bool> {
        self.shared().state().volume.muted
    }

    /// Uuid of the content currently loaded, if any.
    #[must_use]
    pub fn uuid(&self) -> Option<String> {
        self.shared().state().media.uuid.clone()
    }

    /// Last reported player state, `None` before any media status arrived.
    #[must_use]
    pub fn player_state(&self) -> Option<PlayerState> {
        self.shared().state().media.player_state.clone()
    }

    /// Estimated playback position in seconds.
    #[must_use]
    pub fn player_current_time(&self) -> f64 {
        self.shared().state().media.position(Instant::now())
    }

    #[must_use]
    pub fn has_subtitles(&self) -> bool {
        self.shared().state().media.has_subtitles()
    }

    /// Snapshot of the tracked media status.
    #[must_use]
    pub fn media_status(&self) -> MediaStatus {
        self.shared().state().media.clone()
    }

    /// Local address of the connection, which is how the device reaches
    /// this host. Useful for serving content to it.
    #[must_use]
    pub fn local_address(&self) -> Option<IpAddr> {
        self.shared().state().local_address
    }

    /// Installs the observer notified on every media status.
    ///
    /// The callback runs on the reader task: it must not block, and must
    /// not wait on commands of this client.
    pub fn set_media_status_callback<F>(&self, callback: F)
    where
        F: Fn(&MediaEvent) + Send + Sync + 'static,
    {
        *self
            .shared()
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    /// Closes the session and the connection, and waits for the reader to
    /// stop. Pending commands fail.
    pub async fn close(&self) {
        let shared = self.shared();
        shared.closing.store(true, Ordering::Release);

        let session = shared.state().session.take();
        if let Some(session) = session {
            if let Err(e) = shared
                .send(Namespace::Connection, &session.transport_id, &Request::Close)
                .await
            {
                debug!("could not close virtual connection: {e}");
            }
        }

        let link = shared.link.lock().await.take();
        if let Some(mut link) = link {
            if let Err(e) = link.writer.shutdown().await {
                debug!("shutdown failed: {e}");
            }
        }

        let reader = shared
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut reader) = reader {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut reader).await.is_err() {
                debug!("device did not close the connection, stopping reader");
                reader.abort();
                let _ = reader.await;
            }
        }

        shared.invalidate("client closed");
        info!("closed");
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared().state();
        f.debug_struct("Client")
            .field("address", &self.shared().config.address)
            .field("session", &state.session)
            .field("player_state", &state.media.player_state)
            .finish_non_exhaustive()
    }
}

/// Maps the outcome of a command to success, logging failures.
fn acknowledged<A>(command: &str, result: Result<Option<PlayerState>>, accept: A) -> bool
where
    A: Fn(&PlayerState) -> bool,
{
    match result {
        Ok(Some(state)) if accept(&state) => {
            debug!("{command}: {state}");
            true
        }
        Ok(Some(state)) => {
            warn!("{command}: device reports {state}");
            false
        }
        Ok(None) => {
            warn!("{command}: reply carries no media status");
            false
        }
        Err(e) => {
            error!("{command} failed: {e}");
            false
        }
    }
}

/// Location of the subtitles for content served under `/stream/`.
fn subtitle_url(content: &Url) -> Option<String> {
    let rest = content.path().strip_prefix("/stream/")?;
    let mut subtitles = content.clone();
    subtitles.set_path(&format!("/subs/{rest}"));
    Some(subtitles.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtitles_are_served_next_to_the_stream() {
        let content = Url::parse("http://192.168.1.10:8080/stream/abc?t=1").unwrap();
        assert_eq!(
            subtitle_url(&content).as_deref(),
            Some("http://192.168.1.10:8080/subs/abc?t=1")
        );

        let elsewhere = Url::parse("http://192.168.1.10:8080/video/abc").unwrap();
        assert_eq!(subtitle_url(&elsewhere), None);
    }

    #[test]
    fn acknowledgement_depends_on_the_reported_state() {
        assert!(acknowledged(
            "play",
            Ok(Some(PlayerState::Buffering)),
            PlayerState::is_active
        ));
        assert!(!acknowledged(
            "stop",
            Ok(Some(PlayerState::Playing)),
            |state| *state == PlayerState::Idle
        ));
        assert!(!acknowledged("pause", Ok(None), |_| true));
        assert!(!acknowledged(
            "pause",
            Err(Error::unavailable("not connected")),
            |_| true
        ));
    }
}
