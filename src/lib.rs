//! Client for media receiver devices speaking the Cast v2 protocol.
//!
//! The [`remote::Client`] connects to a device over TLS, negotiates a
//! session with its media receiver application, and exposes load and
//! transport commands plus the media state the device reports.
//!
//! Layering, from the wire up:
//!
//! * [`transport`]: TCP and TLS connection to the device
//! * [`protocol`]: length-prefixed envelopes and their JSON payloads
//! * [`correlator`]: matching replies to requests by request id
//! * [`reader`]: the task consuming each connection
//! * [`media`]: media state derived from status messages
//! * [`remote`]: sessions and the public command surface
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod config;
pub mod correlator;
pub mod error;
pub mod events;
pub mod media;
pub mod protocol;
pub mod reader;
pub mod remote;
pub mod session;
pub mod signal;
pub mod transport;
