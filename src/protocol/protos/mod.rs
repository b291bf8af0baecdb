//! Protocol Buffer definition of the envelope framed on the wire.
//!
//! The Rust code is generated during build from `cast_channel.proto` by
//! `protobuf-codegen` (see `build.rs`). Only the `CastMessage` envelope is
//! defined; device authentication messages are not used by this client.

// Allow pedantic lints in generated code
#![allow(clippy::pedantic)]

// Include the generated Rust code from Protocol Buffers
include!(concat!(env!("OUT_DIR"), "/protos/mod.rs"));
