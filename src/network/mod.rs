//! TCP stream transport for canonical PCM
//!
//! The wire format is a continuous, unframed byte stream: 1920-byte frames
//! back-to-back, no length prefix, no header, no delimiter. [`transport`]
//! writes it and [`client`] reads it in exact frame-sized units; the two
//! are the matched halves of one protocol and change together or not at
//! all.

pub mod client;
pub mod transport;

pub use client::{ConnectionState, StreamClient};
pub use transport::{StreamTransport, TransportState};
