//! Client-server communication protocol.
//!
//! This module implements the wire protocol spoken with the database and
//! cache server: message framing, the optional encryption layer, and the
//! connection that drives a full request/response cycle over TCP.
//!
//! # Overview
//!
//! Requests and responses are delimited byte streams rather than
//! length-prefixed frames. Fields within a message are separated by a
//! sentinel line delimiter, the response header is separated from its
//! payload by an end-of-header sentinel, and every message ends with an
//! end-of-message sentinel. Because TCP delivers arbitrary chunk sizes, the
//! connection reassembles reads until the terminator appears.
//!
//! # Key Components
//!
//! - [`frame`]: Sentinel constants, request builders, and response parsing.
//! - [`CipherLayer`]: Optional AES-256-CBC encryption of whole messages,
//!   with keys derived from a shared passphrase.
//! - [`Connection`]: A single authenticated TCP session; serializes
//!   request/response cycles so it can be shared across threads.
//!
//! # Encryption
//!
//! When enabled, the entire request and response byte streams are encrypted.
//! Decryption of a partially received response can fail on a block boundary;
//! the connection treats that as "more bytes in flight" and keeps reading.
pub mod frame;

mod cipher;
mod connection;

pub use cipher::CipherLayer;
pub use connection::{CLIENT_VERSION, Connection, ConnectionState, ResponseFormat};
