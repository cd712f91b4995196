use std::io;

use thiserror::Error;

/// List of possible errors surfaced by the client.
///
/// No operation retries on failure; every error is reported to the caller.
/// [`ClientError::MalformedResponse`] is fatal to the connection: the stream
/// is desynchronized and the socket has already been torn down by the time
/// the error is returned.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Configuration(String),

    #[error("Connection is already open.")]
    AlreadyConnected,

    #[error("Connection not open")]
    NotConnected,

    #[error("malformed server response: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Server(String),

    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),

    #[error("Integrity check failed, {0}")]
    Integrity(String),

    #[error("failed to encode object: {0}")]
    Serialization(String),

    #[error("failed to decode payload: {0}")]
    Deserialization(String),

    #[error("encryption failure: {0}")]
    Cipher(String),

    #[error("Unable to read all the bytes from server. Check client server connectivity.")]
    Connectivity,
}
