use std::{
    io::{Read, Write},
    net::{Shutdown, TcpStream},
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use log::{debug, warn};
use socket2::SockRef;

use super::{
    cipher::{CipherLayer, DEFAULT_PASSPHRASE},
    frame::{self, MIN_CACHE_RESPONSE, SUCCESS_SENTINEL},
};
use crate::error::ClientError;

/// Socket read chunk for command responses.
const READ_CHUNK: usize = 8192;
/// Smaller chunk used only during the authentication handshake.
const AUTH_READ_CHUNK: usize = 256;

/// Protocol version reported by this client.
pub const CLIENT_VERSION: &str = "2.0.0.0";

/// Lifecycle of a connection.
///
/// `Sent` and `Wait` are transient: a command flips the state to `Sent`
/// after the request is written, `Wait` while bytes are being read, and
/// back to `Open` once the message terminator is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    Open,
    #[default]
    Close,
    Sent,
    Wait,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Open => "Open",
            ConnectionState::Close => "Close",
            ConnectionState::Sent => "Sent",
            ConnectionState::Wait => "Wait",
        };
        write!(f, "{s}")
    }
}

/// Format the server should use for database response payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    None,
    #[default]
    Binary,
    Xml,
    Json,
}

impl ResponseFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::None => "None",
            ResponseFormat::Binary => "Binary",
            ResponseFormat::Xml => "XML",
            ResponseFormat::Json => "JSON",
        }
    }
}

/// One session with the server over a single TCP socket.
///
/// Session options are plain public fields, set before [`Connection::open`].
/// Command dispatch takes `&self`: the socket lives behind a mutex that
/// serializes one full request/response cycle at a time, so a `Connection`
/// can be shared across threads (e.g. in an `Arc`) and concurrent commands
/// queue strictly one after another. The protocol carries no correlation id;
/// a response always belongs to the most recently written request.
#[derive(Debug)]
pub struct Connection {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,

    /// Explicit connection string; wins over the composed session options
    /// when it contains an `=`.
    pub connection_string: String,
    pub database_name: String,
    pub read_cache: bool,
    pub do_not_cache_results: bool,
    pub multiple_active_result_sets: bool,
    pub extended_result_sets: bool,

    /// Default cache collection when a cache call does not name one.
    pub cache_collection: String,
    /// Default expiry for put-like cache calls, e.g. "1 Day".
    pub cache_expires_in: String,

    pub response_format: ResponseFormat,

    /// Applied to the socket on open. `None` preserves the historical
    /// behavior of blocking indefinitely on a response that never
    /// terminates.
    pub read_timeout: Option<Duration>,

    cipher: CipherLayer,
    stream: Mutex<Option<TcpStream>>,
    state: Mutex<ConnectionState>,
    authenticated: AtomicBool,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: 0,
            username: String::new(),
            password: String::new(),
            connection_string: String::new(),
            database_name: String::new(),
            read_cache: true,
            do_not_cache_results: false,
            multiple_active_result_sets: false,
            extended_result_sets: false,
            cache_collection: String::new(),
            cache_expires_in: String::new(),
            response_format: ResponseFormat::Binary,
            read_timeout: None,
            cipher: CipherLayer::disabled(),
            stream: Mutex::new(None),
            state: Mutex::new(ConnectionState::Close),
            authenticated: AtomicBool::new(false),
        }
    }
}

impl Connection {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        let mut conn = Self::default();
        conn.username = username.into();
        conn.password = password.into();
        conn
    }

    /// Encrypt all traffic with the stock shared secret.
    pub fn enable_encryption(&mut self) {
        self.cipher = CipherLayer::from_passphrase(DEFAULT_PASSPHRASE);
    }

    /// Encrypt all traffic with a deployment-specific shared secret. The
    /// server must derive its key from the same passphrase.
    pub fn enable_encryption_with_secret(&mut self, passphrase: &str) {
        self.cipher = CipherLayer::from_passphrase(passphrase);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Connects and authenticates. The connection must be open before any
    /// command can be sent.
    pub fn open(&self) -> Result<(), ClientError> {
        if self.server.trim().is_empty() {
            return Err(ClientError::Configuration(
                "Property Server must be set either with ip or name of server.".into(),
            ));
        }
        if self.port < 1 {
            return Err(ClientError::Configuration(
                "Property Port must be set.".into(),
            ));
        }
        if self.username.trim().is_empty() {
            return Err(ClientError::Configuration("Username is required.".into()));
        }
        if self.password.trim().is_empty() {
            return Err(ClientError::Configuration("Password is required.".into()));
        }
        if self.stream.lock().unwrap().is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let stream = TcpStream::connect((self.server.as_str(), self.port))?;
        // Small request/response frames are latency sensitive.
        SockRef::from(&stream).set_keepalive(true)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.read_timeout)?;

        *self.stream.lock().unwrap() = Some(stream);
        self.set_state(ConnectionState::Open);

        self.authenticate()
    }

    /// Closes the connection. A "Close()" notice is sent on a best-effort
    /// basis; the socket is torn down regardless of the outcome.
    pub fn close(&self) {
        let connected = self.stream.lock().unwrap().is_some();
        if connected {
            if let Err(e) = self.send(b"Close()") {
                debug!("close notice not delivered: {e}");
            }
        }

        if let Some(stream) = self.stream.lock().unwrap().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.set_state(ConnectionState::Close);
    }

    fn authenticate(&self) -> Result<(), ClientError> {
        match self.run_auth_handshake() {
            Ok(status) if status == SUCCESS_SENTINEL => {
                self.authenticated.store(true, Ordering::SeqCst);
                Ok(())
            }
            Ok(status) => {
                self.authenticated.store(false, Ordering::SeqCst);
                self.close();
                Err(ClientError::Server(status))
            }
            Err(e) => {
                self.authenticated.store(false, Ordering::SeqCst);
                self.close();
                Err(e)
            }
        }
    }

    /// Sends the authentication frame and reassembles the response, reading
    /// in 256-byte chunks. Returns the status text from the response header.
    fn run_auth_handshake(&self) -> Result<String, ClientError> {
        let request = self
            .cipher
            .encrypt(&frame::build_auth_request(&self.username, &self.password));

        let mut guard = self.stream.lock().unwrap();
        let stream = guard.as_mut().ok_or(ClientError::NotConnected)?;
        stream.write_all(&request)?;

        let mut raw: Vec<u8> = Vec::new();
        let mut plain: Vec<u8> = Vec::new();
        loop {
            let mut chunk = [0u8; AUTH_READ_CHUNK];
            let read = stream.read(&mut chunk)?;
            // Every auth read carries at least a full minimum response;
            // anything shorter means the stream is unusable.
            if read < MIN_CACHE_RESPONSE {
                return Err(ClientError::MalformedResponse(
                    "Server sent an invalid response, check server services.".into(),
                ));
            }
            raw.extend_from_slice(&chunk[..read]);

            match self.cipher.decrypt(&raw) {
                Ok(p) => plain = p,
                // Ciphertext blocks still in flight.
                Err(_) => continue,
            }
            if frame::message_complete(&plain) {
                break;
            }
        }

        let response = frame::parse_response(&plain, MIN_CACHE_RESPONSE)?;
        if response.fields.len() <= 2 {
            return Ok("Login Error, invalid response from server.".into());
        }
        // An echoed command other than "Authenticate" or a format tag other
        // than "Binary" is tolerated; the status text is surfaced either way.
        Ok(response.status().to_string())
    }

    /// One full request/response cycle: write the frame, then reassemble the
    /// response until the message terminator appears or the stream ends.
    ///
    /// Write failures propagate. Read failures are logged and produce an
    /// empty response; a response missing the end-of-header marker yields
    /// `None`. Both quirks match long-standing client behavior that callers
    /// depend on.
    pub(crate) fn send(&self, request: &[u8]) -> Result<Option<Vec<u8>>, ClientError> {
        let mut guard = self.stream.lock().unwrap();
        let stream = guard.as_mut().ok_or(ClientError::NotConnected)?;

        let encrypted = self.cipher.encrypt(request);
        stream.write_all(&encrypted)?;
        self.set_state(ConnectionState::Sent);

        let mut raw: Vec<u8> = Vec::new();
        let mut plain: Vec<u8> = Vec::new();
        loop {
            self.set_state(ConnectionState::Wait);
            let mut chunk = [0u8; READ_CHUNK];
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => {
                    raw.extend_from_slice(&chunk[..read]);
                    match self.cipher.decrypt(&raw) {
                        Ok(p) => plain = p,
                        Err(_) => continue,
                    }
                    if frame::message_complete(&plain) {
                        break;
                    }
                }
                Err(e) => {
                    warn!("read failed while awaiting response: {e}");
                    break;
                }
            }
        }
        self.set_state(ConnectionState::Open);

        if frame::find_subslice(&plain, frame::END_OF_HEADER.as_bytes()).is_some() {
            Ok(Some(plain))
        } else {
            Ok(None)
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.stream.get_mut().unwrap().is_some() {
            self.close();
        }
    }
}
