//! Database command dispatch.
//!
//! This module defines the [`DatabaseCommand`] set, the generic dispatch
//! path on [`Connection`], and the higher-level [`SqlCommand`] wrapper that
//! builds command bodies out of SQL text and parameters.
//!
//! # Overview
//!
//! A database request carries five header fields (username, password,
//! response format, command name, connection string) followed by the
//! command body: UTF-8 SQL text terminated by the line delimiter, then each
//! parameter value terminated the same way. The response is classified by
//! its format tag: binary payloads decode into [`ResultSet`] arrays, XML
//! and JSON payloads are returned as text.
//!
//! # Example
//! ```no_run
//! use sqldb_client::{Connection, SqlCommand};
//!
//! let mut conn = Connection::new("admin", "password");
//! conn.server = "localhost".into();
//! conn.port = 5000;
//! conn.database_name = "inventory".into();
//! conn.open()?;
//!
//! let mut cmd = SqlCommand::new(&conn);
//! cmd.command_text = "CREATE TABLE t (id INTEGER);".into();
//! let results = cmd.execute_non_query()?;
//! conn.close();
//! # Ok::<(), sqldb_client::ClientError>(())
//! ```

use log::warn;

use crate::{
    error::ClientError,
    protocol::{
        Connection, ConnectionState, ResponseFormat,
        frame::{self, END_OF_LINE, MIN_DATABASE_RESPONSE},
    },
    resultset::ResultSet,
    serialize,
};

/// The fixed set of database commands the server accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseCommand {
    ExecuteNonQuery,
    ExecuteScalar,
    ExecuteReader,
}

impl DatabaseCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseCommand::ExecuteNonQuery => "ExecuteNonQuery",
            DatabaseCommand::ExecuteScalar => "ExecuteScalar",
            DatabaseCommand::ExecuteReader => "ExecuteReader",
        }
    }
}

/// Typed outcome of a database command, keyed by the response format the
/// server declared in the frame header.
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseResponse {
    ResultSets(Vec<ResultSet>),
    Xml(String),
    Json(String),
    /// Success with an unrecognized format tag; the payload is dropped.
    Empty,
}

impl Connection {
    /// Sends one database command and decodes the response.
    ///
    /// `body` is the raw command region: SQL text plus delimited parameter
    /// values. A transport-level write failure is folded into the generic
    /// connectivity error, matching how callers have always seen it; a
    /// server-reported error keeps the connection usable.
    pub fn execute_database_command(
        &self,
        command: DatabaseCommand,
        format: ResponseFormat,
        body: &[u8],
    ) -> Result<DatabaseResponse, ClientError> {
        if self.state() != ConnectionState::Open {
            return Err(ClientError::Configuration("Connection is not open.".into()));
        }
        if format == ResponseFormat::None {
            return Err(ClientError::Configuration(
                "Response Format property must be set.".into(),
            ));
        }

        let connection_string = self.effective_connection_string()?;
        let request = frame::build_request(
            &[
                &self.username,
                &self.password,
                format.as_str(),
                command.as_str(),
                &connection_string,
            ],
            body,
        );

        let response = match self.send(&request) {
            Ok(r) => r,
            Err(ClientError::Io(e)) => {
                warn!("database command write failed: {e}");
                None
            }
            Err(e) => return Err(e),
        };

        let Some(buf) = response else {
            return Err(ClientError::Connectivity);
        };
        if buf.len() < MIN_DATABASE_RESPONSE {
            return Err(ClientError::Connectivity);
        }

        let parsed = frame::parse_response(&buf, MIN_DATABASE_RESPONSE)?;
        if let Some(message) = parsed.server_error() {
            return Err(ClientError::Server(message));
        }

        match parsed.format_tag().trim().to_lowercase().as_str() {
            // A garbled binary payload decodes to an empty array rather
            // than failing the call.
            "binary" => Ok(DatabaseResponse::ResultSets(
                serialize::from_bytes_or_default(parsed.payload),
            )),
            "xml" => Ok(DatabaseResponse::Xml(
                String::from_utf8_lossy(parsed.payload).into_owned(),
            )),
            "json" => Ok(DatabaseResponse::Json(
                String::from_utf8_lossy(parsed.payload).into_owned(),
            )),
            _ => Ok(DatabaseResponse::Empty),
        }
    }

    /// The connection string sent with every database command.
    ///
    /// An explicit `connection_string` containing `=` wins; otherwise one is
    /// composed from the session options, with the flags only present when
    /// they differ from the server defaults.
    pub(crate) fn effective_connection_string(&self) -> Result<String, ClientError> {
        if !self.connection_string.trim().is_empty() && self.connection_string.contains('=') {
            return Ok(self.connection_string.clone());
        }

        if self.database_name.trim().is_empty() {
            return Err(ClientError::Configuration(
                "Database name is required.".into(),
            ));
        }

        let mut out = format!("Database = {};", self.database_name);
        if !self.read_cache {
            out.push_str("ReadCache = false;");
        }
        if self.do_not_cache_results {
            out.push_str("DoNotCacheResults = true;");
        }
        if self.multiple_active_result_sets {
            out.push_str("MultipleActiveResultSets = true;");
        }
        if self.extended_result_sets {
            out.push_str("ExtendedResultSets = true;");
        }
        Ok(out)
    }
}

/// A parameter value attached to a [`SqlCommand`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Text(String),
    Integer(i64),
    Real(f64),
    /// Sent as-is, without text conversion.
    Bytes(Vec<u8>),
}

impl ParameterValue {
    fn wire_bytes(&self) -> Vec<u8> {
        match self {
            ParameterValue::Text(s) => s.as_bytes().to_vec(),
            ParameterValue::Integer(i) => i.to_string().into_bytes(),
            ParameterValue::Real(r) => r.to_string().into_bytes(),
            ParameterValue::Bytes(b) => b.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlParameter {
    pub name: String,
    pub value: ParameterValue,
}

impl SqlParameter {
    pub fn new(name: impl Into<String>, value: ParameterValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Builds and executes SQL statements against an open [`Connection`].
///
/// Parameter values are positional on the wire: the body carries the SQL
/// text, then each value, in the order the parameters were added.
#[derive(Debug)]
pub struct SqlCommand<'a> {
    connection: &'a Connection,
    pub command_text: String,
    pub parameters: Vec<SqlParameter>,
}

impl<'a> SqlCommand<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        Self {
            connection,
            command_text: String::new(),
            parameters: Vec::new(),
        }
    }

    fn check_open(&self) -> Result<(), ClientError> {
        if self.connection.state() != ConnectionState::Open {
            return Err(ClientError::Configuration(
                "Connection must be open before command can be executed.".into(),
            ));
        }
        Ok(())
    }

    /// The raw body region: SQL text and parameter values, each terminated
    /// by the line delimiter.
    fn command_bytes(&self) -> Result<Vec<u8>, ClientError> {
        if self.command_text.trim().is_empty() {
            return Err(ClientError::Configuration(
                "CommandText property must be set with valid sql command before command can be executed.".into(),
            ));
        }

        let mut out = Vec::new();
        out.extend_from_slice(self.command_text.as_bytes());
        out.extend_from_slice(END_OF_LINE.as_bytes());
        for parameter in &self.parameters {
            out.extend_from_slice(&parameter.value.wire_bytes());
            out.extend_from_slice(END_OF_LINE.as_bytes());
        }
        Ok(out)
    }

    fn execute(
        &self,
        command: DatabaseCommand,
        format: ResponseFormat,
    ) -> Result<DatabaseResponse, ClientError> {
        self.check_open()?;
        let body = self.command_bytes()?;
        self.connection
            .execute_database_command(command, format, &body)
    }

    fn execute_binary(&self, command: DatabaseCommand) -> Result<Vec<ResultSet>, ClientError> {
        match self.execute(command, ResponseFormat::Binary)? {
            DatabaseResponse::ResultSets(sets) => Ok(sets),
            _ => Ok(Vec::new()),
        }
    }

    fn execute_xml(&self, command: DatabaseCommand) -> Result<String, ClientError> {
        match self.execute(command, ResponseFormat::Xml)? {
            DatabaseResponse::Xml(xml) => Ok(xml),
            _ => Ok(String::new()),
        }
    }

    fn execute_json(&self, command: DatabaseCommand) -> Result<String, ClientError> {
        match self.execute(command, ResponseFormat::Json)? {
            DatabaseResponse::Json(json) => Ok(json),
            _ => Ok(String::new()),
        }
    }

    /// Insert, update, delete and DDL statements.
    pub fn execute_non_query(&self) -> Result<Vec<ResultSet>, ClientError> {
        self.execute_binary(DatabaseCommand::ExecuteNonQuery)
    }

    pub fn execute_non_query_xml(&self) -> Result<String, ClientError> {
        self.execute_xml(DatabaseCommand::ExecuteNonQuery)
    }

    pub fn execute_non_query_json(&self) -> Result<String, ClientError> {
        self.execute_json(DatabaseCommand::ExecuteNonQuery)
    }

    /// Queries returning a single row and column.
    pub fn execute_scalar(&self) -> Result<Vec<ResultSet>, ClientError> {
        self.execute_binary(DatabaseCommand::ExecuteScalar)
    }

    pub fn execute_scalar_xml(&self) -> Result<String, ClientError> {
        self.execute_xml(DatabaseCommand::ExecuteScalar)
    }

    pub fn execute_scalar_json(&self) -> Result<String, ClientError> {
        self.execute_json(DatabaseCommand::ExecuteScalar)
    }

    /// Row-returning queries; one result set per batched statement.
    pub fn execute_reader(&self) -> Result<Vec<ResultSet>, ClientError> {
        self.execute_binary(DatabaseCommand::ExecuteReader)
    }

    pub fn execute_reader_xml(&self) -> Result<String, ClientError> {
        self.execute_xml(DatabaseCommand::ExecuteReader)
    }

    pub fn execute_reader_json(&self) -> Result<String, ClientError> {
        self.execute_json(DatabaseCommand::ExecuteReader)
    }
}
