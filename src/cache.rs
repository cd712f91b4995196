//! Cache command dispatch.
//!
//! The cache side of the protocol shares the connection, framing and
//! encryption with database commands but uses an eight-field request header
//! (username, password, format, command, collection, cache id, tags,
//! expiry) and always responds in binary format so stored objects come back
//! byte-identical.
//!
//! [`CacheClient`] is the high-level surface: typed operations name their
//! collection after the cached type, raw operations take an explicit
//! collection name so payloads written by other clients can be exchanged.

use std::any::Any;

use bincode::{Decode, Encode};
use log::warn;

use crate::{
    error::ClientError,
    protocol::{
        Connection, ConnectionState,
        frame::{self, END_OF_LINE, MIN_CACHE_RESPONSE},
    },
    serialize::{self, TypeRegistry},
};

/// The fixed set of cache commands the server accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCommand {
    Get,
    Add,
    Update,
    AddOrUpdate,
    Remove,
    Search,
    CollectionCacheIds,
    CollectionCount,
    CollectionList,
    DropCollection,
}

impl CacheCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCommand::Get => "CacheGet",
            CacheCommand::Add => "CacheAdd",
            CacheCommand::Update => "CacheUpdate",
            CacheCommand::AddOrUpdate => "CacheAddOrUpdate",
            CacheCommand::Remove => "CacheRemove",
            CacheCommand::Search => "CacheSearch",
            CacheCommand::CollectionCacheIds => "CacheCollectionCacheIds",
            CacheCommand::CollectionCount => "CacheCollectionCount",
            CacheCommand::CollectionList => "CacheCollectionList",
            CacheCommand::DropCollection => "CacheDropCollection",
        }
    }
}

/// Units for building cache expiry strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDuration {
    Minutes,
    Hours,
    Days,
    Months,
    Years,
}

impl std::fmt::Display for CacheDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CacheDuration::Minutes => "Minutes",
            CacheDuration::Hours => "Hours",
            CacheDuration::Days => "Days",
            CacheDuration::Months => "Months",
            CacheDuration::Years => "Years",
        };
        write!(f, "{s}")
    }
}

impl Connection {
    fn check_cache_open(&self) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Open {
            return Err(ClientError::Configuration("Connection is not open.".into()));
        }
        Ok(())
    }

    /// Collection precedence: explicit argument, then the session default,
    /// then "Default".
    fn resolve_collection(&self, collection: &str) -> String {
        if !collection.trim().is_empty() {
            collection.to_string()
        } else if !self.cache_collection.trim().is_empty() {
            self.cache_collection.clone()
        } else {
            "Default".to_string()
        }
    }

    fn build_cache_request(
        &self,
        command: CacheCommand,
        collection: &str,
        cache_id: &str,
        tags: &str,
        expires_in: &str,
        payload: &[u8],
    ) -> Vec<u8> {
        let collection = self.resolve_collection(collection);
        frame::build_request(
            &[
                &self.username,
                &self.password,
                // The cache server only responds in binary so the original
                // object bytes round-trip untouched.
                "Binary",
                command.as_str(),
                &collection,
                cache_id,
                tags,
                expires_in,
            ],
            payload,
        )
    }

    /// Cache transport failures of any kind collapse into the generic
    /// connectivity error; only the pre-flight state check propagates as
    /// its own error.
    fn send_cache_request(&self, request: &[u8]) -> Result<Vec<u8>, ClientError> {
        let response = match self.send(request) {
            Ok(r) => r,
            Err(e) => {
                warn!("cache command failed in transport: {e}");
                None
            }
        };

        let Some(buf) = response else {
            return Err(ClientError::Connectivity);
        };
        if buf.len() < MIN_CACHE_RESPONSE {
            return Err(ClientError::Connectivity);
        }
        Ok(buf)
    }

    /// Generic cache command returning the text payload — the echoed cache
    /// id for put-like commands, a count, a list, or a status word.
    ///
    /// An empty expiry defaults to the session's `cache_expires_in`, then
    /// to "1 Day".
    pub fn execute_cache_command(
        &self,
        command: CacheCommand,
        collection: &str,
        cache_id: &str,
        tags: &str,
        expires_in: &str,
        payload: &[u8],
    ) -> Result<String, ClientError> {
        self.check_cache_open()?;

        let expires_in = if !expires_in.trim().is_empty() {
            expires_in.to_string()
        } else if !self.cache_expires_in.trim().is_empty() {
            self.cache_expires_in.clone()
        } else {
            "1 Day".to_string()
        };

        let request =
            self.build_cache_request(command, collection, cache_id, tags, &expires_in, payload);
        let buf = self.send_cache_request(&request)?;

        let parsed = frame::parse_response(&buf, MIN_CACHE_RESPONSE)?;
        if let Some(message) = parsed.server_error() {
            return Err(ClientError::Server(message));
        }
        Ok(String::from_utf8_lossy(parsed.payload).into_owned())
    }

    /// Fetches a cached payload as raw bytes.
    pub fn execute_get_cache_command(
        &self,
        collection: &str,
        cache_id: &str,
        tags: &str,
    ) -> Result<Vec<u8>, ClientError> {
        self.check_cache_open()?;

        let request =
            self.build_cache_request(CacheCommand::Get, collection, cache_id, tags, "", &[]);
        let buf = self.send_cache_request(&request)?;

        let parsed = frame::parse_response(&buf, MIN_CACHE_RESPONSE)?;
        if let Some(message) = parsed.server_error() {
            return Err(ClientError::Server(message));
        }
        Ok(parsed.payload.to_vec())
    }

    /// Removes one cached object. Success is signalled by the payload text,
    /// not the status field.
    pub fn execute_remove_cache_command(
        &self,
        collection: &str,
        cache_id: &str,
    ) -> Result<bool, ClientError> {
        self.check_cache_open()?;

        let request =
            self.build_cache_request(CacheCommand::Remove, collection, cache_id, "", "", &[]);
        let buf = self.send_cache_request(&request)?;

        let parsed = frame::parse_response(&buf, MIN_CACHE_RESPONSE)?;
        if let Some(message) = parsed.server_error() {
            return Err(ClientError::Server(message));
        }
        let text = String::from_utf8_lossy(parsed.payload);
        Ok(text.ends_with("remove successful"))
    }

    /// Tag search: returns each matching object's bytes, in server order.
    pub fn execute_search_cache_command(
        &self,
        collection: &str,
        tags: &str,
    ) -> Result<Vec<Vec<u8>>, ClientError> {
        self.check_cache_open()?;

        let request = self.build_cache_request(CacheCommand::Search, collection, "", tags, "", &[]);
        let buf = self.send_cache_request(&request)?;

        let parsed = frame::parse_response(&buf, MIN_CACHE_RESPONSE)?;
        if let Some(message) = parsed.server_error() {
            return Err(ClientError::Server(message));
        }
        parse_search_payload(parsed.payload)
    }
}

/// Unpacks the multi-object search payload.
///
/// Layout: a comma-separated list of N object lengths terminated by the
/// line delimiter, then the N objects' bytes concatenated back to back.
/// Objects are sliced strictly by their declared lengths; the payload is
/// never scanned for delimiters past the length list.
pub(crate) fn parse_search_payload(payload: &[u8]) -> Result<Vec<Vec<u8>>, ClientError> {
    let Some(delimiter) = frame::find_subslice(payload, END_OF_LINE.as_bytes()) else {
        return Ok(Vec::new());
    };
    let lengths = String::from_utf8_lossy(&payload[..delimiter]);
    let mut offset = delimiter + END_OF_LINE.len();

    let mut objects = Vec::new();
    for part in lengths.split(',') {
        let length = part.trim().parse::<usize>().unwrap_or(0);
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= payload.len())
            .ok_or_else(|| {
                ClientError::MalformedResponse(
                    "search object length exceeds response payload".into(),
                )
            })?;
        if length > 0 {
            objects.push(payload[offset..end].to_vec());
        }
        offset = end;
    }
    Ok(objects)
}

/// Splits a delimiter-separated text payload into trimmed, non-empty items.
pub(crate) fn split_list_payload(text: &str) -> Vec<String> {
    text.split(END_OF_LINE)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Collection name for typed operations; stable per compiled type.
fn type_collection<T: ?Sized>() -> String {
    std::any::type_name::<T>().to_string()
}

/// High-level cache operations over an open [`Connection`].
///
/// Cached objects live in named collections on the server, auto-created on
/// first use. Typed methods derive the collection from the Rust type name;
/// use the raw variants to interoperate with objects written by clients in
/// other languages.
#[derive(Debug)]
pub struct CacheClient<'a> {
    connection: &'a Connection,
}

impl<'a> CacheClient<'a> {
    pub fn new(connection: &'a Connection) -> Self {
        Self { connection }
    }

    /// Builds an expiry string, e.g. `expires_in(5, CacheDuration::Minutes)`
    /// is "5 Minutes".
    pub fn expires_in(amount: u32, duration: CacheDuration) -> String {
        format!("{amount} {duration}")
    }

    fn require_collection(collection: &str) -> Result<(), ClientError> {
        if collection.trim().is_empty() {
            return Err(ClientError::Configuration(
                "CollectionName is required.".into(),
            ));
        }
        Ok(())
    }

    fn check_integrity(requested: &str, returned: String) -> Result<String, ClientError> {
        if requested == returned {
            Ok(returned)
        } else {
            Err(ClientError::Integrity(
                "CacheId requested to update and cache id returned are different.".into(),
            ))
        }
    }

    /// Caches an object; the server assigns a cache id when `cache_id` is
    /// empty and echoes the effective id back.
    pub fn add<T: Encode>(
        &self,
        object: &T,
        cache_id: &str,
        tags: &str,
        expires_in: &str,
    ) -> Result<String, ClientError> {
        let payload = serialize::to_bytes(object)?;
        self.connection.execute_cache_command(
            CacheCommand::Add,
            &type_collection::<T>(),
            cache_id,
            tags,
            expires_in,
            &payload,
        )
    }

    /// Caches pre-serialized bytes in an explicit collection.
    pub fn add_raw(
        &self,
        collection: &str,
        payload: &[u8],
        cache_id: &str,
        tags: &str,
        expires_in: &str,
    ) -> Result<String, ClientError> {
        Self::require_collection(collection)?;
        self.connection.execute_cache_command(
            CacheCommand::Add,
            collection,
            cache_id,
            tags,
            expires_in,
            payload,
        )
    }

    /// Fetches and decodes a cached object. Decode failures propagate.
    pub fn get<T: Decode<()>>(&self, cache_id: &str, tags: &str) -> Result<T, ClientError> {
        let bytes =
            self.connection
                .execute_get_cache_command(&type_collection::<T>(), cache_id, tags)?;
        serialize::from_bytes(&bytes)
    }

    /// Fetches cached bytes untouched, for payloads written by other
    /// clients.
    pub fn get_raw(
        &self,
        collection: &str,
        cache_id: &str,
        tags: &str,
    ) -> Result<Vec<u8>, ClientError> {
        Self::require_collection(collection)?;
        self.connection
            .execute_get_cache_command(collection, cache_id, tags)
    }

    /// Fetches and decodes through a caller-supplied registry; the
    /// collection name doubles as the wire type name.
    pub fn get_with(
        &self,
        registry: &TypeRegistry,
        collection: &str,
        cache_id: &str,
    ) -> Result<Box<dyn Any + Send>, ClientError> {
        Self::require_collection(collection)?;
        let bytes = self
            .connection
            .execute_get_cache_command(collection, cache_id, "")?;
        registry.decode(collection, &bytes)
    }

    /// Replaces an existing object. The echoed cache id must match the
    /// requested one.
    pub fn update<T: Encode>(
        &self,
        cache_id: &str,
        object: &T,
        tags: &str,
        expires_in: &str,
    ) -> Result<String, ClientError> {
        if cache_id.trim().is_empty() {
            return Err(ClientError::Configuration("Cache Id is required.".into()));
        }
        let payload = serialize::to_bytes(object)?;
        let returned = self.connection.execute_cache_command(
            CacheCommand::Update,
            &type_collection::<T>(),
            cache_id,
            tags,
            expires_in,
            &payload,
        )?;
        Self::check_integrity(cache_id, returned)
    }

    pub fn update_raw(
        &self,
        collection: &str,
        cache_id: &str,
        payload: &[u8],
        tags: &str,
        expires_in: &str,
    ) -> Result<String, ClientError> {
        Self::require_collection(collection)?;
        if cache_id.trim().is_empty() {
            return Err(ClientError::Configuration(
                "Cache Id to update, is required for update.".into(),
            ));
        }
        let returned = self.connection.execute_cache_command(
            CacheCommand::Update,
            collection,
            cache_id,
            tags,
            expires_in,
            payload,
        )?;
        Self::check_integrity(cache_id, returned)
    }

    /// Inserts or replaces under an explicit cache id, with the same
    /// integrity check as [`CacheClient::update`].
    pub fn add_or_update<T: Encode>(
        &self,
        cache_id: &str,
        object: &T,
        tags: &str,
        expires_in: &str,
    ) -> Result<String, ClientError> {
        if cache_id.trim().is_empty() {
            return Err(ClientError::Configuration(
                "Cache Id is required when using AddOrUpdate.".into(),
            ));
        }
        let payload = serialize::to_bytes(object)?;
        let returned = self.connection.execute_cache_command(
            CacheCommand::AddOrUpdate,
            &type_collection::<T>(),
            cache_id,
            tags,
            expires_in,
            &payload,
        )?;
        Self::check_integrity(cache_id, returned)
    }

    pub fn remove<T>(&self, cache_id: &str) -> Result<bool, ClientError> {
        self.connection
            .execute_remove_cache_command(&type_collection::<T>(), cache_id)
    }

    pub fn remove_in(&self, collection: &str, cache_id: &str) -> Result<bool, ClientError> {
        Self::require_collection(collection)?;
        self.connection
            .execute_remove_cache_command(collection, cache_id)
    }

    /// Decodes every object matching the tags; a single decode failure
    /// aborts the whole call.
    pub fn search_by_tags<T: Decode<()>>(&self, tags: &str) -> Result<Vec<T>, ClientError> {
        let raw = self
            .connection
            .execute_search_cache_command(&type_collection::<T>(), tags)?;
        raw.iter()
            .map(|bytes| serialize::from_bytes(bytes))
            .collect()
    }

    pub fn search_by_tags_raw(
        &self,
        collection: &str,
        tags: &str,
    ) -> Result<Vec<Vec<u8>>, ClientError> {
        Self::require_collection(collection)?;
        self.connection.execute_search_cache_command(collection, tags)
    }

    pub fn count<T>(&self) -> Result<i64, ClientError> {
        self.count_collection(&type_collection::<T>())
    }

    pub fn count_in(&self, collection: &str) -> Result<i64, ClientError> {
        Self::require_collection(collection)?;
        self.count_collection(collection)
    }

    fn count_collection(&self, collection: &str) -> Result<i64, ClientError> {
        let text = self.connection.execute_cache_command(
            CacheCommand::CollectionCount,
            collection,
            "",
            "",
            "",
            &[],
        )?;
        Ok(text.trim().parse().unwrap_or(0))
    }

    /// Every collection currently on the cache server.
    pub fn collection_list(&self) -> Result<Vec<String>, ClientError> {
        let text = self.connection.execute_cache_command(
            CacheCommand::CollectionList,
            "",
            "",
            "",
            "",
            &[],
        )?;
        Ok(split_list_payload(&text))
    }

    pub fn collection_cache_ids<T>(&self) -> Result<Vec<String>, ClientError> {
        self.cache_ids(&type_collection::<T>())
    }

    pub fn collection_cache_ids_in(&self, collection: &str) -> Result<Vec<String>, ClientError> {
        Self::require_collection(collection)?;
        self.cache_ids(collection)
    }

    fn cache_ids(&self, collection: &str) -> Result<Vec<String>, ClientError> {
        let text = self.connection.execute_cache_command(
            CacheCommand::CollectionCacheIds,
            collection,
            "",
            "",
            "",
            &[],
        )?;
        Ok(split_list_payload(&text))
    }

    pub fn drop_collection<T>(&self) -> Result<bool, ClientError> {
        self.drop_named(&type_collection::<T>())
    }

    pub fn drop_collection_named(&self, collection: &str) -> Result<bool, ClientError> {
        Self::require_collection(collection)?;
        self.drop_named(collection)
    }

    fn drop_named(&self, collection: &str) -> Result<bool, ClientError> {
        let text = self.connection.execute_cache_command(
            CacheCommand::DropCollection,
            collection,
            "",
            "",
            "",
            &[],
        )?;
        Ok(text == "Success")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_payload_slices_by_declared_lengths() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"5,3,7");
        payload.extend_from_slice(END_OF_LINE.as_bytes());
        payload.extend_from_slice(b"aaaaabbbccccccc");

        let objects = parse_search_payload(&payload).unwrap();
        assert_eq!(objects.len(), 3);
        assert_eq!(objects[0], b"aaaaa");
        assert_eq!(objects[1], b"bbb");
        assert_eq!(objects[2], b"ccccccc");
    }

    #[test]
    fn search_payload_objects_may_contain_delimiters() {
        let object = b"xx\0<EOL>\0yy";
        let mut payload = Vec::new();
        payload.extend_from_slice(b"11");
        payload.extend_from_slice(END_OF_LINE.as_bytes());
        payload.extend_from_slice(object);

        let objects = parse_search_payload(&payload).unwrap();
        assert_eq!(objects, vec![object.to_vec()]);
    }

    #[test]
    fn search_payload_skips_zero_lengths() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"0,4,junk");
        payload.extend_from_slice(END_OF_LINE.as_bytes());
        payload.extend_from_slice(b"abcd");

        let objects = parse_search_payload(&payload).unwrap();
        assert_eq!(objects, vec![b"abcd".to_vec()]);
    }

    #[test]
    fn search_payload_without_length_list_is_empty() {
        assert!(parse_search_payload(b"").unwrap().is_empty());
        assert!(parse_search_payload(b"no delimiter here").unwrap().is_empty());
    }

    #[test]
    fn search_payload_rejects_overlong_lengths() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"100");
        payload.extend_from_slice(END_OF_LINE.as_bytes());
        payload.extend_from_slice(b"short");

        let err = parse_search_payload(&payload).unwrap_err();
        assert!(matches!(err, ClientError::MalformedResponse(_)));
    }

    #[test]
    fn list_payload_drops_empty_segments() {
        let text = format!("a{END_OF_LINE}b{END_OF_LINE}{END_OF_LINE}c{END_OF_LINE}");
        assert_eq!(split_list_payload(&text), vec!["a", "b", "c"]);
        assert!(split_list_payload("").is_empty());
    }

    #[test]
    fn wire_command_names() {
        assert_eq!(CacheCommand::Get.as_str(), "CacheGet");
        assert_eq!(CacheCommand::AddOrUpdate.as_str(), "CacheAddOrUpdate");
        assert_eq!(
            CacheCommand::CollectionCacheIds.as_str(),
            "CacheCollectionCacheIds"
        );
        assert_eq!(CacheCommand::DropCollection.as_str(), "CacheDropCollection");
    }

    #[test]
    fn expiry_strings() {
        assert_eq!(
            CacheClient::expires_in(5, CacheDuration::Minutes),
            "5 Minutes"
        );
        assert_eq!(CacheClient::expires_in(1, CacheDuration::Days), "1 Days");
    }

    #[test]
    fn collection_resolution() {
        let conn = Connection::new("u", "p");
        assert_eq!(conn.resolve_collection("explicit"), "explicit");
        assert_eq!(conn.resolve_collection(""), "Default");

        let mut conn = Connection::new("u", "p");
        conn.cache_collection = "session".into();
        assert_eq!(conn.resolve_collection(""), "session");
        assert_eq!(conn.resolve_collection("explicit"), "explicit");
    }

    #[test]
    fn cache_ops_require_open_connection() {
        let conn = Connection::new("u", "p");
        let cache = CacheClient::new(&conn);

        let err = cache.get_raw("c", "id", "").unwrap_err();
        assert!(err.to_string().contains("not open"));

        let err = cache.count_in("c").unwrap_err();
        assert!(err.to_string().contains("not open"));
    }

    #[test]
    fn update_requires_cache_id() {
        let conn = Connection::new("u", "p");
        let cache = CacheClient::new(&conn);

        let err = cache.update("", &42u32, "", "").unwrap_err();
        assert!(err.to_string().contains("Cache Id"));

        let err = cache.add_or_update("", &42u32, "", "").unwrap_err();
        assert!(err.to_string().contains("AddOrUpdate"));
    }

    #[test]
    fn raw_ops_require_collection_name() {
        let conn = Connection::new("u", "p");
        let cache = CacheClient::new(&conn);

        let err = cache.add_raw("", b"x", "", "", "").unwrap_err();
        assert!(err.to_string().contains("CollectionName"));

        let err = cache.search_by_tags_raw(" ", "tag").unwrap_err();
        assert!(err.to_string().contains("CollectionName"));
    }

    #[test]
    fn typed_collection_names_are_distinct() {
        assert_ne!(type_collection::<u32>(), type_collection::<String>());
        assert!(type_collection::<String>().contains("String"));
    }
}
