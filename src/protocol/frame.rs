use crate::error::ClientError;

/// Field delimiter inside a frame header.
pub const END_OF_LINE: &str = "\0<EOL>\0";
/// Marks the end of the fixed response header region.
pub const END_OF_HEADER: &str = "\0<EOH>\0";
/// Terminates a complete message on the stream.
pub const END_OF_MESSAGE: &str = "\0<EOF>\0";

/// Status text the server sends when a command completed without error.
pub const SUCCESS_SENTINEL: &str = "SQLDATABASE_OK";

/// Fixed response header region, bytes `[0, 140)`.
pub const RESPONSE_HEADER_LEN: usize = 140;
/// Response payload starts here; the 7 bytes between header and payload
/// hold the end-of-header marker.
pub const RESPONSE_PAYLOAD_OFFSET: usize = 147;
/// Trailing end-of-message marker, sliced off but never validated.
pub const RESPONSE_FOOTER_LEN: usize = 7;

/// Shortest valid database response.
pub const MIN_DATABASE_RESPONSE: usize = 147;
/// Shortest valid cache response; one extra header field over database
/// responses accounts for the difference.
pub const MIN_CACHE_RESPONSE: usize = 154;

/// A response frame parsed out of a fully reassembled byte buffer.
///
/// The header region is decoded as UTF-8 text and split into positional
/// fields; the payload is located purely by byte offset so that binary
/// payloads containing delimiter sequences cannot corrupt the parse.
#[derive(Debug)]
pub struct ResponseFrame<'a> {
    pub fields: Vec<String>,
    pub payload: &'a [u8],
}

impl ResponseFrame<'_> {
    /// Echoed command name, field 0.
    pub fn command(&self) -> &str {
        self.fields.first().map(String::as_str).unwrap_or_default()
    }

    /// Status text, field 1. Either the success sentinel or an error message.
    pub fn status(&self) -> &str {
        self.fields.get(1).map(String::as_str).unwrap_or_default()
    }

    /// Response format tag, field 2.
    pub fn format_tag(&self) -> &str {
        self.fields.get(2).map(String::as_str).unwrap_or_default()
    }

    /// Server-supplied error text, if the status field carries one.
    ///
    /// A status equal to the success sentinel means the payload is
    /// well-formed for the declared format; anything else means the payload
    /// must be ignored and the status surfaced as the error.
    pub fn server_error(&self) -> Option<String> {
        let status = self.status();
        if !status.trim().is_empty() && status != SUCCESS_SENTINEL {
            Some(status.to_string())
        } else {
            None
        }
    }
}

/// Builds a request frame: each header field followed by the line delimiter,
/// then the raw payload, then the two-marker footer.
///
/// The payload may contain arbitrary binary data, including byte sequences
/// equal to the delimiters; the server locates it by offset.
pub fn build_request(fields: &[&str], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        fields.iter().map(|f| f.len() + END_OF_LINE.len()).sum::<usize>()
            + payload.len()
            + END_OF_LINE.len()
            + END_OF_MESSAGE.len(),
    );
    for field in fields {
        out.extend_from_slice(field.as_bytes());
        out.extend_from_slice(END_OF_LINE.as_bytes());
    }
    out.extend_from_slice(payload);
    out.extend_from_slice(END_OF_LINE.as_bytes());
    out.extend_from_slice(END_OF_MESSAGE.as_bytes());
    out
}

/// Builds the authentication frame. Unlike command frames it carries no
/// payload region and no end-of-line before the terminator.
pub fn build_auth_request(username: &str, password: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for field in [username, password, "Binary", "Authenticate"] {
        out.extend_from_slice(field.as_bytes());
        out.extend_from_slice(END_OF_LINE.as_bytes());
    }
    out.extend_from_slice(END_OF_MESSAGE.as_bytes());
    out
}

/// Parses a complete response buffer into header fields and payload.
///
/// `min_len` is 147 for database responses and 154 for cache responses;
/// anything shorter means the stream is desynchronized and the caller must
/// close the connection.
pub fn parse_response(buf: &[u8], min_len: usize) -> Result<ResponseFrame<'_>, ClientError> {
    if buf.len() < min_len {
        return Err(ClientError::MalformedResponse(format!(
            "response is {} bytes, server responses are minimum {} bytes",
            buf.len(),
            min_len
        )));
    }

    let header = String::from_utf8_lossy(&buf[..RESPONSE_HEADER_LEN]);
    let fields = header
        .split(END_OF_LINE)
        .map(str::to_string)
        .collect::<Vec<_>>();

    let payload_end = buf.len() - RESPONSE_FOOTER_LEN;
    let payload = if payload_end > RESPONSE_PAYLOAD_OFFSET {
        &buf[RESPONSE_PAYLOAD_OFFSET..payload_end]
    } else {
        &[]
    };

    Ok(ResponseFrame { fields, payload })
}

/// First position of `needle` in `haystack`, byte-wise.
pub fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// True once the accumulated stream holds a full message.
pub fn message_complete(buf: &[u8]) -> bool {
    find_subslice(buf, END_OF_MESSAGE.as_bytes()).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lays a response out the way the server does: delimited header fields
    /// padded with NUL to 140 bytes, end-of-header marker, payload, footer.
    pub fn build_response(fields: &[&str], payload: &[u8]) -> Vec<u8> {
        let mut header = Vec::new();
        for field in fields {
            header.extend_from_slice(field.as_bytes());
            header.extend_from_slice(END_OF_LINE.as_bytes());
        }
        assert!(header.len() <= RESPONSE_HEADER_LEN, "header fields too long");
        header.resize(RESPONSE_HEADER_LEN, 0);

        header.extend_from_slice(END_OF_HEADER.as_bytes());
        header.extend_from_slice(payload);
        header.extend_from_slice(END_OF_MESSAGE.as_bytes());
        header
    }

    #[test]
    fn sentinels_are_seven_bytes() {
        assert_eq!(END_OF_LINE.len(), 7);
        assert_eq!(END_OF_HEADER.len(), 7);
        assert_eq!(END_OF_MESSAGE.len(), 7);
    }

    #[test]
    fn request_layout() {
        let frame = build_request(&["user", "pass", "Binary", "ExecuteNonQuery", "Database = db;"], b"SELECT 1;");

        let text = String::from_utf8_lossy(&frame);
        assert!(text.starts_with("user\0<EOL>\0pass\0<EOL>\0Binary\0<EOL>\0"));
        assert!(text.ends_with("SELECT 1;\0<EOL>\0\0<EOF>\0"));
    }

    #[test]
    fn request_payload_may_contain_delimiters() {
        let payload = b"\x01\0<EOL>\0\xff";
        let frame = build_request(&["u", "p"], payload);
        assert!(find_subslice(&frame, payload).is_some());
    }

    #[test]
    fn auth_request_layout() {
        let frame = build_auth_request("admin", "secret");
        assert_eq!(
            frame,
            b"admin\0<EOL>\0secret\0<EOL>\0Binary\0<EOL>\0Authenticate\0<EOL>\0\0<EOF>\0"
        );
    }

    #[test]
    fn parse_round_trip() {
        let buf = build_response(&["ExecuteReader", "SQLDATABASE_OK", "Binary"], b"payload");
        let frame = parse_response(&buf, MIN_DATABASE_RESPONSE).unwrap();

        assert_eq!(frame.command(), "ExecuteReader");
        assert_eq!(frame.status(), "SQLDATABASE_OK");
        assert_eq!(frame.format_tag(), "Binary");
        assert_eq!(frame.payload, b"payload");
        assert!(frame.server_error().is_none());
    }

    #[test]
    fn parse_surfaces_server_error() {
        let buf = build_response(&["ExecuteReader", "no such table: t", "Binary"], b"");
        let frame = parse_response(&buf, MIN_DATABASE_RESPONSE).unwrap();
        assert_eq!(frame.server_error().unwrap(), "no such table: t");
    }

    #[test]
    fn parse_rejects_short_buffer() {
        let err = parse_response(&[0u8; 146], MIN_DATABASE_RESPONSE).unwrap_err();
        assert!(matches!(err, ClientError::MalformedResponse(_)));

        let err = parse_response(&[0u8; 153], MIN_CACHE_RESPONSE).unwrap_err();
        assert!(matches!(err, ClientError::MalformedResponse(_)));
    }

    #[test]
    fn parse_empty_payload_at_minimum_size() {
        let buf = build_response(&["CacheGet", "SQLDATABASE_OK", "Binary"], b"");
        assert_eq!(buf.len(), MIN_CACHE_RESPONSE);

        let frame = parse_response(&buf, MIN_CACHE_RESPONSE).unwrap();
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn binary_payload_located_by_offset() {
        // Payload bytes that contain the message terminator must survive.
        let payload = b"\0<EOF>\0trailing";
        let buf = build_response(&["CacheGet", "SQLDATABASE_OK", "Binary"], payload);
        let frame = parse_response(&buf, MIN_CACHE_RESPONSE).unwrap();
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn subslice_search() {
        assert_eq!(find_subslice(b"abcdef", b"cd"), Some(2));
        assert_eq!(find_subslice(b"abcdef", b"xy"), None);
        assert_eq!(find_subslice(b"ab", b"abc"), None);
        assert!(message_complete(b"data\0<EOF>\0"));
        assert!(!message_complete(b"data\0<EOF"));
    }
}
