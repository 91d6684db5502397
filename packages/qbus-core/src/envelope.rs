//! Message envelope codec.
//!
//! An envelope is a newline-separated block of `key:value` header lines,
//! terminated by a blank line, followed by the opaque body bytes:
//!
//! ```text
//! traceId:q3f2…
//! appId:q94d…
//! appName:billing
//! region:eu1
//!
//! <body bytes>
//! ```
//!
//! Three headers are always written first: [`TRACE_ID`], [`APP_ID`], and
//! [`APP_NAME`]. Caller-supplied headers follow in the given order.
//! Envelopes are built immediately before a send and parsed immediately on
//! handler invocation; they are never persisted.

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Header key carrying the trace identifier.
pub const TRACE_ID: &str = "traceId";
/// Header key carrying the sending application's instance id.
pub const APP_ID: &str = "appId";
/// Header key carrying the sending application's display name.
pub const APP_NAME: &str = "appName";

/// A key/value pair prepended to a message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Encodes an envelope from its parts.
///
/// The mandatory trace/app headers come first, then `headers` in caller
/// order, then the blank-line terminator and the raw body.
#[must_use]
pub fn encode(
    trace_id: &str,
    app_id: &str,
    app_name: &str,
    headers: &[Header],
    body: &[u8],
) -> Bytes {
    let mut buf = BytesMut::with_capacity(64 + body.len());
    buf.put_slice(TRACE_ID.as_bytes());
    buf.put_u8(b':');
    buf.put_slice(trace_id.as_bytes());
    buf.put_u8(b'\n');
    buf.put_slice(APP_ID.as_bytes());
    buf.put_u8(b':');
    buf.put_slice(app_id.as_bytes());
    buf.put_u8(b'\n');
    buf.put_slice(APP_NAME.as_bytes());
    buf.put_u8(b':');
    buf.put_slice(app_name.as_bytes());
    for header in headers {
        buf.put_u8(b'\n');
        buf.put_slice(header.key.as_bytes());
        buf.put_u8(b':');
        buf.put_slice(header.value.as_bytes());
    }
    buf.put_slice(b"\n\n");
    buf.put_slice(body);
    buf.freeze()
}

/// Decodes an envelope into its header map and body.
///
/// Decoding is deliberately permissive: input without a blank-line
/// separator yields an empty map and no body, header lines that are not a
/// single `key:value` pair are skipped, and an empty body decodes to an
/// empty (but present) byte slice. A malformed producer can therefore
/// never make a consumer fail.
#[must_use]
pub fn decode(message: &[u8]) -> (HashMap<String, String>, Option<Bytes>) {
    let mut headers = HashMap::new();
    let Some(split) = message.windows(2).position(|w| w == b"\n\n") else {
        return (headers, None);
    };
    let block = String::from_utf8_lossy(&message[..split]);
    for line in block.split('\n') {
        let mut parts = line.split(':');
        if let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) {
            headers.insert(key.to_string(), value.to_string());
        }
    }
    let body = Bytes::copy_from_slice(&message[split + 2..]);
    (headers, Some(body))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn decode_plain_message() {
        let (headers, body) = decode(b"test:first\nname:blue\n\nmessage");
        assert_eq!(headers.get("test").map(String::as_str), Some("first"));
        assert_eq!(headers.get("name").map(String::as_str), Some("blue"));
        assert_eq!(body.as_deref(), Some(&b"message"[..]));
    }

    #[test]
    fn decode_without_separator_is_empty_not_error() {
        let (headers, body) = decode(b"no separator here");
        assert!(headers.is_empty());
        assert!(body.is_none());
    }

    #[test]
    fn decode_tolerates_junk_header_lines() {
        let (headers, body) = decode(b"good:yes\nno-colon-line\na:b:c\n\nx");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("good").map(String::as_str), Some("yes"));
        assert_eq!(body.as_deref(), Some(&b"x"[..]));
    }

    #[test]
    fn encode_writes_mandatory_headers() {
        let msg = encode("t1", "app1", "billing", &[], b"payload");
        let (headers, body) = decode(&msg);
        assert_eq!(headers.get(TRACE_ID).map(String::as_str), Some("t1"));
        assert_eq!(headers.get(APP_ID).map(String::as_str), Some("app1"));
        assert_eq!(headers.get(APP_NAME).map(String::as_str), Some("billing"));
        assert_eq!(body.as_deref(), Some(&b"payload"[..]));
    }

    #[test]
    fn empty_body_round_trips_as_present_and_empty() {
        let msg = encode("t", "a", "n", &[], b"");
        let (_, body) = decode(&msg);
        assert_eq!(body.as_deref(), Some(&b""[..]));
    }

    #[test]
    fn body_containing_separator_survives() {
        let msg = encode("t", "a", "n", &[], b"first\n\nsecond");
        let (_, body) = decode(&msg);
        assert_eq!(body.as_deref(), Some(&b"first\n\nsecond"[..]));
    }

    proptest! {
        /// decode(encode(..)) recovers every supplied header, the three
        /// mandatory ones, and the exact body bytes.
        #[test]
        fn round_trip(
            trace in "[a-z0-9]{1,12}",
            entries in proptest::collection::hash_map("x[a-zA-Z]{1,8}", "[a-zA-Z0-9 ]{0,12}", 0..5),
            body in proptest::collection::vec(any::<u8>(), 0..256),
        ) {
            let headers: Vec<Header> = entries
                .iter()
                .map(|(k, v)| Header::new(k.clone(), v.clone()))
                .collect();
            let msg = encode(&trace, "app", "name", &headers, &body);
            let (decoded, decoded_body) = decode(&msg);

            prop_assert_eq!(decoded.get(TRACE_ID).map(String::as_str), Some(trace.as_str()));
            prop_assert_eq!(decoded.get(APP_ID).map(String::as_str), Some("app"));
            prop_assert_eq!(decoded.get(APP_NAME).map(String::as_str), Some("name"));
            for Header { key, value } in &headers {
                prop_assert_eq!(decoded.get(key), Some(value));
            }
            prop_assert_eq!(decoded_body.as_deref(), Some(body.as_slice()));
        }
    }
}
