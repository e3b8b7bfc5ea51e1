//! Inbound request messages
//!
//! A message is an `ipc://` URI plus an optional byte payload. Every field a
//! handler can ask for is derived from the URI on demand.

use serde_json::{Map, Value};
use std::cell::OnceCell;
use url::Url;

pub const SCHEME_PREFIX: &str = "ipc://";

/// One inbound request
#[derive(Debug, Clone)]
pub struct Message {
    uri: Url,
    bytes: Option<Vec<u8>>,
    params: OnceCell<Map<String, Value>>,
}

impl Message {
    /// Parse a request URI, prefixing `ipc://` when it has no scheme
    pub fn parse(uri: &str, bytes: Option<Vec<u8>>) -> Result<Self, url::ParseError> {
        let uri = if uri.starts_with("ipc:") {
            Url::parse(uri)?
        } else {
            Url::parse(&format!("{SCHEME_PREFIX}{uri}"))?
        };

        Ok(Self {
            uri,
            bytes: bytes.filter(|b| !b.is_empty()),
            params: OnceCell::new(),
        })
    }

    /// The route this message is addressed to
    pub fn name(&self) -> String {
        match self.uri.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => self.uri.path().trim_start_matches('/').to_string(),
        }
    }

    /// Raw query parameter, `None` when absent or empty
    pub fn get(&self, key: &str) -> Option<String> {
        self.uri
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    }

    pub fn seq(&self) -> Option<String> {
        self.get("seq")
    }

    pub fn id(&self) -> Option<String> {
        self.get("id")
    }

    pub fn value(&self) -> Option<String> {
        self.get("value")
    }

    /// Window index, or -1 when absent or not a number
    pub fn index(&self) -> i32 {
        self.get("index")
            .and_then(|v| v.parse().ok())
            .unwrap_or(-1)
    }

    /// Query parameters, JSON-decoded where they parse as JSON
    pub fn params(&self) -> &Map<String, Value> {
        self.params.get_or_init(|| {
            self.uri
                .query_pairs()
                .map(|(k, v)| {
                    let value = serde_json::from_str(&v).unwrap_or_else(|_| Value::String(v.to_string()));
                    (k.into_owned(), value)
                })
                .collect()
        })
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }

    pub fn uri(&self) -> &str {
        self.uri.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_fields() {
        let msg = Message::parse("ipc://echo?value=5&seq=R7&index=2&id=abc", None).unwrap();
        assert_eq!(msg.name(), "echo");
        assert_eq!(msg.value().as_deref(), Some("5"));
        assert_eq!(msg.seq().as_deref(), Some("R7"));
        assert_eq!(msg.id().as_deref(), Some("abc"));
        assert_eq!(msg.index(), 2);
        assert_eq!(msg.get("missing"), None);
        assert!(msg.bytes().is_none());
    }

    #[test]
    fn test_message_without_scheme() {
        let msg = Message::parse("fs.read?path=%2Ftmp", Some(vec![1, 2])).unwrap();
        assert_eq!(msg.name(), "fs.read");
        assert_eq!(msg.uri(), "ipc://fs.read?path=%2Ftmp");
        assert_eq!(msg.get("path").as_deref(), Some("/tmp"));
        assert_eq!(msg.bytes(), Some(&[1u8, 2][..]));
        assert_eq!(msg.index(), -1);
    }

    #[test]
    fn test_message_params_decode_json() {
        let msg = Message::parse("ipc://calc?a=1&b=true&c=hello&d=%7B%22x%22%3A1%7D", None).unwrap();
        let params = msg.params();
        assert_eq!(params["a"], json!(1));
        assert_eq!(params["b"], json!(true));
        assert_eq!(params["c"], json!("hello"));
        assert_eq!(params["d"], json!({"x": 1}));
    }

    #[test]
    fn test_empty_values_are_absent() {
        let msg = Message::parse("ipc://echo?value=&seq=", None).unwrap();
        assert_eq!(msg.value(), None);
        assert_eq!(msg.seq(), None);
    }
}
