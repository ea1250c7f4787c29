use std::str;

use crate::splitstream::common::{Error, Result};

pub const METHOD_MAX_LEN: usize = 15;
pub const TARGET_MAX_LEN: usize = 2047;
pub const PROTOCOL_MAX_LEN: usize = 15;

/// The three whitespace-delimited fields of an HTTP/1.x request line.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: &'a str,
    pub target: &'a str,
    pub protocol: &'a str,
}

impl<'a> RequestLine<'a> {
    /// Parses the request line out of a received head. Only the first line is
    /// examined; fields over their size caps are rejected, not truncated.
    pub fn parse(head: &'a [u8]) -> Result<RequestLine<'a>> {
        let line = match memchr::memchr(b'\n', head) {
            Some(i) => &head[..i],
            None => head,
        };
        let line = str::from_utf8(line)?;
        let mut fields = line.split_ascii_whitespace();
        let method = fields.next().ok_or_else(|| Error::new("missing method"))?;
        let target = fields.next().ok_or_else(|| Error::new("missing request target"))?;
        let protocol = fields.next().ok_or_else(|| Error::new("missing protocol"))?;
        if method.len() > METHOD_MAX_LEN
            || target.len() > TARGET_MAX_LEN
            || protocol.len() > PROTOCOL_MAX_LEN
        {
            return Err(Error::new("request line field too long"));
        }
        Ok(RequestLine { method, target, protocol })
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_line() {
        let head = b"GET http://example.com/index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let line = RequestLine::parse(head).unwrap();
        assert_eq!(line.method, "GET");
        assert_eq!(line.target, "http://example.com/index.html");
        assert_eq!(line.protocol, "HTTP/1.1");
        assert!(line.is_get());
    }

    #[test]
    fn test_parse_non_get() {
        let line = RequestLine::parse(b"POST http://o/p HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(line.method, "POST");
        assert!(!line.is_get());
        // methods are case sensitive
        let line = RequestLine::parse(b"get http://o/p HTTP/1.1\r\n\r\n").unwrap();
        assert!(!line.is_get());
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert!(RequestLine::parse(b"").is_err());
        assert!(RequestLine::parse(b"GET\r\n").is_err());
        assert!(RequestLine::parse(b"GET http://o/p\r\n").is_err());
        assert!(RequestLine::parse(b"   \r\n").is_err());
    }

    #[test]
    fn test_parse_rejects_oversized_fields() {
        let long_target = format!("GET http://o/{} HTTP/1.1\r\n", "a".repeat(TARGET_MAX_LEN));
        assert!(RequestLine::parse(long_target.as_bytes()).is_err());
        let long_method = format!("{} http://o/p HTTP/1.1\r\n", "M".repeat(METHOD_MAX_LEN + 1));
        assert!(RequestLine::parse(long_method.as_bytes()).is_err());
    }

    #[test]
    fn test_parse_rejects_invalid_utf8() {
        assert!(RequestLine::parse(b"GET http://o/\xff\xfe HTTP/1.1\r\n").is_err());
    }

    #[test]
    fn test_parse_only_looks_at_first_line() {
        // fields never come from a later line
        assert!(RequestLine::parse(b"GET http://o/p\r\nHTTP/1.1\r\n\r\n").is_err());
    }
}
