/// Returns the index just past the first CRLFCRLF, the end of an HTTP head.
pub fn find_header_end(bytes: &[u8]) -> Option<usize> {
    memchr::memmem::find(bytes, b"\r\n\r\n").map(|i| i + 4)
}

/// Only HTTP/1.x 200 responses are cacheable. Exact prefix match.
pub fn is_response_200(bytes: &[u8]) -> bool {
    bytes.starts_with(b"HTTP/1.1 200") || bytes.starts_with(b"HTTP/1.0 200")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n\r\n"), Some(18));
        assert_eq!(find_header_end(b"a\r\n\r\nbody\r\n\r\n"), Some(5));
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n"), None);
        assert_eq!(find_header_end(b"\r\n\r"), None);
        assert_eq!(find_header_end(b""), None);
        assert_eq!(find_header_end(b"\r\n\r\n"), Some(4));
    }

    #[test]
    fn test_is_response_200() {
        assert!(is_response_200(b"HTTP/1.1 200 OK\r\n"));
        assert!(is_response_200(b"HTTP/1.0 200 OK\r\n"));
        assert!(!is_response_200(b"HTTP/1.1 404 Not Found\r\n"));
        assert!(!is_response_200(b"HTTP/2 200\r\n"));
        assert!(!is_response_200(b" HTTP/1.1 200 OK\r\n"));
        assert!(!is_response_200(b"HTTP/1.1"));
        // prefix match only; a (bogus) four-digit status starting with 200 slips through
        assert!(is_response_200(b"HTTP/1.1 2000"));
    }
}
