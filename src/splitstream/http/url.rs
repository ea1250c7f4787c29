use crate::splitstream::common::{Error, Result};

pub const HOST_MAX_LEN: usize = 1023;
pub const PATH_MAX_LEN: usize = 2047;
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// An absolute-form http:// request target split into its pieces.
/// `path` keeps its leading slash and may be empty.
#[derive(Debug, PartialEq, Eq)]
pub struct Url {
    host: String,
    port: u16,
    path: String,
}

impl Url {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Parses `http://HOST[:PORT][/PATH]`. Any other scheme is rejected; the proxy
/// speaks plain HTTP only.
pub fn parse_absolute_url(s: &str) -> Result<Url> {
    let rest = s
        .strip_prefix("http://")
        .ok_or_else(|| Error::new("URL must use the http:// scheme"))?;
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    let (host, port) = match authority.find(':') {
        Some(i) => {
            let port = authority[i + 1..]
                .parse::<u16>()
                .map_err(|_| Error::new("invalid port in URL"))?;
            if port == 0 {
                return Err(Error::new("invalid port in URL"));
            }
            (&authority[..i], port)
        }
        None => (authority, DEFAULT_HTTP_PORT),
    };
    if host.is_empty() || host.len() > HOST_MAX_LEN {
        return Err(Error::new("invalid host in URL"));
    }
    // the cap counts the path without its leading slash
    if path.len() > PATH_MAX_LEN + 1 {
        return Err(Error::new("URL path too long"));
    }
    Ok(Url {
        host: host.to_string(),
        port,
        path: path.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_only() {
        let url = parse_absolute_url("http://example.com").unwrap();
        assert_eq!(url.host(), "example.com");
        assert_eq!(url.port(), DEFAULT_HTTP_PORT);
        assert_eq!(url.path(), "");
    }

    #[test]
    fn test_parse_host_and_port() {
        let url = parse_absolute_url("http://example.com:8080").unwrap();
        assert_eq!(url.host(), "example.com");
        assert_eq!(url.port(), 8080);
        assert_eq!(url.path(), "");
    }

    #[test]
    fn test_parse_host_and_path() {
        let url = parse_absolute_url("http://example.com/a/b?q=1").unwrap();
        assert_eq!(url.host(), "example.com");
        assert_eq!(url.port(), DEFAULT_HTTP_PORT);
        assert_eq!(url.path(), "/a/b?q=1");
    }

    #[test]
    fn test_parse_host_port_and_path() {
        let url = parse_absolute_url("http://10.0.0.1:81/index.html").unwrap();
        assert_eq!(url.host(), "10.0.0.1");
        assert_eq!(url.port(), 81);
        assert_eq!(url.path(), "/index.html");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(parse_absolute_url("https://example.com/").is_err());
        assert!(parse_absolute_url("ftp://example.com/").is_err());
        assert!(parse_absolute_url("/just/a/path").is_err());
        assert!(parse_absolute_url("example.com").is_err());
        assert!(parse_absolute_url("HTTP://example.com/").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_authority() {
        assert!(parse_absolute_url("http://").is_err());
        assert!(parse_absolute_url("http:///path").is_err());
        assert!(parse_absolute_url("http://host:notaport/").is_err());
        assert!(parse_absolute_url("http://host:0/").is_err());
        assert!(parse_absolute_url("http://host:65536/").is_err());
        assert!(parse_absolute_url("http://host:/").is_err());
        let long_host = format!("http://{}/", "h".repeat(HOST_MAX_LEN + 1));
        assert!(parse_absolute_url(&long_host).is_err());
    }
}
