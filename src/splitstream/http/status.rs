use strum::Display;

/// Status lines the proxy produces itself. Everything else a client sees is
/// the origin's response forwarded verbatim.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    #[strum(serialize = "400 Bad Request")]
    BadRequest,
    #[strum(serialize = "500 Internal Server Error")]
    InternalServerError,
    #[strum(serialize = "502 Bad Gateway")]
    BadGateway,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lines() {
        assert_eq!(HttpStatus::BadRequest.to_string(), "400 Bad Request");
        assert_eq!(HttpStatus::InternalServerError.to_string(), "500 Internal Server Error");
        assert_eq!(HttpStatus::BadGateway.to_string(), "502 Bad Gateway");
    }
}
