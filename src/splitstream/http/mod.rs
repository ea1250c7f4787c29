mod request;
mod sniff;
mod status;
mod url;

pub use self::request::{RequestLine, METHOD_MAX_LEN, PROTOCOL_MAX_LEN, TARGET_MAX_LEN};
pub use self::sniff::{find_header_end, is_response_200};
pub use self::status::HttpStatus;
pub use self::url::{parse_absolute_url, Url, DEFAULT_HTTP_PORT, HOST_MAX_LEN, PATH_MAX_LEN};
