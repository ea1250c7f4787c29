use strum::Display;

/// Download state of a cache entry. Once a status is not InProcess it never
/// changes again.
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CacheStatus {
    InProcess = 0,
    Success = 1,
    Failed = 2,
}

impl CacheStatus {
    pub(crate) fn from_u8(v: u8) -> CacheStatus {
        match v {
            0 => CacheStatus::InProcess,
            1 => CacheStatus::Success,
            2 => CacheStatus::Failed,
            _ => unreachable!("invalid cache status {}", v),
        }
    }
}
