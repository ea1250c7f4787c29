mod chunk;
mod directory;
mod entry;
mod status;

pub use self::chunk::Chunk;
pub use self::directory::{CacheDirectory, Lookup};
pub use self::entry::{CacheEntry, CacheWriter};
pub use self::status::CacheStatus;
