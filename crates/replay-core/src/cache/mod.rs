//! Disk-backed response cache.
//!
//! One immutable text file per key under a cache directory. Entries are
//! written atomically and only once the full response is known; there is no
//! TTL and no eviction, so identical future requests are served from disk
//! forever.

mod disk;

pub use disk::DiskCache;
