use core::hash::Hash;
use std::hash::Hasher;

#[cfg(feature = "std-hash")]
pub mod default {
    pub use std::collections::hash_map::DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::new()
    }
}

#[cfg(not(feature = "std-hash"))]
pub mod default {
    pub use ahash::AHasher as DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::default()
    }
}

/// Hashes an effect description key with whichever hasher the build selected.
///
/// Keys are only compared within one process.
#[inline]
pub fn hash_key<T: Hash + ?Sized>(v: &T) -> crate::Key {
    let mut h = default::new();
    v.hash(&mut h);
    h.finish()
}
