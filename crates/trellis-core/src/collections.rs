//! Hash map selection for the reconciler's tables.
//!
//! Tables are keyed by small integer ids and interned names, so the default
//! build uses `hashbrown` with `ahash`. The `std-hash` feature swaps in the
//! standard library collections.

#[cfg(feature = "std-hash")]
pub(crate) mod map {
    pub type HashMap<K, V> = std::collections::HashMap<K, V>;
}

#[cfg(not(feature = "std-hash"))]
pub(crate) mod map {
    pub type HashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;
}
