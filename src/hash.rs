//! Name hashing.
//!
//! Every named entity in the crate (bone, track, clip, morph, node) carries
//! its name alongside a 64-bit xxh3 hash of it. Hot-path lookups and the
//! replication protocol compare hashes only; the string is kept for
//! diagnostics and serialization.

use std::fmt;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Compact identity of a name.
///
/// Hashing is case-sensitive; callers are expected to use exact names.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameHash(pub u64);

impl NameHash {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(xxh3_64(name.as_bytes()))
    }
}

impl From<&str> for NameHash {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Debug for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameHash({:#018x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_hash() {
        assert_eq!(NameHash::new("Bip01_Spine"), NameHash::new("Bip01_Spine"));
        assert_ne!(NameHash::new("Bip01_Spine"), NameHash::new("Bip01_Spine1"));
    }

    #[test]
    fn case_sensitive() {
        assert_ne!(NameHash::new("Head"), NameHash::new("head"));
    }
}
