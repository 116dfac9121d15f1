//! Pre-hashed string identity.
//!
//! Every identifier in the mapping DSL — interface names, input names, config
//! tags, icon variables — is identified by a 32-bit rolling hash rather than
//! by the string itself. The tokenizer hashes as it scans, so the parser can
//! compare against keyword constants and index maps without materializing or
//! re-walking strings, and callers can precompute hashes of well-known inputs
//! (`StrHash::of("basic_gamepad.a")`) at compile time.
//!
//! The hash is djb2: `h₀ = 5381`, `hᵢ₊₁ = (hᵢ << 5) + hᵢ + byteᵢ`. The empty
//! string hashes to `5381`, which doubles as the "no value" sentinel for
//! optional references (e.g. a labels preset without a parent).
//!
//! ## Collision policy
//! Maps keyed by [`StrHash`] use the hash itself as the bucket key (identity
//! hasher). Collisions between distinct identifiers are possible in principle
//! and are not resolved at lookup time; database authors are responsible for
//! avoiding identifiers that collide with each other or with the reserved
//! keywords.

use std::collections::HashMap;
use std::hash::{BuildHasherDefault, Hash, Hasher};

use serde::{Deserialize, Serialize};

/// djb2 hash of an identifier, usable in `match` arms via `const` tables.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct StrHash(u32);

impl StrHash {
    /// Hash of the empty string; also the "none" sentinel.
    pub const EMPTY: StrHash = StrHash(5381);

    /// Hash a whole string.
    pub const fn of(s: &str) -> Self {
        Self::of_bytes(s.as_bytes())
    }

    /// Hash a whole byte slice.
    pub const fn of_bytes(bytes: &[u8]) -> Self {
        let mut h = Self::EMPTY;
        let mut i = 0;
        while i < bytes.len() {
            h = h.push(bytes[i]);
            i += 1;
        }
        h
    }

    /// Append one byte to the hashed string.
    #[inline]
    pub const fn push(self, byte: u8) -> Self {
        StrHash(
            self.0
                .wrapping_shl(5)
                .wrapping_add(self.0)
                .wrapping_add(byte as u32),
        )
    }

    /// Append a whole string to the hashed string.
    ///
    /// `StrHash::of("iface").push(b'.').extend("input")` equals
    /// `StrHash::of("iface.input")`.
    #[inline]
    pub fn extend(self, s: &str) -> Self {
        s.bytes().fold(self, StrHash::push)
    }

    /// Raw 32-bit value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl Default for StrHash {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl From<&str> for StrHash {
    fn from(name: &str) -> Self {
        StrHash::of(name)
    }
}

impl Hash for StrHash {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.0);
    }
}

/// Pass-through hasher for keys that are already hashes.
#[derive(Default)]
pub struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }

    #[inline]
    fn write_u32(&mut self, value: u32) {
        self.0 = u64::from(value);
    }

    fn write(&mut self, bytes: &[u8]) {
        // Only reached by keys that don't funnel through write_u32.
        for &b in bytes {
            self.0 = (self.0 << 8) | u64::from(b);
        }
    }
}

/// Map keyed by a pre-hashed identifier.
pub type StrHashMap<T> = HashMap<StrHash, T, BuildHasherDefault<IdentityHasher>>;
