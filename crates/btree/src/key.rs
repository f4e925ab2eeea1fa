//! Fixed-size, trivially-copyable B+Tree keys (spec §3, §9: "do not box
//! keys"). A `Key` is any type that can round-trip through `KEY_BYTES` raw
//! bytes and supplies its own ordering; equality is never stored, only
//! derived from the comparator (`¬(a<b) ∧ ¬(b<a)`).

use std::cmp::Ordering;

/// Every on-disk key occupies exactly this many bytes, regardless of the
/// concrete `BTreeKey` in use.
pub const KEY_BYTES: usize = 16;

/// A trivially-copyable key with an external comparator. Implementors must
/// not allocate: `encode`/`decode` move bytes in and out of a node's fixed
/// entry slots with no indirection.
pub trait BTreeKey: Copy + std::fmt::Debug {
    fn encode(&self) -> [u8; KEY_BYTES];
    fn decode(bytes: [u8; KEY_BYTES]) -> Self;
    fn compare(&self, other: &Self) -> Ordering;

    /// Derived strictly from [`Self::compare`] per spec §3 — never an
    /// independent notion of equality.
    fn equals(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

/// A signed 64-bit integer key, little-endian encoded into the low 8 bytes
/// with the remainder zero-padded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Int64Key(pub i64);

impl BTreeKey for Int64Key {
    fn encode(&self) -> [u8; KEY_BYTES] {
        let mut buf = [0u8; KEY_BYTES];
        buf[0..8].copy_from_slice(&self.0.to_le_bytes());
        buf
    }

    fn decode(bytes: [u8; KEY_BYTES]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[0..8]);
        Int64Key(i64::from_le_bytes(raw))
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

/// A fixed-length, zero-padded byte-string key (spec §9's "model as
/// fixed-length zero-padded byte arrays whose lexicographic byte order is
/// the comparator"). Strings longer than `KEY_BYTES` bytes are rejected by
/// [`Self::new`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FixedStringKey(pub [u8; KEY_BYTES]);

impl FixedStringKey {
    pub fn new(s: &str) -> Self {
        assert!(
            s.len() <= KEY_BYTES,
            "key {s:?} exceeds {KEY_BYTES} bytes"
        );
        let mut buf = [0u8; KEY_BYTES];
        buf[..s.len()].copy_from_slice(s.as_bytes());
        Self(buf)
    }

    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(KEY_BYTES);
        String::from_utf8_lossy(&self.0[..end])
    }
}

impl std::fmt::Debug for FixedStringKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FixedStringKey({:?})", self.as_str())
    }
}

impl BTreeKey for FixedStringKey {
    fn encode(&self) -> [u8; KEY_BYTES] {
        self.0
    }

    fn decode(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int64_key_round_trips() {
        let key = Int64Key(-42);
        assert_eq!(Int64Key::decode(key.encode()), key);
    }

    #[test]
    fn int64_key_orders_numerically() {
        assert_eq!(Int64Key(1).compare(&Int64Key(2)), Ordering::Less);
        assert!(Int64Key(5).equals(&Int64Key(5)));
    }

    #[test]
    fn fixed_string_key_round_trips_and_orders_lexicographically() {
        let a = FixedStringKey::new("alpha");
        let b = FixedStringKey::new("beta");
        assert_eq!(a.compare(&b), Ordering::Less);
        assert_eq!(FixedStringKey::decode(a.encode()).as_str(), "alpha");
    }

    #[test]
    #[should_panic]
    fn fixed_string_key_rejects_oversized_input() {
        FixedStringKey::new("this string is far too long for a key");
    }
}
