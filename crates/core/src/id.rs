// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier generation and inline ID buffers.
//!
//! All generated identifiers share one shape: a 4-character node prefix, a
//! dash, and an 18-character alphanumeric suffix from a single randomness
//! source. The node prefix comes from engine configuration so identifiers
//! minted on different nodes never collide on shape alone.

/// Maximum byte length for an inline ID.
///
/// Generated IDs are exactly 23 bytes (4-char node prefix + `-` + 18-char
/// nanoid). `new` accepts shorter IDs but debug-asserts they fit.
pub const ID_MAX_LEN: usize = 23;

/// Length of the random suffix in generated identifiers.
const SUFFIX_LEN: usize = 18;

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    if s.len() <= n {
        s
    } else {
        &s[..n]
    }
}

/// Fixed-size inline ID buffer. Always ≤ 23 ASCII bytes, `Copy`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IdBuf {
    len: u8,
    buf: [u8; ID_MAX_LEN],
}

impl std::hash::Hash for IdBuf {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Hash only the active bytes so it matches str::hash,
        // which is required for Borrow<str> HashMap lookups.
        self.as_str().hash(state);
    }
}

impl IdBuf {
    pub const fn empty() -> Self {
        Self { len: 0, buf: [0; ID_MAX_LEN] }
    }

    pub fn new(s: &str) -> Self {
        debug_assert!(
            s.len() <= ID_MAX_LEN,
            "ID exceeds {} bytes ({} bytes): {:?}",
            ID_MAX_LEN,
            s.len(),
            s,
        );
        let len = s.len().min(ID_MAX_LEN);
        let mut buf = [0u8; ID_MAX_LEN];
        buf[..len].copy_from_slice(&s.as_bytes()[..len]);
        Self { len: len as u8, buf }
    }

    pub fn as_str(&self) -> &str {
        // Invariant: only constructed from &str, always valid UTF-8.
        match std::str::from_utf8(&self.buf[..self.len as usize]) {
            Ok(s) => s,
            Err(_) => unreachable!("IdBuf constructed from non-UTF-8"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::borrow::Borrow<str> for IdBuf {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Debug for IdBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl std::fmt::Display for IdBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl serde::Serialize for IdBuf {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for IdBuf {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct IdBufVisitor;

        impl<'de> serde::de::Visitor<'de> for IdBufVisitor {
            type Value = IdBuf;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a string")
            }

            fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                build_id_buf(s)
            }

            fn visit_borrowed_str<E>(self, s: &'de str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                build_id_buf(s)
            }

            fn visit_string<E>(self, s: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                build_id_buf(&s)
            }
        }

        fn build_id_buf<E>(s: &str) -> Result<IdBuf, E>
        where
            E: serde::de::Error,
        {
            if s.len() > ID_MAX_LEN {
                return Err(serde::de::Error::custom(format!(
                    "ID exceeds {} bytes: {:?}",
                    ID_MAX_LEN, s
                )));
            }
            Ok(IdBuf::new(s))
        }

        deserializer.deserialize_str(IdBufVisitor)
    }
}

/// Build a `<node>-<suffix>` identifier string. The node prefix is clamped
/// to 4 bytes; short prefixes are used as-is.
#[doc(hidden)]
pub fn generate_raw(node: &str) -> String {
    format!("{}-{}", short(node, 4), nanoid::nanoid!(SUFFIX_LEN))
}

/// Define a newtype ID wrapper around [`IdBuf`].
///
/// Generates `generate(node)` for random ID creation, `new()` for parsing,
/// `as_str()`, `suffix()`, `short()`, `Display`, `From`, `PartialEq<str>`,
/// `Borrow<str>`, and `Deref` implementations.
///
/// The generated format is `{node}-{nanoid}` where:
/// - `node`: 4-character node prefix from engine configuration
/// - `nanoid`: 18-character random suffix
/// - Total: 23 characters (exactly fits [`IdBuf`] capacity)
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name($crate::id::IdBuf);

        impl $name {
            /// Generate a new random ID under the given node prefix.
            pub fn generate(node: &str) -> Self {
                Self($crate::id::IdBuf::new(&$crate::id::generate_raw(node)))
            }

            /// Create an ID from an existing string (for parsing/deserialization).
            pub fn new(id: impl AsRef<str>) -> Self {
                Self($crate::id::IdBuf::new(id.as_ref()))
            }

            pub const fn empty() -> Self {
                Self($crate::id::IdBuf::empty())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// The random suffix (everything past the first dash).
            pub fn suffix(&self) -> &str {
                match self.0.as_str().split_once('-') {
                    Some((_, rest)) => rest,
                    None => self.0.as_str(),
                }
            }

            /// Returns a string slice of the suffix truncated to at most `n` characters.
            pub fn short(&self, n: usize) -> &str {
                $crate::id::short(self.suffix(), n)
            }

            /// Returns true if the ID is an empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0.as_str())
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&String> for $name {
            fn from(s: &String) -> Self {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.0.as_str()
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0.as_str() == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0.as_str() == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.0.as_str()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                self.0.as_str()
            }
        }
    };
}

crate::define_id! {
    /// Unique identifier for a process instance.
    pub struct InstanceId;
}

crate::define_id! {
    /// Unique identifier for an execution token.
    pub struct TokenId;
}

crate::define_id! {
    /// Unique key for an external job handed to a worker.
    pub struct JobKey;
}

crate::define_id! {
    /// Unique identifier for a scheduled timer.
    pub struct TimerId;
}

crate::define_id! {
    /// Unique identifier for a message subscription.
    pub struct SubscriptionId;
}

crate::define_id! {
    /// Unique identifier for a published or buffered message.
    pub struct MessageId;
}

crate::define_id! {
    /// Unique identifier for an incident.
    pub struct IncidentId;
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
