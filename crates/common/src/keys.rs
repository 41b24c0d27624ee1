//! Storage key types.
//!
//! A [`Prefix`] is one level of a bucket's partition hierarchy, always
//! ending with the listing delimiter (`raw/2024/01/`). An [`ObjectKey`]
//! names a single stored object. Both order lexicographically by their
//! bytes, which is what "latest" means for partitions.

use std::fmt;

/// Delimiter used to group keys into prefixes.
pub const DELIMITER: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Prefix(String);

impl Prefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The final path segment without the trailing delimiter:
    /// `raw/2024/01/` yields `01`.
    pub fn last_segment(&self) -> &str {
        let trimmed = self.0.strip_suffix(DELIMITER).unwrap_or(&self.0);
        match trimmed.rfind(DELIMITER) {
            Some(idx) => &trimmed[idx + DELIMITER.len()..],
            None => trimmed,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Prefix {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Prefix {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Prefix {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased file extension of the final segment, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.0.rsplit(DELIMITER).next().unwrap_or(&self.0);
        name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ObjectKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
