//! Table keys.
//!
//! A table is addressed by the container ("base") it lives in plus its own
//! identifier. Tables are independent keyspaces: record ids only need to be
//! unique within one table.

use crate::{error::Result, Error};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Separator between the base and table halves of the textual form.
pub const TABLE_KEY_SEPARATOR: char = ':';

/// Identifies a logical table as `base_id:table_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableKey {
    base_id: String,
    table_id: String,
}

impl TableKey {
    /// Create a table key, rejecting empty halves and embedded separators.
    pub fn new(base_id: impl Into<String>, table_id: impl Into<String>) -> Result<Self> {
        let base_id = base_id.into();
        let table_id = table_id.into();

        if base_id.is_empty() || table_id.is_empty() {
            return Err(Error::InvalidTableKey(format!("{base_id}:{table_id}")));
        }
        if base_id.contains(TABLE_KEY_SEPARATOR) {
            return Err(Error::InvalidTableKey(format!("{base_id}:{table_id}")));
        }

        Ok(Self { base_id, table_id })
    }

    /// The container half.
    pub fn base_id(&self) -> &str {
        &self.base_id
    }

    /// The table half.
    pub fn table_id(&self) -> &str {
        &self.table_id
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.base_id, TABLE_KEY_SEPARATOR, self.table_id)
    }
}

impl FromStr for TableKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (base_id, table_id) = s
            .split_once(TABLE_KEY_SEPARATOR)
            .ok_or_else(|| Error::InvalidTableKey(s.to_string()))?;
        Self::new(base_id, table_id)
    }
}

impl Serialize for TableKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TableKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let key: TableKey = "base1:tbl1".parse().unwrap();
        assert_eq!(key.base_id(), "base1");
        assert_eq!(key.table_id(), "tbl1");
        assert_eq!(key.to_string(), "base1:tbl1");
    }

    #[test]
    fn table_half_may_contain_separator() {
        let key: TableKey = "base1:tbl:archive".parse().unwrap();
        assert_eq!(key.base_id(), "base1");
        assert_eq!(key.table_id(), "tbl:archive");
    }

    #[test]
    fn reject_malformed() {
        assert!(matches!(
            "base1".parse::<TableKey>(),
            Err(Error::InvalidTableKey(_))
        ));
        assert!(matches!(
            ":tbl1".parse::<TableKey>(),
            Err(Error::InvalidTableKey(_))
        ));
        assert!(matches!(
            "base1:".parse::<TableKey>(),
            Err(Error::InvalidTableKey(_))
        ));
        assert!(TableKey::new("a:b", "c").is_err());
    }

    #[test]
    fn serializes_as_string() {
        let key = TableKey::new("base1", "tbl1").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"base1:tbl1\"");

        let parsed: TableKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);

        assert!(serde_json::from_str::<TableKey>("\"nokey\"").is_err());
    }
}
