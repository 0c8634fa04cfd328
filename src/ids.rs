use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Strongly typed action identifier backed by ULID.
///
/// Stable for the lifetime of an action descriptor; caches key on it.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct ActionId(pub ulid::Ulid);

impl ActionId {
    #[must_use]
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Parse a manifest-supplied id; if absent or invalid, generate a new one.
    #[must_use]
    pub fn parse_or_new(value: Option<&str>) -> Self {
        value
            .and_then(|s| s.parse::<ActionId>().ok())
            .unwrap_or_default()
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ActionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ActionId(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for ActionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ActionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<ActionId>()
            .map_err(|_| serde::de::Error::custom("invalid action id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_ids_and_replaces_invalid_ones() {
        let id = ActionId::new();
        assert_eq!(ActionId::parse_or_new(Some(id.to_string().as_str())), id);
        assert_ne!(ActionId::parse_or_new(Some("not-a-ulid")), id);
        assert_ne!(ActionId::new(), ActionId::new());
    }
}
