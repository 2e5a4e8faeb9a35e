use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;

/// Stable identifier of a user or group: its numeric uid or gid.
///
/// The orchestrator persists this in its string form. Every read, update and
/// delete resolves the entity through it rather than through the name, which
/// may have drifted since it was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u32);

impl EntityId {
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for EntityId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // `u32::from_str` tolerates a leading '+', persisted ids never have one
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Identifier(s.to_owned()));
        }
        s.parse()
            .map(Self)
            .map_err(|_| Error::Identifier(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("0", 0)]
    #[case("1024", 1024)]
    #[case("4294967294", 4_294_967_294)]
    fn parses_numeric_ids(#[case] input: &str, #[case] expected: u32) {
        let id: EntityId = input.parse().unwrap();
        assert_eq!(id.get(), expected);
        assert_eq!(id.to_string(), input);
    }

    #[rstest]
    #[case("")]
    #[case("testuser")]
    #[case("-1")]
    #[case("+12")]
    #[case(" 12")]
    #[case("99999999999")]
    fn rejects_malformed_ids(#[case] input: &str) {
        let error = input.parse::<EntityId>().unwrap_err();
        assert!(matches!(error, Error::Identifier(s) if s == input));
    }
}
