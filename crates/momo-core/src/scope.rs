//! Geographic scope selectors.
//!
//! A selector is stored and round-tripped through chat callback payloads as a
//! stable token: `national`, `region:<name>` or `province:<name>`.
//! The legacy payloads `nacional`, `com_<name>` and `prov_<name>` are still
//! accepted when parsing so older databases keep working.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MomoError;

const NATIONAL_TOKEN: &str = "national";
const REGION_PREFIX: &str = "region:";
const PROVINCE_PREFIX: &str = "province:";

const LEGACY_NATIONAL: &str = "nacional";
const LEGACY_REGION_PREFIX: &str = "com_";
const LEGACY_PROVINCE_PREFIX: &str = "prov_";

/// Aggregation level of a dataset row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScopeLevel {
    National,
    Region,
    Province,
}

impl ScopeLevel {
    /// Map the dataset's `ambito` column.
    pub fn from_dataset_code(code: &str) -> Option<Self> {
        match code.trim() {
            "nacional" => Some(Self::National),
            "ccaa" => Some(Self::Region),
            "provincia" => Some(Self::Province),
            _ => None,
        }
    }

    pub fn dataset_code(&self) -> &'static str {
        match self {
            Self::National => "nacional",
            Self::Region => "ccaa",
            Self::Province => "provincia",
        }
    }
}

/// One geographic selection made by a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeSelector {
    National,
    Region(String),
    Province(String),
}

impl ScopeSelector {
    pub fn level(&self) -> ScopeLevel {
        match self {
            Self::National => ScopeLevel::National,
            Self::Region(_) => ScopeLevel::Region,
            Self::Province(_) => ScopeLevel::Province,
        }
    }

    /// Area name, `None` for the national scope.
    pub fn area_name(&self) -> Option<&str> {
        match self {
            Self::National => None,
            Self::Region(name) | Self::Province(name) => Some(name),
        }
    }

    /// Label shown to users.
    pub fn display_name(&self) -> &str {
        self.area_name().unwrap_or("Nacional")
    }

    /// Stable storage token.
    pub fn token(&self) -> String {
        match self {
            Self::National => NATIONAL_TOKEN.to_string(),
            Self::Region(name) => format!("{REGION_PREFIX}{name}"),
            Self::Province(name) => format!("{PROVINCE_PREFIX}{name}"),
        }
    }
}

impl fmt::Display for ScopeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

impl FromStr for ScopeSelector {
    type Err = MomoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == NATIONAL_TOKEN || s == LEGACY_NATIONAL {
            return Ok(Self::National);
        }

        let named = |name: &str, make: fn(String) -> Self| {
            if name.is_empty() {
                Err(MomoError::InvalidSelector(format!("empty area name in '{s}'")))
            } else {
                Ok(make(name.to_string()))
            }
        };

        if let Some(name) = s
            .strip_prefix(REGION_PREFIX)
            .or_else(|| s.strip_prefix(LEGACY_REGION_PREFIX))
        {
            return named(name, Self::Region);
        }
        if let Some(name) = s
            .strip_prefix(PROVINCE_PREFIX)
            .or_else(|| s.strip_prefix(LEGACY_PROVINCE_PREFIX))
        {
            return named(name, Self::Province);
        }

        Err(MomoError::InvalidSelector(s.to_string()))
    }
}

impl Serialize for ScopeSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token())
    }
}

impl<'de> Deserialize<'de> for ScopeSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        token.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        for sel in [
            ScopeSelector::National,
            ScopeSelector::Region("Madrid".into()),
            ScopeSelector::Province("Balears, Illes".into()),
        ] {
            let parsed: ScopeSelector = sel.token().parse().unwrap();
            assert_eq!(parsed, sel);
        }
    }

    #[test]
    fn test_token_keeps_surrounding_spaces() {
        for sel in [
            ScopeSelector::Region(" Madrid".into()),
            ScopeSelector::Province("Sevilla ".into()),
        ] {
            let parsed: ScopeSelector = sel.token().parse().unwrap();
            assert_eq!(parsed, sel);
        }
    }

    #[test]
    fn test_legacy_tokens() {
        assert_eq!("nacional".parse::<ScopeSelector>().unwrap(), ScopeSelector::National);
        assert_eq!(
            "com_Andalucía".parse::<ScopeSelector>().unwrap(),
            ScopeSelector::Region("Andalucía".into())
        );
        assert_eq!(
            "prov_Sevilla".parse::<ScopeSelector>().unwrap(),
            ScopeSelector::Province("Sevilla".into())
        );
    }

    #[test]
    fn test_invalid_tokens() {
        assert!("".parse::<ScopeSelector>().is_err());
        assert!("region:".parse::<ScopeSelector>().is_err());
        assert!("city:Madrid".parse::<ScopeSelector>().is_err());
    }

    #[test]
    fn test_serde_as_token() {
        let sels = vec![ScopeSelector::National, ScopeSelector::Region("Madrid".into())];
        let json = serde_json::to_string(&sels).unwrap();
        assert_eq!(json, r#"["national","region:Madrid"]"#);
        let back: Vec<ScopeSelector> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sels);
    }

    #[test]
    fn test_dataset_codes() {
        assert_eq!(ScopeLevel::from_dataset_code("ccaa"), Some(ScopeLevel::Region));
        assert_eq!(ScopeLevel::from_dataset_code("municipio"), None);
        assert_eq!(ScopeLevel::Province.dataset_code(), "provincia");
    }
}
