/*!
 * Synchronization Configuration
 *
 * Writer admission policy for per-key access
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::errors::StoreError;

/// How writers on the same key are admitted relative to each other
///
/// Readers and writers always exclude each other. The policy only decides
/// whether two writers may hold the same key at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriterPolicy {
    /// Writers also wait for other writers (exclusive write)
    #[default]
    Strict,
    /// Writers only wait for readers; concurrent writers on one key may overlap
    Permissive,
}

impl WriterPolicy {
    /// Whether a writer must wait for an active writer on the same key
    #[inline]
    pub const fn excludes_writers(self) -> bool {
        matches!(self, Self::Strict)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Permissive => "permissive",
        }
    }
}

impl fmt::Display for WriterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriterPolicy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" => Ok(Self::Permissive),
            other => Err(StoreError::Config(format!(
                "unknown writer policy {other:?} (expected \"strict\" or \"permissive\")"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_strict() {
        assert_eq!(WriterPolicy::default(), WriterPolicy::Strict);
        assert!(WriterPolicy::Strict.excludes_writers());
        assert!(!WriterPolicy::Permissive.excludes_writers());
    }

    #[test]
    fn test_parse() {
        assert_eq!("Strict".parse::<WriterPolicy>().unwrap(), WriterPolicy::Strict);
        assert_eq!(
            " permissive ".parse::<WriterPolicy>().unwrap(),
            WriterPolicy::Permissive
        );
        assert!("shared".parse::<WriterPolicy>().is_err());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&WriterPolicy::Permissive).unwrap();
        assert_eq!(json, "\"permissive\"");
        let back: WriterPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, WriterPolicy::Permissive);
    }
}
