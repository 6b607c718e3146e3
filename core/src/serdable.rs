use std::{fmt, ops::Deref};

use ::glob::PatternError;
use serde::{de, Deserialize, Deserializer};

/// `glob::Pattern` that can be read from a config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern(::glob::Pattern);

impl GlobPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        ::glob::Pattern::new(pattern).map(Self)
    }
}

impl Deref for GlobPattern {
    type Target = ::glob::Pattern;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for GlobPattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for GlobPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s)
            .map_err(|e| de::Error::custom(format!("invalid glob pattern '{}': {}", s, e)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Wrapper {
        sources: GlobPattern,
    }

    #[test]
    fn deserialize_glob_pattern_ok() {
        let w: Wrapper = toml::from_str(r#"sources = "*.[ch]pp""#).unwrap();
        assert_eq!(w.sources.to_string(), "*.[ch]pp");
        assert!(w.sources.matches("main.cpp"));
        assert!(!w.sources.matches("main.rs"));
    }

    #[test]
    fn deserialize_glob_pattern_ng() {
        let err = toml::from_str::<Wrapper>(r#"sources = "[a""#).unwrap_err();
        assert!(err.to_string().contains("invalid glob pattern '[a'"), "{}", err);
    }
}
