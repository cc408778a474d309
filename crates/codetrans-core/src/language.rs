//! Supported programming languages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A programming language the translation model can read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Java,
    Cpp,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Python, Language::Java, Language::Cpp];

    /// Canonical wire name, also used verbatim inside prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Java => "java",
            Self::Cpp => "c++",
        }
    }

    /// Exact wire-name match, as accepted in request bodies.
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "python" => Some(Self::Python),
            "java" => Some(Self::Java),
            "c++" => Some(Self::Cpp),
            _ => None,
        }
    }

    /// Lenient parse for command-line input.
    ///
    /// Matching ignores case and surrounding whitespace; `cpp` is accepted as
    /// an alias for `c++`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "python" => Some(Self::Python),
            "java" => Some(Self::Java),
            "c++" | "cpp" => Some(Self::Cpp),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_wire(s).ok_or_else(|| {
            Error::InvalidInput(format!(
                "Unsupported language '{}'; expected one of: python, java, c++",
                s
            ))
        })
    }
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_names() {
        assert_eq!(Language::parse("python"), Some(Language::Python));
        assert_eq!(Language::parse("java"), Some(Language::Java));
        assert_eq!(Language::parse("c++"), Some(Language::Cpp));
    }

    #[test]
    fn parse_is_case_insensitive_and_accepts_cpp_alias() {
        assert_eq!(Language::parse(" Java "), Some(Language::Java));
        assert_eq!(Language::parse("CPP"), Some(Language::Cpp));
    }

    #[test]
    fn wire_names_are_exact() {
        assert_eq!(Language::from_wire("c++"), Some(Language::Cpp));
        for raw in ["Java", "cpp", " python ", "PYTHON", ""] {
            assert!(Language::from_wire(raw).is_none(), "{raw:?} accepted");
            assert!(serde_json::from_value::<Language>(serde_json::json!(raw)).is_err());
        }
    }

    #[test]
    fn rejects_unknown_language() {
        assert!(Language::parse("rust").is_none());
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn serializes_to_wire_name() {
        let json = serde_json::to_string(&Language::Cpp).unwrap();
        assert_eq!(json, "\"c++\"");
        let parsed: Language = serde_json::from_str("\"python\"").unwrap();
        assert_eq!(parsed, Language::Python);
    }
}
