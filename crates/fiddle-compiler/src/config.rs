//! Compiler configuration.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostic::CompilerError;

/// Default config file name looked up by hosts.
pub const CONFIG_FILE: &str = "fiddle.json";

/// Configuration for a compile session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompilerConfig {
    /// Assembly name recorded in emitted images.
    pub assembly_name: String,

    /// Source language (default: "csharp").
    pub language: String,

    /// Language version used for parsing and feature gating.
    pub language_version: LanguageVersion,

    /// Whether top-level statements are accepted.
    pub output_kind: OutputKind,

    /// Upper bound for fetching a single reference unit.
    #[serde(with = "duration_secs")]
    pub fetch_timeout: Duration,

    /// Manifest entries must end with this to be fetched.
    pub reference_suffix: String,

    /// Add the built-in base runtime when the manifest lacks it.
    pub implicit_core_library: bool,

    /// Instruction budget per invocation.
    pub max_steps: u64,

    /// Maximum nested call depth per invocation.
    pub max_call_depth: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            assembly_name: "DynamicCode".to_string(),
            language: "csharp".to_string(),
            language_version: LanguageVersion::Preview,
            output_kind: OutputKind::Library,
            fetch_timeout: Duration::from_secs(30),
            reference_suffix: ".dll".to_string(),
            implicit_core_library: true,
            max_steps: 10_000_000,
            max_call_depth: 1024,
        }
    }
}

impl CompilerConfig {
    /// Parses a JSON config; missing keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self, CompilerError> {
        let config: Self = serde_json::from_str(text).map_err(|e| CompilerError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file.
    pub fn load(path: &Path) -> Result<Self, CompilerError> {
        let text = std::fs::read_to_string(path).map_err(|e| CompilerError::io(path, e.to_string()))?;
        Self::from_json(&text)
    }

    /// Checks values a session cannot work with.
    pub fn validate(&self) -> Result<(), CompilerError> {
        let invalid = |message: &str| {
            Err(CompilerError::InvalidConfig {
                message: message.to_string(),
            })
        };
        if self.assembly_name.trim().is_empty() {
            return invalid("assemblyName must not be empty");
        }
        if self.reference_suffix.is_empty() {
            return invalid("referenceSuffix must not be empty");
        }
        if self.max_steps == 0 {
            return invalid("maxSteps must be positive");
        }
        if self.max_call_depth == 0 {
            return invalid("maxCallDepth must be positive");
        }
        Ok(())
    }

    pub fn with_assembly_name(mut self, name: impl Into<String>) -> Self {
        self.assembly_name = name.into();
        self
    }

    pub fn with_language_version(mut self, version: LanguageVersion) -> Self {
        self.language_version = version;
        self
    }

    pub fn with_output_kind(mut self, kind: OutputKind) -> Self {
        self.output_kind = kind;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_reference_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.reference_suffix = suffix.into();
        self
    }

    pub fn with_implicit_core_library(mut self, enabled: bool) -> Self {
        self.implicit_core_library = enabled;
        self
    }

    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = steps;
        self
    }
}

// =============================================================================
// Language Version
// =============================================================================

/// C# language version; later versions accept more syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageVersion {
    CSharp2,
    CSharp3,
    CSharp5,
    CSharp6,
    CSharp7,
    CSharp8,
    CSharp9,
    CSharp10,
    CSharp11,
    CSharp12,
    Preview,
}

impl LanguageVersion {
    /// The newest released version.
    pub const LATEST: LanguageVersion = LanguageVersion::CSharp12;

    /// Short version text as used in compiler messages, e.g. `6` or `preview`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageVersion::CSharp2 => "2",
            LanguageVersion::CSharp3 => "3",
            LanguageVersion::CSharp5 => "5",
            LanguageVersion::CSharp6 => "6",
            LanguageVersion::CSharp7 => "7",
            LanguageVersion::CSharp8 => "8",
            LanguageVersion::CSharp9 => "9",
            LanguageVersion::CSharp10 => "10",
            LanguageVersion::CSharp11 => "11",
            LanguageVersion::CSharp12 => "12",
            LanguageVersion::Preview => "preview",
        }
    }
}

impl fmt::Display for LanguageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LanguageVersion {
    type Err = CompilerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_ascii_lowercase();
        let version = trimmed.strip_prefix("csharp").unwrap_or(&trimmed);
        match version {
            "2" => Ok(LanguageVersion::CSharp2),
            "3" => Ok(LanguageVersion::CSharp3),
            "5" => Ok(LanguageVersion::CSharp5),
            "6" => Ok(LanguageVersion::CSharp6),
            "7" => Ok(LanguageVersion::CSharp7),
            "8" => Ok(LanguageVersion::CSharp8),
            "9" => Ok(LanguageVersion::CSharp9),
            "10" => Ok(LanguageVersion::CSharp10),
            "11" => Ok(LanguageVersion::CSharp11),
            "12" | "latest" => Ok(LanguageVersion::LATEST),
            "preview" => Ok(LanguageVersion::Preview),
            _ => Err(CompilerError::InvalidConfig {
                message: format!("unknown language version '{}'", s),
            }),
        }
    }
}

/// Kind of unit being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputKind {
    #[default]
    Library,
    /// Accepts top-level statements and records an entry point.
    ConsoleApplication,
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.assembly_name, "DynamicCode");
        assert_eq!(config.language_version, LanguageVersion::Preview);
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_overrides_and_defaults() {
        let config = CompilerConfig::from_json(
            r#"{ "assemblyName": "Snippet", "languageVersion": "csharp6", "fetchTimeout": 2 }"#,
        )
        .unwrap();
        assert_eq!(config.assembly_name, "Snippet");
        assert_eq!(config.language_version, LanguageVersion::CSharp6);
        assert_eq!(config.fetch_timeout, Duration::from_secs(2));
        assert_eq!(config.reference_suffix, ".dll");
    }

    #[test]
    fn test_rejects_invalid_values() {
        let err = CompilerConfig::from_json(r#"{ "referenceSuffix": "" }"#).unwrap_err();
        assert!(matches!(err, CompilerError::InvalidConfig { .. }));
        assert!(CompilerConfig::from_json("{ nope").is_err());
    }

    #[test]
    fn test_language_version_parsing_and_order() {
        assert_eq!("7".parse::<LanguageVersion>().unwrap(), LanguageVersion::CSharp7);
        assert_eq!("latest".parse::<LanguageVersion>().unwrap(), LanguageVersion::CSharp12);
        assert_eq!("Preview".parse::<LanguageVersion>().unwrap(), LanguageVersion::Preview);
        assert!("4".parse::<LanguageVersion>().is_err());
        assert!(LanguageVersion::CSharp6 < LanguageVersion::CSharp10);
        assert!(LanguageVersion::Preview > LanguageVersion::LATEST);
    }
}
