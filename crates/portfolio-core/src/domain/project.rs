//! Project identity: what the portfolio is made of.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Strategic category of a project. Used for grouping output, never for scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Pillar {
    Revenue,
    Infrastructure,
    Consistency,
    Cleanup,
    Innovation,
    #[default]
    Unknown,
}

impl From<String> for Pillar {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "revenue" => Self::Revenue,
            "infrastructure" => Self::Infrastructure,
            "consistency" => Self::Consistency,
            "cleanup" => Self::Cleanup,
            "innovation" => Self::Innovation,
            _ => Self::Unknown,
        }
    }
}

/// Operator-assigned priority of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

impl From<String> for Priority {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Unknown,
        }
    }
}

/// `owner/repo` identity of a repository hosted on the remote provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteIdentity {
    pub owner: String,
    pub name: String,
}

impl RemoteIdentity {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse a configured `"owner/repo"` string. Exactly two non-empty segments.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('/');
        let owner = parts.next().filter(|s| !s.is_empty())?;
        let name = parts.next().filter(|s| !s.is_empty())?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(owner, name))
    }
}

impl fmt::Display for RemoteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RemoteIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("expected 'owner/repo', got '{s}'"))
    }
}

impl TryFrom<String> for RemoteIdentity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RemoteIdentity> for String {
    fn from(value: RemoteIdentity) -> Self {
        value.to_string()
    }
}

/// One member of the portfolio. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique within a run.
    pub name: String,
    pub local_path: Option<PathBuf>,
    pub remote_identity: Option<RemoteIdentity>,
    pub pillar: Pillar,
    pub priority: Priority,
    pub description: String,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local_path: None,
            remote_identity: None,
            pillar: Pillar::Unknown,
            priority: Priority::Unknown,
            description: String::new(),
        }
    }

    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    pub fn with_remote(mut self, identity: RemoteIdentity) -> Self {
        self.remote_identity = Some(identity);
        self
    }

    pub fn with_pillar(mut self, pillar: Pillar) -> Self {
        self.pillar = pillar;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_identity_parse() {
        let id = RemoteIdentity::parse("acme/Widgets").unwrap();
        assert_eq!(id.owner, "acme");
        assert_eq!(id.name, "Widgets");
        assert_eq!(id.to_string(), "acme/Widgets");
    }

    #[test]
    fn test_remote_identity_rejects_bad_shapes() {
        assert!(RemoteIdentity::parse("").is_none());
        assert!(RemoteIdentity::parse("acme").is_none());
        assert!(RemoteIdentity::parse("acme/").is_none());
        assert!(RemoteIdentity::parse("/widgets").is_none());
        assert!(RemoteIdentity::parse("a/b/c").is_none());
    }

    #[test]
    fn test_remote_identity_serializes_as_string() {
        let id = RemoteIdentity::new("acme", "widgets");
        assert_eq!(serde_json::to_value(&id).unwrap(), "acme/widgets");
        let back: RemoteIdentity = serde_json::from_str("\"acme/widgets\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_unrecognised_pillar_and_priority_map_to_unknown() {
        let pillar: Pillar = serde_json::from_str("\"moonshots\"").unwrap();
        assert_eq!(pillar, Pillar::Unknown);
        let priority: Priority = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(priority, Priority::High);
        assert_eq!(serde_json::to_value(Pillar::Revenue).unwrap(), "revenue");
    }
}
