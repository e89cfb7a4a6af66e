//! Versioned schema snapshots.
//!
//! A schema record captures one immutable snapshot of a domain entity's
//! schema tree for an environment. Versions are strictly monotone per
//! (domain, entity, environment); publishing copies DEV into PRO.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Environment tag of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaEnv {
    /// Working environment; patches land here.
    Dev,
    /// Published environment; only written by publish.
    Pro,
}

impl SchemaEnv {
    /// Storage form of the tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "DEV",
            Self::Pro => "PRO",
        }
    }
}

impl std::str::FromStr for SchemaEnv {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEV" => Ok(Self::Dev),
            "PRO" => Ok(Self::Pro),
            other => Err(format!("unknown schema environment: {other}")),
        }
    }
}

/// One stored snapshot of a schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRecord {
    /// Row id.
    pub id: String,
    /// Domain entity kind ("table", "page", "flow").
    pub domain: String,
    /// Id of the entity the snapshot describes.
    pub entity_id: String,
    /// Owning project.
    pub project_id: String,
    /// Environment tag.
    pub env: SchemaEnv,
    /// Monotone version within (domain, entity, env).
    pub version: i64,
    /// The snapshot tree.
    pub schema: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-modification timestamp.
    pub updated_at: DateTime<Utc>,
}
