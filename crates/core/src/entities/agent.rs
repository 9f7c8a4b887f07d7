//! Agent entity (§3): the tenant-scoped root grouping everything an
//! operator authors for one conversational persona.

use crate::ids::AgentId;
use crate::tenant::TenantScoped;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileFieldType {
    String,
    Number,
    Bool,
    DateTime,
}

/// Describes one field of a `CustomerProfile` as the agent's
/// `profile_schema_version` currently defines it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileFieldDef {
    pub name: String,
    pub field_type: ProfileFieldType,
    pub description: String,
    pub extraction_hint: Option<String>,
}

/// Minimal generation settings carried on the agent; the full
/// configuration surface (§6.3) lives in the configuration crate and
/// layers agent-level overrides onto process-wide defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            temperature: 0.3,
            max_tokens: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    #[serde(flatten)]
    pub header: TenantScoped,
    pub id: AgentId,
    pub name: String,
    pub generation: GenerationSettings,
    pub profile_schema_version: u32,
    pub profile_fields: Vec<ProfileFieldDef>,
}
