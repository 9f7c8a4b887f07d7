//! Tenant-scoped identifier newtypes.
//!
//! Every entity identifier is a distinct type wrapping a `Uuid` so that,
//! for instance, a `RuleId` cannot be passed where a `SessionId` is
//! expected even though both are structurally a UUID.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

id_type!(TenantId);
id_type!(AgentId);
id_type!(RuleId);
id_type!(ScenarioId);
id_type!(StepId);
id_type!(TemplateId);
id_type!(VariableId);
id_type!(ToolId);
id_type!(SessionId);
id_type!(TurnId);
id_type!(ProfileId);
id_type!(MigrationPlanId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types_with_stable_roundtrip() {
        let id = RuleId::new();
        let text = id.to_string();
        let parsed: RuleId = text.parse().unwrap();
        assert_eq!(id, parsed);
    }
}
