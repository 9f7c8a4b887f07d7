//! Reusable scoping headers embedded in every entity.
//!
//! Collapses the source's inheritance-heavy `TenantScopedModel` /
//! `AgentScopedModel` base classes into plain embedded structs.

use crate::ids::{AgentId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header embedded in every tenant-scoped entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantScoped {
    pub tenant_id: TenantId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TenantScoped {
    pub fn new(tenant_id: TenantId) -> Self {
        let now = Utc::now();
        Self {
            tenant_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn soft_delete(&mut self) {
        let now = Utc::now();
        self.deleted_at = Some(now);
        self.updated_at = now;
    }
}

/// Header embedded in every agent-scoped entity; wraps [`TenantScoped`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentScoped {
    #[serde(flatten)]
    pub tenant: TenantScoped,
    pub agent_id: AgentId,
}

impl AgentScoped {
    pub fn new(tenant_id: TenantId, agent_id: AgentId) -> Self {
        Self {
            tenant: TenantScoped::new(tenant_id),
            agent_id,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant.tenant_id
    }

    pub fn is_deleted(&self) -> bool {
        self.tenant.is_deleted()
    }

    pub fn touch(&mut self) {
        self.tenant.touch();
    }

    pub fn soft_delete(&mut self) {
        self.tenant.soft_delete();
    }
}
