//! `ProfileStore` (§6.1): the persistent customer-profile ledger.

use crate::entities::{CustomerProfile, FieldSource};
use crate::ids::{AgentId, ProfileId, TenantId};
use crate::variable::VarValue;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, tenant_id: TenantId, profile_id: ProfileId) -> Result<CustomerProfile>;

    async fn get_by_channel(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        channel: &str,
        user_channel_id: &str,
    ) -> Result<Option<CustomerProfile>>;

    async fn get_or_create(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        channel: &str,
        user_channel_id: &str,
        schema_version: u32,
    ) -> Result<CustomerProfile>;

    async fn update_field(
        &self,
        tenant_id: TenantId,
        profile_id: ProfileId,
        field_name: &str,
        value: VarValue,
        confidence: f32,
        source: FieldSource,
    ) -> Result<()>;

    /// Attach an opaque asset reference (e.g. an uploaded document) to the
    /// profile; the asset's own storage is outside this interface.
    async fn add_asset(&self, tenant_id: TenantId, profile_id: ProfileId, asset_ref: &str) -> Result<()>;

    async fn link_channel(
        &self,
        tenant_id: TenantId,
        profile_id: ProfileId,
        channel: &str,
        user_channel_id: &str,
    ) -> Result<()>;

    /// Merge `source` into `target` (§3 `CustomerProfile.merge_from`) and
    /// persist the result under `target`'s id.
    async fn merge(&self, tenant_id: TenantId, target: ProfileId, source: ProfileId) -> Result<CustomerProfile>;
}
