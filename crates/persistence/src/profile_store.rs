//! In-memory `ProfileStore` (§6.1): the persistent customer-profile
//! ledger, keyed by profile id with a secondary channel-identity index.

use align_core::entities::{CustomerProfile, FieldSource};
use align_core::ids::{AgentId, ProfileId, TenantId};
use align_core::variable::VarValue;
use align_core::stores::ProfileStore;
use align_core::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: DashMap<(TenantId, ProfileId), CustomerProfile>,
    by_channel: DashMap<(TenantId, String, String), ProfileId>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, tenant_id: TenantId, profile_id: ProfileId) -> Result<CustomerProfile> {
        self.profiles.get(&(tenant_id, profile_id)).map(|e| e.clone()).ok_or_else(|| Error::not_found(format!("profile {profile_id}")))
    }

    async fn get_by_channel(&self, tenant_id: TenantId, _agent_id: AgentId, channel: &str, user_channel_id: &str) -> Result<Option<CustomerProfile>> {
        let Some(profile_id) = self.by_channel.get(&(tenant_id, channel.to_string(), user_channel_id.to_string())).map(|e| *e) else {
            return Ok(None);
        };
        Ok(self.profiles.get(&(tenant_id, profile_id)).map(|e| e.clone()))
    }

    async fn get_or_create(&self, tenant_id: TenantId, agent_id: AgentId, channel: &str, user_channel_id: &str, schema_version: u32) -> Result<CustomerProfile> {
        if let Some(existing) = self.get_by_channel(tenant_id, agent_id, channel, user_channel_id).await? {
            return Ok(existing);
        }
        let mut profile = CustomerProfile::new(tenant_id, agent_id, schema_version);
        profile.link_channel(channel, user_channel_id);
        let key = (tenant_id, profile.id);
        self.by_channel.insert((tenant_id, channel.to_string(), user_channel_id.to_string()), profile.id);
        self.profiles.insert(key, profile.clone());
        Ok(profile)
    }

    async fn update_field(&self, tenant_id: TenantId, profile_id: ProfileId, field_name: &str, value: VarValue, confidence: f32, source: FieldSource) -> Result<()> {
        let mut profile = self.profiles.get_mut(&(tenant_id, profile_id)).ok_or_else(|| Error::not_found(format!("profile {profile_id}")))?;
        profile.set_field(field_name, value, confidence, source);
        Ok(())
    }

    async fn add_asset(&self, tenant_id: TenantId, profile_id: ProfileId, asset_ref: &str) -> Result<()> {
        let mut profile = self.profiles.get_mut(&(tenant_id, profile_id)).ok_or_else(|| Error::not_found(format!("profile {profile_id}")))?;
        profile.set_field(format!("asset:{asset_ref}"), VarValue::from(asset_ref), 1.0, FieldSource::Tool);
        Ok(())
    }

    async fn link_channel(&self, tenant_id: TenantId, profile_id: ProfileId, channel: &str, user_channel_id: &str) -> Result<()> {
        let mut profile = self.profiles.get_mut(&(tenant_id, profile_id)).ok_or_else(|| Error::not_found(format!("profile {profile_id}")))?;
        profile.link_channel(channel, user_channel_id);
        self.by_channel.insert((tenant_id, channel.to_string(), user_channel_id.to_string()), profile_id);
        Ok(())
    }

    async fn merge(&self, tenant_id: TenantId, target: ProfileId, source: ProfileId) -> Result<CustomerProfile> {
        let source_profile = self.get(tenant_id, source).await?;
        let mut target_profile = self.profiles.get_mut(&(tenant_id, target)).ok_or_else(|| Error::not_found(format!("profile {target}")))?;
        target_profile.merge_from(&source_profile);
        for identity in &target_profile.channel_identities {
            self.by_channel.insert((tenant_id, identity.channel.clone(), identity.user_channel_id.clone()), target);
        }
        Ok(target_profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_idempotent_per_channel() {
        let store = InMemoryProfileStore::new();
        let tenant = TenantId::new();
        let agent = AgentId::new();
        let first = store.get_or_create(tenant, agent, "web", "u1", 1).await.unwrap();
        let second = store.get_or_create(tenant, agent, "web", "u1", 1).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn merge_redirects_source_channel_identities_to_target() {
        let store = InMemoryProfileStore::new();
        let tenant = TenantId::new();
        let agent = AgentId::new();
        let target = store.get_or_create(tenant, agent, "web", "u1", 1).await.unwrap();
        let source = store.get_or_create(tenant, agent, "sms", "u1-phone", 1).await.unwrap();
        store.update_field(tenant, source.id, "tier", VarValue::from("vip"), 0.9, FieldSource::Verified).await.unwrap();

        let merged = store.merge(tenant, target.id, source.id).await.unwrap();
        assert_eq!(merged.field_value("tier").unwrap().as_str(), Some("vip"));

        let found = store.get_by_channel(tenant, agent, "web", "u1").await.unwrap().unwrap();
        assert_eq!(found.id, target.id);
    }
}
