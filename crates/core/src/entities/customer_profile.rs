//! CustomerProfile entity (§3): the persistent per-customer ledger that
//! survives across sessions and channels.

use crate::ids::{AgentId, ProfileId, TenantId};
use crate::tenant::TenantScoped;
use crate::variable::VarValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    UserCorrection,
    Inference,
    Tool,
    Verified,
}

/// One historical value a profile field has held, kept so operators (and
/// the gap-fill service, §4.9) can see how a value was arrived at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldHistoryEntry {
    pub value: VarValue,
    pub timestamp: DateTime<Utc>,
    pub source: FieldSource,
}

/// A single profile field: current value, confidence, provenance, and
/// the trail of prior values (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileField {
    pub value: VarValue,
    pub confidence: f32,
    pub source: FieldSource,
    pub history: Vec<FieldHistoryEntry>,
}

impl ProfileField {
    pub fn new(value: VarValue, confidence: f32, source: FieldSource) -> Self {
        Self {
            value,
            confidence,
            source,
            history: Vec::new(),
        }
    }

    /// Replace the current value, pushing the old one onto `history`.
    pub fn update(&mut self, value: VarValue, confidence: f32, source: FieldSource) {
        let previous = FieldHistoryEntry {
            value: self.value.clone(),
            timestamp: Utc::now(),
            source: self.source,
        };
        self.history.push(previous);
        self.value = value;
        self.confidence = confidence;
        self.source = source;
    }
}

/// A `(channel, user_channel_id)` identity linked to this profile, used by
/// `ProfileStore.get_by_channel` and `SessionStore.get_by_channel` to find
/// the right profile/session across channels without a shared login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChannelIdentity {
    pub channel: String,
    pub user_channel_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerProfile {
    #[serde(flatten)]
    pub header: TenantScoped,
    pub id: ProfileId,
    pub agent_id: AgentId,
    pub channel_identities: Vec<ChannelIdentity>,
    pub fields: HashMap<String, ProfileField>,
    /// Matches the owning `Agent.profile_schema_version` this profile was
    /// last reconciled against; the gap-fill and migration subsystems use
    /// this to decide whether a field is still defined at all (§4.9).
    pub schema_version: u32,
}

impl CustomerProfile {
    pub fn new(tenant_id: TenantId, agent_id: AgentId, schema_version: u32) -> Self {
        Self {
            header: TenantScoped::new(tenant_id),
            id: ProfileId::new(),
            agent_id,
            channel_identities: Vec::new(),
            fields: HashMap::new(),
            schema_version,
        }
    }

    pub fn field_value(&self, name: &str) -> Option<&VarValue> {
        self.fields.get(name).map(|f| &f.value)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: VarValue, confidence: f32, source: FieldSource) {
        let name = name.into();
        match self.fields.get_mut(&name) {
            Some(existing) => existing.update(value, confidence, source),
            None => {
                self.fields.insert(name, ProfileField::new(value, confidence, source));
            }
        }
        self.header.touch();
    }

    pub fn link_channel(&mut self, channel: impl Into<String>, user_channel_id: impl Into<String>) {
        let identity = ChannelIdentity {
            channel: channel.into(),
            user_channel_id: user_channel_id.into(),
        };
        if !self.channel_identities.contains(&identity) {
            self.channel_identities.push(identity);
            self.header.touch();
        }
    }

    /// Merge another profile's fields into this one (higher-confidence
    /// value wins per field), used when two channel identities turn out
    /// to be the same customer.
    pub fn merge_from(&mut self, other: &CustomerProfile) {
        for (name, field) in &other.fields {
            let should_replace = match self.fields.get(name) {
                Some(existing) => field.confidence > existing.confidence,
                None => true,
            };
            if should_replace {
                self.fields.insert(name.clone(), field.clone());
            }
        }
        for identity in &other.channel_identities {
            if !self.channel_identities.contains(identity) {
                self.channel_identities.push(identity.clone());
            }
        }
        self.header.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_pushes_previous_value_to_history() {
        let mut field = ProfileField::new(VarValue::from("standard"), 0.9, FieldSource::Inference);
        field.update(VarValue::from("vip"), 1.0, FieldSource::Verified);
        assert_eq!(field.value.as_str(), Some("vip"));
        assert_eq!(field.history.len(), 1);
        assert_eq!(field.history[0].value.as_str(), Some("standard"));
    }

    #[test]
    fn merge_prefers_higher_confidence() {
        let mut a = CustomerProfile::new(TenantId::new(), AgentId::new(), 1);
        a.set_field("tier", VarValue::from("standard"), 0.5, FieldSource::Inference);
        let mut b = CustomerProfile::new(TenantId::new(), AgentId::new(), 1);
        b.set_field("tier", VarValue::from("vip"), 0.95, FieldSource::Verified);

        a.merge_from(&b);
        assert_eq!(a.field_value("tier").unwrap().as_str(), Some("vip"));
    }
}
