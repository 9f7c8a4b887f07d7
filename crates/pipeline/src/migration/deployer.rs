//! `MigrationDeployer` (§4.9): marks already-affected sessions
//! `pending_migration` once an operator has approved a plan.

use align_core::entities::MigrationPlan;
use align_core::ids::TenantId;
use align_core::session::PendingMigration;
use align_core::stores::SessionStore;
use align_core::{Error, Result};
use std::sync::Arc;

pub struct MigrationDeployer {
    session_store: Arc<dyn SessionStore>,
}

impl MigrationDeployer {
    pub fn new(session_store: Arc<dyn SessionStore>) -> Self {
        Self { session_store }
    }

    /// Deploy `plan`: for every anchor, find sessions parked at its V1
    /// hash and mark them pending. `plan` must already be `Approved`.
    #[tracing::instrument(skip(self, plan), fields(plan_id = %plan.id, anchors = plan.transformation_map.anchors.len()))]
    pub async fn deploy(&self, tenant_id: TenantId, plan: &MigrationPlan) -> Result<usize> {
        if !plan.is_deployable() {
            return Err(Error::invalid(format!("plan {} is not approved", plan.id)));
        }

        let mut marked = 0;
        for anchor in &plan.transformation_map.anchors {
            let session_ids = self
                .session_store
                .find_sessions_by_step_hash(tenant_id, plan.scenario_id, plan.from_version, &anchor.anchor_hash, plan.scope_filter.as_deref())
                .await?;

            for session_id in session_ids {
                let mut session = self.session_store.get(tenant_id, session_id).await?;
                session.pending_migration = Some(PendingMigration { plan_id: plan.id, anchor_hash: anchor.anchor_hash.clone() });
                self.session_store.save(session).await?;
                marked += 1;
            }
        }

        Ok(marked)
    }
}
