//! Step content hashing, duplicated here (rather than depending on
//! `align-pipeline`, which itself depends on `align-core` and would
//! create a cycle) so `InMemorySessionStore::find_sessions_by_step_hash`
//! can recognize which sessions sit at a given anchor without the
//! migration subsystem's help. Identical algorithm to
//! `align_pipeline::migration::hashing::content_hash` (§4.9).

use align_core::entities::ScenarioStep;
use sha2::{Digest, Sha256};

pub fn content_hash(step: &ScenarioStep) -> String {
    let canonical = step.canonical_for_hash();
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    let bytes_needed = 16usize.div_ceil(2);
    digest.iter().take(bytes_needed).map(|b| format!("{b:02x}")).collect::<String>()[..16].to_string()
}
