//! Store interfaces consumed by the core (§6.1).
//!
//! Every trait here is tenant-scoped at the call site: implementations
//! must never return an entity belonging to a different tenant, and
//! soft-deleted items must never appear in a search. Timestamps on
//! persisted entities are monotonic `updated_at` values usable for
//! optimistic concurrency (§6.1 invariants).
//!
//! Each trait has at least one in-memory implementation in
//! `align-persistence`, built against the same trait a production
//! backend would implement (§4.12).

pub mod audit_store;
pub mod config_store;
pub mod memory_store;
pub mod profile_store;
pub mod session_store;

pub use audit_store::{AuditEvent, AuditStore, TimeRange};
pub use config_store::ConfigStore;
pub use memory_store::{Episode, EntityRecord, MemoryStore, RelationshipRecord};
pub use profile_store::ProfileStore;
pub use session_store::SessionStore;
