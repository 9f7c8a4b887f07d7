//! Example `Tool` (§4.7) implementations and a registry builder.
//!
//! Concrete tools are operator/integration-specific and therefore a
//! collaborator outside this specification's scope (§1); what belongs
//! here is the seam's shape. Each tool below is a small, simulated
//! stand-in — grounded in the same "simulate the external system,
//! persist what a real integration would persist" pattern a production
//! deployment's real tools would follow — so the Tool Executor (§4.7)
//! has something real to schedule, time out, and report on.

pub mod escalate;
pub mod lookup_account;
pub mod notify;
pub mod registry;
pub mod schedule_appointment;

pub use escalate::EscalateToHumanTool;
pub use lookup_account::LookupAccountTool;
pub use notify::SendNotificationTool;
pub use registry::build_default_registry;
pub use schedule_appointment::ScheduleAppointmentTool;
