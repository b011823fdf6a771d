//! Per-node scheduler handles.
//!
//! Every copy-set member keeps one handle per slot it belongs to: the slot leader's handle is
//! active, the others are standby replicas pre-loaded with the same jobs so that a promotion
//! needs no reload.
//!
//! Handles are keyed by node and slot (`scheduler-{node_id}-{copy_set_id}`), not by node alone.
//! A node usually sits in several slots with different intervals, and one handle per node could
//! only hold one of them; with the slot in the key each assignment reconciles independently.

pub mod handle;
pub mod lifecycle;
pub mod registry;

pub use handle::{scheduler_name, SchedulerConfig, SchedulerHandle, SchedulerRole};
pub use lifecycle::SchedulerLifecycleManager;
pub use registry::{SchedulerRegistry, SharedScheduler};
