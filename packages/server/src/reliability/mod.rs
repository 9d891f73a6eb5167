pub mod classify;
pub mod engine;
pub mod escalation;
pub mod reconcile;

pub use classify::{ClassifierAgent, HttpClassifierAgent, Triage, should_classify};
pub use engine::{RecoveryOutcome, ReliabilityEngine};
pub use escalation::{EscalationService, FailureEntity, TicketOutcome, escalation_due};
pub use reconcile::{AssetSnapshot, FieldChange, Reconciler, derive_visibility, reconcile};
