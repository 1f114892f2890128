//! Face enrollment on biometric terminals.
//!
//! Enrolling a subject means driving a terminal through capture, user
//! creation and face binding, each of which can stall, fail transiently or
//! be rejected outright. [`EnrollmentOrchestrator`] runs that handshake as an
//! explicit [`StageMachine`] over an injectable clock, with one shared retry
//! budget, a wall-clock deadline and cooperative cancellation.
//!
//! Every stage change is persisted through the storage crate's
//! `EnrollmentRepository`, so a finished session stays queryable after the
//! orchestrator forgets it.

pub mod config;
pub mod orchestrator;
pub mod stage;

pub use config::EnrollmentConfig;
pub use orchestrator::{EnrollmentFailure, EnrollmentOrchestrator, EnrollmentOutcome, EnrollmentRequest};
pub use stage::{EnrollmentStage, StageMachine, StageTransition};
