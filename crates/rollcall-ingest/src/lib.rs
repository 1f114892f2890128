//! Attendance event ingestion.
//!
//! Terminals report each access twice over: once pushed to the webhook as it
//! happens, and again when the reconciler searches their event log. Both
//! copies flow through one path:
//!
//! ```text
//! webhook ─► queue ─► IngestWorker ─┐
//!                                   ├─► normalize ─► dedup ─► classify ─► SQLite
//! Reconciler ─► event search pages ─┘
//! ```
//!
//! - [`classifier`]: pure entry/exit derivation and tail re-derivation
//! - [`normalize`]: typed ids, UTC millisecond times, dedup keys
//! - [`IngestPipeline`]: the transactional write path, keyed by partition
//! - [`IngestWorker`]: bounded-concurrency consumer of pushed payloads
//! - [`Reconciler`]: cursor-driven event search per terminal
//!
//! Directions are derived per (device, subject) partition only; the same
//! subject on two terminals has two independent histories.

pub mod classifier;
pub mod config;
pub mod locks;
pub mod normalize;
pub mod pipeline;
pub mod reconciler;
pub mod worker;

pub use classifier::{Reclassification, classify, rederive};
pub use config::{IngestConfig, ReconcilerConfig};
pub use normalize::{NormalizedEvent, normalize};
pub use pipeline::{IngestOutcome, IngestPipeline, IngestReport};
pub use reconciler::{ReconcileReport, Reconciler};
pub use worker::{IngestWorker, WorkerStats};
