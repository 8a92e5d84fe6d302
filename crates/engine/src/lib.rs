//! Knowgap Engine
//!
//! The self-healing knowledge-gap engine:
//! - Vector retrieval over document passages with a two-threshold verdict
//! - Online single-pass clustering of unanswered questions
//! - Priority scoring and edge-triggered threshold alerts
//! - Orphan batch grouping and best-effort AI labeling
//! - Resolution workflow that folds answers back into the corpus

pub mod cluster;
pub mod gap;
pub mod hooks;
pub mod resolve;
pub mod retrieval;
pub mod store;
pub mod vecmath;

pub use gap::{Assignment, AssignmentGuard, ClusterView, GapEngine};
pub use resolve::{PgResponseCorpus, ResolutionOutcome, ResolutionWorkflow, ResponseCorpus};
pub use retrieval::{PassageIndex, RetrievalService, RetrievedSource, Verdict};
