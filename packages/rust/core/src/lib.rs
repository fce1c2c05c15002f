//! Core workflows for Curricula.
//!
//! - [`harmonizer`]: propose synonym clusters with the similarity judge and
//!   commit them as canonical concepts.
//! - [`sync`]: reconcile course and slide nodes with the object store.

pub mod harmonizer;
pub mod sync;

pub use harmonizer::{
    ApplyReport, DuplicateName, FailedCluster, HarmonizeProgress, HarmonizeReport, SkippedBatch,
    apply_clusters, harmonize,
};
pub use sync::{
    GraphSnapshot, ReconcilePlan, SkippedCourse, StoreSnapshot, SyncProgress, SyncReport,
    plan_reconciliation, sync_graph,
};

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl HarmonizeProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn batch_done(&self, _current: usize, _total: usize) {}
    fn cluster_applied(&self, _current: usize, _total: usize, _canonical_name: &str) {}
}

impl SyncProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn course_done(&self, _current: usize, _total: usize, _course_id: &str) {}
}
