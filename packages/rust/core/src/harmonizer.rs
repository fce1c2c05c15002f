//! Concept harmonization: propose synonym clusters, then commit them.
//!
//! [`harmonize`] reads unaligned concepts, fans batches out to the
//! similarity judge, and validates what comes back. It never writes.
//! [`apply_clusters`] turns clusters into canonical concepts and `ALIGNS_TO`
//! edges, one transaction per cluster.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use curricula_judge::{ConceptRecord, JudgeError, ProposedCluster, SimilarityJudge};
use curricula_shared::{
    Cluster, ConceptId, CurriculaError, HarmonizeConfig, Result, canonical_key,
};
use curricula_storage::Storage;

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for harmonize and apply.
pub trait HarmonizeProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each judge batch is collected, in batch order.
    fn batch_done(&self, current: usize, total: usize);
    /// Called after each cluster commit attempt.
    fn cluster_applied(&self, current: usize, total: usize, canonical_name: &str);
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// A judge batch whose clusters were dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedBatch {
    pub index: usize,
    pub size: usize,
    pub reason: String,
}

/// Clusters from different batches that share a canonical name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateName {
    pub canonical_name: String,
    /// Positions in [`HarmonizeReport::clusters`].
    pub cluster_indices: Vec<usize>,
}

/// Result of [`harmonize`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarmonizeReport {
    /// Valid clusters, in batch order then judge order.
    pub clusters: Vec<Cluster>,
    pub concepts_considered: usize,
    pub batches_total: usize,
    pub batches_skipped: Vec<SkippedBatch>,
    /// Clusters left with fewer than two members after validation.
    pub singletons_dropped: usize,
    /// Clusters the judge returned without a usable name.
    pub unnamed_dropped: usize,
    /// Member references outside the batch, or claimed by an earlier cluster.
    pub members_dropped: usize,
    pub duplicate_names: Vec<DuplicateName>,
}

/// A cluster whose transaction was rolled back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedCluster {
    pub index: usize,
    pub canonical_name: String,
    pub reason: String,
}

/// Result of [`apply_clusters`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyReport {
    pub clusters_applied: usize,
    /// Clusters whose members were all aligned already, under a name no
    /// canonical carries. Nothing was written for them.
    pub clusters_unchanged: usize,
    pub canonicals_created: usize,
    pub canonicals_reused: usize,
    pub edges_created: usize,
    /// Members skipped because they were already aligned.
    pub edges_already_present: usize,
    pub failed: Vec<FailedCluster>,
}

// ---------------------------------------------------------------------------
// harmonize
// ---------------------------------------------------------------------------

/// Propose synonym clusters for the concepts in `storage`.
///
/// Judge failures skip their batch and are recorded in the report; only
/// configuration and store read errors fail the call.
#[instrument(skip_all, fields(model = judge.model(), batch_size = config.batch_size))]
pub async fn harmonize(
    storage: &Storage,
    judge: Arc<dyn SimilarityJudge>,
    config: &HarmonizeConfig,
    progress: &dyn HarmonizeProgress,
) -> Result<HarmonizeReport> {
    config.validate()?;
    let start = Instant::now();

    progress.phase("Loading concepts");
    let concepts = storage.list_concepts(!config.include_aligned).await?;
    let records: Vec<ConceptRecord> = concepts
        .into_iter()
        .map(|c| ConceptRecord {
            id: c.id,
            name: c.name,
            description: c.description,
        })
        .collect();

    let batches: Vec<Vec<ConceptRecord>> = records
        .chunks(config.batch_size)
        .map(<[ConceptRecord]>::to_vec)
        .collect();

    let mut report = HarmonizeReport {
        concepts_considered: records.len(),
        batches_total: batches.len(),
        ..Default::default()
    };

    info!(
        concepts = records.len(),
        batches = batches.len(),
        concurrency = config.concurrency,
        "starting harmonization"
    );

    progress.phase("Judging batches");
    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let mut handles = Vec::with_capacity(batches.len());

    for batch in &batches {
        // Single-concept batches cannot form a cluster.
        if batch.len() < 2 {
            handles.push(None);
            continue;
        }
        let sem = Arc::clone(&semaphore);
        let judge = Arc::clone(&judge);
        let batch = batch.clone();
        let timeout = config.judge_timeout;
        let backoff = config.retry_backoff;

        handles.push(Some(tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return Err(JudgeError::Transport("batch scheduler closed".into()));
            };
            judge_with_retry(judge.as_ref(), &batch, timeout, backoff).await
        })));
    }

    // Collect in batch order.
    let total = batches.len();
    for (index, (handle, batch)) in handles.into_iter().zip(&batches).enumerate() {
        let outcome = match handle {
            None => Ok(Vec::new()),
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => Err(JudgeError::Transport(format!("judge task failed: {e}"))),
            },
        };

        match outcome {
            Ok(proposed) => {
                let proposed_count = proposed.len();
                let accepted = sanitize_batch(proposed, batch, &mut report);
                debug!(
                    batch = index,
                    proposed = proposed_count,
                    accepted = accepted.len(),
                    "batch judged"
                );
                report.clusters.extend(accepted);
            }
            Err(e) => {
                warn!(batch = index, size = batch.len(), error = %e, "batch skipped");
                report.batches_skipped.push(SkippedBatch {
                    index,
                    size: batch.len(),
                    reason: e.to_string(),
                });
            }
        }
        progress.batch_done(index + 1, total);
    }

    report.duplicate_names = find_duplicate_names(&report.clusters);
    for dup in &report.duplicate_names {
        warn!(
            canonical = %dup.canonical_name,
            clusters = ?dup.cluster_indices,
            "canonical name proposed by more than one batch"
        );
    }

    info!(
        clusters = report.clusters.len(),
        batches_skipped = report.batches_skipped.len(),
        singletons_dropped = report.singletons_dropped,
        members_dropped = report.members_dropped,
        duplicate_names = report.duplicate_names.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "harmonization complete"
    );

    Ok(report)
}

/// One judge call bounded by `timeout`.
async fn call_judge(
    judge: &dyn SimilarityJudge,
    batch: &[ConceptRecord],
    timeout: Duration,
) -> std::result::Result<Vec<ProposedCluster>, JudgeError> {
    match tokio::time::timeout(timeout, judge.judge(batch)).await {
        Ok(result) => result,
        Err(_) => Err(JudgeError::Timeout(timeout)),
    }
}

/// Call the judge, retrying once after `backoff` if the failure is transient.
async fn judge_with_retry(
    judge: &dyn SimilarityJudge,
    batch: &[ConceptRecord],
    timeout: Duration,
    backoff: Duration,
) -> std::result::Result<Vec<ProposedCluster>, JudgeError> {
    match call_judge(judge, batch, timeout).await {
        Err(e) if e.is_retryable() => {
            debug!(error = %e, backoff_ms = backoff.as_millis() as u64, "retrying judge call");
            tokio::time::sleep(backoff).await;
            call_judge(judge, batch, timeout).await
        }
        other => other,
    }
}

/// Validate one batch of judge output against the batch it was given.
fn sanitize_batch(
    proposed: Vec<ProposedCluster>,
    batch: &[ConceptRecord],
    report: &mut HarmonizeReport,
) -> Vec<Cluster> {
    let in_batch: HashSet<&str> = batch.iter().map(|r| r.id.as_str()).collect();
    let mut claimed: HashSet<ConceptId> = HashSet::new();
    let mut accepted = Vec::new();

    for p in proposed {
        let name = p.canonical_name.trim();
        if name.is_empty() {
            report.unnamed_dropped += 1;
            continue;
        }

        let mut members: Vec<ConceptId> = Vec::with_capacity(p.member_ids.len());
        for id in p.member_ids {
            if members.contains(&id) {
                continue;
            }
            if !in_batch.contains(id.as_str()) || claimed.contains(&id) {
                report.members_dropped += 1;
                continue;
            }
            members.push(id);
        }

        // A dropped cluster releases its members to later clusters.
        if members.len() < 2 {
            report.singletons_dropped += 1;
            continue;
        }
        claimed.extend(members.iter().cloned());

        accepted.push(Cluster {
            canonical_name: name.to_string(),
            description: p.description.trim().to_string(),
            source_concepts: members,
        });
    }

    accepted
}

/// Group cluster positions by merge key; keep groups of two or more.
fn find_duplicate_names(clusters: &[Cluster]) -> Vec<DuplicateName> {
    let mut by_key: HashMap<String, Vec<usize>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for (i, c) in clusters.iter().enumerate() {
        let key = canonical_key(&c.canonical_name);
        let entry = by_key.entry(key.clone()).or_default();
        if entry.is_empty() {
            order.push(key);
        }
        entry.push(i);
    }

    order
        .into_iter()
        .filter_map(|key| {
            let indices = by_key.remove(&key)?;
            (indices.len() > 1).then(|| DuplicateName {
                canonical_name: clusters[indices[0]].canonical_name.clone(),
                cluster_indices: indices,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// apply_clusters
// ---------------------------------------------------------------------------

/// Commit clusters to the store, one transaction each.
///
/// A cluster whose transaction fails is rolled back and recorded; the rest
/// still apply. Any other store error (the connection is gone, the database
/// is read-only) stops the run.
#[instrument(skip_all, fields(clusters = clusters.len()))]
pub async fn apply_clusters(
    storage: &Storage,
    clusters: &[Cluster],
    progress: &dyn HarmonizeProgress,
) -> Result<ApplyReport> {
    progress.phase("Applying clusters");
    let mut report = ApplyReport::default();
    let total = clusters.len();

    for (index, cluster) in clusters.iter().enumerate() {
        match storage.commit_cluster(cluster).await {
            Ok(write) => {
                if write.canonical_id.is_none() {
                    report.clusters_unchanged += 1;
                } else {
                    report.clusters_applied += 1;
                    if write.canonical_created {
                        report.canonicals_created += 1;
                    } else {
                        report.canonicals_reused += 1;
                    }
                }
                report.edges_created += write.edges_created;
                report.edges_already_present += write.edges_already_present;
            }
            Err(e @ CurriculaError::Transaction { .. }) => {
                warn!(
                    cluster = index,
                    canonical = %cluster.canonical_name,
                    error = %e,
                    "cluster rolled back"
                );
                report.failed.push(FailedCluster {
                    index,
                    canonical_name: cluster.canonical_name.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
        progress.cluster_applied(index + 1, total, &cluster.canonical_name);
    }

    info!(
        applied = report.clusters_applied,
        unchanged = report.clusters_unchanged,
        canonicals_created = report.canonicals_created,
        canonicals_reused = report.canonicals_reused,
        edges_created = report.edges_created,
        edges_already_present = report.edges_already_present,
        failed = report.failed.len(),
        "clusters applied"
    );

    Ok(report)
}
