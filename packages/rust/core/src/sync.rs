//! Graph sync: rebuild course and slide nodes from the object store.
//!
//! The object store is ground truth. A sync run takes two snapshots (graph
//! and store), computes a [`ReconcilePlan`] with the pure
//! [`plan_reconciliation`], and applies the plan one course per transaction.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use curricula_objects::ObjectStore;
use curricula_shared::{
    CourseManifest, CourseNode, CurriculaError, OrphanPolicy, Result, SlideNode,
};
use curricula_storage::{GraphWrite, Storage};

/// Slide image keys: `<course_id>/images/page_<n>.png`.
static PAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^/]+)/images/page_(\d+)\.png$").expect("valid regex"));

const MANIFEST_FILE: &str = "manifest.json";

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for graph sync.
pub trait SyncProgress: Send + Sync {
    fn phase(&self, name: &str);
    /// Called after each course's writes are applied (or fail).
    fn course_done(&self, current: usize, total: usize, course_id: &str);
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Course and slide nodes currently in the graph.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub courses: Vec<CourseNode>,
    pub slides: Vec<SlideNode>,
}

impl GraphSnapshot {
    pub async fn load(storage: &Storage) -> Result<Self> {
        Ok(Self {
            courses: storage.list_courses().await?,
            slides: storage.list_slides().await?,
        })
    }
}

/// One course as found in the object store.
#[derive(Debug, Clone)]
pub struct StoreCourse {
    pub manifest_key: String,
    /// Hex SHA-256 of the manifest bytes.
    pub manifest_hash: String,
    pub manifest: CourseManifest,
    /// Slide number to image key.
    pub slides: BTreeMap<u32, String>,
}

/// A course that could not be read; its graph nodes are left alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedCourse {
    pub course_id: String,
    pub reason: String,
}

/// Everything the object store says should exist.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// Readable courses, by course ID.
    pub courses: BTreeMap<String, StoreCourse>,
    pub skipped: Vec<SkippedCourse>,
}

impl StoreSnapshot {
    /// List every course prefix and read its manifest and slide keys.
    ///
    /// Only failure to list the bucket root is an error; anything wrong with
    /// a single course lands in `skipped`.
    pub async fn load(store: &dyn ObjectStore) -> Result<Self> {
        let prefixes = store.list_prefixes("").await?;
        let mut snapshot = Self::default();

        for prefix in prefixes {
            let course_id = prefix.trim_end_matches('/').to_string();
            match load_course(store, &course_id, &prefix).await {
                Ok(course) => {
                    snapshot.courses.insert(course_id, course);
                }
                Err(e) => {
                    warn!(course_id = %course_id, error = %e, "skipping course");
                    snapshot.skipped.push(SkippedCourse {
                        course_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(snapshot)
    }

    fn is_skipped(&self, course_id: &str) -> bool {
        self.skipped.iter().any(|s| s.course_id == course_id)
    }
}

async fn load_course(
    store: &dyn ObjectStore,
    course_id: &str,
    prefix: &str,
) -> Result<StoreCourse> {
    let fail = |msg: String| CurriculaError::reconciliation(course_id, msg);

    let keys = store
        .list(prefix)
        .await
        .map_err(|e| fail(format!("listing failed: {e}")))?;

    let manifest_key = format!("{course_id}/{MANIFEST_FILE}");
    if !keys.contains(&manifest_key) {
        return Err(fail("manifest.json missing".into()));
    }
    let bytes = store
        .get(&manifest_key)
        .await
        .map_err(|e| fail(format!("manifest fetch failed: {e}")))?
        .ok_or_else(|| fail("manifest.json missing".into()))?;

    let manifest: CourseManifest = serde_json::from_slice(&bytes)
        .map_err(|e| fail(format!("malformed manifest: {e}")))?;
    if manifest.course_id != course_id {
        return Err(fail(format!(
            "manifest names course '{}' but lives under '{course_id}/'",
            manifest.course_id
        )));
    }

    let slides: BTreeMap<u32, String> = keys
        .iter()
        .filter_map(|key| {
            let caps = PAGE_RE.captures(key)?;
            if &caps[1] != course_id {
                return None;
            }
            let number = caps[2].parse::<u32>().ok()?;
            Some((number, key.clone()))
        })
        .collect();

    if manifest.page_count != 0 && manifest.page_count as usize != slides.len() {
        warn!(
            course_id,
            page_count = manifest.page_count,
            images = slides.len(),
            "page count differs from slide images"
        );
    }

    Ok(StoreCourse {
        manifest_key,
        manifest_hash: sha256_hex(&bytes),
        manifest,
        slides,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Reconciliation plan
// ---------------------------------------------------------------------------

/// Node changes one course's writes will make.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeTally {
    pub courses_created: usize,
    pub courses_refreshed: usize,
    pub slides_created: usize,
    pub nodes_flagged: usize,
    pub nodes_removed: usize,
    pub nodes_restored: usize,
}

impl ChangeTally {
    fn add(&mut self, other: &ChangeTally) {
        self.courses_created += other.courses_created;
        self.courses_refreshed += other.courses_refreshed;
        self.slides_created += other.slides_created;
        self.nodes_flagged += other.nodes_flagged;
        self.nodes_removed += other.nodes_removed;
        self.nodes_restored += other.nodes_restored;
    }
}

/// The writes for one course, applied in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct CoursePlan {
    pub course_id: String,
    pub writes: Vec<GraphWrite>,
    pub tally: ChangeTally,
}

/// Output of [`plan_reconciliation`]. Courses with no work are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub courses_to_create: Vec<String>,
    /// Courses whose manifest hash changed since the last sync.
    pub courses_to_refresh: Vec<String>,
    /// Slide IDs.
    pub slides_to_create: Vec<String>,
    pub orphan_courses: Vec<String>,
    /// Slide IDs whose image is gone from a course that still exists.
    pub orphan_slides: Vec<String>,
    /// Flagged course or slide IDs whose artifacts are back.
    pub restored: Vec<String>,
    pub courses: Vec<CoursePlan>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

/// Diff the graph against the object store.
///
/// Courses in `store.skipped` are neither written nor treated as orphans.
pub fn plan_reconciliation(
    graph: &GraphSnapshot,
    store: &StoreSnapshot,
    policy: OrphanPolicy,
) -> ReconcilePlan {
    let graph_courses: HashMap<&str, &CourseNode> =
        graph.courses.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut graph_slides: BTreeMap<&str, Vec<&SlideNode>> = BTreeMap::new();
    for slide in &graph.slides {
        graph_slides.entry(slide.course_id.as_str()).or_default().push(slide);
    }

    let mut plan = ReconcilePlan::default();

    // Courses present in the store.
    for (course_id, course) in &store.courses {
        let mut writes = Vec::new();
        let mut tally = ChangeTally::default();

        match graph_courses.get(course_id.as_str()) {
            None => {
                writes.push(GraphWrite::UpsertCourse(CourseNode::from_manifest(
                    &course.manifest,
                    &course.manifest_key,
                    &course.manifest_hash,
                )));
                plan.courses_to_create.push(course_id.clone());
                tally.courses_created += 1;
            }
            Some(existing) if existing.manifest_hash != course.manifest_hash => {
                writes.push(GraphWrite::UpsertCourse(CourseNode::from_manifest(
                    &course.manifest,
                    &course.manifest_key,
                    &course.manifest_hash,
                )));
                plan.courses_to_refresh.push(course_id.clone());
                tally.courses_refreshed += 1;
                if existing.orphaned {
                    plan.restored.push(course_id.clone());
                    tally.nodes_restored += 1;
                }
            }
            Some(existing) if existing.orphaned => {
                writes.push(GraphWrite::UnflagCourse(course_id.clone()));
                plan.restored.push(course_id.clone());
                tally.nodes_restored += 1;
            }
            Some(_) => {}
        }

        let existing_slides: HashMap<u32, &SlideNode> = graph_slides
            .get(course_id.as_str())
            .map(|slides| slides.iter().map(|s| (s.number, *s)).collect())
            .unwrap_or_default();

        for (&number, image_key) in &course.slides {
            match existing_slides.get(&number) {
                None => {
                    let slide = SlideNode {
                        id: SlideNode::slide_id(course_id, number),
                        course_id: course_id.clone(),
                        number,
                        image_key: image_key.clone(),
                        orphaned: false,
                    };
                    plan.slides_to_create.push(slide.id.clone());
                    writes.push(GraphWrite::CreateSlide(slide));
                    tally.slides_created += 1;
                }
                Some(slide) if slide.orphaned => {
                    writes.push(GraphWrite::UnflagSlide(slide.id.clone()));
                    plan.restored.push(slide.id.clone());
                    tally.nodes_restored += 1;
                }
                Some(_) => {}
            }
        }

        let mut numbers: Vec<&u32> = existing_slides.keys().collect();
        numbers.sort();
        for number in numbers {
            if course.slides.contains_key(number) {
                continue;
            }
            let slide = existing_slides[number];
            match policy {
                OrphanPolicy::Flag if slide.orphaned => continue,
                OrphanPolicy::Flag => {
                    writes.push(GraphWrite::FlagSlide(slide.id.clone()));
                    tally.nodes_flagged += 1;
                }
                OrphanPolicy::Remove => {
                    writes.push(GraphWrite::RemoveSlide(slide.id.clone()));
                    tally.nodes_removed += 1;
                }
            }
            plan.orphan_slides.push(slide.id.clone());
        }

        if !writes.is_empty() {
            plan.courses.push(CoursePlan {
                course_id: course_id.clone(),
                writes,
                tally,
            });
        }
    }

    // Courses present only in the graph.
    let mut orphan_ids: Vec<&str> = graph_courses
        .keys()
        .copied()
        .filter(|id| !store.courses.contains_key(*id) && !store.is_skipped(id))
        .collect();
    orphan_ids.sort_unstable();

    for course_id in orphan_ids {
        let course = graph_courses[course_id];
        let slides = graph_slides.get(course_id).map(Vec::as_slice).unwrap_or(&[]);
        let mut writes = Vec::new();
        let mut tally = ChangeTally::default();

        match policy {
            OrphanPolicy::Flag => {
                if !course.orphaned {
                    writes.push(GraphWrite::FlagCourse(course_id.to_string()));
                    tally.nodes_flagged += 1;
                }
                for slide in slides.iter().filter(|s| !s.orphaned) {
                    writes.push(GraphWrite::FlagSlide(slide.id.clone()));
                    tally.nodes_flagged += 1;
                }
            }
            OrphanPolicy::Remove => {
                writes.push(GraphWrite::RemoveCourse(course_id.to_string()));
                tally.nodes_removed += 1 + slides.len();
            }
        }

        if !writes.is_empty() {
            plan.orphan_courses.push(course_id.to_string());
            plan.courses.push(CoursePlan {
                course_id: course_id.to_string(),
                writes,
                tally,
            });
        }
    }

    plan
}

// ---------------------------------------------------------------------------
// sync_graph
// ---------------------------------------------------------------------------

/// Result of [`sync_graph`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Course prefixes found in the object store.
    pub courses_seen: usize,
    pub courses_created: usize,
    pub courses_refreshed: usize,
    pub slides_created: usize,
    pub nodes_flagged: usize,
    pub nodes_removed: usize,
    pub nodes_restored: usize,
    pub skipped: Vec<SkippedCourse>,
}

impl SyncReport {
    /// Whether the run changed anything in the graph.
    pub fn is_noop(&self) -> bool {
        self.courses_created == 0
            && self.courses_refreshed == 0
            && self.slides_created == 0
            && self.nodes_flagged == 0
            && self.nodes_removed == 0
            && self.nodes_restored == 0
    }
}

/// Reconcile course and slide nodes with the object store.
#[instrument(skip_all, fields(store = %store.location(), policy = %policy))]
pub async fn sync_graph(
    storage: &Storage,
    store: &dyn ObjectStore,
    policy: OrphanPolicy,
    progress: &dyn SyncProgress,
) -> Result<SyncReport> {
    let start = Instant::now();

    progress.phase("Listing object store");
    let store_snapshot = StoreSnapshot::load(store).await?;

    progress.phase("Reading graph");
    let graph_snapshot = GraphSnapshot::load(storage).await?;

    let plan = plan_reconciliation(&graph_snapshot, &store_snapshot, policy);
    info!(
        courses = store_snapshot.courses.len(),
        to_create = plan.courses_to_create.len(),
        to_refresh = plan.courses_to_refresh.len(),
        slides_to_create = plan.slides_to_create.len(),
        orphan_courses = plan.orphan_courses.len(),
        orphan_slides = plan.orphan_slides.len(),
        restored = plan.restored.len(),
        "reconciliation planned"
    );

    let mut report = SyncReport {
        courses_seen: store_snapshot.courses.len() + store_snapshot.skipped.len(),
        skipped: store_snapshot.skipped,
        ..Default::default()
    };
    let mut applied = ChangeTally::default();
    let mut failed: HashSet<String> = HashSet::new();

    progress.phase("Applying changes");
    let total = plan.courses.len();
    for (i, course) in plan.courses.iter().enumerate() {
        match storage
            .apply_graph_writes(&course.course_id, &course.writes)
            .await
        {
            Ok(changed) => {
                debug!(course_id = %course.course_id, changed, "course reconciled");
                applied.add(&course.tally);
            }
            Err(e) => {
                warn!(course_id = %course.course_id, error = %e, "course write failed");
                failed.insert(course.course_id.clone());
                report.skipped.push(SkippedCourse {
                    course_id: course.course_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
        progress.course_done(i + 1, total, &course.course_id);
    }

    report.courses_created = applied.courses_created;
    report.courses_refreshed = applied.courses_refreshed;
    report.slides_created = applied.slides_created;
    report.nodes_flagged = applied.nodes_flagged;
    report.nodes_removed = applied.nodes_removed;
    report.nodes_restored = applied.nodes_restored;

    info!(
        courses_seen = report.courses_seen,
        created = report.courses_created,
        refreshed = report.courses_refreshed,
        slides_created = report.slides_created,
        flagged = report.nodes_flagged,
        removed = report.nodes_removed,
        restored = report.nodes_restored,
        skipped = report.skipped.len(),
        write_failures = failed.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "graph sync complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SilentProgress;
    use curricula_objects::FsObjectStore;
    use std::path::PathBuf;
    use uuid::Uuid;

    const BUCKET: &str = "training-content";

    struct Fixture {
        root: PathBuf,
        storage: Storage,
    }

    impl Fixture {
        async fn new() -> Self {
            let root = std::env::temp_dir().join(format!("curricula_sync_{}", Uuid::now_v7()));
            std::fs::create_dir_all(root.join(BUCKET)).unwrap();
            let storage = Storage::open(&root.join("graph.db")).await.unwrap();
            Self { root, storage }
        }

        fn bucket(&self) -> PathBuf {
            self.root.join(BUCKET)
        }

        fn add_course(&self, course_id: &str, title: &str, pages: u32) {
            let dir = self.bucket().join(course_id);
            std::fs::create_dir_all(dir.join("images")).unwrap();
            let manifest = serde_json::json!({
                "course_id": course_id,
                "filename": format!("{course_id}.pptx"),
                "page_count": pages,
                "metadata": {
                    "business_unit": "Aero",
                    "course_title": title,
                    "duration_hours": 1.5,
                }
            });
            std::fs::write(dir.join("manifest.json"), manifest.to_string()).unwrap();
            std::fs::write(dir.join(format!("{course_id}.pptx")), b"raw").unwrap();
            for n in 1..=pages {
                std::fs::write(dir.join(format!("images/page_{n}.png")), b"png").unwrap();
            }
        }

        fn remove(&self, rel: &str) {
            let path = self.bucket().join(rel);
            if path.is_dir() {
                std::fs::remove_dir_all(path).unwrap();
            } else {
                std::fs::remove_file(path).unwrap();
            }
        }

        fn write(&self, rel: &str, contents: &str) {
            std::fs::write(self.bucket().join(rel), contents).unwrap();
        }

        async fn sync(&self, policy: OrphanPolicy) -> SyncReport {
            let store = FsObjectStore::open(&self.root, BUCKET).unwrap();
            sync_graph(&self.storage, &store, policy, &SilentProgress)
                .await
                .expect("sync")
        }
    }

    #[tokio::test]
    async fn first_sync_builds_course_graph() {
        let f = Fixture::new().await;
        f.add_course("c1", "Safety Basics", 2);
        f.add_course("c2", "Hydraulics", 1);

        let report = f.sync(OrphanPolicy::Flag).await;
        assert_eq!(report.courses_seen, 2);
        assert_eq!(report.courses_created, 2);
        assert_eq!(report.slides_created, 3);
        assert!(report.skipped.is_empty());

        let courses = f.storage.list_courses().await.unwrap();
        assert_eq!(courses[0].id, "c1");
        assert_eq!(courses[0].title, "Safety Basics");
        assert_eq!(courses[0].business_unit.as_deref(), Some("Aero"));
        assert_eq!(courses[0].duration_hours, Some(1.5));
        let slides = f.storage.list_slides().await.unwrap();
        assert_eq!(slides[0].id, "c1_p1");
        assert_eq!(slides[0].image_key, "c1/images/page_1.png");
    }

    #[tokio::test]
    async fn second_sync_changes_nothing() {
        let f = Fixture::new().await;
        f.add_course("c1", "Safety Basics", 3);
        f.sync(OrphanPolicy::Flag).await;
        let counts = f.storage.graph_counts().await.unwrap();

        let again = f.sync(OrphanPolicy::Flag).await;
        assert!(again.is_noop(), "{again:?}");
        assert_eq!(f.storage.graph_counts().await.unwrap(), counts);
    }

    #[tokio::test]
    async fn malformed_manifest_skips_only_that_course() {
        let f = Fixture::new().await;
        f.add_course("c1", "Safety Basics", 1);
        f.add_course("c2", "Hydraulics", 2);
        f.sync(OrphanPolicy::Flag).await;

        f.write("c2/manifest.json", "{not json");
        f.add_course("c3", "Welding", 1);

        let report = f.sync(OrphanPolicy::Flag).await;
        assert_eq!(report.courses_seen, 3);
        assert_eq!(report.courses_created, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].course_id, "c2");
        assert!(report.skipped[0].reason.contains("malformed manifest"));
        // The unreadable course is not mistaken for an orphan.
        assert_eq!(report.nodes_flagged, 0);
        assert_eq!(f.storage.graph_counts().await.unwrap().orphaned_nodes, 0);
    }

    #[tokio::test]
    async fn missing_manifest_is_skipped() {
        let f = Fixture::new().await;
        f.add_course("c1", "Safety Basics", 1);
        f.remove("c1/manifest.json");

        let report = f.sync(OrphanPolicy::Flag).await;
        assert_eq!(report.courses_created, 0);
        assert!(report.skipped[0].reason.contains("manifest.json missing"));
    }

    #[tokio::test]
    async fn page_count_drift_still_syncs_the_images_present() {
        let f = Fixture::new().await;
        f.add_course("c1", "Safety Basics", 3);
        f.remove("c1/images/page_3.png");

        let store = FsObjectStore::open(&f.root, BUCKET).unwrap();
        let snapshot = StoreSnapshot::load(&store).await.unwrap();
        let course = &snapshot.courses["c1"];
        assert_eq!(course.manifest.page_count, 3);
        assert_eq!(course.slides.len(), 2);

        let report = f.sync(OrphanPolicy::Flag).await;
        assert!(report.skipped.is_empty());
        assert_eq!(report.slides_created, 2);
    }

    #[tokio::test]
    async fn flag_policy_marks_then_restores() {
        let f = Fixture::new().await;
        f.add_course("c1", "Safety Basics", 2);
        f.add_course("c2", "Hydraulics", 1);
        f.sync(OrphanPolicy::Flag).await;

        f.remove("c2");
        f.remove("c1/images/page_2.png");
        let report = f.sync(OrphanPolicy::Flag).await;
        // c2 + its slide + c1_p2
        assert_eq!(report.nodes_flagged, 3);
        assert_eq!(f.storage.graph_counts().await.unwrap().orphaned_nodes, 3);

        // Already flagged: nothing to do.
        assert!(f.sync(OrphanPolicy::Flag).await.is_noop());

        f.add_course("c2", "Hydraulics", 1);
        let report = f.sync(OrphanPolicy::Flag).await;
        assert_eq!(report.nodes_restored, 2);
        assert_eq!(report.courses_created, 0);
        assert_eq!(f.storage.graph_counts().await.unwrap().orphaned_nodes, 1);
    }

    #[tokio::test]
    async fn remove_policy_deletes_orphans() {
        let f = Fixture::new().await;
        f.add_course("c1", "Safety Basics", 2);
        f.add_course("c2", "Hydraulics", 2);
        f.sync(OrphanPolicy::Remove).await;

        f.remove("c2");
        f.remove("c1/images/page_2.png");
        let report = f.sync(OrphanPolicy::Remove).await;
        assert_eq!(report.nodes_removed, 4);

        let counts = f.storage.graph_counts().await.unwrap();
        assert_eq!(counts.courses, 1);
        assert_eq!(counts.slides, 1);
        assert!(f.sync(OrphanPolicy::Remove).await.is_noop());
    }

    #[tokio::test]
    async fn changed_manifest_refreshes_course() {
        let f = Fixture::new().await;
        f.add_course("c1", "Safety Basics", 1);
        f.sync(OrphanPolicy::Flag).await;

        f.add_course("c1", "Safety Basics (rev B)", 2);
        let report = f.sync(OrphanPolicy::Flag).await;
        assert_eq!(report.courses_refreshed, 1);
        assert_eq!(report.slides_created, 1);
        assert_eq!(
            f.storage.list_courses().await.unwrap()[0].title,
            "Safety Basics (rev B)"
        );
    }

    #[test]
    fn plan_skipped_course_is_not_orphaned() {
        let course = CourseNode {
            id: "c1".into(),
            title: "Safety".into(),
            business_unit: None,
            version: None,
            delivery_method: None,
            duration_hours: None,
            audience: None,
            level: None,
            discipline: None,
            manifest_key: "c1/manifest.json".into(),
            manifest_hash: "h".into(),
            orphaned: false,
            synced_at: chrono::Utc::now(),
        };
        let graph = GraphSnapshot {
            courses: vec![course],
            slides: Vec::new(),
        };
        let store = StoreSnapshot {
            courses: BTreeMap::new(),
            skipped: vec![SkippedCourse {
                course_id: "c1".into(),
                reason: "listing failed".into(),
            }],
        };

        assert!(plan_reconciliation(&graph, &store, OrphanPolicy::Remove).is_empty());

        let gone = StoreSnapshot::default();
        let plan = plan_reconciliation(&graph, &gone, OrphanPolicy::Remove);
        assert_eq!(plan.orphan_courses, vec!["c1"]);
        assert_eq!(plan.courses[0].writes, vec![GraphWrite::RemoveCourse("c1".into())]);
    }

    #[test]
    fn page_keys_are_recognized() {
        assert!(PAGE_RE.is_match("c1/images/page_12.png"));
        assert!(!PAGE_RE.is_match("c1/images/page_x.png"));
        assert!(!PAGE_RE.is_match("c1/generated/images/page_1.png"));
    }
}
