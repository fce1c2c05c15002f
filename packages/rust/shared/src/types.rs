//! Core domain types for the concept graph and the course graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Opaque identifier of a [`Concept`] node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptId(pub String);

impl ConceptId {
    /// Generate a new time-sortable concept identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConceptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConceptId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque identifier of a [`CanonicalConcept`] node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalId(pub String);

impl CanonicalId {
    /// Generate a new time-sortable canonical identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CanonicalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Concept graph
// ---------------------------------------------------------------------------

/// A named idea extracted from one source document of one business unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub business_unit: String,
}

/// The deduplicated, authoritative representative of one or more concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalConcept {
    pub id: CanonicalId,
    pub canonical_name: String,
    #[serde(default)]
    pub description: String,
}

/// A proposed grouping of concepts under one canonical name.
///
/// Produced by a harmonization pass and not persisted until applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub canonical_name: String,
    #[serde(default)]
    pub description: String,
    /// Member concepts, in the order the judge listed them.
    pub source_concepts: Vec<ConceptId>,
}

/// Merge key for canonical names: case-insensitive exact match.
pub fn canonical_key(name: &str) -> String {
    name.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Course graph
// ---------------------------------------------------------------------------

/// Business-unit metadata attached to an uploaded course.
///
/// Every field is optional: manifests from older uploads carry only a subset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseMetadata {
    #[serde(default)]
    pub business_unit: Option<String>,
    #[serde(default)]
    pub course_title: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub current_delivery_method: Option<String>,
    #[serde(default)]
    pub duration_hours: Option<f64>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub level_of_material: Option<String>,
    #[serde(default)]
    pub engineering_discipline: Option<String>,
}

/// The `<course_id>/manifest.json` written by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseManifest {
    pub course_id: String,
    pub filename: String,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub metadata: CourseMetadata,
}

/// A `Course` node in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseNode {
    pub id: String,
    pub title: String,
    pub business_unit: Option<String>,
    pub version: Option<String>,
    pub delivery_method: Option<String>,
    pub duration_hours: Option<f64>,
    pub audience: Option<String>,
    pub level: Option<String>,
    pub discipline: Option<String>,
    /// Object-store key of the manifest this node was built from.
    pub manifest_key: String,
    /// SHA-256 of the manifest bytes at last sync.
    pub manifest_hash: String,
    pub orphaned: bool,
    pub synced_at: DateTime<Utc>,
}

impl CourseNode {
    /// Build a course node from a parsed manifest.
    pub fn from_manifest(
        manifest: &CourseManifest,
        manifest_key: &str,
        manifest_hash: &str,
    ) -> Self {
        let meta = &manifest.metadata;
        Self {
            id: manifest.course_id.clone(),
            title: meta
                .course_title
                .clone()
                .unwrap_or_else(|| manifest.filename.clone()),
            business_unit: meta.business_unit.clone(),
            version: meta.version.clone(),
            delivery_method: meta.current_delivery_method.clone(),
            duration_hours: meta.duration_hours,
            audience: meta.audience.clone(),
            level: meta.level_of_material.clone(),
            discipline: meta.engineering_discipline.clone(),
            manifest_key: manifest_key.to_string(),
            manifest_hash: manifest_hash.to_string(),
            orphaned: false,
            synced_at: Utc::now(),
        }
    }
}

/// A `Slide` node, attached to its course by `course_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideNode {
    /// `<course_id>_p<number>`.
    pub id: String,
    pub course_id: String,
    pub number: u32,
    pub image_key: String,
    pub orphaned: bool,
}

impl SlideNode {
    pub fn slide_id(course_id: &str, number: u32) -> String {
        format!("{course_id}_p{number}")
    }
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// What graph sync does with nodes whose object-store artifact is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Keep the node but mark it `orphaned`.
    #[default]
    Flag,
    /// Delete the node (and, for courses, their slides).
    Remove,
}

impl std::fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flag => f.write_str("flag"),
            Self::Remove => f.write_str("remove"),
        }
    }
}

impl std::str::FromStr for OrphanPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flag" => Ok(Self::Flag),
            "remove" => Ok(Self::Remove),
            other => Err(format!("unknown orphan policy '{other}': expected 'flag' or 'remove'")),
        }
    }
}
