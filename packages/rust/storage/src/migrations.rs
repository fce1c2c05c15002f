//! SQL migration definitions for the Curricula graph database.
//!
//! The graph is stored as node tables (`concepts`, `canonical_concepts`,
//! `courses`, `slides`) and edge tables (`aligns_to`; `HAS_SLIDE` is the
//! `slides.course_id` foreign key). Migrations are applied in order on open.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: concepts, canonical_concepts, aligns_to, courses, slides, runs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- (:Concept) nodes, created by ingestion
CREATE TABLE IF NOT EXISTS concepts (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    description   TEXT NOT NULL DEFAULT '',
    business_unit TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    UNIQUE(name, business_unit)
);

-- (:CanonicalConcept) nodes, created by the harmonizer only
CREATE TABLE IF NOT EXISTS canonical_concepts (
    id             TEXT PRIMARY KEY,
    canonical_name TEXT NOT NULL,
    name_key       TEXT NOT NULL UNIQUE,
    description    TEXT NOT NULL DEFAULT '',
    created_at     TEXT NOT NULL
);

-- (:Concept)-[:ALIGNS_TO]->(:CanonicalConcept)
-- concept_id is the key: a concept has at most one outgoing alignment.
CREATE TABLE IF NOT EXISTS aligns_to (
    concept_id   TEXT PRIMARY KEY REFERENCES concepts(id),
    canonical_id TEXT NOT NULL REFERENCES canonical_concepts(id),
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_aligns_to_canonical ON aligns_to(canonical_id);

-- (:Course) nodes, rebuilt from object-store manifests
CREATE TABLE IF NOT EXISTS courses (
    id              TEXT PRIMARY KEY,
    title           TEXT NOT NULL,
    business_unit   TEXT,
    version         TEXT,
    delivery_method TEXT,
    duration_hours  REAL,
    audience        TEXT,
    level           TEXT,
    discipline      TEXT,
    manifest_key    TEXT NOT NULL,
    manifest_hash   TEXT NOT NULL,
    orphaned        INTEGER NOT NULL DEFAULT 0,
    synced_at       TEXT NOT NULL
);

-- (:Course)-[:HAS_SLIDE]->(:Slide)
CREATE TABLE IF NOT EXISTS slides (
    id        TEXT PRIMARY KEY,
    course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
    number    INTEGER NOT NULL,
    image_key TEXT NOT NULL UNIQUE,
    orphaned  INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_slides_course ON slides(course_id);

-- Harmonization and sync run history
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    kind        TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
