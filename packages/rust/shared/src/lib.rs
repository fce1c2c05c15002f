//! Shared types, error model, and configuration for Curricula.
//!
//! This crate is the foundation depended on by all other Curricula crates.
//! It provides:
//! - [`CurriculaError`], the unified error type
//! - Domain types ([`Concept`], [`CanonicalConcept`], [`Cluster`], [`CourseNode`], [`SlideNode`])
//! - Configuration ([`AppConfig`], [`HarmonizeConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, HarmonizeConfig, HarmonizerConfig, JudgeConfig, ObjectStoreConfig, StorageConfig,
    SyncConfig, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, validate_judge_config,
};
pub use error::{CurriculaError, Result};
pub use types::{
    CanonicalConcept, CanonicalId, Cluster, Concept, ConceptId, CourseManifest, CourseMetadata,
    CourseNode, OrphanPolicy, SlideNode, canonical_key,
};
