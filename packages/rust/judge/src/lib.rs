//! Similarity judge: asks a language model which concepts are synonyms.
//!
//! The judge receives a bounded batch of concept records and proposes a
//! partition of that batch into named clusters. Its output is untrusted:
//! member references may be wrong, duplicated, or missing, and two calls with
//! the same input may disagree. Callers validate everything it returns.

mod chat;
mod parse;

use async_trait::async_trait;
use curricula_shared::{ConceptId, CurriculaError};
use serde::{Deserialize, Serialize};

pub use chat::{ChatJudge, ChatJudgeOptions};
pub use parse::parse_clusters;

/// A concept as presented to the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptRecord {
    pub id: ConceptId,
    pub name: String,
    pub description: String,
}

/// One cluster proposed by the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedCluster {
    pub canonical_name: String,
    #[serde(default)]
    pub description: String,
    pub member_ids: Vec<ConceptId>,
}

/// Failure of a single judge call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JudgeError {
    #[error("judge call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("judge endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unparseable judge response: {0}")]
    Unparseable(String),
}

impl JudgeError {
    /// Whether a second attempt could plausibly succeed.
    ///
    /// A model that returned garbage once is not asked again for the same batch.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Unparseable(_) => false,
        }
    }
}

impl From<JudgeError> for CurriculaError {
    fn from(e: JudgeError) -> Self {
        CurriculaError::Judge(e.to_string())
    }
}

/// A language-model-backed synonym detector.
#[async_trait]
pub trait SimilarityJudge: Send + Sync {
    /// Partition `batch` into synonym clusters.
    async fn judge(&self, batch: &[ConceptRecord]) -> Result<Vec<ProposedCluster>, JudgeError>;

    /// Model identifier, for logs and run summaries.
    fn model(&self) -> &str;
}
