//! Concept nodes, canonical concepts, and `ALIGNS_TO` edges.

use chrono::Utc;
use curricula_shared::{
    CanonicalConcept, CanonicalId, Cluster, Concept, ConceptId, CurriculaError, Result,
    canonical_key,
};
use libsql::{Connection, params};
use tracing::{debug, warn};

use crate::{Storage, db_err};

/// Outcome of committing one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterWrite {
    /// The canonical concept the members now align to. `None` when every
    /// member was already aligned and no canonical carries this name, in
    /// which case nothing was written.
    pub canonical_id: Option<CanonicalId>,
    /// Whether the canonical node was created by this write.
    pub canonical_created: bool,
    /// Alignment edges created.
    pub edges_created: usize,
    /// Members left untouched because they already had an alignment.
    pub edges_already_present: usize,
}

/// A canonical concept together with the concepts aligned to it.
#[derive(Debug, Clone)]
pub struct CanonicalWithMembers {
    pub canonical: CanonicalConcept,
    pub members: Vec<Concept>,
}

impl Storage {
    // -----------------------------------------------------------------------
    // Concept operations
    // -----------------------------------------------------------------------

    /// Create a concept, or refresh its description if `(name, business_unit)` exists.
    /// Returns the concept's ID either way.
    pub async fn upsert_concept(
        &self,
        name: &str,
        description: &str,
        business_unit: &str,
    ) -> Result<ConceptId> {
        self.check_writable()?;
        if name.trim().is_empty() || business_unit.trim().is_empty() {
            return Err(CurriculaError::validation(
                "concept name and business unit must not be empty",
            ));
        }

        let id = ConceptId::new();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO concepts (id, name, description, business_unit, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(name, business_unit) DO UPDATE SET
                   description = excluded.description",
                params![id.as_str(), name, description, business_unit, now.as_str()],
            )
            .await
            .map_err(db_err)?;

        let mut rows = self
            .conn
            .query(
                "SELECT id FROM concepts WHERE name = ?1 AND business_unit = ?2",
                params![name, business_unit],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(ConceptId(row.get::<String>(0).map_err(db_err)?)),
            None => Err(CurriculaError::Storage(format!(
                "concept '{name}' ({business_unit}) vanished after upsert"
            ))),
        }
    }

    /// Get a concept by ID.
    pub async fn get_concept(&self, id: &ConceptId) -> Result<Option<Concept>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, description, business_unit FROM concepts WHERE id = ?1",
                params![id.as_str()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_concept(&row)?)),
            None => Ok(None),
        }
    }

    /// List concepts in creation order, optionally only those with no alignment.
    pub async fn list_concepts(&self, unaligned_only: bool) -> Result<Vec<Concept>> {
        let sql = if unaligned_only {
            "SELECT c.id, c.name, c.description, c.business_unit FROM concepts c
             WHERE NOT EXISTS (SELECT 1 FROM aligns_to a WHERE a.concept_id = c.id)
             ORDER BY c.created_at, c.id"
        } else {
            "SELECT id, name, description, business_unit FROM concepts
             ORDER BY created_at, id"
        };

        let mut rows = self.conn.query(sql, params![]).await.map_err(db_err)?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_concept(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Canonical concepts & alignments
    // -----------------------------------------------------------------------

    /// Find a canonical concept by name (case-insensitive exact match).
    pub async fn find_canonical(&self, canonical_name: &str) -> Result<Option<CanonicalConcept>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, canonical_name, description FROM canonical_concepts WHERE name_key = ?1",
                params![canonical_key(canonical_name)],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_canonical(&row)?)),
            None => Ok(None),
        }
    }

    /// The canonical concept a concept aligns to, if any.
    pub async fn alignment_of(&self, concept_id: &ConceptId) -> Result<Option<CanonicalId>> {
        let mut rows = self
            .conn
            .query(
                "SELECT canonical_id FROM aligns_to WHERE concept_id = ?1",
                params![concept_id.as_str()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(CanonicalId(row.get::<String>(0).map_err(db_err)?))),
            None => Ok(None),
        }
    }

    /// Count outgoing alignment edges of a concept (0 or 1 by construction).
    pub async fn alignment_count(&self, concept_id: &ConceptId) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM aligns_to WHERE concept_id = ?1",
                params![concept_id.as_str()],
            )
            .await
            .map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    /// All canonical concepts with their aligned members, ordered by name.
    pub async fn list_canonicals(&self) -> Result<Vec<CanonicalWithMembers>> {
        let mut rows = self
            .conn
            .query(
                "SELECT cc.id, cc.canonical_name, cc.description,
                        c.id, c.name, c.description, c.business_unit
                 FROM canonical_concepts cc
                 LEFT JOIN aligns_to a ON a.canonical_id = cc.id
                 LEFT JOIN concepts c ON c.id = a.concept_id
                 ORDER BY cc.name_key, c.business_unit, c.name",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results: Vec<CanonicalWithMembers> = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let canonical = row_to_canonical(&row)?;
            let is_same = results
                .last()
                .is_some_and(|last| last.canonical.id == canonical.id);
            if !is_same {
                results.push(CanonicalWithMembers {
                    canonical,
                    members: Vec::new(),
                });
            }

            // NULL member columns mean a canonical with no aligned concepts.
            if let Ok(member_id) = row.get::<String>(3) {
                let member = Concept {
                    id: ConceptId(member_id),
                    name: row.get::<String>(4).map_err(db_err)?,
                    description: row.get::<String>(5).unwrap_or_default(),
                    business_unit: row.get::<String>(6).map_err(db_err)?,
                };
                if let Some(entry) = results.last_mut() {
                    entry.members.push(member);
                }
            }
        }
        Ok(results)
    }

    /// Commit one cluster atomically.
    ///
    /// Merges the canonical concept on its name key, then aligns every member
    /// that has no alignment yet. Any failure rolls back the whole cluster.
    pub async fn commit_cluster(&self, cluster: &Cluster) -> Result<ClusterWrite> {
        self.check_writable()?;
        let name = cluster.canonical_name.as_str();
        let tx_err = |e: libsql::Error| CurriculaError::transaction(name, e.to_string());

        // Failing to begin is a store failure, not this cluster's.
        let tx = self.conn.transaction().await.map_err(db_err)?;

        match write_cluster(&tx, cluster).await {
            Ok(write) => {
                tx.commit().await.map_err(tx_err)?;
                debug!(
                    canonical = name,
                    noop = write.canonical_id.is_none(),
                    created = write.canonical_created,
                    edges = write.edges_created,
                    "cluster committed"
                );
                Ok(write)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(canonical = name, error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

/// The writes of a single cluster, run inside the caller's transaction.
///
/// Members are checked before the canonical node is touched: a cluster
/// whose members are all aligned elsewhere never creates a canonical.
async fn write_cluster(conn: &Connection, cluster: &Cluster) -> Result<ClusterWrite> {
    let name = cluster.canonical_name.trim();
    let fail = |msg: String| CurriculaError::transaction(name, msg);
    let key = canonical_key(name);

    if key.is_empty() {
        return Err(fail("canonical name is empty".into()));
    }

    let mut pending: Vec<&ConceptId> = Vec::with_capacity(cluster.source_concepts.len());
    let mut already_aligned = 0;
    for member in &cluster.source_concepts {
        let mut rows = conn
            .query(
                "SELECT EXISTS (SELECT 1 FROM aligns_to WHERE concept_id = c.id)
                 FROM concepts c WHERE c.id = ?1",
                params![member.as_str()],
            )
            .await
            .map_err(|e| fail(e.to_string()))?;
        match rows.next().await.map_err(|e| fail(e.to_string()))? {
            None => return Err(fail(format!("concept {member} does not exist"))),
            Some(row) => {
                if row.get::<i64>(0).map_err(|e| fail(e.to_string()))? != 0 {
                    already_aligned += 1;
                } else {
                    pending.push(member);
                }
            }
        }
    }

    let existing = {
        let mut rows = conn
            .query(
                "SELECT id FROM canonical_concepts WHERE name_key = ?1",
                params![key.as_str()],
            )
            .await
            .map_err(|e| fail(e.to_string()))?;
        match rows.next().await.map_err(|e| fail(e.to_string()))? {
            Some(row) => Some(CanonicalId(
                row.get::<String>(0).map_err(|e| fail(e.to_string()))?,
            )),
            None => None,
        }
    };

    let now = Utc::now().to_rfc3339();
    let (canonical_id, canonical_created) = match existing {
        Some(id) => (id, false),
        None if pending.is_empty() => {
            debug!(canonical = name, "every member already aligned; nothing to write");
            return Ok(ClusterWrite {
                canonical_id: None,
                canonical_created: false,
                edges_created: 0,
                edges_already_present: already_aligned,
            });
        }
        None => {
            let id = CanonicalId::new();
            conn.execute(
                "INSERT INTO canonical_concepts (id, canonical_name, name_key, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.as_str(),
                    name,
                    key.as_str(),
                    cluster.description.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| fail(e.to_string()))?;
            (id, true)
        }
    };

    let mut write = ClusterWrite {
        canonical_id: Some(canonical_id.clone()),
        canonical_created,
        edges_created: 0,
        edges_already_present: already_aligned,
    };

    for member in pending {
        // The edge-uniqueness check and the insert are one statement, inside
        // the cluster transaction.
        let created = conn
            .execute(
                "INSERT INTO aligns_to (concept_id, canonical_id, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(concept_id) DO NOTHING",
                params![member.as_str(), canonical_id.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| fail(e.to_string()))?;

        if created > 0 {
            write.edges_created += 1;
        } else {
            write.edges_already_present += 1;
        }
    }

    // A canonical created here must end up with at least one member.
    if write.canonical_created && write.edges_created == 0 {
        return Err(fail("members were aligned concurrently; canonical not kept".into()));
    }

    Ok(write)
}

/// Convert a database row to a [`Concept`].
fn row_to_concept(row: &libsql::Row) -> Result<Concept> {
    Ok(Concept {
        id: ConceptId(row.get::<String>(0).map_err(db_err)?),
        name: row.get::<String>(1).map_err(db_err)?,
        description: row.get::<String>(2).unwrap_or_default(),
        business_unit: row.get::<String>(3).map_err(db_err)?,
    })
}

/// Convert the first three columns of a row to a [`CanonicalConcept`].
fn row_to_canonical(row: &libsql::Row) -> Result<CanonicalConcept> {
    Ok(CanonicalConcept {
        id: CanonicalId(row.get::<String>(0).map_err(db_err)?),
        canonical_name: row.get::<String>(1).map_err(db_err)?,
        description: row.get::<String>(2).unwrap_or_default(),
    })
}
