//! Course and slide nodes maintained by graph sync.

use curricula_shared::{CourseNode, CurriculaError, Result, SlideNode};
use libsql::{Connection, params};
use tracing::warn;

use crate::{Storage, db_err};

/// One mutation of the course graph.
///
/// Sync plans are expressed as lists of these so that the plan can be
/// inspected before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphWrite {
    /// Create the course, or overwrite its properties and clear `orphaned`.
    UpsertCourse(CourseNode),
    /// Create a slide if no slide with its ID exists.
    CreateSlide(SlideNode),
    FlagCourse(String),
    FlagSlide(String),
    UnflagCourse(String),
    UnflagSlide(String),
    /// Delete a course together with its slides.
    RemoveCourse(String),
    RemoveSlide(String),
}

impl Storage {
    /// All course nodes, ordered by ID.
    pub async fn list_courses(&self) -> Result<Vec<CourseNode>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, title, business_unit, version, delivery_method, duration_hours,
                        audience, level, discipline, manifest_key, manifest_hash, orphaned, synced_at
                 FROM courses ORDER BY id",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_course(&row)?);
        }
        Ok(results)
    }

    /// All slide nodes, ordered by course then slide number.
    pub async fn list_slides(&self) -> Result<Vec<SlideNode>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, course_id, number, image_key, orphaned
                 FROM slides ORDER BY course_id, number",
                params![],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(SlideNode {
                id: row.get::<String>(0).map_err(db_err)?,
                course_id: row.get::<String>(1).map_err(db_err)?,
                number: row.get::<i64>(2).map_err(db_err)?.max(0) as u32,
                image_key: row.get::<String>(3).map_err(db_err)?,
                orphaned: row.get::<i64>(4).map_err(db_err)? != 0,
            });
        }
        Ok(results)
    }

    /// Apply a list of writes for one course in a single transaction.
    ///
    /// Returns the number of writes that changed a row.
    pub async fn apply_graph_writes(&self, course_id: &str, writes: &[GraphWrite]) -> Result<u64> {
        self.check_writable()?;
        if writes.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction().await.map_err(db_err)?;

        let mut changed = 0;
        for write in writes {
            match apply_write(&tx, write).await {
                Ok(n) => changed += n,
                Err(e) => {
                    if let Err(rb) = tx.rollback().await {
                        warn!(course_id, error = %rb, "rollback failed");
                    }
                    return Err(CurriculaError::Storage(format!(
                        "course {course_id}: {e}"
                    )));
                }
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(changed)
    }
}

async fn apply_write(
    conn: &Connection,
    write: &GraphWrite,
) -> std::result::Result<u64, libsql::Error> {
    match write {
        GraphWrite::UpsertCourse(c) => {
            conn.execute(
                "INSERT INTO courses (id, title, business_unit, version, delivery_method,
                                      duration_hours, audience, level, discipline,
                                      manifest_key, manifest_hash, orphaned, synced_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                   title = excluded.title,
                   business_unit = excluded.business_unit,
                   version = excluded.version,
                   delivery_method = excluded.delivery_method,
                   duration_hours = excluded.duration_hours,
                   audience = excluded.audience,
                   level = excluded.level,
                   discipline = excluded.discipline,
                   manifest_key = excluded.manifest_key,
                   manifest_hash = excluded.manifest_hash,
                   orphaned = 0,
                   synced_at = excluded.synced_at",
                params![
                    c.id.as_str(),
                    c.title.as_str(),
                    c.business_unit.as_deref(),
                    c.version.as_deref(),
                    c.delivery_method.as_deref(),
                    c.duration_hours,
                    c.audience.as_deref(),
                    c.level.as_deref(),
                    c.discipline.as_deref(),
                    c.manifest_key.as_str(),
                    c.manifest_hash.as_str(),
                    c.synced_at.to_rfc3339(),
                ],
            )
            .await
        }
        GraphWrite::CreateSlide(s) => {
            conn.execute(
                "INSERT INTO slides (id, course_id, number, image_key, orphaned)
                 VALUES (?1, ?2, ?3, ?4, 0)
                 ON CONFLICT(id) DO NOTHING",
                params![
                    s.id.as_str(),
                    s.course_id.as_str(),
                    i64::from(s.number),
                    s.image_key.as_str()
                ],
            )
            .await
        }
        GraphWrite::FlagCourse(id) => {
            conn.execute(
                "UPDATE courses SET orphaned = 1 WHERE id = ?1 AND orphaned = 0",
                params![id.as_str()],
            )
            .await
        }
        GraphWrite::FlagSlide(id) => {
            conn.execute(
                "UPDATE slides SET orphaned = 1 WHERE id = ?1 AND orphaned = 0",
                params![id.as_str()],
            )
            .await
        }
        GraphWrite::UnflagCourse(id) => {
            conn.execute(
                "UPDATE courses SET orphaned = 0 WHERE id = ?1 AND orphaned = 1",
                params![id.as_str()],
            )
            .await
        }
        GraphWrite::UnflagSlide(id) => {
            conn.execute(
                "UPDATE slides SET orphaned = 0 WHERE id = ?1 AND orphaned = 1",
                params![id.as_str()],
            )
            .await
        }
        GraphWrite::RemoveCourse(id) => {
            conn.execute("DELETE FROM slides WHERE course_id = ?1", params![id.as_str()])
                .await?;
            conn.execute("DELETE FROM courses WHERE id = ?1", params![id.as_str()])
                .await
        }
        GraphWrite::RemoveSlide(id) => {
            conn.execute("DELETE FROM slides WHERE id = ?1", params![id.as_str()])
                .await
        }
    }
}

/// Convert a database row to a [`CourseNode`].
fn row_to_course(row: &libsql::Row) -> Result<CourseNode> {
    Ok(CourseNode {
        id: row.get::<String>(0).map_err(db_err)?,
        title: row.get::<String>(1).map_err(db_err)?,
        business_unit: row.get::<String>(2).ok(),
        version: row.get::<String>(3).ok(),
        delivery_method: row.get::<String>(4).ok(),
        duration_hours: row.get::<f64>(5).ok(),
        audience: row.get::<String>(6).ok(),
        level: row.get::<String>(7).ok(),
        discipline: row.get::<String>(8).ok(),
        manifest_key: row.get::<String>(9).map_err(db_err)?,
        manifest_hash: row.get::<String>(10).map_err(db_err)?,
        orphaned: row.get::<i64>(11).map_err(db_err)? != 0,
        synced_at: {
            let s: String = row.get(12).map_err(db_err)?;
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|e| CurriculaError::Storage(format!("invalid date: {e}")))?
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_storage;
    use chrono::Utc;

    fn course(id: &str) -> CourseNode {
        CourseNode {
            id: id.into(),
            title: "Safety 101".into(),
            business_unit: Some("Aero".into()),
            version: None,
            delivery_method: Some("ILT".into()),
            duration_hours: Some(2.5),
            audience: None,
            level: None,
            discipline: None,
            manifest_key: format!("{id}/manifest.json"),
            manifest_hash: "h1".into(),
            orphaned: false,
            synced_at: Utc::now(),
        }
    }

    fn slide(course_id: &str, n: u32) -> SlideNode {
        SlideNode {
            id: SlideNode::slide_id(course_id, n),
            course_id: course_id.into(),
            number: n,
            image_key: format!("{course_id}/images/page_{n}.png"),
            orphaned: false,
        }
    }

    #[tokio::test]
    async fn course_and_slides_roundtrip() {
        let storage = test_storage().await;
        let writes = vec![
            GraphWrite::UpsertCourse(course("c1")),
            GraphWrite::CreateSlide(slide("c1", 1)),
            GraphWrite::CreateSlide(slide("c1", 2)),
        ];
        let changed = storage.apply_graph_writes("c1", &writes).await.expect("apply");
        assert_eq!(changed, 3);

        let courses = storage.list_courses().await.unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].duration_hours, Some(2.5));
        assert_eq!(courses[0].version, None);
        assert_eq!(storage.list_slides().await.unwrap().len(), 2);

        // Re-creating the same slides changes nothing.
        let again = storage
            .apply_graph_writes("c1", &[GraphWrite::CreateSlide(slide("c1", 1))])
            .await
            .unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn flagging_is_idempotent_and_reversible() {
        let storage = test_storage().await;
        storage
            .apply_graph_writes("c1", &[GraphWrite::UpsertCourse(course("c1"))])
            .await
            .unwrap();

        let flag = [GraphWrite::FlagCourse("c1".into())];
        assert_eq!(storage.apply_graph_writes("c1", &flag).await.unwrap(), 1);
        assert_eq!(storage.apply_graph_writes("c1", &flag).await.unwrap(), 0);
        assert!(storage.list_courses().await.unwrap()[0].orphaned);

        let unflag = [GraphWrite::UnflagCourse("c1".into())];
        assert_eq!(storage.apply_graph_writes("c1", &unflag).await.unwrap(), 1);
        assert!(!storage.list_courses().await.unwrap()[0].orphaned);
    }

    #[tokio::test]
    async fn remove_course_drops_slides() {
        let storage = test_storage().await;
        storage
            .apply_graph_writes(
                "c1",
                &[
                    GraphWrite::UpsertCourse(course("c1")),
                    GraphWrite::CreateSlide(slide("c1", 1)),
                ],
            )
            .await
            .unwrap();

        storage
            .apply_graph_writes("c1", &[GraphWrite::RemoveCourse("c1".into())])
            .await
            .unwrap();
        assert!(storage.list_courses().await.unwrap().is_empty());
        assert!(storage.list_slides().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_write_rolls_back_course() {
        let storage = test_storage().await;
        // Slide for a course that does not exist violates the foreign key.
        let writes = vec![
            GraphWrite::UpsertCourse(course("c1")),
            GraphWrite::CreateSlide(slide("ghost", 1)),
        ];
        assert!(storage.apply_graph_writes("c1", &writes).await.is_err());
        assert!(storage.list_courses().await.unwrap().is_empty());
    }
}
