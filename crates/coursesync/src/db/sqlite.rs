//! SQLite-backed [`CatalogStore`].

use super::error::{StoreError, StoreResult};
use super::types::*;
use super::{CatalogStore, LIKE_ESCAPE};
use crate::terms::{Semester, Term};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = include_str!("../../../../sql/init_catalog.sql");

const SECTION_COLUMNS: &str = "s.id, s.course_id, s.crn, s.instruction_type, s.building_name, s.room,
     s.updated_at, s.deleted_at,
     c.id, c.year, c.semester, c.subject, c.crse, c.title, c.description, c.prereqs,
     c.offered, c.updated_at";

const INSTRUCTOR_COLUMNS: &str =
    "id, full_name, email, phone, office, website_url, photo_url, updated_at";

pub struct SqliteCatalogStore {
    db: Mutex<Connection>,
}

impl SqliteCatalogStore {
    /// Opens (or creates) the database at `db_path` and initializes the schema.
    pub fn open(db_path: &str) -> StoreResult<Self> {
        Self::from_connection(Connection::open(db_path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        // Instructor name patterns are case-sensitive.
        conn.execute_batch("PRAGMA case_sensitive_like = ON;")?;

        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| StoreError::Lock {
            message: e.to_string(),
        })
    }

    /// Inserts a building, ignoring duplicates.
    pub fn insert_building(&self, building: &DbBuilding) -> StoreResult<()> {
        let db = self.conn()?;
        db.execute(
            "INSERT OR IGNORE INTO buildings (name, short_name, latitude, longitude)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                building.name,
                building.short_name,
                building.latitude,
                building.longitude
            ],
        )?;
        Ok(())
    }

    /// Inserts a course and returns its id.
    pub fn insert_course(&self, course: &NewCourse) -> StoreResult<i64> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO courses (year, semester, subject, crse, title, description, prereqs, offered, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                course.term.year,
                course.term.semester.as_db_str(),
                course.subject,
                course.crse,
                course.title,
                course.description,
                course.prereqs,
                serde_json::to_string(&course.offered)?,
                Utc::now(),
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Inserts a section with its instructor links and returns its id.
    pub fn insert_section(&self, section: &NewSection) -> StoreResult<i64> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;
        tx.execute(
            "INSERT INTO sections (course_id, crn, instruction_type, building_name, room, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                section.course_id,
                section.crn,
                section.instruction_type.as_db_str(),
                section.building_name,
                section.room,
                Utc::now(),
            ],
        )?;
        let section_id = tx.last_insert_rowid();

        for instructor_id in &section.instructor_ids {
            tx.execute(
                "INSERT INTO section_instructors (section_id, instructor_id) VALUES (?1, ?2)",
                params![section_id, instructor_id],
            )?;
        }
        tx.commit()?;

        Ok(section_id)
    }

    /// Soft-deletes a section.
    pub fn soft_delete_section(&self, section_id: i64) -> StoreResult<()> {
        let db = self.conn()?;
        db.execute(
            "UPDATE sections SET deleted_at = ?1 WHERE id = ?2",
            params![Utc::now(), section_id],
        )?;
        Ok(())
    }

    /// Inserts an instructor with all profile fields.
    pub fn insert_instructor(&self, instructor: &DbInstructor) -> StoreResult<i64> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO instructors (full_name, email, phone, office, website_url, photo_url, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                instructor.full_name,
                instructor.email,
                instructor.phone,
                instructor.office,
                instructor.website_url,
                instructor.photo_url,
                instructor.updated_at,
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Gets a section by id, including deleted ones.
    pub fn get_section(&self, section_id: i64) -> StoreResult<Option<SectionRecord>> {
        let db = self.conn()?;
        let record = db
            .query_row(
                &format!(
                    "SELECT {SECTION_COLUMNS}
                     FROM sections s JOIN courses c ON c.id = s.course_id
                     WHERE s.id = ?1"
                ),
                [section_id],
                section_record_from_row,
            )
            .optional()?;

        match record {
            Some(mut record) => {
                record.instructor_ids = instructor_ids_for(&db, section_id)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Gets all instructors ordered by id.
    pub fn list_instructors(&self) -> StoreResult<Vec<DbInstructor>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(&format!(
            "SELECT {INSTRUCTOR_COLUMNS} FROM instructors ORDER BY id"
        ))?;
        let rows = stmt.query_map([], instructor_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn list_buildings(&self) -> StoreResult<Vec<DbBuilding>> {
        let db = self.conn()?;
        let mut stmt =
            db.prepare("SELECT name, short_name, latitude, longitude FROM buildings ORDER BY name")?;
        let buildings = stmt.query_map([], |row| {
            Ok(DbBuilding {
                name: row.get(0)?,
                short_name: row.get(1)?,
                latitude: row.get(2)?,
                longitude: row.get(3)?,
            })
        })?;

        Ok(buildings.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn find_sections_page(
        &self,
        terms: &[Term],
        offset: usize,
        limit: usize,
    ) -> StoreResult<Vec<SectionRecord>> {
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let db = self.conn()?;

        let term_clause = vec!["(c.year = ? AND c.semester = ?)"; terms.len()].join(" OR ");
        let mut values: Vec<Value> = Vec::with_capacity(terms.len() * 2 + 2);
        for term in terms {
            values.push(Value::Integer(term.year as i64));
            values.push(Value::Text(term.semester.as_db_str().to_string()));
        }
        values.push(Value::Integer(limit as i64));
        values.push(Value::Integer(offset as i64));

        let mut stmt = db.prepare(&format!(
            "SELECT {SECTION_COLUMNS}
             FROM sections s JOIN courses c ON c.id = s.course_id
             WHERE s.deleted_at IS NULL AND ({term_clause})
             ORDER BY s.id ASC
             LIMIT ? OFFSET ?"
        ))?;

        let mut records = stmt
            .query_map(params_from_iter(values), section_record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for record in &mut records {
            record.instructor_ids = instructor_ids_for(&db, record.section.id)?;
        }

        Ok(records)
    }

    async fn find_instructors_like(&self, patterns: &[String]) -> StoreResult<Vec<DbInstructor>> {
        if patterns.is_empty() {
            return Ok(Vec::new());
        }

        let db = self.conn()?;
        let where_clause =
            vec![format!("full_name LIKE ? ESCAPE '{LIKE_ESCAPE}'"); patterns.len()].join(" OR ");
        let mut stmt = db.prepare(&format!(
            "SELECT {INSTRUCTOR_COLUMNS} FROM instructors WHERE {where_clause} ORDER BY id"
        ))?;
        let rows = stmt.query_map(params_from_iter(patterns.iter()), instructor_from_row)?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn find_instructor_by_name(&self, full_name: &str) -> StoreResult<Option<DbInstructor>> {
        let db = self.conn()?;
        let instructor = db
            .query_row(
                &format!("SELECT {INSTRUCTOR_COLUMNS} FROM instructors WHERE full_name = ?1"),
                [full_name],
                instructor_from_row,
            )
            .optional()?;
        Ok(instructor)
    }

    async fn create_instructor(&self, full_name: &str) -> StoreResult<DbInstructor> {
        let db = self.conn()?;
        let now = Utc::now();
        db.execute(
            "INSERT INTO instructors (full_name, updated_at) VALUES (?1, ?2)",
            params![full_name, now],
        )?;

        Ok(DbInstructor {
            id: db.last_insert_rowid(),
            full_name: full_name.to_string(),
            email: None,
            phone: None,
            office: None,
            website_url: None,
            photo_url: None,
            updated_at: now,
        })
    }

    async fn update_section(&self, section_id: i64, patch: &SectionPatch) -> StoreResult<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut db = self.conn()?;
        let tx = db.transaction()?;

        let mut assignments = vec!["updated_at = ?"];
        let mut values: Vec<Value> = vec![Value::Text(Utc::now().to_rfc3339())];
        if let Some(instruction_type) = patch.instruction_type {
            assignments.push("instruction_type = ?");
            values.push(Value::Text(instruction_type.as_db_str().to_string()));
        }
        if let Some(building_name) = &patch.building_name {
            assignments.push("building_name = ?");
            values.push(optional_text(building_name));
        }
        if let Some(room) = &patch.room {
            assignments.push("room = ?");
            values.push(optional_text(room));
        }
        values.push(Value::Integer(section_id));

        let changed = tx.execute(
            &format!("UPDATE sections SET {} WHERE id = ?", assignments.join(", ")),
            params_from_iter(values),
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "section".to_string(),
                id: section_id.to_string(),
            });
        }

        for instructor_id in &patch.disconnect_instructors {
            tx.execute(
                "DELETE FROM section_instructors WHERE section_id = ?1 AND instructor_id = ?2",
                params![section_id, instructor_id],
            )?;
        }
        for instructor_id in &patch.connect_instructors {
            tx.execute(
                "INSERT OR IGNORE INTO section_instructors (section_id, instructor_id) VALUES (?1, ?2)",
                params![section_id, instructor_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    async fn update_course(&self, course_id: i64, update: &CourseUpdate) -> StoreResult<()> {
        let db = self.conn()?;
        let changed = db.execute(
            "UPDATE courses SET description = ?1, prereqs = ?2, offered = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                update.description,
                update.prereqs,
                serde_json::to_string(&update.offered)?,
                Utc::now(),
                course_id,
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "course".to_string(),
                id: course_id.to_string(),
            });
        }
        Ok(())
    }
}

fn optional_text(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

fn instructor_ids_for(db: &Connection, section_id: i64) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = db.prepare(
        "SELECT instructor_id FROM section_instructors WHERE section_id = ? ORDER BY instructor_id",
    )?;
    let ids = stmt.query_map([section_id], |row| row.get(0))?;
    ids.collect()
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(StoreError::decode(message)),
    )
}

fn section_record_from_row(row: &Row<'_>) -> rusqlite::Result<SectionRecord> {
    let instruction_type: String = row.get(3)?;
    let semester: String = row.get(10)?;
    let offered: String = row.get(16)?;

    let section = DbSection {
        id: row.get(0)?,
        course_id: row.get(1)?,
        crn: row.get(2)?,
        instruction_type: InstructionType::from_db_str(&instruction_type).ok_or_else(|| {
            conversion_error(3, format!("unknown instruction type '{instruction_type}'"))
        })?,
        building_name: row.get(4)?,
        room: row.get(5)?,
        updated_at: row.get::<_, DateTime<Utc>>(6)?,
        deleted_at: row.get::<_, Option<DateTime<Utc>>>(7)?,
    };

    let course = DbCourse {
        id: row.get(8)?,
        year: row.get(9)?,
        semester: Semester::parse(&semester)
            .ok_or_else(|| conversion_error(10, format!("unknown semester '{semester}'")))?,
        subject: row.get(11)?,
        crse: row.get(12)?,
        title: row.get(13)?,
        description: row.get(14)?,
        prereqs: row.get(15)?,
        offered: serde_json::from_str(&offered)
            .map_err(|e| conversion_error(16, format!("bad offered list '{offered}': {e}")))?,
        updated_at: row.get::<_, DateTime<Utc>>(17)?,
    };

    Ok(SectionRecord {
        section,
        course,
        instructor_ids: Vec::new(),
    })
}

fn instructor_from_row(row: &Row<'_>) -> rusqlite::Result<DbInstructor> {
    Ok(DbInstructor {
        id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        office: row.get(4)?,
        website_url: row.get(5)?,
        photo_url: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::escape_like;

    fn fall_2024() -> Term {
        Term::new(2024, Semester::Fall)
    }

    fn seeded() -> (SqliteCatalogStore, i64) {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store.insert_building(&DbBuilding::named("Fisher Hall")).unwrap();
        let course_id = store
            .insert_course(&NewCourse::new(fall_2024(), "CS", "1121"))
            .unwrap();
        (store, course_id)
    }

    #[tokio::test]
    async fn test_create_instructor_conflict() {
        let (store, _) = seeded();
        store.create_instructor("Jane Doe").await.unwrap();

        let err = store.create_instructor("Jane Doe").await.unwrap_err();
        assert!(err.is_conflict(), "expected conflict, got {err:?}");
        assert_eq!(
            err,
            StoreError::Conflict {
                entity: "instructors".to_string(),
                key: "instructors.full_name".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_find_instructors_like_is_case_sensitive() {
        let (store, _) = seeded();
        store.create_instructor("Jane A. Doe").await.unwrap();
        store.create_instructor("jane a. doe").await.unwrap();

        let found = store
            .find_instructors_like(&["Jane % Doe".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].full_name, "Jane A. Doe");

        let literal = store
            .find_instructors_like(&[escape_like("Jane_A._Doe")])
            .await
            .unwrap();
        assert!(literal.is_empty());
    }

    #[tokio::test]
    async fn test_sections_page_filters_terms_and_deleted() {
        let (store, course_id) = seeded();
        let other_course = store
            .insert_course(&NewCourse::new(Term::new(2025, Semester::Spring), "CS", "1122"))
            .unwrap();

        let a = store.insert_section(&NewSection::new(course_id, "10001")).unwrap();
        let b = store.insert_section(&NewSection::new(course_id, "10002")).unwrap();
        store.insert_section(&NewSection::new(other_course, "20001")).unwrap();
        let c = store.insert_section(&NewSection::new(course_id, "10003")).unwrap();
        store.soft_delete_section(b).unwrap();

        let page = store.find_sections_page(&[fall_2024()], 0, 32).await.unwrap();
        let ids: Vec<i64> = page.iter().map(|r| r.section.id).collect();
        assert_eq!(ids, vec![a, c]);

        let second = store.find_sections_page(&[fall_2024()], 1, 1).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].section.id, c);

        assert!(store.find_sections_page(&[], 0, 32).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_section_patch() {
        let (store, course_id) = seeded();
        let old = store.create_instructor("Old Prof").await.unwrap();
        let new = store.create_instructor("New Prof").await.unwrap();
        let mut section = NewSection::new(course_id, "10001");
        section.instructor_ids = vec![old.id];
        let section_id = store.insert_section(&section).unwrap();

        let patch = SectionPatch {
            instruction_type: Some(InstructionType::Physical),
            building_name: Some(Some("Fisher Hall".to_string())),
            room: Some(Some("135".to_string())),
            connect_instructors: vec![new.id],
            disconnect_instructors: vec![old.id],
        };
        store.update_section(section_id, &patch).await.unwrap();

        let record = store.get_section(section_id).unwrap().unwrap();
        assert_eq!(record.section.instruction_type, InstructionType::Physical);
        assert_eq!(record.section.building_name.as_deref(), Some("Fisher Hall"));
        assert_eq!(record.section.room.as_deref(), Some("135"));
        assert_eq!(record.instructor_ids, vec![new.id]);
        // Disconnecting never deletes the instructor row.
        assert_eq!(store.list_instructors().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_patch_does_not_touch_row() {
        let (store, course_id) = seeded();
        let section_id = store.insert_section(&NewSection::new(course_id, "10001")).unwrap();
        let before = store.get_section(section_id).unwrap().unwrap();

        store
            .update_section(section_id, &SectionPatch::default())
            .await
            .unwrap();

        let after = store.get_section(section_id).unwrap().unwrap();
        assert_eq!(before.section.updated_at, after.section.updated_at);
    }

    #[tokio::test]
    async fn test_update_course_rewrites_fields() {
        let (store, course_id) = seeded();
        let section_id = store.insert_section(&NewSection::new(course_id, "10001")).unwrap();

        let update = CourseUpdate {
            description: Some("Intro".to_string()),
            prereqs: None,
            offered: vec![Semester::Fall, Semester::Spring],
        };
        store.update_course(course_id, &update).await.unwrap();

        let record = store.get_section(section_id).unwrap().unwrap();
        assert_eq!(record.course.description.as_deref(), Some("Intro"));
        assert_eq!(record.course.offered, vec![Semester::Fall, Semester::Spring]);

        let missing = store.update_course(9999, &update).await.unwrap_err();
        assert!(matches!(missing, StoreError::NotFound { .. }));
    }
}
