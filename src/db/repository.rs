use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::db::TableSet;
use crate::db::gateway::{CourseQuery, Gateway, GatewayError, RegistrationQuery, Table};
use crate::models::{Course, RegisteredCourse};

const COURSE_COLUMNS: &str = "course_id, course_code, name, description, capacity, subject";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Change {
    InsertCourse(Course),
    UpdateCourse(Course),
    RemoveCourse(i64),
    InsertRegistration(RegisteredCourse),
    RemoveRegistration(i64),
}

impl Change {
    fn table(&self) -> Table {
        match self {
            Change::InsertCourse(_) | Change::UpdateCourse(_) | Change::RemoveCourse(_) => {
                Table::Courses
            }
            Change::InsertRegistration(_) | Change::RemoveRegistration(_) => {
                Table::RegisteredCourses
            }
        }
    }
}

/// Gateway over the SQLite pool. Create one per request.
pub struct SqliteGateway {
    db: SqlitePool,
    tables: TableSet,
    pending: Vec<Change>,
}

impl SqliteGateway {
    pub fn new(db: SqlitePool, tables: TableSet) -> Self {
        Self {
            db,
            tables,
            pending: Vec::new(),
        }
    }

    fn ensure(&self, table: Table) -> Result<(), GatewayError> {
        if self.tables.contains(table) {
            Ok(())
        } else {
            Err(GatewayError::Unavailable(table))
        }
    }
}

#[async_trait]
impl Gateway for SqliteGateway {
    fn is_available(&self, table: Table) -> bool {
        self.tables.contains(table)
    }

    async fn find_course(&self, id: i64) -> Result<Option<Course>, GatewayError> {
        self.ensure(Table::Courses)?;

        let course = sqlx::query_as::<_, Course>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE course_id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(course)
    }

    async fn scan_courses(&self, query: CourseQuery) -> Result<Vec<Course>, GatewayError> {
        self.ensure(Table::Courses)?;

        let courses = match query {
            CourseQuery::All => {
                sqlx::query_as::<_, Course>(&format!("SELECT {COURSE_COLUMNS} FROM courses"))
                    .fetch_all(&self.db)
                    .await?
            }
            // instr() is case-sensitive, LIKE is not
            CourseQuery::Search { code, subject } => {
                sqlx::query_as::<_, Course>(&format!(
                    "SELECT {COURSE_COLUMNS} FROM courses \
                     WHERE (?1 = '' OR instr(course_code, ?1) > 0) \
                     AND (?2 = '' OR instr(subject, ?2) > 0)"
                ))
                .bind(code)
                .bind(subject)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(courses)
    }

    fn insert_course(&mut self, course: Course) {
        self.pending.push(Change::InsertCourse(course));
    }

    fn update_course(&mut self, course: Course) {
        self.pending.push(Change::UpdateCourse(course));
    }

    fn remove_course(&mut self, course: Course) {
        self.pending.push(Change::RemoveCourse(course.course_id));
    }

    async fn find_registration(
        &self,
        course_id: i64,
    ) -> Result<Option<RegisteredCourse>, GatewayError> {
        self.ensure(Table::RegisteredCourses)?;

        let registration = sqlx::query_as::<_, RegisteredCourse>(
            "SELECT course_id FROM registered_courses WHERE course_id = ?",
        )
        .bind(course_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(registration)
    }

    async fn scan_registrations(
        &self,
        query: RegistrationQuery,
    ) -> Result<Vec<RegisteredCourse>, GatewayError> {
        self.ensure(Table::RegisteredCourses)?;

        let registrations = match query {
            RegistrationQuery::All => {
                sqlx::query_as::<_, RegisteredCourse>("SELECT course_id FROM registered_courses")
                    .fetch_all(&self.db)
                    .await?
            }
            RegistrationQuery::ForCourse(course_id) => {
                sqlx::query_as::<_, RegisteredCourse>(
                    "SELECT course_id FROM registered_courses WHERE course_id = ?",
                )
                .bind(course_id)
                .fetch_all(&self.db)
                .await?
            }
        };

        Ok(registrations)
    }

    fn insert_registration(&mut self, registration: RegisteredCourse) {
        self.pending.push(Change::InsertRegistration(registration));
    }

    fn remove_registration(&mut self, registration: RegisteredCourse) {
        self.pending.push(Change::RemoveRegistration(registration.course_id));
    }

    async fn commit(&mut self) -> Result<usize, GatewayError> {
        let changes = std::mem::take(&mut self.pending);
        if changes.is_empty() {
            return Ok(0);
        }

        for change in &changes {
            self.ensure(change.table())?;
        }

        let mut tx = self.db.begin().await?;
        let mut written = 0;
        for change in changes {
            written += apply(&mut tx, change).await?;
        }
        tx.commit().await?;

        debug!("committed {} row(s)", written);
        Ok(written)
    }
}

async fn apply(tx: &mut Transaction<'_, Sqlite>, change: Change) -> Result<usize, GatewayError> {
    let table = change.table();

    let (key, affected) = match change {
        Change::InsertCourse(course) => {
            let result = sqlx::query(
                "INSERT INTO courses (course_code, name, description, capacity, subject) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&course.course_code)
            .bind(&course.name)
            .bind(&course.description)
            .bind(course.capacity)
            .bind(&course.subject)
            .execute(&mut **tx)
            .await?;
            (result.last_insert_rowid(), result.rows_affected())
        }
        Change::UpdateCourse(course) => {
            let result = sqlx::query(
                "UPDATE courses SET course_code = ?, name = ?, description = ?, capacity = ?, subject = ? \
                 WHERE course_id = ?",
            )
            .bind(&course.course_code)
            .bind(&course.name)
            .bind(&course.description)
            .bind(course.capacity)
            .bind(&course.subject)
            .bind(course.course_id)
            .execute(&mut **tx)
            .await?;
            (course.course_id, result.rows_affected())
        }
        Change::RemoveCourse(course_id) => {
            let result = sqlx::query("DELETE FROM courses WHERE course_id = ?")
                .bind(course_id)
                .execute(&mut **tx)
                .await?;
            (course_id, result.rows_affected())
        }
        Change::InsertRegistration(registration) => {
            let result = sqlx::query("INSERT INTO registered_courses (course_id) VALUES (?)")
                .bind(registration.course_id)
                .execute(&mut **tx)
                .await?;
            (registration.course_id, result.rows_affected())
        }
        Change::RemoveRegistration(course_id) => {
            let result = sqlx::query("DELETE FROM registered_courses WHERE course_id = ?")
                .bind(course_id)
                .execute(&mut **tx)
                .await?;
            (course_id, result.rows_affected())
        }
    };

    if affected == 0 {
        return Err(GatewayError::Concurrency { table, key });
    }
    Ok(affected as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn setup_test_db() -> SqlitePool {
        let pool = db::connect("sqlite::memory:", 1)
            .await
            .expect("Failed to create test db");

        db::migrate(&pool).await.expect("Failed to run migrations");

        pool
    }

    fn new_course(code: &str, subject: &str) -> Course {
        Course {
            course_id: 0,
            course_code: code.to_string(),
            name: format!("{code} name"),
            description: "This course provides an introduction.".to_string(),
            capacity: 30,
            subject: subject.to_string(),
        }
    }

    async fn seed(pool: &SqlitePool, courses: &[Course]) -> Vec<Course> {
        let mut gateway = SqliteGateway::new(pool.clone(), TableSet::all());
        for course in courses {
            gateway.insert_course(course.clone());
        }
        gateway.commit().await.expect("Failed to seed courses");
        gateway
            .scan_courses(CourseQuery::All)
            .await
            .expect("Failed to scan courses")
    }

    #[tokio::test]
    async fn test_insert_is_invisible_until_commit() {
        let pool = setup_test_db().await;
        let mut gateway = SqliteGateway::new(pool.clone(), TableSet::all());

        gateway.insert_course(new_course("CSCI101", "Computer Science"));
        let before = gateway.scan_courses(CourseQuery::All).await.unwrap();
        assert!(before.is_empty());

        let written = gateway.commit().await.unwrap();
        assert_eq!(written, 1);

        let after = gateway.scan_courses(CourseQuery::All).await.unwrap();
        assert_eq!(after.len(), 1);
        assert!(after[0].course_id > 0);
        assert_eq!(after[0].course_code, "CSCI101");
    }

    #[tokio::test]
    async fn test_commit_without_changes_writes_nothing() {
        let pool = setup_test_db().await;
        let mut gateway = SqliteGateway::new(pool, TableSet::all());

        assert_eq!(gateway.commit().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_is_case_sensitive_and_empty_matches_all() {
        let pool = setup_test_db().await;
        seed(
            &pool,
            &[
                new_course("CSCI101", "Computer Science"),
                new_course("CSCI102", "Computer Science 2"),
                new_course("MATH200", "Mathematics"),
            ],
        )
        .await;
        let gateway = SqliteGateway::new(pool, TableSet::all());

        let search = |code: &str, subject: &str| CourseQuery::Search {
            code: code.to_string(),
            subject: subject.to_string(),
        };

        let hits = gateway.scan_courses(search("CSCI", "Science 2")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].course_code, "CSCI102");

        let lowercase = gateway.scan_courses(search("csci", "")).await.unwrap();
        assert!(lowercase.is_empty());

        let everything = gateway.scan_courses(search("", "")).await.unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[tokio::test]
    async fn test_update_of_missing_row_is_a_concurrency_conflict() {
        let pool = setup_test_db().await;
        let mut gateway = SqliteGateway::new(pool, TableSet::all());

        let mut ghost = new_course("GHOST1", "Nothing");
        ghost.course_id = 42;
        gateway.update_course(ghost);

        let err = gateway.commit().await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Concurrency {
                table: Table::Courses,
                key: 42
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back_every_change() {
        let pool = setup_test_db().await;
        let mut gateway = SqliteGateway::new(pool, TableSet::all());

        gateway.insert_course(new_course("CSCI101", "Computer Science"));
        gateway.remove_registration(RegisteredCourse::new(99));
        assert!(gateway.commit().await.is_err());

        let courses = gateway.scan_courses(CourseQuery::All).await.unwrap();
        assert!(courses.is_empty());
    }

    #[tokio::test]
    async fn test_registration_requires_existing_course() {
        let pool = setup_test_db().await;
        let mut gateway = SqliteGateway::new(pool, TableSet::all());

        gateway.insert_registration(RegisteredCourse::new(5));
        let err = gateway.commit().await.unwrap_err();
        assert!(matches!(err, GatewayError::Database(_)));
    }

    #[tokio::test]
    async fn test_removing_course_cascades_to_registration() {
        let pool = setup_test_db().await;
        let courses = seed(&pool, &[new_course("CSCI101", "Computer Science")]).await;
        let mut gateway = SqliteGateway::new(pool, TableSet::all());
        let id = courses[0].course_id;

        gateway.insert_registration(RegisteredCourse::new(id));
        gateway.commit().await.unwrap();
        assert!(gateway.find_registration(id).await.unwrap().is_some());

        gateway.remove_course(courses[0].clone());
        gateway.commit().await.unwrap();

        assert!(gateway.find_course(id).await.unwrap().is_none());
        assert!(gateway.find_registration(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scan_registrations_for_course() {
        let pool = setup_test_db().await;
        let courses = seed(
            &pool,
            &[
                new_course("CSCI101", "Computer Science"),
                new_course("CSCI102", "Computer Science 2"),
            ],
        )
        .await;
        let mut gateway = SqliteGateway::new(pool, TableSet::all());

        gateway.insert_registration(RegisteredCourse::new(courses[1].course_id));
        gateway.commit().await.unwrap();

        let first = gateway
            .scan_registrations(RegistrationQuery::ForCourse(courses[0].course_id))
            .await
            .unwrap();
        assert!(first.is_empty());

        let second = gateway
            .scan_registrations(RegistrationQuery::ForCourse(courses[1].course_id))
            .await
            .unwrap();
        assert_eq!(second, vec![RegisteredCourse::new(courses[1].course_id)]);
    }

    #[tokio::test]
    async fn test_unavailable_table_is_reported() {
        let pool = setup_test_db().await;
        let mut gateway = SqliteGateway::new(pool, TableSet::new([Table::Courses]));

        assert!(gateway.is_available(Table::Courses));
        assert!(!gateway.is_available(Table::RegisteredCourses));

        let err = gateway
            .scan_registrations(RegistrationQuery::All)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(Table::RegisteredCourses)));

        gateway.insert_registration(RegisteredCourse::new(1));
        let err = gateway.commit().await.unwrap_err();
        assert!(matches!(err, GatewayError::Unavailable(Table::RegisteredCourses)));
    }
}
