//! Persistence gateway consumed by the course service.
//!
//! Reads go straight to the store. Writes are staged on the gateway and only
//! reach the store when [`Gateway::commit`] runs, so one gateway instance
//! holds the unit of work for one request.

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Course, RegisteredCourse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Courses,
    RegisteredCourses,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Courses => "courses",
            Table::RegisteredCourses => "registered_courses",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scan predicates over the courses table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourseQuery {
    All,
    /// Course code contains `code` and subject contains `subject`.
    /// Matching is case-sensitive; an empty needle matches every row.
    Search { code: String, subject: String },
}

/// Scan predicates over the registered courses table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationQuery {
    All,
    ForCourse(i64),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("table '{0}' is not available")]
    Unavailable(Table),

    #[error("row {key} in '{table}' was modified or removed since it was loaded")]
    Concurrency { table: Table, key: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Whether the accessor for `table` is usable at all. An unavailable
    /// table is different from an empty one.
    fn is_available(&self, table: Table) -> bool;

    async fn find_course(&self, id: i64) -> Result<Option<Course>, GatewayError>;
    async fn scan_courses(&self, query: CourseQuery) -> Result<Vec<Course>, GatewayError>;
    fn insert_course(&mut self, course: Course);
    fn update_course(&mut self, course: Course);
    fn remove_course(&mut self, course: Course);

    async fn find_registration(
        &self,
        course_id: i64,
    ) -> Result<Option<RegisteredCourse>, GatewayError>;
    async fn scan_registrations(
        &self,
        query: RegistrationQuery,
    ) -> Result<Vec<RegisteredCourse>, GatewayError>;
    fn insert_registration(&mut self, registration: RegisteredCourse);
    fn remove_registration(&mut self, registration: RegisteredCourse);

    /// Writes every staged change in one transaction and returns the number
    /// of rows written. Nothing is written when any change fails.
    async fn commit(&mut self) -> Result<usize, GatewayError>;
}
