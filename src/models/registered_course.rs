use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Marks a catalog course as registered. The course id is also the primary
/// key, so a course can be registered at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RegisteredCourse {
    pub course_id: i64,
}

impl RegisteredCourse {
    pub fn new(course_id: i64) -> Self {
        Self { course_id }
    }
}
