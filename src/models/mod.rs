pub mod course;
pub mod registered_course;

pub use course::{Course, CourseInput, FieldError};
pub use registered_course::RegisteredCourse;
