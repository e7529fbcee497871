pub mod course_service;

pub use course_service::{CourseService, RedirectTo, SearchForm, Submission};
