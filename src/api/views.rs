use axum::Json;
use serde::Serialize;

use crate::models::{Course, CourseInput, FieldError};
use crate::session::{Session, TempData};

/// Envelope of every rendered view. Rendering hands the session's pending
/// notices to the caller and clears them.
#[derive(Debug, Serialize)]
pub struct View<T> {
    pub model: T,
    pub temp_data: TempData,
    pub antiforgery_token: String,
}

pub async fn render<T: Serialize>(session: &Session, model: T) -> Json<View<T>> {
    Json(View {
        model,
        temp_data: session.take_temp_data().await,
        antiforgery_token: session.token().await,
    })
}

#[derive(Debug, Serialize)]
pub struct CourseList {
    pub courses: Vec<Course>,
}

#[derive(Debug, Serialize)]
pub struct CourseForm {
    pub course: CourseInput,
    pub errors: Vec<FieldError>,
}

impl CourseForm {
    pub fn blank(course: CourseInput) -> Self {
        Self {
            course,
            errors: Vec::new(),
        }
    }
}
