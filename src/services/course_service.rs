use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{CourseQuery, Gateway, GatewayError, RegistrationQuery, Table};
use crate::error::AppError;
use crate::models::{Course, CourseInput, FieldError, RegisteredCourse};
use crate::session::TempData;

/// Where a successful mutation sends the caller next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTo {
    Catalog,
    Registrations,
}

impl RedirectTo {
    pub fn path(self) -> &'static str {
        match self {
            RedirectTo::Catalog => "/Courses",
            RedirectTo::Registrations => "/Courses/ViewRegisteredCoursesList",
        }
    }
}

/// Outcome of a create or edit form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Saved(RedirectTo),
    /// The input failed validation and goes back to the form unchanged.
    Rejected {
        course: CourseInput,
        errors: Vec<FieldError>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchForm {
    pub course_code: String,
    pub subject: String,
}

/// Catalog browsing, catalog administration and course registration.
pub struct CourseService<G> {
    gateway: G,
}

impl<G: Gateway> CourseService<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    pub async fn list_catalog(&self) -> Result<Vec<Course>, AppError> {
        if !self.gateway.is_available(Table::Courses) {
            return Err(AppError::table_is_null(Table::Courses.name()));
        }

        let courses = self.gateway.scan_courses(CourseQuery::All).await?;
        debug!("listing {} catalog course(s)", courses.len());
        Ok(courses)
    }

    /// Registered courses joined to the catalog. Registrations whose course
    /// is gone are skipped.
    pub async fn list_registrations(&self) -> Result<Vec<Course>, AppError> {
        self.registered_courses().await.map_err(|e| {
            warn!("failed to list registered courses: {}", e);
            AppError::Internal(format!("An error occurred: {}", e))
        })
    }

    async fn registered_courses(&self) -> Result<Vec<Course>, GatewayError> {
        let registrations = self
            .gateway
            .scan_registrations(RegistrationQuery::All)
            .await?;

        let mut courses = Vec::with_capacity(registrations.len());
        for registration in registrations {
            match self.gateway.find_course(registration.course_id).await? {
                Some(course) => courses.push(course),
                None => debug!("skipping orphaned registration {}", registration.course_id),
            }
        }

        Ok(courses)
    }

    pub fn show_search_form(&self) -> SearchForm {
        SearchForm::default()
    }

    pub async fn search(&self, course_code: &str, subject: &str) -> Result<Vec<Course>, AppError> {
        if !self.gateway.is_available(Table::Courses) {
            return Err(AppError::table_is_null(Table::Courses.name()));
        }

        let query = CourseQuery::Search {
            code: course_code.to_string(),
            subject: subject.to_string(),
        };
        Ok(self.gateway.scan_courses(query).await?)
    }

    pub async fn details(&self, id: Option<i64>) -> Result<Course, AppError> {
        self.lookup(id).await
    }

    pub fn show_create_form(&self) -> CourseInput {
        CourseInput::default()
    }

    pub async fn create(&mut self, input: CourseInput) -> Result<Submission, AppError> {
        let course = match input.into_course() {
            Ok(course) => course,
            Err((course, errors)) => return Ok(Submission::Rejected { course, errors }),
        };

        let code = course.course_code.clone();
        self.gateway.insert_course(course);
        self.gateway.commit().await?;

        info!("created course {}", code);
        Ok(Submission::Saved(RedirectTo::Catalog))
    }

    pub async fn edit_form(&self, id: Option<i64>) -> Result<Course, AppError> {
        self.lookup(id).await
    }

    pub async fn edit(&mut self, id: i64, input: CourseInput) -> Result<Submission, AppError> {
        if id != input.course_id {
            return Err(AppError::NotFound);
        }

        let course = match input.into_course() {
            Ok(course) => course,
            Err((course, errors)) => return Ok(Submission::Rejected { course, errors }),
        };

        self.gateway.update_course(course);
        match self.gateway.commit().await {
            Ok(_) => {}
            Err(GatewayError::Concurrency { table, key }) => {
                if self.gateway.find_course(id).await?.is_none() {
                    return Err(AppError::NotFound);
                }
                return Err(GatewayError::Concurrency { table, key }.into());
            }
            Err(e) => return Err(e.into()),
        }

        info!("updated course {}", id);
        Ok(Submission::Saved(RedirectTo::Catalog))
    }

    pub async fn delete_form(&self, id: Option<i64>) -> Result<Course, AppError> {
        self.lookup(id).await
    }

    /// Removes the course if it exists; a missing course is not an error.
    pub async fn delete_confirmed(&mut self, id: i64) -> Result<RedirectTo, AppError> {
        if !self.gateway.is_available(Table::Courses) {
            return Err(AppError::table_is_null(Table::Courses.name()));
        }

        if let Some(course) = self.gateway.find_course(id).await? {
            self.gateway.remove_course(course);
        }
        self.gateway.commit().await?;

        info!("deleted course {}", id);
        Ok(RedirectTo::Catalog)
    }

    pub async fn add_to_course_list(
        &mut self,
        id: i64,
        temp_data: &mut TempData,
    ) -> Result<RedirectTo, AppError> {
        // a missing registrations table cannot hold a duplicate
        let already_added = if self.gateway.is_available(Table::RegisteredCourses) {
            !self
                .gateway
                .scan_registrations(RegistrationQuery::ForCourse(id))
                .await?
                .is_empty()
        } else {
            false
        };

        if already_added {
            temp_data.set(TempData::ERROR_MESSAGE, "This course is already added.");
            return Ok(RedirectTo::Catalog);
        }

        let course = self
            .gateway
            .find_course(id)
            .await?
            .ok_or(AppError::NotFound)?;

        self.gateway
            .insert_registration(RegisteredCourse::new(course.course_id));
        self.gateway.commit().await?;

        info!("registered course {}", course.course_id);
        temp_data.set(TempData::SUCCESS_MESSAGE, "Course added successfully.");
        Ok(RedirectTo::Catalog)
    }

    pub async fn remove_from_registrations(&mut self, id: i64) -> Result<RedirectTo, AppError> {
        let registration = self
            .gateway
            .find_registration(id)
            .await?
            .ok_or(AppError::NotFound)?;

        self.gateway.remove_registration(registration);
        self.gateway.commit().await?;

        info!("unregistered course {}", id);
        Ok(RedirectTo::Registrations)
    }

    async fn lookup(&self, id: Option<i64>) -> Result<Course, AppError> {
        let Some(id) = id else {
            return Err(AppError::NotFound);
        };
        if !self.gateway.is_available(Table::Courses) {
            return Err(AppError::NotFound);
        }

        self.gateway
            .find_course(id)
            .await?
            .ok_or(AppError::NotFound)
    }
}
