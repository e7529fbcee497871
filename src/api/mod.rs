pub mod views;

use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use serde::Deserialize;

use crate::db::SqliteGateway;
use crate::error::AppError;
use crate::models::{Course, CourseInput};
use crate::services::{CourseService, RedirectTo, SearchForm, Submission};
use crate::session::{self, Session, TempData, Verified};
use crate::state::AppState;

use self::views::{CourseForm, CourseList, View, render};

#[derive(Deserialize)]
struct SearchParams {
    #[serde(rename = "courseCode")]
    course_code: String,
    subject: String,
}

/// `?id=` on the id-less routes.
#[derive(Deserialize)]
struct IdParam {
    id: Option<String>,
}

impl IdParam {
    fn parse(&self) -> Option<i64> {
        self.id.as_deref().and_then(parse_id)
    }
}

pub fn router(state: AppState) -> Router {
    let courses = Router::new()
        .route("/Courses", get(index))
        .route("/Courses/Index", get(index))
        .route("/Courses/ViewRegisteredCoursesList", get(registered_courses))
        .route("/Courses/ShowSearchForm", get(show_search_form))
        .route(
            "/Courses/ShowSearchResults",
            get(search_results).post(search_results_form),
        )
        .route("/Courses/Details", get(details_by_query))
        .route("/Courses/Details/{id}", get(details))
        .route("/Courses/Create", get(create_form).post(create))
        .route("/Courses/Edit", get(edit_form_by_query))
        .route("/Courses/Edit/{id}", get(edit_form).post(edit))
        .route("/Courses/Delete", get(delete_form_by_query))
        .route("/Courses/Delete/{id}", get(delete_form).post(delete_confirmed))
        .route("/Courses/AddToCourseList/{id}", post(add_to_course_list))
        .route("/Courses/DeleteFromCourseList/{id}", post(delete_from_course_list))
        .layer(middleware::from_fn_with_state(state.clone(), session::track));

    // health probes stay outside the session layer
    Router::new()
        .route("/health", get(health))
        .merge(courses)
        .with_state(state)
}

/// Path ids that are not integers count as absent.
fn parse_id(raw: &str) -> Option<i64> {
    raw.parse().ok()
}

fn service(state: &AppState) -> CourseService<SqliteGateway> {
    CourseService::new(state.gateway())
}

fn redirect(target: RedirectTo) -> Response {
    Redirect::to(target.path()).into_response()
}

async fn submission(session: &Session, outcome: Submission) -> Response {
    match outcome {
        Submission::Saved(target) => redirect(target),
        Submission::Rejected { course, errors } => {
            render(session, CourseForm { course, errors }).await.into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn index(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<View<CourseList>>, AppError> {
    let courses = service(&state).list_catalog().await?;
    Ok(render(&session, CourseList { courses }).await)
}

async fn registered_courses(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<View<CourseList>>, AppError> {
    let courses = service(&state).list_registrations().await?;
    Ok(render(&session, CourseList { courses }).await)
}

async fn show_search_form(
    State(state): State<AppState>,
    session: Session,
) -> Json<View<SearchForm>> {
    render(&session, service(&state).show_search_form()).await
}

async fn search_results(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<SearchParams>,
) -> Result<Json<View<CourseList>>, AppError> {
    search(&state, &session, params).await
}

async fn search_results_form(
    State(state): State<AppState>,
    session: Session,
    Form(params): Form<SearchParams>,
) -> Result<Json<View<CourseList>>, AppError> {
    search(&state, &session, params).await
}

async fn search(
    state: &AppState,
    session: &Session,
    params: SearchParams,
) -> Result<Json<View<CourseList>>, AppError> {
    let courses = service(state)
        .search(&params.course_code, &params.subject)
        .await?;
    Ok(render(session, CourseList { courses }).await)
}

async fn details_by_query(
    State(state): State<AppState>,
    session: Session,
    Query(param): Query<IdParam>,
) -> Result<Json<View<Course>>, AppError> {
    let course = service(&state).details(param.parse()).await?;
    Ok(render(&session, course).await)
}

async fn details(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<View<Course>>, AppError> {
    let course = service(&state).details(parse_id(&id)).await?;
    Ok(render(&session, course).await)
}

async fn create_form(State(state): State<AppState>, session: Session) -> Json<View<CourseForm>> {
    let form = CourseForm::blank(service(&state).show_create_form());
    render(&session, form).await
}

async fn create(
    State(state): State<AppState>,
    Verified(session): Verified,
    Form(input): Form<CourseInput>,
) -> Result<Response, AppError> {
    let outcome = service(&state).create(input).await?;
    Ok(submission(&session, outcome).await)
}

async fn edit_form_by_query(
    State(state): State<AppState>,
    session: Session,
    Query(param): Query<IdParam>,
) -> Result<Json<View<CourseForm>>, AppError> {
    let course = service(&state).edit_form(param.parse()).await?;
    Ok(render(&session, CourseForm::blank(course.into())).await)
}

async fn edit_form(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<View<CourseForm>>, AppError> {
    let course = service(&state).edit_form(parse_id(&id)).await?;
    Ok(render(&session, CourseForm::blank(course.into())).await)
}

async fn edit(
    State(state): State<AppState>,
    Verified(session): Verified,
    Path(id): Path<String>,
    Form(input): Form<CourseInput>,
) -> Result<Response, AppError> {
    let id = parse_id(&id).ok_or(AppError::NotFound)?;
    let outcome = service(&state).edit(id, input).await?;
    Ok(submission(&session, outcome).await)
}

async fn delete_form_by_query(
    State(state): State<AppState>,
    session: Session,
    Query(param): Query<IdParam>,
) -> Result<Json<View<Course>>, AppError> {
    let course = service(&state).delete_form(param.parse()).await?;
    Ok(render(&session, course).await)
}

async fn delete_form(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<View<Course>>, AppError> {
    let course = service(&state).delete_form(parse_id(&id)).await?;
    Ok(render(&session, course).await)
}

async fn delete_confirmed(
    State(state): State<AppState>,
    _verified: Verified,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id).ok_or(AppError::NotFound)?;
    let target = service(&state).delete_confirmed(id).await?;
    Ok(redirect(target))
}

async fn add_to_course_list(
    State(state): State<AppState>,
    Verified(session): Verified,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id).ok_or(AppError::NotFound)?;

    let mut temp_data = TempData::default();
    let target = service(&state).add_to_course_list(id, &mut temp_data).await?;
    session.keep_temp_data(temp_data).await;

    Ok(redirect(target))
}

async fn delete_from_course_list(
    State(state): State<AppState>,
    _verified: Verified,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id).ok_or(AppError::NotFound)?;
    let target = service(&state).remove_from_registrations(id).await?;
    Ok(redirect(target))
}
