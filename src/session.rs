//! Cookie-tracked sessions carrying one-shot notices and the anti-forgery token.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "course_session";
pub const TOKEN_HEADER: &str = "RequestVerificationToken";

/// One-shot notices. Whatever is stored here is handed to the next rendered
/// view and then forgotten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TempData(BTreeMap<String, String>);

impl TempData {
    pub const SUCCESS_MESSAGE: &'static str = "SuccessMessage";
    pub const ERROR_MESSAGE: &'static str = "ErrorMessage";

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn merge(&mut self, other: TempData) {
        self.0.extend(other.0);
    }
}

#[derive(Debug)]
struct SessionData {
    token: String,
    temp_data: TempData,
    last_seen: DateTime<Utc>,
}

impl SessionData {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            token: Uuid::new_v4().to_string(),
            temp_data: TempData::default(),
            last_seen: now,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<Uuid, SessionData>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl_minutes: i64) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl: Duration::minutes(ttl_minutes),
        }
    }

    /// Returns the session for `id`, or a fresh one when the id is missing,
    /// unknown or expired. The flag is true for a fresh session.
    pub async fn resolve(&self, id: Option<Uuid>) -> (Session, bool) {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;

        let before = sessions.len();
        sessions.retain(|_, data| now - data.last_seen <= self.ttl);
        if sessions.len() < before {
            debug!("pruned {} idle session(s)", before - sessions.len());
        }

        if let Some(id) = id {
            if let Some(data) = sessions.get_mut(&id) {
                data.last_seen = now;
                return (self.handle(id), false);
            }
        }

        let id = Uuid::new_v4();
        sessions.insert(id, SessionData::new(now));
        (self.handle(id), true)
    }

    fn handle(&self, id: Uuid) -> Session {
        Session {
            id,
            store: self.clone(),
        }
    }
}

/// Handle to the caller's session, placed in request extensions by [`track`].
#[derive(Clone, Debug)]
pub struct Session {
    id: Uuid,
    store: SessionStore,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn token(&self) -> String {
        let sessions = self.store.sessions.lock().await;
        sessions
            .get(&self.id)
            .map(|data| data.token.clone())
            .unwrap_or_default()
    }

    /// Reads the pending notices and clears them.
    pub async fn take_temp_data(&self) -> TempData {
        let mut sessions = self.store.sessions.lock().await;
        sessions
            .get_mut(&self.id)
            .map(|data| std::mem::take(&mut data.temp_data))
            .unwrap_or_default()
    }

    pub async fn keep_temp_data(&self, temp_data: TempData) {
        if temp_data.is_empty() {
            return;
        }
        let mut sessions = self.store.sessions.lock().await;
        if let Some(data) = sessions.get_mut(&self.id) {
            data.temp_data.merge(temp_data);
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::BadRequest("session is not established".to_string()))
    }
}

/// Extractor for POST mutations: the `RequestVerificationToken` header must
/// carry the session's anti-forgery token.
#[derive(Clone, Debug)]
pub struct Verified(pub Session);

impl<S: Send + Sync> FromRequestParts<S> for Verified {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;

        let presented = parts
            .headers
            .get(TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let expected = session.token().await;

        if presented.is_empty() || presented != expected {
            warn!("rejected request with invalid anti-forgery token (session {})", session.id());
            return Err(AppError::BadRequest(
                "The anti-forgery token is missing or invalid".to_string(),
            ));
        }

        Ok(Verified(session))
    }
}

/// Middleware: attaches a [`Session`] to every request and issues the cookie
/// when the session is new.
pub async fn track(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let presented = session_id_from_cookie(req.headers().get_all(COOKIE).iter());
    let (session, fresh) = state.sessions.resolve(presented).await;
    let id = session.id();
    req.extensions_mut().insert(session);

    let mut response = next.run(req).await;

    if fresh {
        let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => warn!("could not encode session cookie: {}", e),
        }
    }

    response
}

fn session_id_from_cookie<'a>(headers: impl Iterator<Item = &'a HeaderValue>) -> Option<Uuid> {
    headers
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_data_is_read_once() {
        let store = SessionStore::new(60);
        let (session, fresh) = store.resolve(None).await;
        assert!(fresh);

        let mut notices = TempData::default();
        notices.set(TempData::SUCCESS_MESSAGE, "Course added successfully.");
        session.keep_temp_data(notices).await;

        let first = session.take_temp_data().await;
        assert_eq!(
            first.get(TempData::SUCCESS_MESSAGE),
            Some("Course added successfully.")
        );
        assert!(session.take_temp_data().await.is_empty());
    }

    #[tokio::test]
    async fn test_known_session_is_reused() {
        let store = SessionStore::new(60);
        let (session, _) = store.resolve(None).await;
        let token = session.token().await;

        let (again, fresh) = store.resolve(Some(session.id())).await;
        assert!(!fresh);
        assert_eq!(again.id(), session.id());
        assert_eq!(again.token().await, token);
    }

    #[tokio::test]
    async fn test_unknown_session_gets_a_fresh_one() {
        let store = SessionStore::new(60);
        let (session, fresh) = store.resolve(Some(Uuid::new_v4())).await;
        assert!(fresh);
        assert_eq!(store.sessions.lock().await.len(), 1);
        assert!(!session.token().await.is_empty());
    }

    #[tokio::test]
    async fn test_expired_sessions_are_pruned() {
        let store = SessionStore::new(0);
        let (old, _) = store.resolve(None).await;
        {
            let mut sessions = store.sessions.lock().await;
            if let Some(data) = sessions.get_mut(&old.id()) {
                data.last_seen = Utc::now() - Duration::minutes(5);
            }
        }

        let (_, fresh) = store.resolve(Some(old.id())).await;
        assert!(fresh);
        assert_eq!(store.sessions.lock().await.len(), 1);
    }

    #[test]
    fn test_session_id_is_read_from_cookie_header() {
        let id = Uuid::new_v4();
        let header = HeaderValue::from_str(&format!("theme=dark; {}={}", SESSION_COOKIE, id)).unwrap();

        assert_eq!(session_id_from_cookie(std::iter::once(&header)), Some(id));

        let other = HeaderValue::from_static("theme=dark");
        assert_eq!(session_id_from_cookie(std::iter::once(&other)), None);
    }
}
