use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::{
    model::{
        quiz::{Quiz, new_id},
        server_message::ErrorKind,
        session::{LiveSession, SessionView},
    },
    server::{AppState, generate_join_code},
    store::{Feedback, ScheduledSession, SessionResult},
};

/// REST error: same structured kinds as the socket surface, carried as a
/// JSON body so clients never have to match on message wording.
pub struct ApiError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    fn quiz_not_found(id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            ErrorKind::QuizNotFound,
            format!("Quiz {id} not found"),
        )
    }

    fn session_not_found(id: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            ErrorKind::SessionNotFound,
            format!("Session {id} not found"),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "kind": self.kind, "message": self.message }));
        (self.status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostFilter {
    host_id: Option<String>,
}

// --- quiz CRUD ---

async fn create_quiz(
    State(app_state): State<Arc<AppState>>,
    Json(mut quiz): Json<Quiz>,
) -> (StatusCode, Json<Quiz>) {
    quiz.id = new_id();
    quiz.published = false;
    info!("Created quiz {} ({})", quiz.id, quiz.title);
    app_state.store.insert_quiz(quiz.clone()).await;
    (StatusCode::CREATED, Json(quiz))
}

async fn get_quiz(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Quiz>, ApiError> {
    app_state
        .store
        .get_quiz(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::quiz_not_found(&id))
}

async fn list_quizzes(
    State(app_state): State<Arc<AppState>>,
    Query(filter): Query<HostFilter>,
) -> Json<Vec<Quiz>> {
    Json(app_state.store.list_quizzes(filter.host_id.as_deref()).await)
}

async fn update_quiz(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(mut quiz): Json<Quiz>,
) -> Result<Json<Quiz>, ApiError> {
    // An edit takes the quiz out of publication until it passes publish
    // validation again; the flag in the request body is never trusted.
    quiz.published = false;
    if !app_state.store.update_quiz(&id, quiz.clone()).await {
        return Err(ApiError::quiz_not_found(&id));
    }
    app_state
        .store
        .get_quiz(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::quiz_not_found(&id))
}

async fn delete_quiz(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if app_state.store.delete_quiz(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::quiz_not_found(&id))
    }
}

async fn publish_quiz(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Quiz>, ApiError> {
    let Some(quiz) = app_state.store.get_quiz(&id).await else {
        return Err(ApiError::quiz_not_found(&id));
    };
    if let Err(problems) = quiz.validate_for_publish() {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Validation,
            problems.join("; "),
        ));
    }
    app_state.store.mark_published(&id).await;
    info!("Published quiz {id}");
    app_state
        .store
        .get_quiz(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::quiz_not_found(&id))
}

// --- session lifecycle ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    quiz_id: String,
    host_id: String,
}

async fn create_session(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let Some(quiz) = app_state.store.get_quiz(&request.quiz_id).await else {
        return Err(ApiError::quiz_not_found(&request.quiz_id));
    };
    if !quiz.published {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Validation,
            "Quiz must be published before hosting a session",
        ));
    }

    let session_id = new_id();
    let mut sessions = app_state.sessions.lock().await;
    let mut code = generate_join_code();
    while sessions.values().any(|s| s.code == code) {
        code = generate_join_code();
    }
    let session = LiveSession::new(session_id.clone(), code, quiz, request.host_id);
    let view = session.to_session_view();
    sessions.insert(session_id.clone(), session);
    info!("Created session {session_id} (code {})", view.code);
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_session(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let sessions = app_state.sessions.lock().await;
    sessions
        .get(&id)
        .map(|s| Json(s.to_session_view()))
        .ok_or_else(|| ApiError::session_not_found(&id))
}

async fn get_session_by_code(
    State(app_state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let code = code.to_ascii_uppercase();
    let sessions = app_state.sessions.lock().await;
    sessions
        .values()
        .find(|s| s.code == code)
        .map(|s| Json(s.to_session_view()))
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                ErrorKind::SessionNotFound,
                format!("No session with code {code}"),
            )
        })
}

// --- analytics ---

async fn list_results(
    State(app_state): State<Arc<AppState>>,
    Query(filter): Query<HostFilter>,
) -> Json<Vec<SessionResult>> {
    Json(app_state.store.list_results(filter.host_id.as_deref()).await)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HostResults {
    result: SessionResult,
    feedback: Vec<Feedback>,
}

async fn host_results(
    State(app_state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<HostResults>, ApiError> {
    let Some(result) = app_state.store.result_for_session(&session_id).await else {
        return Err(ApiError::session_not_found(&session_id));
    };
    let feedback = app_state.store.feedback_for_session(&session_id).await;
    Ok(Json(HostResults { result, feedback }))
}

// --- feedback ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackRequest {
    session_id: String,
    user_id: String,
    rating: u8,
    comment: Option<String>,
}

async fn create_feedback(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<FeedbackRequest>,
) -> Result<StatusCode, ApiError> {
    if !(1..=5).contains(&request.rating) {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Validation,
            "rating must be between 1 and 5",
        ));
    }

    let known_session = {
        let sessions = app_state.sessions.lock().await;
        sessions.contains_key(&request.session_id)
    } || app_state
        .store
        .result_for_session(&request.session_id)
        .await
        .is_some();
    if !known_session {
        return Err(ApiError::session_not_found(&request.session_id));
    }

    let accepted = app_state
        .store
        .add_feedback(Feedback {
            session_id: request.session_id,
            user_id: request.user_id,
            rating: request.rating,
            comment: request.comment,
            created_at: Utc::now(),
        })
        .await;
    if accepted {
        Ok(StatusCode::CREATED)
    } else {
        Err(ApiError::new(
            StatusCode::CONFLICT,
            ErrorKind::AlreadyExists,
            "Feedback already submitted for this session",
        ))
    }
}

// --- scheduling ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleRequest {
    quiz_id: String,
    host_id: String,
    start_at: DateTime<Utc>,
    note: Option<String>,
}

async fn create_schedule(
    State(app_state): State<Arc<AppState>>,
    Json(request): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduledSession>), ApiError> {
    if app_state.store.get_quiz(&request.quiz_id).await.is_none() {
        return Err(ApiError::quiz_not_found(&request.quiz_id));
    }
    let schedule = app_state
        .store
        .add_schedule(request.quiz_id, request.host_id, request.start_at, request.note)
        .await;
    Ok((StatusCode::CREATED, Json(schedule)))
}

async fn list_schedules(
    State(app_state): State<Arc<AppState>>,
    Path(host_id): Path<String>,
) -> Json<Vec<ScheduledSession>> {
    Json(app_state.store.schedules_for_host(&host_id).await)
}

async fn health_check() -> &'static str {
    "OK"
}

pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/quiz/create", post(create_quiz))
        .route("/api/quiz/all", get(list_quizzes))
        .route("/api/quiz/{id}", get(get_quiz))
        .route("/api/quiz/{id}", put(update_quiz))
        .route("/api/quiz/{id}", delete(delete_quiz))
        .route("/api/quiz/{id}/publish", post(publish_quiz))
        .route("/api/quiz-session/create", post(create_session))
        .route("/api/quiz-session/all", get(list_results))
        .route("/api/quiz-session/code/{code}", get(get_session_by_code))
        .route("/api/quiz-session/host-results/{id}", get(host_results))
        .route("/api/quiz-session/{id}", get(get_session))
        .route("/api/feedback/create", post(create_feedback))
        .route("/api/schedule/create", post(create_schedule))
        .route("/api/schedule/host/{hostId}", get(list_schedules))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
