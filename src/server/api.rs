use crate::models::{ Envelope, Message, MessageId };
use crate::store::{ MessageStore, StoreError, StoreKind };
use std::sync::Arc;
use axum::{
    routing::{ get, post, put },
    Router,
    Json,
    extract::{ Path, State, rejection::JsonRejection },
    response::{ IntoResponse, Response },
    http::StatusCode,
};
use thiserror::Error;
use tower_http::cors::{ Any, CorsLayer };
use log::{ debug, error };

/// Message served by `PUT /assist/` against the in-memory store.
pub const EPHEMERAL_DEFAULT_MESSAGE_ID: MessageId = 0;
/// Message served by `PUT /assist/` against a persistent store.
pub const PERSISTENT_DEFAULT_MESSAGE_ID: MessageId = 1;

const NO_MESSAGES_FOUND: &str = "no messages found";
const MESSAGE_NOT_FOUND: &str = "message not found";
const CANNOT_LOAD_MESSAGES: &str = "cannot load messages, try again later";

pub fn default_message_id(kind: StoreKind) -> MessageId {
    match kind {
        StoreKind::Ephemeral => EPHEMERAL_DEFAULT_MESSAGE_ID,
        StoreKind::Persistent => PERSISTENT_DEFAULT_MESSAGE_ID,
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    MethodNotAllowed(String),

    #[error("{0}")]
    Persistence(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps a failed store mutation; `fallback` is the text shown for
    /// persistence failures, whose details only go to the log.
    fn from_mutation(err: StoreError, fallback: &str) -> Self {
        match err {
            StoreError::NotFound(_) => ApiError::NotFound(MESSAGE_NOT_FOUND.into()),
            StoreError::ReadOnly => ApiError::MethodNotAllowed(StoreError::ReadOnly.to_string()),
            other => {
                error!("Message store write failed: {}", other);
                ApiError::Persistence(fallback.into())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(Envelope::error(self.to_string()))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn MessageStore>,
    default_message_id: MessageId,
}

impl AppState {
    /// Without an override the default id follows the store's kind.
    pub fn new(store: Arc<dyn MessageStore>, override_id: Option<MessageId>) -> Self {
        let default_message_id = override_id.unwrap_or_else(|| default_message_id(store.kind()));
        Self { store, default_message_id }
    }

    fn db_not_found_text(&self) -> &'static str {
        match self.store.kind() {
            StoreKind::Ephemeral => NO_MESSAGES_FOUND,
            StoreKind::Persistent => MESSAGE_NOT_FOUND,
        }
    }
}

/// Routes without the version prefix.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/assist", put(assist_default_handler))
        .route("/assist/", put(assist_default_handler))
        .route("/assist/{id}", put(assist_handler))
        .route("/assistant/db", get(list_messages_handler))
        .route("/assistant/db/", get(list_messages_handler))
        .route("/assistant/db/{id}", get(get_message_handler))
        .route("/assistant/db/messages", post(create_message_handler))
        .route(
            "/assistant/db/messages/{id}",
            put(update_message_handler).delete(delete_message_handler)
        )
        .with_state(state)
}

/// Full application: routes mounted under `prefix`, with permissive CORS.
pub fn app(state: AppState, prefix: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let prefix = prefix.trim_end_matches('/');
    let routes = router(state);
    let app = if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(prefix, routes)
    };
    app.layer(cors)
}

fn parse_id(raw: &str) -> Result<MessageId, ApiError> {
    raw
        .trim()
        .parse::<MessageId>()
        .map_err(|e| ApiError::BadRequest(format!("invalid message id '{}': {}", raw, e)))
}

fn parse_body(body: Result<Json<Message>, JsonRejection>) -> Result<Message, ApiError> {
    match body {
        Ok(Json(message)) => Ok(message),
        Err(rejection) => {
            debug!("Rejected message body: {}", rejection);
            Err(ApiError::BadRequest("cannot parse request body".into()))
        }
    }
}

async fn find_message(
    state: &AppState,
    id: MessageId,
    not_found: &str
) -> Result<Json<Message>, ApiError> {
    match state.store.get_by_id(id).await {
        Ok(message) => Ok(Json(message)),
        Err(e) if e.is_not_found() => {
            debug!("Message {} not found", id);
            Err(ApiError::NotFound(not_found.into()))
        }
        Err(e) => {
            error!("Failed to load message {}: {}", id, e);
            Err(ApiError::Persistence(CANNOT_LOAD_MESSAGES.into()))
        }
    }
}

async fn assist_default_handler(
    State(state): State<AppState>
) -> Result<Json<Message>, ApiError> {
    find_message(&state, state.default_message_id, NO_MESSAGES_FOUND).await
}

async fn assist_handler(
    State(state): State<AppState>,
    Path(raw_id): Path<String>
) -> Result<Json<Message>, ApiError> {
    let id = parse_id(&raw_id)?;
    find_message(&state, id, NO_MESSAGES_FOUND).await
}

async fn list_messages_handler(
    State(state): State<AppState>
) -> Result<Json<Vec<Message>>, ApiError> {
    state.store.get_all().await.map(Json).map_err(|e| {
        error!("Failed to list messages: {}", e);
        ApiError::Persistence(CANNOT_LOAD_MESSAGES.into())
    })
}

async fn get_message_handler(
    State(state): State<AppState>,
    Path(raw_id): Path<String>
) -> Result<Json<Message>, ApiError> {
    let id = parse_id(&raw_id)?;
    find_message(&state, id, state.db_not_found_text()).await
}

async fn create_message_handler(
    State(state): State<AppState>,
    body: Result<Json<Message>, JsonRejection>
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = parse_body(body)?;
    let created = state.store
        .create_message(message).await
        .map_err(|e| ApiError::from_mutation(e, "cannot save new message, try again later"))?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// The path identifier names the message being replaced; an `id` in the
/// body is ignored.
async fn update_message_handler(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    body: Result<Json<Message>, JsonRejection>
) -> Result<Json<Message>, ApiError> {
    let id = parse_id(&raw_id)?;
    let mut message = parse_body(body)?;
    message.id = id;
    let updated = state.store
        .update_message(message).await
        .map_err(|e| ApiError::from_mutation(e, "cannot update message, try again later"))?;
    Ok(Json(updated))
}

async fn delete_message_handler(
    State(state): State<AppState>,
    Path(raw_id): Path<String>
) -> Result<Json<Envelope>, ApiError> {
    let id = parse_id(&raw_id)?;
    state.store
        .delete_message(id).await
        .map_err(|e| ApiError::from_mutation(e, "cannot remove message, try again later"))?;
    Ok(Json(Envelope::success("message was removed")))
}
