//! HTTP endpoints for creating and unlocking secrets
//!
//! Bodies are JSON. Validation problems come back as per-field messages;
//! a wrong code is a field error on `code` with status 401.

use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::encryption::WRONG_CODE_MESSAGE;
use crate::error::{ErrorCategory, ErrorKind, RecretError, Result};
use crate::form::{FieldErrors, Intent, NewSecretForm, UnlockForm, parse_intent};
use crate::service::{NOT_FOUND_MESSAGE, SecretService};
use crate::store::{MessageStore, SecretId};

pub struct AppState<S> {
    service: Arc<SecretService<S>>,
    base_url: Option<String>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            base_url: self.base_url.clone(),
        }
    }
}

impl<S> AppState<S> {
    pub fn new(service: Arc<SecretService<S>>, base_url: Option<String>) -> Self {
        Self { service, base_url }
    }

    /// Absolute link when the origin is known, otherwise the bare path.
    fn share_url(&self, headers: &HeaderMap, path: &str) -> String {
        if let Some(base) = &self.base_url {
            return format!("{}{}", base, path);
        }
        match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
            Some(host) => format!("http://{}{}", host, path),
            None => path.to_string(),
        }
    }
}

pub fn router<S: MessageStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/messages/new", post(create_secret::<S>))
        .route(
            "/messages/{id}",
            get(show_secret::<S>).post(unlock_secret::<S>),
        )
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<S: MessageStore + 'static>(
    listener: TcpListener,
    state: AppState<S>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| {
            RecretError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "HTTP server failed",
                e,
            )
        })
}

fn secret_path(id: &str) -> String {
    format!("/messages/{}", id)
}

#[derive(Debug, Serialize)]
struct Index {
    name: &'static str,
    new_secret: &'static str,
}

async fn index() -> Json<Index> {
    Json(Index {
        name: "recret",
        new_secret: "/messages/new",
    })
}

#[derive(Debug, Serialize)]
struct FormReply {
    status: &'static str,
    #[serde(skip_serializing_if = "FieldErrors::is_empty")]
    errors: FieldErrors,
    confirm: bool,
}

impl FormReply {
    fn success(confirm: bool) -> Self {
        Self {
            status: "success",
            errors: FieldErrors::new(),
            confirm,
        }
    }

    fn invalid(errors: FieldErrors) -> Self {
        Self {
            status: "error",
            errors,
            confirm: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct Created {
    id: SecretId,
    url: String,
}

async fn create_secret<S: MessageStore + 'static>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<NewSecretForm>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let Json(form) = payload?;
    let intent = form.intent.clone();

    let secret = match form.validate() {
        Ok(secret) => secret,
        Err(errors) => {
            return Ok((StatusCode::BAD_REQUEST, Json(FormReply::invalid(errors))).into_response());
        }
    };

    match parse_intent(intent.as_deref())? {
        Intent::Confirm => Ok(Json(FormReply::success(true)).into_response()),
        Intent::Cancel => Ok(Json(FormReply::success(false)).into_response()),
        Intent::Create => {
            let service = Arc::clone(&state.service);
            let id = run_blocking(move || service.create(&secret.message, &secret.code)).await?;
            let path = secret_path(id.as_str());
            let url = state.share_url(&headers, &path);
            Ok((
                StatusCode::CREATED,
                [(header::LOCATION, path)],
                Json(Created { id, url }),
            )
                .into_response())
        }
    }
}

#[derive(Debug, Serialize)]
struct SecretPage {
    id: String,
    secret_url: String,
}

async fn show_secret<S: MessageStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> std::result::Result<Json<SecretPage>, ApiError> {
    let service = Arc::clone(&state.service);
    let lookup = id.clone();
    if !run_blocking(move || service.exists(&lookup)).await? {
        return Err(RecretError::not_found(NOT_FOUND_MESSAGE).into());
    }

    let secret_url = state.share_url(&headers, &secret_path(&id));
    Ok(Json(SecretPage { id, secret_url }))
}

#[derive(Debug, Serialize)]
struct UnlockReply {
    status: &'static str,
    #[serde(skip_serializing_if = "FieldErrors::is_empty")]
    errors: FieldErrors,
    message: Option<String>,
}

impl UnlockReply {
    fn unlocked(message: String) -> Self {
        Self {
            status: "success",
            errors: FieldErrors::new(),
            message: Some(message),
        }
    }

    fn invalid(errors: FieldErrors) -> Self {
        Self {
            status: "error",
            errors,
            message: None,
        }
    }
}

async fn unlock_secret<S: MessageStore + 'static>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<UnlockForm>, JsonRejection>,
) -> std::result::Result<Response, ApiError> {
    let Json(form) = payload?;
    let unlock = match form.validate() {
        Ok(unlock) => unlock,
        Err(errors) => {
            return Ok(
                (StatusCode::BAD_REQUEST, Json(UnlockReply::invalid(errors))).into_response(),
            );
        }
    };

    let service = Arc::clone(&state.service);
    match run_blocking(move || service.unlock(&id, &unlock.code)).await {
        Ok(message) => Ok(Json(UnlockReply::unlocked(message)).into_response()),
        Err(e) if e.is_wrong_code() => Ok(wrong_code_response()),
        Err(e) => Err(e.into()),
    }
}

fn wrong_code_response() -> Response {
    let reply = UnlockReply::invalid(FieldErrors::single("code", WRONG_CODE_MESSAGE));
    (StatusCode::UNAUTHORIZED, Json(reply)).into_response()
}

/// Runs a service call on the blocking pool; scrypt must not stall the runtime.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        RecretError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            format!("blocking task failed: {}", e),
        )
    })?
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Boundary translation of [`RecretError`] into an HTTP response.
#[derive(Debug)]
pub struct ApiError(RecretError);

impl From<RecretError> for ApiError {
    fn from(err: RecretError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RecretError::malformed_input(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let (status, error) = match err.kind {
            Some(ErrorKind::NotFound) => (StatusCode::NOT_FOUND, "not_found"),
            Some(ErrorKind::WrongCode) => return wrong_code_response(),
            Some(ErrorKind::MalformedInput) => (StatusCode::BAD_REQUEST, "malformed_input"),
            _ => {
                tracing::error!(error = ?err, "request failed");
                let body = ErrorBody {
                    error: "internal",
                    message: "Internal server error".to_string(),
                };
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            }
        };

        tracing::debug!(%err, "request rejected");
        let body = ErrorBody {
            error,
            message: err.message().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
