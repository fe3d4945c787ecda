//! HTTP routes. Workflow calls block on model inference, so they run on the
//! blocking pool with the client's session locked for the duration.

use crate::pages;
use crate::session::{lock, SharedSession};
use crate::state::AppState;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use facerec_core::{message, BoxError, RecognitionWorkflow, SessionState, UploadedImage, WorkflowError};
use facerec_vision::PersonSummary;
use serde_json::{json, Value};
use thiserror::Error;
use tower_cookies::{CookieManagerLayer, Cookies};
use tower_http::trace::TraceLayer;

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("malformed form data: {0}")]
    Multipart(#[from] MultipartError),
    #[error("person listing failed: {0}")]
    People(BoxError),
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Multipart(e) => {
                tracing::warn!(error = %e, "rejected request body");
                (StatusCode::BAD_REQUEST, format!("malformed form data: {e}")).into_response()
            }
            other => {
                tracing::error!(error = %other, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index).post(index))
        .route("/upload", get(upload_page).post(upload_submit))
        .route("/_show", get(show))
        .route("/realtime", get(realtime_page).post(realtime_capture))
        .route("/register", get(register_page).post(register_submit))
        .route("/people", get(people))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Fields of a multipart form. Parts with a filename are files.
#[derive(Debug, Default)]
struct Form {
    files: Vec<(String, UploadedImage)>,
    texts: Vec<(String, String)>,
}

impl Form {
    fn take_file(&mut self, name: &str) -> Option<UploadedImage> {
        let index = self.files.iter().position(|(n, _)| n == name)?;
        Some(self.files.swap_remove(index).1)
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.texts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

async fn read_form(mut multipart: Multipart) -> Result<Form, MultipartError> {
    let mut form = Form::default();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match field.file_name().map(str::to_owned) {
            Some(filename) => {
                let bytes = field.bytes().await?;
                form.files.push((name, UploadedImage::new(filename, bytes.to_vec())));
            }
            None => {
                let text = field.text().await?;
                form.texts.push((name, text));
            }
        }
    }
    Ok(form)
}

/// Run `f` on the blocking pool with the session locked.
async fn run_in_session<T, F>(state: &AppState, session: SharedSession, f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&RecognitionWorkflow, &mut SessionState) -> Result<T, WorkflowError> + Send + 'static,
{
    let workflow = state.workflow.clone();
    let value = tokio::task::spawn_blocking(move || {
        let mut session = lock(&session);
        f(&workflow, &mut session)
    })
    .await??;
    Ok(value)
}

/// Short session access, also moved off the async workers: the lock may be
/// held by a workflow call for a whole inference.
async fn with_session<T, F>(session: SharedSession, f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&mut SessionState) -> T + Send + 'static,
{
    let value = tokio::task::spawn_blocking(move || {
        let mut state = lock(&session);
        f(&mut state)
    })
    .await?;
    Ok(value)
}

async fn drain_flashes(session: SharedSession) -> Result<Vec<String>, AppError> {
    with_session(session, SessionState::take_flashes).await
}

async fn index() -> Html<String> {
    pages::index()
}

async fn upload_page(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Html<String>, AppError> {
    let session = state.sessions.acquire(&cookies);
    Ok(pages::upload(&drain_flashes(session).await?, None))
}

async fn upload_submit(
    State(state): State<AppState>,
    cookies: Cookies,
    multipart: Multipart,
) -> Result<Html<String>, AppError> {
    let session = state.sessions.acquire(&cookies);
    let mut form = read_form(multipart).await?;

    let image = match form.take_file("photo") {
        Some(image) if !image.is_empty() => image,
        _ => {
            let flashes = drain_flashes(session).await?;
            return Ok(pages::upload(&flashes, Some(message::MISSING_FILE)));
        }
    };
    if !image.has_allowed_extension() {
        tracing::info!(filename = %image.filename, "upload: rejected file type");
        let flashes = drain_flashes(session).await?;
        return Ok(pages::upload(&flashes, Some(message::INVALID_IMAGE_TYPE)));
    }

    let flashes = run_in_session(&state, session, move |workflow, session| {
        let result = workflow.process_upload(&image)?;
        session.flash(message::upload_message(&result));
        Ok(session.take_flashes())
    })
    .await?;
    Ok(pages::upload(&flashes, None))
}

/// Last realtime result for the polling page.
async fn show(State(state): State<AppState>, cookies: Cookies) -> Result<Json<Value>, AppError> {
    let session = state.sessions.acquire(&cookies);
    let result = with_session(session, |s| s.result.clone()).await?;
    Ok(Json(json!({ "result": result })))
}

async fn realtime_page(State(state): State<AppState>, cookies: Cookies) -> Html<String> {
    state.sessions.acquire(&cookies);
    pages::realtime()
}

async fn realtime_capture(
    State(state): State<AppState>,
    cookies: Cookies,
    multipart: Multipart,
) -> Result<Redirect, AppError> {
    let session = state.sessions.acquire(&cookies);
    let image = read_form(multipart).await?.take_file("webcam");

    run_in_session(&state, session, move |workflow, session| {
        workflow.process_realtime_capture(session, image.as_ref())
    })
    .await?;
    Ok(Redirect::to("/realtime"))
}

async fn register_page(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Html<String>, AppError> {
    let session = state.sessions.acquire(&cookies);
    Ok(pages::register(&drain_flashes(session).await?, None))
}

/// A submitted name completes the pending registration before any capture in
/// the same request is taken.
async fn register_submit(
    State(state): State<AppState>,
    cookies: Cookies,
    multipart: Multipart,
) -> Result<Html<String>, AppError> {
    let session = state.sessions.acquire(&cookies);
    let mut form = read_form(multipart).await?;

    let name = form
        .text("name")
        .map(str::trim)
        .map(str::to_owned);
    let error = name
        .as_deref()
        .filter(|n| n.is_empty())
        .map(|_| message::NAME_REQUIRED);
    let capture = form.take_file("webcam").filter(|image| !image.is_empty());

    let flashes = run_in_session(&state, session, move |workflow, session| {
        if let Some(name) = name.as_deref().filter(|n| !n.is_empty()) {
            let outcome = workflow.complete_registration(session, name)?;
            session.flash(message::registration_message(outcome));
        }
        if let Some(image) = &capture {
            workflow.begin_registration_capture(session, image)?;
        }
        Ok(session.take_flashes())
    })
    .await?;
    Ok(pages::register(&flashes, error))
}

async fn people(State(state): State<AppState>) -> Result<Json<Vec<PersonSummary>>, AppError> {
    let source = state.people.clone();
    let people = tokio::task::spawn_blocking(move || source.people())
        .await?
        .map_err(AppError::People)?;
    Ok(Json(people))
}
