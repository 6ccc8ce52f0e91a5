//! HTTP handlers for `/books`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use bookshelf_http::AppError;
use serde_json::{json, Value};

use super::models::{BookEnvelope, BookUpdate, BooksEnvelope, MessageEnvelope, NewBook};
use super::repository::{BookRepository, RepositoryError};
use super::schema::{BookValidator, ValidationError, ValidationMode};

/// Shared, immutable state behind every books handler.
#[derive(Clone)]
pub struct BooksState {
    pub repository: Arc<dyn BookRepository>,
    pub validator: Arc<BookValidator>,
}

pub fn router(state: BooksState) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route(
            "/{isbn}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .with_state(state)
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(isbn) => {
                AppError::not_found(format!("There is no book with an isbn '{isbn}'"))
            }
            RepositoryError::Conflict(isbn) => AppError::conflict(
                vec![json!({ "field": "isbn", "error": "already exists" })],
                format!("A book with isbn '{isbn}' already exists"),
            ),
            RepositoryError::Store(e) => AppError::Internal(e.into()),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        let details = err
            .violations
            .into_iter()
            .map(|v| json!({ "field": v.field, "error": v.error }))
            .collect();
        AppError::validation(details, "Book validation failed")
    }
}

/// An empty body reads as `{}` so update-on-missing-row still reaches the store.
fn parse_body(body: &Bytes) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::bad_request(format!("request body is not valid JSON: {e}")))
}

fn decode<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, AppError> {
    serde_json::from_value(payload)
        .map_err(|e| AppError::bad_request(format!("request body does not describe a book: {e}")))
}

async fn list_books(State(state): State<BooksState>) -> Result<Json<BooksEnvelope>, AppError> {
    let books = state.repository.list_all().await?;
    Ok(Json(BooksEnvelope { books }))
}

async fn get_book(
    State(state): State<BooksState>,
    Path(isbn): Path<String>,
) -> Result<Json<BookEnvelope>, AppError> {
    let book = state.repository.get_by_isbn(&isbn).await?;
    Ok(Json(BookEnvelope { book }))
}

async fn create_book(
    State(state): State<BooksState>,
    body: Bytes,
) -> Result<(StatusCode, Json<BookEnvelope>), AppError> {
    let mut payload = parse_body(&body)?;
    state
        .validator
        .validate(&mut payload, ValidationMode::Create)?;
    let new_book: NewBook = decode(payload)?;

    let book = state.repository.create(new_book).await?;
    tracing::info!(isbn = %book.isbn, "book created");
    Ok((StatusCode::CREATED, Json(BookEnvelope { book })))
}

async fn update_book(
    State(state): State<BooksState>,
    Path(isbn): Path<String>,
    body: Bytes,
) -> Result<Json<BookEnvelope>, AppError> {
    let mut payload = parse_body(&body)?;
    state
        .validator
        .validate(&mut payload, ValidationMode::Update)?;
    let update: BookUpdate = decode(payload)?;

    if update.isbn.as_deref().is_some_and(|body_isbn| body_isbn != isbn) {
        tracing::debug!(isbn = %isbn, "ignoring isbn supplied in update body");
    }

    let fields = match update.into_fields() {
        Ok(fields) => fields,
        Err(missing) => {
            // An absent row outranks an incomplete body.
            state.repository.get_by_isbn(&isbn).await?;
            let details = missing
                .into_iter()
                .map(|field| json!({ "field": field, "error": "is required" }))
                .collect();
            return Err(AppError::validation(details, "Book validation failed"));
        }
    };

    let book = state.repository.update_by_isbn(&isbn, fields).await?;
    tracing::info!(isbn = %book.isbn, "book updated");
    Ok(Json(BookEnvelope { book }))
}

async fn delete_book(
    State(state): State<BooksState>,
    Path(isbn): Path<String>,
) -> Result<Json<MessageEnvelope>, AppError> {
    state.repository.delete_by_isbn(&isbn).await?;
    tracing::info!(isbn = %isbn, "book deleted");
    Ok(Json(MessageEnvelope {
        message: "Book deleted".to_string(),
    }))
}
