use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::Router;
use tokio_util::io::ReaderStream;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::ingest::{ingest, IngestError};
use crate::storage::file::FileStore;
use crate::storage::{Store, StoreError};

/// Build the service's router. The only state the handlers share is the
/// chunk store.
pub fn router(store: Arc<FileStore>) -> Router {
    Router::new()
        .route("/db/:name", get(on_get))
        .route("/db", put(on_put))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

/// Convert a store error to an HTTP status code
fn store_error_code(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::InvalidName(_) => StatusCode::BAD_REQUEST,
        StoreError::Transient(_) | StoreError::Permanent(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Handles the HTTP PUT request: ingests the request body into the store
async fn on_put(State(store): State<Arc<FileStore>>, request: Request) -> Response {
    let body = request.into_body().into_data_stream();
    match ingest(body, store.as_ref()).await {
        Ok(_) => (
            StatusCode::ACCEPTED,
            "Accepted file - indexing in progress",
        )
            .into_response(),
        Err(err) => {
            error!("Could not import file: {err}");
            let code = match &err {
                IngestError::Parse(_) => StatusCode::BAD_REQUEST,
                IngestError::Store(e) => store_error_code(e),
                IngestError::Read(_) | IngestError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (code, format!("Could not parse XML: {}", err.cause())).into_response()
        }
    }
}

/// Handles the HTTP GET request: streams a chunk back to the client
async fn on_get(State(store): State<Arc<FileStore>>, Path(name): Path<String>) -> Response {
    match store.get(&name).await {
        Ok(chunk) => {
            let size = chunk.size();
            let body = Body::from_stream(ReaderStream::new(chunk.into_reader()));
            match Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, size)
                .header(header::CONTENT_TYPE, "application/xml")
                .body(body)
            {
                Ok(response) => response,
                Err(err) => {
                    error!("Could not build response: {err}");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
        Err(err) => {
            error!("Could not get chunk: {err}");
            (store_error_code(&err), err.to_string()).into_response()
        }
    }
}
