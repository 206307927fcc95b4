use crate::{
    dav::{path::PathError, render},
    services::object_store::StoreError,
};
use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Methods the dispatcher implements, advertised in `Allow`.
pub const ALLOWED_METHODS: &str = "OPTIONS, GET, HEAD, PUT, DELETE, MKCOL, PROPFIND, COPY, MOVE";

/// Protocol-level failure of a WebDAV request.
#[derive(Debug, Error)]
pub enum DavError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A listing exceeded `max_listing_entries`; nothing partial is returned.
    #[error("listing of {key} exceeds {limit} entries")]
    ListingTooLarge { key: String, limit: usize },

    /// `Depth: infinity` PROPFIND over a tree larger than the listing bound.
    #[error("PROPFIND with Depth: infinity on {0} is too large; use a finite depth")]
    FiniteDepthRequired(String),

    #[error("store failure: {0}")]
    Store(StoreError),
}

pub type DavResult<T> = Result<T, DavError>;

impl DavError {
    pub fn status(&self) -> StatusCode {
        match self {
            DavError::NotFound(_) => StatusCode::NOT_FOUND,
            DavError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DavError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            DavError::Forbidden(_) => StatusCode::FORBIDDEN,
            DavError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            DavError::ListingTooLarge { .. } => StatusCode::INSUFFICIENT_STORAGE,
            DavError::FiniteDepthRequired(_) => StatusCode::FORBIDDEN,
            DavError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for DavError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => DavError::NotFound(format!("/{key}")),
            StoreError::InvalidKey(key) => DavError::BadRequest(format!("invalid key `{key}`")),
            other => DavError::Store(other),
        }
    }
}

impl From<PathError> for DavError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::OutsideMount(path) => DavError::NotFound(path),
            PathError::InvalidEncoding(_) => DavError::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for DavError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let (content_type, body) = match &self {
            DavError::FiniteDepthRequired(_) => (
                "application/xml; charset=utf-8",
                render::render_finite_depth_error(),
            ),
            _ => (
                "text/html; charset=utf-8",
                render::render_error(status.canonical_reason().unwrap_or("Error"), &self.to_string()),
            ),
        };

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        if status == StatusCode::METHOD_NOT_ALLOWED {
            headers.insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
        }
        response
    }
}
