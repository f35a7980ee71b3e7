//! Error handling

use axum::response::IntoResponse;
use tracing::info;

use crate::page::StoredImageError;

/// Errors returned by the web handlers.
#[derive(Debug)]
pub enum PoemgenError {
    /// Missing or invalid CSRF token
    Unauthorized,
    /// When a requested resource is not found
    NotFound(String),
    /// When an internal server error occurs
    InternalServerError(String),
}

impl From<axum::http::Error> for PoemgenError {
    fn from(err: axum::http::Error) -> Self {
        PoemgenError::InternalServerError(err.to_string())
    }
}

impl From<tower_sessions::session::Error> for PoemgenError {
    fn from(err: tower_sessions::session::Error) -> Self {
        PoemgenError::InternalServerError(format!("Session error: {err}"))
    }
}

impl From<image::ImageError> for PoemgenError {
    fn from(err: image::ImageError) -> Self {
        PoemgenError::InternalServerError(format!("Image encoding failed: {err}"))
    }
}

impl From<StoredImageError> for PoemgenError {
    fn from(err: StoredImageError) -> Self {
        PoemgenError::InternalServerError(err.to_string())
    }
}

impl IntoResponse for PoemgenError {
    fn into_response(self) -> axum::response::Response {
        match self {
            PoemgenError::Unauthorized => {
                info!("Rejected form submit with a bad CSRF token");
                let mut response = axum::response::Response::new(axum::body::Body::from(
                    "Unauthorized: invalid or missing form token, reload the page.",
                ));
                *response.status_mut() = axum::http::StatusCode::UNAUTHORIZED;
                response
            }
            PoemgenError::NotFound(what) => {
                info!("404 {what}");
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Not Found"));
                *response.status_mut() = axum::http::StatusCode::NOT_FOUND;
                response
            }
            PoemgenError::InternalServerError(message) => {
                tracing::error!("Internal server error: {}", message);
                let mut response =
                    axum::response::Response::new(axum::body::Body::from("Internal server error"));
                *response.status_mut() = axum::http::StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        }
    }
}
