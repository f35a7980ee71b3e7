pub(crate) use crate::constants::PAGE_SESSION_KEY;
pub(crate) use crate::error::PoemgenError;
pub(crate) use crate::page::PageState;
pub(crate) use crate::web::AppState;
pub(crate) use askama::Template;
pub(crate) use askama_web::WebTemplate;
pub(crate) use axum::extract::{Form, State};
pub(crate) use axum::http::{HeaderValue, StatusCode, header::CONTENT_TYPE};
pub(crate) use serde::Deserialize;
pub(crate) use tower_sessions::Session;
pub(crate) use tracing::{debug, info};
