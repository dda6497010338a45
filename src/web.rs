//! # REST Surface
//!
//! Axum routers for the hub's protocol surface and the adapter's
//! delegation surface. Bodies are decoded by hand so malformed JSON yields
//! the same `{"errMessage": …}` shape as every other failure instead of a
//! framework rejection.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::adapter::{self, Adapter};
use crate::error::Error;
use crate::hub::Hub;
use crate::model::{AuthorizationRequest, CreateProfileRequest};

/// Routes for the hub's protocol surface.
pub fn hub_router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/hubstore/profiles", post(create_profile))
        .route("/hubstore/profiles/{profile_id}/queries", post(create_query))
        .route("/hubstore/profiles/{profile_id}/authorizations", post(create_authorization))
        .route("/compare", post(compare))
        .route("/extract", post(extract))
        .with_state(hub)
}

/// Routes for the delegation adapter. Deployed as its own service, or
/// merged with the hub router under a distinct prefix.
pub fn adapter_router(adapter: Arc<Adapter>) -> Router {
    Router::new()
        .route("/authorizations", post(authorize))
        .route("/compare", post(adapter_compare))
        .with_state(adapter)
}

async fn create_profile(State(hub): State<Arc<Hub>>, body: String) -> Result<Response, Error> {
    let request: CreateProfileRequest = decode(&body)?;
    let profile = hub.create_profile(request).await?;
    Ok((StatusCode::CREATED, Json(profile)).into_response())
}

async fn create_query(
    State(hub): State<Arc<Hub>>, Path(profile_id): Path<String>, body: String,
) -> Result<Response, Error> {
    let value: Value = decode(&body)?;
    let created = hub.create_query(&profile_id, &value).await?;
    Ok((StatusCode::CREATED, [(header::LOCATION, created.location)]).into_response())
}

async fn create_authorization(
    State(hub): State<Arc<Hub>>, Path(profile_id): Path<String>, body: String,
) -> Result<Response, Error> {
    let request: AuthorizationRequest = decode(&body)?;
    let authorization = hub.create_authorization(&profile_id, request).await?;
    Ok((StatusCode::CREATED, Json(authorization)).into_response())
}

async fn compare(State(hub): State<Arc<Hub>>, body: String) -> Result<Response, Error> {
    let value: Value = decode(&body)?;
    let result = hub.compare(&value).await?;
    Ok(Json(result).into_response())
}

async fn extract(State(hub): State<Arc<Hub>>, body: String) -> Result<Response, Error> {
    let value: Value = decode(&body)?;
    let extractions = hub.extract(&value).await?;
    Ok(Json(extractions).into_response())
}

async fn authorize(State(adapter): State<Arc<Adapter>>, body: String) -> Result<Response, Error> {
    let request: adapter::AuthorizationRequest = decode(&body)?;
    let authorization = adapter.handle_authorization(request).await?;
    Ok(Json(authorization).into_response())
}

async fn adapter_compare(
    State(adapter): State<Arc<Adapter>>, body: String,
) -> Result<Response, Error> {
    let value: Value = decode(&body)?;
    let result = adapter.handle_comparison(&value).await?;
    Ok(Json(result).into_response())
}

/// Decode a JSON body, folding syntax and shape errors into a plain 400.
fn decode<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|_| Error::BadRequest("bad request".to_string()))
}
