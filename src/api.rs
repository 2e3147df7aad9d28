use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, OriginalUri, Path, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

use crate::app::{App, MissionDetail};
use crate::entities::{cat, target};
use crate::error::{AppError, ErrorKind};
use crate::model::{
    CatChanges, CatInput, CatQuery, MissionAssignment, MissionInput, MissionQuery, TargetChanges,
};
use crate::pagination::{build_next_url, Page, PageParams};

pub type AppState = Arc<App>;

pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/cats", post(create_cat).get(list_cats))
        .route(
            "/cats/{cat_id}",
            get(get_cat).patch(update_cat).delete(delete_cat),
        )
        .route("/missions", post(create_mission).get(list_missions))
        .route(
            "/missions/{mission_id}",
            get(get_mission).delete(delete_mission),
        )
        .route("/missions/{mission_id}/assign", patch(assign_cat))
        .route(
            "/missions/{mission_id}/targets/{target_id}",
            get(get_target).patch(update_target),
        )
        .layer(middleware::from_fn(log_request))
        .with_state(app)
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;
    debug!(%method, %uri, status = response.status().as_u16(), "Handled request");
    response
}

// ---------------------------------------------------------------------------
// Errors and extractors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    detail: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn unprocessable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: detail.into(),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        let status = match (err.kind(), &err) {
            (ErrorKind::Validation, AppError::InvalidInput(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            (ErrorKind::Validation | ErrorKind::Conflict, _) => StatusCode::BAD_REQUEST,
            (ErrorKind::NotFound, _) => StatusCode::NOT_FOUND,
            (ErrorKind::Upstream, _) => StatusCode::SERVICE_UNAVAILABLE,
            (ErrorKind::Internal, _) => {
                error!(error = %err, "Request failed");
                return Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    detail: "internal server error".to_string(),
                };
            }
        };
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiErrorBody { detail: self.detail })).into_response()
    }
}

/// `Json` whose rejections use the `{"detail": ...}` error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| ApiError::unprocessable(rejection.body_text()))?;
        Ok(Self(value))
    }
}

pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: QueryRejection| ApiError::unprocessable(rejection.body_text()))?;
        Ok(Self(value))
    }
}

pub struct ApiPath<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: PathRejection| ApiError::unprocessable(rejection.body_text()))?;
        Ok(Self(value))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CatResponse {
    pub id: i64,
    pub name: String,
    pub years_of_experience: i32,
    pub breed: String,
    pub salary: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<cat::Model> for CatResponse {
    fn from(cat: cat::Model) -> Self {
        Self {
            id: cat.id,
            name: cat.name,
            years_of_experience: cat.years_of_experience,
            breed: cat.breed,
            salary: cat.salary,
            created_at: cat.created_at,
            updated_at: cat.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TargetResponse {
    pub id: i64,
    pub mission_id: i64,
    pub name: String,
    pub country: String,
    pub notes: Option<String>,
    pub completed: bool,
}

impl From<target::Model> for TargetResponse {
    fn from(target: target::Model) -> Self {
        Self {
            id: target.id,
            mission_id: target.mission_id,
            name: target.name,
            country: target.country,
            notes: target.notes,
            completed: target.completed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MissionResponse {
    pub id: i64,
    pub cat_id: Option<i64>,
    pub completed: bool,
    pub targets: Vec<TargetResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MissionDetail> for MissionResponse {
    fn from(detail: MissionDetail) -> Self {
        let MissionDetail { mission, targets } = detail;
        Self {
            id: mission.id,
            cat_id: mission.cat_id,
            completed: mission.completed,
            targets: targets.into_iter().map(TargetResponse::from).collect(),
            created_at: mission.created_at,
            updated_at: mission.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TargetUpdateResponse {
    #[serde(flatten)]
    pub target: TargetResponse,
    pub mission_completed: bool,
}

#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub results: Vec<T>,
    pub count: u64,
    pub next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatListParams {
    breed: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct MissionListParams {
    completed: Option<bool>,
    cat_id: Option<i64>,
    limit: Option<u64>,
    offset: Option<u64>,
}

fn page_response<T, U>(page: Page<T>, headers: &HeaderMap, uri: &OriginalUri) -> PageResponse<U>
where
    U: From<T>,
{
    let next_url = request_url(headers, uri)
        .and_then(|current| build_next_url(&current, page.params, page.total))
        .map(String::from);
    let page = page.map(U::from);
    PageResponse {
        results: page.items,
        count: page.total,
        next_url,
    }
}

/// Absolute URL of the current request, rebuilt from the `Host` header.
fn request_url(headers: &HeaderMap, uri: &OriginalUri) -> Option<Url> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    let path = uri
        .0
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    Url::parse(&format!("http://{host}{path}")).ok()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn create_cat(
    State(app): State<AppState>,
    ApiJson(input): ApiJson<CatInput>,
) -> Result<Json<CatResponse>, ApiError> {
    let cat = app.create_cat(input).await?;
    Ok(Json(cat.into()))
}

async fn list_cats(
    State(app): State<AppState>,
    headers: HeaderMap,
    uri: OriginalUri,
    ApiQuery(params): ApiQuery<CatListParams>,
) -> Result<Json<PageResponse<CatResponse>>, ApiError> {
    let page_params = PageParams::new(params.limit, params.offset)?;
    let query = CatQuery {
        breed: params.breed,
    };
    let page = app.list_cats(&query, page_params).await?;
    Ok(Json(page_response(page, &headers, &uri)))
}

async fn get_cat(
    State(app): State<AppState>,
    ApiPath(cat_id): ApiPath<i64>,
) -> Result<Json<CatResponse>, ApiError> {
    Ok(Json(app.get_cat(cat_id).await?.into()))
}

async fn update_cat(
    State(app): State<AppState>,
    ApiPath(cat_id): ApiPath<i64>,
    ApiJson(changes): ApiJson<CatChanges>,
) -> Result<Json<CatResponse>, ApiError> {
    Ok(Json(app.update_cat(cat_id, changes).await?.into()))
}

async fn delete_cat(
    State(app): State<AppState>,
    ApiPath(cat_id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    app.delete_cat(cat_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_mission(
    State(app): State<AppState>,
    ApiJson(input): ApiJson<MissionInput>,
) -> Result<(StatusCode, Json<MissionResponse>), ApiError> {
    let detail = app.create_mission(input).await?;
    Ok((StatusCode::CREATED, Json(detail.into())))
}

async fn list_missions(
    State(app): State<AppState>,
    headers: HeaderMap,
    uri: OriginalUri,
    ApiQuery(params): ApiQuery<MissionListParams>,
) -> Result<Json<PageResponse<MissionResponse>>, ApiError> {
    let page_params = PageParams::new(params.limit, params.offset)?;
    let query = MissionQuery {
        completed: params.completed,
        cat_id: params.cat_id,
    };
    let page = app.list_missions(&query, page_params).await?;
    Ok(Json(page_response(page, &headers, &uri)))
}

async fn get_mission(
    State(app): State<AppState>,
    ApiPath(mission_id): ApiPath<i64>,
) -> Result<Json<MissionResponse>, ApiError> {
    Ok(Json(app.get_mission(mission_id).await?.into()))
}

async fn delete_mission(
    State(app): State<AppState>,
    ApiPath(mission_id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    app.delete_mission(mission_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_cat(
    State(app): State<AppState>,
    ApiPath(mission_id): ApiPath<i64>,
    ApiJson(assignment): ApiJson<MissionAssignment>,
) -> Result<Json<MissionResponse>, ApiError> {
    let detail = app.assign_cat(mission_id, assignment.cat_id).await?;
    Ok(Json(detail.into()))
}

async fn get_target(
    State(app): State<AppState>,
    ApiPath((mission_id, target_id)): ApiPath<(i64, i64)>,
) -> Result<Json<TargetResponse>, ApiError> {
    Ok(Json(app.get_target(mission_id, target_id).await?.into()))
}

async fn update_target(
    State(app): State<AppState>,
    ApiPath((mission_id, target_id)): ApiPath<(i64, i64)>,
    ApiJson(changes): ApiJson<TargetChanges>,
) -> Result<Json<TargetUpdateResponse>, ApiError> {
    let update = app.update_target(mission_id, target_id, changes).await?;
    Ok(Json(TargetUpdateResponse {
        target: update.target.into(),
        mission_completed: update.mission_completed,
    }))
}
