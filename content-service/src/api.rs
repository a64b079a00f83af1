//! HTTP routes for post types
//!
//! | Method | Path | Success |
//! |---|---|---|
//! | `GET` | `/api/post-types?filter=..&sort=..&q=..` | 200, list |
//! | `POST` | `/api/post-types` | 201, created entity |
//! | `GET` | `/api/post-types/{id}` | 200 |
//! | `PUT` | `/api/post-types/{id}` | 200, updated entity |
//! | `DELETE` | `/api/post-types/{id}` | 204 |
//! | `GET` | `/health` | 200 |
//!
//! `filter` and `sort` may repeat. Filters use the textual
//! `name:operator:value[:dataType]` encoding, sorts `name[:asc|desc]`, and
//! both accept a leading `@` for EAV attributes. `q` searches every text
//! column. Errors are rendered by [`Error`]'s `IntoResponse`.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::{CreatePostType, PostType, PostTypeService};
use crate::error::{Error, Result};
use crate::model::{CreateFor, EntityMeta};
use crate::repository::{Filter, Repository, Sort, TransactionManager};

/// Body of `PUT /api/post-types/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePostType {
    /// New code
    pub code: String,
    /// New display name
    pub name: String,
    /// Version the client last read
    pub version: i32,
}

/// Health check payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `ok`
    pub status: String,
    /// Crate version
    pub version: String,
}

/// Build the application router
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use content_service::api;
/// use content_service::cache::TypeMapCache;
/// use content_service::domain::PostTypeService;
/// use content_service::repository::memory::{MemoryRepository, MemoryStore};
///
/// let store = MemoryStore::new();
/// let service = PostTypeService::new(
///     Arc::new(MemoryRepository::new(store.clone())),
///     Arc::new(store),
///     Arc::new(TypeMapCache::new()),
/// );
/// let app: axum::Router = api::router(service);
/// ```
pub fn router<R, M>(post_types: PostTypeService<R, M>) -> Router
where
    R: Repository<Entity = PostType, Create = CreatePostType>,
    M: TransactionManager<Tx = R::Tx>,
{
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/post-types",
            get(list_post_types::<R, M>).post(create_post_type::<R, M>),
        )
        .route(
            "/api/post-types/{id}",
            get(get_post_type::<R, M>)
                .put(update_post_type::<R, M>)
                .delete(delete_post_type::<R, M>),
        )
        .with_state(Arc::new(post_types))
}

type SharedService<R, M> = State<Arc<PostTypeService<R, M>>>;

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Split repeated `filter`, `sort` and `q` parameters
fn parse_list_query(params: Vec<(String, String)>) -> Result<(Vec<Filter>, Vec<Sort>)> {
    let mut filters = Vec::new();
    let mut sorts = Vec::new();

    for (key, value) in params {
        match key.as_str() {
            "filter" => filters.push(value.parse::<Filter>()?),
            "sort" => sorts.push(value.parse::<Sort>()?),
            "q" => {
                let text = value.trim();
                if !text.is_empty() {
                    filters.push(Filter::search(text));
                }
            }
            other => {
                return Err(Error::BadRequest(format!(
                    "Unknown query parameter '{}'",
                    other
                )))
            }
        }
    }

    Ok((filters, sorts))
}

fn path_id(id: std::result::Result<Path<i32>, PathRejection>) -> Result<i32> {
    id.map(|Path(id)| id)
        .map_err(|rejection| Error::BadRequest(rejection.body_text()))
}

fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| Error::BadRequest(rejection.body_text()))
}

async fn list_post_types<R, M>(
    State(service): SharedService<R, M>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<PostType>>>
where
    R: Repository<Entity = PostType, Create = CreatePostType>,
    M: TransactionManager<Tx = R::Tx>,
{
    let (filters, sorts) = parse_list_query(params)?;
    Ok(Json(service.get_many(filters, sorts).await?))
}

async fn get_post_type<R, M>(
    State(service): SharedService<R, M>,
    id: std::result::Result<Path<i32>, PathRejection>,
) -> Result<Json<PostType>>
where
    R: Repository<Entity = PostType, Create = CreatePostType>,
    M: TransactionManager<Tx = R::Tx>,
{
    let id = path_id(id)?;
    Ok(Json(service.get_by_id(id).await?))
}

async fn create_post_type<R, M>(
    State(service): SharedService<R, M>,
    payload: std::result::Result<Json<CreatePostType>, JsonRejection>,
) -> Result<impl IntoResponse>
where
    R: Repository<Entity = PostType, Create = CreatePostType>,
    M: TransactionManager<Tx = R::Tx>,
{
    let input = json_body(payload)?;
    let created = service.create(input).await?;
    tracing::info!(id = created.meta.id, code = %created.code, "post type created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_post_type<R, M>(
    State(service): SharedService<R, M>,
    id: std::result::Result<Path<i32>, PathRejection>,
    payload: std::result::Result<Json<UpdatePostType>, JsonRejection>,
) -> Result<Json<PostType>>
where
    R: Repository<Entity = PostType, Create = CreatePostType>,
    M: TransactionManager<Tx = R::Tx>,
{
    let id = path_id(id)?;
    let UpdatePostType {
        code,
        name,
        version,
    } = json_body(payload)?;

    // identity and timestamps are replaced by the stored ones
    let candidate = CreatePostType { code, name }.into_entity(EntityMeta {
        version,
        ..EntityMeta::fresh(id, Utc::now())
    });
    Ok(Json(service.update(id, candidate).await?))
}

async fn delete_post_type<R, M>(
    State(service): SharedService<R, M>,
    id: std::result::Result<Path<i32>, PathRejection>,
) -> Result<StatusCode>
where
    R: Repository<Entity = PostType, Create = CreatePostType>,
    M: TransactionManager<Tx = R::Tx>,
{
    let id = path_id(id)?;
    match service.delete_by_id(id).await? {
        0 => Err(Error::NotFound(format!("post_type {} not found", id))),
        _ => Ok(StatusCode::NO_CONTENT),
    }
}
