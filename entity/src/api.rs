use crate::config::Listener;
use crate::errors::EntityError;
use crate::manager::EntityManager;
use crate::metrics_defs::REQUEST_DURATION;
use crate::store::EntityStore;
use crate::types::{BulkRequest, Entity};
use crate::validation::{validate_entity, validate_external_id};
use axum::{
    Json, Router,
    extract::{MatchedPath, Path, Request, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use shared::histogram;
use std::time::Instant;
use tokio::net::TcpListener;

pub fn router<S: EntityStore>(manager: EntityManager<S>) -> Router {
    Router::new()
        .route("/entity", post(create_entity::<S>))
        .route("/entity/bulk", post(bulk::<S>))
        .route(
            "/entity/{external_id}",
            get(get_entity::<S>).delete(delete_entity::<S>),
        )
        .route_layer(middleware::from_fn(track_metrics))
        .with_state(manager)
}

pub async fn serve<S: EntityStore>(
    listener: &Listener,
    manager: EntityManager<S>,
) -> Result<(), std::io::Error> {
    let addr = format!("{}:{}", listener.host, listener.port);
    let tcp_listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "entity api listening");

    axum::serve(tcp_listener, router(manager)).await
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl From<JsonRejection> for EntityError {
    fn from(rejection: JsonRejection) -> Self {
        EntityError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for EntityError {
    fn into_response(self) -> Response {
        let status = match self {
            EntityError::InvalidRequest(_) | EntityError::Validation(_) => StatusCode::BAD_REQUEST,
            EntityError::IdAlreadyExists(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EntityError::EntityNotFound(_) => StatusCode::NOT_FOUND,
            EntityError::Store(_) | EntityError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

// Store calls block, so they run off the async workers. A spawned task also
// runs to completion when the client goes away mid-request.
async fn run_blocking<S, T, F>(manager: EntityManager<S>, f: F) -> Result<T, EntityError>
where
    S: EntityStore,
    T: Send + 'static,
    F: FnOnce(EntityManager<S>) -> Result<T, EntityError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(manager)).await?
}

fn wants_plain_text(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|media_type| media_type.trim().eq_ignore_ascii_case("text/plain"))
}

async fn get_entity<S: EntityStore>(
    State(manager): State<EntityManager<S>>,
    Path(external_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, EntityError> {
    validate_external_id("params/externalId", &external_id)?;

    let entity = run_blocking(manager, move |m| m.get_entity(&external_id)).await?;

    if wants_plain_text(&headers) {
        let content_type = [(header::CONTENT_TYPE, "text/plain; charset=utf-8")];
        return Ok((content_type, entity.osm_id.to_string()).into_response());
    }
    Ok(Json(entity).into_response())
}

async fn create_entity<S: EntityStore>(
    State(manager): State<EntityManager<S>>,
    body: Result<Json<Entity>, JsonRejection>,
) -> Result<StatusCode, EntityError> {
    let Json(entity) = body?;
    validate_entity("body", &entity)?;

    run_blocking(manager, move |m| m.create_entity(entity)).await?;
    Ok(StatusCode::CREATED)
}

async fn delete_entity<S: EntityStore>(
    State(manager): State<EntityManager<S>>,
    Path(external_id): Path<String>,
) -> Result<StatusCode, EntityError> {
    validate_external_id("params/externalId", &external_id)?;

    run_blocking(manager, move |m| m.delete_entity(&external_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn bulk<S: EntityStore>(
    State(manager): State<EntityManager<S>>,
    body: Result<Json<BulkRequest>, JsonRejection>,
) -> Result<StatusCode, EntityError> {
    let Json(request) = body?;

    run_blocking(manager, move |m| m.execute_bulk(request)).await?;
    Ok(StatusCode::OK)
}

async fn track_metrics(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let response = next.run(request).await;

    histogram!(
        REQUEST_DURATION,
        "status" => response.status().as_u16().to_string(),
        "route" => route
    )
    .record(start.elapsed().as_secs_f64());

    response
}
