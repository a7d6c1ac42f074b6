use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Extension, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};

use crate::app::dto::{
    CreateGoodRequest, IdParams, ListMeta, ListParams, ListResponse, PrioritiesResponse,
    ProjectParams, RemoveResponse, ReprioritizeRequest, UpdateGoodRequest,
};
use crate::app::errors::ApiError;
use crate::app::services::AppServices;

type ApiResult<T> = Result<T, ApiError>;

pub async fn list_goods(
    Extension(services): Extension<Arc<AppServices>>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<ListResponse>> {
    let Query(params) = params?;
    let page = params.pagination();

    let goods = services.engine.list(page).await?;
    let total = services.engine.total_count().await?;
    let removed = services.engine.removed_count().await?;

    Ok(Json(ListResponse {
        meta: ListMeta {
            total,
            removed,
            limit: page.limit,
            offset: page.offset,
        },
        goods,
    }))
}

pub async fn get_good(
    Extension(services): Extension<Arc<AppServices>>,
    params: Result<Query<IdParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let (id, project_id) = params?.0.parse()?;
    let good = services.engine.get(id, project_id).await?;
    Ok(Json(good))
}

pub async fn create_good(
    Extension(services): Extension<Arc<AppServices>>,
    params: Result<Query<ProjectParams>, QueryRejection>,
    body: Result<Json<CreateGoodRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let project_id = params?.0.parse()?;
    let Json(body) = body?;

    let good = services.engine.create(body.into_new_good(project_id)?).await?;
    Ok((StatusCode::CREATED, Json(good)))
}

pub async fn update_good(
    Extension(services): Extension<Arc<AppServices>>,
    params: Result<Query<IdParams>, QueryRejection>,
    body: Result<Json<UpdateGoodRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let (id, project_id) = params?.0.parse()?;
    let Json(body) = body?;

    let good = services
        .engine
        .update(id, project_id, body.into_changes()?)
        .await?;
    Ok(Json(good))
}

pub async fn remove_good(
    Extension(services): Extension<Arc<AppServices>>,
    params: Result<Query<IdParams>, QueryRejection>,
) -> ApiResult<Json<RemoveResponse>> {
    let (id, project_id) = params?.0.parse()?;
    let good = services.engine.mark_as_removed(id, project_id).await?;
    Ok(Json(RemoveResponse::from(&good)))
}

pub async fn reprioritize_good(
    Extension(services): Extension<Arc<AppServices>>,
    params: Result<Query<IdParams>, QueryRejection>,
    body: Result<Json<ReprioritizeRequest>, JsonRejection>,
) -> ApiResult<Json<PrioritiesResponse>> {
    let (id, project_id) = params?.0.parse()?;
    let Json(body) = body?;

    let priorities = services
        .engine
        .reprioritize(id, project_id, body.priority()?)
        .await?;
    Ok(Json(PrioritiesResponse { priorities }))
}
