use crate::{
    api::handlers::ErrorBody,
    error::Fault,
    service::CivicMail,
    store::{Entity, EntityKind},
};
use axum::{
    extract::{Extension, Query},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use utoipa::IntoParams;

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct EntityFilter {
    /// Only entities of this type.
    #[serde(rename = "type")]
    pub kind: Option<EntityKind>,
}

#[utoipa::path(
    get,
    path= "/entities",
    params(EntityFilter),
    responses (
        (status = 200, description = "Known letter recipients", body = [Entity]),
        (status = 503, description = "Record store is unavailable", body = ErrorBody)
    ),
    tag= "entities"
)]
#[instrument(skip_all)]
pub async fn list_entities(
    service: Extension<Arc<CivicMail>>,
    Query(filter): Query<EntityFilter>,
) -> Result<Json<Vec<Entity>>, Fault> {
    Ok(Json(service.store().list_entities(filter.kind).await?))
}
