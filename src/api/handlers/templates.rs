use crate::{
    api::handlers::ErrorBody, error::Fault, service::CivicMail, templates::TemplateDetails,
};
use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct PreviewQuery {
    pub name: String,
    pub surname: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Preview {
    pub content: String,
}

#[utoipa::path(
    get,
    path= "/templates",
    responses (
        (status = 200, description = "All templates with their target entities", body = [TemplateDetails]),
        (status = 503, description = "Record store is unavailable", body = ErrorBody)
    ),
    tag= "templates"
)]
#[instrument(skip_all)]
pub async fn list_templates(
    service: Extension<Arc<CivicMail>>,
) -> Result<Json<Vec<TemplateDetails>>, Fault> {
    Ok(Json(service.templates().list_templates_with_targets().await?))
}

#[utoipa::path(
    get,
    path= "/templates/{id}/preview",
    params(
        ("id" = Uuid, Path, description = "Template id"),
        PreviewQuery
    ),
    responses (
        (status = 200, description = "Template rendered with the citizen's names", body = Preview),
        (status = 404, description = "Unknown template", body = ErrorBody)
    ),
    tag= "templates"
)]
#[instrument(skip_all, fields(template_id = %id))]
pub async fn preview_template(
    service: Extension<Arc<CivicMail>>,
    Path(id): Path<Uuid>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<Preview>, Fault> {
    let content = service.preview(id, &query.name, &query.surname).await?;
    Ok(Json(Preview { content }))
}
