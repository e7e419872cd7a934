use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{debug, info, instrument};

use super::{
    dto::{ImageEnvelope, ImageList},
    services::{self, UploadItem},
};
use crate::{
    auth::jwt::Caller,
    error::AppError,
    projects::guard::{self, ImagePath, ProjectPath},
    state::AppState,
};

const UPLOAD_FIELD: &str = "images";

pub fn image_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:user_id/projects/:project_id/images",
            get(list_images).post(upload_images),
        )
        .route(
            "/users/:user_id/projects/:project_id/images/:image_id",
            get(get_image).delete(delete_image),
        )
}

#[instrument(skip(state, caller, multipart))]
pub async fn upload_images(
    State(state): State<AppState>,
    caller: Caller,
    Path(path): Path<ProjectPath>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<ImageList>), AppError> {
    let scope = guard::project(&state, &caller, &path).await?;
    let mut multipart = multipart?;

    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            debug!(field = ?field.name(), "skipping multipart field");
            continue;
        }
        // only file parts count; a plain value under the same name is ignored
        let Some(file_name) = field.file_name().map(str::to_string) else {
            debug!("skipping non-file images field");
            continue;
        };
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = field.bytes().await?;
        files.push(UploadItem {
            file_name,
            content_type,
            body,
        });
    }

    let images = services::upload_images(&state, &scope.owner, &scope.project, files).await?;
    Ok((StatusCode::CREATED, Json(ImageList::from_rows(images))))
}

#[instrument(skip(state, caller))]
pub async fn list_images(
    State(state): State<AppState>,
    caller: Caller,
    Path(path): Path<ProjectPath>,
) -> Result<Json<ImageList>, AppError> {
    let scope = guard::project(&state, &caller, &path).await?;
    let rows = state.store.list_images(scope.project.id).await?;
    Ok(Json(ImageList::from_rows(rows)))
}

#[instrument(skip(state, caller))]
pub async fn get_image(
    State(state): State<AppState>,
    caller: Caller,
    Path(path): Path<ImagePath>,
) -> Result<Json<ImageEnvelope>, AppError> {
    let scope = guard::image(&state, &caller, &path).await?;
    Ok(Json(ImageEnvelope {
        image: scope.image.into(),
    }))
}

#[instrument(skip(state, caller))]
pub async fn delete_image(
    State(state): State<AppState>,
    caller: Caller,
    Path(path): Path<ImagePath>,
) -> Result<StatusCode, AppError> {
    let scope = guard::image(&state, &caller, &path).await?;
    services::delete_image(&state, &scope.image).await?;
    info!(project_id = %scope.project.id, image_id = %scope.image.id, "image removed by owner");
    Ok(StatusCode::OK)
}
