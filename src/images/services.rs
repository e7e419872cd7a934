use std::future::Future;

use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use super::repo_types::Image;
use crate::{
    auth::repo_types::User, error::AppError, projects::repo_types::Project, state::AppState,
};

/// One file of a multipart upload.
pub struct UploadItem {
    pub file_name: String,
    pub content_type: String,
    pub body: Bytes,
}

/// `users/{user}/projects/{project}/{uuid}_{name}`. The random prefix keeps
/// repeated file names apart.
pub fn storage_key(user_id: Uuid, project_id: Uuid, file_name: &str) -> String {
    format!(
        "users/{}/projects/{}/{}_{}",
        user_id,
        project_id,
        Uuid::new_v4(),
        base_name(file_name)
    )
}

fn base_name(file_name: &str) -> &str {
    match file_name.rsplit(['/', '\\']).next() {
        Some(name) if !name.trim().is_empty() => name,
        _ => "image",
    }
}

pub fn public_url(bucket_url: &str, key: &str) -> String {
    format!("{}{}", bucket_url, key)
}

pub fn key_from_url<'a>(bucket_url: &str, url: &'a str) -> Option<&'a str> {
    url.strip_prefix(bucket_url).filter(|k| !k.is_empty())
}

/// Runs `work` on its own task. Dropping the caller (request timeout, client
/// disconnect) then cannot stop a blob write between its storage call and the
/// matching row change or compensation.
pub async fn detached<T, F>(work: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("storage task aborted: {}", e)))?
}

/// Stores each file and records an image row for it, in order. When file `i`
/// fails, the blobs and rows created for files `0..i` are removed again
/// (best effort) and the error of file `i` is returned. The batch runs to
/// completion even if the caller goes away.
pub async fn upload_images(
    st: &AppState,
    owner: &User,
    project: &Project,
    files: Vec<UploadItem>,
) -> Result<Vec<Image>, AppError> {
    let st = st.clone();
    let owner_id = owner.id;
    let project = project.clone();
    detached(async move { upload_batch(&st, owner_id, &project, files).await }).await
}

async fn upload_batch(
    st: &AppState,
    owner_id: Uuid,
    project: &Project,
    files: Vec<UploadItem>,
) -> Result<Vec<Image>, AppError> {
    let bucket_url = st.config.s3.bucket_url();
    let mut created = Vec::with_capacity(files.len());

    for file in files {
        match upload_one(st, &bucket_url, owner_id, project, file).await {
            Ok(image) => created.push(image),
            Err(e) => {
                warn!(project_id = %project.id, stored = created.len(), "upload batch aborted");
                discard(st, &created).await;
                return Err(e);
            }
        }
    }

    info!(project_id = %project.id, count = created.len(), "images uploaded");
    Ok(created)
}

async fn upload_one(
    st: &AppState,
    bucket_url: &str,
    owner_id: Uuid,
    project: &Project,
    file: UploadItem,
) -> Result<Image, AppError> {
    let key = storage_key(owner_id, project.id, &file.file_name);
    info!(
        file_name = %file.file_name,
        file_size = file.body.len(),
        file_type = %file.content_type,
        %key,
        "upload image to storage"
    );

    st.storage
        .put_object(&key, file.body, &file.content_type)
        .await?;

    match st.store.create_image(project.id, &public_url(bucket_url, &key)).await {
        Ok(image) => Ok(image),
        Err(e) => {
            if let Err(cleanup) = st.storage.delete_object(&key).await {
                warn!(error = %cleanup, %key, "could not remove unrecorded blob");
            }
            Err(e.into())
        }
    }
}

async fn discard(st: &AppState, images: &[Image]) {
    for image in images.iter().rev() {
        if let Err(e) = remove_image(st, image).await {
            warn!(error = %e, image_id = %image.id, "compensating delete failed");
        }
    }
}

/// Removes the blob, then the row, on a task of its own. The row survives a
/// failed blob delete.
pub async fn delete_image(st: &AppState, image: &Image) -> Result<(), AppError> {
    let st = st.clone();
    let image = image.clone();
    detached(async move { remove_image(&st, &image).await }).await
}

/// Blob-then-row delete for callers already running detached.
pub async fn remove_image(st: &AppState, image: &Image) -> Result<(), AppError> {
    let bucket_url = st.config.s3.bucket_url();
    let key = key_from_url(&bucket_url, &image.url).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "image {} url {} is outside bucket {}",
            image.id,
            image.url,
            bucket_url
        ))
    })?;

    st.storage.delete_object(key).await?;
    st.store.delete_image(image.id).await?;

    info!(image_id = %image.id, project_id = %image.project_id, %key, "image deleted");
    Ok(())
}
