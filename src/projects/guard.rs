//! Ownership checks run before any project or image is disclosed or mutated.
//!
//! Every path id is parsed first (malformed -> `Validation`). The verified
//! caller must be the path user, the path user must exist, and each nested
//! resource must belong to its parent. Any failure after parsing is reported
//! as `NotFound`, so a foreign resource looks exactly like a missing one.

use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::{jwt::Caller, repo_types::User},
    error::AppError,
    images::repo_types::Image,
    projects::repo_types::Project,
    state::AppState,
};

const USER_NOT_FOUND: &str = "record does not exist";
const PROJECT_NOT_FOUND: &str = "project not found";
const IMAGE_NOT_FOUND: &str = "image not found";

#[derive(Debug, Deserialize)]
pub struct UserPath {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ProjectPath {
    pub user_id: String,
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ImagePath {
    pub user_id: String,
    pub project_id: String,
    pub image_id: String,
}

#[derive(Debug)]
pub struct ProjectScope {
    pub owner: User,
    pub project: Project,
}

#[derive(Debug)]
pub struct ImageScope {
    pub project: Project,
    pub image: Image,
}

fn parse_id(raw: &str, field: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::validation(format!("valid {field} is required")))
}

async fn bind_owner(st: &AppState, caller: &Caller, user_id: Uuid) -> Result<User, AppError> {
    if !caller.may_act_as(user_id) {
        debug!(%user_id, "caller does not match path user");
        return Err(AppError::not_found(USER_NOT_FOUND));
    }
    st.store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::not_found(USER_NOT_FOUND))
}

async fn bind_project(st: &AppState, owner: &User, project_id: Uuid) -> Result<Project, AppError> {
    match st.store.find_project(project_id).await? {
        Some(project) if project.user_id == owner.id => Ok(project),
        Some(_) => {
            debug!(user_id = %owner.id, %project_id, "project owned by another user");
            Err(AppError::not_found(PROJECT_NOT_FOUND))
        }
        None => Err(AppError::not_found(PROJECT_NOT_FOUND)),
    }
}

/// Resolves the path user.
pub async fn owner(st: &AppState, caller: &Caller, path: &UserPath) -> Result<User, AppError> {
    let user_id = parse_id(&path.user_id, "user_id")?;
    bind_owner(st, caller, user_id).await
}

/// Resolves the path user and one of their projects.
pub async fn project(
    st: &AppState,
    caller: &Caller,
    path: &ProjectPath,
) -> Result<ProjectScope, AppError> {
    let user_id = parse_id(&path.user_id, "user_id")?;
    let project_id = parse_id(&path.project_id, "project_id")?;

    let owner = bind_owner(st, caller, user_id).await?;
    let project = bind_project(st, &owner, project_id).await?;
    Ok(ProjectScope { owner, project })
}

/// Resolves the path user, their project, and an image inside that project.
pub async fn image(st: &AppState, caller: &Caller, path: &ImagePath) -> Result<ImageScope, AppError> {
    let user_id = parse_id(&path.user_id, "user_id")?;
    let project_id = parse_id(&path.project_id, "project_id")?;
    let image_id = parse_id(&path.image_id, "image_id")?;

    let owner = bind_owner(st, caller, user_id).await?;
    let project = bind_project(st, &owner, project_id).await?;
    let image = match st.store.find_image(image_id).await? {
        Some(image) if image.project_id == project.id => image,
        _ => return Err(AppError::not_found(IMAGE_NOT_FOUND)),
    };
    Ok(ImageScope { project, image })
}
