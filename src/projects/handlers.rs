use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{
        CreateProjectRequest, JobCreated, ProjectEnvelope, ProjectList, ProjectView,
        UpdateProjectRequest,
    },
    guard::{self, ProjectPath, UserPath},
    services,
};
use crate::{auth::jwt::Caller, error::AppError, extract::AppJson, state::AppState};

pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:user_id/projects",
            post(create_project).get(list_projects),
        )
        .route(
            "/users/:user_id/projects/:project_id",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/users/:user_id/projects/:project_id/job", post(start_job))
}

#[instrument(skip(state, caller, payload))]
pub async fn create_project(
    State(state): State<AppState>,
    caller: Caller,
    Path(path): Path<UserPath>,
    AppJson(payload): AppJson<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectEnvelope>), AppError> {
    let owner = guard::owner(&state, &caller, &path).await?;
    let project = state
        .store
        .create_project(owner.id, &payload.name, &payload.keywords)
        .await?;
    info!(user_id = %owner.id, project_id = %project.id, "project created");
    Ok((
        StatusCode::CREATED,
        Json(ProjectEnvelope {
            project: project.into(),
        }),
    ))
}

#[instrument(skip(state, caller))]
pub async fn list_projects(
    State(state): State<AppState>,
    caller: Caller,
    Path(path): Path<UserPath>,
) -> Result<Json<ProjectList>, AppError> {
    let owner = guard::owner(&state, &caller, &path).await?;
    let projects = state.store.list_projects(owner.id).await?;
    Ok(Json(ProjectList {
        projects: projects.into_iter().map(ProjectView::from).collect(),
    }))
}

#[instrument(skip(state, caller))]
pub async fn get_project(
    State(state): State<AppState>,
    caller: Caller,
    Path(path): Path<ProjectPath>,
) -> Result<Json<ProjectEnvelope>, AppError> {
    let scope = guard::project(&state, &caller, &path).await?;
    let project = services::describe(&state, scope.project).await?;
    Ok(Json(ProjectEnvelope { project }))
}

#[instrument(skip(state, caller, payload))]
pub async fn update_project(
    State(state): State<AppState>,
    caller: Caller,
    Path(path): Path<ProjectPath>,
    AppJson(payload): AppJson<UpdateProjectRequest>,
) -> Result<Json<ProjectEnvelope>, AppError> {
    let scope = guard::project(&state, &caller, &path).await?;
    let project = state
        .store
        .update_project_keywords(scope.project.id, &payload.keywords)
        .await?;
    Ok(Json(ProjectEnvelope {
        project: project.into(),
    }))
}

#[instrument(skip(state, caller))]
pub async fn delete_project(
    State(state): State<AppState>,
    caller: Caller,
    Path(path): Path<ProjectPath>,
) -> Result<StatusCode, AppError> {
    let scope = guard::project(&state, &caller, &path).await?;
    services::delete_project(&state, &scope.project).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip(state, caller))]
pub async fn start_job(
    State(state): State<AppState>,
    caller: Caller,
    Path(path): Path<ProjectPath>,
) -> Result<(StatusCode, Json<JobCreated>), AppError> {
    let scope = guard::project(&state, &caller, &path).await?;
    let job = services::start_job(&state, &scope.project).await?;
    Ok((
        StatusCode::CREATED,
        Json(JobCreated {
            job_id: job.id,
            status: job.status,
        }),
    ))
}
