use tracing::{info, warn};

use super::{
    dto::ProjectView,
    repo_types::{Job, JobStatus, Project},
};
use crate::{error::AppError, images, state::AppState, store::StoreError};

const JOB_EXISTS: &str = "job already exists for this project";

/// Project representation with the status of its job, if it has one.
pub async fn describe(st: &AppState, project: Project) -> Result<ProjectView, AppError> {
    let job = st.store.find_job_for_project(project.id).await?;
    Ok(ProjectView::from(project).with_job(job))
}

/// Records a `PENDING_LABELS` job. A project gets at most one.
pub async fn start_job(st: &AppState, project: &Project) -> Result<Job, AppError> {
    if st.store.find_job_for_project(project.id).await?.is_some() {
        return Err(AppError::validation(JOB_EXISTS));
    }

    // unique index on jobs.project_id settles concurrent starts
    let job = match st.store.create_job(project.id, JobStatus::PendingLabels).await {
        Ok(job) => job,
        Err(StoreError::Conflict) => return Err(AppError::validation(JOB_EXISTS)),
        Err(e) => return Err(e.into()),
    };

    info!(project_id = %project.id, job_id = %job.id, status = %job.status, "job created");
    Ok(job)
}

/// Deletes every image blob of the project, then the project row (images and
/// job rows cascade). A failed blob delete keeps the project. Runs detached
/// from the request like the other blob/row writes.
pub async fn delete_project(st: &AppState, project: &Project) -> Result<(), AppError> {
    let st = st.clone();
    let project = project.clone();
    images::services::detached(async move { purge_project(&st, &project).await }).await
}

async fn purge_project(st: &AppState, project: &Project) -> Result<(), AppError> {
    let rows = st.store.list_images(project.id).await?;
    for image in &rows {
        if let Err(e) = images::services::remove_image(st, image).await {
            warn!(project_id = %project.id, image_id = %image.id, "project delete aborted");
            return Err(e);
        }
    }

    st.store.delete_project(project.id).await?;
    info!(project_id = %project.id, images = rows.len(), "project deleted");
    Ok(())
}
