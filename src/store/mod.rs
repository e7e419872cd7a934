//! Relational persistence for users, tokens, projects, images and jobs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::repo_types::User;
use crate::images::repo_types::Image;
use crate::projects::repo_types::{Job, JobStatus, Project};

#[cfg(test)]
pub mod memory;
mod postgres;

pub use postgres::PgStore;

/// Closed set of store failures. Unique-constraint violations and missing
/// rows are classified here so callers never inspect driver messages.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record does not exist")]
    NotFound,
    #[error("record already exists")]
    Conflict,
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict,
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    /// Fails with `Conflict` when the username is taken.
    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<User>;

    /// Marks every valid token of the user invalid and records `token` as the
    /// only valid one, returning the new token row id. Both steps commit
    /// together, and concurrent rotations for one user run one after another.
    async fn rotate_token(&self, user_id: Uuid, token: &str) -> StoreResult<Uuid>;

    async fn create_project(
        &self,
        user_id: Uuid,
        name: &str,
        keywords: &[String],
    ) -> StoreResult<Project>;
    async fn list_projects(&self, user_id: Uuid) -> StoreResult<Vec<Project>>;
    async fn find_project(&self, id: Uuid) -> StoreResult<Option<Project>>;
    async fn update_project_keywords(&self, id: Uuid, keywords: &[String]) -> StoreResult<Project>;
    /// Removes the project; its images and job go with it.
    async fn delete_project(&self, id: Uuid) -> StoreResult<()>;

    async fn create_image(&self, project_id: Uuid, url: &str) -> StoreResult<Image>;
    async fn list_images(&self, project_id: Uuid) -> StoreResult<Vec<Image>>;
    async fn find_image(&self, id: Uuid) -> StoreResult<Option<Image>>;
    async fn delete_image(&self, id: Uuid) -> StoreResult<()>;

    async fn find_job_for_project(&self, project_id: Uuid) -> StoreResult<Option<Job>>;
    /// Fails with `Conflict` when the project already has a job.
    async fn create_job(&self, project_id: Uuid, status: JobStatus) -> StoreResult<Job>;
}
