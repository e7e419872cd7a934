use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Job, Project};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Only keywords are mutable.
#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Project> for ProjectView {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            user_id: p.user_id,
            name: p.name,
            keywords: p.keywords,
            status: None,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl ProjectView {
    pub fn with_job(mut self, job: Option<Job>) -> Self {
        self.status = job.map(|j| j.status);
        self
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectEnvelope {
    pub project: ProjectView,
}

#[derive(Debug, Serialize)]
pub struct ProjectList {
    pub projects: Vec<ProjectView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCreated {
    pub job_id: Uuid,
    pub status: String,
}
