//! In-process `Store` used by tests. Each method holds one lock for its whole
//! body, which gives the same all-or-nothing behaviour as a transaction.

use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult};
use crate::auth::repo_types::User;
use crate::images::repo_types::Image;
use crate::projects::repo_types::{Job, JobStatus, Project};

/// Token row as the tests inspect it.
#[derive(Debug, Clone)]
pub struct StoredToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub valid: bool,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    tokens: Vec<StoredToken>,
    projects: Vec<Project>,
    images: Vec<Image>,
    jobs: Vec<Job>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_image_inserts_after: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tokens_for_user(&self, user_id: Uuid) -> Vec<StoredToken> {
        let t = self.tables.lock().unwrap();
        t.tokens.iter().filter(|r| r.user_id == user_id).cloned().collect()
    }

    pub fn image_count(&self) -> usize {
        self.tables.lock().unwrap().images.len()
    }

    /// Let `n` more image inserts succeed, then fail every following one.
    pub fn fail_image_inserts_after(&self, n: usize) {
        *self.fail_image_inserts_after.lock().unwrap() = Some(n);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let t = self.tables.lock().unwrap();
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let t = self.tables.lock().unwrap();
        Ok(t.users.iter().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<User> {
        let mut t = self.tables.lock().unwrap();
        if t.users.iter().any(|u| u.username == username) {
            return Err(StoreError::Conflict);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        t.users.push(user.clone());
        Ok(user)
    }

    async fn rotate_token(&self, user_id: Uuid, token: &str) -> StoreResult<Uuid> {
        let mut t = self.tables.lock().unwrap();
        if !t.users.iter().any(|u| u.id == user_id) {
            return Err(StoreError::NotFound);
        }
        for r in t.tokens.iter_mut().filter(|r| r.user_id == user_id && r.valid) {
            r.valid = false;
        }
        let record = StoredToken {
            id: Uuid::new_v4(),
            user_id,
            token: token.to_string(),
            valid: true,
        };
        let id = record.id;
        t.tokens.push(record);
        Ok(id)
    }

    async fn create_project(
        &self,
        user_id: Uuid,
        name: &str,
        keywords: &[String],
    ) -> StoreResult<Project> {
        let mut t = self.tables.lock().unwrap();
        let now = OffsetDateTime::now_utc();
        let project = Project {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            keywords: keywords.to_vec(),
            created_at: now,
            updated_at: now,
        };
        t.projects.push(project.clone());
        Ok(project)
    }

    async fn list_projects(&self, user_id: Uuid) -> StoreResult<Vec<Project>> {
        let t = self.tables.lock().unwrap();
        Ok(t.projects.iter().filter(|p| p.user_id == user_id).cloned().collect())
    }

    async fn find_project(&self, id: Uuid) -> StoreResult<Option<Project>> {
        let t = self.tables.lock().unwrap();
        Ok(t.projects.iter().find(|p| p.id == id).cloned())
    }

    async fn update_project_keywords(&self, id: Uuid, keywords: &[String]) -> StoreResult<Project> {
        let mut t = self.tables.lock().unwrap();
        let project = t
            .projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound)?;
        project.keywords = keywords.to_vec();
        project.updated_at = OffsetDateTime::now_utc();
        Ok(project.clone())
    }

    async fn delete_project(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.lock().unwrap();
        t.projects.retain(|p| p.id != id);
        t.images.retain(|i| i.project_id != id);
        t.jobs.retain(|j| j.project_id != id);
        Ok(())
    }

    async fn create_image(&self, project_id: Uuid, url: &str) -> StoreResult<Image> {
        {
            let mut budget = self.fail_image_inserts_after.lock().unwrap();
            match budget.as_mut() {
                Some(0) => return Err(StoreError::Database(sqlx::Error::PoolTimedOut)),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        let mut t = self.tables.lock().unwrap();
        let now = OffsetDateTime::now_utc();
        let image = Image {
            id: Uuid::new_v4(),
            project_id,
            url: url.to_string(),
            masks_labels: Vec::new(),
            labels_stuff: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        t.images.push(image.clone());
        Ok(image)
    }

    async fn list_images(&self, project_id: Uuid) -> StoreResult<Vec<Image>> {
        let t = self.tables.lock().unwrap();
        Ok(t.images.iter().filter(|i| i.project_id == project_id).cloned().collect())
    }

    async fn find_image(&self, id: Uuid) -> StoreResult<Option<Image>> {
        let t = self.tables.lock().unwrap();
        Ok(t.images.iter().find(|i| i.id == id).cloned())
    }

    async fn delete_image(&self, id: Uuid) -> StoreResult<()> {
        let mut t = self.tables.lock().unwrap();
        t.images.retain(|i| i.id != id);
        Ok(())
    }

    async fn find_job_for_project(&self, project_id: Uuid) -> StoreResult<Option<Job>> {
        let t = self.tables.lock().unwrap();
        Ok(t.jobs.iter().find(|j| j.project_id == project_id).cloned())
    }

    async fn create_job(&self, project_id: Uuid, status: JobStatus) -> StoreResult<Job> {
        let mut t = self.tables.lock().unwrap();
        if t.jobs.iter().any(|j| j.project_id == project_id) {
            return Err(StoreError::Conflict);
        }
        let now = OffsetDateTime::now_utc();
        let job = Job {
            id: Uuid::new_v4(),
            project_id,
            status: status.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };
        t.jobs.push(job.clone());
        Ok(job)
    }
}
