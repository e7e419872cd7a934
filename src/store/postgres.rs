use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::{Store, StoreResult};
use crate::auth::repo_types::User;
use crate::config::AppConfig;
use crate::images::repo_types::Image;
use crate::projects::repo_types::{Job, JobStatus, Project};

const USER_COLUMNS: &str = "id, username, password_hash, created_at, updated_at";
const PROJECT_COLUMNS: &str = "id, user_id, name, keywords, created_at, updated_at";
const IMAGE_COLUMNS: &str =
    "id, project_id, url, masks_labels, labels_stuff, created_at, updated_at";
const JOB_COLUMNS: &str = "id, project_id, status, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_acquire_timeout_secs))
            .connect(&config.database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, password_hash)
            VALUES ($1, $2)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn rotate_token(&self, user_id: Uuid, token: &str) -> StoreResult<Uuid> {
        // Dropping `tx` on any early return rolls back.
        let mut tx = self.pool.begin().await?;

        // Row lock on the user serializes concurrent logins, so each UPDATE
        // below sees the token the previous rotation committed.
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        let invalidated = sqlx::query(
            r#"
            UPDATE tokens
               SET valid = false, updated_at = now()
             WHERE user_id = $1 AND valid = true
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let token_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO tokens (user_id, token, valid)
            VALUES ($1, $2, true)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(token)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(%user_id, %token_id, invalidated, "token rotated");
        Ok(token_id)
    }

    async fn create_project(
        &self,
        user_id: Uuid,
        name: &str,
        keywords: &[String],
    ) -> StoreResult<Project> {
        let project = sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects (user_id, name, keywords)
            VALUES ($1, $2, $3)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(name)
        .bind(keywords)
        .fetch_one(&self.pool)
        .await?;
        Ok(project)
    }

    async fn list_projects(&self, user_id: Uuid) -> StoreResult<Vec<Project>> {
        let rows = sqlx::query_as::<_, Project>(&format!(
            r#"
            SELECT {PROJECT_COLUMNS}
              FROM projects
             WHERE user_id = $1
             ORDER BY created_at ASC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_project(&self, id: Uuid) -> StoreResult<Option<Project>> {
        let project = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(project)
    }

    async fn update_project_keywords(&self, id: Uuid, keywords: &[String]) -> StoreResult<Project> {
        // fetch_one: a vanished row surfaces as RowNotFound -> StoreError::NotFound
        let project = sqlx::query_as::<_, Project>(&format!(
            r#"
            UPDATE projects
               SET keywords = $2, updated_at = now()
             WHERE id = $1
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(keywords)
        .fetch_one(&self.pool)
        .await?;
        Ok(project)
    }

    async fn delete_project(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_image(&self, project_id: Uuid, url: &str) -> StoreResult<Image> {
        let image = sqlx::query_as::<_, Image>(&format!(
            r#"
            INSERT INTO images (project_id, url)
            VALUES ($1, $2)
            RETURNING {IMAGE_COLUMNS}
            "#
        ))
        .bind(project_id)
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        Ok(image)
    }

    async fn list_images(&self, project_id: Uuid) -> StoreResult<Vec<Image>> {
        let rows = sqlx::query_as::<_, Image>(&format!(
            r#"
            SELECT {IMAGE_COLUMNS}
              FROM images
             WHERE project_id = $1
             ORDER BY created_at ASC
            "#
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_image(&self, id: Uuid) -> StoreResult<Option<Image>> {
        let image = sqlx::query_as::<_, Image>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(image)
    }

    async fn delete_image(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_job_for_project(&self, project_id: Uuid) -> StoreResult<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE project_id = $1"
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    async fn create_job(&self, project_id: Uuid, status: JobStatus) -> StoreResult<Job> {
        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            INSERT INTO jobs (project_id, status)
            VALUES ($1, $2)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(project_id)
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    async fn seeded(pool: PgPool) -> (PgStore, User) {
        let store = PgStore { pool };
        let user = store.create_user("alice", "hash").await.unwrap();
        (store, user)
    }

    async fn valid_tokens(store: &PgStore, user_id: Uuid) -> Vec<String> {
        sqlx::query_scalar("SELECT token FROM tokens WHERE user_id = $1 AND valid")
            .bind(user_id)
            .fetch_all(&store.pool)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn rotation_leaves_only_the_newest_token(pool: PgPool) {
        let (store, user) = seeded(pool).await;
        store.rotate_token(user.id, "first").await.unwrap();
        store.rotate_token(user.id, "second").await.unwrap();
        let last = store.rotate_token(user.id, "third").await.unwrap();

        assert_eq!(valid_tokens(&store, user.id).await, vec!["third".to_string()]);
        let newest: Uuid = sqlx::query_scalar("SELECT id FROM tokens WHERE valid")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(newest, last);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn concurrent_logins_keep_one_valid_token(pool: PgPool) {
        let (store, user) = seeded(pool).await;
        let user_id = user.id;

        for round in 0..5 {
            let mut logins = tokio::task::JoinSet::new();
            for i in 0..16 {
                let store = store.clone();
                logins.spawn(async move {
                    store.rotate_token(user_id, &format!("t{round}-{i}")).await
                });
            }
            while let Some(done) = logins.join_next().await {
                done.unwrap().unwrap();
            }
            assert_eq!(valid_tokens(&store, user_id).await.len(), 1, "round {round}");
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn rotation_for_missing_user_is_not_found(pool: PgPool) {
        let store = PgStore { pool };
        let res = store.rotate_token(Uuid::new_v4(), "t").await;
        assert!(matches!(res, Err(StoreError::NotFound)));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_username_is_conflict(pool: PgPool) {
        let (store, _) = seeded(pool).await;
        let res = store.create_user("alice", "other").await;
        assert!(matches!(res, Err(StoreError::Conflict)));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn second_job_hits_unique_index(pool: PgPool) {
        let (store, user) = seeded(pool).await;
        let project = store.create_project(user.id, "p", &[]).await.unwrap();

        let job = store.create_job(project.id, JobStatus::PendingLabels).await.unwrap();
        assert_eq!(job.status, "PENDING_LABELS");
        let res = store.create_job(project.id, JobStatus::PendingLabels).await;
        assert!(matches!(res, Err(StoreError::Conflict)));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn project_delete_cascades(pool: PgPool) {
        let (store, user) = seeded(pool).await;
        let project = store.create_project(user.id, "p", &[]).await.unwrap();
        let image = store
            .create_image(project.id, "https://b.s3.amazonaws.com/k")
            .await
            .unwrap();
        store.create_job(project.id, JobStatus::PendingLabels).await.unwrap();

        store.delete_project(project.id).await.unwrap();

        assert!(store.find_project(project.id).await.unwrap().is_none());
        assert!(store.find_image(image.id).await.unwrap().is_none());
        assert!(store.find_job_for_project(project.id).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn keywords_keep_their_order(pool: PgPool) {
        let (store, user) = seeded(pool).await;
        let keywords = vec!["dog".to_string(), "cat".to_string(), "dog".to_string()];
        let project = store.create_project(user.id, "p", &keywords).await.unwrap();
        assert_eq!(project.keywords, keywords);

        let updated = store
            .update_project_keywords(project.id, &["bird".to_string()])
            .await
            .unwrap();
        assert_eq!(updated.keywords, vec!["bird".to_string()]);

        let res = store.update_project_keywords(Uuid::new_v4(), &[]).await;
        assert!(matches!(res, Err(StoreError::NotFound)));
    }
}
