use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Image {
    pub id: Uuid,
    pub project_id: Uuid,
    pub url: String,
    pub masks_labels: Vec<String>,  // labels derived from segmentation masks
    pub labels_stuff: Vec<String>,  // free-text labels
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Image {
    /// Union of both label collections without duplicates. Ordering is not
    /// part of the contract.
    pub fn labels(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.masks_labels
            .iter()
            .chain(self.labels_stuff.iter())
            .filter(|l| seen.insert(l.as_str()))
            .cloned()
            .collect()
    }
}
