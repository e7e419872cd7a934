use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::Image;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageView {
    pub id: Uuid,
    pub url: String,
    pub project_id: Uuid,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Image> for ImageView {
    fn from(img: Image) -> Self {
        let labels = img.labels();
        Self {
            id: img.id,
            url: img.url,
            project_id: img.project_id,
            labels,
            created_at: img.created_at,
            updated_at: img.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImageEnvelope {
    pub image: ImageView,
}

#[derive(Debug, Serialize)]
pub struct ImageList {
    pub images: Vec<ImageView>,
}

impl ImageList {
    pub fn from_rows(rows: Vec<Image>) -> Self {
        Self {
            images: rows.into_iter().map(ImageView::from).collect(),
        }
    }
}
