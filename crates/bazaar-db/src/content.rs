//! `posts`, `post_images`, `highlights`, and `highlight_media`.

use async_trait::async_trait;
use bazaar_core::content::{
    Highlight, HighlightInput, HighlightMedia, HighlightMediaInput, MediaType, Post, PostImage,
    PostInput,
};
use bazaar_core::store::{HighlightRepo, PostRepo};
use bazaar_core::StoreError;
use chrono::{DateTime, Utc};

use crate::{delete_err, deleted, store_err, PgStore};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            author_id: row.author_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostImageRow {
    pub id: i64,
    pub post_id: Option<i64>,
    pub image: String,
}

impl From<PostImageRow> for PostImage {
    fn from(row: PostImageRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            image: row.image,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HighlightRow {
    pub id: i64,
    pub title: String,
    pub cover_image: String,
    pub created_at: DateTime<Utc>,
}

impl From<HighlightRow> for Highlight {
    fn from(row: HighlightRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            cover_image: row.cover_image,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HighlightMediaRow {
    pub id: i64,
    pub highlight_id: i64,
    pub media_type: Option<String>,
    pub media_file: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<HighlightMediaRow> for HighlightMedia {
    type Error = StoreError;

    fn try_from(row: HighlightMediaRow) -> Result<Self, Self::Error> {
        let media_type = match row.media_type.as_deref() {
            None => None,
            Some(raw) => Some(MediaType::parse(raw).ok_or_else(|| {
                StoreError::Backend(format!(
                    "highlight media {} has unknown media type '{raw}'",
                    row.id
                ))
            })?),
        };
        Ok(Self {
            id: row.id,
            highlight_id: row.highlight_id,
            media_type,
            media_file: row.media_file,
            created_at: row.created_at,
        })
    }
}

const POST_COLUMNS: &str = "id, title, content, author_id, created_at, updated_at";
const MEDIA_COLUMNS: &str = "id, highlight_id, media_type, media_file, created_at";

// ---------------------------------------------------------------------------
// posts / post_images
// ---------------------------------------------------------------------------

#[async_trait]
impl PostRepo for PgStore {
    async fn list_posts(&self) -> Result<Vec<Post>, StoreError> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(Post::from).collect())
    }

    async fn get_post(&self, id: i64) -> Result<Option<Post>, StoreError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(Post::from))
    }

    async fn create_post(
        &self,
        author_id: Option<i64>,
        input: &PostInput,
    ) -> Result<Post, StoreError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "INSERT INTO posts (title, content, author_id) VALUES ($1, $2, $3) \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(&input.title)
        .bind(&input.content)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.into())
    }

    async fn update_post(&self, id: i64, input: &PostInput) -> Result<Post, StoreError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "UPDATE posts SET title = $2, content = $3, updated_at = NOW() WHERE id = $1 \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(id)
        .bind(&input.title)
        .bind(&input.content)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(Post::from)
            .ok_or_else(|| StoreError::not_found("post", id))
    }

    async fn delete_post(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(delete_err)?;
        deleted(result.rows_affected(), "post", id)
    }

    async fn add_post_image(
        &self,
        post_id: Option<i64>,
        image: &str,
    ) -> Result<PostImage, StoreError> {
        let row = sqlx::query_as::<_, PostImageRow>(
            "INSERT INTO post_images (post_id, image) VALUES ($1, $2) \
             RETURNING id, post_id, image",
        )
        .bind(post_id)
        .bind(image)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.into())
    }

    async fn list_post_images(&self, post_ids: &[i64]) -> Result<Vec<PostImage>, StoreError> {
        let rows = sqlx::query_as::<_, PostImageRow>(
            "SELECT id, post_id, image FROM post_images WHERE post_id = ANY($1) ORDER BY id",
        )
        .bind(post_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(PostImage::from).collect())
    }
}

// ---------------------------------------------------------------------------
// highlights / highlight_media
// ---------------------------------------------------------------------------

#[async_trait]
impl HighlightRepo for PgStore {
    async fn list_highlights(&self) -> Result<Vec<Highlight>, StoreError> {
        let rows = sqlx::query_as::<_, HighlightRow>(
            "SELECT id, title, cover_image, created_at FROM highlights ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(rows.into_iter().map(Highlight::from).collect())
    }

    async fn get_highlight(&self, id: i64) -> Result<Option<Highlight>, StoreError> {
        let row = sqlx::query_as::<_, HighlightRow>(
            "SELECT id, title, cover_image, created_at FROM highlights WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.map(Highlight::from))
    }

    async fn create_highlight(&self, input: &HighlightInput) -> Result<Highlight, StoreError> {
        let row = sqlx::query_as::<_, HighlightRow>(
            "INSERT INTO highlights (title, cover_image) VALUES ($1, $2) \
             RETURNING id, title, cover_image, created_at",
        )
        .bind(&input.title)
        .bind(&input.cover_image)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(row.into())
    }

    async fn update_highlight(
        &self,
        id: i64,
        input: &HighlightInput,
    ) -> Result<Highlight, StoreError> {
        let row = sqlx::query_as::<_, HighlightRow>(
            "UPDATE highlights SET title = $2, cover_image = $3 WHERE id = $1 \
             RETURNING id, title, cover_image, created_at",
        )
        .bind(id)
        .bind(&input.title)
        .bind(&input.cover_image)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;
        row.map(Highlight::from)
            .ok_or_else(|| StoreError::not_found("highlight", id))
    }

    async fn delete_highlight(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM highlights WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(delete_err)?;
        deleted(result.rows_affected(), "highlight", id)
    }

    async fn add_highlight_media(
        &self,
        highlight_id: i64,
        input: &HighlightMediaInput,
    ) -> Result<HighlightMedia, StoreError> {
        let row = sqlx::query_as::<_, HighlightMediaRow>(&format!(
            "INSERT INTO highlight_media (highlight_id, media_type, media_file) \
             VALUES ($1, $2, $3) \
             RETURNING {MEDIA_COLUMNS}"
        ))
        .bind(highlight_id)
        .bind(input.media_type.map(MediaType::as_str))
        .bind(&input.media_file)
        .fetch_one(&self.pool)
        .await
        .map_err(store_err)?;
        HighlightMedia::try_from(row)
    }

    async fn list_highlight_media(
        &self,
        highlight_ids: &[i64],
    ) -> Result<Vec<HighlightMedia>, StoreError> {
        let rows = sqlx::query_as::<_, HighlightMediaRow>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM highlight_media \
             WHERE highlight_id = ANY($1) ORDER BY id"
        ))
        .bind(highlight_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;
        rows.into_iter().map(HighlightMedia::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media_row(media_type: Option<&str>) -> HighlightMediaRow {
        HighlightMediaRow {
            id: 2,
            highlight_id: 1,
            media_type: media_type.map(str::to_string),
            media_file: "stories/a.mp4".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn media_row_maps_known_types_and_null() {
        let video = HighlightMedia::try_from(media_row(Some("video"))).expect("video");
        assert_eq!(video.media_type, Some(MediaType::Video));

        let untyped = HighlightMedia::try_from(media_row(None)).expect("null type");
        assert_eq!(untyped.media_type, None);
    }

    #[test]
    fn media_row_rejects_unknown_type() {
        let err = HighlightMedia::try_from(media_row(Some("audio"))).expect_err("unknown");
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
