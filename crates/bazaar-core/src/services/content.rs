//! Blog posts, editor image uploads, and highlights.

use std::sync::Arc;

use crate::accounts::User;
use crate::content::{
    require_text, Highlight, HighlightDetail, HighlightInput, HighlightMedia, HighlightMediaInput,
    Post, PostAuthor, PostDetail, PostImage, PostInput, MAX_FILE_REF_LEN, MAX_POST_TITLE_LEN,
    MAX_TITLE_LEN,
};
use crate::services::found;
use crate::store::{HighlightRepo, PostRepo, UserRepo};
use crate::{AuthError, ServiceError, ValidationError};

#[derive(Clone)]
pub struct ContentService {
    posts: Arc<dyn PostRepo>,
    highlights: Arc<dyn HighlightRepo>,
    users: Arc<dyn UserRepo>,
}

impl ContentService {
    pub fn new(
        posts: Arc<dyn PostRepo>,
        highlights: Arc<dyn HighlightRepo>,
        users: Arc<dyn UserRepo>,
    ) -> Self {
        Self {
            posts,
            highlights,
            users,
        }
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns a store error on backend failure.
    pub async fn list_posts(&self) -> Result<Vec<PostDetail>, ServiceError> {
        let posts = self.posts.list_posts().await?;
        let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
        let mut images = if ids.is_empty() {
            Vec::new()
        } else {
            self.posts.list_post_images(&ids).await?
        };

        let mut details = Vec::with_capacity(posts.len());
        for post in posts {
            let (own, rest): (Vec<_>, Vec<_>) =
                images.drain(..).partition(|i| i.post_id == Some(post.id));
            images = rest;
            let author = self.author(post.author_id).await?;
            details.push(PostDetail {
                post,
                author,
                images: own,
            });
        }
        Ok(details)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn get_post(&self, id: i64) -> Result<PostDetail, ServiceError> {
        let post = found(self.posts.get_post(id).await?, "post", id)?;
        self.post_detail(post).await
    }

    /// # Errors
    ///
    /// Returns a validation error for a blank or overlong title.
    pub async fn create_post(&self, author: &User, input: PostInput) -> Result<PostDetail, ServiceError> {
        let input = clean_post(input)?;
        let post = self.posts.create_post(Some(author.id), &input).await?;
        tracing::info!(post_id = post.id, author_id = author.id, "post created");
        self.post_detail(post).await
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and [`AuthError::Forbidden`]
    /// unless `actor` wrote the post or is staff.
    pub async fn update_post(
        &self,
        actor: &User,
        id: i64,
        input: PostInput,
    ) -> Result<PostDetail, ServiceError> {
        let post = found(self.posts.get_post(id).await?, "post", id)?;
        ensure_can_edit(actor, &post)?;
        let input = clean_post(input)?;
        let post = self.posts.update_post(id, &input).await?;
        self.post_detail(post).await
    }

    /// # Errors
    ///
    /// Same rules as [`Self::update_post`].
    pub async fn delete_post(&self, actor: &User, id: i64) -> Result<(), ServiceError> {
        let post = found(self.posts.get_post(id).await?, "post", id)?;
        ensure_can_edit(actor, &post)?;
        self.posts.delete_post(id).await?;
        tracing::info!(post_id = id, "post deleted");
        Ok(())
    }

    /// Store an image reference, attached to a post or detached when
    /// `post_id` is `None` (editor uploads).
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank image or unknown post, and
    /// [`AuthError::Forbidden`] when attaching to someone else's post.
    pub async fn add_post_image(
        &self,
        actor: &User,
        post_id: Option<i64>,
        image: &str,
    ) -> Result<PostImage, ServiceError> {
        let image = require_text("image", image, MAX_FILE_REF_LEN)?;
        if let Some(post_id) = post_id {
            let post = self.posts.get_post(post_id).await?.ok_or_else(|| {
                ValidationError::field(
                    "post_id",
                    format!("invalid pk \"{post_id}\" - object does not exist"),
                )
            })?;
            ensure_can_edit(actor, &post)?;
        }
        Ok(self.posts.add_post_image(post_id, &image).await?)
    }

    async fn post_detail(&self, post: Post) -> Result<PostDetail, ServiceError> {
        let images = self.posts.list_post_images(&[post.id]).await?;
        let author = self.author(post.author_id).await?;
        Ok(PostDetail {
            post,
            author,
            images,
        })
    }

    async fn author(&self, author_id: Option<i64>) -> Result<Option<PostAuthor>, ServiceError> {
        let Some(id) = author_id else {
            return Ok(None);
        };
        Ok(self.users.get_user(id).await?.map(|u| PostAuthor {
            id: u.id,
            phone_number: u.phone_number,
        }))
    }

    // ------------------------------------------------------------------
    // Highlights
    // ------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns a store error on backend failure.
    pub async fn list_highlights(&self) -> Result<Vec<HighlightDetail>, ServiceError> {
        let highlights = self.highlights.list_highlights().await?;
        let ids: Vec<i64> = highlights.iter().map(|h| h.id).collect();
        let mut media = if ids.is_empty() {
            Vec::new()
        } else {
            self.highlights.list_highlight_media(&ids).await?
        };
        Ok(highlights
            .into_iter()
            .map(|highlight| {
                let (own, rest): (Vec<_>, Vec<_>) =
                    media.drain(..).partition(|m| m.highlight_id == highlight.id);
                media = rest;
                HighlightDetail {
                    highlight,
                    media: own,
                }
            })
            .collect())
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn get_highlight(&self, id: i64) -> Result<HighlightDetail, ServiceError> {
        let highlight = found(self.highlights.get_highlight(id).await?, "highlight", id)?;
        let media = self.highlights.list_highlight_media(&[id]).await?;
        Ok(HighlightDetail { highlight, media })
    }

    /// # Errors
    ///
    /// Returns a validation error for a blank title or cover image.
    pub async fn create_highlight(&self, input: HighlightInput) -> Result<Highlight, ServiceError> {
        let input = clean_highlight(input)?;
        let highlight = self.highlights.create_highlight(&input).await?;
        tracing::info!(highlight_id = highlight.id, "highlight created");
        Ok(highlight)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id, or a validation error.
    pub async fn update_highlight(
        &self,
        id: i64,
        input: HighlightInput,
    ) -> Result<Highlight, ServiceError> {
        found(self.highlights.get_highlight(id).await?, "highlight", id)?;
        let input = clean_highlight(input)?;
        Ok(self.highlights.update_highlight(id, &input).await?)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id.
    pub async fn delete_highlight(&self, id: i64) -> Result<(), ServiceError> {
        Ok(self.highlights.delete_highlight(id).await?)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown highlight and a validation error for
    /// a blank media reference.
    pub async fn add_highlight_media(
        &self,
        highlight_id: i64,
        input: HighlightMediaInput,
    ) -> Result<HighlightMedia, ServiceError> {
        found(
            self.highlights.get_highlight(highlight_id).await?,
            "highlight",
            highlight_id,
        )?;
        let input = HighlightMediaInput {
            media_type: input.media_type,
            media_file: require_text("media_file", &input.media_file, MAX_FILE_REF_LEN)?,
        };
        Ok(self
            .highlights
            .add_highlight_media(highlight_id, &input)
            .await?)
    }
}

fn ensure_can_edit(actor: &User, post: &Post) -> Result<(), AuthError> {
    if actor.is_staff || post.author_id == Some(actor.id) {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

fn clean_post(input: PostInput) -> Result<PostInput, ValidationError> {
    Ok(PostInput {
        title: require_text("title", &input.title, MAX_POST_TITLE_LEN)?,
        content: input.content,
    })
}

fn clean_highlight(input: HighlightInput) -> Result<HighlightInput, ValidationError> {
    Ok(HighlightInput {
        title: require_text("title", &input.title, MAX_TITLE_LEN)?,
        cover_image: require_text("cover_image", &input.cover_image, MAX_FILE_REF_LEN)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MediaType;
    use crate::memory::MemoryStore;

    async fn setup() -> (ContentService, User, User, User) {
        let store = Arc::new(MemoryStore::new());
        let (author, _) = store.get_or_create_user("0911").await.expect("author");
        let (other, _) = store.get_or_create_user("0912").await.expect("other");
        let staff = store.upsert_staff_user("0913").await.expect("staff");
        let svc = ContentService::new(store.clone(), store.clone(), store);
        (svc, author, other, staff)
    }

    fn post(title: &str) -> PostInput {
        PostInput {
            title: title.into(),
            content: "<p>hello</p>".into(),
        }
    }

    #[tokio::test]
    async fn author_is_recorded_and_shown() {
        let (svc, author, _, _) = setup().await;
        let created = svc.create_post(&author, post("First")).await.expect("post");
        assert_eq!(created.post.author_id, Some(author.id));
        assert_eq!(
            created.author.map(|a| a.phone_number),
            Some(author.phone_number)
        );
    }

    #[tokio::test]
    async fn only_author_or_staff_may_edit() {
        let (svc, author, other, staff) = setup().await;
        let created = svc.create_post(&author, post("First")).await.expect("post");
        let id = created.post.id;

        let err = svc
            .update_post(&other, id, post("Hijack"))
            .await
            .expect_err("forbidden");
        assert!(matches!(err, ServiceError::Auth(AuthError::Forbidden)));

        svc.update_post(&author, id, post("Edited"))
            .await
            .expect("author edit");
        svc.delete_post(&staff, id).await.expect("staff delete");
        assert!(svc.get_post(id).await.is_err());
    }

    #[tokio::test]
    async fn overlong_title_is_rejected() {
        let (svc, author, _, _) = setup().await;
        let title = "x".repeat(MAX_POST_TITLE_LEN + 1);
        assert!(svc.create_post(&author, post(&title)).await.is_err());
    }

    #[tokio::test]
    async fn detached_editor_upload_is_allowed() {
        let (svc, author, _, _) = setup().await;
        let image = svc
            .add_post_image(&author, None, "uploads/a.png")
            .await
            .expect("upload");
        assert_eq!(image.post_id, None);

        let err = svc
            .add_post_image(&author, None, " ")
            .await
            .expect_err("blank image");
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn post_detail_nests_images() {
        let (svc, author, _, _) = setup().await;
        let created = svc.create_post(&author, post("Pics")).await.expect("post");
        svc.add_post_image(&author, Some(created.post.id), "p/1.jpg")
            .await
            .expect("image");
        let listed = svc.list_posts().await.expect("list");
        assert_eq!(listed[0].images.len(), 1);
    }

    #[tokio::test]
    async fn highlight_media_is_nested() {
        let (svc, _, _, _) = setup().await;
        let highlight = svc
            .create_highlight(HighlightInput {
                title: "Summer".into(),
                cover_image: "h/cover.jpg".into(),
            })
            .await
            .expect("highlight");
        svc.add_highlight_media(
            highlight.id,
            HighlightMediaInput {
                media_type: Some(MediaType::Video),
                media_file: "h/clip.mp4".into(),
            },
        )
        .await
        .expect("media");

        let detail = svc.get_highlight(highlight.id).await.expect("detail");
        assert_eq!(detail.media.len(), 1);
        assert_eq!(detail.media[0].media_type, Some(MediaType::Video));

        assert!(svc
            .add_highlight_media(
                highlight.id + 1,
                HighlightMediaInput {
                    media_type: None,
                    media_file: "x".into(),
                },
            )
            .await
            .is_err());
    }
}
