//! Blog posts and story highlights.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ValidationError;

pub const MAX_POST_TITLE_LEN: usize = 200;
pub const MAX_TITLE_LEN: usize = 255;
/// Upper bound for stored image/media references.
pub const MAX_FILE_REF_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PostInput {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostImage {
    pub id: i64,
    /// `None` for editor uploads not yet attached to a post.
    pub post_id: Option<i64>,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostAuthor {
    pub id: i64,
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub author: Option<PostAuthor>,
    pub images: Vec<PostImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(MediaType::Image),
            "video" => Some(MediaType::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub id: i64,
    pub title: String,
    pub cover_image: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HighlightInput {
    pub title: String,
    pub cover_image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightMedia {
    pub id: i64,
    pub highlight_id: i64,
    pub media_type: Option<MediaType>,
    pub media_file: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HighlightMediaInput {
    pub media_type: Option<MediaType>,
    pub media_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightDetail {
    #[serde(flatten)]
    pub highlight: Highlight,
    pub media: Vec<HighlightMedia>,
}

/// Trim `value` and require it to be 1..=`max` characters.
///
/// # Errors
///
/// Returns a field validation error naming `field`.
pub fn require_text(field: &'static str, value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::field(field, "this field may not be blank"));
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::field(
            field,
            format!("ensure this field has no more than {max} characters"),
        ));
    }
    Ok(trimmed.to_string())
}
