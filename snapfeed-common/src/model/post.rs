use crate::model::{
    Id,
    comment::{Comment, CommentMarker},
    text::validated_text,
    user::{PartialUser, UserMarker},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

validated_text!(ImageUrl, field = "image URL", max_len = 2048);

/// A post with its owner and comments resolved.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Id<PostMarker>,
    pub user: PartialUser,
    pub image_url: ImageUrl,
    pub caption: Option<String>,
    pub comments: Vec<Comment>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A post referring to its owner and comments by id only.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialPost {
    pub id: Id<PostMarker>,
    pub user: Id<UserMarker>,
    pub image_url: ImageUrl,
    pub caption: Option<String>,
    pub comments: Vec<Id<CommentMarker>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Post creation request body.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostContent {
    pub image_url: ImageUrl,
    #[serde(default)]
    pub caption: Option<String>,
}

impl From<Post> for PartialPost {
    fn from(value: Post) -> Self {
        Self {
            id: value.id,
            user: value.user.id,
            image_url: value.image_url,
            caption: value.caption,
            comments: value.comments.into_iter().map(|comment| comment.id).collect(),
            created_at: value.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::post::PostContent;

    #[test]
    fn caption_is_optional() {
        let content: PostContent =
            serde_json::from_str(r#"{"imageUrl":"http://i/1.png"}"#).unwrap();
        assert_eq!(content.image_url.get(), "http://i/1.png");
        assert_eq!(content.caption, None);

        assert!(serde_json::from_str::<PostContent>(r#"{"caption":"hi"}"#).is_err());
    }
}
