use crate::model::{Id, post::PostMarker, text::validated_text, user::UserMarker};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct CommentMarker;

validated_text!(CommentText, field = "comment", max_len = 10_000);

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub post: Id<PostMarker>,
    pub user: Id<UserMarker>,
    pub content: CommentText,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Comment creation request body.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub post_id: Id<PostMarker>,
    pub content: CommentText,
}
