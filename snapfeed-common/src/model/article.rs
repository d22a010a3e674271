use crate::model::{Id, text::validated_text};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct ArticleMarker;

validated_text!(ArticleTitle, field = "title", max_len = 200);
validated_text!(ArticleText, field = "content", max_len = 100_000);

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: Id<ArticleMarker>,
    pub title: ArticleTitle,
    pub content: ArticleText,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Body of both article creation and replacement.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct ArticleContent {
    pub title: ArticleTitle,
    pub content: ArticleText,
}
