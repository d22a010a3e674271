use snapfeed_common::model::{
    Id, ModelValidationError,
    article::{Article, ArticleText, ArticleTitle},
    auth::PasswordHash,
    comment::{Comment, CommentText},
    post::{ImageUrl, PartialPost, Post},
    user::{Email, PartialUser, User, UserCredentials, Username},
};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_snowflake: i64,
    pub username: String,
    pub email: String,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct UserCredentialsRecord {
    #[sqlx(flatten)]
    pub user: UserRecord,
    pub password_hash: String,
}

/// A post joined with its owner, without comments.
#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct FullPostRecord {
    pub post_snowflake: i64,
    pub image_url: String,
    pub caption: Option<String>,
    pub created_at: OffsetDateTime,
    pub user_snowflake: i64,
    pub username: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PartialPostRecord {
    pub post_snowflake: i64,
    pub user_snowflake: i64,
    pub image_url: String,
    pub caption: Option<String>,
    pub created_at: OffsetDateTime,
    pub comment_snowflakes: Vec<i64>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CommentRecord {
    pub comment_snowflake: i64,
    pub post_snowflake: i64,
    pub user_snowflake: i64,
    pub content: String,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct ArticleRecord {
    pub article_snowflake: i64,
    pub title: String,
    pub content: String,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.user_snowflake),
            username: Username::new(value.username)?,
            email: Email::new(value.email)?,
            created_at: value.created_at,
        })
    }
}

impl TryFrom<UserCredentialsRecord> for UserCredentials {
    type Error = ModelValidationError;

    fn try_from(value: UserCredentialsRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: value.user.try_into()?,
            password_hash: PasswordHash::from_phc(value.password_hash)?,
        })
    }
}

impl FullPostRecord {
    pub fn into_post(self, comments: Vec<Comment>) -> Result<Post, ModelValidationError> {
        Ok(Post {
            id: Id::from_db(self.post_snowflake),
            user: PartialUser {
                id: Id::from_db(self.user_snowflake),
                username: Username::new(self.username)?,
            },
            image_url: ImageUrl::new(self.image_url)?,
            caption: self.caption,
            comments,
            created_at: self.created_at,
        })
    }
}

impl TryFrom<PartialPostRecord> for PartialPost {
    type Error = ModelValidationError;

    fn try_from(value: PartialPostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.post_snowflake),
            user: Id::from_db(value.user_snowflake),
            image_url: ImageUrl::new(value.image_url)?,
            caption: value.caption,
            comments: value
                .comment_snowflakes
                .into_iter()
                .map(Id::from_db)
                .collect(),
            created_at: value.created_at,
        })
    }
}

impl TryFrom<CommentRecord> for Comment {
    type Error = ModelValidationError;

    fn try_from(value: CommentRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.comment_snowflake),
            post: Id::from_db(value.post_snowflake),
            user: Id::from_db(value.user_snowflake),
            content: CommentText::new(value.content)?,
            created_at: value.created_at,
        })
    }
}

impl TryFrom<ArticleRecord> for Article {
    type Error = ModelValidationError;

    fn try_from(value: ArticleRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.article_snowflake),
            title: ArticleTitle::new(value.title)?,
            content: ArticleText::new(value.content)?,
            created_at: value.created_at,
        })
    }
}
