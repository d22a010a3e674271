use async_trait::async_trait;
use snapfeed_common::{
    model::{
        Id, ModelValidationError,
        article::{Article, ArticleContent, ArticleMarker},
        comment::{Comment, NewComment},
        post::{PartialPost, Post, PostContent, PostMarker},
        user::{CreateUser, Email, User, UserCredentials, UserMarker},
    },
    snowflake::SnowflakeTimestampError,
};
use std::fmt::Debug;
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Generating an id failed: {0}")]
    IdGeneration(#[from] SnowflakeTimestampError),
    #[error("A user with this {0} already exists")]
    Duplicate(&'static str),
    #[error("The referenced {0} does not exist")]
    MissingReference(&'static str),
    #[error("Running database migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Create/find access to all stored entities.
///
/// Lookups of a single entity return `Ok(None)` when it does not exist.
/// Operations that need a parent entity (a user's posts, a post's comments)
/// return `Ok(None)` when the parent does not exist and write nothing.
#[async_trait]
pub trait Repository: Debug + Send + Sync {
    async fn create_user(&self, user: &CreateUser) -> Result<User>;

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>>;

    async fn fetch_user_credentials(&self, email: &Email) -> Result<Option<UserCredentials>>;

    async fn create_post(
        &self,
        author: Id<UserMarker>,
        content: &PostContent,
    ) -> Result<PartialPost>;

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    /// All posts, newest first, comments oldest first.
    async fn fetch_posts(&self) -> Result<Vec<Post>>;

    async fn fetch_user_posts(&self, user_id: Id<UserMarker>) -> Result<Option<Vec<PartialPost>>>;

    /// Stores the comment and appends it to its post atomically.
    async fn create_comment(
        &self,
        author: Id<UserMarker>,
        comment: &NewComment,
    ) -> Result<Option<Comment>>;

    async fn create_article(&self, content: &ArticleContent) -> Result<Article>;

    async fn fetch_article(&self, article_id: Id<ArticleMarker>) -> Result<Option<Article>>;

    async fn fetch_articles(&self) -> Result<Vec<Article>>;

    async fn update_article(
        &self,
        article_id: Id<ArticleMarker>,
        content: &ArticleContent,
    ) -> Result<Option<Article>>;

    /// Returns whether an article was deleted.
    async fn delete_article(&self, article_id: Id<ArticleMarker>) -> Result<bool>;
}
