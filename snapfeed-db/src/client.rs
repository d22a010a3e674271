use crate::{
    record::{
        ArticleRecord, CommentRecord, FullPostRecord, PartialPostRecord, UserCredentialsRecord,
        UserRecord,
    },
    repository::{DbError, Repository, Result},
};
use async_trait::async_trait;
use snapfeed_common::{
    model::{
        Id, SnapfeedSnowflakeGenerator,
        article::{Article, ArticleContent, ArticleMarker},
        comment::{Comment, CommentMarker, NewComment},
        post::{PartialPost, Post, PostContent, PostMarker},
        user::{CreateUser, Email, User, UserCredentials, UserMarker},
    },
    snowflake::{ProcessId, WorkerId},
};
use sqlx::{PgPool, postgres::PgPoolOptions, query, query_as, query_scalar};
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};
use tracing::{debug, info};

fn duplicate_user(err: sqlx::Error) -> DbError {
    let field = match err.as_database_error().and_then(|db_err| db_err.constraint()) {
        Some("users_email_key") => Some("email"),
        Some("users_username_key") => Some("username"),
        _ => None,
    };

    field.map_or_else(|| err.into(), DbError::Duplicate)
}

/// PostgreSQL-backed [`Repository`].
#[derive(Debug)]
pub struct DbClient {
    pool: PgPool,
    snowflake_generator: Mutex<SnapfeedSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator =
            Mutex::new(SnapfeedSnowflakeGenerator::new(worker_id, process_id));

        Self {
            pool,
            snowflake_generator,
        }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool, worker_id, process_id))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    fn next_id<Marker>(&self) -> Result<Id<Marker>> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate()?;

        Ok(snowflake.into())
    }

    async fn fetch_comments(&self, post_id: Option<Id<PostMarker>>) -> Result<Vec<Comment>> {
        let records = query_as::<_, CommentRecord>(
            "
            SELECT
                comment_snowflake,
                post_snowflake,
                user_snowflake,
                content,
                created_at
            FROM
                posts.comments
            WHERE
                $1::BIGINT IS NULL OR post_snowflake = $1
            ORDER BY
                comment_snowflake
            ",
        )
        .bind(post_id.map(Id::to_db))
        .fetch_all(&self.pool)
        .await?;

        let comments = records
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<_, _>>()?;
        Ok(comments)
    }
}

#[async_trait]
impl Repository for DbClient {
    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let user_id = self.next_id::<UserMarker>()?;

        let record = query_as::<_, UserRecord>(
            "
            INSERT INTO users.users (user_snowflake, username, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING user_snowflake, username, email, created_at
            ",
        )
        .bind(user_id.to_db())
        .bind(user.username.get())
        .bind(user.email.get())
        .bind(user.password_hash.as_phc())
        .fetch_one(&self.pool)
        .await
        .map_err(duplicate_user)?;

        Ok(record.try_into()?)
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT
                user_snowflake,
                username,
                email,
                created_at
            FROM
                users.users
            WHERE
                user_snowflake = $1
            ",
        )
        .bind(user_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_user_credentials(&self, email: &Email) -> Result<Option<UserCredentials>> {
        let record = query_as::<_, UserCredentialsRecord>(
            "
            SELECT
                user_snowflake,
                username,
                email,
                created_at,
                password_hash
            FROM
                users.users
            WHERE
                email = $1
            ",
        )
        .bind(email.get())
        .fetch_optional(&self.pool)
        .await?;

        let credentials = record.map(UserCredentials::try_from).transpose()?;
        Ok(credentials)
    }

    async fn create_post(
        &self,
        author: Id<UserMarker>,
        content: &PostContent,
    ) -> Result<PartialPost> {
        let post_id = self.next_id::<PostMarker>()?;

        let record = query_as::<_, PartialPostRecord>(
            "
            INSERT INTO posts.posts (post_snowflake, user_snowflake, image_url, caption)
            VALUES ($1, $2, $3, $4)
            RETURNING
                post_snowflake,
                user_snowflake,
                image_url,
                caption,
                created_at,
                ARRAY[]::BIGINT[] AS comment_snowflakes
            ",
        )
        .bind(post_id.to_db())
        .bind(author.to_db())
        .bind(content.image_url.get())
        .bind(content.caption.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(record.try_into()?)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let Some(record) = query_as::<_, FullPostRecord>(
            "
            SELECT
                p.post_snowflake,
                p.image_url,
                p.caption,
                p.created_at,
                u.user_snowflake,
                u.username
            FROM
                posts.posts AS p
                JOIN users.users AS u ON u.user_snowflake = p.user_snowflake
            WHERE
                p.post_snowflake = $1
            ",
        )
        .bind(post_id.to_db())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let comments = self.fetch_comments(Some(post_id)).await?;
        Ok(Some(record.into_post(comments)?))
    }

    async fn fetch_posts(&self) -> Result<Vec<Post>> {
        let records = query_as::<_, FullPostRecord>(
            "
            SELECT
                p.post_snowflake,
                p.image_url,
                p.caption,
                p.created_at,
                u.user_snowflake,
                u.username
            FROM
                posts.posts AS p
                JOIN users.users AS u ON u.user_snowflake = p.user_snowflake
            ORDER BY
                p.post_snowflake DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut comments_by_post: HashMap<Id<PostMarker>, Vec<Comment>> = HashMap::new();
        for comment in self.fetch_comments(None).await? {
            comments_by_post.entry(comment.post).or_default().push(comment);
        }

        let posts = records
            .into_iter()
            .map(|record| {
                let comments = comments_by_post
                    .remove(&Id::from_db(record.post_snowflake))
                    .unwrap_or_default();
                record.into_post(comments)
            })
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    async fn fetch_user_posts(&self, user_id: Id<UserMarker>) -> Result<Option<Vec<PartialPost>>> {
        if self.fetch_user(user_id).await?.is_none() {
            return Ok(None);
        }

        let records = query_as::<_, PartialPostRecord>(
            "
            SELECT
                p.post_snowflake,
                p.user_snowflake,
                p.image_url,
                p.caption,
                p.created_at,
                COALESCE(
                    array_agg(c.comment_snowflake ORDER BY c.comment_snowflake)
                        FILTER (WHERE c.comment_snowflake IS NOT NULL),
                    '{}'
                ) AS comment_snowflakes
            FROM
                posts.posts AS p
                LEFT JOIN posts.comments AS c ON c.post_snowflake = p.post_snowflake
            WHERE
                p.user_snowflake = $1
            GROUP BY
                p.post_snowflake
            ORDER BY
                p.post_snowflake DESC
            ",
        )
        .bind(user_id.to_db())
        .fetch_all(&self.pool)
        .await?;

        let posts = records
            .into_iter()
            .map(PartialPost::try_from)
            .collect::<Result<_, _>>()?;
        Ok(Some(posts))
    }

    async fn create_comment(
        &self,
        author: Id<UserMarker>,
        comment: &NewComment,
    ) -> Result<Option<Comment>> {
        let comment_id = self.next_id::<CommentMarker>()?;
        let mut transaction = self.pool.begin().await?;

        // Lock the post so it cannot vanish before the comment references it.
        let post = query_scalar::<_, i64>(
            "
            SELECT post_snowflake
            FROM posts.posts
            WHERE post_snowflake = $1
            FOR UPDATE
            ",
        )
        .bind(comment.post_id.to_db())
        .fetch_optional(&mut *transaction)
        .await?;

        if post.is_none() {
            debug!(post_id = %comment.post_id, "Comment target does not exist");
            return Ok(None);
        }

        let record = query_as::<_, CommentRecord>(
            "
            INSERT INTO posts.comments (comment_snowflake, post_snowflake, user_snowflake, content)
            VALUES ($1, $2, $3, $4)
            RETURNING comment_snowflake, post_snowflake, user_snowflake, content, created_at
            ",
        )
        .bind(comment_id.to_db())
        .bind(comment.post_id.to_db())
        .bind(author.to_db())
        .bind(comment.content.get())
        .fetch_one(&mut *transaction)
        .await?;

        transaction.commit().await?;

        Ok(Some(record.try_into()?))
    }

    async fn create_article(&self, content: &ArticleContent) -> Result<Article> {
        let article_id = self.next_id::<ArticleMarker>()?;

        let record = query_as::<_, ArticleRecord>(
            "
            INSERT INTO blog.articles (article_snowflake, title, content)
            VALUES ($1, $2, $3)
            RETURNING article_snowflake, title, content, created_at
            ",
        )
        .bind(article_id.to_db())
        .bind(content.title.get())
        .bind(content.content.get())
        .fetch_one(&self.pool)
        .await?;

        Ok(record.try_into()?)
    }

    async fn fetch_article(&self, article_id: Id<ArticleMarker>) -> Result<Option<Article>> {
        let record = query_as::<_, ArticleRecord>(
            "
            SELECT article_snowflake, title, content, created_at
            FROM blog.articles
            WHERE article_snowflake = $1
            ",
        )
        .bind(article_id.to_db())
        .fetch_optional(&self.pool)
        .await?;

        let article = record.map(Article::try_from).transpose()?;
        Ok(article)
    }

    async fn fetch_articles(&self) -> Result<Vec<Article>> {
        let records = query_as::<_, ArticleRecord>(
            "
            SELECT article_snowflake, title, content, created_at
            FROM blog.articles
            ORDER BY article_snowflake DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let articles = records
            .into_iter()
            .map(Article::try_from)
            .collect::<Result<_, _>>()?;
        Ok(articles)
    }

    async fn update_article(
        &self,
        article_id: Id<ArticleMarker>,
        content: &ArticleContent,
    ) -> Result<Option<Article>> {
        let record = query_as::<_, ArticleRecord>(
            "
            UPDATE blog.articles
            SET title = $2, content = $3
            WHERE article_snowflake = $1
            RETURNING article_snowflake, title, content, created_at
            ",
        )
        .bind(article_id.to_db())
        .bind(content.title.get())
        .bind(content.content.get())
        .fetch_optional(&self.pool)
        .await?;

        let article = record.map(Article::try_from).transpose()?;
        Ok(article)
    }

    async fn delete_article(&self, article_id: Id<ArticleMarker>) -> Result<bool> {
        let result = query("DELETE FROM blog.articles WHERE article_snowflake = $1")
            .bind(article_id.to_db())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        client::DbClient,
        repository::{DbError, Repository},
    };
    use snapfeed_common::{
        model::{
            Id,
            auth::PasswordHash,
            comment::{CommentText, NewComment},
            post::{ImageUrl, PostContent, PostMarker},
            user::{CreateUser, Email, Password, User, Username},
        },
        snowflake::{ProcessId, WorkerId},
    };
    use time::OffsetDateTime;

    /// Connects to `DATABASE_URL` and applies migrations, or returns `None`
    /// when no database is configured.
    ///
    /// Each test passes its own process id so concurrently generated ids
    /// cannot collide.
    async fn connect(process_id: u8) -> Option<DbClient> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL is not set, skipping");
            return None;
        };

        let client = DbClient::connect(
            &url,
            2,
            WorkerId::MAX,
            ProcessId::new(process_id).unwrap(),
        )
        .await
        .unwrap();
        client.migrate().await.unwrap();

        Some(client)
    }

    /// A name no earlier run can have registered.
    fn unique(prefix: &str) -> String {
        format!("{prefix}{}", OffsetDateTime::now_utc().unix_timestamp_nanos())
    }

    fn create_user(username: &str, email: &str) -> CreateUser {
        CreateUser {
            username: Username::new(username).unwrap(),
            email: Email::new(email).unwrap(),
            password_hash: PasswordHash::hash(&Password::new("pw").unwrap()).unwrap(),
        }
    }

    async fn new_user(client: &DbClient, prefix: &str) -> User {
        let name = unique(prefix);
        client
            .create_user(&create_user(&name, &format!("{name}@x.com")))
            .await
            .unwrap()
    }

    fn comment_on(post_id: Id<PostMarker>, text: &str) -> NewComment {
        NewComment {
            post_id,
            content: CommentText::new(text).unwrap(),
        }
    }

    #[tokio::test]
    async fn unique_violations_name_their_field() {
        let Some(client) = connect(1).await else {
            return;
        };
        let user = new_user(&client, "dup").await;

        let other_name = unique("other");
        let same_email = create_user(&other_name, user.email.get());
        assert!(matches!(
            client.create_user(&same_email).await,
            Err(DbError::Duplicate("email"))
        ));

        let same_username = create_user(user.username.get(), &format!("{other_name}@x.com"));
        assert!(matches!(
            client.create_user(&same_username).await,
            Err(DbError::Duplicate("username"))
        ));

        let credentials = client
            .fetch_user_credentials(&user.email)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(credentials.user, user);
    }

    #[tokio::test]
    async fn user_posts_aggregate_comment_ids() {
        let Some(client) = connect(2).await else {
            return;
        };
        let user = new_user(&client, "poster").await;

        let posts = client.fetch_user_posts(user.id).await.unwrap().unwrap();
        assert!(posts.is_empty());

        let post = client
            .create_post(
                user.id,
                &PostContent {
                    image_url: ImageUrl::new("http://i/1.png").unwrap(),
                    caption: Some("first".to_owned()),
                },
            )
            .await
            .unwrap();
        assert!(post.comments.is_empty());

        let first = client
            .create_comment(user.id, &comment_on(post.id, "one"))
            .await
            .unwrap()
            .unwrap();
        let second = client
            .create_comment(user.id, &comment_on(post.id, "two"))
            .await
            .unwrap()
            .unwrap();

        let posts = client.fetch_user_posts(user.id).await.unwrap().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].comments, [first.id, second.id]);

        let resolved = client.fetch_post(post.id).await.unwrap().unwrap();
        assert_eq!(resolved.user.username, user.username);
        assert_eq!(resolved.comments, [first, second]);

        assert!(client.fetch_user_posts(Id::from(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn comment_on_missing_post_writes_nothing() {
        let Some(client) = connect(3).await else {
            return;
        };
        let user = new_user(&client, "commenter").await;

        let comment = client
            .create_comment(user.id, &comment_on(Id::from(1), "hello?"))
            .await
            .unwrap();
        assert!(comment.is_none());
    }
}
