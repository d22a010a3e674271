use crate::repository::{DbError, Repository, Result};
use async_trait::async_trait;
use snapfeed_common::{
    model::{
        Id, SnapfeedSnowflakeGenerator,
        article::{Article, ArticleContent, ArticleMarker},
        auth::PasswordHash,
        comment::{Comment, CommentMarker, NewComment},
        post::{PartialPost, Post, PostContent, PostMarker},
        user::{CreateUser, Email, PartialUser, User, UserCredentials, UserMarker},
    },
    snowflake::{ProcessId, WorkerId},
};
use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};
use time::OffsetDateTime;

/// In-process [`Repository`] for development and tests. Nothing is persisted.
///
/// All state sits behind a single lock, so every operation is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    snowflake_generator: SnapfeedSnowflakeGenerator,
    users: BTreeMap<Id<UserMarker>, (User, PasswordHash)>,
    posts: BTreeMap<Id<PostMarker>, PartialPost>,
    comments: BTreeMap<Id<CommentMarker>, Comment>,
    articles: BTreeMap<Id<ArticleMarker>, Article>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                snowflake_generator: SnapfeedSnowflakeGenerator::new(worker_id, process_id),
                ..MemoryState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    fn next_id<Marker>(&mut self) -> Result<Id<Marker>> {
        Ok(self.snowflake_generator.generate()?.into())
    }

    fn resolve_post(&self, post: &PartialPost) -> Result<Post> {
        let (user, _) = self
            .users
            .get(&post.user)
            .ok_or(DbError::MissingReference("user"))?;

        let comments = post
            .comments
            .iter()
            .map(|comment_id| {
                self.comments
                    .get(comment_id)
                    .cloned()
                    .ok_or(DbError::MissingReference("comment"))
            })
            .collect::<Result<_>>()?;

        Ok(Post {
            id: post.id,
            user: PartialUser::from(user.clone()),
            image_url: post.image_url.clone(),
            caption: post.caption.clone(),
            comments,
            created_at: post.created_at,
        })
    }
}

#[async_trait]
impl Repository for MemoryStore {
    async fn create_user(&self, user: &CreateUser) -> Result<User> {
        let mut state = self.lock();

        for (existing, _) in state.users.values() {
            if existing.email == user.email {
                return Err(DbError::Duplicate("email"));
            }
            if existing.username == user.username {
                return Err(DbError::Duplicate("username"));
            }
        }

        let created = User {
            id: state.next_id()?,
            username: user.username.clone(),
            email: user.email.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        state
            .users
            .insert(created.id, (created.clone(), user.password_hash.clone()));

        Ok(created)
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        Ok(self.lock().users.get(&user_id).map(|(user, _)| user.clone()))
    }

    async fn fetch_user_credentials(&self, email: &Email) -> Result<Option<UserCredentials>> {
        let credentials = self
            .lock()
            .users
            .values()
            .find(|(user, _)| &user.email == email)
            .map(|(user, password_hash)| UserCredentials {
                user: user.clone(),
                password_hash: password_hash.clone(),
            });

        Ok(credentials)
    }

    async fn create_post(
        &self,
        author: Id<UserMarker>,
        content: &PostContent,
    ) -> Result<PartialPost> {
        let mut state = self.lock();

        if !state.users.contains_key(&author) {
            return Err(DbError::MissingReference("user"));
        }

        let post = PartialPost {
            id: state.next_id()?,
            user: author,
            image_url: content.image_url.clone(),
            caption: content.caption.clone(),
            comments: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        };
        state.posts.insert(post.id, post.clone());

        Ok(post)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let state = self.lock();

        state
            .posts
            .get(&post_id)
            .map(|post| state.resolve_post(post))
            .transpose()
    }

    async fn fetch_posts(&self) -> Result<Vec<Post>> {
        let state = self.lock();

        state
            .posts
            .values()
            .rev()
            .map(|post| state.resolve_post(post))
            .collect()
    }

    async fn fetch_user_posts(&self, user_id: Id<UserMarker>) -> Result<Option<Vec<PartialPost>>> {
        let state = self.lock();

        if !state.users.contains_key(&user_id) {
            return Ok(None);
        }

        let posts = state
            .posts
            .values()
            .rev()
            .filter(|post| post.user == user_id)
            .cloned()
            .collect();
        Ok(Some(posts))
    }

    async fn create_comment(
        &self,
        author: Id<UserMarker>,
        comment: &NewComment,
    ) -> Result<Option<Comment>> {
        let mut state = self.lock();

        if !state.posts.contains_key(&comment.post_id) {
            return Ok(None);
        }
        if !state.users.contains_key(&author) {
            return Err(DbError::MissingReference("user"));
        }

        let created = Comment {
            id: state.next_id()?,
            post: comment.post_id,
            user: author,
            content: comment.content.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        state.comments.insert(created.id, created.clone());
        if let Some(post) = state.posts.get_mut(&comment.post_id) {
            post.comments.push(created.id);
        }

        Ok(Some(created))
    }

    async fn create_article(&self, content: &ArticleContent) -> Result<Article> {
        let mut state = self.lock();

        let article = Article {
            id: state.next_id()?,
            title: content.title.clone(),
            content: content.content.clone(),
            created_at: OffsetDateTime::now_utc(),
        };
        state.articles.insert(article.id, article.clone());

        Ok(article)
    }

    async fn fetch_article(&self, article_id: Id<ArticleMarker>) -> Result<Option<Article>> {
        Ok(self.lock().articles.get(&article_id).cloned())
    }

    async fn fetch_articles(&self) -> Result<Vec<Article>> {
        Ok(self.lock().articles.values().rev().cloned().collect())
    }

    async fn update_article(
        &self,
        article_id: Id<ArticleMarker>,
        content: &ArticleContent,
    ) -> Result<Option<Article>> {
        let mut state = self.lock();

        let updated = state.articles.get_mut(&article_id).map(|article| {
            article.title = content.title.clone();
            article.content = content.content.clone();
            article.clone()
        });
        Ok(updated)
    }

    async fn delete_article(&self, article_id: Id<ArticleMarker>) -> Result<bool> {
        Ok(self.lock().articles.remove(&article_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        memory::MemoryStore,
        repository::{DbError, Repository},
    };
    use snapfeed_common::model::{
        Id,
        article::{ArticleContent, ArticleText, ArticleTitle},
        auth::PasswordHash,
        comment::{CommentText, NewComment},
        post::{ImageUrl, PostContent},
        user::{CreateUser, Email, Password, User, Username},
    };

    fn create_user(username: &str, email: &str) -> CreateUser {
        CreateUser {
            username: Username::new(username).unwrap(),
            email: Email::new(email).unwrap(),
            password_hash: PasswordHash::hash(&Password::new("pw").unwrap()).unwrap(),
        }
    }

    async fn alice(store: &MemoryStore) -> User {
        store
            .create_user(&create_user("alice", "a@x.com"))
            .await
            .unwrap()
    }

    fn image(url: &str) -> PostContent {
        PostContent {
            image_url: ImageUrl::new(url).unwrap(),
            caption: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::default();
        alice(&store).await;

        let result = store.create_user(&create_user("bob", "a@x.com")).await;
        assert!(matches!(result, Err(DbError::Duplicate("email"))));

        let result = store.create_user(&create_user("alice", "b@x.com")).await;
        assert!(matches!(result, Err(DbError::Duplicate("username"))));
    }

    #[tokio::test]
    async fn credentials_are_found_by_email() {
        let store = MemoryStore::default();
        let user = alice(&store).await;

        let credentials = store
            .fetch_user_credentials(&Email::new("a@x.com").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(credentials.user, user);
        assert!(
            credentials
                .password_hash
                .verify(&Password::new("pw").unwrap())
                .unwrap()
        );

        let missing = store
            .fetch_user_credentials(&Email::new("b@x.com").unwrap())
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn posts_are_listed_newest_first_with_owner() {
        let store = MemoryStore::default();
        let user = alice(&store).await;

        let first = store.create_post(user.id, &image("http://i/1.png")).await.unwrap();
        let second = store.create_post(user.id, &image("http://i/2.png")).await.unwrap();

        let posts = store.fetch_posts().await.unwrap();
        let ids: Vec<_> = posts.iter().map(|post| post.id).collect();
        assert_eq!(ids, [second.id, first.id]);
        assert_eq!(posts[0].user.username, user.username);

        let user_posts = store.fetch_user_posts(user.id).await.unwrap().unwrap();
        assert_eq!(user_posts.len(), 2);
        assert!(store.fetch_user_posts(Id::from(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn post_requires_existing_user() {
        let store = MemoryStore::default();

        let result = store.create_post(Id::from(1), &image("http://i/1.png")).await;
        assert!(matches!(result, Err(DbError::MissingReference("user"))));
    }

    #[tokio::test]
    async fn comment_is_appended_once() {
        let store = MemoryStore::default();
        let user = alice(&store).await;
        let post = store.create_post(user.id, &image("http://i/1.png")).await.unwrap();

        let comment = store
            .create_comment(
                user.id,
                &NewComment {
                    post_id: post.id,
                    content: CommentText::new("nice").unwrap(),
                },
            )
            .await
            .unwrap()
            .unwrap();

        let post = store.fetch_post(post.id).await.unwrap().unwrap();
        assert_eq!(post.comments, [comment.clone()]);

        let user_posts = store.fetch_user_posts(user.id).await.unwrap().unwrap();
        assert_eq!(user_posts[0].comments, [comment.id]);
    }

    #[tokio::test]
    async fn comment_on_missing_post_writes_nothing() {
        let store = MemoryStore::default();
        let user = alice(&store).await;

        let comment = store
            .create_comment(
                user.id,
                &NewComment {
                    post_id: Id::from(42),
                    content: CommentText::new("hello?").unwrap(),
                },
            )
            .await
            .unwrap();

        assert!(comment.is_none());
        assert!(store.lock().comments.is_empty());
    }

    #[tokio::test]
    async fn article_lifecycle() {
        let store = MemoryStore::default();
        let content = |title: &str| ArticleContent {
            title: ArticleTitle::new(title).unwrap(),
            content: ArticleText::new("body").unwrap(),
        };

        let article = store.create_article(&content("First")).await.unwrap();
        assert_eq!(store.fetch_articles().await.unwrap(), [article.clone()]);

        let updated = store
            .update_article(article.id, &content("Renamed"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title.get(), "Renamed");
        assert_eq!(updated.created_at, article.created_at);

        assert!(store.delete_article(article.id).await.unwrap());
        assert!(!store.delete_article(article.id).await.unwrap());
        assert!(store.fetch_article(article.id).await.unwrap().is_none());
        assert!(
            store
                .update_article(article.id, &content("Gone"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
