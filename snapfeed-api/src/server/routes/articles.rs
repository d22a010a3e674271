//! The blog: plain title/content articles, no authentication.

use crate::server::{Result, ServerError, ServerRouter, json::Json};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use snapfeed_common::model::{
    Id,
    article::{Article, ArticleContent, ArticleMarker},
};
use snapfeed_db::Repository;
use std::sync::Arc;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_articles)
        .typed_post(create_article)
        .typed_get(get_article)
        .typed_put(update_article)
        .typed_delete(delete_article)
}

#[derive(TypedPath)]
#[typed_path("/api/articles")]
struct ArticlesPath;

async fn get_articles(
    ArticlesPath: ArticlesPath,
    State(repository): State<Arc<dyn Repository>>,
) -> Result<Json<Vec<Article>>> {
    let articles = repository.fetch_articles().await?;

    Ok(Json(articles))
}

async fn create_article(
    ArticlesPath: ArticlesPath,
    State(repository): State<Arc<dyn Repository>>,
    Json(content): Json<ArticleContent>,
) -> Result<(StatusCode, Json<Article>)> {
    let article = repository.create_article(&content).await?;

    info!(article_id = %article.id, "Created article");
    Ok((StatusCode::CREATED, Json(article)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/articles/{id}", rejection(ServerError))]
struct ArticlePath {
    id: Id<ArticleMarker>,
}

async fn get_article(
    ArticlePath { id }: ArticlePath,
    State(repository): State<Arc<dyn Repository>>,
) -> Result<Json<Article>> {
    let article = repository
        .fetch_article(id)
        .await?
        .ok_or(ServerError::ArticleByIdNotFound(id))?;

    Ok(Json(article))
}

async fn update_article(
    ArticlePath { id }: ArticlePath,
    State(repository): State<Arc<dyn Repository>>,
    Json(content): Json<ArticleContent>,
) -> Result<Json<Article>> {
    let article = repository
        .update_article(id, &content)
        .await?
        .ok_or(ServerError::ArticleByIdNotFound(id))?;

    Ok(Json(article))
}

async fn delete_article(
    ArticlePath { id }: ArticlePath,
    State(repository): State<Arc<dyn Repository>>,
) -> Result<StatusCode> {
    if !repository.delete_article(id).await? {
        return Err(ServerError::ArticleByIdNotFound(id));
    }

    info!(article_id = %id, "Deleted article");
    Ok(StatusCode::NO_CONTENT)
}
