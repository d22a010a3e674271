use crate::server::ServerRouter;

mod articles;
mod auth;
mod comments;
mod posts;
mod users;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .merge(auth::routes())
        .merge(posts::routes())
        .merge(comments::routes())
        .merge(users::routes())
        .merge(articles::routes())
}
