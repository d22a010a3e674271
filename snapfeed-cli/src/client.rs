use anyhow::{Context, Result, bail};
use reqwest::{
    StatusCode,
    blocking::{Client, RequestBuilder, Response},
};
use serde::{Deserialize, de::DeserializeOwned};
use snapfeed_common::model::{
    auth::{AuthToken, LoginRequest, LoginResponse},
    comment::{Comment, NewComment},
    post::{PartialPost, Post, PostContent},
    user::{RegisterUser, User},
};

/// Blocking client for the snapfeed HTTP API.
#[derive(Debug)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<AuthToken>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl ApiClient {
    #[must_use]
    pub fn new(base_url: &str, token: Option<AuthToken>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .token
            .as_ref()
            .context("Not logged in, run `snapfeed login` first")?;
        Ok(request.bearer_auth(token.as_str()))
    }

    fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T> {
        let response = request.send().context("Could not reach the server")?;
        let status = response.status();

        if !status.is_success() {
            bail!("{}", error_message(status, response));
        }

        response.json().context("Unexpected response from the server")
    }

    pub fn register(&self, user: &RegisterUser) -> Result<User> {
        Self::send(self.http.post(self.url("/api/register")).json(user))
    }

    pub fn login(&self, login: &LoginRequest) -> Result<AuthToken> {
        let response: LoginResponse =
            Self::send(self.http.post(self.url("/api/login")).json(login))?;
        Ok(response.token)
    }

    pub fn create_post(&self, content: &PostContent) -> Result<PartialPost> {
        Self::send(self.authorized(self.http.post(self.url("/api/posts")))?.json(content))
    }

    pub fn create_comment(&self, comment: &NewComment) -> Result<Comment> {
        Self::send(self.authorized(self.http.post(self.url("/api/comments")))?.json(comment))
    }

    pub fn posts(&self) -> Result<Vec<Post>> {
        Self::send(self.authorized(self.http.get(self.url("/api/posts")))?)
    }
}

fn error_message(status: StatusCode, response: Response) -> String {
    let body = response.text().unwrap_or_default();
    parse_error_message(status, &body)
}

fn parse_error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body).map_or_else(
        |_| format!("Request failed with status {status}"),
        |error| error.message,
    )
}
