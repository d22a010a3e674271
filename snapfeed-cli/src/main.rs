use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client::ApiClient;
use snapfeed_common::model::{
    Id,
    auth::{AuthToken, LoginRequest},
    comment::{CommentText, NewComment},
    post::{ImageUrl, Post, PostContent, PostMarker},
    user::{Email, Password, RegisterUser, Username},
};
use std::{fs, path::PathBuf};

mod client;

/// Command line client for a snapfeed server.
#[derive(Debug, Parser)]
#[command(name = "snapfeed", version)]
struct Cli {
    /// Base URL of the snapfeed API.
    #[arg(long, env = "SNAPFEED_API_URL", default_value = "http://127.0.0.1:5000")]
    api_url: String,

    /// Bearer token to use instead of the one saved by `login`.
    #[arg(long, env = "SNAPFEED_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a new account.
    Register {
        username: String,
        email: String,
        password: String,
    },
    /// Log in and save the session token.
    Login { email: String, password: String },
    /// Publish a picture.
    Post {
        image_url: String,
        #[arg(long)]
        caption: Option<String>,
    },
    /// Comment on a post.
    Comment {
        post_id: Id<PostMarker>,
        content: String,
    },
    /// Show the feed, newest first.
    Posts,
}

fn token_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine the config directory")?;
    Ok(config_dir.join("snapfeed").join("token"))
}

fn load_token() -> Result<Option<AuthToken>> {
    let path = token_path()?;
    if !path.exists() {
        return Ok(None);
    }

    let token = fs::read_to_string(&path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    Ok(Some(AuthToken::new(token.trim().to_owned())))
}

fn save_token(token: &AuthToken) -> Result<PathBuf> {
    let path = token_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }

    fs::write(&path, token.as_str())
        .with_context(|| format!("Could not write {}", path.display()))?;
    Ok(path)
}

fn print_post(post: &Post) {
    println!(
        "[{}] {} posted {}",
        post.id, post.user.username, post.image_url
    );
    if let Some(caption) = &post.caption {
        println!("    {caption}");
    }
    for comment in &post.comments {
        println!("    > {}", comment.content);
    }
}

impl Command {
    /// Validates the arguments into request bodies, then sends them.
    fn run(self, client: &ApiClient) -> Result<()> {
        match self {
            Command::Register {
                username,
                email,
                password,
            } => {
                let register = RegisterUser {
                    username: Username::new(username)?,
                    email: Email::new(email)?,
                    password: Password::new(password)?,
                };
                let user = client.register(&register)?;
                println!("Registered {} with id {}", user.username, user.id);
            }
            Command::Login { email, password } => {
                let login = LoginRequest {
                    email: Email::new(email)?,
                    password: Password::new(password)?,
                };
                let token = client.login(&login)?;
                let path = save_token(&token)?;
                println!("Logged in, token saved to {}", path.display());
            }
            Command::Post { image_url, caption } => {
                let content = PostContent {
                    image_url: ImageUrl::new(image_url)?,
                    caption,
                };
                let post = client.create_post(&content)?;
                println!("Created post {}", post.id);
            }
            Command::Comment { post_id, content } => {
                let comment = NewComment {
                    post_id,
                    content: CommentText::new(content)?,
                };
                let comment = client.create_comment(&comment)?;
                println!("Created comment {}", comment.id);
            }
            Command::Posts => {
                let posts = client.posts()?;
                if posts.is_empty() {
                    println!("No posts yet");
                }
                for post in &posts {
                    print_post(post);
                }
            }
        }

        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let token = match cli.token {
        Some(token) => Some(AuthToken::new(token)),
        None => load_token()?,
    };
    let client = ApiClient::new(&cli.api_url, token);

    cli.command.run(&client)
}

#[cfg(test)]
mod tests {
    use crate::{Cli, Command, client::ApiClient};
    use clap::{CommandFactory, Parser};

    // Nothing listens here; an error other than a validation error means the
    // request was sent.
    fn offline_client() -> ApiClient {
        ApiClient::new("http://127.0.0.1:9", None)
    }

    fn run_error(command: Command) -> String {
        command.run(&offline_client()).unwrap_err().to_string()
    }

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn post_takes_optional_caption() {
        let cli = Cli::try_parse_from([
            "snapfeed",
            "--api-url",
            "http://feed.test",
            "post",
            "http://i/1.png",
            "--caption",
            "sunset",
        ])
        .unwrap();

        assert_eq!(cli.api_url, "http://feed.test");
        match cli.command {
            Command::Post { image_url, caption } => {
                assert_eq!(image_url, "http://i/1.png");
                assert_eq!(caption.as_deref(), Some("sunset"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn comment_requires_numeric_post_id() {
        assert!(Cli::try_parse_from(["snapfeed", "comment", "abc", "hi"]).is_err());

        let cli = Cli::try_parse_from(["snapfeed", "comment", "42", "hi"]).unwrap();
        match cli.command {
            Command::Comment { post_id, content } => {
                assert_eq!(post_id.to_string(), "42");
                assert_eq!(content, "hi");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn register_arguments_are_validated_before_sending() {
        let error = run_error(Command::Register {
            username: "alice".to_owned(),
            email: "not-an-email".to_owned(),
            password: "pw".to_owned(),
        });
        assert_eq!(error, "The email is malformed");

        let error = run_error(Command::Register {
            username: "   ".to_owned(),
            email: "a@x.com".to_owned(),
            password: "pw".to_owned(),
        });
        assert_eq!(error, "The username must not be empty");

        let error = run_error(Command::Register {
            username: "alice".to_owned(),
            email: "a@x.com".to_owned(),
            password: "pw".to_owned(),
        });
        assert_eq!(error, "Could not reach the server");
    }

    #[test]
    fn login_arguments_are_validated_before_sending() {
        let error = run_error(Command::Login {
            email: "a@x.com".to_owned(),
            password: String::new(),
        });
        assert_eq!(error, "The password must not be empty");
    }
}
