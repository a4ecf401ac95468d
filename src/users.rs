use std::sync::OnceLock;

use regex::Regex;
use spin_sdk::http::{Request, Response};

use crate::config::*;
use crate::core::errors::{ApiError, StoreError};
use crate::core::helpers::{hash_password, html, json};
use crate::core::query_params::{page_param, parse_query_params};
use crate::feed::{compose_feed, Scope};
use crate::models::User;
use crate::posts::post_views;
use crate::templates;
use crate::App;

// Usernames end up in URLs and markup.
fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.@+-]+$").expect("Regex should compile"))
}

fn build_user_json(user: &User) -> serde_json::Value {
    serde_json::json!({
        "id": user.id,
        "username": user.username,
    })
}

/// Registers a new account from a JSON body with `username` and `password`.
pub fn create_user(app: &App, req: &Request) -> Result<Response, ApiError> {
    let new_user: serde_json::Value = serde_json::from_slice(req.body())?;
    let username = new_user["username"].as_str().unwrap_or("");
    let password = new_user["password"].as_str().unwrap_or("");

    if username.is_empty() {
        return Err(ApiError::BadRequest("Username is required".to_string()));
    }
    let length = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&length) {
        return Err(ApiError::BadRequest("Username must be 3-50 characters".to_string()));
    }
    if password.is_empty() {
        return Err(ApiError::BadRequest("Password is required".to_string()));
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest("Password must be at least 3 characters".to_string()));
    }

    if !username_regex().is_match(username) {
        return Err(ApiError::BadRequest(
            "Username may contain only letters, digits and @/./+/-/_ characters".to_string(),
        ));
    }

    let user = match app.store.create_user(username, &hash_password(password)?) {
        Ok(user) => user,
        Err(StoreError::UniqueViolation(_)) => {
            return Err(ApiError::Conflict("Username exists".to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    Ok(json(201, &build_user_json(&user))?)
}

/// An author's posts, post count and whether the viewer follows them.
pub fn profile(
    app: &App,
    req: &Request,
    viewer: Option<&User>,
    username: &str,
) -> Result<Response, ApiError> {
    let author = app
        .store
        .find_user_by_username(username)?
        .ok_or_else(|| ApiError::NotFound(format!("user {}", username)))?;

    let params = parse_query_params(req.uri());
    let posts = compose_feed(
        &app.store,
        &Scope::ByAuthor(author.username.clone()),
        page_param(&params),
        app.config.posts_per_page,
    )?;
    let post_count = posts.total_count;

    let following = match viewer {
        Some(user) if user.id != author.id => Some(app.store.is_following(user.id, author.id)?),
        _ => None,
    };

    let body = templates::render_profile(
        viewer,
        &author,
        &post_views(&app.store, posts)?,
        post_count,
        following,
    )?;
    Ok(html(body))
}
