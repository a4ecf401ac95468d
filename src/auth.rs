use spin_sdk::http::{Request, Response};
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::core::helpers::{html, is_json, json, now_iso, verify_password};
use crate::core::kv::KeyValueJson;
use crate::core::query_params::{parse_form_body, parse_query_params};
use crate::config::token_key;
use crate::models::{TokenData, User};
use crate::templates::render_login;
use crate::App;

struct Credentials {
    username: String,
    password: String,
    next: Option<String>,
}

fn read_credentials(req: &Request) -> Result<(Credentials, bool), ApiError> {
    if is_json(req) {
        let value: serde_json::Value = serde_json::from_slice(req.body())?;
        let creds = Credentials {
            username: value["username"].as_str().unwrap_or_default().to_string(),
            password: value["password"].as_str().unwrap_or_default().to_string(),
            next: value["next"].as_str().map(str::to_string),
        };
        Ok((creds, true))
    } else {
        let mut form = parse_form_body(req.body());
        let creds = Credentials {
            username: form.remove("username").unwrap_or_default(),
            password: form.remove("password").unwrap_or_default(),
            next: form.remove("next"),
        };
        Ok((creds, false))
    }
}

pub fn login_page(req: &Request) -> Result<Response, ApiError> {
    let params = parse_query_params(req.uri());
    let next = params.get("next").map(String::as_str).unwrap_or("/");
    Ok(html(render_login(next, None)?))
}

pub fn login_user(app: &App, req: &Request) -> Result<Response, ApiError> {
    let (creds, wants_json) = read_credentials(req)?;

    let user = app.store.find_user_by_username(&creds.username)?;
    let user = match user {
        Some(u) if verify_password(&creds.password, &u.password) => u,
        _ => {
            tracing::debug!(username = %creds.username, "login refused");
            if wants_json {
                return Err(ApiError::Unauthorized);
            }
            let next = creds.next.as_deref().unwrap_or("/");
            let page = render_login(next, Some("Wrong username or password."))?;
            return Ok(Response::builder()
                .status(401)
                .header("Content-Type", "text/html; charset=utf-8")
                .body(page.into_bytes())
                .build());
        }
    };

    let token = Uuid::new_v4().to_string();
    let data = TokenData {
        user_id: user.id,
        created_at: now_iso(),
    };
    app.store.kv().set_json(&token_key(&token), &data)?;
    tracing::info!(user_id = user.id, "user logged in");

    let resp = serde_json::json!({
        "token": token,
        "user_id": user.id,
        "next": creds.next.unwrap_or_else(|| "/".to_string()),
    });
    Ok(json(200, &resp)?)
}

fn bearer_token(req: &Request) -> Option<&str> {
    let auth_header = req.header("Authorization")?.as_str()?;
    auth_header.strip_prefix("Bearer ").map(str::trim)
}

pub fn logout_user(app: &App, req: &Request) -> Result<Response, ApiError> {
    let token = bearer_token(req).ok_or(ApiError::Unauthorized)?;
    app.store.kv().delete(&token_key(token))?;

    let resp = serde_json::json!({
        "message": "Logged out successfully"
    });
    Ok(json(200, &resp)?)
}

/// Tokens with an unreadable timestamp count as expired.
fn token_expired(data: &TokenData, expiration_hours: i64) -> bool {
    match chrono::DateTime::parse_from_rfc3339(&data.created_at) {
        Ok(created) => {
            let age_hours = (chrono::Utc::now() - created.with_timezone(&chrono::Utc)).num_hours();
            age_hours > expiration_hours
        }
        Err(_) => true,
    }
}

/// The signed-in user behind the request's bearer token, if any.
///
/// Unknown, expired or orphaned tokens make the request anonymous.
pub fn resolve_viewer(app: &App, req: &Request) -> Result<Option<User>, ApiError> {
    let token = match bearer_token(req) {
        Some(t) if !t.is_empty() => t,
        _ => return Ok(None),
    };

    let data = match app.store.kv().get_json::<TokenData>(&token_key(token))? {
        Some(d) => d,
        None => return Ok(None),
    };

    if token_expired(&data, app.config.token_expiration_hours) {
        tracing::debug!(user_id = data.user_id, "token expired");
        return Ok(None);
    }

    Ok(app.store.get_user(data.user_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn token(created_at: String) -> TokenData {
        TokenData {
            user_id: 1,
            created_at,
        }
    }

    #[test]
    fn fresh_token_is_valid() {
        assert!(!token_expired(&token(now_iso()), 24));
    }

    #[test]
    fn old_token_expires() {
        let created = (Utc::now() - Duration::hours(30)).to_rfc3339();
        assert!(token_expired(&token(created), 24));
    }

    #[test]
    fn unreadable_timestamp_expires() {
        assert!(token_expired(&token("yesterday".to_string()), 24));
        assert!(token_expired(&token(String::new()), 24));
    }
}
