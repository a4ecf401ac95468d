use std::collections::HashSet;

use ammonia::Builder;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use spin_sdk::http::{Request, Response};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn now_iso() -> String {
    now().to_rfc3339()
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::PasswordHash;

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Strips every HTML tag, leaving plain text (entities decoded again so the
/// renderer escapes exactly once).
pub fn sanitize_text(text: &str) -> String {
    let cleaned = Builder::default()
        .tags(HashSet::new())
        .clean(text)
        .to_string();
    html_escape::decode_html_entities(&cleaned).into_owned()
}

pub fn is_json(req: &Request) -> bool {
    req.header("Content-Type")
        .and_then(|h| h.as_str())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

pub fn html(body: String) -> Response {
    Response::builder()
        .status(200)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(body.into_bytes())
        .build()
}

pub fn json<T: serde::Serialize>(status: u16, value: &T) -> anyhow::Result<Response> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(value)?)
        .build())
}

pub fn redirect(location: &str) -> Response {
    Response::builder()
        .status(302)
        .header("Location", location)
        .body(Vec::new())
        .build()
}

pub fn profile_url(username: &str) -> String {
    format!("/profile/{}/", urlencoding::encode(username))
}

pub fn post_url(post_id: u64) -> String {
    format!("/posts/{}/", post_id)
}

pub fn group_url(slug: &str) -> String {
    format!("/group/{}/", slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("testpwd").unwrap();
        assert!(verify_password("testpwd", &hash));
        assert!(!verify_password("other", &hash));
        assert!(!verify_password("testpwd", "not-a-hash"));
    }

    #[test]
    fn sanitize_strips_markup() {
        assert_eq!(sanitize_text("<b>hi</b><script>x()</script>"), "hi");
        assert_eq!(sanitize_text("a < b & c"), "a < b & c");
    }

    #[test]
    fn redirect_sets_location() {
        let resp = redirect("/posts/1/");
        assert_eq!(*resp.status(), 302);
        let location = resp
            .headers()
            .find(|(k, _)| k.eq_ignore_ascii_case("location"))
            .and_then(|(_, v)| v.as_str());
        assert_eq!(location, Some("/posts/1/"));
    }
}
