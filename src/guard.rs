//! Who may create and change posts.
//!
//! A refused mutation is not an error: anonymous visitors are sent to the
//! login entry point (with a `next` parameter pointing back), and signed-in
//! users who do not own the post are sent to the post's page.

use crate::core::helpers::post_url;
use crate::models::{Post, User};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow,
    RedirectToLogin(String),
    RedirectToPost(u64),
}

impl Access {
    /// Where to send the visitor, or `None` when access is granted.
    pub fn redirect_target(&self) -> Option<String> {
        match self {
            Access::Allow => None,
            Access::RedirectToLogin(url) => Some(url.clone()),
            Access::RedirectToPost(id) => Some(post_url(*id)),
        }
    }
}

pub fn can_create(actor: Option<&User>) -> bool {
    actor.is_some()
}

pub fn can_edit(actor: Option<&User>, post: &Post) -> bool {
    actor.is_some_and(|user| user.id == post.author_id)
}

/// `login_url?next=<path>`, with `next` percent-encoded except for `/`.
pub fn login_redirect(login_url: &str, next: &str) -> String {
    format!("{}?next={}", login_url, urlencoding::encode(next).replace("%2F", "/"))
}

/// Gate for operations that only need a signed-in user.
pub fn require_login(actor: Option<&User>, login_url: &str, next: &str) -> Access {
    if can_create(actor) {
        Access::Allow
    } else {
        Access::RedirectToLogin(login_redirect(login_url, next))
    }
}

/// Gate for editing or deleting a post.
pub fn check_edit(actor: Option<&User>, post: &Post, login_url: &str, next: &str) -> Access {
    match actor {
        None => Access::RedirectToLogin(login_redirect(login_url, next)),
        Some(_) if can_edit(actor, post) => Access::Allow,
        Some(user) => {
            tracing::debug!(user_id = user.id, post_id = post.id, "edit refused, not the author");
            Access::RedirectToPost(post.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(id: u64) -> User {
        User {
            id,
            username: format!("u{}", id),
            password: String::new(),
            created_at: Utc::now(),
        }
    }

    fn post_by(author_id: u64) -> Post {
        Post {
            id: 42,
            text: "text".into(),
            author_id,
            group_id: None,
            image: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn only_the_author_may_edit() {
        let post = post_by(1);
        assert!(can_edit(Some(&user(1)), &post));
        assert!(!can_edit(Some(&user(2)), &post));
        assert!(!can_edit(None, &post));
    }

    #[test]
    fn anyone_signed_in_may_create() {
        assert!(can_create(Some(&user(7))));
        assert!(!can_create(None));
    }

    #[test]
    fn refusals_redirect() {
        let post = post_by(1);
        assert_eq!(
            check_edit(None, &post, "/auth/login/", "/posts/42/edit/"),
            Access::RedirectToLogin("/auth/login/?next=/posts/42/edit/".into())
        );
        let other = check_edit(Some(&user(2)), &post, "/auth/login/", "/posts/42/edit/");
        assert_eq!(other.redirect_target().as_deref(), Some("/posts/42/"));
        assert_eq!(check_edit(Some(&user(1)), &post, "/auth/login/", "/x"), Access::Allow);
    }

    #[test]
    fn next_is_encoded() {
        assert_eq!(
            login_redirect("/auth/login/", "/profile/a+b/follow/"),
            "/auth/login/?next=/profile/a%2Bb/follow/"
        );
        assert_eq!(
            login_redirect("/auth/login/", "/x/?a=1&b=50%"),
            "/auth/login/?next=/x/%3Fa%3D1%26b%3D50%25"
        );
    }

    #[test]
    fn login_gate() {
        assert_eq!(
            require_login(None, "/auth/login/", "/create/").redirect_target().as_deref(),
            Some("/auth/login/?next=/create/")
        );
        assert_eq!(require_login(Some(&user(1)), "/auth/login/", "/create/"), Access::Allow);
    }
}
