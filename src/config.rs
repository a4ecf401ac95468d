use std::time::Duration;

pub const DEFAULT_BIND: &str = "0.0.0.0:80";
pub const DEFAULT_POSTS_PER_PAGE: usize = 10;
pub const DEFAULT_INDEX_CACHE_SECONDS: u64 = 20;
pub const DEFAULT_TOKEN_EXPIRATION_HOURS: i64 = 24;
pub const DEFAULT_LOGIN_URL: &str = "/auth/login/";

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_PASSWORD_LENGTH: usize = 3;
pub const MAX_GROUP_TITLE_LENGTH: usize = 200;

// === Store keys ===
pub const USERS_LIST_KEY: &str = "users_list";
pub const GROUPS_LIST_KEY: &str = "groups_list";
pub const FEED_KEY: &str = "feed";

pub fn user_key(id: u64) -> String {
    format!("user:{}", id)
}

pub fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

pub fn group_key(id: u64) -> String {
    format!("group:{}", id)
}

pub fn group_slug_key(slug: &str) -> String {
    format!("group_slug:{}", slug)
}

pub fn group_title_key(title: &str) -> String {
    format!("group_title:{}", title)
}

pub fn post_key(id: u64) -> String {
    format!("post:{}", id)
}

pub fn comment_key(id: u64) -> String {
    format!("comment:{}", id)
}

pub fn post_comments_key(post_id: u64) -> String {
    format!("comments:{}", post_id)
}

pub fn follow_key(user_id: u64, author_id: u64) -> String {
    format!("follow:{}:{}", user_id, author_id)
}

pub fn token_key(token: &str) -> String {
    format!("token:{}", token)
}

pub fn media_key(path: &str) -> String {
    format!("media:{}", path)
}

pub fn sequence_key(kind: &str) -> String {
    format!("seq:{}", kind)
}

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub posts_per_page: usize,
    pub index_cache_ttl: Duration,
    pub token_expiration_hours: i64,
    pub login_url: String,
    pub seed: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            posts_per_page: DEFAULT_POSTS_PER_PAGE,
            index_cache_ttl: Duration::from_secs(DEFAULT_INDEX_CACHE_SECONDS),
            token_expiration_hours: DEFAULT_TOKEN_EXPIRATION_HOURS,
            login_url: DEFAULT_LOGIN_URL.to_string(),
            seed: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind: std::env::var("QUILL_BIND").unwrap_or(defaults.bind),
            posts_per_page: env_parse("QUILL_POSTS_PER_PAGE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.posts_per_page),
            index_cache_ttl: env_parse("QUILL_INDEX_CACHE_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.index_cache_ttl),
            token_expiration_hours: env_parse("QUILL_TOKEN_EXPIRATION_HOURS")
                .unwrap_or(defaults.token_expiration_hours),
            login_url: std::env::var("QUILL_LOGIN_URL").unwrap_or(defaults.login_url),
            seed: env_parse("QUILL_SEED").unwrap_or(defaults.seed),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.posts_per_page, 10);
        assert_eq!(c.index_cache_ttl, Duration::from_secs(20));
        assert_eq!(c.token_expiration_hours, 24);
        assert_eq!(c.login_url, "/auth/login/");
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(follow_key(3, 7), "follow:3:7");
        assert_eq!(post_comments_key(5), "comments:5");
        assert_eq!(media_key("posts/a.gif"), "media:posts/a.gif");
    }
}
