pub mod auth;
pub mod config;
pub mod core;
pub mod feed;
pub mod follow;
pub mod forms;
pub mod guard;
pub mod models;
pub mod posts;
pub mod templates;
pub mod users;

use std::sync::Arc;

use spin_sdk::http::{Request, Response};

use crate::config::Config;
use crate::core::cache::PageCache;
use crate::core::db::EntityStore;
use crate::core::errors::ApiError;
use crate::core::helpers::html;
use crate::core::kv::{KeyValue, MemoryKv};
use crate::core::query_params::path_of;
use crate::models::User;

/// Everything a request handler needs: storage, the page cache and settings.
pub struct App {
    pub store: EntityStore,
    pub cache: PageCache,
    pub config: Config,
}

impl App {
    pub fn new(kv: Arc<dyn KeyValue>, config: Config) -> Self {
        Self {
            store: EntityStore::new(kv),
            cache: PageCache::new(),
            config,
        }
    }

    pub fn in_memory(config: Config) -> Self {
        Self::new(Arc::new(MemoryKv::new()), config)
    }

    /// Routes the request. Failures become error responses; nothing escapes.
    pub fn handle(&self, req: &Request) -> Response {
        match self.dispatch(req) {
            Ok(resp) => resp,
            Err(err) => err.into(),
        }
    }

    fn dispatch(&self, req: &Request) -> Result<Response, ApiError> {
        let method = req.method().to_string().to_uppercase();
        let path = path_of(req.uri()).to_string();
        tracing::debug!(%method, %path, "dispatch");

        let viewer = auth::resolve_viewer(self, req)?;
        let viewer = viewer.as_ref();
        let decoded = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::decode(s).map(|d| d.into_owned()))
            .collect::<Result<Vec<String>, _>>()
            .map_err(|_| ApiError::NotFound(path.clone()))?;
        let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();
        let is_post = method == "POST";

        match (method.as_str(), segments.as_slice()) {
            ("GET", []) => posts::index(self, req, viewer),
            ("GET", ["group", slug]) => posts::group_posts(self, req, viewer, slug),
            ("GET", ["profile", username]) => users::profile(self, req, viewer, username),
            ("GET" | "POST", ["profile", username, "follow"]) => {
                follow::profile_follow(self, viewer, username)
            }
            ("GET" | "POST", ["profile", username, "unfollow"]) => {
                follow::profile_unfollow(self, viewer, username)
            }
            ("GET", ["posts", id]) => posts::post_detail(self, req, viewer, parse_id(id)?),
            ("GET" | "POST", ["create"]) => posts::post_create(self, req, viewer, is_post),
            ("GET" | "POST", ["posts", id, "edit"]) => {
                posts::post_edit(self, req, viewer, parse_id(id)?, is_post)
            }
            ("POST", ["posts", id, "delete"]) => posts::post_delete(self, viewer, parse_id(id)?),
            ("POST", ["posts", id, "comment"]) => {
                posts::add_comment(self, req, viewer, parse_id(id)?)
            }
            ("GET", ["follow"]) => follow::follow_index(self, req, viewer),
            ("GET", ["media", "posts", name]) => posts::media(self, &format!("posts/{}", name)),
            ("GET", ["auth", "login"]) => auth::login_page(req),
            ("POST", ["auth", "login"]) => auth::login_user(self, req),
            ("POST", ["auth", "logout"]) => auth::logout_user(self, req),
            ("POST", ["auth", "signup"]) => users::create_user(self, req),
            ("GET", ["about", topic @ ("author" | "tech")]) => about(viewer, topic),
            _ => Err(ApiError::NotFound(path.clone())),
        }
    }
}

fn parse_id(raw: &str) -> Result<u64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::NotFound(format!("post {}", raw)))
}

fn about(viewer: Option<&User>, topic: &str) -> Result<Response, ApiError> {
    Ok(html(templates::render_about(viewer, topic)?))
}

// === Spin component entrypoint ===
#[cfg(target_arch = "wasm32")]
mod component {
    use std::sync::Arc;

    use spin_sdk::http::{IntoResponse, Request};
    use spin_sdk::http_component;
    use spin_sdk::key_value::Store;

    use crate::config::Config;
    use crate::App;

    #[http_component]
    fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
        let store = Store::open_default()?;
        let config = Config::from_env();
        let app = App::new(Arc::new(store), config);
        if app.config.seed {
            app.store.seed_demo_data()?;
        }
        Ok(app.handle(&req))
    }
}
