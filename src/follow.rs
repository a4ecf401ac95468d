use spin_sdk::http::{Request, Response};

use crate::core::db::EntityStore;
use crate::core::errors::{ApiError, StoreError, StoreResult};
use crate::core::helpers::{html, profile_url, redirect};
use crate::core::query_params::{page_param, parse_query_params};
use crate::feed::{compose_feed, Scope};
use crate::guard::require_login;
use crate::models::User;
use crate::posts::post_views;
use crate::templates;
use crate::App;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Followed,
    AlreadyFollowing,
    SelfFollow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfollowOutcome {
    Unfollowed,
    NotFollowing,
}

/// Creates the follower -> target edge. Repeating it, or racing another
/// request for the same pair, leaves exactly one edge.
pub fn follow_user(store: &EntityStore, follower_id: u64, target_id: u64) -> StoreResult<FollowOutcome> {
    if follower_id == target_id {
        return Ok(FollowOutcome::SelfFollow);
    }

    match store.insert_follow(follower_id, target_id) {
        Ok(_) => {
            tracing::info!(follower_id, target_id, "follow created");
            Ok(FollowOutcome::Followed)
        }
        Err(StoreError::UniqueViolation(what)) => {
            tracing::debug!(%what, "follow already present");
            Ok(FollowOutcome::AlreadyFollowing)
        }
        Err(e) => Err(e),
    }
}

/// Removes the edge. Unfollowing someone not followed is not an error.
pub fn unfollow_user(store: &EntityStore, follower_id: u64, target_id: u64) -> StoreResult<UnfollowOutcome> {
    if store.delete_follow(follower_id, target_id)? {
        tracing::info!(follower_id, target_id, "follow removed");
        Ok(UnfollowOutcome::Unfollowed)
    } else {
        Ok(UnfollowOutcome::NotFollowing)
    }
}

// === HTTP Handlers ===

fn find_author(app: &App, username: &str) -> Result<User, ApiError> {
    app.store
        .find_user_by_username(username)?
        .ok_or_else(|| ApiError::NotFound(format!("user {}", username)))
}

/// Posts by everyone the viewer follows.
pub fn follow_index(app: &App, req: &Request, viewer: Option<&User>) -> Result<Response, ApiError> {
    let user = match viewer {
        Some(user) => user,
        None => {
            let target = require_login(viewer, &app.config.login_url, "/follow/").redirect_target();
            return Ok(redirect(&target.unwrap_or_default()));
        }
    };

    let params = parse_query_params(req.uri());
    let posts = compose_feed(
        &app.store,
        &Scope::ByFollowed(user.id),
        page_param(&params),
        app.config.posts_per_page,
    )?;
    let body = templates::render_follow(viewer, &post_views(&app.store, posts)?)?;
    Ok(html(body))
}

pub fn profile_follow(app: &App, viewer: Option<&User>, username: &str) -> Result<Response, ApiError> {
    let next = format!("{}follow/", profile_url(username));
    let user = match viewer {
        Some(user) => user,
        None => {
            let target = require_login(viewer, &app.config.login_url, &next).redirect_target();
            return Ok(redirect(&target.unwrap_or_default()));
        }
    };

    let author = find_author(app, username)?;
    follow_user(&app.store, user.id, author.id)?;
    Ok(redirect(&profile_url(&author.username)))
}

pub fn profile_unfollow(app: &App, viewer: Option<&User>, username: &str) -> Result<Response, ApiError> {
    let next = format!("{}unfollow/", profile_url(username));
    let user = match viewer {
        Some(user) => user,
        None => {
            let target = require_login(viewer, &app.config.login_url, &next).redirect_target();
            return Ok(redirect(&target.unwrap_or_default()));
        }
    };

    let author = find_author(app, username)?;
    unfollow_user(&app.store, user.id, author.id)?;
    Ok(redirect(&profile_url(&author.username)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kv::MemoryKv;
    use std::sync::Arc;
    use std::thread;

    fn store_with_two_users() -> (Arc<EntityStore>, u64, u64) {
        let store = EntityStore::new(Arc::new(MemoryKv::new()));
        let leo = store.create_user("leo", "h").unwrap();
        let ann = store.create_user("ann", "h").unwrap();
        (Arc::new(store), leo.id, ann.id)
    }

    #[test]
    fn self_follow_is_a_no_op() {
        let (store, leo, _) = store_with_two_users();
        assert_eq!(follow_user(&store, leo, leo).unwrap(), FollowOutcome::SelfFollow);
        assert_eq!(store.count_follows().unwrap(), 0);
    }

    #[test]
    fn repeated_follow_keeps_one_edge() {
        let (store, leo, ann) = store_with_two_users();
        assert_eq!(follow_user(&store, leo, ann).unwrap(), FollowOutcome::Followed);
        assert_eq!(follow_user(&store, leo, ann).unwrap(), FollowOutcome::AlreadyFollowing);
        assert_eq!(store.count_follows().unwrap(), 1);
    }

    #[test]
    fn follow_unfollow_cycles_return_to_baseline() {
        let (store, leo, ann) = store_with_two_users();
        follow_user(&store, ann, leo).unwrap();
        let baseline = store.count_follows().unwrap();

        for _ in 0..5 {
            follow_user(&store, leo, ann).unwrap();
            unfollow_user(&store, leo, ann).unwrap();
        }
        assert_eq!(store.count_follows().unwrap(), baseline);
        assert_eq!(unfollow_user(&store, leo, ann).unwrap(), UnfollowOutcome::NotFollowing);
    }

    #[test]
    fn concurrent_follows_create_one_edge() {
        let (store, leo, ann) = store_with_two_users();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || follow_user(&store, leo, ann).unwrap())
            })
            .collect();

        let outcomes: Vec<FollowOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(outcomes.iter().filter(|o| **o == FollowOutcome::Followed).count(), 1);
        assert_eq!(store.count_follows().unwrap(), 1);
        assert_eq!(store.followed_authors(leo).unwrap(), vec![ann]);
    }
}
