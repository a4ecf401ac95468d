use crate::core::db::EntityStore;
use crate::core::errors::{StoreError, StoreResult};
use crate::core::pagination::{Page, Paginator};
use crate::models::Post;

/// Which posts a feed shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    ByGroup(String),
    ByAuthor(String),
    /// Posts by authors the given user follows.
    ByFollowed(u64),
}

/// Newest first; equal timestamps keep insertion (id) order.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
}

pub fn select_posts(store: &EntityStore, scope: &Scope) -> StoreResult<Vec<Post>> {
    let mut posts = match scope {
        Scope::All => store.all_posts()?,
        Scope::ByGroup(slug) => {
            let group = store
                .find_group_by_slug(slug)?
                .ok_or_else(|| StoreError::NotFound { kind: "group", id: slug.clone() })?;
            store.posts_by_group(group.id)?
        }
        Scope::ByAuthor(username) => {
            let author = store
                .find_user_by_username(username)?
                .ok_or_else(|| StoreError::NotFound { kind: "user", id: username.clone() })?;
            store.posts_by_author(author.id)?
        }
        Scope::ByFollowed(user_id) => store.posts_by_followed(*user_id)?,
    };
    sort_newest_first(&mut posts);
    Ok(posts)
}

/// One page of the feed for `scope`. `page` is the raw query value.
pub fn compose_feed(
    store: &EntityStore,
    scope: &Scope,
    page: Option<&str>,
    page_size: usize,
) -> StoreResult<Page<Post>> {
    let posts = select_posts(store, scope)?;
    let page = Paginator::new(posts, page_size).get_page(page);
    tracing::debug!(?scope, page = page.number, of = page.num_pages, "feed composed");
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::PostFields;
    use crate::core::kv::MemoryKv;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn fields(text: &str, group_id: Option<u64>) -> PostFields {
        PostFields {
            text: text.to_string(),
            group_id,
            image: None,
        }
    }

    #[test]
    fn newest_first_with_id_tiebreak() {
        let store = EntityStore::new(Arc::new(MemoryKv::new()));
        let leo = store.create_user("leo", "h").unwrap();
        let t0 = Utc::now();
        let old = store.create_post_at(leo.id, fields("old", None), t0).unwrap();
        let tie_a = store
            .create_post_at(leo.id, fields("a", None), t0 + Duration::seconds(5))
            .unwrap();
        let tie_b = store
            .create_post_at(leo.id, fields("b", None), t0 + Duration::seconds(5))
            .unwrap();

        let page = compose_feed(&store, &Scope::All, None, 10).unwrap();
        let ids: Vec<u64> = page.items.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![tie_a.id, tie_b.id, old.id]);
    }

    #[test]
    fn group_scope_excludes_other_groups() {
        let store = EntityStore::new(Arc::new(MemoryKv::new()));
        let leo = store.create_user("leo", "h").unwrap();
        let g1 = store.create_group("One", "one", "").unwrap();
        let g2 = store.create_group("Two", "two", "").unwrap();
        let post = store.create_post(leo.id, fields("Новый пост", Some(g1.id))).unwrap();

        let other = compose_feed(&store, &Scope::ByGroup(g2.slug.clone()), None, 10).unwrap();
        assert!(other.items.iter().all(|p| p.id != post.id));

        let own = compose_feed(&store, &Scope::ByGroup(g1.slug.clone()), None, 10).unwrap();
        assert_eq!(own.items[0].id, post.id);
    }

    #[test]
    fn unknown_group_or_author_is_not_found() {
        let store = EntityStore::new(Arc::new(MemoryKv::new()));
        assert!(matches!(
            compose_feed(&store, &Scope::ByGroup("nope".into()), None, 10),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            compose_feed(&store, &Scope::ByAuthor("nobody".into()), None, 10),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn followed_scope_and_paging() {
        let store = EntityStore::new(Arc::new(MemoryKv::new()));
        let leo = store.create_user("leo", "h").unwrap();
        let ann = store.create_user("ann", "h").unwrap();
        for i in 0..13 {
            store.create_post(ann.id, fields(&format!("post {}", i), None)).unwrap();
        }
        store.create_post(leo.id, fields("own post", None)).unwrap();

        let empty = compose_feed(&store, &Scope::ByFollowed(leo.id), None, 10).unwrap();
        assert!(empty.is_empty());

        store.insert_follow(leo.id, ann.id).unwrap();
        let first = compose_feed(&store, &Scope::ByFollowed(leo.id), None, 10).unwrap();
        let second = compose_feed(&store, &Scope::ByFollowed(leo.id), Some("2"), 10).unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(second.len(), 3);
        assert_eq!(first.total_count, 13);
    }
}
