use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use uuid::Uuid;

use crate::config::*;
use crate::core::errors::{StoreError, StoreResult};
use crate::core::helpers::{hash_password, now};
use crate::core::kv::{KeyValue, KeyValueJson};
use crate::models::models::Followings;
use crate::models::{Comment, Follow, Group, ImageUpload, Post, TokenData, User};

/// Fields of a post that its author controls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostFields {
    pub text: String,
    pub group_id: Option<u64>,
    pub image: Option<ImageUpload>,
}

fn slug_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("Regex should compile"))
}

/// Typed access to users, groups, posts, comments and follow edges.
///
/// Referential rules: removing a user removes their posts, comments and
/// follow edges; removing a post removes its comments; removing a group
/// detaches its posts.
pub struct EntityStore {
    kv: Arc<dyn KeyValue>,
    // Serializes read-modify-write of the index lists within this process.
    write_lock: Mutex<()>,
}

impl EntityStore {
    pub fn new(kv: Arc<dyn KeyValue>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    pub fn kv(&self) -> &dyn KeyValue {
        self.kv.as_ref()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Backend("write lock poisoned".to_string()))
    }

    fn next_id(&self, kind: &str) -> StoreResult<u64> {
        let key = sequence_key(kind);
        let next = self.kv.get_json::<u64>(&key)?.unwrap_or(0) + 1;
        self.kv.set_json(&key, &next)?;
        Ok(next)
    }

    fn id_list(&self, key: &str) -> StoreResult<Vec<u64>> {
        Ok(self.kv.get_json(key)?.unwrap_or_default())
    }

    fn push_id(&self, key: &str, id: u64) -> StoreResult<()> {
        let mut ids = self.id_list(key)?;
        if !ids.contains(&id) {
            ids.push(id);
            self.kv.set_json(key, &ids)?;
        }
        Ok(())
    }

    fn remove_id(&self, key: &str, id: u64) -> StoreResult<()> {
        let mut ids = self.id_list(key)?;
        let before = ids.len();
        ids.retain(|other| *other != id);
        if ids.len() != before {
            self.kv.set_json(key, &ids)?;
        }
        Ok(())
    }

    fn load_all<T: serde::de::DeserializeOwned>(
        &self,
        list_key: &str,
        key_of: fn(u64) -> String,
    ) -> StoreResult<Vec<T>> {
        let mut out = Vec::new();
        for id in self.id_list(list_key)? {
            if let Some(item) = self.kv.get_json::<T>(&key_of(id))? {
                out.push(item);
            }
        }
        Ok(out)
    }

    // === Users ===

    pub fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<User> {
        let _guard = self.lock()?;
        if self.kv.exists(&username_key(username))? {
            return Err(StoreError::UniqueViolation(format!("username {}", username)));
        }
        let id = self.next_id("user")?;

        if !self.kv.insert_new(&username_key(username), &serde_json::to_vec(&id)?)? {
            return Err(StoreError::UniqueViolation(format!("username {}", username)));
        }

        let user = User {
            id,
            username: username.to_string(),
            password: password_hash.to_string(),
            created_at: now(),
        };
        self.kv.set_json(&user_key(id), &user)?;
        self.push_id(USERS_LIST_KEY, id)?;

        tracing::info!(user_id = id, %username, "user created");
        Ok(user)
    }

    pub fn get_user(&self, id: u64) -> StoreResult<Option<User>> {
        self.kv.get_json(&user_key(id))
    }

    pub fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        match self.kv.get_json::<u64>(&username_key(username))? {
            Some(id) => self.get_user(id),
            None => Ok(None),
        }
    }

    pub fn list_users(&self) -> StoreResult<Vec<User>> {
        self.load_all(USERS_LIST_KEY, user_key)
    }

    /// Removes the user together with everything they own.
    pub fn delete_user(&self, id: u64) -> StoreResult<()> {
        let user = self
            .get_user(id)?
            .ok_or_else(|| StoreError::NotFound { kind: "user", id: id.to_string() })?;

        for post in self.posts_by_author(id)? {
            self.delete_post(post.id)?;
        }

        for post in self.all_posts()? {
            for comment in self.comments_for_post(post.id)? {
                if comment.author_id == id {
                    self.delete_comment(comment.id)?;
                }
            }
        }

        for author_id in self.followed_authors(id)? {
            self.delete_follow(id, author_id)?;
        }
        for follower_id in self.followers_of(id)? {
            self.delete_follow(follower_id, id)?;
        }

        for key in self.kv.get_keys()? {
            if !key.starts_with("token:") {
                continue;
            }
            if let Some(token) = self.kv.get_json::<TokenData>(&key)? {
                if token.user_id == id {
                    self.kv.delete(&key)?;
                }
            }
        }

        let _guard = self.lock()?;
        self.kv.delete(&username_key(&user.username))?;
        self.kv.delete(&user_key(id))?;
        self.remove_id(USERS_LIST_KEY, id)?;

        tracing::info!(user_id = id, "user deleted");
        Ok(())
    }

    // === Groups ===

    pub fn create_group(&self, title: &str, slug: &str, description: &str) -> StoreResult<Group> {
        if title.trim().is_empty() || title.chars().count() > MAX_GROUP_TITLE_LENGTH {
            return Err(StoreError::Invalid(format!("group title {:?}", title)));
        }
        if !slug_regex().is_match(slug) {
            return Err(StoreError::Invalid(format!("group slug {:?}", slug)));
        }

        let _guard = self.lock()?;
        let id = self.next_id("group")?;
        let id_bytes = serde_json::to_vec(&id)?;

        if !self.kv.insert_new(&group_slug_key(slug), &id_bytes)? {
            return Err(StoreError::UniqueViolation(format!("group slug {}", slug)));
        }
        if !self.kv.insert_new(&group_title_key(title), &id_bytes)? {
            self.kv.delete(&group_slug_key(slug))?;
            return Err(StoreError::UniqueViolation(format!("group title {}", title)));
        }

        let group = Group {
            id,
            title: title.to_string(),
            slug: slug.to_string(),
            description: description.to_string(),
        };
        self.kv.set_json(&group_key(id), &group)?;
        self.push_id(GROUPS_LIST_KEY, id)?;

        tracing::info!(group_id = id, %slug, "group created");
        Ok(group)
    }

    pub fn get_group(&self, id: u64) -> StoreResult<Option<Group>> {
        self.kv.get_json(&group_key(id))
    }

    pub fn find_group_by_slug(&self, slug: &str) -> StoreResult<Option<Group>> {
        match self.kv.get_json::<u64>(&group_slug_key(slug))? {
            Some(id) => self.get_group(id),
            None => Ok(None),
        }
    }

    /// All groups, ordered by title.
    pub fn list_groups(&self) -> StoreResult<Vec<Group>> {
        let mut groups: Vec<Group> = self.load_all(GROUPS_LIST_KEY, group_key)?;
        groups.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(groups)
    }

    /// Removes the group; its posts stay, without a group.
    pub fn delete_group(&self, id: u64) -> StoreResult<()> {
        let group = self
            .get_group(id)?
            .ok_or_else(|| StoreError::NotFound { kind: "group", id: id.to_string() })?;

        let _guard = self.lock()?;
        for mut post in self.all_posts()? {
            if post.group_id == Some(id) {
                post.group_id = None;
                self.kv.set_json(&post_key(post.id), &post)?;
            }
        }

        self.kv.delete(&group_slug_key(&group.slug))?;
        self.kv.delete(&group_title_key(&group.title))?;
        self.kv.delete(&group_key(id))?;
        self.remove_id(GROUPS_LIST_KEY, id)?;

        tracing::info!(group_id = id, "group deleted");
        Ok(())
    }

    // === Posts ===

    pub fn create_post(&self, author_id: u64, fields: PostFields) -> StoreResult<Post> {
        self.create_post_at(author_id, fields, now())
    }

    /// Like `create_post`, with an explicit creation time.
    pub fn create_post_at(
        &self,
        author_id: u64,
        fields: PostFields,
        created_at: DateTime<Utc>,
    ) -> StoreResult<Post> {
        if self.get_user(author_id)?.is_none() {
            return Err(StoreError::NotFound { kind: "user", id: author_id.to_string() });
        }

        let image = match &fields.image {
            Some(upload) => Some(self.save_media(upload)?),
            None => None,
        };

        let _guard = self.lock()?;
        let id = self.next_id("post")?;
        let post = Post {
            id,
            text: fields.text,
            author_id,
            group_id: fields.group_id,
            image,
            created_at,
            updated_at: None,
        };

        self.kv.set_json(&post_key(id), &post)?;
        self.push_id(FEED_KEY, id)?;

        tracing::info!(post_id = id, author_id, group_id = ?post.group_id, "post created");
        Ok(post)
    }

    pub fn get_post(&self, id: u64) -> StoreResult<Option<Post>> {
        self.kv.get_json(&post_key(id))
    }

    /// Replaces text and group; the picture is replaced only when a new one
    /// is supplied.
    pub fn update_post(&self, id: u64, fields: PostFields) -> StoreResult<Post> {
        let mut post = self
            .get_post(id)?
            .ok_or_else(|| StoreError::NotFound { kind: "post", id: id.to_string() })?;

        if let Some(upload) = &fields.image {
            let path = self.save_media(upload)?;
            if let Some(old) = post.image.replace(path) {
                self.kv.delete(&media_key(&old))?;
            }
        }

        post.text = fields.text;
        post.group_id = fields.group_id;
        post.updated_at = Some(now());
        self.kv.set_json(&post_key(id), &post)?;

        tracing::info!(post_id = id, "post updated");
        Ok(post)
    }

    pub fn delete_post(&self, id: u64) -> StoreResult<()> {
        let post = self
            .get_post(id)?
            .ok_or_else(|| StoreError::NotFound { kind: "post", id: id.to_string() })?;

        for comment_id in self.id_list(&post_comments_key(id))? {
            self.kv.delete(&comment_key(comment_id))?;
        }
        self.kv.delete(&post_comments_key(id))?;

        if let Some(path) = &post.image {
            self.kv.delete(&media_key(path))?;
        }

        let _guard = self.lock()?;
        self.kv.delete(&post_key(id))?;
        self.remove_id(FEED_KEY, id)?;

        tracing::info!(post_id = id, "post deleted");
        Ok(())
    }

    /// Every post in insertion order.
    pub fn all_posts(&self) -> StoreResult<Vec<Post>> {
        self.load_all(FEED_KEY, post_key)
    }

    pub fn posts_by_author(&self, author_id: u64) -> StoreResult<Vec<Post>> {
        Ok(self
            .all_posts()?
            .into_iter()
            .filter(|p| p.author_id == author_id)
            .collect())
    }

    pub fn posts_by_group(&self, group_id: u64) -> StoreResult<Vec<Post>> {
        Ok(self
            .all_posts()?
            .into_iter()
            .filter(|p| p.group_id == Some(group_id))
            .collect())
    }

    /// Posts whose author is followed by `user_id`.
    pub fn posts_by_followed(&self, user_id: u64) -> StoreResult<Vec<Post>> {
        let authors = self.followed_authors(user_id)?;
        Ok(self
            .all_posts()?
            .into_iter()
            .filter(|p| authors.contains(&p.author_id))
            .collect())
    }

    pub fn count_posts_by_author(&self, author_id: u64) -> StoreResult<usize> {
        Ok(self.posts_by_author(author_id)?.len())
    }

    // === Comments ===

    pub fn create_comment(&self, post_id: u64, author_id: u64, text: &str) -> StoreResult<Comment> {
        if self.get_post(post_id)?.is_none() {
            return Err(StoreError::NotFound { kind: "post", id: post_id.to_string() });
        }
        if self.get_user(author_id)?.is_none() {
            return Err(StoreError::NotFound { kind: "user", id: author_id.to_string() });
        }

        let _guard = self.lock()?;
        let id = self.next_id("comment")?;
        let comment = Comment {
            id,
            post_id,
            author_id,
            text: text.to_string(),
            created_at: now(),
        };
        self.kv.set_json(&comment_key(id), &comment)?;
        self.push_id(&post_comments_key(post_id), id)?;

        tracing::info!(comment_id = id, post_id, author_id, "comment created");
        Ok(comment)
    }

    /// Comments of a post, newest first.
    pub fn comments_for_post(&self, post_id: u64) -> StoreResult<Vec<Comment>> {
        let mut comments = Vec::new();
        for id in self.id_list(&post_comments_key(post_id))? {
            if let Some(c) = self.kv.get_json::<Comment>(&comment_key(id))? {
                comments.push(c);
            }
        }
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(comments)
    }

    pub fn delete_comment(&self, id: u64) -> StoreResult<()> {
        let comment = self
            .kv
            .get_json::<Comment>(&comment_key(id))?
            .ok_or_else(|| StoreError::NotFound { kind: "comment", id: id.to_string() })?;

        let _guard = self.lock()?;
        self.kv.delete(&comment_key(id))?;
        self.remove_id(&post_comments_key(comment.post_id), id)?;
        Ok(())
    }

    // === Follows ===

    /// Creates the (user, author) edge. A second insert of the same pair fails
    /// with `UniqueViolation`.
    pub fn insert_follow(&self, user_id: u64, author_id: u64) -> StoreResult<Follow> {
        let follow = Follow {
            user_id,
            author_id,
            created_at: now(),
        };

        if !self
            .kv
            .insert_new(&follow_key(user_id, author_id), &serde_json::to_vec(&follow)?)?
        {
            return Err(StoreError::UniqueViolation(format!(
                "follow {} -> {}",
                user_id, author_id
            )));
        }
        Ok(follow)
    }

    /// Returns whether an edge was removed.
    pub fn delete_follow(&self, user_id: u64, author_id: u64) -> StoreResult<bool> {
        let key = follow_key(user_id, author_id);
        let existed = self.kv.exists(&key)?;
        self.kv.delete(&key)?;
        Ok(existed)
    }

    pub fn is_following(&self, user_id: u64, author_id: u64) -> StoreResult<bool> {
        self.kv.exists(&follow_key(user_id, author_id))
    }

    /// Authors `user_id` follows, read from the follow edges themselves.
    pub fn followed_authors(&self, user_id: u64) -> StoreResult<Followings> {
        let prefix = format!("follow:{}:", user_id);
        let mut authors: Followings = self
            .kv
            .get_keys()?
            .iter()
            .filter(|key| key.starts_with(&prefix))
            .filter_map(|key| parse_follow_key(key))
            .map(|(_, author)| author)
            .collect();
        authors.sort_unstable();
        Ok(authors)
    }

    pub fn followers_of(&self, author_id: u64) -> StoreResult<Vec<u64>> {
        let mut followers: Vec<u64> = self
            .follow_keys()?
            .iter()
            .filter_map(|key| parse_follow_key(key))
            .filter(|(_, author)| *author == author_id)
            .map(|(user, _)| user)
            .collect();
        followers.sort_unstable();
        Ok(followers)
    }

    pub fn count_follows(&self) -> StoreResult<usize> {
        Ok(self.follow_keys()?.len())
    }

    fn follow_keys(&self) -> StoreResult<Vec<String>> {
        Ok(self
            .kv
            .get_keys()?
            .into_iter()
            .filter(|k| k.starts_with("follow:"))
            .collect())
    }

    // === Media ===

    /// Stores the picture and returns its media path (`posts/<name>`).
    pub fn save_media(&self, upload: &ImageUpload) -> StoreResult<String> {
        let clean: String = upload
            .name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
            .collect();
        if clean.is_empty() {
            return Err(StoreError::Invalid(format!("file name {:?}", upload.name)));
        }

        let mut path = format!("posts/{}", clean);
        if self.kv.exists(&media_key(&path))? {
            let suffix = Uuid::new_v4().simple().to_string();
            path = format!("posts/{}_{}", &suffix[..7], clean);
        }

        self.kv.set(&media_key(&path), &upload.data)?;
        Ok(path)
    }

    pub fn load_media(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        self.kv.get(&media_key(path))
    }

    // === Demo data ===

    /// Populates an empty store with a few users, a group and posts.
    /// Does nothing once the demo user exists.
    pub fn seed_demo_data(&self) -> anyhow::Result<()> {
        if self.find_user_by_username("leo")?.is_some() {
            return Ok(());
        }

        let leo = self.create_user("leo", &hash_password("leo")?)?;
        let ann = self.create_user("ann", &hash_password("ann")?)?;
        self.create_user("test", &hash_password("test")?)?;

        let cats = match self.find_group_by_slug("cats")? {
            Some(group) => group,
            None => self.create_group("Cats", "cats", "Everything about cats")?,
        };

        self.create_post(
            leo.id,
            PostFields {
                text: "This is my first post here!".to_string(),
                ..Default::default()
            },
        )?;
        self.create_post(
            ann.id,
            PostFields {
                text: "Our cat learned to open the fridge. Send help.".to_string(),
                group_id: Some(cats.id),
                image: None,
            },
        )?;

        match self.insert_follow(leo.id, ann.id) {
            Ok(_) | Err(StoreError::UniqueViolation(_)) => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!("demo data seeded");
        Ok(())
    }
}

fn parse_follow_key(key: &str) -> Option<(u64, u64)> {
    let mut parts = key.strip_prefix("follow:")?.split(':');
    let user = parts.next()?.parse().ok()?;
    let author = parts.next()?.parse().ok()?;
    Some((user, author))
}
