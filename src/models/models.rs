use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Group {
    pub id: u64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    pub id: u64,
    pub text: String,
    pub author_id: u64,
    pub group_id: Option<u64>,
    /// Media path of the attached picture, e.g. `posts/cat.gif`.
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Short label used in titles and logs.
    pub fn preview(&self) -> String {
        self.text.chars().take(15).collect()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Comment {
    pub id: u64,
    pub post_id: u64,
    pub author_id: u64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Follow {
    pub user_id: u64,
    pub author_id: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
pub struct TokenData {
    pub user_id: u64,
    pub created_at: String,
}

/// Uploaded picture as submitted with a post form.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageUpload {
    pub name: String,
    pub data: Vec<u8>,
}

pub type Followings = Vec<u64>;
