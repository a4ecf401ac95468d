pub mod models;

pub use models::{Comment, Follow, Group, ImageUpload, Post, TokenData, User};
