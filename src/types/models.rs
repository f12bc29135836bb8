use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PermissionType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub database_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub title: String,
}

/// A database as seen by one user, with every post it contains.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseWithPosts {
    #[serde(flatten)]
    pub database: Database,
    pub permission_type: PermissionType,
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Viewer {
    pub user_id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnedDatabase {
    #[serde(flatten)]
    pub database: Database,
    pub viewers: Vec<Viewer>,
}

/// A tag known in one of the user's databases.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseTag {
    #[serde(flatten)]
    pub tag: Tag,
    pub database_id: i64,
    pub database_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostWithTags {
    #[serde(flatten)]
    pub post: Post,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub token_hash: String,
    pub token_lookup: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
