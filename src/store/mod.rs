mod schema;
mod sqlite;
mod tag;

pub use sqlite::SqliteStore;
pub use tag::canonicalize_tag;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    /// Fails with `Error::UserConflict` naming every taken identifier.
    fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<i64>;
    fn get_user(&self, id: i64) -> Result<Option<User>>;
    /// Looks a user up by email or name.
    fn get_user_by_identifier(&self, identifier: &str) -> Result<Option<User>>;

    // Session operations
    fn create_session(&self, session: &Session) -> Result<()>;
    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>>;
    fn delete_session(&self, id: &str) -> Result<bool>;

    // Database operations
    fn create_database(&self, owner_id: i64, name: &str) -> Result<i64>;
    fn list_databases_for_user(&self, user_id: i64) -> Result<Vec<DatabaseWithPosts>>;
    fn list_owned_databases(&self, user_id: i64) -> Result<Vec<OwnedDatabase>>;
    /// Deletes the database and everything hanging off it. Fails with
    /// `Error::UserNotOwner` and changes nothing unless `acting_user_id` owns it.
    fn delete_database(&self, database_id: i64, acting_user_id: i64) -> Result<()>;

    // Roster operations
    fn get_relation(&self, user_id: i64, database_id: i64) -> Result<Option<PermissionType>>;
    fn list_database_viewers(&self, database_id: i64) -> Result<Vec<Viewer>>;
    fn add_viewer_by_email(
        &self,
        database_id: i64,
        email: &str,
        acting_user_id: i64,
    ) -> Result<User>;
    /// Removes a viewer relation. Owner relations are never touched.
    fn remove_viewer(
        &self,
        database_id: i64,
        target_user_id: i64,
        acting_user_id: i64,
    ) -> Result<bool>;

    // Post operations
    fn create_post(&self, title: &str, content: &str, database_id: i64) -> Result<i64>;
    /// Inserts the post and links its tags in one transaction.
    fn create_tagged_post(
        &self,
        title: &str,
        content: &str,
        database_id: i64,
        titles: &[String],
    ) -> Result<i64>;
    fn get_post(&self, id: i64) -> Result<Option<Post>>;
    fn edit_post(&self, id: i64, title: &str, content: &str) -> Result<()>;
    fn delete_post(&self, id: i64) -> Result<bool>;

    // Tag operations
    fn get_or_create_tag(&self, raw_title: &str) -> Result<i64>;
    fn get_tag(&self, id: i64) -> Result<Option<Tag>>;
    fn attach_tags(&self, post_id: i64, database_id: i64, titles: &[String]) -> Result<()>;
    fn list_tags_for_post(&self, post_id: i64) -> Result<Vec<Tag>>;
    fn list_tags_for_user(&self, user_id: i64) -> Result<Vec<DatabaseTag>>;
    fn list_posts_for_tag(&self, tag_id: i64, user_id: i64) -> Result<Vec<PostWithTags>>;
    fn remove_tag_from_post(&self, tag_id: i64, post_id: i64) -> Result<()>;
    /// Returns the relations `user_id` holds on databases where the tag is known.
    fn list_tag_relations(&self, tag_id: i64, user_id: i64) -> Result<Vec<PermissionType>>;
    fn delete_tag(&self, id: i64) -> Result<bool>;
}
