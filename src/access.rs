use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Action, PermissionType, Post, Tag};

/// Returns true if the user holds any relation to the database.
pub fn has_any_relation(store: &dyn Store, user_id: i64, database_id: i64) -> Result<bool> {
    Ok(store.get_relation(user_id, database_id)?.is_some())
}

/// Returns true if the user owns the database.
pub fn is_owner(store: &dyn Store, user_id: i64, database_id: i64) -> Result<bool> {
    Ok(store.get_relation(user_id, database_id)? == Some(PermissionType::Owner))
}

/// Checks that the user may perform `action` on the database.
///
/// Reads need any relation and fail with `Error::Forbidden`. Every other
/// action needs ownership and fails with `Error::UserNotOwner`, whether the
/// user is a viewer or holds no relation at all.
pub fn require_access(
    store: &dyn Store,
    user_id: i64,
    database_id: i64,
    action: Action,
) -> Result<()> {
    if action == Action::Read {
        if !has_any_relation(store, user_id, database_id)? {
            return Err(Error::Forbidden);
        }
        return Ok(());
    }

    if !is_owner(store, user_id, database_id)? {
        return Err(Error::UserNotOwner);
    }
    Ok(())
}

/// Resolves the post's database and checks `action` against it.
pub fn require_post_access(
    store: &dyn Store,
    user_id: i64,
    post_id: i64,
    action: Action,
) -> Result<Post> {
    let post = store.get_post(post_id)?.ok_or(Error::NotFound)?;
    require_access(store, user_id, post.database_id, action)?;
    Ok(post)
}

/// Resolves a tag through the databases where it is known. Users with no
/// relation to any of them are refused with `Error::Forbidden`.
pub fn require_tag_access(
    store: &dyn Store,
    user_id: i64,
    tag_id: i64,
    action: Action,
) -> Result<Tag> {
    let tag = store.get_tag(tag_id)?.ok_or(Error::NotFound)?;
    let relations = store.list_tag_relations(tag_id, user_id)?;

    if relations.is_empty() {
        return Err(Error::Forbidden);
    }
    if !relations.iter().any(|p| p.allows(action)) {
        return Err(Error::UserNotOwner);
    }
    Ok(tag)
}

/// A tag may only be deleted by an owner of a database where it is known.
pub fn require_tag_delete(store: &dyn Store, user_id: i64, tag_id: i64) -> Result<Tag> {
    require_tag_access(store, user_id, tag_id, Action::DeleteTag)
}
