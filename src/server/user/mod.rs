mod databases;
mod posts;
mod tags;
mod viewers;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::server::AppState;

pub fn user_router() -> Router<Arc<AppState>> {
    Router::new()
        // Databases
        .route("/databases", get(databases::list_databases))
        .route("/databases", post(databases::create_database))
        .route("/databases/owned", get(databases::list_owned_databases))
        .route("/databases/{id}", delete(databases::delete_database))
        // Database roster
        .route("/databases/{id}/viewers", get(viewers::list_viewers))
        .route("/databases/{id}/viewers", post(viewers::add_viewer))
        .route(
            "/databases/{id}/viewers/{user_id}",
            delete(viewers::remove_viewer),
        )
        // Posts
        .route("/posts", post(posts::create_post))
        .route(
            "/posts/{id}",
            get(posts::get_post)
                .patch(posts::update_post)
                .delete(posts::delete_post),
        )
        // Post tags (many-to-many)
        .route("/posts/{id}/tags", get(posts::list_post_tags))
        .route("/posts/{id}/tags", post(posts::add_post_tag))
        .route("/posts/{id}/tags/{tag_id}", delete(posts::remove_post_tag))
        // Tags
        .route("/tags", get(tags::list_tags))
        .route("/tags/{id}", get(tags::get_tag))
        .route("/tags/{id}", delete(tags::delete_tag))
        .route("/tags/{id}/posts", get(tags::list_tag_posts))
}
