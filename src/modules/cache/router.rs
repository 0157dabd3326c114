use axum::{
    Router, middleware,
    routing::{delete, get},
};
use tiercache_cache::{ResponseCache, response_cache_middleware};

use crate::state::AppState;

use super::controller::{
    clear_cache, delete_entry, get_entry, get_stats, invalidate_tag, put_entry,
};

pub fn init_cache_router(responses: ResponseCache) -> Router<AppState> {
    Router::new()
        .route("/", delete(clear_cache))
        .route("/stats", get(get_stats))
        .route(
            "/entries/{key}",
            get(get_entry)
                .route_layer(middleware::from_fn_with_state(
                    responses,
                    response_cache_middleware,
                ))
                .put(put_entry)
                .delete(delete_entry),
        )
        .route("/tags/{tag}", delete(invalidate_tag))
}
