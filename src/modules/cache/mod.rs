pub mod controller;
pub mod model;
pub mod router;

pub use model::*;
pub use router::init_cache_router;

/// Tag carried by every cached `GET /api/cache/entries/{key}` response.
/// Writes through the API drop them all.
pub const ENTRY_RESPONSES_TAG: &str = "api:cache-entries";
