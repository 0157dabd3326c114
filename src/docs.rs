use utoipa::OpenApi;

use crate::modules::cache::model::{EntryResponse, PutEntryDto, StatsResponse};
use crate::modules::health::HealthResponse;
use crate::utils::errors::ErrorResponse;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::health::controller::health_check,
        crate::modules::cache::controller::get_stats,
        crate::modules::cache::controller::get_entry,
        crate::modules::cache::controller::put_entry,
        crate::modules::cache::controller::delete_entry,
        crate::modules::cache::controller::invalidate_tag,
        crate::modules::cache::controller::clear_cache,
    ),
    components(
        schemas(
            HealthResponse,
            PutEntryDto,
            EntryResponse,
            StatsResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Health", description = "Liveness and active backend"),
        (name = "Cache", description = "Cache entries, tag invalidation and statistics")
    ),
    info(
        title = "Tiercache API",
        version = "0.1.0",
        description = "Operational API for a tag-aware cache with Redis, HTTP key-value and in-process backends.",
        license(
            name = "MIT"
        )
    )
)]
pub struct ApiDoc;
