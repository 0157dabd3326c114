use serde::{Deserialize, Serialize};
use tiercache_cache::{CacheOptions, CacheStats, KeyScope};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.iter().any(|tag| tag.trim().is_empty()) {
        let mut error = ValidationError::new("empty_tag");
        error.message = Some("tags must not be empty".into());
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PutEntryDto {
    /// Any JSON value; stored verbatim.
    #[schema(value_type = Object)]
    pub value: serde_json::Value,
    /// Expiry in seconds, at most one year. The service default applies when omitted.
    #[validate(range(min = 1, max = 31_536_000, message = "ttl_seconds must be between 1 and 31536000"))]
    pub ttl_seconds: Option<u64>,
    #[serde(default)]
    #[validate(
        length(max = 32, message = "at most 32 tags are allowed"),
        custom(function = "validate_tags")
    )]
    pub tags: Vec<String>,
    #[validate(length(min = 1, max = 128, message = "tenant_id must be 1-128 characters"))]
    pub tenant_id: Option<String>,
}

impl PutEntryDto {
    pub fn options(&self) -> CacheOptions {
        let mut options = CacheOptions::new().tags(self.tags.iter().cloned());
        if let Some(seconds) = self.ttl_seconds {
            options = options.ttl_secs(seconds);
        }
        if let Some(tenant_id) = &self.tenant_id {
            options = options.tenant(tenant_id.clone());
        }
        options
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TenantQuery {
    /// Tenant whose key space to use; omitted means the shared key space.
    pub tenant_id: Option<String>,
}

impl TenantQuery {
    pub fn scope(&self) -> KeyScope {
        match &self.tenant_id {
            Some(tenant_id) => KeyScope::tenant(tenant_id.clone()),
            None => KeyScope::default(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EntryResponse {
    pub key: String,
    #[schema(value_type = Object)]
    pub value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Entries held by the in-process store.
    pub entry_count: usize,
    pub max_entries: usize,
    /// `redis`, `http_kv` or `memory`.
    pub active_backend: String,
    pub hits: u64,
    pub misses: u64,
    pub fallbacks: u64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            entry_count: stats.entry_count,
            max_entries: stats.max_entries,
            active_backend: stats.active_backend.as_str().to_string(),
            hits: stats.hits,
            misses: stats.misses,
            fallbacks: stats.fallbacks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn dto(body: serde_json::Value) -> PutEntryDto {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_options_from_dto() {
        let options = dto(json!({
            "value": {"name": "Ana"},
            "ttl_seconds": 5,
            "tags": ["user:42"],
            "tenant_id": "acme"
        }))
        .options();

        assert_eq!(options.ttl, Some(Duration::from_secs(5)));
        assert_eq!(options.tags, vec!["user:42".to_string()]);
        assert_eq!(options.scope, KeyScope::tenant("acme"));
    }

    #[test]
    fn test_zero_ttl_and_blank_tag_rejected() {
        assert!(dto(json!({"value": 1, "ttl_seconds": 0})).validate().is_err());
        assert!(dto(json!({"value": 1, "tags": [" "]})).validate().is_err());
        assert!(dto(json!({"value": 1})).validate().is_ok());
    }
}
