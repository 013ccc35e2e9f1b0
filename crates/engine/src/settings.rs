//! Layered settings loading
//!
//! Defaults -> optional `screener.toml` -> `SCREENER_*` environment
//! variables, each layer overriding the previous one.

use serde::Deserialize;

use screener_core::EngineConfig;

/// Upstream feed endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub base_url: String,
    /// Named feeds, each a paginated query ranked by an external criterion.
    pub sources: Vec<String>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/feeds".to_string(),
            sources: vec![
                "gainers".to_string(),
                "by-volume".to_string(),
                "newest".to_string(),
                "most-valuable".to_string(),
            ],
        }
    }
}

/// Price oracle endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub base_url: String,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.dexscreener.com/latest/dex/tokens".to_string(),
        }
    }
}

/// Complete service settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub feeds: FeedSettings,
    pub oracle: OracleSettings,
}

impl Settings {
    /// Load settings from `screener.toml` (if present) and `SCREENER_*`
    /// env vars, e.g. `SCREENER_FEEDS__BASE_URL`.
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("screener").required(false))
            .add_source(
                config::Environment::with_prefix("SCREENER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.feeds.sources.len(), 4);
        assert_eq!(settings.engine.poll_interval_ms, 10_000);
        assert!(settings.oracle.base_url.starts_with("https://"));
    }

    #[test]
    fn test_partial_toml_overrides() {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(
                r#"
                [feeds]
                base_url = "http://feeds.internal"

                [engine]
                poll_interval_ms = 5000
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.feeds.base_url, "http://feeds.internal");
        assert_eq!(settings.engine.poll_interval_ms, 5_000);
        // Untouched sections keep their defaults
        assert_eq!(settings.feeds.sources.len(), 4);
        assert_eq!(settings.engine.rate_limit.max_requests, 60);
    }
}
