use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_PACING_MS: u64 = 500;

/// Process configuration, read once at start-up.
///
/// A missing API key is not an error here: the Gemini client reports it on
/// every call so it shows up as failed tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct StudioConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub image_model: String,
    pub pacing_delay: Duration,
    pub request_timeout: Option<Duration>,
    pub presets_path: Option<PathBuf>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            pacing_delay: Duration::from_millis(DEFAULT_PACING_MS),
            request_timeout: None,
            presets_path: None,
        }
    }
}

impl StudioConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes `env::var`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let api_key = get("GEMINI_API_KEY")
            .or_else(|| get("GOOGLE_API_KEY"))
            .or_else(|| get("API_KEY"));
        let api_base = get("GEMINI_API_BASE")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base);
        let image_model = get("STUDIO_IMAGE_MODEL").unwrap_or(defaults.image_model);
        let pacing_delay = match get("STUDIO_PACING_MS").map(|raw| raw.parse::<u64>()) {
            Some(Ok(ms)) => Duration::from_millis(ms),
            Some(Err(_)) => {
                log::warn!("STUDIO_PACING_MS is not a whole number of milliseconds; using default");
                defaults.pacing_delay
            }
            None => defaults.pacing_delay,
        };
        let request_timeout = get("STUDIO_REQUEST_TIMEOUT_SECS").and_then(|raw| {
            let timeout = raw.parse::<f64>().ok().and_then(timeout_from_secs);
            if timeout.is_none() {
                log::warn!("STUDIO_REQUEST_TIMEOUT_SECS is not a usable number of seconds; no timeout");
            }
            timeout
        });
        let presets_path = get("STUDIO_PRESETS_PATH").map(PathBuf::from);

        Self {
            api_key,
            api_base,
            image_model,
            pacing_delay,
            request_timeout,
            presets_path,
        }
    }
}

/// Positive, finite seconds that fit a `Duration`; anything else is `None`.
pub fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::{timeout_from_secs, StudioConfig, DEFAULT_API_BASE, DEFAULT_IMAGE_MODEL};

    fn config_from(pairs: &[(&str, &str)]) -> StudioConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        StudioConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config_from(&[]);
        assert_eq!(config, StudioConfig::default());
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.image_model, DEFAULT_IMAGE_MODEL);
        assert_eq!(config.pacing_delay, Duration::from_millis(500));
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn api_key_falls_back_through_known_names() {
        assert_eq!(
            config_from(&[("API_KEY", "generic"), ("GOOGLE_API_KEY", "google")]).api_key,
            Some("google".to_string())
        );
        assert_eq!(
            config_from(&[("API_KEY", "generic"), ("GEMINI_API_KEY", "  ")]).api_key,
            Some("generic".to_string())
        );
    }

    #[test]
    fn overrides_are_parsed_and_trimmed() {
        let config = config_from(&[
            ("GEMINI_API_BASE", "http://localhost:8080/v1beta/"),
            ("STUDIO_IMAGE_MODEL", "gemini-3-pro-image-preview"),
            ("STUDIO_PACING_MS", "0"),
            ("STUDIO_REQUEST_TIMEOUT_SECS", "2.5"),
            ("STUDIO_PRESETS_PATH", "/etc/studio/presets.json"),
        ]);
        assert_eq!(config.api_base, "http://localhost:8080/v1beta");
        assert_eq!(config.image_model, "gemini-3-pro-image-preview");
        assert_eq!(config.pacing_delay, Duration::ZERO);
        assert_eq!(config.request_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(
            config.presets_path.as_deref().and_then(|path| path.to_str()),
            Some("/etc/studio/presets.json")
        );
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let config = config_from(&[
            ("STUDIO_PACING_MS", "fast"),
            ("STUDIO_REQUEST_TIMEOUT_SECS", "-1"),
        ]);
        assert_eq!(config.pacing_delay, Duration::from_millis(500));
        assert_eq!(config.request_timeout, None);

        for raw in ["1e30", "inf", "NaN", "0"] {
            let config = config_from(&[("STUDIO_REQUEST_TIMEOUT_SECS", raw)]);
            assert_eq!(config.request_timeout, None, "{raw}");
        }
        assert_eq!(timeout_from_secs(1e30), None);
        assert_eq!(timeout_from_secs(0.25), Some(Duration::from_millis(250)));
    }
}
