use std::{env, io};

use tracing::debug;

const DEFAULT_MAPS_CONFIG_ENDPOINT: &str = "http://127.0.0.1:3000/api/maps-config";
const DEFAULT_EXPORT_ENDPOINT: &str = "http://127.0.0.1:3000/api/export";
const DEFAULT_MAP_CONTROL_URL: &str =
    "https://atlas.microsoft.com/sdk/javascript/mapcontrol/2/atlas.min.js";
const DEFAULT_DRAWING_MODULE_URL: &str =
    "https://atlas.microsoft.com/sdk/javascript/drawing/0/atlas-drawing.min.js";
const DEFAULT_STYLE_COOLDOWN_MS: u64 = 1_000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub maps_config_endpoint: String,
    pub export_endpoint: String,
    pub map_control_url: String,
    pub drawing_module_url: String,
    pub style_cooldown_ms: u64,
    pub http_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            maps_config_endpoint: parse_string(
                "MAPS_CONFIG_ENDPOINT",
                DEFAULT_MAPS_CONFIG_ENDPOINT,
            ),
            export_endpoint: parse_string("EXPORT_ENDPOINT", DEFAULT_EXPORT_ENDPOINT),
            map_control_url: parse_string("MAP_CONTROL_URL", DEFAULT_MAP_CONTROL_URL),
            drawing_module_url: parse_string("DRAWING_MODULE_URL", DEFAULT_DRAWING_MODULE_URL),
            style_cooldown_ms: parse_u64("STYLE_COOLDOWN_MS", DEFAULT_STYLE_COOLDOWN_MS),
            http_timeout_secs: parse_u64("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            maps_config_endpoint: DEFAULT_MAPS_CONFIG_ENDPOINT.into(),
            export_endpoint: DEFAULT_EXPORT_ENDPOINT.into(),
            map_control_url: DEFAULT_MAP_CONTROL_URL.into(),
            drawing_module_url: DEFAULT_DRAWING_MODULE_URL.into(),
            style_cooldown_ms: DEFAULT_STYLE_COOLDOWN_MS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_defaults_for_unset_keys() {
        env::remove_var("MAPS_CONFIG_ENDPOINT");
        env::remove_var("MAP_CONTROL_URL");

        let config = AppConfig::from_env();

        assert_eq!(config.maps_config_endpoint, DEFAULT_MAPS_CONFIG_ENDPOINT);
        assert_eq!(config.map_control_url, DEFAULT_MAP_CONTROL_URL);
        assert_eq!(config.drawing_module_url, DEFAULT_DRAWING_MODULE_URL);
    }

    // Keys here are disjoint from the defaults test above; the two run
    // in parallel against shared process environment.
    #[test]
    fn reads_overrides_from_environment() {
        env::set_var("EXPORT_ENDPOINT", "http://export.test/api/export");
        env::set_var("STYLE_COOLDOWN_MS", "250");

        let config = AppConfig::from_env();

        assert_eq!(config.export_endpoint, "http://export.test/api/export");
        assert_eq!(config.style_cooldown_ms, 250);

        env::remove_var("EXPORT_ENDPOINT");
        env::remove_var("STYLE_COOLDOWN_MS");
    }
}
