use serde::Deserialize;

/// Runtime configuration, layered from an optional TOML file and `DRIZZLE_*`
/// environment variables over the defaults below.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: String,
    pub cors_allowed_origins: Vec<String>,
    pub moisture_threshold: f64,
    pub history_capacity: usize,
    pub weather: WeatherConfig,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub url: String,
    pub interval_secs: u64,
    pub mock_after_secs: u64,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: "0.0.0.0:3000".to_owned(),
            cors_allowed_origins: vec!["*".to_owned()],
            moisture_threshold: 40.0,
            history_capacity: 24,
            weather: WeatherConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        WeatherConfig {
            latitude: 8.4966,
            longitude: 4.5421,
            timeout_secs: 10,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            url: "http://127.0.0.1:3000".to_owned(),
            interval_secs: 5,
            mock_after_secs: 30,
            timeout_secs: 10,
        }
    }
}

impl Config {
    /// A missing file is fine; environment variables still apply on top of the
    /// defaults.
    pub fn load(path: &str) -> Result<Config, failure::Error> {
        let mut settings = config::Config::new();
        settings.merge(config::File::with_name(path).required(false))?;
        settings.merge(config::Environment::with_prefix("DRIZZLE"))?;
        let config = settings.try_into()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.listen, "0.0.0.0:3000");
        assert_eq!(config.moisture_threshold, 40.0);
        assert_eq!(config.history_capacity, 24);
        assert_eq!(config.cors_allowed_origins, vec!["*".to_owned()]);
        assert_eq!(config.watch.interval_secs, 5);
        assert_eq!(config.watch.mock_after_secs, 30);
    }

    #[test]
    fn load_without_file_yields_defaults() {
        let config = Config::load("does-not-exist").expect("load");
        assert_eq!(config.listen, Config::default().listen);
        assert_eq!(config.weather.timeout_secs, 10);
    }
}
