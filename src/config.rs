//! Runtime configuration, sourced from the environment the way spec.md §6
//! prescribes. Mirrors the teacher's `AppConfig` (`config.rs`) in shape — a
//! plain struct with defaulted optional fields and one constructor — but
//! reads environment variables instead of an ini file, since a relay has
//! no per-project config file to sit next to.
use std::env;
use std::net::IpAddr;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_CORS_ORIGIN: &str = "*";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub bind: IpAddr,
    pub cors_origin: String,
    pub log_level: String,
}

impl AppConfig {
    /// Reads `SYNCPAD_PORT`, `SYNCPAD_BIND`, `SYNCPAD_CORS_ORIGIN` and
    /// `SYNCPAD_LOG` from the environment, falling back to the documented
    /// defaults for anything unset.
    ///
    /// # Panics
    /// Panics if a variable is set to a value that fails to parse (e.g. a
    /// non-numeric `SYNCPAD_PORT`); this is treated as a misconfiguration
    /// worth failing loudly on, not silently falling back from.
    #[must_use]
    pub fn from_env() -> Self {
        let port = env::var("SYNCPAD_PORT")
            .ok()
            .map(|v| v.parse().expect("SYNCPAD_PORT must be a valid port number"))
            .unwrap_or(DEFAULT_PORT);
        let bind = env::var("SYNCPAD_BIND")
            .ok()
            .map(|v| v.parse().expect("SYNCPAD_BIND must be a valid IP address"))
            .unwrap_or_else(|| DEFAULT_BIND.parse().expect("default bind address is valid"));
        let cors_origin = env::var("SYNCPAD_CORS_ORIGIN").unwrap_or_else(|_| DEFAULT_CORS_ORIGIN.to_string());
        let log_level = env::var("SYNCPAD_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        Self { port, bind, cors_origin, log_level }
    }

    /// Overlays CLI flags (which win when present) onto environment/defaults,
    /// the same precedence the teacher gives its config file vs. CLI args.
    #[must_use]
    pub fn with_overrides(mut self, port: Option<u16>, bind: Option<IpAddr>, debug: bool) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(bind) = bind {
            self.bind = bind;
        }
        if debug {
            self.log_level = "debug".to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_is_overridden() {
        let config = AppConfig {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.parse().unwrap(),
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        };
        assert_eq!(config.port, 8080);
        assert_eq!(config.cors_origin, "*");
    }

    #[test]
    fn cli_overrides_win_over_defaults() {
        let config = AppConfig {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.parse().unwrap(),
            cors_origin: DEFAULT_CORS_ORIGIN.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
        .with_overrides(Some(9000), None, true);
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_level, "debug");
    }
}
