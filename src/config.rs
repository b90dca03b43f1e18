use std::path::PathBuf;
use std::time::Duration;

#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum CargoEnv {
    Development,
    Production,
}

impl CargoEnv {
    pub fn is_production(&self) -> bool {
        matches!(self, CargoEnv::Production)
    }
}

#[derive(clap::Parser, Debug, Clone)]
pub struct AppConfig {
    // production or development, production hides error details from clients
    #[clap(long, env, value_enum, default_value = "development")]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "3001")]
    pub port: u16,

    #[clap(long, env, default_value = "0.0.0.0")]
    pub host: String,

    // vercel (or anything like it) owns the socket, so we only build the router
    #[clap(long, env = "VERCEL", default_value_t = false)]
    pub serverless: bool,

    // which header set from the fingerprint table gets sent upstream
    #[clap(long, env, default_value = "desustream")]
    pub upstream_provider: String,

    // optional json file that overrides or adds provider header sets, see
    // server/utils/fingerprint_utils.rs for the shape
    #[clap(long, env)]
    pub fingerprint_file: Option<PathBuf>,

    #[clap(long, env = "UPSTREAM_CONNECT_TIMEOUT_SECS", default_value = "10")]
    pub connect_timeout_secs: u64,

    // this is an idle timeout between reads, not a total one. a total timeout would cut off
    // anyone watching a full episode
    #[clap(long, env = "UPSTREAM_READ_TIMEOUT_SECS", default_value = "30")]
    pub read_timeout_secs: u64,

    // total bound for grabbing the watch page html
    #[clap(long, env, default_value = "15")]
    pub resolve_timeout_secs: u64,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,

    #[clap(long, env, default_value = "logs")]
    pub log_dir: PathBuf,
}

impl AppConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }
}

impl Default for AppConfig {
    // mostly for tests, the real thing comes from clap
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 3001,
            host: "0.0.0.0".to_string(),
            serverless: false,
            upstream_provider: "desustream".to_string(),
            fingerprint_file: None,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            resolve_timeout_secs: 15,
            sentry_dsn: None,
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_production_flags() {
        let config = AppConfig::parse_from([
            "kitanime-edge",
            "--cargo-env",
            "production",
            "--port",
            "8080",
            "--read-timeout-secs",
            "5",
        ]);

        assert!(config.cargo_env.is_production());
        assert_eq!(config.port, 8080);
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
        assert_eq!(config.upstream_provider, "desustream");
    }

    #[test]
    fn default_is_development() {
        let config = AppConfig::default();
        assert!(!config.cargo_env.is_production());
        assert!(!config.serverless);
    }
}
