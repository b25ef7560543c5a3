use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::Functional;
use crate::validation::ValidationLimits;

// CLI argument structure, every flag can also come from the environment (or .env)
#[derive(Parser, Debug, Clone)]
#[command(name = "phasenav-gateway")]
#[command(about = "Phase diagram gateway in front of a materials database and phase engine")]
pub struct Args {
    // Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    // Backend serving /entries and /phase-diagram
    // Example: "localhost:8100"
    #[arg(short, long, env = "PHASENAV_BACKEND_URL", default_value = "localhost:8100")]
    pub backend_url: String,

    // Timeout for a single backend call in seconds
    #[arg(long, env = "PHASENAV_BACKEND_TIMEOUT", default_value_t = 120)]
    pub backend_timeout: u64,

    // Rate limit max requests per window
    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value_t = 10)]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW", default_value_t = 30)]
    pub rate_window: u64,

    // How often empty rate limit entries are swept, in seconds
    #[arg(long, env = "RATE_LIMIT_SWEEP_INTERVAL", default_value_t = 60)]
    pub sweep_interval: u64,

    #[arg(long, env = "MIN_FORMULAS", default_value_t = 2)]
    pub min_formulas: usize,

    #[arg(long, env = "MAX_FORMULAS", default_value_t = 4)]
    pub max_formulas: usize,

    // Lower bound for non-zero temperatures (K)
    #[arg(long, env = "MIN_TEMPERATURE", default_value_t = 300)]
    pub min_temperature: u32,

    #[arg(long, env = "MAX_TEMPERATURE", default_value_t = 2000)]
    pub max_temperature: u32,

    // eV/atom
    #[arg(long, env = "MAX_ENERGY_CUTOFF", default_value_t = 2.0)]
    pub max_energy_cutoff: f64,

    #[arg(long, env = "DEFAULT_ENERGY_CUTOFF", default_value_t = 0.2)]
    pub default_energy_cutoff: f64,

    #[arg(long, env = "DEFAULT_FUNCTIONAL", default_value = "GGA_GGA_U_R2SCAN")]
    pub default_functional: Functional,

    // Hex characters of the API key digest kept for logs and rate limiting
    #[arg(long, env = "API_KEY_HASH_LENGTH", default_value_t = 12)]
    pub api_key_hash_length: usize,

    // Used when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    // Log lines are also appended here; empty disables the file
    #[arg(long, env = "LOG_FILE", default_value = "phasenav.log")]
    pub log_file: String,

    #[arg(long, env = "APP_NAME", default_value = "PhaseNavigator")]
    pub app_name: String,
}

impl Args {
    pub fn log_file_path(&self) -> Option<PathBuf> {
        let path = self.log_file.trim();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    // add http:// if not present
    pub fn backend_base_url(&self) -> String {
        let url = self.backend_url.trim().trim_end_matches('/');
        if url.starts_with("http") {
            url.to_string()
        } else {
            format!("http://{}", url)
        }
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn validation_limits(&self) -> ValidationLimits {
        ValidationLimits {
            min_formulas: self.min_formulas,
            max_formulas: self.max_formulas,
            min_temperature: self.min_temperature,
            max_temperature: self.max_temperature,
            max_energy_cutoff: self.max_energy_cutoff,
            default_energy_cutoff: self.default_energy_cutoff,
            default_functional: self.default_functional,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_limits() {
        let args = Args::parse_from(["phasenav-gateway"]);
        let limits = args.validation_limits();

        assert_eq!(args.rate_limit, 10);
        assert_eq!(args.rate_window(), Duration::from_secs(30));
        assert_eq!(limits.min_formulas, 2);
        assert_eq!(limits.max_formulas, 4);
        assert_eq!(limits.min_temperature, 300);
        assert_eq!(limits.max_temperature, 2000);
        assert_eq!(limits.default_functional, Functional::GgaGgaUR2scan);
    }

    #[test]
    fn backend_url_gets_a_scheme() {
        let args = Args::parse_from(["phasenav-gateway", "--backend-url", "engine:9000/"]);
        assert_eq!(args.backend_base_url(), "http://engine:9000");

        let args = Args::parse_from(["phasenav-gateway", "-b", "https://engine.example"]);
        assert_eq!(args.backend_base_url(), "https://engine.example");
    }

    #[test]
    fn log_file_can_be_disabled() {
        let args = Args::parse_from(["phasenav-gateway", "--log-file", "/tmp/gw.log"]);
        assert_eq!(args.log_file_path(), Some(PathBuf::from("/tmp/gw.log")));

        let args = Args::parse_from(["phasenav-gateway", "--log-file", ""]);
        assert_eq!(args.log_file_path(), None);
    }

    #[test]
    fn functional_flag_is_checked() {
        let parsed = Args::try_parse_from(["phasenav-gateway", "--default-functional", "LDA"]);
        assert!(parsed.is_err());
    }
}
