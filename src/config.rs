use std::path::{Path, PathBuf};

use crate::simulation::{SimulationConfig, SimulationError};

/// Application-level constants
pub const APP_NAME: &str = "Vitalsim";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DATABASE_FILE: &str = "vitalsim.db";

/// Get the application data directory
/// ~/Vitalsim/ on all platforms, falling back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(APP_NAME),
        None => PathBuf::from(APP_NAME),
    }
}

/// Default SQLite database used when no `--database` is given
pub fn default_database_path() -> PathBuf {
    app_data_dir().join(DATABASE_FILE)
}

/// Log filter used when RUST_LOG is unset
pub fn default_log_filter() -> &'static str {
    "vitalsim=info"
}

/// Load a run configuration from a JSON file. Missing fields take defaults.
pub fn load_config_file(path: &Path) -> Result<SimulationConfig, SimulationError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        SimulationError::Config(format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&raw).map_err(|e| {
        SimulationError::Config(format!("invalid config file {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn app_data_dir_named_after_app() {
        assert!(app_data_dir().ends_with("Vitalsim"));
    }

    #[test]
    fn database_under_app_data() {
        let db = default_database_path();
        assert!(db.starts_with(app_data_dir()));
        assert!(db.ends_with("vitalsim.db"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.3.0");
    }

    #[test]
    fn load_partial_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"history_days": 14, "workers": 2}}"#).unwrap();

        let config = load_config_file(file.path()).unwrap();
        assert_eq!(config.history_days, 14);
        assert_eq!(config.workers, 2);
        assert_eq!(config.batch_size, 3000);
    }

    #[test]
    fn malformed_config_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(load_config_file(file.path()), Err(SimulationError::Config(_))));
    }

    #[test]
    fn missing_config_file_is_config_error() {
        let result = load_config_file(Path::new("/nonexistent/vitalsim.json"));
        assert!(matches!(result, Err(SimulationError::Config(_))));
    }
}
