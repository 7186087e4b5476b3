use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "labnorm";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable that overrides the database location
pub const DATABASE_ENV: &str = "LABNORM_DB";

const DATABASE_FILE: &str = "labnorm.db";

/// Get the application data directory
/// Platform data dir (e.g. ~/.local/share/labnorm), or the working directory if unknown
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Database used when no `--db` is given
pub fn default_database_path() -> PathBuf {
    database_path_from(std::env::var_os(DATABASE_ENV).map(PathBuf::from))
}

fn database_path_from(env_override: Option<PathBuf>) -> PathBuf {
    match env_override {
        Some(path) if !path.as_os_str().is_empty() => path,
        _ => app_data_dir().join(DATABASE_FILE),
    }
}

/// Fallback tracing filter when RUST_LOG is unset
pub fn default_log_filter() -> String {
    "labnorm_lib=info,labnorm=info".to_string()
}
