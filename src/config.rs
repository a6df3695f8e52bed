use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Mediroute";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset
pub fn default_log_filter() -> String {
    "info,mediroute=debug".to_string()
}

/// Get the application data directory (~/Mediroute/)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Mediroute")
}

/// Get the default database path
pub fn database_path() -> PathBuf {
    app_data_dir().join("mediroute.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("Mediroute"));
    }

    #[test]
    fn database_path_under_app_data() {
        let db = database_path();
        assert!(db.starts_with(app_data_dir()));
        assert!(db.ends_with("mediroute.db"));
    }
}
