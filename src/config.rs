use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Drepadata";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Session cookie carrying the wizard session id.
pub const SESSION_COOKIE: &str = "drepadata_session";

/// Inactivity window after which a wizard session is invalidated: 30 minutes.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 1800;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DATABASE_FILE: &str = "drepadata.db";

/// Get the application data directory.
/// `~/Drepadata/` unless `DREPADATA_DATA_DIR` points elsewhere.
pub fn app_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DREPADATA_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Path of the SQLite database holding consultations.
pub fn database_path() -> PathBuf {
    app_data_dir().join(DATABASE_FILE)
}

/// Address the HTTP server binds to (`DREPADATA_BIND`).
pub fn bind_addr() -> SocketAddr {
    std::env::var("DREPADATA_BIND")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| {
            DEFAULT_BIND_ADDR
                .parse()
                .unwrap_or(SocketAddr::from(([127, 0, 0, 1], 8080)))
        })
}

/// Session inactivity timeout (`DREPADATA_SESSION_TIMEOUT_SECS`).
pub fn session_timeout() -> Duration {
    let secs = std::env::var("DREPADATA_SESSION_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_SESSION_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// Whether the session cookie carries the `Secure` attribute.
pub fn secure_cookies() -> bool {
    matches!(
        std::env::var("DREPADATA_SECURE_COOKIES").as_deref(),
        Ok("1") | Ok("true") | Ok("on")
    )
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,drepadata_lib=debug,tower_http=info"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_path_under_app_data() {
        let db = database_path();
        assert!(db.starts_with(app_data_dir()));
        assert!(db.ends_with("drepadata.db"));
    }

    #[test]
    fn app_name_is_drepadata() {
        assert_eq!(APP_NAME, "Drepadata");
    }

    #[test]
    fn default_timeout_is_thirty_minutes() {
        assert_eq!(DEFAULT_SESSION_TIMEOUT_SECS, 30 * 60);
    }

    #[test]
    fn log_filter_mentions_crate() {
        assert!(default_log_filter().contains("drepadata_lib"));
    }
}
