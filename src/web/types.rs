use crate::error::AppResult;
use chrono::Duration;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct Settings {
    pub session_ttl: Duration,
    pub secure_cookies: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session_ttl: Duration::days(14),
            secure_cookies: false,
        }
    }
}

/// Shared by every request. The connection is the only mutable state; each
/// request holds the lock only for its synchronous database work.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    pub settings: Settings,
}

impl AppState {
    pub fn new(conn: Connection, settings: Settings) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            settings,
        }
    }

    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> AppResult<T>) -> AppResult<T> {
        let guard = self
            .db
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection mutex poisoned"))?;
        f(&guard)
    }
}

/// Runs CPU-heavy work (password hashing) off the async workers and
/// outside the connection lock.
pub(crate) async fn blocking<T, F>(f: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> AppResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow::anyhow!("blocking task failed: {e}"))?
}
