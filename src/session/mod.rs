//! Explicit session context: the persisted token and user, loaded once at
//! startup and torn down on logout or when the API answers 401.
//!
//! Callers share one `Arc<Session>`; the HTTP client reads the token from it
//! and expires it, the desk reads the acting user from it.

pub mod store;

use anyhow::{Context, Result};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, instrument, warn};

use crate::model::User;
use store::Pool;

pub const LOGIN_PATH: &str = "/login";

/// Where the user currently is, and how to send them elsewhere.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    fn redirect(&self, path: &str);
}

#[derive(Debug, Default, Clone)]
struct Credentials {
    token: Option<String>,
    user: Option<User>,
}

pub struct Session {
    pool: Pool,
    navigator: Arc<dyn Navigator>,
    state: RwLock<Credentials>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Read persisted credentials. A stored user that no longer parses is
    /// dropped together with its token.
    #[instrument(skip_all)]
    pub async fn load(pool: Pool, navigator: Arc<dyn Navigator>) -> Result<Self> {
        let token = store::get_value(&pool, store::TOKEN_KEY).await?;
        let user_json = store::get_value(&pool, store::USER_KEY).await?;
        let user = match user_json.as_deref().map(serde_json::from_str::<User>) {
            Some(Ok(user)) => Some(user),
            Some(Err(err)) => {
                warn!(?err, "discarding unreadable stored user");
                store::clear_credentials(&pool).await?;
                return Ok(Self::empty(pool, navigator));
            }
            None => None,
        };
        info!(authenticated = token.is_some(), "session loaded");
        Ok(Self {
            pool,
            navigator,
            state: RwLock::new(Credentials { token, user }),
        })
    }

    fn empty(pool: Pool, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            pool,
            navigator,
            state: RwLock::new(Credentials::default()),
        }
    }

    // Lock poisoning only means a writer panicked; the credentials are still usable.
    fn read(&self) -> RwLockReadGuard<'_, Credentials> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Credentials> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.read().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().token.is_some()
    }

    /// Persist a fresh login.
    #[instrument(skip_all, fields(user_id = user.id))]
    pub async fn establish(&self, token: String, user: User) -> Result<()> {
        let user_json = serde_json::to_string(&user).context("failed to encode user")?;
        store::put_credentials(&self.pool, &token, &user_json).await?;
        let mut state = self.write();
        state.token = Some(token);
        state.user = Some(user);
        info!("session established");
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn logout(&self) -> Result<()> {
        self.clear().await?;
        info!("logged out");
        Ok(())
    }

    /// Credentials were rejected: forget them and go to the login view
    /// unless already there.
    #[instrument(skip_all)]
    pub async fn expire(&self) -> Result<()> {
        let cleared = self.clear().await;
        if self.navigator.current_path() != LOGIN_PATH {
            self.navigator.redirect(LOGIN_PATH);
        }
        cleared
    }

    // In-memory credentials are dropped even if the store fails.
    async fn clear(&self) -> Result<()> {
        *self.write() = Credentials::default();
        store::clear_credentials(&self.pool).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingNavigator {
        pub path: Mutex<String>,
        pub redirects: Mutex<Vec<String>>,
    }

    impl RecordingNavigator {
        pub fn at(path: &str) -> Self {
            Self {
                path: Mutex::new(path.to_string()),
                redirects: Mutex::default(),
            }
        }

        pub fn redirects(&self) -> Vec<String> {
            self.redirects.lock().unwrap().clone()
        }
    }

    impl Navigator for RecordingNavigator {
        fn current_path(&self) -> String {
            self.path.lock().unwrap().clone()
        }

        fn redirect(&self, path: &str) {
            *self.path.lock().unwrap() = path.to_string();
            self.redirects.lock().unwrap().push(path.to_string());
        }
    }

    pub async fn memory_pool() -> Pool {
        let pool = store::init_pool("sqlite::memory:").await.unwrap();
        store::run_migrations(&pool).await.unwrap();
        pool
    }

    pub async fn memory_session(path: &str) -> (Arc<Session>, Arc<RecordingNavigator>) {
        let nav = Arc::new(RecordingNavigator::at(path));
        let session = Session::load(memory_pool().await, nav.clone()).await.unwrap();
        (Arc::new(session), nav)
    }
}
