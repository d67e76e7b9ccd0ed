use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::microsoft::{authorize_url, is_token_redirect, parse_redirect, XboxExchange};
use super::store::IdentityStore;
use super::IdentityRecord;
use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    AwaitingUserInteraction,
    ExchangingTokens,
    Complete,
    Failed,
}

/// Where the user signs in: an embedded browser, the system browser, a test double.
#[async_trait]
pub trait LoginSurface: Send + Sync {
    fn open(&self, auth_url: &str) -> LauncherResult<()>;

    /// Next URL the surface navigated to, `None` once the user closed it.
    async fn wait_for_redirect(&self) -> Option<String>;
}

pub struct AuthSession {
    surface: Arc<dyn LoginSurface>,
    exchange: XboxExchange,
    store: IdentityStore,
    state: Mutex<AuthState>,
}

impl AuthSession {
    pub fn new(surface: Arc<dyn LoginSurface>, exchange: XboxExchange, store: IdentityStore) -> Self {
        Self {
            surface,
            exchange,
            store,
            state: Mutex::new(AuthState::Idle),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.lock().map(|s| *s).unwrap_or(AuthState::Failed)
    }

    fn set_state(&self, next: AuthState) {
        if let Ok(mut state) = self.state.lock() {
            debug!("Auth state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// Interactive login. The record is persisted only when the account owns the game.
    pub async fn login(&self) -> LauncherResult<Option<IdentityRecord>> {
        let result = self.run_login().await;
        self.set_state(if result.is_ok() {
            AuthState::Complete
        } else {
            AuthState::Failed
        });
        if let Err(e) = &result {
            warn!("Login failed: {}", e);
        }
        result
    }

    async fn run_login(&self) -> LauncherResult<Option<IdentityRecord>> {
        self.set_state(AuthState::AwaitingUserInteraction);
        self.surface.open(&authorize_url())?;

        let redirect = loop {
            match self.surface.wait_for_redirect().await {
                None => return Err(LauncherError::UserCancelled),
                Some(url) if is_token_redirect(&url) => break url,
                Some(url) => debug!("Ignoring navigation to {}", url),
            }
        };
        let tokens = parse_redirect(&redirect)?;

        self.set_state(AuthState::ExchangingTokens);
        let record = self.exchange.authenticate(&tokens.access_token).await?;

        if let Some(record) = &record {
            self.store.save(record)?;
        }
        Ok(record)
    }

    /// Run [`AuthSession::login`] on the runtime without blocking the caller.
    pub fn spawn_login(self: Arc<Self>) -> JoinHandle<LauncherResult<Option<IdentityRecord>>> {
        tokio::spawn(async move { self.login().await })
    }

    pub fn logout(&self) -> LauncherResult<()> {
        self.store.delete()?;
        self.set_state(AuthState::Idle);
        info!("Logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::state::Endpoints;
    use crate::core::test_support::TestServer;
    use std::collections::VecDeque;

    struct ScriptedSurface {
        opened: Mutex<Vec<String>>,
        redirects: Mutex<VecDeque<String>>,
    }

    impl ScriptedSurface {
        fn new(redirects: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                opened: Mutex::new(Vec::new()),
                redirects: Mutex::new(redirects.iter().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl LoginSurface for ScriptedSurface {
        fn open(&self, auth_url: &str) -> LauncherResult<()> {
            self.opened.lock().unwrap().push(auth_url.to_string());
            Ok(())
        }

        async fn wait_for_redirect(&self) -> Option<String> {
            self.redirects.lock().unwrap().pop_front()
        }
    }

    const GOOD_REDIRECT: &str =
        "https://login.live.com/oauth20_desktop.srf#access_token=ms-token&refresh_token=r";

    fn session(surface: Arc<ScriptedSurface>, base: &str, data_dir: &std::path::Path) -> AuthSession {
        AuthSession::new(
            surface,
            XboxExchange::new(reqwest::Client::new(), Endpoints::local(base)),
            IdentityStore::new(data_dir),
        )
    }

    #[tokio::test]
    async fn login_then_logout_leaves_no_identity_file() {
        let server = TestServer::start().xbox_login(true).spawn().await;
        let dir = tempfile::tempdir().unwrap();
        let surface = ScriptedSurface::new(&[
            "https://login.live.com/ppsecure/post.srf",
            GOOD_REDIRECT,
        ]);
        let auth = session(surface.clone(), &server.base(), dir.path());

        let record = auth.login().await.unwrap().unwrap();
        assert_eq!(record.display_name, "Notch");
        assert_eq!(auth.state(), AuthState::Complete);
        assert_eq!(surface.opened.lock().unwrap().len(), 1);

        let saved: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("auth_data.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(
            saved,
            serde_json::json!({"accessToken": "mc-token", "uuid": "0123abcd", "username": "Notch"})
        );

        auth.logout().unwrap();
        assert!(!dir.path().join("auth_data.json").exists());
        assert_eq!(auth.state(), AuthState::Idle);
    }

    #[tokio::test]
    async fn closing_the_surface_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let auth = session(ScriptedSurface::new(&[]), "http://127.0.0.1:9", dir.path());

        let err = auth.login().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserCancelled);
        assert_eq!(auth.state(), AuthState::Failed);
    }

    #[tokio::test]
    async fn unowned_account_persists_nothing() {
        let server = TestServer::start().xbox_login(false).spawn().await;
        let dir = tempfile::tempdir().unwrap();
        let auth = session(ScriptedSurface::new(&[GOOD_REDIRECT]), &server.base(), dir.path());

        assert_eq!(auth.login().await.unwrap(), None);
        assert!(!dir.path().join("auth_data.json").exists());
    }

    #[tokio::test]
    async fn spawned_login_runs_in_background() {
        let server = TestServer::start().xbox_login(true).spawn().await;
        let dir = tempfile::tempdir().unwrap();
        let auth = Arc::new(session(
            ScriptedSurface::new(&[GOOD_REDIRECT]),
            &server.base(),
            dir.path(),
        ));

        let handle = auth.clone().spawn_login();
        let record = handle.await.unwrap().unwrap();
        assert!(record.is_some());
        assert!(dir.path().join("auth_data.json").is_file());
    }
}
