//! Gate between the auth backend and the board.

use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    error::{CrmError, CrmResult},
    gateway::{AuthGateway, AuthUser},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Session check still in flight.
    Unknown,
    Authenticated(AuthUser),
    Anonymous,
}

impl SessionState {
    fn from_user(user: Option<AuthUser>) -> Self {
        match user {
            Some(user) => SessionState::Authenticated(user),
            None => SessionState::Anonymous,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Unknown => "unknown",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Anonymous => "anonymous",
        }
    }
}

/// What the surface may show for a given session state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    Loading,
    Login,
    Board,
}

pub struct SessionGuard {
    auth: Arc<dyn AuthGateway>,
    state: Arc<watch::Sender<SessionState>>,
    listener: Option<JoinHandle<()>>,
}

impl SessionGuard {
    /// A guard that has not checked the session yet. Stays `Unknown` until started.
    pub fn new(auth: Arc<dyn AuthGateway>) -> Self {
        let (state, _) = watch::channel(SessionState::Unknown);
        Self {
            auth,
            state: Arc::new(state),
            listener: None,
        }
    }

    /// Resolve the current session and follow changes until the guard is dropped.
    pub async fn start(auth: Arc<dyn AuthGateway>) -> Self {
        let mut guard = Self::new(auth);
        guard.listen().await;
        guard
    }

    async fn listen(&mut self) {
        if self.listener.is_some() {
            return;
        }
        // Subscribe before the lookup so a change racing it is not lost.
        let mut changes = self.auth.subscribe();
        changes.borrow_and_update();

        let initial = match self.auth.current_user().await {
            Ok(user) => user,
            Err(err) => {
                warn!(error = %err, "session lookup failed; treating as signed out");
                None
            }
        };
        apply(&self.state, SessionState::from_user(initial));

        let state = Arc::clone(&self.state);
        self.listener = Some(tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let latest = changes.borrow_and_update().clone();
                apply(&state, SessionState::from_user(latest));
            }
        }));
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn screen(&self) -> Screen {
        match &*self.state.borrow() {
            SessionState::Unknown => Screen::Loading,
            SessionState::Anonymous => Screen::Login,
            SessionState::Authenticated(_) => Screen::Board,
        }
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        match &*self.state.borrow() {
            SessionState::Authenticated(user) => Some(user.clone()),
            _ => None,
        }
    }

    pub fn require_user(&self) -> CrmResult<AuthUser> {
        self.current_user()
            .ok_or_else(|| CrmError::auth("sign in required"))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> CrmResult<AuthUser> {
        let user = self.auth.sign_in(email, password).await.inspect_err(|err| {
            warn!(error = %err, "sign in rejected");
        })?;
        apply(&self.state, SessionState::Authenticated(user.clone()));
        Ok(user)
    }

    pub async fn sign_out(&self) -> CrmResult<()> {
        let result = self.auth.sign_out().await;
        apply(&self.state, SessionState::Anonymous);
        result
    }

    /// Stop following session changes and wait for the subscription to be released.
    pub async fn shutdown(mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
            let _ = listener.await;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

fn apply(state: &watch::Sender<SessionState>, next: SessionState) {
    state.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        info!(from = current.label(), to = next.label(), "session changed");
        *current = next;
        true
    });
}
