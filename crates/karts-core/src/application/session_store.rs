use chrono::Utc;
use karts_types::domain::identity::{Identity, IdentityPatch, RegistrationData, UserRole};
use karts_types::ports::auth_backend::AuthBackend;
use karts_types::ports::identity_store::IdentityStore;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::errors::SessionError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated(Identity),
}

impl SessionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Authenticating)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Holds the signed-in identity.
///
/// Operations are serialized per instance: starting one while another is
/// still running fails with [`SessionError::Busy`]. Every transition is
/// written through to the [`IdentityStore`].
pub struct SessionStore<A: AuthBackend, P: IdentityStore> {
    auth: A,
    persistence: P,
    state: watch::Sender<SessionState>,
    in_flight: Mutex<()>,
}

/// Sets `Authenticating` on creation. Dropped without [`Pending::resolve`]
/// (the caller's future was cancelled) it puts back the state it replaced,
/// which is still what the persistence slot holds.
struct Pending<'a> {
    state: &'a watch::Sender<SessionState>,
    previous: SessionState,
    resolved: bool,
}

impl<'a> Pending<'a> {
    fn begin(state: &'a watch::Sender<SessionState>) -> Self {
        let previous = state.send_replace(SessionState::Authenticating);
        Self {
            state,
            previous,
            resolved: false,
        }
    }

    fn was_authenticated(&self) -> bool {
        self.previous.is_authenticated()
    }

    fn resolve(mut self, next: SessionState) {
        self.state.send_replace(next);
        self.resolved = true;
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            self.state.send_replace(std::mem::take(&mut self.previous));
        }
    }
}

impl<A: AuthBackend, P: IdentityStore> SessionStore<A, P> {
    pub fn new(auth: A, persistence: P) -> Self {
        let (state, _) = watch::channel(SessionState::Unauthenticated);
        Self {
            auth,
            persistence,
            state,
            in_flight: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    /// Read by navigation to pick a landing screen.
    pub fn role(&self) -> Option<UserRole> {
        self.state.borrow().identity().map(|i| i.role)
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Startup hook: adopt whatever identity the persistence slot holds.
    pub async fn restore(&self) -> Result<Option<Identity>, SessionError> {
        let _guard = self.in_flight.try_lock().map_err(|_| SessionError::Busy)?;
        let pending = Pending::begin(&self.state);
        match self.persistence.load().await {
            Ok(Some(identity)) => {
                info!(user_id = %identity.id, role = ?identity.role, "session restored");
                pending.resolve(SessionState::Authenticated(identity.clone()));
                Ok(Some(identity))
            }
            Ok(None) => {
                debug!("no stored session");
                pending.resolve(SessionState::Unauthenticated);
                Ok(None)
            }
            Err(e) => {
                pending.resolve(SessionState::Unauthenticated);
                Err(SessionError::Internal(
                    anyhow::Error::new(e).context("loading stored session"),
                ))
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, SessionError> {
        let _guard = self.in_flight.try_lock().map_err(|_| SessionError::Busy)?;
        let pending = Pending::begin(&self.state);
        debug!(email, "signing in");
        match self.auth.authenticate(email, password).await {
            Ok(identity) => {
                pending.resolve(SessionState::Authenticated(identity.clone()));
                info!(user_id = %identity.id, role = ?identity.role, "signed in");
                self.persist(Some(&identity)).await;
                Ok(identity)
            }
            Err(e) => {
                warn!(email, error = %e, "sign-in failed");
                self.fail(pending).await;
                Err(e.into())
            }
        }
    }

    pub async fn sign_up(&self, data: RegistrationData) -> Result<Identity, SessionError> {
        let _guard = self.in_flight.try_lock().map_err(|_| SessionError::Busy)?;
        let pending = Pending::begin(&self.state);
        let email = data.email.clone();
        debug!(email = %email, role = ?data.role, "signing up");
        match self.auth.register(data).await {
            Ok(identity) => {
                pending.resolve(SessionState::Authenticated(identity.clone()));
                info!(user_id = %identity.id, role = ?identity.role, "signed up");
                self.persist(Some(&identity)).await;
                Ok(identity)
            }
            Err(e) => {
                warn!(email = %email, error = %e, "sign-up failed");
                self.fail(pending).await;
                Err(e.into())
            }
        }
    }

    /// The state flips to `Unauthenticated` before the persistence slot is cleared.
    ///
    /// Like every other operation this fails with [`SessionError::Busy`] while
    /// a sign-in or sign-up is still in flight; it does not cancel it.
    pub async fn sign_out(&self) -> Result<(), SessionError> {
        let _guard = self.in_flight.try_lock().map_err(|_| SessionError::Busy)?;
        let previous = self.state.send_replace(SessionState::Unauthenticated);
        if let Some(identity) = previous.identity() {
            info!(user_id = %identity.id, "signed out");
        }
        self.persist(None).await;
        Ok(())
    }

    pub async fn update_identity(&self, patch: IdentityPatch) -> Result<Identity, SessionError> {
        let _guard = self.in_flight.try_lock().map_err(|_| SessionError::Busy)?;
        let current = self.identity().ok_or(SessionError::NotAuthenticated)?;
        let next = current.merged(&patch, Utc::now());
        self.state
            .send_replace(SessionState::Authenticated(next.clone()));
        debug!(user_id = %next.id, "identity updated");
        self.persist(Some(&next)).await;
        Ok(next)
    }

    /// A failed attempt always ends signed out. If it replaced a live
    /// session, the stored identity is cleared too.
    async fn fail(&self, pending: Pending<'_>) {
        let clear_slot = pending.was_authenticated();
        pending.resolve(SessionState::Unauthenticated);
        if clear_slot {
            self.persist(None).await;
        }
    }

    async fn persist(&self, identity: Option<&Identity>) {
        if let Err(e) = self.persistence.save(identity).await {
            warn!(error = %e, "failed to persist session");
        }
    }
}
