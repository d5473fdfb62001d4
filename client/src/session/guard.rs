use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use shared::types::{Role, RoleSet, TokenClaims};

use super::claims::decode_claims;
use super::clock::{Clock, SystemClock};
use super::store::{SessionKey, SessionStore, StoreError};
use crate::error::{ClientError, ClientResult};

/// Outcome of a role check for one view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    /// No live session: send the user to the login view.
    RedirectToLogin,
    /// Signed in, but the role is not in the view's allowed set.
    Forbidden,
}

/// Answers "is there a live session, and with which role?" from client-local
/// storage only. Nothing here touches the network, so it is cheap enough to
/// run on every navigation.
#[derive(Clone)]
pub struct SessionGuard {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGuard")
            .field("authenticated", &self.is_authenticated())
            .field("role", &self.current_role())
            .finish()
    }
}

impl SessionGuard {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Stored bearer token, if any. Empty strings count as absent.
    pub fn token(&self) -> Option<String> {
        self.store
            .get(SessionKey::Token)
            .filter(|t| !t.trim().is_empty())
    }

    pub fn current_role(&self) -> Option<Role> {
        self.store.get(SessionKey::Role)?.parse().ok()
    }

    pub fn display_name(&self) -> Option<String> {
        self.store
            .get(SessionKey::Name)
            .filter(|n| !n.trim().is_empty())
    }

    /// Claims of the stored token, regardless of expiry.
    pub fn claims(&self) -> Option<TokenClaims> {
        decode_claims(&self.token()?)
    }

    /// A token is present, decodes, and its `exp` is strictly in the future.
    /// An expired token is indistinguishable from no token.
    pub fn is_authenticated(&self) -> bool {
        self.claims()
            .is_some_and(|claims| claims.is_live_at(self.clock.now()))
    }

    pub fn authorize(&self, required: RoleSet) -> Access {
        if !self.is_authenticated() {
            return Access::RedirectToLogin;
        }

        match self.current_role() {
            Some(role) if required.contains(role) => Access::Allowed,
            role => {
                debug!("Role {:?} not in {:?}", role, required);
                Access::Forbidden
            }
        }
    }

    /// Role of the live session, or `AuthExpired`.
    pub fn require_session(&self) -> ClientResult<Option<Role>> {
        if self.is_authenticated() {
            Ok(self.current_role())
        } else {
            Err(ClientError::AuthExpired)
        }
    }

    /// Persist the three session values. Called after a successful login.
    pub fn establish_session(&self, token: &str, role: &str, name: &str) -> Result<(), StoreError> {
        self.store.set_all(&[
            (SessionKey::Token, token),
            (SessionKey::Role, role),
            (SessionKey::Name, name),
        ])?;
        info!("Session established (role: {:?})", role);
        Ok(())
    }

    /// Wipe token, role and name together.
    pub fn clear_session(&self) -> Result<(), StoreError> {
        self.store.clear()?;
        info!("Session cleared");
        Ok(())
    }
}
