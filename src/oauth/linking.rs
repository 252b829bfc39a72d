//! Account resolution and linking for external identities.
//!
//! Policy: unregistered emails are rejected. Self-registration was removed
//! from this system, so an OAuth login only ever attaches to an account an
//! admin already created.

use super::identity::ExternalIdentity;
use crate::session::{issue_session, AuthBundle};
use crate::store::{Provider, Store};
use crate::token::TokenService;
use tracing::{info, warn};

/// Failures during account resolution.
#[derive(Debug)]
pub enum LinkError {
    /// No local account exists for the verified email.
    UserNotRegistered,
    /// Storage or token-signing failure.
    Internal(anyhow::Error),
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::UserNotRegistered => {
                write!(f, "Account not registered. Ask an administrator to create it first.")
            }
            LinkError::Internal(e) => write!(f, "{}", e),
        }
    }
}

impl From<anyhow::Error> for LinkError {
    fn from(e: anyhow::Error) -> Self {
        LinkError::Internal(e)
    }
}

/// Resolve a verified external identity to a local account, reconcile the
/// provider fields, and mint a session.
///
/// - Unknown email: rejected (`UserNotRegistered`).
/// - Known account with provider local/none: the provider is linked in
///   place. The password hash is untouched, so a user who registered with
///   a password keeps both login methods.
/// - Known account already linked to a *different* external provider: the
///   login proceeds on the existing record; nothing is overwritten.
pub fn resolve_and_link(
    store: &dyn Store,
    tokens: &TokenService,
    identity: &ExternalIdentity,
) -> Result<AuthBundle, LinkError> {
    let mut user = store
        .find_user_by_email(&identity.email)?
        .ok_or(LinkError::UserNotRegistered)?;

    let target = identity.provider.as_store_provider();
    match user.provider {
        None | Some(Provider::Local) => {
            info!(
                user_id = user.id,
                provider = %identity.provider,
                "Linking external provider to local account"
            );
            store.update_user_provider(user.id, target, &identity.external_id)?;
            user.provider = Some(target);
            user.provider_id = Some(identity.external_id.clone());
        }
        Some(existing) if existing != target => {
            warn!(
                user_id = user.id,
                existing = %existing,
                attempted = %identity.provider,
                "Account already linked to a different provider; keeping existing link"
            );
        }
        _ => {}
    }

    Ok(issue_session(store, tokens, &user)?)
}
