//! Caller authorization for plugin endpoints.
//!
//! A plugin keeps the set of caller packages it has granted access to. The
//! set is read on every inbound query and mutated only through
//! [`PermissionManager::grant_permission`] and
//! [`PermissionManager::revoke_permission`], usually from the interactive
//! [`run_grant_flow`].

mod grant;
mod manager;

pub use grant::{run_grant_flow, Consent, ConsentPrompt, GrantOutcome, TerminalPrompt};
pub use manager::{PermissionError, PermissionManager};
