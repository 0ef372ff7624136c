//! One-time interactive grant flow.

use std::io::{self, BufRead, Write};

use super::{PermissionError, PermissionManager};
use crate::contract::AppIdentity;

/// The user's answer to a consent prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    Accept,
    Deny,
    /// The prompt was closed without an answer.
    Dismiss,
}

/// Asks the user whether a caller may access this plugin.
pub trait ConsentPrompt {
    fn ask(&self, caller: &AppIdentity, plugin_label: &str) -> Consent;
}

/// Consent prompt on the controlling terminal.
///
/// `y` accepts, any other answer denies, end of input dismisses.
pub struct TerminalPrompt<R = io::BufReader<io::Stdin>, W = io::Stdout> {
    input: parking_lot::Mutex<(R, W)>,
}

impl TerminalPrompt {
    /// Prompt on stdin/stdout.
    ///
    /// Stdin is only locked while a read is in progress, so the same
    /// process may still serve requests on it.
    pub fn stdio() -> Self {
        Self::new(io::BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    /// Prompt on arbitrary streams.
    pub fn new(input: R, output: W) -> Self {
        Self { input: parking_lot::Mutex::new((input, output)) }
    }
}

impl<R: BufRead, W: Write> ConsentPrompt for TerminalPrompt<R, W> {
    fn ask(&self, caller: &AppIdentity, plugin_label: &str) -> Consent {
        let mut guard = self.input.lock();
        let (input, output) = &mut *guard;

        let _ = write!(output, "Allow {} to access {}? [y/N] ", caller, plugin_label);
        let _ = output.flush();

        let mut answer = String::new();
        match input.read_line(&mut answer) {
            Ok(0) | Err(_) => Consent::Dismiss,
            Ok(_) if answer.trim().eq_ignore_ascii_case("y") => Consent::Accept,
            Ok(_) => Consent::Deny,
        }
    }
}

/// How a grant flow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// The caller has access.
    Granted,
    /// The caller has no access.
    Canceled,
}

impl GrantOutcome {
    /// Process exit code reported back to the launching host.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Granted => 0,
            Self::Canceled => 1,
        }
    }
}

/// Run the grant flow for `caller`.
///
/// An already granted caller succeeds without prompting. Otherwise the
/// user is asked once: accepting grants, denying revokes, dismissing leaves
/// the set untouched.
pub fn run_grant_flow(
    permissions: &PermissionManager,
    caller: &AppIdentity,
    plugin_label: &str,
    prompt: &dyn ConsentPrompt,
) -> Result<GrantOutcome, PermissionError> {
    if permissions.has_permission(&caller.package) {
        tracing::debug!(caller = %caller.package, "Caller already granted");
        return Ok(GrantOutcome::Granted);
    }

    match prompt.ask(caller, plugin_label) {
        Consent::Accept => {
            permissions.grant_permission(&caller.package)?;
            Ok(GrantOutcome::Granted)
        }
        Consent::Deny => {
            permissions.revoke_permission(&caller.package)?;
            Ok(GrantOutcome::Canceled)
        }
        Consent::Dismiss => Ok(GrantOutcome::Canceled),
    }
}
