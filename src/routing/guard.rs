//! Route guard decision table.
//!
//! Pure and re-evaluated on every navigation; there is no transition
//! history. Rows are checked top to bottom:
//!
//! | user | loading | authenticated | role allowed | decision |
//! |------|---------|---------------|--------------|----------|
//! | none | yes     | -             | -            | Loading |
//! | -    | -       | no            | -            | RedirectToAuth |
//! | none | -       | yes           | -            | Loading |
//! | some | -       | yes           | no           | RedirectToDashboard |
//! | some | -       | yes           | yes          | Render |

use crate::api::User;
use crate::role::Role;
use crate::session::AuthSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Loading,
    RedirectToAuth,
    /// Carries the user's own dashboard route.
    RedirectToDashboard(&'static str),
    Render,
}

/// An empty allow-list admits no role; every user is sent to their own dashboard.
#[must_use]
pub fn evaluate(user: Option<&User>, is_loading: bool, is_authenticated: bool, allowed: &[Role]) -> GuardDecision {
    match user {
        None if is_loading => GuardDecision::Loading,
        _ if !is_authenticated => GuardDecision::RedirectToAuth,
        None => GuardDecision::Loading,
        Some(user) if !allowed.contains(&user.role) => {
            GuardDecision::RedirectToDashboard(user.role.dashboard_route())
        }
        Some(_) => GuardDecision::Render,
    }
}

#[must_use]
pub fn evaluate_snapshot(auth: &AuthSnapshot, allowed: &[Role]) -> GuardDecision {
    evaluate(auth.user.as_ref(), auth.is_loading, auth.is_authenticated, allowed)
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
