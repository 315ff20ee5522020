//! Route surface and navigation resolution.
//!
//! SYSTEM CONTEXT
//! ==============
//! Public pages render for anyone. Each role owns one protected subtree
//! gated by [`guard::evaluate`]. Anything else falls back to `/`. The
//! redirect rule keeps unauthenticated users on public pages and sends
//! signed-in users away from the sign-in page.

pub mod guard;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

use crate::role::Role;
use crate::session::AuthSnapshot;

pub use guard::GuardDecision;

pub const SIGN_IN_ROUTE: &str = "/auth";
pub const FALLBACK_ROUTE: &str = "/";

/// Routes that never require a session.
pub const PUBLIC_ROUTES: [&str; 8] =
    ["/", "/auth", "/about", "/terms", "/privacy", "/payment", "/contact", "/onboarding"];

const PATIENT_ONLY: &[Role] = &[Role::Patient];
const DOCTOR_ONLY: &[Role] = &[Role::Doctor];
const HOSPITAL_ADMIN_ONLY: &[Role] = &[Role::HospitalAdmin];

/// A navigation the shell should perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
}

impl Redirect {
    #[must_use]
    pub fn to(path: &str) -> Self {
        Self { to: path.to_owned() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Public,
    Protected { allowed: &'static [Role] },
    Unmatched,
}

/// Outcome of navigating to a path with a given auth snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Render the (normalized) path.
    Render(String),
    /// Show a placeholder until the session settles.
    Loading,
    Redirect(Redirect),
}

/// Strip query and fragment, collapse duplicate and trailing slashes.
#[must_use]
pub fn normalize_path(raw: &str) -> String {
    let path = raw.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return FALLBACK_ROUTE.to_owned();
    }
    format!("/{}", segments.join("/"))
}

fn within(path: &str, root: &str) -> bool {
    path == root || path.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'))
}

#[must_use]
pub fn classify(raw: &str) -> RouteKind {
    let path = normalize_path(raw);
    if is_public(&path) {
        return RouteKind::Public;
    }
    for (role, allowed) in [
        (Role::Patient, PATIENT_ONLY),
        (Role::Doctor, DOCTOR_ONLY),
        (Role::HospitalAdmin, HOSPITAL_ADMIN_ONLY),
    ] {
        if within(&path, role.route_prefix()) {
            return RouteKind::Protected { allowed };
        }
    }
    RouteKind::Unmatched
}

/// Public pages, including sub-pages of every public route except `/`.
#[must_use]
pub fn is_public(raw: &str) -> bool {
    let path = normalize_path(raw);
    PUBLIC_ROUTES
        .iter()
        .any(|route| if *route == FALLBACK_ROUTE { path == *route } else { within(&path, route) })
}

/// Redirect side effect evaluated after every state change.
#[must_use]
pub fn redirect_rule(raw: &str, auth: &AuthSnapshot) -> Option<Redirect> {
    let path = normalize_path(raw);
    if !auth.is_authenticated {
        return (!is_public(&path)).then(|| Redirect::to(SIGN_IN_ROUTE));
    }
    match &auth.user {
        Some(user) if path == SIGN_IN_ROUTE => Some(Redirect::to(user.role.dashboard_route())),
        _ => None,
    }
}

/// Decide what navigating to `raw` should do right now.
#[must_use]
pub fn resolve(raw: &str, auth: &AuthSnapshot) -> Resolution {
    let path = normalize_path(raw);
    match classify(&path) {
        RouteKind::Unmatched => Resolution::Redirect(Redirect::to(FALLBACK_ROUTE)),
        RouteKind::Public => match redirect_rule(&path, auth) {
            Some(redirect) => Resolution::Redirect(redirect),
            None => Resolution::Render(path),
        },
        RouteKind::Protected { allowed } => match guard::evaluate_snapshot(auth, allowed) {
            GuardDecision::Loading => Resolution::Loading,
            GuardDecision::RedirectToAuth => Resolution::Redirect(Redirect::to(SIGN_IN_ROUTE)),
            GuardDecision::RedirectToDashboard(route) => Resolution::Redirect(Redirect::to(route)),
            GuardDecision::Render => Resolution::Render(path),
        },
    }
}
