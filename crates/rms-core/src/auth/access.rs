//! Route-level access decisions.
//!
//! Public routes need nothing, protected routes need a signed-in user, and
//! admin routes additionally need the admin or hr role (superusers pass any
//! role check).

use crate::models::{Role, User};

// ============================================================================
// Routes
// ============================================================================

pub const LOGIN_ROUTE: &str = "/login";
pub const HOME_ROUTE: &str = "/home";

/// Routes reachable without a session
pub const PUBLIC_ROUTES: [&str; 5] = [
    LOGIN_ROUTE,
    "/signup",
    "/forget-password",
    "/verify-otp",
    "/reset-password",
];

/// Routes that need any signed-in user
pub const PROTECTED_ROUTES: [&str; 4] = [HOME_ROUTE, "/assets", "/requests", "/offices"];

/// Routes that need the admin or hr role
pub const ADMIN_ROUTES: [&str; 2] = ["/admin", "/admin/users"];

/// What the client knows about the signed-in user at a point in time.
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub has_token: bool,
    pub user: Option<User>,
    /// The current-user lookup is still in flight
    pub loading: bool,
    /// The current-user lookup failed
    pub error: bool,
}

impl AuthState {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn loaded(user: User) -> Self {
        Self {
            has_token: true,
            user: Some(user),
            loading: false,
            error: false,
        }
    }

    /// A token with a loaded user, or a token whose lookup is still pending
    pub fn is_authenticated(&self) -> bool {
        self.has_token && (self.user.is_some() || (self.loading && !self.error))
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        self.user.as_ref().map(|u| u.has_role(roles)).unwrap_or(false)
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().map(User::is_admin).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Still waiting on the current user
    Loading,
    Redirect(&'static str),
    /// Signed in, but without a required role
    Denied,
    Allowed,
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    required_roles: Option<Vec<Role>>,
    redirect_to: &'static str,
}

impl RouteGuard {
    /// Guard for any signed-in user
    pub fn authenticated() -> Self {
        Self {
            required_roles: None,
            redirect_to: LOGIN_ROUTE,
        }
    }

    /// Guard that also needs one of `roles`
    pub fn with_roles(roles: &[Role]) -> Self {
        Self {
            required_roles: Some(roles.to_vec()),
            redirect_to: LOGIN_ROUTE,
        }
    }

    pub fn redirect_to(mut self, route: &'static str) -> Self {
        self.redirect_to = route;
        self
    }

    /// Guard for a route path, `None` for public or unknown routes
    pub fn for_route(path: &str) -> Option<Self> {
        if ADMIN_ROUTES.contains(&path) {
            Some(Self::with_roles(&[Role::Admin, Role::Hr]))
        } else if PROTECTED_ROUTES.contains(&path) {
            Some(Self::authenticated())
        } else {
            None
        }
    }

    pub fn check(&self, state: &AuthState) -> Access {
        if state.loading {
            return Access::Loading;
        }
        if !state.is_authenticated() {
            return Access::Redirect(self.redirect_to);
        }
        match self.required_roles {
            Some(ref roles) if !state.has_role(roles) => Access::Denied,
            _ => Access::Allowed,
        }
    }
}

/// Where the root route sends the user: home once authenticated,
/// nowhere while loading or signed out.
pub fn landing_redirect(state: &AuthState) -> Option<&'static str> {
    if state.loading || !state.is_authenticated() {
        None
    } else {
        Some(HOME_ROUTE)
    }
}
