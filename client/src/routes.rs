use std::fmt;

use tracing::{debug, info};

use shared::types::RoleSet;

use crate::gateway::AuthEvent;
use crate::session::{Access, SessionGuard};

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    ForgotPassword,
    ResetPassword,
    Dashboard,
    Patients,
    Doctors,
    Appointments,
    ManageUsers,
    UserDetails(String),
    Records,
    Profile,
}

/// Who may open a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Anyone.
    Public,
    /// Anyone without a live session; signed-in users go to the dashboard.
    GuestOnly,
    /// A live session whose role is in the set.
    Roles(RoleSet),
}

#[derive(Debug, Clone, Copy)]
pub struct RouteDef {
    pub pattern: &'static str,
    pub gate: Gate,
    /// Label in the navigation bar; `None` keeps the route out of it.
    pub nav_label: Option<&'static str>,
}

/// The route table. Order is the navigation bar order.
pub const ROUTES: &[RouteDef] = &[
    RouteDef {
        pattern: "/login",
        gate: Gate::GuestOnly,
        nav_label: None,
    },
    RouteDef {
        pattern: "/forgot-password",
        gate: Gate::Public,
        nav_label: None,
    },
    RouteDef {
        pattern: "/reset-password",
        gate: Gate::Public,
        nav_label: None,
    },
    RouteDef {
        pattern: "/",
        gate: Gate::Roles(RoleSet::ALL),
        nav_label: Some("Dashboard"),
    },
    RouteDef {
        pattern: "/manage-users",
        gate: Gate::Roles(RoleSet::ADMIN),
        nav_label: Some("Manage Users"),
    },
    RouteDef {
        pattern: "/patients",
        gate: Gate::Roles(RoleSet::STAFF),
        nav_label: Some("Patients"),
    },
    RouteDef {
        pattern: "/doctors",
        gate: Gate::Roles(RoleSet::ADMIN),
        nav_label: Some("Doctors"),
    },
    RouteDef {
        pattern: "/appointments",
        gate: Gate::Roles(RoleSet::ALL),
        nav_label: Some("Appointments"),
    },
    RouteDef {
        pattern: "/records",
        gate: Gate::Roles(RoleSet::ALL),
        nav_label: Some("Records"),
    },
    RouteDef {
        pattern: "/users/:id",
        gate: Gate::Roles(RoleSet::ADMIN),
        nav_label: None,
    },
    RouteDef {
        pattern: "/profile",
        gate: Gate::Roles(RoleSet::ALL),
        nav_label: None,
    },
];

impl Route {
    /// Match a path (query string ignored) against the route table.
    pub fn parse(path: &str) -> Option<Route> {
        let def = ROUTES.iter().find(|s| path_matches(s.pattern, path))?;
        Some(Route::from_pattern(def.pattern, path))
    }

    fn from_pattern(pattern: &str, path: &str) -> Route {
        match pattern {
            "/login" => Route::Login,
            "/forgot-password" => Route::ForgotPassword,
            "/reset-password" => Route::ResetPassword,
            "/patients" => Route::Patients,
            "/doctors" => Route::Doctors,
            "/appointments" => Route::Appointments,
            "/manage-users" => Route::ManageUsers,
            "/users/:id" => Route::UserDetails(last_segment(path).to_string()),
            "/records" => Route::Records,
            "/profile" => Route::Profile,
            _ => Route::Dashboard,
        }
    }

    pub fn pattern(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::ForgotPassword => "/forgot-password",
            Route::ResetPassword => "/reset-password",
            Route::Dashboard => "/",
            Route::Patients => "/patients",
            Route::Doctors => "/doctors",
            Route::Appointments => "/appointments",
            Route::ManageUsers => "/manage-users",
            Route::UserDetails(_) => "/users/:id",
            Route::Records => "/records",
            Route::Profile => "/profile",
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::UserDetails(id) => format!("/users/{}", id),
            other => other.pattern().to_string(),
        }
    }

    pub fn def(&self) -> &'static RouteDef {
        let pattern = self.pattern();
        ROUTES
            .iter()
            .find(|s| s.pattern == pattern)
            .unwrap_or(&ROUTES[0])
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// `:name` matches exactly one non-empty segment; everything else is literal.
pub fn path_matches(pattern: &str, path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path);

    if pattern == path {
        return true;
    }

    let pattern_parts: Vec<&str> = pattern.split('/').collect();
    let path_parts: Vec<&str> = path.split('/').collect();

    if pattern_parts.len() != path_parts.len() {
        return false;
    }

    pattern_parts
        .iter()
        .zip(path_parts.iter())
        .all(|(p, s)| if p.starts_with(':') { !s.is_empty() } else { p == s })
}

fn last_segment(path: &str) -> &str {
    let path = path.split('?').next().unwrap_or(path);
    path.rsplit('/').next().unwrap_or("")
}

// ---------------------------------------------------------------------------
// Navigator
// ---------------------------------------------------------------------------

/// Result of trying to open a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Render(Route),
    Redirect(Route),
    Forbidden(Route),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavItem {
    pub label: &'static str,
    pub path: &'static str,
}

/// Decides what each navigation renders, from the guard alone.
#[derive(Debug, Clone)]
pub struct Navigator {
    guard: SessionGuard,
    location: Route,
    notice: Option<String>,
}

impl Navigator {
    pub fn new(guard: SessionGuard) -> Self {
        Self {
            guard,
            location: Route::Login,
            notice: None,
        }
    }

    pub fn location(&self) -> &Route {
        &self.location
    }

    /// Banner to show on the current view, if any.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Pure decision for `path`; the session is re-checked on every call.
    pub fn resolve(&self, path: &str) -> Navigation {
        let Some(route) = Route::parse(path) else {
            return Navigation::NotFound;
        };

        match route.def().gate {
            Gate::Public => Navigation::Render(route),
            Gate::GuestOnly if self.guard.is_authenticated() => {
                Navigation::Redirect(Route::Dashboard)
            }
            Gate::GuestOnly => Navigation::Render(route),
            Gate::Roles(roles) => match self.guard.authorize(roles) {
                Access::Allowed => Navigation::Render(route),
                Access::RedirectToLogin => Navigation::Redirect(Route::Login),
                Access::Forbidden => Navigation::Forbidden(route),
            },
        }
    }

    /// Resolve `path` and move there, following a redirect if one applies.
    pub fn navigate(&mut self, path: &str) -> Navigation {
        let outcome = self.resolve(path);
        debug!("navigate {} -> {:?}", path, outcome);

        match &outcome {
            // The sign-out banner stays up on the login view.
            Navigation::Render(Route::Login) => {
                self.location = Route::Login;
            }
            Navigation::Render(route) | Navigation::Forbidden(route) => {
                self.location = route.clone();
                self.notice = None;
            }
            Navigation::Redirect(route) => {
                self.location = route.clone();
            }
            Navigation::NotFound => {}
        }

        outcome
    }

    /// React to a gateway event.
    pub fn handle_auth_event(&mut self, event: AuthEvent) {
        match event {
            AuthEvent::SessionRejected => {
                info!("Session rejected by server, returning to login");
                if self.location != Route::Login {
                    self.notice = Some("You were signed out. Please sign in again.".to_string());
                }
                self.location = Route::Login;
            }
        }
    }

    /// Navigation bar entries the current session may open.
    pub fn nav_items(&self) -> Vec<NavItem> {
        ROUTES
            .iter()
            .filter_map(|def| {
                let label = def.nav_label?;
                let allowed = match def.gate {
                    Gate::Roles(roles) => self.guard.authorize(roles) == Access::Allowed,
                    _ => false,
                };
                allowed.then_some(NavItem {
                    label,
                    path: def.pattern,
                })
            })
            .collect()
    }
}
