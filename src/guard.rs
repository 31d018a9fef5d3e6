//! Route table and `requires_auth` navigation guard.
//!
//! The guard reads only the session's identity: routes flagged
//! `requires_auth` redirect to the auth page while nobody is signed in.

use std::collections::HashMap;

use crate::session::SessionState;

pub const AUTH_PATH: &str = "/auth";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub name: &'static str,
    /// Path pattern; segments starting with `:` capture a parameter.
    pub pattern: &'static str,
    pub requires_auth: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: HashMap<&'static str, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    Redirect { to: String },
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl Default for RouteTable {
    /// The catalog's routes: game list, game detail, auth page, profile.
    fn default() -> Self {
        Self::new(vec![
            Route { name: "home", pattern: "/", requires_auth: false },
            Route { name: "game", pattern: "/game/:id", requires_auth: false },
            Route { name: "auth", pattern: AUTH_PATH, requires_auth: false },
            Route { name: "profile", pattern: "/profile", requires_auth: true },
        ])
    }
}

impl RouteTable {
    #[must_use]
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// First route whose pattern matches `path`. Query string and trailing
    /// slash are ignored.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments = split_segments(path);
        self.routes.iter().find_map(|route| {
            match_pattern(route.pattern, &segments).map(|params| RouteMatch { route, params })
        })
    }

    /// Guard a navigation to `path` against the current session.
    ///
    /// Unknown paths proceed; rendering a not-found view is the caller's job.
    #[must_use]
    pub fn navigate(&self, path: &str, state: &SessionState) -> Navigation {
        match self.resolve(path) {
            Some(matched) => guard(matched.route, path, state),
            None => Navigation::Proceed,
        }
    }
}

/// Decide whether `route` may be entered. `path` is the concrete path being
/// visited and is carried in the redirect so the auth page can return to it.
#[must_use]
pub fn guard(route: &Route, path: &str, state: &SessionState) -> Navigation {
    if route.requires_auth && !state.is_authenticated() {
        return Navigation::Redirect { to: format!("{AUTH_PATH}?redirect={}", urlencoding::encode(path)) };
    }
    Navigation::Proceed
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn match_pattern(pattern: &'static str, segments: &[&str]) -> Option<HashMap<&'static str, String>> {
    let expected = split_segments(pattern);
    if expected.len() != segments.len() {
        return None;
    }
    let mut params = HashMap::new();
    for (want, got) in expected.into_iter().zip(segments) {
        if let Some(name) = want.strip_prefix(':') {
            params.insert(name, (*got).to_owned());
        } else if want != *got {
            return None;
        }
    }
    Some(params)
}

#[cfg(test)]
#[path = "guard_test.rs"]
mod tests;
