//! Path-prefix routing table.

use crate::config::BackendUrls;

/// One backend and the path prefix it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRoute {
    pub name: &'static str,
    pub prefix: &'static str,
    /// Base URL without a trailing slash.
    pub upstream: String,
}

/// Flat table of service routes.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<ServiceRoute>,
}

impl RouteTable {
    #[must_use]
    pub fn new(routes: Vec<ServiceRoute>) -> Self {
        Self { routes }
    }

    /// The standard table for the five Health Bar services.
    #[must_use]
    pub fn from_backends(backends: &BackendUrls) -> Self {
        let prefixes = [
            "/api/auth",
            "/api/patients",
            "/api/doctors",
            "/api/timeline",
            "/api/prescriptions",
        ];
        let routes = backends
            .entries()
            .into_iter()
            .zip(prefixes)
            .map(|((name, url), prefix)| ServiceRoute {
                name,
                prefix,
                upstream: url.trim_end_matches('/').to_string(),
            })
            .collect();
        Self::new(routes)
    }

    /// Finds the route with the longest prefix matching `path` on a segment
    /// boundary: `/api/auth` matches `/api/auth` and `/api/auth/login` but
    /// not `/api/authx`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&ServiceRoute> {
        self.routes
            .iter()
            .filter(|route| prefix_matches(route.prefix, path))
            .max_by_key(|route| route.prefix.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceRoute> {
        self.routes.iter()
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}
