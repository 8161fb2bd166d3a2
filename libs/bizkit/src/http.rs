//! HTTP mount point shared by all modules.
//!
//! Every route provider is nested under `<api root>/<prefix>` with its own
//! middleware applied to that sub-tree only. Module-level middleware is kept
//! aside and wraps the whole API when the host takes the final router.
//! Nothing is composed before `take_router`, so a mount can still be withdrawn.

use axum::Router;
use parking_lot::Mutex;
use thiserror::Error;

use crate::contracts::MiddlewareProvider;

pub const DEFAULT_API_ROOT: &str = "/api/v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MountError {
    #[error("a router is already mounted at '{0}'")]
    Conflict(String),
    #[error("cannot mount '{0}': the router has already been handed to the server")]
    Sealed(String),
}

/// Join path segments into `/a/b`, ignoring stray slashes and empty parts.
pub fn join_path(root: &str, prefix: &str) -> String {
    let parts: Vec<&str> = [root, prefix]
        .into_iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect();
    format!("/{}", parts.join("/"))
}

#[derive(Default)]
struct MountState {
    mounts: Vec<(String, Router)>,
    global: Vec<MiddlewareProvider>,
    sealed: bool,
}

pub struct HttpMount {
    api_root: String,
    state: Mutex<MountState>,
}

impl std::fmt::Debug for HttpMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        let global: Vec<&str> = state.global.iter().map(|m| m.name.as_str()).collect();
        f.debug_struct("HttpMount")
            .field("api_root", &self.api_root)
            .field("mounted", &state.mounts.iter().map(|(p, _)| p).collect::<Vec<_>>())
            .field("global_middleware", &global)
            .field("sealed", &state.sealed)
            .finish()
    }
}

impl Default for HttpMount {
    fn default() -> Self {
        Self::new(DEFAULT_API_ROOT)
    }
}

impl HttpMount {
    pub fn new(api_root: &str) -> Self {
        Self {
            api_root: join_path(api_root, ""),
            state: Mutex::new(MountState::default()),
        }
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    /// Nest `router` at `<api root>/<prefix>` after wrapping it in `middleware`.
    ///
    /// Returns the full mount path.
    pub fn mount(
        &self,
        prefix: &str,
        router: Router,
        middleware: &[MiddlewareProvider],
    ) -> Result<String, MountError> {
        let path = join_path(&self.api_root, prefix);
        let mut state = self.state.lock();
        if state.sealed {
            return Err(MountError::Sealed(path));
        }
        if state.mounts.iter().any(|(p, _)| *p == path) {
            return Err(MountError::Conflict(path));
        }

        let sub = middleware.iter().fold(router, |r, m| m.apply(r));
        state.mounts.push((path.clone(), sub));

        tracing::debug!(
            path = %path,
            middleware = ?middleware.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            "Routes mounted"
        );
        Ok(path)
    }

    /// Register middleware wrapping the whole API tree.
    pub fn add_middleware(&self, middleware: MiddlewareProvider) -> Result<(), MountError> {
        let mut state = self.state.lock();
        if state.sealed {
            return Err(MountError::Sealed(middleware.name));
        }
        tracing::debug!(middleware = %middleware.name, "API middleware registered");
        state.global.push(middleware);
        Ok(())
    }

    /// Withdraw the sub-tree mounted at `path` (as returned by [`mount`](Self::mount)).
    ///
    /// Returns false when nothing is mounted there or the router is sealed.
    pub fn unmount(&self, path: &str) -> bool {
        let mut state = self.state.lock();
        if state.sealed {
            return false;
        }
        let Some(idx) = state.mounts.iter().position(|(p, _)| p == path) else {
            return false;
        };
        state.mounts.remove(idx);
        tracing::debug!(path = %path, "Routes unmounted");
        true
    }

    /// Withdraw the most recently added API middleware named `name`.
    pub fn remove_middleware(&self, name: &str) -> bool {
        let mut state = self.state.lock();
        if state.sealed {
            return false;
        }
        let Some(idx) = state.global.iter().rposition(|m| m.name == name) else {
            return false;
        };
        state.global.remove(idx);
        tracing::debug!(middleware = %name, "API middleware removed");
        true
    }

    pub fn mounted_paths(&self) -> Vec<String> {
        self.state.lock().mounts.iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }

    /// Hand the composed router to the server. Later mounts fail with `Sealed`.
    pub fn take_router(&self) -> Router {
        let mut state = self.state.lock();
        state.sealed = true;
        let router = std::mem::take(&mut state.mounts).into_iter().fold(
            Router::new(),
            |base, (path, sub)| {
                if path == "/" {
                    base.merge(sub)
                } else {
                    base.nest(&path, sub)
                }
            },
        );
        state.global.iter().fold(router, |r, m| m.apply(r))
    }
}
