// crates/scan-manager-entities/src/context.rs
// ============================================================================
// Module: Session Context
// Description: The explicit context value threaded through all repository
//              operations.
// Purpose: Replace global store/credential/cache state with one handle that
//          owns the store, the session user, and the NVT cache snapshot.
// Dependencies: crate::nvts, scan-manager-core, scan-manager-store
// ============================================================================

//! ## Overview
//! A [`Manage`] value is the single entry point to entity operations. It
//! owns the writer store handle, the optional session user (absent for
//! internal work such as the schedule tick acting per task owner), and the
//! in-memory NVT cache snapshot. Forked children must call
//! [`Manage::reinit_process`] to reopen the store before touching it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use scan_manager_core::CurrentUser;
use scan_manager_store::Store;
use scan_manager_store::StoreError;
use thiserror::Error;

use crate::nvts::NvtSnapshot;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Hard repository failure. Input conflicts and in-use refusals are not
/// errors; they are outcome values (see [`crate::outcome`]).
#[derive(Debug, Error)]
pub enum EntityError {
    /// Underlying store failure (programming error or contention surfaced
    /// past the retry loop).
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The store cannot be reopened after a fork.
    #[error("process reinit failed: {0}")]
    Reinit(String),
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Session context for repository operations.
///
/// # Invariants
/// - Exactly one `Manage` performs writes per store file at a time.
/// - `user` is `None` only for internal callers; such callers act with
///   per-entity credentials they establish themselves (the schedule tick
///   runs each start under the task owner).
pub struct Manage {
    /// Writer store handle.
    store: Store,
    /// Path the store was opened from; used by `reinit_process`.
    path: Option<PathBuf>,
    /// Authenticated session user, if any.
    user: Option<CurrentUser>,
    /// Current NVT cache snapshot; replaced wholesale on rebuild.
    nvts: Arc<NvtSnapshot>,
}

impl Manage {
    /// Wraps an open store with no session user.
    #[must_use]
    pub fn new(store: Store) -> Self {
        let path = store.path().map(std::path::Path::to_path_buf);
        Self {
            store,
            path,
            user: None,
            nvts: Arc::new(NvtSnapshot::default()),
        }
    }

    /// Sets the session user.
    pub fn set_user(&mut self, user: Option<CurrentUser>) {
        self.user = user;
    }

    /// Returns the session user.
    #[must_use]
    pub fn user(&self) -> Option<&CurrentUser> {
        self.user.as_ref()
    }

    /// Returns the session user's rid, if any.
    #[must_use]
    pub fn user_rid(&self) -> Option<i64> {
        self.user.as_ref().map(|user| user.rid)
    }

    /// Returns the store handle.
    pub fn store(&mut self) -> &mut Store {
        &mut self.store
    }

    /// Returns the current NVT cache snapshot.
    #[must_use]
    pub fn nvt_snapshot(&self) -> Arc<NvtSnapshot> {
        Arc::clone(&self.nvts)
    }

    /// Replaces the NVT cache snapshot. Readers holding the old `Arc` keep
    /// their consistent view.
    pub(crate) fn swap_nvt_snapshot(&mut self, snapshot: NvtSnapshot) {
        self.nvts = Arc::new(snapshot);
    }

    /// Reopens the store after a fork. The child must not reuse the
    /// parent's connection.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::Reinit`] when the store is in-memory or the
    /// reopen fails.
    pub fn reinit_process(&mut self) -> Result<(), EntityError> {
        let Some(path) = &self.path else {
            return Err(EntityError::Reinit("in-memory store cannot be reopened".to_string()));
        };
        self.store =
            Store::open(path).map_err(|err| EntityError::Reinit(err.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Current wall-clock time in unix seconds. 0 before the epoch.
#[must_use]
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use scan_manager_core::CurrentUser;
    use scan_manager_core::EntityUuid;
    use scan_manager_store::Store;

    use super::Manage;

    #[test]
    fn context_tracks_the_session_user() {
        let store = Store::open_in_memory().unwrap();
        let mut manage = Manage::new(store);
        assert!(manage.user().is_none());
        manage.set_user(Some(CurrentUser {
            rid: 3,
            uuid: EntityUuid::generate(),
            name: "alice".to_string(),
        }));
        assert_eq!(manage.user_rid(), Some(3));
    }

    #[test]
    fn reinit_is_refused_for_memory_stores() {
        let store = Store::open_in_memory().unwrap();
        let mut manage = Manage::new(store);
        assert!(manage.reinit_process().is_err());
    }
}
