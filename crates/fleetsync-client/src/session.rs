//! Shared session state with single-flight login

use std::fmt;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};

use crate::error::Result;

/// A login attempt every concurrent caller can await
pub(crate) type LoginFuture = Shared<BoxFuture<'static, Result<String>>>;

/// Session token plus the slot for an in-flight login.
///
/// The token is only written by the login future itself, so concurrent
/// callers never race on it.
#[derive(Default)]
pub(crate) struct SessionState {
    token: RwLock<Option<String>>,
    in_flight: Mutex<Option<LoginFuture>>,
}

impl SessionState {
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn store(&self, token: String) {
        *self.token.write() = Some(token);
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }

    /// Clear the token only if it is still `stale`.
    ///
    /// Returns false when another caller already replaced it.
    pub fn invalidate(&self, stale: &str) -> bool {
        let mut token = self.token.write();
        if token.as_deref() == Some(stale) {
            *token = None;
            true
        } else {
            false
        }
    }

    /// Join the pending login, or start one with `start`.
    ///
    /// A finished attempt left in the slot (its callers were dropped before
    /// cleaning up) is replaced rather than replayed.
    pub fn join_or_start<F>(&self, start: F) -> LoginFuture
    where
        F: FnOnce() -> BoxFuture<'static, Result<String>>,
    {
        let mut slot = self.in_flight.lock();
        if let Some(pending) = slot.as_ref() {
            if pending.peek().is_none() {
                return pending.clone();
            }
        }
        let login = start().shared();
        *slot = Some(login.clone());
        login
    }

    /// Release the slot once `login` has completed
    pub fn finish(&self, login: &LoginFuture) {
        let mut slot = self.in_flight.lock();
        if slot.as_ref().is_some_and(|pending| pending.ptr_eq(login)) {
            *slot = None;
        }
    }

    pub fn login_in_flight(&self) -> bool {
        self.in_flight.lock().is_some()
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("authenticated", &self.token.read().is_some())
            .field("login_in_flight", &self.login_in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_invalidate_only_matching_token() {
        let state = SessionState::default();
        state.store("fresh".into());
        assert!(!state.invalidate("stale"));
        assert_eq!(state.token(), Some("fresh".into()));
        assert!(state.invalidate("fresh"));
        assert_eq!(state.token(), None);
    }

    #[tokio::test]
    async fn test_join_shares_pending_login() {
        let state = SessionState::default();
        let starts = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let counter = starts.clone();
        let first = state.join_or_start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let _ = rx.await;
                Ok("token".to_string())
            }
            .boxed()
        });
        let counter = starts.clone();
        let second = state.join_or_start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok("other".to_string()) }.boxed()
        });

        assert!(first.ptr_eq(&second));
        tx.send(()).unwrap();
        assert_eq!(second.clone().await.unwrap(), "token");
        state.finish(&second);
        assert!(!state.login_in_flight());
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_completed_slot_is_not_replayed() {
        let state = SessionState::default();
        let first = state.join_or_start(|| async { Ok("one".to_string()) }.boxed());
        first.clone().await.unwrap();
        // finish() deliberately skipped
        let second = state.join_or_start(|| async { Ok("two".to_string()) }.boxed());
        assert!(!first.ptr_eq(&second));
        assert_eq!(second.await.unwrap(), "two");
    }
}
