//! Identity adapters.
//!
//! `AnonymousIdentity` and `StaticIdentity` always answer with a fixed user.
//! `ScopedIdentity` answers with the user bound to the current execution
//! context: the enclosing async task scope first, then the calling thread.

use callmeter_ports::{IdentityError, IdentityPort, UserId};
use std::cell::RefCell;
use std::future::Future;

/// Identity used when no locator is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymousIdentity {
    marker: UserId,
}

impl AnonymousIdentity {
    /// Answer every lookup with `marker`.
    #[must_use]
    pub const fn new(marker: UserId) -> Self {
        Self { marker }
    }
}

impl IdentityPort for AnonymousIdentity {
    fn current_user_id(&self) -> Result<UserId, IdentityError> {
        Ok(self.marker.clone())
    }
}

/// Identity pinned to one user (service accounts, batch jobs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity(UserId);

impl StaticIdentity {
    /// Pin lookups to `user`.
    #[must_use]
    pub const fn new(user: UserId) -> Self {
        Self(user)
    }
}

impl IdentityPort for StaticIdentity {
    fn current_user_id(&self) -> Result<UserId, IdentityError> {
        Ok(self.0.clone())
    }
}

tokio::task_local! {
    static TASK_USER: UserId;
}

thread_local! {
    static THREAD_USER: RefCell<Option<UserId>> = const { RefCell::new(None) };
}

/// Identity bound per execution context.
///
/// Lookups fail with `IdentityError::Unavailable` when nothing is bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopedIdentity;

impl ScopedIdentity {
    /// Bind `user` to the calling thread until the guard drops.
    ///
    /// Guards nest; dropping one restores the previously bound user.
    #[must_use = "the binding ends when the guard is dropped"]
    pub fn enter(user: UserId) -> ThreadUserGuard {
        let previous = THREAD_USER.with(|slot| slot.borrow_mut().replace(user));
        ThreadUserGuard { previous }
    }

    /// Run `future` with `user` bound to its task, across thread migrations.
    pub async fn scope<F>(user: UserId, future: F) -> F::Output
    where
        F: Future,
    {
        TASK_USER.scope(user, future).await
    }
}

impl IdentityPort for ScopedIdentity {
    fn current_user_id(&self) -> Result<UserId, IdentityError> {
        if let Ok(user) = TASK_USER.try_with(Clone::clone) {
            return Ok(user);
        }
        THREAD_USER
            .with(|slot| slot.borrow().clone())
            .ok_or_else(|| IdentityError::Unavailable {
                reason: "no user bound to the current execution context".into(),
            })
    }
}

/// Restores the previous thread binding on drop.
#[derive(Debug)]
pub struct ThreadUserGuard {
    previous: Option<UserId>,
}

impl Drop for ThreadUserGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        THREAD_USER.with(|slot| *slot.borrow_mut() = previous);
    }
}
