//! Replication-mode policy for cache invocations.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::cache::{Flag, InvocationFlags};

/// Decides, per cache invocation, whether synchronous replication must be
/// forced.
///
/// Two independent triggers feed the decision:
///
/// - a manager-wide switch ([`set_force_synchronous`]), used for
///   deployment-wide policy;
/// - a request-scoped one-shot flag ([`force_request_synchronous`]), raised
///   just before an operation that must be durably visible on a peer node —
///   the cross-node routing redirect — and consulted by every invocation
///   until the container's request-lifecycle hook calls [`end_request`].
///
/// The request flag is deliberately never cleared by the invoker itself:
/// clearing is the request lifecycle's responsibility, so a redirect keeps
/// forcing synchronous replication for the remainder of that request no
/// matter how many cache calls it still makes.
///
/// [`set_force_synchronous`]: ForceSynchronousCacheInvoker::set_force_synchronous
/// [`force_request_synchronous`]: ForceSynchronousCacheInvoker::force_request_synchronous
/// [`end_request`]: ForceSynchronousCacheInvoker::end_request
#[derive(Debug, Default)]
pub struct ForceSynchronousCacheInvoker {
    force_all: AtomicBool,
    force_request: AtomicBool,
}

impl ForceSynchronousCacheInvoker {
    /// Creates an invoker with both triggers unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or clears the manager-wide force-synchronous policy.
    pub fn set_force_synchronous(&self, force: bool) {
        self.force_all.store(force, Ordering::Release);
    }

    /// Returns the manager-wide policy switch.
    pub fn is_force_synchronous(&self) -> bool {
        self.force_all.load(Ordering::Acquire)
    }

    /// Forces synchronous replication for the remainder of the current
    /// request's invocations.
    pub fn force_request_synchronous(&self) {
        self.force_request.store(true, Ordering::Release);
    }

    /// Returns whether the request-scoped trigger is currently raised.
    pub fn is_request_synchronous(&self) -> bool {
        self.force_request.load(Ordering::Acquire)
    }

    /// Clears the request-scoped trigger. Called by the container's
    /// request-lifecycle hook when a request finishes.
    pub fn end_request(&self) {
        self.force_request.store(false, Ordering::Release);
    }

    /// Returns the effective flag set for one invocation: `flags`, plus
    /// [`Flag::ForceSynchronous`] when either trigger is raised.
    pub fn decorate(&self, flags: InvocationFlags) -> InvocationFlags {
        if self.is_force_synchronous() || self.is_request_synchronous() {
            flags.with(Flag::ForceSynchronous)
        } else {
            flags
        }
    }
}
