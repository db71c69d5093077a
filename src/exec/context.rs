use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cancellation and deadline shared by the processes of one invocation.
///
/// A context derived with [`Context::with_timeout`] is done once it is
/// cancelled, its deadline passed or its parent is done. Cancelling a derived
/// context leaves the parent untouched.
#[derive(Debug, Clone)]
pub struct Context {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
    parent: Option<Arc<Context>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context without deadline that is only done when cancelled.
    pub fn background() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
            parent: None,
        }
    }

    /// Derive a context that is done at the latest after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
            parent: Some(Arc::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_done(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
            || self.parent.as_ref().is_some_and(|parent| parent.is_done())
    }

    /// Earliest deadline of this context and its parents.
    pub fn deadline(&self) -> Option<Instant> {
        let parent = self.parent.as_ref().and_then(|parent| parent.deadline());
        match (self.deadline, parent) {
            (Some(own), Some(parent)) => Some(own.min(parent)),
            (own, parent) => own.or(parent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_done_only_after_cancel() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert_eq!(ctx.deadline(), None);

        ctx.clone().cancel();
        assert!(ctx.is_done());
    }

    #[test]
    fn deadline_expires() {
        let ctx = Context::background().with_timeout(Duration::ZERO);
        assert!(ctx.is_done());
    }

    #[test]
    fn derived_context_follows_parent() {
        let parent = Context::background();
        let child = parent.with_timeout(Duration::from_secs(3600));
        assert!(!child.is_done());

        parent.cancel();
        assert!(child.is_done());
    }

    #[test]
    fn cancelling_child_keeps_parent_running() {
        let parent = Context::background();
        let child = parent.with_timeout(Duration::from_secs(3600));

        child.cancel();
        assert!(child.is_done());
        assert!(!parent.is_done());
    }

    #[test]
    fn earliest_deadline_wins() {
        let parent = Context::background().with_timeout(Duration::from_secs(10));
        let child = parent.with_timeout(Duration::from_secs(3600));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
