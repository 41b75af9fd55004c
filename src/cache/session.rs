//! Process-wide identity state.
//!
//! The gate owns the current session state and resets the cache whenever the
//! signed-in identity changes, before the new state becomes visible.

use std::fmt;
use std::sync::{Arc, Mutex};

use metrics::counter;
use tokio::sync::watch;
use tracing::info;

use super::lock::mutex_lock;
use super::store::FetchCache;

const SOURCE: &str = "cache::session";

pub const METRIC_TRANSITION: &str = "memwall_session_transition_total";

pub type UserId = String;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// The first session check has not resolved yet.
    #[default]
    Unknown,
    Anonymous,
    Authenticated(UserId),
}

impl SessionState {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            SessionState::Authenticated(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    fn label(&self) -> &'static str {
        match self {
            SessionState::Unknown => "unknown",
            SessionState::Anonymous => "anonymous",
            SessionState::Authenticated(_) => "authenticated",
        }
    }

    /// Whether moving from `self` to `next` must wipe identity-scoped data.
    ///
    /// Leaving `Unknown` never resets: nothing can have been cached for a
    /// user before the first check resolved.
    pub fn requires_reset(&self, next: &SessionState) -> bool {
        match (self, next) {
            (SessionState::Unknown, _) | (_, SessionState::Unknown) => false,
            (SessionState::Anonymous, SessionState::Anonymous) => false,
            (SessionState::Authenticated(a), SessionState::Authenticated(b)) => a != b,
            _ => true,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Authenticated(id) => write!(f, "authenticated({id})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Hook run on identity change.
pub trait CacheReset: Send + Sync {
    fn reset(&self);
}

impl<V> CacheReset for FetchCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn reset(&self) {
        self.clear_all();
    }
}

/// Result of one state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    pub cache_cleared: bool,
}

pub struct SessionGate {
    // Serialises transitions; readers go through the watch channel.
    transitions: Mutex<()>,
    sender: watch::Sender<SessionState>,
    reset: Arc<dyn CacheReset>,
}

impl SessionGate {
    pub fn new(reset: Arc<dyn CacheReset>) -> Self {
        let (sender, _) = watch::channel(SessionState::Unknown);
        Self {
            transitions: Mutex::new(()),
            sender,
            reset,
        }
    }

    pub fn current(&self) -> SessionState {
        self.sender.borrow().clone()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.sender.borrow().user_id().map(str::to_string)
    }

    pub fn is_authenticated(&self) -> bool {
        self.sender.borrow().is_authenticated()
    }

    /// Receiver that observes every published state.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.sender.subscribe()
    }

    /// Move to `next`, clearing the cache first when the identity changes.
    ///
    /// Observers of the gate never see the new identity alongside data that
    /// was cached for the previous one.
    pub fn transition(&self, next: SessionState) -> Transition {
        self.apply(next, false)
    }

    /// Move to `next`, clearing the cache first regardless of the previous
    /// state.
    ///
    /// Used where the caller itself changed the identity (login, register,
    /// logout): reads made before the first check resolved are dropped too.
    pub fn establish(&self, next: SessionState) -> Transition {
        self.apply(next, true)
    }

    fn apply(&self, next: SessionState, force_reset: bool) -> Transition {
        let _guard = mutex_lock(&self.transitions, SOURCE, "transition");
        let from = self.current();
        let cache_cleared = force_reset || from.requires_reset(&next);

        if cache_cleared {
            self.reset.reset();
        }
        if from != next {
            self.sender.send_replace(next.clone());
            counter!(METRIC_TRANSITION, "to" => next.label()).increment(1);
            info!(from = %from, to = %next, cache_cleared, "Session state changed");
        }

        Transition {
            from,
            to: next,
            cache_cleared,
        }
    }

    pub fn sign_in(&self, user_id: impl Into<UserId>) -> Transition {
        self.transition(SessionState::Authenticated(user_id.into()))
    }

    pub fn sign_out(&self) -> Transition {
        self.transition(SessionState::Anonymous)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingReset(AtomicUsize);

    impl CacheReset for CountingReset {
        fn reset(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn gate() -> (Arc<CountingReset>, SessionGate) {
        let reset = Arc::new(CountingReset::default());
        let gate = SessionGate::new(reset.clone());
        (reset, gate)
    }

    #[test]
    fn initial_check_does_not_clear() {
        let (reset, gate) = gate();
        assert_eq!(gate.current(), SessionState::Unknown);

        let transition = gate.sign_in("u1");
        assert!(!transition.cache_cleared);
        assert_eq!(reset.0.load(Ordering::SeqCst), 0);
        assert_eq!(gate.user_id().as_deref(), Some("u1"));
    }

    #[test]
    fn identity_changes_clear_the_cache() {
        let (reset, gate) = gate();
        gate.sign_out();

        assert!(gate.sign_in("u1").cache_cleared);
        assert!(gate.sign_out().cache_cleared);
        assert!(gate.sign_in("u2").cache_cleared);
        assert!(gate.sign_in("u3").cache_cleared);
        assert_eq!(reset.0.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn same_identity_refresh_keeps_the_cache() {
        let (reset, gate) = gate();
        gate.sign_in("u1");

        let transition = gate.sign_in("u1");
        assert!(!transition.cache_cleared);
        assert_eq!(reset.0.load(Ordering::SeqCst), 0);

        gate.sign_out();
        assert!(!gate.sign_out().cache_cleared);
        assert_eq!(reset.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn establish_clears_even_when_leaving_unknown() {
        let (reset, gate) = gate();

        let transition = gate.establish(SessionState::Authenticated("u1".into()));
        assert!(transition.cache_cleared);
        assert_eq!(transition.from, SessionState::Unknown);
        assert_eq!(reset.0.load(Ordering::SeqCst), 1);

        assert!(gate.establish(SessionState::Anonymous).cache_cleared);
        assert!(gate.establish(SessionState::Anonymous).cache_cleared);
        assert_eq!(reset.0.load(Ordering::SeqCst), 3);
        assert_eq!(gate.current(), SessionState::Anonymous);
    }

    #[test]
    fn reset_runs_before_the_new_state_is_published() {
        #[derive(Default)]
        struct ResetRecorder {
            seen: Mutex<Vec<SessionState>>,
            receiver: std::sync::OnceLock<watch::Receiver<SessionState>>,
        }
        impl CacheReset for ResetRecorder {
            fn reset(&self) {
                if let Some(receiver) = self.receiver.get() {
                    let state = receiver.borrow().clone();
                    self.seen.lock().expect("seen").push(state);
                }
            }
        }

        let recorder = Arc::new(ResetRecorder::default());
        let gate = SessionGate::new(recorder.clone());
        recorder.receiver.set(gate.watch()).expect("receiver set once");

        gate.sign_out();
        gate.sign_in("u1");
        gate.sign_out();

        assert_eq!(
            *recorder.seen.lock().expect("seen"),
            vec![
                SessionState::Anonymous,
                SessionState::Authenticated("u1".into())
            ]
        );
    }

    #[tokio::test]
    async fn watchers_observe_transitions() {
        let (_, gate) = gate();
        let mut receiver = gate.watch();

        gate.sign_in("u1");
        receiver.changed().await.expect("changed");
        assert_eq!(
            *receiver.borrow_and_update(),
            SessionState::Authenticated("u1".into())
        );
    }
}
