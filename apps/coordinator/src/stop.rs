//! The Stop Broadcaster (C10): a single process-wide latched boolean.
//! Once set it is never cleared within a run. Loop heads poll it
//! non-blockingly; the `xiebo-infra-parser` crate is handed a capability
//! closure rather than a reference to this type, so the parser never
//! depends on the dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct StopBroadcaster {
    latched: Arc<AtomicBool>,
}

impl StopBroadcaster {
    /// The initial value is `false`. Several source variants of the
    /// original tool set this flag `true` at startup, which would halt
    /// execution before any work begins; that is treated as a bug here.
    pub fn new() -> Self {
        Self {
            latched: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_set(&self) -> bool {
        self.latched.load(Ordering::SeqCst)
    }

    pub fn set(&self) {
        if !self.latched.swap(true, Ordering::SeqCst) {
            tracing::warn!("🛑 stop broadcaster latched, fleet will wind down");
        }
    }

    /// A `Fn()` capability suitable for handing to `xiebo_infra_parser::OutputParser`.
    pub fn notify_hit_capability(&self) -> impl Fn() + Send + Sync + 'static {
        let latched = self.latched.clone();
        move || {
            latched.store(true, Ordering::SeqCst);
        }
    }

    /// Installs a SIGINT/SIGTERM handler that latches this broadcaster.
    pub fn install_signal_handler(&self) -> Result<(), ctrlc::Error> {
        let latched = self.latched.clone();
        ctrlc::set_handler(move || {
            tracing::warn!("operator interrupt received, latching stop broadcaster");
            latched.store(true, Ordering::SeqCst);
        })
    }
}

impl Default for StopBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset() {
        let stop = StopBroadcaster::new();
        assert!(!stop.is_set());
    }

    #[test]
    fn set_is_latched_and_idempotent() {
        let stop = StopBroadcaster::new();
        stop.set();
        stop.set();
        assert!(stop.is_set());
    }

    #[test]
    fn notify_hit_capability_latches_through_closure() {
        let stop = StopBroadcaster::new();
        let notify = stop.notify_hit_capability();
        notify();
        assert!(stop.is_set());
    }
}
