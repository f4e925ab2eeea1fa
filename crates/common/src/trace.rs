//! Narrow trace interface for structural events (B+Tree descent/split,
//! buffer eviction, and similar internal state transitions).
//!
//! Components that want optional human-readable tracing accept a `Tracer`
//! instead of reaching for `println!` directly. Tracing is off by default
//! and, when on, goes through the `log` crate at `trace` level so it
//! composes with whatever logger the host process installs.

/// A narrow, cheaply-cloned switch threaded through components that support
/// optional structural tracing (B+Tree descent/split, buffer eviction, ...).
#[derive(Clone, Copy, Debug, Default)]
pub struct Tracer {
    enabled: bool,
}

impl Tracer {
    pub fn enabled() -> Self {
        Self { enabled: true }
    }

    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Emits `line()` at `log::trace!` level, but only evaluates `line` when
    /// tracing is on.
    pub fn emit(&self, line: impl FnOnce() -> String) {
        if self.enabled {
            log::trace!("{}", line());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn disabled_tracer_never_evaluates_the_closure() {
        let calls = AtomicUsize::new(0);
        let tracer = Tracer::disabled();
        tracer.emit(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            "should not run".into()
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn enabled_tracer_evaluates_the_closure() {
        let calls = AtomicUsize::new(0);
        let tracer = Tracer::enabled();
        tracer.emit(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            "traced".into()
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
