//! Structured logging for collection runs.
//!
//! With the `tracing` feature enabled every collection gets a `DEBUG` span
//! carrying its kind and a stable run id, plus phase events; without it the
//! shims compile to nothing.

#[cfg(feature = "tracing")]
pub(crate) mod internal {
    use std::cell::Cell;

    use tracing::{span, Level};

    /// Collection phases, in execution order.
    #[derive(Debug, Clone, Copy)]
    pub(crate) enum GcPhase {
        Premark,
        Mark,
        Sweep,
    }

    thread_local! {
        static NEXT_RUN_ID: Cell<u64> = const { Cell::new(1) };
    }

    fn next_run_id() -> u64 {
        NEXT_RUN_ID.with(|id| {
            let v = id.get();
            id.set(v.wrapping_add(1));
            v
        })
    }

    pub(crate) fn collection_span(kind: &'static str) -> span::EnteredSpan {
        span!(Level::DEBUG, "gc_collect", kind, run_id = next_run_id()).entered()
    }

    pub(crate) fn phase_start(phase: GcPhase) {
        tracing::debug!(phase = ?phase, "phase_start");
    }

    pub(crate) fn phase_end(phase: GcPhase, objects: usize) {
        tracing::debug!(phase = ?phase, objects, "phase_end");
    }
}

#[cfg(not(feature = "tracing"))]
pub(crate) mod internal {
    #[derive(Debug, Clone, Copy)]
    pub(crate) enum GcPhase {
        Premark,
        Mark,
        Sweep,
    }

    pub(crate) struct EnteredSpan;

    pub(crate) fn collection_span(_kind: &'static str) -> EnteredSpan {
        EnteredSpan
    }

    pub(crate) fn phase_start(_phase: GcPhase) {}

    pub(crate) fn phase_end(_phase: GcPhase, _objects: usize) {}
}
