use std::sync::atomic::{AtomicU64, Ordering};

/// Telemetry counters for the presenter (presents, device recovery, 2D batching).
///
/// Relaxed atomics, so a handle can be read from another thread while the frame thread
/// keeps updating them.
#[derive(Debug, Default)]
pub struct FrameStats {
    presents_attempted: AtomicU64,
    presents_succeeded: AtomicU64,
    resets_attempted: AtomicU64,
    resets_succeeded: AtomicU64,
    frames_skipped: AtomicU64,
    draw_calls: AtomicU64,
    commands_skipped: AtomicU64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_presents_attempted(&self) {
        self.presents_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_presents_succeeded(&self) {
        self.presents_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resets_attempted(&self) {
        self.resets_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resets_succeeded(&self) {
        self.resets_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_frames_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_draw_calls(&self) {
        self.draw_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_commands_skipped(&self) {
        self.commands_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// `state_calls_elided` lives in the state cache and is filled in by the caller.
    pub fn snapshot(&self) -> FrameStatsSnapshot {
        FrameStatsSnapshot {
            presents_attempted: self.presents_attempted.load(Ordering::Relaxed),
            presents_succeeded: self.presents_succeeded.load(Ordering::Relaxed),
            resets_attempted: self.resets_attempted.load(Ordering::Relaxed),
            resets_succeeded: self.resets_succeeded.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            draw_calls: self.draw_calls.load(Ordering::Relaxed),
            commands_skipped: self.commands_skipped.load(Ordering::Relaxed),
            state_calls_elided: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStatsSnapshot {
    pub presents_attempted: u64,
    pub presents_succeeded: u64,
    pub resets_attempted: u64,
    pub resets_succeeded: u64,
    pub frames_skipped: u64,
    pub draw_calls: u64,
    pub commands_skipped: u64,
    pub state_calls_elided: u64,
}

impl FrameStatsSnapshot {
    pub fn to_json(self) -> String {
        // Hand-built; this runs on the frame thread.
        format!(
            "{{\"presents_attempted\":{},\"presents_succeeded\":{},\"resets_attempted\":{},\"resets_succeeded\":{},\"frames_skipped\":{},\"draw_calls\":{},\"commands_skipped\":{},\"state_calls_elided\":{}}}",
            self.presents_attempted,
            self.presents_succeeded,
            self.resets_attempted,
            self.resets_succeeded,
            self.frames_skipped,
            self.draw_calls,
            self.commands_skipped,
            self.state_calls_elided,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_json_contains_counters() {
        let stats = FrameStats::new();
        stats.inc_presents_attempted();
        stats.inc_presents_attempted();
        stats.inc_presents_succeeded();
        stats.inc_frames_skipped();
        let mut snapshot = stats.snapshot();
        snapshot.state_calls_elided = 5;
        let json = snapshot.to_json();
        assert!(json.contains("\"presents_attempted\":2"));
        assert!(json.contains("\"presents_succeeded\":1"));
        assert!(json.contains("\"frames_skipped\":1"));
        assert!(json.contains("\"state_calls_elided\":5"));
        assert!(json.starts_with('{') && json.ends_with('}'));
    }
}
