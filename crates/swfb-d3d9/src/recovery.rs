use tracing::{debug, warn};

use crate::device::CooperativeLevel;
use crate::stats::FrameStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Running,
    /// Lost and waiting for the device to become resettable.
    Lost,
}

/// What the frame pipeline may do this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameGate {
    Proceed,
    /// The device was reset in this poll; drawing continues on the same frame.
    ProceedAfterReset,
    /// Nothing may be drawn or presented this frame.
    Skip,
}

/// Device-loss state machine driven by the once-per-frame cooperative level poll.
///
/// The caller supplies the reset itself, so this only enforces the ordering: a device that
/// is lost but not resettable is skipped, a resettable one is reset before any drawing.
#[derive(Debug, Clone, Copy)]
pub struct DeviceRecovery {
    state: RecoveryState,
    skipped_in_a_row: u64,
}

impl Default for DeviceRecovery {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRecovery {
    pub fn new() -> Self {
        Self {
            state: RecoveryState::Running,
            skipped_in_a_row: 0,
        }
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    pub fn poll(
        &mut self,
        level: CooperativeLevel,
        stats: &FrameStats,
        reset: impl FnOnce() -> bool,
    ) -> FrameGate {
        match level {
            CooperativeLevel::Ok => {
                self.state = RecoveryState::Running;
                self.skipped_in_a_row = 0;
                FrameGate::Proceed
            }
            CooperativeLevel::NotReset => {
                stats.inc_resets_attempted();
                if reset() {
                    stats.inc_resets_succeeded();
                    debug!(skipped = self.skipped_in_a_row, "device reset after loss");
                    self.state = RecoveryState::Running;
                    self.skipped_in_a_row = 0;
                    FrameGate::ProceedAfterReset
                } else {
                    warn!("device reset failed; skipping frame");
                    self.skip(stats)
                }
            }
            CooperativeLevel::Lost => self.skip(stats),
        }
    }

    fn skip(&mut self, stats: &FrameStats) -> FrameGate {
        if self.state == RecoveryState::Running {
            debug!("device lost; frames are skipped until it can be reset");
        }
        self.state = RecoveryState::Lost;
        self.skipped_in_a_row += 1;
        stats.inc_frames_skipped();
        FrameGate::Skip
    }
}
