use std::time::Duration;

use rilbridge_frame::FrameConfig;

/// Number of call slots in the registry.
pub const MAX_CALLS: usize = 4;

/// Pause between stopping one tone and starting the next.
pub const DEFAULT_DTMF_SETTLE: Duration = Duration::from_micros(300);

/// Pause after releasing the foreground call before resuming a held one.
pub const DEFAULT_RESUME_SETTLE: Duration = Duration::from_millis(300);

/// Pause after holding the foreground call before answering a waiting one.
pub const DEFAULT_HOLD_SETTLE: Duration = Duration::from_millis(500);

/// Tunables for the call bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Registry capacity.
    pub max_calls: usize,
    pub dtmf_settle: Duration,
    pub resume_settle: Duration,
    pub hold_settle: Duration,
    /// Framing limits for the baseband link.
    pub frame: FrameConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_calls: MAX_CALLS,
            dtmf_settle: DEFAULT_DTMF_SETTLE,
            resume_settle: DEFAULT_RESUME_SETTLE,
            hold_settle: DEFAULT_HOLD_SETTLE,
            frame: FrameConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Configuration with every settle delay set to zero.
    ///
    /// Command ordering is unchanged; only the pauses between commands go away.
    pub fn without_settle_delays() -> Self {
        Self {
            dtmf_settle: Duration::ZERO,
            resume_settle: Duration::ZERO,
            hold_settle: Duration::ZERO,
            ..Self::default()
        }
    }
}
