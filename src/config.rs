//! Session configuration.

use std::time::Duration;

/// Number of stimulation channels on the device.
pub const CHANNEL_COUNT: usize = 12;

/// Number of waveform definitions that channels can choose between.
pub const WAVEFORM_SLOTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// Interval between iterations of the discovery and fault polling loops. This is also
    /// the upper bound on how long it takes a loop to notice it was stopped.
    pub poll_interval: Duration,
    /// Name of the FPGA configuration image with the stimulator control logic.
    pub bitstream: String,
    /// Load the configuration image even if its hash does not match. A stale but compatible
    /// image must not prevent operation.
    pub ignore_hash_error: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            bitstream: "OSC1_LITE_Control.bit".to_owned(),
            ignore_hash_error: true,
        }
    }
}
