use crate::regs::channel::ChannelMask;
use crate::channel::EncodedChannel;

pub mod sim;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("no device with serial {0:?} attached")]
    DeviceNotFound(String),
    #[error("device is not open")]
    NotOpen,
    #[error("configuration image {0:?} failed hash verification")]
    HashMismatch(String),
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(Box<dyn std::error::Error + Sync + Send + 'static>),
}

/// One row of the device table reported by the transport.
///
/// The vendor library reports an empty model and serial past the last attached device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceEntry {
    pub model: String,
    pub serial: String,
}

impl DeviceEntry {
    pub fn is_empty(&self) -> bool {
        self.model.is_empty() || self.serial.is_empty()
    }
}

/// Access to an OSC1Lite board through the vendor FPGA interface.
///
/// All methods take `&self`; implementations synchronize internally so that the fault poller can
/// query the board while the session owns it.
pub trait Transport: Send + Sync {
    fn device_count(&self) -> usize;
    fn enumerate(&self, index: usize) -> Option<DeviceEntry>;

    fn open_by_serial(&self, serial: &str) -> Result<(), TransportError>;
    fn close(&self) -> Result<(), TransportError>;
    fn is_open(&self) -> bool;

    /// Load the FPGA configuration image. With `ignore_hash_error`, an image whose hash does not
    /// match is loaded anyway.
    fn load_configuration(&self, image: &str, ignore_hash_error: bool)
        -> Result<(), TransportError>;
    fn reset(&self) -> Result<(), TransportError>;
    fn init_output_stage(&self) -> Result<(), TransportError>;
    fn enable_output(&self) -> Result<(), TransportError>;

    fn set_channel(&self, channel: usize, data: &EncodedChannel) -> Result<(), TransportError>;
    fn trigger_channel(&self, channel: usize) -> Result<(), TransportError>;
    fn set_trigger_out(&self, channel: usize, enabled: bool) -> Result<(), TransportError>;
    fn channel_warnings(&self) -> Result<ChannelMask, TransportError>;
}
