//! Host side control of OSC1Lite optogenetic stimulators.
//!
//! [`Controller`] discovers attached devices, connects to one, and then watches it for
//! overlapped triggers and loss of connection, reporting everything as [`Event`]s. The
//! hardware is reached through a [`Transport`]; [`SimulatedTransport`] stands in for it.

mod sys;
mod regs;
mod config;
mod waveform;
mod channel;
mod device;
mod watcher;
mod controller;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid waveform: {0}")]
    InvalidWaveform(String),
    #[error("channel {0} does not exist")]
    InvalidChannel(usize),
    #[error("waveform slot {0} does not exist")]
    InvalidSlot(usize),
    #[error("device not connected")]
    DeviceNotConnected,
    #[error("device error: {0}")]
    Device(#[from] TransportError),
    #[error("connect failed at step '{step}': {source}")]
    ConnectFailed {
        step: ConnectStep,
        #[source]
        source: TransportError,
    },
    #[error("device disconnected unexpectedly")]
    UnexpectedDisconnect,
}

pub type Result<T> =
    core::result::Result<T, Error>;

pub use sys::{
    Transport,
    TransportError,
    DeviceEntry,
};

pub use sys::sim::{
    SimulatedTransport,
    Call,
    Fault,
};

pub use regs::channel::{
    ChannelControl,
    ChannelMask,
};

pub use config::{
    CHANNEL_COUNT,
    WAVEFORM_SLOTS,
    Configuration,
};

pub use waveform::{
    RiseMode,
    SquareWave,
    CustomWave,
    Waveform,
    EncodedWaveform,
    ParseError,
};

pub use channel::{
    TriggerSource,
    ChannelInfo,
    EncodedChannel,
    WaveformSlot,
    ChannelAction,
    ChannelState,
};

pub use device::{
    ConnectStep,
    State,
    Device,
    Probe,
};

pub use watcher::{
    DeviceList,
    Event,
    Mode,
    list_devices,
};

pub use controller::Controller;
