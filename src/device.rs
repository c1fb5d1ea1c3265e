use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::channel::ChannelInfo;
use crate::config::{Configuration, CHANNEL_COUNT};
use crate::sys::{Transport, TransportError};
use crate::{Error, Result};

/// Step of the connect sequence, reported when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStep {
    Open,
    Configure,
    Reset,
    InitOutputStage,
    EnableOutput,
}

impl fmt::Display for ConnectStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Configure => write!(f, "load configuration image"),
            Self::Reset => write!(f, "reset"),
            Self::InitOutputStage => write!(f, "initialize output stage"),
            Self::EnableOutput => write!(f, "enable output"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Connected { serial: String },
}

/// The device session: the only writer of channel state on the board.
///
/// Holds the transport between a successful [`Device::connect`] and [`Device::disconnect`].
#[derive(Debug)]
pub struct Device<T: Transport> {
    transport: Option<Arc<T>>,
    state: State,
    config: Configuration,
}

impl<T: Transport> Device<T> {
    pub fn new(config: Configuration) -> Device<T> {
        Device { transport: None, state: State::Disconnected, config }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected { .. })
    }

    pub fn connect(&mut self, transport: Arc<T>, serial: &str) -> Result<()> {
        if self.transport.is_some() {
            log::debug!("connect({:?}) while connected, closing previous session", serial);
            self.disconnect();
        }
        self.state = State::Connecting;
        match self.startup(&transport, serial) {
            Ok(()) => {
                log::info!("connected to {}", serial);
                self.transport = Some(transport);
                self.state = State::Connected { serial: serial.to_owned() };
                Ok(())
            }
            Err((step, source)) => {
                log::debug!("connect({:?}) failed at {}: {}", serial, step, source);
                if step != ConnectStep::Open {
                    if let Err(error) = transport.close() {
                        log::warn!("failed to close device after aborted connect: {}", error);
                    }
                }
                self.state = State::Disconnected;
                Err(Error::ConnectFailed { step, source })
            }
        }
    }

    fn startup(&self, transport: &T, serial: &str)
            -> core::result::Result<(), (ConnectStep, TransportError)> {
        transport.open_by_serial(serial)
            .map_err(|error| (ConnectStep::Open, error))?;
        // a hash mismatch is tolerated when configured to; the transport applies the policy
        transport.load_configuration(&self.config.bitstream, self.config.ignore_hash_error)
            .map_err(|error| (ConnectStep::Configure, error))?;
        transport.reset()
            .map_err(|error| (ConnectStep::Reset, error))?;
        // the output stage must be initialized before it is enabled
        transport.init_output_stage()
            .map_err(|error| (ConnectStep::InitOutputStage, error))?;
        transport.enable_output()
            .map_err(|error| (ConnectStep::EnableOutput, error))?;
        Ok(())
    }

    /// Close the device and hand back the transport. Close errors are logged and dropped so that
    /// the host can always return to discovery.
    pub fn disconnect(&mut self) -> Option<Arc<T>> {
        let transport = self.transport.take();
        if let Some(transport) = transport.as_ref() {
            if let Err(error) = transport.close() {
                log::warn!("error closing device, ignored: {}", error);
            }
            log::info!("disconnected");
        }
        self.state = State::Disconnected;
        transport
    }

    /// Read-only access to the held transport, for the fault poller.
    pub fn probe(&self) -> Result<Probe<T>> {
        match self.transport.as_ref() {
            Some(transport) => Ok(Probe { transport: Arc::clone(transport) }),
            None => Err(Error::DeviceNotConnected),
        }
    }

    fn transport_for(&self, channel: usize) -> Result<&T> {
        if channel >= CHANNEL_COUNT {
            return Err(Error::InvalidChannel(channel))
        }
        self.transport.as_deref().ok_or(Error::DeviceNotConnected)
    }

    /// Write the waveform and trigger settings of `channel`. A channel has no output until
    /// it has been configured.
    pub fn set_channel(&self, channel: usize, info: &ChannelInfo) -> Result<()> {
        let transport = self.transport_for(channel)?;
        let encoded = info.encode()?;
        log::trace!("set_channel({}, {:08x?})", channel, encoded.to_words());
        Ok(transport.set_channel(channel, &encoded)?)
    }

    /// Fire a software trigger on `channel`. Externally triggered channels are fired by
    /// the trigger line instead.
    pub fn trigger_channel(&self, channel: usize) -> Result<()> {
        let transport = self.transport_for(channel)?;
        log::debug!("trigger_channel({})", channel);
        Ok(transport.trigger_channel(channel)?)
    }

    /// Return `channel` to idle output immediately, whatever it was playing.
    pub fn stop_channel(&self, channel: usize) -> Result<()> {
        self.set_channel(channel, &ChannelInfo::idle())?;
        self.trigger_channel(channel)
    }

    pub fn set_trigger_out(&self, channel: usize, enabled: bool) -> Result<()> {
        let transport = self.transport_for(channel)?;
        log::debug!("set_trigger_out({}, {})", channel, enabled);
        Ok(transport.set_trigger_out(channel, enabled)?)
    }

    /// Channels that reported an overlapped trigger.
    pub fn channel_warnings(&self) -> Result<BTreeSet<usize>> {
        self.probe()?.channel_warnings()
    }
}

/// The part of a connected transport the fault poller may use. It cannot write channel
/// settings or change the connection.
#[derive(Debug)]
pub struct Probe<T: Transport> {
    transport: Arc<T>,
}

impl<T: Transport> Probe<T> {
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    pub fn channel_warnings(&self) -> Result<BTreeSet<usize>> {
        Ok(self.transport.channel_warnings()?.channels().collect())
    }
}
