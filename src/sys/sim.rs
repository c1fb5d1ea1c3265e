//! In-process stand-in for an OSC1Lite board, for running the host side without hardware.

use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::channel::EncodedChannel;
use crate::config::CHANNEL_COUNT;
use crate::regs::channel::ChannelMask;
use super::{DeviceEntry, Transport, TransportError};

/// A transport call, as recorded by [`SimulatedTransport::calls`]. Queries of the open state
/// and the device count are not recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Enumerate(usize),
    Open(String),
    Close,
    LoadConfiguration(String, bool),
    Reset,
    InitOutputStage,
    EnableOutput,
    SetChannel(usize),
    Trigger(usize),
    SetTriggerOut(usize, bool),
    ChannelWarnings,
}

/// A one-shot failure of the next matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Open,
    Configure,
    Reset,
    InitOutputStage,
    EnableOutput,
    Close,
    SetChannel,
    Trigger,
    ChannelWarnings,
}

#[derive(Debug, Default)]
struct Inner {
    devices: Vec<DeviceEntry>,
    open: Option<String>,
    stale_image: bool,
    channels: Vec<Option<Vec<u32>>>,
    trigger_out: ChannelMask,
    overlap: ChannelMask,
    faults: Vec<Fault>,
    calls: Vec<Call>,
}

impl Inner {
    fn fail(&mut self, fault: Fault) -> Result<(), TransportError> {
        match self.faults.iter().position(|&pending| pending == fault) {
            Some(index) => {
                self.faults.remove(index);
                Err(TransportError::Io(
                    io::Error::new(io::ErrorKind::Other, format!("injected {:?} fault", fault))))
            }
            None => Ok(())
        }
    }

    fn require_open(&self) -> Result<(), TransportError> {
        match self.open {
            Some(_) => Ok(()),
            None => Err(TransportError::NotOpen),
        }
    }

    fn require_channel(channel: usize) -> Result<(), TransportError> {
        if channel < CHANNEL_COUNT {
            Ok(())
        } else {
            Err(TransportError::Other(format!("no channel {} on the board", channel).into()))
        }
    }

    fn clear_board(&mut self) {
        self.channels = vec![None; CHANNEL_COUNT];
        self.trigger_out = ChannelMask::empty();
        self.overlap = ChannelMask::empty();
    }
}

#[derive(Debug)]
pub struct SimulatedTransport {
    inner: Mutex<Inner>,
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTransport {
    pub fn new() -> SimulatedTransport {
        let mut inner = Inner::default();
        inner.clear_board();
        SimulatedTransport { inner: Mutex::new(inner) }
    }

    /// Create a transport with a device table of `(model, serial)` rows. Empty rows are kept,
    /// so a table with gaps can be simulated.
    pub fn with_devices(devices: &[(&str, &str)]) -> SimulatedTransport {
        let sim = Self::new();
        for &(model, serial) in devices {
            sim.attach(model, serial);
        }
        sim
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attach(&self, model: &str, serial: &str) {
        log::debug!("sim: attached {} {}", model, serial);
        self.lock().devices.push(DeviceEntry { model: model.to_owned(), serial: serial.to_owned() });
    }

    /// Remove a device from the table. If it is the open device, the board drops off the bus.
    pub fn detach(&self, serial: &str) {
        log::debug!("sim: detached {}", serial);
        let mut inner = self.lock();
        inner.devices.retain(|entry| entry.serial != serial);
        if inner.open.as_deref() == Some(serial) {
            inner.open = None;
            inner.clear_board();
        }
    }

    /// Make the loaded configuration image fail hash verification.
    pub fn set_stale_image(&self, stale: bool) {
        self.lock().stale_image = stale;
    }

    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    /// Set the channels that report an overlapped trigger. They keep reporting it on every
    /// poll until this is called again. Channels the board does not have are ignored.
    pub fn set_overlap(&self, channels: &[usize]) {
        self.lock().overlap = channels.iter()
            .filter(|&&channel| channel < CHANNEL_COUNT)
            .fold(ChannelMask::empty(), |mask, &channel| mask | ChannelMask::channel(channel));
    }

    /// Read back the settings last written to `channel`.
    pub fn channel(&self, channel: usize) -> Option<EncodedChannel> {
        self.lock().channels.get(channel)?.as_deref().and_then(EncodedChannel::from_words)
    }

    pub fn trigger_out(&self, channel: usize) -> bool {
        channel < CHANNEL_COUNT && self.lock().trigger_out.contains(ChannelMask::channel(channel))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }
}

impl Transport for SimulatedTransport {
    fn device_count(&self) -> usize {
        self.lock().devices.len()
    }

    fn enumerate(&self, index: usize) -> Option<DeviceEntry> {
        let mut inner = self.lock();
        inner.calls.push(Call::Enumerate(index));
        inner.devices.get(index).cloned()
    }

    fn open_by_serial(&self, serial: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.calls.push(Call::Open(serial.to_owned()));
        inner.fail(Fault::Open)?;
        if !inner.devices.iter().any(|entry| !entry.is_empty() && entry.serial == serial) {
            return Err(TransportError::DeviceNotFound(serial.to_owned()))
        }
        inner.open = Some(serial.to_owned());
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.calls.push(Call::Close);
        inner.fail(Fault::Close)?;
        inner.open = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.lock().open.is_some()
    }

    fn load_configuration(&self, image: &str, ignore_hash_error: bool)
            -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.calls.push(Call::LoadConfiguration(image.to_owned(), ignore_hash_error));
        inner.require_open()?;
        inner.fail(Fault::Configure)?;
        if inner.stale_image {
            if !ignore_hash_error {
                return Err(TransportError::HashMismatch(image.to_owned()))
            }
            log::debug!("sim: loading {} despite hash mismatch", image);
        }
        Ok(())
    }

    fn reset(&self) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.calls.push(Call::Reset);
        inner.require_open()?;
        inner.fail(Fault::Reset)?;
        inner.clear_board();
        Ok(())
    }

    fn init_output_stage(&self) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.calls.push(Call::InitOutputStage);
        inner.require_open()?;
        inner.fail(Fault::InitOutputStage)
    }

    fn enable_output(&self) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.calls.push(Call::EnableOutput);
        inner.require_open()?;
        inner.fail(Fault::EnableOutput)
    }

    fn set_channel(&self, channel: usize, data: &EncodedChannel) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.calls.push(Call::SetChannel(channel));
        inner.require_open()?;
        Inner::require_channel(channel)?;
        inner.fail(Fault::SetChannel)?;
        inner.channels[channel] = Some(data.to_words());
        Ok(())
    }

    fn trigger_channel(&self, channel: usize) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.calls.push(Call::Trigger(channel));
        inner.require_open()?;
        Inner::require_channel(channel)?;
        inner.fail(Fault::Trigger)
    }

    fn set_trigger_out(&self, channel: usize, enabled: bool) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.calls.push(Call::SetTriggerOut(channel, enabled));
        inner.require_open()?;
        Inner::require_channel(channel)?;
        inner.trigger_out.set(ChannelMask::channel(channel), enabled);
        Ok(())
    }

    fn channel_warnings(&self) -> Result<ChannelMask, TransportError> {
        let mut inner = self.lock();
        inner.calls.push(Call::ChannelWarnings);
        inner.require_open()?;
        inner.fail(Fault::ChannelWarnings)?;
        Ok(inner.overlap)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::ChannelInfo;

    #[test]
    fn test_channel_out_of_range() {
        let sim = SimulatedTransport::with_devices(&[("OSC1Lite", "SN001")]);
        sim.open_by_serial("SN001").unwrap();
        let idle = ChannelInfo::idle().encode().unwrap();
        assert!(matches!(sim.set_channel(CHANNEL_COUNT, &idle), Err(TransportError::Other(_))));
        assert!(matches!(sim.trigger_channel(CHANNEL_COUNT), Err(TransportError::Other(_))));
        assert!(matches!(sim.set_trigger_out(CHANNEL_COUNT, true), Err(TransportError::Other(_))));
        assert!(!sim.trigger_out(CHANNEL_COUNT));
        sim.set_overlap(&[2, CHANNEL_COUNT]);
        assert_eq!(sim.channel_warnings().unwrap(), ChannelMask::channel(2));
        assert_eq!(sim.channel(CHANNEL_COUNT), None);
    }

    #[test]
    fn test_commands_require_open() {
        let sim = SimulatedTransport::with_devices(&[("OSC1Lite", "SN001")]);
        assert!(matches!(sim.trigger_channel(0), Err(TransportError::NotOpen)));
        sim.open_by_serial("SN001").unwrap();
        assert!(sim.trigger_channel(0).is_ok());
    }
}
