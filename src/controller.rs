//! Switches the host between discovery and connected operation, and runs the channel actions
//! an operator performs.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::channel::{ChannelAction, ChannelInfo, ChannelState, TriggerSource, WaveformSlot};
use crate::config::{Configuration, CHANNEL_COUNT, WAVEFORM_SLOTS};
use crate::device::{Device, State};
use crate::sys::Transport;
use crate::waveform::Waveform;
use crate::watcher::{self, emit, DeviceList, Event, Mode, ModeFlag};
use crate::{Error, Result};

/// Owns the transport, the device session, and the single background poll task.
///
/// The poll task is always stopped and joined before the transport changes hands, so the
/// discovery loop, the fault poller, and connect/disconnect never touch the device at once.
#[derive(Debug)]
pub struct Controller<T: Transport + 'static> {
    transport: Arc<T>,
    device: Device<T>,
    mode: ModeFlag,
    known: Arc<Mutex<DeviceList>>,
    task: Option<JoinHandle<Result<()>>>,
    events: Sender<Event>,
    poll_interval: Duration,
    slots: Vec<WaveformSlot>,
    channels: Vec<ChannelState>,
}

impl<T: Transport + 'static> Controller<T> {
    /// Create a controller and start looking for devices.
    pub fn new(transport: Arc<T>, config: Configuration, events: Sender<Event>) -> Controller<T> {
        let mut controller = Controller {
            transport,
            poll_interval: config.poll_interval,
            device: Device::new(config),
            mode: ModeFlag::new(Mode::Idle),
            known: Arc::new(Mutex::new(DeviceList::default())),
            task: None,
            events,
            slots: (0..WAVEFORM_SLOTS).map(WaveformSlot::new).collect(),
            channels: vec![ChannelState::default(); CHANNEL_COUNT],
        };
        controller.resume_discovery();
        controller
    }

    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    pub fn state(&self) -> &State {
        self.device.state()
    }

    pub fn is_connected(&self) -> bool {
        self.device.is_connected()
    }

    /// Devices seen by the last discovery poll.
    pub fn known_devices(&self) -> DeviceList {
        self.known.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn can_connect(&self) -> bool {
        self.mode() == Mode::Discovering && !self.known_devices().is_empty()
    }

    fn stop_task(&mut self) {
        self.mode.set(Mode::Idle);
        if let Some(task) = self.task.take() {
            match task.join() {
                Ok(Ok(())) => (),
                Ok(Err(error)) => log::debug!("poll task ended with: {}", error),
                Err(_) => log::warn!("poll task panicked"),
            }
        }
    }

    /// Start the discovery loop. Needed after a failed connect, which leaves the controller
    /// idle.
    pub fn resume_discovery(&mut self) {
        if self.device.is_connected() || self.mode() == Mode::Discovering {
            return
        }
        self.stop_task();
        self.mode.set(Mode::Discovering);
        let (transport, mode, known, events) = (
            Arc::clone(&self.transport),
            self.mode.clone(),
            Arc::clone(&self.known),
            self.events.clone(),
        );
        let interval = self.poll_interval;
        self.task = Some(thread::spawn(move ||
            watcher::discover(transport, mode, known, events, interval)));
    }

    /// Connect to the device with `serial`. On failure the controller stays idle; call
    /// [`Controller::resume_discovery`] to look for devices again.
    pub fn connect(&mut self, serial: &str) -> Result<()> {
        if self.device.is_connected() {
            self.disconnect();
        }
        self.stop_task();
        if let Err(error) = self.device.connect(Arc::clone(&self.transport), serial) {
            if let Error::ConnectFailed { step, source } = &error {
                emit(&self.events, Event::ConnectFailed { step: *step, reason: source.to_string() });
            }
            return Err(error)
        }
        let probe = self.device.probe()?;
        self.mode.set(Mode::Connected);
        let (mode, events) = (self.mode.clone(), self.events.clone());
        let interval = self.poll_interval;
        self.task = Some(thread::spawn(move ||
            watcher::watch_faults(probe, mode, events, interval)));
        emit(&self.events, Event::Connected { serial: serial.to_owned() });
        Ok(())
    }

    /// Close the device and go back to discovery. Also used to tear down the session after
    /// an [`Event::UnexpectedDisconnect`] or an [`Event::PollFailed`].
    pub fn disconnect(&mut self) {
        if !self.device.is_connected() && self.mode() == Mode::Discovering {
            return
        }
        self.stop_task();
        if self.device.disconnect().is_some() {
            for channel in self.channels.iter_mut() {
                channel.trigger_out_enabled = false;
                channel.armed = false;
            }
            emit(&self.events, Event::Disconnected);
        }
        self.resume_discovery();
    }

    pub fn slot(&self, index: usize) -> Option<&WaveformSlot> {
        self.slots.get(index)
    }

    /// Replace the waveform of a slot. Slots always play at least one pulse; continuous output
    /// is chosen per channel.
    pub fn set_slot(&mut self, index: usize, waveform: Waveform, n_pulses: u16) -> Result<()> {
        if n_pulses == 0 {
            return Err(Error::InvalidWaveform("slot pulse count must be at least 1".to_owned()))
        }
        let slot = self.slots.get_mut(index).ok_or(Error::InvalidSlot(index))?;
        slot.waveform = waveform;
        slot.n_pulses = n_pulses;
        Ok(())
    }

    pub fn channel(&self, channel: usize) -> Option<&ChannelState> {
        self.channels.get(channel)
    }

    fn channel_mut(&mut self, channel: usize) -> Result<&mut ChannelState> {
        self.channels.get_mut(channel).ok_or(Error::InvalidChannel(channel))
    }

    pub fn select_waveform(&mut self, channel: usize, slot: usize) -> Result<()> {
        if slot >= self.slots.len() {
            return Err(Error::InvalidSlot(slot))
        }
        self.channel_mut(channel)?.waveform_slot = slot;
        Ok(())
    }

    pub fn set_trigger_source(&mut self, channel: usize, source: TriggerSource) -> Result<()> {
        self.channel_mut(channel)?.trigger_mode = source;
        Ok(())
    }

    pub fn set_continuous(&mut self, channel: usize, continuous: bool) -> Result<()> {
        self.channel_mut(channel)?.continuous = continuous;
        Ok(())
    }

    /// Send the channel's settings to the device. A PC triggered channel is fired right away;
    /// an externally triggered channel is armed by the write and fired by the trigger line.
    pub fn trigger(&mut self, channel: usize) -> Result<()> {
        let state = *self.channel_mut(channel)?;
        let info: ChannelInfo = state.channel_info(&self.slots)
            .ok_or(Error::InvalidSlot(state.waveform_slot))?;
        self.device.set_channel(channel, &info)?;
        if state.action() == ChannelAction::Trigger {
            self.device.trigger_channel(channel)?;
        }
        self.channel_mut(channel)?.armed = true;
        Ok(())
    }

    pub fn stop(&mut self, channel: usize) -> Result<()> {
        self.channel_mut(channel)?;
        self.device.stop_channel(channel)?;
        self.channel_mut(channel)?.armed = false;
        Ok(())
    }

    pub fn set_trigger_out(&mut self, channel: usize, enabled: bool) -> Result<()> {
        self.channel_mut(channel)?;
        self.device.set_trigger_out(channel, enabled)?;
        self.channel_mut(channel)?.trigger_out_enabled = enabled;
        Ok(())
    }
}

impl<T: Transport + 'static> Drop for Controller<T> {
    fn drop(&mut self) {
        self.stop_task();
        self.device.disconnect();
    }
}
