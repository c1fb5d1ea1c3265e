//! Background polling of device presence and device faults.
//!
//! Exactly one of the two loops runs at a time. Each loop runs while the shared [`Mode`] is
//! the one it was started for, and checks it once per poll interval.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::sleep;
use std::time::Duration;

use crate::device::{ConnectStep, Probe};
use crate::sys::Transport;
use crate::{Error, Result};

/// Attached devices, by serial number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceList(BTreeMap<String, String>);

impl DeviceList {
    pub fn insert(&mut self, serial: String, model: String) {
        self.0.insert(serial, model);
    }

    pub fn model(&self, serial: &str) -> Option<&str> {
        self.0.get(serial).map(String::as_str)
    }

    pub fn contains(&self, serial: &str) -> bool {
        self.0.contains_key(serial)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `(serial, model)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(serial, model)| (serial.as_str(), model.as_str()))
    }

    /// Keep `previous` selected if it is still attached, otherwise fall back to the first device.
    pub fn select<'a>(&'a self, previous: Option<&'a str>) -> Option<&'a str> {
        match previous {
            Some(serial) if self.contains(serial) => Some(serial),
            _ => self.0.keys().next().map(String::as_str),
        }
    }
}

impl<S: Into<String>, M: Into<String>> FromIterator<(S, M)> for DeviceList {
    fn from_iter<I: IntoIterator<Item = (S, M)>>(iter: I) -> Self {
        DeviceList(iter.into_iter().map(|(serial, model)| (serial.into(), model.into())).collect())
    }
}

/// Everything the host reports to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    DeviceListChanged(DeviceList),
    Connected { serial: String },
    Disconnected,
    ConnectFailed { step: ConnectStep, reason: String },
    UnexpectedDisconnect,
    OverlapWarning(usize),
    /// The fault poller could not read the device and stopped.
    PollFailed { reason: String },
}

pub(crate) fn emit(events: &Sender<Event>, event: Event) {
    if let Err(error) = events.send(event) {
        log::trace!("no receiver for {:?}", error.0);
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// No poll loop may run; set while the transport changes hands.
    Idle = 0,
    Discovering = 1,
    Connected = 2,
}

#[derive(Debug, Clone)]
pub(crate) struct ModeFlag(Arc<AtomicU8>);

impl ModeFlag {
    pub fn new(mode: Mode) -> ModeFlag {
        ModeFlag(Arc::new(AtomicU8::new(mode as u8)))
    }

    pub fn get(&self) -> Mode {
        match self.0.load(Ordering::SeqCst) {
            1 => Mode::Discovering,
            2 => Mode::Connected,
            _ => Mode::Idle,
        }
    }

    pub fn set(&self, mode: Mode) {
        self.0.store(mode as u8, Ordering::SeqCst)
    }
}

/// Read the device table. The first empty row ends the table, even if rows follow it.
pub fn list_devices<T: Transport + ?Sized>(transport: &T) -> DeviceList {
    let mut devices = DeviceList::default();
    for index in 0..transport.device_count() {
        match transport.enumerate(index) {
            Some(entry) if !entry.is_empty() => devices.insert(entry.serial, entry.model),
            _ => break,
        }
    }
    devices
}

/// Republish the attached devices whenever they change, while in discovery mode.
pub(crate) fn discover<T: Transport>(
    transport: Arc<T>,
    mode: ModeFlag,
    known: Arc<Mutex<DeviceList>>,
    events: Sender<Event>,
    interval: Duration,
) -> Result<()> {
    log::debug!("discovery: started");
    while mode.get() == Mode::Discovering {
        let devices = list_devices(&*transport);
        let changed = {
            let mut published = known.lock().unwrap_or_else(PoisonError::into_inner);
            if *published != devices {
                *published = devices.clone();
                true
            } else {
                false
            }
        };
        if changed {
            log::debug!("discovery: {} device(s) attached", devices.len());
            emit(&events, Event::DeviceListChanged(devices));
        }
        sleep(interval);
    }
    log::debug!("discovery: stopped");
    Ok(())
}

/// Report overlapped triggers and loss of the device, while in connected mode.
///
/// Returns [`Error::UnexpectedDisconnect`] if the device closes under the session, or the
/// transport error if the warnings cannot be read. Either way the event is sent first and the
/// loop never reconnects on its own.
pub(crate) fn watch_faults<T: Transport>(
    probe: Probe<T>,
    mode: ModeFlag,
    events: Sender<Event>,
    interval: Duration,
) -> Result<()> {
    log::debug!("fault poll: started");
    while mode.get() == Mode::Connected {
        if !probe.is_open() {
            log::warn!("device closed unexpectedly");
            emit(&events, Event::UnexpectedDisconnect);
            return Err(Error::UnexpectedDisconnect)
        }
        let channels = match probe.channel_warnings() {
            Ok(channels) => channels,
            Err(error) => {
                log::warn!("fault poll: cannot read channel warnings: {}", error);
                emit(&events, Event::PollFailed { reason: error.to_string() });
                return Err(error)
            }
        };
        for channel in channels {
            log::warn!("overlapped trigger detected on channel {}", channel);
            emit(&events, Event::OverlapWarning(channel));
        }
        sleep(interval);
    }
    log::debug!("fault poll: stopped");
    Ok(())
}
