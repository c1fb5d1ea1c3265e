//! Per-channel stimulation settings, as chosen by the operator and as sent to the device.

use crate::regs::channel::ChannelControl;
use crate::waveform::{EncodedWaveform, SquareWave, Waveform};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerSource {
    #[default]
    PCTrigger,
    ExternalTrigger,
}

/// Everything the device needs to run one channel. Built fresh for every trigger action.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub waveform: Waveform,
    /// Number of pulses to emit; `0` repeats until the channel is stopped.
    pub n_pulses: u16,
    pub ext_trig: TriggerSource,
}

impl ChannelInfo {
    pub fn new(waveform: Waveform, n_pulses: u16) -> ChannelInfo {
        ChannelInfo { waveform, n_pulses, ext_trig: TriggerSource::PCTrigger }
    }

    /// Build the settings for a channel that plays `slot`.
    pub fn build(slot: &WaveformSlot, ext_trig: TriggerSource, continuous: bool) -> ChannelInfo {
        ChannelInfo {
            waveform: slot.waveform.clone(),
            n_pulses: if continuous { 0 } else { slot.n_pulses },
            ext_trig,
        }
    }

    /// Zero amplitude, zero period output.
    pub fn idle() -> ChannelInfo {
        ChannelInfo::new(Waveform::Square(SquareWave::default()), 0)
    }

    pub fn encode(&self) -> Result<EncodedChannel> {
        let EncodedWaveform { mut control, payload } = self.waveform.encode()?;
        control = control.with_n_pulses(self.n_pulses);
        control.set(ChannelControl::ExternalTrigger,
            self.ext_trig == TriggerSource::ExternalTrigger);
        Ok(EncodedChannel { control, payload })
    }
}

/// Channel settings in device representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChannel {
    pub control: ChannelControl,
    pub payload: Vec<u32>,
}

impl EncodedChannel {
    const WAVEFORM_BITS: ChannelControl = ChannelControl::RiseMode0
        .union(ChannelControl::RiseMode1)
        .union(ChannelControl::RiseMode2)
        .union(ChannelControl::Custom);

    /// Control word followed by the payload, in the order the words are written to the device.
    pub fn to_words(&self) -> Vec<u32> {
        let mut words = Vec::with_capacity(1 + self.payload.len());
        words.push(self.control.bits());
        words.extend_from_slice(&self.payload);
        words
    }

    pub fn from_words(words: &[u32]) -> Option<EncodedChannel> {
        let (&control, payload) = words.split_first()?;
        Some(EncodedChannel {
            control: ChannelControl::from_bits_retain(control),
            payload: payload.to_vec(),
        })
    }

    pub fn decode(&self) -> Result<ChannelInfo> {
        let waveform = EncodedWaveform {
            control: self.control.intersection(Self::WAVEFORM_BITS),
            payload: self.payload.clone(),
        }.decode()?;
        let ext_trig = if self.control.contains(ChannelControl::ExternalTrigger) {
            TriggerSource::ExternalTrigger
        } else {
            TriggerSource::PCTrigger
        };
        Ok(ChannelInfo { waveform, n_pulses: self.control.n_pulses(), ext_trig })
    }
}

/// A named waveform definition that channels refer to by index.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformSlot {
    pub label: String,
    pub waveform: Waveform,
    pub n_pulses: u16,
}

impl WaveformSlot {
    pub fn new(index: usize) -> WaveformSlot {
        WaveformSlot {
            label: format!("Waveform {}", index + 1),
            waveform: Waveform::Square(SquareWave {
                amplitude: 2000.0,
                pulse_width: 0.1,
                period: 0.2,
                rise_mode: Default::default(),
            }),
            n_pulses: 1,
        }
    }
}

/// What the channel's trigger action does on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAction {
    /// Write the settings and fire a software trigger.
    Trigger,
    /// Write the settings; the external trigger line fires the channel.
    Update,
}

/// Operator-facing state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelState {
    pub waveform_slot: usize,
    pub trigger_mode: TriggerSource,
    pub continuous: bool,
    pub trigger_out_enabled: bool,
    pub armed: bool,
}

impl ChannelState {
    pub fn action(&self) -> ChannelAction {
        match self.trigger_mode {
            TriggerSource::PCTrigger => ChannelAction::Trigger,
            TriggerSource::ExternalTrigger => ChannelAction::Update,
        }
    }

    pub fn channel_info(&self, slots: &[WaveformSlot]) -> Option<ChannelInfo> {
        slots.get(self.waveform_slot)
            .map(|slot| ChannelInfo::build(slot, self.trigger_mode, self.continuous))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::waveform::{CustomWave, RiseMode};

    #[test]
    fn test_continuous_forces_zero_pulses() {
        let mut slot = WaveformSlot::new(0);
        for n_pulses in [1, 2, 100, 0xffff] {
            slot.n_pulses = n_pulses;
            let info = ChannelInfo::build(&slot, TriggerSource::PCTrigger, true);
            assert_eq!(info.n_pulses, 0);
            let info = ChannelInfo::build(&slot, TriggerSource::ExternalTrigger, false);
            assert_eq!(info.n_pulses, n_pulses);
            assert_eq!(info.ext_trig, TriggerSource::ExternalTrigger);
        }
    }

    #[test]
    fn test_channel_info_from_state() {
        let slots = [WaveformSlot::new(0), WaveformSlot::new(1)];
        let state = ChannelState { waveform_slot: 1, continuous: true, ..Default::default() };
        let info = state.channel_info(&slots).unwrap();
        assert_eq!(info.waveform, slots[1].waveform);
        assert_eq!(info.n_pulses, 0);
        let state = ChannelState { waveform_slot: 2, ..Default::default() };
        assert_eq!(state.channel_info(&slots), None);
    }

    #[test]
    fn test_action() {
        let mut state = ChannelState::default();
        assert_eq!(state.action(), ChannelAction::Trigger);
        state.trigger_mode = TriggerSource::ExternalTrigger;
        assert_eq!(state.action(), ChannelAction::Update);
    }

    #[test]
    fn test_encode_channel() {
        let info = ChannelInfo {
            waveform: Waveform::Square(SquareWave {
                amplitude: 10.0, pulse_width: 0.001, period: 0.002, rise_mode: RiseMode::ms0_5,
            }),
            n_pulses: 42,
            ext_trig: TriggerSource::ExternalTrigger,
        };
        let encoded = info.encode().unwrap();
        assert_eq!(encoded.control.n_pulses(), 42);
        assert_eq!(encoded.control.rise_mode_code(), 2);
        assert!(encoded.control.contains(ChannelControl::ExternalTrigger));
        assert_eq!(encoded.payload, vec![10_000, 1_000, 2_000]);
        assert_eq!(encoded.decode().unwrap(), info);
    }

    #[test]
    fn test_words() {
        let info = ChannelInfo::new(Waveform::Custom(CustomWave::new(vec![1.0, 2.0])), 3);
        let encoded = info.encode().unwrap();
        let words = encoded.to_words();
        assert_eq!(words.len(), 3);
        assert_eq!(words[0], encoded.control.bits());
        assert_eq!(EncodedChannel::from_words(&words), Some(encoded));
        assert_eq!(EncodedChannel::from_words(&[]), None);
    }

    #[test]
    fn test_idle() {
        let encoded = ChannelInfo::idle().encode().unwrap();
        assert_eq!(encoded.payload, vec![0, 0, 0]);
        assert_eq!(encoded.control, ChannelControl::empty());
    }
}
