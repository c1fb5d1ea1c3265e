use bitflags::bitflags;

use crate::CHANNEL_COUNT;

bitflags! {
    /// OSC1Lite Channel Control Word
    ///
    /// Bits 16..=31 carry the pulse count and are not named flags; see
    /// [`ChannelControl::n_pulses`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelControl: u32 {
        const RiseMode0         = 1<<0;
        const RiseMode1         = 1<<1;
        const RiseMode2         = 1<<2;

        const Custom            = 1<<4;
        const ExternalTrigger   = 1<<5;
    }
}

impl ChannelControl {
    const RISE_MODE_MASK: u32 = 0b111;
    const N_PULSES_SHIFT: u32 = 16;

    pub fn rise_mode_code(self) -> u8 {
        (self.bits() & Self::RISE_MODE_MASK) as u8
    }

    pub fn with_rise_mode_code(self, code: u8) -> Self {
        let bits = self.bits() & !Self::RISE_MODE_MASK;
        Self::from_bits_retain(bits | (code as u32 & Self::RISE_MODE_MASK))
    }

    /// Pulse count; `0` means the pulse train repeats until stopped.
    pub fn n_pulses(self) -> u16 {
        (self.bits() >> Self::N_PULSES_SHIFT) as u16
    }

    pub fn with_n_pulses(self, n_pulses: u16) -> Self {
        let bits = self.bits() & ((1 << Self::N_PULSES_SHIFT) - 1);
        Self::from_bits_retain(bits | (n_pulses as u32) << Self::N_PULSES_SHIFT)
    }
}

bitflags! {
    /// Per-channel bit register, used for overlapped trigger status and trigger out enables.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChannelMask: u16 {
        const Ch0   = 1<<0;
        const Ch1   = 1<<1;
        const Ch2   = 1<<2;
        const Ch3   = 1<<3;
        const Ch4   = 1<<4;
        const Ch5   = 1<<5;
        const Ch6   = 1<<6;
        const Ch7   = 1<<7;
        const Ch8   = 1<<8;
        const Ch9   = 1<<9;
        const Ch10  = 1<<10;
        const Ch11  = 1<<11;
    }
}

impl ChannelMask {
    pub fn channel(index: usize) -> Self {
        assert!(index < CHANNEL_COUNT, "channel {} out of range", index);
        Self::from_bits_retain(1 << index)
    }

    /// Indices of the set channel bits, in ascending order.
    pub fn channels(self) -> impl Iterator<Item = usize> {
        (0..CHANNEL_COUNT).filter(move |&index| self.bits() & (1 << index) != 0)
    }
}
