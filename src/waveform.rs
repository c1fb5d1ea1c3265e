//! Stimulation waveforms and their encoding into channel control words.

use std::path::Path;

use crate::regs::channel::ChannelControl;
use crate::{Error, Result};

const NANOAMPS_PER_MICROAMP: f64 = 1e3;
const MICROSECONDS_PER_SECOND: f64 = 1e6;

// a preview of a pathologically short period would otherwise never finish
const PREVIEW_MAX_PULSES: usize = 10_000;

/// Rise time class of a square pulse. The device only distinguishes these five classes.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RiseMode {
    #[default]
    ms0,
    ms0_1,
    ms0_5,
    ms1,
    ms2,
}

impl RiseMode {
    /// Classify a rise time in milliseconds. Each threshold belongs to the upper class.
    pub fn from_rise_time(rise_time_ms: f64) -> Self {
        if rise_time_ms < 0.05 {
            Self::ms0
        } else if rise_time_ms < 0.3 {
            Self::ms0_1
        } else if rise_time_ms < 0.75 {
            Self::ms0_5
        } else if rise_time_ms < 1.5 {
            Self::ms1
        } else {
            Self::ms2
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::ms0),
            1 => Some(Self::ms0_1),
            2 => Some(Self::ms0_5),
            3 => Some(Self::ms1),
            4 => Some(Self::ms2),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::ms0   => 0,
            Self::ms0_1 => 1,
            Self::ms0_5 => 2,
            Self::ms1   => 3,
            Self::ms2   => 4,
        }
    }

    pub fn nominal_ms(self) -> f64 {
        match self {
            Self::ms0   => 0.0,
            Self::ms0_1 => 0.1,
            Self::ms0_5 => 0.5,
            Self::ms1   => 1.0,
            Self::ms2   => 2.0,
        }
    }
}

/// Square pulse train. The all-zero default is the idle output.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SquareWave {
    /// Pulse amplitude in µA.
    pub amplitude: f64,
    /// Pulse width in seconds.
    pub pulse_width: f64,
    /// Pulse period in seconds.
    pub period: f64,
    pub rise_mode: RiseMode,
}

impl SquareWave {
    pub fn from_rise_time(amplitude: f64, pulse_width: f64, period: f64, rise_time_ms: f64)
            -> SquareWave {
        SquareWave {
            amplitude,
            pulse_width,
            period,
            rise_mode: RiseMode::from_rise_time(rise_time_ms),
        }
    }

    fn encode(&self) -> Result<EncodedWaveform> {
        let payload = vec![
            scale_to_word(self.amplitude, NANOAMPS_PER_MICROAMP, "amplitude")?,
            scale_to_word(self.pulse_width, MICROSECONDS_PER_SECOND, "pulse width")?,
            scale_to_word(self.period, MICROSECONDS_PER_SECOND, "period")?,
        ];
        Ok(EncodedWaveform {
            control: ChannelControl::empty().with_rise_mode_code(self.rise_mode.code()),
            payload,
        })
    }

    fn preview(&self, n_pulses: u16, x_limit: f64) -> Vec<(f64, f64)> {
        if self.period <= 0.0 {
            return vec![(0.0, 0.0), (x_limit, 0.0)];
        }
        let rise_time = self.rise_mode.nominal_ms() / 1000.0;
        let max_pulses = match n_pulses {
            0 => PREVIEW_MAX_PULSES,
            n => (n as usize).min(PREVIEW_MAX_PULSES),
        };
        let mut points = vec![(0.0, 0.0)];
        let mut offset = 0.0;
        for _ in 0..max_pulses {
            if offset >= x_limit { break }
            points.extend_from_slice(&[
                (offset + rise_time, self.amplitude),
                (offset + self.pulse_width - rise_time, self.amplitude),
                (offset + self.pulse_width, 0.0),
                (offset + self.period, 0.0),
            ]);
            offset += self.period;
        }
        if offset < x_limit {
            points.push((x_limit, 0.0));
        }
        points
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("cannot read waveform file: {0}")]
    Io(#[from] std::io::Error),
    #[error("sample #{position} is not a number: {token:?}")]
    InvalidSample { position: usize, token: String },
}

/// Arbitrary amplitude samples, played back one per device sample period.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CustomWave {
    pub samples: Vec<f64>,
}

impl CustomWave {
    pub fn new(samples: Vec<f64>) -> CustomWave {
        CustomWave { samples }
    }

    /// Parse whitespace separated samples, as found in `.cwave` files.
    pub fn parse(text: &str) -> std::result::Result<CustomWave, ParseError> {
        let samples = text.split_whitespace()
            .enumerate()
            .map(|(position, token)| token.parse::<f64>()
                .map_err(|_| ParseError::InvalidSample { position, token: token.to_owned() }))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(CustomWave { samples })
    }

    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<CustomWave, ParseError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let wave = Self::parse(&text)?;
        log::debug!("loaded {} samples from {}", wave.samples.len(), path.as_ref().display());
        Ok(wave)
    }

    fn encode(&self) -> Result<EncodedWaveform> {
        let mut samples = Vec::with_capacity(self.samples.len());
        for (index, &sample) in self.samples.iter().enumerate() {
            let narrow = sample as f32;
            if !narrow.is_finite() {
                return Err(Error::InvalidWaveform(
                    format!("sample #{} ({}) is not representable", index, sample)));
            }
            samples.push(narrow);
        }
        Ok(EncodedWaveform {
            control: ChannelControl::Custom,
            payload: bytemuck::cast_slice::<f32, u32>(&samples).to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Waveform {
    Square(SquareWave),
    Custom(CustomWave),
}

impl Default for Waveform {
    fn default() -> Self {
        Waveform::Square(SquareWave::default())
    }
}

impl From<SquareWave> for Waveform {
    fn from(wave: SquareWave) -> Self {
        Self::Square(wave)
    }
}

impl From<CustomWave> for Waveform {
    fn from(wave: CustomWave) -> Self {
        Self::Custom(wave)
    }
}

impl Waveform {
    pub fn encode(&self) -> Result<EncodedWaveform> {
        match self {
            Self::Square(wave) => wave.encode(),
            Self::Custom(wave) => wave.encode(),
        }
    }

    /// Outline of the output as `(seconds, µA)` points for square waves, or `(index, sample)`
    /// points for custom waves. `n_pulses == 0` draws pulses up to `x_limit`.
    pub fn preview(&self, n_pulses: u16, x_limit: f64) -> Vec<(f64, f64)> {
        match self {
            Self::Square(wave) => wave.preview(n_pulses, x_limit),
            Self::Custom(wave) =>
                wave.samples.iter().enumerate().map(|(index, &y)| (index as f64, y)).collect(),
        }
    }
}

/// Waveform in device representation: the waveform bits of the channel control word and
/// the words that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedWaveform {
    pub control: ChannelControl,
    pub payload: Vec<u32>,
}

impl EncodedWaveform {
    pub fn decode(&self) -> Result<Waveform> {
        if self.control.contains(ChannelControl::Custom) {
            let samples = bytemuck::cast_slice::<u32, f32>(&self.payload)
                .iter()
                .map(|&sample| sample as f64)
                .collect();
            return Ok(Waveform::Custom(CustomWave { samples }))
        }
        let rise_mode = RiseMode::from_code(self.control.rise_mode_code())
            .ok_or_else(|| Error::InvalidWaveform(
                format!("unknown rise mode {}", self.control.rise_mode_code())))?;
        match self.payload[..] {
            [amplitude, pulse_width, period] => Ok(Waveform::Square(SquareWave {
                amplitude: amplitude as f64 / NANOAMPS_PER_MICROAMP,
                pulse_width: pulse_width as f64 / MICROSECONDS_PER_SECOND,
                period: period as f64 / MICROSECONDS_PER_SECOND,
                rise_mode,
            })),
            _ => Err(Error::InvalidWaveform(
                format!("square wave needs 3 words, got {}", self.payload.len()))),
        }
    }
}

fn scale_to_word(value: f64, scale: f64, quantity: &str) -> Result<u32> {
    if !value.is_finite() {
        return Err(Error::InvalidWaveform(format!("{} is not finite", quantity)))
    }
    if value < 0.0 {
        return Err(Error::InvalidWaveform(format!("{} is negative ({})", quantity, value)))
    }
    let scaled = (value * scale).round();
    if scaled > u32::MAX as f64 {
        return Err(Error::InvalidWaveform(format!("{} is out of range ({})", quantity, value)))
    }
    Ok(scaled as u32)
}

#[cfg(test)]
mod test {
    use super::*;

    fn square(amplitude: f64, pulse_width: f64, period: f64, rise_mode: RiseMode) -> Waveform {
        Waveform::Square(SquareWave { amplitude, pulse_width, period, rise_mode })
    }

    #[test]
    fn test_rise_mode_thresholds() {
        assert_eq!(RiseMode::from_rise_time(0.0), RiseMode::ms0);
        assert_eq!(RiseMode::from_rise_time(0.0499), RiseMode::ms0);
        assert_eq!(RiseMode::from_rise_time(0.05), RiseMode::ms0_1);
        assert_eq!(RiseMode::from_rise_time(0.2999), RiseMode::ms0_1);
        assert_eq!(RiseMode::from_rise_time(0.3), RiseMode::ms0_5);
        assert_eq!(RiseMode::from_rise_time(0.75), RiseMode::ms1);
        assert_eq!(RiseMode::from_rise_time(1.4999), RiseMode::ms1);
        assert_eq!(RiseMode::from_rise_time(1.5), RiseMode::ms2);
        assert_eq!(RiseMode::from_rise_time(100.0), RiseMode::ms2);
    }

    #[test]
    fn test_rise_mode_monotonic() {
        let mut previous = 0;
        for step in 0..400 {
            let code = RiseMode::from_rise_time(step as f64 * 0.005).code();
            assert!(code == previous || code == previous + 1);
            previous = code;
        }
        assert_eq!(previous, 4);
    }

    #[test]
    fn test_rise_mode_codes() {
        for code in 0..5 {
            assert_eq!(RiseMode::from_code(code).map(RiseMode::code), Some(code));
        }
        assert_eq!(RiseMode::from_code(5), None);
    }

    #[test]
    fn test_from_rise_time() {
        let wave = SquareWave::from_rise_time(2000.0, 0.1, 0.2, 0.5);
        assert_eq!(wave.rise_mode, RiseMode::ms0_5);
        assert_eq!(wave.amplitude, 2000.0);
    }

    #[test]
    fn test_square_encoding() {
        let encoded = square(2000.0, 0.1, 0.2, RiseMode::ms1).encode().unwrap();
        assert_eq!(encoded.control.rise_mode_code(), 3);
        assert!(!encoded.control.contains(ChannelControl::Custom));
        assert_eq!(encoded.payload, vec![2_000_000, 100_000, 200_000]);
    }

    #[test]
    fn test_square_rejects_negative_times() {
        assert!(matches!(square(1.0, -0.1, 0.2, RiseMode::ms0).encode(),
            Err(Error::InvalidWaveform(_))));
        assert!(matches!(square(1.0, 0.1, -0.2, RiseMode::ms0).encode(),
            Err(Error::InvalidWaveform(_))));
        assert!(matches!(square(-1.0, 0.1, 0.2, RiseMode::ms0).encode(),
            Err(Error::InvalidWaveform(_))));
        assert!(matches!(square(f64::NAN, 0.1, 0.2, RiseMode::ms0).encode(),
            Err(Error::InvalidWaveform(_))));
        assert!(matches!(square(1.0, 0.1, 1e9, RiseMode::ms0).encode(),
            Err(Error::InvalidWaveform(_))));
    }

    #[test]
    fn test_idle_square_encodes_to_zero() {
        let encoded = Waveform::default().encode().unwrap();
        assert_eq!(encoded.payload, vec![0, 0, 0]);
        assert_eq!(encoded.control, ChannelControl::empty());
    }

    #[test]
    fn test_encoding_stable_under_decode() {
        let waves = [
            square(2000.0, 0.1, 0.2, RiseMode::ms0),
            square(0.3333, 0.0000017, 1.23456789, RiseMode::ms2),
            Waveform::Custom(CustomWave::new(vec![0.0, 1.5, -2.25, 1e-7, 123456.789])),
            Waveform::Custom(CustomWave::default()),
        ];
        for wave in waves {
            let encoded = wave.encode().unwrap();
            let decoded = encoded.decode().unwrap();
            assert_eq!(decoded.encode().unwrap(), encoded, "unstable encoding for {:?}", wave);
        }
    }

    #[test]
    fn test_empty_custom_wave() {
        let encoded = Waveform::Custom(CustomWave::default()).encode().unwrap();
        assert!(encoded.control.contains(ChannelControl::Custom));
        assert!(encoded.payload.is_empty());
    }

    #[test]
    fn test_custom_rejects_unrepresentable() {
        let wave = Waveform::Custom(CustomWave::new(vec![1.0, f64::INFINITY]));
        assert!(matches!(wave.encode(), Err(Error::InvalidWaveform(_))));
        let wave = Waveform::Custom(CustomWave::new(vec![1e300]));
        assert!(matches!(wave.encode(), Err(Error::InvalidWaveform(_))));
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        let encoded = EncodedWaveform { control: ChannelControl::empty(), payload: vec![1, 2] };
        assert!(matches!(encoded.decode(), Err(Error::InvalidWaveform(_))));
        let encoded = EncodedWaveform {
            control: ChannelControl::empty().with_rise_mode_code(7),
            payload: vec![1, 2, 3],
        };
        assert!(matches!(encoded.decode(), Err(Error::InvalidWaveform(_))));
    }

    #[test]
    fn test_parse_custom() {
        let wave = CustomWave::parse("0 1.5\n-2\t3e2\n").unwrap();
        assert_eq!(wave.samples, vec![0.0, 1.5, -2.0, 300.0]);
        assert_eq!(CustomWave::parse("  \n").unwrap().samples, Vec::<f64>::new());
    }

    #[test]
    fn test_parse_custom_invalid_token() {
        match CustomWave::parse("1.0 2.0 abc 4.0") {
            Err(ParseError::InvalidSample { position, token }) => {
                assert_eq!(position, 2);
                assert_eq!(token, "abc");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_custom_from_file() {
        let path = std::env::temp_dir()
            .join(format!("osc1lite-test-{}.cwave", std::process::id()));
        std::fs::write(&path, "10 20 30").unwrap();
        let wave = CustomWave::from_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(wave.unwrap().samples, vec![10.0, 20.0, 30.0]);
        assert!(matches!(CustomWave::from_file(&path), Err(ParseError::Io(_))));
    }

    #[test]
    fn test_preview_flat_without_period() {
        let points = square(100.0, 0.1, 0.0, RiseMode::ms0).preview(5, 10.0);
        assert_eq!(points, vec![(0.0, 0.0), (10.0, 0.0)]);
    }

    #[test]
    fn test_preview_counted_pulses() {
        let points = square(100.0, 1.0, 2.0, RiseMode::ms0).preview(2, 10.0);
        assert_eq!(points, vec![
            (0.0, 0.0),
            (0.0, 100.0), (1.0, 100.0), (1.0, 0.0), (2.0, 0.0),
            (2.0, 100.0), (3.0, 100.0), (3.0, 0.0), (4.0, 0.0),
            (10.0, 0.0),
        ]);
    }

    #[test]
    fn test_preview_continuous_fills_limit() {
        let points = square(100.0, 1.0, 2.0, RiseMode::ms0).preview(0, 10.0);
        // 5 pulses of 4 points each, plus the origin
        assert_eq!(points.len(), 21);
        assert_eq!(points.last(), Some(&(10.0, 0.0)));
    }

    #[test]
    fn test_preview_custom() {
        let wave = Waveform::Custom(CustomWave::new(vec![3.0, 4.0]));
        assert_eq!(wave.preview(1, 10.0), vec![(0.0, 3.0), (1.0, 4.0)]);
    }
}
