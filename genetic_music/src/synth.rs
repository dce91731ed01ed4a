// Audio preview: renders a phrase to mono PCM with a sine voice.
//
// The oscillator is the two-term recurrence
//
//   y[n] = 2 cos(w) y[n-1] - y[n-2]
//
// seeded per note, so no trig call is made per sample. Each note is shaped
// by a linear ADSR envelope; the release is taken from the end of the note
// rather than extending past it, so phrases render to exactly
// `slot_count * samples_per_slot` samples. Rests are silence.
//
// `write_wav` stores the result as 16-bit mono via `hound`.

use crate::config::Meter;
use crate::error::GaError;
use crate::phrase::Phrase;
use std::f64::consts::TAU;
use std::path::Path;

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Anything that turns a phrase into mono samples in [-1, 1].
pub trait Synthesizer {
    fn sample_rate(&self) -> u32;
    fn render(&mut self, phrase: &Phrase) -> Vec<f32>;
}

/// Linear attack-decay-sustain-release envelope. Times in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub attack: f64,
    pub decay: f64,
    /// Level held after the decay, in [0, 1].
    pub sustain: f64,
    pub release: f64,
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope {
            attack: 0.010,
            decay: 0.050,
            sustain: 0.75,
            release: 0.050,
        }
    }
}

impl Envelope {
    /// Gain at time `t` into a note lasting `length` seconds.
    pub fn gain(&self, t: f64, length: f64) -> f64 {
        let held = if t < self.attack {
            t / self.attack
        } else if t < self.attack + self.decay {
            1.0 - (1.0 - self.sustain) * (t - self.attack) / self.decay
        } else {
            self.sustain
        };
        let release_start = (length - self.release).max(0.0);
        if t >= release_start && self.release > 0.0 {
            held * ((length - t) / self.release).clamp(0.0, 1.0)
        } else {
            held
        }
    }
}

/// Frequency in Hz of a MIDI pitch, A4 = 440.
pub fn pitch_to_hz(pitch: u8) -> f64 {
    440.0 * 2f64.powf((f64::from(pitch) - 69.0) / 12.0)
}

#[derive(Debug, Clone)]
pub struct SineSynth {
    sample_rate: u32,
    meter: Meter,
    envelope: Envelope,
    /// Peak amplitude.
    level: f32,
}

impl SineSynth {
    pub fn new(sample_rate: u32, meter: Meter) -> Self {
        SineSynth {
            sample_rate,
            meter,
            envelope: Envelope::default(),
            level: 0.5,
        }
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn samples_per_slot(&self, phrase: &Phrase) -> usize {
        let seconds = self.meter.seconds_per_slot(phrase.dims().subdivision);
        (seconds * f64::from(self.sample_rate)).round() as usize
    }
}

impl Synthesizer for SineSynth {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn render(&mut self, phrase: &Phrase) -> Vec<f32> {
        let per_slot = self.samples_per_slot(phrase);
        let mut out = vec![0.0f32; phrase.dims().slot_count() * per_slot];
        let rate = f64::from(self.sample_rate);

        for run in phrase.sounding_runs() {
            let start = run.slot * per_slot;
            let count = usize::from(run.duration) * per_slot;
            let length = count as f64 / rate;
            let w = TAU * pitch_to_hz(run.pitch) / rate;
            let k = 2.0 * w.cos();
            // sin(-w), sin(-2w): the recurrence then yields sin(0), sin(w), ...
            let mut y1 = -w.sin();
            let mut y2 = -(2.0 * w).sin();
            for (n, sample) in out[start..start + count].iter_mut().enumerate() {
                let y = k * y1 - y2;
                y2 = y1;
                y1 = y;
                let gain = self.envelope.gain(n as f64 / rate, length);
                *sample = (y * gain) as f32 * self.level;
            }
        }
        out
    }
}

/// Write mono samples as a 16-bit PCM WAV file.
pub fn write_wav(samples: &[f32], sample_rate: u32, path: &Path) -> Result<(), GaError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phrase::{PhraseDims, REST};

    fn phrase(runs: &[(u8, u16)]) -> Phrase {
        let mut p = Phrase::blank(PhraseDims::new(1, 4).unwrap());
        p.set_runs(runs).unwrap();
        p
    }

    #[test]
    fn a4_is_440() {
        assert!((pitch_to_hz(69) - 440.0).abs() < 1e-9);
        assert!((pitch_to_hz(81) - 880.0).abs() < 1e-9);
    }

    #[test]
    fn envelope_shape() {
        let env = Envelope::default();
        assert_eq!(env.gain(0.0, 1.0), 0.0);
        assert!((env.gain(0.010, 1.0) - 1.0).abs() < 1e-9);
        assert!((env.gain(0.5, 1.0) - 0.75).abs() < 1e-9);
        assert!(env.gain(1.0, 1.0).abs() < 1e-9);
    }

    #[test]
    fn rests_are_silent_and_length_is_exact() {
        let p = phrase(&[(69, 1), (REST, 1), (72, 2)]);
        let mut synth = SineSynth::new(8_000, Meter::default());
        let per_slot = synth.samples_per_slot(&p);
        let samples = synth.render(&p);
        assert_eq!(samples.len(), 4 * per_slot);
        assert!(samples[per_slot..2 * per_slot].iter().all(|&s| s == 0.0));
        assert!(samples[..per_slot].iter().any(|&s| s.abs() > 0.1));
        assert!(samples.iter().all(|s| s.abs() <= 0.5 + 1e-6));
    }

    #[test]
    fn recurrence_tracks_sine() {
        let p = phrase(&[(69, 4)]);
        let mut synth = SineSynth::new(44_100, Meter::default()).with_envelope(Envelope {
            attack: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.0,
        });
        let samples = synth.render(&p);
        let w = TAU * 440.0 / 44_100.0;
        for n in [0usize, 1, 100, 10_000] {
            let expected = 0.5 * (w * n as f64).sin();
            assert!((f64::from(samples[n]) - expected).abs() < 1e-3, "sample {n}");
        }
    }
}
