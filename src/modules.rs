//! Core DSP units.
//!
//! Oscillator, envelope, amplifier, filter, slew limiters, delay line,
//! sequencer and the stereo sink. Construction parameters become input-port
//! defaults, so every parameter stays patchable and remains adjustable at
//! runtime through [`Rack::set_input`](crate::rack::Rack::set_input).

use std::collections::VecDeque;
use std::f64::consts::{PI, TAU};

use crate::pitch::{note_frequency, NoteError};
use crate::port::{PortDef, PortSpec, SignalKind, Unit};
use crate::rack::AudioBus;
use crate::DT;

/// Numerically controlled oscillator.
///
/// The frequency input may be negative or arbitrarily large; the phase
/// accumulator is wrapped with `floor` every tick so it stays in [0, 1)
/// regardless. All four waveforms are derived from the same phase, so they
/// stay aligned.
pub struct Vco {
    phase: f64,
    spec: PortSpec,
}

impl Vco {
    pub fn new(frequency: f64) -> Self {
        Self {
            phase: 0.0,
            spec: PortSpec {
                inputs: vec![
                    PortDef::new("frequency", SignalKind::Frequency).with_default(frequency)
                ],
                outputs: vec![
                    PortDef::new("sawtooth", SignalKind::Audio).with_default(-1.0),
                    PortDef::new("sine", SignalKind::Audio),
                    PortDef::new("square", SignalKind::Audio).with_default(1.0),
                    PortDef::new("triangle", SignalKind::Audio),
                ],
            },
        }
    }
}

impl Default for Vco {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Unit for Vco {
    fn spec(&self) -> &PortSpec {
        &self.spec
    }

    fn update(&mut self, inputs: &[f64], outputs: &mut [f64]) {
        self.phase += inputs[0] * DT;
        self.phase -= self.phase.floor();

        outputs[0] = self.phase * 2.0 - 1.0;
        outputs[1] = (self.phase * TAU).sin();
        outputs[2] = self.phase.round() * -2.0 + 1.0;
        outputs[3] = (self.phase - 0.5).abs() * 4.0 - 1.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Attack,
    Decay,
    Release,
}

/// Attack-decay-release envelope generator.
///
/// A gate rising above zero triggers the attack, a linear rise to unity over
/// `attack` seconds, followed by the decay. The decay and release phases
/// halve the amplitude once every `decay` (resp. `release`) seconds; the
/// amplitude approaches zero asymptotically and is never snapped there.
///
/// The three times must be non-zero; a zero time divides by zero.
pub struct Envelope {
    stage: Stage,
    amplitude: f64,
    spec: PortSpec,
}

impl Envelope {
    pub fn new(attack: f64, decay: f64, release: f64) -> Self {
        Self {
            stage: Stage::Release,
            amplitude: 0.0,
            spec: PortSpec {
                inputs: vec![
                    PortDef::new("gate", SignalKind::Gate),
                    PortDef::new("attack", SignalKind::Seconds).with_default(attack),
                    PortDef::new("decay", SignalKind::Seconds).with_default(decay),
                    PortDef::new("release", SignalKind::Seconds).with_default(release),
                ],
                outputs: vec![PortDef::new("amplitude", SignalKind::Control)],
            },
        }
    }
}

impl Unit for Envelope {
    fn spec(&self) -> &PortSpec {
        &self.spec
    }

    fn update(&mut self, inputs: &[f64], outputs: &mut [f64]) {
        if inputs[0] <= 0.0 {
            self.stage = Stage::Release;
        } else if self.stage == Stage::Release {
            self.stage = Stage::Attack;
        }

        match self.stage {
            Stage::Attack => {
                self.amplitude += DT / inputs[1];
                if self.amplitude >= 1.0 {
                    self.amplitude = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => self.amplitude *= (-DT / inputs[2]).exp2(),
            Stage::Release => self.amplitude *= (-DT / inputs[3]).exp2(),
        }

        outputs[0] = self.amplitude;
    }
}

/// Amplifier: multiplies the audio input by the amplitude input. Stateless.
pub struct Vca {
    spec: PortSpec,
}

impl Vca {
    pub fn new(amplitude: f64) -> Self {
        Self {
            spec: PortSpec {
                inputs: vec![
                    PortDef::new("audio", SignalKind::Audio),
                    PortDef::new("amplitude", SignalKind::Scalar).with_default(amplitude),
                ],
                outputs: vec![PortDef::new("audio", SignalKind::Audio)],
            },
        }
    }
}

impl Default for Vca {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Unit for Vca {
    fn spec(&self) -> &PortSpec {
        &self.spec
    }

    fn update(&mut self, inputs: &[f64], outputs: &mut [f64]) {
        outputs[0] = inputs[0] * inputs[1];
    }
}

/// 12 dB/octave state-variable filter.
///
/// Lowpass, bandpass and highpass responses of the same input are available
/// simultaneously. The update order is significant: the lowpass integrator
/// advances on the previous tick's bandpass value, the highpass is formed
/// from the freshly updated lowpass, and the bandpass integrator advances
/// last on that highpass. The frequency coefficient is clamped so the filter
/// stays stable however high a cutoff is requested.
///
/// Resonance must be greater than zero (1 = no resonance, higher values
/// resonate more).
pub struct Svf {
    low: f64,
    band: f64,
    spec: PortSpec,
}

impl Svf {
    pub fn new(cutoff: f64, resonance: f64) -> Self {
        Self {
            low: 0.0,
            band: 0.0,
            spec: PortSpec {
                inputs: vec![
                    PortDef::new("audio", SignalKind::Audio),
                    PortDef::new("cutoff", SignalKind::Frequency).with_default(cutoff),
                    PortDef::new("resonance", SignalKind::Scalar).with_default(resonance),
                ],
                outputs: vec![
                    PortDef::new("lowpass", SignalKind::Audio),
                    PortDef::new("bandpass", SignalKind::Audio),
                    PortDef::new("highpass", SignalKind::Audio),
                ],
            },
        }
    }
}

impl Unit for Svf {
    fn spec(&self) -> &PortSpec {
        &self.spec
    }

    fn update(&mut self, inputs: &[f64], outputs: &mut [f64]) {
        let f = 2.0 * (PI * inputs[1] * DT).min(0.5_f64.asin()).sin();
        let q = 1.0 / inputs[2];

        self.low += f * self.band;
        let high = inputs[0] - q * self.band - self.low;
        self.band += f * high;

        outputs[0] = self.low;
        outputs[1] = self.band;
        outputs[2] = high;
    }
}

/// Linear slew limiter.
///
/// Ramps the output toward the input at a bounded rate (units per second),
/// producing a constant-slope glide. The rate must be non-negative.
pub struct LinearSlew {
    current: f64,
    spec: PortSpec,
}

impl LinearSlew {
    pub fn new(rate: f64) -> Self {
        Self {
            current: 0.0,
            spec: PortSpec {
                inputs: vec![
                    PortDef::new("signal", SignalKind::ControlBipolar),
                    PortDef::new("rate", SignalKind::Scalar).with_default(rate),
                ],
                outputs: vec![PortDef::new("out", SignalKind::ControlBipolar)],
            },
        }
    }

    /// Seed the output with a starting value.
    pub fn with_initial(mut self, value: f64) -> Self {
        self.current = value;
        self
    }
}

impl Unit for LinearSlew {
    fn spec(&self) -> &PortSpec {
        &self.spec
    }

    fn update(&mut self, inputs: &[f64], outputs: &mut [f64]) {
        let step = inputs[1] * DT;
        self.current += (inputs[0] - self.current).clamp(-step, step);
        outputs[0] = self.current;
    }
}

/// Exponential slew limiter.
///
/// Operates in the log2 domain: the output moves toward the input by at most
/// `rate` octaves per second, giving musically even glides across frequency
/// ranges. Input and output must stay strictly positive: seed the output
/// with [`with_initial`](Self::with_initial). Non-positive values produce a
/// non-finite result, which the caller is responsible for avoiding.
pub struct ExponentialSlew {
    current: f64,
    spec: PortSpec,
}

impl ExponentialSlew {
    pub fn new(rate: f64) -> Self {
        Self {
            current: 0.0,
            spec: PortSpec {
                inputs: vec![
                    PortDef::new("signal", SignalKind::Control),
                    PortDef::new("rate", SignalKind::Scalar).with_default(rate),
                ],
                outputs: vec![PortDef::new("out", SignalKind::Control)],
            },
        }
    }

    /// Seed the output with a starting value (must be strictly positive).
    pub fn with_initial(mut self, value: f64) -> Self {
        self.current = value;
        self
    }
}

impl Unit for ExponentialSlew {
    fn spec(&self) -> &PortSpec {
        &self.spec
    }

    fn update(&mut self, inputs: &[f64], outputs: &mut [f64]) {
        let step = inputs[1] * DT;
        let delta = (inputs[0] / self.current).log2().clamp(-step, step);
        self.current *= delta.exp2();
        outputs[0] = self.current;
    }
}

/// Interpolating delay line.
///
/// Holds `ceil(max_delay / DT) + 1` samples of history, oldest first. Each
/// tick pushes the new input and drops the oldest sample, then reads by
/// linear interpolation between the two history samples bracketing the
/// requested offset. The `delay` input is silently clamped into the
/// representable range, and a zero delay reproduces the input exactly.
pub struct Delay {
    history: VecDeque<f64>,
    spec: PortSpec,
}

impl Delay {
    pub fn new(max_delay: f64) -> Self {
        let capacity = (max_delay / DT).ceil() as usize + 1;
        Self {
            history: VecDeque::from(vec![0.0; capacity]),
            spec: PortSpec {
                inputs: vec![
                    PortDef::new("signal", SignalKind::Audio),
                    PortDef::new("delay", SignalKind::Seconds),
                ],
                outputs: vec![PortDef::new("out", SignalKind::Audio)],
            },
        }
    }
}

impl Unit for Delay {
    fn spec(&self) -> &PortSpec {
        &self.spec
    }

    fn update(&mut self, inputs: &[f64], outputs: &mut [f64]) {
        self.history.push_back(inputs[0]);
        self.history.pop_front();

        let newest = self.history.len() - 1;
        let delay = inputs[1].clamp(0.0, newest as f64 * DT);
        let position = newest as f64 - delay / DT;
        let index = position.floor() as usize;
        let frac = position - position.floor();

        let a = self.history[index];
        let b = self.history[(index + 1).min(newest)];
        outputs[0] = a + (b - a) * frac;
    }
}

/// Clocked step sequencer.
///
/// Built from an ordered list of note names parsed once at construction;
/// each rising edge of the clock advances to the next frequency, wrapping at
/// the end. The gate output is a cleaned-up copy of the clock, and edge
/// detection runs against the previous gate output, not the previous clock
/// sample, so a clock held high never re-triggers.
pub struct Sequencer {
    frequencies: Vec<f64>,
    index: usize,
    gate: bool,
    spec: PortSpec,
}

impl Sequencer {
    /// Parse the note names and build the sequencer.
    ///
    /// Fails if any name has an unknown letter/accidental prefix or a bad
    /// octave suffix. Panics if `notes` is empty.
    pub fn new<I, S>(notes: I) -> Result<Self, NoteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let frequencies = notes
            .into_iter()
            .map(|n| note_frequency(n.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        assert!(!frequencies.is_empty(), "sequencer needs at least one note");

        // Start on the last step so the first clock edge lands on step 0.
        let index = frequencies.len() - 1;
        let spec = PortSpec {
            inputs: vec![PortDef::new("clock", SignalKind::Gate)],
            outputs: vec![
                PortDef::new("frequency", SignalKind::Frequency).with_default(frequencies[index]),
                PortDef::new("gate", SignalKind::Gate),
            ],
        };
        Ok(Self {
            frequencies,
            index,
            gate: false,
            spec,
        })
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Replace the frequency of one step. The step count is fixed at
    /// construction, but the frequencies themselves may change.
    pub fn set_step(&mut self, index: usize, frequency: f64) {
        if let Some(step) = self.frequencies.get_mut(index) {
            *step = frequency;
        }
    }
}

impl Unit for Sequencer {
    fn spec(&self) -> &PortSpec {
        &self.spec
    }

    fn update(&mut self, inputs: &[f64], outputs: &mut [f64]) {
        let clock = inputs[0] > 0.0;
        if clock && !self.gate {
            self.index = (self.index + 1) % self.frequencies.len();
        }
        self.gate = clock;

        outputs[0] = self.frequencies[self.index];
        outputs[1] = if clock { 1.0 } else { 0.0 };
    }
}

/// Stereo sink: adds its inputs into the rack's shared output bus.
///
/// Several speakers may coexist; their contributions sum on the bus. The
/// tick driver clears the bus before each step and reads it afterwards.
pub struct Speaker {
    bus: AudioBus,
    spec: PortSpec,
}

impl Speaker {
    pub fn new(bus: AudioBus) -> Self {
        Self {
            bus,
            spec: PortSpec {
                inputs: vec![
                    PortDef::new("left", SignalKind::Audio),
                    PortDef::new("right", SignalKind::Audio),
                ],
                outputs: vec![],
            },
        }
    }
}

impl Unit for Speaker {
    fn spec(&self) -> &PortSpec {
        &self.spec
    }

    fn update(&mut self, inputs: &[f64], _outputs: &mut [f64]) {
        self.bus.add(inputs[0], inputs[1]);
    }
}
