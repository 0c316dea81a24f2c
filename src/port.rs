//! Signal conventions and the port system.
//!
//! Every signal in the rack is a plain `f64` scalar sampled once per tick.
//! Ports give those scalars names, directions, and semantic kinds; the
//! [`Unit`] trait is the type-erased interface the engine schedules.

use serde::{Deserialize, Serialize};

/// Index of a port within its direction's list on a unit.
///
/// Input and output ports are numbered independently, starting at zero, in
/// the order their [`PortDef`]s appear in the unit's [`PortSpec`].
pub type PortId = usize;

/// Semantic signal classification.
///
/// All kinds share the same scalar representation; the kind is a convention
/// for reading a value, not a constraint the engine enforces. Any output can
/// be patched into any input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Audio-rate signal, nominally ±1.
    Audio,

    /// Gate signal: high when greater than zero.
    Gate,

    /// Normalized control signal, 0..1.
    Control,

    /// Bipolar control signal, -1..1.
    ControlBipolar,

    /// Frequency in Hz. Unbounded; oscillators accept negative values.
    Frequency,

    /// Time in seconds.
    Seconds,

    /// Dimensionless parameter (amplitude multiplier, resonance, slew rate).
    Scalar,
}

impl SignalKind {
    /// Nominal value range of this kind, where one exists.
    pub fn nominal_range(&self) -> Option<(f64, f64)> {
        match self {
            SignalKind::Audio => Some((-1.0, 1.0)),
            SignalKind::Gate => Some((0.0, 1.0)),
            SignalKind::Control => Some((0.0, 1.0)),
            SignalKind::ControlBipolar => Some((-1.0, 1.0)),
            SignalKind::Frequency | SignalKind::Seconds | SignalKind::Scalar => None,
        }
    }
}

/// Definition of a single port (input or output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDef {
    /// Human-readable name (e.g. "frequency", "gate", "sawtooth").
    pub name: String,

    /// Signal kind, for documentation and UI hints.
    pub kind: SignalKind,

    /// Initial cell value. For inputs this doubles as the construction-time
    /// parameter value, adjustable later through the rack.
    pub default: f64,
}

impl PortDef {
    pub fn new(name: impl Into<String>, kind: SignalKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: 0.0,
        }
    }

    pub fn with_default(mut self, default: f64) -> Self {
        self.default = default;
        self
    }
}

/// Specification of all ports of a unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortSpec {
    pub inputs: Vec<PortDef>,
    pub outputs: Vec<PortDef>,
}

impl PortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the named input port.
    pub fn input_index(&self, name: &str) -> Option<PortId> {
        self.inputs.iter().position(|p| p.name == name)
    }

    /// Index of the named output port.
    pub fn output_index(&self, name: &str) -> Option<PortId> {
        self.outputs.iter().position(|p| p.name == name)
    }
}

/// A schedulable signal-processing unit.
///
/// The rack owns the port cells; a unit only ever touches its own slices.
/// Input values persist between ticks (wires, bindings and
/// [`Rack::set_input`](crate::rack::Rack::set_input) mutate them), and output
/// values persist until the unit overwrites them.
pub trait Unit: Send {
    /// Port layout. Must not change after registration.
    fn spec(&self) -> &PortSpec;

    /// Advance one tick: read `inputs`, write `outputs`.
    ///
    /// Both slices are indexed by [`PortId`].
    fn update(&mut self, inputs: &[f64], outputs: &mut [f64]);
}
