//! The rack: unit registry, scheduler, patching, and the output bus.
//!
//! A rack executes every live unit once per tick, in registration order.
//! There is no dependency analysis: if unit B reads a value produced by unit
//! A and A was registered after B, B sees A's value from the previous tick.
//! That implicit one-sample delay is part of the contract, and patches may
//! rely on it in feedback paths.
//!
//! Two patching mechanisms exist, both resolved through the rack's port
//! table rather than by aliasing:
//!
//! - [`Rack::wire`] registers a wire, a unit of its own that, on its turn
//!   in the order, copies one producer output cell into one consumer input
//!   cell.
//! - [`Rack::bind`] attaches a consumer input directly to a producer output;
//!   the cell is refreshed at the consumer's own execution slot, which is
//!   what a hand-written update routine reading another unit's output would
//!   observe.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::port::{PortId, PortSpec, Unit};

new_key_type! {
    /// Stable handle for a registered unit or wire.
    pub struct UnitId;
}

/// Reference to one port on one unit.
///
/// Whether the index addresses an input or an output follows from use:
/// wire and binding sources are outputs, their targets are inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub unit: UnitId,
    pub port: PortId,
}

/// Error type for rack operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RackError {
    /// The referenced unit is not registered (or was deregistered).
    UnknownUnit,
    /// The referenced port does not exist on the unit.
    UnknownPort,
}

impl fmt::Display for RackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RackError::UnknownUnit => write!(f, "unknown unit"),
            RackError::UnknownPort => write!(f, "unknown port"),
        }
    }
}

impl std::error::Error for RackError {}

/// Atomic `f64`, stored as bits in an `AtomicU64`.
///
/// Port cells belong to the rack, but the output accumulators are shared
/// with whatever drives the tick loop, so those cells must be `Send + Sync`.
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Clone for AtomicF64 {
    fn clone(&self) -> Self {
        Self::new(self.get())
    }
}

/// Shared stereo accumulator pair fed by [`Speaker`](crate::modules::Speaker)
/// units.
///
/// Clones share the same accumulators. The tick driver clears the bus before
/// each step and reads it afterwards; [`Rack::frame`] packages that sequence.
#[derive(Debug, Clone, Default)]
pub struct AudioBus {
    left: Arc<AtomicF64>,
    right: Arc<AtomicF64>,
}

impl AudioBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero both accumulators.
    pub fn clear(&self) {
        self.left.set(0.0);
        self.right.set(0.0);
    }

    /// Current accumulator values as (left, right).
    pub fn read(&self) -> (f64, f64) {
        (self.left.get(), self.right.get())
    }

    /// Mix a stereo contribution into the accumulators.
    pub fn add(&self, left: f64, right: f64) {
        self.left.set(self.left.get() + left);
        self.right.set(self.right.get() + right);
    }
}

/// Handle returned by [`Rack::register`], carrying the unit's port spec for
/// name-based port lookup.
#[derive(Clone)]
pub struct UnitHandle {
    id: UnitId,
    spec: PortSpec,
}

impl UnitHandle {
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Reference an output port by name.
    ///
    /// Panics on an unknown name; port names are fixed at compile time of
    /// the patch, so a miss is a programming error.
    pub fn out(&self, name: &str) -> PortRef {
        let port = self
            .spec
            .output_index(name)
            .unwrap_or_else(|| panic!("unknown output port: {}", name));
        PortRef {
            unit: self.id,
            port,
        }
    }

    /// Reference an input port by name. Panics on an unknown name.
    pub fn in_(&self, name: &str) -> PortRef {
        let port = self
            .spec
            .input_index(name)
            .unwrap_or_else(|| panic!("unknown input port: {}", name));
        PortRef {
            unit: self.id,
            port,
        }
    }

    /// Port specification of the unit.
    pub fn spec(&self) -> &PortSpec {
        &self.spec
    }
}

enum SlotKind {
    Unit(Box<dyn Unit>),
    Wire { from: PortRef, to: PortRef },
}

struct Slot {
    name: String,
    kind: SlotKind,
    inputs: Vec<f64>,
    outputs: Vec<f64>,
    spec: PortSpec,
    /// Input ports bound to foreign outputs, refreshed at this slot's turn.
    bindings: Vec<(PortId, PortRef)>,
}

/// Headroom factor applied by [`Rack::frame`] so a full-scale voice does not
/// immediately clip the output.
pub const HEADROOM: f64 = 0.1;

/// An ordered collection of live units, executed one tick at a time.
///
/// Units and wires may only be added or removed between ticks; `step`
/// taking `&mut self` makes mid-tick mutation unrepresentable. Stopping the
/// external driver simply stops `step` from being called; all unit state
/// persists across the gap.
pub struct Rack {
    slots: SlotMap<UnitId, Slot>,
    order: Vec<UnitId>,
    bus: AudioBus,
}

impl Default for Rack {
    fn default() -> Self {
        Self::new()
    }
}

impl Rack {
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            order: Vec::new(),
            bus: AudioBus::new(),
        }
    }

    /// The shared output bus that speakers registered in this rack feed.
    pub fn bus(&self) -> AudioBus {
        self.bus.clone()
    }

    /// Register a unit, appending it to the execution order.
    ///
    /// Port cells are allocated from the unit's spec and initialized with
    /// the port defaults.
    pub fn register<U: Unit + 'static>(&mut self, name: impl Into<String>, unit: U) -> UnitHandle {
        let name = name.into();
        let spec = unit.spec().clone();
        let inputs = spec.inputs.iter().map(|p| p.default).collect();
        let outputs = spec.outputs.iter().map(|p| p.default).collect();
        let id = self.slots.insert(Slot {
            name,
            kind: SlotKind::Unit(Box::new(unit)),
            inputs,
            outputs,
            spec: spec.clone(),
            bindings: Vec::new(),
        });
        self.order.push(id);
        log::debug!("registered unit {:?} ({})", id, self.slots[id].name);
        UnitHandle { id, spec }
    }

    /// Patch a producer output into a consumer input with a wire.
    ///
    /// The wire occupies its own position in the execution order: on its
    /// turn the value is copied through the port table. When several wires
    /// feed the same input, the one executed last wins; values are never
    /// summed.
    pub fn wire(&mut self, from: PortRef, to: PortRef) -> Result<UnitId, RackError> {
        self.check_output(from)?;
        self.check_input(to)?;
        let id = self.slots.insert(Slot {
            name: String::from("wire"),
            kind: SlotKind::Wire { from, to },
            inputs: Vec::new(),
            outputs: Vec::new(),
            spec: PortSpec::default(),
            bindings: Vec::new(),
        });
        self.order.push(id);
        Ok(id)
    }

    /// Bind a consumer input directly to a producer output.
    ///
    /// Unlike a wire, a binding has no slot of its own: the input cell is
    /// refreshed immediately before the consumer updates, so the consumer
    /// always observes the producer's most recently written value. That is
    /// the current tick's value if the producer ran earlier in the order,
    /// the previous tick's otherwise. Rebinding an input replaces its
    /// existing binding.
    pub fn bind(&mut self, from: PortRef, to: PortRef) -> Result<(), RackError> {
        self.check_output(from)?;
        self.check_input(to)?;
        let slot = self.slots.get_mut(to.unit).ok_or(RackError::UnknownUnit)?;
        slot.bindings.retain(|(port, _)| *port != to.port);
        slot.bindings.push((to.port, from));
        Ok(())
    }

    /// Remove a unit (or wire) from the rack.
    ///
    /// The unit stops executing immediately; wires and bindings patched into
    /// or out of it are removed with it.
    pub fn deregister(&mut self, id: UnitId) -> Result<(), RackError> {
        self.slots.remove(id).ok_or(RackError::UnknownUnit)?;
        self.order.retain(|&u| u != id);

        let orphaned: Vec<UnitId> = self
            .slots
            .iter()
            .filter_map(|(wire_id, slot)| match slot.kind {
                SlotKind::Wire { from, to } if from.unit == id || to.unit == id => Some(wire_id),
                _ => None,
            })
            .collect();
        for &wire_id in &orphaned {
            self.slots.remove(wire_id);
        }
        if !orphaned.is_empty() {
            self.order.retain(|u| !orphaned.contains(u));
            log::debug!("removed {} wire(s) attached to {:?}", orphaned.len(), id);
        }

        for slot in self.slots.values_mut() {
            slot.bindings.retain(|(_, source)| source.unit != id);
        }
        Ok(())
    }

    /// Execute one tick: every live slot runs exactly once, in registration
    /// order.
    pub fn step(&mut self) {
        for i in 0..self.order.len() {
            let id = self.order[i];

            let wire = match self.slots[id].kind {
                SlotKind::Wire { from, to } => Some((from, to)),
                SlotKind::Unit(_) => None,
            };

            if let Some((from, to)) = wire {
                let value = self.slots[from.unit].outputs[from.port];
                self.slots[to.unit].inputs[to.port] = value;
            } else {
                // Refresh inputs bound to foreign outputs, then run the unit.
                for b in 0..self.slots[id].bindings.len() {
                    let (port, source) = self.slots[id].bindings[b];
                    let value = self.slots[source.unit].outputs[source.port];
                    self.slots[id].inputs[port] = value;
                }
                let Slot {
                    kind,
                    inputs,
                    outputs,
                    ..
                } = &mut self.slots[id];
                if let SlotKind::Unit(unit) = kind {
                    unit.update(inputs, outputs);
                }
            }
        }
    }

    /// One audio frame per the driver contract: clear the bus, run one step,
    /// return the headroom-scaled stereo pair.
    pub fn frame(&mut self) -> (f64, f64) {
        self.bus.clear();
        self.step();
        let (left, right) = self.bus.read();
        (left * HEADROOM, right * HEADROOM)
    }

    /// Overwrite an input cell (a knob twist, or a construction parameter
    /// adjusted after the fact).
    pub fn set_input(&mut self, port: PortRef, value: f64) -> Result<(), RackError> {
        let slot = self.slots.get_mut(port.unit).ok_or(RackError::UnknownUnit)?;
        let cell = slot.inputs.get_mut(port.port).ok_or(RackError::UnknownPort)?;
        *cell = value;
        Ok(())
    }

    /// Current value of an input cell.
    pub fn input_value(&self, port: PortRef) -> Result<f64, RackError> {
        let slot = self.slots.get(port.unit).ok_or(RackError::UnknownUnit)?;
        slot.inputs
            .get(port.port)
            .copied()
            .ok_or(RackError::UnknownPort)
    }

    /// Current value of an output cell.
    pub fn output_value(&self, port: PortRef) -> Result<f64, RackError> {
        let slot = self.slots.get(port.unit).ok_or(RackError::UnknownUnit)?;
        slot.outputs
            .get(port.port)
            .copied()
            .ok_or(RackError::UnknownPort)
    }

    /// Number of live units (wires not counted).
    pub fn unit_count(&self) -> usize {
        self.slots
            .values()
            .filter(|s| matches!(s.kind, SlotKind::Unit(_)))
            .count()
    }

    /// Number of live wires.
    pub fn wire_count(&self) -> usize {
        self.slots
            .values()
            .filter(|s| matches!(s.kind, SlotKind::Wire { .. }))
            .count()
    }

    /// Debug name of a unit.
    pub fn name(&self, id: UnitId) -> Option<&str> {
        self.slots.get(id).map(|s| s.name.as_str())
    }

    fn check_output(&self, port: PortRef) -> Result<(), RackError> {
        let slot = self.slots.get(port.unit).ok_or(RackError::UnknownUnit)?;
        if port.port >= slot.spec.outputs.len() {
            return Err(RackError::UnknownPort);
        }
        Ok(())
    }

    fn check_input(&self, port: PortRef) -> Result<(), RackError> {
        let slot = self.slots.get(port.unit).ok_or(RackError::UnknownUnit)?;
        if port.port >= slot.spec.inputs.len() {
            return Err(RackError::UnknownPort);
        }
        Ok(())
    }
}
