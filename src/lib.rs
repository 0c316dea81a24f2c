//! # Rackline: a software modular synthesizer engine
//!
//! `rackline` models a modular synthesizer as a rack of schedulable units
//! (oscillators, envelopes, filters, slew limiters, delay lines, sequencers)
//! whose scalar ports are patched together and executed once per audio sample
//! at a fixed 48 kHz time step.
//!
//! Unlike graph engines that compute a dependency order, the rack runs units
//! in the order they were registered. The ordering is part of the semantics:
//! a unit reading a value produced later in the order sees the previous
//! tick's value, the same one-sample feedback delay a hardware patch cable
//! gives you.
//!
//! The audio backend and the event transport stay outside the crate. The
//! backend calls [`Rack::frame`](rack::Rack::frame) once per output sample;
//! a transport pushes [`MidiEvent`](midi::MidiEvent)s into the channel
//! translator's queue whenever it likes.
//!
//! ## Quick start
//!
//! ```rust
//! use rackline::prelude::*;
//!
//! let mut rack = Rack::new();
//!
//! let clock = rack.register("clock", Vco::new(2.0));
//! let seq = rack.register("seq", Sequencer::new(["C2", "D2", "Bb1", "F1"]).unwrap());
//! let vco = rack.register("vco", Vco::new(0.0));
//! let env = rack.register("env", Envelope::new(0.1, 1.0, 0.1));
//! let vca = rack.register("vca", Vca::new(1.0));
//! let speaker = rack.register("speaker", Speaker::new(rack.bus()));
//!
//! rack.wire(clock.out("square"), seq.in_("clock")).unwrap();
//! rack.wire(seq.out("frequency"), vco.in_("frequency")).unwrap();
//! rack.wire(seq.out("gate"), env.in_("gate")).unwrap();
//! rack.wire(vco.out("triangle"), vca.in_("audio")).unwrap();
//! rack.wire(env.out("amplitude"), vca.in_("amplitude")).unwrap();
//! rack.wire(vca.out("audio"), speaker.in_("left")).unwrap();
//! rack.wire(vca.out("audio"), speaker.in_("right")).unwrap();
//!
//! // The audio callback asks for one frame per output sample.
//! let (left, right) = rack.frame();
//! # let _ = (left, right);
//! ```
//!
//! Custom units are plain implementations of [`Unit`](port::Unit); use
//! [`Rack::bind`](rack::Rack::bind) where a hand-written update routine
//! would read another unit's output directly.

pub mod midi;
pub mod modules;
pub mod pitch;
pub mod port;
pub mod rack;

/// Fixed output sample rate, in Hz.
pub const SAMPLE_RATE: f64 = 48_000.0;

/// Time step between ticks, in seconds.
pub const DT: f64 = 1.0 / SAMPLE_RATE;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::midi::{ChannelSignal, MidiEvent, MidiInput};
    pub use crate::modules::{
        Delay, Envelope, ExponentialSlew, LinearSlew, Sequencer, Speaker, Svf, Vca, Vco,
    };
    pub use crate::pitch::{midi_note_frequency, note_frequency, NoteError};
    pub use crate::port::{PortDef, PortId, PortSpec, SignalKind, Unit};
    pub use crate::rack::{
        AtomicF64, AudioBus, PortRef, Rack, RackError, UnitHandle, UnitId, HEADROOM,
    };
    pub use crate::{DT, SAMPLE_RATE};
}
