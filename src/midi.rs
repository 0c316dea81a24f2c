//! Discrete event input: MIDI-style events and the channel translator.
//!
//! The transport that produces events (a virtual port, a file player, a test)
//! is external; the translator only needs a non-blocking queue to drain.
//! Each of the sixteen channels aggregates its note and control state into
//! continuous output signals, so downstream units patch to `ch0.frequency`,
//! `ch0.gate` or `ch0.cc1` like any other port.

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};

use crate::pitch::midi_note_frequency;
use crate::port::{PortDef, PortId, PortSpec, SignalKind, Unit};

/// Channels on one input port.
pub const CHANNELS: usize = 16;

/// Controller (parameter) slots per channel.
pub const CONTROLLERS: usize = 128;

const PORTS_PER_CHANNEL: usize = 6 + CONTROLLERS;

/// A discrete control event, tagged with its channel (0–15).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiEvent {
    /// Key pressed. A velocity of zero is treated as a release.
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Key released.
    NoteOff { channel: u8, note: u8 },
    /// Polyphonic (per-key) aftertouch.
    KeyPressure { channel: u8, note: u8, pressure: u8 },
    /// Channel-wide aftertouch.
    ChannelPressure { channel: u8, pressure: u8 },
    /// Pitch-bend wheel, -8192..8191 around a center of 0.
    PitchBend { channel: u8, value: i16 },
    /// Continuous controller change.
    ControlChange { channel: u8, controller: u8, value: u8 },
}

impl MidiEvent {
    /// Decode a raw MIDI message.
    ///
    /// Statuses the engine does not understand (program change, system
    /// messages, truncated data) yield `None`: unrecognized events are
    /// dropped rather than treated as errors, so newer transports keep
    /// working against this engine.
    pub fn parse(message: &[u8]) -> Option<MidiEvent> {
        let status = *message.first()?;
        let channel = status & 0x0F;
        match (status & 0xF0, message.len()) {
            (0x90, 3) => Some(MidiEvent::NoteOn {
                channel,
                note: message[1],
                velocity: message[2],
            }),
            (0x80, 3) => Some(MidiEvent::NoteOff {
                channel,
                note: message[1],
            }),
            (0xA0, 3) => Some(MidiEvent::KeyPressure {
                channel,
                note: message[1],
                pressure: message[2],
            }),
            (0xD0, 2) => Some(MidiEvent::ChannelPressure {
                channel,
                pressure: message[1],
            }),
            (0xE0, 3) => {
                let raw = message[1] as i16 | ((message[2] as i16) << 7);
                Some(MidiEvent::PitchBend {
                    channel,
                    value: raw - 8192,
                })
            }
            (0xB0, 3) => Some(MidiEvent::ControlChange {
                channel,
                controller: message[1],
                value: message[2],
            }),
            _ => {
                log::trace!("dropping unrecognized message {:02x?}", message);
                None
            }
        }
    }
}

/// Continuous per-channel signals exposed as translator outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSignal {
    /// Equal-temperament frequency of the highest held note, in Hz.
    Frequency,
    /// Velocity latched when the channel left silence, 0..1.
    Velocity,
    /// Velocity recorded when the last note was released, 0..1.
    ReleaseVelocity,
    /// 1 while any note is held, else 0.
    Gate,
    /// Aftertouch, 0..1.
    Aftertouch,
    /// Pitch bend, bipolar around 0.
    PitchBend,
}

/// Output port id of a channel signal.
pub fn signal_port(channel: usize, signal: ChannelSignal) -> PortId {
    channel * PORTS_PER_CHANNEL + signal as usize
}

/// Output port id of a channel's controller (parameter) slot.
pub fn controller_port(channel: usize, controller: usize) -> PortId {
    channel * PORTS_PER_CHANNEL + 6 + controller
}

/// Held-note bookkeeping for one channel, one bit per note number.
#[derive(Debug, Default, Clone, Copy)]
struct ChannelNotes {
    held: u128,
    /// Source note of the frequency currently shown on the channel. Retained
    /// after the last release so late aftertouch still matches.
    top: Option<u8>,
}

impl ChannelNotes {
    fn highest(&self) -> Option<u8> {
        if self.held == 0 {
            None
        } else {
            Some(127 - self.held.leading_zeros() as u8)
        }
    }
}

/// Translator from discrete events to continuous per-channel signals.
///
/// Sixteen channels, each exposing frequency, velocity, release velocity,
/// gate, aftertouch, pitch bend and 128 controller slots as output ports
/// (`ch3.gate`, `ch0.cc74`, ...). Held notes stack with highest-note
/// priority: velocity latches on the transition out of silence (later notes
/// of a chord do not re-latch it), and the gate stays high until the last
/// held note is released, so removing one note of a chord never retriggers
/// downstream envelopes.
///
/// The update drains every event queued so far and then returns; it never
/// waits on the transport.
pub struct MidiInput {
    events: Receiver<MidiEvent>,
    notes: [ChannelNotes; CHANNELS],
    spec: PortSpec,
}

impl MidiInput {
    pub fn new(events: Receiver<MidiEvent>) -> Self {
        let mut outputs = Vec::with_capacity(CHANNELS * PORTS_PER_CHANNEL);
        for channel in 0..CHANNELS {
            outputs.push(PortDef::new(
                format!("ch{channel}.frequency"),
                SignalKind::Frequency,
            ));
            outputs.push(PortDef::new(
                format!("ch{channel}.velocity"),
                SignalKind::Control,
            ));
            outputs.push(PortDef::new(
                format!("ch{channel}.release_velocity"),
                SignalKind::Control,
            ));
            outputs.push(PortDef::new(format!("ch{channel}.gate"), SignalKind::Gate));
            outputs.push(PortDef::new(
                format!("ch{channel}.aftertouch"),
                SignalKind::Control,
            ));
            outputs.push(PortDef::new(
                format!("ch{channel}.pitch_bend"),
                SignalKind::ControlBipolar,
            ));
            for controller in 0..CONTROLLERS {
                outputs.push(PortDef::new(
                    format!("ch{channel}.cc{controller}"),
                    SignalKind::Control,
                ));
            }
        }

        Self {
            events,
            notes: [ChannelNotes::default(); CHANNELS],
            spec: PortSpec {
                inputs: vec![],
                outputs,
            },
        }
    }

    fn apply(&mut self, event: MidiEvent, outputs: &mut [f64]) {
        match event {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } if velocity > 0 => {
                let ch = (channel & 0x0F) as usize;
                let notes = &mut self.notes[ch];
                if notes.held == 0 {
                    // Latched on the transition out of silence only.
                    outputs[signal_port(ch, ChannelSignal::Velocity)] = velocity as f64 / 127.0;
                }
                notes.held |= 1u128 << (note & 0x7F);
                if let Some(top) = notes.highest() {
                    notes.top = Some(top);
                    outputs[signal_port(ch, ChannelSignal::Frequency)] = midi_note_frequency(top);
                }
                outputs[signal_port(ch, ChannelSignal::Gate)] = 1.0;
            }

            MidiEvent::NoteOn { channel, note, .. } | MidiEvent::NoteOff { channel, note } => {
                let ch = (channel & 0x0F) as usize;
                let notes = &mut self.notes[ch];
                notes.held &= !(1u128 << (note & 0x7F));
                if notes.held == 0 {
                    outputs[signal_port(ch, ChannelSignal::ReleaseVelocity)] =
                        outputs[signal_port(ch, ChannelSignal::Velocity)];
                    outputs[signal_port(ch, ChannelSignal::Gate)] = 0.0;
                } else if let Some(top) = notes.highest() {
                    // Dropping an inner note of a chord keeps the gate high.
                    notes.top = Some(top);
                    outputs[signal_port(ch, ChannelSignal::Frequency)] = midi_note_frequency(top);
                }
            }

            MidiEvent::KeyPressure {
                channel,
                note,
                pressure,
            } => {
                let ch = (channel & 0x0F) as usize;
                if self.notes[ch].top == Some(note) {
                    outputs[signal_port(ch, ChannelSignal::Aftertouch)] = pressure as f64 / 127.0;
                }
            }

            MidiEvent::ChannelPressure { channel, pressure } => {
                let ch = (channel & 0x0F) as usize;
                outputs[signal_port(ch, ChannelSignal::Aftertouch)] = pressure as f64 / 127.0;
            }

            MidiEvent::PitchBend { channel, value } => {
                let ch = (channel & 0x0F) as usize;
                outputs[signal_port(ch, ChannelSignal::PitchBend)] = value as f64 / 4096.0;
            }

            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => {
                let ch = (channel & 0x0F) as usize;
                outputs[controller_port(ch, (controller & 0x7F) as usize)] = value as f64 / 127.0;
            }
        }
    }
}

impl Unit for MidiInput {
    fn spec(&self) -> &PortSpec {
        &self.spec
    }

    fn update(&mut self, _inputs: &[f64], outputs: &mut [f64]) {
        // Bounded drain: everything queued so far, never waiting for more.
        while let Ok(event) = self.events.try_recv() {
            self.apply(event, outputs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::Envelope;
    use crate::rack::Rack;
    use approx::assert_relative_eq;
    use crossbeam_channel::{unbounded, Sender};

    fn translator() -> (Sender<MidiEvent>, MidiInput, Vec<f64>) {
        let (tx, rx) = unbounded();
        let midi = MidiInput::new(rx);
        let outputs = midi.spec().outputs.iter().map(|p| p.default).collect();
        (tx, midi, outputs)
    }

    fn freq(outputs: &[f64], ch: usize) -> f64 {
        outputs[signal_port(ch, ChannelSignal::Frequency)]
    }

    fn gate(outputs: &[f64], ch: usize) -> f64 {
        outputs[signal_port(ch, ChannelSignal::Gate)]
    }

    #[test]
    fn chord_latches_velocity_and_tracks_highest_note() {
        let (tx, mut midi, mut outputs) = translator();

        tx.send(MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        })
        .unwrap();
        tx.send(MidiEvent::NoteOn {
            channel: 0,
            note: 64,
            velocity: 80,
        })
        .unwrap();
        midi.update(&[], &mut outputs);

        assert_eq!(gate(&outputs, 0), 1.0);
        assert_relative_eq!(freq(&outputs, 0), midi_note_frequency(64), max_relative = 1e-12);
        assert_relative_eq!(
            outputs[signal_port(0, ChannelSignal::Velocity)],
            100.0 / 127.0,
            max_relative = 1e-12
        );

        // Releasing the top note reverts to the remaining highest; the gate
        // stays high, so no downstream retrigger.
        tx.send(MidiEvent::NoteOff {
            channel: 0,
            note: 64,
        })
        .unwrap();
        midi.update(&[], &mut outputs);
        assert_eq!(gate(&outputs, 0), 1.0);
        assert_relative_eq!(freq(&outputs, 0), midi_note_frequency(60), max_relative = 1e-12);

        // Releasing the last note drops the gate and records the latched
        // velocity as the release velocity.
        tx.send(MidiEvent::NoteOff {
            channel: 0,
            note: 60,
        })
        .unwrap();
        midi.update(&[], &mut outputs);
        assert_eq!(gate(&outputs, 0), 0.0);
        assert_relative_eq!(
            outputs[signal_port(0, ChannelSignal::ReleaseVelocity)],
            100.0 / 127.0,
            max_relative = 1e-12
        );
        // The frequency keeps its last value after the release.
        assert_relative_eq!(freq(&outputs, 0), midi_note_frequency(60), max_relative = 1e-12);
    }

    #[test]
    fn note_on_with_zero_velocity_releases() {
        let (tx, mut midi, mut outputs) = translator();

        tx.send(MidiEvent::NoteOn {
            channel: 0,
            note: 72,
            velocity: 90,
        })
        .unwrap();
        midi.update(&[], &mut outputs);
        assert_eq!(gate(&outputs, 0), 1.0);

        tx.send(MidiEvent::NoteOn {
            channel: 0,
            note: 72,
            velocity: 0,
        })
        .unwrap();
        midi.update(&[], &mut outputs);
        assert_eq!(gate(&outputs, 0), 0.0);
    }

    #[test]
    fn lower_chord_notes_do_not_change_frequency() {
        let (tx, mut midi, mut outputs) = translator();

        tx.send(MidiEvent::NoteOn {
            channel: 0,
            note: 72,
            velocity: 64,
        })
        .unwrap();
        tx.send(MidiEvent::NoteOn {
            channel: 0,
            note: 48,
            velocity: 64,
        })
        .unwrap();
        midi.update(&[], &mut outputs);
        assert_relative_eq!(freq(&outputs, 0), midi_note_frequency(72), max_relative = 1e-12);
    }

    #[test]
    fn key_pressure_only_tracks_the_sounding_note() {
        let (tx, mut midi, mut outputs) = translator();

        tx.send(MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        })
        .unwrap();
        tx.send(MidiEvent::NoteOn {
            channel: 0,
            note: 67,
            velocity: 100,
        })
        .unwrap();
        // Pressure on a held but non-sounding note is ignored.
        tx.send(MidiEvent::KeyPressure {
            channel: 0,
            note: 60,
            pressure: 50,
        })
        .unwrap();
        midi.update(&[], &mut outputs);
        assert_eq!(outputs[signal_port(0, ChannelSignal::Aftertouch)], 0.0);

        tx.send(MidiEvent::KeyPressure {
            channel: 0,
            note: 67,
            pressure: 127,
        })
        .unwrap();
        midi.update(&[], &mut outputs);
        assert_relative_eq!(
            outputs[signal_port(0, ChannelSignal::Aftertouch)],
            1.0,
            max_relative = 1e-12
        );
    }

    #[test]
    fn channel_pressure_and_pitch_bend() {
        let (tx, mut midi, mut outputs) = translator();

        tx.send(MidiEvent::ChannelPressure {
            channel: 2,
            pressure: 127,
        })
        .unwrap();
        tx.send(MidiEvent::PitchBend {
            channel: 2,
            value: 4096,
        })
        .unwrap();
        midi.update(&[], &mut outputs);

        assert_relative_eq!(
            outputs[signal_port(2, ChannelSignal::Aftertouch)],
            1.0,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            outputs[signal_port(2, ChannelSignal::PitchBend)],
            1.0,
            max_relative = 1e-12
        );
        // Other channels are untouched.
        assert_eq!(outputs[signal_port(0, ChannelSignal::Aftertouch)], 0.0);
    }

    #[test]
    fn control_changes_land_in_parameter_slots() {
        let (tx, mut midi, mut outputs) = translator();

        tx.send(MidiEvent::ControlChange {
            channel: 1,
            controller: 74,
            value: 127,
        })
        .unwrap();
        tx.send(MidiEvent::ControlChange {
            channel: 1,
            controller: 1,
            value: 64,
        })
        .unwrap();
        midi.update(&[], &mut outputs);

        assert_relative_eq!(outputs[controller_port(1, 74)], 1.0, max_relative = 1e-12);
        assert_relative_eq!(
            outputs[controller_port(1, 1)],
            64.0 / 127.0,
            max_relative = 1e-12
        );
        assert_eq!(outputs[controller_port(0, 74)], 0.0);
    }

    #[test]
    fn channels_are_independent() {
        let (tx, mut midi, mut outputs) = translator();

        tx.send(MidiEvent::NoteOn {
            channel: 5,
            note: 69,
            velocity: 127,
        })
        .unwrap();
        midi.update(&[], &mut outputs);

        assert_eq!(gate(&outputs, 5), 1.0);
        assert_relative_eq!(freq(&outputs, 5), 440.0, max_relative = 1e-12);
        for ch in (0..CHANNELS).filter(|&c| c != 5) {
            assert_eq!(gate(&outputs, ch), 0.0);
            assert_eq!(freq(&outputs, ch), 0.0);
        }
    }

    #[test]
    fn drain_is_bounded_and_complete() {
        let (tx, mut midi, mut outputs) = translator();

        for note in [60, 64, 67] {
            tx.send(MidiEvent::NoteOn {
                channel: 0,
                note,
                velocity: 100,
            })
            .unwrap();
        }
        // One update applies everything queued so far.
        midi.update(&[], &mut outputs);
        assert_relative_eq!(freq(&outputs, 0), midi_note_frequency(67), max_relative = 1e-12);

        // An empty queue leaves the state untouched.
        midi.update(&[], &mut outputs);
        assert_relative_eq!(freq(&outputs, 0), midi_note_frequency(67), max_relative = 1e-12);
    }

    #[test]
    fn parses_raw_messages() {
        assert_eq!(
            MidiEvent::parse(&[0x93, 60, 100]),
            Some(MidiEvent::NoteOn {
                channel: 3,
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(
            MidiEvent::parse(&[0x80, 60, 0]),
            Some(MidiEvent::NoteOff {
                channel: 0,
                note: 60
            })
        );
        assert_eq!(
            MidiEvent::parse(&[0xA1, 60, 7]),
            Some(MidiEvent::KeyPressure {
                channel: 1,
                note: 60,
                pressure: 7
            })
        );
        assert_eq!(
            MidiEvent::parse(&[0xD0, 99]),
            Some(MidiEvent::ChannelPressure {
                channel: 0,
                pressure: 99
            })
        );
        // Center position decodes to zero bend.
        assert_eq!(
            MidiEvent::parse(&[0xE0, 0x00, 0x40]),
            Some(MidiEvent::PitchBend {
                channel: 0,
                value: 0
            })
        );
        assert_eq!(
            MidiEvent::parse(&[0xB2, 74, 127]),
            Some(MidiEvent::ControlChange {
                channel: 2,
                controller: 74,
                value: 127
            })
        );
    }

    #[test]
    fn unrecognized_messages_are_dropped() {
        assert_eq!(MidiEvent::parse(&[]), None);
        assert_eq!(MidiEvent::parse(&[0xC0, 5]), None); // program change
        assert_eq!(MidiEvent::parse(&[0xF8]), None); // clock
        assert_eq!(MidiEvent::parse(&[0x90, 60]), None); // truncated
    }

    #[test]
    fn events_reach_downstream_units_through_the_rack() {
        let (tx, rx) = unbounded();
        let mut rack = Rack::new();
        let midi = rack.register("midi", MidiInput::new(rx));
        let env = rack.register("env", Envelope::new(0.001, 1.0, 0.1));
        rack.bind(midi.out("ch0.gate"), env.in_("gate")).unwrap();

        // Silence first: the envelope stays at rest.
        rack.step();
        assert_eq!(rack.output_value(env.out("amplitude")), Ok(0.0));

        // The translator runs before the envelope, so a queued note-on is
        // heard within the same tick.
        tx.send(MidiEvent::NoteOn {
            channel: 0,
            note: 48,
            velocity: 100,
        })
        .unwrap();
        rack.step();
        let rising = rack.output_value(env.out("amplitude")).unwrap();
        assert!(rising > 0.0);

        tx.send(MidiEvent::NoteOff {
            channel: 0,
            note: 48,
        })
        .unwrap();
        rack.step();
        let falling = rack.output_value(env.out("amplitude")).unwrap();
        assert!(falling < rising);
    }
}
