//! Event-driven voice.
//!
//! The event transport is external to the engine, so this demo stands in for
//! it: raw note bytes are pushed into the translator's queue between render
//! bursts, the way a virtual input port would deliver them. Channel 0's gate
//! and frequency drive a classic filtered sawtooth voice.
//!
//! Run with: cargo run --example midi_patch

use rackline::prelude::*;

fn main() {
    env_logger::init();

    let (tx, rx) = crossbeam_channel::unbounded();

    let mut rack = Rack::new();
    let midi = rack.register("midi", MidiInput::new(rx));
    let vco = rack.register("vco", Vco::new(0.0));
    let vcf = rack.register("vcf", Svf::new(0.0, 3.0));
    let vca = rack.register("vca", Vca::new(2000.0));
    let env = rack.register("env", Envelope::new(0.1, 1.0, 0.1));
    let speaker = rack.register("speaker", Speaker::new(rack.bus()));

    rack.wire(midi.out("ch0.gate"), env.in_("gate")).unwrap();
    rack.wire(midi.out("ch0.frequency"), vco.in_("frequency")).unwrap();
    rack.wire(env.out("amplitude"), vca.in_("audio")).unwrap();
    rack.wire(vca.out("audio"), vcf.in_("cutoff")).unwrap();
    rack.wire(vco.out("sawtooth"), vcf.in_("audio")).unwrap();
    rack.wire(vcf.out("lowpass"), speaker.in_("left")).unwrap();
    rack.wire(vcf.out("lowpass"), speaker.in_("right")).unwrap();

    // A short phrase, delivered as the raw bytes a transport would hand us.
    let phrase: [(&[u8], f64); 6] = [
        (&[0x90, 48, 100], 0.5), // C3 down
        (&[0x80, 48, 0], 0.25),
        (&[0x90, 55, 90], 0.5), // G3 down
        (&[0x90, 60, 80], 0.5), // C4 stacked on top
        (&[0x80, 60, 0], 0.25), // back to G3, gate stays high
        (&[0x80, 55, 0], 1.0),
    ];

    let mut peak = 0.0_f64;
    for (message, hold) in phrase {
        if let Some(event) = MidiEvent::parse(message) {
            tx.send(event).expect("translator queue open");
        }
        for _ in 0..(hold * SAMPLE_RATE) as usize {
            let (left, _right) = rack.frame();
            peak = peak.max(left.abs());
        }
    }

    println!("phrase rendered, peak {:.3}", peak);
}
