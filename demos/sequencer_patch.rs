//! Sequenced bass patch.
//!
//! A slow square-wave clock drives a four-step sequencer into an oscillator;
//! the envelope output, boosted by the amplifier, sweeps the filter cutoff.
//! The patch renders a few seconds offline, standing in for the audio
//! backend that would normally pull one frame per output sample.
//!
//! Run with: cargo run --example sequencer_patch

use rackline::prelude::*;

fn main() {
    env_logger::init();

    let mut rack = Rack::new();

    let clock = rack.register("clock", Vco::new(1.0));
    let seq = rack.register(
        "seq",
        Sequencer::new(["C2", "D2", "Bb1", "F1"]).expect("note list parses"),
    );
    let vco = rack.register("vco", Vco::new(0.0));
    let vcf = rack.register("vcf", Svf::new(0.0, 3.0));
    let vca = rack.register("vca", Vca::new(2000.0));
    let env = rack.register("env", Envelope::new(0.1, 1.0, 0.1));
    let speaker = rack.register("speaker", Speaker::new(rack.bus()));

    rack.wire(clock.out("square"), seq.in_("clock")).unwrap();
    rack.wire(seq.out("gate"), env.in_("gate")).unwrap();
    rack.wire(seq.out("frequency"), vco.in_("frequency")).unwrap();
    rack.wire(env.out("amplitude"), vca.in_("audio")).unwrap();
    rack.wire(vca.out("audio"), vcf.in_("cutoff")).unwrap();
    rack.wire(vco.out("sawtooth"), vcf.in_("audio")).unwrap();
    rack.wire(vcf.out("lowpass"), speaker.in_("left")).unwrap();
    rack.wire(vcf.out("lowpass"), speaker.in_("right")).unwrap();

    println!(
        "patch ready: {} units, {} wires",
        rack.unit_count(),
        rack.wire_count()
    );

    // Pretend to be the audio driver for four seconds.
    let frames = (4.0 * SAMPLE_RATE) as usize;
    let mut peak = 0.0_f64;
    let mut energy = 0.0_f64;
    for _ in 0..frames {
        let (left, _right) = rack.frame();
        peak = peak.max(left.abs());
        energy += left * left;
    }

    println!(
        "rendered {} frames: peak {:.3}, rms {:.3}",
        frames,
        peak,
        (energy / frames as f64).sqrt()
    );
}
