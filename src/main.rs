// src/main.rs
//
// Offline sanity run: schedules a short arpeggio through a few buffers and
// prints every trigger, the way an audio callback would see them.

use sequencer::{
    SequenceNote, SequenceSettings, SequencerEngine, SequencerError, TriggerBuffer,
};

const SAMPLE_RATE: f64 = 44_100.0;
const BLOCK_SIZE: u32 = 512;

/// ===============================
/// Test Sequence
/// ===============================

fn arpeggio() -> Vec<SequenceNote> {
    [60u8, 64, 67, 72]
        .iter()
        .enumerate()
        .filter_map(|(i, &key)| SequenceNote::new(0, key, 100, i as f64 * 0.5, 0.4))
        .collect()
}

fn main() -> Result<(), SequencerError> {
    let mut engine = SequencerEngine::new();

    let events = SequenceNote::flatten(&arpeggio());
    let settings = SequenceSettings::new(2.0, 120.0, true, 2);
    let mut observer =
        engine.update_sequence(&events, settings, SAMPLE_RATE, TriggerBuffer::with_capacity(64))?;

    println!("Starting sequencer sanity run…");
    engine.play_from_start()?;

    let mut sample_time = 0.0;
    let mut block = 0;
    while engine.is_playing() && block < 512 {
        observer.sink_mut().clear();
        observer.render(sample_time, BLOCK_SIZE);

        for trigger in observer.sink().triggers() {
            println!(
                "block {:>3} +{:>3}: {:02X} {:>3} {:>3}  (beat {:.3}, loop {})",
                block,
                trigger.offset,
                trigger.status,
                trigger.data1,
                trigger.data2,
                engine.position(),
                engine.current_loop()
            );
        }

        sample_time += BLOCK_SIZE as f64;
        block += 1;

        // Jump back mid-way through the first pass once.
        if block == 40 {
            println!("--- seek to beat 0.25 ---");
            engine.seek_to(0.25)?;
        }
    }

    let diagnostics = engine.diagnostics();
    println!(
        "Sanity run completed: {} callbacks, {} triggers, {} synthesized note-offs.",
        diagnostics.callbacks, diagnostics.triggers, diagnostics.synthesized_note_offs
    );
    Ok(())
}
