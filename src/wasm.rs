//! WebAssembly bindings via wasm-bindgen for browser integration.
//!
//! This module is only compiled when the `web` feature is enabled.
//!
//! # Usage
//!
//! Build with wasm-pack:
//! ```bash
//! wasm-pack build --target web --features web
//! ```
//!
//! # JavaScript Example
//!
//! ```javascript
//! import init, { sequencer_init, WebSequencer } from './sequencer.js';
//!
//! await init();
//! sequencer_init();
//!
//! const seq = new WebSequencer();
//! seq.update_sequence(
//!     new Uint8Array([0x90, 0x80]), new Uint8Array([60, 60]),
//!     new Uint8Array([100, 0]), new Float64Array([0, 1]),
//!     4, 120, true, 0, sampleRate);
//! seq.play_from_start();
//!
//! // In the AudioWorklet, once per quantum:
//! // [status, data1, data2, offset, status, data1, data2, offset, ...]
//! const triggers = seq.render(currentFrame, 128);
//! ```

use wasm_bindgen::prelude::*;

use crate::config::EngineConfig;
use crate::engine::SequencerEngine;
use crate::error::SequencerError;
use crate::event::SequenceEvent;
use crate::observer::{RenderObserver, TriggerBuffer};
use crate::settings::SequenceSettings;

/// Triggers collected per render call before further ones are dropped.
const DEFAULT_MAX_TRIGGERS: usize = 1024;

// ═══════════════════════════════════════════════════════════════════════════
// Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the wasm module. Call this once before using any other functions.
/// Sets up panic hooks and console logging.
#[wasm_bindgen]
pub fn sequencer_init() {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Debug).ok();
}

fn js_error(e: SequencerError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════
// Sequencer
// ═══════════════════════════════════════════════════════════════════════════

/// Engine and its render observer in one object.
///
/// Web audio runs the worklet on a single thread, so the control and
/// render halves live together here.
#[wasm_bindgen]
pub struct WebSequencer {
    engine: SequencerEngine,
    observer: Option<RenderObserver<TriggerBuffer>>,
    max_triggers: usize,
}

#[wasm_bindgen]
impl WebSequencer {
    #[wasm_bindgen(constructor)]
    pub fn new() -> WebSequencer {
        Self::with_capacities(0, 0, DEFAULT_MAX_TRIGGERS as u32)
    }

    /// Create with explicit capacities. Zero takes the default.
    pub fn with_capacities(
        command_capacity: u32,
        max_active_notes: u32,
        max_triggers: u32,
    ) -> WebSequencer {
        let config = EngineConfig {
            command_capacity: command_capacity as usize,
            max_active_notes: max_active_notes as usize,
        };
        let max_triggers = match max_triggers {
            0 => DEFAULT_MAX_TRIGGERS,
            n => n as usize,
        };
        WebSequencer {
            engine: SequencerEngine::with_config(config),
            observer: None,
            max_triggers,
        }
    }

    /// Replace the sequence. Event fields are passed as parallel arrays.
    #[allow(clippy::too_many_arguments)]
    pub fn update_sequence(
        &mut self,
        status: &[u8],
        data1: &[u8],
        data2: &[u8],
        beats: &[f64],
        length: f64,
        tempo: f64,
        loop_enabled: bool,
        number_of_loops: i32,
        sample_rate: f64,
    ) -> Result<(), JsValue> {
        let count = status.len();
        if data1.len() != count || data2.len() != count || beats.len() != count {
            return Err(JsValue::from_str("event arrays must have equal length"));
        }

        let events: Vec<SequenceEvent> = (0..count)
            .map(|i| SequenceEvent::new(status[i], data1[i], data2[i], beats[i]))
            .collect();
        let settings = SequenceSettings::new(length, tempo, loop_enabled, number_of_loops);

        // Existing observers pick up the new timeline on their next render.
        if self.observer.is_some() {
            self.engine
                .publish(&events, settings, sample_rate)
                .map_err(js_error)?;
        } else {
            let sink = TriggerBuffer::with_capacity(self.max_triggers);
            let observer = self
                .engine
                .update_sequence(&events, settings, sample_rate, sink)
                .map_err(js_error)?;
            self.observer = Some(observer);
        }
        Ok(())
    }

    /// Render one quantum and return the triggers, flattened as
    /// `[status, data1, data2, offset]` quadruples.
    pub fn render(&mut self, sample_time: f64, frames: u32) -> Vec<u32> {
        let Some(observer) = self.observer.as_mut() else {
            return Vec::new();
        };

        observer.sink_mut().clear();
        observer.render(sample_time, frames);

        observer
            .sink()
            .triggers()
            .iter()
            .flat_map(|t| [t.status as u32, t.data1 as u32, t.data2 as u32, t.offset])
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Transport
    // ═══════════════════════════════════════════════════════════════════════

    pub fn play(&mut self) -> Result<(), JsValue> {
        self.engine.play().map_err(js_error)
    }

    pub fn play_from_start(&mut self) -> Result<(), JsValue> {
        self.engine.play_from_start().map_err(js_error)
    }

    pub fn play_after_delay(&mut self, beats: f64) -> Result<(), JsValue> {
        self.engine.play_after_delay(beats).map_err(js_error)
    }

    pub fn stop(&mut self) -> Result<(), JsValue> {
        self.engine.stop().map_err(js_error)
    }

    pub fn seek_to(&mut self, beat: f64) -> Result<(), JsValue> {
        self.engine.seek_to(beat).map_err(js_error)
    }

    pub fn rewind(&mut self) -> Result<(), JsValue> {
        self.engine.rewind().map_err(js_error)
    }

    pub fn panic(&mut self) -> Result<(), JsValue> {
        self.engine.panic().map_err(js_error)
    }

    pub fn stop_playing_notes(&mut self) -> Result<(), JsValue> {
        self.engine.stop_playing_notes().map_err(js_error)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Readback
    // ═══════════════════════════════════════════════════════════════════════

    pub fn position(&self) -> f64 {
        self.engine.position()
    }

    pub fn current_loop(&self) -> u32 {
        self.engine.current_loop()
    }

    pub fn is_playing(&self) -> bool {
        self.engine.is_playing()
    }

    /// Triggers dropped because the per-render buffer was full.
    pub fn dropped_triggers(&self) -> u64 {
        self.observer
            .as_ref()
            .map_or(0, |o| o.sink().overflowed())
    }
}

impl Default for WebSequencer {
    fn default() -> Self {
        Self::new()
    }
}
