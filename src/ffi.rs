// C-compatible FFI bindings for Swift/iOS integration.
//
// Safety requirements:
// - Engine and observer pointers must be non-null unless documented otherwise
// - All handles must be created by this module and not fabricated
// - Event arrays must hold `count` valid elements (null is allowed when count is 0)
// - Caller must call the corresponding _destroy function for each _create
// - An observer is driven from one thread at a time (the render thread)

use std::ffi::c_void;
use std::slice;

use crate::config::EngineConfig;
use crate::diagnostics::DiagnosticsSnapshot;
use crate::engine::SequencerEngine;
use crate::error::SequencerError;
use crate::event::{SequenceEvent, SequenceNote, Trigger};
use crate::observer::{RenderObserver, TriggerSink};
use crate::settings::SequenceSettings;

use log::{debug, error};

#[cfg(feature = "ios")]
use log::LevelFilter;
#[cfg(feature = "ios")]
use oslog::OsLogger;

// Logger subsystem identifier
#[cfg(feature = "ios")]
const LOG_SUBSYSTEM: &str = "com.sequencer.engine";

// ═══════════════════════════════════════════════════════════════════════════
// Logger Initialization
// ═══════════════════════════════════════════════════════════════════════════

/// Initialize the oslog logger.
///
/// This should be called once at application startup before using any other
/// FFI functions. Output appears in Console.app and Xcode's debug console.
#[cfg(feature = "ios")]
#[unsafe(no_mangle)]
pub extern "C" fn sequencer_init_logger() {
    OsLogger::new(LOG_SUBSYSTEM)
        .level_filter(LevelFilter::Debug)
        .init()
        .ok();
}

// ═══════════════════════════════════════════════════════════════════════════
// Opaque Handle Types
// ═══════════════════════════════════════════════════════════════════════════

/// Opaque handle to the control-thread engine.
pub struct SequencerHandle {
    inner: SequencerEngine,
}

/// Opaque handle to a render observer.
pub struct SequencerObserver {
    inner: RenderObserver<CScheduleSink>,
}

/// Host callback receiving one trigger.
///
/// Called on the render thread; it must not block.
pub type ScheduleFn =
    extern "C" fn(user_data: *mut c_void, status: u8, data1: u8, data2: u8, offset: u32);

struct CScheduleSink {
    callback: ScheduleFn,
    user_data: *mut c_void,
}

// SAFETY: the host guarantees `user_data` may be used from the render thread.
unsafe impl Send for CScheduleSink {}

impl TriggerSink for CScheduleSink {
    #[inline]
    fn schedule(&mut self, trigger: Trigger) {
        (self.callback)(
            self.user_data,
            trigger.status,
            trigger.data1,
            trigger.data2,
            trigger.offset,
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FFI Result Types
// ═══════════════════════════════════════════════════════════════════════════

/// Outcome of a fallible FFI call.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerStatus {
    Ok = 0,
    NullPointer = 1,
    InvalidSampleRate = 2,
    Allocation = 3,
    CommandQueueFull = 4,
}

impl From<&SequencerError> for SequencerStatus {
    fn from(e: &SequencerError) -> Self {
        match e {
            SequencerError::InvalidSampleRate(_) => SequencerStatus::InvalidSampleRate,
            SequencerError::Allocation { .. } => SequencerStatus::Allocation,
            SequencerError::CommandQueueFull(_) => SequencerStatus::CommandQueueFull,
        }
    }
}

fn status(result: Result<(), SequencerError>) -> SequencerStatus {
    match result {
        Ok(()) => SequencerStatus::Ok,
        Err(e) => SequencerStatus::from(&e),
    }
}

/// Borrow a host array. Null is accepted for an empty array.
///
/// # Safety
/// Non-null `ptr` must point to `count` valid elements.
unsafe fn host_slice<'a, T>(ptr: *const T, count: usize) -> Option<&'a [T]> {
    if count == 0 {
        return Some(&[]);
    }
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { slice::from_raw_parts(ptr, count) })
}

// ═══════════════════════════════════════════════════════════════════════════
// Engine Lifecycle
// ═══════════════════════════════════════════════════════════════════════════

/// Default engine configuration.
#[unsafe(no_mangle)]
pub extern "C" fn sequencer_default_config() -> EngineConfig {
    EngineConfig::default()
}

/// Create an engine with the default configuration.
///
/// Returns an opaque pointer that must be freed with `sequencer_engine_destroy`.
#[unsafe(no_mangle)]
pub extern "C" fn sequencer_engine_create() -> *mut SequencerHandle {
    sequencer_engine_create_with_config(EngineConfig::default())
}

/// Create an engine with explicit capacities. Zero fields take defaults.
#[unsafe(no_mangle)]
pub extern "C" fn sequencer_engine_create_with_config(config: EngineConfig) -> *mut SequencerHandle {
    let inner = SequencerEngine::with_config(config);
    Box::into_raw(Box::new(SequencerHandle { inner }))
}

/// Destroy an engine.
///
/// Observers created from it stay valid: they release their notes on the
/// next render and then stay silent.
///
/// # Safety
/// `engine` must come from `sequencer_engine_create*` and not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_engine_destroy(engine: *mut SequencerHandle) {
    if engine.is_null() {
        return;
    }
    debug!("sequencer_engine_destroy");
    drop(unsafe { Box::from_raw(engine) });
}

// ═══════════════════════════════════════════════════════════════════════════
// Publishing
// ═══════════════════════════════════════════════════════════════════════════

/// Replace the sequence with raw events and return a render observer.
///
/// Returns null on failure (the previous sequence stays in effect). The
/// observer must be freed with `sequencer_observer_destroy`.
///
/// # Safety
/// See the module safety requirements.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_update_sequence(
    engine: *mut SequencerHandle,
    events: *const SequenceEvent,
    count: usize,
    settings: SequenceSettings,
    sample_rate: f64,
    callback: Option<ScheduleFn>,
    user_data: *mut c_void,
) -> *mut SequencerObserver {
    if engine.is_null() {
        error!("sequencer_update_sequence: null engine");
        return std::ptr::null_mut();
    }
    let Some(callback) = callback else {
        error!("sequencer_update_sequence: missing schedule callback");
        return std::ptr::null_mut();
    };
    let Some(events) = (unsafe { host_slice(events, count) }) else {
        error!("sequencer_update_sequence: null event array with count {}", count);
        return std::ptr::null_mut();
    };

    let sink = CScheduleSink {
        callback,
        user_data,
    };
    let engine = unsafe { &mut (*engine).inner };
    match engine.update_sequence(events, settings, sample_rate, sink) {
        Ok(inner) => Box::into_raw(Box::new(SequencerObserver { inner })),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Replace the sequence with notes (note-on/note-off pairs).
///
/// # Safety
/// See the module safety requirements.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_update_notes(
    engine: *mut SequencerHandle,
    notes: *const SequenceNote,
    count: usize,
    settings: SequenceSettings,
    sample_rate: f64,
    callback: Option<ScheduleFn>,
    user_data: *mut c_void,
) -> *mut SequencerObserver {
    let Some(notes) = (unsafe { host_slice(notes, count) }) else {
        error!("sequencer_update_notes: null note array with count {}", count);
        return std::ptr::null_mut();
    };
    let events = SequenceNote::flatten(notes);
    unsafe {
        sequencer_update_sequence(
            engine,
            events.as_ptr(),
            events.len(),
            settings,
            sample_rate,
            callback,
            user_data,
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Render Observer
// ═══════════════════════════════════════════════════════════════════════════

/// Schedule the next `frame_count` samples. Call once per audio buffer.
///
/// # Safety
/// `observer` must come from `sequencer_update_*`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_observer_render(
    observer: *mut SequencerObserver,
    sample_time: f64,
    frame_count: u32,
) {
    if observer.is_null() {
        return;
    }
    unsafe { (*observer).inner.render(sample_time, frame_count) };
}

/// Destroy a render observer.
///
/// # Safety
/// `observer` must come from `sequencer_update_*` and not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_observer_destroy(observer: *mut SequencerObserver) {
    if observer.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(observer) });
}

// ═══════════════════════════════════════════════════════════════════════════
// Readback
// ═══════════════════════════════════════════════════════════════════════════

/// Position in beats within the current pass.
///
/// # Safety
/// `engine` must be a live engine handle or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_position(engine: *const SequencerHandle) -> f64 {
    if engine.is_null() {
        return 0.0;
    }
    unsafe { (*engine).inner.position() }
}

/// Zero-based index of the current pass.
///
/// # Safety
/// `engine` must be a live engine handle or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_current_loop(engine: *const SequencerHandle) -> u32 {
    if engine.is_null() {
        return 0;
    }
    unsafe { (*engine).inner.current_loop() }
}

/// # Safety
/// `engine` must be a live engine handle or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_is_playing(engine: *const SequencerHandle) -> bool {
    if engine.is_null() {
        return false;
    }
    unsafe { (*engine).inner.is_playing() }
}

/// # Safety
/// `engine` must be a live engine handle or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_diagnostics(engine: *const SequencerHandle) -> DiagnosticsSnapshot {
    if engine.is_null() {
        return DiagnosticsSnapshot::default();
    }
    unsafe { (*engine).inner.diagnostics() }
}

/// # Safety
/// `engine` must be a live engine handle or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_settings(engine: *const SequencerHandle) -> SequenceSettings {
    if engine.is_null() {
        return SequenceSettings::default();
    }
    unsafe { (*engine).inner.settings() }
}

// ═══════════════════════════════════════════════════════════════════════════
// Transport
// ═══════════════════════════════════════════════════════════════════════════

/// Run a transport call against a possibly-null engine pointer.
///
/// # Safety
/// `engine` must be a live engine handle or null.
unsafe fn with_engine(
    engine: *mut SequencerHandle,
    f: impl FnOnce(&mut SequencerEngine) -> Result<(), SequencerError>,
) -> SequencerStatus {
    if engine.is_null() {
        error!("Transport call on a null engine");
        return SequencerStatus::NullPointer;
    }
    status(f(unsafe { &mut (*engine).inner }))
}

/// # Safety
/// `engine` must be a live engine handle or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_play(engine: *mut SequencerHandle) -> SequencerStatus {
    unsafe { with_engine(engine, |e| e.play()) }
}

/// # Safety
/// `engine` must be a live engine handle or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_play_from_start(engine: *mut SequencerHandle) -> SequencerStatus {
    unsafe { with_engine(engine, |e| e.play_from_start()) }
}

/// # Safety
/// `engine` must be a live engine handle or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_play_after_delay(
    engine: *mut SequencerHandle,
    beats: f64,
) -> SequencerStatus {
    unsafe { with_engine(engine, |e| e.play_after_delay(beats)) }
}

/// # Safety
/// `engine` must be a live engine handle or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_stop(engine: *mut SequencerHandle) -> SequencerStatus {
    unsafe { with_engine(engine, |e| e.stop()) }
}

/// # Safety
/// `engine` must be a live engine handle or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_seek_to(engine: *mut SequencerHandle, beat: f64) -> SequencerStatus {
    unsafe { with_engine(engine, |e| e.seek_to(beat)) }
}

/// # Safety
/// `engine` must be a live engine handle or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_rewind(engine: *mut SequencerHandle) -> SequencerStatus {
    unsafe { with_engine(engine, |e| e.rewind()) }
}

/// # Safety
/// `engine` must be a live engine handle or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_panic(engine: *mut SequencerHandle) -> SequencerStatus {
    unsafe { with_engine(engine, |e| e.panic()) }
}

/// # Safety
/// `engine` must be a live engine handle or null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sequencer_stop_playing_notes(engine: *mut SequencerHandle) -> SequencerStatus {
    unsafe { with_engine(engine, |e| e.stop_playing_notes()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn collect(user_data: *mut c_void, status: u8, data1: u8, _data2: u8, offset: u32) {
        let out = unsafe { &mut *(user_data as *mut Vec<(u8, u8, u32)>) };
        out.push((status, data1, offset));
    }

    #[test]
    fn test_round_trip_through_c_abi() {
        let mut received: Vec<(u8, u8, u32)> = Vec::with_capacity(16);
        let notes = [SequenceNote::new(0, 60, 100, 0.5, 0.1).unwrap()];

        unsafe {
            let engine = sequencer_engine_create();
            let observer = sequencer_update_notes(
                engine,
                notes.as_ptr(),
                notes.len(),
                SequenceSettings::new(1.0, 120.0, true, 0),
                44_100.0,
                Some(collect as ScheduleFn),
                &mut received as *mut Vec<(u8, u8, u32)> as *mut c_void,
            );
            assert!(!observer.is_null());

            assert_eq!(sequencer_play_from_start(engine), SequencerStatus::Ok);
            assert!(sequencer_is_playing(engine));
            sequencer_observer_render(observer, 0.0, 22_050);
            assert_eq!(sequencer_current_loop(engine), 1);
            assert_eq!(sequencer_position(engine), 0.0);

            sequencer_observer_destroy(observer);
            sequencer_engine_destroy(engine);
        }

        assert_eq!(received, vec![(0x90, 60, 11_025), (0x80, 60, 13_230)]);
    }

    #[test]
    fn test_null_handles_are_rejected() {
        unsafe {
            assert_eq!(sequencer_play(std::ptr::null_mut()), SequencerStatus::NullPointer);
            assert_eq!(sequencer_position(std::ptr::null()), 0.0);
            sequencer_observer_render(std::ptr::null_mut(), 0.0, 64);

            let engine = sequencer_engine_create();
            let observer = sequencer_update_sequence(
                engine,
                std::ptr::null(),
                3,
                SequenceSettings::default(),
                44_100.0,
                Some(collect as ScheduleFn),
                std::ptr::null_mut(),
            );
            assert!(observer.is_null());
            sequencer_engine_destroy(engine);
        }
    }
}
