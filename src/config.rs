// src/config.rs

/// Default transport mailbox depth.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Default number of simultaneously tracked sounding notes.
pub const DEFAULT_MAX_ACTIVE_NOTES: usize = 256;

/// Engine construction parameters.
///
/// Every capacity is fixed here; the render thread never grows a container.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Transport commands that may be pending before the render thread drains them.
    pub command_capacity: usize,
    /// Sounding notes tracked for note-off flushing.
    pub max_active_notes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            max_active_notes: DEFAULT_MAX_ACTIVE_NOTES,
        }
    }
}

impl EngineConfig {
    /// Replace zero capacities with the defaults.
    pub fn normalized(self) -> Self {
        Self {
            command_capacity: if self.command_capacity == 0 {
                DEFAULT_COMMAND_CAPACITY
            } else {
                self.command_capacity
            },
            max_active_notes: if self.max_active_notes == 0 {
                DEFAULT_MAX_ACTIVE_NOTES
            } else {
                self.max_active_notes
            },
        }
    }
}
