//! Pattern Editor WASM Module
//!
//! Selection-driven note transformations for a chiptune pattern sequencer:
//! merging, bridging, splitting, stretching, transposing and copy/paste of
//! notes in patterns that several bars may share, with undo/redo.

pub mod api;
pub mod clipboard;
pub mod config;
pub mod errors;
pub mod models;
pub mod selection;
pub mod undo;

// Re-export commonly used types
pub use api::{EditorSession, Operation, OperationResult};
pub use clipboard::{Clipboard, ClipboardPayload, ClipboardStore, MemoryClipboard};
pub use config::{Config, EditorOptions};
pub use errors::{EditorError, Result};
pub use models::{Channel, ChannelKind, Instrument, Note, NotePin, Pattern, Song};
pub use selection::{Selection, SelectionEngine};
pub use undo::{Command, CommandRecorder, CommandToken, EditKind, History};

use wasm_bindgen::prelude::*;

// This is like the `main` function, but for WASM modules.
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    #[cfg(feature = "console_log")]
    if console_log::init_with_level(log::Level::Debug).is_err() {
        // A logger was already installed by the host page
        return;
    }

    log::info!("Pattern Editor WASM module initialized");
}
