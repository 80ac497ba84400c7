//! WASM API for the pattern editor
//!
//! The session lives in WASM-owned storage; JavaScript loads a song, sets
//! the selection and sends operations, then reads back snapshots.

use lazy_static::lazy_static;
use std::sync::{Mutex, MutexGuard};
use wasm_bindgen::prelude::*;

use super::helpers::{deserialize, engine_error, serialize, validation_error};
use super::session::{parse_options, EditorSession, Operation};
use crate::clipboard::Clipboard;
use crate::config::EditorOptions;
use crate::errors::EditorError;
use crate::models::Song;
use crate::selection::Selection;

// WASM-owned session storage (canonical source of truth)
lazy_static! {
    static ref SESSION: Mutex<Option<EditorSession>> = Mutex::new(None);
}

fn lock_session() -> Result<MutexGuard<'static, Option<EditorSession>>, JsValue> {
    SESSION.lock().map_err(|_| validation_error("session storage is poisoned"))
}

fn with_session<T>(
    action: impl FnOnce(&mut EditorSession) -> Result<T, JsValue>,
) -> Result<T, JsValue> {
    let mut guard = lock_session()?;
    let session = guard
        .as_mut()
        .ok_or_else(|| engine_error("Session", EditorError::NoSession))?;
    action(session)
}

#[cfg(target_arch = "wasm32")]
fn session_clipboard() -> Clipboard {
    Clipboard::new(Box::new(crate::clipboard::LocalStorageClipboard))
}

#[cfg(not(target_arch = "wasm32"))]
fn session_clipboard() -> Clipboard {
    Clipboard::default()
}

// ============================================================================
// Song lifecycle
// ============================================================================

/// Load a song into WASM's internal storage, replacing any open session
#[wasm_bindgen(js_name = loadSong)]
pub fn load_song(song_js: JsValue, options_json: &str) -> Result<(), JsValue> {
    log::info!("loadSong called");
    let song: Song = deserialize(song_js, "Song deserialization error")?;
    let options: EditorOptions =
        parse_options(options_json).map_err(|e| engine_error("Options error", e))?;
    let session = EditorSession::with_clipboard(song, options, session_clipboard())
        .map_err(|e| engine_error("Invalid song", e))?;
    *lock_session()? = Some(session);
    Ok(())
}

/// Get the current song from WASM's internal storage
#[wasm_bindgen(js_name = getSongSnapshot)]
pub fn get_song_snapshot() -> Result<JsValue, JsValue> {
    with_session(|session| serialize(session.song(), "Song serialization error"))
}

/// Export the current song as JSON text
#[wasm_bindgen(js_name = exportSongJson)]
pub fn export_song_json() -> Result<String, JsValue> {
    with_session(|session| session.song_json().map_err(|e| engine_error("Export error", e)))
}

#[wasm_bindgen(js_name = setOptions)]
pub fn set_options(options_json: &str) -> Result<(), JsValue> {
    let options = parse_options(options_json).map_err(|e| engine_error("Options error", e))?;
    with_session(|session| {
        session.set_options(options);
        Ok(())
    })
}

// ============================================================================
// Selection and operations
// ============================================================================

#[wasm_bindgen(js_name = setSelection)]
pub fn set_selection(selection_js: JsValue) -> Result<(), JsValue> {
    let selection: Selection = deserialize(selection_js, "Selection deserialization error")?;
    with_session(|session| {
        session
            .set_selection(selection)
            .map_err(|e| engine_error("Invalid selection", e))
    })
}

#[wasm_bindgen(js_name = getSelection)]
pub fn get_selection() -> Result<JsValue, JsValue> {
    with_session(|session| serialize(&session.selection(), "Selection serialization error"))
}

/// Apply one engine operation to the selection
///
/// # Returns
/// `{changed, canUndo, canRedo, selection}`
#[wasm_bindgen(js_name = applyOperation)]
pub fn apply_operation(operation_js: JsValue) -> Result<JsValue, JsValue> {
    let operation: Operation = deserialize(operation_js, "Operation deserialization error")?;
    log::info!("applyOperation called: {:?}", operation);
    with_session(|session| {
        let result = session
            .apply(&operation)
            .map_err(|e| engine_error("Operation failed", e))?;
        serialize(&result, "Result serialization error")
    })
}

// ============================================================================
// Undo/Redo operations
// ============================================================================

/// Undo the last edit operation
#[wasm_bindgen(js_name = undo)]
pub fn undo() -> Result<JsValue, JsValue> {
    log::info!("undo called");
    with_session(|session| {
        let result = session.undo().map_err(|e| engine_error("Undo failed", e))?;
        serialize(&result, "Result serialization error")
    })
}

/// Redo the last undone edit operation
#[wasm_bindgen(js_name = redo)]
pub fn redo() -> Result<JsValue, JsValue> {
    log::info!("redo called");
    with_session(|session| {
        let result = session.redo().map_err(|e| engine_error("Redo failed", e))?;
        serialize(&result, "Result serialization error")
    })
}

/// Check if undo is available
#[wasm_bindgen(js_name = canUndo)]
pub fn can_undo() -> Result<bool, JsValue> {
    let guard = lock_session()?;
    Ok(guard.as_ref().map_or(false, EditorSession::can_undo))
}

/// Check if redo is available
#[wasm_bindgen(js_name = canRedo)]
pub fn can_redo() -> Result<bool, JsValue> {
    let guard = lock_session()?;
    Ok(guard.as_ref().map_or(false, EditorSession::can_redo))
}

// ============================================================================
// Read-only tables
// ============================================================================

/// Names of the scales, indexed like `Song::scale`
#[wasm_bindgen(js_name = scaleNames)]
pub fn scale_names() -> js_sys::Array {
    crate::models::scale::SCALES
        .iter()
        .map(|scale| JsValue::from_str(scale.name))
        .collect()
}

/// Names of the rhythms, indexed like `Song::rhythm`
#[wasm_bindgen(js_name = rhythmNames)]
pub fn rhythm_names() -> js_sys::Array {
    crate::models::scale::RHYTHMS
        .iter()
        .map(|rhythm| JsValue::from_str(rhythm.name))
        .collect()
}
