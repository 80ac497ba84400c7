//! WASM build test
//!
//! Drives the exported functions the way the UI does.

#![cfg(target_arch = "wasm32")]

use pattern_editor_wasm::api::*;
use pattern_editor_wasm::{Note, Song};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn song_value() -> JsValue {
    let mut song = Song::new(1, 1, 0, 4, 2);
    song.channels[0].bars[0] = 1;
    song.channels[0].patterns[0].notes = vec![Note::new(60, 0, 4, 6), Note::new(67, 8, 12, 6)];
    serde_wasm_bindgen::to_value(&song).unwrap()
}

fn operation(json: &str) -> JsValue {
    let operation: Operation = serde_json::from_str(json).unwrap();
    serde_wasm_bindgen::to_value(&operation).unwrap()
}

#[wasm_bindgen_test]
fn test_load_and_export_song() {
    load_song(song_value(), "").unwrap();
    let exported: Song = serde_json::from_str(&export_song_json().unwrap()).unwrap();
    assert_eq!(exported.channels[0].bars, vec![1, 0, 0, 0]);
    assert!(!can_undo().unwrap());
}

#[wasm_bindgen_test]
fn test_apply_operation_and_undo() {
    load_song(song_value(), r#"{"notesOutsideScale": true}"#).unwrap();
    let result = apply_operation(operation(r#"{"op": "bridge", "doBends": false}"#)).unwrap();
    let result: OperationResult = serde_wasm_bindgen::from_value(result).unwrap();
    assert!(result.changed);
    assert!(can_undo().unwrap());

    undo().unwrap();
    assert!(!can_undo().unwrap());
    assert!(can_redo().unwrap());
}

#[wasm_bindgen_test]
fn test_bad_operation_is_rejected() {
    load_song(song_value(), "").unwrap();
    assert!(apply_operation(JsValue::from_str("nonsense")).is_err());
}

#[wasm_bindgen_test]
fn test_scale_names_are_exported() {
    assert_eq!(scale_names().length() as usize, pattern_editor_wasm::models::scale::SCALES.len());
    assert!(rhythm_names().length() > 0);
}
