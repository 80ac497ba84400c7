//! Selection clipboard
//!
//! A copied selection is stored as JSON in a single named slot of a
//! key/value store. The payload records the length of the copied time span
//! (`partDuration`) so a paste can tile the material over a longer range.
//!
//! Reading never fails loudly: a missing, unparseable or structurally
//! invalid payload reads as `None` and pastes become no-ops.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::config::Config;
use crate::models::Note;

/// Content of one copied pattern
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PatternCopy {
    pub instruments: Vec<usize>,
    pub notes: Vec<Note>,
}

/// One copied channel: pattern contents keyed by the original pattern
/// number, and the pattern number of every copied bar
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelCopy {
    pub is_noise: bool,
    #[serde(alias = "isMod")]
    pub is_mod_channel: bool,
    pub patterns: BTreeMap<usize, PatternCopy>,
    pub bars: Vec<usize>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardPayload {
    pub part_duration: i32,
    #[serde(default)]
    pub channels: Vec<ChannelCopy>,
}

impl ClipboardPayload {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse and validate a stored payload
    pub fn from_json(text: &str) -> Option<Self> {
        let payload: ClipboardPayload = match serde_json::from_str(text) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("discarding unreadable clipboard payload: {}", err);
                return None;
            }
        };
        if let Err(reason) = payload.validate() {
            log::warn!("discarding malformed clipboard payload: {}", reason);
            return None;
        }
        Some(payload)
    }

    fn validate(&self) -> Result<(), String> {
        if self.part_duration <= 0 {
            return Err(format!("part duration {}", self.part_duration));
        }
        for (index, channel) in self.channels.iter().enumerate() {
            if let Some(missing) = channel
                .bars
                .iter()
                .find(|&&number| number != 0 && !channel.patterns.contains_key(&number))
            {
                return Err(format!("channel {} copies unknown pattern {}", index, missing));
            }
            for (number, pattern) in &channel.patterns {
                if let Some(note) = pattern.notes.iter().find(|note| !note.is_valid()) {
                    return Err(format!(
                        "channel {} pattern {} has an invalid note at {}",
                        index, number, note.start
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Process-wide key/value storage backing the clipboard
pub trait ClipboardStore {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&mut self, key: &str, value: String);
}

/// In-memory store, empty at startup
#[derive(Clone, Debug, Default)]
pub struct MemoryClipboard {
    slots: HashMap<String, String>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClipboardStore for MemoryClipboard {
    fn read(&self, key: &str) -> Option<String> {
        self.slots.get(key).cloned()
    }

    fn write(&mut self, key: &str, value: String) {
        self.slots.insert(key.to_string(), value);
    }
}

/// Browser `localStorage`, shared by every editor tab of the origin
#[cfg(target_arch = "wasm32")]
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalStorageClipboard;

#[cfg(target_arch = "wasm32")]
impl LocalStorageClipboard {
    fn storage() -> Option<web_sys::Storage> {
        web_sys::window()?.local_storage().ok().flatten()
    }
}

#[cfg(target_arch = "wasm32")]
impl ClipboardStore for LocalStorageClipboard {
    fn read(&self, key: &str) -> Option<String> {
        Self::storage()?.get_item(key).ok().flatten()
    }

    fn write(&mut self, key: &str, value: String) {
        match Self::storage() {
            Some(storage) => {
                if storage.set_item(key, &value).is_err() {
                    log::error!("localStorage rejected clipboard slot {}", key);
                }
            }
            None => log::warn!("localStorage unavailable, clipboard not stored"),
        }
    }
}

/// The single clipboard slot of the editor
///
/// Empty at startup, overwritten by every copy, read by every paste.
pub struct Clipboard {
    store: Box<dyn ClipboardStore + Send>,
}

impl Default for Clipboard {
    fn default() -> Self {
        Self::new(Box::new(MemoryClipboard::new()))
    }
}

impl std::fmt::Debug for Clipboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clipboard").finish_non_exhaustive()
    }
}

impl Clipboard {
    pub fn new(store: Box<dyn ClipboardStore + Send>) -> Self {
        Self { store }
    }

    pub fn store(&mut self, payload: &ClipboardPayload) -> bool {
        store_selection(self.store.as_mut(), payload)
    }

    pub fn load(&self) -> Option<ClipboardPayload> {
        load_selection(self.store.as_ref())
    }

    /// Raw stored text, for hosts that mirror the slot elsewhere
    pub fn raw(&self) -> Option<String> {
        self.store.read(Config::CLIPBOARD_KEY)
    }
}

/// Store a copied selection, replacing the previous one
pub fn store_selection(store: &mut dyn ClipboardStore, payload: &ClipboardPayload) -> bool {
    match payload.to_json() {
        Ok(text) => {
            store.write(Config::CLIPBOARD_KEY, text);
            true
        }
        Err(err) => {
            log::error!("failed to encode clipboard payload: {}", err);
            false
        }
    }
}

/// Load the copied selection, if a valid one is stored
pub fn load_selection(store: &dyn ClipboardStore) -> Option<ClipboardPayload> {
    let text = store.read(Config::CLIPBOARD_KEY)?;
    ClipboardPayload::from_json(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotePin;

    #[test]
    fn test_payload_uses_wire_names() {
        let mut patterns = BTreeMap::new();
        patterns.insert(
            3,
            PatternCopy {
                instruments: vec![0],
                notes: vec![Note::new(12, 0, 4, 6)],
            },
        );
        let payload = ClipboardPayload {
            part_duration: 192,
            channels: vec![ChannelCopy {
                is_noise: false,
                is_mod_channel: false,
                patterns,
                bars: vec![3, 0],
            }],
        };
        let json = payload.to_json().unwrap();
        assert!(json.contains("\"partDuration\":192"));
        assert!(json.contains("\"isModChannel\":false"));
        assert!(json.contains("\"patterns\":{\"3\":"));
        assert!(json.contains("\"continuesLastPattern\":false"));
        assert_eq!(ClipboardPayload::from_json(&json), Some(payload));
    }

    #[test]
    fn test_accepts_short_mod_flag_and_missing_fields() {
        let json = r#"{"partDuration": 96, "channels": [{"isMod": true, "bars": [0]}]}"#;
        let payload = ClipboardPayload::from_json(json).unwrap();
        assert!(payload.channels[0].is_mod_channel);
        assert!(payload.channels[0].patterns.is_empty());
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        assert!(ClipboardPayload::from_json("not json").is_none());
        assert!(ClipboardPayload::from_json(r#"{"channels": []}"#).is_none());
        assert!(ClipboardPayload::from_json(r#"{"partDuration": 96, "channels": [{"bars": [2]}]}"#).is_none());

        let bad_note = Note::with_pins(vec![12], 4, 4, vec![NotePin::new(0, 0, 6)]);
        let mut patterns = BTreeMap::new();
        patterns.insert(1, PatternCopy { instruments: vec![0], notes: vec![bad_note] });
        let payload = ClipboardPayload {
            part_duration: 96,
            channels: vec![ChannelCopy { patterns, bars: vec![1], ..Default::default() }],
        };
        assert!(ClipboardPayload::from_json(&payload.to_json().unwrap()).is_none());
    }

    #[test]
    fn test_store_overwrites_single_slot() {
        let mut store = MemoryClipboard::new();
        assert!(load_selection(&store).is_none());
        let first = ClipboardPayload { part_duration: 24, channels: vec![] };
        let second = ClipboardPayload { part_duration: 48, channels: vec![] };
        assert!(store_selection(&mut store, &first));
        assert!(store_selection(&mut store, &second));
        assert_eq!(load_selection(&store), Some(second));
    }

    #[test]
    fn test_clipboard_starts_empty_and_ignores_garbage() {
        let mut store = MemoryClipboard::new();
        store.write(Config::CLIPBOARD_KEY, "{\"partDuration\": -1}".to_string());
        let clipboard = Clipboard::new(Box::new(store));
        assert!(clipboard.load().is_none());
        assert!(clipboard.raw().is_some());
        assert!(Clipboard::default().load().is_none());
    }
}
