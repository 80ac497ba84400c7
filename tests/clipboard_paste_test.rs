// Copy / paste / paste-numbers through the clipboard slot

use std::collections::BTreeMap;

use pattern_editor_wasm::clipboard::{ChannelCopy, PatternCopy};
use pattern_editor_wasm::*;

fn engine_at(selection: Selection) -> SelectionEngine {
    let mut engine = SelectionEngine::new(EditorOptions::default());
    engine.selection = selection;
    engine
}

fn notes_at(song: &Song, channel: usize, bar: usize) -> Vec<Note> {
    song.get_pattern(channel, bar)
        .unwrap()
        .map(|pattern| pattern.notes.clone())
        .unwrap_or_default()
}

fn spans(notes: &[Note]) -> Vec<(i32, i32)> {
    notes.iter().map(|note| (note.start, note.end)).collect()
}

#[test]
fn test_pitch_copy_pasted_on_noise_is_remapped() {
    let mut song = Song::new(1, 1, 0, 4, 4);
    song.channels[0].bars[0] = 1;
    song.channels[0].patterns[0].notes = vec![
        Note::new(60, 0, 8, 6),
        Note::with_pins(vec![61, 65], 8, 16, vec![NotePin::new(0, 0, 6), NotePin::new(0, 8, 6)]),
    ];
    let mut history = History::default();
    let mut clipboard = Clipboard::default();

    let mut engine = engine_at(Selection::single(0, 0));
    assert!(engine.copy(&song, &mut clipboard).unwrap());

    engine.selection = Selection::single(1, 0);
    assert!(engine.paste(&mut song, &mut history, &clipboard).unwrap());
    let pasted = notes_at(&song, 1, 0);
    assert_eq!(spans(&pasted), vec![(0, 8), (8, 16)]);
    assert_eq!(pasted[0].pitches, vec![0]);
    assert_eq!(pasted[1].pitches, vec![1, 2]);
}

#[test]
fn test_copy_then_paste_on_empty_region_reproduces_notes() {
    let mut song = Song::new(1, 0, 0, 4, 4);
    song.channels[0].bars = vec![1, 2, 0, 0];
    song.channels[0].patterns[0].notes = vec![Note::new(24, 0, 12, 6), Note::new(26, 24, 48, 3)];
    song.channels[0].patterns[1].notes = vec![Note::with_pins(
        vec![31],
        6,
        30,
        vec![NotePin::new(0, 0, 6), NotePin::new(-2, 12, 4), NotePin::new(1, 24, 0)],
    )];
    let mut history = History::default();
    let mut clipboard = Clipboard::default();

    let mut engine = engine_at(Selection::boxed((0, 0), (0, 1)));
    engine.copy(&song, &mut clipboard).unwrap();
    engine.selection = Selection::boxed((0, 0), (2, 3));
    assert!(engine.paste(&mut song, &mut history, &clipboard).unwrap());

    assert_eq!(notes_at(&song, 0, 2), notes_at(&song, 0, 0));
    assert_eq!(notes_at(&song, 0, 3), notes_at(&song, 0, 1));
    // Identical content reuses the copied pattern numbers
    assert_eq!(song.channels[0].bars, vec![1, 2, 1, 2]);
    assert_eq!(song.patterns_per_channel, 4);
}

#[test]
fn test_sub_range_copy_round_trips_onto_other_channel() {
    let mut song = Song::new(2, 0, 0, 2, 2);
    song.channels[0].bars[0] = 1;
    song.channels[0].patterns[0].notes = vec![Note::new(40, 0, 6, 6), Note::new(41, 12, 24, 6), Note::new(43, 24, 36, 2)];
    let mut history = History::default();
    let mut clipboard = Clipboard::default();

    let mut engine = engine_at(Selection::single(0, 0).with_sub_bar(12, 36));
    engine.copy(&song, &mut clipboard).unwrap();
    let payload = clipboard.load().unwrap();
    assert_eq!(payload.part_duration, 24);
    assert_eq!(spans(&payload.channels[0].patterns[&1].notes), vec![(0, 12), (12, 24)]);

    engine.selection = Selection::single(1, 0).with_sub_bar(12, 36);
    assert!(engine.paste(&mut song, &mut history, &clipboard).unwrap());
    assert_eq!(notes_at(&song, 1, 0), notes_at(&song, 0, 0)[1..].to_vec());
}

#[test]
fn test_paste_without_valid_clipboard_is_noop() {
    let mut song = Song::new(1, 0, 0, 2, 1);
    let mut history = History::default();
    let mut engine = engine_at(Selection::single(0, 0));

    assert!(!engine.paste(&mut song, &mut history, &Clipboard::default()).unwrap());

    let mut store = MemoryClipboard::new();
    store.write(Config::CLIPBOARD_KEY, "{\"partDuration\": 0}".to_string());
    let broken = Clipboard::new(Box::new(store));
    assert!(!engine.paste(&mut song, &mut history, &broken).unwrap());
    assert!(!engine.paste_numbers(&mut song, &mut history, &broken).unwrap());
    assert!(!history.can_undo());
}

#[test]
fn test_range_paste_detaches_shared_pattern_once() {
    let mut song = Song::new(1, 0, 0, 4, 4);
    song.channels[0].bars = vec![1, 1, 1, 2];
    song.channels[0].patterns[0].notes = vec![Note::new(24, 0, 48, 6)];
    song.channels[0].patterns[1].notes = vec![Note::new(30, 0, 24, 6)];
    let mut history = History::default();
    let mut clipboard = Clipboard::default();

    let mut engine = engine_at(Selection::single(0, 3).with_sub_bar(0, 24));
    engine.copy(&song, &mut clipboard).unwrap();
    engine.selection = Selection::boxed((0, 0), (0, 1)).with_sub_bar(0, 24);
    assert!(engine.paste(&mut song, &mut history, &clipboard).unwrap());

    let bars = song.channels[0].bars.clone();
    assert_eq!(bars[0], bars[1]);
    assert_eq!(bars[2], 1);
    assert_ne!(bars[0], 1);
    let pasted = notes_at(&song, 0, 0);
    assert_eq!(spans(&pasted), vec![(0, 24), (24, 48)]);
    assert_eq!(pasted[0].pitches, vec![30]);
    assert_eq!(notes_at(&song, 0, 2), vec![Note::new(24, 0, 48, 6)]);
}

#[test]
fn test_whole_bar_paste_tiles_short_copy() {
    let mut song = Song::new(1, 0, 0, 3, 3);
    song.channels[0].bars[0] = 1;
    song.channels[0].patterns[0].notes = vec![Note::new(24, 0, 24, 6)];
    let mut history = History::default();
    let mut clipboard = Clipboard::default();

    let mut engine = engine_at(Selection::single(0, 0).with_sub_bar(0, 48));
    engine.copy(&song, &mut clipboard).unwrap();
    engine.selection = Selection::boxed((0, 0), (1, 2));
    assert!(engine.paste(&mut song, &mut history, &clipboard).unwrap());

    assert_eq!(song.channels[0].bars[1], song.channels[0].bars[2]);
    assert_eq!(
        spans(&notes_at(&song, 0, 1)),
        vec![(0, 24), (48, 72), (96, 120), (144, 168)]
    );
}

#[test]
fn test_mod_clipboard_skips_pitch_channel() {
    let mut song = Song::new(1, 0, 1, 2, 1);
    song.channels[1].bars[0] = 1;
    song.channels[1].patterns[0].notes = vec![Note::new(2, 0, 24, 6)];
    let mut history = History::default();
    let mut clipboard = Clipboard::default();

    let mut engine = engine_at(Selection::single(1, 0));
    engine.copy(&song, &mut clipboard).unwrap();
    engine.selection = Selection::single(0, 0);
    assert!(!engine.paste(&mut song, &mut history, &clipboard).unwrap());
    assert_eq!(song.channels[0].bars[0], 0);
}

#[test]
fn test_paste_numbers_grows_pattern_count() {
    let mut song = Song::new(1, 1, 0, 2, 4);
    let mut history = History::default();
    let mut patterns = BTreeMap::new();
    patterns.insert(6, PatternCopy { instruments: vec![0], notes: vec![] });
    let payload = ClipboardPayload {
        part_duration: song.parts_per_bar(),
        channels: vec![ChannelCopy {
            patterns,
            bars: vec![6, 0],
            ..Default::default()
        }],
    };

    let mut engine = engine_at(Selection::single(0, 0));
    assert!(engine.paste_numbers_from(&mut song, &mut history, &payload).unwrap());
    assert_eq!(song.patterns_per_channel, 6);
    assert!(song.channels.iter().all(|channel| channel.patterns.len() == 6));
    assert_eq!(song.channels[0].bars, vec![6, 0]);

    history.undo(&mut song).unwrap();
    assert_eq!(song.patterns_per_channel, 4);
    assert_eq!(song.channels[0].bars, vec![0, 0]);
}

#[test]
fn test_undo_paste_restores_song() {
    let mut song = Song::new(1, 0, 0, 4, 2);
    song.channels[0].bars[0] = 1;
    song.channels[0].patterns[0].notes = vec![Note::new(24, 0, 12, 6)];
    let before = song.clone();
    let mut history = History::default();
    let mut clipboard = Clipboard::default();

    let mut engine = engine_at(Selection::single(0, 0));
    engine.copy(&song, &mut clipboard).unwrap();
    engine.selection = Selection::boxed((0, 0), (1, 3));
    engine.paste(&mut song, &mut history, &clipboard).unwrap();
    assert_eq!(song.channels[0].bars, vec![1, 1, 1, 1]);

    history.undo(&mut song).unwrap();
    assert_eq!(song, before);
}

#[test]
fn test_paste_into_range_past_bar_end_is_rejected() {
    let mut song = Song::new(1, 0, 0, 2, 1);
    song.channels[0].bars = vec![1, 1];
    song.channels[0].patterns[0].notes = vec![Note::new(24, 0, 8, 6)];
    let original = song.clone();
    let mut history = History::default();
    let mut clipboard = Clipboard::default();

    let mut engine = engine_at(Selection::single(0, 0));
    assert!(engine.copy(&song, &mut clipboard).unwrap());

    engine.selection = Selection::single(0, 1).with_sub_bar(5000, 6000);
    let result = engine.paste(&mut song, &mut history, &clipboard);
    assert!(matches!(result, Err(EditorError::InvalidSelection(_))));
    assert_eq!(song, original);
    assert_eq!(song.channels[0].patterns.len(), original.channels[0].patterns.len());
    assert!(!history.can_undo());
}
