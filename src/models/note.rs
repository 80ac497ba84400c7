//! Notes and their pin envelopes
//!
//! A note spans `[start, end)` in parts and carries a piecewise-linear
//! envelope of pins. Each pin gives a pitch offset (`interval`, in steps from
//! the note's base pitch) and a volume (`size`) at a time relative to the
//! note start. All interpolation is done with exact ratios and rounded half
//! away from zero.

use num_rational::Ratio;
use serde::{Deserialize, Serialize};

use crate::config::Config;

/// A control point of a note envelope
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotePin {
    /// Pitch offset from the note's base pitch
    pub interval: i32,
    /// Offset from the note start, in parts
    pub time: i32,
    /// Volume / expression
    pub size: i32,
}

impl NotePin {
    pub fn new(interval: i32, time: i32, size: i32) -> Self {
        Self { interval, time, size }
    }
}

/// A note of one or more simultaneous pitches
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub pitches: Vec<i32>,
    pub pins: Vec<NotePin>,
    pub start: i32,
    pub end: i32,
    #[serde(default)]
    pub continues_last_pattern: bool,
}

/// Round an exact ratio to the nearest integer, halves away from zero
pub fn round_ratio(value: Ratio<i64>) -> i32 {
    value.round().to_integer() as i32
}

/// Linear interpolation between `(t0, a)` and `(t1, b)` evaluated at `t`
pub fn lerp(a: i32, b: i32, t0: i32, t1: i32, t: i32) -> i32 {
    if t1 <= t0 {
        return b;
    }
    let (a, b, t0, t1, t) = (a as i64, b as i64, t0 as i64, t1 as i64, t as i64);
    round_ratio(Ratio::new(a * (t1 - t) + b * (t - t0), t1 - t0))
}

impl Note {
    /// Create a flat single-pitch note of constant volume
    pub fn new(pitch: i32, start: i32, end: i32, size: i32) -> Self {
        Self {
            pitches: vec![pitch],
            pins: vec![NotePin::new(0, 0, size), NotePin::new(0, end - start, size)],
            start,
            end,
            continues_last_pattern: false,
        }
    }

    pub fn with_pins(pitches: Vec<i32>, start: i32, end: i32, pins: Vec<NotePin>) -> Self {
        Self {
            pitches,
            pins,
            start,
            end,
            continues_last_pattern: false,
        }
    }

    pub fn length(&self) -> i32 {
        self.end - self.start
    }

    /// Base pitch (the first pitch of the chord)
    pub fn base_pitch(&self) -> i32 {
        self.pitches.first().copied().unwrap_or(0)
    }

    /// Audible pitch of the base voice at the start of the note
    pub fn start_pitch(&self) -> i32 {
        self.base_pitch() + self.pins.first().map_or(0, |pin| pin.interval)
    }

    /// Audible pitch of the base voice at the end of the note
    pub fn end_pitch(&self) -> i32 {
        self.base_pitch() + self.pins.last().map_or(0, |pin| pin.interval)
    }

    pub fn overlaps(&self, lo: i32, hi: i32) -> bool {
        self.end > lo && self.start < hi
    }

    pub fn contains_range(&self, lo: i32, hi: i32) -> bool {
        self.start >= lo && self.end <= hi
    }

    /// Envelope value at a time relative to the note start
    ///
    /// Times before the first pin or after the last hold the nearest pin.
    pub fn pin_at(&self, time: i32) -> NotePin {
        let Some(first) = self.pins.first() else {
            return NotePin::new(0, time, Config::NOTE_SIZE_MAX);
        };
        if time <= first.time {
            return NotePin::new(first.interval, time, first.size);
        }
        for pair in self.pins.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if time <= b.time {
                return NotePin::new(
                    lerp(a.interval, b.interval, a.time, b.time, time),
                    time,
                    lerp(a.size, b.size, a.time, b.time, time),
                );
            }
        }
        let last = self.pins[self.pins.len() - 1];
        NotePin::new(last.interval, time, last.size)
    }

    /// The part of this note inside `[lo, hi)` (absolute times)
    ///
    /// Boundary pins are interpolated so the envelope is unchanged inside
    /// the kept span. Returns `None` when nothing of the note remains.
    pub fn clipped(&self, lo: i32, hi: i32) -> Option<Note> {
        let new_start = self.start.max(lo);
        let new_end = self.end.min(hi);
        if new_end <= new_start {
            return None;
        }
        let local_lo = new_start - self.start;
        let local_hi = new_end - self.start;

        // An uncut end keeps the original tail pins as they are
        let cut_end = new_end < self.end;
        let mut pins = Vec::with_capacity(self.pins.len() + 2);
        pins.push(NotePin { time: 0, ..self.pin_at(local_lo) });
        for pin in &self.pins {
            let before_end = pin.time < local_hi || (!cut_end && pin.time <= local_hi);
            if pin.time > local_lo && before_end {
                pins.push(NotePin::new(pin.interval, pin.time - local_lo, pin.size));
            }
        }
        if cut_end {
            pins.push(NotePin { time: local_hi - local_lo, ..self.pin_at(local_hi) });
        }

        Some(Note {
            pitches: self.pitches.clone(),
            pins,
            start: new_start,
            end: new_end,
            continues_last_pattern: self.continues_last_pattern && local_lo == 0,
        })
    }

    /// Cut the note in two at an absolute time strictly inside it
    pub fn split_at(&self, cut: i32) -> Option<(Note, Note)> {
        if cut <= self.start || cut >= self.end {
            return None;
        }
        let left = self.clipped(self.start, cut)?;
        let right = self.clipped(cut, self.end)?;
        Some((left, right))
    }

    /// Move the note by `delta` parts
    pub fn shifted(&self, delta: i32) -> Note {
        Note {
            start: self.start + delta,
            end: self.end + delta,
            ..self.clone()
        }
    }

    /// Clean up pins after times were rewritten
    ///
    /// Pins are clamped into the note, sorted, and pins sharing a time keep
    /// the later one. Interior pins that repeat both neighbours are dropped.
    /// The envelope always starts at 0 and reaches the note length.
    pub fn normalize_pins(&mut self) {
        let length = self.length();
        for pin in self.pins.iter_mut() {
            pin.time = pin.time.clamp(0, length);
        }
        self.pins.sort_by_key(|pin| pin.time);

        let mut deduped: Vec<NotePin> = Vec::with_capacity(self.pins.len());
        for pin in self.pins.drain(..) {
            match deduped.last_mut() {
                Some(last) if last.time == pin.time => *last = pin,
                _ => deduped.push(pin),
            }
        }
        self.pins = deduped;

        if self.pins.is_empty() {
            self.pins.push(NotePin::new(0, 0, Config::NOTE_SIZE_MAX));
        }
        if self.pins[0].time != 0 {
            let first = self.pins[0];
            self.pins.insert(0, NotePin { time: 0, ..first });
        }
        let last = self.pins[self.pins.len() - 1];
        if last.time != length {
            self.pins.push(NotePin { time: length, ..last });
        }

        let mut i = 1;
        while i + 1 < self.pins.len() {
            let (prev, pin, next) = (self.pins[i - 1], self.pins[i], self.pins[i + 1]);
            if prev.interval == pin.interval
                && pin.interval == next.interval
                && prev.size == pin.size
                && pin.size == next.size
            {
                self.pins.remove(i);
            } else {
                i += 1;
            }
        }
    }

    /// Duration-weighted average of the pin intervals over the note
    pub fn average_interval(&self) -> Ratio<i64> {
        self.weighted_average(|pin| pin.interval)
    }

    /// Duration-weighted average of the pin sizes over the note
    pub fn average_size(&self) -> Ratio<i64> {
        self.weighted_average(|pin| pin.size)
    }

    fn weighted_average(&self, value: impl Fn(&NotePin) -> i32) -> Ratio<i64> {
        let length = self.length() as i64;
        let Some(last) = self.pins.last() else {
            return Ratio::from_integer(0);
        };
        if length <= 0 || self.pins.len() == 1 {
            return Ratio::from_integer(value(last) as i64);
        }
        // Twice the area under the envelope, so every trapezoid stays integral
        let mut doubled_area: i64 = 0;
        for pair in self.pins.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            doubled_area += (value(a) as i64 + value(b) as i64) * (b.time - a.time) as i64;
        }
        if (last.time as i64) < length {
            doubled_area += 2 * value(last) as i64 * (length - last.time as i64);
        }
        Ratio::new(doubled_area, 2 * length)
    }

    /// Structural validity: pitches, span and pin ordering
    pub fn is_valid(&self) -> bool {
        if self.pitches.is_empty() || self.pitches.len() > Config::MAX_CHORD_SIZE {
            return false;
        }
        for (i, pitch) in self.pitches.iter().enumerate() {
            if self.pitches[..i].contains(pitch) {
                return false;
            }
        }
        if self.end <= self.start || self.pins.is_empty() || self.pins[0].time != 0 {
            return false;
        }
        let length = self.length();
        self.pins.windows(2).all(|pair| pair[0].time < pair[1].time)
            && self.pins.iter().all(|pin| pin.time >= 0 && pin.time <= length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fading_note() -> Note {
        Note::with_pins(
            vec![60],
            0,
            8,
            vec![NotePin::new(0, 0, 100), NotePin::new(0, 8, 0)],
        )
    }

    #[test]
    fn test_lerp_rounds_half_away_from_zero() {
        assert_eq!(lerp(0, 1, 0, 2, 1), 1);
        assert_eq!(lerp(0, -1, 0, 2, 1), -1);
        assert_eq!(lerp(100, 0, 0, 8, 4), 50);
        assert_eq!(lerp(3, 9, 4, 4, 4), 9);
    }

    #[test]
    fn test_pin_at_interpolates_and_holds() {
        let note = Note::with_pins(
            vec![60],
            0,
            12,
            vec![NotePin::new(0, 0, 6), NotePin::new(4, 8, 2)],
        );
        assert_eq!(note.pin_at(4), NotePin::new(2, 4, 4));
        assert_eq!(note.pin_at(10), NotePin::new(4, 10, 2));
    }

    #[test]
    fn test_split_keeps_envelope_continuous() {
        let (left, right) = fading_note().split_at(4).unwrap();
        assert_eq!((left.start, left.end), (0, 4));
        assert_eq!((right.start, right.end), (4, 8));
        assert_eq!(left.pins.last().unwrap().size, 50);
        assert_eq!(right.pins[0].size, 50);
        assert_eq!(right.pins[0].time, 0);
        assert_eq!(left.pitches, right.pitches);
    }

    #[test]
    fn test_split_outside_note_is_rejected() {
        assert!(fading_note().split_at(0).is_none());
        assert!(fading_note().split_at(8).is_none());
    }

    #[test]
    fn test_clipped_drops_continuation_when_start_moves() {
        let mut note = fading_note();
        note.continues_last_pattern = true;
        assert!(note.clipped(-4, 4).unwrap().continues_last_pattern);
        assert!(!note.clipped(2, 6).unwrap().continues_last_pattern);
        assert!(note.clipped(8, 12).is_none());
    }

    #[test]
    fn test_clipped_without_cut_keeps_pins() {
        let note = Note::with_pins(vec![60], 0, 8, vec![NotePin::new(0, 0, 6), NotePin::new(3, 4, 2)]);
        assert_eq!(note.clipped(0, 8), Some(note.clone()));
        assert_eq!(note.clipped(-10, 100), Some(note.clone()));
        assert_eq!(note.clipped(0, 6).unwrap().pins.len(), 3);
    }

    #[test]
    fn test_normalize_pins_dedups_and_closes_envelope() {
        let mut note = Note::with_pins(
            vec![60],
            0,
            6,
            vec![
                NotePin::new(0, 0, 3),
                NotePin::new(1, 0, 4),
                NotePin::new(1, 3, 4),
                NotePin::new(1, 4, 4),
            ],
        );
        note.normalize_pins();
        assert_eq!(note.pins, vec![NotePin::new(1, 0, 4), NotePin::new(1, 6, 4)]);
        assert!(note.is_valid());
    }

    #[test]
    fn test_weighted_average_of_ramp() {
        let note = Note::with_pins(
            vec![60],
            0,
            8,
            vec![NotePin::new(0, 0, 6), NotePin::new(4, 4, 6), NotePin::new(4, 8, 0)],
        );
        // (0+4)/2 over 4 parts, then 4 over 4 parts
        assert_eq!(note.average_interval(), Ratio::new(3, 1));
        assert_eq!(note.average_size(), Ratio::new(9, 2));
    }
}
