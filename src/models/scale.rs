//! Scales, rhythms and scale-aware pitch arithmetic
//!
//! Pitches are stored relative to the song key, so a pitch is in scale when
//! `flags[pitch mod 12]` is set.

use crate::config::Config;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scale {
    pub name: &'static str,
    pub flags: [bool; 12],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rhythm {
    pub name: &'static str,
    pub steps_per_beat: i32,
}

impl Rhythm {
    /// Grid size in parts
    pub fn step_parts(&self) -> i32 {
        (Config::PARTS_PER_BEAT / self.steps_per_beat).max(1)
    }
}

const fn flags(bits: [u8; 12]) -> [bool; 12] {
    let mut out = [false; 12];
    let mut i = 0;
    while i < 12 {
        out[i] = bits[i] != 0;
        i += 1;
    }
    out
}

pub const SCALES: [Scale; 20] = [
    Scale { name: "Free", flags: flags([1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1]) },
    Scale { name: "Major", flags: flags([1, 0, 1, 0, 1, 1, 0, 1, 0, 1, 0, 1]) },
    Scale { name: "Minor", flags: flags([1, 0, 1, 1, 0, 1, 0, 1, 1, 0, 1, 0]) },
    Scale { name: "Mixolydian", flags: flags([1, 0, 1, 0, 1, 1, 0, 1, 0, 1, 1, 0]) },
    Scale { name: "Lydian", flags: flags([1, 0, 1, 0, 1, 0, 1, 1, 0, 1, 0, 1]) },
    Scale { name: "Dorian", flags: flags([1, 0, 1, 1, 0, 1, 0, 1, 0, 1, 1, 0]) },
    Scale { name: "Phrygian", flags: flags([1, 1, 0, 1, 0, 1, 0, 1, 1, 0, 1, 0]) },
    Scale { name: "Locrian", flags: flags([1, 1, 0, 1, 0, 1, 1, 0, 1, 0, 1, 0]) },
    Scale { name: "Lydian Dominant", flags: flags([1, 0, 1, 0, 1, 0, 1, 1, 0, 1, 1, 0]) },
    Scale { name: "Phrygian Dominant", flags: flags([1, 1, 0, 0, 1, 1, 0, 1, 1, 0, 1, 0]) },
    Scale { name: "Harmonic Major", flags: flags([1, 0, 1, 0, 1, 1, 0, 1, 1, 0, 0, 1]) },
    Scale { name: "Harmonic Minor", flags: flags([1, 0, 1, 1, 0, 1, 0, 1, 1, 0, 0, 1]) },
    Scale { name: "Melodic Minor", flags: flags([1, 0, 1, 1, 0, 1, 0, 1, 0, 1, 0, 1]) },
    Scale { name: "Blues", flags: flags([1, 0, 0, 1, 0, 1, 1, 1, 0, 0, 1, 0]) },
    Scale { name: "Altered", flags: flags([1, 1, 0, 1, 1, 0, 1, 0, 1, 0, 1, 0]) },
    Scale { name: "Major Pentatonic", flags: flags([1, 0, 1, 0, 1, 0, 0, 1, 0, 1, 0, 0]) },
    Scale { name: "Minor Pentatonic", flags: flags([1, 0, 0, 1, 0, 1, 0, 1, 0, 0, 1, 0]) },
    Scale { name: "Whole Tone", flags: flags([1, 0, 1, 0, 1, 0, 1, 0, 1, 0, 1, 0]) },
    Scale { name: "Octatonic", flags: flags([1, 0, 1, 1, 0, 1, 1, 0, 1, 1, 0, 1]) },
    Scale { name: "Hexatonic", flags: flags([1, 0, 0, 1, 1, 0, 0, 1, 1, 0, 0, 1]) },
];

pub const RHYTHMS: [Rhythm; 5] = [
    Rhythm { name: "÷3 (triplets)", steps_per_beat: 3 },
    Rhythm { name: "÷4 (standard)", steps_per_beat: 4 },
    Rhythm { name: "÷6", steps_per_beat: 6 },
    Rhythm { name: "÷8", steps_per_beat: 8 },
    Rhythm { name: "freehand", steps_per_beat: 24 },
];

/// Functional role of each semitone above the root (12 wraps to the root)
const ROLES: [u8; 13] = [0, 1, 1, 2, 2, 3, 4, 5, 6, 6, 7, 7, 0];

fn degree(pitch: i32) -> usize {
    pitch.rem_euclid(Config::PITCHES_PER_OCTAVE) as usize
}

pub fn in_scale(flags: &[bool; 12], pitch: i32) -> bool {
    flags[degree(pitch)]
}

/// Nearest in-scale pitch within `[min, max]`; ties resolve downward
pub fn nearest_in_scale(flags: &[bool; 12], pitch: i32, min: i32, max: i32) -> i32 {
    for distance in 0..=Config::PITCHES_PER_OCTAVE {
        for candidate in [pitch - distance, pitch + distance] {
            if candidate >= min && candidate <= max && in_scale(flags, candidate) {
                return candidate;
            }
        }
    }
    pitch.clamp(min, max)
}

/// Move a pitch one step (or one octave) up or down
///
/// With a scale, single steps skip to the next in-scale pitch in the same
/// direction. Returns `None` when the result would leave `[min, max]`.
pub fn step_pitch(
    pitch: i32,
    upward: bool,
    octave: bool,
    scale: Option<&[bool; 12]>,
    min: i32,
    max: i32,
) -> Option<i32> {
    let direction = if upward { 1 } else { -1 };
    if octave {
        let moved = pitch + direction * Config::PITCHES_PER_OCTAVE;
        return (moved >= min && moved <= max).then_some(moved);
    }
    let mut moved = pitch + direction;
    while moved >= min && moved <= max {
        match scale {
            Some(flags) if !in_scale(flags, moved) => moved += direction,
            _ => return Some(moved),
        }
    }
    None
}

/// Mark every scale degree sounded by the given notes
pub fn union_of_used_degrees<'a>(notes: impl IntoIterator<Item = &'a crate::models::note::Note>, used: &mut [bool; 12]) {
    for note in notes {
        for pitch in &note.pitches {
            for pin in &note.pins {
                used[degree(pitch + pin.interval)] = true;
            }
        }
    }
}

/// Build a 12-entry degree remapping from the degrees in `old_flags` to the
/// scale `new_flags`
///
/// The smaller of the two degree sets is matched into the larger one with an
/// order-preserving assignment (root fixed to root) minimizing the distance
/// moved plus a penalty for changing functional role. Degrees between the
/// matched anchors are interpolated and rounded to the nearest target degree.
pub fn generate_scale_map(old_flags: &[bool; 12], new_flags: &[bool; 12]) -> [i32; 12] {
    let old_scale: Vec<i32> = (0..12).filter(|&i| old_flags[i as usize]).collect();
    let mut new_scale: Vec<i32> = (0..12).filter(|&i| new_flags[i as usize]).collect();
    if old_scale.is_empty() || new_scale.is_empty() {
        return std::array::from_fn(|i| i as i32);
    }

    let larger_to_smaller = old_scale.len() > new_scale.len();
    let (smaller, larger) = if larger_to_smaller {
        (&new_scale, &old_scale)
    } else {
        (&old_scale, &new_scale)
    };

    let mut best_score = f64::MAX;
    let mut best_map: Vec<usize> = Vec::new();
    let mut stack: Vec<Vec<usize>> = vec![vec![0]];
    while let Some(index_map) = stack.pop() {
        if index_map.len() == smaller.len() {
            let mut score = 0.0;
            for (i, &mapped) in index_map.iter().enumerate() {
                score += (smaller[i] - larger[mapped]).abs() as f64;
                if ROLES[smaller[i] as usize] != ROLES[larger[mapped] as usize] {
                    score += 0.75;
                }
            }
            if score < best_score {
                best_score = score;
                best_map = index_map;
            }
        } else {
            let low = index_map[index_map.len() - 1] + 1;
            let high = larger.len() - smaller.len() + index_map.len();
            for next in low..=high {
                let mut extended = index_map.clone();
                extended.push(next);
                stack.push(extended);
            }
        }
    }

    let mut anchors: Vec<(i32, i32)> = best_map
        .iter()
        .enumerate()
        .map(|(i, &mapped)| {
            if larger_to_smaller {
                (larger[mapped], smaller[i])
            } else {
                (smaller[i], larger[mapped])
            }
        })
        .collect();
    anchors.push((12, 12));
    new_scale.push(12);

    let mut anchor = 0;
    let mut map = [0i32; 12];
    for (i, slot) in map.iter_mut().enumerate() {
        let i = i as i32;
        let (old_low, new_low) = anchors[anchor];
        let (old_high, new_high) = anchors[anchor + 1];
        if i == old_high - 1 {
            anchor += 1;
        }
        let transformed = (i - old_low) as f64 * (new_high - new_low) as f64 / (old_high - old_low) as f64
            + new_low as f64;

        let mut nearest = 0;
        let mut nearest_distance = f64::MAX;
        for &candidate in &new_scale {
            let mut distance = (candidate as f64 - transformed).abs();
            if ROLES[candidate as usize] != ROLES[i as usize] {
                distance += 0.1;
            }
            if distance < nearest_distance {
                nearest_distance = distance;
                nearest = candidate;
            }
        }
        *slot = nearest;
    }
    map
}

/// Apply a degree map to an absolute pitch, keeping its octave
pub fn remap_pitch(map: &[i32; 12], pitch: i32) -> i32 {
    let octave_base = pitch - pitch.rem_euclid(Config::PITCHES_PER_OCTAVE);
    octave_base + map[degree(pitch)]
}
