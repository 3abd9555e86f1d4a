// Key Mapping - Pitch to virtual piano keyboard keys
// Fixed layouts for the 61-key and 88-key in-game pianos

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Keys for A0..=C#2 on the 88-key layout (held with Ctrl)
pub const LOW_CTRL_KEYS: &str = "1234567890qwert";
/// One key per white note from C2 upward; the black note above uses Shift
pub const WHITE_KEYS: &str = "1234567890qwertyuiopasdfghjklzxcvbnm";
/// Keys for C#7..=C8 on the 88-key layout (held with Ctrl)
pub const HIGH_CTRL_KEYS: &str = "yuiopasdfghj";

const LOW_CTRL_START: u8 = 21; // A0
const WHITE_START: u8 = 36; // C2
const HIGH_CTRL_START: u8 = 97;
const TOP_PITCH: u8 = 108; // C8

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Modifier held while a key is struck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyModifier {
    Shift,
    Ctrl,
}

/// Keyboard key (plus optional modifier) that plays one pitch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBinding {
    pub key: char,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifier: Option<KeyModifier>,
}

impl KeyBinding {
    fn new(key: char, modifier: Option<KeyModifier>) -> Self {
        KeyBinding { key, modifier }
    }
}

/// Lookup table from MIDI pitch to [`KeyBinding`].
///
/// Pitches outside the playable range are folded by octaves until they fit,
/// so every pitch maps to some key.
#[derive(Debug, Clone)]
pub struct KeyMapper {
    use_88_key_layout: bool,
    bindings: HashMap<u8, KeyBinding>,
}

impl KeyMapper {
    pub fn new(use_88_key_layout: bool) -> Self {
        let mut bindings = HashMap::new();

        if use_88_key_layout {
            for (pitch, key) in (LOW_CTRL_START..).zip(LOW_CTRL_KEYS.chars()) {
                bindings.insert(pitch, KeyBinding::new(key, Some(KeyModifier::Ctrl)));
            }
            for (pitch, key) in (HIGH_CTRL_START..).zip(HIGH_CTRL_KEYS.chars()) {
                bindings.insert(pitch, KeyBinding::new(key, Some(KeyModifier::Ctrl)));
            }
        }

        // Walk white notes; a black neighbour above shares the white note's key
        let mut pitch = WHITE_START;
        for key in WHITE_KEYS.chars() {
            if pitch > TOP_PITCH {
                break;
            }
            bindings.entry(pitch).or_insert(KeyBinding::new(key, None));

            let next = pitch + 1;
            if is_black_key(next) {
                bindings
                    .entry(next)
                    .or_insert(KeyBinding::new(key, Some(KeyModifier::Shift)));
                pitch += 2;
            } else {
                pitch += 1;
            }
        }

        KeyMapper {
            use_88_key_layout,
            bindings,
        }
    }

    pub fn is_88_key(&self) -> bool {
        self.use_88_key_layout
    }

    /// Lowest playable pitch (A0 or C2)
    pub fn min_pitch(&self) -> u8 {
        if self.use_88_key_layout {
            LOW_CTRL_START
        } else {
            WHITE_START
        }
    }

    /// Highest playable pitch (C8 or C7)
    pub fn max_pitch(&self) -> u8 {
        if self.use_88_key_layout {
            TOP_PITCH
        } else {
            96
        }
    }

    /// Move `pitch` by whole octaves into the playable range
    pub fn fold_into_range(&self, pitch: u8) -> u8 {
        let mut pitch = pitch;
        while pitch < self.min_pitch() {
            pitch += 12;
        }
        while pitch > self.max_pitch() {
            pitch -= 12;
        }
        pitch
    }

    pub fn binding_for(&self, pitch: u8) -> Option<KeyBinding> {
        self.bindings.get(&self.fold_into_range(pitch)).copied()
    }

    pub fn key_for_pitch(&self, pitch: u8) -> Option<char> {
        self.binding_for(pitch).map(|b| b.key)
    }
}

pub fn is_black_key(pitch: u8) -> bool {
    matches!(pitch % 12, 1 | 3 | 6 | 8 | 10)
}

/// Scientific pitch name, e.g. 60 -> "C4"
pub fn pitch_to_name(pitch: u8) -> String {
    let octave = (pitch / 12) as i32 - 1;
    format!("{}{}", NOTE_NAMES[(pitch % 12) as usize], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(key: char) -> Option<KeyBinding> {
        Some(KeyBinding::new(key, None))
    }

    fn shifted(key: char) -> Option<KeyBinding> {
        Some(KeyBinding::new(key, Some(KeyModifier::Shift)))
    }

    fn ctrl(key: char) -> Option<KeyBinding> {
        Some(KeyBinding::new(key, Some(KeyModifier::Ctrl)))
    }

    #[test]
    fn test_61_key_layout() {
        let mapper = KeyMapper::new(false);

        assert_eq!(mapper.binding_for(36), plain('1'));
        assert_eq!(mapper.binding_for(37), shifted('1'));
        // E has no black key above it
        assert_eq!(mapper.binding_for(40), plain('3'));
        assert_eq!(mapper.binding_for(41), plain('4'));
        assert_eq!(mapper.binding_for(42), shifted('4'));
        assert_eq!(mapper.binding_for(60), plain('t'));
        assert_eq!(mapper.binding_for(61), shifted('t'));
        assert_eq!(mapper.binding_for(72), plain('s'));
        assert_eq!(mapper.binding_for(96), plain('m'));
    }

    #[test]
    fn test_61_key_folds_octaves() {
        let mapper = KeyMapper::new(false);

        assert_eq!(mapper.fold_into_range(30), 42);
        assert_eq!(mapper.binding_for(30), shifted('4'));
        assert_eq!(mapper.fold_into_range(100), 88);
        assert_eq!(mapper.key_for_pitch(100), Some('x'));
        assert_eq!(mapper.key_for_pitch(0), Some('1'));
        assert_eq!(mapper.key_for_pitch(127), Some('v'));
    }

    #[test]
    fn test_88_key_layout_uses_ctrl_at_the_edges() {
        let mapper = KeyMapper::new(true);

        assert!(mapper.is_88_key());
        assert_eq!((mapper.min_pitch(), mapper.max_pitch()), (21, 108));
        assert_eq!(mapper.binding_for(21), ctrl('1'));
        assert_eq!(mapper.binding_for(35), ctrl('t'));
        assert_eq!(mapper.binding_for(97), ctrl('y'));
        assert_eq!(mapper.binding_for(108), ctrl('j'));
        assert_eq!(mapper.binding_for(30), ctrl('0'));
        // Middle of the keyboard is the same as the 61-key layout
        assert_eq!(mapper.binding_for(60), plain('t'));
        assert_eq!(mapper.binding_for(96), plain('m'));
        assert_eq!(mapper.binding_for(127), ctrl('s'));
    }

    #[test]
    fn test_every_pitch_has_a_key() {
        for layout in [false, true] {
            let mapper = KeyMapper::new(layout);
            assert!((0..=127u8).all(|p| mapper.binding_for(p).is_some()));
        }
    }

    #[test]
    fn test_pitch_names() {
        assert_eq!(pitch_to_name(60), "C4");
        assert_eq!(pitch_to_name(21), "A0");
        assert_eq!(pitch_to_name(61), "C#4");
        assert_eq!(pitch_to_name(0), "C-1");
        assert_eq!(pitch_to_name(108), "C8");

        assert!(is_black_key(61));
        assert!(!is_black_key(64));
        assert!(is_black_key(70));
    }
}
