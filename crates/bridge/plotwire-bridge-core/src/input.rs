//! Host input events translated into coordinate- and modifier-normalized
//! native calls.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub pointer_id: i32,
    pub position: Point,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct KeyModifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

/// Keys the module understands. Named control keys are remapped beyond the
/// printable range; printable keys pass their code through unchanged.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Key {
    PageUp,
    PageDown,
    Home,
    End,
    Left,
    Right,
    Up,
    Down,
    Escape,
    Tab,
    Enter,
    Delete,
    Printable(char),
}

/// Fixed remap table; a control key's native code is 256 plus its index
/// here. The order is part of the wire contract.
const CONTROL_KEYS: [Key; 12] = [
    Key::PageUp,
    Key::PageDown,
    Key::Home,
    Key::End,
    Key::Left,
    Key::Right,
    Key::Up,
    Key::Down,
    Key::Escape,
    Key::Tab,
    Key::Enter,
    Key::Delete,
];

const CONTROL_KEY_BASE: i32 = 256;

impl Key {
    /// Native key code, or `None` for keys the module has no code for
    /// (those are simply not forwarded).
    pub fn native_code(self) -> Option<i32> {
        if let Key::Printable(c) = self {
            let code = c as u32;
            return if code <= 255 { Some(code as i32) } else { None };
        }
        CONTROL_KEYS
            .iter()
            .position(|k| *k == self)
            .map(|index| CONTROL_KEY_BASE + index as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_keys_map_beyond_printable_range() {
        assert_eq!(Key::PageUp.native_code(), Some(256));
        assert_eq!(Key::Home.native_code(), Some(258));
        assert_eq!(Key::Escape.native_code(), Some(264));
        assert_eq!(Key::Delete.native_code(), Some(267));
    }

    #[test]
    fn printable_keys_pass_through() {
        assert_eq!(Key::Printable('a').native_code(), Some(97));
        assert_eq!(Key::Printable('\u{0141}').native_code(), None);
    }
}
