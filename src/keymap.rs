//! Keycode to keysym translation.
//!
//! Key hooks receive keysyms, not raw keycodes, so the mapping table is
//! fetched once at connect time and refreshed on MappingNotify.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt, Keycode, Keysym};

use crate::error::Result;

pub struct Keymap {
    min_keycode: Keycode,
    keysyms_per_keycode: u8,
    keysyms: Vec<Keysym>,
}

impl Keymap {
    pub fn load(conn: &impl Connection) -> Result<Self> {
        let setup = conn.setup();
        let min_keycode = setup.min_keycode;
        let count = setup.max_keycode - setup.min_keycode + 1;
        let reply = conn.get_keyboard_mapping(min_keycode, count)?.reply()?;
        Ok(Self {
            min_keycode,
            keysyms_per_keycode: reply.keysyms_per_keycode,
            keysyms: reply.keysyms,
        })
    }

    pub fn refresh(&mut self, conn: &impl Connection) -> Result<()> {
        *self = Self::load(conn)?;
        Ok(())
    }

    /// Unshifted keysym for a keycode, 0 (NoSymbol) when unmapped.
    pub fn keysym(&self, keycode: Keycode) -> Keysym {
        if keycode < self.min_keycode {
            return 0;
        }
        let index =
            (keycode - self.min_keycode) as usize * self.keysyms_per_keycode as usize;
        self.keysyms.get(index).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_keymap() -> Keymap {
        // keycodes 8..=10, two keysyms per keycode, column 0 is unshifted
        Keymap {
            min_keycode: 8,
            keysyms_per_keycode: 2,
            keysyms: vec![0x61, 0x41, 0x62, 0x42, 0x63, 0x43],
        }
    }

    #[test]
    fn test_keysym_uses_unshifted_column() {
        let map = fake_keymap();
        assert_eq!(map.keysym(8), 0x61);
        assert_eq!(map.keysym(9), 0x62);
        assert_eq!(map.keysym(10), 0x63);
    }

    #[test]
    fn test_keysym_out_of_range_is_nosymbol() {
        let map = fake_keymap();
        assert_eq!(map.keysym(7), 0);
        assert_eq!(map.keysym(11), 0);
        assert_eq!(map.keysym(255), 0);
    }
}
