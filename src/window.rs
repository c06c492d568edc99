//! Window records and window-scoped operations.
//!
//! A window owns its graphics context and its event-slot table. All
//! operations go through the owning [`Display`]; the handle handed to the
//! caller is just the X window id.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ChangeGCAux, ChangeWindowAttributesAux, ConnectionExt, CoordMode, CreateGCAux,
    CreateWindowAux, Cursor, EventMask, Font, Gcontext, Point, PropMode, Window, WindowClass,
};
use x11rb::wrapper::ConnectionExt as _;

use crate::display::Display;
use crate::error::{Error, Result};
use crate::events::{EventKind, EventSlots, Hook};

/// Handle to an open window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowId(pub(crate) Window);

impl WindowId {
    /// The underlying X window id.
    pub fn raw(self) -> u32 {
        self.0
    }
}

pub(crate) struct WindowState {
    pub id: Window,
    pub gc: Gcontext,
    pub font: Option<Font>,
    pub slots: EventSlots<Display>,
}

/// ImageText8 carries at most this many bytes.
const MAX_TEXT: usize = 254;

impl Display {
    /// Create and map a window on the selected visual.
    pub fn new_window(&mut self, width: u16, height: u16, title: &str) -> Result<WindowId> {
        let id = self.conn.generate_id()?;
        let aux = CreateWindowAux::new()
            .background_pixel(0)
            .border_pixel(0)
            .colormap(self.colormap)
            .event_mask(EventMask::EXPOSURE | EventMask::STRUCTURE_NOTIFY);
        self.conn.create_window(
            self.depth,
            id,
            self.root,
            0,
            0,
            width,
            height,
            0,
            WindowClass::INPUT_OUTPUT,
            self.visual_id,
            &aux,
        )?;

        let gc = self.conn.generate_id()?;
        self.conn
            .create_gc(gc, id, &CreateGCAux::new().graphics_exposures(0u32))?;

        self.conn.change_property8(
            PropMode::REPLACE,
            id,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            title.as_bytes(),
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            id,
            self.wm_protocols,
            AtomEnum::ATOM,
            &[self.wm_delete_window],
        )?;

        self.conn.map_window(id)?;
        self.conn.flush()?;

        self.windows.push(WindowState {
            id,
            gc,
            font: None,
            slots: EventSlots::new(),
        });
        log::debug!("window {id:#x} created, {width}x{height}");
        Ok(WindowId(id))
    }

    /// Destroy a window and free its slot table. Events still in flight
    /// for the old id are dropped by the loop.
    pub fn destroy_window(&mut self, win: WindowId) -> Result<()> {
        let idx = self
            .window_index(win.0)
            .ok_or(Error::UnknownWindow(win.0))?;
        let state = self.windows.remove(idx);
        if let Some(font) = state.font {
            self.conn.close_font(font)?;
        }
        self.conn.free_gc(state.gc)?;
        self.conn.destroy_window(state.id)?;
        self.conn.flush()?;
        Ok(())
    }

    pub fn clear_window(&self, win: WindowId) -> Result<()> {
        let state = self.window(win)?;
        self.conn.clear_area(false, state.id, 0, 0, 0, 0)?;
        self.conn.flush()?;
        Ok(())
    }

    pub fn set_title(&self, win: WindowId, title: &str) -> Result<()> {
        let state = self.window(win)?;
        self.conn.change_property8(
            PropMode::REPLACE,
            state.id,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            title.as_bytes(),
        )?;
        self.conn.flush()?;
        Ok(())
    }

    /// Draw a single pixel. For anything more than a few pixels an
    /// [`crate::Image`] blit is the faster path.
    pub fn pixel_put(&self, win: WindowId, x: i16, y: i16, rgb: u32) -> Result<()> {
        let pixel = self.format.pixel(rgb);
        let state = self.window(win)?;
        self.conn
            .change_gc(state.gc, &ChangeGCAux::new().foreground(pixel))?;
        self.conn
            .poly_point(CoordMode::ORIGIN, state.id, state.gc, &[Point { x, y }])?;
        self.conn.flush()?;
        Ok(())
    }

    /// Draw text with the window's current core font.
    pub fn string_put(&self, win: WindowId, x: i16, y: i16, rgb: u32, text: &str) -> Result<()> {
        let pixel = self.format.pixel(rgb);
        let state = self.window(win)?;
        self.conn
            .change_gc(state.gc, &ChangeGCAux::new().foreground(pixel))?;
        let bytes = text.as_bytes();
        let bytes = &bytes[..bytes.len().min(MAX_TEXT)];
        self.conn.image_text8(state.id, state.gc, x, y, bytes)?;
        self.conn.flush()?;
        Ok(())
    }

    /// Load a core font by name (e.g. `"fixed"`) for subsequent
    /// [`Display::string_put`] calls on this window.
    pub fn set_font(&mut self, win: WindowId, name: &str) -> Result<()> {
        let idx = self
            .window_index(win.0)
            .ok_or(Error::UnknownWindow(win.0))?;
        let font = self.conn.generate_id()?;
        self.conn.open_font(font, name.as_bytes())?;
        let state = &mut self.windows[idx];
        let old = state.font.replace(font);
        let gc = state.gc;
        if let Some(old) = old {
            self.conn.close_font(old)?;
        }
        self.conn.change_gc(gc, &ChangeGCAux::new().font(font))?;
        self.conn.flush()?;
        Ok(())
    }

    /// Store (hook, mask) into the window's slot for this event kind,
    /// replacing any previous registration, and re-select the window's
    /// input mask from the union of all registered slots.
    pub fn hook(
        &mut self,
        win: WindowId,
        kind: EventKind,
        mask: EventMask,
        hook: Hook<Display>,
    ) -> Result<()> {
        let idx = self
            .window_index(win.0)
            .ok_or(Error::UnknownWindow(win.0))?;
        self.windows[idx].slots.set(kind, mask, hook);
        self.select_input(idx)
    }

    /// Like [`Display::hook`] but with a raw protocol code; codes without
    /// a slot are a reported error, never an out-of-bounds write.
    pub fn hook_code(
        &mut self,
        win: WindowId,
        code: i32,
        mask: EventMask,
        hook: Hook<Display>,
    ) -> Result<()> {
        let kind = EventKind::from_code(code).ok_or(Error::InvalidEventCode(code))?;
        self.hook(win, kind, mask, hook)
    }

    /// Drop the registration for this event kind, if any.
    pub fn unhook(&mut self, win: WindowId, kind: EventKind) -> Result<()> {
        let idx = self
            .window_index(win.0)
            .ok_or(Error::UnknownWindow(win.0))?;
        self.windows[idx].slots.clear(kind);
        self.select_input(idx)
    }

    /// KeyPress shorthand; the callback receives the unshifted keysym.
    pub fn key_hook(
        &mut self,
        win: WindowId,
        f: impl FnMut(&mut Display, i32) + 'static,
    ) -> Result<()> {
        self.hook(
            win,
            EventKind::KeyPress,
            EventMask::KEY_PRESS,
            Hook::with_code(f),
        )
    }

    /// ButtonPress shorthand; the callback receives the button number.
    pub fn mouse_hook(
        &mut self,
        win: WindowId,
        f: impl FnMut(&mut Display, i32) + 'static,
    ) -> Result<()> {
        self.hook(
            win,
            EventKind::ButtonPress,
            EventMask::BUTTON_PRESS,
            Hook::with_code(f),
        )
    }

    /// Expose shorthand, fired on the last expose of a series.
    pub fn expose_hook(
        &mut self,
        win: WindowId,
        f: impl FnMut(&mut Display) + 'static,
    ) -> Result<()> {
        self.hook(
            win,
            EventKind::Expose,
            EventMask::EXPOSURE,
            Hook::simple(f),
        )
    }

    /// Warp the pointer to window coordinates (x, y).
    pub fn mouse_move(&self, win: WindowId, x: i16, y: i16) -> Result<()> {
        let state = self.window(win)?;
        self.conn
            .warp_pointer(x11rb::NONE, state.id, 0, 0, 0, 0, x, y)?;
        self.conn.flush()?;
        Ok(())
    }

    /// Pointer position in window coordinates.
    pub fn mouse_pos(&self, win: WindowId) -> Result<(i16, i16)> {
        let state = self.window(win)?;
        let reply = self.conn.query_pointer(state.id)?.reply()?;
        Ok((reply.win_x, reply.win_y))
    }

    pub fn mouse_hide(&mut self, win: WindowId) -> Result<()> {
        let id = self.window(win)?.id;
        let cursor = self.ensure_blank_cursor()?;
        self.conn
            .change_window_attributes(id, &ChangeWindowAttributesAux::new().cursor(cursor))?;
        self.conn.flush()?;
        Ok(())
    }

    pub fn mouse_show(&self, win: WindowId) -> Result<()> {
        let state = self.window(win)?;
        self.conn.change_window_attributes(
            state.id,
            &ChangeWindowAttributesAux::new().cursor(x11rb::NONE),
        )?;
        self.conn.flush()?;
        Ok(())
    }

    fn ensure_blank_cursor(&mut self) -> Result<Cursor> {
        if let Some(cursor) = self.blank_cursor {
            return Ok(cursor);
        }
        let pixmap = self.conn.generate_id()?;
        self.conn.create_pixmap(1, pixmap, self.root, 1, 1)?;
        let cursor = self.conn.generate_id()?;
        self.conn
            .create_cursor(cursor, pixmap, pixmap, 0, 0, 0, 0, 0, 0, 0, 0)?;
        self.conn.free_pixmap(pixmap)?;
        self.blank_cursor = Some(cursor);
        Ok(cursor)
    }

    fn select_input(&self, idx: usize) -> Result<()> {
        let state = &self.windows[idx];
        let mask =
            state.slots.mask_union() | EventMask::EXPOSURE | EventMask::STRUCTURE_NOTIFY;
        self.conn
            .change_window_attributes(state.id, &ChangeWindowAttributesAux::new().event_mask(mask))?;
        self.conn.flush()?;
        Ok(())
    }

    pub(crate) fn window_index(&self, id: Window) -> Option<usize> {
        self.windows.iter().position(|w| w.id == id)
    }

    pub(crate) fn window(&self, win: WindowId) -> Result<&WindowState> {
        self.windows
            .iter()
            .find(|w| w.id == win.0)
            .ok_or(Error::UnknownWindow(win.0))
    }
}
