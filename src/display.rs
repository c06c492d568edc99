//! Display connection: visual selection, colormap, images, and the
//! process-wide toggles.
//!
//! One `Display` per process is the intended use. It owns the X
//! connection, the open windows, and the connection-scoped loop hook;
//! everything is torn down when it is closed or dropped.

use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::shm::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    Atom, AutoRepeatMode, ChangeKeyboardControlAux, Colormap, ColormapAlloc, ConnectionExt,
    Cursor, ImageFormat, ImageOrder, Screen, VisualClass, Visualtype, Visualid,
};
use x11rb::rust_connection::RustConnection;

use crate::error::{Error, Result};
use crate::events::Hook;
use crate::image::{Image, ShmSegment};
use crate::keymap::Keymap;
use crate::window::{WindowId, WindowState};
use crate::xpm::{self, TRANSPARENT};

/// Channel masks of the selected visual, reduced to shift/width pairs so
/// 0xRRGGBB colors can be converted without consulting the server.
#[derive(Debug, Clone, Copy)]
pub struct PixelFormat {
    red: Channel,
    green: Channel,
    blue: Channel,
}

#[derive(Debug, Clone, Copy)]
struct Channel {
    shift: u32,
    bits: u32,
}

impl Channel {
    fn new(mask: u32) -> Self {
        if mask == 0 {
            return Self { shift: 0, bits: 0 };
        }
        Self {
            shift: mask.trailing_zeros(),
            bits: mask.count_ones(),
        }
    }

    fn scale(self, value: u32) -> u32 {
        if self.bits == 0 {
            0
        } else if self.bits >= 8 {
            (value << (self.bits - 8)) << self.shift
        } else {
            (value >> (8 - self.bits)) << self.shift
        }
    }
}

impl PixelFormat {
    fn new(red_mask: u32, green_mask: u32, blue_mask: u32) -> Self {
        Self {
            red: Channel::new(red_mask),
            green: Channel::new(green_mask),
            blue: Channel::new(blue_mask),
        }
    }

    /// Convert 0xRRGGBB to the visual's pixel value.
    pub fn pixel(&self, rgb: u32) -> u32 {
        self.red.scale((rgb >> 16) & 0xff)
            | self.green.scale((rgb >> 8) & 0xff)
            | self.blue.scale(rgb & 0xff)
    }
}

pub struct Display {
    pub(crate) conn: RustConnection,
    screen_num: usize,
    pub(crate) root: u32,
    pub(crate) depth: u8,
    pub(crate) visual_id: Visualid,
    pub(crate) format: PixelFormat,
    pub(crate) byte_order: ImageOrder,
    pub(crate) colormap: Colormap,
    private_colormap: bool,
    pub(crate) wm_protocols: Atom,
    pub(crate) wm_delete_window: Atom,
    shm_available: bool,
    use_shm: bool,
    pub(crate) keymap: Keymap,
    pub(crate) windows: Vec<WindowState>,
    pub(crate) loop_slot: Option<Hook<Display>>,
    pub(crate) end_loop: bool,
    pub(crate) blank_cursor: Option<Cursor>,
}

impl Display {
    /// Connect to the X server (`name` defaults to `$DISPLAY`), pick a
    /// TrueColor visual, and set up the colormap and keymap.
    pub fn open(name: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(name)?;

        let setup = conn.setup();
        let byte_order = setup.image_byte_order;
        let screen = &setup.roots[screen_num];
        let root = screen.root;
        let depth = screen.root_depth;
        let root_visual = screen.root_visual;
        let default_colormap = screen.default_colormap;
        let visual = *find_truecolor_visual(screen).ok_or(Error::NoTrueColorVisual)?;

        let format = PixelFormat::new(visual.red_mask, visual.green_mask, visual.blue_mask);
        let (colormap, private_colormap) = if visual.visual_id == root_visual {
            (default_colormap, false)
        } else {
            let id = conn.generate_id()?;
            conn.create_colormap(ColormapAlloc::NONE, id, root, visual.visual_id)?;
            (id, true)
        };

        let wm_protocols = conn.intern_atom(false, b"WM_PROTOCOLS")?.reply()?.atom;
        let wm_delete_window = conn.intern_atom(false, b"WM_DELETE_WINDOW")?.reply()?.atom;

        let shm_available = conn
            .extension_information(shm::X11_EXTENSION_NAME)?
            .is_some();
        if !shm_available {
            log::debug!("mit-shm extension not present, core images only");
        }

        let keymap = Keymap::load(&conn)?;

        log::debug!(
            "connected, screen {screen_num}, depth {depth}, visual {:#x}",
            visual.visual_id
        );

        Ok(Self {
            conn,
            screen_num,
            root,
            depth,
            visual_id: visual.visual_id,
            format,
            byte_order,
            colormap,
            private_colormap,
            wm_protocols,
            wm_delete_window,
            shm_available,
            use_shm: shm_available,
            keymap,
            windows: Vec::new(),
            loop_slot: None,
            end_loop: false,
            blank_cursor: None,
        })
    }

    /// Root window dimensions in pixels.
    pub fn screen_size(&self) -> (u16, u16) {
        let screen = &self.conn.setup().roots[self.screen_num];
        (screen.width_in_pixels, screen.height_in_pixels)
    }

    pub fn flush(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }

    /// Blocking round-trip: everything sent so far has been processed by
    /// the server when this returns.
    pub fn sync(&self) -> Result<()> {
        self.conn.get_input_focus()?.reply()?;
        Ok(())
    }

    pub fn autorepeat_on(&self) -> Result<()> {
        self.set_autorepeat(AutoRepeatMode::ON)
    }

    pub fn autorepeat_off(&self) -> Result<()> {
        self.set_autorepeat(AutoRepeatMode::OFF)
    }

    fn set_autorepeat(&self, mode: AutoRepeatMode) -> Result<()> {
        let aux = ChangeKeyboardControlAux::new().auto_repeat_mode(mode);
        self.conn.change_keyboard_control(&aux)?;
        self.conn.flush()?;
        Ok(())
    }

    /// Convert 0xRRGGBB to the pixel value images and drawing calls use.
    pub fn color_value(&self, rgb: u32) -> u32 {
        self.format.pixel(rgb)
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    /// Whether the server advertises the MIT-SHM extension.
    pub fn shm_available(&self) -> bool {
        self.shm_available
    }

    /// Opt out of (or back into) shared-memory images, e.g. after
    /// [`Error::SharedMemoryUnavailable`] on a remote display.
    pub fn set_use_shm(&mut self, use_shm: bool) {
        self.use_shm = use_shm && self.shm_available;
    }

    /// Allocate a `width` x `height` image, shared-memory backed when the
    /// extension is available and enabled.
    ///
    /// A server that cannot attach the segment (typically a non-local
    /// display) yields [`Error::SharedMemoryUnavailable`]; call
    /// [`Display::set_use_shm`] with `false` and retry to fall back to
    /// core-protocol images.
    pub fn new_image(&self, width: u16, height: u16) -> Result<Image> {
        if self.use_shm {
            return self.new_shm_image(width, height);
        }
        Ok(Image::new_heap(width, height, self.depth, self.byte_order))
    }

    fn new_shm_image(&self, width: u16, height: u16) -> Result<Image> {
        let len = width as usize * 4 * height as usize;
        let segment = ShmSegment::alloc(len)?;
        let seg = self.conn.generate_id()?;
        let cookie = self.conn.shm_attach(seg, segment.shmid(), false)?;
        if cookie.check().is_err() {
            return Err(Error::SharedMemoryUnavailable);
        }
        Ok(Image::new_shm(
            width,
            height,
            self.depth,
            self.byte_order,
            segment,
            seg,
        ))
    }

    /// Release an image, detaching its segment from the server first.
    pub fn destroy_image(&self, image: Image) -> Result<()> {
        if let Some(seg) = image.shm_seg() {
            self.conn.shm_detach(seg)?;
            self.conn.flush()?;
        }
        Ok(())
    }

    /// Copy an image into a window at (x, y).
    pub fn put_image(&self, win: WindowId, image: &Image, x: i16, y: i16) -> Result<()> {
        let state = self.window(win)?;
        if let Some(seg) = image.shm_seg() {
            self.conn.shm_put_image(
                state.id,
                state.gc,
                image.width(),
                image.height(),
                0,
                0,
                image.width(),
                image.height(),
                x,
                y,
                image.depth(),
                ImageFormat::Z_PIXMAP.into(),
                false,
                seg,
                0,
            )?;
        } else {
            self.conn.put_image(
                ImageFormat::Z_PIXMAP,
                state.id,
                state.gc,
                image.width(),
                image.height(),
                x,
                y,
                0,
                image.depth(),
                image.data(),
            )?;
        }
        self.conn.flush()?;
        Ok(())
    }

    /// Decode the string-array form of an XPM pixmap into an image.
    pub fn xpm_to_image(&self, data: &[&str]) -> Result<Image> {
        self.image_from_xpm(xpm::parse_lines(data)?)
    }

    /// Decode a .xpm file into an image.
    pub fn xpm_file_to_image(&self, path: impl AsRef<std::path::Path>) -> Result<Image> {
        let text = std::fs::read_to_string(path)?;
        self.image_from_xpm(xpm::parse_file(&text)?)
    }

    fn image_from_xpm(&self, data: xpm::XpmData) -> Result<Image> {
        let mut image = self.new_image(data.width, data.height)?;
        for y in 0..data.height as usize {
            for x in 0..data.width as usize {
                let rgb = data.pixels[y * data.width as usize + x];
                let pixel = if rgb == TRANSPARENT {
                    TRANSPARENT
                } else {
                    self.format.pixel(rgb)
                };
                image.put_pixel(x as i32, y as i32, pixel);
            }
        }
        Ok(image)
    }

    /// Destroy every window and release server resources. Also runs on
    /// drop; calling it explicitly surfaces errors.
    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        for state in std::mem::take(&mut self.windows) {
            if let Some(font) = state.font {
                let _ = self.conn.close_font(font);
            }
            let _ = self.conn.free_gc(state.gc);
            let _ = self.conn.destroy_window(state.id);
        }
        if let Some(cursor) = self.blank_cursor.take() {
            let _ = self.conn.free_cursor(cursor);
        }
        if self.private_colormap {
            self.private_colormap = false;
            let _ = self.conn.free_colormap(self.colormap);
        }
        self.conn.flush()?;
        Ok(())
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

/// Prefer the root visual when it is already TrueColor, otherwise any
/// TrueColor visual at root depth.
fn find_truecolor_visual(screen: &Screen) -> Option<&Visualtype> {
    let mut fallback = None;
    for depth in screen
        .allowed_depths
        .iter()
        .filter(|d| d.depth == screen.root_depth)
    {
        for visual in &depth.visuals {
            if visual.class != VisualClass::TRUE_COLOR {
                continue;
            }
            if visual.visual_id == screen.root_visual {
                return Some(visual);
            }
            fallback.get_or_insert(visual);
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_888_is_identity() {
        let format = PixelFormat::new(0x00ff0000, 0x0000ff00, 0x000000ff);
        assert_eq!(format.pixel(0x123456), 0x123456);
        assert_eq!(format.pixel(0xffffff), 0xffffff);
        assert_eq!(format.pixel(0x000000), 0x000000);
    }

    #[test]
    fn test_pixel_format_565() {
        let format = PixelFormat::new(0xf800, 0x07e0, 0x001f);
        assert_eq!(format.pixel(0xffffff), 0xffff);
        assert_eq!(format.pixel(0xff0000), 0xf800);
        assert_eq!(format.pixel(0x00ff00), 0x07e0);
        assert_eq!(format.pixel(0x0000ff), 0x001f);
    }

    #[test]
    fn test_pixel_format_bgr_masks() {
        let format = PixelFormat::new(0x0000ff, 0x00ff00, 0xff0000);
        assert_eq!(format.pixel(0xff0000), 0x0000ff);
        assert_eq!(format.pixel(0x0000ff), 0xff0000);
    }

    #[test]
    fn test_pixel_format_zero_mask() {
        let format = PixelFormat::new(0, 0, 0);
        assert_eq!(format.pixel(0xffffff), 0);
    }
}
