//! x11fb - minimal X11 windowing and framebuffer library
//!
//! Opens windows, pushes 32-bit pixel buffers (MIT-SHM backed when the
//! server allows it), decodes XPM pixmaps, and dispatches events to
//! registered hooks. Single-threaded: one loop drives every callback to
//! completion before waiting for the next event.
//!
//! ```no_run
//! use x11fb::{Display, EventKind, EventMask, Hook};
//!
//! fn main() -> x11fb::Result<()> {
//!     let mut dpy = Display::open(None)?;
//!     let win = dpy.new_window(640, 480, "hello")?;
//!     let mut img = dpy.new_image(640, 480)?;
//!     img.fill(dpy.color_value(0x202040));
//!     dpy.put_image(win, &img, 0, 0)?;
//!     dpy.key_hook(win, |dpy, keysym| {
//!         if keysym == 0xff1b {
//!             dpy.loop_end();
//!         }
//!     })?;
//!     dpy.hook(
//!         win,
//!         EventKind::DestroyNotify,
//!         EventMask::NO_EVENT,
//!         Hook::simple(|dpy: &mut Display| dpy.loop_end()),
//!     )?;
//!     dpy.run()
//! }
//! ```

mod display;
mod error;
mod events;
mod image;
mod keymap;
mod window;
mod xpm;

pub use display::{Display, PixelFormat};
pub use error::{Error, Result};
pub use events::{EventKind, EventSlots, Hook, MAX_EVENT};
pub use image::Image;
pub use window::WindowId;
pub use xpm::TRANSPARENT;

// callers need the mask constants for hook registration
pub use x11rb::protocol::xproto::EventMask;
