//! Interactive demo: gradient (or XPM) image, pixel trail, hook wiring.
//!
//! ```text
//! x11fb-demo                     gradient in a 640x480 window
//! x11fb-demo --xpm icon.xpm      blit a pixmap file instead
//! ```
//!
//! Escape or the close button quits, any mouse button stamps a dot at the
//! pointer, `r` toggles keyboard auto-repeat.

use anyhow::{Context, Result};
use clap::Parser;
use x11fb::{Display, EventKind, EventMask, Hook, Image};

const XK_ESCAPE: i32 = 0xff1b;
const XK_R: i32 = 0x72;

#[derive(Parser)]
#[command(name = "x11fb-demo")]
#[command(about = "x11fb demo window")]
#[command(version)]
struct Cli {
    /// Window width in pixels
    #[arg(long, default_value_t = 640)]
    width: u16,

    /// Window height in pixels
    #[arg(long, default_value_t = 480)]
    height: u16,

    /// Window title
    #[arg(long, default_value = "x11fb demo")]
    title: String,

    /// Blit this XPM file instead of the gradient
    #[arg(long)]
    xpm: Option<String>,

    /// Skip shared-memory images even when the server supports them
    #[arg(long)]
    no_shm: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut dpy = Display::open(None).context("failed to open display")?;
    if cli.no_shm {
        dpy.set_use_shm(false);
    }

    let (screen_w, screen_h) = dpy.screen_size();
    eprintln!("screen: {screen_w}x{screen_h}, shm: {}", dpy.shm_available());

    let win = dpy.new_window(cli.width, cli.height, &cli.title)?;

    let img = match &cli.xpm {
        Some(path) => dpy
            .xpm_file_to_image(path)
            .with_context(|| format!("failed to load {path}"))?,
        None => gradient(&mut dpy, cli.width, cli.height)?,
    };
    dpy.put_image(win, &img, 0, 0)?;

    dpy.expose_hook(win, move |dpy| {
        let _ = dpy.put_image(win, &img, 0, 0);
    })?;

    let mut autorepeat = true;
    dpy.key_hook(win, move |dpy, keysym| {
        eprintln!("key {keysym:#x}");
        match keysym {
            XK_ESCAPE => dpy.loop_end(),
            XK_R => {
                autorepeat = !autorepeat;
                let result = if autorepeat {
                    dpy.autorepeat_on()
                } else {
                    dpy.autorepeat_off()
                };
                if let Err(e) = result {
                    eprintln!("autorepeat toggle failed: {e}");
                }
            }
            _ => {}
        }
    })?;

    dpy.mouse_hook(win, move |dpy, button| {
        if let Ok((x, y)) = dpy.mouse_pos(win) {
            eprintln!("button {button} at {x},{y}");
            for dy in -1..=1i16 {
                for dx in -1..=1i16 {
                    let _ = dpy.pixel_put(win, x + dx, y + dy, 0xffffff);
                }
            }
        }
    })?;

    dpy.hook(
        win,
        EventKind::DestroyNotify,
        EventMask::NO_EVENT,
        Hook::simple(|dpy: &mut Display| dpy.loop_end()),
    )?;

    dpy.run()?;
    dpy.close()?;
    Ok(())
}

/// Fill a fresh image with a red/green ramp, falling back to core images
/// when the server rejects the shared segment.
fn gradient(dpy: &mut Display, width: u16, height: u16) -> Result<Image> {
    let mut img = match dpy.new_image(width, height) {
        Ok(img) => img,
        Err(x11fb::Error::SharedMemoryUnavailable) => {
            eprintln!("shm attach refused, using core images");
            dpy.set_use_shm(false);
            dpy.new_image(width, height)?
        }
        Err(e) => return Err(e.into()),
    };
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let r = (x * 255 / width.max(1) as i32) as u32;
            let g = (y * 255 / height.max(1) as i32) as u32;
            img.put_pixel(x, y, dpy.color_value(r << 16 | g << 8 | 0x40));
        }
    }
    Ok(img)
}
