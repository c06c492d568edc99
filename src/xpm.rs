//! XPM3 decoding.
//!
//! Self-contained parser for the subset real-world pixmaps use: header,
//! color table with `c`/`g`/`g4`/`m` keys, hex and named colors, `None`
//! for transparency. Produces plain 0xRRGGBB values; conversion to the
//! visual's pixel format happens when the data is copied into an image.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Marker value stored for `None` (transparent) pixels.
pub const TRANSPARENT: u32 = 0xff00_0000;

/// Decoded pixmap, colors as 0xRRGGBB (or [`TRANSPARENT`]).
pub(crate) struct XpmData {
    pub width: u16,
    pub height: u16,
    pub pixels: Vec<u32>,
}

/// Common rgb.txt names. Lookup is case-insensitive with spaces removed.
const NAMED_COLORS: &[(&str, u32)] = &[
    ("black", 0x000000),
    ("white", 0xffffff),
    ("red", 0xff0000),
    ("green", 0x00ff00),
    ("blue", 0x0000ff),
    ("yellow", 0xffff00),
    ("cyan", 0x00ffff),
    ("magenta", 0xff00ff),
    ("gray", 0xbebebe),
    ("grey", 0xbebebe),
    ("darkgray", 0xa9a9a9),
    ("darkgrey", 0xa9a9a9),
    ("lightgray", 0xd3d3d3),
    ("lightgrey", 0xd3d3d3),
    ("orange", 0xffa500),
    ("brown", 0xa52a2a),
    ("pink", 0xffc0cb),
    ("purple", 0xa020f0),
    ("navy", 0x000080),
    ("maroon", 0xb03060),
    ("turquoise", 0x40e0d0),
    ("violet", 0xee82ee),
    ("gold", 0xffd700),
];

/// Parse the string-array form (the contents of the C `char *xpm[]`).
pub(crate) fn parse_lines(lines: &[&str]) -> Result<XpmData> {
    let mut iter = lines.iter().copied();
    let header = iter
        .next()
        .ok_or_else(|| Error::Xpm("missing header".into()))?;
    let (width, height, ncolors, cpp) = parse_header(header)?;

    let mut colors: HashMap<String, u32> = HashMap::with_capacity(ncolors);
    for _ in 0..ncolors {
        let line = iter
            .next()
            .ok_or_else(|| Error::Xpm("truncated color table".into()))?;
        let (chars, color) = parse_color(line, cpp)?;
        colors.insert(chars, color);
    }

    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for row in 0..height {
        let line = iter
            .next()
            .ok_or_else(|| Error::Xpm(format!("missing pixel row {row}")))?;
        for col in 0..width as usize {
            let chars = line
                .get(col * cpp..(col + 1) * cpp)
                .ok_or_else(|| Error::Xpm(format!("pixel row {row} too short")))?;
            let color = colors
                .get(chars)
                .ok_or_else(|| Error::Xpm(format!("unknown color {chars:?}")))?;
            pixels.push(*color);
        }
    }

    Ok(XpmData {
        width,
        height,
        pixels,
    })
}

/// Parse a whole .xpm file: the pixmap is the sequence of quoted strings.
pub(crate) fn parse_file(text: &str) -> Result<XpmData> {
    let strings = quoted_strings(text);
    if strings.is_empty() {
        return Err(Error::Xpm("no string data found".into()));
    }
    let refs: Vec<&str> = strings.iter().map(String::as_str).collect();
    parse_lines(&refs)
}

fn quoted_strings(text: &str) -> Vec<String> {
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    for c in text.chars() {
        if c == '"' {
            if in_string {
                strings.push(std::mem::take(&mut current));
            }
            in_string = !in_string;
        } else if in_string {
            current.push(c);
        }
    }
    strings
}

fn parse_header(line: &str) -> Result<(u16, u16, usize, usize)> {
    let mut values = line.split_whitespace().map(|v| v.parse::<usize>());
    let mut next = |name: &str| {
        values
            .next()
            .and_then(|v| v.ok())
            .ok_or_else(|| Error::Xpm(format!("bad header value: {name}")))
    };
    let width = next("width")?;
    let height = next("height")?;
    let ncolors = next("ncolors")?;
    let cpp = next("chars per pixel")?;
    if width == 0 || height == 0 || cpp == 0 {
        return Err(Error::Xpm("zero dimension in header".into()));
    }
    if width > u16::MAX as usize || height > u16::MAX as usize {
        return Err(Error::Xpm("image too large".into()));
    }
    Ok((width as u16, height as u16, ncolors, cpp))
}

fn parse_color(line: &str, cpp: usize) -> Result<(String, u32)> {
    let chars = line
        .get(..cpp)
        .ok_or_else(|| Error::Xpm(format!("color line too short: {line:?}")))?
        .to_string();

    // key/value pairs; a value runs until the next key token
    let mut entries: HashMap<&str, String> = HashMap::new();
    let mut key: Option<&str> = None;
    let mut value = String::new();
    for token in line[cpp..].split_whitespace() {
        if matches!(token, "c" | "m" | "g" | "g4" | "s") {
            if let Some(k) = key.take() {
                entries.insert(k, std::mem::take(&mut value));
            }
            key = Some(token);
        } else if key.is_some() {
            if !value.is_empty() {
                value.push(' ');
            }
            value.push_str(token);
        }
    }
    if let Some(k) = key {
        entries.insert(k, value);
    }

    let value = ["c", "g", "g4", "m"]
        .iter()
        .find_map(|k| entries.get(k))
        .ok_or_else(|| Error::Xpm(format!("no color value for {chars:?}")))?;
    Ok((chars, resolve_color(value)?))
}

fn resolve_color(value: &str) -> Result<u32> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(TRANSPARENT);
    }
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex).ok_or_else(|| Error::Xpm(format!("bad hex color {value:?}")));
    }
    let folded: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == folded)
        .map(|(_, color)| *color)
        .ok_or_else(|| Error::Xpm(format!("unknown color name {value:?}")))
}

fn parse_hex(hex: &str) -> Option<u32> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u32::from_str_radix(s, 16).ok();
    match hex.len() {
        // #RGB
        3 => {
            let r = channel(&hex[0..1])?;
            let g = channel(&hex[1..2])?;
            let b = channel(&hex[2..3])?;
            Some((r * 0x11) << 16 | (g * 0x11) << 8 | b * 0x11)
        }
        // #RRGGBB
        6 => channel(hex),
        // #RRRRGGGGBBBB, keep the high byte of each channel
        12 => {
            let r = channel(&hex[0..2])?;
            let g = channel(&hex[4..6])?;
            let b = channel(&hex[8..10])?;
            Some(r << 16 | g << 8 | b)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_pixmap() {
        let data = ["2 2 2 1", ". c #000000", "# c #ffffff", ".#", "#."];
        let xpm = parse_lines(&data).unwrap();
        assert_eq!((xpm.width, xpm.height), (2, 2));
        assert_eq!(xpm.pixels, vec![0x000000, 0xffffff, 0xffffff, 0x000000]);
    }

    #[test]
    fn test_named_and_transparent_colors() {
        let data = ["3 1 3 1", "r c red", "  c None", "g c Gray", "r g"];
        let xpm = parse_lines(&data).unwrap();
        assert_eq!(xpm.pixels, vec![0xff0000, TRANSPARENT, 0xbebebe]);
    }

    #[test]
    fn test_two_chars_per_pixel() {
        let data = ["1 2 2 2", "aa c #112233", "bb c #445566", "aa", "bb"];
        let xpm = parse_lines(&data).unwrap();
        assert_eq!(xpm.pixels, vec![0x112233, 0x445566]);
    }

    #[test]
    fn test_key_preference_c_over_m() {
        let data = ["1 1 1 1", "x m white c black", "x"];
        let xpm = parse_lines(&data).unwrap();
        assert_eq!(xpm.pixels, vec![0x000000]);
    }

    #[test]
    fn test_multiword_color_name() {
        let data = ["1 1 1 1", "x c light gray", "x"];
        let xpm = parse_lines(&data).unwrap();
        assert_eq!(xpm.pixels, vec![0xd3d3d3]);
    }

    #[test]
    fn test_hex_forms() {
        assert_eq!(parse_hex("fff"), Some(0xffffff));
        assert_eq!(parse_hex("102030"), Some(0x102030));
        assert_eq!(parse_hex("12ab34cd56ef"), Some(0x1234_56));
        assert_eq!(parse_hex("12345"), None);
        assert_eq!(parse_hex("zzzzzz"), None);
    }

    #[test]
    fn test_malformed_inputs_error() {
        assert!(parse_lines(&[]).is_err());
        assert!(parse_lines(&["not a header"]).is_err());
        assert!(parse_lines(&["1 1 1 1"]).is_err());
        assert!(parse_lines(&["1 1 1 1", "x c #000000"]).is_err());
        assert!(parse_lines(&["2 1 1 1", "x c #000000", "x"]).is_err());
        assert!(parse_lines(&["1 1 1 1", "x c #000000", "y"]).is_err());
        assert!(parse_lines(&["1 1 1 1", "x c notacolor", "x"]).is_err());
    }

    #[test]
    fn test_file_form() {
        let text = r##"
/* XPM */
static char *icon[] = {
"2 1 2 1",
". c black",
"# c white",
".#"};
"##;
        let xpm = parse_file(text).unwrap();
        assert_eq!((xpm.width, xpm.height), (2, 1));
        assert_eq!(xpm.pixels, vec![0x000000, 0xffffff]);
    }

    #[test]
    fn test_empty_file_errors() {
        assert!(parse_file("int x = 3;").is_err());
    }
}
