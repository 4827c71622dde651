//! Color token handling.
//!
//! Rectangles store their color as a free-form token (`#F44336`, `#f00`,
//! `rgb(10, 20, 30)`, `red`, ...). Nothing here changes the stored token;
//! these helpers only derive display colors from it.

use egui::Color32;

/// Fill used when the token is neither hex nor `rgb()`/`rgba()`.
pub const FALLBACK_FILL: &str = "rgba(0, 0, 0, 0.5)";

fn is_hex_digits(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

/// `#rgb` or `#rrggbb`.
fn is_hex_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(digits) => (digits.len() == 3 || digits.len() == 6) && is_hex_digits(digits),
        None => false,
    }
}

/// Numeric components of `rgb(r, g, b)` or `rgba(r, g, b, a)`.
fn functional_components(color: &str) -> Option<Vec<f32>> {
    let lower = color.trim().to_ascii_lowercase();
    let inner = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    inner
        .split(',')
        .map(|part| part.trim().parse::<f32>().ok())
        .collect()
}

/// Semi-transparent fill for a rectangle color.
///
/// Hex triplets/sextets get an `80` alpha suffix, `rgb(...)` becomes
/// `rgba(..., 0.5)`, an existing `rgba(...)` has its alpha replaced, and
/// anything else falls back to [`FALLBACK_FILL`].
pub fn fill_color(color: &str) -> String {
    if is_hex_color(color) {
        return format!("{}80", color);
    }
    match functional_components(color).as_deref() {
        Some([r, g, b]) | Some([r, g, b, _]) => format!("rgba({}, {}, {}, 0.5)", r, g, b),
        _ => FALLBACK_FILL.to_string(),
    }
}

fn named_color(name: &str) -> Option<Color32> {
    let c = match name {
        "black" => Color32::BLACK,
        "white" => Color32::WHITE,
        "red" => Color32::from_rgb(255, 0, 0),
        "green" => Color32::from_rgb(0, 128, 0),
        "lime" => Color32::from_rgb(0, 255, 0),
        "blue" => Color32::from_rgb(0, 0, 255),
        "yellow" => Color32::from_rgb(255, 255, 0),
        "orange" => Color32::from_rgb(255, 165, 0),
        "purple" => Color32::from_rgb(128, 0, 128),
        "cyan" | "aqua" => Color32::from_rgb(0, 255, 255),
        "magenta" | "fuchsia" => Color32::from_rgb(255, 0, 255),
        "gray" | "grey" => Color32::from_rgb(128, 128, 128),
        "transparent" => Color32::TRANSPARENT,
        _ => return None,
    };
    Some(c)
}

fn parse_hex(digits: &str) -> Option<Color32> {
    if !is_hex_digits(digits) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&digits[i..i + 1], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    match digits.len() {
        3 => Some(Color32::from_rgb(nibble(0)?, nibble(1)?, nibble(2)?)),
        4 => Some(Color32::from_rgba_unmultiplied(
            nibble(0)?,
            nibble(1)?,
            nibble(2)?,
            nibble(3)?,
        )),
        6 => Some(Color32::from_rgb(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Color32::from_rgba_unmultiplied(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
        _ => None,
    }
}

/// Parse a color token into an egui color.
pub fn parse_color(color: &str) -> Option<Color32> {
    let color = color.trim();
    if let Some(digits) = color.strip_prefix('#') {
        return parse_hex(digits);
    }
    if let Some(parts) = functional_components(color) {
        let channel = |v: f32| v.clamp(0.0, 255.0).round() as u8;
        return match parts.as_slice() {
            [r, g, b] => Some(Color32::from_rgb(channel(*r), channel(*g), channel(*b))),
            [r, g, b, a] => Some(Color32::from_rgba_unmultiplied(
                channel(*r),
                channel(*g),
                channel(*b),
                (a.clamp(0.0, 1.0) * 255.0).round() as u8,
            )),
            _ => None,
        };
    }
    named_color(&color.to_ascii_lowercase())
}

/// Display color of a token, black if it cannot be parsed.
pub fn display_color(color: &str) -> Color32 {
    parse_color(color).unwrap_or(Color32::BLACK)
}

/// RGB triple for the color picker widget.
pub fn to_rgb(color: &str) -> [u8; 3] {
    let c = display_color(color);
    [c.r(), c.g(), c.b()]
}

/// `#RRGGBB` token for a picker value.
pub fn to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2])
}
