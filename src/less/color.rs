//! Colour values for the stylesheet compiler.
//!
//! Supports the following input formats:
//! - Hex: `#RGB`, `#RGBA`, `#RRGGBB`, `#RRGGBBAA`
//! - Named and functional colours understood by lightningcss
//!
//! Colours remember the text they were written as and print it back
//! unchanged unless an operation produced a new colour.

use super::value::format_number;
use lightningcss::traits::Parse;
use lightningcss::values::color::CssColor;
use thiserror::Error;

/// Error type for colour parsing failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    /// Input string was empty
    #[error("empty color string")]
    Empty,
    /// Invalid length (must be 3, 4, 6, or 8 hex chars after #)
    #[error("invalid color length {0}, expected 3, 4, 6, or 8")]
    InvalidLength(usize),
    /// Contains non-hex characters
    #[error("invalid hex character '{0}'")]
    InvalidHex(char),
    /// CSS parsing error from lightningcss
    #[error("CSS parse error: {0}")]
    CssParse(String),
}

/// An sRGB colour with channels in 0..=255 and alpha in 0..=1.
#[derive(Debug, Clone, PartialEq)]
pub struct Color {
    /// Red channel
    pub r: f64,
    /// Green channel
    pub g: f64,
    /// Blue channel
    pub b: f64,
    /// Opacity
    pub alpha: f64,
    /// Source text, kept while the colour is unmodified
    pub original: Option<String>,
}

impl Color {
    /// Build a colour from channels, clamping each to its range.
    pub fn rgba(r: f64, g: f64, b: f64, alpha: f64) -> Self {
        Self {
            r: r.clamp(0.0, 255.0),
            g: g.clamp(0.0, 255.0),
            b: b.clamp(0.0, 255.0),
            alpha: alpha.clamp(0.0, 1.0),
            original: None,
        }
    }

    /// Parse a hex, named or functional colour.
    pub fn parse(s: &str) -> Result<Self, ColorError> {
        if s.is_empty() {
            return Err(ColorError::Empty);
        }
        let mut color = if s.starts_with('#') { parse_hex_color(s)? } else { parse_css_color(s)? };
        color.original = Some(s.to_string());
        Ok(color)
    }

    /// Colour for a bare keyword such as `red`, if it names one.
    pub fn named(keyword: &str) -> Option<Self> {
        if keyword.is_empty() || !keyword.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        Self::parse(keyword).ok()
    }

    /// Hue in degrees, saturation and lightness in 0..=1.
    pub fn to_hsl(&self) -> (f64, f64, f64) {
        let r = self.r / 255.0;
        let g = self.g / 255.0;
        let b = self.b / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;
        let d = max - min;

        if d == 0.0 {
            return (0.0, 0.0, l);
        }

        let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        (h * 60.0, s, l)
    }

    /// Build a colour from hue (degrees), saturation and lightness (0..=1).
    pub fn from_hsl(h: f64, s: f64, l: f64, alpha: f64) -> Self {
        let h = (h % 360.0 + 360.0) % 360.0 / 360.0;
        let s = s.clamp(0.0, 1.0);
        let l = l.clamp(0.0, 1.0);

        let m2 = if l <= 0.5 { l * (s + 1.0) } else { l + s - l * s };
        let m1 = l * 2.0 - m2;
        let hue = |h: f64| {
            let h = if h < 0.0 {
                h + 1.0
            } else if h > 1.0 {
                h - 1.0
            } else {
                h
            };
            if h * 6.0 < 1.0 {
                m1 + (m2 - m1) * h * 6.0
            } else if h * 2.0 < 1.0 {
                m2
            } else if h * 3.0 < 2.0 {
                m1 + (m2 - m1) * (2.0 / 3.0 - h) * 6.0
            } else {
                m1
            }
        };

        Self::rgba(hue(h + 1.0 / 3.0) * 255.0, hue(h) * 255.0, hue(h - 1.0 / 3.0) * 255.0, alpha)
    }

    /// Apply an operation to each colour channel.
    pub fn map_channels(&self, f: impl Fn(f64) -> f64) -> Self {
        Self::rgba(f(self.r), f(self.g), f(self.b), self.alpha)
    }

    /// CSS text: the original spelling if unmodified, else hex or `rgba()`.
    pub fn to_css(&self) -> String {
        if let Some(original) = &self.original {
            return original.clone();
        }
        let (r, g, b) = (self.r.round() as u8, self.g.round() as u8, self.b.round() as u8);
        if self.alpha < 1.0 {
            format!("rgba({}, {}, {}, {})", r, g, b, format_number(self.alpha))
        } else {
            format!("#{:02x}{:02x}{:02x}", r, g, b)
        }
    }
}

/// Parse a hex colour string (#RGB, #RGBA, #RRGGBB, #RRGGBBAA)
fn parse_hex_color(s: &str) -> Result<Color, ColorError> {
    let hex = &s[1..];

    let mut digits = Vec::with_capacity(8);
    for c in hex.chars() {
        digits.push(parse_hex_digit(c)?);
    }

    let channels: Vec<u8> = match digits.len() {
        // #RGB and #RGBA double each digit
        3 | 4 => digits.iter().map(|d| d * 17).collect(),
        6 | 8 => digits.chunks(2).map(|pair| pair[0] * 16 + pair[1]).collect(),
        len => return Err(ColorError::InvalidLength(len)),
    };

    let alpha = channels.get(3).map(|&a| f64::from(a) / 255.0).unwrap_or(1.0);
    Ok(Color::rgba(
        f64::from(channels[0]),
        f64::from(channels[1]),
        f64::from(channels[2]),
        alpha,
    ))
}

/// Parse a CSS colour using lightningcss (rgb, hsl, named colours)
fn parse_css_color(s: &str) -> Result<Color, ColorError> {
    use lightningcss::values::color::FloatColor;

    let css_color = CssColor::parse_string(s).map_err(|e| ColorError::CssParse(e.to_string()))?;
    let rgb_color = css_color
        .to_rgb()
        .map_err(|_| ColorError::CssParse("cannot convert color to RGB".to_string()))?;

    match rgb_color {
        CssColor::RGBA(rgba) => Ok(Color::rgba(
            f64::from(rgba.red),
            f64::from(rgba.green),
            f64::from(rgba.blue),
            f64::from(rgba.alpha) / 255.0,
        )),
        CssColor::Float(float_color) => match float_color.as_ref() {
            FloatColor::RGB(rgb) => Ok(Color::rgba(
                f64::from(rgb.r) * 255.0,
                f64::from(rgb.g) * 255.0,
                f64::from(rgb.b) * 255.0,
                f64::from(rgb.alpha),
            )),
            _ => Err(ColorError::CssParse("unexpected float color format".to_string())),
        },
        _ => Err(ColorError::CssParse("color conversion did not produce RGB".to_string())),
    }
}

/// Parse a single hex digit (0-9, A-F, a-f) to u8 (0-15)
fn parse_hex_digit(c: char) -> Result<u8, ColorError> {
    match c {
        '0'..='9' => Ok(c as u8 - b'0'),
        'a'..='f' => Ok(c as u8 - b'a' + 10),
        'A'..='F' => Ok(c as u8 - b'A' + 10),
        _ => Err(ColorError::InvalidHex(c)),
    }
}
