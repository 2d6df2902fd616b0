//! Color parsing, arithmetic, and emission.

use crate::ast::Rgba;

/// Parses a `#rgb`, `#rgba`, `#rrggbb`, or `#rrggbbaa` hex literal.
pub fn parse_hex(text: &str) -> Option<Rgba> {
    let hex = text.strip_prefix('#')?;
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let chan = |s: &str| u8::from_str_radix(s, 16).ok().map(f64::from);
    match hex.len() {
        3 => {
            let r = chan(&hex[0..1].repeat(2))?;
            let g = chan(&hex[1..2].repeat(2))?;
            let b = chan(&hex[2..3].repeat(2))?;
            Some(Rgba { r, g, b, a: 1.0 })
        }
        4 => {
            let r = chan(&hex[0..1].repeat(2))?;
            let g = chan(&hex[1..2].repeat(2))?;
            let b = chan(&hex[2..3].repeat(2))?;
            let a = chan(&hex[3..4].repeat(2))?;
            Some(Rgba { r, g, b, a: a / 255.0 })
        }
        6 => {
            let r = chan(&hex[0..2])?;
            let g = chan(&hex[2..4])?;
            let b = chan(&hex[4..6])?;
            Some(Rgba { r, g, b, a: 1.0 })
        }
        8 => {
            let r = chan(&hex[0..2])?;
            let g = chan(&hex[2..4])?;
            let b = chan(&hex[4..6])?;
            let a = chan(&hex[6..8])?;
            Some(Rgba { r, g, b, a: a / 255.0 })
        }
        _ => None,
    }
}

/// The subset of CSS named colors a LESS source is likely to use. Not
/// exhaustive by design: anything not in this table is left as a `Keyword`
/// and passed through verbatim, matching how unknown CSS identifiers are
/// treated everywhere else in this compiler.
const NAMED_COLORS: &[(&str, (u8, u8, u8))] = &[
    ("black", (0, 0, 0)),
    ("silver", (192, 192, 192)),
    ("gray", (128, 128, 128)),
    ("grey", (128, 128, 128)),
    ("white", (255, 255, 255)),
    ("maroon", (128, 0, 0)),
    ("red", (255, 0, 0)),
    ("purple", (128, 0, 128)),
    ("fuchsia", (255, 0, 255)),
    ("green", (0, 128, 0)),
    ("lime", (0, 255, 0)),
    ("olive", (128, 128, 0)),
    ("yellow", (255, 255, 0)),
    ("navy", (0, 0, 128)),
    ("blue", (0, 0, 255)),
    ("teal", (0, 128, 128)),
    ("aqua", (0, 255, 255)),
    ("orange", (255, 165, 0)),
    ("transparent", (0, 0, 0)),
    ("pink", (255, 192, 203)),
    ("brown", (165, 42, 42)),
    ("gold", (255, 215, 0)),
    ("indigo", (75, 0, 130)),
    ("violet", (238, 130, 238)),
];

/// Looks up `name` as a CSS named color (case-insensitive).
pub fn named_color(name: &str) -> Option<Rgba> {
    NAMED_COLORS.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(n, (r, g, b))| Rgba {
        r: f64::from(*r),
        g: f64::from(*g),
        b: f64::from(*b),
        a: if name.eq_ignore_ascii_case("transparent") { 0.0 } else { 1.0 },
    })
}

/// Componentwise RGB arithmetic, preserving alpha (spec.md §4.4
/// `Color.Operate`).
pub fn operate(op: char, a: Rgba, b: Rgba) -> Rgba {
    let f = |x: f64, y: f64| match op {
        '+' => x + y,
        '-' => x - y,
        '*' => x * y,
        '/' => x / y,
        _ => unreachable!("unsupported color operator {op}"),
    };
    Rgba { r: f(a.r, b.r), g: f(a.g, b.g), b: f(a.b, b.b), a: a.a }
}

/// Componentwise color/number arithmetic: the scalar applies to every RGB
/// channel, alpha is preserved.
pub fn operate_scalar(op: char, color: Rgba, scalar: f64) -> Rgba {
    let f = |x: f64| match op {
        '+' => x + scalar,
        '-' => x - scalar,
        '*' => x * scalar,
        '/' => x / scalar,
        _ => unreachable!("unsupported color operator {op}"),
    };
    Rgba { r: f(color.r), g: f(color.g), b: f(color.b), a: color.a }
}

/// Converts RGB to HSL (`h` in degrees, `s`/`l` in `0.0..=1.0`).
pub fn rgb_to_hsl(c: Rgba) -> (f64, f64, f64) {
    let (r, g, b) = (c.r / 255.0, c.g / 255.0, c.b / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    if (max - min).abs() < f64::EPSILON {
        return (0.0, 0.0, l);
    }
    let d = max - min;
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
    let h = if (max - r).abs() < f64::EPSILON {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if (max - g).abs() < f64::EPSILON {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (h * 60.0, s, l)
}

/// Converts HSL back to RGB, preserving `alpha`.
pub fn hsl_to_rgb(h: f64, s: f64, l: f64, alpha: f64) -> Rgba {
    if s <= 0.0 {
        let v = l * 255.0;
        return Rgba { r: v, g: v, b: v, a: alpha };
    }
    let h = ((h % 360.0) + 360.0) % 360.0 / 360.0;
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let hue = |t: f64| {
        let t = if t < 0.0 { t + 1.0 } else if t > 1.0 { t - 1.0 } else { t };
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 1.0 / 2.0 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };
    Rgba { r: hue(h + 1.0 / 3.0) * 255.0, g: hue(h) * 255.0, b: hue(h - 1.0 / 3.0) * 255.0, a: alpha }
}

/// Formats a clamped color as the shortest exact CSS representation:
/// `#rgb` when every channel is a repeated hex digit and alpha is opaque,
/// `rgba(...)` when alpha is not 1, `#rrggbb` otherwise.
pub fn format_css(c: Rgba, compress: bool) -> String {
    let c = c.clamped();
    if c.a < 1.0 {
        let (r, g, b) = (c.r.round() as i64, c.g.round() as i64, c.b.round() as i64);
        return if compress {
            format!("rgba({r},{g},{b},{})", format_alpha(c.a))
        } else {
            format!("rgba({r}, {g}, {b}, {})", format_alpha(c.a))
        };
    }
    let (r, g, b) = (c.r.round() as u8, c.g.round() as u8, c.b.round() as u8);
    let long = format!("#{r:02x}{g:02x}{b:02x}");
    if !compress {
        return long;
    }
    if is_shorthand(r) && is_shorthand(g) && is_shorthand(b) {
        format!("#{:x}{:x}{:x}", r & 0xf, g & 0xf, b & 0xf)
    } else {
        long
    }
}

fn is_shorthand(channel: u8) -> bool {
    channel & 0x0f == channel >> 4
}

fn format_alpha(a: f64) -> String {
    let rounded = (a * 1000.0).round() / 1000.0;
    let mut s = format!("{rounded}");
    if !s.contains('.') {
        s.push_str(".0");
    }
    // Avoid Rust's default "1" vs LESS/CSS's "1" — both print the same, but
    // trailing zeros beyond three decimal places are trimmed by `{rounded}`
    // already since it's an `f64` Display, not a fixed-width formatter.
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_hex() {
        let short = parse_hex("#fff").unwrap();
        assert_eq!((short.r, short.g, short.b, short.a), (255.0, 255.0, 255.0, 1.0));
        let long = parse_hex("#808080").unwrap();
        assert_eq!((long.r, long.g, long.b), (128.0, 128.0, 128.0));
    }

    #[test]
    fn color_plus_number_scenario_7() {
        let base = parse_hex("#808080").unwrap();
        let result = operate_scalar('+', base, 10.0).clamped();
        assert_eq!(format_css(result, false), "#8a8a8a");
    }

    #[test]
    fn compress_shortens_white() {
        let white = parse_hex("#ffffff").unwrap();
        assert_eq!(format_css(white, true), "#fff");
    }

    #[test]
    fn hsl_roundtrip_preserves_hue_for_saturated_color() {
        let red = Rgba { r: 255.0, g: 0.0, b: 0.0, a: 1.0 };
        let (h, s, l) = rgb_to_hsl(red);
        let back = hsl_to_rgb(h, s, l, 1.0);
        assert!((back.r - 255.0).abs() < 1.0);
        assert!(back.g.abs() < 1.0);
        assert!(back.b.abs() < 1.0);
    }
}
