//! The built-in function registry (spec.md §4.4 `Call.Evaluate`).
//!
//! Functions receive already-evaluated arguments and return a replacement
//! node. A call whose name is not registered here passes through verbatim
//! as a raw CSS function call, which is how `calc()`, `translate()`, and
//! every other native CSS function survive untouched.

use crate::ast::{ColorNode, Keyword, Node, NodeData, NumberNode, QuotedNode, Rgba};
use crate::color;
use crate::error::{EvalError, Location};
use regex::{Regex, RegexBuilder};
use unicase::UniCase;

/// A registered built-in function.
pub type Function = fn(&[Node], Location) -> Result<Node, EvalError>;

fn number_node(value: f64, unit: impl Into<String>) -> Node {
    Node::Number(NumberNode { data: NodeData::default(), value, unit: unit.into() })
}

fn color_node(rgba: Rgba) -> Node {
    Node::Color(ColorNode { data: NodeData::default(), rgba })
}

fn keyword_node(value: impl Into<String>) -> Node {
    Node::Keyword(Keyword { data: NodeData::default(), value: value.into() })
}

fn as_number(node: &Node, loc: &Location) -> Result<(f64, String), EvalError> {
    match node {
        Node::Number(n) => Ok((n.value, n.unit.clone())),
        _ => Err(EvalError::IncomparableOperands(loc.clone())),
    }
}

fn as_color(node: &Node, loc: &Location) -> Result<Rgba, EvalError> {
    match node {
        Node::Color(c) => Ok(c.rgba),
        Node::Keyword(k) => color::named_color(&k.value).ok_or_else(|| EvalError::IncomparableOperands(loc.clone())),
        _ => Err(EvalError::IncomparableOperands(loc.clone())),
    }
}

fn as_string(node: &Node) -> Option<String> {
    match node {
        Node::Quoted(q) => Some(q.content.clone()),
        Node::Keyword(k) => Some(k.value.clone()),
        Node::Text(t) => Some(t.value.clone()),
        _ => None,
    }
}

fn lighten(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let c = as_color(&args[0], &loc)?;
    let (amount, _) = as_number(&args[1], &loc)?;
    let (h, s, l) = color::rgb_to_hsl(c);
    Ok(color_node(color::hsl_to_rgb(h, s, (l + amount / 100.0).clamp(0.0, 1.0), c.a)))
}

fn darken(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let c = as_color(&args[0], &loc)?;
    let (amount, _) = as_number(&args[1], &loc)?;
    let (h, s, l) = color::rgb_to_hsl(c);
    Ok(color_node(color::hsl_to_rgb(h, s, (l - amount / 100.0).clamp(0.0, 1.0), c.a)))
}

fn saturate(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let c = as_color(&args[0], &loc)?;
    let (amount, _) = as_number(&args[1], &loc)?;
    let (h, s, l) = color::rgb_to_hsl(c);
    Ok(color_node(color::hsl_to_rgb(h, (s + amount / 100.0).clamp(0.0, 1.0), l, c.a)))
}

fn desaturate(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let c = as_color(&args[0], &loc)?;
    let (amount, _) = as_number(&args[1], &loc)?;
    let (h, s, l) = color::rgb_to_hsl(c);
    Ok(color_node(color::hsl_to_rgb(h, (s - amount / 100.0).clamp(0.0, 1.0), l, c.a)))
}

fn fadein(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let c = as_color(&args[0], &loc)?;
    let (amount, _) = as_number(&args[1], &loc)?;
    Ok(color_node(Rgba { a: (c.a + amount / 100.0).clamp(0.0, 1.0), ..c }))
}

fn fadeout(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let c = as_color(&args[0], &loc)?;
    let (amount, _) = as_number(&args[1], &loc)?;
    Ok(color_node(Rgba { a: (c.a - amount / 100.0).clamp(0.0, 1.0), ..c }))
}

fn fade(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let c = as_color(&args[0], &loc)?;
    let (amount, _) = as_number(&args[1], &loc)?;
    Ok(color_node(Rgba { a: (amount / 100.0).clamp(0.0, 1.0), ..c }))
}

fn spin(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let c = as_color(&args[0], &loc)?;
    let (amount, _) = as_number(&args[1], &loc)?;
    let (h, s, l) = color::rgb_to_hsl(c);
    Ok(color_node(color::hsl_to_rgb(h + amount, s, l, c.a)))
}

fn mix(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let c1 = as_color(&args[0], &loc)?;
    let c2 = as_color(&args[1], &loc)?;
    let weight = args.get(2).map(|n| as_number(n, &loc)).transpose()?.map_or(50.0, |(v, _)| v) / 100.0;
    let w = weight * 2.0 - 1.0;
    let a = c1.a - c2.a;
    let w1 = (if w * a == -1.0 { w } else { (w + a) / (1.0 + w * a) } + 1.0) / 2.0;
    let w2 = 1.0 - w1;
    Ok(color_node(Rgba {
        r: c1.r * w1 + c2.r * w2,
        g: c1.g * w1 + c2.g * w2,
        b: c1.b * w1 + c2.b * w2,
        a: c1.a * weight + c2.a * (1.0 - weight),
    }))
}

fn rgb(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let r = as_number(&args[0], &loc)?.0;
    let g = as_number(&args[1], &loc)?.0;
    let b = as_number(&args[2], &loc)?.0;
    Ok(color_node(Rgba { r, g, b, a: 1.0 }))
}

fn rgba(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let r = as_number(&args[0], &loc)?.0;
    let g = as_number(&args[1], &loc)?.0;
    let b = as_number(&args[2], &loc)?.0;
    let a = as_number(&args[3], &loc)?.0;
    Ok(color_node(Rgba { r, g, b, a }))
}

fn hsl(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let h = as_number(&args[0], &loc)?.0;
    let s = as_number(&args[1], &loc)?.0 / 100.0;
    let l = as_number(&args[2], &loc)?.0 / 100.0;
    Ok(color_node(color::hsl_to_rgb(h, s, l, 1.0)))
}

fn hsla(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let h = as_number(&args[0], &loc)?.0;
    let s = as_number(&args[1], &loc)?.0 / 100.0;
    let l = as_number(&args[2], &loc)?.0 / 100.0;
    let a = as_number(&args[3], &loc)?.0;
    Ok(color_node(color::hsl_to_rgb(h, s, l, a)))
}

fn argb(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let c = as_color(&args[0], &loc)?.clamped();
    Ok(keyword_node(format!(
        "#{:02x}{:02x}{:02x}{:02x}",
        (c.a * 255.0).round() as u8,
        c.r.round() as u8,
        c.g.round() as u8,
        c.b.round() as u8
    )))
}

fn e(args: &[Node], _loc: Location) -> Result<Node, EvalError> {
    let content = as_string(&args[0]).unwrap_or_default();
    Ok(Node::Quoted(QuotedNode { data: NodeData::default(), quote: None, escaped: true, content }))
}

fn escape(args: &[Node], _loc: Location) -> Result<Node, EvalError> {
    let content = as_string(&args[0]).unwrap_or_default();
    let mut escaped = String::with_capacity(content.len());
    for ch in content.chars() {
        if ch.is_ascii_alphanumeric() || "-_.~/".contains(ch) {
            escaped.push(ch);
        } else {
            let mut buf = [0u8; 4];
            for byte in ch.encode_utf8(&mut buf).as_bytes() {
                escaped.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    Ok(keyword_node(escaped))
}

fn quote_of(node: &Node) -> Option<char> {
    match node {
        Node::Quoted(q) => q.quote,
        _ => None,
    }
}

fn replace(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let subject = as_string(&args[0]).unwrap_or_default();
    let pattern = as_string(&args[1]).unwrap_or_default();
    let replacement = as_string(&args[2]).unwrap_or_default();
    let flags = args.get(3).and_then(as_string).unwrap_or_default();
    let global = flags.contains('g');
    let re = RegexBuilder::new(&pattern)
        .case_insensitive(flags.contains('i'))
        .build()
        .map_err(|_| EvalError::IncomparableOperands(loc))?;
    // LESS/JS-style `$1`-style capture references pass straight through to
    // `regex`'s own `$1` replacement syntax, so no translation is needed.
    let result = if global { re.replace_all(&subject, replacement.as_str()).into_owned() } else { re.replace(&subject, replacement.as_str()).into_owned() };
    Ok(Node::Quoted(QuotedNode { data: NodeData::default(), quote: quote_of(&args[0]), escaped: false, content: result }))
}

/// `%("format", ...)`: substitutes `%s`/`%d`/`%a` placeholders in order with
/// the remaining arguments, `%S`/`%D`/`%A` doing the same but without
/// surrounding the substitution in quotes.
fn format(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let template = as_string(&args[0]).unwrap_or_default();
    let mut rest = args[1..].iter();
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.peek().copied() {
            Some(spec @ ('s' | 'd' | 'a' | 'S' | 'D' | 'A')) => {
                chars.next();
                let value = rest.next().ok_or_else(|| EvalError::WrongArgumentCount { expected: "enough arguments for the format string".into(), got: args.len() - 1, location: loc.clone() })?;
                let rendered = render_format_arg(value);
                if spec.is_uppercase() {
                    out.push_str(&rendered);
                } else {
                    out.push_str(&escape_for_format(&rendered));
                }
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }
    Ok(Node::Quoted(QuotedNode { data: NodeData::default(), quote: quote_of(&args[0]), escaped: false, content: out }))
}

fn render_format_arg(node: &Node) -> String {
    match node {
        Node::Quoted(q) => q.content.clone(),
        Node::Keyword(k) => k.value.clone(),
        Node::Text(t) => t.value.clone(),
        Node::Number(n) => format!("{}{}", n.value, n.unit),
        other => format!("{other:?}"),
    }
}

fn escape_for_format(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b',' | b'/' | b'?' | b'@' | b'&' | b'+' | b' ' | b'#' => escaped.push_str(&format!("%{b:02X}")),
            _ => escaped.push(b as char),
        }
    }
    escaped
}

fn percentage(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let (v, _) = as_number(&args[0], &loc)?;
    Ok(number_node(v * 100.0, "%"))
}

fn ceil(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let (v, u) = as_number(&args[0], &loc)?;
    Ok(number_node(v.ceil(), u))
}

fn floor(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let (v, u) = as_number(&args[0], &loc)?;
    Ok(number_node(v.floor(), u))
}

fn round(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let (v, u) = as_number(&args[0], &loc)?;
    Ok(number_node(v.round(), u))
}

fn min(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let mut best = as_number(&args[0], &loc)?;
    for a in &args[1..] {
        let (v, u) = as_number(a, &loc)?;
        if v < best.0 {
            best = (v, u);
        }
    }
    Ok(number_node(best.0, best.1))
}

fn max(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let mut best = as_number(&args[0], &loc)?;
    for a in &args[1..] {
        let (v, u) = as_number(a, &loc)?;
        if v > best.0 {
            best = (v, u);
        }
    }
    Ok(number_node(best.0, best.1))
}

fn length(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let count = match &args[0] {
        Node::Expression(e) => e.items.len(),
        Node::Value(v) => v.expressions.len(),
        _ => 1,
    };
    let _ = loc;
    Ok(number_node(count as f64, ""))
}

fn extract(args: &[Node], loc: Location) -> Result<Node, EvalError> {
    let (index, _) = as_number(&args[1], &loc)?;
    let index = index as usize;
    match &args[0] {
        Node::Expression(e) => e.items.get(index.wrapping_sub(1)).cloned().ok_or(EvalError::IncomparableOperands(loc)),
        Node::Value(v) => v.expressions.get(index.wrapping_sub(1)).cloned().ok_or(EvalError::IncomparableOperands(loc)),
        other => Ok(other.clone()),
    }
}

fn iscolor(args: &[Node], _loc: Location) -> Result<Node, EvalError> {
    Ok(keyword_node(if matches!(args[0], Node::Color(_)) { "true" } else { "false" }))
}

fn isnumber(args: &[Node], _loc: Location) -> Result<Node, EvalError> {
    Ok(keyword_node(if matches!(args[0], Node::Number(_)) { "true" } else { "false" }))
}

fn isstring(args: &[Node], _loc: Location) -> Result<Node, EvalError> {
    Ok(keyword_node(if matches!(args[0], Node::Quoted(_)) { "true" } else { "false" }))
}

fn iskeyword(args: &[Node], _loc: Location) -> Result<Node, EvalError> {
    Ok(keyword_node(if matches!(args[0], Node::Keyword(_)) { "true" } else { "false" }))
}

fn isurl(args: &[Node], _loc: Location) -> Result<Node, EvalError> {
    Ok(keyword_node(if matches!(args[0], Node::Url(_)) { "true" } else { "false" }))
}

fn ispixel(args: &[Node], _loc: Location) -> Result<Node, EvalError> {
    Ok(keyword_node(matches!(&args[0], Node::Number(n) if n.unit == "px").to_string()))
}

fn ispercentage(args: &[Node], _loc: Location) -> Result<Node, EvalError> {
    Ok(keyword_node(matches!(&args[0], Node::Number(n) if n.unit == "%").to_string()))
}

fn isem(args: &[Node], _loc: Location) -> Result<Node, EvalError> {
    Ok(keyword_node(matches!(&args[0], Node::Number(n) if n.unit == "em").to_string()))
}

/// Builds the default built-in function registry.
pub fn builtin_functions() -> std::collections::HashMap<UniCase<String>, Function> {
    let mut m: std::collections::HashMap<UniCase<String>, Function> = std::collections::HashMap::new();
    let mut add = |name: &str, f: Function| {
        m.insert(UniCase::new(name.to_string()), f);
    };
    add("lighten", lighten);
    add("darken", darken);
    add("saturate", saturate);
    add("desaturate", desaturate);
    add("fadein", fadein);
    add("fadeout", fadeout);
    add("fade", fade);
    add("spin", spin);
    add("mix", mix);
    add("rgb", rgb);
    add("rgba", rgba);
    add("hsl", hsl);
    add("hsla", hsla);
    add("argb", argb);
    add("e", e);
    add("escape", escape);
    add("replace", replace);
    add("%", format);
    add("percentage", percentage);
    add("ceil", ceil);
    add("floor", floor);
    add("round", round);
    add("min", min);
    add("max", max);
    add("length", length);
    add("extract", extract);
    add("iscolor", iscolor);
    add("isnumber", isnumber);
    add("isstring", isstring);
    add("iskeyword", iskeyword);
    add("isurl", isurl);
    add("ispixel", ispixel);
    add("ispercentage", ispercentage);
    add("isem", isem);
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Location;

    #[test]
    fn lighten_increases_lightness() {
        let base = color_node(color::parse_hex("#808080").unwrap());
        let amount = number_node(10.0, "%");
        let result = lighten(&[base, amount], Location::default()).unwrap();
        match result {
            Node::Color(c) => assert!(c.rgba.r > 128.0),
            _ => panic!("expected color"),
        }
    }

    #[test]
    fn replace_substitutes_first_match_by_default() {
        let subject = Node::Quoted(QuotedNode { data: NodeData::default(), quote: Some('"'), escaped: false, content: "one two one".to_string() });
        let pattern = Node::Quoted(QuotedNode { data: NodeData::default(), quote: Some('"'), escaped: false, content: "one".to_string() });
        let replacement = Node::Quoted(QuotedNode { data: NodeData::default(), quote: Some('"'), escaped: false, content: "1".to_string() });
        let result = replace(&[subject, pattern, replacement], Location::default()).unwrap();
        match result {
            Node::Quoted(q) => assert_eq!(q.content, "1 two one"),
            _ => panic!("expected quoted string"),
        }
    }

    #[test]
    fn replace_with_global_flag_replaces_every_match() {
        let subject = Node::Quoted(QuotedNode { data: NodeData::default(), quote: Some('"'), escaped: false, content: "one two one".to_string() });
        let pattern = Node::Quoted(QuotedNode { data: NodeData::default(), quote: Some('"'), escaped: false, content: "one".to_string() });
        let replacement = Node::Quoted(QuotedNode { data: NodeData::default(), quote: Some('"'), escaped: false, content: "1".to_string() });
        let flags = Node::Quoted(QuotedNode { data: NodeData::default(), quote: Some('"'), escaped: false, content: "g".to_string() });
        let result = replace(&[subject, pattern, replacement, flags], Location::default()).unwrap();
        match result {
            Node::Quoted(q) => assert_eq!(q.content, "1 two 1"),
            _ => panic!("expected quoted string"),
        }
    }

    #[test]
    fn format_substitutes_placeholders_in_order() {
        let template = Node::Quoted(QuotedNode { data: NodeData::default(), quote: Some('"'), escaped: false, content: "hello, %s!".to_string() });
        let name = Node::Quoted(QuotedNode { data: NodeData::default(), quote: Some('"'), escaped: false, content: "world".to_string() });
        let result = format(&[template, name], Location::default()).unwrap();
        match result {
            Node::Quoted(q) => assert_eq!(q.content, "hello, world!"),
            _ => panic!("expected quoted string"),
        }
    }

    #[test]
    fn percentage_scales_by_100() {
        let n = number_node(0.5, "");
        let result = percentage(&[n], Location::default()).unwrap();
        match result {
            Node::Number(n) => {
                assert_eq!(n.value, 50.0);
                assert_eq!(n.unit, "%");
            }
            _ => panic!("expected number"),
        }
    }
}
