//! CSS rendering (spec.md §4.5).
//!
//! [`render`] walks the evaluated tree once and writes final CSS text. The
//! one non-local piece of this pass is selector flattening: a nested
//! `Ruleset` does not carry its ancestors' selectors, so `render_block`
//! threads the combined selector list for whichever block is "current" down
//! through every recursive call, combining it with each nested ruleset's own
//! selectors (substituting `&` where present, otherwise joining with a
//! descendant space) before that nested block is rendered.
//!
//! `@media` bubbles by design, not by a special case: it is handed the same
//! combined selector list its enclosing block already carries, so a `@media`
//! nested inside a selector wraps that selector rather than losing it.

use crate::ast::*;
use crate::color;
use crate::emit::Output;
use crate::eval::format_number;

/// Renders an evaluated, extend-resolved tree to CSS text.
pub fn render(body: &[Node], compress: bool, keep_comments: bool) -> String {
    let mut out = Output::new();
    render_block(body, &[], compress, keep_comments, &mut out);
    out.finish()
}

/// Writes a node in value position (a rule's value, a call argument, a
/// media feature, ...). Container/statement nodes (`Ruleset`, `Media`, ...)
/// never appear here in a well-formed evaluated tree; their arms are no-ops.
pub trait AppendCss {
    /// Appends this node's CSS rendering to `out`.
    fn append_css(&self, out: &mut Output, compress: bool);
}

impl AppendCss for Node {
    fn append_css(&self, out: &mut Output, compress: bool) {
        match self {
            Node::Text(t) => out.append_str(&t.value),
            Node::Keyword(k) => out.append_str(&k.value),
            Node::Number(n) => {
                out.append_str(&format_number(n.value));
                out.append_str(&n.unit);
            }
            Node::Color(c) => out.append_str(&color::format_css(c.rgba, compress)),
            Node::Quoted(q) => {
                if q.escaped {
                    out.append_str(&q.content);
                } else {
                    let quote = q.quote.unwrap_or('"');
                    out.append_char(quote);
                    out.append_str(&q.content);
                    out.append_char(quote);
                }
            }
            // Unreachable after evaluation (every `Variable` is resolved);
            // rendered verbatim rather than panicking, for robustness.
            Node::Variable(v) => out.append_str(&v.name),
            Node::Url(u) => {
                out.append_str("url(");
                u.inner.append_css(out, compress);
                out.append_char(')');
            }
            // `evaluate` turns every `Script` into a `Text` placeholder; this
            // arm only runs if one somehow reaches emission unevaluated.
            Node::Script(s) => out.append_str(&s.raw),
            Node::Call(c) => {
                out.append_str(&c.name);
                out.append_char('(');
                let sep = if compress { "," } else { ", " };
                out.append_many(&c.args, sep, |out, a| a.append_css(out, compress));
                out.append_char(')');
            }
            Node::Assignment(a) => {
                out.append_str(&a.key);
                out.append_char('=');
                a.value.append_css(out, compress);
            }
            // Reachable when `strict_math` leaves an un-parenthesized
            // operation unfolded (spec.md §9): rendered as written rather
            // than computed.
            Node::Operation(op) => {
                op.left.append_css(out, compress);
                if !compress {
                    out.append_char(' ');
                }
                out.append_char(match op.op {
                    ArithOp::Add => '+',
                    ArithOp::Sub => '-',
                    ArithOp::Mul => '*',
                    ArithOp::Div => '/',
                });
                if !compress {
                    out.append_char(' ');
                }
                op.right.append_css(out, compress);
            }
            // Folded into a `true`/`false` `Keyword` by `evaluate`.
            Node::Condition(_) => {}
            Node::Expression(e) => {
                out.append_many(&e.items, " ", |out, item| item.append_css(out, compress));
            }
            Node::Value(v) => {
                let sep = if v.merge.is_empty() {
                    if compress { "," } else { ", " }
                } else {
                    v.merge.as_str()
                };
                out.append_many(&v.expressions, sep, |out, e| e.append_css(out, compress));
                if !v.important.is_empty() {
                    if !compress {
                        out.append_char(' ');
                    }
                    out.append_str(&v.important);
                }
            }
            Node::Selector(s) => out.append_str(&selector_text(s, compress)),
            Node::Element(e) => render_element_value(&e.value, out, compress),
            Node::Attribute(a) => render_attribute(a, out),
            Node::Paren(p) => p.inner.append_css(out, compress),
            Node::Shorthand(s) => {
                s.a.append_css(out, compress);
                out.append_char('/');
                s.b.append_css(out, compress);
            }
            // Statement-level container nodes never appear in value position
            // in a correctly evaluated tree.
            Node::Rule(_)
            | Node::Ruleset(_)
            | Node::GuardedRuleset(_)
            | Node::MixinDefinition(_)
            | Node::MixinCall(_)
            | Node::Import(_)
            | Node::Media(_)
            | Node::Directive(_)
            | Node::KeyFrame(_)
            | Node::Extend(_) => {}
        }
    }
}

fn render_element_value(value: &Node, out: &mut Output, compress: bool) {
    match value {
        Node::Attribute(a) => render_attribute(a, out),
        other => other.append_css(out, compress),
    }
}

fn render_attribute(a: &AttributeNode, out: &mut Output) {
    out.append_char('[');
    out.append_str(&a.key);
    if let Some(op) = a.op {
        out.append_str(op.symbol());
        if let Some(value) = &a.value {
            out.append_str(value);
        }
    }
    out.append_char(']');
}

/// Renders one selector alternative's own elements, with no ancestor
/// combination applied.
fn selector_text(sel: &SelectorNode, compress: bool) -> String {
    let mut out = Output::new();
    for (i, el) in sel.elements.iter().enumerate() {
        if i == 0 {
            if !matches!(el.combinator, Combinator::Descendant) {
                out.append_str(el.combinator.symbol());
                if !compress {
                    out.append_char(' ');
                }
            }
        } else {
            match el.combinator {
                Combinator::Descendant => out.append_char(' '),
                other => {
                    if compress {
                        out.append_str(other.symbol());
                    } else {
                        out.append_char(' ');
                        out.append_str(other.symbol());
                        out.append_char(' ');
                    }
                }
            }
        }
        render_element_value(&el.value, &mut out, compress);
    }
    out.finish()
}

/// Combines one ancestor selector string with one child selector: `&`
/// anywhere in the child is replaced by the ancestor text verbatim;
/// otherwise the ancestor is prepended with a descendant combinator.
fn combine_selector(ancestor: &str, sel: &SelectorNode, compress: bool) -> String {
    let own = selector_text(sel, compress);
    if own.contains('&') {
        own.replace('&', ancestor)
    } else if ancestor.is_empty() {
        own
    } else {
        format!("{ancestor} {own}")
    }
}

/// Cross-product of every ancestor alternative with every selector
/// alternative declared on this ruleset, de-duplicated in encounter order.
fn combine_all(ancestors: &[String], selectors: &[SelectorNode], compress: bool) -> Vec<String> {
    if ancestors.is_empty() {
        return selectors.iter().map(|s| selector_text(s, compress)).collect();
    }
    let mut out = Vec::new();
    for ancestor in ancestors {
        for sel in selectors {
            let combined = combine_selector(ancestor, sel, compress);
            if !out.contains(&combined) {
                out.push(combined);
            }
        }
    }
    out
}

/// Writes the `pre_comments` attached to a node's header, skipping `//`
/// comments (never CSS-valid) and ordinary `/* */` comments when compressing
/// or when `keep_comments` is off — `is_special` (`/**`, `/*!`) comments
/// survive both.
fn render_comments(comments: &[Comment], compress: bool, keep_comments: bool, out: &mut Output) {
    for c in comments {
        if !c.is_css_valid {
            continue;
        }
        if !c.is_special && (compress || !keep_comments) {
            continue;
        }
        out.append_str(&c.text);
        if !compress {
            out.append_char('\n');
        }
    }
}

/// Renders `nodes` as the body of a block whose applicable selector(s) are
/// `current_selectors` (empty at the document root). Own `Rule`/`Text`
/// children are collected and rendered as one block; nested containers
/// recurse, combining `current_selectors` with their own selectors first.
fn render_block(nodes: &[Node], current_selectors: &[String], compress: bool, keep_comments: bool, out: &mut Output) {
    let mut own_rules: Vec<&RuleNode> = Vec::new();
    for node in nodes {
        if node.data().is_reference {
            continue;
        }
        match node {
            Node::Rule(r) if !r.is_variable => own_rules.push(r),
            Node::Text(t) => {
                out.append_str(&t.value);
                if !compress {
                    out.append_char('\n');
                }
            }
            _ => {}
        }
    }
    if !own_rules.is_empty() {
        render_own_block(current_selectors, &own_rules, compress, keep_comments, out);
    }
    for node in nodes {
        if node.data().is_reference {
            continue;
        }
        match node {
            Node::Ruleset(rs) => {
                render_comments(&rs.data.pre_comments, compress, keep_comments, out);
                let combined = combine_all(current_selectors, &rs.selectors, compress);
                render_block(&rs.rules, &combined, compress, keep_comments, out);
            }
            Node::Media(m) => render_media(m, current_selectors, compress, keep_comments, out),
            Node::Directive(d) => render_directive(d, compress, keep_comments, out),
            Node::KeyFrame(k) => render_keyframe(k, compress, keep_comments, out),
            _ => {}
        }
    }
}

/// Renders the selector header + declaration list for one flattened block.
/// When `selectors` is empty (declarations with no enclosing selector — not
/// valid CSS but possible from malformed input) the declarations are
/// written bare rather than silently dropped.
fn render_own_block(selectors: &[String], rules: &[&RuleNode], compress: bool, keep_comments: bool, out: &mut Output) {
    if selectors.is_empty() {
        for rule in rules {
            render_comments(&rule.data.pre_comments, compress, keep_comments, out);
            render_rule(rule, compress, out);
            if !compress {
                out.append_char('\n');
            }
        }
        return;
    }
    let sep = if compress { "," } else { ",\n" };
    out.append_many(selectors, sep, |out, s| out.append_str(s));
    if compress {
        out.append_char('{');
    } else {
        out.append_str(" {\n");
    }
    for rule in rules {
        if !compress {
            out.append_str("  ");
        }
        render_comments(&rule.data.pre_comments, compress, keep_comments, out);
        render_rule(rule, compress, out);
        render_comments(&rule.data.post_comments, compress, keep_comments, out);
        if !compress {
            out.append_char('\n');
        }
    }
    if compress {
        out.trim_right(Some(';'));
        out.append_char('}');
    } else {
        out.append_str("}\n");
    }
}

fn render_rule(rule: &RuleNode, compress: bool, out: &mut Output) {
    out.append_str(&rule.name);
    if compress {
        out.append_char(':');
    } else {
        out.append_str(": ");
    }
    rule.value.append_css(out, compress);
    out.append_char(';');
}

fn render_media(m: &MediaNode, current_selectors: &[String], compress: bool, keep_comments: bool, out: &mut Output) {
    render_comments(&m.data.pre_comments, compress, keep_comments, out);
    out.append_str("@media");
    if !compress {
        out.append_char(' ');
    }
    let sep = if compress { "," } else { ", " };
    out.append_many(&m.features, sep, |out, f| f.append_css(out, compress));
    if compress {
        out.append_char('{');
    } else {
        out.append_str(" {\n");
    }
    render_block(&m.rules, current_selectors, compress, keep_comments, out);
    out.append_char('}');
    if !compress {
        out.append_char('\n');
    }
}

fn render_directive(d: &DirectiveNode, compress: bool, keep_comments: bool, out: &mut Output) {
    render_comments(&d.data.pre_comments, compress, keep_comments, out);
    out.append_str(&d.name);
    if let Some(id) = &d.identifier {
        out.append_char(' ');
        out.append_str(id);
    }
    if let Some(value) = &d.value {
        out.append_char(' ');
        value.append_css(out, compress);
        out.append_char(';');
        if !compress {
            out.append_char('\n');
        }
        return;
    }
    match &d.rules {
        Some(rules) => {
            if compress {
                out.append_char('{');
            } else {
                out.append_str(" {\n");
            }
            // A directive's own body has no selector scope of its own
            // (`@font-face`, `@page`): declarations sit directly inside it,
            // and anything else nested resets to an empty ancestor chain.
            render_block(rules, &[], compress, keep_comments, out);
            if compress {
                out.trim_right(Some(';'));
                out.append_char('}');
            } else {
                out.append_str("}\n");
            }
        }
        None => {
            out.append_char(';');
            if !compress {
                out.append_char('\n');
            }
        }
    }
}

fn render_keyframe(k: &KeyFrameNode, compress: bool, keep_comments: bool, out: &mut Output) {
    render_comments(&k.data.pre_comments, compress, keep_comments, out);
    out.append_str("@keyframes ");
    out.append_str(&k.name);
    if compress {
        out.append_char('{');
    } else {
        out.append_str(" {\n");
    }
    for (selectors, rules) in &k.frames {
        let sep = if compress { "," } else { ", " };
        let mut header = Output::new();
        header.append_many(selectors, sep, |out, s| s.append_css(out, compress));
        render_block(rules, &[header.finish()], compress, keep_comments, out);
    }
    if compress {
        out.append_char('}');
    } else {
        out.append_str("}\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str) -> SelectorNode {
        SelectorNode {
            data: NodeData::default(),
            elements: vec![ElementNode { data: NodeData::default(), combinator: Combinator::Descendant, value: Box::new(Node::keyword(name)) }],
            extends: vec![],
        }
    }

    fn color_rule(name: &str, value: Node) -> Node {
        Node::Rule(RuleNode {
            data: NodeData::default(),
            name: name.to_string(),
            value: Box::new(Node::Value(ValueNode { data: NodeData::default(), expressions: vec![Node::Expression(ExpressionNode { data: NodeData::default(), items: vec![value] })], important: String::new(), merge: String::new() })),
            is_variable: false,
            interpolated_name: false,
        })
    }

    #[test]
    fn renders_flat_ruleset() {
        let tree = vec![Node::Ruleset(RulesetNode {
            data: NodeData::default(),
            selectors: vec![class(".a")],
            rules: vec![color_rule("color", Node::keyword("red"))],
        })];
        let css = render(&tree, false, true);
        assert_eq!(css, ".a {\n  color: red;\n}\n");
    }

    #[test]
    fn flattens_nested_ruleset_with_ampersand() {
        let inner = Node::Ruleset(RulesetNode {
            data: NodeData::default(),
            selectors: vec![SelectorNode {
                data: NodeData::default(),
                elements: vec![ElementNode { data: NodeData::default(), combinator: Combinator::Descendant, value: Box::new(Node::keyword("&:hover")) }],
                extends: vec![],
            }],
            rules: vec![color_rule("color", Node::keyword("blue"))],
        });
        let tree = vec![Node::Ruleset(RulesetNode { data: NodeData::default(), selectors: vec![class(".a")], rules: vec![inner] })];
        let css = render(&tree, false, true);
        assert!(css.contains(".a:hover {"));
    }

    #[test]
    fn compress_drops_whitespace_and_trailing_semicolon() {
        let tree = vec![Node::Ruleset(RulesetNode {
            data: NodeData::default(),
            selectors: vec![class(".a")],
            rules: vec![color_rule("color", Node::keyword("red"))],
        })];
        let css = render(&tree, true, true);
        assert_eq!(css, ".a{color:red}");
    }

    #[test]
    fn important_spacing_matches_compress_mode() {
        let value = Node::Value(ValueNode {
            data: NodeData::default(),
            expressions: vec![Node::Expression(ExpressionNode { data: NodeData::default(), items: vec![Node::keyword("red")] })],
            important: "!important".to_string(),
            merge: String::new(),
        });
        let mut out = Output::new();
        value.append_css(&mut out, false);
        insta::assert_snapshot!(out.finish(), @"red !important");

        let mut out = Output::new();
        value.append_css(&mut out, true);
        insta::assert_snapshot!(out.finish(), @"red!important");
    }

    #[test]
    fn is_reference_node_is_skipped() {
        let mut rs = RulesetNode { data: NodeData::default(), selectors: vec![class(".a")], rules: vec![color_rule("color", Node::keyword("red"))] };
        rs.data.is_reference = true;
        let css = render(&[Node::Ruleset(rs)], false, true);
        assert_eq!(css, "");
    }
}
