//! The recursive-descent parser (spec.md §4.3).
//!
//! Productions are implemented as methods on [`Cursor`], each responsible
//! for its own backtracking: on failure a production restores the
//! tokenizer to the mark it started at and returns `Ok(None)` (for
//! productions that are genuinely optional at the call site) or an
//! `Err` (for a production the grammar requires once its first token has
//! committed). Disambiguation between rule/ruleset/mixin-call/mixin-definition
//! follows a fixed precedence: mixin definition (its trailing `{` is found by
//! scanning past the argument list), `@`-directive, rule, mixin call,
//! ruleset.

use crate::ast::*;
use crate::chunk;
use crate::config::Config;
use crate::error::{Location, ParseError, ParsingError};
use crate::token::{MatchUntilOptions, Tokenizer};
use regex::Regex;
use std::sync::LazyLock;

/// Page-margin-box at-rules recognized inside a parsed `@page { ... }` body.
const PAGE_MARGIN_BOXES: &[&str] = &[
    "@top-left-corner",
    "@top-left",
    "@top-center",
    "@top-right-corner",
    "@top-right",
    "@bottom-left-corner",
    "@bottom-left",
    "@bottom-center",
    "@bottom-right-corner",
    "@bottom-right",
    "@left-top",
    "@left-middle",
    "@left-bottom",
    "@right-top",
    "@right-middle",
    "@right-bottom",
];

/// Parses a full stylesheet body (top-level statements).
pub fn parse(source: &str, file: Option<&str>, config: &Config) -> Result<Vec<Node>, ParsingError> {
    let (normalized, chunks) = chunk::chunk(source, config.optimization, file)?;
    let mut cursor = Cursor { t: Tokenizer::new(&normalized, &chunks, file), paren_depth: 0 };
    let body = cursor.parse_block_body(false)?;
    if !cursor.t.eof() {
        return Err(ParseError::Expected { expected: "end of input".into(), location: cursor.loc() }.into());
    }
    Ok(body)
}

struct Cursor<'s> {
    t: Tokenizer<'s>,
    /// Depth of explicit `(...)` nesting the cursor is currently inside,
    /// while parsing a value expression — tracked so an `Operation` node
    /// built at depth 0 can record that `strict_math` would leave it unfolded
    /// (spec.md §9).
    paren_depth: usize,
}

impl<'s> Cursor<'s> {
    fn loc(&self) -> Location {
        Location::new(self.t.get_node_location(), self.t.file())
    }

    fn expected(&self, what: &str) -> ParseError {
        ParseError::Expected { expected: what.to_string(), location: self.loc() }
    }

    /// Consumes a run of comments at the cursor, classifying each.
    fn take_comments(&mut self, pre_selector: bool) -> Vec<Comment> {
        let mut out = Vec::new();
        loop {
            self.t.consume_whitespace();
            let Some(text) = self.t.get_comment() else { break };
            out.push(Comment::classify(text, pre_selector));
        }
        out
    }

    /// Parses every statement until `}` (when `nested`) or EOF.
    fn parse_block_body(&mut self, nested: bool) -> Result<Vec<Node>, ParseError> {
        let mut body = Vec::new();
        loop {
            let pre_comments = self.take_comments(true);
            if self.t.eof() || (nested && self.t.peek('}')) {
                if !pre_comments.is_empty() {
                    if let Some(last) = body.last_mut() {
                        last.data_mut().post_comments.extend(pre_comments);
                    }
                }
                break;
            }
            let mut node = self.parse_statement()?;
            node.data_mut().pre_comments = pre_comments;
            body.push(node);
        }
        Ok(body)
    }

    fn parse_statement(&mut self) -> Result<Node, ParseError> {
        if let Some(node) = self.try_mixin_definition()? {
            return Ok(node);
        }
        if self.t.peek('@') {
            if let Some(node) = self.try_directive()? {
                return Ok(node);
            }
            if let Some(node) = self.try_rule()? {
                return Ok(node);
            }
            let mark = self.t.remember();
            let name = self.t.match_keyword(true, false).map(str::to_string).unwrap_or_default();
            self.t.recall(mark);
            return Err(ParseError::DirectiveUnknown(name, self.loc()));
        }
        if let Some(node) = self.try_rule()? {
            return Ok(node);
        }
        if let Some(node) = self.try_mixin_call()? {
            return Ok(node);
        }
        if let Some(node) = self.try_ruleset()? {
            return Ok(node);
        }
        Err(self.expected("rule, mixin call, or ruleset"))
    }

    // --- rules --------------------------------------------------------

    fn try_rule(&mut self) -> Result<Option<Node>, ParseError> {
        let mark = self.t.remember();
        let loc = self.loc();
        let (name, interpolated_name) = match self.parse_rule_name() {
            Some(n) => n,
            None => {
                self.t.recall(mark);
                return Ok(None);
            }
        };
        if !self.t.match_char(':') {
            self.t.recall(mark);
            return Ok(None);
        }
        let base_name = name.strip_suffix("+_").or_else(|| name.strip_suffix('+')).unwrap_or(&name);
        let parse_fn: fn(&mut Self) -> Result<Node, ParseError> = if base_name.eq_ignore_ascii_case("font") {
            Self::parse_font_value
        } else if base_name.eq_ignore_ascii_case("filter") {
            Self::parse_filter_value
        } else {
            Self::parse_value
        };
        let Ok(mut value) = parse_fn(self) else {
            self.t.recall(mark);
            return Ok(None);
        };
        // A rule must end at `;` or the enclosing block's `}`; if what
        // follows is `{` instead, this was actually a selector (`a:hover {`)
        // and we must backtrack to let ruleset parsing take over.
        if self.t.peek('{') {
            self.t.recall(mark);
            return Ok(None);
        }
        self.t.match_char(';');
        // A trailing `+`/`+_` on the property name sets the value's merge
        // separator instead of being part of the name (spec.md §4.3).
        let name = if let Some(base) = name.strip_suffix("+_") {
            if let Node::Value(v) = &mut value {
                v.merge = " ".to_string();
            }
            base.to_string()
        } else if let Some(base) = name.strip_suffix('+') {
            if let Node::Value(v) = &mut value {
                v.merge = ", ".to_string();
            }
            base.to_string()
        } else {
            name
        };
        let is_variable = RuleNode::is_variable(&name);
        Ok(Some(Node::Rule(RuleNode {
            data: NodeData::at(loc),
            name,
            value: Box::new(value),
            is_variable,
            interpolated_name,
        })))
    }

    fn parse_rule_name(&mut self) -> Option<(String, bool)> {
        let mark = self.t.remember();
        if self.t.match_char('@') {
            if self.t.peek('{') {
                let interp = self.parse_interpolation_braces()?;
                return Some((format!("@{{{interp}}}"), true));
            }
            // Not `@{...}` interpolation after all — restore the `@` so the
            // ordinary `@name` keyword match below sees it.
            self.t.recall(mark);
        }
        if let Some(name) = self.t.match_keyword(false, false) {
            let mut name = name.to_string();
            if self.t.match_char('+') {
                name.push('+');
                if self.t.match_char('_') {
                    name.push('_');
                }
            }
            return Some((name, false));
        }
        None
    }

    /// Parses the inside of a `@{name}` interpolation marker, having already
    /// consumed the `@`; `{` is still to come.
    fn parse_interpolation_braces(&mut self) -> Option<String> {
        if !self.t.match_char('{') {
            return None;
        }
        let name = self.t.match_keyword(false, false)?.to_string();
        if !self.t.match_char('}') {
            return None;
        }
        Some(name)
    }

    // --- values / expressions / operations -----------------------------

    fn parse_value(&mut self) -> Result<Node, ParseError> {
        let loc = self.loc();
        let mut expressions = vec![self.parse_expression()?];
        while self.t.match_char(',') {
            expressions.push(self.parse_expression()?);
        }
        let important = self.parse_important();
        Ok(Node::Value(ValueNode { data: NodeData::at(loc), expressions, important, merge: String::new() }))
    }

    /// `font`'s specialized value parser (spec.md §4.3).
    fn parse_font_value(&mut self) -> Result<Node, ParseError> {
        let loc = self.loc();
        let mut expressions = vec![self.parse_font_expression()?];
        while self.t.match_char(',') {
            expressions.push(self.parse_font_expression()?);
        }
        let important = self.parse_important();
        Ok(Node::Value(ValueNode { data: NodeData::at(loc), expressions, important, merge: String::new() }))
    }

    /// One space-separated run of `font` value terms. A bare `/` directly
    /// between two entities is the size/line-height shorthand (`small/12px`),
    /// kept as a literal pair rather than parsed as division.
    fn parse_font_expression(&mut self) -> Result<Node, ParseError> {
        let loc = self.loc();
        let mut items = Vec::new();
        loop {
            self.take_comments(false);
            if self.t.eof() || self.t.peek(',') || self.t.peek(';') || self.t.peek('}') || self.t.peek(')') || self.t.peek('!') {
                break;
            }
            let Some(entity) = self.try_entity()? else { break };
            if self.t.match_char('/') {
                let Some(after) = self.try_entity()? else { return Err(self.expected("value after '/'")) };
                items.push(Node::Shorthand(ShorthandNode { data: NodeData::at(loc.clone()), a: Box::new(entity), b: Box::new(after) }));
            } else {
                items.push(entity);
            }
        }
        if items.is_empty() {
            return Err(self.expected("value"));
        }
        if items.len() == 1 {
            return Ok(items.into_iter().next().unwrap());
        }
        Ok(Node::Expression(ExpressionNode { data: NodeData::at(loc), items }))
    }

    /// `filter`'s specialized value parser (spec.md §4.3): the same
    /// space/comma structure as an ordinary value, but each call is checked
    /// against [`FILTER_FUNCTIONS`] and an unrecognized name is logged
    /// rather than parsed any differently (unknown CSS functions already
    /// pass through verbatim elsewhere).
    fn parse_filter_value(&mut self) -> Result<Node, ParseError> {
        let loc = self.loc();
        let mut expressions = vec![self.parse_filter_expression()?];
        while self.t.match_char(',') {
            expressions.push(self.parse_filter_expression()?);
        }
        let important = self.parse_important();
        Ok(Node::Value(ValueNode { data: NodeData::at(loc), expressions, important, merge: String::new() }))
    }

    fn parse_filter_expression(&mut self) -> Result<Node, ParseError> {
        let expr = self.parse_expression()?;
        self.warn_unrecognized_filters(&expr);
        Ok(expr)
    }

    fn warn_unrecognized_filters(&self, node: &Node) {
        match node {
            Node::Call(c) if !FILTER_FUNCTIONS.iter().any(|f| f.eq_ignore_ascii_case(&c.name)) => {
                log::warn!("'{}' is not a recognized CSS filter function", c.name);
            }
            Node::Expression(e) => e.items.iter().for_each(|n| self.warn_unrecognized_filters(n)),
            _ => {}
        }
    }

    fn parse_important(&mut self) -> String {
        let mark = self.t.remember();
        if self.t.match_char('!') {
            if self.t.match_exact_ci("important") {
                return "!important".to_string();
            }
            if self.t.match_exact_ci("default") {
                return "!default".to_string();
            }
            self.t.recall(mark);
        }
        String::new()
    }

    fn parse_expression(&mut self) -> Result<Node, ParseError> {
        let loc = self.loc();
        let mut items = Vec::new();
        loop {
            self.take_comments(false);
            if self.t.eof() || self.t.peek(',') || self.t.peek(';') || self.t.peek('}') || self.t.peek(')') || self.t.peek('!') {
                break;
            }
            let Some(term) = self.try_operation()? else { break };
            items.push(term);
        }
        if items.is_empty() {
            return Err(self.expected("value"));
        }
        if items.len() == 1 {
            return Ok(items.into_iter().next().unwrap());
        }
        Ok(Node::Expression(ExpressionNode { data: NodeData::at(loc), items }))
    }

    fn try_operation(&mut self) -> Result<Option<Node>, ParseError> {
        let Some(mut left) = self.try_multiplication()? else { return Ok(None) };
        loop {
            let loc = self.loc();
            let op = if self.t.match_char('+') {
                ArithOp::Add
            } else if self.t.match_char('-') {
                ArithOp::Sub
            } else {
                break;
            };
            let Some(right) = self.try_multiplication()? else { return Err(self.expected("operand")) };
            left = Node::Operation(OperationNode {
                data: NodeData::at(loc),
                op,
                left: Box::new(left),
                right: Box::new(right),
                in_parens: self.paren_depth > 0,
            });
        }
        Ok(Some(left))
    }

    fn try_multiplication(&mut self) -> Result<Option<Node>, ParseError> {
        let Some(mut left) = self.try_operand()? else { return Ok(None) };
        loop {
            let loc = self.loc();
            let op = if self.t.match_char('*') {
                ArithOp::Mul
            } else if self.t.match_char('/') {
                ArithOp::Div
            } else {
                break;
            };
            let Some(right) = self.try_operand()? else { return Err(self.expected("operand")) };
            left = Node::Operation(OperationNode {
                data: NodeData::at(loc),
                op,
                left: Box::new(left),
                right: Box::new(right),
                in_parens: self.paren_depth > 0,
            });
        }
        Ok(Some(left))
    }

    fn try_operand(&mut self) -> Result<Option<Node>, ParseError> {
        let loc = self.loc();
        if self.t.match_char('-') {
            let Some(inner) = self.try_operand()? else { return Err(self.expected("operand after unary minus")) };
            // Unary minus is sign syntax, not a binary operator strict_math
            // gates — always folds.
            return Ok(Some(Node::Operation(OperationNode {
                data: NodeData::at(loc),
                op: ArithOp::Sub,
                left: Box::new(Node::Number(NumberNode { data: NodeData::default(), value: 0.0, unit: String::new() })),
                right: Box::new(inner),
                in_parens: true,
            })));
        }
        if self.t.match_char('(') {
            self.paren_depth += 1;
            let inner = self.parse_expression_or_operation();
            self.paren_depth -= 1;
            let inner = inner?;
            if !self.t.match_char(')') {
                return Err(self.expected("')'"));
            }
            return Ok(Some(Node::Paren(ParenNode { data: NodeData::at(loc), inner: Box::new(inner) })));
        }
        self.try_entity()
    }

    fn parse_expression_or_operation(&mut self) -> Result<Node, ParseError> {
        if let Some(node) = self.try_operation()? {
            return Ok(node);
        }
        self.parse_expression()
    }

    fn try_entity(&mut self) -> Result<Option<Node>, ParseError> {
        let loc = self.loc();
        if let Some(text) = self.t.get_quoted_string() {
            return Ok(Some(self.make_quoted(text, loc)));
        }
        if self.t.match_char('~') {
            let text = self.t.get_quoted_string().ok_or_else(|| self.expected("quoted string after '~'"))?;
            let mut node = self.make_quoted(text, loc);
            if let Node::Quoted(q) = &mut node {
                q.escaped = true;
            }
            return Ok(Some(node));
        }
        if let Some(hex) = self.try_hex_color() {
            return Ok(Some(hex));
        }
        if let Some(dim) = self.parse_dimension() {
            return Ok(Some(Node::Number(NumberNode { data: NodeData::at(loc), value: dim.0, unit: dim.1 })));
        }
        if let Some(range) = self.try_unicode_range() {
            return Ok(Some(Node::Text(TextNode { data: NodeData::at(loc), value: range })));
        }
        if self.t.peek_str("url(") || self.t.peek_str("url (") {
            return Ok(Some(self.parse_url(loc)?));
        }
        if self.t.match_char('@') {
            if self.t.match_char('@') {
                let name = self.t.match_keyword(false, false).ok_or_else(|| self.expected("variable name"))?;
                return Ok(Some(Node::Variable(VariableNode { data: NodeData::at(loc), name: format!("@@{name}") })));
            }
            let name = self.t.match_keyword(false, false).ok_or_else(|| self.expected("variable name"))?;
            return Ok(Some(Node::Variable(VariableNode { data: NodeData::at(loc), name: format!("@{name}") })));
        }
        if let Some(name) = self.t.match_keyword(false, false) {
            let name = name.to_string();
            if self.t.match_char('(') {
                return Ok(Some(self.parse_call_rest(name, loc)?));
            }
            return Ok(Some(Node::Keyword(Keyword { data: NodeData::at(loc), value: name })));
        }
        Ok(None)
    }

    fn make_quoted(&self, raw: &str, loc: Location) -> Node {
        let (quote, content) = match raw.chars().next() {
            Some(q @ ('"' | '\'')) => (Some(q), raw[1..raw.len() - 1].to_string()),
            _ => (None, raw.to_string()),
        };
        Node::Quoted(QuotedNode { data: NodeData::at(loc), quote, escaped: false, content })
    }

    fn try_hex_color(&mut self) -> Option<Node> {
        static HEX_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new("^[0-9A-Fa-f]{3,8}").unwrap());

        let loc = self.loc();
        let mark = self.t.remember();
        if !self.t.match_char('#') {
            return None;
        }
        let Some(digits) = self.t.match_regex(&HEX_RUN) else {
            self.t.recall(mark);
            return None;
        };
        if !matches!(digits.len(), 3 | 4 | 6 | 8) {
            self.t.recall(mark);
            return None;
        }
        let text = format!("#{digits}");
        let Some(rgba) = crate::color::parse_hex(&text) else {
            self.t.recall(mark);
            return None;
        };
        Some(Node::Color(ColorNode { data: NodeData::at(loc), rgba }))
    }

    /// Matches a `@font-face` `unicode-range` descriptor: `U+25`, `U+0025-00FF`,
    /// or `U+4??` (wildcard low nibbles). Carried through to emission
    /// verbatim; no arithmetic is defined over it.
    fn try_unicode_range(&mut self) -> Option<String> {
        static UNICODE_RANGE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(?i)^U\+[0-9A-F?]{1,6}(-[0-9A-F]{1,6})?").unwrap());

        let mark = self.t.remember();
        let Some(text) = self.t.match_regex(&UNICODE_RANGE) else {
            self.t.recall(mark);
            return None;
        };
        Some(text.to_string())
    }

    /// Scans a number then, with no intervening whitespace allowed, tries
    /// each [`RECOGNIZED_UNITS`] entry longest-first so `"2in"` matches `in`
    /// rather than stopping short, and `"2emx"` matches neither (the `em`
    /// attempt is rejected because what follows is still an identifier
    /// character).
    fn parse_dimension(&mut self) -> Option<(f64, String)> {
        let mark = self.t.remember();
        let Some(text) = self.t.match_number(true, false) else {
            self.t.recall(mark);
            return None;
        };
        let Ok(value) = text.parse::<f64>() else {
            self.t.recall(mark);
            return None;
        };
        let unit = self.match_unit();
        Some((value, unit))
    }

    /// Tries every recognized unit, longest first, rejecting a match that is
    /// merely a prefix of a longer identifier.
    fn match_unit(&mut self) -> String {
        let mut units: Vec<&str> = RECOGNIZED_UNITS.to_vec();
        units.sort_by_key(|u| std::cmp::Reverse(u.len()));
        for u in units {
            let mark = self.t.remember();
            if self.t.match_exact_ci(u) {
                let boundary = self.t.peek_char(0).map_or(true, |c| !(c.is_alphanumeric() || c == '_' || c == '-'));
                if boundary {
                    return u.to_string();
                }
            }
            self.t.recall(mark);
        }
        String::new()
    }

    fn parse_url(&mut self, loc: Location) -> Result<Node, ParseError> {
        self.t.match_keyword(false, false);
        if !self.t.match_char('(') {
            return Err(self.expected("'(' after url"));
        }
        let inner = if let Some(text) = self.t.get_quoted_string() {
            self.make_quoted(text, self.loc())
        } else if self.t.match_char('@') {
            let name = self.t.match_keyword(false, false).ok_or_else(|| self.expected("variable name"))?;
            Node::Variable(VariableNode { data: NodeData::default(), name: format!("@{name}") })
        } else {
            let text = self
                .t
                .match_until(')', MatchUntilOptions { include_delimiter: false, last_instance: false })
                .ok_or_else(|| self.expected("url contents"))?;
            Node::Text(TextNode { data: NodeData::default(), value: text.trim().to_string() })
        };
        if !self.t.match_char(')') {
            return Err(self.expected("')'"));
        }
        Ok(Node::Url(UrlNode { data: NodeData::at(loc), inner: Box::new(inner) }))
    }

    fn parse_call_rest(&mut self, name: String, loc: Location) -> Result<Node, ParseError> {
        let mut args = Vec::new();
        if !self.t.peek(')') {
            loop {
                args.push(self.parse_call_arg()?);
                if !self.t.match_char(',') && !self.t.match_char(';') {
                    break;
                }
            }
        }
        if !self.t.match_char(')') {
            return Err(self.expected("')'"));
        }
        Ok(Node::Call(CallNode { data: NodeData::at(loc), name, args }))
    }

    fn parse_call_arg(&mut self) -> Result<Node, ParseError> {
        let loc = self.loc();
        let mark = self.t.remember();
        if self.t.match_char('@') {
            if let Some(name) = self.t.match_keyword(false, false) {
                let name = name.to_string();
                if self.t.match_char(':') {
                    let value = self.parse_expression()?;
                    return Ok(Node::Assignment(AssignmentNode { data: NodeData::at(loc), key: name, value: Box::new(value) }));
                }
            }
            self.t.recall(mark);
        }
        if let Some(name) = self.t.match_keyword(false, false) {
            if self.t.match_char('=') {
                let value = self.parse_expression()?;
                return Ok(Node::Assignment(AssignmentNode { data: NodeData::at(loc), key: name.to_string(), value: Box::new(value) }));
            }
            self.t.recall(mark);
        }
        self.parse_expression()
    }

    // --- selectors ------------------------------------------------------

    fn try_ruleset(&mut self) -> Result<Option<Node>, ParseError> {
        let mark = self.t.remember();
        let loc = self.loc();
        let Some(selectors) = self.try_parse_selector_list() else {
            self.t.recall(mark);
            return Ok(None);
        };
        if self.t.match_exact_ci("when") {
            let guard = self.parse_guard()?;
            if !self.t.match_char('{') {
                return Err(self.expected("'{'"));
            }
            let rules = self.parse_block_body(true)?;
            if !self.t.match_char('}') {
                return Err(self.expected("'}'"));
            }
            return Ok(Some(Node::GuardedRuleset(GuardedRulesetNode {
                data: NodeData::at(loc),
                selectors,
                rules,
                guard: Box::new(guard),
            })));
        }
        if !self.t.match_char('{') {
            self.t.recall(mark);
            return Ok(None);
        }
        let rules = self.parse_block_body(true)?;
        if !self.t.match_char('}') {
            return Err(self.expected("'}'"));
        }
        Ok(Some(Node::Ruleset(RulesetNode { data: NodeData::at(loc), selectors, rules })))
    }

    fn try_parse_selector_list(&mut self) -> Option<Vec<SelectorNode>> {
        let mut out = vec![self.parse_selector()?];
        while self.t.match_char(',') {
            out.push(self.parse_selector()?);
        }
        Some(out)
    }

    fn parse_selector(&mut self) -> Option<SelectorNode> {
        let loc = self.loc();
        let mut elements = Vec::new();
        let mut extends = Vec::new();
        loop {
            self.take_comments(true);
            if let Some(extend) = self.try_parse_extend() {
                extends.push(extend);
                continue;
            }
            let Some(element) = self.try_parse_element(elements.is_empty()) else { break };
            elements.push(element);
        }
        if elements.is_empty() && extends.is_empty() {
            return None;
        }
        Some(SelectorNode { data: NodeData::at(loc), elements, extends })
    }

    /// Parses one combinator + compound simple-selector run (`.a.b:hover`
    /// is one [`ElementNode`]; the space in `.a .b` starts a second one).
    /// Returns `None` when nothing starts a new element here — no explicit
    /// combinator and no preceding whitespace — which means the caller has
    /// reached the end of the selector, not a parse failure.
    fn try_parse_element(&mut self, first: bool) -> Option<ElementNode> {
        let loc = self.loc();
        let combinator = if self.t.match_char('>') {
            Combinator::Child
        } else if self.t.match_char('+') {
            Combinator::AdjacentSibling
        } else if self.t.match_char('~') {
            Combinator::GeneralSibling
        } else if first || self.t.had_trailing_whitespace() {
            Combinator::Descendant
        } else {
            return None;
        };
        let mut pieces = vec![self.try_parse_simple_selector()?];
        while !self.t.had_trailing_whitespace() {
            let mark = self.t.remember();
            match self.try_parse_simple_selector() {
                Some(piece) => pieces.push(piece),
                None => {
                    self.t.recall(mark);
                    break;
                }
            }
        }
        let value = Self::merge_compound(pieces);
        Some(ElementNode { data: NodeData::at(loc), combinator, value: Box::new(value) })
    }

    /// Concatenates a compound run's pieces into a single node. A lone piece
    /// keeps its own node type (so a standalone `[attr=val]` stays an
    /// `Attribute` node); more than one piece collapses to their combined
    /// source spelling, since a mixed compound (`a[href].ext`) has no single
    /// structured representation left to preserve.
    fn merge_compound(pieces: Vec<Node>) -> Node {
        if pieces.len() == 1 {
            return pieces.into_iter().next().unwrap();
        }
        let text: String = pieces.iter().map(Self::piece_source_text).collect();
        Node::keyword(text)
    }

    fn piece_source_text(node: &Node) -> String {
        match node {
            Node::Keyword(k) => k.value.clone(),
            Node::Attribute(a) => {
                let mut s = format!("[{}", a.key);
                if let Some(op) = a.op {
                    s.push_str(op.symbol());
                    if let Some(v) = &a.value {
                        s.push('"');
                        s.push_str(v);
                        s.push('"');
                    }
                }
                s.push(']');
                s
            }
            _ => String::new(),
        }
    }

    fn try_parse_simple_selector(&mut self) -> Option<Node> {
        let loc = self.loc();
        if self.t.match_char('&') {
            return Some(Node::keyword("&"));
        }
        if self.t.match_char('*') {
            return Some(Node::keyword("*"));
        }
        if self.t.match_char('[') {
            let key = self.t.match_keyword(false, true)?.to_string();
            let op = if self.t.match_exact("~=") {
                Some(AttrOp::Includes)
            } else if self.t.match_exact("|=") {
                Some(AttrOp::DashMatch)
            } else if self.t.match_exact("^=") {
                Some(AttrOp::PrefixMatch)
            } else if self.t.match_exact("$=") {
                Some(AttrOp::SuffixMatch)
            } else if self.t.match_exact("*=") {
                Some(AttrOp::SubstringMatch)
            } else if self.t.match_char('=') {
                Some(AttrOp::Equals)
            } else {
                None
            };
            let value = if op.is_some() {
                if let Some(s) = self.t.get_quoted_string() {
                    Some(s.trim_matches(|c| c == '"' || c == '\'').to_string())
                } else {
                    self.t.match_keyword(false, true).map(str::to_string)
                }
            } else {
                None
            };
            if !self.t.match_char(']') {
                return None;
            }
            return Some(Node::Attribute(AttributeNode { data: NodeData::at(loc), key, op, value }));
        }
        let mark = self.t.remember();
        let mut text = String::new();
        if self.t.match_char('.') {
            text.push('.');
        } else if self.t.match_char('#') {
            text.push('#');
        } else if self.t.match_char(':') {
            text.push(':');
            if self.t.match_char(':') {
                text.push(':');
            }
        }
        if let Some(name) = self.t.match_keyword(false, true) {
            text.push_str(name);
        } else {
            self.t.recall(mark);
            return None;
        }
        if self.t.peek('(') {
            self.t.match_char('(');
            text.push('(');
            if let Some(inner) = self.t.match_until(')', MatchUntilOptions { include_delimiter: false, last_instance: false }) {
                text.push_str(inner);
            }
            self.t.match_char(')');
            text.push(')');
        }
        if text.is_empty() {
            self.t.recall(mark);
            return None;
        }
        Some(Node::keyword(text))
    }

    fn try_parse_extend(&mut self) -> Option<ExtendNode> {
        let mark = self.t.remember();
        let loc = self.loc();
        if !self.t.match_exact(":extend(") {
            self.t.recall(mark);
            return None;
        }
        let mut targets = vec![self.parse_selector()?];
        while self.t.match_char(',') {
            targets.push(self.parse_selector()?);
        }
        let all = self.t.match_exact_ci("all");
        if !self.t.match_char(')') {
            self.t.recall(mark);
            return None;
        }
        Some(ExtendNode { data: NodeData::at(loc), targets, all })
    }

    // --- guards -----------------------------------------------------------

    fn parse_guard(&mut self) -> Result<Node, ParseError> {
        if !self.t.match_char('(') {
            return Err(self.expected("'('"));
        }
        let mut items = vec![self.parse_guard_condition()?];
        loop {
            if self.t.match_exact_ci("and") {
                items.push(Node::keyword("and"));
                items.push(self.parse_guard_condition()?);
            } else if self.t.match_char(',') || self.t.match_exact_ci("or") {
                items.push(Node::keyword("or"));
                items.push(self.parse_guard_condition()?);
            } else {
                break;
            }
        }
        if !self.t.match_char(')') {
            return Err(self.expected("')'"));
        }
        if items.len() == 1 {
            return Ok(items.into_iter().next().unwrap());
        }
        Ok(Node::Expression(ExpressionNode { data: NodeData::default(), items }))
    }

    fn parse_guard_condition(&mut self) -> Result<Node, ParseError> {
        let loc = self.loc();
        let negate = self.t.match_exact_ci("not");
        let wrapped_paren = negate && self.t.match_char('(');
        if self.t.match_exact_ci("default") && self.t.match_char('(') {
            if !self.t.match_char(')') {
                return Err(self.expected("')'"));
            }
            let call = Node::Call(CallNode { data: NodeData::at(loc.clone()), name: "default".to_string(), args: vec![] });
            return self.finish_guard_wrap(call, negate, wrapped_paren, loc);
        }
        let left = self.parse_expression()?;
        let op = if self.t.match_exact("<=") {
            Some(CompareOp::Le)
        } else if self.t.match_exact(">=") {
            Some(CompareOp::Ge)
        } else if self.t.match_char('<') {
            Some(CompareOp::Lt)
        } else if self.t.match_char('>') {
            Some(CompareOp::Gt)
        } else if self.t.match_char('=') {
            Some(CompareOp::Eq)
        } else {
            None
        };
        let right = if op.is_some() { Some(Box::new(self.parse_expression()?)) } else { None };
        let cond = Node::Condition(ConditionNode { data: NodeData::at(loc.clone()), left: Box::new(left), op, right, negate: false });
        self.finish_guard_wrap(cond, negate, wrapped_paren, loc)
    }

    fn finish_guard_wrap(&mut self, inner: Node, negate: bool, wrapped_paren: bool, loc: Location) -> Result<Node, ParseError> {
        if wrapped_paren && !self.t.match_char(')') {
            return Err(self.expected("')'"));
        }
        if !negate {
            return Ok(inner);
        }
        match inner {
            Node::Condition(mut c) => {
                c.negate = true;
                Ok(Node::Condition(c))
            }
            other => Ok(Node::Condition(ConditionNode { data: NodeData::at(loc), left: Box::new(other), op: None, right: None, negate: true })),
        }
    }

    // --- mixin definitions & calls ----------------------------------------

    fn try_mixin_definition(&mut self) -> Result<Option<Node>, ParseError> {
        let mark = self.t.remember();
        let loc = self.loc();
        let Some(name) = self.try_parse_mixin_path() else {
            self.t.recall(mark);
            return Ok(None);
        };
        if !self.t.match_char('(') {
            self.t.recall(mark);
            return Ok(None);
        }
        // Lookahead: a mixin definition's parameter list is always followed
        // (after an optional guard) by a `{`; a mixin call's is followed by
        // `;` or the enclosing block's `}`. Parse params tentatively and
        // check what follows before committing.
        let Ok((params, variadic)) = self.parse_params() else {
            self.t.recall(mark);
            return Ok(None);
        };
        if !self.t.match_char(')') {
            self.t.recall(mark);
            return Ok(None);
        }
        let guard = if self.t.match_exact_ci("when") { Some(Box::new(self.parse_guard()?)) } else { None };
        if !self.t.peek('{') {
            self.t.recall(mark);
            return Ok(None);
        }
        self.t.match_char('{');
        let rules = self.parse_block_body(true)?;
        if !self.t.match_char('}') {
            return Err(self.expected("'}'"));
        }
        Ok(Some(Node::MixinDefinition(MixinDefinitionNode { data: NodeData::at(loc), name, params, rules, guard, variadic })))
    }

    /// A mixin name is a single dotted/hashed path with no combinators
    /// (`.name`, `#ns > .name` is not supported as a definition path; only
    /// plain `.a.b` nesting call paths are).
    fn try_parse_mixin_path(&mut self) -> Option<String> {
        let mark = self.t.remember();
        let mut path = String::new();
        loop {
            let sigil = if self.t.match_char('.') {
                '.'
            } else if self.t.match_char('#') {
                '#'
            } else {
                break;
            };
            let Some(name) = self.t.match_keyword(false, false) else {
                self.t.recall(mark);
                return None;
            };
            path.push(sigil);
            path.push_str(name);
        }
        if path.is_empty() {
            self.t.recall(mark);
            return None;
        }
        Some(path)
    }

    fn parse_params(&mut self) -> Result<(Vec<Param>, bool), ParseError> {
        let mut params = Vec::new();
        let mut variadic = false;
        if self.t.peek(')') {
            return Ok((params, variadic));
        }
        loop {
            if self.t.match_exact("...") {
                variadic = true;
                break;
            }
            if self.t.match_char('@') {
                if self.t.match_exact("...") {
                    // `@rest...`
                    let name = self.t.match_keyword(false, false).unwrap_or_default().to_string();
                    params.push(Param { name: Some(format!("@{name}")), default: None, pattern: None });
                    variadic = true;
                    break;
                }
                let name = self.t.match_keyword(false, false).ok_or_else(|| self.expected("parameter name"))?.to_string();
                let default = if self.t.match_char(':') { Some(self.parse_expression()?) } else { None };
                params.push(Param { name: Some(format!("@{name}")), default, pattern: None });
            } else {
                let pattern = self.try_entity()?.ok_or_else(|| self.expected("parameter pattern"))?;
                params.push(Param { name: None, default: None, pattern: Some(pattern) });
            }
            if !self.t.match_char(',') && !self.t.match_char(';') {
                break;
            }
        }
        Ok((params, variadic))
    }

    fn try_mixin_call(&mut self) -> Result<Option<Node>, ParseError> {
        let mark = self.t.remember();
        let loc = self.loc();
        let Some(path) = self.try_parse_mixin_path() else {
            self.t.recall(mark);
            return Ok(None);
        };
        let mut args = Vec::new();
        if self.t.match_char('(') {
            if !self.t.peek(')') {
                let separator = self.scan_mixin_call_separator();
                loop {
                    args.push(self.parse_mixin_call_arg(separator)?);
                    if !self.t.match_char(separator) {
                        break;
                    }
                }
            }
            if !self.t.match_char(')') {
                self.t.recall(mark);
                return Ok(None);
            }
        }
        let important = !self.parse_important().is_empty();
        if !self.t.match_char(';') && !self.t.peek('}') {
            self.t.recall(mark);
            return Ok(None);
        }
        Ok(Some(Node::MixinCall(MixinCallNode { data: NodeData::at(loc), path, args, important })))
    }

    /// Looks ahead over the (unconsumed) argument list following an already
    /// matched `(` to decide the separator mode: a top-level `;` anywhere in
    /// the list means arguments are `;`-separated, letting a single argument
    /// itself be a comma list (`.m(1, 2; 3, 4)` is two arguments); otherwise
    /// arguments are `,`-separated, as usual. Depth tracks nested
    /// `(...)`/`[...]` so a `;` inside a nested call isn't mistaken for one
    /// of ours.
    fn scan_mixin_call_separator(&mut self) -> char {
        let mark = self.t.remember();
        let mut depth = 0i32;
        let mut separator = ',';
        while !self.t.eof() {
            if self.t.get_quoted_string().is_some() || self.t.get_comment().is_some() {
                continue;
            }
            let Some(c) = self.t.peek_char(0) else { break };
            match c {
                '(' | '[' => depth += 1,
                ')' if depth == 0 => break,
                ')' | ']' => depth -= 1,
                ';' if depth == 0 => {
                    separator = ';';
                    break;
                }
                _ => {}
            }
            if !self.t.match_char(c) {
                break;
            }
        }
        self.t.recall(mark);
        separator
    }

    fn parse_mixin_call_arg(&mut self, separator: char) -> Result<CallArg, ParseError> {
        let mark = self.t.remember();
        if self.t.match_char('@') {
            if let Some(name) = self.t.match_keyword(false, false) {
                let name = name.to_string();
                if self.t.match_char(':') {
                    let value = self.parse_mixin_arg_value(separator)?;
                    return Ok(CallArg { name: Some(name), value });
                }
            }
            self.t.recall(mark);
        }
        Ok(CallArg { name: None, value: self.parse_mixin_arg_value(separator)? })
    }

    /// Under the `;` separator a single argument may be a comma-expression
    /// list, rendered as a plain `Value`; under `,` the comma is the
    /// argument boundary and an argument is always a lone expression.
    fn parse_mixin_arg_value(&mut self, separator: char) -> Result<Node, ParseError> {
        let first = self.parse_expression()?;
        if separator != ';' {
            return Ok(first);
        }
        let loc = self.loc();
        let mut expressions = vec![first];
        while self.t.match_char(',') {
            expressions.push(self.parse_expression()?);
        }
        if expressions.len() == 1 {
            return Ok(expressions.into_iter().next().unwrap());
        }
        Ok(Node::Value(ValueNode {
            data: NodeData::at(loc),
            expressions,
            important: String::new(),
            merge: String::new(),
        }))
    }

    // --- at-rules -----------------------------------------------------

    fn try_directive(&mut self) -> Result<Option<Node>, ParseError> {
        let mark = self.t.remember();
        if self.t.match_exact_ci("@import") {
            return Ok(Some(self.parse_import()?));
        }
        if self.t.match_exact_ci("@media") {
            return Ok(Some(self.parse_media()?));
        }
        if self.t.match_exact_ci("@keyframes")
            || self.t.match_exact_ci("@-webkit-keyframes")
            || self.t.match_exact_ci("@-moz-keyframes")
        {
            return Ok(Some(self.parse_keyframes()?));
        }
        for &kw in &["@charset", "@namespace"] {
            if self.t.match_exact_ci(kw) {
                let loc = self.loc();
                let value = self.parse_expression()?;
                self.t.match_char(';');
                return Ok(Some(Node::Directive(DirectiveNode {
                    data: NodeData::at(loc),
                    name: kw.to_string(),
                    identifier: None,
                    rules: None,
                    value: Some(Box::new(value)),
                })));
            }
        }
        for &kw in &["@font-face", "@page", "@supports", "@viewport", "@document"] {
            if self.t.match_exact_ci(kw) {
                let loc = self.loc();
                let identifier = self.t.match_until('{', MatchUntilOptions::default()).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
                if !self.t.match_char('{') {
                    return Err(self.expected("'{'"));
                }
                let rules = self.parse_block_body(true)?;
                if !self.t.match_char('}') {
                    return Err(self.expected("'}'"));
                }
                return Ok(Some(Node::Directive(DirectiveNode {
                    data: NodeData::at(loc),
                    name: kw.to_string(),
                    identifier,
                    rules: Some(rules),
                    value: None,
                })));
            }
        }
        for &kw in PAGE_MARGIN_BOXES {
            if self.t.match_exact_ci(kw) {
                let loc = self.loc();
                if !self.t.match_char('{') {
                    return Err(self.expected("'{'"));
                }
                let rules = self.parse_block_body(true)?;
                if !self.t.match_char('}') {
                    return Err(self.expected("'}'"));
                }
                return Ok(Some(Node::Directive(DirectiveNode {
                    data: NodeData::at(loc),
                    name: kw.to_string(),
                    identifier: None,
                    rules: Some(rules),
                    value: None,
                })));
            }
        }
        self.t.recall(mark);
        Ok(None)
    }

    fn parse_import(&mut self) -> Result<Node, ParseError> {
        let loc = self.loc();
        let mut options = Vec::new();
        if self.t.match_char('(') {
            loop {
                let Some(opt) = self.t.match_keyword(false, false) else { break };
                options.push(self.parse_import_option(opt)?);
                if !self.t.match_char(',') {
                    break;
                }
            }
            if !self.t.match_char(')') {
                return Err(self.expected("')'"));
            }
        }
        self.validate_import_options(&options, loc.clone())?;
        let path = if let Some(text) = self.t.get_quoted_string() {
            self.make_quoted(text, self.loc())
        } else {
            self.parse_url(self.loc())?
        };
        let mut media = Vec::new();
        while !self.t.peek(';') && !self.t.eof() {
            media.push(self.parse_expression()?);
        }
        self.t.match_char(';');
        Ok(Node::Import(ImportNode { data: NodeData::at(loc), path: Box::new(path), media, options }))
    }

    fn parse_import_option(&mut self, name: &str) -> Result<ImportOption, ParseError> {
        match name {
            "once" => Ok(ImportOption::Once),
            "multiple" => Ok(ImportOption::Multiple),
            "css" => Ok(ImportOption::Css),
            "less" => Ok(ImportOption::Less),
            "inline" => Ok(ImportOption::Inline),
            "reference" => Ok(ImportOption::Reference),
            "optional" => Ok(ImportOption::Optional),
            other => Err(ParseError::UnrecognizedImportOption(other.to_string(), self.loc())),
        }
    }

    fn validate_import_options(&self, options: &[ImportOption], loc: Location) -> Result<(), ParseError> {
        let has = |o: ImportOption| options.contains(&o);
        if has(ImportOption::Once) && has(ImportOption::Multiple) {
            return Err(ParseError::InvalidImportCombo(loc));
        }
        if has(ImportOption::Css) && has(ImportOption::Less) {
            return Err(ParseError::InvalidImportCombo(loc));
        }
        if has(ImportOption::Inline) && (has(ImportOption::Css) || has(ImportOption::Less) || has(ImportOption::Reference)) {
            return Err(ParseError::InvalidImportCombo(loc));
        }
        if has(ImportOption::Reference) && has(ImportOption::Css) {
            return Err(ParseError::InvalidImportCombo(loc));
        }
        Ok(())
    }

    fn parse_media(&mut self) -> Result<Node, ParseError> {
        let loc = self.loc();
        let mut features = Vec::new();
        if !self.t.peek('{') {
            features.push(self.parse_expression()?);
            while self.t.match_char(',') {
                features.push(self.parse_expression()?);
            }
        }
        if !self.t.match_char('{') {
            return Err(self.expected("'{'"));
        }
        let rules = self.parse_block_body(true)?;
        if !self.t.match_char('}') {
            return Err(self.expected("'}'"));
        }
        Ok(Node::Media(MediaNode { data: NodeData::at(loc), features, rules }))
    }

    fn parse_keyframes(&mut self) -> Result<Node, ParseError> {
        let loc = self.loc();
        let name = self.t.match_keyword(false, false).ok_or_else(|| self.expected("animation name"))?.to_string();
        if !self.t.match_char('{') {
            return Err(self.expected("'{'"));
        }
        let mut frames = Vec::new();
        loop {
            self.take_comments(true);
            if self.t.peek('}') || self.t.eof() {
                break;
            }
            let mut selectors = vec![self.parse_keyframe_selector()?];
            while self.t.match_char(',') {
                selectors.push(self.parse_keyframe_selector()?);
            }
            if !self.t.match_char('{') {
                return Err(self.expected("'{'"));
            }
            let rules = self.parse_block_body(true)?;
            if !self.t.match_char('}') {
                return Err(self.expected("'}'"));
            }
            frames.push((selectors, rules));
        }
        if !self.t.match_char('}') {
            return Err(self.expected("'}'"));
        }
        Ok(Node::KeyFrame(KeyFrameNode { data: NodeData::at(loc), name, frames }))
    }

    fn parse_keyframe_selector(&mut self) -> Result<Node, ParseError> {
        let loc = self.loc();
        if self.t.match_exact_ci("from") {
            return Ok(Node::keyword("from"));
        }
        if self.t.match_exact_ci("to") {
            return Ok(Node::keyword("to"));
        }
        let dim = self.parse_dimension().ok_or_else(|| self.expected("keyframe selector"))?;
        Ok(Node::Number(NumberNode { data: NodeData::at(loc), value: dim.0, unit: dim.1 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Vec<Node> {
        let config = Config::default();
        parse(source, None, &config).unwrap()
    }

    #[test]
    fn parses_a_unicode_range_descriptor() {
        let body = parse_ok("@font-face { unicode-range: U+0025-00FF; }");
        let Node::Directive(d) = &body[0] else { panic!("expected directive") };
        let rules = d.rules.as_ref().unwrap();
        let Node::Rule(r) = &rules[0] else { panic!("expected rule") };
        let Node::Value(v) = r.value.as_ref() else { panic!("expected value") };
        assert!(matches!(&v.expressions[0], Node::Text(t) if t.value == "U+0025-00FF"));
    }

    #[test]
    fn parses_a_wildcard_unicode_range() {
        let body = parse_ok("@font-face { unicode-range: U+4??; }");
        let Node::Directive(d) = &body[0] else { panic!("expected directive") };
        let rules = d.rules.as_ref().unwrap();
        let Node::Rule(r) = &rules[0] else { panic!("expected rule") };
        let Node::Value(v) = r.value.as_ref() else { panic!("expected value") };
        assert!(matches!(&v.expressions[0], Node::Text(t) if t.value == "U+4??"));
    }

    #[test]
    fn parses_an_inline_extend_clause() {
        let body = parse_ok(".a:extend(.b all) { color: red; }");
        let Node::Ruleset(rs) = &body[0] else { panic!("expected ruleset") };
        let extend = &rs.selectors[0].extends[0];
        assert!(extend.all);
    }

    #[test]
    fn parses_a_merge_separator_suffix() {
        let body = parse_ok(".a { box-shadow+: inset 0 0 10px #555; }");
        let Node::Ruleset(rs) = &body[0] else { panic!("expected ruleset") };
        let Node::Rule(r) = &rs.rules[0] else { panic!("expected rule") };
        let Node::Value(v) = r.value.as_ref() else { panic!("expected value") };
        assert_eq!(v.merge, ", ");
    }

    #[test]
    fn parses_an_interpolated_rule_name() {
        let body = parse_ok(".a { @{prop}: red; }");
        let Node::Ruleset(rs) = &body[0] else { panic!("expected ruleset") };
        let Node::Rule(r) = &rs.rules[0] else { panic!("expected rule") };
        assert!(r.interpolated_name);
        assert_eq!(r.name, "@{prop}");
    }
}
