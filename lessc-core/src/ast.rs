//! The AST (spec.md §3).
//!
//! A tagged sum over the node variants below, each carrying a shared
//! [`NodeData`] header (location, comments, reference flag) and its own
//! payload. Trees are acyclic: children are owned (`Box`/`Vec`), never
//! shared by back-reference, so `Clone` is always a deep-enough copy.

use crate::error::Location;

/// The header every node carries, regardless of variant.
#[derive(Clone, Debug, Default)]
pub struct NodeData {
    /// Where this node began in the source, if known.
    pub location: Option<Location>,
    /// Comments immediately preceding this node.
    pub pre_comments: Vec<Comment>,
    /// Comments immediately following this node, on the same logical line.
    pub post_comments: Vec<Comment>,
    /// Set on nodes that originated (directly or by containment) from a
    /// `(reference)` import; such nodes are only emitted if pulled in by an
    /// `extend` or mixin call.
    pub is_reference: bool,
}

impl NodeData {
    /// A header with only a location set.
    pub fn at(location: Location) -> Self {
        Self { location: Some(location), ..Self::default() }
    }
}

/// A `/* */` or `//` comment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Comment {
    /// The comment text, including its delimiters.
    pub text: String,
    /// `/* */`, as opposed to `//` (which is never CSS-valid).
    pub is_css_valid: bool,
    /// `/**` or `/*!`, which some tools treat as "preserve even when
    /// minifying".
    pub is_special: bool,
    /// `/**/` or `/*\*/`, the classic CSS hacks.
    pub is_css_hack: bool,
    /// Whether this comment appeared before a selector rather than inside a
    /// block.
    pub is_pre_selector: bool,
}

impl Comment {
    /// Classifies a raw comment span (as returned by the tokenizer) into a
    /// [`Comment`].
    pub fn classify(text: &str, is_pre_selector: bool) -> Self {
        let is_css_valid = text.starts_with("/*");
        let is_special = text.starts_with("/**") || text.starts_with("/*!");
        let is_css_hack = text == "/**/" || text == "/*\\*/";
        Self {
            text: text.to_string(),
            is_css_valid,
            is_special,
            is_css_hack,
            is_pre_selector,
        }
    }
}

/// Number units recognized by this compiler (spec.md §6). Arithmetic treats
/// any other unit text as an opaque, non-convertible dimension.
pub const RECOGNIZED_UNITS: &[&str] = &[
    "%", "px", "em", "pc", "ex", "in", "deg", "ms", "pt", "cm", "mm", "ch", "rem", "vw", "vh",
    "vmin", "vmax", "vm", "grad", "rad", "fr", "gr", "Hz", "kHz", "dpi", "dpcm", "dppx", "s",
];

/// CSS filter functions `filter`'s specialized value parser recognizes
/// (spec.md §6). Unrecognized call names still pass through; this list is
/// only consulted to log a warning, the same leniency `Call.Evaluate`
/// already extends to unknown functions elsewhere.
pub const FILTER_FUNCTIONS: &[&str] = &[
    "blur", "brightness", "contrast", "drop-shadow", "grayscale", "hue-rotate", "invert",
    "opacity", "saturate", "sepia", "url",
];

/// A combinator preceding a selector [`Element`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Combinator {
    /// Implicit descendant combinator (a plain space).
    Descendant,
    /// `>`
    Child,
    /// `+`
    AdjacentSibling,
    /// `~`
    GeneralSibling,
}

impl Combinator {
    /// The symbol this combinator emits as CSS (empty for `Descendant`,
    /// which emits as a single space between elements).
    pub fn symbol(self) -> &'static str {
        match self {
            Combinator::Descendant => "",
            Combinator::Child => ">",
            Combinator::AdjacentSibling => "+",
            Combinator::GeneralSibling => "~",
        }
    }
}

/// An attribute selector's comparison operator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttrOp {
    /// `=`
    Equals,
    /// `~=`
    Includes,
    /// `|=`
    DashMatch,
    /// `^=`
    PrefixMatch,
    /// `$=`
    SuffixMatch,
    /// `*=`
    SubstringMatch,
}

impl AttrOp {
    /// The operator's CSS spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            AttrOp::Equals => "=",
            AttrOp::Includes => "~=",
            AttrOp::DashMatch => "|=",
            AttrOp::PrefixMatch => "^=",
            AttrOp::SuffixMatch => "$=",
            AttrOp::SubstringMatch => "*=",
        }
    }
}

/// An arithmetic operator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

/// A guard comparison operator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
}

/// An import option (spec.md §6).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImportOption {
    /// Deduplicate by canonical path.
    Once,
    /// Explicitly the inverse of `once`.
    Multiple,
    /// Force plain-CSS treatment (no LESS parsing).
    Css,
    /// Force LESS parsing even for a `.css` extension.
    Less,
    /// Embed raw bytes rather than parsing.
    Inline,
    /// Suppress output except where extended or mixed in.
    Reference,
    /// Do not fail the compile if the import cannot be resolved.
    Optional,
}

/// A node in the AST, tagged by variant.
#[derive(Clone, Debug)]
pub enum Node {
    /// Raw, already-CSS text passed through verbatim.
    Text(TextNode),
    /// A bare word with no further interpretation (e.g. `solid`, `red` when
    /// not parsed as a `Color`, a selector pseudo-class name's argument).
    Keyword(Keyword),
    /// A numeric literal plus an optional unit.
    Number(NumberNode),
    /// An RGBA color literal.
    Color(ColorNode),
    /// A quoted string, or an unquoted "quoted" value used for interpolation.
    Quoted(QuotedNode),
    /// A `@name` variable reference.
    Variable(VariableNode),
    /// A `url(...)` value.
    Url(UrlNode),
    /// Verbatim legacy IE `expression(...)` text.
    Script(ScriptNode),
    /// A `name(args)` function call, builtin or passthrough.
    Call(CallNode),
    /// An IE-style `key=value` argument.
    Assignment(AssignmentNode),
    /// A binary arithmetic operation.
    Operation(OperationNode),
    /// A guard comparison.
    Condition(ConditionNode),
    /// A space-separated list of terms.
    Expression(ExpressionNode),
    /// A comma-separated list of expressions, with an `!important` flag.
    Value(ValueNode),
    /// A `property: value;` declaration (or a variable assignment).
    Rule(RuleNode),
    /// A comma-separated selector (one alternative).
    Selector(SelectorNode),
    /// One combinator+simple-selector pair within a [`Selector`].
    Element(ElementNode),
    /// An `[attr op value]` selector clause.
    Attribute(AttributeNode),
    /// A `selector(s) { rules }` block.
    Ruleset(RulesetNode),
    /// A ruleset with an attached `when (...)` guard.
    GuardedRuleset(GuardedRulesetNode),
    /// A `.name(params) when (...) { rules }` mixin definition.
    MixinDefinition(MixinDefinitionNode),
    /// A `.name.sub(args);` mixin invocation.
    MixinCall(MixinCallNode),
    /// An `@import` statement.
    Import(ImportNode),
    /// An `@media` block.
    Media(MediaNode),
    /// A generic at-rule (`@font-face`, `@page`, `@supports`, ...).
    Directive(DirectiveNode),
    /// An `@keyframes` block.
    KeyFrame(KeyFrameNode),
    /// A `selector:extend(...)` or trailing `&:extend(...)` directive.
    Extend(ExtendNode),
    /// A parenthesized sub-expression.
    Paren(ParenNode),
    /// A `a/b` shorthand pair (`font`'s `small/12px` size/line-height), joined
    /// with a literal `/` and never folded as division.
    Shorthand(ShorthandNode),
}

/// Raw text carried through verbatim.
#[derive(Clone, Debug)]
pub struct TextNode {
    /// Shared node header.
    pub data: NodeData,
    /// The raw text.
    pub value: String,
}

/// A bare keyword (unquoted identifier with no further meaning).
#[derive(Clone, Debug)]
pub struct Keyword {
    /// Shared node header.
    pub data: NodeData,
    /// The keyword text.
    pub value: String,
}

/// A numeric literal.
#[derive(Clone, Debug)]
pub struct NumberNode {
    /// Shared node header.
    pub data: NodeData,
    /// The numeric value.
    pub value: f64,
    /// The unit, or empty if dimensionless.
    pub unit: String,
}

/// An RGBA color.
#[derive(Clone, Copy, Debug)]
pub struct Rgba {
    /// Red channel, nominally `0..=255` but may exceed that range mid-arithmetic.
    pub r: f64,
    /// Green channel, nominally `0..=255`.
    pub g: f64,
    /// Blue channel, nominally `0..=255`.
    pub b: f64,
    /// Alpha channel, `0.0..=1.0`.
    pub a: f64,
}

impl Rgba {
    /// Clamps every channel to its emittable range.
    pub fn clamped(self) -> Self {
        Self {
            r: self.r.clamp(0.0, 255.0),
            g: self.g.clamp(0.0, 255.0),
            b: self.b.clamp(0.0, 255.0),
            a: self.a.clamp(0.0, 1.0),
        }
    }
}

/// A color literal.
#[derive(Clone, Debug)]
pub struct ColorNode {
    /// Shared node header.
    pub data: NodeData,
    /// The color value. May carry out-of-range channels transiently during
    /// arithmetic; emission always clamps.
    pub rgba: Rgba,
}

/// A quoted string (or an unquoted "quoted" value carrying interpolation).
#[derive(Clone, Debug)]
pub struct QuotedNode {
    /// Shared node header.
    pub data: NodeData,
    /// The quote character, or `None` for an unquoted escaped value (`~"..."`).
    pub quote: Option<char>,
    /// Whether this value came from an `~"..."`/`e("...")` escape, which
    /// emits without surrounding quotes.
    pub escaped: bool,
    /// The string content, with `@{name}` interpolation markers still
    /// present (resolved at evaluation time).
    pub content: String,
}

/// A `@name` variable reference.
#[derive(Clone, Debug)]
pub struct VariableNode {
    /// Shared node header.
    pub data: NodeData,
    /// The variable name, including its leading `@` (and a second `@` for
    /// indirection, e.g. `@@name`).
    pub name: String,
}

/// A `url(...)` value.
#[derive(Clone, Debug)]
pub struct UrlNode {
    /// Shared node header.
    pub data: NodeData,
    /// The inner value (a `Quoted` or raw `Text`/`Variable`).
    pub inner: Box<Node>,
}

/// Verbatim, unsupported legacy script text (spec.md §9 open question).
#[derive(Clone, Debug)]
pub struct ScriptNode {
    /// Shared node header.
    pub data: NodeData,
    /// The raw `expression(...)` text, preserved only for diagnostics; it is
    /// never emitted.
    pub raw: String,
}

/// A function call.
#[derive(Clone, Debug)]
pub struct CallNode {
    /// Shared node header.
    pub data: NodeData,
    /// The function name.
    pub name: String,
    /// The argument list (each argument is itself a node, commonly an
    /// `Expression`, `Value`, or `Assignment`).
    pub args: Vec<Node>,
}

/// An IE-style `key=value` call argument.
#[derive(Clone, Debug)]
pub struct AssignmentNode {
    /// Shared node header.
    pub data: NodeData,
    /// The argument key.
    pub key: String,
    /// The argument value.
    pub value: Box<Node>,
}

/// A binary arithmetic operation.
#[derive(Clone, Debug)]
pub struct OperationNode {
    /// Shared node header.
    pub data: NodeData,
    /// The operator.
    pub op: ArithOp,
    /// The left operand.
    pub left: Box<Node>,
    /// The right operand.
    pub right: Box<Node>,
    /// Whether this operation sits directly inside an explicit `(...)`.
    /// Under `strict_math`, only operations with this set are folded; the
    /// rest are emitted as written (spec.md §9's strict math open question).
    pub in_parens: bool,
}

/// A guard comparison (`@a > 0`, `@a = true`, ...).
#[derive(Clone, Debug)]
pub struct ConditionNode {
    /// Shared node header.
    pub data: NodeData,
    /// The left operand.
    pub left: Box<Node>,
    /// The comparison operator, or `None` when this is a boolean truthiness
    /// test on `left` alone.
    pub op: Option<CompareOp>,
    /// The right operand, present iff `op` is.
    pub right: Option<Box<Node>>,
    /// Whether this condition is negated (`not (...)`).
    pub negate: bool,
}

/// A space-separated list of terms.
#[derive(Clone, Debug, Default)]
pub struct ExpressionNode {
    /// Shared node header.
    pub data: NodeData,
    /// The ordered term list.
    pub items: Vec<Node>,
}

/// A comma-separated list of expressions, as found on the right of a `:`.
#[derive(Clone, Debug, Default)]
pub struct ValueNode {
    /// Shared node header.
    pub data: NodeData,
    /// The comma-separated expression list.
    pub expressions: Vec<Node>,
    /// `!important` / `!default`, verbatim, or empty.
    pub important: String,
    /// The separator used when this rule is the target of a `+`/`+_` merge
    /// (`", "` or `" "`), or empty if this rule does not merge.
    pub merge: String,
}

/// A declaration or variable assignment.
#[derive(Clone, Debug)]
pub struct RuleNode {
    /// Shared node header.
    pub data: NodeData,
    /// The property name (or variable name, including `@`).
    pub name: String,
    /// The declared value.
    pub value: Box<Node>,
    /// Whether `name` begins with `@` (a variable rule); variable rules are
    /// never emitted.
    pub is_variable: bool,
    /// Whether this rule's name ended in `@{...}` interpolation.
    pub interpolated_name: bool,
}

impl RuleNode {
    /// A variable iff its name begins with `@` (spec.md §3 invariant).
    pub fn is_variable(name: &str) -> bool {
        name.starts_with('@')
    }
}

/// One combinator + simple-selector element.
#[derive(Clone, Debug)]
pub struct ElementNode {
    /// Shared node header.
    pub data: NodeData,
    /// The combinator preceding this element.
    pub combinator: Combinator,
    /// The element's own value: a literal class/id/tag/pseudo string, `&`,
    /// `*`, an attribute selector, or an interpolated variable.
    pub value: Box<Node>,
}

/// An `[attr op value]` selector clause.
#[derive(Clone, Debug)]
pub struct AttributeNode {
    /// Shared node header.
    pub data: NodeData,
    /// The attribute key.
    pub key: String,
    /// The comparison operator, absent for a bare `[attr]` existence check.
    pub op: Option<AttrOp>,
    /// The comparison value, present iff `op` is.
    pub value: Option<String>,
}

/// A comma-separated selector alternative: an ordered list of elements.
#[derive(Clone, Debug, Default)]
pub struct SelectorNode {
    /// Shared node header.
    pub data: NodeData,
    /// The selector's elements, in source order.
    pub elements: Vec<ElementNode>,
    /// Extend clauses attached directly to this selector
    /// (`.a:extend(.b)`).
    pub extends: Vec<ExtendNode>,
}

/// A `selector(s) { rules }` block.
#[derive(Clone, Debug)]
pub struct RulesetNode {
    /// Shared node header.
    pub data: NodeData,
    /// At least one selector (spec.md §3 invariant).
    pub selectors: Vec<SelectorNode>,
    /// The block's body.
    pub rules: Vec<Node>,
}

/// A ruleset with a `when (...)` guard, evaluated like a zero-argument
/// mixin definition but addressed by its selector rather than called.
#[derive(Clone, Debug)]
pub struct GuardedRulesetNode {
    /// Shared node header.
    pub data: NodeData,
    /// The guarded selectors.
    pub selectors: Vec<SelectorNode>,
    /// The block's body.
    pub rules: Vec<Node>,
    /// The guard condition.
    pub guard: Box<Node>,
}

/// One mixin parameter.
#[derive(Clone, Debug)]
pub struct Param {
    /// The parameter's variable name, or `None` for a positional-only
    /// pattern-match parameter (e.g. a literal `dark` in `.m(dark)`).
    pub name: Option<String>,
    /// The default value, if any.
    pub default: Option<Node>,
    /// A literal pattern the caller's argument must equal, for pattern
    /// matching mixin overloads (e.g. `.m(dark)`).
    pub pattern: Option<Node>,
}

/// A mixin definition.
#[derive(Clone, Debug)]
pub struct MixinDefinitionNode {
    /// Shared node header.
    pub data: NodeData,
    /// The dotted/hashed selector path naming this mixin.
    pub name: String,
    /// The declared parameters.
    pub params: Vec<Param>,
    /// The body.
    pub rules: Vec<Node>,
    /// The guard condition, if any.
    pub guard: Option<Box<Node>>,
    /// Whether the last parameter is variadic (`...`).
    pub variadic: bool,
}

impl MixinDefinitionNode {
    /// The number of parameters with no default and no name (mandatory,
    /// positional) — spec.md §3 invariant.
    pub fn required(&self) -> usize {
        self.params
            .iter()
            .filter(|p| p.default.is_none() && p.pattern.is_none())
            .count()
    }

    /// The total parameter count.
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// One mixin-call argument.
#[derive(Clone, Debug)]
pub struct CallArg {
    /// The argument's name, for `@name: value` named arguments.
    pub name: Option<String>,
    /// The argument's value expression.
    pub value: Node,
}

/// A mixin invocation.
#[derive(Clone, Debug)]
pub struct MixinCallNode {
    /// Shared node header.
    pub data: NodeData,
    /// The dotted/hashed element path being called.
    pub path: String,
    /// The call's arguments.
    pub args: Vec<CallArg>,
    /// Whether the call is suffixed with `!important`.
    pub important: bool,
}

/// An `@import` statement.
#[derive(Clone, Debug)]
pub struct ImportNode {
    /// Shared node header.
    pub data: NodeData,
    /// The import path (a `Url` or `Quoted`).
    pub path: Box<Node>,
    /// Media features, if the import was written `@import "x" screen;`.
    pub media: Vec<Node>,
    /// The parsed `(option, option)` list.
    pub options: Vec<ImportOption>,
}

/// An `@media` block.
#[derive(Clone, Debug)]
pub struct MediaNode {
    /// Shared node header.
    pub data: NodeData,
    /// The comma-separated list of feature groups.
    pub features: Vec<Node>,
    /// The block's body.
    pub rules: Vec<Node>,
}

/// A generic at-rule.
#[derive(Clone, Debug)]
pub struct DirectiveNode {
    /// Shared node header.
    pub data: NodeData,
    /// The at-rule keyword, including its leading `@`.
    pub name: String,
    /// An identifier following the keyword (`@page :first`, `@namespace svg`).
    pub identifier: Option<String>,
    /// A block body, for block-bearing directives.
    pub rules: Option<Vec<Node>>,
    /// A single-expression value, for value-bearing directives
    /// (`@charset "utf-8";`).
    pub value: Option<Box<Node>>,
}

/// An `@keyframes` block.
#[derive(Clone, Debug)]
pub struct KeyFrameNode {
    /// Shared node header.
    pub data: NodeData,
    /// The animation name.
    pub name: String,
    /// `(from|to|N%)` selector groups, each with their own block.
    pub frames: Vec<(Vec<Node>, Vec<Node>)>,
}

/// An extend clause.
#[derive(Clone, Debug)]
pub struct ExtendNode {
    /// Shared node header.
    pub data: NodeData,
    /// The target selector(s) to match against.
    pub targets: Vec<SelectorNode>,
    /// `all` was given: match as a prefix rather than requiring an exact
    /// selector match.
    pub all: bool,
}

/// A parenthesized sub-expression, used to force strict-math arithmetic or
/// disambiguate grouping.
#[derive(Clone, Debug)]
pub struct ParenNode {
    /// Shared node header.
    pub data: NodeData,
    /// The wrapped node.
    pub inner: Box<Node>,
}

/// A `font` shorthand's `size/line-height` pair: evaluated on both sides
/// (so a variable reference in either position still resolves) but always
/// joined with a literal `/`, never treated as division.
#[derive(Clone, Debug)]
pub struct ShorthandNode {
    /// Shared node header.
    pub data: NodeData,
    /// The left side (`small`, `12px`, ...).
    pub a: Box<Node>,
    /// The right side (`12px`, `1.5`, ...).
    pub b: Box<Node>,
}

impl Node {
    /// The shared header for this node, regardless of variant.
    pub fn data(&self) -> &NodeData {
        match self {
            Node::Text(n) => &n.data,
            Node::Keyword(n) => &n.data,
            Node::Number(n) => &n.data,
            Node::Color(n) => &n.data,
            Node::Quoted(n) => &n.data,
            Node::Variable(n) => &n.data,
            Node::Url(n) => &n.data,
            Node::Script(n) => &n.data,
            Node::Call(n) => &n.data,
            Node::Assignment(n) => &n.data,
            Node::Operation(n) => &n.data,
            Node::Condition(n) => &n.data,
            Node::Expression(n) => &n.data,
            Node::Value(n) => &n.data,
            Node::Rule(n) => &n.data,
            Node::Selector(n) => &n.data,
            Node::Element(n) => &n.data,
            Node::Attribute(n) => &n.data,
            Node::Ruleset(n) => &n.data,
            Node::GuardedRuleset(n) => &n.data,
            Node::MixinDefinition(n) => &n.data,
            Node::MixinCall(n) => &n.data,
            Node::Import(n) => &n.data,
            Node::Media(n) => &n.data,
            Node::Directive(n) => &n.data,
            Node::KeyFrame(n) => &n.data,
            Node::Extend(n) => &n.data,
            Node::Paren(n) => &n.data,
            Node::Shorthand(n) => &n.data,
        }
    }

    /// Mutable access to the shared header.
    pub fn data_mut(&mut self) -> &mut NodeData {
        match self {
            Node::Text(n) => &mut n.data,
            Node::Keyword(n) => &mut n.data,
            Node::Number(n) => &mut n.data,
            Node::Color(n) => &mut n.data,
            Node::Quoted(n) => &mut n.data,
            Node::Variable(n) => &mut n.data,
            Node::Url(n) => &mut n.data,
            Node::Script(n) => &mut n.data,
            Node::Call(n) => &mut n.data,
            Node::Assignment(n) => &mut n.data,
            Node::Operation(n) => &mut n.data,
            Node::Condition(n) => &mut n.data,
            Node::Expression(n) => &mut n.data,
            Node::Value(n) => &mut n.data,
            Node::Rule(n) => &mut n.data,
            Node::Selector(n) => &mut n.data,
            Node::Element(n) => &mut n.data,
            Node::Attribute(n) => &mut n.data,
            Node::Ruleset(n) => &mut n.data,
            Node::GuardedRuleset(n) => &mut n.data,
            Node::MixinDefinition(n) => &mut n.data,
            Node::MixinCall(n) => &mut n.data,
            Node::Import(n) => &mut n.data,
            Node::Media(n) => &mut n.data,
            Node::Directive(n) => &mut n.data,
            Node::KeyFrame(n) => &mut n.data,
            Node::Extend(n) => &mut n.data,
            Node::Paren(n) => &mut n.data,
            Node::Shorthand(n) => &mut n.data,
        }
    }

    /// A text node with no location, for synthesized output.
    pub fn text(value: impl Into<String>) -> Self {
        Node::Text(TextNode { data: NodeData::default(), value: value.into() })
    }

    /// A keyword node with no location, for synthesized output.
    pub fn keyword(value: impl Into<String>) -> Self {
        Node::Keyword(Keyword { data: NodeData::default(), value: value.into() })
    }
}
