//! The evaluator (spec.md §4.4).
//!
//! Each `Node` variant's `evaluate` method reduces it to CSS-ready form:
//! variables are substituted, operations computed, mixins expanded in
//! place, and `@import`s pulled in and evaluated recursively. Evaluation
//! never mutates a node in place; it always produces a new tree, which
//! keeps the original parse tree reusable (a mixin definition is evaluated
//! once per call, against the caller's arguments).

use crate::ast::*;
use crate::color;
use crate::env::{Env, Frame};
use crate::error::{EvalError, Location};
use crate::units;
use std::rc::Rc;

/// Evaluates a full stylesheet body in place, expanding rulesets, mixin
/// calls and imports, and leaving only the nodes that reach the emitter.
pub fn evaluate_body(body: &[Node], env: &mut Env) -> Result<Vec<Node>, EvalError> {
    let mut out = Vec::new();
    for node in body {
        evaluate_statement(node, env, &mut out)?;
    }
    Ok(merge_rule_values(out))
}

/// Folds every `property+:`/`property+_:` rule into the first declaration of
/// that property in this block, accumulating their values in source order
/// (spec.md §4.3's merge-separator suffixes). A property with no merge
/// marker is left exactly as evaluated.
fn merge_rule_values(rules: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(rules.len());
    let mut first_index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for node in rules {
        let Node::Rule(rule) = &node else {
            out.push(node);
            continue;
        };
        let Node::Value(value) = rule.value.as_ref() else {
            out.push(node);
            continue;
        };
        if value.merge.is_empty() {
            out.push(node);
            continue;
        }
        if let Some(&idx) = first_index.get(&rule.name) {
            let new_expressions = value.expressions.clone();
            let new_merge = value.merge.clone();
            if let Node::Rule(existing) = &mut out[idx] {
                if let Node::Value(existing_value) = existing.value.as_mut() {
                    existing_value.expressions.extend(new_expressions);
                    existing_value.merge = new_merge;
                }
            }
        } else {
            first_index.insert(rule.name.clone(), out.len());
            out.push(node);
        }
    }
    out
}

/// Evaluates one top-level-or-nested statement, pushing zero or more
/// resulting nodes onto `out` (a mixin call can expand into many rules; a
/// variable declaration expands into none).
fn evaluate_statement(node: &Node, env: &mut Env, out: &mut Vec<Node>) -> Result<(), EvalError> {
    match node {
        Node::Rule(rule) => {
            if rule.is_variable {
                return Ok(());
            }
            let value = evaluate(&rule.value, env)?;
            let guard = env.enter_rule(rule.clone());
            let _ = &guard;
            out.push(Node::Rule(RuleNode {
                data: rule.data.clone(),
                name: rule.name.clone(),
                value: Box::new(value),
                is_variable: false,
                interpolated_name: rule.interpolated_name,
            }));
            drop(guard);
            Ok(())
        }
        Node::Ruleset(rs) => {
            record_inline_extends(&rs.selectors, env);
            let selectors_guard = env.enter_selectors(rs.selectors.clone());
            let rules = env.with_frame(Frame::new(rs.rules.clone()), |env| evaluate_body(&rs.rules, env))?;
            drop(selectors_guard);
            out.push(Node::Ruleset(RulesetNode { data: rs.data.clone(), selectors: rs.selectors.clone(), rules }));
            Ok(())
        }
        Node::GuardedRuleset(gr) => {
            if evaluate_condition(&gr.guard, env)? {
                record_inline_extends(&gr.selectors, env);
                let selectors_guard = env.enter_selectors(gr.selectors.clone());
                let rules = env.with_frame(Frame::new(gr.rules.clone()), |env| evaluate_body(&gr.rules, env))?;
                drop(selectors_guard);
                out.push(Node::Ruleset(RulesetNode {
                    data: gr.data.clone(),
                    selectors: gr.selectors.clone(),
                    rules,
                }));
            }
            Ok(())
        }
        Node::Media(m) => {
            let features = m.features.iter().map(|f| evaluate(f, env)).collect::<Result<Vec<_>, _>>()?;
            let rules = env.with_frame(Frame::new(m.rules.clone()), |env| evaluate_body(&m.rules, env))?;
            out.push(Node::Media(MediaNode { data: m.data.clone(), features, rules }));
            Ok(())
        }
        Node::Directive(d) => {
            let rules = match &d.rules {
                Some(rules) => Some(env.with_frame(Frame::new(rules.clone()), |env| evaluate_body(rules, env))?),
                None => None,
            };
            let value = d.value.as_ref().map(|v| evaluate(v, env)).transpose()?.map(Box::new);
            out.push(Node::Directive(DirectiveNode {
                data: d.data.clone(),
                name: d.name.clone(),
                identifier: d.identifier.clone(),
                rules,
                value,
            }));
            Ok(())
        }
        Node::KeyFrame(k) => {
            let mut frames = Vec::with_capacity(k.frames.len());
            for (selectors, rules) in &k.frames {
                let selectors = selectors.iter().map(|s| evaluate(s, env)).collect::<Result<Vec<_>, _>>()?;
                let rules = env.with_frame(Frame::new(rules.clone()), |env| evaluate_body(rules, env))?;
                frames.push((selectors, rules));
            }
            out.push(Node::KeyFrame(KeyFrameNode { data: k.data.clone(), name: k.name.clone(), frames }));
            Ok(())
        }
        Node::MixinDefinition(_) => Ok(()),
        Node::MixinCall(call) => evaluate_mixin_call(call, env, out),
        Node::Import(import) => evaluate_import(import, env, out),
        Node::Extend(extend) => {
            // A bare `&:extend(...)` statement extends every selector of
            // the ruleset it sits directly inside.
            for extender in env.current_selectors() {
                for target in &extend.targets {
                    env.record_extend(crate::visit::ExtendRecord { extender: extender.clone(), target: target.clone(), partial: extend.all });
                }
            }
            Ok(())
        }
        other => {
            out.push(evaluate(other, env)?);
            Ok(())
        }
    }
}

/// Evaluates a node that appears as a *value* (inside a rule, an
/// expression, a call argument, ...) to its reduced form.
pub fn evaluate(node: &Node, env: &mut Env) -> Result<Node, EvalError> {
    match node {
        Node::Text(_) | Node::Keyword(_) | Node::Color(_) => Ok(node.clone()),
        Node::Script(s) => {
            log::warn!("inline script at {:?} is not supported, emitting a placeholder", s.data.location);
            Ok(Node::Text(TextNode { data: s.data.clone(), value: "[script unsupported]".to_string() }))
        }
        Node::Number(n) => Ok(Node::Number(n.clone())),
        Node::Quoted(q) => evaluate_quoted(q, env),
        Node::Variable(v) => evaluate_variable(v, env),
        Node::Url(u) => Ok(Node::Url(UrlNode { data: u.data.clone(), inner: Box::new(evaluate(&u.inner, env)?) })),
        Node::Call(c) => evaluate_call(c, env),
        Node::Assignment(a) => {
            Ok(Node::Assignment(AssignmentNode { data: a.data.clone(), key: a.key.clone(), value: Box::new(evaluate(&a.value, env)?) }))
        }
        Node::Operation(op) => evaluate_operation(op, env),
        Node::Paren(p) => evaluate(&p.inner, env),
        Node::Shorthand(s) => Ok(Node::Shorthand(ShorthandNode {
            data: s.data.clone(),
            a: Box::new(evaluate(&s.a, env)?),
            b: Box::new(evaluate(&s.b, env)?),
        })),
        Node::Condition(cond) => {
            let truth = evaluate_condition(node, env)?;
            let _ = cond;
            Ok(Node::keyword(if truth { "true" } else { "false" }))
        }
        Node::Expression(e) => {
            let items = e.items.iter().map(|n| evaluate(n, env)).collect::<Result<Vec<_>, _>>()?;
            Ok(Node::Expression(ExpressionNode { data: e.data.clone(), items }))
        }
        Node::Value(v) => {
            let expressions = v.expressions.iter().map(|n| evaluate(n, env)).collect::<Result<Vec<_>, _>>()?;
            Ok(Node::Value(ValueNode { data: v.data.clone(), expressions, important: v.important.clone(), merge: v.merge.clone() }))
        }
        other => Ok(other.clone()),
    }
}

fn evaluate_variable(v: &VariableNode, env: &mut Env) -> Result<Node, EvalError> {
    let loc = v.data.location.clone().unwrap_or_default();
    let name = if let Some(inner) = v.name.strip_prefix("@@") {
        let indirect = env.find_variable(&format!("@{inner}")).ok_or_else(|| EvalError::UndefinedVariable(inner.to_string(), loc.clone()))?;
        let resolved = evaluate(&indirect.value, env)?;
        match &resolved {
            Node::Keyword(k) => format!("@{}", k.value),
            Node::Quoted(q) => format!("@{}", q.content),
            _ => return Err(EvalError::UndefinedVariable(inner.to_string(), loc)),
        }
    } else {
        v.name.clone()
    };
    let rule = env.find_variable(&name).ok_or_else(|| EvalError::UndefinedVariable(name.trim_start_matches('@').to_string(), loc.clone()))?;
    let _guard = env.enter_variable(&name, loc)?;
    evaluate(&rule.value, env)
}

fn evaluate_quoted(q: &QuotedNode, env: &mut Env) -> Result<Node, EvalError> {
    if !q.content.contains("@{") {
        return Ok(Node::Quoted(q.clone()));
    }
    let mut result = String::with_capacity(q.content.len());
    let mut rest = q.content.as_str();
    while let Some(start) = rest.find("@{") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = format!("@{}", &after[..end]);
        let loc = q.data.location.clone().unwrap_or_default();
        let value = env
            .find_variable(&name)
            .ok_or_else(|| EvalError::UndefinedVariable(name.trim_start_matches('@').to_string(), loc.clone()))
            .and_then(|rule| evaluate(&rule.value, env))?;
        result.push_str(&plain_text(&value));
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    Ok(Node::Quoted(QuotedNode { data: q.data.clone(), quote: q.quote, escaped: q.escaped, content: result }))
}

/// Renders an already-evaluated node as plain text, for interpolation
/// contexts (`@{var}` inside strings, selectors, and property names).
pub fn plain_text(node: &Node) -> String {
    match node {
        Node::Keyword(k) => k.value.clone(),
        Node::Text(t) => t.value.clone(),
        Node::Quoted(q) => q.content.clone(),
        Node::Number(n) => format!("{}{}", format_number(n.value), n.unit),
        Node::Color(c) => color::format_css(c.rgba, false),
        _ => String::new(),
    }
}

/// Formats a number the way CSS expects: no trailing `.0`, no trailing zeros
/// past the decimal point.
pub(crate) fn format_number(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v}")
    } else {
        let s = format!("{v:.6}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn evaluate_operation(op: &OperationNode, env: &mut Env) -> Result<Node, EvalError> {
    let left = evaluate(&op.left, env)?;
    let right = evaluate(&op.right, env)?;
    // Strict math only folds arithmetic written inside an explicit `(...)`;
    // everything else passes through with its operands reduced but the
    // operation itself left as written (spec.md §9).
    if env.strict_math && !op.in_parens {
        return Ok(Node::Operation(OperationNode {
            data: op.data.clone(),
            op: op.op,
            left: Box::new(left),
            right: Box::new(right),
            in_parens: op.in_parens,
        }));
    }
    let loc = op.data.location.clone().unwrap_or_default();
    let symbol = match op.op {
        ArithOp::Add => '+',
        ArithOp::Sub => '-',
        ArithOp::Mul => '*',
        ArithOp::Div => '/',
    };
    match (&left, &right) {
        (Node::Number(a), Node::Number(b)) => {
            if matches!(op.op, ArithOp::Div) && b.value == 0.0 {
                return Err(EvalError::DivideByZero(loc));
            }
            let unit = if a.unit.is_empty() {
                b.unit.clone()
            } else if b.unit.is_empty() || a.unit.eq_ignore_ascii_case(&b.unit) {
                a.unit.clone()
            } else if units::is_convertible(&a.unit) && units::is_convertible(&b.unit) {
                a.unit.clone()
            } else {
                return Err(EvalError::IncompatibleUnits { left: a.unit.clone(), right: b.unit.clone(), location: loc });
            };
            let b_value = if !a.unit.is_empty() && !b.unit.is_empty() && !a.unit.eq_ignore_ascii_case(&b.unit) {
                units::convert(b.value, &b.unit, &a.unit).ok_or_else(|| EvalError::IncompatibleUnits {
                    left: a.unit.clone(),
                    right: b.unit.clone(),
                    location: loc.clone(),
                })?
            } else {
                b.value
            };
            let value = match op.op {
                ArithOp::Add => a.value + b_value,
                ArithOp::Sub => a.value - b_value,
                ArithOp::Mul => a.value * b_value,
                ArithOp::Div => a.value / b_value,
            };
            Ok(Node::Number(NumberNode { data: op.data.clone(), value, unit }))
        }
        (Node::Color(a), Node::Color(b)) => Ok(Node::Color(ColorNode { data: op.data.clone(), rgba: color::operate(symbol, a.rgba, b.rgba) })),
        (Node::Color(a), Node::Number(b)) => {
            Ok(Node::Color(ColorNode { data: op.data.clone(), rgba: color::operate_scalar(symbol, a.rgba, b.value) }))
        }
        (Node::Number(a), Node::Color(b)) => {
            if matches!(op.op, ArithOp::Sub | ArithOp::Div) {
                return Err(EvalError::ColorArithmetic(loc));
            }
            Ok(Node::Color(ColorNode { data: op.data.clone(), rgba: color::operate_scalar(symbol, b.rgba, a.value) }))
        }
        (Node::Quoted(a), _) => {
            let mut content = a.content.clone();
            content.push_str(&plain_text(&right));
            Ok(Node::Quoted(QuotedNode { data: op.data.clone(), quote: a.quote, escaped: a.escaped, content }))
        }
        _ => Err(EvalError::IncomparableOperands(loc)),
    }
}

/// Evaluates a guard `Condition` tree (including `and`/`or` composition, kept
/// as nested `Expression` nodes by the parser) to a boolean.
pub fn evaluate_condition(node: &Node, env: &mut Env) -> Result<bool, EvalError> {
    match node {
        Node::Condition(c) => {
            let left = evaluate(&c.left, env)?;
            let truth = match (&c.op, &c.right) {
                (None, _) => is_truthy(&left),
                (Some(op), Some(right)) => {
                    let right = evaluate(right, env)?;
                    compare(op, &left, &right, c.data.location.clone().unwrap_or_default())?
                }
                (Some(_), None) => unreachable!("Condition with an op must carry a right operand"),
            };
            Ok(truth != c.negate)
        }
        Node::Expression(e) if e.items.len() >= 3 => {
            // `a and b`, `a or b` are folded into a flat Expression by the
            // parser: [cond, Keyword("and"|"or"), cond, ...].
            let mut result = evaluate_condition(&e.items[0], env)?;
            let mut i = 1;
            while i + 1 < e.items.len() {
                let op_is_and = matches!(&e.items[i], Node::Keyword(k) if k.value.eq_ignore_ascii_case("and"));
                let rhs = evaluate_condition(&e.items[i + 1], env)?;
                result = if op_is_and { result && rhs } else { result || rhs };
                i += 2;
            }
            Ok(result)
        }
        Node::Expression(e) if e.items.len() == 1 => evaluate_condition(&e.items[0], env),
        other => Ok(is_truthy(&evaluate(other, env)?)),
    }
}

fn is_truthy(node: &Node) -> bool {
    match node {
        Node::Keyword(k) => !k.value.eq_ignore_ascii_case("false"),
        _ => true,
    }
}

/// `default()` is a pseudo-call used only inside guards, true iff no
/// sibling alternative with a non-default guard already matched. This core
/// resolves it structurally in `select_mixin_candidates` instead of here;
/// `evaluate_condition` never sees a bare `default()` call reach this far.
pub fn is_default_guard(node: &Node) -> bool {
    matches!(node, Node::Call(c) if c.name.eq_ignore_ascii_case("default") && c.args.is_empty())
}

fn compare(op: &CompareOp, left: &Node, right: &Node, loc: Location) -> Result<bool, EvalError> {
    let ordering = match (left, right) {
        (Node::Number(a), Node::Number(b)) => {
            let b_value = if a.unit.eq_ignore_ascii_case(&b.unit) || b.unit.is_empty() || a.unit.is_empty() {
                b.value
            } else {
                units::convert(b.value, &b.unit, &a.unit).unwrap_or(b.value)
            };
            a.value.partial_cmp(&b_value).ok_or_else(|| EvalError::IncomparableOperands(loc.clone()))?
        }
        (Node::Keyword(a), Node::Keyword(b)) => a.value.cmp(&b.value),
        (Node::Color(a), Node::Color(b)) => {
            let ka = (a.rgba.r as i64, a.rgba.g as i64, a.rgba.b as i64, (a.rgba.a * 255.0) as i64);
            let kb = (b.rgba.r as i64, b.rgba.g as i64, b.rgba.b as i64, (b.rgba.a * 255.0) as i64);
            ka.cmp(&kb)
        }
        (Node::Quoted(a), Node::Quoted(b)) => a.content.cmp(&b.content),
        _ => return Err(EvalError::IncomparableOperands(loc)),
    };
    Ok(match op {
        CompareOp::Eq => ordering.is_eq(),
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::Le => ordering.is_le(),
        CompareOp::Ge => ordering.is_ge(),
    })
}

fn evaluate_call(c: &CallNode, env: &mut Env) -> Result<Node, EvalError> {
    let loc = c.data.location.clone().unwrap_or_default();
    let args = c.args.iter().map(|a| evaluate(a, env)).collect::<Result<Vec<_>, _>>()?;
    if let Some(f) = env.function(&c.name) {
        return f(&args, loc);
    }
    Ok(Node::Call(CallNode { data: c.data.clone(), name: c.name.clone(), args }))
}

fn evaluate_import(import: &ImportNode, env: &mut Env, out: &mut Vec<Node>) -> Result<(), EvalError> {
    let loc = import.data.location.clone().unwrap_or_default();
    let path_node = evaluate(&import.path, env)?;
    let path = plain_text(&path_node);
    let reference = import.options.contains(&ImportOption::Reference);
    let inline = import.options.contains(&ImportOption::Inline);
    let css_only = import.options.contains(&ImportOption::Css);
    let optional = import.options.contains(&ImportOption::Optional);
    let once = !import.options.contains(&ImportOption::Multiple);

    let Some(importer) = env.importer() else {
        if optional {
            return Ok(());
        }
        return Err(EvalError::ImportFailed(format!("no importer configured for '{path}'"), loc));
    };
    let imported = match importer.import(&path, env.file()) {
        Ok(i) => i,
        Err(e) if optional => {
            log::debug!("optional import '{path}' failed, skipping: {}", e.0);
            return Ok(());
        }
        Err(e) => return Err(EvalError::ImportFailed(e.0, loc)),
    };
    if once && env.mark_imported(&imported.canonical_path) {
        log::debug!("'{}' already imported, skipping", imported.canonical_path);
        return Ok(());
    }
    if inline || css_only {
        out.push(Node::Text(TextNode { data: import.data.clone(), value: imported.source }));
        return Ok(());
    }

    log::debug!("importing '{}'", imported.canonical_path);
    let body = crate::parser::parse(&imported.source, Some(imported.canonical_path.as_str()), env.config()).map_err(|e| {
        EvalError::Nested { inner: Box::new(e), location: loc.clone() }
    })?;
    let mut nested = evaluate_body(&body, env).map_err(|e| {
        let inner: crate::error::ParsingError = e.into();
        EvalError::Nested { inner: Box::new(inner), location: loc.clone() }
    })?;
    if reference {
        for node in &mut nested {
            mark_reference(node);
        }
    }
    out.extend(nested);
    Ok(())
}

/// Records one [`crate::visit::ExtendRecord`] per `selector:extend(...)`
/// clause directly attached to a selector in `selectors` (as opposed to a
/// bare `&:extend(...)` statement inside the ruleset's body, which applies
/// to every selector and is handled where `Node::Extend` is evaluated).
fn record_inline_extends(selectors: &[SelectorNode], env: &Env) {
    for selector in selectors {
        for extend in &selector.extends {
            for target in &extend.targets {
                env.record_extend(crate::visit::ExtendRecord {
                    extender: SelectorNode { data: selector.data.clone(), elements: selector.elements.clone(), extends: Vec::new() },
                    target: target.clone(),
                    partial: extend.all,
                });
            }
        }
    }
}

/// Marks `node` and everything nested under it as originating from a
/// `(reference)` import (spec.md §6): such nodes are only emitted if later
/// pulled in by an `extend` or mixin call.
fn mark_reference(node: &mut Node) {
    node.data_mut().is_reference = true;
    match node {
        Node::Ruleset(rs) => rs.rules.iter_mut().for_each(mark_reference),
        Node::Media(m) => m.rules.iter_mut().for_each(mark_reference),
        Node::Directive(d) => {
            if let Some(rules) = &mut d.rules {
                rules.iter_mut().for_each(mark_reference);
            }
        }
        Node::KeyFrame(k) => {
            for (_, rules) in &mut k.frames {
                rules.iter_mut().for_each(mark_reference);
            }
        }
        _ => {}
    }
}

// --- mixins ---------------------------------------------------------------

/// Why a candidate mixin/ruleset did or didn't match a call, in the
/// precedence order `Pass` > `Default` > everything else (spec.md §4.4).
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum MatchOutcome {
    GuardFail,
    ArgumentMismatch,
    Default,
    Pass,
}

struct Candidate<'d> {
    def: &'d MixinDefinitionNode,
    frame: Rc<Frame>,
}

fn collect_candidates<'d>(path: &str, body: &'d [Node]) -> Vec<Candidate<'d>> {
    let mut out = Vec::new();
    for node in body {
        if let Node::MixinDefinition(def) = node {
            if def.name == path {
                out.push(Candidate { def, frame: Frame::new(body.to_vec()) });
            }
        }
    }
    out
}

/// A plain ruleset (guarded or not) whose sole selector reads as a dotted/
/// hashed path is callable as a mixin with no parameters, the same as real
/// LESS: `.c { a: 1; }` and `.out { .c; }` work without `.c` ever being
/// declared with a parameter list. Synthesizes an equivalent
/// [`MixinDefinitionNode`] so it can be judged and expanded through the same
/// machinery as a declared mixin.
fn ruleset_as_mixin_def(path: &str, node: &Node) -> Option<MixinDefinitionNode> {
    let (selectors, rules, guard) = match node {
        Node::Ruleset(rs) => (&rs.selectors, &rs.rules, None),
        Node::GuardedRuleset(gr) => (&gr.selectors, &gr.rules, Some(gr.guard.clone())),
        _ => return None,
    };
    if selectors.len() != 1 || crate::visit::selector_key(&selectors[0]) != path {
        return None;
    }
    Some(MixinDefinitionNode {
        data: NodeData::default(),
        name: path.to_string(),
        params: Vec::new(),
        rules: rules.clone(),
        guard,
        variadic: false,
    })
}

fn evaluate_mixin_call(call: &MixinCallNode, env: &mut Env, out: &mut Vec<Node>) -> Result<(), EvalError> {
    let loc = call.data.location.clone().unwrap_or_default();
    let mut evaluated_args = Vec::with_capacity(call.args.len());
    let mut seen_named = false;
    for arg in &call.args {
        if arg.name.is_some() {
            seen_named = true;
        } else if seen_named {
            return Err(EvalError::NamedAfterPositional(loc));
        }
        evaluated_args.push((arg.name.clone(), evaluate(&arg.value, env)?));
    }

    let frames_snapshot: Vec<Rc<Frame>> = env.frames().to_vec();

    // Plain (possibly guarded) rulesets callable by selector path have no
    // native `MixinDefinitionNode`; synthesize one per match up front so
    // `candidates` below can borrow them alongside declared mixins.
    let mut synthesized: Vec<(Box<MixinDefinitionNode>, Rc<Frame>)> = Vec::new();
    for frame in frames_snapshot.iter().rev() {
        for node in &frame.rules {
            if let Some(def) = ruleset_as_mixin_def(&call.path, node) {
                synthesized.push((Box::new(def), frame.clone()));
            }
        }
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    for frame in frames_snapshot.iter().rev() {
        candidates.extend(collect_candidates(&call.path, &frame.rules));
    }
    for (def, frame) in &synthesized {
        candidates.push(Candidate { def, frame: frame.clone() });
    }
    if candidates.is_empty() {
        return Err(EvalError::NoMatchingMixin(call.path.clone(), loc));
    }

    let mut judged: Vec<(MatchOutcome, &Candidate)> = Vec::new();
    for cand in &candidates {
        judged.push((judge_candidate(cand.def, &evaluated_args, env)?, cand));
    }
    let any_pass = judged.iter().any(|(o, _)| *o == MatchOutcome::Pass);
    let winners: Vec<&&Candidate> = judged
        .iter()
        .filter(|(o, _)| if any_pass { *o == MatchOutcome::Pass } else { *o == MatchOutcome::Default })
        .map(|(_, c)| c)
        .collect();

    if winners.is_empty() {
        return Err(EvalError::NoMatchingMixin(call.path.clone(), loc));
    }
    if winners.len() > 1 {
        log::debug!("mixin call '{}' matched {} definitions, expanding all of them", call.path, winners.len());
    }

    for winner in winners {
        let def = winner.def;
        let mut bound_rules = bind_arguments(def, &evaluated_args);
        bound_rules.extend(def.rules.clone());
        let frame = Frame::new(bound_rules);
        let mut expanded = env.with_frame(winner.frame.clone(), |env| env.with_frame(frame, |env| evaluate_body(&def.rules, env)))?;
        if call.important {
            expanded.iter_mut().for_each(force_important);
        }
        out.extend(expanded);
    }
    Ok(())
}

/// Forces `!important` onto every declaration reachable from `node`,
/// recursing into nested rulesets the same way a `.mixin() !important;` call
/// propagates into every rule the mixin expands to (spec.md §4.4).
fn force_important(node: &mut Node) {
    match node {
        Node::Rule(r) => {
            if let Node::Value(v) = r.value.as_mut() {
                v.important = "!important".to_string();
            }
        }
        Node::Ruleset(rs) => rs.rules.iter_mut().for_each(force_important),
        Node::Media(m) => m.rules.iter_mut().for_each(force_important),
        _ => {}
    }
}

fn judge_candidate(def: &MixinDefinitionNode, args: &[(Option<String>, Node)], env: &mut Env) -> Result<MatchOutcome, EvalError> {
    let positional = args.iter().filter(|(n, _)| n.is_none()).count();
    if positional < def.required() && !def.variadic {
        return Ok(MatchOutcome::ArgumentMismatch);
    }
    if positional > def.arity() && !def.variadic {
        return Ok(MatchOutcome::ArgumentMismatch);
    }
    for (i, param) in def.params.iter().enumerate() {
        if let Some(pattern) = &param.pattern {
            let supplied = args.get(i).map(|(_, v)| v.clone());
            let Some(supplied) = supplied else { return Ok(MatchOutcome::ArgumentMismatch) };
            let pattern_text = plain_text(pattern);
            if plain_text(&supplied) != pattern_text {
                return Ok(MatchOutcome::ArgumentMismatch);
            }
        }
    }
    let Some(guard) = &def.guard else {
        return Ok(MatchOutcome::Pass);
    };
    if contains_default_guard(guard) {
        return Ok(MatchOutcome::Default);
    }
    let bound = Frame::new(bind_arguments(def, args));
    let matched = env.with_frame(bound, |env| evaluate_condition(guard, env))?;
    Ok(if matched { MatchOutcome::Pass } else { MatchOutcome::GuardFail })
}

fn contains_default_guard(node: &Node) -> bool {
    match node {
        Node::Condition(c) => is_default_guard(&c.left) || c.right.as_deref().map(is_default_guard).unwrap_or(false),
        Node::Expression(e) => e.items.iter().any(contains_default_guard),
        _ => is_default_guard(node),
    }
}

/// Binds `args` to `def`'s parameters, returning one variable `Rule` per
/// named parameter plus a final `@arguments` rule collecting every supplied
/// argument in call order (spec.md §4.4).
fn bind_arguments(def: &MixinDefinitionNode, args: &[(Option<String>, Node)]) -> Vec<Node> {
    let positional: Vec<&(Option<String>, Node)> = args.iter().filter(|(n, _)| n.is_none()).collect();
    let mut rules = Vec::new();
    let mut pos_index = 0;
    for (i, param) in def.params.iter().enumerate() {
        let Some(name) = &param.name else { continue };
        let named = args.iter().find(|(n, _)| n.as_deref() == Some(name.trim_start_matches('@')));
        let value = if let Some((_, v)) = named {
            v.clone()
        } else if def.variadic && i == def.params.len() - 1 {
            Node::Expression(ExpressionNode {
                data: NodeData::default(),
                items: positional[pos_index.min(positional.len())..].iter().map(|(_, v)| v.clone()).collect(),
            })
        } else if let Some((_, v)) = positional.get(pos_index) {
            pos_index += 1;
            (*v).clone()
        } else if let Some(default) = &param.default {
            default.clone()
        } else {
            Node::keyword("")
        };
        rules.push(Node::Rule(RuleNode {
            data: NodeData::default(),
            name: name.clone(),
            value: Box::new(value),
            is_variable: true,
            interpolated_name: false,
        }));
    }
    let arguments_value = Node::Expression(ExpressionNode {
        data: NodeData::default(),
        items: args.iter().map(|(_, v)| v.clone()).collect(),
    });
    rules.push(Node::Rule(RuleNode {
        data: NodeData::default(),
        name: "@arguments".to_string(),
        value: Box::new(arguments_value),
        is_variable: true,
        interpolated_name: false,
    }));
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn num(v: f64, unit: &str) -> Node {
        Node::Number(NumberNode { data: NodeData::default(), value: v, unit: unit.to_string() })
    }

    #[test]
    fn adds_same_unit_numbers() {
        let config = Config::default();
        let mut env = Env::new(&config, None);
        let op = OperationNode { data: NodeData::default(), op: ArithOp::Add, left: Box::new(num(1.0, "px")), right: Box::new(num(2.0, "px")), in_parens: true };
        let result = evaluate_operation(&op, &mut env).unwrap();
        match result {
            Node::Number(n) => assert_eq!((n.value, n.unit), (3.0, "px".to_string())),
            _ => panic!("expected number"),
        }
    }

    #[test]
    fn incompatible_units_error() {
        let config = Config::default();
        let mut env = Env::new(&config, None);
        let op = OperationNode { data: NodeData::default(), op: ArithOp::Add, left: Box::new(num(1.0, "px")), right: Box::new(num(2.0, "s")), in_parens: true };
        let err = evaluate_operation(&op, &mut env).unwrap_err();
        assert!(matches!(err, EvalError::IncompatibleUnits { .. }));
    }
}
