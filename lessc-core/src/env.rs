//! The evaluation environment (spec.md §4.4).
//!
//! Carries the scope chain, output buffer stack, function registry,
//! importer capability, and the two pieces of transient state that must
//! never outlive the call that set them: the variable-evaluation guard set
//! (recursion detection) and the back-pointer to the rule currently being
//! evaluated. Both are restored on exit via RAII guards rather than left as
//! plain mutable fields any node could reach, per spec.md §9's design notes.

use crate::ast::{Node, RuleNode, SelectorNode};
use crate::config::Config;
use crate::emit::Output;
use crate::error::{EvalError, Location};
use crate::functions::{builtin_functions, Function};
use crate::importer::Importer;
use crate::visit::ExtendRecord;
use scopeguard::guard;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use unicase::UniCase;

/// A single scope: the rules visible while evaluating inside it. Frames are
/// reference-counted so a mixin's expanded body can share its defining
/// ruleset's frame without cloning it.
pub struct Frame {
    /// The rules contributed to lookup by this frame, in source order.
    pub rules: Vec<Node>,
}

impl Frame {
    /// Wraps a rule list as a frame.
    pub fn new(rules: Vec<Node>) -> Rc<Self> {
        Rc::new(Self { rules })
    }
}

/// The evaluation environment threaded through every `Evaluate` call.
pub struct Env<'a> {
    frames: Vec<Rc<Frame>>,
    /// The CSS output buffer stack.
    pub output: Output,
    /// Whitespace/punctuation compression (spec.md §4.5).
    pub compress: bool,
    /// Arithmetic operators only honored inside parentheses.
    pub strict_math: bool,
    config: &'a Config<'a>,
    functions: HashMap<UniCase<String>, Function>,
    importer: Option<&'a dyn Importer>,
    evaluating_vars: RefCell<HashSet<String>>,
    current_rule: RefCell<Option<RuleNode>>,
    imported_paths: RefCell<HashSet<String>>,
    file: Option<String>,
    extends: RefCell<Vec<ExtendRecord>>,
    current_selectors: RefCell<Vec<SelectorNode>>,
}

impl<'a> Env<'a> {
    /// Creates a fresh environment from `config`.
    pub fn new(config: &'a Config<'a>, file: Option<&str>) -> Self {
        Self {
            frames: Vec::new(),
            output: Output::new(),
            compress: config.compress,
            strict_math: config.strict_math,
            config,
            functions: builtin_functions(),
            importer: config.importer,
            evaluating_vars: RefCell::new(HashSet::new()),
            current_rule: RefCell::new(None),
            imported_paths: RefCell::new(HashSet::new()),
            file: file.map(str::to_string),
            extends: RefCell::new(Vec::new()),
            current_selectors: RefCell::new(Vec::new()),
        }
    }

    /// Records an `extend` relationship discovered during evaluation, for a
    /// final resolution pass over the whole tree once evaluation completes.
    pub fn record_extend(&self, record: ExtendRecord) {
        self.extends.borrow_mut().push(record);
    }

    /// Takes every `extend` relationship recorded so far, leaving none
    /// behind.
    pub fn take_extends(&self) -> Vec<ExtendRecord> {
        std::mem::take(&mut self.extends.borrow_mut())
    }

    /// The configuration this environment was created from, for spawning a
    /// nested [`Env`] over an imported file's own source.
    pub fn config(&self) -> &'a Config<'a> {
        self.config
    }

    /// The file name hint for this compilation, for error locations.
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// Builds a [`Location`] at `index` in this compilation's file.
    pub fn location(&self, index: usize) -> Location {
        Location::new(index, self.file.as_deref())
    }

    /// The active frame stack, innermost (most recently pushed) last.
    pub fn frames(&self) -> &[Rc<Frame>] {
        &self.frames
    }

    /// Evaluates `f` with `frame` pushed as the innermost scope, popping it
    /// again before returning (on every path, including early returns via
    /// `?`, since this is ordinary stack unwinding through the closure
    /// call).
    pub fn with_frame<T>(&mut self, frame: Rc<Frame>, f: impl FnOnce(&mut Self) -> T) -> T {
        self.frames.push(frame);
        let result = f(self);
        self.frames.pop();
        result
    }

    /// Looks up a registered function by name (case-insensitive).
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(&UniCase::new(name.to_string()))
    }

    /// The importer capability, if one was configured.
    pub fn importer(&self) -> Option<&'a dyn Importer> {
        self.importer
    }

    /// Records `canonical_path` as imported, returning whether it had
    /// already been recorded (used to implement `@import (once)`).
    pub fn mark_imported(&self, canonical_path: &str) -> bool {
        !self.imported_paths.borrow_mut().insert(canonical_path.to_string())
    }

    /// Finds the nearest (innermost-first) variable rule named `name`
    /// (including its leading `@`). Within one frame, a later definition
    /// shadows an earlier one in the same scope.
    pub fn find_variable(&self, name: &str) -> Option<RuleNode> {
        for frame in self.frames.iter().rev() {
            for node in frame.rules.iter().rev() {
                if let Node::Rule(rule) = node {
                    if rule.is_variable && rule.name == name {
                        return Some(rule.clone());
                    }
                }
            }
        }
        None
    }

    /// Enters the variable named `name` for recursion detection, failing
    /// with [`EvalError::RecursiveVariable`] if it's already being
    /// evaluated. The returned guard removes `name` from the set on drop,
    /// regardless of how evaluation of its value returns.
    pub fn enter_variable<'e>(
        &'e self,
        name: &str,
        location: Location,
    ) -> Result<impl Drop + 'e, EvalError> {
        if self.evaluating_vars.borrow().contains(name) {
            return Err(EvalError::RecursiveVariable(name.trim_start_matches('@').to_string(), location));
        }
        self.evaluating_vars.borrow_mut().insert(name.to_string());
        let cell = &self.evaluating_vars;
        let owned = name.to_string();
        Ok(guard(owned, move |name| {
            cell.borrow_mut().remove(&name);
        }))
    }

    /// Sets the transient back-pointer to the rule currently being
    /// evaluated, restoring the previous value on drop.
    pub fn enter_rule<'e>(&'e self, rule: RuleNode) -> impl Drop + 'e {
        let previous = self.current_rule.replace(Some(rule));
        let cell = &self.current_rule;
        guard(previous, move |previous| {
            *cell.borrow_mut() = previous;
        })
    }

    /// The rule currently being evaluated, if any.
    pub fn current_rule(&self) -> Option<RuleNode> {
        self.current_rule.borrow().clone()
    }

    /// Sets the selector list of the ruleset currently being evaluated, so a
    /// bare `&:extend(...)` statement inside its body can name the right
    /// extender. Restored on drop.
    pub fn enter_selectors<'e>(&'e self, selectors: Vec<SelectorNode>) -> impl Drop + 'e {
        let previous = self.current_selectors.replace(selectors);
        let cell = &self.current_selectors;
        guard(previous, move |previous| {
            *cell.borrow_mut() = previous;
        })
    }

    /// The selector list of the ruleset currently being evaluated, if any.
    pub fn current_selectors(&self) -> Vec<SelectorNode> {
        self.current_selectors.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NodeData, RuleNode};

    fn rule(name: &str, value: Node) -> Node {
        Node::Rule(RuleNode {
            data: NodeData::default(),
            name: name.to_string(),
            value: Box::new(value),
            is_variable: RuleNode::is_variable(name),
            interpolated_name: false,
        })
    }

    #[test]
    fn inner_frame_shadows_outer() {
        let config = Config::default();
        let mut env = Env::new(&config, None);
        let outer = Frame::new(vec![rule("@a", Node::text("1"))]);
        env.with_frame(outer, |env| {
            let inner = Frame::new(vec![rule("@a", Node::text("2"))]);
            env.with_frame(inner, |env| {
                let found = env.find_variable("@a").unwrap();
                assert_eq!(found.name, "@a");
            });
        });
    }

    #[test]
    fn recursive_variable_is_detected() {
        let config = Config::default();
        let env = Env::new(&config, None);
        let loc = env.location(0);
        let _guard = env.enter_variable("@a", loc.clone()).unwrap();
        let err = env.enter_variable("@a", loc).unwrap_err();
        assert!(matches!(err, EvalError::RecursiveVariable(_, _)));
    }
}
