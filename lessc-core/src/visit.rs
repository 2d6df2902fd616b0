//! The visitor pipeline (spec.md §4.4 tail, §9 design notes).
//!
//! Post-evaluation passes traverse the reduced tree. The only pass this
//! core implements is extend resolution: every `Extend` encountered during
//! evaluation is recorded as an [`ExtendRecord`]; a final pass rewrites
//! every selector elsewhere in the tree that the record's target matches,
//! appending the extender's selector as an alternative.
//!
//! Modelled as a plain transformation function rather than a trait of
//! per-node visitor methods with derived-class state, per spec.md's design
//! note that no per-node state needs to be stored between visits.

use crate::ast::{Node, RulesetNode, SelectorNode};

/// One resolved `extend` relationship: `extender` should also match
/// wherever `target` matches.
#[derive(Clone, Debug)]
pub struct ExtendRecord {
    /// The selector requesting the extension (`.b` in `.b:extend(.a)`).
    pub extender: SelectorNode,
    /// The selector being targeted (`.a` in `.b:extend(.a)`).
    pub target: SelectorNode,
    /// `all` was given: match as a prefix rather than an exact selector.
    pub partial: bool,
}

/// Renders a selector's elements to a comparable plain-text key, ignoring
/// comments and location — used both for exact/prefix matching and for
/// de-duplicating selectors appended by multiple extends, and (from
/// `eval::evaluate_mixin_call`) to recognize a plain ruleset's selector as a
/// callable mixin path.
pub(crate) fn selector_key(selector: &SelectorNode) -> String {
    selector
        .elements
        .iter()
        .map(|e| format!("{}{}", e.combinator.symbol(), element_text(&e.value)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn element_text(node: &Node) -> String {
    match node {
        Node::Keyword(k) => k.value.clone(),
        Node::Text(t) => t.value.clone(),
        _ => String::new(),
    }
}

/// Whether `candidate` matches `target` under `partial` semantics: exact
/// equality, or (when `partial`) `target` is a trailing run of `candidate`'s
/// elements.
fn matches(candidate: &SelectorNode, target: &SelectorNode, partial: bool) -> bool {
    let candidate_key = selector_key(candidate);
    let target_key = selector_key(target);
    if candidate_key == target_key {
        return true;
    }
    partial && candidate_key.ends_with(&target_key) && candidate_key != target_key
}

/// Walks every [`Ruleset`](Node::Ruleset) in `tree`, appending `record.extender`
/// as an additional selector alternative wherever `record.target` matches
/// one of the ruleset's existing selectors.
pub fn apply_extend(tree: &mut [Node], record: &ExtendRecord) {
    for node in tree {
        if let Node::Ruleset(ruleset) = node {
            extend_ruleset(ruleset, record);
        }
        if let Node::Media(media) = node {
            apply_extend(&mut media.rules, record);
        }
    }
}

fn extend_ruleset(ruleset: &mut RulesetNode, record: &ExtendRecord) {
    let mut to_add = Vec::new();
    let mut matched = false;
    for selector in &ruleset.selectors {
        if matches(selector, &record.target, record.partial) {
            to_add.push(record.extender.clone());
            matched = true;
        }
    }
    let existing: std::collections::HashSet<String> =
        ruleset.selectors.iter().map(selector_key).collect();
    for candidate in to_add {
        if !existing.contains(&selector_key(&candidate)) {
            ruleset.selectors.push(candidate);
        }
    }
    // A ruleset pulled in from a `(reference)` import becomes visible once
    // something elsewhere extends one of its selectors (spec.md §4.4
    // `Import.Evaluate`'s "except where extended or mixed in").
    if matched && ruleset.data.is_reference {
        ruleset.data.is_reference = false;
        for rule in &mut ruleset.rules {
            clear_reference(rule);
        }
    }
    apply_extend(&mut ruleset.rules, record);
}

/// Recursively clears `is_reference`, the inverse of `eval::mark_reference`.
fn clear_reference(node: &mut Node) {
    node.data_mut().is_reference = false;
    match node {
        Node::Ruleset(rs) => rs.rules.iter_mut().for_each(clear_reference),
        Node::Media(m) => m.rules.iter_mut().for_each(clear_reference),
        Node::Directive(d) => {
            if let Some(rules) = &mut d.rules {
                rules.iter_mut().for_each(clear_reference);
            }
        }
        Node::KeyFrame(k) => {
            for (_, rules) in &mut k.frames {
                rules.iter_mut().for_each(clear_reference);
            }
        }
        _ => {}
    }
}

/// Applies every record in `records` to `tree`, in order.
pub fn resolve_extends(tree: &mut [Node], records: &[ExtendRecord]) {
    for record in records {
        apply_extend(tree, record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Combinator, ElementNode, NodeData};

    fn class_selector(name: &str) -> SelectorNode {
        SelectorNode {
            data: NodeData::default(),
            elements: vec![ElementNode {
                data: NodeData::default(),
                combinator: Combinator::Descendant,
                value: Box::new(Node::keyword(name)),
            }],
            extends: vec![],
        }
    }

    fn ruleset(selector: SelectorNode) -> Node {
        Node::Ruleset(RulesetNode { data: NodeData::default(), selectors: vec![selector], rules: vec![] })
    }

    #[test]
    fn scenario_d_extend_adds_alternative_selector() {
        let mut tree = vec![ruleset(class_selector(".a"))];
        let record = ExtendRecord { extender: class_selector(".b"), target: class_selector(".a"), partial: false };
        resolve_extends(&mut tree, &[record]);
        if let Node::Ruleset(rs) = &tree[0] {
            assert_eq!(rs.selectors.len(), 2);
        } else {
            panic!("expected ruleset");
        }
    }
}
