//! Scenario-level compile checks: each case exercises the full pipeline
//! (chunker, parser, evaluator, extend resolution, emitter) against a
//! realistic snippet and pins the resulting CSS text.

use lessc_core::{compile, Config};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
#[case::arithmetic_with_unit_inference(
    "@w: 10px; .c{ width: @w + 4px; }",
    ".c {\n  width: 14px;\n}\n"
)]
#[case::mixin_default_and_explicit_argument(
    ".r(@r: 2px){ border-radius: @r; } .a{ .r; } .b{ .r(6px); }",
    ".a {\n  border-radius: 2px;\n}\n.b {\n  border-radius: 6px;\n}\n"
)]
#[case::guarded_ruleset_called_as_a_mixin(
    ".c when (@x = true){ a: 1; } @x: true; .out{ .c; }",
    ".out {\n  a: 1;\n}\n"
)]
#[case::extend_appends_an_alternative_selector(
    ".a{ color: red; } .b:extend(.a){ x: 1; }",
    ".a,\n.b {\n  color: red;\n}\n.b {\n  x: 1;\n}\n"
)]
#[case::plus_merge_accumulates_comma_separated_values(
    ".x{ a+: 1; a+: 2; }",
    ".x {\n  a: 1, 2;\n}\n"
)]
fn compiles_to_expected_css(#[case] source: &str, #[case] expected: &str) {
    let config = Config::default();
    let css = compile(source, None, &config).unwrap();
    assert_eq!(css, expected);
}

#[test]
fn compression_shortens_colors_and_elides_the_final_semicolon() {
    let mut config = Config::default();
    config.compress = true;
    let css = compile(".a{ color: #ffffff; margin: 0 0 0 0; }", None, &config).unwrap();
    assert_eq!(css, ".a{color:#fff;margin:0 0 0 0}");
}

#[test]
fn variable_redefined_in_a_nested_ruleset_does_not_leak_outward() {
    let config = Config::default();
    let css = compile("@a: 1; .x{ @a: 2; b: @a; } .y{ c: @a; }", None, &config).unwrap();
    assert_eq!(css, ".x {\n  b: 2;\n}\n.y {\n  c: 1;\n}\n");
}

#[test]
fn mixin_call_with_too_few_arguments_reports_wrong_argument_count() {
    let config = Config::default();
    let err = compile(".r(@a, @b){ x: @a @b; } .c{ .r(1); }", None, &config).unwrap_err();
    assert!(err.message.to_lowercase().contains("argument"), "{}", err.message);
}

#[test]
fn default_guard_only_wins_when_no_other_guard_matches() {
    let config = Config::default();
    let css = compile(
        ".m(@x) when (default()) { a: default; } .m(@x) when (@x > 0) { a: positive; } .c{ .m(1); } .d{ .m(-1); }",
        None,
        &config,
    )
    .unwrap();
    assert_eq!(css, ".c {\n  a: positive;\n}\n.d {\n  a: default;\n}\n");
}

#[test]
fn color_plus_number_adds_to_every_channel() {
    let config = Config::default();
    let css = compile(".a{ color: #808080 + 10; }", None, &config).unwrap();
    assert_eq!(css, ".a {\n  color: #8a8a8a;\n}\n");
}

#[test]
fn number_minus_color_is_a_color_arithmetic_error() {
    let config = Config::default();
    let err = compile(".a{ color: 10 - #808080; }", None, &config).unwrap_err();
    assert!(err.message.to_lowercase().contains("color"), "{}", err.message);
}

#[test]
fn strict_math_off_folds_an_unparenthesized_operation() {
    let config = Config::default();
    let css = compile(".c{ width: 5px + 3; }", None, &config).unwrap();
    assert_eq!(css, ".c {\n  width: 8px;\n}\n");
}

#[test]
fn strict_math_on_leaves_an_unparenthesized_operation_literal() {
    let mut config = Config::default();
    config.strict_math = true;
    let css = compile(".c{ width: 5px + 3; }", None, &config).unwrap();
    assert_eq!(css, ".c {\n  width: 5px + 3;\n}\n");
}

#[test]
fn strict_math_on_still_folds_inside_explicit_parens() {
    let mut config = Config::default();
    config.strict_math = true;
    let css = compile(".c{ width: (5px + 3); }", None, &config).unwrap();
    assert_eq!(css, ".c {\n  width: 8px;\n}\n");
}

#[test]
fn font_shorthand_slash_is_not_parsed_as_division() {
    let config = Config::default();
    let css = compile(".a{ font: 12px/1.5 Arial, sans-serif; }", None, &config).unwrap();
    assert_eq!(css, ".a {\n  font: 12px/1.5 Arial, sans-serif;\n}\n");
}

#[test]
fn filter_chain_passes_through_unharmed() {
    let config = Config::default();
    let css = compile(".a{ filter: blur(2px) grayscale(50%); }", None, &config).unwrap();
    assert_eq!(css, ".a {\n  filter: blur(2px) grayscale(50%);\n}\n");
}

#[test]
fn mixin_call_argument_separator_switches_to_semicolon_when_present() {
    let config = Config::default();
    let css = compile(".m(@a; @b) { x: @a; y: @b; } .c { .m(1, 2; 3, 4); }", None, &config).unwrap();
    assert_eq!(css, ".c {\n  x: 1, 2;\n  y: 3, 4;\n}\n");
}

#[test]
fn import_reference_and_css_options_are_mutually_exclusive() {
    let config = Config::default();
    let err = compile("@import (reference, css) \"a.css\";", None, &config).unwrap_err();
    assert!(err.message.to_lowercase().contains("invalid import"), "{}", err.message);
}

#[test]
fn page_margin_box_directive_is_recognized_inside_page() {
    let config = Config::default();
    let css = compile("@page { size: A4; @top-center { content: \"Page\"; } }", None, &config).unwrap();
    assert!(css.contains("@top-center"), "{css}");
    assert!(css.contains("content: \"Page\";"), "{css}");
}

#[test]
fn css_with_no_less_constructs_survives_with_only_whitespace_normalized() {
    let config = Config::default();
    let css = compile(".a { color: red; }", None, &config).unwrap();
    assert_eq!(css, ".a {\n  color: red;\n}\n");
}

#[test]
fn double_slash_comments_never_reach_the_output() {
    let config = Config::default();
    let css = compile(".a {\n  // not valid css\n  color: red;\n}", None, &config).unwrap();
    assert!(!css.contains("not valid css"));
}

#[test]
fn block_comments_are_dropped_unless_keep_comments_is_set() {
    let mut config = Config::default();
    config.keep_comments = false;
    let css = compile(".a { /* note */ color: red; }", None, &config).unwrap();
    assert!(!css.contains("note"));
}
