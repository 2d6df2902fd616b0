//! A LESS-to-CSS compiler.
//!
//! [`compile`] is the single public entry point: it runs a source string
//! through the chunker, parser, evaluator, extend resolution, and CSS
//! emitter in sequence, producing either the compiled stylesheet or the
//! first error encountered along the way.

pub mod append;
pub mod ast;
pub mod chunk;
pub mod color;
pub mod config;
pub mod emit;
pub mod env;
pub mod error;
pub mod eval;
pub mod functions;
pub mod importer;
pub mod parser;
pub mod token;
pub mod units;
pub mod visit;

pub use config::{ChunkLevel, Config};
pub use error::ParsingError;
pub use importer::{ImportError, Imported, Importer};

use env::{Env, Frame};

/// Compiles a LESS stylesheet to CSS.
///
/// `file` names the source for diagnostics and for resolving relative
/// `@import` paths; `config` controls compression, comment retention,
/// strict math, chunking, and the importer capability.
pub fn compile(source: &str, file: Option<&str>, config: &Config) -> Result<String, ParsingError> {
    let body = parser::parse(source, file, config)?;
    let mut env = Env::new(config, file);
    // The top level is itself a scope: a variable declared at the document
    // root must be visible to every nested ruleset, the same as a ruleset's
    // own frame makes its rules visible to its children.
    let mut tree = env.with_frame(Frame::new(body.clone()), |env| eval::evaluate_body(&body, env))?;
    let extends = env.take_extends();
    visit::resolve_extends(&mut tree, &extends);
    Ok(append::render(&tree, config.compress, config.keep_comments))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_variable_and_nested_ruleset() {
        let config = Config::default();
        let css = compile("@color: #4d926f;\n.a { .b { color: @color; } }", None, &config).unwrap();
        assert_eq!(css, ".a .b {\n  color: #4d926f;\n}\n");
    }

    #[test]
    fn reports_an_undefined_variable() {
        let config = Config::default();
        let err = compile(".a { color: @nope; }", None, &config).unwrap_err();
        assert!(err.message.contains("@nope"));
    }

    #[test]
    fn extend_pulls_in_a_reference_only_ruleset() {
        let config = Config::default();
        let css = compile(".a:extend(.hidden) {}\n.hidden { color: red; }", None, &config).unwrap();
        assert!(css.contains(".hidden,\n.a {"));
    }

    #[test]
    fn compresses_when_requested() {
        let mut config = Config::default();
        config.compress = true;
        let css = compile(".a { color: red; border: 1px solid black; }", None, &config).unwrap();
        assert_eq!(css, ".a{color:red;border:1px solid black}");
    }
}
