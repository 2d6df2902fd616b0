//! Error types for every stage of the compiler, composed into a single
//! public [`ParsingError`] surface.

use std::fmt;

/// A source location attached to an error or AST node.
///
/// Carries enough to format a human-readable diagnostic without keeping a
/// full line table around: the byte index is resolved against the source
/// lazily, only when an error is actually displayed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Location {
    /// Byte offset into the normalized source.
    pub index: usize,
    /// File name hint supplied with the source, for diagnostics only.
    pub file: Option<String>,
}

impl Location {
    /// Creates a new location at `index` within `file`.
    pub fn new(index: usize, file: Option<&str>) -> Self {
        Self {
            index,
            file: file.map(str::to_string),
        }
    }
}

/// The single error surface exposed to callers of the compiler.
///
/// All front-end and back-end failures are converted into this shape; there
/// is no partial-recovery path, so the first error aborts the compilation.
#[derive(Debug, thiserror::Error)]
#[error("{message}{}", format_at(.file.as_deref(), *.index))]
pub struct ParsingError {
    /// A human-readable description of the failure.
    pub message: String,
    /// Byte offset within the normalized source where the failure was
    /// detected.
    pub index: usize,
    /// File name hint, if one was supplied with the source.
    pub file: Option<String>,
}

fn format_at(file: Option<&str>, index: usize) -> String {
    match file {
        Some(file) => format!(" at {file}:{index}"),
        None => format!(" at index {index}"),
    }
}

impl ParsingError {
    /// Creates a new error at `location` with `message`.
    pub fn new(message: impl Into<String>, location: Location) -> Self {
        Self {
            message: message.into(),
            index: location.index,
            file: location.file,
        }
    }
}

/// Chunker-stage failures (spec.md §4.1).
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// A `/* ... */` comment was never closed.
    #[error("unterminated comment")]
    UnterminatedComment(Location),
    /// A `"..."` or `'...'` string was never closed.
    #[error("unterminated string")]
    UnterminatedString(Location),
    /// Braces did not balance by the end of input.
    #[error("unbalanced braces")]
    UnbalancedBraces(Location),
}

impl ChunkError {
    /// The location at which this error was detected.
    pub fn location(&self) -> &Location {
        match self {
            ChunkError::UnterminatedComment(l)
            | ChunkError::UnterminatedString(l)
            | ChunkError::UnbalancedBraces(l) => l,
        }
    }
}

/// Parser-stage failures (spec.md §4.3).
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// A required token was missing.
    #[error("expected {expected}")]
    Expected {
        /// Description of what was expected.
        expected: String,
        /// Where the failure was detected.
        location: Location,
    },
    /// A `selector:extend(...)` clause had no closing paren.
    #[error("extend not terminated")]
    ExtendNotTerminated(Location),
    /// A guard condition used an operator or keyword this compiler doesn't
    /// recognize.
    #[error("unrecognized condition")]
    UnrecognizedCondition(Location),
    /// An `@`-directive with no recognized handler.
    #[error("unknown directive '{0}'")]
    DirectiveUnknown(String, Location),
    /// A rule was missing its terminating `;`.
    #[error("missing semicolon")]
    MissingSemicolon(Location),
    /// A rule ended before a value was supplied.
    #[error("incomplete rule")]
    IncompleteRule(Location),
    /// An `@import` option combination is mutually exclusive.
    #[error("invalid import option combination")]
    InvalidImportCombo(Location),
    /// An `@import` option this compiler doesn't recognize.
    #[error("unrecognized import option '{0}'")]
    UnrecognizedImportOption(String, Location),
}

impl ParseError {
    /// The location at which this error was detected.
    pub fn location(&self) -> &Location {
        match self {
            ParseError::Expected { location, .. }
            | ParseError::ExtendNotTerminated(location)
            | ParseError::UnrecognizedCondition(location)
            | ParseError::DirectiveUnknown(_, location)
            | ParseError::MissingSemicolon(location)
            | ParseError::IncompleteRule(location)
            | ParseError::InvalidImportCombo(location)
            | ParseError::UnrecognizedImportOption(_, location) => location,
        }
    }
}

/// Evaluation-stage failures (spec.md §4.4).
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// A variable was referenced but never defined in any visible scope.
    #[error("variable @{0} is undefined")]
    UndefinedVariable(String, Location),
    /// A variable's value depends (directly or indirectly) on itself.
    #[error("recursive variable reference @{0}")]
    RecursiveVariable(String, Location),
    /// An interpolated property name (`@{name}:`) did not resolve to a
    /// keyword.
    #[error("'{0}' is not a valid property name")]
    InvalidVariableForPropertyName(String, Location),
    /// A named mixin-call argument appeared after a positional one.
    #[error("named arguments must follow positional arguments")]
    NamedAfterPositional(Location),
    /// A mixin call had too few or too many positional arguments.
    #[error("wrong number of arguments: expected {expected}, got {got}")]
    WrongArgumentCount {
        /// The expected argument count (or minimum, for variadic mixins).
        expected: String,
        /// The number of arguments actually supplied.
        got: usize,
        /// Where the call was made.
        location: Location,
    },
    /// No mixin or ruleset in scope matched the call path and arguments.
    #[error("no matching mixin found for '{0}'")]
    NoMatchingMixin(String, Location),
    /// Two operands could not be compared in a guard condition.
    #[error("operands are not comparable")]
    IncomparableOperands(Location),
    /// An `Operation` divided by a numeric zero.
    #[error("division by zero")]
    DivideByZero(Location),
    /// A `Color`/`Number` operation only defined in one direction was used in
    /// the other (e.g. `10 - #808080`).
    #[error("this operation is not supported between a number and a color")]
    ColorArithmetic(Location),
    /// Two operands carried units that cannot be reconciled.
    #[error("incompatible units '{left}' and '{right}'")]
    IncompatibleUnits {
        /// The left operand's unit.
        left: String,
        /// The right operand's unit.
        right: String,
        /// Where the operation occurred.
        location: Location,
    },
    /// An `@import` could not be resolved, or a resolved file failed to
    /// parse or evaluate.
    #[error("import failed: {0}")]
    ImportFailed(String, Location),
    /// An error raised while compiling an imported file or expanding a
    /// mixin call, re-attached with the location of the boundary it crossed
    /// so a diagnostic shows both where the failure happened and where it
    /// was pulled in from.
    #[error("{inner}")]
    Nested {
        /// The underlying failure, from the imported file or mixin body.
        #[source]
        inner: Box<ParsingError>,
        /// Where the `@import` or mixin call that pulled it in sits.
        location: Location,
    },
}

impl EvalError {
    /// The location at which this error was detected.
    pub fn location(&self) -> &Location {
        match self {
            EvalError::UndefinedVariable(_, l)
            | EvalError::RecursiveVariable(_, l)
            | EvalError::InvalidVariableForPropertyName(_, l)
            | EvalError::NamedAfterPositional(l)
            | EvalError::WrongArgumentCount { location: l, .. }
            | EvalError::NoMatchingMixin(_, l)
            | EvalError::IncomparableOperands(l)
            | EvalError::DivideByZero(l)
            | EvalError::ColorArithmetic(l)
            | EvalError::IncompatibleUnits { location: l, .. }
            | EvalError::ImportFailed(_, l)
            | EvalError::Nested { location: l, .. } => l,
        }
    }
}

impl From<ChunkError> for ParsingError {
    fn from(err: ChunkError) -> Self {
        let location = err.location().clone();
        ParsingError::new(err.to_string(), location)
    }
}

impl From<ParseError> for ParsingError {
    fn from(err: ParseError) -> Self {
        let location = err.location().clone();
        ParsingError::new(err.to_string(), location)
    }
}

impl From<EvalError> for ParsingError {
    fn from(err: EvalError) -> Self {
        let location = err.location().clone();
        ParsingError::new(err.to_string(), location)
    }
}

impl From<fmt::Error> for ParsingError {
    fn from(err: fmt::Error) -> Self {
        ParsingError::new(err.to_string(), Location::default())
    }
}
