//! Error types for model loading and rule expression compilation.
//!
//! Only load-time operations return these. Per-frame processing never fails;
//! anything that cannot be resolved while a frame is evaluated degrades to
//! "no match" or `false`.

use thiserror::Error;

/// Errors raised while compiling or evaluating a rule expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("empty script")]
    Empty,

    #[error("unbalanced parentheses")]
    UnbalancedParentheses,

    #[error("unbalanced brackets")]
    UnbalancedBrackets,

    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("unexpected token {found}, expected {expected}")]
    UnexpectedToken { found: String, expected: &'static str },

    #[error("unexpected end of script")]
    UnexpectedEnd,

    #[error("script nests deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("script exceeds {limit} tokens")]
    TooLong { limit: usize },

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("unknown property '{property}' on '{target}'")]
    UnknownProperty { target: String, property: String },

    #[error("function '{name}' expects {expected} argument(s), got {found}")]
    Arity {
        name: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("joint '{0}' is not present in the frame")]
    MissingJoint(String),

    #[error("no classifier result for '{0}'")]
    MissingClassifier(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(&'static str),
}

/// Errors raised while loading a motion model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model defines no states")]
    EmptyStates,

    #[error("duplicate state id '{0}'")]
    DuplicateState(String),

    #[error("transition '{transition}' references unknown state '{state}'")]
    UnknownState { transition: String, state: String },

    #[error("invalid script in transition '{transition}': {source}")]
    InvalidScript {
        transition: String,
        #[source]
        source: ScriptError,
    },

    #[error("malformed model definition: {0}")]
    Parse(#[from] serde_json::Error),
}
