//! Rule expression language.
//!
//! A closed grammar evaluated by a tree-walking interpreter. Scripts can read
//! joint coordinates (`right_wrist.y`), call `dist`, `angle` and a fixed set of
//! math functions, inspect classifier results (`classifier['id'].class`) and
//! combine comparisons with `and`, `or` and `not`. Nothing else is reachable.
//!
//! ```
//! use motion_fsm::pose::Keypoint;
//! use motion_fsm::script::{Script, ScriptContext};
//!
//! let script = Script::compile("right_wrist.y < right_shoulder.y and dist(right_wrist, nose) < 0.3").unwrap();
//! let keypoints = vec![
//!     Keypoint::new("nose", 0.5, 0.2, 0.9),
//!     Keypoint::new("right_shoulder", 0.6, 0.3, 0.9),
//!     Keypoint::new("right_wrist", 0.6, 0.25, 0.9),
//! ];
//! assert!(script.evaluate(&ScriptContext::new(&keypoints)));
//! ```

mod interpreter;
mod lexer;
mod parser;

use crate::error::ScriptError;

pub use interpreter::{ScriptContext, Value};
use parser::Expr;

/// A compiled rule expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    source: String,
    expr: Expr,
}

impl Script {
    /// Validate and parse a script.
    pub fn compile(source: &str) -> Result<Self, ScriptError> {
        check_balanced(source)?;
        let tokens = lexer::tokenize(source)?;
        let expr = parser::parse(&tokens)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate to a value, surfacing resolution failures.
    pub fn try_evaluate(&self, ctx: &ScriptContext<'_>) -> Result<Value, ScriptError> {
        interpreter::eval(&self.expr, ctx)
    }

    /// Evaluate as a condition. Any failure yields `false`.
    pub fn evaluate(&self, ctx: &ScriptContext<'_>) -> bool {
        match self.try_evaluate(ctx) {
            Ok(value) => value.is_truthy(),
            Err(err) => {
                tracing::trace!(script = %self.source, error = %err, "script evaluated to false");
                false
            }
        }
    }
}

/// Structural check of a script without keeping the compiled form.
pub fn validate(source: &str) -> Result<(), ScriptError> {
    Script::compile(source).map(|_| ())
}

/// Compile and evaluate in one step; malformed scripts yield `false`.
pub fn evaluate(source: &str, ctx: &ScriptContext<'_>) -> bool {
    Script::compile(source).is_ok_and(|script| script.evaluate(ctx))
}

fn check_balanced(source: &str) -> Result<(), ScriptError> {
    if source.trim().is_empty() {
        return Err(ScriptError::Empty);
    }
    let mut parens = 0i32;
    let mut brackets = 0i32;
    let mut quote: Option<char> = None;
    for ch in source.chars() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' => parens += 1,
            ')' => parens -= 1,
            '[' => brackets += 1,
            ']' => brackets -= 1,
            _ => {}
        }
        if parens < 0 {
            return Err(ScriptError::UnbalancedParentheses);
        }
        if brackets < 0 {
            return Err(ScriptError::UnbalancedBrackets);
        }
    }
    if parens != 0 {
        return Err(ScriptError::UnbalancedParentheses);
    }
    if brackets != 0 {
        return Err(ScriptError::UnbalancedBrackets);
    }
    Ok(())
}
