use std::collections::BTreeMap;

use crate::error::ScriptError;
use crate::frame::ClassPrediction;
use crate::pose::{Keypoint, joint_angle};
use crate::script::parser::{BinaryOp, ClassifierField, Expr, Function, JointField};

static NO_CLASSIFIERS: BTreeMap<String, ClassPrediction> = BTreeMap::new();

/// Runtime value of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    /// Condition semantics: booleans as-is, non-zero numbers are true, strings are not.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(_) => false,
        }
    }

    fn number(self) -> Result<f64, ScriptError> {
        match self {
            Value::Number(n) => Ok(n),
            _ => Err(ScriptError::TypeMismatch("expected a number")),
        }
    }

    fn boolean(self) -> Result<bool, ScriptError> {
        match self {
            Value::Bool(b) => Ok(b),
            _ => Err(ScriptError::TypeMismatch("expected a boolean")),
        }
    }
}

/// Everything a script may read while it is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct ScriptContext<'a> {
    keypoints: &'a [Keypoint],
    classifiers: &'a BTreeMap<String, ClassPrediction>,
}

impl<'a> ScriptContext<'a> {
    pub fn new(keypoints: &'a [Keypoint]) -> Self {
        Self {
            keypoints,
            classifiers: &NO_CLASSIFIERS,
        }
    }

    pub fn with_classifiers(mut self, classifiers: &'a BTreeMap<String, ClassPrediction>) -> Self {
        self.classifiers = classifiers;
        self
    }

    fn joint(&self, name: &str) -> Result<&'a Keypoint, ScriptError> {
        self.keypoints
            .iter()
            .find(|k| k.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ScriptError::MissingJoint(name.to_string()))
    }

    fn classifier(&self, model: Option<&str>) -> Result<&'a ClassPrediction, ScriptError> {
        match model {
            Some(id) => self
                .classifiers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(id))
                .map(|(_, pred)| pred)
                .ok_or_else(|| ScriptError::MissingClassifier(id.to_string())),
            None => self
                .classifiers
                .values()
                .next()
                .ok_or_else(|| ScriptError::MissingClassifier("<first>".to_string())),
        }
    }
}

pub(crate) fn eval(expr: &Expr, ctx: &ScriptContext<'_>) -> Result<Value, ScriptError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Joint { joint, field } => {
            let kp = ctx.joint(joint)?;
            Ok(Value::Number(match field {
                JointField::X => kp.x,
                JointField::Y => kp.y,
                JointField::Z => kp.z,
                JointField::Score => kp.score,
            }))
        }
        Expr::Distance(a, b) => Ok(Value::Number(ctx.joint(a)?.distance_to(ctx.joint(b)?))),
        Expr::Angle(a, b, c) => Ok(Value::Number(joint_angle(
            ctx.joint(a)?,
            ctx.joint(b)?,
            ctx.joint(c)?,
        ))),
        Expr::Classifier { model, field } => {
            let pred = ctx.classifier(model.as_deref())?;
            Ok(match field {
                ClassifierField::Class => Value::Str(pred.class_name.to_lowercase()),
                ClassifierField::Confidence => Value::Number(pred.probability),
            })
        }
        Expr::Call { function, args } => {
            let values = args
                .iter()
                .map(|arg| eval(arg, ctx)?.number())
                .collect::<Result<Vec<_>, _>>()?;
            call(*function, &values).map(Value::Number)
        }
        Expr::Neg(inner) => Ok(Value::Number(-eval(inner, ctx)?.number()?)),
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, ctx)?.boolean()?)),
        Expr::Binary { op, lhs, rhs } => binary(*op, lhs, rhs, ctx),
    }
}

fn binary(op: BinaryOp, lhs: &Expr, rhs: &Expr, ctx: &ScriptContext<'_>) -> Result<Value, ScriptError> {
    match op {
        BinaryOp::And => {
            if !eval(lhs, ctx)?.boolean()? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(rhs, ctx)?.boolean()?))
        }
        BinaryOp::Or => {
            if eval(lhs, ctx)?.boolean()? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(rhs, ctx)?.boolean()?))
        }
        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (eval(lhs, ctx)?, eval(rhs, ctx)?) {
                (Value::Number(a), Value::Number(b)) => a == b,
                (Value::Str(a), Value::Str(b)) => a == b,
                (Value::Bool(a), Value::Bool(b)) => a == b,
                _ => return Err(ScriptError::TypeMismatch("cannot compare values of different types")),
            };
            Ok(Value::Bool(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        _ => {
            let a = eval(lhs, ctx)?.number()?;
            let b = eval(rhs, ctx)?.number()?;
            Ok(match op {
                BinaryOp::Lt => Value::Bool(a < b),
                BinaryOp::Le => Value::Bool(a <= b),
                BinaryOp::Gt => Value::Bool(a > b),
                BinaryOp::Ge => Value::Bool(a >= b),
                BinaryOp::Add => Value::Number(a + b),
                BinaryOp::Sub => Value::Number(a - b),
                BinaryOp::Mul => Value::Number(a * b),
                _ => Value::Number(a / b),
            })
        }
    }
}

// Arity was checked by the parser.
fn call(function: Function, args: &[f64]) -> Result<f64, ScriptError> {
    let first = *args
        .first()
        .ok_or(ScriptError::TypeMismatch("missing argument"))?;
    Ok(match function {
        Function::Abs => first.abs(),
        Function::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
        Function::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        Function::Round => first.round(),
        Function::Floor => first.floor(),
        Function::Ceil => first.ceil(),
        Function::Sqrt => first.sqrt(),
        Function::Sin => first.sin(),
        Function::Cos => first.cos(),
        Function::Tan => first.tan(),
        Function::Atan2 => {
            let x = *args.get(1).ok_or(ScriptError::TypeMismatch("missing argument"))?;
            first.atan2(x)
        }
    })
}
