//! Recursive-descent parser producing the typed expression tree.
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparison, `+ -`, `* /`,
//! unary minus.

use crate::error::ScriptError;
use crate::pose::is_known_joint;
use crate::script::lexer::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointField {
    X,
    Y,
    Z,
    Score,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierField {
    Class,
    Confidence,
}

/// Whitelisted numeric functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Abs,
    Min,
    Max,
    Round,
    Floor,
    Ceil,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Atan2,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Function::Abs,
            "min" => Function::Min,
            "max" => Function::Max,
            "round" => Function::Round,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "sqrt" => Function::Sqrt,
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "atan2" => Function::Atan2,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Abs => "abs",
            Function::Min => "min",
            Function::Max => "max",
            Function::Round => "round",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Sqrt => "sqrt",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Atan2 => "atan2",
        }
    }

    fn check_arity(self, found: usize) -> Result<(), ScriptError> {
        let (ok, expected) = match self {
            Function::Min | Function::Max => (found >= 1, "at least 1"),
            Function::Atan2 => (found == 2, "2"),
            _ => (found == 1, "1"),
        };
        if ok {
            Ok(())
        } else {
            Err(ScriptError::Arity {
                name: self.name(),
                expected,
                found,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Bool(bool),
    Str(String),
    Joint {
        joint: String,
        field: JointField,
    },
    Distance(String, String),
    Angle(String, String, String),
    /// `model: None` addresses the first classifier by id order
    Classifier {
        model: Option<String>,
        field: ClassifierField,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// Longest accepted script, in tokens. Bounds the depth of left-nested
/// operator chains.
pub(crate) const MAX_TOKENS: usize = 1024;

/// Deepest accepted nesting of parentheses, call arguments and prefix operators.
pub(crate) const MAX_DEPTH: usize = 64;

pub(crate) fn parse(tokens: &[Token]) -> Result<Expr, ScriptError> {
    if tokens.len() > MAX_TOKENS {
        return Err(ScriptError::TooLong { limit: MAX_TOKENS });
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(ScriptError::UnexpectedToken {
            found: tok.to_string(),
            expected: "end of script",
        }),
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<(), ScriptError> {
        match self.next() {
            Some(tok) if *tok == expected => Ok(()),
            Some(tok) => Err(ScriptError::UnexpectedToken {
                found: tok.to_string(),
                expected: what,
            }),
            None => Err(ScriptError::UnexpectedEnd),
        }
    }

    fn ident(&mut self, what: &'static str) -> Result<String, ScriptError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name.clone()),
            Some(tok) => Err(ScriptError::UnexpectedToken {
                found: tok.to_string(),
                expected: what,
            }),
            None => Err(ScriptError::UnexpectedEnd),
        }
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ScriptError>,
    ) -> Result<T, ScriptError> {
        if self.depth >= MAX_DEPTH {
            return Err(ScriptError::TooDeep { limit: MAX_DEPTH });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    fn or(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::Or) {
            let rhs = self.and()?;
            lhs = Self::binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.not()?;
        while self.eat(&Token::And) {
            let rhs = self.not()?;
            lhs = Self::binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&Token::Not) {
            return Ok(Expr::Not(Box::new(self.nested(Self::not)?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        Ok(Self::binary(op, lhs, rhs))
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Self::binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Self::binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.nested(Self::unary)?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let Some(tok) = self.next().cloned() else {
            return Err(ScriptError::UnexpectedEnd);
        };
        match tok {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::LParen => {
                let inner = self.nested(Self::or)?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(name) => self.identifier(name),
            other => Err(ScriptError::UnexpectedToken {
                found: other.to_string(),
                expected: "a value",
            }),
        }
    }

    fn identifier(&mut self, name: String) -> Result<Expr, ScriptError> {
        if self.eat(&Token::LParen) {
            return self.call(name);
        }
        if name == "classifier" || name == "tm" {
            return self.classifier();
        }
        if !is_known_joint(&name) {
            return Err(ScriptError::UnknownIdentifier(name));
        }
        self.expect(Token::Dot, "'.'")?;
        let property = self.ident("a joint property")?;
        let field = match property.as_str() {
            "x" => JointField::X,
            "y" => JointField::Y,
            "z" => JointField::Z,
            "score" | "confidence" => JointField::Score,
            _ => {
                return Err(ScriptError::UnknownProperty {
                    target: name,
                    property,
                });
            }
        };
        Ok(Expr::Joint { joint: name, field })
    }

    fn classifier(&mut self) -> Result<Expr, ScriptError> {
        let model = if self.eat(&Token::LBracket) {
            let id = match self.next() {
                Some(Token::Str(s)) => s.clone(),
                Some(tok) => {
                    return Err(ScriptError::UnexpectedToken {
                        found: tok.to_string(),
                        expected: "a quoted classifier id",
                    });
                }
                None => return Err(ScriptError::UnexpectedEnd),
            };
            self.expect(Token::RBracket, "']'")?;
            self.expect(Token::Dot, "'.'")?;
            Some(id)
        } else {
            self.expect(Token::Dot, "'.'")?;
            let id_or_field = self.ident("a classifier id or property")?;
            if self.eat(&Token::Dot) {
                Some(id_or_field)
            } else {
                return Ok(Expr::Classifier {
                    model: None,
                    field: classifier_field(&id_or_field)?,
                });
            }
        };
        let property = self.ident("a classifier property")?;
        Ok(Expr::Classifier {
            model,
            field: classifier_field(&property)?,
        })
    }

    fn call(&mut self, name: String) -> Result<Expr, ScriptError> {
        match name.as_str() {
            "dist" | "distance" => {
                let joints = self.joint_args()?;
                match <[String; 2]>::try_from(joints) {
                    Ok([a, b]) => Ok(Expr::Distance(a, b)),
                    Err(joints) => Err(ScriptError::Arity {
                        name: "dist",
                        expected: "2",
                        found: joints.len(),
                    }),
                }
            }
            "angle" => {
                let joints = self.joint_args()?;
                match <[String; 3]>::try_from(joints) {
                    Ok([a, b, c]) => Ok(Expr::Angle(a, b, c)),
                    Err(joints) => Err(ScriptError::Arity {
                        name: "angle",
                        expected: "3",
                        found: joints.len(),
                    }),
                }
            }
            _ => {
                let function = Function::lookup(&name)
                    .ok_or_else(|| ScriptError::UnknownFunction(name.clone()))?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.nested(Self::or)?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(Token::Comma, "',' or ')'")?;
                    }
                }
                function.check_arity(args.len())?;
                Ok(Expr::Call { function, args })
            }
        }
    }

    fn joint_args(&mut self) -> Result<Vec<String>, ScriptError> {
        let mut joints = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(joints);
        }
        loop {
            let joint = self.ident("a joint name")?;
            if !is_known_joint(&joint) {
                return Err(ScriptError::UnknownIdentifier(joint));
            }
            joints.push(joint);
            if self.eat(&Token::RParen) {
                return Ok(joints);
            }
            self.expect(Token::Comma, "',' or ')'")?;
        }
    }
}

fn classifier_field(property: &str) -> Result<ClassifierField, ScriptError> {
    match property {
        "class" => Ok(ClassifierField::Class),
        "confidence" | "probability" => Ok(ClassifierField::Confidence),
        _ => Err(ScriptError::UnknownProperty {
            target: "classifier".to_string(),
            property: property.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::lexer::tokenize;

    fn parse_str(src: &str) -> Result<Expr, ScriptError> {
        parse(&tokenize(src)?)
    }

    #[test]
    fn test_precedence() {
        let expr = parse_str("1 + 2 * 3 < 10 and not true or false").unwrap();
        let Expr::Binary { op: BinaryOp::Or, lhs, .. } = expr else {
            panic!("expected top-level or");
        };
        let Expr::Binary { op: BinaryOp::And, lhs: cmp, rhs: neg } = *lhs else {
            panic!("expected and");
        };
        assert!(matches!(*neg, Expr::Not(_)));
        let Expr::Binary { op: BinaryOp::Lt, lhs: sum, .. } = *cmp else {
            panic!("expected comparison");
        };
        assert!(matches!(*sum, Expr::Binary { op: BinaryOp::Add, .. }));
    }

    #[test]
    fn test_classifier_forms() {
        assert_eq!(
            parse_str("tm['m1'].class").unwrap(),
            Expr::Classifier {
                model: Some("m1".into()),
                field: ClassifierField::Class
            }
        );
        assert_eq!(
            parse_str("classifier.m1.probability").unwrap(),
            Expr::Classifier {
                model: Some("m1".into()),
                field: ClassifierField::Confidence
            }
        );
        assert_eq!(
            parse_str("tm.confidence").unwrap(),
            Expr::Classifier {
                model: None,
                field: ClassifierField::Confidence
            }
        );
    }

    #[test]
    fn test_arity_errors() {
        assert!(matches!(
            parse_str("dist(nose)"),
            Err(ScriptError::Arity { name: "dist", found: 1, .. })
        ));
        assert!(matches!(
            parse_str("atan2(1)"),
            Err(ScriptError::Arity { name: "atan2", found: 1, .. })
        ));
        assert!(matches!(
            parse_str("max()"),
            Err(ScriptError::Arity { name: "max", found: 0, .. })
        ));
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(matches!(
            parse_str("nose.y < 1 2"),
            Err(ScriptError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            parse_str("nose.y < 1 < 2"),
            Err(ScriptError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let within = format!("{}1{} > 0", "(".repeat(MAX_DEPTH - 1), ")".repeat(MAX_DEPTH - 1));
        assert!(parse_str(&within).is_ok());

        let beyond = format!("{}1{} > 0", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert_eq!(parse_str(&beyond), Err(ScriptError::TooDeep { limit: MAX_DEPTH }));
        assert_eq!(
            parse_str(&format!("{}true", "not ".repeat(MAX_DEPTH + 1))),
            Err(ScriptError::TooDeep { limit: MAX_DEPTH })
        );
        assert_eq!(
            parse_str(&format!("{}1 < 0", "-".repeat(MAX_DEPTH + 1))),
            Err(ScriptError::TooDeep { limit: MAX_DEPTH })
        );
        assert_eq!(
            parse_str(&format!("{}1{} > 0", "abs(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1))),
            Err(ScriptError::TooDeep { limit: MAX_DEPTH })
        );
    }

    #[test]
    fn test_token_limit() {
        let chain = vec!["1"; MAX_TOKENS].join(" + ");
        assert_eq!(parse_str(&chain), Err(ScriptError::TooLong { limit: MAX_TOKENS }));
    }
}
