//! Boolean tests for the `if` element.
//!
//! The full expression language is supplied by the embedding application
//! through [`ExpressionEvaluator`]. [`SimpleEvaluator`] covers what MoML
//! files usually put in a test: literals, parameter references, negation,
//! equality and the short-circuit operators.

use crate::kernel::{Category, ObjId, Workspace};

/// Evaluates the `test` attribute of an `if` element.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate `expression` with names resolved from `scope` outwards.
    fn evaluate_bool(&self, ws: &Workspace, scope: Option<ObjId>, expression: &str) -> Result<bool, String>;
}

/// Evaluator for boolean tests over literals and parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleEvaluator;

impl ExpressionEvaluator for SimpleEvaluator {
    fn evaluate_bool(&self, ws: &Workspace, scope: Option<ObjId>, expression: &str) -> Result<bool, String> {
        match evaluate(ws, scope, expression, 0)? {
            Value::Bool(b) => Ok(b),
            other => Err(format!("\"{expression}\" evaluates to {other:?}, not a boolean")),
        }
    }
}

const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Text(String),
    Not,
    And,
    Or,
    Eq,
    Ne,
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err("expected \"==\"".into());
                }
                tokens.push(Token::Eq);
            }
            '&' => {
                chars.next();
                if chars.next_if_eq(&'&').is_none() {
                    return Err("expected \"&&\"".into());
                }
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                if chars.next_if_eq(&'|').is_none() {
                    return Err("expected \"||\"".into());
                }
                tokens.push(Token::Or);
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(c) => text.push(c),
                        None => return Err("unterminated string".into()),
                    }
                }
                tokens.push(Token::Text(text));
            }
            c if c.is_ascii_digit() || c == '.' || c == '-' => {
                let mut text = String::new();
                text.push(c);
                chars.next();
                while let Some(c) = chars.next_if(|c| c.is_ascii_digit() || *c == '.' || *c == 'e' || *c == 'E') {
                    text.push(c);
                }
                let number = text.parse::<f64>().map_err(|e| format!("bad number \"{text}\": {e}"))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::new();
                while let Some(c) = chars.next_if(|c| c.is_alphanumeric() || *c == '_' || *c == '$') {
                    ident.push(c);
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    ws: &'a Workspace,
    scope: Option<ObjId>,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Value, String> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let l = as_bool(&left)?;
            let right = self.and()?;
            left = Value::Bool(l || as_bool(&right)?);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Value, String> {
        let mut left = self.equality()?;
        while self.eat(&Token::And) {
            let l = as_bool(&left)?;
            let right = self.equality()?;
            left = Value::Bool(l && as_bool(&right)?);
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Value, String> {
        let left = self.unary()?;
        if self.eat(&Token::Eq) {
            let right = self.unary()?;
            return Ok(Value::Bool(left == right));
        }
        if self.eat(&Token::Ne) {
            let right = self.unary()?;
            return Ok(Value::Bool(left != right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Value, String> {
        if self.eat(&Token::Not) {
            let value = self.unary()?;
            return Ok(Value::Bool(!as_bool(&value)?));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Value, String> {
        let token = self.peek().cloned().ok_or("unexpected end of expression")?;
        self.pos += 1;
        match token {
            Token::Open => {
                let value = self.or()?;
                if !self.eat(&Token::Close) {
                    return Err("expected \")\"".into());
                }
                Ok(value)
            }
            Token::Number(n) => Ok(Value::Number(n)),
            Token::Text(t) => Ok(Value::Text(t)),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => self.reference(&name),
            },
            other => Err(format!("unexpected {other:?}")),
        }
    }

    /// Value of the nearest parameter named `name`, searching from the
    /// scope outwards.
    fn reference(&self, name: &str) -> Result<Value, String> {
        let mut current = self.scope;
        while let Some(scope) = current {
            if let Some(attr) = self.ws.child(scope, name, Category::Attribute) {
                let expression = self.ws.expression(attr).unwrap_or("");
                return evaluate(self.ws, self.ws.container(attr), expression, self.depth + 1);
            }
            current = self.ws.container(scope);
        }
        Err(format!("undefined identifier \"{name}\""))
    }
}

fn as_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(format!("{other:?} is not a boolean")),
    }
}

fn evaluate(ws: &Workspace, scope: Option<ObjId>, expression: &str, depth: usize) -> Result<Value, String> {
    if depth > MAX_DEPTH {
        return Err("parameter references nest too deeply".into());
    }
    let mut parser = Parser {
        tokens: tokenize(expression)?,
        pos: 0,
        ws,
        scope,
        depth,
    };
    let value = parser.or()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("trailing input in \"{expression}\""));
    }
    Ok(value)
}
