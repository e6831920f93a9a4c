//! Expression evaluation for `{{#if}}` and `{{eval}}`.
//!
//! By the time an expression gets here its paths have already been replaced
//! by literal values (see `value_parser::substitute_paths`), so the default
//! evaluator only needs a small, side-effect free grammar:
//!
//! ```text
//! expr    := or ( '?' expr ':' expr )?
//! or      := and ( '||' and )*
//! and     := eq ( '&&' eq )*
//! eq      := rel ( ('==' | '!=' | '===' | '!==') rel )*
//! rel     := add ( ('<' | '<=' | '>' | '>=') add )*
//! add     := mul ( ('+' | '-') mul )*
//! mul     := unary ( ('*' | '/' | '%') unary )*
//! unary   := ('!' | '-' | '+') unary | primary
//! primary := number | string | true | false | null | undefined | NaN
//!          | Infinity | path | '(' expr ')'
//! ```
//!
//! Paths left in the text (collections, functions, `this`) are resolved
//! through the scope at evaluation time.

use super::resolve::resolve_path;
use super::scope::Scope;
use super::value_parser::{number_end, path_end, starts_path, string_end, unquote};
use crate::error::{Error, Result};
use crate::value::Value;

/// Evaluates an already substituted expression.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expr: &str, scope: &Scope<'_>) -> Result<Value>;
}

impl<F> ExpressionEvaluator for F
where
    F: Fn(&str, &Scope<'_>) -> Result<Value> + Send + Sync,
{
    fn evaluate(&self, expr: &str, scope: &Scope<'_>) -> Result<Value> {
        self(expr, scope)
    }
}

/// Default evaluator: arithmetic, comparison, boolean logic and the ternary.
/// No assignment, no calls, no property access beyond plain paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct SafeEvaluator;

impl ExpressionEvaluator for SafeEvaluator {
    fn evaluate(&self, expr: &str, scope: &Scope<'_>) -> Result<Value> {
        let tokens = lex(expr)?;
        let mut parser = Parser { expr, tokens: &tokens, pos: 0 };
        let node = parser.expression(0)?;
        if parser.pos < tokens.len() {
            return Err(Error::expression(expr, format!("unexpected `{}`", tokens[parser.pos])));
        }
        node.eval(scope)
    }
}

// --- Lexer ---------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64, bool),
    Str(String),
    Path(String),
    Op(&'static str),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Num(n, _) => write!(f, "{n}"),
            Token::Str(s) => write!(f, "{s:?}"),
            Token::Path(p) => f.write_str(p),
            Token::Op(op) => f.write_str(op),
        }
    }
}

const OPS: [&str; 20] =
    ["===", "!==", "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!", "?", ":", "(", ")"];

fn lex(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while let Some(c) = expr[i..].chars().next() {
        if c.is_whitespace() {
            i += c.len_utf8();
        } else if c == '"' || c == '\'' {
            let end = string_end(expr, i);
            let literal = &expr[i..end];
            if end - i < 2 || !literal.ends_with(c) {
                return Err(Error::expression(expr, "unterminated string"));
            }
            tokens.push(Token::Str(unquote(literal)));
            i = end;
        } else if c.is_ascii_digit() {
            let end = number_end(expr, i);
            let text = &expr[i..end];
            let n = text.parse::<f64>().map_err(|e| Error::expression(expr, e.to_string()))?;
            tokens.push(Token::Num(n, !text.contains('.')));
            i = end;
        } else if starts_path(expr, i) {
            let end = path_end(expr, i);
            tokens.push(Token::Path(expr[i..end].to_string()));
            i = end;
        } else if let Some(op) = OPS.iter().find(|op| expr[i..].starts_with(**op)) {
            tokens.push(Token::Op(*op));
            i += op.len();
        } else {
            return Err(Error::expression(expr, format!("unexpected character `{c}`")));
        }
    }
    Ok(tokens)
}

// --- Parser --------------------------------------------------------------------

#[derive(Debug)]
enum Node {
    Lit(Value),
    Path(String),
    Unary(&'static str, Box<Node>),
    Binary(&'static str, Box<Node>, Box<Node>),
    Cond(Box<Node>, Box<Node>, Box<Node>),
}

struct Parser<'t> {
    expr: &'t str,
    tokens: &'t [Token],
    pos: usize,
}

fn binding_power(op: &str) -> Option<u8> {
    Some(match op {
        "?" => 1,
        "||" => 2,
        "&&" => 3,
        "==" | "!=" | "===" | "!==" => 4,
        "<" | "<=" | ">" | ">=" => 5,
        "+" | "-" => 6,
        "*" | "/" | "%" => 7,
        _ => return None,
    })
}

const UNARY_POWER: u8 = 8;

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expect(&mut self, op: &str) -> Result<()> {
        let expr = self.expr;
        match self.next() {
            Some(Token::Op(found)) if *found == op => Ok(()),
            Some(other) => Err(Error::expression(expr, format!("expected `{op}`, found `{other}`"))),
            None => Err(Error::expression(expr, format!("expected `{op}`"))),
        }
    }

    fn expression(&mut self, min_power: u8) -> Result<Node> {
        let mut lhs = self.primary()?;
        while let Some(Token::Op(op)) = self.peek() {
            let op: &'static str = *op;
            let Some(power) = binding_power(op) else { break };
            if power <= min_power {
                break;
            }
            self.pos += 1;
            lhs = if op == "?" {
                let yes = self.expression(0)?;
                self.expect(":")?;
                // Right associative: `a ? b : c ? d : e`.
                let no = self.expression(power - 1)?;
                Node::Cond(Box::new(lhs), Box::new(yes), Box::new(no))
            } else {
                let rhs = self.expression(power)?;
                Node::Binary(op, Box::new(lhs), Box::new(rhs))
            };
        }
        Ok(lhs)
    }

    fn primary(&mut self) -> Result<Node> {
        let expr = self.expr;
        match self.next().cloned() {
            Some(Token::Num(n, integral)) => Ok(Node::Lit(number(n, integral))),
            Some(Token::Str(s)) => Ok(Node::Lit(Value::Str(s))),
            Some(Token::Path(path)) => Ok(match path.as_str() {
                "true" => Node::Lit(Value::Bool(true)),
                "false" => Node::Lit(Value::Bool(false)),
                "null" | "undefined" => Node::Lit(Value::Null),
                "NaN" => Node::Lit(Value::Float(f64::NAN)),
                "Infinity" => Node::Lit(Value::Float(f64::INFINITY)),
                _ => Node::Path(path),
            }),
            Some(Token::Op("(")) => {
                let inner = self.expression(0)?;
                self.expect(")")?;
                Ok(inner)
            }
            Some(Token::Op(op @ ("!" | "-" | "+"))) => {
                let operand = self.expression(UNARY_POWER)?;
                Ok(Node::Unary(op, Box::new(operand)))
            }
            Some(other) => Err(Error::expression(expr, format!("unexpected `{other}`"))),
            None => Err(Error::expression(expr, "unexpected end of expression")),
        }
    }
}

// --- Evaluation ----------------------------------------------------------------

fn number(n: f64, integral: bool) -> Value {
    if integral && n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 { Value::Int(n as i64) } else { Value::Float(n) }
}

fn arithmetic(f: f64) -> Value {
    number(f, f.is_finite())
}

impl Node {
    fn eval(&self, scope: &Scope<'_>) -> Result<Value> {
        match self {
            Node::Lit(v) => Ok(v.clone()),
            Node::Path(path) => resolve_path(path, scope),
            Node::Unary(op, operand) => {
                let v = operand.eval(scope)?;
                Ok(match *op {
                    "!" => Value::Bool(!v.truthy()),
                    "-" => arithmetic(-v.to_number()),
                    _ => arithmetic(v.to_number()),
                })
            }
            Node::Cond(test, yes, no) => {
                if test.eval(scope)?.truthy() {
                    yes.eval(scope)
                } else {
                    no.eval(scope)
                }
            }
            Node::Binary("&&", lhs, rhs) => {
                let l = lhs.eval(scope)?;
                if l.truthy() { rhs.eval(scope) } else { Ok(l) }
            }
            Node::Binary("||", lhs, rhs) => {
                let l = lhs.eval(scope)?;
                if l.truthy() { Ok(l) } else { rhs.eval(scope) }
            }
            Node::Binary(op, lhs, rhs) => Ok(binary(op, &lhs.eval(scope)?, &rhs.eval(scope)?)),
        }
    }
}

fn is_textual(v: &Value) -> bool {
    matches!(v, Value::Str(_) | Value::Array(_) | Value::Object(_))
}

fn binary(op: &str, l: &Value, r: &Value) -> Value {
    match op {
        "+" if is_textual(l) || is_textual(r) => Value::Str(l.to_text() + &r.to_text()),
        "+" => arithmetic(l.to_number() + r.to_number()),
        "-" => arithmetic(l.to_number() - r.to_number()),
        "*" => arithmetic(l.to_number() * r.to_number()),
        "/" => arithmetic(l.to_number() / r.to_number()),
        "%" => arithmetic(l.to_number() % r.to_number()),
        "==" => Value::Bool(loose_eq(l, r)),
        "!=" => Value::Bool(!loose_eq(l, r)),
        "===" => Value::Bool(strict_eq(l, r)),
        "!==" => Value::Bool(!strict_eq(l, r)),
        _ => Value::Bool(compare(op, l, r)),
    }
}

fn strict_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Array(_) | Value::Object(_), _) => false,
        _ => l.kind() == r.kind() && l == r,
    }
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Array(_) | Value::Object(_) | Value::Func(_), _)
        | (_, Value::Array(_) | Value::Object(_) | Value::Func(_)) => {
            let collection = |v: &Value| matches!(v, Value::Array(_) | Value::Object(_) | Value::Func(_));
            !(collection(l) && collection(r)) && l.to_text() == r.to_text()
        }
        _ => l.to_number() == r.to_number(),
    }
}

fn compare(op: &str, l: &Value, r: &Value) -> bool {
    if let (Value::Str(a), Value::Str(b)) = (l, r) {
        return match op {
            "<" => a < b,
            "<=" => a <= b,
            ">" => a > b,
            _ => a >= b,
        };
    }
    let (a, b) = (l.to_number(), r.to_number());
    match op {
        "<" => a < b,
        "<=" => a <= b,
        ">" => a > b,
        _ => a >= b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(expr: &str) -> Value {
        SafeEvaluator.evaluate(expr, &Scope::root(&Value::Null)).unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval("(1 + 2) * 3"), Value::Int(9));
        assert_eq!(eval("7 % 4 - -1"), Value::Int(4));
        assert_eq!(eval("1 / 4"), Value::Float(0.25));
        assert_eq!(eval("1 / 0"), Value::Float(f64::INFINITY));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(eval("'a' + 1 + 2"), Value::from("a12"));
        assert_eq!(eval("1 + 2 + \"a\""), Value::from("3a"));
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("3 < 10"), Value::Bool(true));
        assert_eq!(eval("'3' < '10'"), Value::Bool(false));
        assert_eq!(eval("'5' == 5"), Value::Bool(true));
        assert_eq!(eval("'5' === 5"), Value::Bool(false));
        assert_eq!(eval("null == undefined"), Value::Bool(true));
        assert_eq!(eval("NaN == NaN"), Value::Bool(false));
        assert_eq!(eval("true == 1"), Value::Bool(true));
    }

    #[test]
    fn logic_returns_operands() {
        assert_eq!(eval("0 || 'x'"), Value::from("x"));
        assert_eq!(eval("'' && 1"), Value::from(""));
        assert_eq!(eval("!null"), Value::Bool(true));
        assert_eq!(eval("1 > 2 ? 'a' : 3 > 2 ? 'b' : 'c'"), Value::from("b"));
    }

    #[test]
    fn paths_resolve_through_scope() {
        let data = Value::from(json!({"items": [1, 2, 3], "user": {"age": 30}}));
        let scope = Scope::root(&data);
        assert_eq!(SafeEvaluator.evaluate("items.length > 2", &scope).unwrap(), Value::Bool(true));
        assert_eq!(SafeEvaluator.evaluate("user.age + 1", &scope).unwrap(), Value::Int(31));
    }

    #[test]
    fn rejects_anything_else() {
        let scope = Scope::root(&Value::Null);
        for bad in ["a = 1", "1 +", "(1", "'open", "f(1)", "1 2", "a; b"] {
            assert!(matches!(SafeEvaluator.evaluate(bad, &scope), Err(Error::Expression { .. })), "{bad}");
        }
    }

    #[test]
    fn closures_are_evaluators() {
        let fixed = |_: &str, _: &Scope<'_>| -> Result<Value> { Ok(Value::Bool(true)) };
        assert_eq!(fixed.evaluate("anything", &Scope::root(&Value::Null)).unwrap(), Value::Bool(true));
    }
}
