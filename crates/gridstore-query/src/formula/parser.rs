//! Recursive-descent formula parser.
//!
//! Grammar, tightest-binding last:
//!
//! ```text
//! Expr   := AddSub
//! AddSub := MulDiv (('+'|'-') MulDiv)*
//! MulDiv := Unary (('*'|'/'|'%') Unary)*
//! Unary  := '-' Primary | Primary
//! Primary := Number | String | '(' Expr ')'
//!          | Ident '(' ArgList? ')' | Ident | ColumnRef
//! ```
//!
//! An identifier followed by `(` is a function call (name uppercased); a
//! bare identifier is a column reference, except the literals NULL, TRUE
//! and FALSE.

use gridstore_domain::error::{Error, Result};

use super::lexer::Token;

/// Formula AST.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaNode {
    /// NULL literal.
    NullLit,
    /// TRUE / FALSE literal.
    BoolLit(bool),
    /// Numeric literal, source text preserved.
    NumberLit(String),
    /// String literal, unescaped.
    StringLit(String),
    /// Column reference by title or storage name.
    ColumnRef(String),
    /// Function call.
    Call {
        /// Uppercased function name.
        name: String,
        /// Argument expressions.
        args: Vec<FormulaNode>,
    },
    /// Binary operation.
    Binary {
        /// One of `+ - * / %`.
        op: char,
        /// Left operand.
        left: Box<FormulaNode>,
        /// Right operand.
        right: Box<FormulaNode>,
    },
}

/// Parse a token stream into an AST. Trailing tokens are a parse fault.
pub fn parse(tokens: &[Token]) -> Result<FormulaNode> {
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.expr()?;
    if parser.pos != tokens.len() {
        return Err(Error::bad_request("trailing tokens in formula"));
    }
    Ok(node)
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_sym(&mut self, sym: char) -> bool {
        if self.peek() == Some(&Token::Sym(sym)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<FormulaNode> {
        self.add_sub()
    }

    fn add_sub(&mut self) -> Result<FormulaNode> {
        let mut node = self.mul_div()?;
        loop {
            let op = match self.peek() {
                Some(Token::Sym(op @ ('+' | '-'))) => *op,
                _ => break,
            };
            self.pos += 1;
            let right = self.mul_div()?;
            node = FormulaNode::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
            };
        }
        Ok(node)
    }

    fn mul_div(&mut self) -> Result<FormulaNode> {
        let mut node = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Sym(op @ ('*' | '/' | '%'))) => *op,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            node = FormulaNode::Binary {
                op,
                left: Box::new(node),
                right: Box::new(right),
            };
        }
        Ok(node)
    }

    fn unary(&mut self) -> Result<FormulaNode> {
        if self.eat_sym('-') {
            let operand = self.primary()?;
            // Desugared rather than kept as a node: (-1 * x)
            return Ok(FormulaNode::Binary {
                op: '*',
                left: Box::new(FormulaNode::NumberLit("-1".to_owned())),
                right: Box::new(operand),
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<FormulaNode> {
        let token = self
            .bump()
            .ok_or_else(|| Error::bad_request("unexpected end of formula"))?
            .clone();
        match token {
            Token::Number(text) => Ok(FormulaNode::NumberLit(text)),
            Token::Str(text) => Ok(FormulaNode::StringLit(text)),
            Token::ColumnRef(name) => Ok(FormulaNode::ColumnRef(name)),
            Token::Sym('(') => {
                let node = self.expr()?;
                if !self.eat_sym(')') {
                    return Err(Error::bad_request("expected ')' in formula"));
                }
                Ok(node)
            }
            Token::Ident(name) => {
                if self.eat_sym('(') {
                    let mut args = Vec::new();
                    if !self.eat_sym(')') {
                        loop {
                            args.push(self.expr()?);
                            if self.eat_sym(',') {
                                continue;
                            }
                            if self.eat_sym(')') {
                                break;
                            }
                            return Err(Error::bad_request("expected ',' or ')' in argument list"));
                        }
                    }
                    return Ok(FormulaNode::Call {
                        name: name.to_ascii_uppercase(),
                        args,
                    });
                }
                match name.to_ascii_uppercase().as_str() {
                    "NULL" => Ok(FormulaNode::NullLit),
                    "TRUE" => Ok(FormulaNode::BoolLit(true)),
                    "FALSE" => Ok(FormulaNode::BoolLit(false)),
                    _ => Ok(FormulaNode::ColumnRef(name)),
                }
            }
            other => Err(Error::bad_request(format!(
                "unexpected token {other:?} in formula"
            ))),
        }
    }
}
