//! Recursive-descent parser producing one statement per source line.

use super::lexer::{tokenize, Token};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    None,
    Name(String),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `name(args)`, and `recv.name(args)` with `recv` prepended to `args`.
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign {
        name: String,
        global: bool,
        value: Expr,
    },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// 1-based source line.
    pub line: usize,
    pub kind: StmtKind,
}

/// Parse a whole program. Blank and comment-only lines produce nothing.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, (usize, String)> {
    let mut program = Vec::new();
    for (idx, text) in source.lines().enumerate() {
        let line = idx + 1;
        let tokens = tokenize(text).map_err(|msg| (line, msg))?;
        if tokens.is_empty() {
            continue;
        }
        let kind = Parser::new(tokens)
            .statement()
            .map_err(|msg| (line, msg))?;
        program.push(Stmt { line, kind });
    }
    Ok(program)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(format!("expected {:?}, found {:?}", expected, t)),
            None => Err(format!("expected {:?}, found end of line", expected)),
        }
    }

    fn statement(&mut self) -> Result<StmtKind, String> {
        let global = matches!(self.peek(), Some(Token::Ident(kw)) if kw == "global")
            && matches!(self.peek_at(1), Some(Token::Ident(_)));
        if global {
            self.pos += 1;
        }

        let target = match (self.peek(), self.peek_at(1)) {
            (Some(Token::Ident(name)), Some(Token::Assign)) => Some(name.clone()),
            _ => None,
        };

        let kind = match target {
            Some(name) => {
                self.pos += 2;
                StmtKind::Assign {
                    name,
                    global,
                    value: self.expression()?,
                }
            }
            None if global => return Err("expected assignment after 'global'".to_string()),
            None => StmtKind::Expr(self.expression()?),
        };

        match self.peek() {
            None => Ok(kind),
            Some(t) => Err(format!("unexpected {:?}", t)),
        }
    }

    fn expression(&mut self) -> Result<Expr, String> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.primary()?;
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            let method = match self.next() {
                Some(Token::Ident(name)) => name,
                other => return Err(format!("expected method name, found {:?}", other)),
            };
            let mut args = vec![expr];
            args.extend(self.arguments()?);
            expr = Expr::Call(method, args);
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" | "True" => Ok(Expr::Bool(true)),
                "false" | "False" => Ok(Expr::Bool(false)),
                "None" => Ok(Expr::None),
                _ if self.peek() == Some(&Token::LParen) => {
                    let args = self.arguments()?;
                    Ok(Expr::Call(name, args))
                }
                _ => Ok(Expr::Name(name)),
            },
            Some(t) => Err(format!("unexpected {:?}", t)),
            None => Err("unexpected end of line".to_string()),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, String> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                other => return Err(format!("expected ',' or ')', found {:?}", other)),
            }
        }
    }
}
