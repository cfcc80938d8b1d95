//! Recursive-descent parser for Mica.
//!
//! Declarations and statements are parsed by recursive descent; expressions
//! use precedence climbing (one recursive routine parameterized by a minimum
//! binding power, with right-associativity handled by not bumping it).
//!
//! Errors do not abort the parse: each failed declaration is recorded and the
//! parser synchronizes to the next statement boundary — just past a `;`, or
//! at the next `fn`/`function`/`var`/`if`/`return`/`extern` — so one source
//! file can surface several diagnostics in a single run.

use std::fmt;

use crate::ast::{
    BinaryOp, Expr, ExprKind, FunctionDecl, Literal, Param, Program, Stmt, StmtKind, Type, UnaryOp,
};
use crate::lexer::{Token, TokenKind};

/// A syntax diagnostic anchored to the offending token.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub lexeme: String,
    pub message: String,
}

impl ParseError {
    fn new(token: &Token, message: impl Into<String>) -> Self {
        ParseError {
            line: token.line,
            column: token.column,
            lexeme: token.text.clone(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lexeme.is_empty() {
            write!(
                f,
                "parse error at line {}, column {}: {}",
                self.line, self.column, self.message
            )
        } else {
            write!(
                f,
                "parse error at line {}, column {} near '{}': {}",
                self.line, self.column, self.lexeme, self.message
            )
        }
    }
}

impl std::error::Error for ParseError {}

/// Binding power of an infix operator, if the token is one.
fn binary_precedence(kind: TokenKind) -> Option<u8> {
    match kind {
        TokenKind::Assign | TokenKind::As | TokenKind::EqEq | TokenKind::BangEq => Some(1),
        TokenKind::Lt | TokenKind::Gt => Some(2),
        TokenKind::Plus | TokenKind::Minus => Some(3),
        TokenKind::Star | TokenKind::Slash => Some(4),
        _ => None,
    }
}

fn binary_op(kind: TokenKind) -> BinaryOp {
    match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::EqEq => BinaryOp::Eq,
        TokenKind::BangEq => BinaryOp::Neq,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::As => BinaryOp::As,
        other => unreachable!("token {:?} is not a binary operator", other),
    }
}

/// True when `kind` can begin an expression; used to decide whether a
/// `return` carries a value.
fn starts_expression(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::IntLiteral
            | TokenKind::FloatLiteral
            | TokenKind::StringLiteral
            | TokenKind::BoolLiteral
            | TokenKind::Null
            | TokenKind::Hash
            | TokenKind::Identifier
            | TokenKind::LParen
            | TokenKind::Minus
            | TokenKind::Bang
            | TokenKind::Amp
            | TokenKind::Star
    )
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    /// Parse the whole token stream. Returns the program, or every diagnostic
    /// collected while synchronizing past malformed declarations.
    pub fn parse(&mut self) -> Result<Program, Vec<ParseError>> {
        let mut program = Program::new();
        let mut errors = Vec::new();

        while !self.is_at_end() {
            match self.declaration() {
                Ok(decl) => program.decls.push(decl),
                Err(e) => {
                    errors.push(e);
                    self.synchronize();
                }
            }
        }

        if errors.is_empty() {
            Ok(program)
        } else {
            Err(errors)
        }
    }

    // ---- declarations ----

    fn declaration(&mut self) -> Result<FunctionDecl, ParseError> {
        if self.match_kind(TokenKind::Extern) {
            return self.extern_declaration();
        }
        if self.match_kind(TokenKind::Fn) || self.match_kind(TokenKind::Function) {
            return self.function_declaration();
        }
        Err(ParseError::new(self.peek(), "Expected declaration"))
    }

    fn extern_declaration(&mut self) -> Result<FunctionDecl, ParseError> {
        let keyword = self.previous().clone();
        let name = self
            .consume(TokenKind::Identifier, "Expected function name after 'extern'")?
            .text;
        self.consume(TokenKind::LParen, "Expected '(' after function name")?;

        let mut is_variadic = false;
        let mut params = Vec::new();
        if self.match_kind(TokenKind::Ellipsis) {
            is_variadic = true;
        } else if !self.check(TokenKind::RParen) {
            loop {
                let ty = self.parse_type()?;
                params.push(Param {
                    name: String::new(),
                    ty,
                });
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::RParen, "Expected ')' after parameter types")?;
        self.consume(TokenKind::Arrow, "Expected '->' after parameter list")?;
        let return_type = self.parse_type()?;
        self.match_kind(TokenKind::Semicolon);

        Ok(FunctionDecl {
            name,
            params,
            return_type,
            body: Vec::new(),
            is_extern: true,
            is_variadic,
            line: keyword.line,
            column: keyword.column,
        })
    }

    fn function_declaration(&mut self) -> Result<FunctionDecl, ParseError> {
        let keyword = self.previous().clone();
        let name = self
            .consume(TokenKind::Identifier, "Expected function name")?
            .text;
        self.consume(TokenKind::LParen, "Expected '(' after function name")?;

        let mut is_variadic = false;
        let mut params = Vec::new();
        if self.match_kind(TokenKind::Ellipsis) {
            is_variadic = true;
        } else if !self.check(TokenKind::RParen) {
            loop {
                let param_name = self
                    .consume(TokenKind::Identifier, "Expected parameter name")?
                    .text;
                self.consume(TokenKind::Colon, "Expected ':' after parameter name")?;
                let ty = self.parse_type()?;
                params.push(Param {
                    name: param_name,
                    ty,
                });
                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.consume(TokenKind::RParen, "Expected ')' after parameters")?;
        self.consume(TokenKind::Arrow, "Expected '->' after parameter list")?;
        let return_type = self.parse_type()?;

        let mut body = Vec::new();
        while !self.check(TokenKind::End) && !self.is_at_end() {
            body.push(self.statement()?);
        }
        self.consume(TokenKind::End, "Expected 'end' after function body")?;

        Ok(FunctionDecl {
            name,
            params,
            return_type,
            body,
            is_extern: false,
            is_variadic,
            line: keyword.line,
            column: keyword.column,
        })
    }

    fn parse_type(&mut self) -> Result<Type, ParseError> {
        let token = self.advance().clone();
        let ty = match token.kind {
            TokenKind::IntType => Type::Int,
            TokenKind::StringType => Type::Str,
            TokenKind::BoolType => Type::Bool,
            TokenKind::FloatType => Type::Float,
            TokenKind::NoneType => Type::None,
            TokenKind::PointerType => {
                self.consume(TokenKind::LParen, "Expected '(' after 'pointer'")?;
                let inner = self.parse_type()?;
                self.consume(TokenKind::RParen, "Expected ')' after pointee type")?;
                Type::Pointer(Box::new(inner))
            }
            _ => return Err(ParseError::new(&token, "Expected type")),
        };
        Ok(ty)
    }

    // ---- statements ----

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        if self.match_kind(TokenKind::If) {
            return self.if_statement();
        }
        if self.match_kind(TokenKind::While) {
            return self.while_statement();
        }
        if self.match_kind(TokenKind::Var) {
            return self.var_declaration();
        }
        if self.match_kind(TokenKind::Return) {
            return self.return_statement();
        }
        self.expression_statement()
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        let condition = self.expression()?;
        self.consume(TokenKind::Then, "Expected 'then' after condition")?;

        let mut then_branch = Vec::new();
        while !self.check(TokenKind::Else) && !self.check(TokenKind::End) && !self.is_at_end() {
            then_branch.push(self.statement()?);
        }

        let else_branch = if self.match_kind(TokenKind::Else) {
            let mut stmts = Vec::new();
            while !self.check(TokenKind::End) && !self.is_at_end() {
                stmts.push(self.statement()?);
            }
            Some(stmts)
        } else {
            None
        };

        self.consume(TokenKind::End, "Expected 'end' after if body")?;

        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            keyword.line,
            keyword.column,
        ))
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        let condition = self.expression()?;
        self.consume(TokenKind::Then, "Expected 'then' after condition")?;

        let mut body = Vec::new();
        while !self.check(TokenKind::End) && !self.is_at_end() {
            body.push(self.statement()?);
        }
        self.consume(TokenKind::End, "Expected 'end' after while body")?;

        Ok(Stmt::new(
            StmtKind::While { condition, body },
            keyword.line,
            keyword.column,
        ))
    }

    fn var_declaration(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        let name = self
            .consume(TokenKind::Identifier, "Expected variable name")?
            .text;
        self.consume(TokenKind::Colon, "Expected ':' after variable name")?;
        let ty = self.parse_type()?;

        let initializer = if self.match_kind(TokenKind::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        self.match_kind(TokenKind::Semicolon);

        Ok(Stmt::new(
            StmtKind::VarDecl {
                name,
                ty,
                initializer,
            },
            keyword.line,
            keyword.column,
        ))
    }

    fn return_statement(&mut self) -> Result<Stmt, ParseError> {
        let keyword = self.previous().clone();
        let value = if starts_expression(self.peek().kind) {
            Some(self.expression()?)
        } else {
            None
        };
        self.match_kind(TokenKind::Semicolon);

        Ok(Stmt::new(
            StmtKind::Return(value),
            keyword.line,
            keyword.column,
        ))
    }

    fn expression_statement(&mut self) -> Result<Stmt, ParseError> {
        let expr = self.expression()?;
        self.match_kind(TokenKind::Semicolon);
        let (line, column) = (expr.line, expr.column);
        Ok(Stmt::new(StmtKind::Expr(expr), line, column))
    }

    // ---- expressions ----

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.precedence_expr(1)
    }

    /// Precedence climbing: parse a unary operand, then fold in infix
    /// operators whose binding power is at least `min_prec`. Left-associative
    /// operators recurse at `prec + 1`; assignment recurses at `prec` so it
    /// nests to the right.
    fn precedence_expr(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut expr = self.unary()?;

        while let Some(prec) = binary_precedence(self.peek().kind) {
            if prec < min_prec {
                break;
            }
            let op_token = self.advance().clone();

            expr = match op_token.kind {
                TokenKind::Assign => {
                    if !Self::is_assignment_target(&expr) {
                        return Err(ParseError::new(&op_token, "Invalid assignment target"));
                    }
                    let value = self.precedence_expr(prec)?;
                    let (line, column) = (expr.line, expr.column);
                    Expr::new(
                        ExprKind::Assignment {
                            target: Box::new(expr),
                            value: Box::new(value),
                        },
                        line,
                        column,
                    )
                }
                TokenKind::As => {
                    let target = self.cast_target()?;
                    let (line, column) = (expr.line, expr.column);
                    Expr::new(
                        ExprKind::Binary {
                            left: Box::new(expr),
                            op: BinaryOp::As,
                            right: Box::new(target),
                        },
                        line,
                        column,
                    )
                }
                _ => {
                    let right = self.precedence_expr(prec + 1)?;
                    let (line, column) = (expr.line, expr.column);
                    Expr::new(
                        ExprKind::Binary {
                            left: Box::new(expr),
                            op: binary_op(op_token.kind),
                            right: Box::new(right),
                        },
                        line,
                        column,
                    )
                }
            };
        }

        Ok(expr)
    }

    fn is_assignment_target(expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Variable(_) => true,
            ExprKind::Unary { op, .. } => *op == UnaryOp::Deref,
            _ => false,
        }
    }

    /// The right operand of `as`: a type name, carried as a type literal.
    /// A `pointer(T)` spelling is accepted for grammar uniformity; only the
    /// base name matters to the cast.
    fn cast_target(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance().clone();
        if !token.kind.is_type_name() {
            return Err(ParseError::new(&token, "Expected type after 'as'"));
        }
        if token.kind == TokenKind::PointerType && self.check(TokenKind::LParen) {
            self.advance();
            self.parse_type()?;
            self.consume(TokenKind::RParen, "Expected ')' after pointee type")?;
        }
        Ok(Expr::new(
            ExprKind::TypeLiteral(token.text.clone()),
            token.line,
            token.column,
        ))
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Amp => Some(UnaryOp::AddrOf),
            TokenKind::Star => Some(UnaryOp::Deref),
            _ => None,
        };
        if let Some(op) = op {
            let token = self.advance().clone();
            let right = self.unary()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    right: Box::new(right),
                },
                token.line,
                token.column,
            ));
        }
        self.call()
    }

    fn call(&mut self) -> Result<Expr, ParseError> {
        let expr = self.primary()?;

        if let ExprKind::Variable(name) = &expr.kind {
            if self.match_kind(TokenKind::LParen) {
                let mut args = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        args.push(self.expression()?);
                        if !self.match_kind(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(TokenKind::RParen, "Expected ')' after arguments")?;
                return Ok(Expr::new(
                    ExprKind::Call {
                        callee: name.clone(),
                        args,
                    },
                    expr.line,
                    expr.column,
                ));
            }
        }

        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance().clone();
        let kind = match token.kind {
            TokenKind::IntLiteral => {
                let value = token
                    .text
                    .parse::<i64>()
                    .map_err(|_| ParseError::new(&token, "Invalid integer literal"))?;
                ExprKind::Literal(Literal::Int(value))
            }
            TokenKind::FloatLiteral => {
                let value = token
                    .text
                    .parse::<f64>()
                    .map_err(|_| ParseError::new(&token, "Invalid float literal"))?;
                ExprKind::Literal(Literal::Float(value))
            }
            TokenKind::StringLiteral => ExprKind::Literal(Literal::Str(token.text.clone())),
            TokenKind::BoolLiteral => ExprKind::Literal(Literal::Bool(token.text == "true")),
            TokenKind::Null => ExprKind::Literal(Literal::Null),
            TokenKind::Hash => {
                let name = self.advance().clone();
                if !name.kind.is_type_name() {
                    return Err(ParseError::new(&name, "Expected type name after '#'"));
                }
                ExprKind::TypeLiteral(name.text.clone())
            }
            TokenKind::Identifier => ExprKind::Variable(token.text.clone()),
            TokenKind::LParen => {
                let expr = self.expression()?;
                self.consume(TokenKind::RParen, "Expected ')' after expression")?;
                return Ok(expr);
            }
            _ => return Err(ParseError::new(&token, "Expected expression")),
        };
        Ok(Expr::new(kind, token.line, token.column))
    }

    // ---- helpers ----

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            return Ok(self.advance().clone());
        }
        Err(ParseError::new(self.peek(), message))
    }

    /// Skip forward to a statement boundary after an error: just past a `;`,
    /// or to the next token that can begin a declaration or statement.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            match self.peek().kind {
                TokenKind::Fn
                | TokenKind::Function
                | TokenKind::Var
                | TokenKind::If
                | TokenKind::Return
                | TokenKind::Extern => return,
                _ => {}
            }
            self.advance();
        }
    }
}
