//! Parser for the Imp language
//!
//! A recursive descent parser that produces an AST from a token stream.
//! One token of lookahead is enough for the whole grammar; the only place
//! that looks two tokens ahead is statement dispatch on an identifier,
//! which peeks at the following `=`, `[` or `(`.
//!
//! Parsing stops at the first mismatch and reports it as a syntax error on
//! the offending token's line.

use crate::ast::*;
use crate::common::{IdGenerator, NodeId, Span};
use crate::diagnostics::CompileError;
use crate::lexer::{Token, TokenKind};
use crate::types::Type;

type Result<T> = std::result::Result<T, CompileError>;

/// Deepest combined nesting of blocks, parentheses, indices, call arguments
/// and unary minus. Every later stage recurses over the same tree.
pub const MAX_NESTING: usize = 128;

/// Parse a token stream into an AST
pub fn parse(tokens: &[Token]) -> Result<Ast> {
    let mut parser = Parser::new(tokens);
    let ast = parser.parse_program()?;
    tracing::debug!(
        arrays = ast.arrays.len(),
        routines = ast.routines.len(),
        "parsed program"
    );
    Ok(ast)
}

/// Parser state
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    id_gen: IdGenerator,
    eof: Token,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        let eof = tokens.last().cloned().unwrap_or(Token {
            kind: TokenKind::Eof,
            span: Span::new(0, 0, 1),
            column: 1,
            text: String::new(),
        });
        Self {
            tokens,
            pos: 0,
            id_gen: IdGenerator::new(),
            eof,
            depth: 0,
        }
    }

    fn next_id(&mut self) -> NodeId {
        self.id_gen.next()
    }

    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&self.eof)
    }

    fn peek(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_n(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    fn advance(&mut self) -> &Token {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        self.tokens.get(self.pos.saturating_sub(1)).unwrap_or(&self.eof)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("`{}`", kind)))
        }
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn descend(&mut self) -> Result<()> {
        if self.depth >= MAX_NESTING {
            return Err(CompileError::too_deep(MAX_NESTING, self.span()));
        }
        self.depth += 1;
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    /// Syntax error at the current token
    fn unexpected(&self, expected: &str) -> CompileError {
        let tok = self.current();
        let found = match tok.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Ident => format!("identifier `{}`", tok.text),
            kind if kind.is_keyword() => format!("keyword `{}`", tok.text),
            _ => format!("`{}`", tok.text),
        };
        CompileError::syntax(expected, found, tok.span)
    }

    // ==================== PROGRAM ====================

    fn parse_program(&mut self) -> Result<Ast> {
        let mut arrays = Vec::new();
        while self.at(TokenKind::Arrays) {
            self.parse_array_decls(&mut arrays)?;
        }

        let mut routines = Vec::new();
        loop {
            match self.peek() {
                TokenKind::Int | TokenKind::Float | TokenKind::Def => {
                    routines.push(self.parse_routine()?);
                }
                TokenKind::Eof if !routines.is_empty() => break,
                _ => return Err(self.unexpected("routine declaration")),
            }
        }

        Ok(Ast { arrays, routines })
    }

    // ==================== DECLARATIONS ====================

    fn parse_array_decls(&mut self, arrays: &mut Vec<ArrayDecl>) -> Result<()> {
        self.expect(TokenKind::Arrays)?;

        loop {
            let start = self.span();
            let elem = self.parse_type()?;
            let (name, name_span) = self.parse_ident()?;
            self.expect(TokenKind::LBracket)?;
            let size = self.parse_expr()?;
            let close = self.expect(TokenKind::RBracket)?.span;

            arrays.push(ArrayDecl {
                id: self.next_id(),
                name,
                elem,
                size,
                span: start.to(name_span).to(close),
            });

            if self.at(TokenKind::Comma) {
                self.advance();
            } else {
                return Ok(());
            }
        }
    }

    fn parse_routine(&mut self) -> Result<Routine> {
        let start = self.span();

        let return_type = if self.at(TokenKind::Def) {
            self.advance();
            None
        } else {
            Some(self.parse_type()?)
        };

        let (name, name_span) = self.parse_ident()?;
        let params = self.parse_params()?;

        let locals = if self.at(TokenKind::With) {
            self.advance();
            let mut locals = vec![self.parse_var_decl()?];
            while self.at(TokenKind::Comma) {
                self.advance();
                locals.push(self.parse_var_decl()?);
            }
            locals
        } else {
            Vec::new()
        };

        let body = self.parse_block()?;

        Ok(Routine {
            id: self.next_id(),
            signature: RoutineSignature {
                name,
                params,
                return_type,
            },
            locals,
            body,
            span: start.to(name_span),
        })
    }

    fn parse_params(&mut self) -> Result<Vec<VarDecl>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            params.push(self.parse_var_decl()?);
            while self.at(TokenKind::Comma) {
                self.advance();
                params.push(self.parse_var_decl()?);
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_var_decl(&mut self) -> Result<VarDecl> {
        let start = self.span();
        let ty = self.parse_type()?;
        let (name, name_span) = self.parse_ident()?;
        Ok(VarDecl {
            id: self.next_id(),
            name,
            ty,
            span: start.to(name_span),
        })
    }

    fn parse_type(&mut self) -> Result<Type> {
        match self.peek() {
            TokenKind::Int => {
                self.advance();
                Ok(Type::Int)
            }
            TokenKind::Float => {
                self.advance();
                Ok(Type::Float)
            }
            _ => Err(self.unexpected("`int` or `float`")),
        }
    }

    // ==================== STATEMENTS ====================

    fn parse_block(&mut self) -> Result<Block> {
        self.descend()?;
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();

        while !self.at(TokenKind::RBrace) {
            if self.at(TokenKind::Eof) {
                return Err(self.unexpected("`}`"));
            }
            stmts.push(self.parse_stmt()?);
        }

        let close = self.expect(TokenKind::RBrace)?.span;
        self.ascend();
        Ok(Block { stmts, close })
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let start = self.span();
        let kind = match self.peek() {
            TokenKind::Ident => match self.peek_n(1) {
                TokenKind::Eq | TokenKind::LBracket => {
                    let target = self.parse_place()?;
                    self.expect(TokenKind::Eq)?;
                    let value = self.parse_expr()?;
                    StmtKind::Assign { target, value }
                }
                TokenKind::LParen => StmtKind::Call(self.parse_call()?),
                _ => {
                    self.advance();
                    return Err(self.unexpected("`=`, `[` or `(`"));
                }
            },
            TokenKind::If => self.parse_if()?,
            TokenKind::For => self.parse_for()?,
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                StmtKind::While { cond, body }
            }
            TokenKind::Write => {
                self.advance();
                StmtKind::Write(self.parse_expr()?)
            }
            TokenKind::Read => {
                self.advance();
                StmtKind::Read(self.parse_place()?)
            }
            TokenKind::Return => {
                let line = self.advance().span.line;
                // A value belongs to the return only if it starts on the same line
                let value = if self.peek().starts_expr() && self.span().line == line {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                StmtKind::Return(value)
            }
            _ => return Err(self.unexpected("statement")),
        };

        Ok(Stmt { kind, span: start })
    }

    fn parse_if(&mut self) -> Result<StmtKind> {
        self.expect(TokenKind::If)?;
        let cond = self.parse_expr()?;
        let then_block = self.parse_block()?;
        let else_block = if self.at(TokenKind::Else) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_block,
            else_block,
        })
    }

    fn parse_for(&mut self) -> Result<StmtKind> {
        self.expect(TokenKind::For)?;
        let (var, var_span) = self.parse_ident()?;
        self.expect(TokenKind::From)?;
        let start = self.parse_expr()?;
        let direction = match self.peek() {
            TokenKind::To => Direction::Ascending,
            TokenKind::Downto => Direction::Descending,
            _ => return Err(self.unexpected("`to` or `downto`")),
        };
        self.advance();
        let end = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(StmtKind::For {
            id: self.next_id(),
            var,
            var_span,
            start,
            end,
            direction,
            body,
        })
    }

    fn parse_place(&mut self) -> Result<Place> {
        let (name, span) = self.parse_ident()?;
        if self.at(TokenKind::LBracket) {
            self.advance();
            let index = self.parse_expr()?;
            let close = self.expect(TokenKind::RBracket)?.span;
            Ok(Place::Element {
                id: self.next_id(),
                array: name,
                index: Box::new(index),
                span: span.to(close),
            })
        } else {
            Ok(Place::Variable {
                id: self.next_id(),
                name,
                span,
            })
        }
    }

    fn parse_call(&mut self) -> Result<Call> {
        let (name, span) = self.parse_ident()?;
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.at(TokenKind::RParen) {
            args.push(self.parse_expr()?);
            while self.at(TokenKind::Comma) {
                self.advance();
                args.push(self.parse_expr()?);
            }
        }
        let close = self.expect(TokenKind::RParen)?.span;
        Ok(Call {
            id: self.next_id(),
            name,
            args,
            span: span.to(close),
        })
    }

    // ==================== EXPRESSIONS ====================

    fn parse_expr(&mut self) -> Result<Expr> {
        self.descend()?;
        let expr = self.parse_expr_with_precedence(0)?;
        self.ascend();
        Ok(expr)
    }

    fn parse_expr_with_precedence(&mut self, min_prec: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;

        while let Some((op, prec)) = self.binary_op_info() {
            if prec < min_prec {
                break;
            }

            self.advance();
            let right = self.parse_expr_with_precedence(prec + 1)?;
            let span = left.span.to(right.span);

            left = Expr {
                id: self.next_id(),
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(left),
                    rhs: Box::new(right),
                },
                span,
            };
        }

        Ok(left)
    }

    /// All binary operators are left-associative
    fn binary_op_info(&self) -> Option<(BinaryOp, u8)> {
        let (op, prec) = match self.peek() {
            TokenKind::EqEq => (BinaryOp::Eq, 1),
            TokenKind::Ne => (BinaryOp::Ne, 1),
            TokenKind::Lt => (BinaryOp::Lt, 1),
            TokenKind::Le => (BinaryOp::Le, 1),
            TokenKind::Gt => (BinaryOp::Gt, 1),
            TokenKind::Ge => (BinaryOp::Ge, 1),
            TokenKind::Plus => (BinaryOp::Add, 2),
            TokenKind::Minus => (BinaryOp::Sub, 2),
            TokenKind::Star => (BinaryOp::Mul, 3),
            TokenKind::Slash => (BinaryOp::Div, 3),
            TokenKind::Percent => (BinaryOp::Rem, 3),
            _ => return None,
        };
        Some((op, prec))
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.at(TokenKind::Minus) {
            let start = self.advance().span;
            self.descend()?;
            let operand = self.parse_unary()?;
            self.ascend();
            let span = start.to(operand.span);
            return Ok(Expr {
                id: self.next_id(),
                kind: ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                span,
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let tok = self.current().clone();
        let kind = match tok.kind {
            TokenKind::IntLit => {
                self.advance();
                let value = tok.text.parse::<i32>().map_err(|_| CompileError::IntOutOfRange {
                    text: tok.text.clone(),
                    line: tok.span.line,
                    span: tok.span.into(),
                })?;
                ExprKind::Int(value)
            }
            TokenKind::FloatLit => {
                self.advance();
                let value = tok
                    .text
                    .parse::<f64>()
                    .map_err(|_| CompileError::lex(tok.text.clone(), tok.span))?;
                ExprKind::Float(value)
            }
            TokenKind::StringLit => {
                self.advance();
                let inner = tok.text.trim_start_matches('"').trim_end_matches('"');
                ExprKind::Str(inner.to_string())
            }
            TokenKind::Ident => match self.peek_n(1) {
                TokenKind::LParen => {
                    let call = self.parse_call()?;
                    let span = call.span;
                    return Ok(Expr {
                        id: self.next_id(),
                        kind: ExprKind::Call(call),
                        span,
                    });
                }
                TokenKind::LBracket => {
                    self.advance();
                    self.advance();
                    let index = self.parse_expr()?;
                    let close = self.expect(TokenKind::RBracket)?.span;
                    return Ok(Expr {
                        id: self.next_id(),
                        kind: ExprKind::Index {
                            array: tok.text,
                            index: Box::new(index),
                        },
                        span: tok.span.to(close),
                    });
                }
                _ => {
                    self.advance();
                    ExprKind::Variable(tok.text.clone())
                }
            },
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                return Ok(inner);
            }
            _ => return Err(self.unexpected("expression")),
        };

        Ok(Expr {
            id: self.next_id(),
            kind,
            span: tok.span,
        })
    }

    // ==================== HELPERS ====================

    fn parse_ident(&mut self) -> Result<(String, Span)> {
        if self.at(TokenKind::Ident) {
            let tok = self.advance();
            Ok((tok.text.clone(), tok.span))
        } else {
            Err(self.unexpected("identifier"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_src(src: &str) -> Result<Ast> {
        parse(&lex(src)?)
    }

    #[test]
    fn test_precedence() {
        let ast = parse_src("def main() {\n  write 1 + 2 * 3\n}").unwrap();
        let StmtKind::Write(expr) = &ast.routines[0].body.stmts[0].kind else {
            panic!("expected write");
        };
        let ExprKind::Binary { op, rhs, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Add);
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn test_return_value_must_share_line() {
        let ast = parse_src("def p() {\n  return\n}\ndef main() {\n}").unwrap();
        assert!(matches!(
            ast.routines[0].body.stmts[0].kind,
            StmtKind::Return(None)
        ));
    }

    #[test]
    fn test_node_ids_are_unique() {
        let ast = parse_src("def main() with int x {\n  x = x + 1\n}").unwrap();
        let StmtKind::Assign { target, value } = &ast.routines[0].body.stmts[0].kind else {
            panic!("expected assignment");
        };
        let Place::Variable { id, .. } = target else {
            panic!("expected variable");
        };
        assert_ne!(*id, value.id);
    }
}
