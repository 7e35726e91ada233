use anyhow::Result;

use super::Parser;
use crate::ast::{AsmOperand, Stmt};
use crate::lexer::TokenKind;

impl Parser<'_> {
    pub(crate) fn parse_statement(&mut self) -> Result<Stmt> {
        match self.kind() {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block_inner()?)),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::Do => self.parse_do_while_statement(),
            TokenKind::For => self.parse_for_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Asm => self.parse_inline_assembly(),
            TokenKind::Static => {
                let pos = self.cur().pos;
                self.diags.warning(
                    Some(pos),
                    "static local variables are not supported - 'static' ignored in local context",
                );
                self.bump()?;
                self.parse_local_declaration()
            }
            kind if Self::is_type_start(kind) => self.parse_local_declaration(),
            _ => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_local_declaration(&mut self) -> Result<Stmt> {
        let ty = self.parse_type()?;
        let (name, pos) = self.expect_ident()?;
        let decl = self.parse_variable_declaration(name, pos, ty)?;
        Ok(Stmt::Decl(decl))
    }

    fn parse_if_statement(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let then_body = Box::new(self.parse_statement()?);
        let else_body = if self.consume(TokenKind::Else)? {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
        })
    }

    fn parse_while_statement(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_do_while_statement(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::Do)?;
        let body = Box::new(self.parse_statement()?);
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::DoWhile { body, cond })
    }

    fn parse_for_statement(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::For)?;
        self.expect(TokenKind::LParen)?;

        let init = if Self::is_type_start(self.kind()) {
            Some(Box::new(self.parse_local_declaration()?))
        } else if !self.is(TokenKind::Semicolon) {
            let expr = self.parse_expression()?;
            self.expect(TokenKind::Semicolon)?;
            Some(Box::new(Stmt::Expr(expr)))
        } else {
            self.expect(TokenKind::Semicolon)?;
            None
        };

        let cond = if !self.is(TokenKind::Semicolon) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon)?;

        let update = if !self.is(TokenKind::RParen) {
            Some(Box::new(Stmt::Expr(self.parse_expression()?)))
        } else {
            None
        };
        self.expect(TokenKind::RParen)?;

        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
        })
    }

    fn parse_return_statement(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::Return)?;
        let expr = if !self.is(TokenKind::Semicolon) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::Return(expr))
    }

    /// `__asm { ... }` or `__asm("...")`, optionally with the extended
    /// constraint/operand lists.
    fn parse_inline_assembly(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::Asm)?;

        if self.is(TokenKind::LBrace) {
            return self.parse_asm_block();
        }

        self.expect(TokenKind::LParen)?;
        if !self.is(TokenKind::Str) {
            let pos = self.cur().pos;
            return Err(self
                .diags
                .error(pos, "expected string literal in __asm statement"));
        }
        let template = self.cur().text().to_string();
        self.bump()?;

        let mut operands = Vec::new();
        if self.consume(TokenKind::Colon)? {
            // first colon: output operands, not supported yet
            if self.consume(TokenKind::Colon)? {
                while !self.is(TokenKind::RParen) {
                    if self.consume(TokenKind::Comma)? {
                        continue;
                    }
                    if !self.is(TokenKind::Str) {
                        let pos = self.cur().pos;
                        return Err(self.diags.error(
                            pos,
                            "expected constraint string for assembly operand",
                        ));
                    }
                    let constraint = self.cur().text().to_string();
                    self.bump()?;
                    self.expect(TokenKind::LParen)?;
                    let expr = self.parse_expression()?;
                    self.expect(TokenKind::RParen)?;
                    operands.push(AsmOperand { constraint, expr });
                }
            }
        }

        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::Asm { template, operands })
    }

    /// Collect raw token text between balanced braces.
    fn parse_asm_block(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::LBrace)?;
        let mut code = String::new();
        let mut depth = 1usize;
        loop {
            match self.kind() {
                TokenKind::Eof => break,
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        self.bump()?;
                        break;
                    }
                }
                _ => {}
            }
            if !code.is_empty() {
                code.push(' ');
            }
            code.push_str(&token_source_text(self.cur()));
            self.bump()?;
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(Stmt::AsmBlock(code))
    }
}

/// Source rendering of a token inside an `__asm { ... }` block.
fn token_source_text(token: &crate::lexer::Token) -> String {
    if let Some(text) = &token.text {
        return text.clone();
    }
    match token.kind {
        TokenKind::CharLiteral => format!("{}", token.byte_value),
        // operators and punctuation carry no lexeme; strip the quotes the
        // diagnostic name wears
        kind => kind.name().trim_matches('\'').to_string(),
    }
}
