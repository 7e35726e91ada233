use anyhow::Result;

use super::{parse_number, Parser};
use crate::ast::{AssignOp, BinOp, Expr, Literal, UnaryOp};
use crate::lexer::TokenKind;
use crate::types::type_of;

impl Parser<'_> {
    /// Full expression, comma operator included.
    pub(crate) fn parse_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_assignment_expression()?;
        while self.consume(TokenKind::Comma)? {
            let right = self.parse_assignment_expression()?;
            left = Expr::Binary {
                op: BinOp::Comma,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }
        Ok(left)
    }

    pub(crate) fn parse_assignment_expression(&mut self) -> Result<Expr> {
        let left = self.parse_ternary_expression()?;

        let op = match self.kind() {
            TokenKind::Assign => AssignOp::Plain,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::MulAssign => AssignOp::Mul,
            TokenKind::DivAssign => AssignOp::Div,
            TokenKind::ModAssign => AssignOp::Mod,
            TokenKind::LeftShiftAssign => AssignOp::Shl,
            TokenKind::RightShiftAssign => AssignOp::Shr,
            _ => return Ok(left),
        };
        let op_pos = self.cur().pos;
        self.bump()?;

        // storing through a dereferenced void pointer has no element size
        if let Expr::Unary {
            op: UnaryOp::Deref,
            operand,
        } = &left
        {
            let pointee = type_of(operand, &self.symbols, &self.structs);
            if pointee.is_void_pointer() {
                return Err(self.diags.error(
                    op_pos,
                    "cannot assign to a dereferenced void pointer - it has no defined size",
                ));
            }
        }

        let value = self.parse_assignment_expression()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(left),
            value: Box::new(value),
        })
    }

    fn parse_ternary_expression(&mut self) -> Result<Expr> {
        let cond = self.parse_logical_or_expression()?;
        if !self.consume(TokenKind::Question)? {
            return Ok(cond);
        }
        // a bare number before ':' here is the branch value, not a segment
        self.suppress_far_colon += 1;
        let then_expr = self.parse_expression();
        self.suppress_far_colon -= 1;
        let then_expr = then_expr?;
        self.expect(TokenKind::Colon)?;
        let else_expr = self.parse_ternary_expression()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    fn parse_logical_or_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_logical_and_expression()?;
        while self.consume(TokenKind::Or)? {
            let right = self.parse_logical_and_expression()?;
            left = Expr::Binary {
                op: BinOp::LogicalOr,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_logical_and_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_relational_expression()?;
        while self.consume(TokenKind::And)? {
            let right = self.parse_relational_expression()?;
            left = Expr::Binary {
                op: BinOp::LogicalAnd,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }
        Ok(left)
    }

    /// Relational and equality operators share one level.
    fn parse_relational_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_bitor_expression()?;
        loop {
            let op = match self.kind() {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::Lte => BinOp::Le,
                TokenKind::Gte => BinOp::Ge,
                TokenKind::Eq => BinOp::Eq,
                TokenKind::Neq => BinOp::Ne,
                _ => return Ok(left),
            };
            self.bump()?;
            let right = self.parse_bitor_expression()?;
            left = Expr::Binary {
                op,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }
    }

    fn parse_bitor_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_bitxor_expression()?;
        while self.consume(TokenKind::Pipe)? {
            let right = self.parse_bitxor_expression()?;
            left = Expr::Binary {
                op: BinOp::BitOr,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_bitxor_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_bitand_expression()?;
        while self.consume(TokenKind::Xor)? {
            let right = self.parse_bitand_expression()?;
            left = Expr::Binary {
                op: BinOp::BitXor,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_bitand_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_shift_expression()?;
        while self.consume(TokenKind::Ampersand)? {
            let right = self.parse_shift_expression()?;
            left = Expr::Binary {
                op: BinOp::BitAnd,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_shift_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive_expression()?;
        loop {
            let op = match self.kind() {
                TokenKind::LeftShift => BinOp::Shl,
                TokenKind::RightShift => BinOp::Shr,
                _ => return Ok(left),
            };
            self.bump()?;
            let right = self.parse_additive_expression()?;
            left = Expr::Binary {
                op,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }
    }

    fn parse_additive_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative_expression()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.bump()?;
            let right = self.parse_multiplicative_expression()?;
            left = Expr::Binary {
                op,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }
    }

    fn parse_multiplicative_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary_expression()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => return Ok(left),
            };
            self.bump()?;
            let right = self.parse_unary_expression()?;
            left = Expr::Binary {
                op,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }
    }

    pub(crate) fn parse_unary_expression(&mut self) -> Result<Expr> {
        let op = match self.kind() {
            TokenKind::Ampersand => Some(UnaryOp::AddressOf),
            TokenKind::Star => Some(UnaryOp::Deref),
            TokenKind::Minus => Some(UnaryOp::Negate),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::BitwiseNot => Some(UnaryOp::BitNot),
            TokenKind::Increment => Some(UnaryOp::PreInc),
            TokenKind::Decrement => Some(UnaryOp::PreDec),
            _ => None,
        };
        if let Some(op) = op {
            self.bump()?;
            let operand = self.parse_unary_expression()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }

        if self.is(TokenKind::Sizeof) {
            return self.parse_sizeof_expression();
        }

        // cast: '(' type ')' unary, resolved by backtracking
        if self.is(TokenKind::LParen) {
            let state = self.lex.save();
            self.bump()?;
            if Self::is_type_start(self.kind()) {
                let ty = self.parse_type()?;
                if self.consume(TokenKind::RParen)? {
                    let operand = self.parse_unary_expression()?;
                    return Ok(Expr::Unary {
                        op: UnaryOp::Cast(ty),
                        operand: Box::new(operand),
                    });
                }
            }
            self.lex.restore(state);
        }

        self.parse_postfix_expression()
    }

    /// `sizeof(type)` or `sizeof expr`, folded to an integer literal with
    /// the layout rules of the target.
    fn parse_sizeof_expression(&mut self) -> Result<Expr> {
        self.expect(TokenKind::Sizeof)?;
        if self.is(TokenKind::LParen) {
            let state = self.lex.save();
            self.bump()?;
            if Self::is_type_start(self.kind()) {
                let ty = self.parse_type()?;
                if self.consume(TokenKind::RParen)? {
                    let size = ty.size(&self.structs) as i32;
                    return Ok(Expr::Literal(Literal::Int(size)));
                }
            }
            self.lex.restore(state);
        }
        let operand = self.parse_unary_expression()?;
        let ty = type_of(&operand, &self.symbols, &self.structs);
        Ok(Expr::Literal(Literal::Int(ty.size(&self.structs) as i32)))
    }

    fn parse_postfix_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_primary_expression()?;
        loop {
            if self.consume(TokenKind::LBracket)? {
                // a[i] desugars to *(a + i)
                let index = self.parse_expression()?;
                self.expect(TokenKind::RBracket)?;
                left = Expr::Unary {
                    op: UnaryOp::Deref,
                    operand: Box::new(Expr::Binary {
                        op: BinOp::Add,
                        lhs: Box::new(left),
                        rhs: Box::new(index),
                    }),
                };
            } else if self.consume(TokenKind::Dot)? {
                let (member, _) = self.expect_ident()?;
                left = Expr::Member {
                    arrow: false,
                    base: Box::new(left),
                    member,
                };
            } else if self.consume(TokenKind::Arrow)? {
                let (member, _) = self.expect_ident()?;
                left = Expr::Member {
                    arrow: true,
                    base: Box::new(left),
                    member,
                };
            } else if self.consume(TokenKind::Increment)? {
                left = Expr::Unary {
                    op: UnaryOp::PostInc,
                    operand: Box::new(left),
                };
            } else if self.consume(TokenKind::Decrement)? {
                left = Expr::Unary {
                    op: UnaryOp::PostDec,
                    operand: Box::new(left),
                };
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_primary_expression(&mut self) -> Result<Expr> {
        match self.kind() {
            TokenKind::Identifier => {
                let name = self.cur().text().to_string();
                let pos = self.cur().pos;
                self.bump()?;
                if self.is(TokenKind::LParen) {
                    self.note_deprecated_call(&name, pos);
                    return self.parse_call_arguments(name);
                }
                Ok(Expr::Ident(name))
            }
            TokenKind::Number => {
                let value = parse_number(self.cur().text());
                self.bump()?;
                // segment:offset syntax for far-pointer literals
                if self.is(TokenKind::Colon) && self.suppress_far_colon == 0 {
                    self.bump()?;
                    if !self.is(TokenKind::Number) {
                        let pos = self.cur().pos;
                        return Err(self.diags.error(
                            pos,
                            "expected offset value after segment in far pointer",
                        ));
                    }
                    let offset = parse_number(self.cur().text());
                    self.bump()?;
                    return Ok(Expr::Literal(Literal::FarPtr {
                        segment: value as u16,
                        offset: offset as u16,
                    }));
                }
                Ok(Expr::Literal(Literal::Int(value)))
            }
            TokenKind::CharLiteral => {
                let value = self.cur().byte_value;
                self.bump()?;
                Ok(Expr::Literal(Literal::Char(value)))
            }
            TokenKind::Str => {
                let text = self.cur().text().to_string();
                self.bump()?;
                Ok(Expr::Literal(Literal::Str(text)))
            }
            TokenKind::True => {
                self.bump()?;
                Ok(Expr::Literal(Literal::Bool(true)))
            }
            TokenKind::False => {
                self.bump()?;
                Ok(Expr::Literal(Literal::Bool(false)))
            }
            TokenKind::LParen => {
                self.bump()?;
                // parentheses lift the ternary-colon restriction
                let saved = self.suppress_far_colon;
                self.suppress_far_colon = 0;
                let expr = self.parse_expression();
                self.suppress_far_colon = saved;
                let expr = expr?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            _ => {
                let pos = self.cur().pos;
                Err(self.diags.error(pos, "expected expression"))
            }
        }
    }

    fn parse_call_arguments(&mut self, name: String) -> Result<Expr> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.is(TokenKind::RParen) {
            args.push(self.parse_assignment_expression()?);
            while self.consume(TokenKind::Comma)? {
                args.push(self.parse_assignment_expression()?);
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(Expr::Call { name, args })
    }
}
