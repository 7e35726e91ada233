use anyhow::Result;

use super::{parse_number, Parser};
use crate::ast::{Declaration, StructDef};
use crate::lexer::TokenKind;
use crate::types::{BaseKind, StructMember, TypeInfo};

impl Parser<'_> {
    /// `struct NAME` used as a type specifier. The struct must already be
    /// defined.
    pub(crate) fn parse_struct_type(&mut self) -> Result<TypeInfo> {
        self.expect(TokenKind::Struct)?;
        let (name, pos) = self.expect_ident()?;

        if self.structs.lookup(&name).is_none() {
            return Err(self
                .diags
                .error(pos, format!("unknown struct type '{name}'")));
        }

        let mut ty = TypeInfo::of(BaseKind::Struct);
        ty.struct_name = Some(name);
        self.parse_pointer_suffix(&mut ty)?;
        Ok(ty)
    }

    /// `struct NAME { members };` — the descriptor is registered before the
    /// member list so self-referential pointer members resolve, and laid out
    /// when the closing brace is reached.
    pub(crate) fn parse_struct_definition(&mut self) -> Result<StructDef> {
        self.expect(TokenKind::Struct)?;
        let (name, pos) = self.expect_ident()?;

        if let Err(err) = self.structs.declare(&name) {
            return Err(self.diags.error(pos, err));
        }

        self.expect(TokenKind::LBrace)?;
        let mut members = Vec::new();
        let mut decls = Vec::new();
        while !self.is(TokenKind::RBrace) && !self.is(TokenKind::Eof) {
            let mut member_ty = self.parse_type()?;
            let (member_name, member_pos) = self.expect_ident()?;

            if self.consume(TokenKind::LBracket)? {
                if self.is(TokenKind::Number) {
                    member_ty.array = true;
                    member_ty.array_size =
                        parse_number(self.cur().text()) as u32;
                    self.bump()?;
                } else {
                    return Err(self.diags.error(
                        member_pos,
                        format!("array member '{member_name}' must have a size"),
                    ));
                }
                self.expect(TokenKind::RBracket)?;
            }

            members.push(StructMember {
                name: member_name.clone(),
                ty: member_ty.clone(),
                offset: 0, // assigned by layout
            });
            decls.push(Declaration {
                name: member_name,
                ty: member_ty,
                init: None,
                pos: member_pos,
            });

            self.expect(TokenKind::Semicolon)?;
        }
        self.expect(TokenKind::RBrace)?;
        self.expect(TokenKind::Semicolon)?;

        self.structs.finish(&name, members);
        Ok(StructDef {
            name,
            members: decls,
        })
    }
}
