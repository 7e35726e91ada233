use anyhow::Result;
use indexmap::IndexMap;

use crate::ast::{
    Block, Declaration, FnFlags, Function, Item, Program,
};
use crate::diag::Diagnostics;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::types::{BaseKind, StorageFlags, StructRegistry, SymbolTable, TypeInfo};

mod attrs;
mod expr;
mod stmt;
mod struct_def;

/// What the parser remembers about an already-parsed function, for
/// deprecation warnings at later call sites.
struct FnRecord {
    deprecated: bool,
    deprecation_msg: Option<String>,
}

/// Recursive-descent parser. Owns the scanner and the tables it populates;
/// the tables outlive the AST and move on to the code generator.
pub struct Parser<'d> {
    lex: Lexer,
    diags: &'d mut Diagnostics,
    symbols: SymbolTable,
    structs: StructRegistry,
    functions: IndexMap<String, FnRecord>,
    /// Non-zero while parsing a ternary branch, where `:` must not pair a
    /// number into a far-pointer literal.
    suppress_far_colon: u32,
}

impl<'d> Parser<'d> {
    pub fn new(lex: Lexer, diags: &'d mut Diagnostics) -> Self {
        Parser {
            lex,
            diags,
            symbols: SymbolTable::new(),
            structs: StructRegistry::new(),
            functions: IndexMap::new(),
            suppress_far_colon: 0,
        }
    }

    /// Hand the populated symbol table and struct registry to the next phase.
    pub fn into_tables(self) -> (SymbolTable, StructRegistry) {
        (self.symbols, self.structs)
    }

    pub fn parse_program(&mut self) -> Result<Program> {
        let mut program = Program::default();
        while !self.is(TokenKind::Eof) {
            let item = self.parse_item()?;
            program.items.push(item);
        }
        Ok(program)
    }

    // token plumbing

    pub(crate) fn cur(&self) -> &Token {
        self.lex.current()
    }

    pub(crate) fn kind(&self) -> TokenKind {
        self.lex.current().kind
    }

    pub(crate) fn is(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    pub(crate) fn bump(&mut self) -> Result<()> {
        self.lex.advance(self.diags)
    }

    /// Consume the current token if it matches.
    pub(crate) fn consume(&mut self, kind: TokenKind) -> Result<bool> {
        if self.is(kind) {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<()> {
        if self.consume(kind)? {
            return Ok(());
        }
        let token = self.cur();
        let (pos, got) = (token.pos, token.kind.name());
        Err(self.diags.error(
            pos,
            format!("expected {} but got {}", kind.name(), got),
        ))
    }

    /// Consume an identifier and return its text and position.
    pub(crate) fn expect_ident(&mut self) -> Result<(String, usize)> {
        if self.is(TokenKind::Identifier) {
            let name = self.cur().text().to_string();
            let pos = self.cur().pos;
            self.bump()?;
            return Ok((name, pos));
        }
        let pos = self.cur().pos;
        let got = self.cur().kind.name();
        Err(self
            .diags
            .error(pos, format!("expected identifier but got {got}")))
    }

    pub(crate) fn is_type_start(kind: TokenKind) -> bool {
        matches!(
            kind,
            TokenKind::Int
                | TokenKind::Short
                | TokenKind::Long
                | TokenKind::Unsigned
                | TokenKind::Char
                | TokenKind::Void
                | TokenKind::Bool
                | TokenKind::Struct
                | TokenKind::Far
                | TokenKind::Stackframe
                | TokenKind::Farcalled
        )
    }

    /// Parse a type specifier: optional `unsigned`, call-convention
    /// keywords, the base type, then pointer declarators.
    pub(crate) fn parse_type(&mut self) -> Result<TypeInfo> {
        if self.is(TokenKind::Struct) {
            return self.parse_struct_type();
        }

        let mut ty = TypeInfo::default();
        let mut is_unsigned = false;
        if self.consume(TokenKind::Unsigned)? {
            is_unsigned = true;
        }

        loop {
            if self.consume(TokenKind::Stackframe)? {
                ty.storage |= StorageFlags::STACKFRAME;
            } else if self.consume(TokenKind::Far)?
                || self.consume(TokenKind::Farcalled)?
            {
                ty.storage |= StorageFlags::FAR;
            } else {
                break;
            }
        }

        ty.base = if self.consume(TokenKind::Int)?
            || self.consume(TokenKind::Short)?
        {
            if is_unsigned {
                BaseKind::U16
            } else {
                BaseKind::I16
            }
        } else if self.consume(TokenKind::Long)? {
            if is_unsigned {
                BaseKind::U32
            } else {
                BaseKind::I32
            }
        } else if self.consume(TokenKind::Char)? {
            if is_unsigned {
                BaseKind::U8
            } else {
                BaseKind::I8
            }
        } else if self.consume(TokenKind::Bool)? {
            BaseKind::Bool
        } else if self.consume(TokenKind::Void)? {
            BaseKind::Void
        } else if is_unsigned {
            // a bare 'unsigned' defaults to unsigned int
            BaseKind::U16
        } else {
            let pos = self.cur().pos;
            return Err(self.diags.error(pos, "expected type specifier"));
        };

        self.parse_pointer_suffix(&mut ty)?;
        Ok(ty)
    }

    /// `*` declarators, each optionally marked `__far`.
    pub(crate) fn parse_pointer_suffix(
        &mut self,
        ty: &mut TypeInfo,
    ) -> Result<()> {
        while self.consume(TokenKind::Star)? {
            if self.consume(TokenKind::Far)? {
                ty.far_pointer = true;
            }
            ty.pointer += 1;
        }
        Ok(())
    }

    /// One top-level declaration: struct definition, global variable, or
    /// function definition.
    fn parse_item(&mut self) -> Result<Item> {
        let is_static = self.consume(TokenKind::Static)?;

        let mut attr_flags = FnFlags::empty();
        let mut deprecation_msg = None;
        if self.is(TokenKind::Attribute) || self.is(TokenKind::AttrOpen) {
            self.parse_attributes(&mut attr_flags, &mut deprecation_msg)?;
        }

        if self.is(TokenKind::Struct) && self.next_is_struct_definition()? {
            return Ok(Item::StructDef(self.parse_struct_definition()?));
        }

        let mut ty = self.parse_type()?;
        if is_static {
            ty.storage |= StorageFlags::STATIC;
        }

        let (name, pos) = self.expect_ident()?;

        if self.is(TokenKind::LParen) {
            let function = self.parse_function_definition(
                name,
                ty,
                attr_flags,
                deprecation_msg,
            )?;
            Ok(Item::Function(function))
        } else {
            Ok(Item::Global(self.parse_variable_declaration(name, pos, ty)?))
        }
    }

    /// Distinguish `struct T { ... };` from `struct T name;` by peeking past
    /// the struct name.
    fn next_is_struct_definition(&mut self) -> Result<bool> {
        let state = self.lex.save();
        self.bump()?; // struct
        let mut is_definition = false;
        if self.is(TokenKind::Identifier) {
            self.bump()?;
            is_definition = self.is(TokenKind::LBrace);
        }
        self.lex.restore(state);
        Ok(is_definition)
    }

    fn parse_function_definition(
        &mut self,
        name: String,
        return_type: TypeInfo,
        attr_flags: FnFlags,
        mut deprecation_msg: Option<String>,
    ) -> Result<Function> {
        let mut flags = attr_flags;
        if return_type.storage.contains(StorageFlags::STACKFRAME) {
            flags |= FnFlags::STACKFRAME;
        }
        if return_type.storage.contains(StorageFlags::FAR) {
            flags |= FnFlags::FAR;
        }
        if return_type.storage.contains(StorageFlags::STATIC) {
            flags |= FnFlags::STATIC;
        }

        if self.is(TokenKind::Attribute) || self.is(TokenKind::AttrOpen) {
            self.parse_attributes(&mut flags, &mut deprecation_msg)?;
        }

        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.is(TokenKind::RParen) {
            params.push(self.parse_parameter()?);
            while self.consume(TokenKind::Comma)? {
                if self.consume(TokenKind::Ellipsis)? {
                    flags |= FnFlags::VARIADIC;
                    break; // ellipsis must close the parameter list
                }
                params.push(self.parse_parameter()?);
            }
        }
        self.expect(TokenKind::RParen)?;

        if self.is(TokenKind::Attribute) || self.is(TokenKind::AttrOpen) {
            self.parse_attributes(&mut flags, &mut deprecation_msg)?;
        }

        let body = self.parse_block_inner()?;

        self.functions.insert(
            name.clone(),
            FnRecord {
                deprecated: flags.contains(FnFlags::DEPRECATED),
                deprecation_msg: deprecation_msg.clone(),
            },
        );

        Ok(Function {
            name,
            return_type,
            flags,
            deprecation_msg,
            params,
            body,
        })
    }

    fn parse_parameter(&mut self) -> Result<Declaration> {
        let ty = self.parse_type()?;
        let (name, pos) = self.expect_ident()?;

        if ty.base == BaseKind::Void && ty.pointer == 0 {
            return Err(self.diags.error(
                pos,
                format!("parameter '{name}' has incomplete type 'void'"),
            ));
        }

        self.symbols.define(&name, ty.clone());
        Ok(Declaration {
            name,
            ty,
            init: None,
            pos,
        })
    }

    /// Variable declaration after the name: array suffix, initializer,
    /// semicolon. Registers the symbol.
    pub(crate) fn parse_variable_declaration(
        &mut self,
        name: String,
        pos: usize,
        mut ty: TypeInfo,
    ) -> Result<Declaration> {
        if ty.base == BaseKind::Void && ty.pointer == 0 {
            return Err(self.diags.error(
                pos,
                format!("variable '{name}' has incomplete type 'void'"),
            ));
        }

        if self.consume(TokenKind::LBracket)? {
            ty.array = true;
            ty.array_size = 0;
            if self.is(TokenKind::Number) {
                ty.array_size = parse_number(self.cur().text()) as u32;
                self.bump()?;
            }
            self.expect(TokenKind::RBracket)?;
        }

        let mut init = None;
        if self.consume(TokenKind::Assign)? {
            init = Some(self.parse_initializer(&ty)?);
        }

        if ty.array && ty.array_size == 0 {
            // size from the initializer list, string bytes included
            ty.array_size = match &init {
                Some(crate::ast::Initializer::List(items)) => {
                    items.len() as u32
                }
                Some(crate::ast::Initializer::Expr(
                    crate::ast::Expr::Literal(crate::ast::Literal::Str(s)),
                )) => crate::codegen::unescape_string(s).len() as u32 + 1,
                _ => 0,
            };
        }

        self.symbols.define(&name, ty.clone());
        self.expect(TokenKind::Semicolon)?;
        Ok(Declaration {
            name,
            ty,
            init,
            pos,
        })
    }

    fn parse_initializer(
        &mut self,
        ty: &TypeInfo,
    ) -> Result<crate::ast::Initializer> {
        use crate::ast::Initializer;
        let braced =
            (ty.array || ty.base == BaseKind::Struct) && self.is(TokenKind::LBrace);
        if !braced {
            return Ok(Initializer::Expr(self.parse_expression()?));
        }
        self.expect(TokenKind::LBrace)?;
        let mut items = Vec::new();
        if !self.is(TokenKind::RBrace) {
            items.push(self.parse_assignment_expression()?);
            while self.consume(TokenKind::Comma)? {
                if self.is(TokenKind::RBrace) {
                    break; // trailing comma
                }
                items.push(self.parse_assignment_expression()?);
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Initializer::List(items))
    }

    pub(crate) fn parse_block_inner(&mut self) -> Result<Block> {
        self.expect(TokenKind::LBrace)?;
        let mut block = Block::default();
        while !self.is(TokenKind::RBrace) && !self.is(TokenKind::Eof) {
            block.stmts.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(block)
    }

    fn note_deprecated_call(&mut self, name: &str, pos: usize) {
        if let Some(record) = self.functions.get(name) {
            if record.deprecated {
                let msg = match &record.deprecation_msg {
                    Some(msg) => format!(
                        "call to deprecated function '{name}': {msg}"
                    ),
                    None => format!("call to deprecated function '{name}'"),
                };
                self.diags.warning(Some(pos), msg);
            }
        }
    }
}

/// Parse a decimal or `0x` hex literal the way the scanner produced it.
pub(crate) fn parse_number(text: &str) -> i32 {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16).unwrap_or(0) as i32;
    }
    text.parse::<i64>().unwrap_or(0) as i32
}
