use anyhow::Result;

use super::Parser;
use crate::ast::FnFlags;
use crate::lexer::TokenKind;

impl Parser<'_> {
    /// Parse one or more attribute groups, legacy `__attribute__((...))` or
    /// C23 `[[...]]` style, merging the recognized names into `flags`.
    pub(crate) fn parse_attributes(
        &mut self,
        flags: &mut FnFlags,
        deprecation_msg: &mut Option<String>,
    ) -> Result<()> {
        loop {
            if self.consume(TokenKind::Attribute)? {
                self.expect(TokenKind::LParen)?;
                self.expect(TokenKind::LParen)?;
                self.parse_attribute_list(
                    flags,
                    deprecation_msg,
                    TokenKind::RParen,
                )?;
                self.expect(TokenKind::RParen)?;
                self.expect(TokenKind::RParen)?;
            } else if self.consume(TokenKind::AttrOpen)? {
                self.parse_attribute_list(
                    flags,
                    deprecation_msg,
                    TokenKind::AttrClose,
                )?;
                self.expect(TokenKind::AttrClose)?;
            } else {
                return Ok(());
            }
        }
    }

    fn parse_attribute_list(
        &mut self,
        flags: &mut FnFlags,
        deprecation_msg: &mut Option<String>,
        close: TokenKind,
    ) -> Result<()> {
        while !self.is(close) && !self.is(TokenKind::Eof) {
            match self.kind() {
                TokenKind::Naked => {
                    self.bump()?;
                    *flags |= FnFlags::NAKED;
                }
                TokenKind::Deprecated => {
                    self.bump()?;
                    *flags |= FnFlags::DEPRECATED;
                    if self.consume(TokenKind::LParen)? {
                        if self.is(TokenKind::Str) {
                            *deprecation_msg =
                                Some(self.cur().text().to_string());
                            self.bump()?;
                        }
                        self.expect(TokenKind::RParen)?;
                    }
                }
                TokenKind::Stackframe => {
                    self.bump()?;
                    *flags |= FnFlags::STACKFRAME;
                }
                TokenKind::Far | TokenKind::Farcalled => {
                    self.bump()?;
                    *flags |= FnFlags::FAR;
                }
                TokenKind::Identifier => {
                    match self.cur().text() {
                        "stackframe" => *flags |= FnFlags::STACKFRAME,
                        "far" | "farcalled" => *flags |= FnFlags::FAR,
                        _ => {} // unknown attributes are skipped
                    }
                    self.bump()?;
                }
                _ => break,
            }
            if !self.consume(TokenKind::Comma)? {
                break;
            }
        }
        Ok(())
    }
}
