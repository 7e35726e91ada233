//! Constant-expression evaluator for `#if`.
//!
//! A full C-precedence parser over host-width signed integers. Undefined
//! identifiers evaluate to 0; defined macros are parsed as integers.

use anyhow::Result;

use super::Preprocessor;
use crate::diag::Diagnostics;

pub(super) fn evaluate(
    pp: &Preprocessor,
    text: &str,
    diags: &mut Diagnostics,
) -> Result<i64> {
    let mut cursor = Cursor {
        bytes: text.as_bytes(),
        pos: 0,
        pp,
    };
    cursor.conditional(diags)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    pp: &'a Preprocessor,
}

impl Cursor<'_> {
    fn at(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn skip_ws(&mut self) {
        while self.at(0).is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: u8) -> bool {
        self.skip_ws();
        if self.at(0) == c {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Match a two-character operator.
    fn eat2(&mut self, a: u8, b: u8) -> bool {
        self.skip_ws();
        if self.at(0) == a && self.at(1) == b {
            self.pos += 2;
            true
        } else {
            false
        }
    }

    fn take_ident(&mut self) -> String {
        self.skip_ws();
        let start = self.pos;
        while self.at(0).is_ascii_alphanumeric() || self.at(0) == b'_' {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }

    fn number(&mut self) -> i64 {
        let mut value: i64 = 0;
        if self.at(0) == b'0' && (self.at(1) == b'x' || self.at(1) == b'X') {
            self.pos += 2;
            while self.at(0).is_ascii_hexdigit() {
                let c = self.at(0).to_ascii_lowercase();
                let digit = if c.is_ascii_digit() {
                    (c - b'0') as i64
                } else {
                    (c - b'a') as i64 + 10
                };
                value = value.wrapping_mul(16).wrapping_add(digit);
                self.pos += 1;
            }
        } else {
            while self.at(0).is_ascii_digit() {
                value = value
                    .wrapping_mul(10)
                    .wrapping_add((self.at(0) - b'0') as i64);
                self.pos += 1;
            }
        }
        value
    }

    fn defined_operator(&mut self, diags: &mut Diagnostics) -> Result<i64> {
        let has_paren = self.eat(b'(');
        let name = self.take_ident();
        if has_paren && !self.eat(b')') {
            diags.report_error(
                None,
                "missing closing parenthesis in defined() operator",
            )?;
        }
        Ok(self.pp.is_defined(&name) as i64)
    }

    fn sizeof_operator(&mut self, diags: &mut Diagnostics) -> Result<i64> {
        if !self.eat(b'(') {
            diags.report_error(
                None,
                "expected opening parenthesis after sizeof",
            )?;
            return Ok(0);
        }
        self.skip_ws();
        let start = self.pos;
        while self.at(0) != 0 && self.at(0) != b')' {
            self.pos += 1;
        }
        let type_name = String::from_utf8_lossy(&self.bytes[start..self.pos])
            .trim_end()
            .to_string();
        if !self.eat(b')') {
            diags.report_error(
                None,
                "missing closing parenthesis in sizeof() operator",
            )?;
        }
        Ok(match type_name.as_str() {
            "char" | "unsigned char" | "bool" => 1,
            "short" | "unsigned short" | "int" | "unsigned int"
            | "unsigned" => 2,
            "long" | "unsigned long" => 4,
            "void" => 0,
            name if name.contains('*') => 2,
            name => {
                diags.warning(
                    None,
                    format!("unknown type '{name}' in sizeof(), assuming 2 bytes"),
                );
                2
            }
        })
    }

    fn factor(&mut self, diags: &mut Diagnostics) -> Result<i64> {
        self.skip_ws();
        let c = self.at(0);
        if c == b'(' {
            self.pos += 1;
            let value = self.conditional(diags)?;
            if !self.eat(b')') {
                diags.report_error(
                    None,
                    "missing closing parenthesis in expression",
                )?;
            }
            return Ok(value);
        }
        if c.is_ascii_digit() {
            return Ok(self.number());
        }
        if self.bytes[self.pos..].starts_with(b"defined")
            && matches!(self.at(7), b'(' | b' ' | b'\t' | 0)
        {
            self.pos += 7;
            return self.defined_operator(diags);
        }
        if self.bytes[self.pos..].starts_with(b"sizeof")
            && matches!(self.at(6), b'(' | b' ' | b'\t')
        {
            self.pos += 6;
            return self.sizeof_operator(diags);
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            let name = self.take_ident();
            // defined macros parse as integers, undefined ones are 0
            return Ok(self
                .pp
                .value_of(&name)
                .map(parse_macro_int)
                .unwrap_or(0));
        }
        if c == b'!' {
            self.pos += 1;
            return Ok((self.factor(diags)? == 0) as i64);
        }
        if c == b'~' {
            self.pos += 1;
            return Ok(!self.factor(diags)?);
        }
        if c == b'-' {
            self.pos += 1;
            return Ok(self.factor(diags)?.wrapping_neg());
        }
        diags.report_error(
            None,
            format!(
                "unexpected character in preprocessor expression: {}",
                c as char
            ),
        )?;
        Ok(0)
    }

    fn term(&mut self, diags: &mut Diagnostics) -> Result<i64> {
        let mut left = self.factor(diags)?;
        loop {
            if self.eat(b'*') {
                left = left.wrapping_mul(self.factor(diags)?);
            } else if self.eat(b'/') {
                let right = self.factor(diags)?;
                if right == 0 {
                    diags.report_error(
                        None,
                        "division by zero in preprocessor expression",
                    )?;
                    return Ok(0);
                }
                left = left.wrapping_div(right);
            } else if self.eat(b'%') {
                let right = self.factor(diags)?;
                if right == 0 {
                    diags.report_error(
                        None,
                        "modulo by zero in preprocessor expression",
                    )?;
                    return Ok(0);
                }
                left = left.wrapping_rem(right);
            } else {
                return Ok(left);
            }
        }
    }

    fn additive(&mut self, diags: &mut Diagnostics) -> Result<i64> {
        let mut left = self.term(diags)?;
        loop {
            self.skip_ws();
            if self.eat(b'+') {
                left = left.wrapping_add(self.term(diags)?);
            } else if self.at(0) == b'-' {
                self.pos += 1;
                left = left.wrapping_sub(self.term(diags)?);
            } else {
                return Ok(left);
            }
        }
    }

    fn shift(&mut self, diags: &mut Diagnostics) -> Result<i64> {
        let mut left = self.additive(diags)?;
        loop {
            if self.eat2(b'<', b'<') {
                left = left.wrapping_shl(self.additive(diags)? as u32);
            } else if self.eat2(b'>', b'>') {
                left = left.wrapping_shr(self.additive(diags)? as u32);
            } else {
                return Ok(left);
            }
        }
    }

    fn relational(&mut self, diags: &mut Diagnostics) -> Result<i64> {
        let mut left = self.shift(diags)?;
        loop {
            self.skip_ws();
            if self.eat2(b'<', b'=') {
                left = (left <= self.shift(diags)?) as i64;
            } else if self.eat2(b'>', b'=') {
                left = (left >= self.shift(diags)?) as i64;
            } else if self.at(0) == b'<' && self.at(1) != b'<' {
                self.pos += 1;
                left = (left < self.shift(diags)?) as i64;
            } else if self.at(0) == b'>' && self.at(1) != b'>' {
                self.pos += 1;
                left = (left > self.shift(diags)?) as i64;
            } else {
                return Ok(left);
            }
        }
    }

    fn equality(&mut self, diags: &mut Diagnostics) -> Result<i64> {
        let mut left = self.relational(diags)?;
        loop {
            if self.eat2(b'=', b'=') {
                left = (left == self.relational(diags)?) as i64;
            } else if self.eat2(b'!', b'=') {
                left = (left != self.relational(diags)?) as i64;
            } else {
                return Ok(left);
            }
        }
    }

    fn bitand(&mut self, diags: &mut Diagnostics) -> Result<i64> {
        let mut left = self.equality(diags)?;
        loop {
            self.skip_ws();
            if self.at(0) == b'&' && self.at(1) != b'&' {
                self.pos += 1;
                left &= self.equality(diags)?;
            } else {
                return Ok(left);
            }
        }
    }

    fn bitxor(&mut self, diags: &mut Diagnostics) -> Result<i64> {
        let mut left = self.bitand(diags)?;
        loop {
            if self.eat(b'^') {
                left ^= self.bitand(diags)?;
            } else {
                return Ok(left);
            }
        }
    }

    fn bitor(&mut self, diags: &mut Diagnostics) -> Result<i64> {
        let mut left = self.bitxor(diags)?;
        loop {
            self.skip_ws();
            if self.at(0) == b'|' && self.at(1) != b'|' {
                self.pos += 1;
                left |= self.bitxor(diags)?;
            } else {
                return Ok(left);
            }
        }
    }

    fn logical_and(&mut self, diags: &mut Diagnostics) -> Result<i64> {
        let mut left = self.bitor(diags)?;
        loop {
            if self.eat2(b'&', b'&') {
                let right = self.bitor(diags)?;
                left = (left != 0 && right != 0) as i64;
            } else {
                return Ok(left);
            }
        }
    }

    fn logical_or(&mut self, diags: &mut Diagnostics) -> Result<i64> {
        let mut left = self.logical_and(diags)?;
        loop {
            if self.eat2(b'|', b'|') {
                let right = self.logical_and(diags)?;
                left = (left != 0 || right != 0) as i64;
            } else {
                return Ok(left);
            }
        }
    }

    fn conditional(&mut self, diags: &mut Diagnostics) -> Result<i64> {
        let condition = self.logical_or(diags)?;
        self.skip_ws();
        if self.eat(b'?') {
            let true_value = self.conditional(diags)?;
            if self.eat(b':') {
                let false_value = self.conditional(diags)?;
                return Ok(if condition != 0 { true_value } else { false_value });
            }
            diags.report_error(None, "missing ':' in conditional expression")?;
            return Ok(if condition != 0 { true_value } else { 0 });
        }
        Ok(condition)
    }
}

fn parse_macro_int(value: &str) -> i64 {
    let value = value.trim();
    if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    value.parse().unwrap_or_else(|_| {
        // atoi semantics: parse the leading digit run, 0 otherwise
        let digits: String = value
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '-')
            .collect();
        digits.parse().unwrap_or(0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn eval_with(pp: &Preprocessor, text: &str) -> i64 {
        let mut diags = Diagnostics::new("test.c");
        diags.set_quiet(true);
        evaluate(pp, text, &mut diags).unwrap()
    }

    fn eval(text: &str) -> i64 {
        eval_with(&Preprocessor::new(), text)
    }

    #[rstest]
    #[case("1 + 2 * 3", 7)]
    #[case("(1 + 2) * 3", 9)]
    #[case("10 / 3", 3)]
    #[case("10 % 3", 1)]
    #[case("1 << 4", 16)]
    #[case("256 >> 4", 16)]
    #[case("0x10 + 0x20", 0x30)]
    #[case("1 < 2", 1)]
    #[case("2 <= 1", 0)]
    #[case("3 == 3", 1)]
    #[case("3 != 3", 0)]
    #[case("6 & 3", 2)]
    #[case("6 | 1", 7)]
    #[case("6 ^ 3", 5)]
    #[case("1 && 0", 0)]
    #[case("1 || 0", 1)]
    #[case("!5", 0)]
    #[case("!0", 1)]
    #[case("~0", -1)]
    #[case("-3 + 5", 2)]
    #[case("1 ? 10 : 20", 10)]
    #[case("0 ? 10 : 20", 20)]
    #[case("sizeof(char)", 1)]
    #[case("sizeof(int)", 2)]
    #[case("sizeof(long)", 4)]
    #[case("sizeof(char*)", 2)]
    #[case("sizeof(void)", 0)]
    fn constant_expressions(#[case] text: &str, #[case] expected: i64) {
        assert_eq!(eval(text), expected, "{text}");
    }

    #[test]
    fn division_by_zero_reports_and_yields_zero() {
        let pp = Preprocessor::new();
        let mut diags = Diagnostics::new("test.c");
        diags.set_quiet(true);
        let value = evaluate(&pp, "1 / 0", &mut diags).unwrap();
        assert_eq!(value, 0);
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn undefined_identifiers_are_zero() {
        assert_eq!(eval("NOT_DEFINED"), 0);
        assert_eq!(eval("NOT_DEFINED + 1"), 1);
    }

    #[test]
    fn defined_operator_both_forms() {
        let mut pp = Preprocessor::new();
        pp.define("FOO", "1");
        assert_eq!(eval_with(&pp, "defined(FOO)"), 1);
        assert_eq!(eval_with(&pp, "defined FOO"), 1);
        assert_eq!(eval_with(&pp, "defined(BAR)"), 0);
        pp.undef("FOO");
        assert_eq!(eval_with(&pp, "defined(FOO)"), 0);
    }

    #[test]
    fn macros_parse_as_integers() {
        let mut pp = Preprocessor::new();
        pp.define("A", "3");
        pp.define("HEX", "0x10");
        assert_eq!(eval_with(&pp, "A * 2 == 6"), 1);
        assert_eq!(eval_with(&pp, "HEX"), 16);
    }
}
