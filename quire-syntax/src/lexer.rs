//! Splitting data into tokens.

use crate::object::{Name, PdfString};
use crate::trivia::{is_eol_character, is_regular_character, is_white_space_character};
use quire_common::byte::Reader;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind<'a> {
    Integer(i64),
    Real(f64),
    Name(Name),
    String(PdfString),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    /// Any other run of regular characters, like `obj`, `R` or `true`, and
    /// stray delimiters.
    Keyword(&'a [u8]),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token<'a> {
    pub(crate) kind: TokenKind<'a>,
    /// The absolute offset of the first byte of the token.
    pub(crate) offset: u64,
}

impl Token<'_> {
    pub(crate) fn is_keyword(&self, keyword: &[u8]) -> bool {
        matches!(self.kind, TokenKind::Keyword(k) if k == keyword)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum LexError {
    /// The data ended, but it is only a window into a larger file.
    Starved,
    /// The data ended and there is nothing after it.
    End,
}

/// A tokenizer over a window of a file.
///
/// If `complete` is false, the window may end in the middle of a token.
/// Every token that touches the end of the window then yields
/// [`LexError::Starved`] instead of a possibly truncated value.
#[derive(Debug, Clone)]
pub(crate) struct Lexer<'a> {
    reader: Reader<'a>,
    base: u64,
    complete: bool,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(data: &'a [u8], base: u64, complete: bool) -> Self {
        Self {
            reader: Reader::new(data),
            base,
            complete,
        }
    }

    pub(crate) fn data(&self) -> &'a [u8] {
        self.reader.data
    }

    pub(crate) fn position(&self) -> usize {
        self.reader.offset()
    }

    pub(crate) fn absolute_position(&self) -> u64 {
        self.base + self.reader.offset() as u64
    }

    pub(crate) fn jump(&mut self, position: usize) {
        self.reader.jump(position);
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.complete
    }

    /// The error for running out of data.
    pub(crate) fn end_error(&self) -> LexError {
        if self.complete {
            LexError::End
        } else {
            LexError::Starved
        }
    }

    pub(crate) fn skip_trivia(&mut self) {
        while let Some(b) = self.reader.peek_byte() {
            if is_white_space_character(b) {
                self.reader.forward();
            } else if b == b'%' {
                self.reader.forward_while(|b| !is_eol_character(b));
            } else {
                return;
            }
        }
    }

    /// Consume the end-of-line marker after the `stream` keyword.
    pub(crate) fn skip_stream_eol(&mut self) -> Result<(), LexError> {
        // Some writers put spaces before the EOL.
        self.reader.forward_while(|b| b == b' ');

        match self.reader.peek_byte() {
            Some(b'\r') => {
                self.reader.forward();

                match self.reader.peek_byte() {
                    Some(b'\n') => self.reader.forward(),
                    None if !self.complete => return Err(LexError::Starved),
                    _ => {}
                }
            }
            Some(b'\n') => self.reader.forward(),
            None if !self.complete => return Err(LexError::Starved),
            _ => {}
        }

        Ok(())
    }

    pub(crate) fn peek(&self) -> Result<Token<'a>, LexError> {
        self.clone().next_token()
    }

    pub(crate) fn next_token(&mut self) -> Result<Token<'a>, LexError> {
        self.skip_trivia();

        let start = self.reader.offset();
        let offset = self.base + start as u64;
        let first = self.reader.peek_byte().ok_or_else(|| self.end_error())?;

        let kind = match first {
            b'[' => {
                self.reader.forward();
                TokenKind::ArrayStart
            }
            b']' => {
                self.reader.forward();
                TokenKind::ArrayEnd
            }
            b'<' => {
                self.reader.forward();

                match self.reader.peek_byte() {
                    Some(b'<') => {
                        self.reader.forward();
                        TokenKind::DictStart
                    }
                    None if !self.complete => return Err(LexError::Starved),
                    _ => TokenKind::String(self.hex_string()?),
                }
            }
            b'>' => {
                self.reader.forward();

                match self.reader.peek_byte() {
                    Some(b'>') => {
                        self.reader.forward();
                        TokenKind::DictEnd
                    }
                    None if !self.complete => return Err(LexError::Starved),
                    _ => TokenKind::Keyword(b">"),
                }
            }
            b'(' => {
                self.reader.forward();
                TokenKind::String(self.literal_string()?)
            }
            b'/' => {
                self.reader.forward();
                let raw = self.regular_run()?;
                TokenKind::Name(Name::from_escaped(raw))
            }
            b')' | b'{' | b'}' => {
                self.reader.forward();
                TokenKind::Keyword(&self.reader.data[start..start + 1])
            }
            _ => {
                let run = self.regular_run()?;

                if run.is_empty() {
                    // Unreachable for well-formed input: every byte is
                    // whitespace, a delimiter or regular.
                    self.reader.forward();
                    TokenKind::Keyword(&self.reader.data[start..start + 1])
                } else if matches!(run[0], b'0'..=b'9' | b'+' | b'-' | b'.') {
                    parse_number(run)
                } else {
                    TokenKind::Keyword(run)
                }
            }
        };

        Ok(Token { kind, offset })
    }

    fn regular_run(&mut self) -> Result<&'a [u8], LexError> {
        let start = self.reader.offset();
        self.reader.forward_while(is_regular_character);

        if self.reader.at_end() && !self.complete {
            return Err(LexError::Starved);
        }

        Ok(&self.reader.data[start..self.reader.offset()])
    }

    fn hex_string(&mut self) -> Result<PdfString, LexError> {
        let mut bytes = Vec::new();
        let mut high: Option<u8> = None;

        loop {
            let Some(b) = self.reader.read_byte() else {
                if !self.complete {
                    return Err(LexError::Starved);
                }

                break;
            };

            if b == b'>' {
                break;
            }

            let Some(value) = crate::object::hex_value(b) else {
                // Whitespace and garbage are ignored.
                continue;
            };

            match high.take() {
                Some(h) => bytes.push(h << 4 | value),
                None => high = Some(value),
            }
        }

        if let Some(h) = high {
            bytes.push(h << 4);
        }

        Ok(PdfString::hex(bytes))
    }

    fn literal_string(&mut self) -> Result<PdfString, LexError> {
        let mut bytes = Vec::new();
        let mut depth = 1_usize;

        loop {
            let Some(b) = self.reader.read_byte() else {
                if !self.complete {
                    return Err(LexError::Starved);
                }

                break;
            };

            match b {
                b'(' => {
                    depth += 1;
                    bytes.push(b);
                }
                b')' => {
                    depth -= 1;

                    if depth == 0 {
                        break;
                    }

                    bytes.push(b);
                }
                b'\\' => self.escape(&mut bytes)?,
                b'\r' => {
                    self.reader.eat(|b| b == b'\n');
                    bytes.push(b'\n');
                }
                _ => bytes.push(b),
            }
        }

        Ok(PdfString::new(bytes))
    }

    fn escape(&mut self, bytes: &mut Vec<u8>) -> Result<(), LexError> {
        let Some(b) = self.reader.read_byte() else {
            return if self.complete {
                Ok(())
            } else {
                Err(LexError::Starved)
            };
        };

        match b {
            b'n' => bytes.push(b'\n'),
            b'r' => bytes.push(b'\r'),
            b't' => bytes.push(b'\t'),
            b'b' => bytes.push(0x08),
            b'f' => bytes.push(0x0c),
            b'0'..=b'7' => {
                let mut value = u32::from(b - b'0');

                for _ in 0..2 {
                    match self.reader.eat(|b| (b'0'..=b'7').contains(&b)) {
                        Some(d) => value = value * 8 + u32::from(d - b'0'),
                        None => break,
                    }
                }

                // High-order overflow is ignored.
                bytes.push(value as u8);
            }
            // A backslash at the end of a line continues the string.
            b'\r' => {
                self.reader.eat(|b| b == b'\n');
            }
            b'\n' => {}
            // Unknown escapes, and `\(`, `\)` and `\\`, stand for the
            // character itself.
            other => bytes.push(other),
        }

        Ok(())
    }
}

/// Parse a number, tolerating garbage.
///
/// Everything after the longest prefix of the form `[sign]digits[.digits]`
/// is ignored, so `1.5e3` is read as `1.5` and `12abc` as `12`. Additional
/// leading signs are skipped.
fn parse_number(run: &[u8]) -> TokenKind<'_> {
    let mut i = 0;
    let negative = run[0] == b'-';

    while i < run.len() && matches!(run[i], b'+' | b'-') {
        i += 1;
    }

    let int_start = i;

    while i < run.len() && run[i].is_ascii_digit() {
        i += 1;
    }

    let int_digits = &run[int_start..i];

    if i < run.len() && run[i] == b'.' {
        i += 1;
        let frac_start = i;

        while i < run.len() && run[i].is_ascii_digit() {
            i += 1;
        }

        return TokenKind::Real(real_from_parts(negative, int_digits, &run[frac_start..i]));
    }

    let mut value: i64 = 0;

    for &d in int_digits {
        match value
            .checked_mul(10)
            .and_then(|v| v.checked_add(i64::from(d - b'0')))
        {
            Some(v) => value = v,
            None => return TokenKind::Real(real_from_parts(negative, int_digits, &[])),
        }
    }

    TokenKind::Integer(if negative { -value } else { value })
}

fn real_from_parts(negative: bool, int_digits: &[u8], frac_digits: &[u8]) -> f64 {
    let mut text = String::with_capacity(int_digits.len() + frac_digits.len() + 3);

    if negative {
        text.push('-');
    }

    text.push('0');
    text.extend(int_digits.iter().map(|d| *d as char));
    text.push('.');

    if frac_digits.is_empty() {
        text.push('0');
    } else {
        text.extend(frac_digits.iter().map(|d| *d as char));
    }

    // The text only consists of digits, so this cannot fail.
    text.parse().unwrap_or(0.0)
}
