//! Assembling tokens into objects.

use crate::error::Limit;
use crate::lexer::{LexError, Lexer, Token, TokenKind};
use crate::object::{Dict, Object, ObjectIdentifier};
use log::warn;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ParseError {
    /// The window ended before the object did.
    Starved,
    Malformed {
        offset: u64,
        message: &'static str,
    },
    Limit(Limit),
}

/// The body of an indirect object.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Body {
    Object(Object),
    /// A stream dictionary. The data is not read by the parser, since its
    /// extent depends on the `Length` entry, which may be an indirect object.
    Stream(StreamHeader),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StreamHeader {
    pub(crate) dict: Dict,
    /// The absolute offset of the first data byte.
    pub(crate) data_offset: u64,
}

const TERMINATORS: &[&[u8]] = &[
    b"endobj",
    b"obj",
    b"stream",
    b"endstream",
    b"xref",
    b"trailer",
    b"startxref",
];

pub(crate) struct Parser<'a> {
    lexer: Lexer<'a>,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(lexer: Lexer<'a>, max_depth: usize) -> Self {
        Self { lexer, max_depth }
    }

    pub(crate) fn lexer(&mut self) -> &mut Lexer<'a> {
        &mut self.lexer
    }

    fn lex(&self, err: LexError) -> ParseError {
        match err {
            LexError::Starved => ParseError::Starved,
            LexError::End => ParseError::Malformed {
                offset: self.lexer.absolute_position(),
                message: "unexpected end of data",
            },
        }
    }

    pub(crate) fn next_token(&mut self) -> Result<Token<'a>, ParseError> {
        self.lexer.next_token().map_err(|e| self.lex(e))
    }

    pub(crate) fn peek_token(&self) -> Result<Token<'a>, ParseError> {
        self.lexer.peek().map_err(|e| self.lex(e))
    }

    /// Parse a direct object.
    pub(crate) fn parse_object(&mut self) -> Result<Object, ParseError> {
        self.object(0)
    }

    /// Parse an `N G obj` header followed by an object body.
    pub(crate) fn parse_indirect(&mut self) -> Result<(ObjectIdentifier, Body), ParseError> {
        let id = self.parse_header()?;
        let body = self.parse_body()?;

        Ok((id, body))
    }

    pub(crate) fn parse_header(&mut self) -> Result<ObjectIdentifier, ParseError> {
        let start = self.lexer.absolute_position();
        let malformed = ParseError::Malformed {
            offset: start,
            message: "expected object header",
        };

        let num = match self.next_token()?.kind {
            TokenKind::Integer(n) => u32::try_from(n).map_err(|_| malformed.clone())?,
            _ => return Err(malformed),
        };
        let generation = match self.next_token()?.kind {
            TokenKind::Integer(g) => u16::try_from(g).map_err(|_| malformed.clone())?,
            _ => return Err(malformed),
        };

        if !self.next_token()?.is_keyword(b"obj") {
            return Err(malformed);
        }

        Ok(ObjectIdentifier::new(num, generation))
    }

    /// Parse an object that may be a stream dictionary.
    pub(crate) fn parse_body(&mut self) -> Result<Body, ParseError> {
        let object = self.object(0)?;

        let Object::Dict(dict) = object else {
            return Ok(Body::Object(object));
        };

        match self.lexer.peek() {
            Ok(token) if token.is_keyword(b"stream") => {
                self.next_token()?;
                self.lexer.skip_stream_eol().map_err(|e| self.lex(e))?;

                Ok(Body::Stream(StreamHeader {
                    dict,
                    data_offset: self.lexer.absolute_position(),
                }))
            }
            Err(LexError::Starved) => Err(ParseError::Starved),
            _ => Ok(Body::Object(Object::Dict(dict))),
        }
    }

    fn object(&mut self, depth: usize) -> Result<Object, ParseError> {
        let restore = self.lexer.position();
        let token = self.next_token()?;

        match token.kind {
            TokenKind::Integer(n) => self.number_or_reference(n),
            TokenKind::Real(r) => Ok(Object::real(r)),
            TokenKind::Name(n) => Ok(Object::Name(n)),
            TokenKind::String(s) => Ok(Object::String(s)),
            TokenKind::ArrayStart => self.array(depth + 1),
            TokenKind::DictStart => self.dict(depth + 1).map(Object::Dict),
            TokenKind::Keyword(b"true") => Ok(Object::Boolean(true)),
            TokenKind::Keyword(b"false") => Ok(Object::Boolean(false)),
            TokenKind::Keyword(b"null") => Ok(Object::Null),
            TokenKind::Keyword(k) if TERMINATORS.contains(&k) => {
                // The value is missing. Leave the keyword for the caller.
                self.lexer.jump(restore);

                Ok(Object::Null)
            }
            TokenKind::Keyword(k) => {
                warn!(
                    "unexpected token {} at offset {}",
                    String::from_utf8_lossy(k),
                    token.offset
                );

                Ok(Object::Null)
            }
            TokenKind::ArrayEnd | TokenKind::DictEnd => Err(ParseError::Malformed {
                offset: token.offset,
                message: "unexpected closing delimiter",
            }),
        }
    }

    fn number_or_reference(&mut self, num: i64) -> Result<Object, ParseError> {
        let restore = self.lexer.position();

        match self.reference_tail() {
            Ok(Some(generation)) => {
                if let (Ok(num), Ok(generation)) =
                    (u32::try_from(num), u16::try_from(generation))
                {
                    return Ok(Object::reference(num, generation));
                }

                warn!("invalid reference {num} {generation} R");

                Ok(Object::Null)
            }
            Ok(None) | Err(LexError::End) => {
                self.lexer.jump(restore);

                Ok(Object::integer(num))
            }
            Err(LexError::Starved) => Err(ParseError::Starved),
        }
    }

    // The `G R` after the object number of a reference.
    fn reference_tail(&mut self) -> Result<Option<i64>, LexError> {
        let TokenKind::Integer(generation) = self.lexer.next_token()?.kind else {
            return Ok(None);
        };

        Ok(self.lexer.next_token()?.is_keyword(b"R").then_some(generation))
    }

    fn array(&mut self, depth: usize) -> Result<Object, ParseError> {
        if depth > self.max_depth {
            return Err(ParseError::Limit(Limit::NestingDepth));
        }

        let mut items = Vec::new();

        loop {
            let token = match self.lexer.peek() {
                Ok(token) => token,
                Err(LexError::End) => {
                    warn!("unterminated array");
                    break;
                }
                Err(LexError::Starved) => return Err(ParseError::Starved),
            };

            match token.kind {
                TokenKind::ArrayEnd => {
                    self.next_token()?;
                    break;
                }
                TokenKind::DictEnd => {
                    warn!("array closed by >> at offset {}", token.offset);
                    break;
                }
                TokenKind::Keyword(k) if TERMINATORS.contains(&k) => {
                    warn!("unterminated array at offset {}", token.offset);
                    break;
                }
                _ => items.push(self.object(depth)?),
            }
        }

        Ok(Object::Array(items))
    }

    fn dict(&mut self, depth: usize) -> Result<Dict, ParseError> {
        if depth > self.max_depth {
            return Err(ParseError::Limit(Limit::NestingDepth));
        }

        let mut dict = Dict::new();

        loop {
            let restore = self.lexer.position();
            let token = match self.next_token() {
                Ok(token) => token,
                Err(ParseError::Malformed { .. }) => {
                    warn!("unterminated dictionary");
                    break;
                }
                Err(e) => return Err(e),
            };

            let key = match token.kind {
                TokenKind::DictEnd => break,
                TokenKind::Name(key) => key,
                TokenKind::Keyword(k) if TERMINATORS.contains(&k) => {
                    warn!("unterminated dictionary at offset {}", token.offset);
                    self.lexer.jump(restore);
                    break;
                }
                _ => {
                    warn!("skipping invalid dictionary key at offset {}", token.offset);
                    continue;
                }
            };

            match self.peek_token() {
                Ok(next) if matches!(next.kind, TokenKind::DictEnd) => {
                    warn!("dictionary key without value at offset {}", token.offset);
                }
                Ok(next) if matches!(next.kind, TokenKind::ArrayEnd) => {
                    warn!("skipping stray ] at offset {}", next.offset);
                    self.next_token()?;
                }
                Ok(_) => {
                    let value = self.object(depth)?;
                    dict.insert(key, value);
                }
                Err(ParseError::Malformed { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(dict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Name, keys};

    fn parse(data: &[u8]) -> Object {
        Parser::new(Lexer::new(data, 0, true), 64)
            .parse_object()
            .unwrap()
    }

    #[test]
    fn references_need_lookahead() {
        let Object::Array(items) = parse(b"[1 0 R 2 3 4 0 R 5]") else {
            panic!("expected array");
        };

        assert_eq!(
            items,
            vec![
                Object::reference(1, 0),
                Object::integer(2),
                Object::integer(3),
                Object::reference(4, 0),
                Object::integer(5),
            ]
        );
        assert_eq!(parse(b"12 0"), Object::integer(12));
    }

    #[test]
    fn nested_dict() {
        let Object::Dict(dict) = parse(b"<</Type/Page/Kids[1 0 R]/Sub<</A 1.5/B(x)>>/N null>>")
        else {
            panic!("expected dict");
        };

        assert!(dict.has_type(keys::PAGE));
        assert_eq!(dict.get_array(keys::KIDS).map(|k| k.len()), Some(1));
        let sub = dict.get_dict(b"Sub").unwrap();
        assert_eq!(sub.get_f64(b"A"), Some(1.5));
        assert_eq!(sub.get_string(b"B").unwrap().as_bytes(), b"x");
        assert_eq!(dict.get(b"N"), Some(&Object::Null));
    }

    #[test]
    fn missing_values_and_bad_keys() {
        let Object::Dict(dict) = parse(b"<</A 1 2 /B /C>>") else {
            panic!("expected dict");
        };

        assert_eq!(dict.get_i64(b"A"), Some(1));
        assert_eq!(dict.get_name(b"B"), Some(&Name::new(b"C")));
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn stray_bracket_in_dict() {
        let Object::Dict(dict) = parse(b"<</A ] /B 2 /C [1] ] >>") else {
            panic!("expected dict");
        };

        assert_eq!(dict.get(b"A"), None);
        assert_eq!(dict.get_i64(b"B"), Some(2));
        assert_eq!(dict.get_array(b"C").map(<[Object]>::len), Some(1));
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn unterminated_array_stops_at_endobj() {
        let mut parser = Parser::new(Lexer::new(b"1 0 obj [1 2 endobj", 0, true), 64);
        let (id, body) = parser.parse_indirect().unwrap();
        assert_eq!(id, ObjectIdentifier::new(1, 0));
        assert_eq!(
            body,
            Body::Object(Object::Array(vec![Object::integer(1), Object::integer(2)]))
        );
        assert!(parser.next_token().unwrap().is_keyword(b"endobj"));
    }

    #[test]
    fn stream_header() {
        let data = b"4 0 obj <</Length 3>> stream\r\nabc\nendstream";
        let mut parser = Parser::new(Lexer::new(data, 1000, true), 64);
        let (_, body) = parser.parse_indirect().unwrap();

        let Body::Stream(header) = body else {
            panic!("expected stream");
        };
        assert_eq!(header.dict.get_i64(keys::LENGTH), Some(3));
        assert_eq!(header.data_offset, 1000 + 30);
    }

    #[test]
    fn nesting_limit() {
        let data = [b'['; 65];
        let mut parser = Parser::new(Lexer::new(&data, 0, true), 64);
        assert_eq!(
            parser.parse_object(),
            Err(ParseError::Limit(Limit::NestingDepth))
        );

        let data = [b'['; 64];
        let mut parser = Parser::new(Lexer::new(&data, 0, true), 64);
        assert!(parser.parse_object().is_ok());
    }

    #[test]
    fn truncated_window_starves() {
        for data in [&b"<</A [1 2"[..], b"1 0 obj <</A 1>>", b"[3 0"] {
            let mut parser = Parser::new(Lexer::new(data, 0, false), 64);
            let result = if data.starts_with(b"1 0 obj") {
                parser.parse_indirect().map(|_| ())
            } else {
                parser.parse_object().map(|_| ())
            };
            assert_eq!(result, Err(ParseError::Starved), "{data:?}");
        }
    }

    #[test]
    fn bad_header() {
        let mut parser = Parser::new(Lexer::new(b"1 x obj 5", 0, true), 64);
        assert!(matches!(
            parser.parse_indirect(),
            Err(ParseError::Malformed { .. })
        ));
    }
}
