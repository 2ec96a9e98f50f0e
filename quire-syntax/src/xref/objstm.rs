//! Object streams.

use crate::config::DecodeSettings;
use crate::error::{Error, Result};
use crate::lexer::{Lexer, TokenKind};
use crate::object::keys::{FIRST, N};
use crate::object::{Object, Stream};
use crate::parser::{ParseError, Parser};
use crate::xref::decoded_lenient;
use bytes::Bytes;
use log::warn;

/// The decoded data of an object stream and the location of its members.
#[derive(Debug)]
pub(crate) struct ObjectStream {
    data: Bytes,
    /// The object number and the offset in `data` of each member.
    members: Vec<(u32, usize)>,
}

impl ObjectStream {
    pub(crate) fn new(stream: &Stream, settings: &DecodeSettings) -> Result<Self> {
        let dict = stream.dict();
        let count = dict
            .get_i64(N)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or(Error::Structure("object stream has no valid N entry"))?;
        let first = dict
            .get_i64(FIRST)
            .and_then(|f| usize::try_from(f).ok())
            .ok_or(Error::Structure("object stream has no valid First entry"))?;

        let data = decoded_lenient(stream, settings)?;
        let mut lexer = Lexer::new(&data[..first.min(data.len())], 0, true);
        let mut members = Vec::with_capacity(count.min(4096));

        for _ in 0..count {
            let num = lexer.next_token().ok().map(|t| t.kind);
            let offset = lexer.next_token().ok().map(|t| t.kind);

            match (num, offset) {
                (Some(TokenKind::Integer(num)), Some(TokenKind::Integer(offset))) => {
                    let (Ok(num), Ok(offset)) = (u32::try_from(num), usize::try_from(offset))
                    else {
                        warn!("object stream has an invalid member entry");

                        break;
                    };

                    members.push((num, first.saturating_add(offset)));
                }
                _ => {
                    warn!("object stream header has fewer than {count} members");

                    break;
                }
            }
        }

        Ok(Self { data, members })
    }

    /// The object numbers of the members, in order.
    pub(crate) fn members(&self) -> impl Iterator<Item = u32> + '_ {
        self.members.iter().map(|(num, _)| *num)
    }

    /// Parse the member `num`, which the cross-reference data places at
    /// `index`.
    ///
    /// If the member at `index` has a different number, the member is looked
    /// up by its number instead.
    pub(crate) fn get(&self, num: u32, index: u32, max_depth: usize) -> Result<Option<Object>> {
        let offset = match self.members.get(index as usize) {
            Some((n, offset)) if *n == num => *offset,
            _ => match self.members.iter().find(|(n, _)| *n == num) {
                Some((_, offset)) => {
                    warn!("object {num} is not at index {index} of its object stream");

                    *offset
                }
                None => return Ok(None),
            },
        };

        let Some(data) = self.data.get(offset..) else {
            return Ok(None);
        };

        let mut parser = Parser::new(Lexer::new(data, 0, true), max_depth);

        match parser.parse_object() {
            Ok(object) => Ok(Some(object)),
            Err(ParseError::Limit(limit)) => Err(Error::ResourceLimit(limit)),
            Err(ParseError::Malformed { offset, message }) => Err(Error::Syntax { offset, message }),
            Err(ParseError::Starved) => Err(Error::Syntax {
                offset: offset as u64,
                message: "object stream member is truncated",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Dict;

    fn object_stream(header: &str, body: &str) -> Stream {
        let mut dict = Dict::new();
        dict.insert(N, Object::integer(header.split_whitespace().count() as i64 / 2));
        dict.insert(FIRST, Object::integer(header.len() as i64));

        Stream::new(dict, format!("{header}{body}").into_bytes())
    }

    #[test]
    fn members_by_index() {
        let stream = object_stream("11 0 12 6 ", "(one) [2 0 R]");
        let objstm = ObjectStream::new(&stream, &DecodeSettings::default()).unwrap();

        assert_eq!(objstm.members().collect::<Vec<_>>(), vec![11, 12]);
        assert_eq!(
            objstm.get(11, 0, 64).unwrap(),
            Some(Object::string(b"one".to_vec()))
        );
        assert_eq!(
            objstm.get(12, 1, 64).unwrap(),
            Some(Object::Array(vec![Object::reference(2, 0)]))
        );
    }

    #[test]
    fn wrong_index_falls_back_to_number() {
        let stream = object_stream("11 0 12 2 ", "1 2");
        let objstm = ObjectStream::new(&stream, &DecodeSettings::default()).unwrap();

        assert_eq!(objstm.get(12, 0, 64).unwrap(), Some(Object::integer(2)));
        assert_eq!(objstm.get(13, 0, 64).unwrap(), None);
    }

    #[test]
    fn short_header() {
        let mut dict = object_stream("11 0 ", "true").dict().clone();
        dict.insert(N, Object::integer(3));
        let stream = Stream::new(dict, b"11 0 true".to_vec());
        let objstm = ObjectStream::new(&stream, &DecodeSettings::default()).unwrap();

        assert_eq!(objstm.members().count(), 1);
        assert!(
            ObjectStream::new(&Stream::new(Dict::new(), Vec::new()), &DecodeSettings::default())
                .is_err()
        );
    }
}
