//! Classic cross-reference tables.

use crate::error::{Error, Result};
use crate::lexer::{Token, TokenKind};
use crate::object::Object;
use crate::parser::{ParseError, Parser};
use crate::reader::SourceReader;
use crate::xref::{Section, XRefEntry};
use log::warn;

pub(super) fn read(reader: &SourceReader<'_>, offset: u64) -> Result<Section> {
    reader
        .parse_at(offset, parse_table)?
        .ok_or(Error::Structure("cross-reference table is past the end of the file"))
}

fn malformed(offset: u64, message: &'static str) -> ParseError {
    ParseError::Malformed { offset, message }
}

fn integer(token: &Token<'_>) -> Option<i64> {
    match token.kind {
        TokenKind::Integer(i) => Some(i),
        _ => None,
    }
}

fn parse_table(p: &mut Parser<'_>) -> std::result::Result<Section, ParseError> {
    let keyword = p.next_token()?;

    if !keyword.is_keyword(b"xref") {
        return Err(malformed(keyword.offset, "expected xref keyword"));
    }

    let mut entries = Vec::new();

    loop {
        let token = p.next_token()?;

        if token.is_keyword(b"trailer") {
            break;
        }

        let header = integer(&token).zip(integer(&p.next_token()?));
        let Some((Ok(first), Ok(count))) =
            header.map(|(first, count)| (u32::try_from(first), u32::try_from(count)))
        else {
            return Err(malformed(token.offset, "invalid subsection header"));
        };

        read_subsection(p, first, count, &mut entries)?;
    }

    let offset = p.lexer().absolute_position();

    match p.parse_object()? {
        Object::Dict(trailer) => Ok(Section { entries, trailer }),
        _ => Err(malformed(offset, "trailer is not a dictionary")),
    }
}

fn read_subsection(
    p: &mut Parser<'_>,
    first: u32,
    count: u32,
    entries: &mut Vec<(u32, XRefEntry)>,
) -> std::result::Result<(), ParseError> {
    let start = entries.len();
    let mut starts_free_list = false;

    for i in 0..count {
        // Some writers declare more entries than they write.
        if integer(&p.peek_token()?).is_none() {
            warn!("cross-reference subsection at {first} is shorter than declared");

            break;
        }

        let token = p.next_token()?;
        let offset = integer(&token).and_then(|o| u64::try_from(o).ok());
        let generation = integer(&p.next_token()?).and_then(|g| u16::try_from(g).ok());
        let kind = p.next_token()?;

        let (Some(offset), Some(generation)) = (offset, generation) else {
            return Err(malformed(token.offset, "invalid cross-reference entry"));
        };

        let entry = if kind.is_keyword(b"n") {
            XRefEntry::InFile { offset, generation }
        } else if kind.is_keyword(b"f") {
            starts_free_list |= i == 0 && generation == u16::MAX;

            XRefEntry::Free
        } else {
            return Err(malformed(kind.offset, "invalid cross-reference entry type"));
        };

        entries.push((first.saturating_add(i), entry));
    }

    // A table that starts at 1 but whose first entry is the head of the free
    // list is off by one.
    if first == 1 && starts_free_list {
        warn!("cross-reference table starts at 1 instead of 0");

        for (num, _) in &mut entries[start..] {
            *num -= 1;
        }
    }

    Ok(())
}
