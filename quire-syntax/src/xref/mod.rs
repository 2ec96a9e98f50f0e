//! Locating and reading the cross-reference sections of a file.

use crate::config::DecodeSettings;
use crate::error::{Error, FilterErrorKind, Limit, Result};
use crate::lexer::TokenKind;
use crate::object::keys::{PREV, XREF_STM};
use crate::object::{Dict, ObjectIdentifier, Stream};
use crate::reader::SourceReader;
use bytes::Bytes;
use log::{debug, warn};
use memchr::memmem;
use rustc_hash::{FxHashMap, FxHashSet};

pub(crate) mod objstm;
pub(crate) mod recovery;
mod stream;
mod table;

/// Where an object is stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum XRefEntry {
    Free,
    InFile { offset: u64, generation: u16 },
    /// The object is the `index`-th member of the object stream `stream`.
    Compressed { stream: u32, index: u32 },
}

impl XRefEntry {
    pub(crate) fn generation(&self) -> Option<u16> {
        match self {
            Self::Free => None,
            Self::InFile { generation, .. } => Some(*generation),
            Self::Compressed { .. } => Some(0),
        }
    }
}

/// The object number to location index.
#[derive(Debug, Clone, Default)]
pub(crate) struct XRefTable {
    entries: FxHashMap<u32, XRefEntry>,
}

impl XRefTable {
    pub(crate) fn get(&self, num: u32) -> Option<XRefEntry> {
        self.entries.get(&num).copied()
    }

    /// Add an entry unless the object already has one. Sections are read
    /// from newest to oldest, so the first entry seen is the current one.
    pub(crate) fn insert_if_absent(&mut self, num: u32, entry: XRefEntry) {
        self.entries.entry(num).or_insert(entry);
    }

    /// Add an entry if the object has none or a free one.
    pub(crate) fn fill(&mut self, num: u32, entry: XRefEntry) {
        match self.entries.get(&num) {
            None | Some(XRefEntry::Free) => {
                self.entries.insert(num, entry);
            }
            Some(_) => {}
        }
    }

    pub(crate) fn set(&mut self, num: u32, entry: XRefEntry) {
        self.entries.insert(num, entry);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (u32, XRefEntry)> + '_ {
        self.entries.iter().map(|(num, entry)| (*num, *entry))
    }

    /// The identifiers of all objects that are not free, sorted by number.
    pub(crate) fn live_ids(&self) -> Vec<ObjectIdentifier> {
        let mut ids: Vec<_> = self
            .entries
            .iter()
            .filter_map(|(num, entry)| {
                entry
                    .generation()
                    .map(|generation| ObjectIdentifier::new(*num, generation))
            })
            .filter(|id| id.num != 0)
            .collect();
        ids.sort();
        ids
    }

    pub(crate) fn max_num(&self) -> u32 {
        self.entries.keys().copied().max().unwrap_or(0)
    }
}

/// One cross-reference section together with its trailer.
pub(crate) struct Section {
    pub(crate) entries: Vec<(u32, XRefEntry)>,
    pub(crate) trailer: Dict,
}

impl Section {
    fn offset_of(&self, key: &[u8]) -> Option<u64> {
        self.trailer
            .get_i64(key)
            .and_then(|offset| u64::try_from(offset).ok())
    }
}

/// The merged cross-reference data of all sections.
pub(crate) struct XRef {
    pub(crate) table: XRefTable,
    pub(crate) trailer: Dict,
}

/// Whether an error must reach the caller instead of triggering recovery.
pub(crate) fn is_fatal(err: &Error) -> bool {
    matches!(
        err,
        Error::NeedMoreData { .. } | Error::Cancelled | Error::ResourceLimit(_)
    )
}

/// The decoded data of a structural stream.
///
/// Truncated compressed data is common in damaged files, so the decoded
/// prefix of a corrupt stream is used as is.
pub(crate) fn decoded_lenient(stream: &Stream, settings: &DecodeSettings) -> Result<Bytes> {
    match stream.decoded(settings) {
        Ok(data) => Ok(data),
        Err(e) => match e.kind {
            FilterErrorKind::Corrupt => {
                warn!("using {} bytes of a corrupt structural stream", e.prefix_len());

                Ok(e.prefix)
            }
            FilterErrorKind::Cancelled => Err(Error::Cancelled),
            FilterErrorKind::SizeLimit => Err(Error::ResourceLimit(Limit::DecodedSize)),
            FilterErrorKind::Unsupported => Err(Error::Filter(e)),
        },
    }
}

/// Read the cross-reference chain, starting at the last `startxref`.
pub(crate) fn load(reader: &SourceReader<'_>) -> Result<XRef> {
    let start = find_startxref(reader)?;
    let max_sections = reader.settings().max_xref_sections;

    let mut table = XRefTable::default();
    let mut trailers: Vec<Dict> = Vec::new();
    let mut visited = FxHashSet::default();
    let mut sections = 0;
    let mut next = Some(start);

    while let Some(offset) = next.take() {
        if !visited.insert(offset) {
            warn!("cross-reference chain loops back to offset {offset}");

            break;
        }

        sections += 1;

        if sections > max_sections {
            return Err(Error::ResourceLimit(Limit::XRefSections));
        }

        let section = match read_section(reader, offset) {
            Ok(section) => section,
            Err(e) if is_fatal(&e) || trailers.is_empty() => return Err(e),
            Err(e) => {
                warn!("ignoring broken cross-reference section at offset {offset}: {e}");

                break;
            }
        };

        debug!(
            "read cross-reference section at offset {offset} with {} entries",
            section.entries.len()
        );

        for (num, entry) in &section.entries {
            table.insert_if_absent(*num, *entry);
        }

        // In hybrid files, the stream complements the table it belongs to and
        // takes precedence over older sections.
        if let Some(stm_offset) = section.offset_of(XREF_STM)
            && visited.insert(stm_offset)
        {
            match stream::read(reader, stm_offset) {
                Ok(hybrid) => {
                    for (num, entry) in hybrid.entries {
                        table.fill(num, entry);
                    }
                }
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => warn!("ignoring broken XRefStm at offset {stm_offset}: {e}"),
            }
        }

        next = section.offset_of(PREV);
        trailers.push(section.trailer);
    }

    Ok(XRef {
        table,
        trailer: merge_trailers(trailers),
    })
}

/// Take the newest trailer and fill in keys that only older ones have.
fn merge_trailers(trailers: Vec<Dict>) -> Dict {
    let mut trailers = trailers.into_iter();
    let mut merged = trailers.next().unwrap_or_default();

    for older in trailers {
        for (key, value) in older.iter() {
            if !merged.contains_key(key.as_bytes()) {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    merged.remove(PREV);
    merged.remove(XREF_STM);
    merged
}

fn read_section(reader: &SourceReader<'_>, offset: u64) -> Result<Section> {
    let starts_with_table = reader
        .parse_at(offset, |p| Ok(p.peek_token()?.is_keyword(b"xref")))?
        .ok_or(Error::Structure("cross-reference offset is past the end of the file"))?;

    if starts_with_table {
        table::read(reader, offset)
    } else {
        stream::read(reader, offset)
    }
}

/// Find the offset after the last `startxref` keyword.
fn find_startxref(reader: &SourceReader<'_>) -> Result<u64> {
    let size = reader.size();
    let window = (reader.settings().startxref_window as u64).min(size);
    let tail_start = size - window;
    let tail = reader.fetch(tail_start, window as usize)?;

    let pos = memmem::rfind(&tail, b"startxref").ok_or(Error::Structure("missing startxref"))?;
    let keyword_end = tail_start + (pos + b"startxref".len()) as u64;

    let offset = reader.parse_at(keyword_end, |p| {
        Ok(match p.next_token()?.kind {
            TokenKind::Integer(offset) => Some(offset),
            _ => None,
        })
    });

    match offset {
        Ok(Some(Some(offset))) if offset >= 0 && (offset as u64) < size => Ok(offset as u64),
        Err(e) if is_fatal(&e) => Err(e),
        _ => Err(Error::Structure("invalid startxref offset")),
    }
}
