//! Linearization dictionaries and the hint tables of linearized files.

use crate::document::Document;
use crate::error::Result;
use crate::object::keys::{E, H, L, LINEARIZED, N, O, P, S, T};
use crate::object::{Dict, Object};
use crate::parser::Body;
use crate::util::OptionLog;
use crate::xref::is_fatal;
use log::{debug, warn};
use memchr::memmem;
use quire_common::bit::BitReader;

/// How far into the file the linearization dictionary may start.
const HEADER_WINDOW: usize = 1024;

/// The page offset hint table header takes 36 bytes and the shared object
/// hint table header 24.
const MIN_HINT_STREAM_LEN: usize = 60;

/// The linearization parameter dictionary at the start of a linearized
/// file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linearized {
    file_size: u64,
    first_page_object: u32,
    first_page_end: u64,
    page_count: u32,
    main_xref_offset: u64,
    first_page: u32,
    hint_stream: Option<(u64, u64)>,
}

impl Linearized {
    pub(crate) fn from_dict(dict: &Dict, file_size: u64) -> Option<Self> {
        if !dict.contains_key(LINEARIZED) {
            return None;
        }

        let positive = |key: &[u8]| dict.get_i64(key).and_then(|v| u64::try_from(v).ok()).filter(|v| *v > 0);
        let number = |key: &[u8]| dict.get_i64(key).and_then(|v| u32::try_from(v).ok());

        let first_page = match dict.get(P) {
            None => 0,
            Some(_) => number(P)?,
        };

        let hint_stream = dict.get_array(H).and_then(|range| match range {
            [start, len] | [start, len, _, _] => {
                let start = u64::try_from(start.as_i64()?.max(0)).ok()?;
                let len = u64::try_from(len.as_i64()?).ok()?;

                Some((start, len))
            }
            _ => None,
        });

        let linearized = Self {
            file_size: positive(L)?,
            first_page_object: number(O).filter(|n| *n > 0)?,
            first_page_end: positive(E)?,
            page_count: number(N)?,
            main_xref_offset: positive(T)?,
            first_page,
            hint_stream,
        };

        let valid = linearized.file_size == file_size
            && linearized.main_xref_offset < file_size
            && linearized.page_count > 0
            && linearized.first_page_end < file_size
            && linearized.first_page < linearized.page_count;

        valid
            .then_some(linearized)
            .warn_none("ignoring inconsistent linearization dictionary")
    }

    /// The file size the dictionary was written for.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// The object number of the first page's page object.
    pub fn first_page_object(&self) -> u32 {
        self.first_page_object
    }

    /// The offset of the end of the first page.
    pub fn first_page_end(&self) -> u64 {
        self.first_page_end
    }

    /// The number of pages.
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// The offset of the first entry of the main cross-reference table.
    pub fn main_xref_offset(&self) -> u64 {
        self.main_xref_offset
    }

    /// The index of the page that is stored first.
    pub fn first_page(&self) -> u32 {
        self.first_page
    }

    /// The offset and length of the primary hint stream.
    pub fn hint_stream(&self) -> Option<(u64, u64)> {
        self.hint_stream
    }

    /// Whether the file carries hint tables that locate its pages.
    pub fn has_hint_tables(&self) -> bool {
        self.page_count > 1 && self.hint_stream.is_some_and(|(start, len)| start > 0 && len > 0)
    }

    /// The file offset of a position as recorded in the hint tables, which
    /// are written as if the hint stream were not present.
    fn file_offset(&self, hint_offset: u32) -> u64 {
        let offset = u64::from(hint_offset);

        match self.hint_stream {
            Some((start, len)) if offset >= start => offset.saturating_add(len),
            _ => offset,
        }
    }
}

/// Where a page is stored in a linearized file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePosition {
    /// The offset of the page's first object.
    pub offset: u64,
    /// The number of bytes of the page's objects.
    pub length: u64,
    /// The number of the page's first object.
    pub object_number: u32,
}

/// The page offset hint table entry of a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHint {
    /// The position of the page's objects.
    pub position: PagePosition,
    /// The number of objects of the page.
    pub object_count: u32,
    /// Indices into [`HintTables::shared_groups`].
    pub shared_groups: Vec<u32>,
}

/// A group of objects shared between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedGroup {
    /// The offset of the group's first object.
    pub offset: u64,
    /// The number of bytes of the group.
    pub length: u64,
    /// The number of the group's first object.
    pub object_number: u32,
    /// The number of objects in the group.
    pub object_count: u32,
}

/// The page offset and shared object hint tables of a linearized file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintTables {
    first_page_object_offset: u64,
    pages: Vec<PageHint>,
    shared_groups: Vec<SharedGroup>,
}

impl HintTables {
    /// Parse the decoded data of a hint stream whose shared object hint
    /// table starts at byte `shared_offset`.
    pub(crate) fn parse(
        data: &[u8],
        shared_offset: usize,
        linearized: &Linearized,
        max_pages: usize,
    ) -> Option<Self> {
        if data.len() < MIN_HINT_STREAM_LEN || shared_offset == 0 || shared_offset > data.len() {
            return None;
        }

        let page_count = linearized.page_count as usize;
        if page_count > max_pages {
            warn!("hint tables describe too many pages ({page_count})");

            return None;
        }

        let mut hints = Self {
            first_page_object_offset: 0,
            pages: Vec::with_capacity(page_count),
            shared_groups: Vec::new(),
        };

        hints.read_page_table(&mut BitReader::new(data), linearized)?;
        hints.read_shared_table(&mut BitReader::new(&data[shared_offset..]), linearized)?;

        Some(hints)
    }

    fn read_page_table(&mut self, bits: &mut BitReader<'_>, linearized: &Linearized) -> Option<()> {
        let least_objects = bits.read(32)?;
        self.first_page_object_offset = linearized.file_offset(bits.read(32)?);
        let object_bits = width(bits)?;
        let least_length = bits.read(32)?;
        let length_bits = width(bits)?;
        // Content stream offsets and lengths.
        bits.skip(32 + 16 + 32 + 16);
        let shared_count_bits = width(bits)?;
        let shared_id_bits = width(bits)?;
        // Numerator bits and denominator of the fractional positions.
        bits.skip(16 + 16);

        let page_count = linearized.page_count as usize;

        // Objects of pages after the first are numbered from 1.
        let mut next_object = 1_u32;
        for index in 0..page_count {
            let object_count = bits.read(object_bits)?.checked_add(least_objects)?;
            let object_number = if index == 0 {
                linearized.first_page_object
            } else {
                let number = next_object;
                next_object = next_object.checked_add(object_count)?;
                number
            };

            self.pages.push(PageHint {
                position: PagePosition {
                    offset: 0,
                    length: 0,
                    object_number,
                },
                object_count,
                shared_groups: Vec::new(),
            });
        }
        bits.align();

        let mut page_end = linearized.first_page_end;
        for (index, page) in self.pages.iter_mut().enumerate() {
            let length = u64::from(bits.read(length_bits)?.checked_add(least_length)?);
            page.position.length = length;

            // The first page ends where the other pages start.
            page.position.offset = if index == 0 {
                self.first_page_object_offset
            } else {
                let offset = page_end;
                page_end = page_end.checked_add(length)?;
                offset
            };
        }
        bits.align();

        let mut counts = Vec::with_capacity(page_count);
        for _ in 0..page_count {
            counts.push(bits.read(shared_count_bits)?);
        }
        bits.align();

        for (page, count) in self.pages.iter_mut().zip(counts) {
            if count as usize > bits.bits_left() {
                return None;
            }

            for _ in 0..count {
                page.shared_groups.push(bits.read(shared_id_bits)?);
            }
        }

        Some(())
    }

    fn read_shared_table(&mut self, bits: &mut BitReader<'_>, linearized: &Linearized) -> Option<()> {
        let first_object = bits.read(32)?;
        let first_location = linearized.file_offset(bits.read(32)?);
        let first_page_groups = bits.read(32)? as usize;
        let total = bits.read(32)? as usize;
        let count_bits = width(bits)?;
        let least_length = bits.read(32)?;
        let length_bits = width(bits)?;

        // Every group takes at least one bit for its signature flag.
        if first_page_groups > total || total > bits.bits_left() {
            return None;
        }

        // The groups of the first page come first and start with its page
        // object.
        let mut offset = self.first_page_object_offset;
        for index in 0..total {
            if index == first_page_groups {
                offset = first_location;
            }

            let length = u64::from(bits.read(length_bits)?.checked_add(least_length)?);
            self.shared_groups.push(SharedGroup {
                offset,
                length,
                object_number: 0,
                object_count: 0,
            });
            offset = offset.checked_add(length)?;
        }
        bits.align();

        let mut signatures = 0;
        for _ in 0..total {
            signatures += bits.read_bit()? as usize;
        }
        bits.align();

        // 16 byte MD5 signatures.
        if signatures > 0 {
            if signatures * 128 > bits.bits_left() {
                return None;
            }

            bits.skip(signatures * 128);
            bits.align();
        }

        let mut object_number = linearized.first_page_object;
        for (index, group) in self.shared_groups.iter_mut().enumerate() {
            if index == first_page_groups {
                object_number = first_object;
            }

            let count = bits.read(count_bits)?.checked_add(1)?;
            group.object_number = object_number;
            group.object_count = count;
            object_number = object_number.checked_add(count)?;
        }

        Some(())
    }

    /// The offset of the first page's page object.
    pub fn first_page_object_offset(&self) -> u64 {
        self.first_page_object_offset
    }

    /// The entries of all pages.
    pub fn pages(&self) -> &[PageHint] {
        &self.pages
    }

    /// The shared object groups.
    pub fn shared_groups(&self) -> &[SharedGroup] {
        &self.shared_groups
    }

    /// Where the page at `index` is stored.
    pub fn page_position(&self, index: usize) -> Option<PagePosition> {
        self.pages.get(index).map(|page| page.position)
    }
}

/// A bit width field of a hint table header.
fn width(bits: &mut BitReader<'_>) -> Option<u8> {
    u8::try_from(bits.read(16)?).ok().filter(|w| *w <= 32)
}

impl Document {
    /// The linearization dictionary, if the file is linearized.
    ///
    /// The dictionary must be the first object in the file and match the
    /// file size.
    pub fn linearized(&self) -> Result<Option<Linearized>> {
        let reader = self.reader();
        let head = reader.fetch(0, HEADER_WINDOW)?;
        let start = memmem::find(&head, b"%PDF-").unwrap_or(0) as u64;

        let dict = match reader.parse_at(start, |p| p.parse_indirect()) {
            Ok(Some((_, Body::Object(Object::Dict(dict))))) => dict,
            Ok(_) => return Ok(None),
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                debug!("no linearization dictionary: {e}");

                return Ok(None);
            }
        };

        Ok(Linearized::from_dict(&dict, reader.size()))
    }

    /// The hint tables of a linearized file.
    ///
    /// Returns `None` if the file has no usable hint tables.
    pub fn hint_tables(&self, linearized: &Linearized) -> Result<Option<HintTables>> {
        let Some((start, len)) = linearized.hint_stream.filter(|_| linearized.has_hint_tables())
        else {
            return Ok(None);
        };

        let reader = self.reader();
        if start.saturating_add(len) > reader.size() {
            warn!("hint stream extends past the end of the file");

            return Ok(None);
        }

        // The whole stream has to be there before it can be parsed.
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        reader.fetch(start, len)?;

        let stream = match self.object_at(start) {
            Ok(Some(Object::Stream(stream))) => stream,
            Ok(_) => {
                warn!("hint stream offset does not point to a stream");

                return Ok(None);
            }
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                warn!("failed to read hint stream: {e}");

                return Ok(None);
            }
        };

        let Some(shared_offset) = stream
            .dict()
            .get_i64(S)
            .and_then(|offset| usize::try_from(offset).ok())
        else {
            warn!("hint stream has no shared object hint table");

            return Ok(None);
        };

        let data = match stream.decoded(&self.decode_settings) {
            Ok(data) => data,
            Err(e) => {
                warn!("failed to decode hint stream: {e}");

                return Ok(None);
            }
        };

        Ok(HintTables::parse(&data, shared_offset, linearized, self.settings.max_pages)
            .warn_none("ignoring malformed hint tables"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_common::bit::BitWriter;

    fn linearized(page_count: u32, hint_stream: Option<(u64, u64)>) -> Linearized {
        Linearized {
            file_size: 100_000,
            first_page_object: 39,
            first_page_end: 5105,
            page_count,
            main_xref_offset: 90_000,
            first_page: 0,
            hint_stream,
        }
    }

    fn dict(entries: &str) -> Dict {
        use crate::lexer::Lexer;
        use crate::parser::Parser;

        let mut parser = Parser::new(Lexer::new(entries.as_bytes(), 0, true), 64);
        parser
            .parse_object()
            .unwrap()
            .as_dict()
            .cloned()
            .unwrap()
    }

    #[test]
    fn linearization_dictionary() {
        let dict = dict(
            "<< /Linearized 1 /L 19326762 /H [ 123730 3816 ] /O 5932 /E 639518 /N 102 /T 19220281 >>",
        );
        let linearized = Linearized::from_dict(&dict, 19_326_762).unwrap();

        assert_eq!(linearized.first_page_object(), 5932);
        assert_eq!(linearized.first_page_end(), 639_518);
        assert_eq!(linearized.page_count(), 102);
        assert_eq!(linearized.main_xref_offset(), 19_220_281);
        assert_eq!(linearized.first_page(), 0);
        assert_eq!(linearized.hint_stream(), Some((123_730, 3816)));
        assert!(linearized.has_hint_tables());

        // The file was changed after it was linearized.
        assert!(Linearized::from_dict(&dict, 19_326_763).is_none());
    }

    #[test]
    fn incomplete_linearization_dictionary() {
        let no_pages = dict("<< /Linearized 1 /L 1000 /O 5 /E 500 /N 0 /T 900 >>");
        assert!(Linearized::from_dict(&no_pages, 1000).is_none());

        let no_marker = dict("<< /L 1000 /O 5 /E 500 /N 1 /T 900 >>");
        assert!(Linearized::from_dict(&no_marker, 1000).is_none());

        let first_page_past_end = dict("<< /Linearized 1 /L 1000 /O 5 /E 500 /N 1 /T 900 /P 1 >>");
        assert!(Linearized::from_dict(&first_page_past_end, 1000).is_none());

        // A single page needs no hint tables.
        let single = dict("<< /Linearized 1 /L 1000 /H [100 50] /O 5 /E 500 /N 1 /T 900 >>");
        assert!(!Linearized::from_dict(&single, 1000).unwrap().has_hint_tables());
    }

    /// Two pages and six shared groups, of which the first five belong to
    /// the first page.
    fn hint_stream() -> (Vec<u8>, usize) {
        let mut w = BitWriter::new();

        // Page offset hint table header.
        w.write(3, 32);
        w.write(777, 32);
        w.write(2, 16);
        w.write(700, 32);
        w.write(12, 16);
        w.write(0, 32);
        w.write(0, 16);
        w.write(0, 32);
        w.write(0, 16);
        w.write(2, 16);
        w.write(3, 16);
        w.write(4, 16);
        w.write(1, 16);

        // Object counts: 5 and 3.
        w.write(2, 2);
        w.write(0, 2);
        w.align();
        // Page lengths: 4328 and 767.
        w.write(4328 - 700, 12);
        w.write(767 - 700, 12);
        w.align();
        // Shared references: 2 and 3.
        w.write(2, 2);
        w.write(3, 2);
        w.align();
        for id in [0, 0, 2, 5, 3] {
            w.write(id, 3);
        }
        w.align();

        let shared_offset = w.cur_pos() / 8;

        // Shared object hint table header.
        w.write(4, 32);
        w.write(10_939, 32);
        w.write(5, 32);
        w.write(6, 32);
        w.write(0, 16);
        w.write(254, 32);
        w.write(12, 16);

        for len in [254, 389, 726, 290, 2669, 544] {
            w.write(len - 254, 12);
        }
        w.align();
        // No signatures.
        w.write(0, 6);
        w.align();

        let mut data = w.finish();
        data.resize(data.len().max(MIN_HINT_STREAM_LEN), 0);

        (data, shared_offset)
    }

    #[test]
    fn page_and_shared_group_entries() {
        let (data, shared_offset) = hint_stream();
        let hints = HintTables::parse(&data, shared_offset, &linearized(2, None), 100).unwrap();

        assert_eq!(hints.first_page_object_offset(), 777);
        assert_eq!(
            hints.page_position(0),
            Some(PagePosition {
                offset: 777,
                length: 4328,
                object_number: 39
            })
        );
        assert_eq!(
            hints.page_position(1),
            Some(PagePosition {
                offset: 5105,
                length: 767,
                object_number: 1
            })
        );
        assert_eq!(hints.page_position(2), None);

        assert_eq!(hints.pages()[0].object_count, 5);
        assert_eq!(hints.pages()[0].shared_groups, [0, 0]);
        assert_eq!(hints.pages()[1].object_count, 3);
        assert_eq!(hints.pages()[1].shared_groups, [2, 5, 3]);

        let groups = hints.shared_groups();
        assert_eq!(groups.len(), 6);
        assert_eq!(
            groups[1],
            SharedGroup {
                offset: 1031,
                length: 389,
                object_number: 40,
                object_count: 1
            }
        );
        assert_eq!((groups[4].offset, groups[4].object_number), (2436, 43));
        assert_eq!(
            groups[5],
            SharedGroup {
                offset: 10_939,
                length: 544,
                object_number: 4,
                object_count: 1
            }
        );
    }

    #[test]
    fn offsets_skip_the_hint_stream() {
        let (data, shared_offset) = hint_stream();
        let hints =
            HintTables::parse(&data, shared_offset, &linearized(2, Some((600, 100))), 100).unwrap();

        // Recorded positions past the hint stream move by its length.
        assert_eq!(hints.first_page_object_offset(), 877);
        assert_eq!(hints.shared_groups()[5].offset, 11_039);
        // The first page end is a real file offset.
        assert_eq!(hints.page_position(1).unwrap().offset, 5105);
    }

    #[test]
    fn malformed_hint_streams() {
        let (data, shared_offset) = hint_stream();
        let linearized = linearized(2, None);

        assert!(HintTables::parse(&data[..40], shared_offset, &linearized, 100).is_none());
        assert!(HintTables::parse(&data, 0, &linearized, 100).is_none());
        assert!(HintTables::parse(&data, data.len() + 1, &linearized, 100).is_none());
        // More pages than allowed.
        assert!(HintTables::parse(&data, shared_offset, &linearized, 1).is_none());

        let mut wide = data.clone();
        // Object count bits of 33.
        wide[8..10].copy_from_slice(&33_u16.to_be_bytes());
        assert!(HintTables::parse(&wide, shared_offset, &linearized, 100).is_none());
    }
}
