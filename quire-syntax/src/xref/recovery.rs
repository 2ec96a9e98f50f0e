//! Rebuilding the cross-reference table by scanning the whole file.

use crate::error::{Error, Result};
use crate::object::keys::ROOT;
use crate::object::{Dict, Object, ObjectIdentifier};
use crate::parser::Body;
use crate::reader::SourceReader;
use crate::trivia::{is_regular_character, is_white_space_character};
use crate::xref::stream::trailer_of;
use crate::xref::{XRefEntry, XRefTable, is_fatal};
use log::{debug, warn};
use memchr::memmem;

const CHUNK: usize = 1024 * 1024;
/// How far an object header may extend in front of its `obj` keyword.
const LOOKBEHIND: usize = 64;
/// Enough bytes to see the character after the longest marker.
const LOOKAHEAD: usize = 16;

/// Everything a scan found.
#[derive(Debug, Default)]
pub(crate) struct Scan {
    /// The last definition of each object number.
    pub(crate) table: XRefTable,
    /// Every object header in file order, with its offset.
    pub(crate) headers: Vec<(ObjectIdentifier, u64)>,
    /// Trailer dictionaries and cross-reference streams with a `Root`, in
    /// file order.
    pub(crate) trailers: Vec<Dict>,
    /// Objects that look like object streams.
    pub(crate) object_streams: Vec<ObjectIdentifier>,
    /// Objects that look like a document catalog.
    pub(crate) catalogs: Vec<ObjectIdentifier>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Marker {
    Object { id: ObjectIdentifier, header: usize },
    EndObject,
    Trailer,
    XRef,
    ObjStm,
    Catalog,
}

pub(crate) fn scan(reader: &SourceReader<'_>) -> Result<Scan> {
    scan_in_chunks(reader, CHUNK)
}

fn scan_in_chunks(reader: &SourceReader<'_>, chunk: usize) -> Result<Scan> {
    let size = reader.size();
    let mut scan = Scan::default();
    let mut current: Option<(ObjectIdentifier, u64)> = None;
    let mut pos = 0;

    while pos < size {
        if reader.settings().cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let start = pos.saturating_sub(LOOKBEHIND as u64);
        let end = pos.saturating_add(chunk as u64).min(size);
        let from = (pos - start) as usize;
        let to = from + (end - pos) as usize;
        let data = reader.fetch(start, to + LOOKAHEAD)?;

        for (at, marker) in markers(&data, from, to) {
            let offset = start + at as u64;

            match marker {
                Marker::Object { id, header } => {
                    let header = start + header as u64;

                    scan.table.set(
                        id.num,
                        XRefEntry::InFile {
                            offset: header,
                            generation: id.generation,
                        },
                    );
                    scan.headers.push((id, header));
                    current = Some((id, header));
                }
                Marker::EndObject => current = None,
                Marker::Trailer => {
                    match reader.parse_at(offset + b"trailer".len() as u64, |p| p.parse_object()) {
                        Ok(Some(Object::Dict(dict))) => scan.trailers.push(dict),
                        Err(e) if is_fatal(&e) => return Err(e),
                        _ => debug!("no trailer dictionary after offset {offset}"),
                    }
                }
                Marker::XRef => {
                    if let Some((id, header)) = current {
                        match reader.parse_at(header, |p| p.parse_indirect()) {
                            Ok(Some((_, Body::Stream(stream)))) if stream.dict.contains_key(ROOT) => {
                                scan.trailers.push(trailer_of(&stream.dict));
                            }
                            Err(e) if is_fatal(&e) => return Err(e),
                            _ => debug!("cross-reference stream {id} has no usable trailer"),
                        }
                    }
                }
                Marker::ObjStm => {
                    if let Some((id, _)) = current
                        && scan.object_streams.last() != Some(&id)
                    {
                        scan.object_streams.push(id);
                    }
                }
                Marker::Catalog => {
                    if let Some((id, _)) = current
                        && scan.catalogs.last() != Some(&id)
                    {
                        scan.catalogs.push(id);
                    }
                }
            }
        }

        pos = end;
    }

    if scan.headers.is_empty() {
        warn!("no objects were found while scanning the file");
    } else {
        debug!("scan found {} object headers", scan.headers.len());
    }

    Ok(scan)
}

/// The markers that start in `data[from..to]`, ordered by position.
fn markers(data: &[u8], from: usize, to: usize) -> Vec<(usize, Marker)> {
    let mut found = Vec::new();

    let mut find = |needle: &[u8], classify: &dyn Fn(usize) -> Option<Marker>| {
        for at in memmem::find_iter(data, needle) {
            if at < from || at >= to {
                continue;
            }

            let ends_token = data
                .get(at + needle.len())
                .is_none_or(|b| !is_regular_character(*b));

            if ends_token && let Some(marker) = classify(at) {
                found.push((at, marker));
            }
        }
    };

    let starts_token = |at: usize| at == 0 || !is_regular_character(data[at - 1]);

    find(b"obj", &|at| {
        if data[..at].ends_with(b"end") {
            Some(Marker::EndObject)
        } else {
            object_header(data, at).map(|(header, id)| Marker::Object { id, header })
        }
    });
    find(b"trailer", &|at| starts_token(at).then_some(Marker::Trailer));
    find(b"/XRef", &|_| Some(Marker::XRef));
    find(b"/ObjStm", &|_| Some(Marker::ObjStm));
    find(b"/Catalog", &|_| Some(Marker::Catalog));

    found.sort_by_key(|(at, _)| *at);
    found
}

/// Read the `num gen` in front of the `obj` keyword at `obj`.
fn object_header(data: &[u8], obj: usize) -> Option<(usize, ObjectIdentifier)> {
    let skip_white_space = |mut i: usize| {
        while i > 0 && is_white_space_character(data[i - 1]) {
            i -= 1;
        }

        i
    };

    let digits = |end: usize, max: usize| -> Option<(usize, u64)> {
        let mut i = end;

        while i > 0 && end - i < max && data[i - 1].is_ascii_digit() {
            i -= 1;
        }

        let value = data[i..end]
            .iter()
            .fold(0_u64, |acc, d| acc * 10 + u64::from(d - b'0'));

        (i < end).then_some((i, value))
    };

    let gen_end = skip_white_space(obj);

    if gen_end == obj {
        return None;
    }

    let (gen_start, generation) = digits(gen_end, 5)?;
    let num_end = skip_white_space(gen_start);

    if num_end == gen_start {
        return None;
    }

    let (num_start, num) = digits(num_end, 10)?;

    if num_start > 0 && is_regular_character(data[num_start - 1]) {
        return None;
    }

    let id = ObjectIdentifier::new(u32::try_from(num).ok()?, u16::try_from(generation).ok()?);

    Some((num_start, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::object::keys::SIZE;
    use crate::source::MemorySource;

    const BROKEN: &[u8] = b"%PDF-1.7
1 0 obj
<</Type /Catalog /Pages 2 0 R>>
endobj
2 0 obj <</Type/Pages/Kids[]/Count 0>> endobj
12 3 obj (x endobj) endobj
2 0 obj <</Type /Pages /Kids [] /Count 0 /Changed true>> endobj
trailer
<</Size 13 /Root 1 0 R>>
startxref
999999
%%EOF";

    fn scan_bytes(data: &[u8], chunk: usize) -> Scan {
        let source = MemorySource::new(data.to_vec());
        let settings = Settings::default();
        let reader = SourceReader::new(&source, &settings);

        scan_in_chunks(&reader, chunk).unwrap()
    }

    fn offset_of(data: &[u8], needle: &[u8]) -> u64 {
        memmem::find(data, needle).unwrap() as u64
    }

    #[test]
    fn objects_and_trailers() {
        let scan = scan_bytes(BROKEN, CHUNK);

        assert_eq!(
            scan.table.get(1),
            Some(XRefEntry::InFile {
                offset: offset_of(BROKEN, b"1 0 obj"),
                generation: 0
            })
        );
        // The later definition wins.
        assert_eq!(
            scan.table.get(2),
            Some(XRefEntry::InFile {
                offset: offset_of(BROKEN, b"2 0 obj <</Type /Pages"),
                generation: 0
            })
        );
        assert_eq!(
            scan.table.get(12).and_then(|e| e.generation()),
            Some(3)
        );
        assert_eq!(scan.headers.len(), 4);
        assert_eq!(scan.catalogs, vec![ObjectIdentifier::new(1, 0)]);
        assert_eq!(scan.trailers.len(), 1);
        assert_eq!(scan.trailers[0].get_i64(SIZE), Some(13));
    }

    #[test]
    fn small_chunks_find_the_same() {
        let whole = scan_bytes(BROKEN, CHUNK);

        for chunk in [1, 5, 7, 64] {
            let scan = scan_bytes(BROKEN, chunk);

            assert_eq!(scan.headers, whole.headers, "chunk size {chunk}");
            assert_eq!(scan.catalogs, whole.catalogs);
            assert_eq!(scan.trailers.len(), whole.trailers.len());
        }
    }

    #[test]
    fn headers_need_delimiters() {
        let data = b"x1 0 obj 1 endobj 20 0 objx 7 0obj 3 0 obj 1 endobj";
        let scan = scan_bytes(data, CHUNK);

        assert_eq!(
            scan.headers.iter().map(|(id, _)| id.num).collect::<Vec<_>>(),
            vec![3]
        );
    }

    #[test]
    fn markers_belong_to_the_current_object() {
        let data = b"5 0 obj <</Type /ObjStm /N 0 /First 0>> endobj /Catalog
6 0 obj <</Type /XRefStm>> endobj";
        let scan = scan_bytes(data, CHUNK);

        assert_eq!(scan.object_streams, vec![ObjectIdentifier::new(5, 0)]);
        assert!(scan.catalogs.is_empty());
        assert!(scan.trailers.is_empty());
    }

    #[test]
    fn xref_streams_with_root_are_trailers() {
        let data = b"%PDF-1.5
9 0 obj
<</Type /XRef /Size 10 /W [1 1 0] /Root 1 0 R /Length 2>>
stream
\x01\x00
endstream
endobj
";
        let scan = scan_bytes(data, CHUNK);

        assert_eq!(scan.trailers.len(), 1);
        assert_eq!(scan.trailers[0].get(ROOT), Some(&Object::reference(1, 0)));
        assert!(!scan.trailers[0].contains_key(b"W"));
    }
}
