//! Cross-reference streams.

use crate::error::{Error, Result};
use crate::object::keys::{DECODE_PARMS, FILTER, INDEX, LENGTH, SIZE, TYPE, W, XREF};
use crate::object::{Dict, Stream};
use crate::parser::Body;
use crate::reader::SourceReader;
use crate::xref::{Section, XRefEntry, decoded_lenient};
use log::warn;

pub(super) fn read(reader: &SourceReader<'_>, offset: u64) -> Result<Section> {
    let (id, body) = reader
        .parse_at(offset, |p| p.parse_indirect())?
        .ok_or(Error::Structure("cross-reference stream is past the end of the file"))?;

    let Body::Stream(header) = body else {
        return Err(Error::Structure("cross-reference offset does not point to a stream"));
    };

    if !header.dict.has_type(XREF) {
        warn!("cross-reference stream {id} has no /Type /XRef");
    }

    // The length of a cross-reference stream is always a direct object.
    let declared = header
        .dict
        .get_i64(LENGTH)
        .and_then(|len| u64::try_from(len).ok());
    let data = reader.read_stream_data(&header, declared)?;
    let stream = Stream::new(header.dict, data);
    let decoded = decoded_lenient(&stream, &reader.settings().decode_settings())?;
    let entries = parse_entries(stream.dict(), &decoded)?;

    Ok(Section {
        entries,
        trailer: trailer_of(stream.dict()),
    })
}

/// The trailer entries of a cross-reference stream dictionary.
pub(super) fn trailer_of(dict: &Dict) -> Dict {
    let mut trailer = dict.clone();

    for key in [TYPE, LENGTH, FILTER, DECODE_PARMS, W, INDEX] {
        trailer.remove(key);
    }

    trailer
}

fn parse_entries(dict: &Dict, data: &[u8]) -> Result<Vec<(u32, XRefEntry)>> {
    let widths = dict
        .get_array(W)
        .filter(|w| w.len() == 3)
        .ok_or(Error::Structure("cross-reference stream has an invalid W entry"))?;

    let mut w = [0_usize; 3];

    for (slot, width) in w.iter_mut().zip(widths) {
        *slot = width
            .as_i64()
            .and_then(|w| usize::try_from(w).ok())
            .filter(|w| *w <= 8)
            .ok_or(Error::Structure("cross-reference field is wider than 8 bytes"))?;
    }

    let row_len = w.iter().sum::<usize>();

    if row_len == 0 {
        return Err(Error::Structure("cross-reference stream has empty rows"));
    }

    let size = dict.get_i64(SIZE).unwrap_or(0);
    let subsections: Vec<(u32, u32)> = match dict.get_array(INDEX) {
        Some(index) => index
            .chunks_exact(2)
            .filter_map(|pair| {
                let first = u32::try_from(pair[0].as_i64()?).ok()?;
                let count = u32::try_from(pair[1].as_i64()?).ok()?;

                Some((first, count))
            })
            .collect(),
        None => vec![(0, u32::try_from(size).unwrap_or(0))],
    };

    let mut rows = data.chunks_exact(row_len);
    let mut entries = Vec::new();

    'subsections: for (first, count) in subsections {
        for i in 0..count {
            let Some(row) = rows.next() else {
                warn!("cross-reference stream data is shorter than its index");

                break 'subsections;
            };

            let (f1, rest) = row.split_at(w[0]);
            let (f2, f3) = rest.split_at(w[1]);
            // A missing type field means type 1.
            let kind = if w[0] == 0 { 1 } else { field(f1) };
            let num = first.saturating_add(i);

            let entry = match kind {
                0 => XRefEntry::Free,
                1 => XRefEntry::InFile {
                    offset: field(f2),
                    generation: u16::try_from(field(f3)).unwrap_or(u16::MAX),
                },
                2 => {
                    let (Ok(stream), Ok(index)) = (u32::try_from(field(f2)), u32::try_from(field(f3)))
                    else {
                        warn!("compressed object {num} has an out of range location");

                        continue;
                    };

                    XRefEntry::Compressed { stream, index }
                }
                // Unknown types refer to the null object.
                _ => continue,
            };

            entries.push((num, entry));
        }
    }

    Ok(entries)
}

/// A big-endian number. Empty fields are zero.
fn field(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0_u64, |acc, b| (acc << 8) | u64::from(*b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::object::Object;
    use crate::object::keys::ROOT;
    use crate::source::MemorySource;

    fn dict(w: [i64; 3], index: Option<&[i64]>, size: i64) -> Dict {
        let mut dict = Dict::new();
        dict.insert(W, Object::Array(w.iter().map(|w| Object::integer(*w)).collect()));
        dict.insert(SIZE, Object::integer(size));

        if let Some(index) = index {
            dict.insert(
                INDEX,
                Object::Array(index.iter().map(|i| Object::integer(*i)).collect()),
            );
        }

        dict
    }

    #[test]
    fn entry_types() {
        let data = [
            0, 0, 0, 0xFF, //
            1, 0, 0x10, 0, //
            2, 0, 0x05, 3, //
            7, 0, 0, 0,
        ];

        assert_eq!(
            parse_entries(&dict([1, 2, 1], None, 4), &data).unwrap(),
            vec![
                (0, XRefEntry::Free),
                (
                    1,
                    XRefEntry::InFile {
                        offset: 16,
                        generation: 0
                    }
                ),
                (
                    2,
                    XRefEntry::Compressed {
                        stream: 5,
                        index: 3
                    }
                ),
            ]
        );
    }

    #[test]
    fn index_and_default_type() {
        let data = [0x01, 0x00, 0x02, 0x00, 0x03, 0x00];

        assert_eq!(
            parse_entries(&dict([0, 2, 0], Some(&[10, 1, 20, 2]), 22), &data).unwrap(),
            vec![
                (
                    10,
                    XRefEntry::InFile {
                        offset: 256,
                        generation: 0
                    }
                ),
                (
                    20,
                    XRefEntry::InFile {
                        offset: 512,
                        generation: 0
                    }
                ),
                (
                    21,
                    XRefEntry::InFile {
                        offset: 768,
                        generation: 0
                    }
                ),
            ]
        );
    }

    #[test]
    fn invalid_widths() {
        assert!(parse_entries(&dict([1, 9, 1], None, 1), &[]).is_err());
        assert!(parse_entries(&dict([0, 0, 0], None, 1), &[]).is_err());
        // Truncated data is not an error.
        assert_eq!(
            parse_entries(&dict([1, 1, 1], None, 5), &[1, 9, 0, 1]).unwrap().len(),
            1
        );
    }

    #[test]
    fn stream_section() {
        let mut data = b"%PDF-1.5\n".to_vec();
        let offset = data.len() as u64;
        data.extend_from_slice(
            b"3 0 obj\n<</Type/XRef/Size 2/W[1 1 0]/Root 1 0 R/Length 4>>\nstream\n\x00\x00\x01\x09\nendstream\nendobj\n",
        );

        let source = MemorySource::new(data);
        let settings = Settings::default();
        let reader = SourceReader::new(&source, &settings);
        let section = read(&reader, offset).unwrap();

        assert_eq!(
            section.entries[1],
            (
                1,
                XRefEntry::InFile {
                    offset: 9,
                    generation: 0
                }
            )
        );
        assert_eq!(section.trailer.get(ROOT), Some(&Object::reference(1, 0)));
        assert!(!section.trailer.contains_key(W));
    }
}
