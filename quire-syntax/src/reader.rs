//! Parsing objects out of a byte source.

use crate::config::{Settings, StreamLengthPolicy};
use crate::error::{Error, Result};
use crate::lexer::Lexer;
use crate::parser::{ParseError, Parser, StreamHeader};
use crate::source::{ByteSource, ReadResult};
use crate::trivia::is_white_space_character;
use bytes::Bytes;
use log::warn;
use memchr::memmem;

const ENDSTREAM: &[u8] = b"endstream";
const ENDOBJ: &[u8] = b"endobj";
const SCAN_CHUNK: usize = 64 * 1024;

pub(crate) struct SourceReader<'a> {
    source: &'a dyn ByteSource,
    settings: &'a Settings,
}

impl<'a> SourceReader<'a> {
    pub(crate) fn new(source: &'a dyn ByteSource, settings: &'a Settings) -> Self {
        Self { source, settings }
    }

    pub(crate) fn settings(&self) -> &'a Settings {
        self.settings
    }

    pub(crate) fn size(&self) -> u64 {
        self.source.size()
    }

    /// Read a range. Ranges past the end of the source are truncated.
    pub(crate) fn fetch(&self, offset: u64, len: usize) -> Result<Bytes> {
        match self.source.read_at(offset, len) {
            ReadResult::Data(data) => Ok(data),
            ReadResult::Eof => Ok(Bytes::new()),
            ReadResult::NeedMoreData => {
                let available = self.source.available_from(offset);
                let end = offset.saturating_add(len as u64).min(self.size());

                Err(Error::NeedMoreData {
                    offset: offset + available,
                    len: end.saturating_sub(offset + available).max(1),
                })
            }
        }
    }

    /// Run `f` on a parser positioned at `offset`.
    ///
    /// The window handed to the parser grows until `f` no longer runs out of
    /// data. Returns `None` if `offset` is past the end of the source.
    pub(crate) fn parse_at<T>(
        &self,
        offset: u64,
        mut f: impl FnMut(&mut Parser<'_>) -> std::result::Result<T, ParseError>,
    ) -> Result<Option<T>> {
        let size = self.size();

        if offset >= size {
            return Ok(None);
        }

        let mut window = self.settings.initial_window.max(64) as u64;

        loop {
            if self.settings.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let wanted = window.min(size - offset);
            let available = self.source.available_from(offset).min(wanted);

            if available == 0 {
                return Err(Error::NeedMoreData {
                    offset,
                    len: wanted,
                });
            }

            let data = self.fetch(offset, available as usize)?;
            let complete = offset + data.len() as u64 >= size;
            let mut parser = Parser::new(
                Lexer::new(&data, offset, complete),
                self.settings.max_nesting_depth,
            );

            match f(&mut parser) {
                Ok(value) => return Ok(Some(value)),
                Err(ParseError::Malformed { offset, message }) => {
                    return Err(Error::Syntax { offset, message });
                }
                Err(ParseError::Limit(limit)) => return Err(Error::ResourceLimit(limit)),
                Err(ParseError::Starved) if complete => {
                    return Err(Error::Syntax {
                        offset,
                        message: "unexpected end of data",
                    });
                }
                Err(ParseError::Starved) if available < wanted => {
                    return Err(Error::NeedMoreData {
                        offset: offset + available,
                        len: wanted - available,
                    });
                }
                Err(ParseError::Starved) => window = window.saturating_mul(2),
            }
        }
    }

    /// Read the data of a stream whose dictionary was parsed into `header`.
    pub(crate) fn read_stream_data(
        &self,
        header: &StreamHeader,
        declared: Option<u64>,
    ) -> Result<Bytes> {
        let start = header.data_offset;
        let in_bounds = declared.filter(|len| {
            start
                .checked_add(*len)
                .is_some_and(|end| end <= self.size())
        });

        match (self.settings.stream_length_policy, in_bounds) {
            (StreamLengthPolicy::TrustDeclared, Some(len)) => self.fetch(start, len as usize),
            (StreamLengthPolicy::Validate, Some(len)) => {
                if self.endstream_at(start + len)? {
                    self.fetch(start, len as usize)
                } else {
                    warn!("stream at offset {start} has a wrong length, searching for endstream");

                    self.scan_stream_data(start)
                }
            }
            _ => self.scan_stream_data(start),
        }
    }

    fn endstream_at(&self, offset: u64) -> Result<bool> {
        let window = self.fetch(offset, 64)?;
        let skipped = window
            .iter()
            .position(|b| !is_white_space_character(*b))
            .unwrap_or(window.len());

        Ok(window[skipped..].starts_with(ENDSTREAM))
    }

    /// Take everything up to the next `endstream` (or `endobj`) keyword,
    /// without the end-of-line marker in front of it. Without a keyword, the
    /// data extends to the end of the file.
    fn scan_stream_data(&self, start: u64) -> Result<Bytes> {
        let size = self.size();
        let mut pos = start;
        let mut end = size;

        while pos < size {
            if self.settings.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let chunk = self.fetch(pos, SCAN_CHUNK)?;

            if chunk.is_empty() {
                break;
            }

            let found = [ENDSTREAM, ENDOBJ]
                .iter()
                .filter_map(|keyword| memmem::find(&chunk, keyword))
                .min();

            if let Some(found) = found {
                end = pos + found as u64;
                break;
            }

            if pos + chunk.len() as u64 >= size {
                break;
            }

            // Keep an overlap so that a keyword on the chunk border is found.
            pos += (chunk.len() - (ENDSTREAM.len() - 1)) as u64;
        }

        let data = self.fetch(start, (end - start) as usize)?;
        let trimmed = if data.ends_with(b"\r\n") {
            2
        } else if data.ends_with(b"\n") || data.ends_with(b"\r") {
            1
        } else {
            0
        };

        Ok(data.slice(..data.len() - trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Dict, Object};
    use crate::parser::Body;
    use crate::source::{MemorySource, ProgressiveSource};

    fn header(data_offset: u64) -> StreamHeader {
        StreamHeader {
            dict: Dict::new(),
            data_offset,
        }
    }

    #[test]
    fn window_grows_until_object_fits() {
        let mut data = b"[".to_vec();
        data.extend(std::iter::repeat_n(b"1 ".as_slice(), 200).flatten());
        data.extend_from_slice(b"] trailing");

        let source = MemorySource::new(data);
        let settings = Settings {
            initial_window: 16,
            ..Settings::default()
        };
        let reader = SourceReader::new(&source, &settings);

        let object = reader.parse_at(0, |p| p.parse_object()).unwrap().unwrap();
        assert_eq!(object.as_array().map(|a| a.len()), Some(200));
    }

    #[test]
    fn missing_data_is_reported() {
        let source = ProgressiveSource::new(100);
        source.supply(0, b"1 0 obj <</A");
        let settings = Settings::default();
        let reader = SourceReader::new(&source, &settings);

        assert_eq!(
            reader.parse_at(0, |p| p.parse_indirect()),
            Err(Error::NeedMoreData {
                offset: 12,
                len: 88
            })
        );
        assert!(matches!(
            reader.parse_at(50, |p| p.parse_object()),
            Err(Error::NeedMoreData { offset: 50, .. })
        ));
    }

    #[test]
    fn parse_failures_are_syntax_errors() {
        let source = MemorySource::new(&b"xyz 0 obj"[..]);
        let settings = Settings::default();
        let reader = SourceReader::new(&source, &settings);

        assert!(matches!(
            reader.parse_at(0, |p| p.parse_indirect()),
            Err(Error::Syntax { .. })
        ));
        assert_eq!(reader.parse_at(100, |p| p.parse_object()), Ok(None));
    }

    #[test]
    fn declared_length_is_validated() {
        let data = b"stream\nabcdef\nendstream\nendobj";
        let source = MemorySource::new(&data[..]);
        let settings = Settings::default();
        let reader = SourceReader::new(&source, &settings);

        assert_eq!(
            reader.read_stream_data(&header(7), Some(6)).unwrap(),
            &b"abcdef"[..]
        );
        // Too short and too long lengths both fall back to the keyword.
        assert_eq!(
            reader.read_stream_data(&header(7), Some(3)).unwrap(),
            &b"abcdef"[..]
        );
        assert_eq!(
            reader.read_stream_data(&header(7), Some(1000)).unwrap(),
            &b"abcdef"[..]
        );
        assert_eq!(
            reader.read_stream_data(&header(7), None).unwrap(),
            &b"abcdef"[..]
        );
    }

    #[test]
    fn trusted_length_is_used_verbatim() {
        let data = b"stream\nabcdef\nendstream";
        let source = MemorySource::new(&data[..]);
        let settings = Settings {
            stream_length_policy: StreamLengthPolicy::TrustDeclared,
            ..Settings::default()
        };
        let reader = SourceReader::new(&source, &settings);

        assert_eq!(
            reader.read_stream_data(&header(7), Some(3)).unwrap(),
            &b"abc"[..]
        );
    }

    #[test]
    fn missing_endstream_reads_to_eof() {
        let data = b"stream\r\nabc";
        let source = MemorySource::new(&data[..]);
        let settings = Settings {
            stream_length_policy: StreamLengthPolicy::ScanForEndstream,
            ..Settings::default()
        };
        let reader = SourceReader::new(&source, &settings);

        assert_eq!(
            reader.read_stream_data(&header(8), Some(3)).unwrap(),
            &b"abc"[..]
        );
    }

    #[test]
    fn stream_header_then_data() {
        let data = b"5 0 obj\n<</Length 4>>\nstream\r\nDATA\r\nendstream\nendobj\n";
        let source = MemorySource::new(&data[..]);
        let settings = Settings::default();
        let reader = SourceReader::new(&source, &settings);

        let (_, body) = reader.parse_at(0, |p| p.parse_indirect()).unwrap().unwrap();
        let Body::Stream(header) = body else {
            panic!("expected stream");
        };
        let length = header.dict.get(b"Length").and_then(Object::as_i64);

        assert_eq!(
            reader
                .read_stream_data(&header, length.map(|l| l as u64))
                .unwrap(),
            &b"DATA"[..]
        );
    }
}
