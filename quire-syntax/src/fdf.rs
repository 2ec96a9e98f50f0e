//! Forms data files.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::object::keys::{FDF, LENGTH, ROOT};
use crate::object::{Dict, Object, ObjectIdentifier, Stream};
use crate::parser::{Body, StreamHeader};
use crate::reader::SourceReader;
use crate::source::MemorySource;
use crate::xref::is_fatal;
use bytes::Bytes;
use log::{debug, warn};
use std::collections::BTreeMap;

/// A forms data file.
///
/// Unlike a PDF file, an FDF file is read front to back: object definitions
/// follow each other until the `trailer`, which names the root object.
/// Reading stops at the first thing that is neither.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FdfDocument {
    objects: BTreeMap<u32, (u16, Object)>,
    root: Option<u32>,
}

enum Step {
    /// An object and the offset after its `endobj`, if there was one.
    Object(ObjectIdentifier, Object, Option<u64>),
    Stream(ObjectIdentifier, StreamHeader),
    Trailer(Object),
}

impl FdfDocument {
    /// An empty document whose root has an empty `FDF` dictionary.
    pub fn new() -> Self {
        let mut root = Dict::new();
        root.insert(FDF, Object::Dict(Dict::new()));

        let mut doc = Self::default();
        let id = doc.insert(root.into());
        doc.root = Some(id.num);

        doc
    }

    /// Parse a forms data file. Fails if no root dictionary was found.
    pub fn parse(data: impl Into<Bytes>) -> Result<Self> {
        let source = MemorySource::new(data);
        let settings = Settings::default();
        let reader = SourceReader::new(&source, &settings);

        let mut doc = Self::default();
        let mut pos = 0;

        loop {
            let step = reader.parse_at(pos, |p| {
                if p.peek_token()?.is_keyword(b"trailer") {
                    p.next_token()?;

                    return Ok(Step::Trailer(p.parse_object()?));
                }

                let (id, body) = p.parse_indirect()?;

                match body {
                    Body::Object(object) => {
                        let next = p
                            .next_token()?
                            .is_keyword(b"endobj")
                            .then(|| p.lexer().absolute_position());

                        Ok(Step::Object(id, object, next))
                    }
                    Body::Stream(header) => Ok(Step::Stream(id, header)),
                }
            });

            let step = match step {
                Ok(Some(step)) => step,
                Ok(None) => break,
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    debug!("stopping at offset {pos}: {e}");

                    break;
                }
            };

            match step {
                Step::Object(id, object, next) => {
                    doc.define(id, object);

                    match next {
                        Some(next) => pos = next,
                        None => {
                            debug!("object {id} is not followed by endobj");

                            break;
                        }
                    }
                }
                Step::Stream(id, header) => {
                    let declared = header
                        .dict
                        .get_i64(LENGTH)
                        .and_then(|len| u64::try_from(len).ok());
                    let data = reader.read_stream_data(&header, declared)?;
                    let end = header.data_offset + data.len() as u64;

                    doc.define(id, Object::Stream(Stream::new(header.dict, data)));

                    pos = match reader.parse_at(end, |p| {
                        while !p.next_token()?.is_keyword(b"endobj") {}

                        Ok(p.lexer().absolute_position())
                    }) {
                        Ok(Some(next)) => next,
                        _ => break,
                    };
                }
                Step::Trailer(trailer) => {
                    match trailer.as_dict().and_then(|t| t.get(ROOT)) {
                        Some(Object::Reference(id)) => doc.root = Some(id.num),
                        Some(Object::Dict(root)) => {
                            let id = doc.insert(Object::Dict(root.clone()));
                            doc.root = Some(id.num);
                        }
                        _ => warn!("FDF trailer has no root"),
                    }

                    break;
                }
            }
        }

        if doc.root().is_none() {
            return Err(Error::Structure("FDF file has no root dictionary"));
        }

        Ok(doc)
    }

    /// Keep the definition with the higher generation.
    fn define(&mut self, id: ObjectIdentifier, object: Object) {
        if id.num == 0 {
            return;
        }

        match self.objects.get(&id.num) {
            Some((generation, _)) if *generation > id.generation => {}
            _ => {
                self.objects.insert(id.num, (id.generation, object));
            }
        }
    }

    /// The root dictionary.
    pub fn root(&self) -> Option<&Dict> {
        self.get(self.root?)?.as_dict()
    }

    /// The `FDF` dictionary of the root.
    pub fn fdf(&self) -> Option<&Dict> {
        self.root()?.get_dict(FDF)
    }

    /// The object with number `num`.
    pub fn get(&self, num: u32) -> Option<&Object> {
        self.objects.get(&num).map(|(_, object)| object)
    }

    /// Add an object under the next free object number.
    pub fn insert(&mut self, object: Object) -> ObjectIdentifier {
        let num = self.objects.keys().next_back().map_or(1, |last| last + 1);
        self.objects.insert(num, (0, object));

        ObjectIdentifier::new(num, 0)
    }

    /// All objects, sorted by object number.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectIdentifier, &Object)> {
        self.objects
            .iter()
            .map(|(num, (generation, object))| (ObjectIdentifier::new(*num, *generation), object))
    }

    /// Serialize the document. Returns an empty buffer if there is no root.
    pub fn to_bytes(&self) -> Vec<u8> {
        let Some(root) = self.root.filter(|_| self.root().is_some()) else {
            return Vec::new();
        };

        let mut out = b"%FDF-1.2\r\n".to_vec();

        for (num, (_, object)) in &self.objects {
            out.extend_from_slice(format!("{num} 0 obj\r\n").as_bytes());
            object.write_to(&mut out);
            out.extend_from_slice(b"\r\nendobj\r\n\r\n");
        }

        out.extend_from_slice(format!("trailer\r\n<</Root {root} 0 R>>\r\n%%EOF\r\n").as_bytes());

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::PdfString;

    #[test]
    fn new_document() {
        let doc = FdfDocument::new();

        assert!(doc.fdf().is_some_and(Dict::is_empty));
        assert_eq!(
            doc.to_bytes(),
            b"%FDF-1.2\r\n1 0 obj\r\n<</FDF <<>>>>\r\nendobj\r\n\r\ntrailer\r\n<</Root 1 0 R>>\r\n%%EOF\r\n"
        );
    }

    #[test]
    fn parse_objects_and_trailer() {
        let data = b"%FDF-1.2
1 0 obj
<</FDF <</Fields [2 0 R] /F (form.pdf)>>>>
endobj
2 0 obj
<</T (name) /V (John)>>
endobj
2 1 obj
<</T (name) /V (Jane)>>
endobj
trailer
<</Root 1 0 R>>
%%EOF";

        let doc = FdfDocument::parse(&data[..]).unwrap();

        assert_eq!(doc.objects().count(), 2);
        assert_eq!(
            doc.fdf().and_then(|fdf| fdf.get_string(b"F")),
            Some(&PdfString::new(b"form.pdf".to_vec()))
        );
        let field = doc.get(2).and_then(Object::as_dict).unwrap();
        assert_eq!(field.get_string(b"V").map(PdfString::to_text), Some("Jane".into()));
    }

    #[test]
    fn lower_generation_does_not_replace() {
        let data = b"3 2 obj <</A 1>> endobj 3 1 obj <</A 2>> endobj trailer <</Root 3 0 R>>";
        let doc = FdfDocument::parse(&data[..]).unwrap();

        assert_eq!(doc.root().and_then(|root| root.get_i64(b"A")), Some(1));
    }

    #[test]
    fn stops_at_garbage() {
        let data = b"1 0 obj <</FDF <<>>>> endobj garbage trailer <</Root 1 0 R>>";

        assert!(FdfDocument::parse(&data[..]).is_err());
    }

    #[test]
    fn streams() {
        let data = b"1 0 obj <</FDF <</Data 2 0 R>>>> endobj
2 0 obj <</Length 5>> stream
hello
endstream
endobj
trailer <</Root 1 0 R>>";
        let doc = FdfDocument::parse(&data[..]).unwrap();

        let stream = doc.get(2).and_then(Object::as_stream).unwrap();
        assert_eq!(stream.raw_data(), &b"hello"[..]);
        assert!(doc.root().is_some());
    }

    #[test]
    fn round_trip() {
        let mut doc = FdfDocument::new();
        let field = doc.insert(Object::string(b"value".to_vec()));

        let bytes = doc.to_bytes();
        let parsed = FdfDocument::parse(bytes).unwrap();

        assert_eq!(parsed.get(field.num), Some(&Object::string(b"value".to_vec())));
        assert_eq!(parsed.fdf(), doc.fdf());
    }
}
