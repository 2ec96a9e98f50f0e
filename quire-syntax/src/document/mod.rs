//! Documents and the resolution of indirect objects.

use crate::config::{DecodeSettings, Settings};
use crate::crypto::{Access, Permissions, SecurityHandler, Target};
use crate::error::{Error, Limit, Result};
use crate::object::keys::{
    DECODE_PARMS, FILTER, INFO, JBIG2_GLOBALS, LENGTH, METADATA, ROOT, XREF,
};
use crate::object::{Dict, Object, ObjectIdentifier, Stream};
use crate::parser::{Body, StreamHeader};
use crate::reader::SourceReader;
use crate::source::ByteSource;
use crate::xref::objstm::ObjectStream;
use crate::xref::{XRefEntry, XRefTable, is_fatal, recovery};
use log::{debug, trace, warn};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::ops::Deref;
use std::sync::Arc;

mod linearized;
mod metadata;
mod open;
mod page;

pub use linearized::{HintTables, Linearized, PageHint, PagePosition, SharedGroup};
pub use metadata::{Metadata, Version};
pub use page::Page;

/// The object numbers on the current resolution path.
type Visited = SmallVec<[u32; 16]>;

/// A PDF document.
///
/// Objects are parsed when they are first requested and cached for the
/// lifetime of the document. The cache is not synchronized, so a document
/// cannot be shared between threads. The resolved objects themselves can.
pub struct Document {
    source: Box<dyn ByteSource>,
    settings: Settings,
    decode_settings: DecodeSettings,
    table: RefCell<XRefTable>,
    trailer: Dict,
    security: Option<SecurityHandler>,
    /// The encryption dictionary, which is never encrypted itself.
    encrypt_ref: Option<ObjectIdentifier>,
    /// `None` marks objects that failed to load.
    cache: RefCell<FxHashMap<ObjectIdentifier, Option<Arc<Object>>>>,
    object_streams: RefCell<FxHashMap<u32, Arc<ObjectStream>>>,
    malformed: Cell<usize>,
    /// Whether the table was rebuilt from a scan of the file.
    recovered: Cell<bool>,
    version: Version,
    pages: RefCell<Option<Arc<[Page]>>>,
}

/// An object that was resolved from a possible reference.
#[derive(Debug, Clone)]
pub enum Resolved<'a> {
    /// The object was direct.
    Direct(&'a Object),
    /// The object was loaded from the document.
    Indirect(Arc<Object>),
}

impl Deref for Resolved<'_> {
    type Target = Object;

    fn deref(&self) -> &Object {
        match self {
            Self::Direct(object) => object,
            Self::Indirect(object) => object,
        }
    }
}

impl Document {
    fn reader(&self) -> SourceReader<'_> {
        SourceReader::new(self.source.as_ref(), &self.settings)
    }

    /// The settings the document was opened with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The trailer dictionary.
    ///
    /// For files with incremental updates, this is the newest trailer with
    /// the keys that only older trailers define merged in.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// The PDF version, from the header or the catalog if that is newer.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Whether the document is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.security.is_some()
    }

    /// The permissions of an encrypted document. Documents that were opened
    /// with the owner password have all permissions.
    pub fn permissions(&self) -> Option<Permissions> {
        self.security.as_ref().map(SecurityHandler::permissions)
    }

    /// Whether the document was opened with its owner password.
    pub fn is_owner(&self) -> bool {
        self.security
            .as_ref()
            .is_some_and(|s| s.access() == Access::Owner)
    }

    /// Whether the cross-reference table had to be rebuilt by scanning the
    /// file.
    pub fn was_recovered(&self) -> bool {
        self.recovered.get()
    }

    /// The number of objects that failed to load so far.
    pub fn malformed_objects(&self) -> usize {
        self.malformed.get()
    }

    /// The identifiers of all objects in the cross-reference table, sorted by
    /// object number.
    pub fn object_ids(&self) -> Vec<ObjectIdentifier> {
        self.table.borrow().live_ids()
    }

    /// Load an indirect object.
    ///
    /// Objects that do not exist or cannot be parsed are returned as null.
    /// Errors are only returned for missing data, cancellation and exceeded
    /// resource limits.
    pub fn get_object(&self, id: ObjectIdentifier) -> Result<Arc<Object>> {
        match self.try_get_object(id) {
            Err(Error::Reference { .. }) => Ok(Arc::new(Object::Null)),
            result => result,
        }
    }

    /// Like [`Document::get_object`], but returns [`Error::Reference`] for
    /// objects that cannot be loaded.
    pub fn try_get_object(&self, id: ObjectIdentifier) -> Result<Arc<Object>> {
        let mut visited = Visited::new();

        self.load(id, &mut visited)?.ok_or(Error::Reference { id })
    }

    /// Parse the indirect object at `offset`, bypassing the cross-reference
    /// table.
    pub(crate) fn object_at(&self, offset: u64) -> Result<Option<Object>> {
        let reader = self.reader();
        let Some((id, body)) = reader.parse_at(offset, |p| p.parse_indirect())? else {
            return Ok(None);
        };

        match body {
            Body::Object(object) => Ok(Some(object)),
            Body::Stream(header) => {
                let mut visited = Visited::new();

                self.read_stream(id, header, &reader, &mut visited)
                    .map(|stream| Some(Object::Stream(stream)))
            }
        }
    }

    /// Whether `len` bytes at `offset` can be read from the source.
    pub(crate) fn is_range_available(&self, offset: u64, len: u64) -> bool {
        let len = len.min(self.source.size().saturating_sub(offset));

        self.source.available_from(offset) >= len
    }

    /// Follow `object` if it is a reference.
    pub fn resolve<'a>(&self, object: &'a Object) -> Result<Resolved<'a>> {
        match object {
            Object::Reference(id) => self.get_object(*id).map(Resolved::Indirect),
            object => Ok(Resolved::Direct(object)),
        }
    }

    /// Replace every reference reachable from `object` by the object it
    /// points to.
    ///
    /// A reference back to an object that is already being inlined becomes
    /// null.
    pub fn resolve_deep(&self, object: &Object) -> Result<Object> {
        self.inline_all(object, &mut SmallVec::<[ObjectIdentifier; 16]>::new())
    }

    fn inline_all(
        &self,
        object: &Object,
        path: &mut SmallVec<[ObjectIdentifier; 16]>,
    ) -> Result<Object> {
        match object {
            Object::Reference(id) => {
                if path.contains(id) {
                    trace!("reference cycle at object {id}");

                    return Ok(Object::Null);
                }

                if path.len() >= self.settings.max_reference_depth {
                    return Err(Error::ResourceLimit(Limit::ReferenceDepth));
                }

                let target = self.get_object(*id)?;
                path.push(*id);
                let inlined = self.inline_all(&target, path);
                path.pop();

                inlined
            }
            Object::Array(items) => Ok(Object::Array(
                items
                    .iter()
                    .map(|item| self.inline_all(item, path))
                    .collect::<Result<_>>()?,
            )),
            Object::Dict(dict) => Ok(Object::Dict(self.inline_dict(dict, path)?)),
            Object::Stream(stream) => Ok(Object::Stream(Stream::new(
                self.inline_dict(stream.dict(), path)?,
                stream.raw_data().clone(),
            ))),
            object => Ok(object.clone()),
        }
    }

    fn inline_dict(
        &self,
        dict: &Dict,
        path: &mut SmallVec<[ObjectIdentifier; 16]>,
    ) -> Result<Dict> {
        let mut inlined = Dict::new();

        for (key, value) in dict.iter() {
            inlined.insert(key.clone(), self.inline_all(value, path)?);
        }

        Ok(inlined)
    }

    /// The document catalog.
    pub fn catalog(&self) -> Result<Arc<Object>> {
        match self.trailer.get(ROOT) {
            Some(Object::Reference(id)) => self.get_object(*id),
            Some(object @ Object::Dict(_)) => Ok(Arc::new(object.clone())),
            _ => Ok(Arc::new(Object::Null)),
        }
    }

    /// The document information dictionary.
    pub fn metadata(&self) -> Result<Metadata> {
        let Some(info) = self.trailer.get(INFO) else {
            return Ok(Metadata::default());
        };

        match self.resolve(info)?.as_dict() {
            Some(dict) => Metadata::from_dict(self, dict),
            None => Ok(Metadata::default()),
        }
    }

    /// The pages in the order of the page tree.
    pub fn pages(&self) -> Result<Arc<[Page]>> {
        if let Some(pages) = self.pages.borrow().as_ref() {
            return Ok(pages.clone());
        }

        let pages: Arc<[Page]> = page::collect(self)?.into();
        *self.pages.borrow_mut() = Some(pages.clone());

        Ok(pages)
    }

    /// The number of pages.
    pub fn page_count(&self) -> Result<usize> {
        Ok(self.pages()?.len())
    }

    /// The page at `index`, with inherited attributes filled in.
    pub fn page(&self, index: usize) -> Result<Option<Page>> {
        Ok(self.pages()?.get(index).cloned())
    }

    fn load(
        &self,
        id: ObjectIdentifier,
        visited: &mut Visited,
    ) -> Result<Option<Arc<Object>>> {
        if let Some(cached) = self.cache.borrow().get(&id) {
            return Ok(cached.clone());
        }

        if visited.contains(&id.num) {
            debug!("object {id} refers to itself while loading");

            return Ok(None);
        }

        if visited.len() >= self.settings.max_reference_depth {
            return Err(Error::ResourceLimit(Limit::ReferenceDepth));
        }

        visited.push(id.num);
        let result = self.read_object(id, visited);
        visited.pop();

        let object = match result {
            Ok(object) => Some(Arc::new(object)),
            Err(e) if is_fatal(&e) => return Err(e),
            Err(Error::Reference { .. }) => None,
            Err(e) => {
                warn!("failed to load object {id}: {e}");
                self.note_malformed()?;

                None
            }
        };

        self.cache.borrow_mut().insert(id, object.clone());

        Ok(object)
    }

    fn note_malformed(&self) -> Result<()> {
        let count = self.malformed.get() + 1;
        self.malformed.set(count);

        match self.settings.max_malformed_objects {
            Some(max) if count > max => Err(Error::ResourceLimit(Limit::MalformedObjects)),
            _ => Ok(()),
        }
    }

    fn read_object(&self, id: ObjectIdentifier, visited: &mut Visited) -> Result<Object> {
        let entry = self.table.borrow().get(id.num);

        match entry {
            Some(XRefEntry::InFile { offset, generation }) if generation == id.generation => {
                match self.read_in_file(id, offset, visited) {
                    Err(e) if !is_fatal(&e) && self.heal()? => {
                        let healed = self.table.borrow().get(id.num);

                        match healed {
                            Some(XRefEntry::InFile {
                                offset: moved,
                                generation,
                            }) if moved != offset && generation == id.generation => {
                                debug!("object {id} moved from offset {offset} to {moved}");

                                self.read_in_file(id, moved, visited)
                            }
                            _ => Err(e),
                        }
                    }
                    result => result,
                }
            }
            Some(XRefEntry::Compressed { stream, index }) if id.generation == 0 => {
                let objstm = self.object_stream(stream, visited)?;

                objstm
                    .get(id.num, index, self.settings.max_nesting_depth)?
                    .ok_or(Error::Reference { id })
            }
            _ => Err(Error::Reference { id }),
        }
    }

    fn read_in_file(
        &self,
        id: ObjectIdentifier,
        offset: u64,
        visited: &mut Visited,
    ) -> Result<Object> {
        let reader = self.reader();
        let (found, body) = reader
            .parse_at(offset, |p| p.parse_indirect())?
            .ok_or(Error::Structure("object offset is past the end of the file"))?;

        if found != id {
            return Err(Error::Syntax {
                offset,
                message: "object header does not match the cross-reference entry",
            });
        }

        match body {
            Body::Object(mut object) => {
                if let Some(security) = self.decryption_for(id) {
                    decrypt_strings(security, id, &mut object);
                }

                Ok(object)
            }
            Body::Stream(header) => self
                .read_stream(id, header, &reader, visited)
                .map(Object::Stream),
        }
    }

    fn read_stream(
        &self,
        id: ObjectIdentifier,
        header: StreamHeader,
        reader: &SourceReader<'_>,
        visited: &mut Visited,
    ) -> Result<Stream> {
        let declared = match header.dict.get(LENGTH) {
            Some(Object::Reference(length)) => self
                .load(*length, visited)?
                .and_then(|length| length.as_i64()),
            Some(length) => length.as_i64(),
            None => None,
        };
        let declared = declared.and_then(|len| u64::try_from(len).ok());
        let data = reader.read_stream_data(&header, declared)?;

        let mut dict = header.dict;
        self.inline_filter_entries(&mut dict, visited)?;

        let data = match self.decryption_for(id) {
            Some(security) if !self.is_exempt_stream(&dict, security) => {
                decrypt_strings_in_dict(security, id, &mut dict);

                security.decrypt_with(id, &data, security.stream_method(&dict)).into()
            }
            _ => data,
        };

        Ok(Stream::new(dict, data))
    }

    /// The filter pipeline only looks at direct objects.
    fn inline_filter_entries(&self, dict: &mut Dict, visited: &mut Visited) -> Result<()> {
        let inline = |value: &mut Object, visited: &mut Visited| -> Result<()> {
            if let Object::Reference(id) = value {
                let id = *id;
                *value = self
                    .load(id, visited)?
                    .map(|object| (*object).clone())
                    .unwrap_or(Object::Null);
            }

            Ok(())
        };

        for key in [FILTER, DECODE_PARMS] {
            if let Some(value) = dict.get_mut(key) {
                inline(value, visited)?;
            }
        }

        let params: Vec<&mut Object> = match dict.get_mut(DECODE_PARMS) {
            Some(Object::Array(params)) => params.iter_mut().collect(),
            Some(params) => vec![params],
            None => Vec::new(),
        };

        for params in params {
            inline(params, visited)?;

            if let Object::Dict(params) = params
                && let Some(globals) = params.get_mut(JBIG2_GLOBALS)
            {
                inline(globals, visited)?;
            }
        }

        Ok(())
    }

    fn decryption_for(&self, id: ObjectIdentifier) -> Option<&SecurityHandler> {
        self.security
            .as_ref()
            .filter(|_| self.encrypt_ref != Some(id))
    }

    fn is_exempt_stream(&self, dict: &Dict, security: &SecurityHandler) -> bool {
        dict.has_type(XREF) || (dict.has_type(METADATA) && !security.encrypt_metadata())
    }

    fn object_stream(&self, num: u32, visited: &mut Visited) -> Result<Arc<ObjectStream>> {
        if let Some(objstm) = self.object_streams.borrow().get(&num) {
            return Ok(objstm.clone());
        }

        let entry = self.table.borrow().get(num);
        let Some(XRefEntry::InFile { generation, .. }) = entry else {
            return Err(Error::Structure("object stream is not stored in the file"));
        };

        let id = ObjectIdentifier::new(num, generation);
        let object = self.load(id, visited)?.ok_or(Error::Reference { id })?;
        let stream = object
            .as_stream()
            .ok_or(Error::Structure("object stream is not a stream"))?;
        let objstm = Arc::new(ObjectStream::new(stream, &self.decode_settings)?);

        trace!("indexed object stream {id} with {} members", objstm.members().count());
        self.object_streams.borrow_mut().insert(num, objstm.clone());

        Ok(objstm)
    }

    /// Rebuild the table after an entry pointed to the wrong place.
    ///
    /// Runs at most once per document. Returns whether the table changed.
    fn heal(&self) -> Result<bool> {
        if self.recovered.get() {
            return Ok(false);
        }

        warn!("cross-reference offsets are inconsistent, scanning the file");

        let scan = recovery::scan(&self.reader())?;
        self.recovered.set(true);

        let mut table = self.table.borrow_mut();

        for (num, entry) in scan.table.entries() {
            match table.get(num) {
                None | Some(XRefEntry::InFile { .. }) => table.set(num, entry),
                Some(_) => {}
            }
        }

        self.cache.borrow_mut().retain(|_, object| object.is_some());

        Ok(true)
    }

    fn clear_caches(&self) {
        self.cache.borrow_mut().clear();
        self.object_streams.borrow_mut().clear();
        *self.pages.borrow_mut() = None;
    }
}

fn decrypt_strings(security: &SecurityHandler, id: ObjectIdentifier, object: &mut Object) {
    match object {
        Object::String(string) => {
            let decrypted = security.decrypt(id, string.as_bytes(), Target::String);
            string.set_bytes(decrypted);
        }
        Object::Array(items) => {
            for item in items {
                decrypt_strings(security, id, item);
            }
        }
        Object::Dict(dict) => decrypt_strings_in_dict(security, id, dict),
        _ => {}
    }
}

fn decrypt_strings_in_dict(security: &SecurityHandler, id: ObjectIdentifier, dict: &mut Dict) {
    for value in dict.values_mut() {
        decrypt_strings(security, id, value);
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("version", &self.version)
            .field("objects", &self.table.borrow().len())
            .field("encrypted", &self.is_encrypted())
            .field("recovered", &self.recovered.get())
            .finish_non_exhaustive()
    }
}
