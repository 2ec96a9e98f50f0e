//! Opening documents.

use crate::config::Settings;
use crate::crypto::{Credential, SecurityHandler};
use crate::document::{Document, Version};
use crate::error::{EncryptionError, Error, Result};
use crate::object::keys::{CATALOG, ENCRYPT, ID, PAGES, ROOT, SIZE, VERSION};
use crate::object::{Dict, Object, ObjectIdentifier};
use crate::reader::SourceReader;
use crate::source::ByteSource;
use crate::util::OptionLog;
use crate::xref::objstm::ObjectStream;
use crate::xref::recovery::{self, Scan};
use crate::xref::{self, XRefEntry, XRefTable, is_fatal};
use log::{debug, warn};
use memchr::memmem;
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};

/// How far into the file the `%PDF-` header is searched.
const HEADER_WINDOW: usize = 1024;

impl Document {
    /// Open a document with the default settings.
    ///
    /// Without a credential, the empty user password is tried for encrypted
    /// documents.
    pub fn open(
        source: impl ByteSource + 'static,
        credential: Option<&Credential>,
    ) -> Result<Self> {
        Self::open_with_settings(source, credential, Settings::default())
    }

    /// Open a document.
    ///
    /// If this returns [`Error::NeedMoreData`], the call can be repeated with
    /// another handle to the same source once the range was supplied.
    pub fn open_with_settings(
        source: impl ByteSource + 'static,
        credential: Option<&Credential>,
        settings: Settings,
    ) -> Result<Self> {
        let mut doc = Self {
            source: Box::new(source),
            decode_settings: settings.decode_settings(),
            settings,
            table: RefCell::new(XRefTable::default()),
            trailer: Dict::new(),
            security: None,
            encrypt_ref: None,
            cache: RefCell::new(FxHashMap::default()),
            object_streams: RefCell::new(FxHashMap::default()),
            malformed: Cell::new(0),
            recovered: Cell::new(false),
            version: Version::default(),
            pages: RefCell::new(None),
        };

        doc.version = header_version(&doc.reader())?;

        let loaded = xref::load(&doc.reader());

        match loaded {
            Ok(xref) => {
                *doc.table.borrow_mut() = xref.table;
                doc.trailer = xref.trailer;
                doc.setup_security(credential)?;

                if !doc.has_catalog()? {
                    warn!("trailer does not point to a catalog, scanning the file");

                    doc.recover(credential)?;
                }
            }
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                warn!("{e}, scanning the file");

                doc.recover(credential)?;
            }
        }

        doc.apply_catalog_version()?;

        debug!(
            "opened document with {} objects (version {}, recovered: {})",
            doc.table.borrow().len(),
            doc.version,
            doc.recovered.get()
        );

        Ok(doc)
    }

    fn setup_security(&mut self, credential: Option<&Credential>) -> Result<()> {
        let Some(encrypt) = self.trailer.get(ENCRYPT).cloned() else {
            return Ok(());
        };

        let (encrypt_ref, dict) = match encrypt {
            Object::Reference(id) => (Some(id), self.get_object(id)?.as_dict().cloned()),
            Object::Dict(dict) => (None, Some(dict)),
            _ => (None, None),
        };

        let dict = dict.ok_or(EncryptionError::Malformed("missing encryption dictionary"))?;
        let id = self
            .trailer
            .get_array(ID)
            .and_then(|ids| ids.first())
            .and_then(Object::as_string)
            .map(|id| id.as_bytes().to_vec())
            .unwrap_or_default();

        let security =
            SecurityHandler::new(&dict, &id, credential, self.settings.strict_credentials)?;

        self.security = Some(security);
        self.encrypt_ref = encrypt_ref;
        // Anything loaded so far was read without decryption.
        self.clear_caches();

        Ok(())
    }

    fn has_catalog(&self) -> Result<bool> {
        Ok(self
            .catalog()?
            .as_dict()
            .is_some_and(|catalog| catalog.contains_key(PAGES)))
    }

    /// Rebuild the table and the trailer from a scan of the whole file.
    fn recover(&mut self, credential: Option<&Credential>) -> Result<()> {
        let scan = recovery::scan(&self.reader())?;
        self.recovered.set(true);
        *self.table.borrow_mut() = scan.table.clone();
        self.clear_caches();

        if self.security.is_none()
            && let Some(trailer) = scan.trailers.iter().rev().find(|t| t.contains_key(ENCRYPT))
        {
            self.trailer = trailer.clone();
            self.setup_security(credential)?;
        }

        self.index_object_streams(&scan)?;
        self.trailer = self.choose_trailer(&scan)?;

        Ok(())
    }

    /// Add the members of object streams to the table. A member that is also
    /// stored in the file before its object stream is an older revision.
    fn index_object_streams(&self, scan: &Scan) -> Result<()> {
        for id in &scan.object_streams {
            let Some(XRefEntry::InFile { offset: stream_offset, .. }) = scan.table.get(id.num)
            else {
                continue;
            };

            let members = match self.get_object(*id)?.as_stream() {
                Some(stream) => match ObjectStream::new(stream, &self.decode_settings) {
                    Ok(objstm) => objstm.members().collect::<Vec<_>>(),
                    Err(e) if is_fatal(&e) => return Err(e),
                    Err(e) => {
                        warn!("skipping broken object stream {id}: {e}");

                        continue;
                    }
                },
                None => continue,
            };

            let mut table = self.table.borrow_mut();

            for (index, num) in members.into_iter().enumerate() {
                let replace = match table.get(num) {
                    None => true,
                    Some(XRefEntry::InFile { offset, .. }) => offset < stream_offset,
                    Some(_) => false,
                };

                if replace && num != id.num {
                    table.set(
                        num,
                        XRefEntry::Compressed {
                            stream: id.num,
                            index: index as u32,
                        },
                    );
                }
            }
        }

        self.clear_caches();

        Ok(())
    }

    fn choose_trailer(&self, scan: &Scan) -> Result<Dict> {
        let encryption = self.security.as_ref().and_then(|_| {
            scan.trailers
                .iter()
                .rev()
                .find(|t| t.contains_key(ENCRYPT))
                .or(Some(&self.trailer))
        });

        for trailer in scan.trailers.iter().rev() {
            if let Some(root) = trailer.get(ROOT)
                && self.is_catalog(root)?
            {
                return Ok(trailer.clone());
            }
        }

        let catalog = match self.find_catalog(scan)? {
            Some(id) => id,
            None => return Err(Error::Structure("no document catalog was found")),
        };

        warn!("no usable trailer, using the catalog {catalog}");

        let mut trailer = Dict::new();
        trailer.insert(ROOT, Object::Reference(catalog));
        trailer.insert(SIZE, Object::integer(i64::from(self.table.borrow().max_num()) + 1));

        if let Some(encryption) = encryption {
            for key in [ENCRYPT, ID] {
                if let Some(value) = encryption.get(key) {
                    trailer.insert(key, value.clone());
                }
            }
        }

        Ok(trailer)
    }

    fn is_catalog(&self, root: &Object) -> Result<bool> {
        Ok(self
            .resolve(root)?
            .as_dict()
            .is_some_and(|dict| dict.contains_key(PAGES)))
    }

    /// The last object that looks like a catalog. Catalogs inside object
    /// streams are not visible to the scan, so all objects are tried if the
    /// scan found none.
    fn find_catalog(&self, scan: &Scan) -> Result<Option<ObjectIdentifier>> {
        for id in scan.catalogs.iter().rev() {
            if self.is_catalog(&Object::Reference(*id))? {
                return Ok(Some(*id));
            }
        }

        for id in self.object_ids().into_iter().rev() {
            let object = self.get_object(id)?;

            if object
                .as_dict()
                .is_some_and(|dict| dict.has_type(CATALOG) && dict.contains_key(PAGES))
            {
                return Ok(Some(id));
            }
        }

        Ok(None)
    }

    fn apply_catalog_version(&mut self) -> Result<()> {
        let catalog = self.catalog()?;
        let declared = catalog
            .as_dict()
            .and_then(|catalog| catalog.get_name(VERSION))
            .and_then(|name| Version::parse(name.as_bytes()));

        if let Some(declared) = declared
            && declared > self.version
        {
            self.version = declared;
        }

        Ok(())
    }
}

fn header_version(reader: &SourceReader<'_>) -> Result<Version> {
    let head = reader.fetch(0, HEADER_WINDOW)?;

    Ok(memmem::find(&head, b"%PDF-")
        .and_then(|pos| Version::parse(&head[pos + 5..]))
        .warn_none("missing or invalid PDF header")
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::keys::CATALOG as CATALOG_TYPE;
    use crate::source::MemorySource;
    use crate::xref::tests::layout;

    fn open(data: Vec<u8>) -> Result<Document> {
        Document::open(MemorySource::new(data), None)
    }

    const CATALOG: &str = "1 0 obj\n<</Type /Catalog /Pages 2 0 R>>\nendobj\n";
    const PAGES: &str = "2 0 obj\n<</Type /Pages /Kids [] /Count 0>>\nendobj\n";

    #[test]
    fn well_formed() {
        let data = layout(&[
            "%PDF-1.4\n",
            CATALOG,
            PAGES,
            "xref\n0 3\n0000000000 65535 f \n{1} 00000 n \n{2} 00000 n \ntrailer\n<</Size 3 /Root 1 0 R>>\nstartxref\n{3}\n%%EOF\n",
        ]);

        let doc = open(data).unwrap();
        assert!(!doc.was_recovered());
        assert_eq!(doc.version(), Version::new(1, 4));
        assert_eq!(doc.object_ids().len(), 2);
        assert!(doc.catalog().unwrap().as_dict().unwrap().has_type(CATALOG_TYPE));
    }

    #[test]
    fn missing_xref_is_recovered() {
        let data = format!("%PDF-1.7\n{CATALOG}{PAGES}trailer\n<</Root 1 0 R>>\n%%EOF").into_bytes();

        let doc = open(data).unwrap();
        assert!(doc.was_recovered());
        assert_eq!(doc.trailer().get(ROOT), Some(&Object::reference(1, 0)));
    }

    #[test]
    fn catalog_without_trailer() {
        let data = format!("%PDF-1.7\n{CATALOG}{PAGES}").into_bytes();

        let doc = open(data).unwrap();
        assert_eq!(doc.trailer().get(ROOT), Some(&Object::reference(1, 0)));
        assert_eq!(doc.trailer().get_i64(SIZE), Some(3));
    }

    #[test]
    fn catalog_version_overrides_header() {
        let data = "%PDF-1.4\n1 0 obj\n<</Type/Catalog/Pages 2 0 R/Version/1.7>>\nendobj\n2 0 obj\n<</Type/Pages/Kids[]/Count 0>>\nendobj\n"
            .as_bytes()
            .to_vec();

        let doc = open(data).unwrap();
        assert_eq!(doc.version(), Version::new(1, 7));
    }

    #[test]
    fn nothing_to_recover() {
        assert!(matches!(
            open(b"%PDF-1.7\n%%EOF".to_vec()),
            Err(Error::Structure(_))
        ));
        assert!(matches!(open(Vec::new()), Err(Error::Structure(_))));
    }
}
