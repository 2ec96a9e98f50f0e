//! Checking whether objects can be loaded from a partially available file.

use crate::document::{Document, HintTables, Linearized};
use crate::error::{Error, Result};
use crate::object::keys::PARENT;
use crate::object::{Dict, Object, ObjectIdentifier};
use log::trace;
use rustc_hash::FxHashSet;

type Exclude = Box<dyn Fn(&Object) -> bool>;

/// Tracks whether an object and everything it references is available.
///
/// The walk starts at a root object and follows all references, except
/// `Parent` back-links. References to objects that do not exist are
/// ignored. When data is missing, [`ObjectAvailability::check`] returns
/// `false` and keeps its progress, so it can be called again once more data
/// arrived.
pub struct ObjectAvailability {
    /// Objects that still have to be loaded, and whether they are the root.
    pending: Vec<(ObjectIdentifier, bool)>,
    seen: FxHashSet<ObjectIdentifier>,
    exclude: Option<Exclude>,
}

impl ObjectAvailability {
    /// Check `root` and everything it references.
    pub fn new(root: &Object) -> Self {
        let mut avail = Self {
            pending: Vec::new(),
            seen: FxHashSet::default(),
            exclude: None,
        };

        match root {
            Object::Reference(id) => {
                avail.seen.insert(*id);
                avail.pending.push((*id, true));
            }
            root => avail.push_references(root),
        }

        avail
    }

    /// Skip objects for which `exclude` returns `true`, along with everything
    /// only they reference.
    ///
    /// The predicate sees the object with its direct entries resolved. The
    /// root is never excluded.
    pub fn with_exclusion(root: &Object, exclude: impl Fn(&Object) -> bool + 'static) -> Self {
        Self {
            exclude: Some(Box::new(exclude)),
            ..Self::new(root)
        }
    }

    /// Whether every tracked object can be loaded.
    ///
    /// Errors other than missing data are returned as is.
    pub fn check(&mut self, doc: &Document) -> Result<bool> {
        while let Some(&(id, is_root)) = self.pending.last() {
            let object = match doc.get_object(id) {
                Ok(object) => object,
                Err(Error::NeedMoreData { offset, len }) => {
                    trace!("object {id} needs {len} bytes at offset {offset}");

                    return Ok(false);
                }
                Err(e) => return Err(e),
            };

            if !is_root && let Some(exclude) = &self.exclude {
                let shallow = match shallow_resolve(doc, &object) {
                    Ok(shallow) => shallow,
                    Err(Error::NeedMoreData { .. }) => return Ok(false),
                    Err(e) => return Err(e),
                };

                if exclude(&shallow) {
                    trace!("excluding object {id}");
                    self.pending.pop();

                    continue;
                }
            }

            self.pending.pop();

            match &*object {
                // A root that is only a reference passes its role on.
                Object::Reference(target) if is_root => {
                    if self.seen.insert(*target) {
                        self.pending.push((*target, true));
                    }
                }
                object => self.push_references(object),
            }
        }

        Ok(true)
    }

    fn push_references(&mut self, object: &Object) {
        match object {
            Object::Reference(id) => {
                if self.seen.insert(*id) {
                    self.pending.push((*id, false));
                }
            }
            Object::Array(items) => {
                for item in items {
                    self.push_references(item);
                }
            }
            Object::Dict(dict) => self.push_dict_references(dict),
            Object::Stream(stream) => self.push_dict_references(stream.dict()),
            _ => {}
        }
    }

    fn push_dict_references(&mut self, dict: &Dict) {
        for (key, value) in dict.iter() {
            if key.as_bytes() != PARENT {
                self.push_references(value);
            }
        }
    }
}

/// A copy of `object` in which the direct entries of a dictionary or array
/// are resolved.
fn shallow_resolve(doc: &Document, object: &Object) -> Result<Object> {
    let resolve = |value: &Object| -> Result<Object> {
        match value {
            Object::Reference(id) => Ok((*doc.get_object(*id)?).clone()),
            value => Ok(value.clone()),
        }
    };

    match object {
        Object::Dict(dict) => {
            let mut shallow = Dict::new();

            for (key, value) in dict.iter() {
                let value = if key.as_bytes() == PARENT {
                    value.clone()
                } else {
                    resolve(value)?
                };

                shallow.insert(key.clone(), value);
            }

            Ok(Object::Dict(shallow))
        }
        Object::Array(items) => Ok(Object::Array(
            items.iter().map(resolve).collect::<Result<_>>()?,
        )),
        object => Ok(object.clone()),
    }
}

/// Tracks whether the pages of a linearized file have arrived.
///
/// The first page is available once the file up to the end of the first
/// page is. Other pages need the byte ranges that the hint tables give for
/// their objects and for the shared object groups they use. Without hint
/// tables, they are available once the whole file is.
#[derive(Debug, Clone)]
pub struct PageAvailability {
    linearized: Linearized,
    hints: Option<HintTables>,
}

impl PageAvailability {
    /// Read the linearization dictionary and the hint tables of `doc`.
    ///
    /// Returns `None` if the file is not linearized.
    pub fn new(doc: &Document) -> Result<Option<Self>> {
        let Some(linearized) = doc.linearized()? else {
            return Ok(None);
        };

        let hints = doc.hint_tables(&linearized)?;

        Ok(Some(Self { linearized, hints }))
    }

    /// The linearization dictionary.
    pub fn linearized(&self) -> &Linearized {
        &self.linearized
    }

    /// The hint tables, if the file has usable ones.
    pub fn hint_tables(&self) -> Option<&HintTables> {
        self.hints.as_ref()
    }

    /// Whether every byte of the page at `index` can be read.
    ///
    /// Pages past the linearized page count and pages that the hint tables
    /// give no data for are structure errors.
    pub fn check(&self, doc: &Document, index: usize) -> Result<bool> {
        if index >= self.linearized.page_count() as usize {
            return Err(Error::Structure("page index past the linearized page count"));
        }

        if index == self.linearized.first_page() as usize {
            return Ok(doc.is_range_available(0, self.linearized.first_page_end()));
        }

        let Some(hints) = &self.hints else {
            return Ok(doc.is_range_available(0, self.linearized.file_size()));
        };

        let page = &hints.pages()[index];
        if page.position.length == 0 {
            return Err(Error::Structure("page has no data in the hint tables"));
        }

        if !doc.is_range_available(page.position.offset, page.position.length) {
            trace!(
                "page {index} needs {} bytes at offset {}",
                page.position.length, page.position.offset
            );

            return Ok(false);
        }

        // References past the shared object table are ignored.
        for group in page
            .shared_groups
            .iter()
            .filter_map(|id| hints.shared_groups().get(*id as usize))
        {
            if group.length == 0 {
                return Err(Error::Structure("shared object group has no data"));
            }

            if !doc.is_range_available(group.offset, group.length) {
                trace!(
                    "page {index} needs shared objects at offset {}",
                    group.offset
                );

                return Ok(false);
            }
        }

        Ok(true)
    }
}

impl std::fmt::Debug for ObjectAvailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectAvailability")
            .field("pending", &self.pending.len())
            .field("seen", &self.seen.len())
            .field("exclude", &self.exclude.is_some())
            .finish()
    }
}
