//! Walking the page tree.

use crate::document::Document;
use crate::error::{Error, Limit, Result};
use crate::object::keys::{CROP_BOX, KIDS, MEDIA_BOX, PAGE, PAGES, PARENT, RESOURCES, ROTATE};
use crate::object::{Dict, Object, ObjectIdentifier};
use crate::util::OptionLog;
use log::{debug, warn};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

const INHERITABLE: [&[u8]; 4] = [RESOURCES, MEDIA_BOX, CROP_BOX, ROTATE];

/// A page of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    id: Option<ObjectIdentifier>,
    dict: Dict,
}

impl Page {
    /// The identifier of the page object, unless the page dictionary was
    /// stored directly in its parent's `Kids` array.
    pub fn id(&self) -> Option<ObjectIdentifier> {
        self.id
    }

    /// The page dictionary, with the attributes it inherits from its
    /// ancestors filled in.
    pub fn dict(&self) -> &Dict {
        &self.dict
    }

    /// The resource dictionary, which may still be a reference.
    pub fn resources(&self) -> Option<&Object> {
        self.dict.get(RESOURCES)
    }

    /// The media box, if it is a direct array of four numbers.
    pub fn media_box(&self) -> Option<[f64; 4]> {
        let array = self.dict.get_array(MEDIA_BOX)?;

        match array {
            [a, b, c, d] => Some([a.as_f64()?, b.as_f64()?, c.as_f64()?, d.as_f64()?]),
            _ => None,
        }
    }

    /// The rotation in degrees, normalized to 0, 90, 180 or 270.
    pub fn rotation(&self) -> u16 {
        let rotate = self.dict.get_i64(ROTATE).unwrap_or(0);

        (rotate.rem_euclid(360) / 90 * 90) as u16
    }
}

/// The inheritable attributes of the nearest ancestors.
#[derive(Debug, Clone, Default)]
struct Inherited(Vec<(&'static [u8], Object)>);

impl Inherited {
    fn update(&mut self, node: &Dict) {
        for key in INHERITABLE {
            if let Some(value) = node.get(key) {
                self.0.retain(|(k, _)| *k != key);
                self.0.push((key, value.clone()));
            }
        }
    }

    fn apply(&self, mut dict: Dict) -> Dict {
        for (key, value) in &self.0 {
            if !dict.contains_key(key) {
                dict.insert(*key, value.clone());
            }
        }

        dict
    }
}

/// State of a page tree walk.
struct Walk<'a> {
    doc: &'a Document,
    /// The nodes from the root to the current node.
    path: SmallVec<[ObjectIdentifier; 16]>,
    /// Every node that was visited. A node that is reachable through several
    /// parents is only visited once.
    visited: FxHashSet<ObjectIdentifier>,
    pages: Vec<Page>,
}

impl Walk<'_> {
    fn push(&mut self, page: Page) -> Result<()> {
        if self.pages.len() >= self.doc.settings.max_pages {
            return Err(Error::ResourceLimit(Limit::PageCount));
        }

        self.pages.push(page);

        Ok(())
    }
}

pub(super) fn collect(doc: &Document) -> Result<Vec<Page>> {
    let catalog = doc.catalog()?;
    let mut walk = Walk {
        doc,
        path: SmallVec::new(),
        visited: FxHashSet::default(),
        pages: Vec::new(),
    };

    if let Some(root) = catalog.as_dict().and_then(|c| c.get(PAGES)) {
        visit(&mut walk, root, Inherited::default())?;
    }

    let mut pages = walk.pages;

    if pages.is_empty() && doc.settings.brute_force_pages {
        debug!("page tree is empty, searching all objects for pages");

        brute_force(doc, &mut pages)?;
    }

    Ok(pages)
}

fn visit(walk: &mut Walk<'_>, node: &Object, mut inherited: Inherited) -> Result<()> {
    let doc = walk.doc;
    let id = node.as_reference();

    if let Some(id) = id {
        if walk.path.contains(&id) {
            warn!("page tree node {id} is its own ancestor");

            return Ok(());
        }

        if !walk.visited.insert(id) {
            debug!("page tree node {id} was already visited");

            return Ok(());
        }
    }

    if walk.path.len() >= doc.settings.max_reference_depth {
        return Err(Error::ResourceLimit(Limit::ReferenceDepth));
    }

    let resolved = doc.resolve(node)?;
    let Some(dict) = resolved
        .as_dict()
        .warn_none("ignoring page tree node that is not a dictionary")
    else {
        return Ok(());
    };

    let kids = match dict.get(KIDS) {
        Some(kids) => Some(doc.resolve(kids)?),
        None => None,
    };

    // Nodes of unknown type are pages unless they have kids.
    match kids.as_deref().and_then(Object::as_array) {
        Some(kids) if !dict.has_type(PAGE) => {
            inherited.update(dict);

            if let Some(id) = id {
                walk.path.push(id);
            }

            for kid in kids {
                visit(walk, kid, inherited.clone())?;
            }

            if id.is_some() {
                walk.path.pop();
            }
        }
        None if dict.has_type(PAGES) => warn!("ignoring page tree node without kids"),
        _ => walk.push(Page {
            id,
            dict: inherited.apply(dict.clone()),
        })?,
    }

    Ok(())
}

/// Every object of type `Page`, in object number order.
fn brute_force(doc: &Document, pages: &mut Vec<Page>) -> Result<()> {
    for id in doc.object_ids() {
        let object = doc.get_object(id)?;

        if let Some(dict) = object.as_dict()
            && dict.has_type(PAGE)
        {
            if pages.len() >= doc.settings.max_pages {
                return Err(Error::ResourceLimit(Limit::PageCount));
            }

            let inherited = from_ancestors(doc, dict)?;

            pages.push(Page {
                id: Some(id),
                dict: inherited.apply(dict.clone()),
            });
        }
    }

    Ok(())
}

fn from_ancestors(doc: &Document, page: &Dict) -> Result<Inherited> {
    let mut ancestors = Vec::new();
    let mut seen = SmallVec::<[ObjectIdentifier; 16]>::new();
    let mut next = page.get_reference(PARENT);

    while let Some(id) = next {
        if seen.contains(&id) || seen.len() >= doc.settings.max_reference_depth {
            break;
        }

        seen.push(id);
        let parent = doc.get_object(id)?;
        next = parent.as_dict().and_then(|p| p.get_reference(PARENT));
        ancestors.push(parent);
    }

    let mut inherited = Inherited::default();

    for ancestor in ancestors.iter().rev() {
        if let Some(dict) = ancestor.as_dict() {
            inherited.update(dict);
        }
    }

    Ok(inherited)
}
