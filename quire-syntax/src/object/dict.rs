//! Dictionaries.

use crate::object::{Name, Object, ObjectIdentifier, PdfString, Stream};
use rustc_hash::FxHashMap;

/// A PDF dictionary.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dict(FxHashMap<Name, Object>);

impl Dict {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the dictionary has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the dictionary has an entry for `key`.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.0.contains_key(key)
    }

    /// The value of `key`.
    pub fn get(&self, key: &[u8]) -> Option<&Object> {
        self.0.get(key)
    }

    /// A mutable reference to the value of `key`.
    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Object> {
        self.0.get_mut(key)
    }

    /// Insert an entry, returning the previous value.
    pub fn insert(&mut self, key: impl Into<Name>, value: impl Into<Object>) -> Option<Object> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove an entry.
    pub fn remove(&mut self, key: &[u8]) -> Option<Object> {
        self.0.remove(key)
    }

    /// Iterate over all entries, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Name, &Object)> {
        self.0.iter()
    }

    /// Iterate mutably over all values.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Object> {
        self.0.values_mut()
    }

    /// Iterate over all keys, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &Name> {
        self.0.keys()
    }

    /// The entries sorted by key.
    pub fn sorted(&self) -> Vec<(&Name, &Object)> {
        let mut entries: Vec<_> = self.0.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// The value of `key` if it is a name.
    pub fn get_name(&self, key: &[u8]) -> Option<&Name> {
        self.get(key)?.as_name()
    }

    /// The value of `key` if it is an integer.
    pub fn get_i64(&self, key: &[u8]) -> Option<i64> {
        self.get(key)?.as_i64()
    }

    /// The value of `key` if it is a number.
    pub fn get_f64(&self, key: &[u8]) -> Option<f64> {
        self.get(key)?.as_f64()
    }

    /// The value of `key` if it is a boolean.
    pub fn get_bool(&self, key: &[u8]) -> Option<bool> {
        self.get(key)?.as_bool()
    }

    /// The value of `key` if it is a string.
    pub fn get_string(&self, key: &[u8]) -> Option<&PdfString> {
        self.get(key)?.as_string()
    }

    /// The value of `key` if it is an array.
    pub fn get_array(&self, key: &[u8]) -> Option<&[Object]> {
        self.get(key)?.as_array()
    }

    /// The value of `key` if it is a dictionary (or a stream).
    pub fn get_dict(&self, key: &[u8]) -> Option<&Self> {
        self.get(key)?.as_dict()
    }

    /// The value of `key` if it is a stream.
    pub fn get_stream(&self, key: &[u8]) -> Option<&Stream> {
        self.get(key)?.as_stream()
    }

    /// The value of `key` if it is a reference.
    pub fn get_reference(&self, key: &[u8]) -> Option<ObjectIdentifier> {
        self.get(key)?.as_reference()
    }

    /// Whether the `Type` entry equals `ty`.
    pub fn has_type(&self, ty: &[u8]) -> bool {
        self.get_name(keys::TYPE).is_some_and(|n| n.as_bytes() == ty)
    }
}

impl FromIterator<(Name, Object)> for Dict {
    fn from_iter<T: IntoIterator<Item = (Name, Object)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Common dictionary keys and name values.
#[allow(missing_docs)]
pub mod keys {
    macro_rules! key {
        ($i:ident, $e:expr) => {
            pub const $i: &'static [u8] = $e;
        };
    }

    // A
    key!(AESV2, b"AESV2");
    key!(AESV3, b"AESV3");
    key!(AHX, b"AHx");
    key!(A85, b"A85");
    key!(ASCII85_DECODE, b"ASCII85Decode");
    key!(ASCII_HEX_DECODE, b"ASCIIHexDecode");
    key!(AUTHOR, b"Author");

    // B
    key!(BITS_PER_COMPONENT, b"BitsPerComponent");
    key!(BLACK_IS_1, b"BlackIs1");

    // C
    key!(CATALOG, b"Catalog");
    key!(CCF, b"CCF");
    key!(CCITTFAX_DECODE, b"CCITTFaxDecode");
    key!(CF, b"CF");
    key!(CFM, b"CFM");
    key!(COLORS, b"Colors");
    key!(COLOR_TRANSFORM, b"ColorTransform");
    key!(COLUMNS, b"Columns");
    key!(COUNT, b"Count");
    key!(CREATION_DATE, b"CreationDate");
    key!(CREATOR, b"Creator");
    key!(CROP_BOX, b"CropBox");
    key!(CRYPT, b"Crypt");

    // D
    key!(DCT, b"DCT");
    key!(DCT_DECODE, b"DCTDecode");
    key!(DECODE_PARMS, b"DecodeParms");
    key!(DP, b"DP");

    // E
    key!(E, b"E");
    key!(EARLY_CHANGE, b"EarlyChange");
    key!(ENCODED_BYTE_ALIGN, b"EncodedByteAlign");
    key!(ENCRYPT, b"Encrypt");
    key!(ENCRYPT_META_DATA, b"EncryptMetadata");
    key!(END_OF_BLOCK, b"EndOfBlock");
    key!(END_OF_LINE, b"EndOfLine");
    key!(EXTENDS, b"Extends");

    // F
    key!(FDF, b"FDF");
    key!(FILTER, b"Filter");
    key!(FIRST, b"First");
    key!(FL, b"Fl");
    key!(FLATE_DECODE, b"FlateDecode");

    // H
    key!(H, b"H");

    // I
    key!(ID, b"ID");
    key!(IDENTITY, b"Identity");
    key!(INDEX, b"Index");
    key!(INFO, b"Info");

    // J
    key!(JBIG2_DECODE, b"JBIG2Decode");
    key!(JBIG2_GLOBALS, b"JBIG2Globals");
    key!(JPX_DECODE, b"JPXDecode");

    // K
    key!(K, b"K");
    key!(KEYWORDS, b"Keywords");
    key!(KIDS, b"Kids");

    // L
    key!(L, b"L");
    key!(LENGTH, b"Length");
    key!(LINEARIZED, b"Linearized");
    key!(LZW, b"LZW");
    key!(LZW_DECODE, b"LZWDecode");

    // M
    key!(MEDIA_BOX, b"MediaBox");
    key!(METADATA, b"Metadata");
    key!(MOD_DATE, b"ModDate");

    // N
    key!(N, b"N");
    key!(NAME, b"Name");
    key!(NONE, b"None");

    // O
    key!(O, b"O");
    key!(OBJ_STM, b"ObjStm");
    key!(OE, b"OE");

    // P
    key!(P, b"P");
    key!(PAGE, b"Page");
    key!(PAGES, b"Pages");
    key!(PARENT, b"Parent");
    key!(PERMS, b"Perms");
    key!(PREDICTOR, b"Predictor");
    key!(PREV, b"Prev");
    key!(PRODUCER, b"Producer");

    // R
    key!(R, b"R");
    key!(RESOURCES, b"Resources");
    key!(RL, b"RL");
    key!(ROOT, b"Root");
    key!(ROTATE, b"Rotate");
    key!(ROWS, b"Rows");
    key!(RUN_LENGTH_DECODE, b"RunLengthDecode");

    // S
    key!(S, b"S");
    key!(SIZE, b"Size");
    key!(STANDARD, b"Standard");
    key!(STM_F, b"StmF");
    key!(STR_F, b"StrF");
    key!(SUBJECT, b"Subject");

    // T
    key!(T, b"T");
    key!(TITLE, b"Title");
    key!(TYPE, b"Type");

    // U
    key!(U, b"U");
    key!(UE, b"UE");

    // V
    key!(V, b"V");
    key!(V2, b"V2");
    key!(VERSION, b"Version");

    // W
    key!(W, b"W");

    // X
    key!(XREF, b"XRef");
    key!(XREF_STM, b"XRefStm");
}
