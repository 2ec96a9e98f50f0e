//! Document information and versions.

use crate::document::Document;
use crate::error::Result;
use crate::object::Dict;
use crate::object::keys::{
    AUTHOR, CREATION_DATE, CREATOR, KEYWORDS, MOD_DATE, PRODUCER, SUBJECT, TITLE,
};
use std::fmt;

/// The entries of the document information dictionary.
///
/// Text strings are decoded from `PDFDocEncoding` or UTF-16. Dates are kept
/// in their PDF string form, e.g. `D:20240101120000+01'00'`.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct Metadata {
    /// The title of the document.
    pub title: Option<String>,
    /// The author of the document.
    pub author: Option<String>,
    /// The subject of the document.
    pub subject: Option<String>,
    /// The keywords of the document.
    pub keywords: Option<String>,
    /// The application that created the original document.
    pub creator: Option<String>,
    /// The application that produced the PDF file.
    pub producer: Option<String>,
    /// The creation date of the document.
    pub creation_date: Option<String>,
    /// The modification date of the document.
    pub modification_date: Option<String>,
}

impl Metadata {
    pub(crate) fn from_dict(doc: &Document, dict: &Dict) -> Result<Self> {
        let text = |key: &[u8]| -> Result<Option<String>> {
            let Some(value) = dict.get(key) else {
                return Ok(None);
            };

            Ok(doc.resolve(value)?.as_string().map(|s| s.to_text()))
        };

        Ok(Self {
            title: text(TITLE)?,
            author: text(AUTHOR)?,
            subject: text(SUBJECT)?,
            keywords: text(KEYWORDS)?,
            creator: text(CREATOR)?,
            producer: text(PRODUCER)?,
            creation_date: text(CREATION_DATE)?,
            modification_date: text(MOD_DATE)?,
        })
    }
}

/// A PDF version.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// The major version.
    pub major: u8,
    /// The minor version.
    pub minor: u8,
}

impl Version {
    /// Create a new version.
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Parse a version like `1.7`. Trailing bytes after the minor version
    /// are ignored.
    pub fn parse(data: &[u8]) -> Option<Self> {
        match data {
            [major, b'.', minor, ..] if major.is_ascii_digit() && minor.is_ascii_digit() => {
                Some(Self::new(major - b'0', minor - b'0'))
            }
            _ => None,
        }
    }
}

/// Documents without a valid header are read as version 1.7.
impl Default for Version {
    fn default() -> Self {
        Self::new(1, 7)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions() {
        assert_eq!(Version::parse(b"1.4\n%\xE2\xE3"), Some(Version::new(1, 4)));
        assert_eq!(Version::parse(b"2.0"), Some(Version::new(2, 0)));
        assert_eq!(Version::parse(b"1."), None);
        assert_eq!(Version::parse(b"x.4"), None);
        assert!(Version::new(1, 7) > Version::new(1, 4));
        assert!(Version::new(2, 0) > Version::new(1, 7));
        assert_eq!(Version::new(1, 5).to_string(), "1.5");
    }
}
