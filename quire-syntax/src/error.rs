//! Errors.

use crate::filter::Filter;
use crate::object::ObjectIdentifier;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// A result with the crate error type.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that occurred while reading a document.
///
/// Most malformations never surface as an error: broken objects resolve to
/// `null` and the cross-reference table is rebuilt when it is damaged. What
/// remains are conditions that the caller has to act on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The object syntax could not be parsed.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax {
        /// The byte offset of the offending token.
        offset: u64,
        /// What was expected.
        message: &'static str,
    },
    /// The file structure is unusable, even after recovery.
    #[error("broken file structure: {0}")]
    Structure(&'static str),
    /// A reference does not point to a usable object.
    #[error("unresolvable reference {id}")]
    Reference {
        /// The referenced object.
        id: ObjectIdentifier,
    },
    /// A stream filter failed.
    #[error(transparent)]
    Filter(#[from] FilterError),
    /// The document could not be decrypted.
    #[error(transparent)]
    Encryption(#[from] EncryptionError),
    /// A configured resource limit was exceeded.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(Limit),
    /// The operation was cancelled through the cancellation token.
    #[error("operation was cancelled")]
    Cancelled,
    /// The byte source does not have the requested range yet.
    ///
    /// The call can be retried once the range was supplied.
    #[error("{len} bytes at offset {offset} are not available yet")]
    NeedMoreData {
        /// The start of the missing range.
        offset: u64,
        /// The length of the missing range.
        len: u64,
    },
}

/// A resource limit from [`Settings`](crate::Settings).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Limit {
    /// Arrays and dictionaries were nested too deeply.
    NestingDepth,
    /// A chain of references was too long.
    ReferenceDepth,
    /// Too many cross-reference sections were chained.
    XRefSections,
    /// A decoded stream grew too large.
    DecodedSize,
    /// Too many objects were malformed.
    MalformedObjects,
    /// The page tree holds too many pages.
    PageCount,
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NestingDepth => "nesting depth",
            Self::ReferenceDepth => "reference depth",
            Self::XRefSections => "number of cross-reference sections",
            Self::DecodedSize => "decoded stream size",
            Self::MalformedObjects => "number of malformed objects",
            Self::PageCount => "number of pages",
        };

        f.write_str(s)
    }
}

/// A failure while decoding a stream filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{} filter failed ({kind}) after {} bytes",
    .filter.map_or("unknown", |f| f.name()),
    .prefix.len()
)]
pub struct FilterError {
    /// The filter that failed, or `None` if the filter name is not known.
    pub filter: Option<Filter>,
    /// What went wrong.
    pub kind: FilterErrorKind,
    /// The output that could be produced before the failure.
    pub prefix: Bytes,
}

impl FilterError {
    /// The length of the successfully decoded prefix.
    pub fn prefix_len(&self) -> usize {
        self.prefix.len()
    }
}

/// The kind of a [`FilterError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FilterErrorKind {
    /// The encoded data is corrupt.
    Corrupt,
    /// The filter, or the parameter combination, is not supported.
    Unsupported,
    /// The output exceeded the configured maximum size.
    SizeLimit,
    /// Decoding was cancelled.
    Cancelled,
}

impl fmt::Display for FilterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Corrupt => "corrupt data",
            Self::Unsupported => "unsupported",
            Self::SizeLimit => "size limit",
            Self::Cancelled => "cancelled",
        };

        f.write_str(s)
    }
}

/// An error from the security handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncryptionError {
    /// The document uses a security handler other than the standard one.
    #[error("unsupported security handler")]
    UnsupportedHandler,
    /// The version or revision of the standard security handler is unknown.
    #[error("unsupported encryption version {version}, revision {revision}")]
    UnsupportedRevision {
        /// The `V` entry.
        version: i64,
        /// The `R` entry.
        revision: i64,
    },
    /// The encryption dictionary lacks a required entry or has a wrong shape.
    #[error("malformed encryption dictionary: {0}")]
    Malformed(&'static str),
    /// Neither the user nor the owner password check accepted the credential.
    #[error("the credential was rejected")]
    RejectedCredential,
    /// The `Perms` entry does not match the derived key.
    #[error("the permissions entry failed validation")]
    PermsMismatch,
}
