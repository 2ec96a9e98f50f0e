/*!
A low-level crate for reading PDF files from untrusted and partially
available data.

A [`Document`] is opened from a [`ByteSource`]. Opening reads the
cross-reference data, falls back to a scan of the whole file if that data is
damaged, and sets up decryption for encrypted files. Objects are parsed
lazily when they are requested and cached afterwards.

```rust,no_run
use quire_syntax::{Document, MemorySource};

let data = std::fs::read("file.pdf").unwrap();
let doc = Document::open(MemorySource::new(data), None).unwrap();

for page in doc.pages().unwrap().iter() {
    println!("{:?}", page.media_box());
}
```

Malformed objects do not make a document unusable. They resolve to `null`,
and streams with corrupt filter data yield the prefix that could be decoded.
Errors are reserved for missing data, cancellation, exceeded resource limits
and rejected credentials, and for files in which no catalog can be found at
all.

# Progressive loading
A [`ProgressiveSource`] is filled as the file arrives. Reads of missing
ranges fail with [`Error::NeedMoreData`], after which the same call can be
repeated once the range was supplied. [`ObjectAvailability`] checks whether
all objects reachable from a root object can be loaded yet.

Linearized files describe where each page is stored in their hint tables.
[`Document::linearized`] reads the linearization dictionary,
[`Document::hint_tables`] the tables, and [`PageAvailability`] checks whether
the byte ranges of a page have arrived.

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]

mod avail;
mod config;
mod crypto;
mod document;
mod error;
mod fdf;
pub mod filter;
mod lexer;
pub mod object;
mod parser;
mod reader;
mod source;
mod trivia;
mod util;
mod xref;

pub use avail::{ObjectAvailability, PageAvailability};
pub use config::{CancelToken, DecodeSettings, ImageDecoder, Settings, StreamLengthPolicy};
pub use crypto::{Credential, Permissions};
pub use document::{
    Document, HintTables, Linearized, Metadata, Page, PageHint, PagePosition, Resolved,
    SharedGroup, Version,
};
pub use error::{EncryptionError, Error, FilterError, FilterErrorKind, Limit, Result};
pub use fdf::FdfDocument;
pub use object::{Dict, Name, Number, Object, ObjectIdentifier, PdfString, Stream};
pub use source::{ByteSource, MemorySource, ProgressiveSource, ReadResult};
