use once_cell::sync::Lazy;
use quire_syntax::{Document, MemorySource, Result, Settings};
use std::collections::BTreeMap;

mod crypto;
mod fdf;
mod filters;
mod progressive;

pub(crate) const CATALOG: &str = "<</Type /Catalog /Pages 2 0 R>>";
pub(crate) const PAGES: &str = "<</Type /Pages /Kids [3 0 R] /Count 1>>";
pub(crate) const PAGE: &str = "<</Type /Page /Parent 2 0 R /MediaBox [0 0 612 792]>>";

#[derive(Debug, Clone, Copy)]
enum Entry {
    InFile(usize, u16),
    Compressed(u32, u32),
    Free,
}

/// Writes PDF files with a correct cross-reference section.
pub(crate) struct PdfBuilder {
    data: Vec<u8>,
    entries: BTreeMap<u32, Entry>,
    prev: Option<usize>,
}

impl PdfBuilder {
    pub(crate) fn new(version: &str) -> Self {
        Self {
            data: format!("%PDF-{version}\n%\u{e2}\u{e3}\n").into_bytes(),
            entries: BTreeMap::new(),
            prev: None,
        }
    }

    /// Continue an existing file with an incremental update.
    pub(crate) fn update(base: Vec<u8>) -> Self {
        let prev = startxref(&base);

        Self {
            data: base,
            entries: BTreeMap::new(),
            prev: Some(prev),
        }
    }

    /// The offset that the next write lands at.
    pub(crate) fn position(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn raw(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.data.extend_from_slice(bytes.as_ref());
        self
    }

    pub(crate) fn object(self, num: u32, body: impl AsRef<[u8]>) -> Self {
        self.object_with_generation(num, 0, body)
    }

    pub(crate) fn object_with_generation(
        mut self,
        num: u32,
        generation: u16,
        body: impl AsRef<[u8]>,
    ) -> Self {
        self.entries
            .insert(num, Entry::InFile(self.data.len(), generation));
        self.data
            .extend_from_slice(format!("{num} {generation} obj\n").as_bytes());
        self.data.extend_from_slice(body.as_ref());
        self.data.extend_from_slice(b"\nendobj\n");
        self
    }

    /// A stream whose `Length` is the length of `data`. `dict` holds the
    /// other entries, without the angle brackets.
    pub(crate) fn stream(self, num: u32, dict: &str, data: &[u8]) -> Self {
        let mut body = format!("<<{dict} /Length {}>>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");

        self.object(num, body)
    }

    /// An object stream holding `members`.
    pub(crate) fn object_stream(mut self, num: u32, members: &[(u32, &str)]) -> Self {
        let mut header = String::new();
        let mut body = String::new();

        for (index, (member, object)) in members.iter().enumerate() {
            header.push_str(&format!("{member} {} ", body.len()));
            body.push_str(object);
            body.push(' ');
            self.entries
                .insert(*member, Entry::Compressed(num, index as u32));
        }

        let dict = format!("/Type /ObjStm /N {} /First {}", members.len(), header.len());

        self.stream(num, &dict, format!("{header}{body}").as_bytes())
    }

    /// Mark an object as deleted in this section.
    pub(crate) fn free(mut self, num: u32) -> Self {
        self.entries.insert(num, Entry::Free);
        self
    }

    fn size(&self, extra: u32) -> u32 {
        self.entries.keys().next_back().map_or(1, |last| last + 1).max(extra)
    }

    /// Finish with a classic `xref` table. `trailer` holds the trailer
    /// entries besides `Size` and `Prev`.
    pub(crate) fn finish(mut self, trailer: &str) -> Vec<u8> {
        let offset = self.data.len();
        let mut section = String::from("xref\n");

        if self.prev.is_none() {
            self.entries.entry(0).or_insert(Entry::Free);
        }

        for run in runs(&self.entries) {
            section.push_str(&format!("{} {}\n", run[0].0, run.len()));

            for (_, entry) in run {
                match entry {
                    Entry::InFile(offset, generation) => {
                        section.push_str(&format!("{offset:010} {generation:05} n \n"));
                    }
                    _ => section.push_str("0000000000 65535 f \n"),
                }
            }
        }

        let size = self.size(0);
        let prev = self.prev.map(|p| format!(" /Prev {p}")).unwrap_or_default();
        section.push_str(&format!(
            "trailer\n<<{trailer} /Size {size}{prev}>>\nstartxref\n{offset}\n%%EOF\n"
        ));

        self.data.extend_from_slice(section.as_bytes());
        self.data
    }

    /// Finish with a cross-reference stream stored as object `num`.
    pub(crate) fn finish_with_stream(mut self, num: u32, trailer: &str) -> Vec<u8> {
        let offset = self.data.len();
        self.entries.insert(num, Entry::InFile(offset, 0));

        if self.prev.is_none() {
            self.entries.entry(0).or_insert(Entry::Free);
        }

        let mut data = Vec::new();
        let mut index = String::new();

        for run in runs(&self.entries) {
            index.push_str(&format!("{} {} ", run[0].0, run.len()));

            for (_, entry) in run {
                let (kind, field2, field3) = match entry {
                    Entry::Free => (0_u8, 0_u32, 0xFFFF_u16),
                    Entry::InFile(offset, generation) => (1, offset as u32, generation),
                    Entry::Compressed(stream, member) => (2, stream, member as u16),
                };

                data.push(kind);
                data.extend_from_slice(&field2.to_be_bytes());
                data.extend_from_slice(&field3.to_be_bytes());
            }
        }

        let size = self.size(num + 1);
        let prev = self.prev.map(|p| format!(" /Prev {p}")).unwrap_or_default();
        let dict = format!(
            "/Type /XRef /W [1 4 2] /Index [{}] /Size {size}{prev} {trailer}",
            index.trim_end()
        );

        self.stream(num, &dict, &data)
            .raw(format!("startxref\n{offset}\n%%EOF\n"))
            .data
    }
}

/// Consecutive runs of object numbers.
fn runs(entries: &BTreeMap<u32, Entry>) -> Vec<Vec<(u32, Entry)>> {
    let mut runs: Vec<Vec<(u32, Entry)>> = Vec::new();

    for (num, entry) in entries {
        match runs.last_mut() {
            Some(run) if run.last().is_some_and(|(last, _)| last + 1 == *num) => {
                run.push((*num, *entry));
            }
            _ => runs.push(vec![(*num, *entry)]),
        }
    }

    runs
}

pub(crate) fn startxref(data: &[u8]) -> usize {
    let text = String::from_utf8_lossy(data);
    let pos = text.rfind("startxref").unwrap();

    text[pos + 9..]
        .split_whitespace()
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap()
}

/// A document with one page.
pub(crate) static SIMPLE: Lazy<Vec<u8>> = Lazy::new(|| {
    PdfBuilder::new("1.7")
        .object(1, CATALOG)
        .object(2, PAGES)
        .object(3, PAGE)
        .finish("/Root 1 0 R")
});

pub(crate) fn open(data: Vec<u8>) -> Result<Document> {
    Document::open(MemorySource::new(data), None)
}

pub(crate) fn open_with(data: Vec<u8>, settings: Settings) -> Result<Document> {
    Document::open_with_settings(MemorySource::new(data), None, settings)
}
