use crate::{CATALOG, PAGES, PdfBuilder};
use quire_common::bit::BitWriter;
use quire_syntax::{
    ByteSource, Document, Error, MemorySource, Object, ObjectAvailability, ObjectIdentifier,
    PageAvailability, PagePosition, ProgressiveSource, SharedGroup,
};

/// A file whose content stream sits between the header and a long comment,
/// away from the objects that opening needs.
fn spread_out() -> Vec<u8> {
    let builder = PdfBuilder::new("1.7").raw(format!("%{}\n", "x".repeat(1100)));
    assert!(builder.position() > 1024);

    builder
        .stream(4, "", b"BT /F1 12 Tf ET")
        .raw(format!("%{}\n", "y".repeat(5000)))
        .object(3, "<</Type /Page /Parent 2 0 R /Contents [4 0 R]>>")
        .object(1, CATALOG)
        .object(2, PAGES)
        .finish("/Root 1 0 R")
}

fn partial(data: &[u8]) -> ProgressiveSource {
    let source = ProgressiveSource::new(data.len() as u64);
    let tail = data.len() - 4096;
    source.supply(0, &data[..1024]);
    source.supply(tail as u64, &data[tail..]);

    source
}

#[test]
fn nothing_supplied() {
    let source = ProgressiveSource::new(10_000);

    assert!(matches!(
        Document::open(source, None),
        Err(Error::NeedMoreData { .. })
    ));
}

#[test]
fn open_before_complete() {
    let data = spread_out();
    let source = partial(&data);
    let doc = Document::open(source.clone(), None).unwrap();

    assert!(!source.is_complete());
    assert_eq!(doc.page_count().unwrap(), 1);
    assert!(matches!(
        doc.get_object(ObjectIdentifier::new(4, 0)),
        Err(Error::NeedMoreData { .. })
    ));

    let mut avail = ObjectAvailability::new(&Object::reference(2, 0));
    assert!(!avail.check(&doc).unwrap());
    // Progress is kept between calls.
    assert!(!avail.check(&doc).unwrap());

    source.supply(0, &data);
    assert!(source.is_complete());
    assert!(avail.check(&doc).unwrap());
    assert!(doc.get_object(ObjectIdentifier::new(4, 0)).unwrap().as_stream().is_some());
}

#[test]
fn excluded_objects_are_not_followed() {
    let data = spread_out();
    let source = partial(&data);
    let doc = Document::open(source.clone(), None).unwrap();

    let mut avail = ObjectAvailability::with_exclusion(&Object::reference(1, 0), |object| {
        object.as_dict().is_some_and(|dict| dict.has_type(b"Page"))
    });
    assert!(avail.check(&doc).unwrap());
}

#[test]
fn missing_ranges_are_reported() {
    let data = spread_out();
    let source = partial(&data);

    assert_eq!(source.available_from(0), 1024);
    assert_eq!(source.available_from(2000), 0);

    let doc = Document::open(source, None).unwrap();
    let Err(Error::NeedMoreData { offset, len }) = doc.get_object(ObjectIdentifier::new(4, 0))
    else {
        panic!("object 4 should not be available");
    };

    assert!(offset >= 1024);
    assert!(offset < (data.len() - 4096) as u64);
    assert!(len > 0);
}

/// Offsets in a linearized file with two pages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Layout {
    hint_start: usize,
    hint_length: usize,
    first_page_object: usize,
    first_page_end: usize,
    shared_start: usize,
    shared_end: usize,
    main_xref: usize,
    file_size: usize,
}

/// Offset of the shared object hint table in [`hint_stream`].
const SHARED_TABLE: usize = 45;

fn hint_stream(layout: &Layout) -> Vec<u8> {
    // Positions are recorded as if the hint stream were not there.
    let hinted = |offset: usize| offset.saturating_sub(layout.hint_length) as u32;
    let first_page_len = layout.first_page_end.saturating_sub(layout.first_page_object);
    let second_page_len = layout.shared_start.saturating_sub(layout.first_page_end);

    let mut w = BitWriter::new();
    w.write(2, 32);
    w.write(hinted(layout.first_page_object), 32);
    w.write(8, 16);
    w.write(0, 32);
    w.write(16, 16);
    for bits in [32, 16, 32, 16] {
        w.write(0, bits);
    }
    w.write(8, 16);
    w.write(8, 16);
    w.write(0, 16);
    w.write(1, 16);

    // Two objects on each page.
    w.write(0, 8);
    w.write(0, 8);
    w.write(first_page_len as u32, 16);
    w.write(second_page_len as u32, 16);
    // The second page uses shared group 0.
    w.write(0, 8);
    w.write(1, 8);
    w.write(0, 8);
    assert_eq!(w.cur_pos(), SHARED_TABLE * 8);

    w.write(3, 32);
    w.write(hinted(layout.shared_start), 32);
    w.write(0, 32);
    w.write(1, 32);
    w.write(0, 16);
    w.write((layout.shared_end - layout.shared_start) as u32, 32);
    w.write(0, 16);
    // No signature.
    w.write(0, 1);

    w.finish()
}

/// Write the file with the offsets of `layout` and return the offsets it
/// really has.
fn linearized_file(layout: &Layout) -> (Vec<u8>, Layout) {
    let mut found = Layout::default();

    let builder = PdfBuilder::new("1.7").object(
        7,
        format!(
            "<</Linearized 1 /L {:010} /H [{:010} {:010}] /O 11 /E {:010} /N 2 /T {:010}>>",
            layout.file_size,
            layout.hint_start,
            layout.hint_length,
            layout.first_page_end,
            layout.main_xref
        ),
    );
    found.hint_start = builder.position();

    let builder = builder.stream(8, &format!("/S {SHARED_TABLE}"), &hint_stream(layout));
    found.hint_length = builder.position() - found.hint_start;

    let builder = builder
        .object(9, "<</Type /Catalog /Pages 10 0 R>>")
        .object(10, "<</Type /Pages /Kids [11 0 R 1 0 R] /Count 2>>");
    found.first_page_object = builder.position();

    let first_contents = format!("BT ET\n%{}", "a".repeat(1500));
    let builder = builder
        .object(11, "<</Type /Page /Parent 10 0 R /Contents 12 0 R>>")
        .stream(12, "", first_contents.as_bytes());
    found.first_page_end = builder.position();

    let second_contents = format!("BT /F1 12 Tf ET\n%{}", "b".repeat(3000));
    let builder = builder
        .object(
            1,
            "<</Type /Page /Parent 10 0 R /Contents 2 0 R /Resources <</Font <</F1 3 0 R>>>>>>",
        )
        .stream(2, "", second_contents.as_bytes());
    found.shared_start = builder.position();

    let builder = builder.object(3, "<</Type /Font /Subtype /Type1 /BaseFont /Helvetica>>");
    found.shared_end = builder.position();

    let builder = builder.raw(format!("%{}\n", "z".repeat(5000)));
    found.main_xref = builder.position();

    let data = builder.finish("/Root 9 0 R");
    found.file_size = data.len();

    (data, found)
}

fn linearized() -> (Vec<u8>, Layout) {
    let (_, layout) = linearized_file(&Layout::default());
    let (data, written) = linearized_file(&layout);
    assert_eq!(layout, written);

    (data, layout)
}

#[test]
fn linearized_hint_tables() {
    let (data, layout) = linearized();
    let doc = Document::open(MemorySource::new(data), None).unwrap();

    let linearized = doc.linearized().unwrap().unwrap();
    assert_eq!(linearized.page_count(), 2);
    assert_eq!(linearized.first_page_object(), 11);
    assert_eq!(linearized.first_page_end(), layout.first_page_end as u64);
    assert_eq!(linearized.main_xref_offset(), layout.main_xref as u64);

    let hints = doc.hint_tables(&linearized).unwrap().unwrap();
    assert_eq!(hints.first_page_object_offset(), layout.first_page_object as u64);
    assert_eq!(
        hints.page_position(0),
        Some(PagePosition {
            offset: layout.first_page_object as u64,
            length: (layout.first_page_end - layout.first_page_object) as u64,
            object_number: 11,
        })
    );
    assert_eq!(
        hints.page_position(1),
        Some(PagePosition {
            offset: layout.first_page_end as u64,
            length: (layout.shared_start - layout.first_page_end) as u64,
            object_number: 1,
        })
    );
    assert_eq!(hints.page_position(2), None);
    assert_eq!(
        hints.shared_groups(),
        [SharedGroup {
            offset: layout.shared_start as u64,
            length: (layout.shared_end - layout.shared_start) as u64,
            object_number: 3,
            object_count: 1,
        }]
    );
}

#[test]
fn linearized_pages_become_available() {
    let (data, layout) = linearized();
    let source = ProgressiveSource::new(data.len() as u64);
    let tail = data.len() - 4096;
    source.supply(0, &data[..layout.first_page_end]);
    source.supply(tail as u64, &data[tail..]);

    let doc = Document::open(source.clone(), None).unwrap();
    let avail = PageAvailability::new(&doc).unwrap().unwrap();

    assert!(avail.check(&doc, 0).unwrap());
    assert!(!avail.check(&doc, 1).unwrap());
    assert!(matches!(avail.check(&doc, 2), Err(Error::Structure(_))));

    source.supply(
        layout.first_page_end as u64,
        &data[layout.first_page_end..layout.shared_start],
    );
    // The font is shared and stored apart from the page.
    assert!(!avail.check(&doc, 1).unwrap());

    source.supply(
        layout.shared_start as u64,
        &data[layout.shared_start..layout.shared_end],
    );
    assert!(avail.check(&doc, 1).unwrap());
    assert!(!source.is_complete());
    assert_eq!(doc.page_count().unwrap(), 2);
}

#[test]
fn updated_linearized_file_is_not_linearized() {
    let (data, _) = linearized();
    let updated = PdfBuilder::update(data)
        .object(3, "<</Type /Font /Subtype /Type1 /BaseFont /Courier>>")
        .finish("/Root 9 0 R");

    let doc = Document::open(MemorySource::new(updated), None).unwrap();
    assert_eq!(doc.linearized().unwrap(), None);
    assert!(PageAvailability::new(&doc).unwrap().is_none());
}

#[test]
fn regular_file_is_not_linearized() {
    let doc = Document::open(MemorySource::new(spread_out()), None).unwrap();
    assert_eq!(doc.linearized().unwrap(), None);
}
