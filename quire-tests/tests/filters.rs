use crate::{CATALOG, PAGE, PAGES, PdfBuilder, open, open_with};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use quire_syntax::filter::{self, Filter};
use quire_syntax::object::keys::{COLUMNS, PREDICTOR};
use quire_syntax::{
    DecodeSettings, Dict, Document, FilterErrorKind, Object, ObjectIdentifier, Settings,
    StreamLengthPolicy,
};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const TEXT: &[u8] = b"BT /F1 12 Tf 72 712 Td (Hello) Tj ET";

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn base() -> PdfBuilder {
    PdfBuilder::new("1.7")
        .object(1, CATALOG)
        .object(2, PAGES)
        .object(3, PAGE)
}

fn stream_data(doc: &Document, num: u32) -> Vec<u8> {
    let object = doc.get_object(ObjectIdentifier::new(num, 0)).unwrap();
    let stream = object.as_stream().unwrap();

    stream.decoded(&DecodeSettings::default()).unwrap().to_vec()
}

#[test]
fn flate_stream() {
    let data = base()
        .stream(4, "/Filter /FlateDecode", &zlib(TEXT))
        .finish("/Root 1 0 R");

    assert_eq!(stream_data(&open(data).unwrap(), 4), TEXT);
}

#[test]
fn chains_apply_in_order() {
    // Run-length encoded, then ASCII85 encoded.
    let data = base()
        .stream(4, "/Filter [/A85 /RL]", b"pL+26@q9._J,~>")
        .finish("/Root 1 0 R");

    assert_eq!(stream_data(&open(data).unwrap(), 4), b"aaaaaaaaaabcdef");
}

#[test]
fn wrong_lengths() {
    let wrong = |declared: &str| {
        let body = format!("<</Length {declared}>>\nstream\n{}\nendstream", "x".repeat(20));

        base()
            .object(4, body)
            .object(5, "8")
            .finish("/Root 1 0 R")
    };

    for declared in ["5", "500", "5 0 R", "-3"] {
        let doc = open(wrong(declared)).unwrap();
        assert_eq!(stream_data(&doc, 4), b"x".repeat(20), "Length {declared}");
    }

    let trusting = Settings {
        stream_length_policy: StreamLengthPolicy::TrustDeclared,
        ..Settings::default()
    };
    let doc = open_with(wrong("5"), trusting).unwrap();
    assert_eq!(stream_data(&doc, 4), b"xxxxx");
}

#[test]
fn indirect_length() {
    let data = base()
        .object(4, "<</Length 5 0 R>>\nstream\nhello\nendstream")
        .object(5, "5")
        .finish("/Root 1 0 R");
    let settings = Settings {
        stream_length_policy: StreamLengthPolicy::TrustDeclared,
        ..Settings::default()
    };

    assert_eq!(stream_data(&open_with(data, settings).unwrap(), 4), b"hello");
}

#[test]
fn corrupt_data_keeps_prefix() {
    let long = (0..2000).map(|i| format!("{i} ")).collect::<String>().into_bytes();
    let mut compressed = zlib(&long);
    compressed.truncate(compressed.len() / 2);

    let data = base()
        .stream(4, "/Filter /FlateDecode", &compressed)
        .finish("/Root 1 0 R");
    let doc = open(data).unwrap();

    let object = doc.get_object(ObjectIdentifier::new(4, 0)).unwrap();
    let err = object
        .as_stream()
        .unwrap()
        .decoded(&DecodeSettings::default())
        .unwrap_err();

    assert_eq!(err.filter, Some(Filter::FlateDecode));
    assert_eq!(err.kind, FilterErrorKind::Corrupt);
    assert!(err.prefix_len() > 0);
    assert!(long.starts_with(&err.prefix));
}

#[test]
fn decoded_size_limit() {
    let settings = DecodeSettings {
        max_decoded_size: 100,
        ..DecodeSettings::default()
    };
    let chain = [(Filter::FlateDecode, Dict::new())];
    let err = filter::decode(&zlib(&[0; 10_000]), &chain, &settings).unwrap_err();

    assert_eq!(err.kind, FilterErrorKind::SizeLimit);
}

#[test]
fn cancelled_decoding() {
    let flag = Arc::new(AtomicBool::new(false));
    let settings = DecodeSettings {
        cancel: quire_syntax::CancelToken::from_flag(flag.clone()),
        ..DecodeSettings::default()
    };
    let chain = [(Filter::AsciiHexDecode, Dict::new())];

    assert_eq!(&filter::decode(b"414243>", &chain, &settings).unwrap()[..], b"ABC");

    flag.store(true, Ordering::Relaxed);
    let err = filter::decode(b"414243>", &chain, &settings).unwrap_err();
    assert_eq!(err.kind, FilterErrorKind::Cancelled);
}

#[test]
fn unknown_filters() {
    let data = base()
        .stream(4, "/Filter /NoSuchDecode", b"data")
        .finish("/Root 1 0 R");
    let doc = open(data).unwrap();

    let object = doc.get_object(ObjectIdentifier::new(4, 0)).unwrap();
    let err = object
        .as_stream()
        .unwrap()
        .decoded(&DecodeSettings::default())
        .unwrap_err();

    assert_eq!(err.filter, None);
    assert_eq!(err.kind, FilterErrorKind::Unsupported);
}

#[test]
fn unsupported_filter_after_flate() {
    let data = base()
        .stream(4, "/Filter [/FlateDecode /JPXDecode]", &zlib(TEXT))
        .finish("/Root 1 0 R");
    let doc = open(data).unwrap();

    let object = doc.get_object(ObjectIdentifier::new(4, 0)).unwrap();
    let err = object
        .as_stream()
        .unwrap()
        .decoded(&DecodeSettings::default())
        .unwrap_err();

    assert_eq!(err.filter, Some(Filter::JpxDecode));
    assert_eq!(err.kind, FilterErrorKind::Unsupported);
    assert_eq!(&err.prefix[..], TEXT);
}

#[test]
fn huge_predictor_columns() {
    let predicted = |columns: i64| {
        let mut params = Dict::new();
        params.insert(PREDICTOR, Object::integer(12));
        params.insert(COLUMNS, Object::integer(columns));

        let chain = [(Filter::FlateDecode, params)];
        filter::decode(&zlib(&[0, 1, 2, 3]), &chain, &DecodeSettings::default())
    };

    assert_eq!(&predicted(1_000_000_000_000_000).unwrap()[..], &[1, 2, 3]);
    assert_eq!(predicted(i64::MAX).unwrap_err().kind, FilterErrorKind::Unsupported);
}
