use quire_syntax::{Dict, Error, FdfDocument, Object, PdfString};

const FORM_DATA: &[u8] = b"%FDF-1.2\r
%\xE2\xE3\xCF\xD3\r
1 0 obj\r
<</FDF <</Fields [<</T (name) /V (Jane Doe)>> <</T (agree) /V /Yes>>] /F (application.pdf) /ID [<0A1B> <2C3D>]>>>>\r
endobj\r
trailer\r
<</Root 1 0 R>>\r
%%EOF\r
";

#[test]
fn fields() {
    let doc = FdfDocument::parse(FORM_DATA).unwrap();
    let fdf = doc.fdf().unwrap();

    assert_eq!(
        fdf.get_string(b"F").map(PdfString::to_text).as_deref(),
        Some("application.pdf")
    );

    let fields = fdf.get_array(b"Fields").unwrap();
    let values = fields
        .iter()
        .filter_map(Object::as_dict)
        .map(|field| field.get(b"V").cloned().unwrap_or(Object::Null))
        .collect::<Vec<_>>();

    assert_eq!(
        values,
        [Object::string(b"Jane Doe".to_vec()), Object::name(b"Yes")]
    );
}

#[test]
fn direct_root() {
    let doc = FdfDocument::parse(&b"trailer <</Root <</FDF <</F (x.pdf)>>>>>>"[..]).unwrap();

    assert_eq!(doc.objects().count(), 1);
    assert!(doc.fdf().is_some());
}

#[test]
fn missing_root() {
    assert!(matches!(
        FdfDocument::parse(&b"1 0 obj <<>> endobj trailer <<>>"[..]),
        Err(Error::Structure(_))
    ));
    assert!(FdfDocument::parse(&b""[..]).is_err());
}

#[test]
fn written_documents_parse() {
    let mut doc = FdfDocument::new();
    let mut field = Dict::new();
    field.insert("T", Object::string(b"name".to_vec()));
    field.insert("V", Object::string(b"(nested) \\ value".to_vec()));
    let field = doc.insert(Object::Dict(field));

    let parsed = FdfDocument::parse(doc.to_bytes()).unwrap();

    assert_eq!(parsed, doc);
    assert_eq!(
        parsed
            .get(field.num)
            .and_then(Object::as_dict)
            .and_then(|f| f.get_string(b"V"))
            .map(PdfString::as_bytes),
        Some(&b"(nested) \\ value"[..])
    );
}
