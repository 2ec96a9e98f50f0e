use crate::{CATALOG, PAGES, PdfBuilder};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockEncryptMut, KeyIvInit};
use quire_syntax::{
    Credential, DecodeSettings, Document, EncryptionError, Error, MemorySource, ObjectIdentifier,
    Permissions, Settings,
};

const ID: &str = "0123456789abcdeffedcba9876543210";

/// RC4 with a 128-bit key, user password "user" and owner password "owner".
const RC4_ENCRYPT: &str = "<</Filter /Standard /V 2 /R 3 /Length 128 /P -3900 \
    /O <0ba3835f88f90388e74e54584125ce142be0de24c6b0d37746e075b891756671> \
    /U <c5d36e3d5c74761f6f86662e81604c7600000000000000000000000000000000>>>";

/// AES-256 with the same passwords.
const AES_ENCRYPT: &str = "<</Filter /Standard /V 5 /R 6 /Length 256 /P -3904 \
    /O <d64209e8dc850fa22dea7d0ba94a1565ccfbaa41700d81f58548bdccad3ec7786f7673616c7430316f6b73616c743031> \
    /U <647eea44ca0648aaea2bd4bd30be64c4cfa85b768d03b1522cb09499a54e5b41757673616c743031756b73616c743031> \
    /OE <91fa49c151b11e60271a6bf9db2a82dfce151936a38fdf9bdc1f7ec3e5f19eda> \
    /UE <f5eca1c1f251008d3bea6bea5268b91287f4484eee2347222ce3d1351ccffb67> \
    /Perms <1a3484a04b8e0b470560a37248b44e2b> \
    /CF <</StdCF <</CFM /AESV3 /AuthEvent /DocOpen /Length 32>>>> /StmF /StdCF /StrF /StdCF>>";

/// The file keys that both passwords derive.
const RC4_KEY: &str = "a18e68cf2ee9b4f494c0a6d7cbfc9fe6";
const AES_KEY: &str = "404142434445464748494a4b4c4d4e4f505152535455565758595a5b5c5d5e5f";

const TITLE: &[u8] = b"Secret Title";
const CONTENT: &[u8] = b"BT /F1 12 Tf ET";

fn hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut state: Vec<u8> = (0..=255).collect();
    let mut j = 0_u8;

    for i in 0..256 {
        j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
        state.swap(i, j as usize);
    }

    let (mut i, mut j) = (0_u8, 0_u8);

    data.iter()
        .map(|b| {
            i = i.wrapping_add(1);
            j = j.wrapping_add(state[i as usize]);
            state.swap(i as usize, j as usize);
            let k = state[i as usize].wrapping_add(state[j as usize]);

            b ^ state[k as usize]
        })
        .collect()
}

/// RC4 with the key of object `num`, generation 0.
fn rc4_object(num: u32, data: &[u8]) -> Vec<u8> {
    let mut input = hex(RC4_KEY);
    input.extend_from_slice(&num.to_le_bytes()[..3]);
    input.extend_from_slice(&[0, 0]);

    rc4(&md5::compute(&input).0, data)
}

fn aes256(iv: [u8; 16], data: &[u8]) -> Vec<u8> {
    let pad = 16 - data.len() % 16;
    let mut buf = data.to_vec();
    buf.extend(std::iter::repeat_n(pad as u8, pad));
    let len = buf.len();

    cbc::Encryptor::<aes::Aes256>::new_from_slices(&hex(AES_KEY), &iv)
        .unwrap()
        .encrypt_padded_mut::<NoPadding>(&mut buf, len)
        .unwrap();

    [iv.as_slice(), &buf].concat()
}

fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

fn encrypted_pdf(encrypt: &str, title: &[u8], content: &[u8]) -> Vec<u8> {
    PdfBuilder::new("1.7")
        .object(1, CATALOG)
        .object(2, PAGES)
        .object(3, "<</Type /Page /Parent 2 0 R /Contents 5 0 R>>")
        .object(4, format!("<</Title <{}>>>", to_hex(title)))
        .stream(5, "", content)
        .object(6, encrypt)
        .finish(&format!("/Root 1 0 R /Info 4 0 R /Encrypt 6 0 R /ID [<{ID}> <{ID}>]"))
}

fn rc4_pdf() -> Vec<u8> {
    encrypted_pdf(RC4_ENCRYPT, &rc4_object(4, TITLE), &rc4_object(5, CONTENT))
}

fn aes_pdf() -> Vec<u8> {
    encrypted_pdf(AES_ENCRYPT, &aes256([1; 16], TITLE), &aes256([2; 16], CONTENT))
}

fn open(data: Vec<u8>, password: &str) -> quire_syntax::Result<Document> {
    Document::open(MemorySource::new(data), Some(&Credential::password(password)))
}

fn check_decrypted(doc: &Document) {
    assert_eq!(
        doc.metadata().unwrap().title.map(String::into_bytes).as_deref(),
        Some(TITLE)
    );

    let content = doc.get_object(ObjectIdentifier::new(5, 0)).unwrap();
    let data = content
        .as_stream()
        .unwrap()
        .decoded(&DecodeSettings::default())
        .unwrap();
    assert_eq!(&data[..], CONTENT);
}

#[test]
fn rc4_user_password() {
    let doc = open(rc4_pdf(), "user").unwrap();

    assert!(doc.is_encrypted());
    assert!(!doc.is_owner());
    let permissions = doc.permissions().unwrap();
    assert!(permissions.contains(Permissions::PRINT));
    assert!(!permissions.contains(Permissions::MODIFY));
    assert!(!permissions.contains(Permissions::COPY));
    check_decrypted(&doc);
}

#[test]
fn rc4_owner_password() {
    let doc = open(rc4_pdf(), "owner").unwrap();

    assert!(doc.is_owner());
    assert_eq!(doc.permissions(), Some(Permissions::all()));
    check_decrypted(&doc);
}

#[test]
fn rc4_rejected_credentials() {
    assert_eq!(
        open(rc4_pdf(), "wrong").unwrap_err(),
        Error::Encryption(EncryptionError::RejectedCredential)
    );
    assert_eq!(
        Document::open(MemorySource::new(rc4_pdf()), None).unwrap_err(),
        Error::Encryption(EncryptionError::RejectedCredential)
    );
}

#[test]
fn lenient_credentials() {
    let settings = Settings {
        strict_credentials: false,
        ..Settings::default()
    };
    let doc = Document::open_with_settings(
        MemorySource::new(rc4_pdf()),
        Some(&Credential::password("wrong")),
        settings,
    )
    .unwrap();

    assert!(doc.is_encrypted());
    assert!(!doc.is_owner());
    assert_ne!(doc.metadata().unwrap().title.as_deref(), Some("Secret Title"));
}

#[test]
fn rc4_file_key() {
    let key = Credential::Key(hex(RC4_KEY));
    let doc = Document::open(MemorySource::new(rc4_pdf()), Some(&key)).unwrap();

    check_decrypted(&doc);
}

#[test]
fn aes256_passwords() {
    let user = open(aes_pdf(), "user").unwrap();
    assert!(!user.is_owner());
    assert_eq!(
        user.permissions(),
        Some(Permissions::from_bits_truncate(-3904_i64 as u32))
    );
    check_decrypted(&user);

    let owner = open(aes_pdf(), "owner").unwrap();
    assert!(owner.is_owner());
    check_decrypted(&owner);
}

#[test]
fn aes256_rejected_credentials() {
    assert_eq!(
        open(aes_pdf(), "nope").unwrap_err(),
        Error::Encryption(EncryptionError::RejectedCredential)
    );
}

#[test]
fn encryption_survives_recovery() {
    let data = rc4_pdf();
    let end = String::from_utf8_lossy(&data).rfind("\nxref\n").unwrap();
    let mut truncated = data[..end].to_vec();
    truncated.extend_from_slice(
        format!("\ntrailer\n<</Root 1 0 R /Info 4 0 R /Encrypt 6 0 R /ID [<{ID}> <{ID}>]>>\n")
            .as_bytes(),
    );

    let doc = open(truncated, "user").unwrap();

    assert!(doc.was_recovered());
    check_decrypted(&doc);
}
