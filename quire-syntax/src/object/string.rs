use std::fmt;

/// A PDF string.
///
/// The bytes are stored decoded: escapes of literal strings and the digits of
/// hex strings are resolved, and the data of encrypted documents is already
/// decrypted.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PdfString {
    bytes: Vec<u8>,
    hex: bool,
}

impl PdfString {
    /// Create a literal string.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: false,
        }
    }

    /// Create a string that is written in hex form.
    pub fn hex(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hex: true,
        }
    }

    /// The bytes of the string.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the string and return its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Whether the string was written in hex form.
    pub fn is_hex(&self) -> bool {
        self.hex
    }

    pub(crate) fn set_bytes(&mut self, bytes: Vec<u8>) {
        self.bytes = bytes;
    }

    /// Decode the string as a text string.
    ///
    /// Strings starting with a UTF-16BE or UTF-8 byte order mark are decoded
    /// accordingly, all others as `PDFDocEncoding`.
    pub fn to_text(&self) -> String {
        match self.bytes.as_slice() {
            [0xFE, 0xFF, rest @ ..] => {
                let units = rest
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]));

                char::decode_utf16(units)
                    .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect()
            }
            [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
            bytes => bytes.iter().map(|b| pdf_doc_char(*b)).collect(),
        }
    }

    /// Write the string in file syntax.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        if self.hex {
            out.push(b'<');

            for b in &self.bytes {
                out.extend_from_slice(format!("{b:02X}").as_bytes());
            }

            out.push(b'>');
        } else {
            out.push(b'(');

            for &b in &self.bytes {
                match b {
                    b'(' | b')' | b'\\' => {
                        out.push(b'\\');
                        out.push(b);
                    }
                    b'\r' => out.extend_from_slice(b"\\r"),
                    b'\n' => out.extend_from_slice(b"\\n"),
                    _ => out.push(b),
                }
            }

            out.push(b')');
        }
    }
}

const PDF_DOC_LOW: [char; 8] = ['˘', 'ˇ', 'ˆ', '˙', '˝', '˛', '˚', '˜'];

const PDF_DOC_HIGH: [char; 33] = [
    '•', '†', '‡', '…', '—', '–', 'ƒ', '⁄', '‹', '›', '−', '‰', '„', '“', '”', '‘', '’', '‚', '™',
    'ﬁ', 'ﬂ', 'Ł', 'Œ', 'Š', 'Ÿ', 'Ž', 'ı', 'ł', 'œ', 'š', 'ž', '\u{FFFD}', '€',
];

fn pdf_doc_char(b: u8) -> char {
    match b {
        0x18..=0x1F => PDF_DOC_LOW[(b - 0x18) as usize],
        0x80..=0xA0 => PDF_DOC_HIGH[(b - 0x80) as usize],
        _ => b as char,
    }
}

impl fmt::Debug for PdfString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hex {
            write!(f, "<{}>", String::from_utf8_lossy(&self.bytes))
        } else {
            write!(f, "({})", String::from_utf8_lossy(&self.bytes))
        }
    }
}
