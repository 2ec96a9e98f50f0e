use smallvec::SmallVec;
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// A PDF name, stored without the leading solidus and with `#XX` escapes
/// resolved.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Name(SmallVec<[u8; 23]>);

impl Name {
    /// Create a name from its decoded bytes.
    pub fn new(data: &[u8]) -> Self {
        Self(SmallVec::from_slice(data))
    }

    /// Create a name from its raw representation in a file, resolving `#XX`
    /// escapes.
    ///
    /// An escape that is not followed by two hex digits is kept literally.
    pub fn from_escaped(data: &[u8]) -> Self {
        if !data.contains(&b'#') {
            return Self::new(data);
        }

        let mut decoded = SmallVec::with_capacity(data.len());
        let mut i = 0;

        while i < data.len() {
            let b = data[i];

            if b == b'#'
                && let Some(hi) = data.get(i + 1).and_then(|h| hex_value(*h))
                && let Some(lo) = data.get(i + 2).and_then(|h| hex_value(*h))
            {
                decoded.push(hi << 4 | lo);
                i += 3;
            } else {
                decoded.push(b);
                i += 1;
            }
        }

        Self(decoded)
    }

    /// The decoded bytes of the name.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The name as a string, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Write the name in file syntax, including the solidus.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(b'/');

        for &b in self.0.iter() {
            if needs_escape(b) {
                out.push(b'#');
                out.extend_from_slice(format!("{b:02X}").as_bytes());
            } else {
                out.push(b);
            }
        }
    }
}

fn needs_escape(b: u8) -> bool {
    !(b'!'..=b'~').contains(&b)
        || matches!(
            b,
            b'#' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
        )
}

pub(crate) fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state);
    }
}

impl Deref for Name {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<[u8]> for Name {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Name {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for Name {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl PartialEq<[u8]> for Name {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

impl PartialEq<&[u8]> for Name {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_bytes() == *other
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::with_capacity(self.0.len() + 1);
        self.write_to(&mut out);
        f.write_str(&String::from_utf8_lossy(&out))
    }
}

#[cfg(test)]
mod tests {
    use super::Name;

    #[test]
    fn escapes_are_resolved() {
        assert_eq!(Name::from_escaped(b"#41").as_bytes(), b"A");
        assert_eq!(Name::from_escaped(b"#411").as_bytes(), b"A1");
        assert_eq!(Name::from_escaped(b"Lime#20Green").as_bytes(), b"Lime Green");
        assert_eq!(Name::from_escaped(b"A#").as_bytes(), b"A#");
    }

    #[test]
    fn incomplete_escape_is_literal() {
        assert_eq!(Name::from_escaped(b"#4").as_bytes(), b"#4");
        assert_eq!(Name::from_escaped(b"#4G").as_bytes(), b"#4G");
    }

    #[test]
    fn writing_escapes_special_bytes() {
        let mut out = Vec::new();
        Name::new(b"A B#(\x80").write_to(&mut out);
        assert_eq!(out, b"/A#20B#23#28#80");
    }

    #[test]
    fn lookup_by_bytes() {
        let mut map = rustc_hash::FxHashMap::default();
        map.insert(Name::new(b"Type"), 1);
        assert_eq!(map.get(&b"Type"[..]), Some(&1));
    }
}
