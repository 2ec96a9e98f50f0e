//! Writing objects in file syntax.

use crate::object::{Dict, Number, Object, ObjectIdentifier, Stream, keys};
use std::fmt;

impl Object {
    /// Write the object in file syntax.
    ///
    /// Dictionary entries are written sorted by key, so the output is
    /// deterministic.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::Null => out.extend_from_slice(b"null"),
            Self::Boolean(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
            Self::Number(n) => n.write_to(out),
            Self::String(s) => s.write_to(out),
            Self::Name(n) => n.write_to(out),
            Self::Array(items) => {
                out.push(b'[');

                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }

                    item.write_to(out);
                }

                out.push(b']');
            }
            Self::Dict(dict) => dict.write_to(out),
            Self::Stream(stream) => stream.write_to(out),
            Self::Reference(id) => id.write_reference(out),
        }
    }

    /// Write the object as the body of an indirect object definition.
    pub fn write_indirect(&self, id: ObjectIdentifier, out: &mut Vec<u8>) {
        out.extend_from_slice(format!("{} {} obj\n", id.num, id.generation).as_bytes());
        self.write_to(out);
        out.extend_from_slice(b"\nendobj\n");
    }
}

impl Number {
    fn write_to(&self, out: &mut Vec<u8>) {
        match *self {
            Self::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
            Self::Real(r) => out.extend_from_slice(format_real(r).as_bytes()),
        }
    }
}

// Reals have no exponent form in the object syntax.
fn format_real(r: f64) -> String {
    if !r.is_finite() {
        return "0".to_string();
    }

    if r.fract() == 0.0 && r.abs() < 1e15 {
        return format!("{r:.1}");
    }

    let formatted = format!("{r:.10}");
    let trimmed = formatted.trim_end_matches('0');

    if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_string()
    }
}

impl ObjectIdentifier {
    fn write_reference(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(format!("{} {} R", self.num, self.generation).as_bytes());
    }
}

impl Dict {
    /// Write the dictionary in file syntax.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"<<");

        for (key, value) in self.sorted() {
            key.write_to(out);
            out.push(b' ');
            value.write_to(out);
        }

        out.extend_from_slice(b">>");
    }
}

impl Stream {
    /// Write the stream in file syntax, with a `Length` that matches the raw
    /// data.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let mut dict = self.dict().clone();
        dict.insert(keys::LENGTH, Object::integer(self.raw_data().len() as i64));
        dict.write_to(out);
        out.extend_from_slice(b"\nstream\n");
        out.extend_from_slice(self.raw_data());
        out.extend_from_slice(b"\nendstream");
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::new();
        self.write_to(&mut out);
        f.write_str(&String::from_utf8_lossy(&out))
    }
}

impl fmt::Display for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::new();
        self.write_to(&mut out);
        f.write_str(&String::from_utf8_lossy(&out))
    }
}

#[cfg(test)]
mod tests {
    use crate::object::{Dict, Object, ObjectIdentifier, PdfString, Stream, keys};

    #[test]
    fn scalars() {
        assert_eq!(Object::Null.to_string(), "null");
        assert_eq!(Object::Boolean(true).to_string(), "true");
        assert_eq!(Object::integer(-12).to_string(), "-12");
        assert_eq!(Object::real(0.5).to_string(), "0.5");
        assert_eq!(Object::real(3.0).to_string(), "3.0");
        assert_eq!(Object::real(1e-3).to_string(), "0.001");
        assert_eq!(Object::reference(3, 1).to_string(), "3 1 R");
    }

    #[test]
    fn composites() {
        let mut dict = Dict::new();
        dict.insert(keys::TYPE, Object::name(b"Pages"));
        dict.insert(
            keys::KIDS,
            Object::Array(vec![Object::reference(2, 0), Object::reference(3, 0)]),
        );
        dict.insert(keys::TITLE, Object::String(PdfString::new(b"A(B)".to_vec())));

        assert_eq!(
            Object::Dict(dict).to_string(),
            "<</Kids [2 0 R 3 0 R]/Title (A\\(B\\))/Type /Pages>>"
        );
    }

    #[test]
    fn streams_get_their_length() {
        let stream = Stream::new(Dict::new(), &b"abc"[..]);
        assert_eq!(
            Object::Stream(stream).to_string(),
            "<</Length 3>>\nstream\nabc\nendstream"
        );
    }

    #[test]
    fn indirect_definition() {
        let mut out = Vec::new();
        Object::integer(7).write_indirect(ObjectIdentifier::new(4, 0), &mut out);
        assert_eq!(out, b"4 0 obj\n7\nendobj\n");
    }
}
