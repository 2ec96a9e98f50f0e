//! PDF objects.

use std::fmt;

mod dict;
mod name;
mod stream;
mod string;
mod write;

pub use dict::{Dict, keys};
pub use name::Name;
pub(crate) use name::hex_value;
pub use stream::Stream;
pub use string::PdfString;

/// The identifier of an indirect object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectIdentifier {
    /// The object number.
    pub num: u32,
    /// The generation number.
    pub generation: u16,
}

impl ObjectIdentifier {
    /// Create a new object identifier.
    pub const fn new(num: u32, generation: u16) -> Self {
        Self { num, generation }
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.num, self.generation)
    }
}

/// A numeric object.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Number {
    /// An integer.
    Integer(i64),
    /// A real number.
    Real(f64),
}

impl Number {
    /// The number as an integer. Reals are truncated.
    pub fn as_i64(&self) -> i64 {
        match *self {
            Self::Integer(i) => i,
            Self::Real(r) => r as i64,
        }
    }

    /// The number as a real.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::Integer(i) => i as f64,
            Self::Real(r) => r,
        }
    }
}

/// A PDF object.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// The null object.
    Null,
    /// A boolean.
    Boolean(bool),
    /// A number.
    Number(Number),
    /// A string.
    String(PdfString),
    /// A name.
    Name(Name),
    /// An array.
    Array(Vec<Self>),
    /// A dictionary.
    Dict(Dict),
    /// A stream.
    Stream(Stream),
    /// A reference to an indirect object.
    Reference(ObjectIdentifier),
}

impl Object {
    /// An integer object.
    pub fn integer(i: i64) -> Self {
        Self::Number(Number::Integer(i))
    }

    /// A real object.
    pub fn real(r: f64) -> Self {
        Self::Number(Number::Real(r))
    }

    /// A name object.
    pub fn name(name: &[u8]) -> Self {
        Self::Name(Name::new(name))
    }

    /// A literal string object.
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Self::String(PdfString::new(bytes))
    }

    /// A reference object.
    pub fn reference(num: u32, generation: u16) -> Self {
        Self::Reference(ObjectIdentifier::new(num, generation))
    }

    /// Whether this is the null object.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The boolean value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The number value.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The value of an integer object.
    ///
    /// Reals are only accepted if they have no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(Number::Integer(i)) => Some(*i),
            Self::Number(Number::Real(r)) if r.fract() == 0.0 && r.is_finite() => Some(*r as i64),
            _ => None,
        }
    }

    /// The value of a number object as a real.
    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(|n| n.as_f64())
    }

    /// The string value.
    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The name value.
    pub fn as_name(&self) -> Option<&Name> {
        match self {
            Self::Name(n) => Some(n),
            _ => None,
        }
    }

    /// The array value.
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The dictionary value. For streams, this is the stream dictionary.
    pub fn as_dict(&self) -> Option<&Dict> {
        match self {
            Self::Dict(d) => Some(d),
            Self::Stream(s) => Some(s.dict()),
            _ => None,
        }
    }

    /// The stream value.
    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Self::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// The referenced object identifier.
    pub fn as_reference(&self) -> Option<ObjectIdentifier> {
        match self {
            Self::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// A short name of the object kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Name(_) => "name",
            Self::Array(_) => "array",
            Self::Dict(_) => "dictionary",
            Self::Stream(_) => "stream",
            Self::Reference(_) => "reference",
        }
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Self::integer(value)
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Self::real(value)
    }
}

impl From<Name> for Object {
    fn from(value: Name) -> Self {
        Self::Name(value)
    }
}

impl From<PdfString> for Object {
    fn from(value: PdfString) -> Self {
        Self::String(value)
    }
}

impl From<Dict> for Object {
    fn from(value: Dict) -> Self {
        Self::Dict(value)
    }
}

impl From<Stream> for Object {
    fn from(value: Stream) -> Self {
        Self::Stream(value)
    }
}

impl From<Vec<Self>> for Object {
    fn from(value: Vec<Self>) -> Self {
        Self::Array(value)
    }
}

impl From<ObjectIdentifier> for Object {
    fn from(value: ObjectIdentifier) -> Self {
        Self::Reference(value)
    }
}
