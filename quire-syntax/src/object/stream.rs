use crate::config::DecodeSettings;
use crate::error::{FilterError, FilterErrorKind};
use crate::filter;
use crate::object::Dict;
use bytes::Bytes;
use std::fmt;
use std::sync::OnceLock;

/// A PDF stream.
///
/// The raw data is already decrypted but still filtered. The decoded form is
/// computed on first access and cached.
#[derive(Clone)]
pub struct Stream {
    dict: Dict,
    data: Bytes,
    decoded: OnceLock<Result<Bytes, FilterError>>,
}

impl Stream {
    /// Create a new stream.
    pub fn new(dict: Dict, data: impl Into<Bytes>) -> Self {
        Self {
            dict,
            data: data.into(),
            decoded: OnceLock::new(),
        }
    }

    /// The stream dictionary.
    pub fn dict(&self) -> &Dict {
        &self.dict
    }

    /// The raw, still filtered data.
    pub fn raw_data(&self) -> &Bytes {
        &self.data
    }

    /// The data with all filters applied.
    ///
    /// On failure, the error carries the output that could be decoded. The
    /// result is cached unless decoding was cancelled.
    pub fn decoded(&self, settings: &DecodeSettings) -> Result<Bytes, FilterError> {
        if let Some(result) = self.decoded.get() {
            return result.clone();
        }

        let result = filter::decode_stream(self, settings);

        if !matches!(&result, Err(e) if e.kind == FilterErrorKind::Cancelled) {
            let _ = self.decoded.set(result.clone());
        }

        result
    }

    /// Whether the decoded data is currently cached.
    pub fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }

    /// Drop the cached decoded data. It is recomputed on the next access.
    pub fn forget_decoded(&mut self) {
        self.decoded = OnceLock::new();
    }
}

impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        self.dict == other.dict && self.data == other.data
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("dict", &self.dict)
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Stream;
    use crate::config::{CancelToken, DecodeSettings};
    use crate::error::FilterErrorKind;
    use crate::object::{Dict, Object, keys};

    fn hex_stream() -> Stream {
        let mut dict = Dict::new();
        dict.insert(keys::FILTER, Object::name(keys::AHX));
        Stream::new(dict, &b"414243>"[..])
    }

    #[test]
    fn decoded_is_cached() {
        let stream = hex_stream();
        assert!(!stream.is_decoded());
        let decoded = stream.decoded(&DecodeSettings::default()).unwrap();
        assert_eq!(&decoded[..], b"ABC");
        assert!(stream.is_decoded());
    }

    #[test]
    fn cancellation_is_not_cached() {
        let stream = hex_stream();
        let settings = DecodeSettings {
            cancel: CancelToken::from_fn(|| true),
            ..DecodeSettings::default()
        };

        let err = stream.decoded(&settings).unwrap_err();
        assert_eq!(err.kind, FilterErrorKind::Cancelled);
        assert!(!stream.is_decoded());
        assert!(stream.decoded(&DecodeSettings::default()).is_ok());
    }

    #[test]
    fn forgetting_decoded_data() {
        let mut stream = hex_stream();
        stream.decoded(&DecodeSettings::default()).unwrap();
        stream.forget_decoded();
        assert!(!stream.is_decoded());
    }
}
