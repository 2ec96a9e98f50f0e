//! Settings for reading documents.

use crate::filter::Filter;
use crate::object::Dict;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Settings for opening and reading a document.
#[derive(Clone)]
pub struct Settings {
    /// The maximum nesting depth of arrays and dictionaries.
    pub max_nesting_depth: usize,
    /// The maximum length of a chain of nested reference resolutions.
    pub max_reference_depth: usize,
    /// The maximum number of cross-reference sections that are followed.
    pub max_xref_sections: usize,
    /// The number of bytes that is first read when parsing an object. The
    /// window is doubled until the object fits.
    pub initial_window: usize,
    /// How many bytes at the end of the file are searched for `startxref`.
    pub startxref_window: usize,
    /// How the length of stream data is determined.
    pub stream_length_policy: StreamLengthPolicy,
    /// How many malformed objects are tolerated before reads fail with
    /// [`Limit::MalformedObjects`](crate::Limit::MalformedObjects). `None`
    /// tolerates any number.
    pub max_malformed_objects: Option<usize>,
    /// The maximum size of the output of a single filter.
    pub max_decoded_size: usize,
    /// Whether opening fails when the credential is rejected. Otherwise the
    /// document is decrypted with the derived key regardless.
    pub strict_credentials: bool,
    /// Whether all objects are scanned for pages if the page tree is empty.
    pub brute_force_pages: bool,
    /// The maximum number of pages that are collected.
    pub max_pages: usize,
    /// A token that aborts long-running operations.
    pub cancel: CancelToken,
    /// A decoder that takes precedence over the built-in image filters.
    pub image_decoder: Option<Arc<dyn ImageDecoder>>,
}

impl Settings {
    /// The settings that apply to stream decoding.
    pub fn decode_settings(&self) -> DecodeSettings {
        DecodeSettings {
            max_decoded_size: self.max_decoded_size,
            cancel: self.cancel.clone(),
            image_decoder: self.image_decoder.clone(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_nesting_depth: 64,
            max_reference_depth: 64,
            max_xref_sections: 512,
            initial_window: 8 * 1024,
            startxref_window: 4 * 1024,
            stream_length_policy: StreamLengthPolicy::default(),
            max_malformed_objects: None,
            max_decoded_size: 256 * 1024 * 1024,
            strict_credentials: true,
            brute_force_pages: true,
            max_pages: 1 << 20,
            cancel: CancelToken::default(),
            image_decoder: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("max_nesting_depth", &self.max_nesting_depth)
            .field("max_reference_depth", &self.max_reference_depth)
            .field("max_xref_sections", &self.max_xref_sections)
            .field("initial_window", &self.initial_window)
            .field("startxref_window", &self.startxref_window)
            .field("stream_length_policy", &self.stream_length_policy)
            .field("max_malformed_objects", &self.max_malformed_objects)
            .field("max_decoded_size", &self.max_decoded_size)
            .field("strict_credentials", &self.strict_credentials)
            .field("brute_force_pages", &self.brute_force_pages)
            .field("max_pages", &self.max_pages)
            .field("cancel", &self.cancel)
            .field("image_decoder", &self.image_decoder.is_some())
            .finish()
    }
}

/// How the extent of stream data is determined.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum StreamLengthPolicy {
    /// Use `/Length` if `endstream` follows the data it describes, otherwise
    /// search for the `endstream` keyword.
    #[default]
    Validate,
    /// Use `/Length` as is. The keyword is only searched if the entry is
    /// missing or points past the end of the file.
    TrustDeclared,
    /// Ignore `/Length` and always search for the `endstream` keyword.
    ScanForEndstream,
}

/// The settings used by the filter pipeline.
#[derive(Clone)]
pub struct DecodeSettings {
    /// The maximum size of the output of a single filter.
    pub max_decoded_size: usize,
    /// A token that aborts decoding.
    pub cancel: CancelToken,
    /// A decoder that takes precedence over the built-in image filters.
    pub image_decoder: Option<Arc<dyn ImageDecoder>>,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Settings::default().decode_settings()
    }
}

impl fmt::Debug for DecodeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeSettings")
            .field("max_decoded_size", &self.max_decoded_size)
            .field("cancel", &self.cancel)
            .field("image_decoder", &self.image_decoder.is_some())
            .finish()
    }
}

/// A pluggable decoder for image filters.
///
/// It is consulted for `DCTDecode`, `JPXDecode`, `JBIG2Decode` and
/// `CCITTFaxDecode` before the built-in decoders.
pub trait ImageDecoder: Send + Sync {
    /// Decode `data`. Returning `None` falls back to the built-in decoder,
    /// if there is one.
    fn decode(&self, filter: Filter, data: &[u8], params: &Dict) -> Option<Vec<u8>>;
}

#[derive(Clone)]
enum CancelSource {
    Never,
    Flag(Arc<AtomicBool>),
    Predicate(Arc<dyn Fn() -> bool + Send + Sync>),
}

/// A cooperative cancellation token.
///
/// The token is polled at regular intervals, for example once per parsed
/// object or decoded chunk.
#[derive(Clone)]
pub struct CancelToken(CancelSource);

impl CancelToken {
    /// A token that never cancels.
    pub fn never() -> Self {
        Self(CancelSource::Never)
    }

    /// A token that cancels once `flag` is set.
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self(CancelSource::Flag(flag))
    }

    /// A token that cancels once `predicate` returns `true`.
    pub fn from_fn(predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self(CancelSource::Predicate(Arc::new(predicate)))
    }

    /// Whether the current operation should be aborted.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        match &self.0 {
            CancelSource::Never => false,
            CancelSource::Flag(flag) => flag.load(Ordering::Relaxed),
            CancelSource::Predicate(predicate) => predicate(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.0 {
            CancelSource::Never => "never",
            CancelSource::Flag(_) => "flag",
            CancelSource::Predicate(_) => "predicate",
        };

        write!(f, "CancelToken({kind})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_token() {
        let flag = Arc::new(AtomicBool::new(false));
        let token = CancelToken::from_flag(flag.clone());
        assert!(!token.is_cancelled());
        flag.store(true, Ordering::Relaxed);
        assert!(token.is_cancelled());
    }

    #[test]
    fn decode_settings_follow_settings() {
        let settings = Settings {
            max_decoded_size: 10,
            cancel: CancelToken::from_fn(|| true),
            ..Settings::default()
        };
        let decode = settings.decode_settings();

        assert_eq!(decode.max_decoded_size, 10);
        assert!(decode.cancel.is_cancelled());
        assert!(!DecodeSettings::default().cancel.is_cancelled());
    }
}
