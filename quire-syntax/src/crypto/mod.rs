//! Decryption of documents protected by the standard security handler.
//!
//! Only decryption is supported. Strings and streams are decrypted while
//! objects are loaded, so the rest of the crate never sees ciphertext.

use crate::error::EncryptionError;
use crate::object::keys::{
    CF, CFM, CRYPT, DECODE_PARMS, ENCRYPT_META_DATA, FILTER, IDENTITY, LENGTH, NAME, P, R,
    STANDARD, STM_F, STR_F, V,
};
use crate::object::{Dict, Name, Object, ObjectIdentifier};
use bitflags::bitflags;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use log::warn;
use rustc_hash::FxHashMap;

mod rc4;
mod standard;

use rc4::rc4;
use standard::{FileKey, Revision};

/// A credential for opening an encrypted document.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// A user or owner password. For revisions 5 and 6 it is expected to be
    /// UTF-8, otherwise in `PDFDocEncoding`.
    Password(Vec<u8>),
    /// The file encryption key itself. No password check takes place.
    Key(Vec<u8>),
}

impl Credential {
    /// A password credential.
    pub fn password(password: impl Into<Vec<u8>>) -> Self {
        Self::Password(password.into())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(..)"),
            Self::Key(_) => f.write_str("Key(..)"),
        }
    }
}

bitflags! {
    /// The access permissions from the `P` entry of the encryption dictionary.
    ///
    /// The flags are reported as is. Enforcing them is up to the caller.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct Permissions: u32 {
        /// Printing the document.
        const PRINT = 1 << 2;
        /// Modifying the contents.
        const MODIFY = 1 << 3;
        /// Copying or extracting text and graphics.
        const COPY = 1 << 4;
        /// Adding or modifying annotations and filling in forms.
        const ANNOTATE = 1 << 5;
        /// Filling in existing form fields.
        const FILL_FORMS = 1 << 8;
        /// Extracting text and graphics for accessibility.
        const EXTRACT_ACCESSIBILITY = 1 << 9;
        /// Inserting, rotating or deleting pages.
        const ASSEMBLE = 1 << 10;
        /// Printing at full quality.
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CryptMethod {
    None,
    Rc4,
    Aes128,
    Aes256,
}

impl CryptMethod {
    fn from_name(name: &Name) -> Option<Self> {
        match name.as_bytes() {
            b"None" | b"Identity" => Some(Self::None),
            b"V2" => Some(Self::Rc4),
            b"AESV2" => Some(Self::Aes128),
            b"AESV3" => Some(Self::Aes256),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    String,
    Stream,
}

/// How a document authenticated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Access {
    User,
    Owner,
    /// The key was supplied directly.
    Key,
    /// The credential was rejected, but decryption goes ahead anyway.
    Unverified,
}

#[derive(Debug, Clone)]
pub(crate) struct SecurityHandler {
    key: Vec<u8>,
    string_method: CryptMethod,
    stream_method: CryptMethod,
    crypt_filters: FxHashMap<Name, CryptMethod>,
    encrypt_metadata: bool,
    permissions: Permissions,
    access: Access,
}

impl SecurityHandler {
    /// Set up decryption from the encryption dictionary.
    ///
    /// `id` is the first element of the trailer's `ID` array.
    pub(crate) fn new(
        dict: &Dict,
        id: &[u8],
        credential: Option<&Credential>,
        strict: bool,
    ) -> Result<Self, EncryptionError> {
        let filter = dict
            .get_name(FILTER)
            .ok_or(EncryptionError::Malformed("missing security handler"))?;

        if filter.as_bytes() != STANDARD {
            return Err(EncryptionError::UnsupportedHandler);
        }

        let version = dict.get_i64(V).unwrap_or(0);
        let revision = dict
            .get_i64(R)
            .ok_or(EncryptionError::Malformed("missing revision"))?;
        let unsupported = EncryptionError::UnsupportedRevision { version, revision };

        let encrypt_metadata = dict.get_bool(ENCRYPT_META_DATA).unwrap_or(true);
        let key_bits = match version {
            1 => 40,
            2 | 4 => dict.get_i64(LENGTH).unwrap_or(if version == 2 { 40 } else { 128 }),
            5 => 256,
            _ => return Err(unsupported),
        };
        // Some writers put the length in bytes.
        let key_bits = if key_bits <= 16 { key_bits * 8 } else { key_bits };
        let key_len = usize::try_from(key_bits / 8).unwrap_or(5).clamp(5, 32);

        let (crypt_filters, string_method, stream_method) = if version >= 4 {
            let filters = crypt_filters(dict);
            let lookup = |key: &[u8]| {
                dict.get_name(key)
                    .map(|name| method_of(&filters, name))
                    .unwrap_or(CryptMethod::None)
            };
            let (string, stream) = (lookup(STR_F), lookup(STM_F));

            (filters, string, stream)
        } else {
            (FxHashMap::default(), CryptMethod::Rc4, CryptMethod::Rc4)
        };

        // AES-128 crypt filters always derive the full 16-byte key, whatever
        // the declared length.
        let uses_aes128 = string_method == CryptMethod::Aes128
            || stream_method == CryptMethod::Aes128
            || crypt_filters.values().any(|m| *m == CryptMethod::Aes128);
        let key_len = if version == 4 && uses_aes128 {
            16
        } else {
            key_len
        };

        let revision = Revision::from_dict(dict, revision, encrypt_metadata, key_len)
            .ok_or(unsupported)??;
        let declared = permissions_of(dict);

        let FileKey { key, access } = match credential {
            Some(Credential::Key(key)) => FileKey {
                key: key.clone(),
                access: Access::Key,
            },
            Some(Credential::Password(password)) => revision.authenticate(password, id)?,
            None => revision.authenticate(b"", id)?,
        };

        if access == Access::Unverified {
            if strict {
                return Err(EncryptionError::RejectedCredential);
            }

            warn!("credential was rejected, decrypting with the derived key");
        }

        if revision.is_aes256() && matches!(access, Access::User | Access::Owner) {
            match revision.check_perms(&key, declared) {
                Ok(()) => {}
                Err(e) if strict => return Err(e),
                Err(_) => warn!("permissions entry does not match the file key"),
            }
        }

        if version == 4 && uses_aes128 && key.len() != 16 {
            return Err(EncryptionError::Malformed("AES-128 needs a 16-byte key"));
        }

        let permissions = if access == Access::Owner {
            Permissions::all()
        } else {
            declared
        };

        Ok(Self {
            key,
            string_method,
            stream_method,
            crypt_filters,
            encrypt_metadata,
            permissions,
            access,
        })
    }

    pub(crate) fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub(crate) fn encrypt_metadata(&self) -> bool {
        self.encrypt_metadata
    }

    pub(crate) fn access(&self) -> Access {
        self.access
    }

    /// The method for a stream with the dictionary `dict`.
    ///
    /// A `Crypt` filter in the filter chain overrides the default stream
    /// method.
    pub(crate) fn stream_method(&self, dict: &Dict) -> CryptMethod {
        let filters: &[Object] = match dict.get(FILTER) {
            Some(Object::Array(filters)) => filters,
            Some(filter @ Object::Name(_)) => std::slice::from_ref(filter),
            _ => &[],
        };

        let Some(index) = filters
            .iter()
            .position(|f| f.as_name().is_some_and(|n| n.as_bytes() == CRYPT))
        else {
            return self.stream_method;
        };

        let params = match dict.get(DECODE_PARMS) {
            Some(Object::Array(params)) => params.get(index).and_then(Object::as_dict),
            Some(params) if index == 0 => params.as_dict(),
            _ => None,
        };

        match params.and_then(|p| p.get_name(NAME)) {
            Some(name) if name.as_bytes() != IDENTITY => method_of(&self.crypt_filters, name),
            _ => CryptMethod::None,
        }
    }

    pub(crate) fn decrypt(&self, id: ObjectIdentifier, data: &[u8], target: Target) -> Vec<u8> {
        let method = match target {
            Target::String => self.string_method,
            Target::Stream => self.stream_method,
        };

        self.decrypt_with(id, data, method)
    }

    pub(crate) fn decrypt_with(
        &self,
        id: ObjectIdentifier,
        data: &[u8],
        method: CryptMethod,
    ) -> Vec<u8> {
        let decrypted = match method {
            CryptMethod::None => Some(data.to_vec()),
            CryptMethod::Rc4 => Some(rc4(&object_key(&self.key, id, false), data)),
            CryptMethod::Aes128 => aes128_cbc(&object_key(&self.key, id, true), data),
            CryptMethod::Aes256 => aes256_cbc(&self.key, data),
        };

        decrypted.unwrap_or_else(|| {
            warn!("failed to decrypt data of object {id}");

            Vec::new()
        })
    }
}

fn crypt_filters(dict: &Dict) -> FxHashMap<Name, CryptMethod> {
    let mut filters = FxHashMap::default();

    if let Some(cf) = dict.get_dict(CF) {
        for (name, filter) in cf.iter() {
            let method = filter
                .as_dict()
                .and_then(|f| f.get_name(CFM))
                .and_then(CryptMethod::from_name);

            match method {
                Some(method) => {
                    filters.insert(name.clone(), method);
                }
                None => warn!("crypt filter {name:?} has an unknown method"),
            }
        }
    }

    filters
}

fn method_of(filters: &FxHashMap<Name, CryptMethod>, name: &Name) -> CryptMethod {
    if name.as_bytes() == IDENTITY {
        return CryptMethod::None;
    }

    filters.get(name).copied().unwrap_or_else(|| {
        warn!("unknown crypt filter {name:?}, treating it as identity");

        CryptMethod::None
    })
}

fn permissions_of(dict: &Dict) -> Permissions {
    // Writers store the 32-bit value both signed and unsigned.
    let raw = dict.get_i64(P).unwrap_or(-1) as u32;

    Permissions::from_bits_truncate(raw)
}

/// Algorithm 1: the key for a single object, for RC4 and AES-128.
fn object_key(key: &[u8], id: ObjectIdentifier, aes: bool) -> Vec<u8> {
    let mut input = key.to_vec();

    // The low-order 3 bytes of the object number and 2 bytes of the
    // generation number, low-order byte first.
    input.extend_from_slice(&id.num.to_le_bytes()[..3]);
    input.extend_from_slice(&id.generation.to_le_bytes());

    if aes {
        input.extend_from_slice(b"sAlT");
    }

    let hash = md5::compute(&input).0;

    hash[..(key.len() + 5).min(16)].to_vec()
}

/// AES in CBC mode with the initialization vector in the first 16 bytes.
fn aes128_cbc(key: &[u8], data: &[u8]) -> Option<Vec<u8>> {
    let (iv, data) = data.split_at_checked(16)?;
    let mut buf = block_aligned(data);
    let cipher = cbc::Decryptor::<aes::Aes128>::new_from_slices(key, iv).ok()?;
    let len = cipher.decrypt_padded_mut::<NoPadding>(&mut buf).ok()?.len();
    buf.truncate(len);

    Some(strip_padding(buf))
}

fn aes256_cbc(key: &[u8], data: &[u8]) -> Option<Vec<u8>> {
    let (iv, data) = data.split_at_checked(16)?;
    let mut buf = block_aligned(data);
    let cipher = cbc::Decryptor::<aes::Aes256>::new_from_slices(key, iv).ok()?;
    let len = cipher.decrypt_padded_mut::<NoPadding>(&mut buf).ok()?.len();
    buf.truncate(len);

    Some(strip_padding(buf))
}

fn block_aligned(data: &[u8]) -> Vec<u8> {
    if data.len() % 16 != 0 {
        warn!("encrypted data is not a multiple of the block size");
    }

    data[..data.len() - data.len() % 16].to_vec()
}

/// Remove PKCS#7 padding. Invalid padding is left in place.
fn strip_padding(mut data: Vec<u8>) -> Vec<u8> {
    if let Some(&pad) = data.last()
        && (1..=16).contains(&pad)
        && usize::from(pad) <= data.len()
        && data[data.len() - usize::from(pad)..]
            .iter()
            .all(|b| *b == pad)
    {
        data.truncate(data.len() - usize::from(pad));
    }

    data
}
