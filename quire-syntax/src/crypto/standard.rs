//! Password authentication and file key derivation of the standard security
//! handler.

use crate::crypto::rc4::rc4;
use crate::crypto::{Access, Permissions};
use crate::error::EncryptionError;
use crate::object::Dict;
use crate::object::keys::{O, OE, P, PERMS, U, UE};
use aes::cipher::{BlockDecrypt, KeyInit};
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use log::warn;
use sha2::{Digest, Sha256, Sha384, Sha512};

const PASSWORD_PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

pub(super) struct FileKey {
    pub(super) key: Vec<u8>,
    pub(super) access: Access,
}

/// The entries of the encryption dictionary that are needed for
/// authentication, by revision.
pub(super) enum Revision {
    /// Revisions 2 to 4, based on MD5 and RC4.
    Md5 {
        revision: u8,
        key_len: usize,
        owner: Vec<u8>,
        user: Vec<u8>,
        permissions: u32,
        encrypt_metadata: bool,
    },
    /// Revisions 5 and 6, based on SHA-2 and AES-256.
    Sha {
        revision: u8,
        owner: Vec<u8>,
        user: Vec<u8>,
        owner_key: Vec<u8>,
        user_key: Vec<u8>,
        perms: Option<Vec<u8>>,
    },
}

impl Revision {
    pub(super) fn from_dict(
        dict: &Dict,
        revision: i64,
        encrypt_metadata: bool,
        key_len: usize,
    ) -> Option<Result<Self, EncryptionError>> {
        let string = |key: &[u8]| dict.get_string(key).map(|s| s.as_bytes().to_vec());
        let malformed = EncryptionError::Malformed;

        let result = match revision {
            2..=4 => {
                let (Some(owner), Some(user)) = (string(O), string(U)) else {
                    return Some(Err(malformed("missing O or U entry")));
                };

                Ok(Self::Md5 {
                    revision: revision as u8,
                    key_len: if revision == 2 { 5 } else { key_len.min(16) },
                    owner,
                    user,
                    permissions: dict.get_i64(P).unwrap_or(-1) as u32,
                    encrypt_metadata,
                })
            }
            5 | 6 => {
                let (Some(owner), Some(user)) = (string(O), string(U)) else {
                    return Some(Err(malformed("missing O or U entry")));
                };
                let (Some(owner_key), Some(user_key)) = (string(OE), string(UE)) else {
                    return Some(Err(malformed("missing OE or UE entry")));
                };

                if owner.len() < 48 || user.len() < 48 {
                    return Some(Err(malformed("O or U entry is too short")));
                }

                if owner_key.len() < 32 || user_key.len() < 32 {
                    return Some(Err(malformed("OE or UE entry is too short")));
                }

                Ok(Self::Sha {
                    revision: revision as u8,
                    owner,
                    user,
                    owner_key,
                    user_key,
                    perms: string(PERMS),
                })
            }
            _ => return None,
        };

        Some(result)
    }

    pub(super) fn is_aes256(&self) -> bool {
        matches!(self, Self::Sha { .. })
    }

    /// Try `password` as the user password, then as the owner password.
    ///
    /// If neither matches, the key derived from the user password attempt is
    /// returned with [`Access::Unverified`].
    pub(super) fn authenticate(
        &self,
        password: &[u8],
        id: &[u8],
    ) -> Result<FileKey, EncryptionError> {
        match self {
            Self::Md5 {
                revision,
                key_len,
                owner,
                user,
                permissions,
                encrypt_metadata,
            } => {
                let derive = |password: &[u8]| {
                    file_key(
                        password,
                        *revision,
                        *key_len,
                        owner,
                        *permissions,
                        id,
                        *encrypt_metadata,
                    )
                };
                let key = derive(password);

                if user_matches(*revision, &key, id, user) {
                    return Ok(FileKey {
                        key,
                        access: Access::User,
                    });
                }

                let user_password = user_password_from_owner(password, *revision, *key_len, owner);
                let owner_derived = derive(&user_password);

                if user_matches(*revision, &owner_derived, id, user) {
                    return Ok(FileKey {
                        key: owner_derived,
                        access: Access::Owner,
                    });
                }

                Ok(FileKey {
                    key,
                    access: Access::Unverified,
                })
            }
            Self::Sha {
                revision,
                owner,
                user,
                owner_key,
                user_key,
                ..
            } => {
                // Algorithm 2.A
                let password = &password[..password.len().min(127)];
                let (user_hash, user_rest) = user[..48].split_at(32);
                let (user_validation_salt, user_key_salt) = user_rest.split_at(8);
                let (owner_hash, owner_rest) = owner[..48].split_at(32);
                let (owner_validation_salt, owner_key_salt) = owner_rest.split_at(8);

                if hash_rev56(*revision, password, user_validation_salt, None)? == user_hash {
                    let intermediate = hash_rev56(*revision, password, user_key_salt, None)?;

                    return Ok(FileKey {
                        key: unwrap_key(&intermediate, user_key)?,
                        access: Access::User,
                    });
                }

                let user = Some(&user[..48]);

                if hash_rev56(*revision, password, owner_validation_salt, user)? == owner_hash {
                    let intermediate = hash_rev56(*revision, password, owner_key_salt, user)?;

                    return Ok(FileKey {
                        key: unwrap_key(&intermediate, owner_key)?,
                        access: Access::Owner,
                    });
                }

                let intermediate = hash_rev56(*revision, password, user_key_salt, None)?;

                Ok(FileKey {
                    key: unwrap_key(&intermediate, user_key)?,
                    access: Access::Unverified,
                })
            }
        }
    }

    /// Validate the `Perms` entry against the file key.
    pub(super) fn check_perms(
        &self,
        key: &[u8],
        declared: Permissions,
    ) -> Result<(), EncryptionError> {
        let Self::Sha { perms, .. } = self else {
            return Ok(());
        };

        let Some(perms) = perms else {
            warn!("encryption dictionary has no Perms entry");

            return Ok(());
        };

        let block = perms
            .get(..16)
            .ok_or(EncryptionError::Malformed("Perms entry is too short"))?;
        let cipher = aes::Aes256::new_from_slice(key)
            .map_err(|_| EncryptionError::Malformed("file key has the wrong length"))?;
        let mut block = aes::Block::clone_from_slice(block);
        cipher.decrypt_block(&mut block);

        if &block[9..12] != b"adb" {
            return Err(EncryptionError::PermsMismatch);
        }

        let stored = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);

        if Permissions::from_bits_truncate(stored) != declared {
            warn!("permissions in Perms and P differ");
        }

        Ok(())
    }
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PASSWORD_PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PASSWORD_PADDING[..32 - len]);
    padded
}

/// Algorithm 2: computing the file encryption key (revision 4 and earlier).
fn file_key(
    password: &[u8],
    revision: u8,
    key_len: usize,
    owner: &[u8],
    permissions: u32,
    id: &[u8],
    encrypt_metadata: bool,
) -> Vec<u8> {
    let mut input = Vec::with_capacity(32 + owner.len() + 4 + id.len() + 4);
    input.extend_from_slice(&pad_password(password));
    input.extend_from_slice(owner);
    input.extend_from_slice(&permissions.to_le_bytes());
    input.extend_from_slice(id);

    if revision >= 4 && !encrypt_metadata {
        input.extend_from_slice(&[0xFF; 4]);
    }

    let mut hash = md5::compute(&input).0;

    if revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(&hash[..key_len]).0;
        }
    }

    hash[..key_len].to_vec()
}

/// Algorithms 4 and 5: recompute the `U` entry and compare it.
fn user_matches(revision: u8, key: &[u8], id: &[u8], user: &[u8]) -> bool {
    if revision == 2 {
        return user.get(..32) == Some(rc4(key, &PASSWORD_PADDING).as_slice());
    }

    let mut input = PASSWORD_PADDING.to_vec();
    input.extend_from_slice(id);
    let mut value = rc4(key, &md5::compute(&input).0);

    for i in 1..=19 {
        value = rc4(&xor_key(key, i), &value);
    }

    user.get(..16) == Some(&value[..16])
}

fn xor_key(key: &[u8], i: u8) -> Vec<u8> {
    key.iter().map(|b| b ^ i).collect()
}

/// The RC4 key that protects the `O` entry (Algorithm 3, steps a to d).
fn owner_rc4_key(owner_password: &[u8], revision: u8, key_len: usize) -> Vec<u8> {
    let mut hash = md5::compute(pad_password(owner_password)).0;

    if revision >= 3 {
        for _ in 0..50 {
            hash = md5::compute(hash).0;
        }
    }

    hash[..key_len].to_vec()
}

/// Algorithm 7: recover the padded user password from the `O` entry.
fn user_password_from_owner(
    owner_password: &[u8],
    revision: u8,
    key_len: usize,
    owner: &[u8],
) -> Vec<u8> {
    let key = owner_rc4_key(owner_password, revision, key_len);
    let owner = &owner[..owner.len().min(32)];

    if revision == 2 {
        return rc4(&key, owner);
    }

    (0..=19_u8)
        .rev()
        .fold(owner.to_vec(), |data, i| rc4(&xor_key(&key, i), &data))
}

/// Algorithm 2.B: computing a hash (revision 6). Revision 5 only uses the
/// initial SHA-256 hash.
fn hash_rev56(
    revision: u8,
    password: &[u8],
    salt: &[u8],
    user: Option<&[u8]>,
) -> Result<[u8; 32], EncryptionError> {
    let user = user.unwrap_or_default();
    let mut k = Sha256::new()
        .chain_update(password)
        .chain_update(salt)
        .chain_update(user)
        .finalize()
        .to_vec();

    if revision == 6 {
        let mut round: u32 = 0;

        loop {
            let k1 = [password, &k[..], user].concat().repeat(64);
            let e = aes128_cbc_encrypt(&k[..16], &k[16..32], k1)?;

            // The first 16 bytes of E as a big-endian integer, modulo 3. Since
            // 256 is 1 modulo 3, that is the sum of the bytes modulo 3.
            let selector = e[..16].iter().map(|b| u32::from(*b)).sum::<u32>() % 3;

            k = match selector {
                0 => Sha256::digest(&e).to_vec(),
                1 => Sha384::digest(&e).to_vec(),
                _ => Sha512::digest(&e).to_vec(),
            };

            round += 1;

            let last = e.last().copied().unwrap_or_default();

            if round > 63 && u32::from(last) <= round - 32 {
                break;
            }
        }
    }

    let mut hash = [0; 32];
    hash.copy_from_slice(&k[..32]);

    Ok(hash)
}

fn aes128_cbc_encrypt(key: &[u8], iv: &[u8], mut data: Vec<u8>) -> Result<Vec<u8>, EncryptionError> {
    let len = data.len();
    cbc::Encryptor::<aes::Aes128>::new_from_slices(key, iv)
        .map_err(|_| EncryptionError::Malformed("invalid intermediate key"))?
        .encrypt_padded_mut::<NoPadding>(&mut data, len)
        .map_err(|_| EncryptionError::Malformed("unaligned hash input"))?;

    Ok(data)
}

/// Decrypt the `OE` or `UE` entry with AES-256, a zero IV and no padding.
fn unwrap_key(intermediate: &[u8; 32], wrapped: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let mut key = wrapped[..32].to_vec();
    cbc::Decryptor::<aes::Aes256>::new_from_slices(intermediate, &[0; 16])
        .map_err(|_| EncryptionError::Malformed("invalid intermediate key"))?
        .decrypt_padded_mut::<NoPadding>(&mut key)
        .map_err(|_| EncryptionError::Malformed("unaligned file key"))?;

    Ok(key)
}
