use snafu::ensure;
use tracing::{debug, instrument};

use crate::config::AttackConfig;
use crate::crypto::aes::{checked_block_size, detect_block_size_with, detect_cbc_prefix_size_with};
use crate::crypto::aes::cbc::{decrypt_cbc, encrypt_cbc};
use crate::crypto::cipher::{Aes, BlockCipher, AES_BLOCK_SIZE};
use crate::crypto::common::generate_random_bytes;
use crate::crypto::oracle::EncryptionOracle;
use crate::util::{round_up_to_nearest_multiple, IvSizeSnafu, Result, TruncatedCiphertextSnafu, UnsupportedBlockSizeSnafu};

const COMMENT_PREFIX: &[u8] = b"comment1=cooking%20MCs;userdata=";
const COMMENT_SUFFIX: &[u8] = b";comment2=%20like%20a%20pound%20of%20bacon";
pub const ADMIN_MARKER: &[u8] = b";admin=true;";

/// Wraps user data in a cookie-style comment string and CBC-encrypts it.
/// `;` and `=` are dropped from the user data so it can't add fields of its own.
pub struct CommentOracle<C = Aes> {
    cipher: C,
    iv: Vec<u8>,
}

impl CommentOracle<Aes> {
    pub fn random() -> Self {
        let iv: [u8; AES_BLOCK_SIZE] = generate_random_bytes();
        Self { cipher: Aes::random(), iv: iv.to_vec() }
    }
}

impl<C: BlockCipher> CommentOracle<C> {
    pub fn new(cipher: C, iv: &[u8]) -> Result<Self> {
        let block_size = checked_block_size(&cipher)?;
        ensure!(iv.len() == block_size, IvSizeSnafu { len: iv.len(), block_size });
        Ok(Self { cipher, iv: iv.to_vec() })
    }

    pub fn is_admin(&self, ciphertext: &[u8]) -> Result<bool> {
        let decrypted = decrypt_cbc(&self.cipher, ciphertext, &self.iv)?;
        Ok(decrypted.windows(ADMIN_MARKER.len()).any(|w| w == ADMIN_MARKER))
    }
}

impl<C: BlockCipher> EncryptionOracle for CommentOracle<C> {
    fn encrypt(&self, input: &[u8]) -> Result<Vec<u8>> {
        let userdata: Vec<u8> = input.iter()
            .copied()
            .filter(|b| !matches!(b, b';' | b'='))
            .collect();
        let plaintext = [COMMENT_PREFIX, &userdata, COMMENT_SUFFIX].concat();
        encrypt_cbc(&self.cipher, &plaintext, &self.iv)
    }
}

/// Produces a ciphertext from `oracle` that decrypts to contain `;admin=true;`.
pub fn attack_cbc_bitflip<O: EncryptionOracle + ?Sized>(oracle: &O) -> Result<Vec<u8>> {
    attack_cbc_bitflip_with(oracle, &AttackConfig::default())
}

#[instrument(skip(oracle))]
pub fn attack_cbc_bitflip_with<O: EncryptionOracle + ?Sized>(oracle: &O, config: &AttackConfig) -> Result<Vec<u8>> {
    let block_size = detect_block_size_with(oracle, config)?;
    ensure!(ADMIN_MARKER.len() <= block_size, UnsupportedBlockSizeSnafu { block_size });
    let prefix_len = detect_cbc_prefix_size_with(oracle, block_size, config)?;

    // Layout after the prefix: filler up to a block boundary, one scratch
    // block, then the disguised marker. Flipping a scratch ciphertext byte
    // flips the marker byte beneath it in the next block.
    let scratch = round_up_to_nearest_multiple(prefix_len, block_size);
    let alignment = scratch - prefix_len;
    let disguised: Vec<u8> = ADMIN_MARKER.iter()
        .map(|&b| if matches!(b, b';' | b'=') { b'?' } else { b })
        .collect();
    let payload = [vec![config.filler; alignment + block_size], disguised.clone()].concat();
    debug!(block_size, prefix_len, "attacking CBC oracle");

    let mut ciphertext = oracle.encrypt(&payload)?;
    let needed = scratch + 2*block_size;
    ensure!(ciphertext.len() >= needed, TruncatedCiphertextSnafu { needed, got: ciphertext.len() });

    for (i, (have, want)) in disguised.iter().zip(ADMIN_MARKER).enumerate() {
        ciphertext[scratch + i] ^= have ^ want;
    }
    Ok(ciphertext)
}

#[cfg(test)]
use crate::util::Error;

#[test]
fn test_comment_oracle_strips_metacharacters() {
    let oracle = CommentOracle::random();
    assert_eq!(
        oracle.encrypt(b"admintrue").unwrap(),
        oracle.encrypt(b";admin=true;").unwrap()
    );
    let encrypted = oracle.encrypt(ADMIN_MARKER).unwrap();
    assert!(!oracle.is_admin(&encrypted).unwrap());
}

#[test]
fn test_attack_cbc_bitflip() {
    let oracle = CommentOracle::random();
    let malicious = attack_cbc_bitflip(&oracle).unwrap();
    assert!(oracle.is_admin(&malicious).unwrap());
}

#[test]
fn test_attack_cbc_bitflip_unaligned_prefix() {
    // The comment prefix is exactly two blocks; shift it off a boundary
    let oracle = CommentOracle::random();
    let shifted = |input: &[u8]| oracle.encrypt(&[&b"xyz"[..], input].concat());
    let malicious = attack_cbc_bitflip(&shifted).unwrap();
    assert!(oracle.is_admin(&malicious).unwrap());
}

#[test]
fn test_attack_cbc_bitflip_propagates_oracle_errors() {
    let broken = |_: &[u8]| -> Result<Vec<u8>> { Err(Error::InvalidKeyLength { len: 7 }) };
    assert!(matches!(attack_cbc_bitflip(&broken), Err(Error::InvalidKeyLength { len: 7 })));
}

#[test]
fn test_comment_oracle_iv_size() {
    assert!(matches!(
        CommentOracle::new(Aes::random(), &[0u8; 12]),
        Err(Error::IvSize { len: 12, block_size: 16 })
    ));
}
