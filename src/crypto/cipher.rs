use std::fmt;

use openssl::symm::{Cipher, Crypter, Mode};
use snafu::{ensure, ResultExt};

use crate::crypto::common::generate_random_bytes;
use crate::util::{BlockSizeSnafu, CipherSnafu, InvalidKeyLengthSnafu, Result};

pub const AES_BLOCK_SIZE: usize = 16;

/// A raw single-block cipher with its key already bound.
///
/// Implementations only ever see buffers of exactly `block_size()` bytes.
pub trait BlockCipher {
    fn block_size(&self) -> usize;
    fn encrypt_block(&self, block: &[u8]) -> Result<Vec<u8>>;
    fn decrypt_block(&self, block: &[u8]) -> Result<Vec<u8>>;
}

impl<C: BlockCipher + ?Sized> BlockCipher for &C {
    fn block_size(&self) -> usize { (**self).block_size() }
    fn encrypt_block(&self, block: &[u8]) -> Result<Vec<u8>> { (**self).encrypt_block(block) }
    fn decrypt_block(&self, block: &[u8]) -> Result<Vec<u8>> { (**self).decrypt_block(block) }
}

/// AES-128/192/256 on a single block, picked by key length.
#[derive(Clone)]
pub struct Aes {
    cipher: Cipher,
    key: Vec<u8>,
}

impl Aes {
    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher = match key.len() {
            16 => Cipher::aes_128_ecb(),
            24 => Cipher::aes_192_ecb(),
            32 => Cipher::aes_256_ecb(),
            len => return InvalidKeyLengthSnafu { len }.fail(),
        };
        Ok(Self { cipher, key: key.to_vec() })
    }

    /// AES-128 under a freshly generated key.
    pub fn random() -> Self {
        let key: [u8; AES_BLOCK_SIZE] = generate_random_bytes();
        Self { cipher: Cipher::aes_128_ecb(), key: key.to_vec() }
    }

    fn crypt_block(&self, mode: Mode, block: &[u8]) -> Result<Vec<u8>> {
        ensure!(
            block.len() == AES_BLOCK_SIZE,
            BlockSizeSnafu { len: block.len(), block_size: AES_BLOCK_SIZE }
        );
        let mut crypter = Crypter::new(self.cipher, mode, &self.key, None)
            .context(CipherSnafu)?;
        crypter.pad(false);
        let mut out = vec![0u8; 2*AES_BLOCK_SIZE];
        let mut count = crypter.update(block, &mut out)
            .context(CipherSnafu)?;
        count += crypter.finalize(&mut out[count..])
            .context(CipherSnafu)?;
        out.truncate(count);
        Ok(out)
    }
}

impl fmt::Debug for Aes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aes")
            .field("key_bits", &(self.key.len() * 8))
            .finish_non_exhaustive()
    }
}

impl BlockCipher for Aes {
    fn block_size(&self) -> usize {
        AES_BLOCK_SIZE
    }

    fn encrypt_block(&self, block: &[u8]) -> Result<Vec<u8>> {
        self.crypt_block(Mode::Encrypt, block)
    }

    fn decrypt_block(&self, block: &[u8]) -> Result<Vec<u8>> {
        self.crypt_block(Mode::Decrypt, block)
    }
}

#[cfg(test)]
use crate::util::Error;

#[test]
fn test_aes_128_known_answer() {
    // FIPS-197 appendix C.1
    let aes = Aes::new(&hex!("000102030405060708090a0b0c0d0e0f")).unwrap();
    let plaintext = hex!("00112233445566778899aabbccddeeff");
    let ciphertext = aes.encrypt_block(&plaintext).unwrap();
    assert_eq!(hex!("69c4e0d86a7b0430d8cdb78070b4c55a").to_vec(), ciphertext);
    assert_eq!(plaintext.to_vec(), aes.decrypt_block(&ciphertext).unwrap());
}

#[test]
fn test_aes_key_lengths() {
    for len in [16, 24, 32] {
        let aes = Aes::new(&vec![0x2a; len]).unwrap();
        let block = [0x17u8; AES_BLOCK_SIZE];
        let encrypted = aes.encrypt_block(&block).unwrap();
        assert_eq!(AES_BLOCK_SIZE, encrypted.len());
        assert_eq!(block.to_vec(), aes.decrypt_block(&encrypted).unwrap());
    }
    assert!(matches!(Aes::new(b"short"), Err(Error::InvalidKeyLength { len: 5 })));
}

#[test]
fn test_aes_rejects_partial_block() {
    let aes = Aes::random();
    assert!(matches!(aes.encrypt_block(&[0u8; 15]), Err(Error::BlockSize { len: 15, block_size: 16 })));
}

#[test]
fn test_aes_debug_hides_key() {
    let aes = Aes::new(b"YELLOW SUBMARINE").unwrap();
    let printed = format!("{:?}", aes);
    assert!(printed.contains("128"));
    assert!(!printed.contains("YELLOW"));
}
