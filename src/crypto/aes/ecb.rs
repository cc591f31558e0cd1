use snafu::ensure;

use crate::crypto::aes::checked_block_size;
use crate::crypto::cipher::BlockCipher;
use crate::crypto::common::pad_pkcs_7;
use crate::util::{CiphertextSizeSnafu, Result};

pub mod byte_by_byte;

/// Pads `plaintext` and encrypts every block independently.
pub fn encrypt_ecb<C: BlockCipher + ?Sized>(cipher: &C, plaintext: &[u8]) -> Result<Vec<u8>> {
    let block_size = checked_block_size(cipher)?;
    pad_pkcs_7(plaintext, block_size)
        .chunks(block_size)
        .map(|block| cipher.encrypt_block(block))
        .collect::<Result<Vec<Vec<u8>>>>()
        .map(|blocks| blocks.concat())
}

/// Decrypts every block independently. Padding is left in place.
pub fn decrypt_ecb<C: BlockCipher + ?Sized>(cipher: &C, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let block_size = checked_block_size(cipher)?;
    ensure!(
        ciphertext.len() % block_size == 0,
        CiphertextSizeSnafu { len: ciphertext.len(), block_size }
    );
    ciphertext
        .chunks(block_size)
        .map(|block| cipher.decrypt_block(block))
        .collect::<Result<Vec<Vec<u8>>>>()
        .map(|blocks| blocks.concat())
}

#[cfg(test)]
use crate::crypto::cipher::Aes;
#[cfg(test)]
use crate::crypto::common::strip_pad_pkcs_7;
#[cfg(test)]
use crate::util::Error;

#[test]
fn test_aes_ecb_known_answer() {
    // NIST SP 800-38A F.1.1
    let aes = Aes::new(&hex!("2b7e151628aed2a6abf7158809cf4f3c")).unwrap();
    let plaintext = hex!("6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51");
    let expected = hex!("3ad77bb40d7a3660a89ecaf32466ef97f5d3d58503b9699de785895a96fdbaaf");

    let ciphertext = encrypt_ecb(&aes, &plaintext).unwrap();
    assert_eq!(48, ciphertext.len());
    assert_eq!(expected, ciphertext[..32]);

    // Without the padding block there is nothing to strip
    assert_eq!(plaintext.to_vec(), decrypt_ecb(&aes, &expected).unwrap());
}

#[test]
fn test_aes_ecb_keeps_padding() {
    let aes = Aes::new(b"YELLOW SUBMARINE").unwrap();
    let ciphertext = encrypt_ecb(&aes, b"ICE ICE BABY").unwrap();
    assert_eq!(16, ciphertext.len());
    let decrypted = decrypt_ecb(&aes, &ciphertext).unwrap();
    assert_eq!(b"ICE ICE BABY\x04\x04\x04\x04".to_vec(), decrypted);
    assert_eq!(b"ICE ICE BABY".to_vec(), strip_pad_pkcs_7(&decrypted, 16).unwrap());
}

#[test]
fn test_aes_ecb_identical_blocks() {
    let aes = Aes::random();
    let ciphertext = encrypt_ecb(&aes, &[b'A'; 48]).unwrap();
    assert_eq!(ciphertext[0..16], ciphertext[16..32]);
    assert_eq!(ciphertext[16..32], ciphertext[32..48]);
}

#[test]
fn test_aes_ecb_decrypt_misaligned() {
    let aes = Aes::random();
    assert!(matches!(
        decrypt_ecb(&aes, &[0u8; 33]),
        Err(Error::CiphertextSize { len: 33, block_size: 16 })
    ));
    assert!(decrypt_ecb(&aes, &[]).unwrap().is_empty());
}
