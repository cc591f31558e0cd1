use snafu::ensure;

use crate::crypto::aes::checked_block_size;
use crate::crypto::cipher::BlockCipher;
use crate::crypto::common::{pad_pkcs_7, strip_pad_pkcs_7};
use crate::crypto::xor::fixed_xor;
use crate::util::{CiphertextSizeSnafu, IvSizeSnafu, Result};

pub mod bitflip;
pub mod padding;

pub fn encrypt_cbc<C: BlockCipher + ?Sized>(cipher: &C, plaintext: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    let block_size = checked_block_size(cipher)?;
    ensure!(iv.len() == block_size, IvSizeSnafu { len: iv.len(), block_size });

    let padded = pad_pkcs_7(plaintext, block_size);
    let mut encrypted = Vec::with_capacity(padded.len());
    let mut chain = iv.to_vec();
    for block in padded.chunks(block_size) {
        chain = cipher.encrypt_block(&fixed_xor(block, &chain))?;
        encrypted.extend_from_slice(&chain);
    }
    Ok(encrypted)
}

/// Decrypts and strips the padding, failing with `InvalidPadding` when the
/// result isn't well padded.
pub fn decrypt_cbc<C: BlockCipher + ?Sized>(cipher: &C, ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
    let block_size = checked_block_size(cipher)?;
    ensure!(iv.len() == block_size, IvSizeSnafu { len: iv.len(), block_size });
    ensure!(
        ciphertext.len() % block_size == 0,
        CiphertextSizeSnafu { len: ciphertext.len(), block_size }
    );

    let mut decrypted = Vec::with_capacity(ciphertext.len());
    let mut chain = iv;
    for block in ciphertext.chunks(block_size) {
        decrypted.extend(fixed_xor(&cipher.decrypt_block(block)?, chain));
        chain = block;
    }
    strip_pad_pkcs_7(&decrypted, block_size)
}

#[cfg(test)]
use crate::crypto::cipher::Aes;
#[cfg(test)]
use crate::crypto::common::generate_random_bytes;
#[cfg(test)]
use crate::util::Error;

#[test]
fn test_aes_cbc_known_answer() {
    // NIST SP 800-38A F.2.1
    let aes = Aes::new(&hex!("2b7e151628aed2a6abf7158809cf4f3c")).unwrap();
    let iv = hex!("000102030405060708090a0b0c0d0e0f");
    let plaintext = hex!("6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51");
    let expected = hex!("7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2");

    let ciphertext = encrypt_cbc(&aes, &plaintext, &iv).unwrap();
    assert_eq!(48, ciphertext.len());
    assert_eq!(expected, ciphertext[..32]);
    assert_eq!(plaintext.to_vec(), decrypt_cbc(&aes, &ciphertext, &iv).unwrap());
}

#[test]
fn test_aes_cbc_encrypt_and_decrypt() {
    let plaintext = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let aes = Aes::new(b"YELLOW SUBMARINE").unwrap();
    let iv = b"yellow submarine";
    let ciphertext = aes_cbc_round_trip(&aes, plaintext, iv);
    assert_eq!(64, ciphertext.len());
}

#[cfg(test)]
fn aes_cbc_round_trip(aes: &Aes, plaintext: &[u8], iv: &[u8]) -> Vec<u8> {
    let ciphertext = encrypt_cbc(aes, plaintext, iv).unwrap();
    assert_eq!(plaintext.to_vec(), decrypt_cbc(aes, &ciphertext, iv).unwrap());
    ciphertext
}

#[test]
fn test_aes_cbc_chains_identical_blocks() {
    let aes = Aes::random();
    let iv: [u8; 16] = generate_random_bytes();
    let ciphertext = aes_cbc_round_trip(&aes, &[b'A'; 48], &iv);
    assert_ne!(ciphertext[0..16], ciphertext[16..32]);
    assert_ne!(ciphertext[16..32], ciphertext[32..48]);
}

#[test]
fn test_aes_cbc_errors() {
    let aes = Aes::random();
    let iv: [u8; 16] = generate_random_bytes();

    assert!(matches!(
        encrypt_cbc(&aes, b"data", &iv[..8]),
        Err(Error::IvSize { len: 8, block_size: 16 })
    ));
    assert!(matches!(
        decrypt_cbc(&aes, &[0u8; 17], &iv),
        Err(Error::CiphertextSize { len: 17, block_size: 16 })
    ));

    // A last byte of 0x00 can never be valid padding
    let mut ciphertext = encrypt_cbc(&aes, b"YELLOW SUBMARINE", &iv).unwrap();
    let n = ciphertext.len();
    ciphertext[n - 17] ^= 0x10;
    assert!(matches!(decrypt_cbc(&aes, &ciphertext, &iv), Err(Error::InvalidPadding)));

    assert!(matches!(decrypt_cbc(&aes, &[], &iv), Err(Error::InvalidPadding)));
}
