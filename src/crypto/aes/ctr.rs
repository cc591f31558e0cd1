use concat_arrays::concat_arrays;
use snafu::ensure;

use crate::crypto::cipher::{Aes, BlockCipher, AES_BLOCK_SIZE};
use crate::crypto::xor::fixed_xor;
use crate::util::{Result, UnsupportedBlockSizeSnafu};

/// CTR keystream over a 16-byte block cipher. The counter block is the
/// little-endian nonce followed by the little-endian block counter.
pub struct Ctr<C = Aes> {
    cipher: C,
    nonce: u64,
}

impl<C: BlockCipher> Ctr<C> {
    pub fn new(cipher: C, nonce: u64) -> Self {
        Self { cipher, nonce }
    }

    /// XORs `buf` with the keystream. Encryption and decryption are the same.
    pub fn apply_keystream(&self, buf: &[u8]) -> Result<Vec<u8>> {
        let block_size = self.cipher.block_size();
        ensure!(block_size == AES_BLOCK_SIZE, UnsupportedBlockSizeSnafu { block_size });
        buf.chunks(AES_BLOCK_SIZE)
            .enumerate()
            .map(|(counter, chunk)| -> Result<Vec<u8>> {
                let counter_block: [u8; AES_BLOCK_SIZE] =
                    concat_arrays!(self.nonce.to_le_bytes(), (counter as u64).to_le_bytes());
                let keystream = self.cipher.encrypt_block(&counter_block)?;
                Ok(fixed_xor(chunk, &keystream))
            })
            .collect::<Result<Vec<Vec<u8>>>>()
            .map(|chunks| chunks.concat())
    }
}

#[cfg(test)]
use base64::{Engine as _, engine::general_purpose};

#[test]
fn test_aes_ctr() {
    let case = b"L77na/nrFsKvynd6HzOoG7GHTLXsTVu9qvY/2syLXzhPweyyMTJULu/6/kXX0KSvoOLSFQ==";
    let ciphertext = general_purpose::STANDARD
        .decode(case)
        .expect("Base64 decoding failed");
    let ctr = Ctr::new(Aes::new(b"YELLOW SUBMARINE").unwrap(), 0);
    let expected = b"Yo, VIP Let's kick it Ice, Ice, baby Ice, Ice, baby ".to_vec();
    assert_eq!(expected, ctr.apply_keystream(&ciphertext).unwrap());
}

#[test]
fn test_aes_ctr_round_trip() {
    let ctr = Ctr::new(Aes::random(), 0xdead_beef);
    for len in [0, 1, 15, 16, 17, 100] {
        let plaintext = vec![0x33; len];
        let ciphertext = ctr.apply_keystream(&plaintext).unwrap();
        assert_eq!(len, ciphertext.len());
        assert_eq!(plaintext, ctr.apply_keystream(&ciphertext).unwrap());
    }
}
