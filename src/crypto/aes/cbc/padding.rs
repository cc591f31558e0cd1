use snafu::{ensure, OptionExt};
use tracing::{debug, instrument, trace};

use crate::config::AttackConfig;
use crate::crypto::oracle::PaddingOracle;
use crate::crypto::xor::fixed_xor;
use crate::util::{CiphertextSizeSnafu, NoCandidateSnafu, Result, UnsupportedBlockSizeSnafu};

/// Recovers the plaintext behind a CBC `encrypted` from a padding oracle alone.
///
/// The block size is taken from the IV and must be at least 2. The result
/// still ends in its PKCS#7 padding.
pub fn attack_cbc_padding<O: PaddingOracle + ?Sized>(oracle: &O, iv: &[u8], encrypted: &[u8]) -> Result<Vec<u8>> {
    attack_cbc_padding_with(oracle, iv, encrypted, &AttackConfig::default())
}

#[instrument(skip(oracle, iv, encrypted), fields(len = encrypted.len()))]
pub fn attack_cbc_padding_with<O: PaddingOracle + ?Sized>(
    oracle: &O,
    iv: &[u8],
    encrypted: &[u8],
    config: &AttackConfig,
) -> Result<Vec<u8>> {
    let block_size = iv.len();
    ensure!(
        (2..=u8::MAX as usize).contains(&block_size),
        UnsupportedBlockSizeSnafu { block_size }
    );
    ensure!(
        encrypted.len() % block_size == 0,
        CiphertextSizeSnafu { len: encrypted.len(), block_size }
    );

    // Each ciphertext block is attacked through the block before it, with
    // the IV standing in front of the first
    let it = iv.chunks(block_size)
        .chain(encrypted.chunks(block_size))
        .zip(encrypted.chunks(block_size))
        .enumerate();
    let mut plaintext = Vec::with_capacity(encrypted.len());
    for (block, (prev_block, curr_block)) in it {
        let decrypted = attack_cbc_padding_single_block(oracle, prev_block, curr_block, block, config)?;
        debug!(block, plaintext = %hex::encode(&decrypted), "recovered block");
        plaintext.extend(decrypted);
    }
    Ok(plaintext)
}

fn attack_cbc_padding_single_block<O: PaddingOracle + ?Sized>(
    oracle: &O,
    prev_block: &[u8],
    block: &[u8],
    block_index: usize,
    config: &AttackConfig,
) -> Result<Vec<u8>> {
    let block_size = block.len();
    // The raw block decryption, before the chaining XOR
    let mut intermediate = vec![0u8; block_size];

    for i in (0..block_size).rev() {
        let pad = (block_size - i) as u8;
        // Force every byte after i to decrypt to `pad`
        let mut crafted = vec![config.crafted_filler; block_size];
        for k in (i+1)..block_size {
            crafted[k] = intermediate[k] ^ pad;
        }
        let candidate = find_candidate(oracle, crafted, block, i)?
            .context(NoCandidateSnafu { block: block_index, index: i })?;
        intermediate[i] = candidate ^ pad;
        trace!(block = block_index, index = i, byte = intermediate[i] ^ prev_block[i], "recovered byte");
    }

    Ok(fixed_xor(&intermediate, prev_block))
}

/// Lowest value of byte `i` of `crafted` that gets `crafted ++ block` past
/// the oracle.
fn find_candidate<O: PaddingOracle + ?Sized>(
    oracle: &O,
    crafted: Vec<u8>,
    block: &[u8],
    i: usize,
) -> Result<Option<u8>> {
    let block_size = block.len();
    let mut query = [crafted, block.to_vec()].concat();
    for candidate in 0..=u8::MAX {
        query[i] = candidate;
        if !oracle.check_padding(&query)? {
            continue;
        }
        // On the last byte a hit may be a longer pad that the untouched
        // bytes complete by accident (e.g. 0x02 0x02). Changing the byte
        // before it breaks those but leaves a genuine 0x01 valid.
        if i == block_size - 1 {
            query[i - 1] ^= 0xff;
            let confirmed = oracle.check_padding(&query)?;
            query[i - 1] ^= 0xff;
            if !confirmed {
                trace!(candidate, "discarded accidental padding");
                continue;
            }
        }
        return Ok(Some(candidate));
    }
    Ok(None)
}

#[cfg(test)]
use base64::{Engine as _, engine::general_purpose};
#[cfg(test)]
use crate::crypto::aes::cbc::{decrypt_cbc, encrypt_cbc};
#[cfg(test)]
use crate::crypto::cipher::{Aes, BlockCipher};
#[cfg(test)]
use crate::crypto::common::{generate_random_bytes, pad_pkcs_7, strip_pad_pkcs_7};
#[cfg(test)]
use crate::crypto::oracle::{padding_verdict, CbcPaddingOracle};
#[cfg(test)]
use crate::util::Error;

#[test]
fn test_attack_cbc_padding() {
    let strs: [&[u8]; 10] = [
        b"MDAwMDAwTm93IHRoYXQgdGhlIHBhcnR5IGlzIGp1bXBpbmc=",
        b"MDAwMDAxV2l0aCB0aGUgYmFzcyBraWNrZWQgaW4gYW5kIHRoZSBWZWdhJ3MgYXJlIHB1bXBpbic=",
        b"MDAwMDAyUXVpY2sgdG8gdGhlIHBvaW50LCB0byB0aGUgcG9pbnQsIG5vIGZha2luZw==",
        b"MDAwMDAzQ29va2luZyBNQydzIGxpa2UgYSBwb3VuZCBvZiBiYWNvbg==",
        b"MDAwMDA0QnVybmluZyAnZW0sIGlmIHlvdSBhaW4ndCBxdWljayBhbmQgbmltYmxl",
        b"MDAwMDA1SSBnbyBjcmF6eSB3aGVuIEkgaGVhciBhIGN5bWJhbA==",
        b"MDAwMDA2QW5kIGEgaGlnaCBoYXQgd2l0aCBhIHNvdXBlZCB1cCB0ZW1wbw==",
        b"MDAwMDA3SSdtIG9uIGEgcm9sbCwgaXQncyB0aW1lIHRvIGdvIHNvbG8=",
        b"MDAwMDA4b2xsaW4nIGluIG15IGZpdmUgcG9pbnQgb2g=",
        b"MDAwMDA5aXRoIG15IHJhZy10b3AgZG93biBzbyBteSBoYWlyIGNhbiBibG93",
    ];

    for s in strs {
        let secret = general_purpose::STANDARD
            .decode(s)
            .expect("Base64 decoding failed");
        let oracle = CbcPaddingOracle::random();
        let encrypted = oracle.encrypt(&secret).unwrap();

        let result = attack_cbc_padding(&oracle, oracle.iv(), &encrypted).unwrap();
        assert_eq!(pad_pkcs_7(&secret, 16), result);
        assert_eq!(secret, strip_pad_pkcs_7(&result, 16).unwrap());
    }
}

#[test]
fn test_attack_cbc_padding_block_pair() {
    let oracle = CbcPaddingOracle::random();
    let secret = b"sixteen byte blk";
    let encrypted = oracle.encrypt(secret).unwrap();
    assert_eq!(32, encrypted.len());
    let result = attack_cbc_padding(&oracle, oracle.iv(), &encrypted).unwrap();
    assert_eq!([secret.to_vec(), vec![16; 16]].concat(), result);
}

/// Block "cipher" that leaves blocks untouched, so tests can choose the
/// intermediate bytes the attack works against.
#[cfg(test)]
struct Transparent;

#[cfg(test)]
impl BlockCipher for Transparent {
    fn block_size(&self) -> usize { 16 }
    fn encrypt_block(&self, block: &[u8]) -> Result<Vec<u8>> { Ok(block.to_vec()) }
    fn decrypt_block(&self, block: &[u8]) -> Result<Vec<u8>> { Ok(block.to_vec()) }
}

#[test]
fn test_attack_cbc_padding_accidental_padding() {
    // Pick a block whose intermediate byte 14 turns the crafted filler into
    // 0x02, and whose byte 15 makes the 0x02 0x02 candidate come before the
    // genuine 0x01 one.
    let config = AttackConfig::default();
    let iv = [0u8; 16];
    let mut block = [0x41u8; 16];
    block[14] = config.crafted_filler ^ 0x02;
    block[15] = 0x03;

    let oracle = CbcPaddingOracle::new(Transparent, &iv).unwrap();
    let result = attack_cbc_padding_with(&oracle, &iv, &block, &config).unwrap();
    assert_eq!(block.to_vec(), result);
}

#[test]
fn test_attack_cbc_padding_closure_oracle() {
    let key = Aes::random();
    let iv: [u8; 16] = generate_random_bytes();
    let encrypted = encrypt_cbc(&key, b"closure-backed oracle", &iv).unwrap();
    let oracle = |buf: &[u8]| padding_verdict(decrypt_cbc(&key, buf, &iv));

    let result = attack_cbc_padding(&oracle, &iv, &encrypted).unwrap();
    assert_eq!(b"closure-backed oracle".to_vec(), strip_pad_pkcs_7(&result, 16).unwrap());
}

#[test]
fn test_attack_cbc_padding_failures() {
    let iv = [0u8; 16];

    let never = |_: &[u8]| -> Result<bool> { Ok(false) };
    assert!(matches!(
        attack_cbc_padding(&never, &iv, &[0u8; 32]),
        Err(Error::NoCandidate { block: 0, index: 15 })
    ));

    let broken = |_: &[u8]| -> Result<bool> { Err(Error::InvalidKeyLength { len: 1 }) };
    assert!(matches!(
        attack_cbc_padding(&broken, &iv, &[0u8; 16]),
        Err(Error::InvalidKeyLength { len: 1 })
    ));

    assert!(matches!(
        attack_cbc_padding(&never, &iv, &[0u8; 20]),
        Err(Error::CiphertextSize { len: 20, block_size: 16 })
    ));

    assert!(attack_cbc_padding(&never, &iv, &[]).unwrap().is_empty());
}
