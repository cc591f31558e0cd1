use tracing::{debug, instrument, trace};

use crate::config::AttackConfig;
use crate::crypto::aes::{block_at, detect_block_size_with, locate_prefix_with};
use crate::crypto::oracle::EncryptionOracle;
use crate::util::{round_up_to_nearest_multiple, NoByteFoundSnafu, Result};

// Given an oracle of the form
// ECB . (fixed lpad ++) . (++ unknown)
// recover `unknown` one byte at a time.
pub fn attack_ecb_byte_by_byte<O: EncryptionOracle + ?Sized>(oracle: &O) -> Result<Vec<u8>> {
    attack_ecb_byte_by_byte_with(oracle, &AttackConfig::default())
}

#[instrument(skip(oracle))]
pub fn attack_ecb_byte_by_byte_with<O: EncryptionOracle + ?Sized>(oracle: &O, config: &AttackConfig) -> Result<Vec<u8>> {
    let block_size = detect_block_size_with(oracle, config)?;
    let prefix_len = locate_prefix_with(oracle, block_size, config)?;

    // Enough filler to finish off the prefix's last block, after which
    // everything we send starts on a block boundary
    let base_offset = round_up_to_nearest_multiple(prefix_len, block_size);
    let alignment = base_offset - prefix_len;
    debug!(block_size, prefix_len, "attacking ECB oracle");

    let mut known = Vec::new();
    loop {
        let n = known.len();
        let filler = vec![config.filler; alignment + block_size - 1 - (n % block_size)];
        let block = base_offset / block_size + n / block_size;
        let target = block_at(&oracle.encrypt(&filler)?, block, block_size)?.to_vec();

        match find_byte(oracle, &filler, &known, &target, block, block_size)? {
            Some(b) => {
                trace!(offset = n, byte = b, "recovered byte");
                known.push(b);
            }
            // Once past the end of the unknown string the byte under the
            // target block belongs to the padding, whose value changes with
            // our filler length, so nothing matches any more
            None => break,
        }
    }

    // The last byte recovered is the 0x01 of the padding. Anything else
    // means the byte at the current offset genuinely had no match.
    match known.last().copied() {
        Some(0x01) => {
            known.pop();
            debug!(recovered = known.len(), "unknown string exhausted");
            Ok(known)
        }
        _ => NoByteFoundSnafu { offset: known.len() }.fail(),
    }
}

/// First candidate byte whose block matches `target`, if any.
fn find_byte<O: EncryptionOracle + ?Sized>(
    oracle: &O,
    filler: &[u8],
    known: &[u8],
    target: &[u8],
    block: usize,
    block_size: usize,
) -> Result<Option<u8>> {
    let mut payload = [filler, known, &[0u8][..]].concat();
    let last = payload.len() - 1;
    for candidate in 0..=u8::MAX {
        payload[last] = candidate;
        let encrypted = oracle.encrypt(&payload)?;
        if block_at(&encrypted, block, block_size)? == target {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

#[cfg(test)]
use base64::{Engine as _, engine::general_purpose};
#[cfg(test)]
use std::cell::Cell;
#[cfg(test)]
use crate::crypto::aes::ecb::encrypt_ecb;
#[cfg(test)]
use crate::crypto::cipher::Aes;
#[cfg(test)]
use crate::crypto::oracle::HiddenTextOracle;
#[cfg(test)]
use crate::util::Error;

#[test]
fn test_attack_ecb_byte_by_byte_no_prefix() {
    let secrets: [&[u8]; 5] = [
        b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ",
        b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUV",
        b"abc",
        b"ends in a one\x01",
        b"",
    ];
    for secret in secrets {
        let oracle = HiddenTextOracle::random_ecb().with_suffix(secret);
        assert_eq!(secret.to_vec(), attack_ecb_byte_by_byte(&oracle).unwrap());
    }
}

#[test]
fn test_attack_ecb_byte_by_byte_fixed_prefix() {
    let secret = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    for prefix_len in [1, 5, 15, 16, 17, 40] {
        let oracle = HiddenTextOracle::random_ecb()
            .with_prefix(&vec![b'#'; prefix_len])
            .with_suffix(secret);
        assert_eq!(secret.to_vec(), attack_ecb_byte_by_byte(&oracle).unwrap());
    }
}

#[test]
fn test_attack_ecb_byte_by_byte() {
    let unknown_string = b"Um9sbGluJyBpbiBteSA1LjAKV2l0aCBteSByYWctdG9wIGRvd24gc28gbXkgaGFpciBjYW4gYmxvdwpUaGUgZ2lybGllcyBvbiBzdGFuZGJ5IHdhdmluZyBqdXN0IHRvIHNheSBoaQpEaWQgeW91IHN0b3A/IE5vLCBJIGp1c3QgZHJvdmUgYnkK";
    let unknown = general_purpose::STANDARD
        .decode(unknown_string)
        .expect("Base64 decoding failed");
    let expected = b"Rollin' in my 5.0\nWith my rag-top down so my hair can blow\nThe girlies on standby waving just to say hi\nDid you stop? No, I just drove by\n".to_vec();

    for _ in 0..5 {
        let oracle = HiddenTextOracle::random_ecb()
            .with_random_prefix::<0, 100>()
            .with_suffix(&unknown);
        assert_eq!(expected, attack_ecb_byte_by_byte(&oracle).unwrap());
    }
}

#[test]
fn test_attack_ecb_byte_by_byte_repetitive_secret() {
    let cases: [(&[u8], Vec<u8>); 3] = [
        (b"", vec![0u8; 64]),
        (b"abc", [vec![b'A'; 64], b" tail".to_vec()].concat()),
        (b"0123456789abcdefghijklmnopqrstuvwxyz", [vec![b'x'; 32], vec![b'y'; 32]].concat()),
    ];
    for (prefix, secret) in cases {
        let oracle = HiddenTextOracle::random_ecb()
            .with_prefix(prefix)
            .with_suffix(&secret);
        assert_eq!(secret, attack_ecb_byte_by_byte(&oracle).unwrap());
    }
}

#[test]
fn test_attack_ecb_byte_by_byte_unmatched_byte() {
    // Stable long enough to find the layout and a few bytes, then every
    // query is encrypted under a fresh key so nothing can match
    let key = Aes::random();
    let calls = Cell::new(0usize);
    let rekeying = |input: &[u8]| -> Result<Vec<u8>> {
        calls.set(calls.get() + 1);
        let plaintext = [input, &[b'z'; 64][..]].concat();
        if calls.get() > 1000 {
            encrypt_ecb(&Aes::random(), &plaintext)
        } else {
            encrypt_ecb(&key, &plaintext)
        }
    };
    match attack_ecb_byte_by_byte(&rekeying) {
        Err(Error::NoByteFound { offset }) => assert!(offset > 0 && offset < 64),
        other => panic!("expected NoByteFound, got {:?}", other),
    }
}

#[test]
fn test_attack_ecb_byte_by_byte_custom_filler() {
    let config = AttackConfig::default().with_filler(b'A');
    let oracle = HiddenTextOracle::random_ecb()
        .with_prefix(b"xyz")
        .with_suffix(b"AAAA then something else");
    assert_eq!(
        b"AAAA then something else".to_vec(),
        attack_ecb_byte_by_byte_with(&oracle, &config).unwrap()
    );
}

#[test]
fn test_attack_ecb_byte_by_byte_rejects_cbc() {
    let oracle = HiddenTextOracle::random_cbc().with_suffix(b"secret");
    assert!(matches!(attack_ecb_byte_by_byte(&oracle), Err(Error::NoAlignedBlocks)));
}

#[test]
fn test_attack_ecb_byte_by_byte_propagates_oracle_errors() {
    let broken = |_: &[u8]| -> Result<Vec<u8>> { Err(Error::InvalidKeyLength { len: 0 }) };
    assert!(matches!(attack_ecb_byte_by_byte(&broken), Err(Error::InvalidKeyLength { len: 0 })));
}
