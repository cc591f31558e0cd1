use std::fmt;

use itertools::Itertools;
use snafu::OptionExt;
use tracing::{debug, instrument, trace};

use crate::config::AttackConfig;
use crate::crypto::cipher::BlockCipher;
use crate::crypto::common::check_block_size;
use crate::crypto::oracle::EncryptionOracle;
use crate::util::{
    NoAlignedBlocksSnafu,
    NoBlockSizeFoundSnafu,
    NoPrefixBoundarySnafu,
    Result,
    TruncatedCiphertextSnafu,
};

pub mod ecb;
pub mod cbc;
pub mod ctr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ecb,
    Cbc,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Ecb => write!(f, "ECB"),
            Mode::Cbc => write!(f, "CBC"),
        }
    }
}

/// Block size of `cipher`, provided PKCS#7 can pad to it.
pub(crate) fn checked_block_size<C: BlockCipher + ?Sized>(cipher: &C) -> Result<usize> {
    check_block_size(cipher.block_size())
}

/// The `index`th block of `ciphertext`, failing if the oracle returned too little.
pub(crate) fn block_at(ciphertext: &[u8], index: usize, block_size: usize) -> Result<&[u8]> {
    let end = (index + 1) * block_size;
    ciphertext
        .get((end - block_size)..end)
        .context(TruncatedCiphertextSnafu { needed: end, got: ciphertext.len() })
}

// Given an oracle of the form
// (fixed block encryption function) . (fixed lpad ++) . (++ fixed rpad)
// determine the block size in use
pub fn detect_block_size<O: EncryptionOracle + ?Sized>(oracle: &O) -> Result<usize> {
    detect_block_size_with(oracle, &AttackConfig::default())
}

#[instrument(level = "debug", skip(oracle))]
pub fn detect_block_size_with<O: EncryptionOracle + ?Sized>(oracle: &O, config: &AttackConfig) -> Result<usize> {
    let mut input = Vec::with_capacity(config.block_size_window);
    let mut previous_len = None;
    for _ in 0..config.block_size_window {
        input.push(config.filler);
        let len = oracle.encrypt(&input)?.len();
        match previous_len {
            Some(previous) if previous != len => {
                let block_size = len.abs_diff(previous);
                debug!(block_size, filler_len = input.len(), "found block size");
                return Ok(block_size);
            }
            _ => previous_len = Some(len),
        }
    }
    NoBlockSizeFoundSnafu { window: config.block_size_window }.fail()
}

// Identical plaintext blocks only encrypt identically without chaining, so
// three blocks of filler tell the two modes apart as long as any hidden
// prefix is shorter than a block
pub fn detect_mode<O: EncryptionOracle + ?Sized>(oracle: &O, block_size: usize) -> Result<Mode> {
    detect_mode_with(oracle, block_size, &AttackConfig::default())
}

#[instrument(level = "debug", skip(oracle))]
pub fn detect_mode_with<O: EncryptionOracle + ?Sized>(oracle: &O, block_size: usize, config: &AttackConfig) -> Result<Mode> {
    check_block_size(block_size)?;
    let payload = vec![config.filler; 3*block_size];
    let encrypted = oracle.encrypt(&payload)?;
    let second = block_at(&encrypted, 1, block_size)?;
    let third = block_at(&encrypted, 2, block_size)?;
    let mode = if second == third { Mode::Ecb } else { Mode::Cbc };
    debug!(%mode, "detected mode");
    Ok(mode)
}

/// Length of a hidden prefix shorter than one block.
///
/// Once the filler completes the prefix's block, the first ciphertext block
/// stops changing as the filler grows. The filler length at which two
/// consecutive first blocks agree gives the prefix length; no agreement
/// means there is no prefix.
pub fn detect_prefix_size<O: EncryptionOracle + ?Sized>(oracle: &O, block_size: usize) -> Result<usize> {
    detect_prefix_size_with(oracle, block_size, &AttackConfig::default())
}

#[instrument(level = "debug", skip(oracle))]
pub fn detect_prefix_size_with<O: EncryptionOracle + ?Sized>(oracle: &O, block_size: usize, config: &AttackConfig) -> Result<usize> {
    check_block_size(block_size)?;
    let mut padding = Vec::with_capacity(block_size);
    let mut previous: Option<Vec<u8>> = None;
    for i in 0..=block_size {
        let encrypted = oracle.encrypt(&padding)?;
        let first = block_at(&encrypted, 0, block_size)?.to_vec();
        if previous.as_ref() == Some(&first) {
            let prefix_size = block_size - i + 1;
            debug!(prefix_size, "found prefix size");
            return Ok(prefix_size);
        }
        previous = Some(first);
        padding.push(config.filler);
    }
    debug!("no prefix found");
    Ok(0)
}

/// Length of a hidden prefix of any size in front of an ECB oracle.
///
/// Sends two marker blocks fenced by separator bytes behind a growing run of
/// separators. When the run completes the prefix's last block, the markers
/// encrypt to two adjacent identical blocks, which pins down where the
/// prefix ends. Each run is sent twice with different marker bytes: a pair
/// only counts if it sits at the same place both times and changed with the
/// markers, so repeated blocks in the hidden text are never mistaken for
/// it. Fails with `NoAlignedBlocks` when no such pair ever shows up, which
/// is what a chaining mode looks like.
pub fn locate_prefix<O: EncryptionOracle + ?Sized>(oracle: &O, block_size: usize) -> Result<usize> {
    locate_prefix_with(oracle, block_size, &AttackConfig::default())
}

#[instrument(level = "debug", skip(oracle))]
pub fn locate_prefix_with<O: EncryptionOracle + ?Sized>(oracle: &O, block_size: usize, config: &AttackConfig) -> Result<usize> {
    check_block_size(block_size)?;
    let separator = config.separator();
    for i in 0..block_size {
        // Start of every identical adjacent pair, with the repeated block
        let identical_pairs = |marker: u8| -> Result<Vec<(usize, Vec<u8>)>> {
            let payload = [
                vec![separator; i + 1],
                vec![marker; 2*block_size],
                vec![separator],
            ].concat();
            Ok(oracle.encrypt(&payload)?
                .chunks(block_size)
                .tuple_windows::<(&[u8], &[u8])>()
                .enumerate()
                .filter(|(_, (a, b))| a == b)
                .map(|(j, (a, _))| (j, a.to_vec()))
                .collect())
        };

        let first = identical_pairs(config.filler)?;
        let second = identical_pairs(config.alternate_filler())?;
        let prefix_size = first.iter()
            .find(|(j, block)| second.iter().any(|(k, other)| k == j && other != block))
            .and_then(|(j, _)| (j*block_size).checked_sub(i + 1));
        if let Some(prefix_size) = prefix_size {
            debug!(prefix_size, "located prefix");
            return Ok(prefix_size);
        }
        trace!(separators = i + 1, "markers not aligned");
    }
    NoAlignedBlocksSnafu.fail()
}

/// Length of a hidden prefix in front of an oracle in any block mode.
///
/// Two queries that differ only in their last byte first diverge in the
/// block holding that byte. Growing the filler in front of that byte moves
/// the divergence one block on exactly when the filler completes the
/// prefix's last block.
pub fn detect_cbc_prefix_size<O: EncryptionOracle + ?Sized>(oracle: &O, block_size: usize) -> Result<usize> {
    detect_cbc_prefix_size_with(oracle, block_size, &AttackConfig::default())
}

#[instrument(level = "debug", skip(oracle))]
pub fn detect_cbc_prefix_size_with<O: EncryptionOracle + ?Sized>(oracle: &O, block_size: usize, config: &AttackConfig) -> Result<usize> {
    check_block_size(block_size)?;
    let first_difference = |filler_len: usize| -> Result<Option<usize>> {
        let filler = vec![config.filler; filler_len];
        let a = oracle.encrypt(&[filler.as_slice(), &[config.filler][..]].concat())?;
        let b = oracle.encrypt(&[filler.as_slice(), &[config.separator()][..]].concat())?;
        Ok(a.chunks(block_size)
            .zip(b.chunks(block_size))
            .position(|(x, y)| x != y))
    };

    let initial = first_difference(0)?.context(NoPrefixBoundarySnafu)?;
    for filler_len in 1..=block_size {
        let current = first_difference(filler_len)?.context(NoPrefixBoundarySnafu)?;
        if current > initial {
            let prefix_size = (initial + 1)*block_size - filler_len;
            debug!(prefix_size, "found prefix size");
            return Ok(prefix_size);
        }
    }
    NoPrefixBoundarySnafu.fail()
}

#[cfg(test)]
use crate::crypto::oracle::{HiddenTextOracle, RandomModeOracle};
#[cfg(test)]
use crate::util::Error;

#[test]
fn test_detect_block_size() {
    let oracles = [
        HiddenTextOracle::random_ecb(),
        HiddenTextOracle::random_ecb().with_random_prefix::<0, 40>().with_suffix(b"hidden suffix"),
        HiddenTextOracle::random_cbc().with_random_prefix::<0, 40>(),
    ];
    for oracle in oracles {
        assert_eq!(16, detect_block_size(&oracle).unwrap());
    }
}

#[test]
fn test_detect_block_size_gives_up() {
    let constant = |_: &[u8]| -> Result<Vec<u8>> { Ok(vec![0u8; 16]) };
    let config = AttackConfig::default().with_block_size_window(40);
    assert!(matches!(
        detect_block_size_with(&constant, &config),
        Err(Error::NoBlockSizeFound { window: 40 })
    ));
}

#[test]
fn test_detect_block_size_propagates_oracle_errors() {
    let broken = |_: &[u8]| -> Result<Vec<u8>> { Err(Error::InvalidKeyLength { len: 3 }) };
    assert!(matches!(detect_block_size(&broken), Err(Error::InvalidKeyLength { len: 3 })));
}

#[test]
fn test_detect_mode() {
    for _ in 0..100 {
        let oracle = RandomModeOracle::new();
        assert_eq!(oracle.mode(), detect_mode(&oracle, 16).unwrap());
    }
}

#[test]
fn test_detect_mode_fixed_oracles() {
    let ecb = HiddenTextOracle::random_ecb().with_random_prefix::<0, 15>();
    let cbc = HiddenTextOracle::random_cbc().with_random_prefix::<0, 15>();
    assert_eq!(Mode::Ecb, detect_mode(&ecb, 16).unwrap());
    assert_eq!(Mode::Cbc, detect_mode(&cbc, 16).unwrap());
    assert_eq!("ECB", Mode::Ecb.to_string());
    assert_eq!("CBC", Mode::Cbc.to_string());
}

#[test]
fn test_detect_mode_short_ciphertext() {
    let short = |_: &[u8]| -> Result<Vec<u8>> { Ok(vec![0u8; 20]) };
    assert!(matches!(
        detect_mode(&short, 16),
        Err(Error::TruncatedCiphertext { needed: 32, got: 20 })
    ));
}

#[test]
fn test_detect_prefix_size() {
    for prefix_len in 0..16 {
        let oracle = HiddenTextOracle::random_ecb()
            .with_prefix(&vec![0x5a; prefix_len])
            .with_suffix(b"Rollin' in my 5.0");
        assert_eq!(prefix_len, detect_prefix_size(&oracle, 16).unwrap());
    }
}

#[test]
fn test_locate_prefix() {
    for prefix_len in [0, 1, 7, 15, 16, 17, 31, 32, 50, 99] {
        let oracle = HiddenTextOracle::random_ecb()
            .with_prefix(&(0..prefix_len).map(|x| x as u8).collect::<Vec<u8>>())
            .with_suffix(b"hidden suffix");
        assert_eq!(prefix_len, locate_prefix(&oracle, 16).unwrap());
    }
}

#[test]
fn test_locate_prefix_repeated_hidden_blocks() {
    let cases: [(Vec<u8>, Vec<u8>); 4] = [
        (vec![], vec![0u8; 64]),
        (b"abc".to_vec(), [vec![b'A'; 64], b" tail".to_vec()].concat()),
        (vec![0x5a; 40], b"hidden suffix".to_vec()),
        (vec![0xff; 37], vec![0xff; 48]),
    ];
    for (prefix, suffix) in cases {
        let oracle = HiddenTextOracle::random_ecb()
            .with_prefix(&prefix)
            .with_suffix(&suffix);
        assert_eq!(prefix.len(), locate_prefix(&oracle, 16).unwrap());
    }
}

#[test]
fn test_locate_prefix_ignores_constant_oracle() {
    let constant = |_: &[u8]| -> Result<Vec<u8>> { Ok(vec![0u8; 64]) };
    assert!(matches!(locate_prefix(&constant, 16), Err(Error::NoAlignedBlocks)));
}

#[test]
fn test_locate_prefix_rejects_cbc() {
    let oracle = HiddenTextOracle::random_cbc().with_suffix(b"hidden suffix");
    assert!(matches!(locate_prefix(&oracle, 16), Err(Error::NoAlignedBlocks)));
}

#[test]
fn test_detect_cbc_prefix_size() {
    for prefix_len in [0, 1, 15, 16, 17, 32, 45] {
        let prefix = vec![b'p'; prefix_len];
        let cbc = HiddenTextOracle::random_cbc().with_prefix(&prefix).with_suffix(b";tail");
        assert_eq!(prefix_len, detect_cbc_prefix_size(&cbc, 16).unwrap());
        let ecb = HiddenTextOracle::random_ecb().with_prefix(&prefix);
        assert_eq!(prefix_len, detect_cbc_prefix_size(&ecb, 16).unwrap());
    }
}

#[test]
fn test_detect_cbc_prefix_size_no_boundary() {
    let constant = |_: &[u8]| -> Result<Vec<u8>> { Ok(vec![0u8; 32]) };
    assert!(matches!(detect_cbc_prefix_size(&constant, 16), Err(Error::NoPrefixBoundary)));
}

#[test]
fn test_detectors_reject_zero_block_size() {
    let oracle = HiddenTextOracle::random_ecb();
    assert!(matches!(detect_mode(&oracle, 0), Err(Error::UnsupportedBlockSize { block_size: 0 })));
    assert!(matches!(detect_prefix_size(&oracle, 0), Err(Error::UnsupportedBlockSize { block_size: 0 })));
    assert!(matches!(locate_prefix(&oracle, 0), Err(Error::UnsupportedBlockSize { block_size: 0 })));
    assert!(matches!(detect_cbc_prefix_size(&oracle, 0), Err(Error::UnsupportedBlockSize { block_size: 0 })));
}
