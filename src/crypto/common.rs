use rand::RngCore;
use snafu::{ensure, OptionExt};

use crate::util::{InvalidPaddingSnafu, BlockSizeSnafu, Result, UnsupportedBlockSizeSnafu};

/// PKCS#7 padding. A whole block of padding is appended when `buf` is
/// already a multiple of `block_size`, so the result can always be stripped.
///
/// `block_size` must lie in `1..=255`.
pub fn pad_pkcs_7(buf: &[u8], block_size: usize) -> Vec<u8> {
    debug_assert!((1..=u8::MAX as usize).contains(&block_size));
    let padding_length = block_size - (buf.len() % block_size);
    [buf, &vec![padding_length as u8; padding_length]].concat()
}

#[test]
fn test_pad_pkcs_7() {
    let case = b"YELLOW SUBMARINE";
    let expected = b"YELLOW SUBMARINE\x04\x04\x04\x04".to_vec();
    assert_eq!(expected, pad_pkcs_7(case, 20));

    let expected_2 = [case.to_vec(), vec![16; 16]].concat();
    assert_eq!(expected_2, pad_pkcs_7(case, case.len()));

    assert_eq!(vec![0x61, 0x61, 0x02, 0x02], pad_pkcs_7(&[0x61, 0x61], 4));
    assert_eq!(b"aaaaaa\x03\x03\x03".to_vec(), pad_pkcs_7(b"aaaaaa", 3));
    assert_eq!(b"aaa\x01".to_vec(), pad_pkcs_7(b"aaa", 2));
    assert_eq!(vec![0x01], pad_pkcs_7(&[], 1));
}

#[test]
fn test_pad_pkcs_7_lengths() {
    for block_size in [1, 2, 7, 16, 32, 255] {
        for len in 0..(3*block_size) {
            let data = vec![0x42; len];
            let padded = pad_pkcs_7(&data, block_size);
            assert!(padded.len() > len);
            assert_eq!(0, padded.len() % block_size);
            assert_eq!(data, strip_pad_pkcs_7(&padded, block_size).unwrap());
        }
    }
}

/// Rejects block sizes a single PKCS#7 byte can't describe.
pub(crate) fn check_block_size(block_size: usize) -> Result<usize> {
    ensure!(
        (1..=u8::MAX as usize).contains(&block_size),
        UnsupportedBlockSizeSnafu { block_size }
    );
    Ok(block_size)
}

/// Removes PKCS#7 padding, failing with `BlockSize` when `buf` does not
/// split into whole blocks and with `InvalidPadding` when the trailing bytes
/// are not a well-formed pad.
pub fn strip_pad_pkcs_7(buf: &[u8], block_size: usize) -> Result<Vec<u8>> {
    check_block_size(block_size)?;
    ensure!(
        buf.len() % block_size == 0,
        BlockSizeSnafu { len: buf.len(), block_size }
    );
    let &final_byte = buf.last().context(InvalidPaddingSnafu)?;
    let padding_len = final_byte as usize;
    ensure!(
        padding_len >= 1 && padding_len <= block_size,
        InvalidPaddingSnafu
    );
    // Every trailing byte is inspected, mismatch or not.
    let mismatches = buf.iter()
        .rev()
        .take(padding_len)
        .fold(0u8, |acc, b| acc | (b ^ final_byte));
    ensure!(mismatches == 0, InvalidPaddingSnafu);
    Ok(buf[..(buf.len() - padding_len)].to_vec())
}

#[cfg(test)]
use crate::util::Error;

#[test]
fn test_strip_pad_pkcs_7() {
    let case = b"YELLOW SUBMARINE\x04\x04\x04\x04";
    assert_eq!(b"YELLOW SUBMARINE".to_vec(), strip_pad_pkcs_7(case, 20).unwrap());
    assert!(matches!(strip_pad_pkcs_7(case, 16), Err(Error::BlockSize { len: 20, block_size: 16 })));

    assert_eq!(vec![0x61, 0x61], strip_pad_pkcs_7(&[0x61, 0x61, 0x02, 0x02], 4).unwrap());

    let case_2 = [vec![0x94; 10], vec![0x06; 6]].concat();
    assert_eq!(vec![0x94; 10], strip_pad_pkcs_7(&case_2, 16).unwrap());

    let case_3 = [vec![0x94; 16], vec![0x10; 16]].concat();
    assert_eq!(vec![0x94; 16], strip_pad_pkcs_7(&case_3, 16).unwrap());

    // Cases from the padding validation exercise
    let case_4 = b"ICE ICE BABY\x04\x04\x04\x04";
    assert_eq!(b"ICE ICE BABY".to_vec(), strip_pad_pkcs_7(case_4, 16).unwrap());

    let case_5 = b"ICE ICE BABY\x05\x05\x05\x05";
    assert!(matches!(strip_pad_pkcs_7(case_5, 16), Err(Error::InvalidPadding)));

    let case_6 = b"ICE ICE BABY\x01\x02\x03\x04";
    assert!(matches!(strip_pad_pkcs_7(case_6, 16), Err(Error::InvalidPadding)));
}

#[test]
fn test_strip_pad_pkcs_7_rejects() {
    let misaligned = [vec![0x94; 11], vec![0x06; 6]].concat();
    assert!(matches!(strip_pad_pkcs_7(&misaligned, 16), Err(Error::BlockSize { .. })));

    let too_short = [vec![0x94; 11], vec![0x06; 5]].concat();
    assert!(matches!(strip_pad_pkcs_7(&too_short, 16), Err(Error::InvalidPadding)));

    let no_padding = vec![0x94; 16];
    assert!(matches!(strip_pad_pkcs_7(&no_padding, 16), Err(Error::InvalidPadding)));

    let zero = [vec![0x94; 15], vec![0x00]].concat();
    assert!(matches!(strip_pad_pkcs_7(&zero, 16), Err(Error::InvalidPadding)));

    let oversized = vec![0x11; 16];
    assert!(matches!(strip_pad_pkcs_7(&oversized, 16), Err(Error::InvalidPadding)));

    assert!(matches!(strip_pad_pkcs_7(&[], 16), Err(Error::InvalidPadding)));

    assert!(matches!(
        strip_pad_pkcs_7(&[0x01], 0),
        Err(Error::UnsupportedBlockSize { block_size: 0 })
    ));
    assert!(matches!(
        strip_pad_pkcs_7(&vec![0x01; 256], 256),
        Err(Error::UnsupportedBlockSize { block_size: 256 })
    ));
}

pub fn generate_random_bytes<const N: usize>() -> [u8; N] {
    let mut data = [0u8; N];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

#[test]
fn test_random_bytes() {
    assert_eq!(37, random_bytes(37).len());
    assert!(random_bytes(0).is_empty());
    let a: [u8; 16] = generate_random_bytes();
    let b: [u8; 16] = generate_random_bytes();
    assert_ne!(a, b);
}
