use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("block size {block_size} does not divide data of length {len}"))]
    BlockSize { len: usize, block_size: usize },

    #[snafu(display("data has invalid padding"))]
    InvalidPadding,

    #[snafu(display("ciphertext of length {len} is not a multiple of block size {block_size}"))]
    CiphertextSize { len: usize, block_size: usize },

    #[snafu(display("iv of length {len} does not match block size {block_size}"))]
    IvSize { len: usize, block_size: usize },

    #[snafu(display("no AES variant takes a {len} byte key"))]
    InvalidKeyLength { len: usize },

    #[snafu(display("block size {block_size} cannot be expressed in PKCS#7 padding"))]
    UnsupportedBlockSize { block_size: usize },

    #[snafu(display("cipher failure: {source}"))]
    Cipher { source: openssl::error::ErrorStack },

    #[snafu(display("oracle returned {got} bytes of ciphertext, needed at least {needed}"))]
    TruncatedCiphertext { needed: usize, got: usize },

    #[snafu(display("failed to find block size within {window} bytes of input"))]
    NoBlockSizeFound { window: usize },

    #[snafu(display("failed to detect plaintext byte {offset}"))]
    NoByteFound { offset: usize },

    #[snafu(display("found no candidates for byte {index} of block {block}"))]
    NoCandidate { block: usize, index: usize },

    #[snafu(display("no aligned pair of identical blocks found, oracle is not ECB"))]
    NoAlignedBlocks,

    #[snafu(display("attacker input never crossed a block boundary"))]
    NoPrefixBoundary,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// True for the failures a padding oracle reports as "invalid" rather than surfacing.
    pub fn is_padding_signal(&self) -> bool {
        matches!(self, Error::InvalidPadding | Error::BlockSize { .. })
    }
}

pub fn round_up_to_nearest_multiple(n: usize, m: usize) -> usize {
    m*( (n + (m-1)) / m )
}

#[test]
fn test_round_up_to_nearest_multiple() {
    assert_eq!(0,  round_up_to_nearest_multiple(0, 16));
    assert_eq!(16, round_up_to_nearest_multiple(1, 16));
    assert_eq!(16, round_up_to_nearest_multiple(16, 16));
    assert_eq!(32, round_up_to_nearest_multiple(17, 16));
}

#[test]
fn test_padding_signal() {
    assert!(Error::InvalidPadding.is_padding_signal());
    assert!(Error::BlockSize { len: 3, block_size: 16 }.is_padding_signal());
    assert!(!Error::CiphertextSize { len: 3, block_size: 16 }.is_padding_signal());
    assert!(!Error::NoAlignedBlocks.is_padding_signal());
}
