use rand::Rng;
use snafu::ensure;

use crate::crypto::aes::{Mode, checked_block_size};
use crate::crypto::aes::cbc::{encrypt_cbc, decrypt_cbc};
use crate::crypto::aes::ecb::encrypt_ecb;
use crate::crypto::cipher::{Aes, BlockCipher, AES_BLOCK_SIZE};
use crate::crypto::common::{generate_random_bytes, random_bytes};
use crate::util::{IvSizeSnafu, Result};

/// Chosen-plaintext access: attacker bytes in, ciphertext out.
pub trait EncryptionOracle {
    fn encrypt(&self, input: &[u8]) -> Result<Vec<u8>>;
}

impl<F: Fn(&[u8]) -> Result<Vec<u8>>> EncryptionOracle for F {
    fn encrypt(&self, input: &[u8]) -> Result<Vec<u8>> {
        self(input)
    }
}

/// Chosen-ciphertext access that only reveals whether the padding survived
/// decryption. An `Err` is a genuine failure, never "invalid padding".
pub trait PaddingOracle {
    fn check_padding(&self, ciphertext: &[u8]) -> Result<bool>;
}

impl<F: Fn(&[u8]) -> Result<bool>> PaddingOracle for F {
    fn check_padding(&self, ciphertext: &[u8]) -> Result<bool> {
        self(ciphertext)
    }
}

/// Collapses a decryption result into a padding verdict: padding and
/// block-alignment failures become `false`, anything else is passed on.
pub fn padding_verdict<T>(result: Result<T>) -> Result<bool> {
    match result {
        Ok(_)                            => Ok(true),
        Err(e) if e.is_padding_signal()  => Ok(false),
        Err(e)                           => Err(e),
    }
}

enum Chaining {
    Ecb,
    Cbc(Vec<u8>),
}

/// Encrypts `prefix ++ input ++ suffix` under a key, IV and affixes fixed at
/// construction and never shown to the caller.
pub struct HiddenTextOracle<C = Aes> {
    cipher: C,
    chaining: Chaining,
    prefix: Vec<u8>,
    suffix: Vec<u8>,
}

impl HiddenTextOracle<Aes> {
    pub fn random_ecb() -> Self {
        Self::ecb(Aes::random())
    }

    pub fn random_cbc() -> Self {
        let iv: [u8; AES_BLOCK_SIZE] = generate_random_bytes();
        Self {
            cipher: Aes::random(),
            chaining: Chaining::Cbc(iv.to_vec()),
            prefix: Vec::new(),
            suffix: Vec::new(),
        }
    }
}

impl<C: BlockCipher> HiddenTextOracle<C> {
    pub fn ecb(cipher: C) -> Self {
        Self {
            cipher,
            chaining: Chaining::Ecb,
            prefix: Vec::new(),
            suffix: Vec::new(),
        }
    }

    pub fn cbc(cipher: C, iv: &[u8]) -> Result<Self> {
        let block_size = checked_block_size(&cipher)?;
        ensure!(iv.len() == block_size, IvSizeSnafu { len: iv.len(), block_size });
        Ok(Self {
            cipher,
            chaining: Chaining::Cbc(iv.to_vec()),
            prefix: Vec::new(),
            suffix: Vec::new(),
        })
    }

    pub fn with_prefix(mut self, prefix: &[u8]) -> Self {
        self.prefix = prefix.to_vec();
        self
    }

    pub fn with_suffix(mut self, suffix: &[u8]) -> Self {
        self.suffix = suffix.to_vec();
        self
    }

    pub fn with_random_prefix<const MIN: usize, const MAX: usize>(self) -> Self {
        let len = rand::thread_rng().gen_range(MIN..=MAX);
        self.with_prefix(&random_bytes(len))
    }

    pub fn mode(&self) -> Mode {
        match self.chaining {
            Chaining::Ecb    => Mode::Ecb,
            Chaining::Cbc(_) => Mode::Cbc,
        }
    }
}

impl<C: BlockCipher> EncryptionOracle for HiddenTextOracle<C> {
    fn encrypt(&self, input: &[u8]) -> Result<Vec<u8>> {
        let plaintext = [
            self.prefix.as_slice(),
            input,
            self.suffix.as_slice(),
        ].concat();
        match &self.chaining {
            Chaining::Ecb    => encrypt_ecb(&self.cipher, &plaintext),
            Chaining::Cbc(iv) => encrypt_cbc(&self.cipher, &plaintext, iv),
        }
    }
}

/// Flips a coin between ECB and CBC once, then wraps every query in 5 to 10
/// random bytes on each side and encrypts it under a fresh random key.
pub struct RandomModeOracle {
    mode: Mode,
}

impl RandomModeOracle {
    pub fn new() -> Self {
        let mode = if rand::thread_rng().gen() { Mode::Ecb } else { Mode::Cbc };
        Self { mode }
    }

    /// The mode actually in use, for checking a detector's answer.
    pub fn mode(&self) -> Mode {
        self.mode
    }
}

impl Default for RandomModeOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl EncryptionOracle for RandomModeOracle {
    fn encrypt(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut rng = rand::thread_rng();
        let prefix = random_bytes(rng.gen_range(5..=10));
        let suffix = random_bytes(rng.gen_range(5..=10));
        let oracle = match self.mode {
            Mode::Ecb => HiddenTextOracle::random_ecb(),
            Mode::Cbc => HiddenTextOracle::random_cbc(),
        };
        oracle
            .with_prefix(&prefix)
            .with_suffix(&suffix)
            .encrypt(input)
    }
}

/// Holds a CBC key and IV. It hands out ciphertexts and afterwards answers
/// only whether a submitted ciphertext decrypts to valid padding.
pub struct CbcPaddingOracle<C = Aes> {
    cipher: C,
    iv: Vec<u8>,
}

impl CbcPaddingOracle<Aes> {
    pub fn random() -> Self {
        let iv: [u8; AES_BLOCK_SIZE] = generate_random_bytes();
        Self { cipher: Aes::random(), iv: iv.to_vec() }
    }
}

impl<C: BlockCipher> CbcPaddingOracle<C> {
    pub fn new(cipher: C, iv: &[u8]) -> Result<Self> {
        let block_size = checked_block_size(&cipher)?;
        ensure!(iv.len() == block_size, IvSizeSnafu { len: iv.len(), block_size });
        Ok(Self { cipher, iv: iv.to_vec() })
    }

    /// The IV travels with the ciphertext, so it is not a secret.
    pub fn iv(&self) -> &[u8] {
        &self.iv
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        encrypt_cbc(&self.cipher, plaintext, &self.iv)
    }
}

impl<C: BlockCipher> PaddingOracle for CbcPaddingOracle<C> {
    fn check_padding(&self, ciphertext: &[u8]) -> Result<bool> {
        padding_verdict(decrypt_cbc(&self.cipher, ciphertext, &self.iv))
    }
}

#[cfg(test)]
use crate::util::Error;

#[test]
fn test_padding_verdict() {
    assert!(padding_verdict(Ok(())).unwrap());
    assert!(!padding_verdict::<()>(Err(Error::InvalidPadding)).unwrap());
    assert!(!padding_verdict::<()>(Err(Error::BlockSize { len: 1, block_size: 16 })).unwrap());
    assert!(matches!(
        padding_verdict::<()>(Err(Error::CiphertextSize { len: 1, block_size: 16 })),
        Err(Error::CiphertextSize { .. })
    ));
}

#[test]
fn test_hidden_text_oracle_is_deterministic() {
    for oracle in [
        HiddenTextOracle::random_ecb().with_suffix(b"suffix"),
        HiddenTextOracle::random_cbc().with_random_prefix::<0, 20>(),
    ] {
        let first = oracle.encrypt(b"attacker").unwrap();
        let second = oracle.encrypt(b"attacker").unwrap();
        assert_eq!(first, second);
        assert_eq!(0, first.len() % AES_BLOCK_SIZE);
    }
}

#[test]
fn test_hidden_text_oracle_layout() {
    let key = b"YELLOW SUBMARINE";
    let oracle = HiddenTextOracle::ecb(Aes::new(key).unwrap())
        .with_prefix(b"before")
        .with_suffix(b"after");
    let expected = encrypt_ecb(&Aes::new(key).unwrap(), b"before-middle-after").unwrap();
    assert_eq!(expected, oracle.encrypt(b"-middle-").unwrap());
    assert_eq!(Mode::Ecb, oracle.mode());

    let iv = [7u8; AES_BLOCK_SIZE];
    let oracle = HiddenTextOracle::cbc(Aes::new(key).unwrap(), &iv).unwrap();
    let expected = encrypt_cbc(&Aes::new(key).unwrap(), b"-middle-", &iv).unwrap();
    assert_eq!(expected, oracle.encrypt(b"-middle-").unwrap());
    assert_eq!(Mode::Cbc, oracle.mode());

    assert!(matches!(
        HiddenTextOracle::cbc(Aes::random(), &[0u8; 8]),
        Err(Error::IvSize { len: 8, block_size: 16 })
    ));
}

#[test]
fn test_closure_oracles() {
    let echo = |buf: &[u8]| -> Result<Vec<u8>> { Ok(buf.to_vec()) };
    assert_eq!(b"abc".to_vec(), echo.encrypt(b"abc").unwrap());

    let never = |_: &[u8]| -> Result<bool> { Ok(false) };
    assert!(!never.check_padding(&[0u8; 32]).unwrap());
}

#[test]
fn test_cbc_padding_oracle() {
    let oracle = CbcPaddingOracle::random();
    let ciphertext = oracle.encrypt(b"attack at dawn").unwrap();
    assert!(oracle.check_padding(&ciphertext).unwrap());

    // Not a padding verdict: the ciphertext doesn't split into blocks.
    assert!(matches!(
        oracle.check_padding(&ciphertext[1..]),
        Err(Error::CiphertextSize { len: 15, block_size: 16 })
    ));
    assert_eq!(AES_BLOCK_SIZE, oracle.iv().len());
}
