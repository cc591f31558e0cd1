pub mod common;
pub mod xor;
pub mod cipher;
pub mod oracle;
pub mod aes;

#[cfg(test)]
mod generic_tests {
    use crate::crypto::aes::cbc::{decrypt_cbc, encrypt_cbc};
    use crate::crypto::aes::ecb::{decrypt_ecb, encrypt_ecb};
    use crate::crypto::cipher::Aes;
    use crate::crypto::common::{random_bytes, strip_pad_pkcs_7};

    #[test]
    fn test_round_trips_across_key_sizes() {
        for key_len in [16, 24, 32] {
            let aes = Aes::new(&random_bytes(key_len)).unwrap();
            for len in [0, 1, 15, 16, 17, 31, 32, 33, 100] {
                let plaintext = random_bytes(len);

                let ecb = encrypt_ecb(&aes, &plaintext).unwrap();
                assert_eq!(0, ecb.len() % 16);
                assert!(ecb.len() > len);
                let decrypted = decrypt_ecb(&aes, &ecb).unwrap();
                assert_eq!(plaintext, strip_pad_pkcs_7(&decrypted, 16).unwrap());

                let iv = random_bytes(16);
                let cbc = encrypt_cbc(&aes, &plaintext, &iv).unwrap();
                assert_eq!(ecb.len(), cbc.len());
                assert_eq!(plaintext, decrypt_cbc(&aes, &cbc, &iv).unwrap());
            }
        }
    }

    #[test]
    fn test_cbc_iv_changes_ciphertext() {
        let aes = Aes::random();
        let plaintext = b"same plaintext, different iv";
        let a = encrypt_cbc(&aes, plaintext, &random_bytes(16)).unwrap();
        let b = encrypt_cbc(&aes, plaintext, &random_bytes(16)).unwrap();
        assert_ne!(a, b);
    }
}
