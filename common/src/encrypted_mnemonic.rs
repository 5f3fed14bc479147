use crate::errors::{ResultExt, WalletResult};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};
use chacha20poly1305::aead::{AeadMutInPlace, Key, Nonce};
use chacha20poly1305::{aead::KeyInit, AeadCore, XChaCha20Poly1305};
use kaspa_bip32::mnemonic::Mnemonic;
use kaspa_bip32::Language;
use serde::{Deserialize, Serialize};

const NONCE_SIZE: usize = 24;

/// A ciphertext-plus-salt pair, hex-encoded, produced by [`encrypt_string`].
/// Both the persisted mnemonic (`EncryptedMnemonic`) and the ad-hoc seed
/// export blob (`spec.md` §6) are this same shape: Argon2id over the
/// password feeds the XChaCha20-Poly1305 key, the 24-byte nonce is
/// prepended to the ciphertext.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Ciphertext {
    cipher: String,
    salt: String,
}

pub fn encrypt_string(plaintext: &str, password: &str) -> WalletResult<Ciphertext> {
    let salt = SaltString::generate(&mut OsRng);
    let cipher = encrypt(plaintext.as_bytes(), password, &salt).to_internal_server_error()?;
    Ok(Ciphertext {
        cipher: hex::encode(cipher),
        salt: salt.to_string(),
    })
}

pub fn decrypt_string(ciphertext: &Ciphertext, password: &str) -> WalletResult<String> {
    let plaintext = decrypt(ciphertext, password)?;
    String::from_utf8(plaintext).to_user_input_error()
}

fn decrypt(ciphertext: &Ciphertext, password: &str) -> WalletResult<Vec<u8>> {
    let salt = SaltString::from_b64(&ciphertext.salt).to_internal_server_error()?;
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .to_internal_server_error()?;
    let hash = password_hash.hash.ok_or_else(|| {
        crate::errors::WalletError::internal(anyhow::anyhow!("argon2 produced no hash"))
    })?;
    let key = Key::<XChaCha20Poly1305>::from_slice(hash.as_bytes());
    let mut cipher = XChaCha20Poly1305::new(key);

    let cipher_bytes = hex::decode(&ciphertext.cipher).to_user_input_error()?;
    if cipher_bytes.len() < NONCE_SIZE {
        return Err(crate::errors::WalletError::user_input(
            "ciphertext is shorter than the nonce",
        ));
    }
    let (nonce_bytes, cipher_text) = cipher_bytes.split_at(NONCE_SIZE);
    let mut cipher_text = cipher_text.to_vec();
    let nonce = Nonce::<XChaCha20Poly1305>::from_slice(nonce_bytes);
    cipher
        .decrypt_in_place(nonce, &[], &mut cipher_text)
        .map_err(|_| crate::errors::WalletError::user_input("wrong password"))?;
    Ok(cipher_text)
}

fn encrypt(plaintext: &[u8], password: &str, salt: &SaltString) -> anyhow::Result<Vec<u8>> {
    let argon2 = Argon2::default();
    let password_hash = argon2.hash_password(password.as_bytes(), salt)?;
    let hash = password_hash
        .hash
        .ok_or_else(|| anyhow::anyhow!("argon2 produced no hash"))?;
    let key = Key::<XChaCha20Poly1305>::from_slice(hash.as_bytes());
    let mut cipher = XChaCha20Poly1305::new(key);
    let nonce = XChaCha20Poly1305::generate_nonce(OsRng);

    let mut buffer = plaintext.to_vec();
    cipher
        .encrypt_in_place(&nonce, &[], &mut buffer)
        .map_err(|e| anyhow::anyhow!("encryption failed: {e}"))?;
    buffer.splice(0..0, nonce.iter().cloned());

    Ok(buffer)
}

/// A BIP39 mnemonic encrypted at rest, the secret persisted in the wallet's
/// keys file between runs.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct EncryptedMnemonic(Ciphertext);

impl EncryptedMnemonic {
    pub fn new(mnemonic: &Mnemonic, password: &str) -> WalletResult<Self> {
        Ok(EncryptedMnemonic(encrypt_string(mnemonic.phrase(), password)?))
    }

    pub fn decrypt(&self, password: &str) -> WalletResult<Mnemonic> {
        let phrase = decrypt_string(&self.0, password)?;
        Mnemonic::new(phrase, Language::English).to_user_input_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaspa_bip32::WordCount;

    #[test]
    fn round_trips_with_correct_password() {
        let mnemonic = Mnemonic::random(WordCount::Words24, Language::English).unwrap();
        let encrypted = EncryptedMnemonic::new(&mnemonic, "correct horse battery staple").unwrap();
        let decrypted = encrypted
            .decrypt("correct horse battery staple")
            .unwrap();
        assert_eq!(decrypted.phrase(), mnemonic.phrase());
    }

    #[test]
    fn rejects_wrong_password() {
        let mnemonic = Mnemonic::random(WordCount::Words24, Language::English).unwrap();
        let encrypted = EncryptedMnemonic::new(&mnemonic, "right password").unwrap();
        assert!(encrypted.decrypt("wrong password").is_err());
    }
}
