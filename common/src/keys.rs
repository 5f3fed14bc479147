use crate::encrypted_mnemonic::EncryptedMnemonic;
use crate::errors::{ResultExt, WalletResult};
use crate::network::NetworkId;
use kaspa_bip32::secp256k1::PublicKey;
use kaspa_bip32::{DerivationPath, ExtendedPublicKey, Mnemonic};
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

/// `m/44'/972'/0'` — fixed account-level parent path for the single HD
/// root this wallet manages. `spec.md` §4.1 names `44'`/`972'` explicitly;
/// there is no per-cosigner branch because multi-account/multisig
/// management is out of scope (`spec.md` §1 Non-goals).
pub const PURPOSE: u32 = 44;
pub const COIN_TYPE: u32 = 972;

pub fn account_root_path() -> DerivationPath {
    format!("m/{PURPOSE}'/{COIN_TYPE}'/0'").parse().unwrap()
}

/// `spec.md` §4.1's path has a hardened chain component
/// (`m/44'/972'/0'/<chain>'/<index>`), so deriving the chain-level key
/// itself requires the private root; deriving each address *within* a
/// chain from its chain-level key is a normal (non-hardened) step and can
/// be done from that chain's public key alone. `Keys` therefore caches the
/// two chain-level public keys once at unlock time, so routine address
/// derivation afterwards never needs the decrypted mnemonic.
pub fn chain_path(chain: u32) -> DerivationPath {
    format!("m/{PURPOSE}'/{COIN_TYPE}'/0'/{chain}'").parse().unwrap()
}

pub const KEY_FILE_VERSION: i32 = 1;

#[derive(Debug)]
pub struct Keys {
    file_path: String,
    pub version: i32,
    pub network: NetworkId,
    pub encrypted_mnemonic: EncryptedMnemonic,
    pub receive_chain_public_key: ExtendedPublicKey<PublicKey>,
    pub change_chain_public_key: ExtendedPublicKey<PublicKey>,
    pub last_receive_index: u32,
    pub last_change_index: u32,
}

#[derive(Clone, Serialize, Deserialize)]
struct KeysJson {
    version: i32,
    network: String,
    encrypted_mnemonic: EncryptedMnemonic,
    receive_chain_public_key: String,
    change_chain_public_key: String,
    last_receive_index: u32,
    last_change_index: u32,
}

impl From<&Keys> for KeysJson {
    fn from(keys: &Keys) -> Self {
        KeysJson {
            version: keys.version,
            network: keys.network.to_string(),
            encrypted_mnemonic: keys.encrypted_mnemonic.clone(),
            receive_chain_public_key: keys.receive_chain_public_key.to_string(None),
            change_chain_public_key: keys.change_chain_public_key.to_string(None),
            last_receive_index: keys.last_receive_index,
            last_change_index: keys.last_change_index,
        }
    }
}

impl KeysJson {
    fn into_keys(self, file_path: &str) -> WalletResult<Keys> {
        let network = self.network.parse().to_user_input_error()?;
        let receive_chain_public_key =
            ExtendedPublicKey::from_str(&self.receive_chain_public_key)
                .to_internal_server_error()?;
        let change_chain_public_key =
            ExtendedPublicKey::from_str(&self.change_chain_public_key)
                .to_internal_server_error()?;
        Ok(Keys {
            file_path: file_path.to_string(),
            version: self.version,
            network,
            encrypted_mnemonic: self.encrypted_mnemonic,
            receive_chain_public_key,
            change_chain_public_key,
            last_receive_index: self.last_receive_index,
            last_change_index: self.last_change_index,
        })
    }
}

impl Keys {
    pub fn new(
        file_path: String,
        network: NetworkId,
        encrypted_mnemonic: EncryptedMnemonic,
        receive_chain_public_key: ExtendedPublicKey<PublicKey>,
        change_chain_public_key: ExtendedPublicKey<PublicKey>,
    ) -> Self {
        Keys {
            file_path,
            version: KEY_FILE_VERSION,
            network,
            encrypted_mnemonic,
            receive_chain_public_key,
            change_chain_public_key,
            last_receive_index: 0,
            last_change_index: 0,
        }
    }

    pub fn load(file_path: &str) -> WalletResult<Keys> {
        let serialized = fs::read_to_string(file_path).to_internal_server_error()?;
        let keys_json: KeysJson = serde_json::from_str(&serialized).to_user_input_error()?;
        keys_json.into_keys(file_path)
    }

    pub fn save(&self) -> WalletResult<()> {
        let keys_json: KeysJson = self.into();
        let serialized = serde_json::to_string_pretty(&keys_json).to_internal_server_error()?;

        let path = Path::new(&self.file_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).to_internal_server_error()?;
        }
        let mut file = File::create(path).to_internal_server_error()?;
        file.write_all(serialized.as_bytes())
            .to_internal_server_error()?;
        Ok(())
    }

    pub fn decrypt_mnemonic(&self, password: &str) -> WalletResult<Mnemonic> {
        self.encrypted_mnemonic.decrypt(password)
    }
}
