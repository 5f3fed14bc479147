use crate::model::AddressKind;
use kaspa_addresses::{Address, Prefix, Version};
use kaspa_bip32::secp256k1::{PublicKey, SecretKey};
use kaspa_bip32::{DerivationPath, ExtendedPrivateKey, ExtendedPublicKey, Mnemonic};
use sha2::{Digest, Sha256};
use wallet_common::errors::{ResultExt, WalletResult};
use wallet_common::keys::{account_root_path, chain_path};
use wallet_common::network::NetworkId;

/// Maps a wallet network onto the address-encoding prefix the external
/// `kaspa-addresses` crate uses.
pub fn address_prefix(network: NetworkId) -> Prefix {
    match network {
        NetworkId::Mainnet => Prefix::Mainnet,
        NetworkId::Testnet => Prefix::Testnet,
        NetworkId::Simnet => Prefix::Simnet,
        NetworkId::Devnet => Prefix::Devnet,
    }
}

/// `spec.md` §3's `DerivationRoot`: `{ seed phrase, hdPrivateKey, uid }`.
/// Held only while a session is unlocked — the mnemonic is re-decrypted
/// from `wallet_common::keys::Keys` each time, never persisted in
/// plaintext.
#[derive(Clone)]
pub struct DerivationRoot {
    pub seed_phrase: String,
    pub master_private_key: ExtendedPrivateKey<SecretKey>,
    pub uid: String,
}

impl DerivationRoot {
    pub fn from_mnemonic(mnemonic: &Mnemonic) -> WalletResult<Self> {
        let seed = mnemonic.to_seed("");
        let master_private_key = ExtendedPrivateKey::new(seed).to_internal_server_error()?;
        let uid = Self::derive_uid(&master_private_key)?;
        Ok(Self {
            seed_phrase: mnemonic.phrase().to_string(),
            master_private_key,
            uid,
        })
    }

    /// `spec.md` §4.1: "An additional fixed index `m/44'/972'/0'/1'/0'`
    /// derives the wallet UID (a hash of that address, stripped of
    /// network prefix)." We hash the address's raw payload (its x-only
    /// public key bytes) rather than its prefixed string form, since that
    /// payload *is* the address stripped of any network prefix.
    fn derive_uid(master_private_key: &ExtendedPrivateKey<SecretKey>) -> WalletResult<String> {
        let uid_path: DerivationPath = "m/44'/972'/0'/1'/0'".parse().to_internal_server_error()?;
        let uid_key = master_private_key
            .clone()
            .derive_path(&uid_path)
            .to_internal_server_error()?;
        let payload = uid_key.public_key().x_only_public_key().0.serialize();
        let digest = Sha256::digest(payload);
        Ok(hex::encode(digest))
    }

    pub fn chain_private_key(&self, kind: AddressKind) -> WalletResult<ExtendedPrivateKey<SecretKey>> {
        let path = chain_path(kind.chain_index());
        self.master_private_key
            .clone()
            .derive_path(&path)
            .to_internal_server_error()
    }

    pub fn chain_public_key(&self, kind: AddressKind) -> WalletResult<ExtendedPublicKey<PublicKey>> {
        Ok(self.chain_private_key(kind)?.public_key())
    }

    pub fn account_root_private_key(&self) -> WalletResult<ExtendedPrivateKey<SecretKey>> {
        self.master_private_key
            .clone()
            .derive_path(&account_root_path())
            .to_internal_server_error()
    }
}

/// Derives address `index` on chain `kind` from that chain's already
/// hardened-derived public key (`spec.md` §4.1: the `<chain>'` component
/// is hardened, `<index>` is not, so addresses within a chain can be
/// produced from the chain-level public key alone).
pub fn derive_address(
    chain_public_key: &ExtendedPublicKey<PublicKey>,
    kind: AddressKind,
    index: u32,
    network: NetworkId,
) -> WalletResult<(Address, DerivationPath)> {
    let index_path: DerivationPath = format!("m/{index}").parse().to_internal_server_error()?;
    let derived = chain_public_key
        .clone()
        .derive_path(&index_path)
        .to_internal_server_error()?;
    let payload = derived.public_key().x_only_public_key().0.serialize();
    let address = Address::new(address_prefix(network), Version::PubKey, &payload);

    let full_path: DerivationPath = format!(
        "m/{}'/{}'/0'/{}'/{index}",
        wallet_common::keys::PURPOSE,
        wallet_common::keys::COIN_TYPE,
        kind.chain_index()
    )
    .parse()
    .to_internal_server_error()?;

    Ok((address, full_path))
}

/// Re-derives the private key for a given address's full derivation path,
/// from the already-unlocked `DerivationRoot`. Used only at signing time
/// (`spec.md` §5: "signing happens inside TxBuilder using in-memory
/// references").
pub fn derive_private_key(
    root: &DerivationRoot,
    path: &DerivationPath,
) -> WalletResult<ExtendedPrivateKey<SecretKey>> {
    root.master_private_key
        .clone()
        .derive_path(path)
        .to_internal_server_error()
}
