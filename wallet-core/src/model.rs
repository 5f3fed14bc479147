use kaspa_addresses::Address as KaspaAddress;
use kaspa_bip32::DerivationPath;
use kaspa_consensus_core::tx::ScriptPublicKey;
use kaspa_hashes::Hash as TransactionId;
use serde::Serialize;
use std::fmt;

/// Which of the two address chains an address or UTXO belongs to
/// (`spec.md` §3/§4.1: "two address chains, receive and change").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressKind {
    Receive,
    Change,
}

impl AddressKind {
    pub fn chain_index(self) -> u32 {
        match self {
            AddressKind::Receive => 0,
            AddressKind::Change => 1,
        }
    }
}

/// `spec.md` §3: `{ index, kind, address, privKeyRef }`. Derived once,
/// immutable for the wallet's lifetime. `priv_key_ref` never holds raw key
/// material — it is the derivation path used to re-derive the signing key
/// from the HD root at signing time (`spec.md` §5: "the HD private key ...
/// never leaves [the wallet] in plaintext").
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WalletAddress {
    pub index: u32,
    pub kind: AddressKind,
    pub address: KaspaAddress,
    pub priv_key_ref: DerivationPath,
}

/// The outpoint key, formatted exactly as `spec.md` §3 specifies:
/// `"txid:index"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Outpoint {
    pub transaction_id: TransactionId,
    pub index: u32,
}

impl Outpoint {
    pub fn new(transaction_id: TransactionId, index: u32) -> Self {
        Self { transaction_id, index }
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_id, self.index)
    }
}

/// `spec.md` §3: `UnspentOutput`. `block_blue_score` is the blue score the
/// output was included at; maturity is judged against the wallet's
/// currently tracked tip blue score (see `UtxoSet::is_mature_at`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: Outpoint,
    pub address: KaspaAddress,
    pub satoshis: u64,
    pub script_pub_key: ScriptPublicKey,
    pub block_blue_score: u64,
    pub is_coinbase: bool,
}

/// Wire-format transaction, exactly as `spec.md` §6 specifies it — this is
/// the payload `RpcApi::submit_transaction` sends, not the in-memory
/// `SignableTransaction` used while building and signing.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTransaction {
    pub version: u16,
    pub inputs: Vec<WireInput>,
    pub outputs: Vec<WireOutput>,
    pub lock_time: u64,
    pub subnetwork_id: String,
    pub payload_hash: String,
    pub fee: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOutpoint {
    pub transaction_id: String,
    pub index: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireInput {
    pub previous_outpoint: WireOutpoint,
    pub signature_script: String,
    pub sequence: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireScriptPublicKey {
    pub version: u16,
    pub script_public_key: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOutput {
    pub amount: u64,
    pub script_public_key: WireScriptPublicKey,
}

/// The fixed native subnetwork id (20 zero bytes, 40 hex chars) and zeroed
/// payload hash (32 zero bytes, 64 hex chars) `spec.md` §9 Open Questions
/// keeps as-is (see `DESIGN.md`).
pub fn native_subnetwork_id() -> String {
    "0".repeat(40)
}

pub fn zero_payload_hash() -> String {
    "0".repeat(64)
}
