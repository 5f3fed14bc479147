use crate::address_manager::AddressManager;
use crate::derivation::DerivationRoot;
use crate::model::{
    AddressKind, Outpoint, Utxo, WireInput, WireOutpoint, WireOutput, WireScriptPublicKey,
    WireTransaction, native_subnetwork_id, zero_payload_hash,
};
use crate::rpc::RpcApi;
use crate::tx_store::{Direction, TxRecord, TxStore};
use crate::utxo_set::UtxoSet;
use kaspa_addresses::Address;
use kaspa_bip32::secp256k1;
use kaspa_consensus_core::hashing::sighash::{SigHashReusedValuesUnsync, calc_schnorr_signature_hash};
use kaspa_consensus_core::hashing::sighash_type::SIG_HASH_ALL;
use kaspa_consensus_core::tx::{
    SignableTransaction, Transaction, TransactionInput, TransactionOutpoint, TransactionOutput,
    UtxoEntry,
};
use kaspa_txscript::pay_to_address_script;
use kaspa_wallet_core::tx::{MAXIMUM_STANDARD_TRANSACTION_MASS, MassCalculator};
use std::sync::Arc;
use wallet_common::errors::{ResultExt, WalletError, WalletResult};
use wallet_common::events::{EventEmitter, WalletEvent};
use wallet_common::network::NetworkId;

/// `spec.md` §4.3's empirical calibration constants for the fee-convergence
/// loop (`DESIGN.md` Open Questions decision 1): the signature-script
/// overhead assumed per input while the transaction is still unsigned, and
/// the (small) correction once it is actually signed.
const UNSIGNED_SIGNATURE_SCRIPT_BYTES_PER_INPUT: i64 = 151;
const SIGNED_SIZE_CORRECTION_PER_INPUT: i64 = -2;

/// `spec.md` §4.3: "`MaxMassUTXOs = MaxMassAcceptedByBlock −
/// EstimatedStandaloneMassWithoutInputs`." `MaxMassAcceptedByBlock` is the
/// wider wallet-core's own `MAXIMUM_STANDARD_TRANSACTION_MASS`; the
/// standalone mass is measured directly off an inputless transaction
/// skeleton rather than hand-copied as a second constant.
fn max_mass_accepted_by_block() -> u64 {
    MAXIMUM_STANDARD_TRANSACTION_MASS
}

/// Parameters for an ordinary outgoing payment (`spec.md` §4.3 `composeTx`
/// / `estimateTransaction`).
#[derive(Clone)]
pub struct SendParams {
    pub to_address: Address,
    pub amount: u64,
    pub priority_fee: u64,
    pub inclusive_fee: bool,
    pub calculate_network_fee: bool,
    pub network_fee_max: Option<u64>,
    pub change_address_override: Option<Address>,
    pub skip_sign: bool,
}

/// Parameters for a compounding sweep (`spec.md` §4.3 "`collectUtxos(maxCount)`
/// when compounding"; scenario 7 in §8).
#[derive(Clone)]
pub struct CompoundParams {
    pub max_count: usize,
    pub priority_fee: u64,
    pub change_address_override: Option<Address>,
    pub skip_sign: bool,
}

/// A fully assembled candidate transaction, signed or not depending on
/// `skip_sign`. Carries everything `submit_transaction` needs afterwards:
/// the inputs actually spent (to mark `used`/`in_use`) and the change
/// address reserved for it (to `reverse()` on failure downstream).
pub struct ComposedTx {
    pub inputs: Vec<Utxo>,
    pub signable: SignableTransaction,
    pub change_address: Option<Address>,
    pub fee: u64,
}

impl ComposedTx {
    fn input_count(&self) -> usize {
        self.signable.tx.inputs.len()
    }

    fn is_signed(&self) -> bool {
        self.signable
            .tx
            .inputs
            .first()
            .is_some_and(|input| !input.signature_script.is_empty())
    }
}

/// `spec.md` §4.3/§4.4: selects UTXOs, iterates fee convergence, signs, and
/// hands the wire-format payload to `RpcApi::submit_transaction`. Holds no
/// state of its own beyond the collaborators it was built with — every
/// method takes the unlocked `DerivationRoot` explicitly rather than caching
/// it, so the wallet can drop it the moment a session locks.
pub struct TxBuilder {
    network: NetworkId,
    address_manager: Arc<AddressManager>,
    utxo_set: Arc<UtxoSet>,
    tx_store: Arc<TxStore>,
    rpc: Arc<dyn RpcApi>,
    mass_calculator: MassCalculator,
    emitter: Arc<EventEmitter>,
    default_fee_per_byte: u64,
}

impl TxBuilder {
    pub fn new(
        network: NetworkId,
        address_manager: Arc<AddressManager>,
        utxo_set: Arc<UtxoSet>,
        tx_store: Arc<TxStore>,
        rpc: Arc<dyn RpcApi>,
        emitter: Arc<EventEmitter>,
        default_fee_per_byte: u64,
    ) -> Self {
        Self {
            network,
            address_manager,
            utxo_set,
            tx_store,
            rpc,
            mass_calculator: MassCalculator::new(&network.kaspa_network_type()),
            emitter,
            default_fee_per_byte,
        }
    }

    /// `composeTx(params)`: a single-pass build at a given total `fee`, no
    /// fee-convergence loop. Exposed on its own because `estimateTransaction`
    /// calls it repeatedly with a recomputed fee each iteration.
    pub fn compose_tx(
        &self,
        root: &DerivationRoot,
        params: &SendParams,
        fee: u64,
    ) -> WalletResult<ComposedTx> {
        let target = if params.inclusive_fee {
            params.amount
        } else {
            params.amount.saturating_add(fee)
        };
        let (selected, total) = self.utxo_set.select_utxos(target)?;

        let recipient_amount = if params.inclusive_fee {
            params
                .amount
                .checked_sub(fee)
                .ok_or_else(|| WalletError::user_input("priority fee exceeds the send amount"))?
        } else {
            params.amount
        };

        let (change_address, reserved_change) = self.reserve_change_address(&params.change_address_override)?;

        let build = || -> WalletResult<ComposedTx> {
            let spend = recipient_amount.saturating_add(fee);
            if total < spend {
                return Err(WalletError::user_input(format!(
                    "insufficient funds: need {spend} sompi, have {total} sompi selected"
                )));
            }
            let change = total - spend;

            let mut outputs = vec![(params.to_address.clone(), recipient_amount)];
            if change > 0 {
                outputs.push((change_address.clone(), change));
            }

            let signable = self.assemble(&selected, &outputs)?;
            let signable = if params.skip_sign {
                signable
            } else {
                self.sign(root, signable, &selected)?
            };

            Ok(ComposedTx {
                inputs: selected.clone(),
                signable,
                change_address: Some(change_address.clone()),
                fee,
            })
        };

        match build() {
            Ok(composed) => Ok(composed),
            Err(err) => {
                if reserved_change {
                    self.address_manager.reverse(AddressKind::Change);
                }
                Err(err)
            }
        }
    }

    fn reserve_change_address(
        &self,
        override_address: &Option<Address>,
    ) -> WalletResult<(Address, bool)> {
        match override_address {
            Some(address) => Ok((address.clone(), false)),
            None => {
                let address = self.address_manager.next(AddressKind::Change)?;
                Ok((address.address, true))
            }
        }
    }

    /// `collectUtxos(maxCount)` plus the single-output assembly
    /// compounding uses (`spec.md` §4.3, scenario 7 in §8): no separate
    /// recipient, the aggregated amount minus fee goes entirely to a fresh
    /// change address.
    pub fn compose_compound(
        &self,
        root: &DerivationRoot,
        params: &CompoundParams,
        fee: u64,
    ) -> WalletResult<ComposedTx> {
        let (selected, total) = self.utxo_set.collect_utxos(params.max_count);
        if selected.is_empty() {
            return Err(WalletError::user_input("no confirmed utxos available to compound"));
        }
        let spend = params.priority_fee.saturating_add(fee);
        if total <= spend {
            return Err(WalletError::user_input(format!(
                "insufficient funds to compound: fee {spend} sompi meets or exceeds collected {total} sompi"
            )));
        }

        let (change_address, reserved_change) =
            self.reserve_change_address(&params.change_address_override)?;

        let build = || -> WalletResult<ComposedTx> {
            let amount = total - spend;
            let signable = self.assemble(&selected, &[(change_address.clone(), amount)])?;
            let signable = if params.skip_sign {
                signable
            } else {
                self.sign(root, signable, &selected)?
            };
            Ok(ComposedTx {
                inputs: selected.clone(),
                signable,
                change_address: Some(change_address.clone()),
                fee: spend,
            })
        };

        match build() {
            Ok(composed) => Ok(composed),
            Err(err) => {
                if reserved_change {
                    self.address_manager.reverse(AddressKind::Change);
                }
                Err(err)
            }
        }
    }

    fn assemble(&self, inputs: &[Utxo], outputs: &[(Address, u64)]) -> WalletResult<SignableTransaction> {
        let mut tx_inputs = Vec::with_capacity(inputs.len());
        let mut utxo_entries = Vec::with_capacity(inputs.len());
        for utxo in inputs {
            let previous_outpoint =
                TransactionOutpoint::new(utxo.outpoint.transaction_id, utxo.outpoint.index);
            tx_inputs.push(TransactionInput::new(previous_outpoint, vec![], 0, 1));
            utxo_entries.push(UtxoEntry::new(
                utxo.satoshis,
                utxo.script_pub_key.clone(),
                utxo.block_blue_score,
                utxo.is_coinbase,
            ));
        }

        let tx_outputs: Vec<TransactionOutput> = outputs
            .iter()
            .map(|(address, amount)| {
                TransactionOutput::new(*amount, pay_to_address_script(address))
            })
            .collect();

        let transaction = Transaction::new(0, tx_inputs, tx_outputs, 0, Default::default(), 0, vec![]);
        Ok(SignableTransaction::with_entries(transaction, utxo_entries))
    }

    /// `spec.md` §4.3 step 4: "Sign with Schnorr SIGHASH_ALL using the
    /// private keys corresponding to each input's address." Single-sig
    /// only (`spec.md` §1 Non-goals: no multisig), so each input is signed
    /// independently against the key re-derived for its own owning address.
    fn sign(
        &self,
        root: &DerivationRoot,
        mut signable: SignableTransaction,
        inputs: &[Utxo],
    ) -> WalletResult<SignableTransaction> {
        let reused_values = SigHashReusedValuesUnsync::new();
        for (index, utxo) in inputs.iter().enumerate() {
            let wallet_address = self
                .address_manager
                .find(&utxo.address)
                .ok_or_else(|| WalletError::sanity_check("selected utxo's address is not ours"))?;
            let private_key = crate::derivation::derive_private_key(root, &wallet_address.priv_key_ref)?;

            let sig_hash =
                calc_schnorr_signature_hash(&signable.as_verifiable(), index, SIG_HASH_ALL, &reused_values);
            let msg = secp256k1::Message::from_digest_slice(sig_hash.as_bytes().as_slice())
                .to_internal_server_error()?;
            let keypair = secp256k1::Keypair::from_seckey_slice(
                secp256k1::SECP256K1,
                &private_key.private_key().secret_bytes(),
            )
            .to_internal_server_error()?;
            let signature: [u8; 64] = *keypair.sign_schnorr(msg).as_ref();

            signable.tx.inputs[index].signature_script = std::iter::once(65u8)
                .chain(signature)
                .chain([SIG_HASH_ALL.to_u8()])
                .collect();
        }
        Ok(signable)
    }

    /// Approximates the wire-serialized byte length of a transaction
    /// skeleton (`spec.md` §4.3 `txSize`): not the chain's weighted "mass",
    /// just a byte count used to estimate `dataFee`.
    fn tx_size(&self, composed: &ComposedTx) -> i64 {
        let tx = &composed.signable.tx;
        let mut size: i64 = 2 // version
            + 8 // input count varint (upper bound)
            + 8 // output count varint (upper bound)
            + 8 // lockTime
            + 20 // subnetworkId
            + 8 // gas
            + 32; // payload hash
        for input in &tx.inputs {
            size += 36 // previous outpoint
                + 8 // varint for script length (upper bound)
                + input.signature_script.len() as i64
                + 8; // sequence
        }
        for output in &tx.outputs {
            size += 8 // amount
                + 2 // script version
                + 8 // varint for script length (upper bound)
                + output.script_public_key.script().len() as i64;
        }

        let input_count = tx.inputs.len() as i64;
        if composed.is_signed() {
            size + SIGNED_SIZE_CORRECTION_PER_INPUT * input_count
        } else {
            size + UNSIGNED_SIGNATURE_SCRIPT_BYTES_PER_INPUT * input_count
        }
    }

    /// `estimateTransaction(params)`: the iterative fee-convergence loop in
    /// `spec.md` §4.3. Each pass recomposes the transaction at the fee
    /// implied by the previous pass's measured size, stopping once another
    /// pass would not raise the fee further (`DESIGN.md` records the exact
    /// reading of the spec's convergence condition this implements).
    pub fn estimate_send(&self, root: &DerivationRoot, params: &SendParams) -> WalletResult<ComposedTx> {
        if !params.calculate_network_fee {
            let composed = self.compose_tx(root, params, params.priority_fee)?;
            let data_fee = self.tx_size(&composed).max(0) as u64 * self.default_fee_per_byte;
            if data_fee > params.priority_fee {
                return Err(WalletError::user_input(format!(
                    "minimum fee required is {} sompi",
                    data_fee
                )));
            }
            return Ok(composed);
        }

        let mut fee = params.priority_fee;
        loop {
            let composed = self.compose_tx(root, params, fee)?;
            let size = self.tx_size(&composed).max(0) as u64;
            let data_fee = size * self.default_fee_per_byte;
            let next_fee = params.priority_fee.saturating_add(data_fee);

            if let Some(max_fee) = params.network_fee_max {
                if max_fee > 0 && next_fee > max_fee {
                    return Err(WalletError::user_input(format!(
                        "network fee {next_fee} sompi exceeds configured maximum {max_fee} sompi"
                    )));
                }
            }

            if next_fee <= fee {
                return Ok(composed);
            }
            fee = next_fee;
        }
    }

    /// The compounding counterpart of `estimate_send`: same convergence
    /// loop, over `compose_compound` instead.
    pub fn estimate_compound(
        &self,
        root: &DerivationRoot,
        params: &CompoundParams,
    ) -> WalletResult<ComposedTx> {
        let mut fee = params.priority_fee;
        loop {
            let composed = self.compose_compound(root, params, fee)?;
            let size = self.tx_size(&composed).max(0) as u64;
            let data_fee = size * self.default_fee_per_byte;
            let next_fee = params.priority_fee.saturating_add(data_fee);
            if next_fee <= fee {
                return Ok(composed);
            }
            fee = next_fee;
        }
    }

    /// `buildTransaction`: signs the final estimate (a no-op if it was
    /// already signed by `estimate_send`/`estimate_compound`), checks the
    /// mass limit, and converts to the RPC wire shape.
    fn build_wire(&self, composed: &ComposedTx) -> WalletResult<WireTransaction> {
        let mass = self
            .mass_calculator
            .calc_compute_mass_for_unsigned_consensus_transaction(&composed.signable.tx, 1);
        let max_mass_utxos = max_mass_accepted_by_block().saturating_sub(self.standalone_mass());
        if mass > max_mass_accepted_by_block() || composed.input_count() as u64 > max_mass_utxos {
            return Err(WalletError::user_input(format!(
                "transaction mass {mass} exceeds the maximum accepted by block {}",
                max_mass_accepted_by_block()
            )));
        }

        let inputs = composed
            .signable
            .tx
            .inputs
            .iter()
            .map(|input| WireInput {
                previous_outpoint: WireOutpoint {
                    transaction_id: input.previous_outpoint.transaction_id.to_string(),
                    index: input.previous_outpoint.index,
                },
                signature_script: hex::encode(&input.signature_script),
                sequence: input.sequence,
            })
            .collect();

        let outputs = composed
            .signable
            .tx
            .outputs
            .iter()
            .map(|output| WireOutput {
                amount: output.value,
                script_public_key: WireScriptPublicKey {
                    version: output.script_public_key.version,
                    script_public_key: hex::encode(output.script_public_key.script()),
                },
            })
            .collect();

        Ok(WireTransaction {
            version: composed.signable.tx.version,
            inputs,
            outputs,
            lock_time: composed.signable.tx.lock_time,
            subnetwork_id: native_subnetwork_id(),
            payload_hash: zero_payload_hash(),
            fee: composed.fee,
        })
    }

    fn standalone_mass(&self) -> u64 {
        let empty = Transaction::new(0, vec![], vec![], 0, Default::default(), 0, vec![]);
        self.mass_calculator
            .calc_compute_mass_for_unsigned_consensus_transaction(&empty, 1)
    }

    /// Public entry point matching `spec.md` §4.3's `buildTransaction`:
    /// estimates, signs, mass-checks, and returns the wire payload plus the
    /// composed transaction (needed by `submit_transaction` to mark UTXOs
    /// used and to reverse the change address on submit failure).
    pub fn build_transaction(
        &self,
        root: &DerivationRoot,
        params: &SendParams,
    ) -> WalletResult<(WireTransaction, ComposedTx)> {
        let mut signed_params = params.clone();
        signed_params.skip_sign = false;
        let composed = self.estimate_send(root, &signed_params)?;
        let wire = self.build_wire(&composed)?;
        Ok((wire, composed))
    }

    pub fn build_compound_transaction(
        &self,
        root: &DerivationRoot,
        params: &CompoundParams,
    ) -> WalletResult<(WireTransaction, ComposedTx)> {
        let mut signed_params = params.clone();
        signed_params.skip_sign = false;
        let composed = self.estimate_compound(root, &signed_params)?;
        let wire = self.build_wire(&composed)?;
        Ok((wire, composed))
    }

    /// `submitTransaction`: builds, broadcasts, and on success marks the
    /// spent inputs `used`, reserves them in `in_use` (via
    /// `UtxoSet::update_used`), appends a `TxStore` record, and emits
    /// `state-update`. A `None` return means the node accepted the call
    /// without handing back a txid (`spec.md` §4.3: "a null return signals
    /// soft failure"); `in_use`/`TxStore` are still updated, since the
    /// broadcast itself succeeded.
    pub async fn submit_transaction(
        &self,
        root: &DerivationRoot,
        params: &SendParams,
        blue_score: u64,
        timestamp: u64,
    ) -> WalletResult<Option<String>> {
        let (wire, composed) = self.build_transaction(root, params)?;
        self.finalize_submission(wire, composed, params.amount, Some(params.to_address.clone()), blue_score, timestamp, false)
            .await
    }

    /// The compounding counterpart of `submit_transaction` (`spec.md` §8
    /// scenario 7): same broadcast/bookkeeping sequence, with the amount
    /// taken from the composed transaction's sole output rather than a
    /// caller-supplied `amount`, and no distinct counterparty — the funds
    /// return to one of our own addresses.
    pub async fn submit_compound(
        &self,
        root: &DerivationRoot,
        params: &CompoundParams,
        blue_score: u64,
        timestamp: u64,
    ) -> WalletResult<Option<String>> {
        let (wire, composed) = self.build_compound_transaction(root, params)?;
        let amount = composed
            .signable
            .tx
            .outputs
            .first()
            .map(|output| output.value)
            .unwrap_or(0);
        self.finalize_submission(wire, composed, amount, None, blue_score, timestamp, true)
            .await
    }

    async fn finalize_submission(
        &self,
        wire: WireTransaction,
        composed: ComposedTx,
        amount: u64,
        counterparty_address: Option<Address>,
        blue_score: u64,
        timestamp: u64,
        self_transfer: bool,
    ) -> WalletResult<Option<String>> {
        let submit_result = self.rpc.submit_transaction(wire.clone()).await;

        let txid = match submit_result {
            Ok(txid) => txid,
            Err(err) => {
                if let Some(change_address) = &composed.change_address {
                    if self.address_manager.find(change_address).is_some() {
                        self.address_manager.reverse(AddressKind::Change);
                    }
                }
                return Err(err);
            }
        };

        self.utxo_set.update_used(&composed.inputs);

        let record_txid = txid.clone().unwrap_or_else(|| {
            composed
                .inputs
                .first()
                .map(|u| u.outpoint.transaction_id.to_string())
                .unwrap_or_default()
        });
        self.tx_store.append(TxRecord {
            direction: Direction::Out,
            timestamp,
            txid: record_txid,
            amount,
            counterparty_address,
            note: None,
            blue_score,
            tx: wire,
            self_transfer,
        })?;

        self.emitter.emit(WalletEvent::StateUpdate {
            message: format!("submitted transaction spending {} input(s)", composed.inputs.len()),
        });

        Ok(txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AddressKind as Kind;
    use kaspa_addresses::{Address as KaspaAddress, Prefix, Version};
    use kaspa_bip32::{Language, Mnemonic, WordCount};
    use kaspa_consensus_core::tx::ScriptPublicKey;
    use kaspa_hashes::Hash;
    use wallet_common::events::EventEmitter;

    fn test_root() -> DerivationRoot {
        let mnemonic = Mnemonic::random(WordCount::Words24, Language::English).unwrap();
        DerivationRoot::from_mnemonic(&mnemonic).unwrap()
    }

    fn test_builder(root: &DerivationRoot) -> (TxBuilder, Arc<AddressManager>, Arc<UtxoSet>) {
        let emitter = EventEmitter::new();
        let receive = root.chain_public_key(Kind::Receive).unwrap();
        let change = root.chain_public_key(Kind::Change).unwrap();
        let address_manager = Arc::new(AddressManager::new(
            NetworkId::Mainnet,
            receive,
            change,
            emitter.clone(),
        ));
        let utxo_set = UtxoSet::new(100, emitter.clone());
        utxo_set.set_current_blue_score(1_000);
        let tx_store = Arc::new(TxStore::new(
            std::env::temp_dir().join(format!("txbuilder-test-{}.jsonl", std::process::id())),
            emitter.clone(),
        ));
        let rpc: Arc<dyn RpcApi> = Arc::new(crate::rpc::tests::NullRpc);
        let builder = TxBuilder::new(
            NetworkId::Mainnet,
            address_manager.clone(),
            utxo_set.clone(),
            tx_store,
            rpc,
            emitter,
            1,
        );
        (builder, address_manager, utxo_set)
    }

    fn fund(address_manager: &AddressManager, utxo_set: &UtxoSet, kind: Kind, satoshis: u64, byte: u8) -> KaspaAddress {
        let wallet_address = address_manager.next(kind).unwrap();
        let outpoint = Outpoint::new(Hash::from_bytes([byte; 32]), 0);
        utxo_set.add(vec![Utxo {
            outpoint,
            address: wallet_address.address.clone(),
            satoshis,
            script_pub_key: ScriptPublicKey::from_vec(0, pay_to_address_script(&wallet_address.address).script().to_vec()),
            block_blue_score: 0,
            is_coinbase: false,
        }]);
        wallet_address.address
    }

    #[test]
    fn compose_tx_produces_expected_outputs_for_a_simple_send() {
        let root = test_root();
        let (builder, address_manager, utxo_set) = test_builder(&root);
        fund(&address_manager, &utxo_set, Kind::Receive, 10_000, 1);

        let to_address = KaspaAddress::new(Prefix::Mainnet, Version::PubKey, &[9u8; 32]);
        let params = SendParams {
            to_address: to_address.clone(),
            amount: 7_000,
            priority_fee: 500,
            inclusive_fee: false,
            calculate_network_fee: true,
            network_fee_max: None,
            change_address_override: None,
            skip_sign: true,
        };

        let composed = builder.compose_tx(&root, &params, 500).unwrap();
        assert_eq!(composed.signable.tx.inputs.len(), 1);
        assert_eq!(composed.signable.tx.outputs[0].value, 7_000);
        assert_eq!(composed.signable.tx.outputs[1].value, 10_000 - 7_000 - 500);
    }

    #[test]
    fn insufficient_funds_surfaces_as_user_input_error() {
        let root = test_root();
        let (builder, address_manager, utxo_set) = test_builder(&root);
        fund(&address_manager, &utxo_set, Kind::Receive, 1_000, 1);

        let to_address = KaspaAddress::new(Prefix::Mainnet, Version::PubKey, &[9u8; 32]);
        let params = SendParams {
            to_address,
            amount: 2_000,
            priority_fee: 0,
            inclusive_fee: false,
            calculate_network_fee: false,
            network_fee_max: None,
            change_address_override: None,
            skip_sign: true,
        };

        let err = builder.compose_tx(&root, &params, 0).unwrap_err();
        assert!(matches!(err, WalletError::UserInputError(_)));
    }

    #[test]
    fn failed_build_reverses_the_change_cursor() {
        let root = test_root();
        let (builder, address_manager, utxo_set) = test_builder(&root);
        fund(&address_manager, &utxo_set, Kind::Receive, 1_000, 1);

        let to_address = KaspaAddress::new(Prefix::Mainnet, Version::PubKey, &[9u8; 32]);
        let params = SendParams {
            to_address,
            amount: 2_000,
            priority_fee: 0,
            inclusive_fee: false,
            calculate_network_fee: false,
            network_fee_max: None,
            change_address_override: None,
            skip_sign: true,
        };

        let _ = builder.compose_tx(&root, &params, 0);
        assert_eq!(address_manager.find(&address_manager.next(Kind::Change).unwrap().address).unwrap().index, 0);
    }

    #[test]
    fn estimate_send_converges_and_covers_the_measured_size() {
        let root = test_root();
        let (builder, address_manager, utxo_set) = test_builder(&root);
        fund(&address_manager, &utxo_set, Kind::Receive, 50_000, 1);
        fund(&address_manager, &utxo_set, Kind::Receive, 50_000, 2);
        fund(&address_manager, &utxo_set, Kind::Receive, 50_000, 3);

        let to_address = KaspaAddress::new(Prefix::Mainnet, Version::PubKey, &[9u8; 32]);
        let params = SendParams {
            to_address,
            amount: 10_000,
            priority_fee: 100,
            inclusive_fee: false,
            calculate_network_fee: true,
            network_fee_max: None,
            change_address_override: None,
            skip_sign: false,
        };

        let composed = builder.estimate_send(&root, &params).unwrap();
        let size = builder.tx_size(&composed).max(0) as u64;
        assert!(composed.fee >= size * builder.default_fee_per_byte + params.priority_fee);
        assert!(composed.is_signed());
    }

    #[test]
    fn inclusive_fee_deducts_from_the_requested_amount() {
        let root = test_root();
        let (builder, address_manager, utxo_set) = test_builder(&root);
        fund(&address_manager, &utxo_set, Kind::Receive, 50_000, 1);

        let to_address = KaspaAddress::new(Prefix::Mainnet, Version::PubKey, &[9u8; 32]);
        let params = SendParams {
            to_address,
            amount: 10_000,
            priority_fee: 50,
            inclusive_fee: true,
            calculate_network_fee: false,
            network_fee_max: None,
            change_address_override: None,
            skip_sign: true,
        };

        let composed = builder.compose_tx(&root, &params, 400).unwrap();
        assert_eq!(composed.signable.tx.outputs[0].value, 10_000 - 400);
    }
}
