//! Common test utilities for ordex-core tests.
//!
//! Deterministic keys and addresses, in-memory collaborators, and signing
//! helpers shared by the module tests.

use crate::{
    buyer::BuyerSigner,
    config::MarketConfig,
    fees::FeeTier,
    providers::{
        ArtifactIndex, FeeRateOracle, FeeScheduleProvider, InputAnalysis, NodeRpc, TxAncestry,
    },
    seller::SellerSigner,
    types::{Artifact, BuyerState, BuyingRequest, ListingRequest, ListingState, Utxo, UtxoStatus},
    utils::{psbt_from_base64, psbt_to_base64},
};
use anyhow::anyhow;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{
    absolute::LockTime, ecdsa, psbt::Psbt, transaction::Version, Address, Amount,
    CompressedPublicKey, Network, OutPoint, PrivateKey, ScriptBuf, Sequence, Transaction, TxIn,
    TxOut, Txid, Witness,
};
use chrono::DateTime;
use std::collections::{HashMap, HashSet};

/// A well-formed txid that no fixture transaction hashes to
pub const TEST_TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

/// Deterministic secret key derived from the index
pub fn test_secret_key(index: u8) -> SecretKey {
    let mut secret_bytes = [0u8; 32];
    secret_bytes[0] = index;
    secret_bytes[31] = index;
    SecretKey::from_slice(&secret_bytes).unwrap()
}

/// Compressed public key of [`test_secret_key`]
pub fn test_public_key(index: u8) -> CompressedPublicKey {
    let secp = Secp256k1::new();
    let private_key = PrivateKey::new(test_secret_key(index), Network::Regtest);
    CompressedPublicKey::from_private_key(&secp, &private_key).unwrap()
}

/// Generate a valid regtest address for testing purposes.
/// Uses deterministic key generation based on the index for reproducible tests.
pub fn create_valid_regtest_address(index: u8) -> String {
    create_valid_address_for_network(index, Network::Regtest)
}

/// Generate a valid address for a specific network.
pub fn create_valid_address_for_network(index: u8, network: Network) -> String {
    Address::p2wpkh(&test_public_key(index), network).to_string()
}

fn p2wpkh_script(index: u8) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&test_public_key(index).wpubkey_hash())
}

/// Transaction paying `values` to `script_pubkey`. Its single input carries a
/// witness, as a transaction fetched from a node would.
pub fn funding_tx_to(script_pubkey: &ScriptBuf, values: &[u64], salt: u8) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array([salt; 32]), u32::from(salt)),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::from_slice(&[vec![salt; 72], vec![2u8; 33]]),
        }],
        output: values
            .iter()
            .map(|value| TxOut {
                value: Amount::from_sat(*value),
                script_pubkey: script_pubkey.clone(),
            })
            .collect(),
    }
}

/// [`funding_tx_to`] paying a fixed test key
pub fn funding_tx(values: &[u64], salt: u8) -> Transaction {
    funding_tx_to(&p2wpkh_script(200), values, salt)
}

/// Transaction spending `inputs` into outputs of `values`
pub fn spending_tx(inputs: &[OutPoint], values: &[u64]) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs
            .iter()
            .map(|outpoint| TxIn {
                previous_output: *outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: values
            .iter()
            .map(|value| TxOut {
                value: Amount::from_sat(*value),
                script_pubkey: p2wpkh_script(201),
            })
            .collect(),
    }
}

/// Confirmed UTXOs owned by `address`, one per value, all from one transaction
pub fn utxos_for(address: &Address, values: &[u64], salt: u8) -> Vec<Utxo> {
    let tx = funding_tx_to(&address.script_pubkey(), values, salt);
    let txid = tx.compute_txid();
    values
        .iter()
        .enumerate()
        .map(|(vout, value)| Utxo {
            txid,
            vout: vout as u32,
            value: *value,
            status: UtxoStatus::confirmed_at(800_000),
            tx: tx.clone(),
        })
        .collect()
}

/// Confirmed UTXOs paying a fixed test key
pub fn confirmed_utxos(values: &[u64]) -> Vec<Utxo> {
    let tx = funding_tx(values, 100);
    let txid = tx.compute_txid();
    values
        .iter()
        .enumerate()
        .map(|(vout, value)| Utxo {
            txid,
            vout: vout as u32,
            value: *value,
            status: UtxoStatus::confirmed_at(800_000),
            tx: tx.clone(),
        })
        .collect()
}

/// Unlisted artifact held at offset 0 of `output`, owned by key 1
pub fn sample_artifact(output: OutPoint, output_value: u64) -> Artifact {
    Artifact {
        id: format!("{}i0", output.txid),
        inscription_number: 42,
        genesis_transaction: output.txid,
        owner: create_valid_regtest_address(1),
        location: crate::types::Location {
            outpoint: output,
            offset: 0,
        },
        output_value,
        content_type: Some("text/plain;charset=utf-8".to_string()),
        listed: false,
        listed_at: None,
        listed_price: None,
        listed_maker_fee_bp: None,
        listed_seller_receive_address: None,
    }
}

/// Sign a P2WPKH input with `secret_key` and finalize it.
///
/// The sighash type comes from the PSBT input and defaults to `ALL`.
pub fn sign_p2wpkh_input(psbt: &mut Psbt, index: usize, secret_key: &SecretKey) {
    let secp = Secp256k1::new();
    let input = &psbt.inputs[index];
    let sighash_type = input
        .sighash_type
        .map(|ty| ty.ecdsa_hash_ty().unwrap())
        .unwrap_or(EcdsaSighashType::All);
    let prev_out = spent_output(psbt, index).unwrap();

    let sighash = SighashCache::new(&psbt.unsigned_tx)
        .p2wpkh_signature_hash(index, &prev_out.script_pubkey, prev_out.value, sighash_type)
        .unwrap();
    let message = Message::from_digest(sighash.to_byte_array());
    let signature = ecdsa::Signature {
        signature: secp.sign_ecdsa(&message, secret_key),
        sighash_type,
    };
    let public_key = secret_key.public_key(&secp);

    psbt.inputs[index].final_script_witness = Some(Witness::p2wpkh(&signature, &public_key));
}

fn spent_output(psbt: &Psbt, index: usize) -> Option<TxOut> {
    let input = &psbt.inputs[index];
    if let Some(utxo) = &input.witness_utxo {
        return Some(utxo.clone());
    }
    let vout = psbt.unsigned_tx.input[index].previous_output.vout as usize;
    input
        .non_witness_utxo
        .as_ref()
        .and_then(|tx| tx.output.get(vout).cloned())
}

/// Whether input `index` carries a valid P2WPKH signature for its spent output
fn p2wpkh_input_is_final(psbt: &Psbt, index: usize) -> bool {
    let Some(witness) = &psbt.inputs[index].final_script_witness else {
        return false;
    };
    let (Some(signature), Some(public_key), Some(prev_out)) = (
        witness.nth(0).and_then(|s| ecdsa::Signature::from_slice(s).ok()),
        witness.nth(1).and_then(|k| CompressedPublicKey::from_slice(k).ok()),
        spent_output(psbt, index),
    ) else {
        return false;
    };
    if prev_out.script_pubkey != ScriptBuf::new_p2wpkh(&public_key.wpubkey_hash()) {
        return false;
    }

    let Ok(sighash) = SighashCache::new(&psbt.unsigned_tx).p2wpkh_signature_hash(
        index,
        &prev_out.script_pubkey,
        prev_out.value,
        signature.sighash_type,
    ) else {
        return false;
    };
    let message = Message::from_digest(sighash.to_byte_array());
    Secp256k1::verification_only()
        .verify_ecdsa(&message, &signature.signature, &public_key.0)
        .is_ok()
}

/// In-memory node. PSBT analysis verifies P2WPKH signatures.
#[derive(Clone, Debug, Default)]
pub struct MockNode {
    transactions: HashMap<Txid, (Transaction, u32)>,
}

impl MockNode {
    pub fn add_transaction(&mut self, tx: Transaction, confirmations: u32) {
        self.transactions
            .insert(tx.compute_txid(), (tx, confirmations));
    }
}

impl NodeRpc for MockNode {
    fn get_raw_transaction(&self, txid: &Txid) -> anyhow::Result<Transaction> {
        self.transactions
            .get(txid)
            .map(|(tx, _)| tx.clone())
            .ok_or_else(|| anyhow!("No such mempool or blockchain transaction {txid}"))
    }

    fn get_raw_transaction_verbose(&self, txid: &Txid) -> anyhow::Result<TxAncestry> {
        let (tx, confirmations) = self
            .transactions
            .get(txid)
            .ok_or_else(|| anyhow!("No such mempool or blockchain transaction {txid}"))?;
        Ok(TxAncestry {
            inputs: tx.input.iter().map(|txin| txin.previous_output).collect(),
            confirmations: *confirmations,
        })
    }

    fn analyze_psbt(&self, psbt_base64: &str) -> anyhow::Result<Vec<InputAnalysis>> {
        let psbt = psbt_from_base64(psbt_base64)?;
        Ok((0..psbt.inputs.len())
            .map(|index| InputAnalysis {
                is_final: p2wpkh_input_is_final(&psbt, index),
                has_utxo: spent_output(&psbt, index).is_some(),
            })
            .collect())
    }
}

/// In-memory artifact index
#[derive(Clone, Debug, Default)]
pub struct MockIndex {
    by_output: HashMap<OutPoint, Artifact>,
    by_id: HashMap<String, Artifact>,
    failing: HashSet<OutPoint>,
}

impl MockIndex {
    /// Index the artifact under its current output and its id
    pub fn insert(&mut self, artifact: Artifact) {
        self.insert_by_output(artifact.output(), artifact.clone());
        self.insert_by_id(artifact);
    }

    pub fn insert_by_output(&mut self, output: OutPoint, artifact: Artifact) {
        self.by_output.insert(output, artifact);
    }

    pub fn insert_by_id(&mut self, artifact: Artifact) {
        self.by_id.insert(artifact.id.clone(), artifact);
    }

    /// Make lookups of `output` fail
    pub fn fail_on(&mut self, output: OutPoint) {
        self.failing.insert(output);
    }
}

impl ArtifactIndex for MockIndex {
    fn get_artifact_by_output(&self, output: &OutPoint) -> anyhow::Result<Option<Artifact>> {
        if self.failing.contains(output) {
            return Err(anyhow!("index unavailable"));
        }
        Ok(self.by_output.get(output).cloned())
    }

    fn get_artifact_by_id(&self, id: &str) -> anyhow::Result<Option<Artifact>> {
        Ok(self.by_id.get(id).cloned())
    }
}

/// Fee oracle returning a fixed rate, optionally per tier
#[derive(Clone, Debug)]
pub struct FixedFeeRates {
    rate: u64,
    tiers: HashMap<FeeTier, u64>,
}

impl FixedFeeRates {
    pub fn new(rate: u64) -> Self {
        Self {
            rate,
            tiers: HashMap::new(),
        }
    }

    pub fn with_tier(mut self, tier: FeeTier, rate: u64) -> Self {
        self.tiers.insert(tier, rate);
        self
    }
}

impl FeeRateOracle for FixedFeeRates {
    fn get_fee_rate(&self, tier: FeeTier) -> anyhow::Result<u64> {
        Ok(self.tiers.get(&tier).copied().unwrap_or(self.rate))
    }
}

/// Fee schedule charging every address the same basis points
#[derive(Clone, Copy, Debug)]
pub struct FixedFeeSchedule {
    maker_fee_bp: u64,
    taker_fee_bp: u64,
}

impl FixedFeeSchedule {
    pub fn new(maker_fee_bp: u64, taker_fee_bp: u64) -> Self {
        Self {
            maker_fee_bp,
            taker_fee_bp,
        }
    }
}

impl FeeScheduleProvider for FixedFeeSchedule {
    fn get_maker_fee_bp(&self, _seller_address: &str) -> anyhow::Result<u64> {
        Ok(self.maker_fee_bp)
    }

    fn get_taker_fee_bp(&self, _buyer_address: &str) -> anyhow::Result<u64> {
        Ok(self.taker_fee_bp)
    }
}

/// Seller key index
const SELLER_KEY: u8 = 1;
/// Buyer funding key index
const BUYER_KEY: u8 = 2;
/// Buyer token receive key index
const BUYER_RECEIVE_KEY: u8 = 3;
/// Platform fee key index
const PLATFORM_KEY: u8 = 50;

/// A regtest artifact worth 10_000 sats held by key 1, listed for 100_000
/// sats at a 100 bp maker fee
#[derive(Clone, Debug)]
pub struct ListingFixture {
    pub config: MarketConfig,
    pub node: MockNode,
    pub index: MockIndex,
    pub fees: FixedFeeSchedule,
    pub listing: ListingState,
}

impl ListingFixture {
    pub fn new() -> Self {
        let mut config = MarketConfig::for_network(Network::Regtest);
        config.platform_fee_address = Some(create_valid_regtest_address(PLATFORM_KEY));

        let holding_tx = funding_tx_to(&p2wpkh_script(SELLER_KEY), &[10_000], 10);
        let artifact = sample_artifact(OutPoint::new(holding_tx.compute_txid(), 0), 10_000);

        let mut node = MockNode::default();
        node.add_transaction(holding_tx, 6);
        let mut index = MockIndex::default();
        index.insert(artifact.clone());

        let listing = ListingState::new(
            artifact,
            100_000,
            100,
            create_valid_regtest_address(SELLER_KEY),
        );

        Self {
            config,
            node,
            index,
            fees: FixedFeeSchedule::new(100, 150),
            listing,
        }
    }

    pub fn unsigned_listing_psbt(&self) -> Psbt {
        SellerSigner::new(&self.config, &self.node)
            .build_listing_psbt(&self.listing.seller)
            .unwrap()
    }

    /// Listing PSBT signed by the seller with `SINGLE | ANYONECANPAY`
    pub fn signed_listing_psbt(&self) -> Psbt {
        let mut psbt = self.unsigned_listing_psbt();
        sign_p2wpkh_input(&mut psbt, 0, &test_secret_key(SELLER_KEY));
        psbt
    }

    pub fn listing_request(&self, signed_listing_psbt_base64: String) -> ListingRequest {
        ListingRequest {
            price: self.listing.seller.price,
            token_id: self.listing.seller.artifact.id.clone(),
            seller_receive_address: self.listing.seller.seller_receive_address.clone(),
            signed_listing_psbt_base64,
            tap_internal_key: None,
        }
    }
}

/// [`ListingFixture`] with a buyer attached: key 2 funds the purchase with two
/// 600 sat dummies and one 500_000 sat payment at 1 sat/vB and a 150 bp taker
/// fee, and key 3 receives the artifact
#[derive(Clone, Debug)]
pub struct BuyingFixture {
    pub config: MarketConfig,
    pub node: MockNode,
    pub index: MockIndex,
    pub rates: FixedFeeRates,
    pub fees: FixedFeeSchedule,
    pub listing: ListingState,
}

impl BuyingFixture {
    pub fn new() -> Self {
        let ListingFixture {
            config,
            node,
            fees,
            listing,
            ..
        } = ListingFixture::new();

        let buyer_address = Address::p2wpkh(&test_public_key(BUYER_KEY), Network::Regtest);
        let mut buyer = BuyerState::new(
            150,
            buyer_address.to_string(),
            create_valid_regtest_address(BUYER_RECEIVE_KEY),
            FeeTier::Hour,
        );
        buyer.buyer_dummy_utxos = utxos_for(&buyer_address, &[600, 600], 20);
        buyer.buyer_payment_utxos = utxos_for(&buyer_address, &[500_000], 21);

        let mut fixture = Self {
            config,
            node,
            index: MockIndex::default(),
            rates: FixedFeeRates::new(1),
            fees,
            listing: listing.with_buyer(buyer),
        };
        fixture.index.insert(fixture.listed_artifact());
        fixture
    }

    pub fn signer(&self) -> BuyerSigner<'_> {
        BuyerSigner::new(&self.config, &self.node, &self.index, &self.rates)
    }

    /// The seller half on its own
    pub fn listing_fixture(&self) -> ListingFixture {
        ListingFixture {
            config: self.config.clone(),
            node: self.node.clone(),
            index: self.index.clone(),
            fees: self.fees,
            listing: ListingState {
                seller: self.listing.seller.clone(),
                buyer: None,
            },
        }
    }

    pub fn signed_listing_psbt(&self) -> Psbt {
        self.listing_fixture().signed_listing_psbt()
    }

    /// The seller's artifact as the index reports it once listed
    pub fn listed_artifact(&self) -> Artifact {
        let seller = &self.listing.seller;
        Artifact {
            listed: true,
            listed_at: DateTime::from_timestamp(1_700_000_000, 0),
            listed_price: Some(seller.price),
            listed_maker_fee_bp: Some(seller.maker_fee_bp),
            listed_seller_receive_address: Some(seller.seller_receive_address.clone()),
            ..seller.artifact.clone()
        }
    }

    /// Replace the buyer's payment UTXOs
    pub fn set_payments(&mut self, values: &[u64]) {
        let address = Address::p2wpkh(&test_public_key(BUYER_KEY), Network::Regtest);
        let buyer = self.listing.buyer.as_mut().unwrap();
        buyer.buyer_payment_utxos = utxos_for(&address, values, 22);
    }

    /// Buying PSBT with every buyer input signed by key 2
    pub fn signed_buying_psbt(&self) -> Psbt {
        let mut psbt = self.signer().build_buying_psbt(&self.listing).unwrap();
        self.sign_buyer_inputs(&mut psbt);
        psbt
    }

    /// Sign every input except the seller's with key 2, replacing any
    /// earlier signatures
    pub fn sign_buyer_inputs(&self, psbt: &mut Psbt) {
        let seller_index = self.signer().layout().seller_index;
        for index in 0..psbt.inputs.len() {
            if index != seller_index {
                sign_p2wpkh_input(psbt, index, &test_secret_key(BUYER_KEY));
            }
        }
    }

    /// Signed buying PSBT whose outputs were altered by `tamper` before the
    /// buyer signed
    pub fn tampered_buying_request(&self, tamper: impl FnOnce(&mut Psbt)) -> BuyingRequest {
        let mut psbt = self.signer().build_buying_psbt(&self.listing).unwrap();
        tamper(&mut psbt);
        self.sign_buyer_inputs(&mut psbt);
        self.buying_request(psbt_to_base64(&psbt))
    }

    pub fn buying_request(&self, signed_buying_psbt_base64: String) -> BuyingRequest {
        let buyer = self.listing.buyer().unwrap();
        BuyingRequest {
            price: self.listing.seller.price,
            token_id: self.listing.seller.artifact.id.clone(),
            buyer_address: buyer.buyer_address.clone(),
            buyer_token_receive_address: buyer.buyer_token_receive_address.clone(),
            signed_buying_psbt_base64,
        }
    }
}
