//! Bitcoin Core backed [`NodeRpc`].

use anyhow::{anyhow, Context, Result};
use bitcoin::{OutPoint, Transaction, Txid};
use bitcoincore_rpc::{Auth, Client, RpcApi};
use log::debug;
use ordex_core::providers::{InputAnalysis, NodeRpc, TxAncestry};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Default RPC endpoint when `BITCOIN_RPC_URL` is unset
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8332";

/// Subset of the `analyzepsbt` reply the marketplace reads
#[derive(Deserialize, Debug)]
struct AnalyzePsbtResult {
	#[serde(default)]
	inputs: Vec<AnalyzedInput>,
}

#[derive(Deserialize, Debug)]
struct AnalyzedInput {
	has_utxo: bool,
	is_final: bool,
}

/// Node collaborator over a Bitcoin Core JSON-RPC connection.
///
/// Verbose lookups need `-txindex=1` for transactions outside the wallet and
/// the mempool.
pub struct CoreNode {
	client: Client,
}

impl CoreNode {
	pub fn new(client: Client) -> Self {
		Self { client }
	}

	pub fn connect(url: &str, auth: Auth) -> Result<Self> {
		let client = Client::new(url, auth).with_context(|| format!("cannot connect to {url}"))?;
		Ok(Self::new(client))
	}

	/// Connect using `BITCOIN_RPC_URL` and either `BITCOIN_RPC_COOKIE` or
	/// `BITCOIN_RPC_USER`/`BITCOIN_RPC_PASS`
	pub fn from_env() -> Result<Self> {
		let url = env::var("BITCOIN_RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());
		Self::connect(&url, auth_from_env())
	}

	pub fn client(&self) -> &Client {
		&self.client
	}
}

/// RPC credentials from the environment, cookie file first
pub fn auth_from_env() -> Auth {
	if let Ok(cookie) = env::var("BITCOIN_RPC_COOKIE") {
		return Auth::CookieFile(PathBuf::from(cookie));
	}
	match (env::var("BITCOIN_RPC_USER"), env::var("BITCOIN_RPC_PASS")) {
		(Ok(user), Ok(pass)) => Auth::UserPass(user, pass),
		_ => Auth::None,
	}
}

impl NodeRpc for CoreNode {
	fn get_raw_transaction(&self, txid: &Txid) -> Result<Transaction> {
		Ok(self.client.get_raw_transaction(txid, None)?)
	}

	fn get_raw_transaction_verbose(&self, txid: &Txid) -> Result<TxAncestry> {
		let info = self.client.get_raw_transaction_info(txid, None)?;
		let inputs = info
			.vin
			.iter()
			.filter(|vin| vin.coinbase.is_none())
			.map(|vin| match (vin.txid, vin.vout) {
				(Some(txid), Some(vout)) => Ok(OutPoint::new(txid, vout)),
				_ => Err(anyhow!("transaction {txid} has an input without a previous output")),
			})
			.collect::<Result<Vec<_>>>()?;
		let confirmations = info.confirmations.unwrap_or(0);
		debug!("{txid}: {} inputs, {confirmations} confirmations", inputs.len());
		Ok(TxAncestry {
			inputs,
			confirmations,
		})
	}

	fn analyze_psbt(&self, psbt_base64: &str) -> Result<Vec<InputAnalysis>> {
		let result: AnalyzePsbtResult =
			self.client.call("analyzepsbt", &[serde_json::Value::from(psbt_base64)])?;
		Ok(result
			.inputs
			.into_iter()
			.map(|input| InputAnalysis {
				is_final: input.is_final,
				has_utxo: input.has_utxo,
			})
			.collect())
	}
}
