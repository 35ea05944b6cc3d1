//! Regtest node for integration tests: attaches to `BITCOIN_RPC_URL` when
//! set, otherwise runs `bitcoind` in docker.

use anyhow::Result;
use bitcoin::{Address, Amount, Network};
use bitcoincore_rpc::{Auth, Client, RpcApi};
use log::info;
use ordex_core::{Utxo, UtxoStatus};
use std::env;
use std::process::{Child, Command, Stdio};

use crate::rpc::{auth_from_env, CoreNode};

/// Image used when no node is attached
pub const BITCOIND_IMAGE: &str = "bitcoin/bitcoin:27.1";

pub struct TestNode {
	pub node: CoreNode,
	pub wallet: Client,
	pub wallet_name: String,
	_proc: Option<DockerBitcoind>,
}

pub struct DockerBitcoind {
	pub child: Child,
	pub rpc_url: String,
	pub cookie_file: std::path::PathBuf,
	pub data_dir: tempfile::TempDir,
}

impl TestNode {
	pub fn start() -> Result<Self> {
		if env::var("BITCOIN_RPC_URL").is_ok() {
			Self::attach_from_env()
		} else {
			Self::start_docker()
		}
	}

	fn start_docker() -> Result<Self> {
		let proc = Self::start_docker_bitcoind()?;
		let auth = Auth::CookieFile(proc.cookie_file.clone());
		let rpc_url = proc.rpc_url.clone();
		Self::with_funded_wallet(&rpc_url, auth, Some(proc))
	}

	fn start_docker_bitcoind() -> Result<DockerBitcoind> {
		let data_dir = tempfile::tempdir()?;
		let data_dir_path = data_dir.path();
		let rpc_port = Self::find_available_port()?;

		let docker_args = vec![
			"run".to_string(),
			"--rm".to_string(),
			"-p".to_string(), format!("{}:18443", rpc_port),
			"-v".to_string(), format!("{}:/home/bitcoin/.bitcoin", data_dir_path.display()),
			BITCOIND_IMAGE.to_string(),
			"bitcoind".to_string(),
			"-regtest".to_string(),
			"-txindex=1".to_string(),
			"-fallbackfee=0.0001".to_string(),
			"-printtoconsole=0".to_string(),
			"-server=1".to_string(),
			"-rpcbind=0.0.0.0".to_string(),
			"-rpcallowip=0.0.0.0/0".to_string(),
		];

		let child = Command::new("docker")
			.args(&docker_args)
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.spawn()
			.map_err(|e| anyhow::anyhow!("Failed to start docker container: {}", e))?;

		let rpc_url = format!("http://127.0.0.1:{}", rpc_port);
		let cookie_file = data_dir_path.join("regtest").join(".cookie");

		let mut attempts = 0;
		while !cookie_file.exists() && attempts < 100 {
			std::thread::sleep(std::time::Duration::from_millis(200));
			attempts += 1;
		}
		if !cookie_file.exists() {
			return Err(anyhow::anyhow!("Cookie file not created after waiting"));
		}

		info!("bitcoind running at {rpc_url}");
		Ok(DockerBitcoind {
			child,
			rpc_url,
			cookie_file,
			data_dir,
		})
	}

	fn find_available_port() -> Result<u16> {
		use std::net::{SocketAddr, TcpListener};

		for port in 18443..18500 {
			let addr: SocketAddr = format!("127.0.0.1:{}", port).parse()?;
			if TcpListener::bind(addr).is_ok() {
				return Ok(port);
			}
		}

		Err(anyhow::anyhow!("No available ports found"))
	}

	fn attach_from_env() -> Result<Self> {
		let base_url = env::var("BITCOIN_RPC_URL")?;
		Self::with_funded_wallet(&base_url, auth_from_env(), None)
	}

	fn with_funded_wallet(base_url: &str, auth: Auth, proc: Option<DockerBitcoind>) -> Result<Self> {
		let base_client = Client::new(base_url, auth.clone())?;
		let wallet_name = env::var("BITCOIN_WALLET").unwrap_or_else(|_| "ordex".to_string());
		let _ = base_client.create_wallet(&wallet_name, None, None, None, None);
		let _ = base_client.load_wallet(&wallet_name);

		let wallet_url = format!("{}/wallet/{}", base_url, wallet_name);
		let wallet = Client::new(&wallet_url, auth)?;

		let addr = wallet.get_new_address(None, None)?.require_network(Network::Regtest)?;
		wallet.generate_to_address(101, &addr)?;

		Ok(Self {
			node: CoreNode::new(base_client),
			wallet,
			wallet_name,
			_proc: proc,
		})
	}

	/// Fresh wallet address
	pub fn new_address(&self) -> Result<Address> {
		Ok(self.wallet.get_new_address(None, None)?.require_network(Network::Regtest)?)
	}

	/// Send `amount` to `address`, confirm it, and return it as a [`Utxo`]
	pub fn fund(&self, address: &Address, amount: Amount) -> Result<Utxo> {
		let txid = self.wallet.send_to_address(address, amount, None, None, None, None, None, None)?;
		let miner = self.new_address()?;
		self.wallet.generate_to_address(1, &miner)?;

		let tx = self.wallet.get_raw_transaction(&txid, None)?;
		let vout = tx
			.output
			.iter()
			.position(|out| out.script_pubkey == address.script_pubkey() && out.value == amount)
			.ok_or_else(|| anyhow::anyhow!("funding output missing from {txid}"))?;
		Ok(Utxo {
			txid,
			vout: vout as u32,
			value: amount.to_sat(),
			status: UtxoStatus {
				confirmed: true,
				..Default::default()
			},
			tx,
		})
	}
}

impl Drop for TestNode {
	fn drop(&mut self) {
		if self._proc.is_some() {
			let _ = self.node.client().stop();
			std::thread::sleep(std::time::Duration::from_millis(500));
		}
	}
}

impl Drop for DockerBitcoind {
	fn drop(&mut self) {
		let _ = self.child.kill();
		let _ = self.child.wait();
	}
}
