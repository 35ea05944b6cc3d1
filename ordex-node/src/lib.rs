//! Bitcoin Core backed collaborators for ordex-core, plus a regtest harness
//! for integration tests.

mod fee;
pub mod harness;
mod rpc;

pub use fee::{confirmation_target, sat_per_vbyte, CoreFeeOracle};
pub use harness::TestNode;
pub use rpc::{auth_from_env, CoreNode, DEFAULT_RPC_URL};
