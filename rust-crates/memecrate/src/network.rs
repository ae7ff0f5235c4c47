use crate::error::NetworkError;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_config::RpcSendTransactionConfig,
};
use solana_sdk::{
    commitment_config::{
        CommitmentConfig,
        CommitmentLevel,
    },
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use std::{
    sync::Arc,
    time::Duration,
};

pub type NetworkResult<T> = Result<T, NetworkError>;

const DEFAULT_CONFIRM_POLL: Duration = Duration::from_millis(500);

/// A blockhash together with the last block height at which transactions
/// built on it are still accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatestBlockhash {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Chain access used by the flow. All reads are at "confirmed" commitment.
pub trait Network {
    fn latest_blockhash(&self) -> impl Future<Output = NetworkResult<LatestBlockhash>> + Send;

    fn account_exists(
        &self,
        address: &Pubkey,
    ) -> impl Future<Output = NetworkResult<bool>> + Send;

    fn minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
    ) -> impl Future<Output = NetworkResult<u64>> + Send;

    /// Sends with preflight checks enabled.
    fn send_transaction(
        &self,
        transaction: &Transaction,
    ) -> impl Future<Output = NetworkResult<Signature>> + Send;

    /// Resolves once `signature` is confirmed, or fails once the chain has
    /// moved past `blockhash.last_valid_block_height`.
    fn confirm_transaction(
        &self,
        signature: &Signature,
        blockhash: &LatestBlockhash,
    ) -> impl Future<Output = NetworkResult<()>> + Send;
}

#[derive(Clone)]
pub struct RpcNetwork {
    rpc: Arc<RpcClient>,
    poll_interval: Duration,
}

impl RpcNetwork {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        let rpc = RpcClient::new_with_commitment(rpc_url.into(), CommitmentConfig::confirmed());
        Self {
            rpc: Arc::new(rpc),
            poll_interval: DEFAULT_CONFIRM_POLL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn url(&self) -> String {
        self.rpc.url()
    }
}

fn rpc_err(err: impl std::fmt::Display) -> NetworkError {
    NetworkError::Rpc(err.to_string())
}

impl Network for RpcNetwork {
    async fn latest_blockhash(&self) -> NetworkResult<LatestBlockhash> {
        let (blockhash, last_valid_block_height) = self
            .rpc
            .get_latest_blockhash_with_commitment(CommitmentConfig::confirmed())
            .await
            .map_err(rpc_err)?;
        Ok(LatestBlockhash {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn account_exists(&self, address: &Pubkey) -> NetworkResult<bool> {
        let response = self
            .rpc
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await
            .map_err(rpc_err)?;
        Ok(response.value.is_some())
    }

    async fn minimum_balance_for_rent_exemption(&self, data_len: usize) -> NetworkResult<u64> {
        self.rpc
            .get_minimum_balance_for_rent_exemption(data_len)
            .await
            .map_err(rpc_err)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> NetworkResult<Signature> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            ..RpcSendTransactionConfig::default()
        };
        self.rpc
            .send_transaction_with_config(transaction, config)
            .await
            .map_err(rpc_err)
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        blockhash: &LatestBlockhash,
    ) -> NetworkResult<()> {
        loop {
            let status = self
                .rpc
                .get_signature_status_with_commitment(signature, CommitmentConfig::confirmed())
                .await
                .map_err(rpc_err)?;
            match status {
                Some(Ok(())) => return Ok(()),
                Some(Err(err)) => {
                    return Err(NetworkError::TransactionFailed {
                        signature: signature.to_string(),
                        reason: err.to_string(),
                    });
                }
                None => {}
            }
            let height = self
                .rpc
                .get_block_height_with_commitment(CommitmentConfig::confirmed())
                .await
                .map_err(rpc_err)?;
            if height > blockhash.last_valid_block_height {
                return Err(NetworkError::BlockhashExpired {
                    signature: signature.to_string(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
