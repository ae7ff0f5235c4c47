use crate::error::SignError;
use solana_sdk::{
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    transaction::Transaction,
};

/// The user's wallet. Signing may wait on the user for as long as it takes;
/// only the caller's own UI decides when to give up.
pub trait WalletSigner {
    fn public_key(&self) -> Pubkey;

    fn sign_transaction(
        &self,
        transaction: Transaction,
    ) -> impl Future<Output = Result<Transaction, SignError>> + Send;
}

/// Signs with a local keypair without asking anyone.
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl WalletSigner for KeypairSigner {
    fn public_key(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, SignError> {
        sign_with(&self.keypair, transaction)
    }
}

/// Signs `transaction` over the blockhash it already carries.
pub fn sign_with(
    keypair: &Keypair,
    mut transaction: Transaction,
) -> Result<Transaction, SignError> {
    let blockhash = transaction.message.recent_blockhash;
    transaction
        .try_sign(&[keypair], blockhash)
        .map_err(|e| SignError::Failed(e.to_string()))?;
    Ok(transaction)
}
