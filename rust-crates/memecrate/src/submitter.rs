use crate::{
    error::SubmitError,
    model::{
        AccountKeyDescriptor,
        InstructionDescriptor,
    },
    network::{
        LatestBlockhash,
        Network,
    },
    signer::WalletSigner,
};
use base64::{
    Engine,
    engine::general_purpose::STANDARD,
};
use solana_sdk::{
    instruction::{
        AccountMeta,
        Instruction,
    },
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use std::str::FromStr;

/// A signed transaction ready to be handed to the backend for relaying.
#[derive(Clone, Debug)]
pub struct RelayedTransaction {
    pub encoded: String,
    pub blockhash: LatestBlockhash,
    pub signature: Signature,
}

/// Turns instructions into confirmed signatures. Knows nothing about crates.
#[derive(Clone)]
pub struct TransactionSubmitter<N> {
    network: N,
}

impl<N: Network> TransactionSubmitter<N> {
    pub fn new(network: N) -> Self {
        Self { network }
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    /// Builds, signs, sends and confirms a transaction carrying `descriptor`
    /// followed by `extra`. A supplied blockhash is used as is; otherwise a
    /// fresh one is fetched. Confirmation is checked against the same
    /// blockhash window the transaction was built with. Fails on the first
    /// error without retrying.
    pub async fn submit<W: WalletSigner>(
        &self,
        wallet: &W,
        descriptor: &InstructionDescriptor,
        extra: Vec<Instruction>,
        blockhash: Option<LatestBlockhash>,
    ) -> Result<Signature, SubmitError> {
        let mut instructions = vec![rehydrate(descriptor)?];
        instructions.extend(extra);

        let blockhash = match blockhash {
            Some(provided) => {
                tracing::info!("using backend supplied blockhash");
                provided
            }
            None => self.network.latest_blockhash().await?,
        };
        let transaction = unsigned_transaction(&instructions, &wallet.public_key(), &blockhash);

        let signed = wallet.sign_transaction(transaction).await?;
        let signature = self.network.send_transaction(&signed).await?;
        tracing::info!(%signature, "transaction sent, awaiting confirmation");
        self.network
            .confirm_transaction(&signature, &blockhash)
            .await?;
        tracing::info!(%signature, "transaction confirmed");
        Ok(signature)
    }

    /// Fetches a fresh blockhash, asks the wallet to sign and serializes the
    /// result. The blockhash is requested only once everything else is ready
    /// so the signing window is as wide as possible.
    pub async fn sign_for_relay<W: WalletSigner>(
        &self,
        wallet: &W,
        instructions: &[Instruction],
    ) -> Result<RelayedTransaction, SubmitError> {
        let blockhash = self.network.latest_blockhash().await?;
        let transaction = unsigned_transaction(instructions, &wallet.public_key(), &blockhash);
        let signed = wallet.sign_transaction(transaction).await?;
        let signature = signed
            .signatures
            .first()
            .copied()
            .unwrap_or_default();
        Ok(RelayedTransaction {
            encoded: encode_transaction(&signed)?,
            blockhash,
            signature,
        })
    }
}

fn unsigned_transaction(
    instructions: &[Instruction],
    payer: &Pubkey,
    blockhash: &LatestBlockhash,
) -> Transaction {
    let mut transaction = Transaction::new_with_payer(instructions, Some(payer));
    transaction.message.recent_blockhash = blockhash.blockhash;
    transaction
}

fn parse_pubkey(raw: &str) -> Result<Pubkey, SubmitError> {
    Pubkey::from_str(raw)
        .map_err(|e| SubmitError::InvalidInstruction(format!("invalid address '{raw}': {e}")))
}

/// Converts a string-form instruction into a native one.
pub fn rehydrate(descriptor: &InstructionDescriptor) -> Result<Instruction, SubmitError> {
    let program_id = parse_pubkey(&descriptor.program_id)?;
    let accounts = descriptor
        .keys
        .iter()
        .map(|key| {
            let pubkey = parse_pubkey(&key.pubkey)?;
            Ok(if key.is_writable {
                AccountMeta::new(pubkey, key.is_signer)
            } else {
                AccountMeta::new_readonly(pubkey, key.is_signer)
            })
        })
        .collect::<Result<Vec<_>, SubmitError>>()?;
    Ok(Instruction {
        program_id,
        accounts,
        data: descriptor.data.clone(),
    })
}

impl From<&Instruction> for InstructionDescriptor {
    fn from(ix: &Instruction) -> Self {
        InstructionDescriptor {
            program_id: ix.program_id.to_string(),
            keys: ix
                .accounts
                .iter()
                .map(|meta| AccountKeyDescriptor {
                    pubkey: meta.pubkey.to_string(),
                    is_signer: meta.is_signer,
                    is_writable: meta.is_writable,
                })
                .collect(),
            data: ix.data.clone(),
        }
    }
}

/// Wire form of a signed transaction: bincode, then base64.
pub fn encode_transaction(transaction: &Transaction) -> Result<String, SubmitError> {
    let bytes =
        bincode::serialize(transaction).map_err(|e| SubmitError::Serialize(e.to_string()))?;
    Ok(STANDARD.encode(bytes))
}

pub fn decode_transaction(encoded: &str) -> Result<Transaction, SubmitError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| SubmitError::Serialize(e.to_string()))?;
    bincode::deserialize(&bytes).map_err(|e| SubmitError::Serialize(e.to_string()))
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{
            NetworkError,
            SignError,
        },
        test_helpers::{
            CallLog,
            FakeNetwork,
            FakeWallet,
        },
    };
    use solana_sdk::{
        hash::Hash,
        system_instruction,
    };

    fn transfer_descriptor(from: &Pubkey) -> InstructionDescriptor {
        let ix = system_instruction::transfer(from, &Pubkey::new_unique(), 1_000);
        InstructionDescriptor::from(&ix)
    }

    #[test]
    fn rehydrate__preserves_account_flags_and_data() {
        // given
        let payer = Pubkey::new_unique();
        let ix = system_instruction::transfer(&payer, &Pubkey::new_unique(), 77);
        let descriptor = InstructionDescriptor::from(&ix);

        // when
        let rebuilt = rehydrate(&descriptor).unwrap();

        // then
        assert_eq!(rebuilt, ix);
    }

    #[test]
    fn rehydrate__rejects_malformed_address() {
        // given
        let mut descriptor = transfer_descriptor(&Pubkey::new_unique());
        descriptor.keys[1].pubkey = "not-a-key".to_string();

        // when
        let err = rehydrate(&descriptor).unwrap_err();

        // then
        assert!(matches!(err, SubmitError::InvalidInstruction(_)));
    }

    #[tokio::test]
    async fn submit__appends_extra_instructions_and_confirms_with_same_blockhash() {
        // given
        let log = CallLog::default();
        let network = FakeNetwork::new(log.clone());
        let wallet = FakeWallet::approving(log.clone());
        let submitter = TransactionSubmitter::new(network.clone());
        let descriptor = transfer_descriptor(&wallet.public_key());
        let extra = system_instruction::transfer(&wallet.public_key(), &Pubkey::new_unique(), 5);

        // when
        let signature = submitter
            .submit(&wallet, &descriptor, vec![extra.clone()], None)
            .await
            .unwrap();

        // then
        let sent = network.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.instructions.len(), 2);
        assert_eq!(sent[0].message.account_keys[0], wallet.public_key());
        let (confirmed_sig, confirmed_hash) = network.confirmations()[0];
        assert_eq!(confirmed_sig, signature);
        assert_eq!(confirmed_hash, network.current_blockhash());
        assert_eq!(
            log.entries(),
            vec![
                "network.latest_blockhash",
                "wallet.sign",
                "network.send",
                "network.confirm"
            ]
        );
    }

    #[tokio::test]
    async fn submit__uses_provided_blockhash_without_fetching() {
        // given
        let log = CallLog::default();
        let network = FakeNetwork::new(log.clone());
        let wallet = FakeWallet::approving(log.clone());
        let submitter = TransactionSubmitter::new(network.clone());
        let provided = LatestBlockhash {
            blockhash: Hash::new_unique(),
            last_valid_block_height: 4242,
        };

        // when
        submitter
            .submit(
                &wallet,
                &transfer_descriptor(&wallet.public_key()),
                vec![],
                Some(provided),
            )
            .await
            .unwrap();

        // then
        assert!(!log.entries().contains(&"network.latest_blockhash".to_string()));
        assert_eq!(
            network.sent_transactions()[0].message.recent_blockhash,
            provided.blockhash
        );
        assert_eq!(network.confirmations()[0].1, provided);
    }

    #[tokio::test]
    async fn submit__stops_at_wallet_rejection_without_sending() {
        // given
        let log = CallLog::default();
        let network = FakeNetwork::new(log.clone());
        let wallet = FakeWallet::rejecting(log.clone(), "User rejected the request.");
        let submitter = TransactionSubmitter::new(network.clone());

        // when
        let err = submitter
            .submit(&wallet, &transfer_descriptor(&wallet.public_key()), vec![], None)
            .await
            .unwrap_err();

        // then
        assert!(matches!(err, SubmitError::Sign(SignError::Rejected(_))));
        assert!(network.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn submit__propagates_confirmation_expiry() {
        // given
        let log = CallLog::default();
        let network = FakeNetwork::new(log.clone());
        network.fail_confirmation(NetworkError::BlockhashExpired {
            signature: "sig".to_string(),
        });
        let wallet = FakeWallet::approving(log.clone());
        let submitter = TransactionSubmitter::new(network.clone());

        // when
        let err = submitter
            .submit(&wallet, &transfer_descriptor(&wallet.public_key()), vec![], None)
            .await
            .unwrap_err();

        // then
        assert!(matches!(
            err,
            SubmitError::Network(NetworkError::BlockhashExpired { .. })
        ));
    }

    #[tokio::test]
    async fn sign_for_relay__encodes_a_transaction_that_decodes_and_verifies() {
        // given
        let log = CallLog::default();
        let network = FakeNetwork::new(log.clone());
        let wallet = FakeWallet::approving(log.clone());
        let submitter = TransactionSubmitter::new(network.clone());
        let ix = system_instruction::transfer(&wallet.public_key(), &Pubkey::new_unique(), 9);

        // when
        let relayed = submitter.sign_for_relay(&wallet, &[ix]).await.unwrap();

        // then
        let decoded = decode_transaction(&relayed.encoded).unwrap();
        assert!(decoded.verify().is_ok());
        assert_eq!(decoded.signatures[0], relayed.signature);
        assert_eq!(relayed.blockhash, network.current_blockhash());
        assert!(network.sent_transactions().is_empty());
    }
}
