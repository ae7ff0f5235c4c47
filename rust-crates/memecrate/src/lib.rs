//! Client core of the crate investment game: the purchase flow, the
//! transaction pipeline and the reconciliation of what the backend reports.

pub mod allocation;
pub mod backend;
pub mod cashout;
pub mod error;
pub mod flow;
pub mod model;
pub mod network;
pub mod reveal;
pub mod selection;
pub mod signer;
pub mod submitter;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use backend::{
    BackendApi,
    BackendClient,
};
pub use cashout::CashOutReconciler;
pub use error::FlowError;
pub use flow::{
    GameFlowMachine,
    GameFlowState,
};
pub use network::{
    Network,
    RpcNetwork,
};
pub use selection::TokenSelectionOrchestrator;
pub use signer::{
    KeypairSigner,
    WalletSigner,
};
pub use submitter::TransactionSubmitter;
