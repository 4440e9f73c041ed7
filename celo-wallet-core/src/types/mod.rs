// Re-export common ethereum datatypes with more specific names

/// A transaction hash
pub use ethereum_types::H256 as TxHash;

pub use ethereum_types::{Address, H160, H256, U128, U256, U64};

mod transaction;
pub use transaction::{
    eip712::{Eip712DomainType, Eip712Error, Eip712Types, TypedData},
    extract_chain_id, normalize_v, recover_transaction,
    request::{CeloTransactionRequest, EncodedTransaction, RequestError, RlpEncodedTx},
};

mod bytes;
pub use self::bytes::Bytes;

mod signature;
pub use signature::{RecoveryMessage, Signature, SignatureError};
