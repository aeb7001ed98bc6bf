use alloy::{
    network::EthereumWallet,
    primitives::{Address, B256, U256},
    providers::{DynProvider, ProviderBuilder},
    signers::local::PrivateKeySigner,
    sol,
};
use tracing::info;

use crate::{
    domain::{ciphertext::FlatCiphertext, transfer::PendingSlot},
    ports::{
        ledger::{AggregationSubmission, LedgerError, LedgerReader, LedgerWriter},
        TxReceipt,
    },
};

sol! {
    #[sol(rpc)]
    interface IPrivateToken {
        struct EncryptedAmount {
            uint256 C1x;
            uint256 C1y;
            uint256 C2x;
            uint256 C2y;
        }

        function balances(bytes32 account) external view returns (
            uint256 C1x,
            uint256 C1y,
            uint256 C2x,
            uint256 C2y
        );

        function pendingTransferCounts(bytes32 account) external view returns (uint256);

        function allPendingTransfersMapping(bytes32 account, uint256 index)
            external
            view
            returns (EncryptedAmount amount, uint256 fee);

        function processPendingTransfer(
            bytes calldata proof,
            uint8[] calldata txsToProcess,
            address feeRecipient,
            bytes32 recipient,
            EncryptedAmount calldata newBalance
        ) external;
    }
}

impl From<IPrivateToken::EncryptedAmount> for FlatCiphertext {
    fn from(amount: IPrivateToken::EncryptedAmount) -> Self {
        FlatCiphertext::new(amount.C1x, amount.C1y, amount.C2x, amount.C2y)
    }
}

impl From<&FlatCiphertext> for IPrivateToken::EncryptedAmount {
    fn from(flat: &FlatCiphertext) -> Self {
        Self {
            C1x: flat.c1x(),
            C1y: flat.c1y(),
            C2x: flat.c2x(),
            C2y: flat.c2y(),
        }
    }
}

/// The contract takes queue indexes as `uint8[]`.
fn encode_indexes(indexes: &[u64]) -> Result<Vec<u8>, LedgerError> {
    indexes
        .iter()
        .map(|&i| u8::try_from(i).map_err(|_| LedgerError::IndexOutOfRange(i)))
        .collect()
}

/// Private token contract adapter
#[derive(Clone)]
pub struct EthereumLedger {
    provider: DynProvider,
    private_token: Address,
}

impl EthereumLedger {
    /// Connect with a signing wallet (needed for `submit_aggregation`).
    pub async fn new(
        rpc_url: &str,
        private_key: &str,
        private_token: Address,
    ) -> Result<Self, LedgerError> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| LedgerError::Rpc(format!("Invalid private key: {}", e)))?;
        let wallet = EthereumWallet::from(signer);
        let provider = DynProvider::new(
            ProviderBuilder::new().wallet(wallet).connect_http(
                rpc_url
                    .parse()
                    .map_err(|e| LedgerError::Rpc(format!("Invalid RPC URL: {}", e)))?,
            ),
        );

        Ok(Self {
            provider,
            private_token,
        })
    }

    /// Connect without a wallet. Reads only.
    pub fn read_only(rpc_url: &str, private_token: Address) -> Result<Self, LedgerError> {
        let provider = DynProvider::new(
            ProviderBuilder::new().connect_http(
                rpc_url
                    .parse()
                    .map_err(|e| LedgerError::Rpc(format!("Invalid RPC URL: {}", e)))?,
            ),
        );
        Ok(Self {
            provider,
            private_token,
        })
    }

    fn convert_receipt(receipt: &alloy::rpc::types::TransactionReceipt) -> TxReceipt {
        TxReceipt {
            tx_hash: receipt.transaction_hash,
            success: receipt.status(),
        }
    }
}

impl LedgerReader for EthereumLedger {
    async fn balance(&self, account: B256) -> Result<FlatCiphertext, LedgerError> {
        let token = IPrivateToken::new(self.private_token, &self.provider);
        let result = token
            .balances(account)
            .call()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        Ok(FlatCiphertext::new(
            result.C1x, result.C1y, result.C2x, result.C2y,
        ))
    }

    async fn pending_transfer_count(&self, account: B256) -> Result<u64, LedgerError> {
        let token = IPrivateToken::new(self.private_token, &self.provider);
        let count: U256 = token
            .pendingTransferCounts(account)
            .call()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        u64::try_from(count)
            .map_err(|_| LedgerError::InvalidResponse(format!("pending transfer count {count}")))
    }

    async fn pending_transfer(&self, account: B256, index: u64) -> Result<PendingSlot, LedgerError> {
        let token = IPrivateToken::new(self.private_token, &self.provider);
        let result = token
            .allPendingTransfersMapping(account, U256::from(index))
            .call()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        Ok(PendingSlot::from_raw(result.amount.into(), result.fee))
    }
}

impl LedgerWriter for EthereumLedger {
    async fn submit_aggregation(
        &self,
        submission: &AggregationSubmission,
    ) -> Result<TxReceipt, LedgerError> {
        let token = IPrivateToken::new(self.private_token, &self.provider);
        let indexes = encode_indexes(&submission.selected_indexes)?;

        let receipt = token
            .processPendingTransfer(
                submission.proof.clone(),
                indexes,
                submission.fee_recipient,
                submission.account,
                IPrivateToken::EncryptedAmount::from(&submission.new_balance),
            )
            .send()
            .await
            .map_err(|e| LedgerError::TransactionFailed(e.to_string()))?
            .get_receipt()
            .await
            .map_err(|e| LedgerError::TransactionFailed(e.to_string()))?;

        if !receipt.status() {
            return Err(LedgerError::TransactionReverted(format!(
                "processPendingTransfer reverted in {}",
                receipt.transaction_hash
            )));
        }

        info!(tx = %receipt.transaction_hash, "processPendingTransfer mined");
        Ok(Self::convert_receipt(&receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypted_amount_conversion() {
        let flat = FlatCiphertext::new(U256::from(1), U256::from(2), U256::from(3), U256::from(4));
        let amount = IPrivateToken::EncryptedAmount::from(&flat);
        assert_eq!(amount.C1y, U256::from(2));
        assert_eq!(amount.C2x, U256::from(3));
        assert_eq!(FlatCiphertext::from(amount), flat);
    }

    #[test]
    fn test_encode_indexes() {
        assert_eq!(encode_indexes(&[0, 3, 255]).unwrap(), vec![0, 3, 255]);
        assert_eq!(
            encode_indexes(&[1, 256]).unwrap_err(),
            LedgerError::IndexOutOfRange(256)
        );
    }

    #[test]
    fn test_read_only_rejects_bad_url() {
        let Err(err) = EthereumLedger::read_only("not a url", Address::ZERO) else {
            panic!("read_only accepted an invalid RPC URL");
        };
        assert!(matches!(err, LedgerError::Rpc(_)));
    }
}
