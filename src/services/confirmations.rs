//! Confirmation tracker.
//!
//! # Data Flow
//! ```text
//! broadcasted operations (oldest first)
//!     → get_transaction_receipt(txid)          none: still pending
//!     → status == 0 or gas_used == gas_limit   → failed (lock reversed)
//!     → confirmations = head - receipt.block   → success at threshold
//! ```
//!
//! A receipt whose block differs from the one recorded earlier means the
//! transaction was re-mined after a reorg. The count is re-based on the new
//! block; nothing already completed is rolled back.

use std::sync::Arc;

use alloy::primitives::TxHash;
use chrono::Utc;

use crate::blockchain::{NodeRpc, TxReceipt};
use crate::observability::metrics;
use crate::operations::{ConfirmationOutcome, OperationKind, OperationState};
use crate::services::error::{ServiceError, ServiceResult};
use crate::storage::ids::{NetworkId, OperationId};
use crate::storage::Store;

/// Result of checking one broadcasted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Not mined yet, or no new confirmations.
    Unchanged,
    /// More confirmations, threshold not reached.
    Progressed { confirmations: u64 },
    Completed,
    /// Failed on chain.
    Failed,
}

/// Advances broadcasted operations of one network.
pub struct ConfirmationTracker {
    network_id: NetworkId,
}

#[derive(Debug, Clone)]
struct Tracked {
    id: OperationId,
    txid: Option<TxHash>,
    block_number: Option<u64>,
    confirmations: u64,
    is_creation: bool,
}

impl ConfirmationTracker {
    pub fn new(network_id: NetworkId) -> Self {
        Self { network_id }
    }

    /// Check every broadcasted operation once.
    ///
    /// Returns `(updated_count, failed_count)`; `failed_count` includes
    /// operations whose check errored and will be retried next poll.
    pub async fn poll(&self, node: &Arc<dyn NodeRpc>, store: &Store) -> ServiceResult<(usize, usize)> {
        let tracked = store.read(|t| {
            t.operations_in_state(self.network_id, OperationState::Broadcasted)
                .into_iter()
                .map(|op| Tracked {
                    id: op.id(),
                    txid: op.header.txid,
                    block_number: op.header.block_number,
                    confirmations: op.header.confirmations,
                    is_creation: matches!(op.kind, OperationKind::AddressCreation(_)),
                })
                .collect::<Vec<_>>()
        });
        if tracked.is_empty() {
            return Ok((0, 0));
        }

        let head = node.get_block_number().await?;
        let mut updated = 0;
        let mut failed = 0;

        for op in tracked {
            match self.track(node.as_ref(), store, &op, head).await {
                Ok(TrackOutcome::Unchanged) => metrics::record_confirmation("pending"),
                Ok(TrackOutcome::Progressed { .. }) => {
                    metrics::record_confirmation("progressed");
                    updated += 1;
                }
                Ok(TrackOutcome::Completed) => {
                    metrics::record_confirmation("completed");
                    updated += 1;
                }
                Ok(TrackOutcome::Failed) => {
                    metrics::record_confirmation("failed");
                    failed += 1;
                }
                Err(e) => {
                    tracing::warn!(operation_id = %op.id, txid = ?op.txid, error = %e, "Confirmation check failed");
                    metrics::record_confirmation("error");
                    failed += 1;
                }
            }
        }

        if updated + failed > 0 {
            tracing::info!(network_id = %self.network_id, head, updated, failed, "Confirmation poll finished");
        }
        Ok((updated, failed))
    }

    async fn track(&self, node: &dyn NodeRpc, store: &Store, op: &Tracked, head: u64) -> ServiceResult<TrackOutcome> {
        let txid = op.txid.ok_or(ServiceError::MissingTxid(op.id))?;
        let Some(receipt) = node.get_transaction_receipt(txid).await? else {
            return Ok(TrackOutcome::Unchanged);
        };
        let Some(block_number) = receipt.block_number else {
            return Ok(TrackOutcome::Unchanged);
        };

        if let Some(reason) = chain_failure(node, &receipt).await? {
            let now = Utc::now();
            store.atomic(|t| t.fail_operation(op.id, &reason, now))?;
            return Ok(TrackOutcome::Failed);
        }

        if let Some(previous) = op.block_number {
            if previous != block_number {
                tracing::warn!(
                    operation_id = %op.id,
                    %txid,
                    previous_block = previous,
                    new_block = block_number,
                    "Transaction moved to a different block, re-basing confirmations"
                );
            }
        }

        let now = Utc::now();
        store.atomic(|t| -> ServiceResult<TrackOutcome> {
            if op.is_creation {
                let address_id = match &t.operation(op.id)?.kind {
                    OperationKind::AddressCreation(creation) => creation.address_id,
                    _ => return Err(ServiceError::Setup(format!("operation {} is not an address creation", op.id))),
                };
                if t.crypto_address(address_id)?.address.is_none() {
                    match receipt.contract_address {
                        Some(contract) => t.assign_address(address_id, contract)?,
                        None => {
                            t.fail_operation(op.id, "deployment receipt has no contract address", now)?;
                            return Ok(TrackOutcome::Failed);
                        }
                    }
                }
            }

            Ok(match t.update_confirmations(op.id, block_number, head, now)? {
                ConfirmationOutcome::Completed => TrackOutcome::Completed,
                ConfirmationOutcome::Pending { confirmations } if confirmations != op.confirmations => {
                    TrackOutcome::Progressed { confirmations }
                }
                ConfirmationOutcome::Pending { .. } | ConfirmationOutcome::Unchanged => TrackOutcome::Unchanged,
            })
        })
    }
}

/// Why a mined transaction counts as failed, if it does.
///
/// A reverted status is authoritative. Otherwise a transaction that used
/// its entire gas limit is treated as having run out of gas.
async fn chain_failure(node: &dyn NodeRpc, receipt: &TxReceipt) -> ServiceResult<Option<String>> {
    if !receipt.status {
        return Ok(Some("transaction reverted".to_string()));
    }
    if let Some(tx) = node.get_transaction_by_hash(receipt.tx_hash).await? {
        if receipt.gas_used == tx.gas_limit {
            return Ok(Some(format!("out of gas: used the entire gas limit of {}", tx.gas_limit)));
        }
    }
    Ok(None)
}
