//! Operation creation and state transitions.
//!
//! Every function here runs against `&mut Tables`, i.e. inside one atomic
//! unit. A returned error means the caller's unit rolls back, so partial
//! writes (a lock without its operation, say) never become visible.

use std::collections::BTreeMap;

use alloy::primitives::{Address, TxHash};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::blockchain::SignedTx;
use crate::ledger::AccountOwner;
use crate::operations::error::{OperationError, OperationResult};
use crate::operations::types::{
    AddressCreation, CompletionEvent, CryptoOperation, Deposit, EventKey, OperationHeader,
    OperationKind, OperationState, OperationType, Withdraw,
};
use crate::registry::RegistryError;
use crate::resilience::retries::RetryPolicy;
use crate::storage::ids::{AddressId, AssetId, NetworkId, OperationId};
use crate::storage::Tables;

/// A chain-level transfer into a hosted address, already decoded.
#[derive(Debug, Clone)]
pub struct IncomingTransfer {
    pub address_id: AddressId,
    pub asset_id: AssetId,
    pub amount: Decimal,
    pub from: Option<Address>,
    pub event: EventKey,
    pub block_number: u64,
}

/// What happened to an operation after a failed dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Still waiting; the queue retries after `next_attempt_at`.
    Retrying { attempts: u32 },
    /// Marked failed.
    Failed,
}

/// Where an operation stands after a confirmation update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Pending { confirmations: u64 },
    Completed,
    /// Already terminal; nothing changed.
    Unchanged,
}

/// Per-network operation totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationCounts {
    pub total: usize,
    pub by_state: BTreeMap<&'static str, usize>,
    pub by_type: BTreeMap<&'static str, usize>,
}

impl Tables {
    pub fn operation(&self, id: OperationId) -> OperationResult<&CryptoOperation> {
        self.operations.get(&id).ok_or(OperationError::NotFound(id))
    }

    fn operation_mut(&mut self, id: OperationId) -> OperationResult<&mut CryptoOperation> {
        self.operations.get_mut(&id).ok_or(OperationError::NotFound(id))
    }

    /// Operations on a network in `state`, oldest first.
    pub fn operations_in_state(&self, network_id: NetworkId, state: OperationState) -> Vec<&CryptoOperation> {
        let mut ops: Vec<&CryptoOperation> = self
            .operations
            .values()
            .filter(|op| op.header.network_id == network_id && op.header.state == state)
            .collect();
        ops.sort_by_key(|op| op.header.sequence);
        ops
    }

    /// Ids and types of waiting operations due at `now`, in creation order.
    ///
    /// An operation is due when it has no retry scheduled or the scheduled
    /// time has passed.
    pub fn waiting_operations(&self, network_id: NetworkId, now: DateTime<Utc>) -> Vec<(OperationId, OperationType)> {
        self.operations_in_state(network_id, OperationState::Waiting)
            .into_iter()
            .filter(|op| op.header.next_attempt_at.map_or(true, |due| due <= now))
            .map(|op| (op.id(), op.operation_type()))
            .collect()
    }

    /// Number of non-terminal operations on a network.
    pub fn pending_operation_count(&self, network_id: NetworkId) -> usize {
        self.operations
            .values()
            .filter(|op| op.header.network_id == network_id && !op.state().is_terminal())
            .count()
    }

    /// Operation totals on a network, per state and per type.
    pub fn operation_counts(&self, network_id: NetworkId) -> OperationCounts {
        let mut counts = OperationCounts::default();
        for op in self.operations.values().filter(|op| op.header.network_id == network_id) {
            counts.total += 1;
            *counts.by_state.entry(op.state().as_str()).or_default() += 1;
            *counts.by_type.entry(op.operation_type().as_str()).or_default() += 1;
        }
        counts
    }

    pub fn operation_by_txid(&self, network_id: NetworkId, txid: TxHash) -> Option<&CryptoOperation> {
        self.index
            .operation_by_txid
            .get(&(network_id, txid))
            .and_then(|id| self.operations.get(id))
    }

    pub fn operation_by_event(&self, network_id: NetworkId, event: EventKey) -> Option<&CryptoOperation> {
        self.index
            .operation_by_event
            .get(&(network_id, event))
            .and_then(|id| self.operations.get(id))
    }

    fn insert_operation(&mut self, op: CryptoOperation) -> OperationId {
        let id = op.id();
        let network_id = op.header.network_id;
        match &op.kind {
            OperationKind::AddressCreation(creation) => {
                self.index.creation_by_address.insert(creation.address_id, id);
            }
            OperationKind::Deposit(deposit) => {
                if let Some(event) = deposit.event {
                    self.index.operation_by_event.insert((network_id, event), id);
                }
            }
            OperationKind::Withdraw(_) => {}
        }
        self.operations.insert(id, op);
        id
    }

    /// Reserve a new address and queue its creation.
    pub fn create_address(
        &mut self,
        network_id: NetworkId,
        required_confirmations: u64,
    ) -> OperationResult<(AddressId, OperationId)> {
        let address_id = self.create_pending_address(network_id)?;
        let op = self.request_address_creation(address_id, required_confirmations)?;
        Ok((address_id, op))
    }

    /// Queue creation of a pending address.
    ///
    /// Fails with [`OperationError::MultipleCreationOperations`] if the
    /// address already has one.
    pub fn request_address_creation(
        &mut self,
        address_id: AddressId,
        required_confirmations: u64,
    ) -> OperationResult<OperationId> {
        if let Some(existing) = self.index.creation_by_address.get(&address_id) {
            return Err(OperationError::MultipleCreationOperations {
                address: address_id,
                existing: *existing,
            });
        }
        let address = self.crypto_address(address_id)?;
        if address.address.is_some() {
            return Err(RegistryError::AddressAlreadyAssigned(address_id).into());
        }
        let network_id = address.network_id;

        let id = OperationId::new();
        let sequence = self.next_sequence();
        let op = CryptoOperation {
            header: OperationHeader::new(id, sequence, network_id, required_confirmations),
            kind: OperationKind::AddressCreation(AddressCreation { address_id }),
        };
        tracing::info!(operation_id = %id, %address_id, "Address creation queued");
        Ok(self.insert_operation(op))
    }

    /// Queue a withdraw and lock its funds.
    ///
    /// The amount moves from the address account into a fresh holding
    /// account before anything touches the network.
    pub fn create_withdraw(
        &mut self,
        address_id: AddressId,
        asset_id: AssetId,
        amount: Decimal,
        to: Address,
        note: &str,
        required_confirmations: u64,
    ) -> OperationResult<OperationId> {
        if amount <= Decimal::ZERO {
            return Err(OperationError::InvalidAmount(format!(
                "withdraw amount must be positive, got {}",
                amount
            )));
        }
        if to == Address::ZERO {
            return Err(RegistryError::InvalidAddress("withdraw to the zero address".into()).into());
        }
        let network_id = self.crypto_address(address_id)?.network_id;
        let link = self.address_account(address_id, asset_id).ok_or_else(|| {
            RegistryError::AddressNotFound(format!("no {} account for address {}", asset_id, address_id))
        })?;
        let (crypto_account_id, source_account_id) = (link.id, link.account_id);

        let id = OperationId::new();
        let holding = self.create_account(asset_id, AccountOwner::Holding(id))?;
        self.transfer(amount, source_account_id, holding, note)?;

        let sequence = self.next_sequence();
        let mut header = OperationHeader::new(id, sequence, network_id, required_confirmations);
        header.crypto_account_id = Some(crypto_account_id);
        header.holding_account_id = Some(holding);

        let op = CryptoOperation {
            header,
            kind: OperationKind::Withdraw(Withdraw {
                address_id,
                asset_id,
                amount,
                to,
                source_account_id,
                note: note.to_string(),
            }),
        };
        tracing::info!(operation_id = %id, %address_id, %amount, %to, "Withdraw queued");
        Ok(self.insert_operation(op))
    }

    /// Record a chain-level transfer into a hosted address.
    ///
    /// Returns `Ok(None)` when the event was already ingested. Otherwise the
    /// value is credited to a fresh holding account and the deposit waits in
    /// `broadcasted` for its confirmations.
    pub fn record_deposit(
        &mut self,
        transfer: IncomingTransfer,
        required_confirmations: u64,
    ) -> OperationResult<Option<OperationId>> {
        let network_id = self.crypto_address(transfer.address_id)?.network_id;
        if self.index.operation_by_event.contains_key(&(network_id, transfer.event)) {
            return Ok(None);
        }
        if transfer.amount <= Decimal::ZERO {
            return Err(OperationError::InvalidAmount(format!(
                "deposit amount must be positive, got {}",
                transfer.amount
            )));
        }

        let crypto_account_id = self.get_or_create_address_account(transfer.address_id, transfer.asset_id)?;

        let id = OperationId::new();
        let holding = self.create_account(transfer.asset_id, AccountOwner::Holding(id))?;
        self.deposit_or_withdraw(
            holding,
            transfer.amount,
            &format!("Deposit detected in {}", transfer.event.txid),
            false,
        )?;

        let sequence = self.next_sequence();
        let mut header = OperationHeader::new(id, sequence, network_id, required_confirmations);
        header.state = OperationState::Broadcasted;
        header.txid = Some(transfer.event.txid);
        header.block_number = Some(transfer.block_number);
        header.crypto_account_id = Some(crypto_account_id);
        header.holding_account_id = Some(holding);

        let op = CryptoOperation {
            header,
            kind: OperationKind::Deposit(Deposit {
                address_id: transfer.address_id,
                asset_id: transfer.asset_id,
                amount: transfer.amount,
                from: transfer.from,
                event: Some(transfer.event),
            }),
        };
        tracing::info!(
            operation_id = %id,
            address_id = %transfer.address_id,
            amount = %transfer.amount,
            txid = %transfer.event.txid,
            log_index = transfer.event.log_index,
            "Deposit recorded"
        );
        Ok(Some(self.insert_operation(op)))
    }

    /// Credit an address without touching the chain. Terminal on creation.
    pub fn record_faux_deposit(
        &mut self,
        address_id: AddressId,
        asset_id: AssetId,
        amount: Decimal,
        note: &str,
    ) -> OperationResult<OperationId> {
        if amount <= Decimal::ZERO {
            return Err(OperationError::InvalidAmount(format!(
                "deposit amount must be positive, got {}",
                amount
            )));
        }
        let network_id = self.crypto_address(address_id)?.network_id;
        let crypto_account_id = self.get_or_create_address_account(address_id, asset_id)?;
        let target = self.address_account_by_id(crypto_account_id)?.account_id;

        let id = OperationId::new();
        let holding = self.create_account(asset_id, AccountOwner::Holding(id))?;
        self.deposit_or_withdraw(holding, amount, note, false)?;
        self.transfer(amount, holding, target, note)?;

        let sequence = self.next_sequence();
        let mut header = OperationHeader::new(id, sequence, network_id, 0);
        header.state = OperationState::Immediate;
        header.completed_at = Some(Utc::now());
        header.crypto_account_id = Some(crypto_account_id);
        header.holding_account_id = Some(holding);

        let op = CryptoOperation {
            header,
            kind: OperationKind::Deposit(Deposit {
                address_id,
                asset_id,
                amount,
                from: None,
                event: None,
            }),
        };
        tracing::info!(operation_id = %id, %address_id, %amount, "Faux deposit recorded");
        Ok(self.insert_operation(op))
    }

    /// Count a dispatch attempt.
    pub fn begin_attempt(&mut self, id: OperationId, now: DateTime<Utc>) -> OperationResult<u32> {
        let op = self.operation_mut(id)?;
        if op.header.state != OperationState::Waiting {
            return Err(OperationError::InvalidTransition {
                id,
                from: op.header.state,
                to: OperationState::Broadcasted,
            });
        }
        op.header.attempts += 1;
        op.header.attempted_at = Some(now);
        Ok(op.header.attempts)
    }

    /// Record a failed attempt: schedule a retry or give up.
    pub fn record_attempt_failure(
        &mut self,
        id: OperationId,
        error: &OperationError,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> OperationResult<AttemptOutcome> {
        let attempts = self.operation(id)?.header.attempts;
        if !error.is_retryable() || policy.is_exhausted(attempts) {
            let reason = if error.is_retryable() {
                format!("retry budget exhausted after {} attempts: {}", attempts, error)
            } else {
                error.to_string()
            };
            self.fail_operation(id, &reason, now)?;
            return Ok(AttemptOutcome::Failed);
        }

        let op = self.operation_mut(id)?;
        op.header.next_attempt_at = Some(now + policy.delay_for(attempts));
        op.header.failure_reason = Some(error.to_string());
        Ok(AttemptOutcome::Retrying { attempts })
    }

    /// Keep the signed transaction a waiting operation is about to send.
    ///
    /// Recorded in its own unit before the broadcast, so a send whose
    /// outcome is unknown is retried with the same bytes.
    pub fn record_signed_transaction(&mut self, id: OperationId, signed: SignedTx) -> OperationResult<()> {
        let op = self.operation_mut(id)?;
        if op.header.state != OperationState::Waiting {
            return Err(OperationError::InvalidTransition {
                id,
                from: op.header.state,
                to: OperationState::Broadcasted,
            });
        }
        tracing::debug!(operation_id = %id, tx_hash = %signed.hash, "Signed transaction recorded");
        op.header.signed_tx = Some(signed);
        Ok(())
    }

    /// `waiting → broadcasted` once the node accepted the transaction.
    pub fn mark_broadcasted(&mut self, id: OperationId, txid: TxHash) -> OperationResult<()> {
        let op = self.operation(id)?;
        let network_id = op.header.network_id;
        if op.header.state != OperationState::Waiting {
            return Err(OperationError::InvalidTransition {
                id,
                from: op.header.state,
                to: OperationState::Broadcasted,
            });
        }
        if let Some(existing) = self.index.operation_by_txid.get(&(network_id, txid)) {
            if *existing != id {
                return Err(OperationError::DuplicateTxid {
                    txid: txid.to_string(),
                    existing: *existing,
                });
            }
        }

        let op = self.operation_mut(id)?;
        op.header.state = OperationState::Broadcasted;
        op.header.txid = Some(txid);
        op.header.next_attempt_at = None;
        op.header.failure_reason = None;
        self.index.operation_by_txid.insert((network_id, txid), id);
        tracing::info!(operation_id = %id, %txid, "Operation broadcasted");
        Ok(())
    }

    /// Apply a confirmation count; completes the operation at its threshold.
    pub fn update_confirmations(
        &mut self,
        id: OperationId,
        block_number: u64,
        current_block: u64,
        now: DateTime<Utc>,
    ) -> OperationResult<ConfirmationOutcome> {
        let op = self.operation_mut(id)?;
        if op.header.state.is_terminal() {
            return Ok(ConfirmationOutcome::Unchanged);
        }
        if op.header.state != OperationState::Broadcasted {
            return Err(OperationError::InvalidTransition {
                id,
                from: op.header.state,
                to: OperationState::Success,
            });
        }

        let confirmations = current_block.saturating_sub(block_number);
        op.header.block_number = Some(block_number);
        op.header.confirmations = confirmations;
        if confirmations < op.header.required_confirmations {
            return Ok(ConfirmationOutcome::Pending { confirmations });
        }

        self.complete_operation(id, now)?;
        Ok(ConfirmationOutcome::Completed)
    }

    /// Enter `success` and release the holding account.
    ///
    /// This is the only place holding funds reach their destination. It
    /// returns `Ok(false)` without touching anything when the operation is
    /// already successful, so the release happens exactly once.
    pub fn complete_operation(&mut self, id: OperationId, now: DateTime<Utc>) -> OperationResult<bool> {
        let op = self.operation(id)?.clone();
        match op.header.state {
            OperationState::Success => return Ok(false),
            OperationState::Failed | OperationState::Immediate => {
                return Err(OperationError::InvalidTransition {
                    id,
                    from: op.header.state,
                    to: OperationState::Success,
                })
            }
            OperationState::Waiting | OperationState::Broadcasted => {}
        }

        match &op.kind {
            OperationKind::AddressCreation(creation) => {
                if self.crypto_address(creation.address_id)?.address.is_none() {
                    return Err(OperationError::NotReady {
                        id,
                        reason: "created address has no on-chain value".into(),
                    });
                }
            }
            OperationKind::Deposit(deposit) => {
                let holding = op
                    .header
                    .holding_account_id
                    .ok_or(OperationError::MissingHoldingAccount(id))?;
                let link = op
                    .header
                    .crypto_account_id
                    .ok_or(OperationError::MissingHoldingAccount(id))?;
                let target = self.address_account_by_id(link)?.account_id;
                self.transfer(deposit.amount, holding, target, "Deposit confirmed")?;
            }
            OperationKind::Withdraw(withdraw) => {
                let holding = op
                    .header
                    .holding_account_id
                    .ok_or(OperationError::MissingHoldingAccount(id))?;
                self.deposit_or_withdraw(
                    holding,
                    -withdraw.amount,
                    &format!("Withdraw to {}", withdraw.to),
                    false,
                )?;
            }
        }

        let sequence = self.next_sequence();
        let op = self.operation_mut(id)?;
        op.header.state = OperationState::Success;
        op.header.completed_at = Some(now);
        op.header.next_attempt_at = None;
        op.header.failure_reason = None;
        let operation_type = op.operation_type();
        let event = CompletionEvent {
            sequence,
            operation_id: id,
            operation_type,
            network_id: op.header.network_id,
        };
        self.outbox.insert(sequence, event);
        tracing::info!(operation_id = %id, %operation_type, "Operation succeeded");
        Ok(true)
    }

    /// Enter `failed`, undoing whatever the operation holds.
    ///
    /// A withdraw's lock returns to its source; a deposit's unconfirmed
    /// credit is retracted. Returns `Ok(false)` if already failed.
    pub fn fail_operation(&mut self, id: OperationId, reason: &str, now: DateTime<Utc>) -> OperationResult<bool> {
        let op = self.operation(id)?.clone();
        match op.header.state {
            OperationState::Failed => return Ok(false),
            OperationState::Success | OperationState::Immediate => {
                return Err(OperationError::InvalidTransition {
                    id,
                    from: op.header.state,
                    to: OperationState::Failed,
                })
            }
            OperationState::Waiting | OperationState::Broadcasted => {}
        }

        match &op.kind {
            OperationKind::AddressCreation(_) => {}
            OperationKind::Deposit(deposit) => {
                let holding = op
                    .header
                    .holding_account_id
                    .ok_or(OperationError::MissingHoldingAccount(id))?;
                self.deposit_or_withdraw(
                    holding,
                    -deposit.amount,
                    &format!("Deposit retracted: {}", reason),
                    false,
                )?;
            }
            OperationKind::Withdraw(withdraw) => {
                let holding = op
                    .header
                    .holding_account_id
                    .ok_or(OperationError::MissingHoldingAccount(id))?;
                self.transfer(withdraw.amount, holding, withdraw.source_account_id, "Withdraw reversal")?;
            }
        }

        let op = self.operation_mut(id)?;
        op.header.state = OperationState::Failed;
        op.header.completed_at = Some(now);
        op.header.next_attempt_at = None;
        op.header.failure_reason = Some(reason.to_string());
        tracing::warn!(operation_id = %id, reason, "Operation failed");
        Ok(true)
    }

    /// Cancel a waiting operation, reversing any lock.
    pub fn cancel_operation(&mut self, id: OperationId, now: DateTime<Utc>) -> OperationResult<()> {
        let state = self.operation(id)?.header.state;
        if state != OperationState::Waiting {
            return Err(OperationError::NotCancellable { id, state });
        }
        self.fail_operation(id, "cancelled", now)?;
        Ok(())
    }
}
