//! Completion outbox and its consumers.
//!
//! # Data Flow
//! ```text
//! complete_operation ──(same atomic unit)──▶ outbox row (CompletionEvent)
//!
//! deliver_completions, after the cycle has committed:
//!     for each undelivered event (oldest first), in its own atomic unit:
//!         every consumer.consume(event) → mark_delivered (row removed)
//! ```
//!
//! A consumer error rolls back that event's unit and leaves it undelivered,
//! so the whole event is offered again next cycle. Consumers must therefore
//! be idempotent.

use std::sync::Arc;

use alloy::primitives::Address;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::operations::{CompletionEvent, OperationKind, OperationType};
use crate::services::error::ServiceResult;
use crate::storage::ids::{AddressId, AssetId, NetworkId};
use crate::storage::{Store, Tables};

/// A downstream effect of an operation succeeding.
///
/// Runs inside the atomic unit that marks the event delivered; anything it
/// writes commits together with the delivery mark.
pub trait CompletionConsumer: Send + Sync {
    fn name(&self) -> &'static str;

    fn consume(&self, tables: &mut Tables, event: &CompletionEvent) -> ServiceResult<()>;
}

impl Tables {
    /// Events not yet handed to consumers, oldest first.
    pub fn undelivered_completions(&self) -> Vec<CompletionEvent> {
        self.outbox.values().cloned().collect()
    }

    /// Drop a delivered event from the outbox.
    ///
    /// Returns `false` if no undelivered event has this sequence.
    pub fn mark_delivered(&mut self, sequence: u64) -> bool {
        self.outbox.remove(&sequence).is_some()
    }
}

/// Offer every undelivered completion to `consumers`.
///
/// Returns `(delivered, failed)`.
pub fn deliver_completions(store: &Store, consumers: &[Arc<dyn CompletionConsumer>]) -> (usize, usize) {
    let events = store.read(|t| t.undelivered_completions());
    let mut delivered = 0;
    let mut failed = 0;

    for event in events {
        let result = store.atomic(|t| -> ServiceResult<()> {
            for consumer in consumers {
                consumer.consume(t, &event).map_err(|e| {
                    tracing::warn!(
                        consumer = consumer.name(),
                        operation_id = %event.operation_id,
                        error = %e,
                        "Completion consumer failed"
                    );
                    e
                })?;
            }
            t.mark_delivered(event.sequence);
            Ok(())
        });
        match result {
            Ok(()) => delivered += 1,
            Err(_) => failed += 1,
        }
    }

    if delivered + failed > 0 {
        tracing::debug!(delivered, failed, "Completion delivery finished");
    }
    (delivered, failed)
}

/// Funds every newly created address from the network's house address.
///
/// Driven by the `house_address` and `initial_assets` metadata keys; with
/// either missing the consumer does nothing. Each address is served once.
pub struct StarterAssets {
    required_confirmations: u64,
}

impl StarterAssets {
    /// `required_confirmations` applies to the withdraws it creates.
    pub fn new(required_confirmations: u64) -> Self {
        Self { required_confirmations }
    }

    fn give(
        &self,
        tables: &mut Tables,
        house: AddressId,
        asset_id: AssetId,
        amount: Decimal,
        to: Address,
    ) -> ServiceResult<bool> {
        let Some(link) = tables.address_account(house, asset_id) else {
            tracing::warn!(%house, %asset_id, "House address has no account for starter asset");
            return Ok(false);
        };
        let available = tables.balance(link.account_id)?;
        if available < amount {
            tracing::warn!(%house, %asset_id, %available, %amount, "House balance too low for starter asset");
            return Ok(false);
        }
        tables.create_withdraw(house, asset_id, amount, to, "Starter assets", self.required_confirmations)?;
        Ok(true)
    }
}

impl CompletionConsumer for StarterAssets {
    fn name(&self) -> &'static str {
        "starter_assets"
    }

    fn consume(&self, tables: &mut Tables, event: &CompletionEvent) -> ServiceResult<()> {
        if event.operation_type != OperationType::AddressCreation {
            return Ok(());
        }
        let address_id = match &tables.operation(event.operation_id)?.kind {
            OperationKind::AddressCreation(creation) => creation.address_id,
            _ => return Ok(()),
        };
        if tables.starter_assets_given.contains_key(&address_id) {
            return Ok(());
        }

        let metadata = tables.network(event.network_id)?.metadata.clone();
        let (Some(house), Some(initial)) = (metadata.house_address, metadata.initial_assets) else {
            return Ok(());
        };
        if house == address_id {
            return Ok(());
        }
        let Some(to) = tables.crypto_address(address_id)?.address else {
            return Ok(());
        };

        let mut given = 0;
        if let Some(amount) = initial.eth_amount.filter(|a| *a > Decimal::ZERO) {
            match native_asset_id(tables, event.network_id) {
                Some(eth) => given += self.give(tables, house, eth, amount, to)? as usize,
                None => tracing::warn!(network_id = %event.network_id, "No native asset for starter assets"),
            }
        }
        if let (Some(toybox), Some(amount)) = (initial.toybox, initial.toybox_amount.filter(|a| *a > 0)) {
            given += self.give(tables, house, toybox, Decimal::from(amount), to)? as usize;
        }

        tables.starter_assets_given.insert(address_id, Utc::now());
        tracing::info!(%address_id, %to, withdraws = given, "Starter assets queued");
        Ok(())
    }
}

fn native_asset_id(tables: &Tables, network_id: NetworkId) -> Option<AssetId> {
    tables.native_asset(network_id).map(|asset| asset.id)
}
