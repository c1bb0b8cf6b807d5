//! Chain event listener.
//!
//! # Data Flow
//! ```text
//! bookmark (last scanned block) - rescan_depth
//!     → get_logs(hosted wallets + registered tokens, window ≤ log_block_window)
//!     → decode_event (Deposit / Transfer)
//!     → record_deposit, one atomic unit per log, deduped by (txid, log_index)
//!     → bookmark advanced to the end of the window
//! ```
//!
//! Every poll re-reads the last `rescan_depth` blocks, so ingestion must be
//! idempotent; the `(network, txid, log_index)` index makes replays no-ops.

use std::sync::Arc;

use alloy::primitives::{Address, U256};

use crate::blockchain::{decode_event, from_base_units, BlockchainError, ChainEvent, LogQuery, NodeRpc, RawLog};
use crate::config::{ConfirmationConfig, NetworkConfig};
use crate::observability::metrics;
use crate::operations::{EventKey, IncomingTransfer, OperationType};
use crate::services::error::{ServiceError, ServiceResult};
use crate::storage::ids::NetworkId;
use crate::storage::{Store, Tables};

/// What happened to one log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new deposit operation was created.
    Recorded,
    /// The event was ingested by an earlier poll.
    Duplicate,
    /// Not a deposit into a hosted address (unknown signature, foreign recipient).
    Ignored,
}

/// Watches one network for value arriving at hosted addresses.
pub struct ChainEventListener {
    network_id: NetworkId,
    config: NetworkConfig,
    required_confirmations: u64,
}

impl ChainEventListener {
    pub fn new(network_id: NetworkId, config: NetworkConfig, confirmations: &ConfirmationConfig) -> Self {
        Self {
            network_id,
            config,
            required_confirmations: confirmations.required_for(OperationType::Deposit),
        }
    }

    /// Scan the next window of blocks.
    ///
    /// Returns `(success_count, failure_count)` over the logs in the window.
    /// Failing logs are skipped; only an RPC failure aborts the poll, and
    /// then the bookmark stays put.
    pub async fn poll(&self, node: &Arc<dyn NodeRpc>, store: &Store) -> ServiceResult<(usize, usize)> {
        let head = node.get_block_number().await?;
        let (bookmark, addresses) = store.read(|t| {
            let bookmark = t.network(self.network_id).ok().and_then(|n| n.metadata.event_bookmark);
            let mut addresses = t.assigned_addresses(self.network_id);
            addresses.extend(t.registered_tokens(self.network_id).filter_map(|asset| asset.external_id));
            (bookmark, addresses)
        });

        let (from_block, to_block) = self.scan_range(bookmark, head);

        let mut success = 0;
        let mut failure = 0;

        if !addresses.is_empty() {
            let query = LogQuery {
                from_block,
                to_block,
                addresses,
            };
            let logs = node.get_logs(&query).await?;
            tracing::debug!(from_block, to_block, logs = logs.len(), "Fetched logs");

            for log in &logs {
                let result = store.atomic(|t| ingest_log(t, self.network_id, log, self.required_confirmations));
                match result {
                    Ok(IngestOutcome::Recorded) => {
                        metrics::record_event_ingested("recorded");
                        success += 1;
                    }
                    Ok(IngestOutcome::Duplicate) => metrics::record_event_ingested("duplicate"),
                    Ok(IngestOutcome::Ignored) => metrics::record_event_ingested("ignored"),
                    Err(e) => {
                        tracing::warn!(
                            network_id = %self.network_id,
                            txid = ?log.tx_hash,
                            log_index = ?log.log_index,
                            error = %e,
                            "Skipping log that failed to ingest"
                        );
                        metrics::record_event_ingested("failed");
                        failure += 1;
                    }
                }
            }
        }

        store.atomic(|t| -> ServiceResult<()> {
            let metadata = t.network_metadata_mut(self.network_id)?;
            if metadata.event_bookmark.map_or(true, |current| current < to_block) {
                metadata.event_bookmark = Some(to_block);
            }
            Ok(())
        })?;

        if success + failure > 0 {
            tracing::info!(network_id = %self.network_id, from_block, to_block, success, failure, "Event poll finished");
        }
        Ok((success, failure))
    }

    /// Inclusive block range for the next poll.
    ///
    /// Starts `rescan_depth` blocks behind the first unscanned block and
    /// covers at most `log_block_window` new blocks. A first poll starts
    /// `rescan_depth` blocks behind the head.
    pub fn scan_range(&self, bookmark: Option<u64>, head: u64) -> (u64, u64) {
        let next = match bookmark {
            Some(last) => last.saturating_add(1),
            None => head.saturating_sub(self.config.rescan_depth),
        };
        let from_block = next.saturating_sub(self.config.rescan_depth).min(head);
        let window = self.config.log_block_window.max(1);
        let to_block = next.saturating_add(window - 1).min(head);
        (from_block, to_block.max(from_block))
    }
}

/// Turn one raw log into a deposit, inside the caller's atomic unit.
pub fn ingest_log(
    tables: &mut Tables,
    network_id: NetworkId,
    log: &RawLog,
    required_confirmations: u64,
) -> ServiceResult<IngestOutcome> {
    let Some(event) = decode_event(log)? else {
        return Ok(IngestOutcome::Ignored);
    };

    let (wallet, from, value, token) = match event {
        ChainEvent::NativeDeposit { wallet, from, value } => (wallet, from, value, None),
        ChainEvent::TokenTransfer { token, from, to, value } => (to, from, value, Some(token)),
    };

    let Some(address) = tables.address_by_value(network_id, wallet) else {
        return Ok(IngestOutcome::Ignored);
    };
    let address_id = address.id;

    let asset_id = match token {
        Some(token) => match tables.asset_by_external_id(network_id, token) {
            Some(asset) => asset.id,
            None => return Ok(IngestOutcome::Ignored),
        },
        None => {
            tables
                .native_asset(network_id)
                .ok_or_else(|| ServiceError::Setup(format!("network {} has no native asset registered", network_id)))?
                .id
        }
    };

    if value == U256::ZERO {
        return Ok(IngestOutcome::Ignored);
    }

    let event_key = EventKey {
        txid: log
            .tx_hash
            .ok_or_else(|| BlockchainError::Decode("log has no transaction hash".into()))?,
        log_index: log
            .log_index
            .ok_or_else(|| BlockchainError::Decode("log has no index".into()))?,
    };
    let block_number = log
        .block_number
        .ok_or_else(|| BlockchainError::Decode("log has no block number".into()))?;

    let decimals = tables.asset(asset_id)?.format.decimals();
    let transfer = IncomingTransfer {
        address_id,
        asset_id,
        amount: from_base_units(value, decimals)?,
        from: non_zero(from),
        event: event_key,
        block_number,
    };

    match tables.record_deposit(transfer, required_confirmations)? {
        Some(_) => Ok(IngestOutcome::Recorded),
        None => Ok(IngestOutcome::Duplicate),
    }
}

fn non_zero(address: Address) -> Option<Address> {
    (address != Address::ZERO).then_some(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::contracts::abi;
    use crate::registry::AssetFormat;
    use alloy::primitives::{Bytes, TxHash, B256};
    use alloy::sol_types::SolEvent;
    use rust_decimal::Decimal;

    fn listener(rescan_depth: u64, window: u64) -> ChainEventListener {
        let config = NetworkConfig {
            rescan_depth,
            log_block_window: window,
            ..NetworkConfig::default()
        };
        ChainEventListener::new(NetworkId::new(), config, &ConfirmationConfig::default())
    }

    #[test]
    fn test_first_poll_starts_behind_head() {
        let listener = listener(5, 100);
        assert_eq!(listener.scan_range(None, 50), (40, 50));
        assert_eq!(listener.scan_range(None, 3), (0, 3));
    }

    #[test]
    fn test_window_bounds_new_blocks() {
        let listener = listener(2, 10);
        assert_eq!(listener.scan_range(Some(100), 500), (99, 110));
        // Caught up: only the rescan tail is read again.
        assert_eq!(listener.scan_range(Some(500), 500), (499, 500));
    }

    fn native_log(wallet: Address, wei: u64, txid: u8, log_index: u64) -> RawLog {
        let data = abi::Deposit {
            from: Address::repeat_byte(0x55),
            value: U256::from(wei),
        }
        .encode_log_data();
        RawLog {
            address: wallet,
            topics: data.topics().to_vec(),
            data: data.data.clone(),
            tx_hash: Some(TxHash::repeat_byte(txid)),
            log_index: Some(log_index),
            block_number: Some(7),
        }
    }

    fn tables_with_wallet() -> (Tables, NetworkId, Address) {
        let mut tables = Tables::new();
        let network = tables.get_or_create_network("testnet");
        tables
            .get_or_create_asset(network, "ETH", "Ether", AssetFormat::Native { decimals: 0 })
            .unwrap();
        let wallet = Address::repeat_byte(0x21);
        tables.register_address(network, wallet).unwrap();
        (tables, network, wallet)
    }

    #[test]
    fn test_replayed_log_is_duplicate() {
        let (mut tables, network, wallet) = tables_with_wallet();
        let log = native_log(wallet, 10, 1, 0);

        assert_eq!(ingest_log(&mut tables, network, &log, 1).unwrap(), IngestOutcome::Recorded);
        assert_eq!(ingest_log(&mut tables, network, &log, 1).unwrap(), IngestOutcome::Duplicate);

        let other_index = native_log(wallet, 10, 1, 1);
        assert_eq!(ingest_log(&mut tables, network, &other_index, 1).unwrap(), IngestOutcome::Recorded);

        let eth = tables.native_asset(network).unwrap().id;
        assert_eq!(tables.asset_total(eth), Decimal::new(20, 0));
    }

    #[test]
    fn test_foreign_and_unknown_logs_are_ignored() {
        let (mut tables, network, _) = tables_with_wallet();
        let foreign = native_log(Address::repeat_byte(0x99), 10, 2, 0);
        assert_eq!(ingest_log(&mut tables, network, &foreign, 1).unwrap(), IngestOutcome::Ignored);

        let unknown = RawLog {
            topics: vec![B256::repeat_byte(3)],
            ..foreign
        };
        assert_eq!(ingest_log(&mut tables, network, &unknown, 1).unwrap(), IngestOutcome::Ignored);
    }

    #[test]
    fn test_malformed_log_is_an_error() {
        let (mut tables, network, wallet) = tables_with_wallet();
        let mut log = native_log(wallet, 10, 4, 0);
        log.data = Bytes::from(vec![0u8; 3]);
        assert!(ingest_log(&mut tables, network, &log, 1).is_err());

        let mut pending = native_log(wallet, 10, 5, 0);
        pending.tx_hash = None;
        assert!(ingest_log(&mut tables, network, &pending, 1).is_err());
    }
}
