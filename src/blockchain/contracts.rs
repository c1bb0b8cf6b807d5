//! Hosted wallet and token contract interfaces.
//!
//! The registry is loaded once at startup and passed to whatever needs ABI
//! or bytecode; nothing here is global.

use std::fs;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolEvent};

use crate::blockchain::types::{BlockchainError, BlockchainResult, RawLog};
use crate::config::ContractsConfig;

pub mod abi {
    use alloy::sol;

    sol! {
        /// Emitted by a hosted wallet when it receives native value.
        #[derive(Debug, PartialEq, Eq)]
        event Deposit(address from, uint256 value);

        /// ERC-20 transfer.
        #[derive(Debug, PartialEq, Eq)]
        event Transfer(address indexed from, address indexed to, uint256 value);

        /// Send native value out of a hosted wallet.
        function withdraw(address to, uint256 value);

        /// Send a token balance out of a hosted wallet.
        function withdrawToken(address token, address to, uint256 value);
    }
}

/// A decoded log the listener knows how to ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    /// Native value arrived at `wallet`.
    NativeDeposit { wallet: Address, from: Address, value: U256 },
    /// Tokens of contract `token` moved from `from` to `to`.
    TokenTransfer {
        token: Address,
        from: Address,
        to: Address,
        value: U256,
    },
}

/// Decode `log` against the known event set.
///
/// Returns `Ok(None)` for signatures outside the set and an error for a
/// known signature whose payload does not decode.
pub fn decode_event(log: &RawLog) -> BlockchainResult<Option<ChainEvent>> {
    let Some(signature) = log.topics.first() else {
        return Ok(None);
    };

    if *signature == abi::Deposit::SIGNATURE_HASH {
        let event = abi::Deposit::decode_raw_log(log.topics.iter().copied(), &log.data)
            .map_err(|e| BlockchainError::Decode(format!("Deposit log from {}: {}", log.address, e)))?;
        return Ok(Some(ChainEvent::NativeDeposit {
            wallet: log.address,
            from: event.from,
            value: event.value,
        }));
    }

    if *signature == abi::Transfer::SIGNATURE_HASH {
        let event = abi::Transfer::decode_raw_log(log.topics.iter().copied(), &log.data)
            .map_err(|e| BlockchainError::Decode(format!("Transfer log from {}: {}", log.address, e)))?;
        return Ok(Some(ChainEvent::TokenTransfer {
            token: log.address,
            from: event.from,
            to: event.to,
            value: event.value,
        }));
    }

    Ok(None)
}

/// Call data for a hosted-wallet withdraw; `token` selects `withdrawToken`.
pub fn withdraw_calldata(token: Option<Address>, to: Address, value: U256) -> Bytes {
    match token {
        Some(token) => abi::withdrawTokenCall { token, to, value }.abi_encode().into(),
        None => abi::withdrawCall { to, value }.abi_encode().into(),
    }
}

/// Contract artifacts known to this process.
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    hosted_wallet_bytecode: Bytes,
}

impl ContractRegistry {
    pub fn new(hosted_wallet_bytecode: Bytes) -> Self {
        Self { hosted_wallet_bytecode }
    }

    /// Load artifacts from configuration.
    ///
    /// `hosted_wallet_bytecode` is hex (with or without `0x`), or `@path`
    /// naming a file that contains the hex.
    pub fn from_config(config: &ContractsConfig) -> BlockchainResult<Self> {
        let source = config.hosted_wallet_bytecode.trim();
        let hex = match source.strip_prefix('@') {
            Some(path) => fs::read_to_string(path)
                .map_err(|e| BlockchainError::Contract(format!("cannot read bytecode file '{}': {}", path, e)))?,
            None => source.to_string(),
        };
        let hex = hex.trim();
        if hex.is_empty() {
            tracing::warn!("No hosted wallet bytecode configured; address creation will fail");
            return Ok(Self::default());
        }
        let bytecode = alloy::hex::decode(hex)
            .map_err(|e| BlockchainError::Contract(format!("invalid hosted wallet bytecode: {}", e)))?;
        tracing::info!(bytes = bytecode.len(), "Hosted wallet bytecode loaded");
        Ok(Self::new(bytecode.into()))
    }

    /// Creation code for a new hosted wallet.
    pub fn hosted_wallet_bytecode(&self) -> BlockchainResult<Bytes> {
        if self.hosted_wallet_bytecode.is_empty() {
            return Err(BlockchainError::Contract("hosted wallet bytecode is not configured".into()));
        }
        Ok(self.hosted_wallet_bytecode.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::TxHash;
    use std::io::Write;

    fn raw(address: Address, data: alloy::primitives::LogData) -> RawLog {
        RawLog {
            address,
            topics: data.topics().to_vec(),
            data: data.data.clone(),
            tx_hash: Some(TxHash::repeat_byte(1)),
            log_index: Some(0),
            block_number: Some(1),
        }
    }

    #[test]
    fn test_decode_native_deposit() {
        let wallet = Address::repeat_byte(0xaa);
        let event = abi::Deposit {
            from: Address::repeat_byte(0xbb),
            value: U256::from(42u64),
        };
        let decoded = decode_event(&raw(wallet, event.encode_log_data())).unwrap();
        assert_eq!(
            decoded,
            Some(ChainEvent::NativeDeposit {
                wallet,
                from: Address::repeat_byte(0xbb),
                value: U256::from(42u64),
            })
        );
    }

    #[test]
    fn test_decode_token_transfer() {
        let token = Address::repeat_byte(0x70);
        let event = abi::Transfer {
            from: Address::repeat_byte(1),
            to: Address::repeat_byte(2),
            value: U256::from(7u64),
        };
        match decode_event(&raw(token, event.encode_log_data())).unwrap() {
            Some(ChainEvent::TokenTransfer { token: t, to, value, .. }) => {
                assert_eq!(t, token);
                assert_eq!(to, Address::repeat_byte(2));
                assert_eq!(value, U256::from(7u64));
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_and_malformed_logs() {
        let mut log = raw(
            Address::ZERO,
            abi::Deposit {
                from: Address::ZERO,
                value: U256::from(1u64),
            }
            .encode_log_data(),
        );
        log.data = Bytes::from(vec![1, 2, 3]);
        assert!(matches!(decode_event(&log), Err(BlockchainError::Decode(_))));

        log.topics = vec![alloy::primitives::B256::repeat_byte(9)];
        assert_eq!(decode_event(&log).unwrap(), None);

        log.topics.clear();
        assert_eq!(decode_event(&log).unwrap(), None);
    }

    #[test]
    fn test_withdraw_selectors_differ() {
        let native = withdraw_calldata(None, Address::repeat_byte(1), U256::from(1u64));
        let token = withdraw_calldata(Some(Address::repeat_byte(2)), Address::repeat_byte(1), U256::from(1u64));
        assert_eq!(&native[..4], abi::withdrawCall::SELECTOR.as_slice());
        assert_eq!(&token[..4], abi::withdrawTokenCall::SELECTOR.as_slice());
    }

    #[test]
    fn test_bytecode_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0x6080604052").unwrap();
        let config = ContractsConfig {
            hosted_wallet_bytecode: format!("@{}", file.path().display()),
        };
        let registry = ContractRegistry::from_config(&config).unwrap();
        assert_eq!(registry.hosted_wallet_bytecode().unwrap().len(), 5);
    }

    #[test]
    fn test_missing_bytecode_fails_on_use() {
        let registry = ContractRegistry::from_config(&ContractsConfig::default()).unwrap();
        assert!(matches!(
            registry.hosted_wallet_bytecode(),
            Err(BlockchainError::Contract(_))
        ));
    }
}
