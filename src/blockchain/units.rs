//! Conversion between chain base units and decimal display amounts.

use alloy::primitives::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// Largest supported `decimals`; 10^18 keeps the scaled value inside `Decimal`.
pub const MAX_DECIMALS: u32 = 18;

fn scale(decimals: u32) -> BlockchainResult<Decimal> {
    if decimals > MAX_DECIMALS {
        return Err(BlockchainError::Conversion(format!(
            "{} decimals exceeds the supported maximum of {}",
            decimals, MAX_DECIMALS
        )));
    }
    Ok(Decimal::from(10u64.pow(decimals)))
}

/// Convert a display amount into base units (e.g. ETH → wei).
///
/// Fails for negative amounts and for amounts finer than one base unit.
pub fn to_base_units(amount: Decimal, decimals: u32) -> BlockchainResult<U256> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(BlockchainError::Conversion(format!("negative amount {}", amount)));
    }
    let scaled = amount
        .checked_mul(scale(decimals)?)
        .ok_or_else(|| BlockchainError::Conversion(format!("{} overflows at {} decimals", amount, decimals)))?;
    if !scaled.fract().is_zero() {
        return Err(BlockchainError::Conversion(format!(
            "{} has more than {} decimal places",
            amount, decimals
        )));
    }
    let units = scaled
        .trunc()
        .to_u128()
        .ok_or_else(|| BlockchainError::Conversion(format!("{} is not representable", amount)))?;
    Ok(U256::from(units))
}

/// Convert base units into a display amount (e.g. wei → ETH).
pub fn from_base_units(value: U256, decimals: u32) -> BlockchainResult<Decimal> {
    scale(decimals)?;
    let raw: u128 = value
        .try_into()
        .map_err(|_| BlockchainError::Conversion(format!("{} base units is too large", value)))?;
    let raw = i128::try_from(raw)
        .map_err(|_| BlockchainError::Conversion(format!("{} base units is too large", value)))?;
    Decimal::try_from_i128_with_scale(raw, decimals)
        .map(|amount| amount.normalize())
        .map_err(|e| BlockchainError::Conversion(format!("{} base units: {}", value, e)))
}
