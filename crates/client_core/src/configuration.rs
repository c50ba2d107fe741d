use rand::Rng;
use rust_decimal::Decimal;
use shared::{domain::TokenConfigurationSnapshot, error::ValidationError};

pub const MIN_TOKEN_COUNT: u32 = 10;
pub const MAX_TOKEN_COUNT: u32 = 1000;
pub const DEFAULT_TOKEN_COUNT: u32 = 100;
pub const DEFAULT_SYMBOL_PREFIX: &str = "NFT-";
const SYMBOL_SUFFIX_BOUND: u32 = 1000;

pub fn default_unit_price() -> Decimal {
    Decimal::new(5, 3)
}

pub fn generate_symbol<R: Rng + ?Sized>(rng: &mut R, prefix: &str) -> String {
    format!("{prefix}{}", rng.gen_range(0..SYMBOL_SUFFIX_BOUND))
}

/// Token split parameters. Only `count` is user-adjustable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfiguration {
    symbol: String,
    count: u32,
    unit_price: Decimal,
}

impl TokenConfiguration {
    pub fn create(default_count: u32, default_unit_price: Decimal) -> Result<Self, ValidationError> {
        Self::create_with(
            &mut rand::thread_rng(),
            DEFAULT_SYMBOL_PREFIX,
            default_count,
            default_unit_price,
        )
    }

    pub fn create_with<R: Rng + ?Sized>(
        rng: &mut R,
        symbol_prefix: &str,
        default_count: u32,
        default_unit_price: Decimal,
    ) -> Result<Self, ValidationError> {
        check_count(i64::from(default_count))?;
        if default_unit_price <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice);
        }
        Ok(Self {
            symbol: generate_symbol(rng, symbol_prefix),
            count: default_count,
            unit_price: default_unit_price,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn set_count(&mut self, n: i64) -> Result<(), ValidationError> {
        self.count = check_count(n)?;
        Ok(())
    }

    pub fn total_value(&self) -> Decimal {
        Decimal::from(self.count) * self.unit_price
    }

    pub fn snapshot(&self) -> TokenConfigurationSnapshot {
        TokenConfigurationSnapshot {
            symbol: self.symbol.clone(),
            count: self.count,
            unit_price: self.unit_price,
            total_value: self.total_value(),
        }
    }
}

fn check_count(n: i64) -> Result<u32, ValidationError> {
    if n < i64::from(MIN_TOKEN_COUNT) || n > i64::from(MAX_TOKEN_COUNT) {
        return Err(ValidationError::OutOfRange {
            value: n,
            min: MIN_TOKEN_COUNT,
            max: MAX_TOKEN_COUNT,
        });
    }
    // Bounded by MAX_TOKEN_COUNT above.
    Ok(n as u32)
}

#[cfg(test)]
#[path = "tests/configuration_tests.rs"]
mod tests;
