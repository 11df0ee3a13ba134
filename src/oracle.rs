// Oracle price store
//
// Prices arrive as signed integer mantissas with a base-10 exponent and a publish
// time, the shape pull oracles deliver. Feed authentication happens upstream; this
// store only decodes, keeps the newest update per feed, and enforces staleness.

use crate::types::{FeedId, Price, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw price update as supplied by a keeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdateData {
    pub feed_id: FeedId,
    pub price: i64,
    pub confidence: u64,
    pub exponent: i32,
    pub publish_time: Timestamp,
}

impl PriceUpdateData {
    /// Decode `price * 10^exponent`. Non-positive prices are rejected.
    pub fn decode(&self) -> Result<PriceRecord, OracleError> {
        let price = scale(self.price, self.exponent).ok_or(OracleError::InvalidPrice(self.feed_id))?;
        let price = Price::new(price).ok_or(OracleError::InvalidPrice(self.feed_id))?;
        let confidence = i64::try_from(self.confidence)
            .ok()
            .and_then(|c| scale(c, self.exponent))
            .ok_or(OracleError::InvalidPrice(self.feed_id))?;
        Ok(PriceRecord {
            feed_id: self.feed_id,
            price,
            confidence,
            publish_time: self.publish_time,
        })
    }
}

fn scale(mantissa: i64, exponent: i32) -> Option<Decimal> {
    if exponent <= 0 {
        Decimal::try_new(mantissa, exponent.unsigned_abs()).ok()
    } else {
        let factor = Decimal::from(10u64.checked_pow(exponent.unsigned_abs())?);
        Decimal::from(mantissa).checked_mul(factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub feed_id: FeedId,
    pub price: Price,
    pub confidence: Decimal,
    pub publish_time: Timestamp,
}

/// How old a price may be. Liquidations read with `Strict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StalenessTolerance {
    Default,
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessConfig {
    pub default_max_age_secs: i64,
    pub strict_max_age_secs: i64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            default_max_age_secs: 60,
            strict_max_age_secs: 5,
        }
    }
}

impl StalenessConfig {
    pub fn max_age(&self, tolerance: StalenessTolerance) -> i64 {
        match tolerance {
            StalenessTolerance::Default => self.default_max_age_secs,
            StalenessTolerance::Strict => self.strict_max_age_secs,
        }
    }
}

/// Newest decoded price per feed.
#[derive(Debug, Clone, Default)]
pub struct OracleStore {
    prices: BTreeMap<FeedId, PriceRecord>,
    staleness: StalenessConfig,
}

impl OracleStore {
    pub fn new(staleness: StalenessConfig) -> Self {
        Self {
            prices: BTreeMap::new(),
            staleness,
        }
    }

    pub fn set_staleness(&mut self, staleness: StalenessConfig) {
        self.staleness = staleness;
    }

    /// Store an update unless a newer one is already held. Returns the decoded record either way.
    pub fn update(&mut self, data: &PriceUpdateData) -> Result<PriceRecord, OracleError> {
        let record = data.decode()?;
        self.insert(record);
        Ok(record)
    }

    // keeps the newest record per feed; returns whether this one was stored
    pub fn insert(&mut self, record: PriceRecord) -> bool {
        let newer = self
            .prices
            .get(&record.feed_id)
            .map_or(true, |held| record.publish_time >= held.publish_time);
        if newer {
            tracing::debug!(feed = record.feed_id.0, price = %record.price, publish_time = %record.publish_time, "price updated");
            self.prices.insert(record.feed_id, record);
        }
        newer
    }

    pub fn latest(&self, feed_id: FeedId) -> Option<&PriceRecord> {
        self.prices.get(&feed_id)
    }

    pub fn price(
        &self,
        feed_id: FeedId,
        tolerance: StalenessTolerance,
        now: Timestamp,
    ) -> Result<PriceRecord, OracleError> {
        let record = self.prices.get(&feed_id).ok_or(OracleError::PriceNotFound(feed_id))?;
        let max_age = self.staleness.max_age(tolerance);
        if now.elapsed_since(record.publish_time) > max_age {
            return Err(OracleError::StalePrice {
                feed_id,
                publish_time: record.publish_time,
                now,
                max_age,
            });
        }
        Ok(*record)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("No price for feed {0:?}")]
    PriceNotFound(FeedId),

    #[error("Stale price for feed {feed_id:?}: published {publish_time}, now {now}, max age {max_age}s")]
    StalePrice {
        feed_id: FeedId,
        publish_time: Timestamp,
        now: Timestamp,
        max_age: i64,
    },

    #[error("Invalid price for feed {0:?}")]
    InvalidPrice(FeedId),

    #[error("Price data for feed {got:?}, expected {expected:?}")]
    FeedMismatch { expected: FeedId, got: FeedId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn update(price: i64, exponent: i32, publish_time: i64) -> PriceUpdateData {
        PriceUpdateData {
            feed_id: FeedId(1),
            price,
            confidence: 50,
            exponent,
            publish_time: Timestamp::from_secs(publish_time),
        }
    }

    #[test]
    fn decodes_mantissa_and_exponent() {
        let record = update(200_012_345_678, -8, 0).decode().unwrap();
        assert_eq!(record.price.value(), dec!(2000.12345678));
        assert_eq!(record.confidence, dec!(0.0000005));

        let record = update(3, 2, 0).decode().unwrap();
        assert_eq!(record.price.value(), dec!(300));
    }

    #[test]
    fn rejects_non_positive_prices() {
        assert_eq!(update(0, -8, 0).decode(), Err(OracleError::InvalidPrice(FeedId(1))));
        assert_eq!(update(-5, 0, 0).decode(), Err(OracleError::InvalidPrice(FeedId(1))));
    }

    #[test]
    fn keeps_newest_update() {
        let mut store = OracleStore::new(StalenessConfig::default());
        store.update(&update(10, 0, 100)).unwrap();
        store.update(&update(9, 0, 90)).unwrap();
        assert_eq!(store.latest(FeedId(1)).unwrap().price.value(), dec!(10));
        store.update(&update(11, 0, 101)).unwrap();
        assert_eq!(store.latest(FeedId(1)).unwrap().price.value(), dec!(11));
    }

    #[test]
    fn strict_tolerance_is_tighter() {
        let mut store = OracleStore::new(StalenessConfig {
            default_max_age_secs: 60,
            strict_max_age_secs: 5,
        });
        store.update(&update(10, 0, 100)).unwrap();
        let now = Timestamp::from_secs(110);
        assert!(store.price(FeedId(1), StalenessTolerance::Default, now).is_ok());
        assert!(matches!(
            store.price(FeedId(1), StalenessTolerance::Strict, now),
            Err(OracleError::StalePrice { .. })
        ));
        assert_eq!(
            store.price(FeedId(2), StalenessTolerance::Default, now),
            Err(OracleError::PriceNotFound(FeedId(2)))
        );
    }
}
