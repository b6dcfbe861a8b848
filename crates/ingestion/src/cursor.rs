//! Ingestion cursor.
//!
//! Tracks how much of the cumulative history has been committed and
//! fingerprints that prefix so a re-delivered batch can be checked before
//! its delta is computed.

use quote_core::{Error, PrefixCheck, QuoteRecord, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const DIGEST_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Fingerprint of a single record.
pub fn fingerprint(record: &QuoteRecord) -> u64 {
    let mut hasher = DefaultHasher::new();
    record.hash(&mut hasher);
    hasher.finish()
}

#[inline]
fn chain(digest: u64, record: &QuoteRecord) -> u64 {
    let mut hasher = DefaultHasher::new();
    digest.hash(&mut hasher);
    record.hash(&mut hasher);
    hasher.finish()
}

/// Order-sensitive fingerprint of a run of records.
pub fn prefix_digest(records: &[QuoteRecord]) -> u64 {
    records.iter().fold(DIGEST_SEED, chain)
}

/// Count of committed records plus fingerprints of what they were.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionCursor {
    committed: usize,
    digest: u64,
    last: Option<u64>,
}

impl IngestionCursor {
    /// Create a cursor at zero.
    pub fn new() -> Self {
        Self {
            committed: 0,
            digest: DIGEST_SEED,
            last: None,
        }
    }

    /// Number of committed records.
    #[inline]
    pub fn position(&self) -> usize {
        self.committed
    }

    /// Check that `batch` extends the committed history.
    pub fn check(&self, batch: &[QuoteRecord], mode: PrefixCheck) -> Result<()> {
        if batch.len() < self.committed {
            return Err(Error::BatchRegressed {
                committed: self.committed,
                received: batch.len(),
            });
        }
        if self.committed == 0 {
            return Ok(());
        }

        let consistent = match mode {
            PrefixCheck::Full => prefix_digest(&batch[..self.committed]) == self.digest,
            PrefixCheck::Tail => Some(fingerprint(&batch[self.committed - 1])) == self.last,
            PrefixCheck::LengthOnly => true,
        };

        if consistent {
            Ok(())
        } else {
            Err(Error::PrefixMismatch {
                committed: self.committed,
            })
        }
    }

    /// Suffix of `batch` not yet committed.
    pub fn delta<'a>(&self, batch: &'a [QuoteRecord]) -> &'a [QuoteRecord] {
        batch.get(self.committed..).unwrap_or(&[])
    }

    /// Record `delta` as committed.
    pub fn advance(&mut self, delta: &[QuoteRecord]) {
        for record in delta {
            self.digest = chain(self.digest, record);
        }
        if let Some(record) = delta.last() {
            self.last = Some(fingerprint(record));
        }
        self.committed += delta.len();
    }

    /// Return to zero.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for IngestionCursor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use quote_core::PriceLevel;

    fn quote(stock: &str, secs: i64, ask: f64) -> QuoteRecord {
        QuoteRecord::new(stock, Utc.timestamp_opt(secs, 0).unwrap()).with_ask(PriceLevel::at(ask))
    }

    fn history() -> Vec<QuoteRecord> {
        vec![
            quote("ABC", 1, 100.0),
            quote("DEF", 1, 120.0),
            quote("ABC", 2, 100.5),
        ]
    }

    #[test]
    fn test_delta_from_zero() {
        let cursor = IngestionCursor::new();
        let batch = history();
        assert!(cursor.check(&batch, PrefixCheck::Full).is_ok());
        assert_eq!(cursor.delta(&batch).len(), 3);
    }

    #[test]
    fn test_advance_and_delta() {
        let batch = history();
        let mut cursor = IngestionCursor::new();
        cursor.advance(&batch[..2]);

        assert_eq!(cursor.position(), 2);
        assert!(cursor.check(&batch, PrefixCheck::Full).is_ok());
        assert_eq!(cursor.delta(&batch), &batch[2..]);
    }

    #[test]
    fn test_digest_matches_incremental_advance() {
        let batch = history();
        let mut cursor = IngestionCursor::new();
        cursor.advance(&batch[..1]);
        cursor.advance(&batch[1..]);
        assert_eq!(cursor.digest, prefix_digest(&batch));
    }

    #[test]
    fn test_regressed_batch() {
        let batch = history();
        let mut cursor = IngestionCursor::new();
        cursor.advance(&batch);

        let err = cursor.check(&batch[..1], PrefixCheck::LengthOnly).unwrap_err();
        assert!(matches!(
            err,
            Error::BatchRegressed {
                committed: 3,
                received: 1
            }
        ));
    }

    #[test]
    fn test_rewritten_prefix_full_check() {
        let batch = history();
        let mut cursor = IngestionCursor::new();
        cursor.advance(&batch[..2]);

        let mut rewritten = batch.clone();
        rewritten[0] = quote("ABC", 1, 99.0);

        assert!(matches!(
            cursor.check(&rewritten, PrefixCheck::Full),
            Err(Error::PrefixMismatch { committed: 2 })
        ));
        // The tail record is untouched, so the cheaper checks let it through.
        assert!(cursor.check(&rewritten, PrefixCheck::Tail).is_ok());
        assert!(cursor.check(&rewritten, PrefixCheck::LengthOnly).is_ok());
    }

    #[test]
    fn test_rewritten_tail() {
        let batch = history();
        let mut cursor = IngestionCursor::new();
        cursor.advance(&batch[..2]);

        let mut rewritten = batch.clone();
        rewritten[1] = quote("DEF", 1, 121.0);

        assert!(cursor.check(&rewritten, PrefixCheck::Tail).is_err());
        assert!(cursor.check(&rewritten, PrefixCheck::Full).is_err());
    }

    #[test]
    fn test_reordered_prefix() {
        let batch = history();
        let mut cursor = IngestionCursor::new();
        cursor.advance(&batch[..2]);

        let mut swapped = batch.clone();
        swapped.swap(0, 1);
        assert!(cursor.check(&swapped, PrefixCheck::Full).is_err());
    }

    #[test]
    fn test_reset() {
        let mut cursor = IngestionCursor::new();
        cursor.advance(&history());
        cursor.reset();
        assert_eq!(cursor, IngestionCursor::new());
    }
}
