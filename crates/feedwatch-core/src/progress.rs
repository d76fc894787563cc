//! Per-cycle cursor progression: tracks the stored cursor a cycle started
//! from and the last key the sink confirmed, and refuses to move backward.

use crate::error::CursorError;
use crate::types::ItemKey;

/// Two-watermark progress for a single cycle.
///
/// `start` is the cursor read from the store; `confirmed` is the key of the
/// last item the sink acknowledged. Only `confirmed` is ever persisted, and
/// only when it is strictly ahead of `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryProgress {
    start: Option<ItemKey>,
    confirmed: Option<ItemKey>,
    delivered: usize,
}

impl DeliveryProgress {
    pub fn new(start: Option<ItemKey>) -> Self {
        Self {
            start,
            confirmed: None,
            delivered: 0,
        }
    }

    /// Highest key known to be delivered: the last confirmation, else the start.
    pub fn position(&self) -> Option<&ItemKey> {
        self.confirmed.as_ref().or(self.start.as_ref())
    }

    /// Record a sink acknowledgement for `key`.
    ///
    /// Returns `Err` if `key` does not move past the current position.
    pub fn confirm(&mut self, key: ItemKey) -> Result<(), CursorError> {
        if let Some(current) = self.position()
            && key <= *current
        {
            return Err(CursorError::NonMonotonic {
                current: current.clone(),
                attempted: key,
            });
        }
        self.confirmed = Some(key);
        self.delivered += 1;
        Ok(())
    }

    /// Record a baseline key without a delivery.
    pub fn baseline(&mut self, key: ItemKey) -> Result<(), CursorError> {
        self.skip(key)
    }

    /// Move past an item the sink refused for good, without counting it.
    pub fn skip(&mut self, key: ItemKey) -> Result<(), CursorError> {
        self.confirm(key)?;
        self.delivered -= 1;
        Ok(())
    }

    /// The key to persist, if the cycle moved past where it started.
    pub fn pending_save(&self) -> Option<&ItemKey> {
        self.confirmed.as_ref()
    }

    pub fn start(&self) -> Option<&ItemKey> {
        self.start.as_ref()
    }

    pub fn delivered(&self) -> usize {
        self.delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_nothing_pending() {
        let p = DeliveryProgress::new(Some(ItemKey::Seq(9)));
        assert_eq!(p.position(), Some(&ItemKey::Seq(9)));
        assert_eq!(p.pending_save(), None);
        assert_eq!(p.delivered(), 0);
    }

    #[test]
    fn confirm_advances_monotonically() {
        let mut p = DeliveryProgress::new(Some(ItemKey::Seq(9)));
        p.confirm(ItemKey::Seq(10)).expect("10 > 9");
        p.confirm(ItemKey::Seq(11)).expect("11 > 10");
        assert_eq!(p.pending_save(), Some(&ItemKey::Seq(11)));
        assert_eq!(p.delivered(), 2);
    }

    #[test]
    fn confirm_rejects_stale_key() {
        let mut p = DeliveryProgress::new(Some(ItemKey::Seq(9)));
        let err = p.confirm(ItemKey::Seq(9)).expect_err("equal is not progress");
        assert_eq!(
            err,
            CursorError::NonMonotonic {
                current: ItemKey::Seq(9),
                attempted: ItemKey::Seq(9),
            }
        );
        p.confirm(ItemKey::Seq(12)).expect("advance");
        assert!(p.confirm(ItemKey::Seq(11)).is_err());
        // Position unchanged after error
        assert_eq!(p.position(), Some(&ItemKey::Seq(12)));
        assert_eq!(p.delivered(), 1);
    }

    #[test]
    fn unset_start_accepts_any_first_key() {
        let mut p = DeliveryProgress::new(None);
        assert_eq!(p.position(), None);
        p.confirm(ItemKey::Seq(1)).expect("first key");
        assert_eq!(p.start(), None);
        assert_eq!(p.pending_save(), Some(&ItemKey::Seq(1)));
    }

    #[test]
    fn baseline_does_not_count_as_delivery() {
        let mut p = DeliveryProgress::new(None);
        p.baseline(ItemKey::Seq(9)).expect("baseline");
        assert_eq!(p.delivered(), 0);
        assert_eq!(p.pending_save(), Some(&ItemKey::Seq(9)));
    }

    #[test]
    fn skipped_item_moves_position_without_counting() {
        let mut p = DeliveryProgress::new(Some(ItemKey::Seq(9)));
        p.confirm(ItemKey::Seq(10)).expect("deliver");
        p.skip(ItemKey::Seq(11)).expect("skip");
        p.confirm(ItemKey::Seq(12)).expect("deliver");
        assert_eq!(p.delivered(), 2);
        assert_eq!(p.pending_save(), Some(&ItemKey::Seq(12)));
        assert!(p.skip(ItemKey::Seq(12)).is_err());
    }
}
