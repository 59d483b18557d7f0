//! Price-threshold decisions.
//!
//! Pure functions: given a price reading and a parameter snapshot, pick the
//! marketplace action and the next restock estimate. The purchase loop feeds
//! the result back as the divisor of the balance-delta price heuristic.

use serde::{Deserialize, Serialize};

use crate::automation::config::ThresholdProfile;

/// Units assumed bought by a pay-refresh (one small lot).
pub const PAY_REFRESH_RESTOCK: u64 = 31;

/// Units assumed bought by a full purchase.
pub const BUY_RESTOCK: u64 = 200;

/// A price observed on screen: `total` covering `volume` units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceReading {
    pub total: u64,
    pub volume: u64,
}

impl PriceReading {
    /// A volume of 0 is read as 1.
    pub fn new(total: u64, volume: u64) -> Self {
        Self {
            total,
            volume: volume.max(1),
        }
    }

    /// Per-unit price, for display only.
    pub fn unit_price(&self) -> f64 {
        self.total as f64 / self.volume as f64
    }

    /// True when the per-unit price is strictly above `threshold`.
    ///
    /// Compared as `total > threshold * volume` so no precision is lost.
    pub fn exceeds(&self, threshold: u64) -> bool {
        (self.total as u128) > (threshold as u128) * (self.volume as u128)
    }
}

/// Snapshot of everything the loop reads from the active profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopParams {
    pub ideal_price: u64,
    pub unacceptable_price: u64,
    pub volume: u64,
    pub screenshot_delay_ms: u64,
    pub loop_gap_ms: u64,
    pub convertible: bool,
    pub key_mode: bool,
    pub half_coin_mode: bool,
}

impl From<&ThresholdProfile> for LoopParams {
    fn from(profile: &ThresholdProfile) -> Self {
        Self {
            ideal_price: profile.ideal_price,
            unacceptable_price: profile.unacceptable_price,
            volume: profile.volume,
            screenshot_delay_ms: profile.screenshot_delay_ms,
            loop_gap_ms: profile.loop_gap_ms,
            convertible: profile.convertible,
            key_mode: profile.key_mode,
            half_coin_mode: profile.half_coin_mode,
        }
    }
}

impl Default for LoopParams {
    fn default() -> Self {
        Self::from(&ThresholdProfile::default())
    }
}

/// What the loop does with a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Back out and re-open the item; costs nothing
    FreeRefresh,
    /// Buy a small lot, which also re-quotes the price
    PayRefresh,
    /// Buy at max quantity
    Buy,
    /// Key-card mode: buy a single item, then stop
    BuyOnce,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::FreeRefresh => write!(f, "free refresh"),
            Action::PayRefresh => write!(f, "pay refresh"),
            Action::Buy => write!(f, "buy"),
            Action::BuyOnce => write!(f, "buy once"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    /// New restock estimate; `None` leaves it unchanged
    pub buy_number: Option<u64>,
    /// The loop must stop after this action
    pub stop: bool,
}

/// Chooses the action for `price` under `params`.
///
/// `ideal_price <= unacceptable_price` is expected but not checked; when it
/// does not hold the branch order below still yields a deterministic answer.
pub fn decide(price: &PriceReading, params: &LoopParams) -> Decision {
    if params.key_mode {
        return if price.exceeds(params.ideal_price) {
            Decision {
                action: Action::FreeRefresh,
                buy_number: None,
                stop: false,
            }
        } else {
            Decision {
                action: Action::BuyOnce,
                buy_number: None,
                stop: true,
            }
        };
    }

    if price.exceeds(params.unacceptable_price) {
        Decision {
            action: Action::FreeRefresh,
            buy_number: Some(0),
            stop: false,
        }
    } else if price.exceeds(params.ideal_price) {
        Decision {
            action: Action::PayRefresh,
            buy_number: Some(PAY_REFRESH_RESTOCK),
            stop: false,
        }
    } else {
        Decision {
            action: Action::Buy,
            buy_number: Some(BUY_RESTOCK),
            stop: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(ideal: u64, unacceptable: u64) -> LoopParams {
        LoopParams {
            ideal_price: ideal,
            unacceptable_price: unacceptable,
            ..LoopParams::default()
        }
    }

    #[test]
    fn test_pay_refresh_between_thresholds() {
        let d = decide(&PriceReading::new(550, 1), &params(500, 600));
        assert_eq!(d.action, Action::PayRefresh);
        assert_eq!(d.buy_number, Some(31));
        assert!(!d.stop);
    }

    #[test]
    fn test_normal_mode_branches_over_price_range() {
        let p = params(500, 600);
        for price in 0..=800u64 {
            let d = decide(&PriceReading::new(price, 1), &p);
            let expected = if price > 600 {
                (Action::FreeRefresh, Some(0))
            } else if price > 500 {
                (Action::PayRefresh, Some(PAY_REFRESH_RESTOCK))
            } else {
                (Action::Buy, Some(BUY_RESTOCK))
            };
            assert_eq!((d.action, d.buy_number), expected, "price {}", price);
            assert!(!d.stop);
        }
    }

    #[test]
    fn test_thresholds_are_inclusive_for_buying() {
        let p = params(500, 600);
        assert_eq!(decide(&PriceReading::new(500, 1), &p).action, Action::Buy);
        assert_eq!(decide(&PriceReading::new(600, 1), &p).action, Action::PayRefresh);
        assert_eq!(decide(&PriceReading::new(601, 1), &p).action, Action::FreeRefresh);
    }

    #[test]
    fn test_key_mode_is_one_shot() {
        let p = LoopParams {
            key_mode: true,
            ..params(90_000, 100_000)
        };

        let above = decide(&PriceReading::new(95_000, 1), &p);
        assert_eq!(above.action, Action::FreeRefresh);
        assert_eq!(above.buy_number, None);
        assert!(!above.stop);

        let below = decide(&PriceReading::new(90_000, 1), &p);
        assert_eq!(below.action, Action::BuyOnce);
        assert_eq!(below.buy_number, None);
        assert!(below.stop);
    }

    #[test]
    fn test_volume_compares_average_exactly() {
        let p = params(500, 600);
        // 1001 / 2 = 500.5 is above the ideal price
        assert_eq!(decide(&PriceReading::new(1001, 2), &p).action, Action::PayRefresh);
        assert_eq!(decide(&PriceReading::new(1000, 2), &p).action, Action::Buy);
        assert_eq!(
            decide(&PriceReading::new(1_940_000, 3540), &p).action,
            Action::Buy
        );
    }

    #[test]
    fn test_zero_volume_reads_as_one() {
        let reading = PriceReading::new(550, 0);
        assert_eq!(reading.volume, 1);
        assert!((reading.unit_price() - 550.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_exceeds_does_not_overflow() {
        let reading = PriceReading::new(u64::MAX, u64::MAX);
        assert!(!reading.exceeds(1));
        assert!(PriceReading::new(u64::MAX, 1).exceeds(u64::MAX - 1));
    }

    #[test]
    fn test_params_from_profile() {
        let mut profile = ThresholdProfile::new("x", 1, 2);
        profile.half_coin_mode = true;
        profile.loop_gap_ms = 42;
        let p = LoopParams::from(&profile);
        assert_eq!(p.ideal_price, 1);
        assert_eq!(p.unacceptable_price, 2);
        assert_eq!(p.loop_gap_ms, 42);
        assert!(p.half_coin_mode);
    }
}
