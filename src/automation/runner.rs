//! Purchase loop: one iteration of capture → price → decision → action.
//!
//! The loop owns the state that only lives for one running session: whether
//! this is the first iteration, the restock estimate from the last action, and
//! the last balance read. The controller drops it when the session ends, so a
//! new session always starts fresh.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::automation::config::RelativePoint;
use crate::automation::decision::{decide, Action, LoopParams, PriceReading};
use crate::automation::market::Marketplace;
use crate::error::Result;

/// What one iteration did, published to the status snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IterationOutcome {
    pub reading: Option<PriceReading>,
    pub action: Option<Action>,
    /// The loop must stop (key-card purchase done)
    pub stop: bool,
    /// A confirmation dialog quoted a price over the threshold and the
    /// purchase was backed out of
    pub cancelled: bool,
}

/// Loop-local state of a running session.
#[derive(Debug)]
pub struct PurchaseLoop {
    first_loop: bool,
    buy_number: u64,
    previous_balance: Option<u64>,
}

impl Default for PurchaseLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl PurchaseLoop {
    pub fn new() -> Self {
        Self {
            first_loop: true,
            buy_number: 0,
            previous_balance: None,
        }
    }

    pub fn buy_number(&self) -> u64 {
        self.buy_number
    }

    pub fn previous_balance(&self) -> Option<u64> {
        self.previous_balance
    }

    pub fn is_first_loop(&self) -> bool {
        self.first_loop
    }

    /// Runs one iteration. Errors never escape: a recognition failure waits
    /// `loop_gap_ms` and free-refreshes, anything else is logged and skipped.
    /// Only a completed iteration clears the first-loop flag.
    pub fn run_iteration(
        &mut self,
        market: &mut dyn Marketplace,
        params: &LoopParams,
        anchor: Option<RelativePoint>,
    ) -> IterationOutcome {
        let mut outcome = IterationOutcome::default();

        match self.iterate(market, params, anchor, &mut outcome) {
            Ok(()) => self.first_loop = false,
            Err(e) if e.is_recognition_failure() => {
                warn!("Price unreadable ({}), refreshing", e);
                std::thread::sleep(Duration::from_millis(params.loop_gap_ms));
                match market.free_refresh(anchor) {
                    Ok(()) => outcome.action = Some(Action::FreeRefresh),
                    Err(e) => warn!("Free refresh after unreadable price failed: {}", e),
                }
            }
            Err(e) => {
                warn!("Iteration skipped: {}", e);
            }
        }
        outcome
    }

    fn iterate(
        &mut self,
        market: &mut dyn Marketplace,
        params: &LoopParams,
        anchor: Option<RelativePoint>,
        outcome: &mut IterationOutcome,
    ) -> Result<()> {
        if let Some(anchor) = anchor {
            market.open_item(anchor)?;
        }

        let reading = self.obtain_price(market, params)?;
        outcome.reading = Some(reading);

        let decision = decide(&reading, params);
        info!(
            "Price {} x{} ({:.1}/unit): {}",
            reading.total,
            reading.volume,
            reading.unit_price(),
            decision.action
        );

        match decision.action {
            Action::FreeRefresh => market.free_refresh(anchor)?,
            Action::PayRefresh => market.pay_refresh(params.convertible)?,
            Action::Buy => market.buy(params.convertible)?,
            Action::BuyOnce => market.buy_once()?,
        }
        outcome.action = Some(decision.action);

        let threshold = match decision.action {
            Action::FreeRefresh => None,
            Action::PayRefresh => Some(params.unacceptable_price),
            Action::Buy | Action::BuyOnce => Some(params.ideal_price),
        };
        if let Some(threshold) = threshold {
            if !self.check_warning(market, params, anchor, threshold)? {
                outcome.cancelled = true;
                self.buy_number = 0;
                return Ok(());
            }
        }

        outcome.stop = decision.stop;
        if let Some(buy_number) = decision.buy_number {
            self.buy_number = buy_number;
        }
        Ok(())
    }

    /// Handles the dialog a purchase click may raise when the price moved.
    /// Returns `false` when the quoted unit price is over `threshold` and the
    /// purchase was backed out of with a free refresh.
    fn check_warning(
        &mut self,
        market: &mut dyn Marketplace,
        params: &LoopParams,
        anchor: Option<RelativePoint>,
        threshold: u64,
    ) -> Result<bool> {
        std::thread::sleep(Duration::from_millis(params.screenshot_delay_ms));
        let quoted = match market.read_warning_price() {
            Ok(price) => price,
            Err(e) if e.is_recognition_failure() => {
                debug!("No confirmation dialog ({}), purchase probably went through", e);
                return Ok(true);
            }
            Err(e) => return Err(e),
        };

        if quoted > threshold {
            warn!(
                "Dialog quotes {} over threshold {}, cancelling purchase",
                quoted, threshold
            );
            market.free_refresh(anchor)?;
            return Ok(false);
        }

        info!("Dialog quotes {}, confirming purchase", quoted);
        market.confirm_purchase()?;
        Ok(true)
    }

    /// Price from the balance delta when half-coin mode can use it, otherwise
    /// a direct read of the price region.
    fn obtain_price(
        &mut self,
        market: &mut dyn Marketplace,
        params: &LoopParams,
    ) -> Result<PriceReading> {
        if params.half_coin_mode {
            if let Some(reading) = self.balance_delta_price(market) {
                return Ok(reading);
            }
        }

        std::thread::sleep(Duration::from_millis(params.screenshot_delay_ms));
        let total = market.read_price(params.convertible)?;
        Ok(PriceReading::new(total, params.volume))
    }

    fn balance_delta_price(&mut self, market: &mut dyn Marketplace) -> Option<PriceReading> {
        let balance = match market.read_balance() {
            Ok(balance) => balance,
            Err(e) => {
                debug!("Balance unreadable, falling back to price read: {}", e);
                // a stale balance would fold several purchases into one delta
                self.previous_balance = None;
                return None;
            }
        };
        let previous = self.previous_balance.replace(balance);

        if self.first_loop || self.buy_number == 0 {
            return None;
        }
        let previous = previous?;
        if previous <= balance {
            debug!(
                "Balance did not drop ({} -> {}), falling back to price read",
                previous, balance
            );
            return None;
        }
        Some(PriceReading::new(previous - balance, self.buy_number))
    }
}
