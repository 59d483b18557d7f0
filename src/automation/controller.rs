//! Start/stop/exit control of the background purchase worker.
//!
//! The controller is `Idle` until `start()`, `Running` while a worker thread
//! loops, and `Exiting` once `exit()` has been called. Shared state is split
//! across small locks (run flags, params, anchor, last outcome) that are only
//! held for field reads and writes; the marketplace has its own lock that the
//! worker holds for the length of an iteration.
//!
//! A worker only lives for one running session and exits when it sees the
//! running flag cleared, which also discards its loop-local state.
//!
//! Every worker carries the session number it was started with and stops as
//! soon as that session is no longer current, so a worker detached after a
//! join timeout cannot keep trading.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::automation::config::{RelativePoint, ThresholdProfile};
use crate::automation::decision::{Action, LoopParams, PriceReading};
use crate::automation::input::CursorProbe;
use crate::automation::market::Marketplace;
use crate::automation::runner::{IterationOutcome, PurchaseLoop};
use crate::error::Result;

/// How long `stop()` waits for the worker before detaching it.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerState {
    Idle,
    Running,
    Exiting,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Idle => write!(f, "Idle"),
            ControllerState::Running => write!(f, "Running"),
            ControllerState::Exiting => write!(f, "Exiting"),
        }
    }
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, Serialize)]
pub struct BotStatus {
    pub state: ControllerState,
    pub running: bool,
    pub params: LoopParams,
    pub anchor: Option<RelativePoint>,
    pub last_price: Option<PriceReading>,
    pub last_action: Option<Action>,
    pub iterations: u64,
    /// Purchases backed out of because the confirmation dialog quoted too much
    pub cancelled_purchases: u64,
}

#[derive(Debug, Default)]
struct RunFlags {
    running: bool,
    session: u64,
    exit_requested: bool,
}

#[derive(Debug, Default)]
struct LastOutcome {
    price: Option<PriceReading>,
    action: Option<Action>,
    iterations: u64,
    cancelled: u64,
}

struct Shared {
    run: Mutex<RunFlags>,
    params: Mutex<LoopParams>,
    anchor: Mutex<Option<RelativePoint>>,
    last: Mutex<LastOutcome>,
}

impl Shared {
    fn is_current(&self, session: u64) -> bool {
        let run = self.run.lock();
        run.running && run.session == session
    }

    /// Clears the running flag if `session` still owns it.
    fn mark_stopped(&self, session: u64) {
        let mut run = self.run.lock();
        if run.session == session {
            run.running = false;
        }
    }

    fn publish(&self, outcome: &IterationOutcome) {
        let mut last = self.last.lock();
        last.iterations += 1;
        if outcome.reading.is_some() {
            last.price = outcome.reading;
        }
        last.action = outcome.action;
        if outcome.cancelled {
            last.cancelled += 1;
        }
    }
}

type SharedMarket = Arc<Mutex<Box<dyn Marketplace>>>;

/// Handle owned by the foreground thread.
pub struct Controller {
    shared: Arc<Shared>,
    market: SharedMarket,
    cursor: Box<dyn CursorProbe>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Controller {
    pub fn new(
        market: Box<dyn Marketplace>,
        cursor: Box<dyn CursorProbe>,
        params: LoopParams,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                run: Mutex::new(RunFlags::default()),
                params: Mutex::new(params),
                anchor: Mutex::new(None),
                last: Mutex::new(LastOutcome::default()),
            }),
            market: Arc::new(Mutex::new(market)),
            cursor,
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ControllerState {
        let run = self.shared.run.lock();
        if run.exit_requested {
            ControllerState::Exiting
        } else if run.running {
            ControllerState::Running
        } else {
            ControllerState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.run.lock().running
    }

    /// Starts a worker. Returns `false` (and does nothing) when already
    /// running or after `exit()`.
    pub fn start(&self) -> bool {
        {
            let run = self.shared.run.lock();
            if run.exit_requested {
                warn!("Start ignored: controller is exiting");
                return false;
            }
            if run.running {
                warn!("Start ignored: already running");
                return false;
            }
        }

        // A worker that stopped itself (key-card purchase, panic) may still
        // be winding down.
        self.join_worker();

        let session = {
            let mut run = self.shared.run.lock();
            if run.exit_requested || run.running {
                return false;
            }
            run.running = true;
            run.session += 1;
            run.session
        };

        let shared = Arc::clone(&self.shared);
        let market = Arc::clone(&self.market);
        let spawned = thread::Builder::new()
            .name(format!("purchase-worker-{}", session))
            .spawn(move || worker_main(shared, market, session));

        match spawned {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                info!("Bot started (session {})", session);
                true
            }
            Err(e) => {
                error!("Failed to spawn worker thread: {}", e);
                self.shared.mark_stopped(session);
                false
            }
        }
    }

    /// Clears the running flag and waits up to `JOIN_TIMEOUT` for the worker.
    pub fn stop(&self) {
        {
            let mut run = self.shared.run.lock();
            if !run.running {
                warn!("Stop ignored: not running");
                return;
            }
            run.running = false;
        }
        self.join_worker();
        info!("Bot stopped");
    }

    /// Stops the worker if needed and makes the controller terminal.
    pub fn exit(&self) {
        let was_running = {
            let mut run = self.shared.run.lock();
            run.exit_requested = true;
            std::mem::replace(&mut run.running, false)
        };
        if was_running {
            info!("Stopping worker before exit");
        }
        self.join_worker();
        info!("Controller exiting");
    }

    pub fn update_params(
        &self,
        ideal_price: u64,
        unacceptable_price: u64,
        convertible: bool,
        key_mode: bool,
        half_coin_mode: bool,
        loop_gap_ms: u64,
    ) {
        let mut params = self.shared.params.lock();
        params.ideal_price = ideal_price;
        params.unacceptable_price = unacceptable_price;
        params.convertible = convertible;
        params.key_mode = key_mode;
        params.half_coin_mode = half_coin_mode;
        params.loop_gap_ms = loop_gap_ms;
    }

    pub fn apply_profile(&self, profile: &ThresholdProfile) {
        *self.shared.params.lock() = LoopParams::from(profile);
        info!("Applied profile '{}'", profile.name);
    }

    pub fn params(&self) -> LoopParams {
        *self.shared.params.lock()
    }

    /// Stores the current cursor position as the item anchor.
    pub fn record_anchor_position(&self) -> Result<RelativePoint> {
        let point = self.cursor.cursor_position()?;
        *self.shared.anchor.lock() = Some(point);
        info!("Anchor recorded at ({:.4}, {:.4})", point.x, point.y);
        Ok(point)
    }

    pub fn anchor(&self) -> Option<RelativePoint> {
        *self.shared.anchor.lock()
    }

    pub fn status(&self) -> BotStatus {
        let state = self.state();
        let running = self.is_running();
        let params = self.params();
        let anchor = self.anchor();
        let last = self.shared.last.lock();
        BotStatus {
            state,
            running,
            params,
            anchor,
            last_price: last.price,
            last_action: last.action,
            iterations: last.iterations,
            cancelled_purchases: last.cancelled,
        }
    }

    fn join_worker(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        let deadline = Instant::now() + JOIN_TIMEOUT;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "Worker did not finish within {:?}, detaching it",
                    JOIN_TIMEOUT
                );
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        if handle.join().is_err() {
            error!("Worker thread panicked");
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shared.run.lock().running = false;
        self.join_worker();
    }
}

fn worker_main(shared: Arc<Shared>, market: SharedMarket, session: u64) {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        run_session(&shared, &market, session)
    }));
    if let Err(panic) = result {
        let msg = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!("Purchase worker crashed: {}", msg);
    }
    shared.mark_stopped(session);
}

fn run_session(shared: &Shared, market: &Mutex<Box<dyn Marketplace>>, session: u64) {
    let mut purchase = PurchaseLoop::new();

    while shared.is_current(session) {
        let params = *shared.params.lock();
        let anchor = *shared.anchor.lock();

        let outcome = {
            let mut market = market.lock();
            if !shared.is_current(session) {
                break;
            }
            purchase.run_iteration(market.as_mut(), &params, anchor)
        };
        shared.publish(&outcome);

        if outcome.stop {
            info!("Single purchase complete, stopping");
            shared.mark_stopped(session);
            break;
        }

        // Not interruptible; stop() is seen at the top of the next iteration
        thread::sleep(Duration::from_millis(params.loop_gap_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::market::testing::{Call, ScriptedMarket};
    use crate::error::BotError;

    struct FixedCursor(Option<RelativePoint>);

    impl CursorProbe for FixedCursor {
        fn cursor_position(&self) -> Result<RelativePoint> {
            self.0
                .ok_or_else(|| BotError::Input("no cursor".to_string()))
        }
    }

    fn fast_params() -> LoopParams {
        LoopParams {
            ideal_price: 500,
            unacceptable_price: 600,
            volume: 1,
            screenshot_delay_ms: 0,
            loop_gap_ms: 5,
            convertible: false,
            key_mode: false,
            half_coin_mode: false,
        }
    }

    fn controller(market: ScriptedMarket, params: LoopParams) -> Controller {
        Controller::new(Box::new(market), Box::new(FixedCursor(None)), params)
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_start_then_stop_joins_worker() {
        let c = controller(ScriptedMarket::with_prices(&[], 700), fast_params());
        assert_eq!(c.state(), ControllerState::Idle);

        assert!(c.start());
        assert_eq!(c.state(), ControllerState::Running);
        assert!(wait_until(|| c.status().iterations > 0));

        let begun = Instant::now();
        c.stop();
        assert!(begun.elapsed() < JOIN_TIMEOUT);
        assert!(!c.is_running());
        assert_eq!(c.state(), ControllerState::Idle);
        assert!(c.worker.lock().is_none());
        assert_eq!(c.status().last_action, Some(Action::FreeRefresh));
    }

    #[test]
    fn test_double_start_and_stop_are_noops() {
        let c = controller(ScriptedMarket::with_prices(&[], 700), fast_params());
        c.stop();
        assert!(c.start());
        assert!(!c.start());
        c.stop();
        c.stop();
        assert!(!c.is_running());
    }

    #[test]
    fn test_key_mode_stops_after_purchase() {
        let market = ScriptedMarket::with_prices(&[Some(520), Some(530)], 490);
        let calls = market.calls.clone();
        let params = LoopParams {
            key_mode: true,
            ..fast_params()
        };
        let c = controller(market, params);

        assert!(c.start());
        assert!(wait_until(|| !c.is_running()));

        let calls = calls.lock().clone();
        let buys = calls.iter().filter(|c| **c == Call::BuyOnce).count();
        assert_eq!(buys, 1);
        // nothing after the purchase but the dialog check
        assert_eq!(&calls[calls.len() - 2..], &[Call::BuyOnce, Call::ReadWarning]);
        let status = c.status();
        assert_eq!(status.state, ControllerState::Idle);
        assert_eq!(status.last_action, Some(Action::BuyOnce));
        assert_eq!(status.iterations, 3);

        // Startable again after a one-shot stop
        assert!(c.start());
        c.stop();
    }

    #[test]
    fn test_exit_is_terminal() {
        let c = controller(ScriptedMarket::with_prices(&[], 700), fast_params());
        assert!(c.start());
        c.exit();
        assert!(!c.is_running());
        assert_eq!(c.state(), ControllerState::Exiting);
        assert!(!c.start());
        assert_eq!(c.state(), ControllerState::Exiting);
    }

    #[test]
    fn test_worker_panic_marks_stopped() {
        let mut market = ScriptedMarket::with_prices(&[], 700);
        market.panic_on_read = true;
        let c = controller(market, fast_params());

        assert!(c.start());
        assert!(wait_until(|| !c.is_running()));
        assert_eq!(c.state(), ControllerState::Idle);
    }

    #[test]
    fn test_update_params_is_atomic() {
        let c = Arc::new(controller(ScriptedMarket::default(), fast_params()));

        let writer = {
            let c = Arc::clone(&c);
            thread::spawn(move || {
                for i in 0..2_000u64 {
                    c.update_params(i, i + 100, i % 2 == 0, false, i % 2 == 0, i);
                }
            })
        };
        for _ in 0..2_000 {
            let p = c.params();
            assert_eq!(p.unacceptable_price, p.ideal_price + 100);
            assert_eq!(p.convertible, p.half_coin_mode);
            if p.ideal_price != 500 {
                assert_eq!(p.loop_gap_ms, p.ideal_price);
            }
        }
        writer.join().unwrap();

        let p = c.params();
        assert_eq!(p.ideal_price, 1_999);
        assert_eq!(p.unacceptable_price, 2_099);
        assert_eq!(p.volume, 1);
    }

    #[test]
    fn test_apply_profile_replaces_params() {
        let c = controller(ScriptedMarket::default(), fast_params());
        let mut profile = ThresholdProfile::new("keys", 90_000, 100_000);
        profile.key_mode = true;
        profile.volume = 5;

        c.apply_profile(&profile);

        let p = c.params();
        assert_eq!(p.ideal_price, 90_000);
        assert_eq!(p.volume, 5);
        assert!(p.key_mode);
    }

    #[test]
    fn test_record_anchor_position() {
        let point = RelativePoint { x: 0.25, y: 0.75 };
        let c = Controller::new(
            Box::new(ScriptedMarket::default()),
            Box::new(FixedCursor(Some(point))),
            fast_params(),
        );
        assert_eq!(c.anchor(), None);
        assert_eq!(c.record_anchor_position().unwrap(), point);
        assert_eq!(c.status().anchor, Some(point));

        let failing = controller(ScriptedMarket::default(), fast_params());
        assert!(failing.record_anchor_position().is_err());
        assert_eq!(failing.anchor(), None);
    }

    #[test]
    fn test_cancelled_key_purchase_retries() {
        let mut market = ScriptedMarket::with_prices(&[Some(480)], 490);
        market.warnings = [560].into_iter().collect();
        let calls = market.calls.clone();
        let params = LoopParams {
            key_mode: true,
            ..fast_params()
        };
        let c = controller(market, params);

        assert!(c.start());
        assert!(wait_until(|| !c.is_running()));

        let buys = calls.lock().iter().filter(|c| **c == Call::BuyOnce).count();
        assert_eq!(buys, 2);
        let status = c.status();
        assert_eq!(status.iterations, 2);
        assert_eq!(status.cancelled_purchases, 1);
    }

    #[test]
    fn test_status_serializes() {
        let c = controller(ScriptedMarket::default(), fast_params());
        let json = serde_json::to_value(c.status()).unwrap();
        assert_eq!(json["state"], "Idle");
        assert_eq!(json["running"], false);
        assert_eq!(json["params"]["ideal_price"], 500);
        assert!(json["last_price"].is_null());
        assert_eq!(json["cancelled_purchases"], 0);
    }
}
