//! Marketplace automation.
//!
//! This module provides:
//! - Threshold profiles and the screen layout (`config`)
//! - Input simulation at normalized screen coordinates
//! - Game-level marketplace operations over capture, OCR and input
//! - The price decision, the purchase loop, and its start/stop controller

pub mod config;
pub mod controller;
pub mod decision;
pub mod input;
pub mod market;
pub mod runner;

pub use config::{MarketLayout, ProfileSet, ProfileStore, RelativePoint, RelativeRect, ThresholdProfile};
pub use controller::{BotStatus, Controller, ControllerState};
pub use decision::{decide, Action, LoopParams, PriceReading};
pub use market::{Marketplace, ScreenMarketplace};
