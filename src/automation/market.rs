//! Game-level marketplace operations built from capture, OCR and input.

use std::time::Duration;
use tracing::debug;

use crate::automation::config::{MarketLayout, RelativePoint, RelativeRect};
use crate::automation::input::{InputDriver, Key};
use crate::capture::ScreenCapture;
use crate::error::Result;
use crate::ocr::{read_number, TextRecognizer};

/// Everything the purchase loop does to the game.
pub trait Marketplace: Send {
    /// Click the item tile to open its purchase page.
    fn open_item(&mut self, anchor: RelativePoint) -> Result<()>;
    /// Read the displayed lowest (total) price.
    fn read_price(&mut self, convertible: bool) -> Result<u64>;
    /// Read the currency balance.
    fn read_balance(&mut self) -> Result<u64>;
    /// Back out of the item page and re-open it.
    fn free_refresh(&mut self, anchor: Option<RelativePoint>) -> Result<()>;
    /// Buy the default (small) quantity.
    fn pay_refresh(&mut self, convertible: bool) -> Result<()>;
    /// Buy the max quantity.
    fn buy(&mut self, convertible: bool) -> Result<()>;
    /// Buy a single non-convertible item.
    fn buy_once(&mut self) -> Result<()>;
    /// Read the unit price in the confirmation dialog a purchase may raise.
    fn read_warning_price(&mut self) -> Result<u64>;
    /// Accept that dialog.
    fn confirm_purchase(&mut self) -> Result<()>;
}

/// `Marketplace` on the real screen.
pub struct ScreenMarketplace {
    capture: Box<dyn ScreenCapture>,
    recognizer: Box<dyn TextRecognizer>,
    input: Box<dyn InputDriver>,
    layout: MarketLayout,
}

impl ScreenMarketplace {
    pub fn new(
        capture: Box<dyn ScreenCapture>,
        recognizer: Box<dyn TextRecognizer>,
        input: Box<dyn InputDriver>,
        layout: MarketLayout,
    ) -> Self {
        Self {
            capture,
            recognizer,
            input,
            layout,
        }
    }

    fn settle(&self) {
        std::thread::sleep(Duration::from_millis(self.layout.click_settle_ms));
    }

    fn click(&mut self, point: RelativePoint) -> Result<()> {
        self.input.click(point)?;
        self.settle();
        Ok(())
    }

    fn read_region(&mut self, region: RelativeRect) -> Result<u64> {
        let img = self.capture.capture(&region)?;
        read_number(self.recognizer.as_mut(), &img)
    }

    fn purchase_button(&self, convertible: bool) -> RelativePoint {
        if convertible {
            self.layout.convertible_purchase_button
        } else {
            self.layout.purchase_button
        }
    }
}

impl Marketplace for ScreenMarketplace {
    fn open_item(&mut self, anchor: RelativePoint) -> Result<()> {
        self.click(anchor)
    }

    fn read_price(&mut self, convertible: bool) -> Result<u64> {
        let region = if convertible {
            self.layout.convertible_price_region
        } else {
            self.layout.price_region
        };
        let price = self.read_region(region)?;
        debug!("Price region read: {}", price);
        Ok(price)
    }

    fn read_balance(&mut self) -> Result<u64> {
        let balance = self.read_region(self.layout.balance_region)?;
        debug!("Balance region read: {}", balance);
        Ok(balance)
    }

    fn free_refresh(&mut self, anchor: Option<RelativePoint>) -> Result<()> {
        self.input.press_key(Key::Escape)?;
        self.settle();
        if let Some(anchor) = anchor {
            self.input.move_to(anchor)?;
            self.click(anchor)?;
        }
        Ok(())
    }

    fn pay_refresh(&mut self, convertible: bool) -> Result<()> {
        let button = self.purchase_button(convertible);
        self.click(button)
    }

    fn buy(&mut self, convertible: bool) -> Result<()> {
        let max_button = self.layout.max_quantity_button;
        self.click(max_button)?;
        let button = self.purchase_button(convertible);
        self.click(button)
    }

    fn buy_once(&mut self) -> Result<()> {
        let button = self.purchase_button(false);
        self.click(button)
    }

    fn read_warning_price(&mut self) -> Result<u64> {
        let price = self.read_region(self.layout.warning_region)?;
        debug!("Warning region read: {}", price);
        Ok(price)
    }

    fn confirm_purchase(&mut self) -> Result<()> {
        let button = self.layout.warning_confirm_button;
        self.click(button)
    }
}
