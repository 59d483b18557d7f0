use regex::Regex;

use crate::error::{BotError, Result};

/// A price as displayed: digits, optionally grouped with `,` `.` or spaces.
const PRICE_PATTERN: &str = r"^\d+([,. ]+\d+)*$";

/// Parses the price from OCR spans.
///
/// The marketplace shows the price as the right-most text in the region, so
/// only the last span is considered. Thousands separators are stripped.
pub fn extract_price<S: AsRef<str>>(spans: &[S]) -> Result<u64> {
    let last = spans
        .last()
        .map(|s| s.as_ref().trim())
        .ok_or_else(|| BotError::Recognition("no text recognized".to_string()))?;

    let price_regex = Regex::new(PRICE_PATTERN)?;
    if !price_regex.is_match(last) {
        return Err(BotError::Recognition(format!("not a number: {:?}", last)));
    }

    let digits: String = last.chars().filter(|c| c.is_ascii_digit()).collect();
    digits
        .parse::<u64>()
        .map_err(|e| BotError::Recognition(format!("{:?}: {}", last, e)))
}
