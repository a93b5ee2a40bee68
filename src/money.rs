//! Money handling for order and sale totals.
//!
//! Form inputs arrive as free text. Parsing is deliberately lenient: anything
//! that does not start with a usable number reads as zero, matching how the
//! portal pages have always treated half-typed fields. All arithmetic happens
//! on `Decimal`; formatting to two places happens only at display time.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Default currency glyph shown in front of every amount.
pub const DEFAULT_CURRENCY_GLYPH: &str = "₹";

// ---------------------------------------------------------------------------
// Lenient parsing
// ---------------------------------------------------------------------------

/// Parse a quantity field.
///
/// Reads an optional sign followed by leading digits and ignores the rest
/// (`"12 crates"` -> 12, `"2.7"` -> 2). Empty, non-numeric, negative or
/// overflowing input yields `0`.
pub fn parse_quantity(raw: &str) -> u32 {
    let trimmed = raw.trim_start();
    let (negative, rest) = split_sign(trimmed);
    let digits: &str = leading(rest, |c| c.is_ascii_digit());
    if digits.is_empty() || negative {
        return 0;
    }
    digits.parse::<u32>().unwrap_or(0)
}

/// Parse an amount field (price or discount).
///
/// Reads an optional sign, leading digits and at most one decimal point
/// (`"12.5kg"` -> 12.5, `".5"` -> 0.5). Exponents are not recognised.
/// Malformed or negative input yields zero.
pub fn parse_amount(raw: &str) -> Decimal {
    let trimmed = raw.trim_start();
    let (negative, rest) = split_sign(trimmed);

    let mut seen_point = false;
    let end = rest
        .char_indices()
        .find(|&(_, c)| {
            if c == '.' && !seen_point {
                seen_point = true;
                false
            } else {
                !c.is_ascii_digit()
            }
        })
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    let number = &rest[..end];

    if negative || !number.chars().any(|c| c.is_ascii_digit()) {
        return Decimal::ZERO;
    }

    let normalized = if number.starts_with('.') {
        format!("0{number}")
    } else {
        number.trim_end_matches('.').to_string()
    };
    Decimal::from_str(&normalized).unwrap_or(Decimal::ZERO)
}

/// Parse a rendered price such as `"₹1,250.00"`.
///
/// Strips currency glyphs and thousands separators, then applies
/// [`parse_amount`].
pub fn parse_price_text(raw: &str) -> Decimal {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    parse_amount(&cleaned)
}

fn split_sign(s: &str) -> (bool, &str) {
    if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    }
}

fn leading(s: &str, pred: impl Fn(char) -> bool) -> &str {
    let end = s
        .char_indices()
        .find(|&(_, c)| !pred(c))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[..end]
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Round to `dp` places, midpoint away from zero.
pub fn round_to(amount: Decimal, dp: u32) -> Decimal {
    amount.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Currency display settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyFormat {
    pub glyph: String,
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self {
            glyph: DEFAULT_CURRENCY_GLYPH.to_string(),
        }
    }
}

impl CurrencyFormat {
    pub fn new(glyph: impl Into<String>) -> Self {
        Self {
            glyph: glyph.into(),
        }
    }

    /// `₹90.00` style display string.
    pub fn format(&self, amount: Decimal) -> String {
        format!("{}{}", self.glyph, plain(amount))
    }
}

/// Two-place number without glyph, for hidden form fields.
pub fn plain(amount: Decimal) -> String {
    format!("{:.2}", round_to(amount, 2))
}

/// One-place discount display used in the billed-items table.
pub fn format_discount(discount: Decimal) -> String {
    format!("{:.1}", round_to(discount, 1))
}
