//! Value Objects for the storefront

use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currency amounts are displayed and persisted at cent precision.
pub const CURRENCY_SCALE: u32 = 2;

/// Largest single amount accepted from a client. Sums and percentages of
/// amounts under this bound stay far inside the `Decimal` range.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Redeemable code string, normalised to trimmed upper case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromoCode(String);

impl PromoCode {
    pub const MAX_LEN: usize = 64;

    pub fn new(value: impl AsRef<str>) -> Result<Self, PromoCodeError> {
        let value = value.as_ref().trim().to_uppercase();
        if value.is_empty() { return Err(PromoCodeError::Empty); }
        if value.len() > Self::MAX_LEN { return Err(PromoCodeError::TooLong); }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(PromoCodeError::InvalidCharacters);
        }
        Ok(Self(value))
    }

    /// Random code of `prefix` followed by `len` upper-case alphanumerics.
    pub fn generate(prefix: &str, len: usize) -> Self {
        const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..len).map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char).collect();
        Self(format!("{}{}", prefix, suffix))
    }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for PromoCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PromoCodeError { Empty, TooLong, InvalidCharacters }
impl std::error::Error for PromoCodeError {}
impl fmt::Display for PromoCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Code is required"),
            Self::TooLong => write!(f, "Code is too long"),
            Self::InvalidCharacters => write!(f, "Code contains invalid characters"),
        }
    }
}

/// Phone number in `+` / digits form, separators stripped.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn new(value: impl AsRef<str>) -> Result<Self, PhoneNumberError> {
        let cleaned: String = value
            .as_ref()
            .chars()
            .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')' | '.'))
            .collect();
        let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(PhoneNumberError::Malformed);
        }
        if !(7..=15).contains(&digits.len()) { return Err(PhoneNumberError::Length); }
        Ok(Self(cleaned))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PhoneNumberError { Malformed, Length }
impl std::error::Error for PhoneNumberError {}
impl fmt::Display for PhoneNumberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "Phone number must contain only digits"),
            Self::Length => write!(f, "Phone number must have 7 to 15 digits"),
        }
    }
}

/// Percentage in the closed range 0..=100.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Percentage(Decimal);

impl Percentage {
    pub fn new(value: Decimal) -> Result<Self, PercentageError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED { return Err(PercentageError::OutOfRange); }
        Ok(Self(value))
    }
    /// Stored rows are range-checked by the schema; clamp anything that slips through.
    pub fn clamped(value: Decimal) -> Self { Self(value.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)) }
    pub fn value(&self) -> Decimal { self.0 }

    /// Share of `amount`, rounded to cents.
    pub fn of(&self, amount: Decimal) -> Decimal { round_currency(amount * self.0 / Decimal::ONE_HUNDRED) }

    /// Splits `subtotal` into the discount and what remains to pay.
    pub fn apply_to(&self, subtotal: Decimal) -> DiscountBreakdown {
        let subtotal = round_currency(subtotal);
        let discount_amount = self.of(subtotal);
        DiscountBreakdown { subtotal, discount_amount, total: subtotal - discount_amount }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PercentageError { OutOfRange }
impl std::error::Error for PercentageError {}
impl fmt::Display for PercentageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Percentage must be between 0 and 100") }
}

/// `discount_amount + total == subtotal` holds exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscountBreakdown {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_promo_code_normalised() {
        let code = PromoCode::new("  welcome-15 ").unwrap();
        assert_eq!(code.as_str(), "WELCOME-15");
        assert_eq!(PromoCode::new("   "), Err(PromoCodeError::Empty));
        assert_eq!(PromoCode::new("drop table;"), Err(PromoCodeError::InvalidCharacters));
    }

    #[test]
    fn test_generated_code_shape() {
        let code = PromoCode::generate("SMS10-", 6);
        let suffix = code.as_str().strip_prefix("SMS10-").unwrap();
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_phone_number() {
        assert_eq!(PhoneNumber::new("+1 (555) 010-9999").unwrap().as_str(), "+15550109999");
        assert_eq!(PhoneNumber::new("12ab45678"), Err(PhoneNumberError::Malformed));
        assert_eq!(PhoneNumber::new("12345"), Err(PhoneNumberError::Length));
    }

    #[test]
    fn test_fifteen_percent_of_hundred() {
        let b = Percentage::new(dec!(15)).unwrap().apply_to(dec!(100));
        assert_eq!(b.discount_amount, dec!(15.00));
        assert_eq!(b.total, dec!(85.00));
    }

    #[test]
    fn test_breakdown_sums_to_subtotal() {
        for (pct, subtotal) in [(dec!(10), dec!(19.99)), (dec!(12.5), dec!(33.33)), (dec!(33), dec!(0.05)), (dec!(100), dec!(7.01))] {
            let b = Percentage::new(pct).unwrap().apply_to(subtotal);
            assert_eq!(b.discount_amount + b.total, b.subtotal);
            assert_eq!(b.discount_amount, round_currency(b.discount_amount));
        }
    }

    #[test]
    fn test_full_discount_at_amount_limit() {
        let b = Percentage::new(dec!(100)).unwrap().apply_to(MAX_AMOUNT);
        assert_eq!(b.discount_amount, MAX_AMOUNT);
        assert_eq!(b.total, Decimal::ZERO);
    }

    #[test]
    fn test_percentage_range() {
        assert!(Percentage::new(dec!(-1)).is_err());
        assert!(Percentage::new(dec!(100.01)).is_err());
        assert!(Percentage::new(dec!(0)).is_ok());
    }
}
