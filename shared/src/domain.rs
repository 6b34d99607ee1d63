use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CURRENCY: &str = "ETB";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Cancelled
        )
    }

    /// Maps a Chapa transaction status onto ours. Unknown values stay pending.
    pub fn from_chapa(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "success" => PaymentStatus::Completed,
            "failed" => PaymentStatus::Failed,
            "cancelled" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Bank,
    MobileMoney,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Bank => "bank",
            PaymentMethod::MobileMoney => "mobile_money",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown value '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(PaymentMethod::Card),
            "bank" => Ok(PaymentMethod::Bank),
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Number of nights in a stay, `None` unless `end` is after `start`.
pub fn nights_between(start: NaiveDate, end: NaiveDate) -> Option<i64> {
    let nights = (end - start).num_days();
    (nights > 0).then_some(nights)
}

pub fn booking_total(price_per_night: &BigDecimal, start: NaiveDate, end: NaiveDate) -> Option<BigDecimal> {
    nights_between(start, end).map(|nights| price_per_night * BigDecimal::from(nights))
}

/// Splits "Jane van Dyke" into ("Jane", "van Dyke").
pub fn split_customer_name(name: &str) -> (String, String) {
    let mut parts = name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

pub fn customer_display_name(first_name: &str, last_name: &str, username: &str) -> String {
    let full = format!("{} {}", first_name, last_name);
    let full = full.trim();
    if full.is_empty() {
        username.to_string()
    } else {
        full.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn chapa_statuses_map_onto_payment_statuses() {
        assert_eq!(PaymentStatus::from_chapa("success"), PaymentStatus::Completed);
        assert_eq!(PaymentStatus::from_chapa("SUCCESS"), PaymentStatus::Completed);
        assert_eq!(PaymentStatus::from_chapa("pending"), PaymentStatus::Pending);
        assert_eq!(PaymentStatus::from_chapa("failed"), PaymentStatus::Failed);
        assert_eq!(PaymentStatus::from_chapa("cancelled"), PaymentStatus::Cancelled);
        assert_eq!(PaymentStatus::from_chapa("refunded"), PaymentStatus::Pending);
        assert_eq!(PaymentStatus::from_chapa(""), PaymentStatus::Pending);
    }

    #[test]
    fn status_strings_round_trip_through_db_representation() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>(), Ok(status));
        }
        assert!("refunded".parse::<PaymentStatus>().is_err());
        assert_eq!("mobile_money".parse::<PaymentMethod>(), Ok(PaymentMethod::MobileMoney));
    }

    #[test]
    fn total_is_price_times_nights() {
        let price: BigDecimal = "120.50".parse().unwrap();
        let total = booking_total(&price, date(2024, 7, 1), date(2024, 7, 4)).unwrap();
        assert_eq!(total, "361.50".parse::<BigDecimal>().unwrap());
    }

    #[test]
    fn empty_or_inverted_stays_have_no_total() {
        let price: BigDecimal = "80".parse().unwrap();
        assert_eq!(nights_between(date(2024, 7, 4), date(2024, 7, 4)), None);
        assert!(booking_total(&price, date(2024, 7, 5), date(2024, 7, 4)).is_none());
    }

    #[test]
    fn customer_names_split_on_first_word() {
        assert_eq!(split_customer_name("Jane van  Dyke"), ("Jane".into(), "van Dyke".into()));
        assert_eq!(split_customer_name("Abebe"), ("Abebe".into(), String::new()));
        assert_eq!(split_customer_name("   "), (String::new(), String::new()));
    }

    #[test]
    fn display_name_falls_back_to_username() {
        assert_eq!(customer_display_name("Test", "User", "tester"), "Test User");
        assert_eq!(customer_display_name("", "", "tester"), "tester");
        assert_eq!(customer_display_name("Solo", "", "tester"), "Solo");
    }
}
