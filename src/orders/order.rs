use std::str::FromStr;

use chrono::NaiveDateTime;
use getset::{CopyGetters, Getters};
use rust_decimal::Decimal;

use super::ValidationError;

/// One persisted order. Records are immutable once created.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct Order {
    #[getset(get_copy = "pub")]
    timestamp: NaiveDateTime,
    #[getset(get = "pub")]
    customer_name: String,
    #[getset(get = "pub")]
    contact: String,
    #[getset(get = "pub")]
    order_details: String,
    #[getset(get_copy = "pub")]
    amount: Decimal,
}

impl Order {
    pub fn new(
        timestamp: NaiveDateTime,
        customer_name: impl Into<String>,
        contact: impl Into<String>,
        order_details: impl Into<String>,
        amount: Decimal,
    ) -> Order {
        Order {
            timestamp,
            customer_name: customer_name.into(),
            contact: contact.into(),
            order_details: order_details.into(),
            amount,
        }
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(super::TIMESTAMP_FORMAT).to_string()
    }
}

/// Raw form contents as typed by the user.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OrderForm {
    pub customer_name: String,
    pub contact: String,
    pub order_details: String,
    pub amount: String,
}

impl OrderForm {
    pub fn new(
        customer_name: impl Into<String>,
        contact: impl Into<String>,
        order_details: impl Into<String>,
        amount: impl Into<String>,
    ) -> OrderForm {
        OrderForm {
            customer_name: customer_name.into(),
            contact: contact.into(),
            order_details: order_details.into(),
            amount: amount.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        [&self.customer_name, &self.contact, &self.order_details, &self.amount]
            .iter()
            .all(|field| field.trim().is_empty())
    }

    /// Checks every field and parses the amount. Surrounding whitespace is
    /// dropped, inner newlines of the details are kept.
    pub fn validate(&self) -> Result<ValidatedForm, ValidationError> {
        let customer_name = required(&self.customer_name, ValidationError::MissingCustomerName)?;
        let contact = required(&self.contact, ValidationError::MissingContact)?;
        let order_details = required(&self.order_details, ValidationError::MissingOrderDetails)?;
        let amount = required(&self.amount, ValidationError::MissingAmount)?;

        Ok(ValidatedForm {
            customer_name,
            contact,
            order_details,
            amount: parse_amount(&amount)?,
        })
    }
}

/// A form that passed validation and only lacks its save-time timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedForm {
    customer_name: String,
    contact: String,
    order_details: String,
    amount: Decimal,
}

impl ValidatedForm {
    pub fn stamp(self, timestamp: NaiveDateTime) -> Order {
        Order {
            timestamp,
            customer_name: self.customer_name,
            contact: self.contact,
            order_details: self.order_details,
            amount: self.amount,
        }
    }
}

fn required(value: &str, missing: ValidationError) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(missing);
    }

    Ok(value.to_string())
}

/// Accepts plain decimals ("12.50") and scientific notation ("1.5e3").
/// NaN and infinities never parse into a `Decimal`. Finite numbers that
/// `Decimal` cannot hold (magnitude above ~7.9e28, or more than 28 decimal
/// places such as "1e-30") are reported as out of range.
pub fn parse_amount(value: &str) -> Result<Decimal, ValidationError> {
    let value = value.trim();
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|_| match value.parse::<f64>() {
            Ok(number) if number.is_finite() => ValidationError::AmountOutOfRange(value.to_string()),
            _ => ValidationError::InvalidAmount(value.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_validate_trims_fields_and_keeps_inner_newlines() -> Result<()> {
        let form = OrderForm::new("  Alice ", "alice@x.com", "2x widget\n1x gadget\n", " 19.99 ");
        let timestamp = NaiveDateTime::parse_from_str("2024-01-01 10:00:00", "%Y-%m-%d %H:%M:%S")?;
        let order = form.validate()?.stamp(timestamp);

        assert_eq!(order.customer_name(), "Alice");
        assert_eq!(order.order_details(), "2x widget\n1x gadget");
        assert_eq!(order.amount(), dec!(19.99));
        assert_eq!(order.formatted_timestamp(), "2024-01-01 10:00:00");

        Ok(())
    }

    #[test]
    fn test_validate_reports_first_missing_field() {
        let cases = [
            (OrderForm::new("", "c", "d", "1"), ValidationError::MissingCustomerName),
            (OrderForm::new("n", "   ", "d", "1"), ValidationError::MissingContact),
            (OrderForm::new("n", "c", "\n\n", "1"), ValidationError::MissingOrderDetails),
            (OrderForm::new("n", "c", "d", ""), ValidationError::MissingAmount),
        ];

        for (form, expected) in cases {
            assert_eq!(form.validate(), Err(expected));
        }
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("12.50"), Ok(dec!(12.50)));
        assert_eq!(parse_amount("12.50").map(|amount| amount.scale()), Ok(2));
        assert_eq!(parse_amount("-3"), Ok(dec!(-3)));
        assert_eq!(parse_amount("1.5e3"), Ok(dec!(1500)));
        assert_eq!(parse_amount("abc"), Err(ValidationError::InvalidAmount("abc".to_string())));
        assert_eq!(parse_amount("NaN"), Err(ValidationError::InvalidAmount("NaN".to_string())));
        assert_eq!(parse_amount("inf"), Err(ValidationError::InvalidAmount("inf".to_string())));
    }

    #[test]
    fn test_parse_amount_outside_decimal_range() {
        assert_eq!(parse_amount("1e30"), Err(ValidationError::AmountOutOfRange("1e30".to_string())));
        assert_eq!(parse_amount(" 1e-30 "), Err(ValidationError::AmountOutOfRange("1e-30".to_string())));
        assert!(parse_amount("1e28").is_ok());
    }

    #[test]
    fn test_is_blank() {
        assert!(OrderForm::default().is_blank());
        assert!(OrderForm::new(" ", "", "\n", "").is_blank());
        assert!(!OrderForm::new("", "", "", "1").is_blank());
    }
}
