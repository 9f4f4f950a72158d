use crate::alerts::types::{AlertDefinition, NewAlert};
use crate::errors::{NotifierError, Result};

pub struct Validator;

impl Validator {
    /// Validate a request to create an alert.
    pub fn validate_new_alert(alert: &NewAlert) -> Result<()> {
        if alert.user_id.trim().is_empty() || alert.symbol.trim().is_empty() {
            return Err(NotifierError::validation(
                "Missing required fields: user_id, symbol",
            ));
        }

        Self::validate_thresholds(alert.upper_threshold, alert.lower_threshold)
    }

    /// Validate a stored definition after an update has been merged into it.
    pub fn validate_definition(alert: &AlertDefinition) -> Result<()> {
        if alert.symbol.trim().is_empty() {
            return Err(NotifierError::validation("Symbol must not be empty"));
        }

        Self::validate_thresholds(alert.upper_threshold, alert.lower_threshold)
    }

    /// At least one threshold must be present and every present threshold
    /// must be a positive, finite price.
    pub fn validate_thresholds(upper: Option<f64>, lower: Option<f64>) -> Result<()> {
        if upper.is_none() && lower.is_none() {
            return Err(NotifierError::validation(
                "At least one threshold (upper or lower) must be specified",
            ));
        }

        for (name, value) in [("upper_threshold", upper), ("lower_threshold", lower)] {
            if let Some(price) = value {
                Self::validate_price(name, price)?;
            }
        }

        Ok(())
    }

    fn validate_price(name: &str, price: f64) -> Result<()> {
        if price.is_nan() || price.is_infinite() {
            return Err(NotifierError::validation(format!(
                "{} is not a valid number",
                name
            )));
        }

        if price <= 0.0 {
            return Err(NotifierError::validation(format!("{} must be positive", name)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(upper: Option<f64>, lower: Option<f64>) -> NewAlert {
        NewAlert {
            user_id: "U1".to_string(),
            symbol: "BTC-USD".to_string(),
            upper_threshold: upper,
            lower_threshold: lower,
        }
    }

    #[test]
    fn test_requires_a_threshold() {
        assert!(Validator::validate_new_alert(&request(None, None)).is_err());
        assert!(Validator::validate_new_alert(&request(Some(100_000.0), None)).is_ok());
        assert!(Validator::validate_new_alert(&request(None, Some(90_000.0))).is_ok());
    }

    #[test]
    fn test_rejects_bad_prices() {
        assert!(Validator::validate_new_alert(&request(Some(f64::NAN), None)).is_err());
        assert!(Validator::validate_new_alert(&request(None, Some(f64::INFINITY))).is_err());
        assert!(Validator::validate_new_alert(&request(Some(0.0), None)).is_err());
        assert!(Validator::validate_new_alert(&request(None, Some(-5.0))).is_err());
    }

    #[test]
    fn test_requires_user_and_symbol() {
        let mut alert = request(Some(1.0), None);
        alert.user_id = String::new();
        assert!(Validator::validate_new_alert(&alert).is_err());

        let mut alert = request(Some(1.0), None);
        alert.symbol = "   ".to_string();
        assert!(Validator::validate_new_alert(&alert).is_err());
    }

    #[test]
    fn test_inverted_thresholds_are_accepted() {
        // upper below lower is stored as given; the engine passes it through
        assert!(Validator::validate_new_alert(&request(Some(3_000.0), Some(4_000.0))).is_ok());
    }
}
