use super::{empty_string_as_none, parse_form_datetime, validate_form_datetime, FormErrors};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

lazy_static! {
    static ref PHONE_RE: Regex = Regex::new(r"^[0-9+()\- ]{7,20}$").unwrap();
}

pub const MIN_TEMPERATURE: f64 = 30.0;
pub const MAX_TEMPERATURE: f64 = 45.0;

fn checked(form: &impl Validate) -> FormErrors {
    match form.validate() {
        Ok(()) => FormErrors::new(),
        Err(e) => FormErrors::from(e),
    }
}

/// Add / edit customer form
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct CustomerForm {
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 100,
        message = "Customer name must be between 1 and 100 characters."
    ))]
    pub cust_name: String,

    #[serde(default)]
    #[validate(regex(
        path = "PHONE_RE",
        message = "Enter a valid phone number (7 to 20 digits, spaces, +, -, parentheses)."
    ))]
    pub phone: String,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 255, message = "Address must be at most 255 characters."))]
    pub address: Option<String>,
}

impl CustomerForm {
    /// Trims free text so that stored values and uniqueness checks agree.
    pub fn normalized(mut self) -> Self {
        self.cust_name = self.cust_name.trim().to_string();
        self.phone = self.phone.trim().to_string();
        self
    }

    pub fn check(&self) -> FormErrors {
        checked(self)
    }
}

fn validate_temperature(raw: &str) -> Result<(), ValidationError> {
    match raw.trim().parse::<f64>() {
        Ok(t) if (MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&t) => Ok(()),
        _ => {
            let mut err = ValidationError::new("temperature");
            err.message = Some(
                format!(
                    "Temperature must be a number between {} and {} °C.",
                    MIN_TEMPERATURE, MAX_TEMPERATURE
                )
                .into(),
            );
            Err(err)
        }
    }
}

/// Store visit form. Timestamps arrive as text and are parsed after validation.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct StoreVisitForm {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(custom = "validate_form_datetime")]
    pub visited_at: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(custom = "validate_temperature")]
    pub temperature: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 500, message = "Notes must be at most 500 characters."))]
    pub notes: Option<String>,
}

impl StoreVisitForm {
    pub fn check(&self) -> FormErrors {
        checked(self)
    }

    pub fn visited_at(&self) -> Option<DateTime<Utc>> {
        self.visited_at.as_deref().and_then(parse_form_datetime)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature.as_deref().and_then(|t| t.trim().parse().ok())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct HomeDeliveryForm {
    #[serde(default)]
    #[validate(length(
        min = 1,
        max = 1000,
        message = "List the items to deliver (at most 1000 characters)."
    ))]
    pub items: String,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 255, message = "Delivery address must be at most 255 characters."))]
    pub delivery_address: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(custom = "validate_form_datetime")]
    pub scheduled_for: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(length(max = 500, message = "Notes must be at most 500 characters."))]
    pub notes: Option<String>,
}

impl HomeDeliveryForm {
    pub fn check(&self) -> FormErrors {
        let mut errors = checked(self);
        if self.items.trim().is_empty() && errors.get("items").is_none() {
            errors.add("items", "List the items to deliver (at most 1000 characters).");
        }
        errors
    }

    pub fn scheduled_for(&self) -> Option<DateTime<Utc>> {
        self.scheduled_for.as_deref().and_then(parse_form_datetime)
    }
}

/// Action picked on the home page for the selected customer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomeActionForm {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub func: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub cust: Option<String>,
}

/// `?cust=<id>` on the customer detail pages
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerQuery {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub cust: Option<String>,
}

/// `?search=&page=` on the home page. Page stays raw text so that
/// non-numeric input falls back to the first page instead of a rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HomeQuery {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub page: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("555-0100", true)]
    #[case("+1 (555) 010-0000", true)]
    #[case("12345", false)]
    #[case("call me", false)]
    fn phone_format(#[case] phone: &str, #[case] ok: bool) {
        let form = CustomerForm {
            cust_name: "Ada".into(),
            phone: phone.into(),
            ..Default::default()
        };
        assert_eq!(form.check().is_empty(), ok, "{phone}");
    }

    #[rstest]
    #[case(Some("36.6"), true)]
    #[case(Some("29.9"), false)]
    #[case(Some("warm"), false)]
    #[case(None, true)]
    fn temperature_range(#[case] temperature: Option<&str>, #[case] ok: bool) {
        let form = StoreVisitForm {
            temperature: temperature.map(str::to_string),
            ..Default::default()
        };
        assert_eq!(form.check().is_empty(), ok);
    }

    #[test]
    fn blank_items_are_rejected() {
        let form = HomeDeliveryForm {
            items: "   ".into(),
            ..Default::default()
        };
        assert!(form.check().get("items").is_some());
    }

    #[test]
    fn bad_visit_timestamp_is_a_field_error() {
        let form = StoreVisitForm {
            visited_at: Some("tomorrow-ish".into()),
            ..Default::default()
        };
        assert_eq!(
            form.check().get("visited_at"),
            Some(&["Enter a valid date/time.".to_string()][..])
        );
    }
}
