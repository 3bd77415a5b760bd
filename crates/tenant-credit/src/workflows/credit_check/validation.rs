use chrono::NaiveDate;

use super::domain::{ConsentInfo, PersonalInfo};
use super::error::ValidationError;

const DEFAULT_MINIMUM_AGE: u32 = 18;

/// Checks a submission locally so malformed requests never reach the bureau.
#[derive(Debug, Clone)]
pub struct SubmissionGuard {
    minimum_age: u32,
}

impl Default for SubmissionGuard {
    fn default() -> Self {
        Self {
            minimum_age: DEFAULT_MINIMUM_AGE,
        }
    }
}

impl SubmissionGuard {
    pub fn with_minimum_age(minimum_age: u32) -> Self {
        Self { minimum_age }
    }

    /// Consent is checked before any personal field.
    pub fn validate(
        &self,
        personal_info: &PersonalInfo,
        consent: &ConsentInfo,
        today: NaiveDate,
    ) -> Result<(), ValidationError> {
        check_consent(consent)?;
        self.check_personal_info(personal_info, today)
    }

    fn check_personal_info(
        &self,
        info: &PersonalInfo,
        today: NaiveDate,
    ) -> Result<(), ValidationError> {
        require("first name", &info.first_name)?;
        require("last name", &info.last_name)?;
        require("email", &info.email)?;
        require("phone", &info.phone)?;
        require("street", &info.address.street)?;
        require("city", &info.address.city)?;
        require("province", &info.address.province)?;
        require("postal code", &info.address.postal_code)?;
        require("country", &info.address.country)?;

        if !is_valid_email(&info.email) {
            return Err(ValidationError::InvalidEmail);
        }

        if digit_count(&info.ssn) != 9 || !only_digits_and_separators(&info.ssn) {
            return Err(ValidationError::InvalidSsn);
        }

        let phone_digits = digit_count(&info.phone);
        let normalized_phone = info.phone.trim_start_matches('+');
        let phone_ok = match phone_digits {
            10 => true,
            11 => normalized_phone.trim_start().starts_with('1'),
            _ => false,
        };
        if !phone_ok {
            return Err(ValidationError::InvalidPhone);
        }

        if !is_valid_postal_code(&info.address.postal_code, &info.address.country) {
            return Err(ValidationError::InvalidPostalCode {
                postal_code: info.address.postal_code.clone(),
                country: info.address.country.clone(),
            });
        }

        let age = today
            .years_since(info.date_of_birth)
            .ok_or(ValidationError::FutureDateOfBirth)?;
        if age < self.minimum_age {
            return Err(ValidationError::Underage {
                minimum: self.minimum_age,
            });
        }

        Ok(())
    }
}

pub(crate) fn check_consent(consent: &ConsentInfo) -> Result<(), ValidationError> {
    match consent.missing() {
        Some(field) => Err(ValidationError::MissingConsent(field)),
        None => Ok(()),
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

fn digit_count(value: &str) -> usize {
    value.chars().filter(char::is_ascii_digit).count()
}

fn only_digits_and_separators(value: &str) -> bool {
    value
        .trim()
        .chars()
        .all(|c| c.is_ascii_digit() || c == '-' || c == ' ')
}

fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && tld.len() >= 2)
        }
        None => false,
    }
}

fn is_valid_postal_code(postal_code: &str, country: &str) -> bool {
    let compact: String = postal_code
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    match country.trim().to_ascii_uppercase().as_str() {
        "CA" | "CANADA" => {
            compact.len() == 6
                && compact.chars().enumerate().all(|(index, c)| {
                    if index % 2 == 0 {
                        c.is_ascii_alphabetic()
                    } else {
                        c.is_ascii_digit()
                    }
                })
        }
        "US" | "USA" | "UNITED STATES" => {
            let (zip, plus_four) = match compact.split_once('-') {
                Some((zip, extra)) => (zip, Some(extra)),
                None => (compact.as_str(), None),
            };
            zip.len() == 5
                && zip.chars().all(|c| c.is_ascii_digit())
                && plus_four.map_or(true, |extra| {
                    extra.len() == 4 && extra.chars().all(|c| c.is_ascii_digit())
                })
        }
        _ => !compact.is_empty(),
    }
}
