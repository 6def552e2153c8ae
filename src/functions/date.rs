use super::errors::PseudonymizeError;
use super::pseudonymize::Pseudonymize;
use chrono::NaiveDate;

const DATE_FORMAT: &str = "%Y%m%d";
pub(crate) const HIDDEN_TIME: &str = "000000";

/// Replaces a date or date-time by the first day of its year.
pub(crate) struct FirstDayOfYear;

impl Pseudonymize for FirstDayOfYear {
    fn pseudonymize(&self, value: &str) -> Result<String, PseudonymizeError> {
        if value.is_empty() {
            return Ok(String::new());
        }

        let year = value
            .get(..4)
            .filter(|year| year.chars().all(|c| c.is_ascii_digit()))
            .ok_or_else(|| PseudonymizeError::InvalidInput(format!("{value} is not a date")))?;
        let year: i32 = year
            .parse()
            .map_err(|_| PseudonymizeError::InvalidInput(format!("{value} is not a date")))?;
        let date = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| PseudonymizeError::InvalidInput(format!("{value} is not a date")))?;
        Ok(date.format(DATE_FORMAT).to_string())
    }
}

/// Replaces any time by `000000`.
pub(crate) struct HiddenTime;

impl Pseudonymize for HiddenTime {
    fn pseudonymize(&self, _value: &str) -> Result<String, PseudonymizeError> {
        Ok(HIDDEN_TIME.into())
    }
}

/// Replaces a timestamp by the fixed `2022-01-01T00:00:00`.
pub(crate) struct FixedTimestamp;

impl Pseudonymize for FixedTimestamp {
    fn pseudonymize(&self, _value: &str) -> Result<String, PseudonymizeError> {
        let timestamp = NaiveDate::from_ymd_opt(2022, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .ok_or_else(|| PseudonymizeError::InternalError("invalid fixed timestamp".into()))?;
        Ok(timestamp.format("%Y-%m-%dT%H:%M:%S").to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_day_of_year() {
        let pseudonymizer = FirstDayOfYear;
        assert_eq!(pseudonymizer.pseudonymize("20211231").unwrap(), "20210101");
        assert_eq!(pseudonymizer.pseudonymize("19930822").unwrap(), "19930101");
    }

    #[test]
    fn test_first_day_of_year_date_time() {
        let pseudonymizer = FirstDayOfYear;
        assert_eq!(
            pseudonymizer.pseudonymize("20010102141545.000000").unwrap(),
            "20010101"
        );
    }

    #[test]
    fn test_empty_date() {
        assert_eq!(FirstDayOfYear.pseudonymize("").unwrap(), "");
    }

    #[test]
    fn test_invalid_date() {
        assert!(FirstDayOfYear.pseudonymize("20a1").is_err());
        assert!(FirstDayOfYear.pseudonymize("20").is_err());
    }

    #[test]
    fn test_hidden_time() {
        assert_eq!(HiddenTime.pseudonymize("141545").unwrap(), "000000");
        assert_eq!(HiddenTime.pseudonymize("").unwrap(), "000000");
    }

    #[test]
    fn test_fixed_timestamp() {
        assert_eq!(
            FixedTimestamp.pseudonymize("anything").unwrap(),
            "2022-01-01T00:00:00"
        );
    }
}
