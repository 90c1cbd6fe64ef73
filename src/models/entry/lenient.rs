//! Deserializers that accept what HTML forms and older clients actually send:
//! numbers as strings, blank inputs as `""`, times without seconds.

use chrono::{NaiveDate, NaiveTime};
use serde::{de, Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

pub fn optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => Ok(Some(n)),
        Some(NumberOrText::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<f64>()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("invalid number: {}", text)))
        }
    }
}

pub fn optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(text) if text.trim().is_empty() => Ok(None),
        Some(text) => parse_date(text.trim())
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid date (expected YYYY-MM-DD): {}", text))),
    }
}

pub fn optional_time<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(text) if text.trim().is_empty() => Ok(None),
        Some(text) => parse_time(text.trim())
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid time (expected HH:MM): {}", text))),
    }
}

/// Patch bodies: a present key is a change and `null` clears the column.
pub fn patch<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Like [`patch`], and a blank string clears the column too.
pub fn patch_number<'de, D>(deserializer: D) -> Result<Option<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    optional_number(deserializer).map(Some)
}

pub fn patch_date<'de, D>(deserializer: D) -> Result<Option<Option<NaiveDate>>, D::Error>
where
    D: Deserializer<'de>,
{
    optional_date(deserializer).map(Some)
}

pub fn patch_time<'de, D>(deserializer: D) -> Result<Option<Option<NaiveTime>>, D::Error>
where
    D: Deserializer<'de>,
{
    optional_time(deserializer).map(Some)
}

/// A present key must carry a value; `null` is rejected.
pub fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S%.f"))
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize, Debug)]
    struct Probe {
        #[serde(default, deserialize_with = "optional_number")]
        n: Option<f64>,
        #[serde(default, deserialize_with = "optional_date")]
        d: Option<NaiveDate>,
        #[serde(default, deserialize_with = "optional_time")]
        t: Option<NaiveTime>,
    }

    #[test]
    fn test_numbers_accept_strings_and_blanks() {
        let p: Probe = serde_json::from_value(json!({ "n": "5.25" })).unwrap();
        assert_eq!(p.n, Some(5.25));
        let p: Probe = serde_json::from_value(json!({ "n": 7 })).unwrap();
        assert_eq!(p.n, Some(7.0));
        let p: Probe = serde_json::from_value(json!({ "n": "" })).unwrap();
        assert_eq!(p.n, None);
        let p: Probe = serde_json::from_value(json!({})).unwrap();
        assert_eq!(p.n, None);
        assert!(serde_json::from_value::<Probe>(json!({ "n": "abc" })).is_err());
    }

    #[derive(Deserialize, Debug)]
    struct Patch {
        #[serde(default, deserialize_with = "patch_date")]
        d: Option<Option<NaiveDate>>,
        #[serde(default, deserialize_with = "patch")]
        s: Option<Option<String>>,
        #[serde(default, deserialize_with = "present")]
        p: Option<u8>,
    }

    #[test]
    fn test_patch_tells_absent_from_cleared() {
        let p: Patch = serde_json::from_value(json!({})).unwrap();
        assert_eq!(p.d, None);
        assert_eq!(p.s, None);

        let p: Patch = serde_json::from_value(json!({ "d": "", "s": null })).unwrap();
        assert_eq!(p.d, Some(None));
        assert_eq!(p.s, Some(None));

        let p: Patch = serde_json::from_value(json!({ "d": "2024-01-05", "s": "x", "p": 3 })).unwrap();
        assert_eq!(p.d, Some(NaiveDate::from_ymd_opt(2024, 1, 5)));
        assert_eq!(p.s, Some(Some("x".to_string())));
        assert_eq!(p.p, Some(3));

        assert!(serde_json::from_value::<Patch>(json!({ "p": null })).is_err());
    }

    #[test]
    fn test_dates_and_times() {
        let p: Probe =
            serde_json::from_value(json!({ "d": "2024-01-02", "t": "08:30" })).unwrap();
        assert_eq!(p.d, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(p.t, NaiveTime::from_hms_opt(8, 30, 0));

        let p: Probe = serde_json::from_value(json!({ "d": "", "t": "17:05:09" })).unwrap();
        assert_eq!(p.d, None);
        assert_eq!(p.t, NaiveTime::from_hms_opt(17, 5, 9));

        assert!(serde_json::from_value::<Probe>(json!({ "d": "02/01/2024" })).is_err());
        assert!(serde_json::from_value::<Probe>(json!({ "t": "25:00" })).is_err());
    }
}
