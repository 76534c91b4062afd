//! Staged object key codec and partition path derivation.
//!
//! The ingestion stage names every staged object
//! `<prefix>/<YYYY>-<MM>-<DD>-<HH>-<mm>-<ss>.json`, and the validation stage
//! reads that timestamp back out to build the output partition and the
//! `extract_time` column. Both directions live here so the two stages can
//! never drift apart on the layout.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::model::TransformError;

/// chrono pattern for the timestamp segment of a staged key.
pub const KEY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// File extension of staged objects.
pub const STAGED_EXTENSION: &str = ".json";

/// File name of the validated output inside each partition.
pub const OUTPUT_FILE_NAME: &str = "weather.csv";

/// Minimum number of dash-separated tokens a staged filename needs
/// for partitioning (year, month, day, hour).
const PARTITION_TOKENS: usize = 4;

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Builds the staging key for a document fetched at `at`.
pub fn format_staged_key(prefix: &str, at: DateTime<Utc>) -> String {
    let prefix = prefix.trim_end_matches('/');
    let stamp = at.format(KEY_TIMESTAMP_FORMAT);
    if prefix.is_empty() {
        format!("{}{}", stamp, STAGED_EXTENSION)
    } else {
        format!("{}/{}{}", prefix, stamp, STAGED_EXTENSION)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// A staged key split into its directory and filename parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedKey<'a> {
    key: &'a str,
    /// Everything before the last `/`, or "" for a bare filename.
    pub directory: &'a str,
    /// Everything after the last `/`.
    pub filename: &'a str,
}

impl<'a> StagedKey<'a> {
    pub fn parse(key: &'a str) -> Result<Self, TransformError> {
        let (directory, filename) = match key.rfind('/') {
            Some(idx) => (&key[..idx], &key[idx + 1..]),
            None => ("", key),
        };
        if filename.is_empty() {
            return Err(malformed(key, "key has no filename"));
        }
        Ok(Self {
            key,
            directory,
            filename,
        })
    }

    /// Filename with everything from the first `.` removed.
    pub fn stem(&self) -> &'a str {
        self.filename.split('.').next().unwrap_or(self.filename)
    }

    /// `year=<Y>/month=<M>/date=<D>/hour=<H>/` from the first four dash
    /// tokens of the filename. Tokens are used positionally and are not
    /// checked as calendar values.
    pub fn partition_path(&self) -> Result<String, TransformError> {
        let tokens: Vec<&str> = self.filename.split('-').collect();
        if tokens.len() < PARTITION_TOKENS {
            return Err(malformed(
                self.key,
                &format!(
                    "expected at least {} dash-separated tokens, found {}",
                    PARTITION_TOKENS,
                    tokens.len()
                ),
            ));
        }
        Ok(format!(
            "year={}/month={}/date={}/hour={}/",
            tokens[0], tokens[1], tokens[2], tokens[3]
        ))
    }

    /// The ingestion timestamp encoded in the filename.
    pub fn extract_time(&self) -> Result<NaiveDateTime, TransformError> {
        NaiveDateTime::parse_from_str(self.stem(), KEY_TIMESTAMP_FORMAT).map_err(|e| {
            malformed(
                self.key,
                &format!("timestamp {:?} does not match {}: {}", self.stem(), KEY_TIMESTAMP_FORMAT, e),
            )
        })
    }

    /// `<directory>/<partition-path>weather.csv`.
    pub fn output_key(&self) -> Result<String, TransformError> {
        let partition = self.partition_path()?;
        if self.directory.is_empty() {
            Ok(format!("{}{}", partition, OUTPUT_FILE_NAME))
        } else {
            Ok(format!("{}/{}{}", self.directory, partition, OUTPUT_FILE_NAME))
        }
    }
}

/// Convenience wrapper: partition path for a full object key.
pub fn partition_path(key: &str) -> Result<String, TransformError> {
    StagedKey::parse(key)?.partition_path()
}

fn malformed(key: &str, reason: &str) -> TransformError {
    TransformError::MalformedKey {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 5, 7, 9).unwrap()
    }

    #[test]
    fn test_format_staged_key_zero_pads_every_field() {
        assert_eq!(format_staged_key("nyc", fixed_time()), "nyc/2024-03-01-05-07-09.json");
    }

    #[test]
    fn test_format_staged_key_tolerates_trailing_slash_and_empty_prefix() {
        assert_eq!(format_staged_key("nyc/", fixed_time()), "nyc/2024-03-01-05-07-09.json");
        assert_eq!(format_staged_key("", fixed_time()), "2024-03-01-05-07-09.json");
    }

    #[test]
    fn test_formatted_key_parses_back_to_same_time() {
        let key = format_staged_key("nyc", fixed_time());
        let parsed = StagedKey::parse(&key).unwrap();
        assert_eq!(parsed.extract_time().unwrap(), fixed_time().naive_utc());
    }

    #[test]
    fn test_partition_path_for_standard_key() {
        assert_eq!(
            partition_path("nyc/2024-03-01-05-00-00.json").unwrap(),
            "year=2024/month=03/date=01/hour=05/"
        );
    }

    #[test]
    fn test_partition_path_ignores_nested_directories() {
        assert_eq!(
            partition_path("raw/weather/nyc/2023-12-31-23-59-59.json").unwrap(),
            "year=2023/month=12/date=31/hour=23/"
        );
    }

    #[test]
    fn test_partition_tokens_are_positional_not_validated() {
        // Out-of-range month/day pass through untouched.
        assert_eq!(
            partition_path("nyc/2024-13-45-99.json").unwrap(),
            "year=2024/month=13/date=45/hour=99.json/"
        );
    }

    #[test]
    fn test_too_few_tokens_is_transform_error() {
        let err = partition_path("nyc/2024-03-01.json").unwrap_err();
        assert!(
            matches!(err, TransformError::MalformedKey { .. }),
            "expected MalformedKey, got {:?}",
            err
        );
    }

    #[test]
    fn test_key_without_filename_is_rejected() {
        assert!(StagedKey::parse("nyc/").is_err());
        assert!(StagedKey::parse("").is_err());
    }

    #[test]
    fn test_output_key_keeps_input_directory() {
        let key = StagedKey::parse("nyc/2024-03-01-05-00-00.json").unwrap();
        assert_eq!(
            key.output_key().unwrap(),
            "nyc/year=2024/month=03/date=01/hour=05/weather.csv"
        );
    }

    #[test]
    fn test_output_key_for_bare_filename_has_no_leading_slash() {
        let key = StagedKey::parse("2024-03-01-05-00-00.json").unwrap();
        assert_eq!(key.directory, "");
        assert_eq!(
            key.output_key().unwrap(),
            "year=2024/month=03/date=01/hour=05/weather.csv"
        );
    }

    #[test]
    fn test_extract_time_parses_full_timestamp() {
        let key = StagedKey::parse("nyc/2024-03-01-05-30-15.json").unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(5, 30, 15)
            .unwrap();
        assert_eq!(key.extract_time().unwrap(), expected);
    }

    #[test]
    fn test_extract_time_rejects_non_timestamp_filename() {
        let key = StagedKey::parse("nyc/latest-forecast-copy-2.json").unwrap();
        // Partitioning alone would accept this; the timestamp would not.
        assert!(key.partition_path().is_ok());
        assert!(key.extract_time().is_err());
    }
}
