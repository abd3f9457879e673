//! Histogram binning
//!
//! Turns a list of records into buckets for the active mode:
//! - Recency: one bucket per local calendar day (key = midnight, epoch ms)
//! - Experience: one bucket per power of two (key = `floor(log2(experience))`)
//!
//! Records with unusable fields are skipped and counted, never propagated as
//! NaN into the axis domain.

use chrono::{NaiveTime, TimeZone};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

use crate::error::HistogramError;
use crate::types::{Bucket, Mode, Record};

/// Why a record cannot be binned in a given mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("timestamp is not a finite number")]
    NonFiniteTimestamp,

    #[error("timestamp is outside the representable date range")]
    TimestampOutOfRange,

    #[error("experience is not a finite number")]
    NonFiniteExperience,

    #[error("experience must be positive")]
    NonPositiveExperience,

    #[error("experience must be at least one edit")]
    ExperienceBelowOne,
}

/// Validation failure for a single record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordValidation {
    pub index: usize,
    pub error: RecordError,
}

/// Buckets plus the number of records that were skipped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinReport {
    pub buckets: Vec<Bucket>,
    pub dropped: usize,
}

/// Parse a JSON array of records
pub fn parse_array(json: &str) -> Result<Vec<Record>, HistogramError> {
    let records: Vec<Record> = serde_json::from_str(json)?;
    Ok(records)
}

/// Parse newline-delimited JSON records
pub fn parse_ndjson(ndjson: &str) -> Result<Vec<Record>, HistogramError> {
    let mut records = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                return Err(HistogramError::InvalidRecord {
                    index: line_num,
                    reason: format!("line {}: {}", line_num + 1, e),
                });
            }
        }
    }
    Ok(records)
}

/// Start of the local calendar day containing `timestamp_ms`, in epoch ms.
///
/// When local midnight does not exist (a DST gap), the first valid instant of
/// that day is used instead.
pub fn day_start(timestamp_ms: f64, tz: &Tz) -> Result<i64, RecordError> {
    if !timestamp_ms.is_finite() {
        return Err(RecordError::NonFiniteTimestamp);
    }
    if timestamp_ms.abs() > i64::MAX as f64 {
        return Err(RecordError::TimestampOutOfRange);
    }

    let local = tz
        .timestamp_millis_opt(timestamp_ms.floor() as i64)
        .single()
        .ok_or(RecordError::TimestampOutOfRange)?;
    let date = local.date_naive();

    (0..24)
        .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
        .find_map(|time| tz.from_local_datetime(&date.and_time(time)).earliest())
        .map(|start| start.timestamp_millis())
        .ok_or(RecordError::TimestampOutOfRange)
}

/// Power-of-two bucket for an experience value.
///
/// Values below one edit would land in negative buckets left of the axis
/// floor, so they are rejected. Integral values take an exact path so `2^k`
/// always lands in bucket `k`.
pub fn experience_bucket(experience: f64) -> Result<i64, RecordError> {
    if !experience.is_finite() {
        return Err(RecordError::NonFiniteExperience);
    }
    if experience <= 0.0 {
        return Err(RecordError::NonPositiveExperience);
    }
    if experience < 1.0 {
        return Err(RecordError::ExperienceBelowOne);
    }
    if experience.fract() == 0.0 && experience < u64::MAX as f64 {
        let n = experience as u64;
        return Ok(i64::from(63 - n.leading_zeros()));
    }
    Ok(experience.log2().floor() as i64)
}

/// Bucket key for one record in the given mode
pub fn bucket_key(record: &Record, mode: Mode, tz: &Tz) -> Result<i64, RecordError> {
    match mode {
        Mode::Recency => day_start(record.timestamp, tz),
        Mode::Experience => experience_bucket(record.experience),
    }
}

/// Aggregate records into buckets, skipping records that cannot be binned
pub fn aggregate(records: &[Record], mode: Mode, tz: &Tz) -> Vec<Bucket> {
    aggregate_with_report(records, mode, tz).buckets
}

/// Aggregate records into buckets and report how many were skipped.
///
/// Buckets come back ordered by key.
pub fn aggregate_with_report(records: &[Record], mode: Mode, tz: &Tz) -> BinReport {
    let mut counts: BTreeMap<i64, u32> = BTreeMap::new();
    let mut dropped = 0usize;
    let mut first_error = None;

    for record in records {
        match bucket_key(record, mode, tz) {
            Ok(key) => *counts.entry(key).or_insert(0) += 1,
            Err(e) => {
                dropped += 1;
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(error) = first_error {
        warn!(%mode, dropped, total = records.len(), %error, "skipped records that cannot be binned");
    }

    BinReport {
        buckets: counts
            .into_iter()
            .map(|(key, count)| Bucket { key, count })
            .collect(),
        dropped,
    }
}

/// Validate every record for the given mode, returning only the failures
pub fn validate_records(records: &[Record], mode: Mode, tz: &Tz) -> Vec<RecordValidation> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            bucket_key(record, mode, tz)
                .err()
                .map(|error| RecordValidation { index, error })
        })
        .collect()
}

/// Smallest and largest bucket key
pub fn bucket_extent(buckets: &[Bucket]) -> Option<(i64, i64)> {
    let min = buckets.iter().map(|b| b.key).min()?;
    let max = buckets.iter().map(|b| b.key).max()?;
    Some((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DAY: i64 = 86_400_000;
    // 2024-01-15T00:00:00Z
    const JAN_15: i64 = 1_705_276_800_000;

    fn utc() -> Tz {
        chrono_tz::UTC
    }

    fn at(ms: i64) -> Record {
        Record::new(ms as f64, 1.0)
    }

    fn with_experience(v: f64) -> Record {
        Record::new(JAN_15 as f64, v)
    }

    #[test]
    fn test_recency_groups_by_day() {
        let records = vec![
            at(JAN_15 + 1),
            at(JAN_15 + 5 * 3_600_000),
            at(JAN_15 + DAY - 1),
            at(JAN_15 + DAY),
            at(JAN_15 - 1),
        ];

        let buckets = aggregate(&records, Mode::Recency, &utc());
        assert_eq!(
            buckets,
            vec![
                Bucket {
                    key: JAN_15 - DAY,
                    count: 1
                },
                Bucket {
                    key: JAN_15,
                    count: 3
                },
                Bucket {
                    key: JAN_15 + DAY,
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn test_recency_uses_local_midnight() {
        // 2024-01-15T03:00Z is still 2024-01-14 in New York (UTC-5)
        let tz: Tz = "America/New_York".parse().unwrap();
        let key = day_start((JAN_15 + 3 * 3_600_000) as f64, &tz).unwrap();
        assert_eq!(key, JAN_15 - DAY + 5 * 3_600_000);
    }

    #[test]
    fn test_day_start_in_dst_gap() {
        // Sao Paulo skipped midnight on 2018-11-04; the day starts at 01:00 local
        let tz: Tz = "America/Sao_Paulo".parse().unwrap();
        // 2018-11-04T12:00:00Z
        let noon = 1_541_332_800_000.0;
        let start = day_start(noon, &tz).unwrap();
        let local = tz.timestamp_millis_opt(start).single().unwrap();
        assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2018-11-04 01:00");
    }

    #[test]
    fn test_experience_power_of_two_boundaries() {
        assert_eq!(experience_bucket(1.0), Ok(0));
        assert_eq!(experience_bucket(2.0), Ok(1));
        assert_eq!(experience_bucket(3.0), Ok(1));
        assert_eq!(experience_bucket(4.0), Ok(2));
        assert_eq!(experience_bucket(1023.0), Ok(9));
        assert_eq!(experience_bucket(1024.0), Ok(10));
        for k in 0..53 {
            let v = 2f64.powi(k);
            assert_eq!(experience_bucket(v), Ok(i64::from(k)));
            assert_eq!(experience_bucket(v * 2.0 - 1.0).unwrap(), i64::from(k));
        }
        assert_eq!(experience_bucket(1.5), Ok(0));
    }

    #[test]
    fn test_experience_rejects_bad_values() {
        assert_eq!(
            experience_bucket(0.0),
            Err(RecordError::NonPositiveExperience)
        );
        assert_eq!(
            experience_bucket(-4.0),
            Err(RecordError::NonPositiveExperience)
        );
        assert_eq!(
            experience_bucket(0.5),
            Err(RecordError::ExperienceBelowOne)
        );
        assert_eq!(
            experience_bucket(f64::NAN),
            Err(RecordError::NonFiniteExperience)
        );
        assert_eq!(
            experience_bucket(f64::INFINITY),
            Err(RecordError::NonFiniteExperience)
        );
    }

    #[test]
    fn test_same_bucket_for_same_floor_log2() {
        let records: Vec<Record> = [16.0, 17.0, 20.0, 31.0, 32.0]
            .into_iter()
            .map(with_experience)
            .collect();
        let buckets = aggregate(&records, Mode::Experience, &utc());
        assert_eq!(
            buckets,
            vec![Bucket { key: 4, count: 4 }, Bucket { key: 5, count: 1 }]
        );
    }

    #[test]
    fn test_bad_records_are_dropped_and_counted() {
        let records = vec![
            Record::new(f64::NAN, 3.0),
            Record::new(JAN_15 as f64, 0.0),
            Record::new(JAN_15 as f64, 8.0),
        ];

        let recency = aggregate_with_report(&records, Mode::Recency, &utc());
        assert_eq!(recency.dropped, 1);
        assert_eq!(recency.buckets, vec![Bucket { key: JAN_15, count: 2 }]);

        let experience = aggregate_with_report(&records, Mode::Experience, &utc());
        assert_eq!(experience.dropped, 1);
        assert_eq!(experience.buckets, vec![Bucket { key: 1, count: 1 }, Bucket { key: 3, count: 1 }]);
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let records: Vec<Record> = (0..200)
            .map(|i| Record::new((JAN_15 + i * 7_919_000) as f64, (i % 37 + 1) as f64))
            .collect();
        for mode in [Mode::Recency, Mode::Experience] {
            let mut first = aggregate(&records, mode, &utc());
            let mut second = aggregate(&records, mode, &utc());
            first.sort_by_key(|b| b.key);
            second.sort_by_key(|b| b.key);
            assert_eq!(first, second);
            let total: u32 = first.iter().map(|b| b.count).sum();
            assert_eq!(total, 200);
        }
    }

    #[test]
    fn test_validate_records() {
        let records = vec![
            Record::new(JAN_15 as f64, 2.0),
            Record::new(JAN_15 as f64, -1.0),
        ];
        assert!(validate_records(&records, Mode::Recency, &utc()).is_empty());
        assert_eq!(
            validate_records(&records, Mode::Experience, &utc()),
            vec![RecordValidation {
                index: 1,
                error: RecordError::NonPositiveExperience
            }]
        );
    }

    #[test]
    fn test_parse_ndjson() {
        let input = "{\"timestamp\": 1000, \"experience\": 3}\n\n{\"timestamp\": 2000, \"experience\": 5}\n";
        let records = parse_ndjson(input).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], Record::new(2000.0, 5.0));

        let err = parse_ndjson("{\"timestamp\": 1}\nnot json").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_array() {
        let records = parse_array(r#"[{"timestamp": 1, "experience": 2}]"#).unwrap();
        assert_eq!(records, vec![Record::new(1.0, 2.0)]);
        assert!(parse_array("{").is_err());
    }

    #[test]
    fn test_bucket_extent() {
        assert_eq!(bucket_extent(&[]), None);
        let buckets = [
            Bucket { key: 3, count: 1 },
            Bucket { key: -1, count: 2 },
            Bucket { key: 7, count: 1 },
        ];
        assert_eq!(bucket_extent(&buckets), Some((-1, 7)));
    }
}
