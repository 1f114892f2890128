//! Turn reported access events into typed, deduplicable events.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use rollcall_core::{DedupKey, DeviceId, Direction, Error, EventSource, Result, SubjectId};
use rollcall_protocol::RawAccessEvent;
use rollcall_storage::NewAttendanceEvent;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Access event ready for classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub device_id: DeviceId,
    pub subject_id: SubjectId,
    /// UTC, millisecond precision
    pub observed_at: DateTime<Utc>,
    pub device_event_id: Option<String>,
    pub dedup_key: DedupKey,
    pub source: EventSource,
    pub raw_payload: String,
}

impl NormalizedEvent {
    /// Insertable row with a provisional direction.
    pub fn to_new_event(&self, direction: Direction) -> NewAttendanceEvent {
        NewAttendanceEvent {
            device_id: self.device_id.clone(),
            subject_id: self.subject_id.clone(),
            observed_at: self.observed_at,
            direction,
            dedup_key: self.dedup_key.clone(),
            device_event_id: self.device_event_id.clone(),
            source: self.source,
            raw_payload: self.raw_payload.clone(),
        }
    }
}

/// Normalize one reported event.
///
/// Returns `Ok(None)` for events without a subject (door, alarm, tamper).
/// Timestamps without an offset are read in `naive_offset`.
///
/// # Errors
/// Returns `Error::Validation` for a missing or unparseable time or an
/// invalid subject id.
pub fn normalize(
    device_id: &DeviceId,
    raw: &RawAccessEvent,
    source: EventSource,
    naive_offset: FixedOffset,
) -> Result<Option<NormalizedEvent>> {
    let Some(subject) = raw.subject.as_deref() else {
        return Ok(None);
    };
    let subject_id = SubjectId::new(subject)?;
    let time = raw
        .time
        .as_deref()
        .ok_or_else(|| Error::validation(format!("event for subject {subject} has no time")))?;
    let observed_at = parse_time(time, naive_offset)?;
    let dedup_key = DedupKey::for_event(raw.serial_no.as_deref(), &subject_id, observed_at);

    Ok(Some(NormalizedEvent {
        device_id: device_id.clone(),
        subject_id,
        observed_at,
        device_event_id: raw.serial_no.clone(),
        dedup_key,
        source,
        raw_payload: raw.raw.clone(),
    }))
}

/// Parse a terminal timestamp into UTC, truncated to milliseconds.
///
/// # Errors
/// Returns `Error::Validation` if no supported format matches.
pub fn parse_time(value: &str, naive_offset: FixedOffset) -> Result<DateTime<Utc>> {
    let value = value.trim();
    let parsed = match DateTime::parse_from_rfc3339(value) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(_) => NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .and_then(|naive| naive_offset.from_local_datetime(&naive).single())
            .map(|at| at.with_timezone(&Utc)),
    };
    let at = parsed.ok_or_else(|| Error::validation(format!("unparseable event time: {value}")))?;

    Utc.timestamp_millis_opt(at.timestamp_millis())
        .single()
        .ok_or_else(|| Error::validation(format!("event time out of range: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn raw(subject: Option<&str>, time: Option<&str>, serial: Option<&str>) -> RawAccessEvent {
        RawAccessEvent {
            subject: subject.map(str::to_string),
            time: time.map(str::to_string),
            serial_no: serial.map(str::to_string),
            major: Some(5),
            minor: Some(75),
            raw: "{}".to_string(),
        }
    }

    #[rstest]
    #[case("2025-03-04T09:00:00-03:00", "2025-03-04T12:00:00.000Z")]
    #[case("2025-03-04T12:00:00Z", "2025-03-04T12:00:00.000Z")]
    #[case("2025-03-04T12:00:00.123456+00:00", "2025-03-04T12:00:00.123Z")]
    #[case("2025-03-04T12:00:00", "2025-03-04T12:00:00.000Z")]
    #[case("2025-03-04 12:00:00.5", "2025-03-04T12:00:00.500Z")]
    fn test_parse_time(#[case] input: &str, #[case] expected: &str) {
        let at = parse_time(input, utc()).unwrap();
        assert_eq!(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true), expected);
    }

    #[test]
    fn test_naive_time_uses_configured_offset() {
        let brt = FixedOffset::west_opt(3 * 3600).unwrap();
        let at = parse_time("2025-03-04T09:00:00", brt).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2025, 3, 4, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_unparseable_time_is_validation_error() {
        let err = parse_time("yesterday", utc()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_subjectless_event_skipped() {
        let device = DeviceId::new("D1").unwrap();
        let event = raw(None, Some("2025-03-04T12:00:00Z"), Some("7"));
        assert!(normalize(&device, &event, EventSource::Push, utc()).unwrap().is_none());
    }

    #[test]
    fn test_dedup_key_prefers_serial_number() {
        let device = DeviceId::new("D1").unwrap();

        let with_serial = raw(Some("S1"), Some("2025-03-04T12:00:00Z"), Some("1234"));
        let event = normalize(&device, &with_serial, EventSource::Pull, utc()).unwrap().unwrap();
        assert_eq!(event.dedup_key.as_str(), "sn:1234");

        let without = raw(Some("S1"), Some("2025-03-04T12:00:00Z"), None);
        let event = normalize(&device, &without, EventSource::Pull, utc()).unwrap().unwrap();
        assert_eq!(
            event.dedup_key.as_str(),
            format!("at:S1@{}", event.observed_at.timestamp_millis())
        );
    }

    #[test]
    fn test_missing_time_rejected() {
        let device = DeviceId::new("D1").unwrap();
        let err = normalize(&device, &raw(Some("S1"), None, None), EventSource::Push, utc()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
