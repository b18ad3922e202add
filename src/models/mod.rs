pub mod admin;
pub mod auth;
pub mod plan;
pub mod school;

/// Fixed-width RFC 3339 timestamps (`2026-10-19T08:30:00.000000Z`) so that
/// stored values sort lexically in chronological order.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use chrono::TimeZone;

        #[test]
        fn whole_seconds_keep_fraction_digits() {
            let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
            assert_eq!(format(&ts), "2026-01-02T03:04:05.000000Z");
        }
    }
}
