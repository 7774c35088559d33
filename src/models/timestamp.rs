//! Serde adapter for stored timestamps.
//!
//! Binary BSON, which the MongoDB driver reads and writes, gets native BSON
//! dates so the server compares and sorts them chronologically. JSON and
//! other human-readable formats keep RFC 3339 strings.
//!
//! Use with `#[serde(with = "crate::models::timestamp")]`, or the
//! [`option`] module for optional fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    #[cfg(feature = "server")]
    if !serializer.is_human_readable() {
        return bson::serde_helpers::chrono_datetime_as_bson_datetime::serialize(at, serializer);
    }
    at.serialize(serializer)
}

#[cfg(feature = "server")]
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    use serde::de::Error;

    // Documents can reach us through either BSON deserializer flavour, so
    // accept a BSON date and an RFC 3339 string alike.
    match bson::Bson::deserialize(deserializer)? {
        bson::Bson::DateTime(at) => Ok(at.to_chrono()),
        bson::Bson::String(text) => DateTime::parse_from_rfc3339(&text)
            .map(|at| at.with_timezone(&Utc))
            .map_err(D::Error::custom),
        other => Err(D::Error::custom(format!(
            "expected a timestamp, found {:?}",
            other.element_type()
        ))),
    }
}

#[cfg(not(feature = "server"))]
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    DateTime::<Utc>::deserialize(deserializer)
}

struct Borrowed<'a>(&'a DateTime<Utc>);

impl Serialize for Borrowed<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize(self.0, serializer)
    }
}

struct Owned(DateTime<Utc>);

impl<'de> Deserialize<'de> for Owned {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize(deserializer).map(Owned)
    }
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        at: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match at {
            Some(at) => serializer.serialize_some(&Borrowed(at)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(Option::<Owned>::deserialize(deserializer)?.map(|Owned(at)| at))
    }
}

/// A timestamp as a BSON value, for filters and `$set` documents.
#[cfg(feature = "server")]
pub fn to_bson(at: DateTime<Utc>) -> bson::Bson {
    bson::Bson::DateTime(bson::DateTime::from_chrono(at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "crate::models::timestamp")]
        at: DateTime<Utc>,
        #[serde(default, with = "crate::models::timestamp::option")]
        seen: Option<DateTime<Utc>>,
    }

    fn sample() -> Stamped {
        Stamped {
            at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            seen: None,
        }
    }

    #[test]
    fn test_json_keeps_rfc3339() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["at"], "2024-03-01T12:00:00Z");
        assert!(json["seen"].is_null());

        let back: Stamped = serde_json::from_str(r#"{"at":"2024-03-01T12:00:00Z"}"#).unwrap();
        assert_eq!(back, sample());
    }

    #[cfg(feature = "server")]
    #[test]
    fn test_bson_stores_native_dates() {
        let mut stamped = sample();
        stamped.seen = Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 1).unwrap());

        let raw = bson::to_raw_document_buf(&stamped).unwrap();
        let doc = raw.to_document().unwrap();
        assert!(matches!(doc.get("at"), Some(bson::Bson::DateTime(_))));
        assert!(matches!(doc.get("seen"), Some(bson::Bson::DateTime(_))));

        let back: Stamped = bson::from_slice(raw.as_bytes()).unwrap();
        assert_eq!(back, stamped);

        let back: Stamped = bson::from_document(doc).unwrap();
        assert_eq!(back, stamped);
    }

    #[cfg(feature = "server")]
    #[test]
    fn test_bson_dates_order_chronologically() {
        let whole = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let later = whole + chrono::Duration::milliseconds(100);
        assert!(to_bson(whole).as_datetime() < to_bson(later).as_datetime());
    }
}
