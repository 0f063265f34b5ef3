use chrono::{DateTime as ChronoDateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// RFC3339 timestamp carried in status fields, serialized the way the
/// apiserver serializes meta.v1 Time (whole seconds, UTC).
#[derive(Clone, Debug, PartialEq)]
pub struct DateTime(pub ChronoDateTime<Utc>);

impl Serialize for DateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

impl<'de> Deserialize<'de> for DateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ChronoDateTime::parse_from_rfc3339(&s)
            .map(|dt| DateTime(dt.with_timezone(&Utc)))
            .map_err(de::Error::custom)
    }
}

impl JsonSchema for DateTime {
    fn schema_name() -> String {
        "DateTime".to_owned()
    }

    fn json_schema(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::String.into()),
            format: Some("date-time".to_owned()),
            ..Default::default()
        }
        .into()
    }
}

impl DateTime {
    pub fn now() -> Self {
        DateTime(Utc::now())
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

impl From<ChronoDateTime<Utc>> for DateTime {
    fn from(dt: ChronoDateTime<Utc>) -> Self {
        DateTime(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_rfc3339_seconds() {
        let dt = DateTime(
            ChronoDateTime::parse_from_rfc3339("2025-03-01T12:34:56.789Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let json = serde_json::to_string(&dt).unwrap();
        assert_eq!(json, "\"2025-03-01T12:34:56Z\"");
    }

    #[test]
    fn test_round_trips() {
        let dt = DateTime(
            ChronoDateTime::parse_from_rfc3339("2025-03-01T12:34:56Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        let json = serde_json::to_string(&dt).unwrap();
        let back: DateTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dt);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(serde_json::from_str::<DateTime>("\"yesterday\"").is_err());
    }
}
