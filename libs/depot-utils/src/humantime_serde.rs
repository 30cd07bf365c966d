//! Serde helpers for human-readable durations (`"30s"`, `"2m 10s"`).
//!
//! ```
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct Session {
//!     #[serde(with = "depot_utils::humantime_serde")]
//!     refresh_timeout: Duration,
//! }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserializer, Serializer, de};

struct DurationVisitor;

impl de::Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a duration such as \"30s\" or \"1m 30s\"")
    }

    fn visit_str<E>(self, v: &str) -> Result<Duration, E>
    where
        E: de::Error,
    {
        humantime::parse_duration(v).map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

/// Deserialize a `Duration` from a humantime string.
///
/// # Errors
///
/// Fails when the input is not a string or does not parse as a duration.
pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    d.deserialize_str(DurationVisitor)
}

/// Serialize a `Duration` as a humantime string.
///
/// # Errors
///
/// Propagates serializer errors.
pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&humantime::format_duration(*d).to_string())
}

pub mod option {
    //! `Option<Duration>` variant; combine with `#[serde(default)]`.

    use std::fmt;
    use std::time::Duration;

    use serde::{Deserializer, Serializer, de};

    struct OptionVisitor;

    impl<'de> de::Visitor<'de> for OptionVisitor {
        type Value = Option<Duration>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an optional duration")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, d: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            super::deserialize(d).map(Some)
        }
    }

    /// # Errors
    ///
    /// Fails when a present value does not parse as a duration.
    pub fn deserialize<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        d.deserialize_option(OptionVisitor)
    }

    /// # Errors
    ///
    /// Propagates serializer errors.
    #[allow(clippy::ref_option)]
    pub fn serialize<S>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match d {
            Some(d) => super::serialize(d, s),
            None => s.serialize_none(),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct Session {
        #[serde(with = "super")]
        refresh_timeout: Duration,
        #[serde(with = "super::option", default)]
        idle_timeout: Option<Duration>,
    }

    #[test]
    fn parses_humantime_strings() {
        let s: Session = serde_json::from_str(r#"{"refresh_timeout":"1m 30s"}"#).unwrap();
        assert_eq!(s.refresh_timeout, Duration::from_secs(90));
        assert_eq!(s.idle_timeout, None);
    }

    #[test]
    fn optional_value_present_and_null() {
        let s: Session =
            serde_json::from_str(r#"{"refresh_timeout":"5s","idle_timeout":"10m"}"#).unwrap();
        assert_eq!(s.idle_timeout, Some(Duration::from_secs(600)));

        let s: Session =
            serde_json::from_str(r#"{"refresh_timeout":"5s","idle_timeout":null}"#).unwrap();
        assert_eq!(s.idle_timeout, None);
    }

    #[test]
    fn serializes_back_to_humantime() {
        let s = Session {
            refresh_timeout: Duration::from_secs(30),
            idle_timeout: None,
        };
        assert_eq!(
            serde_json::to_string(&s).unwrap(),
            r#"{"refresh_timeout":"30s","idle_timeout":null}"#
        );
    }

    #[test]
    fn rejects_garbage() {
        let r = serde_json::from_str::<Session>(r#"{"refresh_timeout":"soon"}"#);
        assert!(r.is_err());
    }
}
