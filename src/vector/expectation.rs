use std::fmt::{self, Display, Formatter};

use chrono::{Datelike, NaiveDateTime, Timelike};

use crate::backend::{Extent, FieldValue, TZ_FLAG_GMT};

/// Schema and extent a layer is expected to have.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerExpectation {
    pub name: String,
    pub feature_count: u64,
    /// Declared geometry type, as OGR names it (`"Polygon"`, `"3D Point"`, ...).
    pub geometry_type: String,
    pub field_count: usize,
    pub bbox: Extent,
}

/// OGR's broken-down time: year, month, day, hour, minute, second and time zone flag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OgrDateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: f64,
    pub tz_flag: i32,
}

impl OgrDateTime {
    pub fn new(datetime: &NaiveDateTime, tz_flag: i32) -> Self {
        Self {
            year: datetime.year(),
            month: datetime.month(),
            day: datetime.day(),
            hour: datetime.hour(),
            minute: datetime.minute(),
            second: f64::from(datetime.second())
                + f64::from(datetime.nanosecond()) / 1_000_000_000.0,
            tz_flag,
        }
    }

    /// The time as a GMT timestamp.
    pub fn gmt(datetime: &NaiveDateTime) -> Self {
        Self::new(datetime, TZ_FLAG_GMT)
    }

    /// Broken-down time of a date or date-time field value.
    pub fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::DateTime(datetime, tz_flag) => Some(Self::new(datetime, *tz_flag)),
            FieldValue::Date(date) => date.and_hms_opt(0, 0, 0).map(|dt| Self::new(&dt, 0)),
            _ => None,
        }
    }
}

impl Display for OgrDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {}, {}, {})",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.tz_flag
        )
    }
}

/// An expected field value.
///
/// Text is compared against the field rendered as text, timestamps as
/// [`OgrDateTime`], and numbers as numbers.
#[derive(Clone, Debug, PartialEq)]
pub enum Expected {
    Text(String),
    Integer(i64),
    Real(f64),
    Timestamp(OgrDateTime),
    Null,
}

impl Expected {
    #[allow(clippy::float_cmp)]
    pub fn matches(&self, actual: &FieldValue) -> bool {
        match self {
            Expected::Text(text) => !matches!(actual, FieldValue::Null) && actual.to_text() == *text,
            Expected::Integer(v) => match actual {
                FieldValue::Integer(a) => a == v,
                FieldValue::Real(a) => *a == *v as f64,
                _ => false,
            },
            Expected::Real(v) => match actual {
                FieldValue::Integer(_) | FieldValue::Real(_) => actual.as_f64() == Some(*v),
                _ => false,
            },
            Expected::Timestamp(expected) => OgrDateTime::from_field(actual).as_ref() == Some(expected),
            Expected::Null => matches!(actual, FieldValue::Null),
        }
    }
}

impl Display for Expected {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Text(text) => write!(f, "{text:?}"),
            Expected::Integer(v) => write!(f, "{v}"),
            Expected::Real(v) => write!(f, "{v}"),
            Expected::Timestamp(dt) => write!(f, "{dt}"),
            Expected::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for Expected {
    fn from(text: &str) -> Self {
        Expected::Text(text.to_string())
    }
}

impl From<String> for Expected {
    fn from(text: String) -> Self {
        Expected::Text(text)
    }
}

impl From<i32> for Expected {
    fn from(v: i32) -> Self {
        Expected::Integer(v.into())
    }
}

impl From<i64> for Expected {
    fn from(v: i64) -> Self {
        Expected::Integer(v)
    }
}

impl From<f64> for Expected {
    fn from(v: f64) -> Self {
        Expected::Real(v)
    }
}

/// A naive timestamp is expected to be stored as GMT.
impl From<NaiveDateTime> for Expected {
    fn from(datetime: NaiveDateTime) -> Self {
        Expected::Timestamp(OgrDateTime::gmt(&datetime))
    }
}

impl From<OgrDateTime> for Expected {
    fn from(datetime: OgrDateTime) -> Self {
        Expected::Timestamp(datetime)
    }
}

impl<T: Into<Expected>> From<Option<T>> for Expected {
    fn from(value: Option<T>) -> Self {
        value.map_or(Expected::Null, Into::into)
    }
}

/// The geometry a feature is expected to carry.
#[derive(Clone, Debug)]
pub enum GeometryExpectation<'a, G> {
    Wkt(&'a str),
    Geometry(&'a G),
    None,
}

impl<'a, G> From<&'a str> for GeometryExpectation<'a, G> {
    fn from(wkt: &'a str) -> Self {
        GeometryExpectation::Wkt(wkt)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn datetime() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(12, 30, 15, 500)
            .unwrap()
    }

    #[test]
    fn test_timestamp_is_gmt_tuple() {
        let expected = Expected::from(datetime());
        assert_eq!(
            expected,
            Expected::Timestamp(OgrDateTime {
                year: 2024,
                month: 3,
                day: 1,
                hour: 12,
                minute: 30,
                second: 15.5,
                tz_flag: 100,
            })
        );
        assert!(expected.matches(&FieldValue::DateTime(datetime(), TZ_FLAG_GMT)));
        // Same wall clock time in an unknown zone is a different timestamp.
        assert!(!expected.matches(&FieldValue::DateTime(datetime(), 0)));
    }

    #[test]
    fn test_text_compares_rendering() {
        assert!(Expected::from("7").matches(&FieldValue::Integer(7)));
        assert!(Expected::from("(2:1,2)").matches(&FieldValue::IntegerList(vec![1, 2])));
        assert!(!Expected::from("").matches(&FieldValue::Null));
    }

    #[test]
    fn test_scalars() {
        assert!(Expected::from(168_i64).matches(&FieldValue::Integer(168)));
        assert!(Expected::from(168_i64).matches(&FieldValue::Real(168.0)));
        assert!(!Expected::from(168_i64).matches(&FieldValue::String("168".into())));
        assert!(Expected::from(1.5).matches(&FieldValue::Real(1.5)));
        assert!(!Expected::from(1.5).matches(&FieldValue::Real(1.500001)));
        assert!(Expected::from(None::<i64>).matches(&FieldValue::Null));
        assert!(!Expected::Null.matches(&FieldValue::Integer(0)));
    }
}
