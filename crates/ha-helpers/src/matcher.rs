//! Wildcard-or-set matching shared by the state and time trackers

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use std::borrow::Borrow;
use std::collections::HashSet;
use std::hash::Hash;

/// The reserved value that matches anything
pub const MATCH_ALL: &str = "*";

/// A filter that accepts anything or a fixed set of values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match<T: Eq + Hash> {
    /// Accept every value
    Any,
    /// Accept only these values
    OneOf(HashSet<T>),
}

impl<T: Eq + Hash> Match<T> {
    /// A filter that accepts every value
    pub fn any() -> Self {
        Match::Any
    }

    /// A filter that accepts the given values only
    pub fn one_of<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<T>,
    {
        Match::OneOf(values.into_iter().map(Into::into).collect())
    }

    /// Check a value against the filter
    pub fn matches<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        match self {
            Match::Any => true,
            Match::OneOf(values) => values.contains(value),
        }
    }

    /// Whether this filter accepts everything
    pub fn is_any(&self) -> bool {
        matches!(self, Match::Any)
    }
}

impl<T: Eq + Hash> Default for Match<T> {
    fn default() -> Self {
        Match::Any
    }
}

macro_rules! impl_numeric_match {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Match<$ty> {
                fn from(value: $ty) -> Self {
                    Match::one_of([value])
                }
            }

            impl From<Vec<$ty>> for Match<$ty> {
                fn from(values: Vec<$ty>) -> Self {
                    Match::one_of(values)
                }
            }

            impl<const N: usize> From<[$ty; N]> for Match<$ty> {
                fn from(values: [$ty; N]) -> Self {
                    Match::one_of(values)
                }
            }
        )*
    };
}

impl_numeric_match!(i32, u32);

/// State filters treat the string "*" as the wildcard
fn state_match<I, S>(values: I) -> Match<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let values: HashSet<String> = values.into_iter().map(Into::into).collect();
    if values.contains(MATCH_ALL) {
        Match::Any
    } else {
        Match::OneOf(values)
    }
}

impl From<&str> for Match<String> {
    fn from(value: &str) -> Self {
        state_match([value])
    }
}

impl From<String> for Match<String> {
    fn from(value: String) -> Self {
        state_match([value])
    }
}

impl From<Vec<&str>> for Match<String> {
    fn from(values: Vec<&str>) -> Self {
        state_match(values)
    }
}

impl From<Vec<String>> for Match<String> {
    fn from(values: Vec<String>) -> Self {
        state_match(values)
    }
}

impl<const N: usize> From<[&str; N]> for Match<String> {
    fn from(values: [&str; N]) -> Self {
        state_match(values)
    }
}

/// Calendar filter applied to timer ticks
///
/// Every field defaults to [`Match::Any`]; a tick matches when all fields do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimePattern {
    pub year: Match<i32>,
    pub month: Match<u32>,
    pub day: Match<u32>,
    pub hour: Match<u32>,
    pub minute: Match<u32>,
    pub second: Match<u32>,
}

impl TimePattern {
    /// A pattern matching every tick
    pub fn new() -> Self {
        Self::default()
    }

    pub fn year(mut self, year: impl Into<Match<i32>>) -> Self {
        self.year = year.into();
        self
    }

    pub fn month(mut self, month: impl Into<Match<u32>>) -> Self {
        self.month = month.into();
        self
    }

    pub fn day(mut self, day: impl Into<Match<u32>>) -> Self {
        self.day = day.into();
        self
    }

    pub fn hour(mut self, hour: impl Into<Match<u32>>) -> Self {
        self.hour = hour.into();
        self
    }

    pub fn minute(mut self, minute: impl Into<Match<u32>>) -> Self {
        self.minute = minute.into();
        self
    }

    pub fn second(mut self, second: impl Into<Match<u32>>) -> Self {
        self.second = second.into();
        self
    }

    /// Check every calendar field of `now`
    pub fn matches<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        self.year.matches(&now.year())
            && self.month.matches(&now.month())
            && self.day.matches(&now.day())
            && self.hour.matches(&now.hour())
            && self.minute.matches(&now.minute())
            && self.second.matches(&now.second())
    }
}
