use std::{fmt, str::FromStr};

use anyhow::{Error, bail};

const SINGLE_LEVEL_WILDCARD: &str = "+";
const MULTI_LEVEL_WILDCARD: &str = "#";

/// An MQTT topic filter with exactly one `+` segment, which captures the location.
///
/// `sensors/tele/+/SENSOR` matches `sensors/tele/livingroom/SENSOR` and yields
/// `livingroom`. The same string is used as the broker subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    filter: String,
    prefix: Vec<String>,
    suffix: Vec<String>,
}

impl TopicPattern {
    pub fn as_str(&self) -> &str {
        &self.filter
    }

    pub fn route<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let segments: Vec<&str> = topic.split('/').collect();
        if segments.len() != self.prefix.len() + 1 + self.suffix.len() {
            return None;
        }

        let (head, rest) = segments.split_at(self.prefix.len());
        let (location, tail) = rest.split_first()?;

        if location.is_empty()
            || !head.iter().eq(self.prefix.iter())
            || !tail.iter().eq(self.suffix.iter())
        {
            return None;
        }

        Some(*location)
    }
}

impl FromStr for TopicPattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.split('/').collect();

        if segments.iter().any(|segment| segment.is_empty()) {
            bail!("topic pattern has an empty segment: {s}");
        }
        if s.contains(MULTI_LEVEL_WILDCARD) {
            bail!("topic pattern must not contain '#': {s}");
        }
        if segments
            .iter()
            .any(|segment| segment.contains('+') && *segment != SINGLE_LEVEL_WILDCARD)
        {
            bail!("'+' must occupy a whole segment: {s}");
        }

        let wildcards: Vec<usize> = segments
            .iter()
            .enumerate()
            .filter(|(_, segment)| **segment == SINGLE_LEVEL_WILDCARD)
            .map(|(i, _)| i)
            .collect();
        let &[position] = wildcards.as_slice() else {
            bail!(
                "topic pattern must contain exactly one '+' segment, got {}: {s}",
                wildcards.len()
            );
        };

        Ok(Self {
            filter: s.to_owned(),
            prefix: segments[..position].iter().map(|s| s.to_string()).collect(),
            suffix: segments[position + 1..]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        })
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.filter)
    }
}
