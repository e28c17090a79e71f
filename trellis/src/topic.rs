use crate::{Error, Result};

/// Matches exactly one segment.
pub const SINGLE_WILDCARD: &str = "*";

/// Matches one or more trailing segments. Only valid as the last segment.
pub const MULTI_WILDCARD: &str = "**";

/// A concrete, segmented event name used at emit time.
///
/// Produced by splitting a topic string on the emitter's delimiter.
/// Every segment is non-empty and none of them is a wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic {
    segments: Vec<String>,
}

impl Topic {
    /// Parse a concrete topic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] if the string is empty, contains an
    /// empty segment, or contains a wildcard segment.
    pub fn parse(topic: &str, delimiter: &str) -> Result<Self> {
        let segments = split(topic, delimiter)?;
        if segments.iter().any(|s| is_wildcard(s)) {
            return Err(Error::invalid_topic(
                topic,
                "wildcards are not allowed in emitted topics",
            ));
        }
        Ok(Self { segments })
    }

    /// The segments in order. Never empty.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Join the segments back into a string using `delimiter`.
    pub fn join(&self, delimiter: &str) -> String {
        self.segments.join(delimiter)
    }
}

/// A subscription-time segmented name.
///
/// Any segment may be [`SINGLE_WILDCARD`]; the final segment may be
/// [`MULTI_WILDCARD`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pattern {
    segments: Vec<String>,
}

impl Pattern {
    /// Parse a subscription pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] if the string is empty, contains an
    /// empty segment, or uses `**` anywhere but the last segment.
    pub fn parse(pattern: &str, delimiter: &str) -> Result<Self> {
        let segments = split(pattern, delimiter)?;
        let last = segments.len() - 1;
        if segments[..last].iter().any(|s| s == MULTI_WILDCARD) {
            return Err(Error::invalid_topic(
                pattern,
                "'**' is only valid as the last segment",
            ));
        }
        Ok(Self { segments })
    }

    /// The pattern matching every topic.
    pub fn any() -> Self {
        Self {
            segments: vec![MULTI_WILDCARD.to_string()],
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns true if any segment is `*` or `**`.
    pub fn has_wildcard(&self) -> bool {
        self.segments.iter().any(|s| is_wildcard(s))
    }

    /// Returns true if `topic` matches this pattern. See [`matches`].
    pub fn matches(&self, topic: &Topic) -> bool {
        matches(topic.segments(), &self.segments)
    }

    pub fn join(&self, delimiter: &str) -> String {
        self.segments.join(delimiter)
    }
}

impl From<Topic> for Pattern {
    fn from(topic: Topic) -> Self {
        Pattern {
            segments: topic.segments,
        }
    }
}

/// Does a concrete segment sequence match a pattern segment sequence?
///
/// - `*` matches exactly one segment, never zero.
/// - a trailing `**` matches one or more segments, so `a/**` matches `a/b`
///   and `a/b/c` but not `a`.
/// - everything else is literal equality, position by position.
pub fn matches<T, P>(topic: &[T], pattern: &[P]) -> bool
where
    T: AsRef<str>,
    P: AsRef<str>,
{
    let (head, multi) = match pattern.split_last() {
        Some((last, head)) if last.as_ref() == MULTI_WILDCARD => (head, true),
        _ => (pattern, false),
    };

    let length_ok = if multi {
        topic.len() > head.len()
    } else {
        topic.len() == head.len()
    };

    length_ok
        && head.iter().zip(topic).all(|(p, t)| {
            let p = p.as_ref();
            p == SINGLE_WILDCARD || p == t.as_ref()
        })
}

pub(crate) fn is_wildcard(segment: &str) -> bool {
    segment == SINGLE_WILDCARD || segment == MULTI_WILDCARD
}

fn split(raw: &str, delimiter: &str) -> Result<Vec<String>> {
    if raw.is_empty() {
        return Err(Error::invalid_topic(raw, "topic is empty"));
    }
    let segments: Vec<String> = raw.split(delimiter).map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(Error::invalid_topic(raw, "topic contains an empty segment"));
    }
    Ok(segments)
}
