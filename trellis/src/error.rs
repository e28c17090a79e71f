use std::{fmt, sync::Arc, time::Duration};

/// Boxed error returned by listeners.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The single error type for all Trellis operations.
///
/// Every fallible Trellis API returns `trellis::Result<T>` (alias for
/// `Result<T, trellis::Error>`). Listener failures are captured in
/// [`ListenerError`] so they can be stored in a result slot, handed to the
/// `on_listener_error` hook and re-raised out of `emit` without losing the
/// original cause.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: &'static str },

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("No matching message within {0:?}")]
    Timeout(Duration),

    #[error("Listener was removed before a matching message arrived")]
    Cancelled,
}

impl Error {
    pub(crate) fn invalid_topic(topic: &str, reason: &'static str) -> Self {
        Error::InvalidTopic {
            topic: topic.to_string(),
            reason,
        }
    }

    /// The topic a listener failed on, if this is a listener failure.
    pub fn topic(&self) -> Option<&str> {
        match self {
            Error::Listener(e) => Some(e.topic()),
            _ => None,
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::InvalidTopic {
                    topic: a,
                    reason: ra,
                },
                Self::InvalidTopic {
                    topic: b,
                    reason: rb,
                },
            ) => a == b && ra == rb,
            (Self::Listener(a), Self::Listener(b)) => a == b,
            (Self::Timeout(a), Self::Timeout(b)) => a == b,
            (Self::Cancelled, Self::Cancelled) => true,
            _ => false,
        }
    }
}

impl Eq for Error {}

/// A listener failed while handling a message.
///
/// Wraps the original error together with the topic that triggered the
/// listener. The topic is the full emitted topic, not the scope-relative one.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Listener failed on '{topic}': {source}")]
pub struct ListenerError {
    topic: Arc<str>,
    #[source]
    source: Arc<dyn std::error::Error + Send + Sync>,
}

impl ListenerError {
    pub(crate) fn new(topic: Arc<str>, source: BoxError) -> Self {
        Self {
            topic,
            source: Arc::from(source),
        }
    }

    /// The emitted topic on which the listener failed.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The error returned (or panic raised) by the listener.
    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.source.as_ref()
    }

    /// Returns true if the listener panicked rather than returning an error.
    pub fn is_panic(&self) -> bool {
        self.source.is::<ListenerPanic>()
    }
}

impl PartialEq for ListenerError {
    fn eq(&self, other: &Self) -> bool {
        self.topic == other.topic && Arc::ptr_eq(&self.source, &other.source)
    }
}

impl Eq for ListenerError {}

/// Raised in place of a listener's return value when the listener panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerPanic(pub(crate) String);

impl ListenerPanic {
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener panicked: {}", self.0)
    }
}

impl std::error::Error for ListenerPanic {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn listener_error_displays_topic_and_cause() {
        let err = Error::from(ListenerError::new(Arc::from("a.b"), Box::new(Boom)));
        assert_eq!(err.to_string(), "Listener failed on 'a.b': boom");
        assert_eq!(err.topic(), Some("a.b"));
    }

    #[test]
    fn listener_error_equality_is_by_cause_identity() {
        let a = ListenerError::new(Arc::from("x"), Box::new(Boom));
        let b = ListenerError::new(Arc::from("x"), Box::new(Boom));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn panic_cause_is_detected() {
        let err = ListenerError::new(Arc::from("x"), Box::new(ListenerPanic("oops".into())));
        assert!(err.is_panic());
        assert!(err.to_string().contains("listener panicked: oops"));
    }
}
