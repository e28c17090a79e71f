use serde_json::Value;

use crate::{Message, Meta};

/// Everything needed to emit one message.
///
/// [`Emitter::emit_with`](crate::Emitter::emit_with) accepts any
/// `T: Into<Emission<P>>`, so either shape works at the call site:
///
/// ```rust,ignore
/// // topic + payload, optionally retained and with per-emit meta
/// emitter.emit_with(Emission::new("sensor.temp", 21.5).retain().meta("unit", "C"))?;
///
/// // a pre-built message
/// emitter.emit_with(Message::new("sensor.temp", 21.5))?;
///
/// // a (topic, payload) tuple
/// emitter.emit_with(("sensor.temp", 21.5))?;
/// ```
///
/// Both shapes are resolved into a single canonical [`Message`] before
/// dispatch starts.
#[derive(Debug, Clone)]
pub struct Emission<P> {
    source: Source<P>,
    retain: bool,
    scope_meta: Meta,
    meta: Meta,
}

#[derive(Debug, Clone)]
enum Source<P> {
    Parts { topic: String, payload: P },
    Message(Message<P>),
}

impl<P> Emission<P> {
    pub fn new(topic: impl Into<String>, payload: P) -> Self {
        Self {
            source: Source::Parts {
                topic: topic.into(),
                payload,
            },
            retain: false,
            scope_meta: Meta::new(),
            meta: Meta::new(),
        }
    }

    /// Store the message as the retained value of its topic after dispatch.
    #[must_use]
    pub fn retain(self) -> Self {
        self.retained(true)
    }

    #[must_use]
    pub fn retained(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Add one per-emit meta entry.
    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key, value);
        self
    }

    /// Overlay a whole per-emit meta map.
    #[must_use]
    pub fn with_meta(mut self, meta: &Meta) -> Self {
        self.meta.extend(meta);
        self
    }

    pub fn topic(&self) -> &str {
        match &self.source {
            Source::Parts { topic, .. } => topic,
            Source::Message(message) => message.topic(),
        }
    }

    pub fn is_retained(&self) -> bool {
        self.retain
    }

    /// Prepend a scope prefix to the topic.
    pub(crate) fn prefixed(mut self, prefix: &str) -> Self {
        match &mut self.source {
            Source::Parts { topic, .. } => topic.insert_str(0, prefix),
            Source::Message(message) => {
                let topic = format!("{prefix}{}", message.topic());
                message.set_topic(topic);
            }
        }
        self
    }

    /// Record the meta of the scope this emission passes through. Outer
    /// scopes are applied later and end up underneath.
    pub(crate) fn under_meta(mut self, meta: &Meta) -> Self {
        if !meta.is_empty() {
            self.scope_meta = meta.merged(&self.scope_meta);
        }
        self
    }

    /// Resolve into the canonical message.
    ///
    /// Layers, later overriding earlier: `base`, scope meta, the pre-built
    /// message's own meta, per-emit meta.
    pub(crate) fn into_message(self, base: &Meta) -> (Message<P>, bool) {
        let below = base.merged(&self.scope_meta);
        let message = match self.source {
            Source::Parts { topic, payload } => {
                Message::new(topic, payload).with_meta(below.merged(&self.meta))
            }
            Source::Message(mut message) => {
                let own = below.merged(message.meta()).merged(&self.meta);
                *message.meta_mut() = own;
                message
            }
        };
        (message, self.retain)
    }
}

impl<P> From<Message<P>> for Emission<P> {
    fn from(message: Message<P>) -> Self {
        Self {
            source: Source::Message(message),
            retain: false,
            scope_meta: Meta::new(),
            meta: Meta::new(),
        }
    }
}

impl<P, T: Into<String>> From<(T, P)> for Emission<P> {
    fn from((topic, payload): (T, P)) -> Self {
        Emission::new(topic, payload)
    }
}
