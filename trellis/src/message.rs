use std::{fmt, hash, time::SystemTime};

use uuid::Uuid;

use crate::Meta;

/// Identity of an emitted [`Message`], assigned by [`Message::new`].
///
/// Scoped listeners receive copies of a message under a shorter topic; all
/// copies share the id. Not ordered in time, see [`Message::timestamp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, hash::Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct MessageId(Uuid);

impl MessageId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The unit delivered to every listener.
///
/// Pairs the user payload with the topic it was emitted on and the merged
/// [`Meta`]. The topic is listener-relative: a listener registered through a
/// [`Scope`](crate::Scope) sees the topic with the scope prefix stripped.
///
/// A pre-built message can be passed to
/// [`Emitter::emit_with`](crate::Emitter::emit_with); its topic is then
/// parsed like any other emitted topic.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(bound(
        serialize = "P: serde::Serialize",
        deserialize = "P: serde::de::DeserializeOwned"
    ))
)]
pub struct Message<P> {
    id: MessageId,
    timestamp: u64,
    topic: String,
    payload: P,
    meta: Meta,
}

impl<P> Message<P> {
    pub fn new(topic: impl Into<String>, payload: P) -> Self {
        Self {
            id: MessageId::generate(),
            timestamp: now_nanos(),
            topic: topic.into(),
            payload,
            meta: Meta::new(),
        }
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    /// The topic as seen by the receiving listener.
    #[inline]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[inline]
    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    #[inline]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    #[inline]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Creation time in nanoseconds since Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub(crate) fn set_topic(&mut self, topic: String) {
        self.topic = topic;
    }

    pub(crate) fn meta_mut(&mut self) -> &mut Meta {
        &mut self.meta
    }
}

impl<P: Clone> Message<P> {
    /// Copy of this message delivered under a different topic name.
    pub(crate) fn retopic(&self, topic: &str) -> Self {
        Self {
            id: self.id,
            timestamp: self.timestamp,
            topic: topic.to_string(),
            payload: self.payload.clone(),
            meta: self.meta.clone(),
        }
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

impl<P: PartialEq> PartialEq for Message<P> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.topic == other.topic && self.payload == other.payload
    }
}

impl<P: Eq> Eq for Message<P> {}

impl<P: hash::Hash> hash::Hash for Message<P> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.topic.hash(state);
        self.payload.hash(state);
    }
}

impl<P: fmt::Debug> fmt::Debug for Message<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("payload", &self.payload)
            .field("meta", &self.meta)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl<P: fmt::Display> fmt::Display for Message<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message {{ id: {}, topic: {}, payload: {} }}",
            self.id, self.topic, self.payload
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_debug() {
        let msg = Message::new("sensor.temp", 42).with_meta(Meta::new().with("unit", "C"));
        let debug_str = format!("{:?}", msg);

        assert!(debug_str.contains("sensor.temp"));
        assert!(debug_str.contains("42"));
        assert!(debug_str.contains("unit"));
    }

    #[test]
    fn every_message_gets_a_fresh_v4_id() {
        let a = Message::new("t", ());
        let b = Message::new("t", ());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().as_uuid().get_version_num(), 4);
        assert_eq!(a.id().to_string().len(), 36);
    }

    #[test]
    fn retopic_keeps_identity() {
        let msg = Message::new("home.kitchen.temp", 21);
        let local = msg.retopic("kitchen.temp");
        assert_eq!(local.id(), msg.id());
        assert_eq!(local.topic(), "kitchen.temp");
        assert_eq!(local.payload(), &21);
    }
}
