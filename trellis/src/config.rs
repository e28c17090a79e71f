use crate::Meta;

/// Runtime configuration for an [`Emitter`](crate::Emitter).
///
/// Plain data only. Closure hooks (listener-error diagnostics, add/remove
/// lifecycle callbacks) are attached through
/// [`EmitterBuilder`](crate::EmitterBuilder).
///
/// # Examples
///
/// ```rust
/// use trellis::{Config, Meta};
///
/// let config = Config::default()
///     .with_delimiter("/")                        // MQTT-style topics
///     .with_ignore_errors(false)                  // first listener error aborts emit
///     .with_meta(Meta::new().with("app", "demo")); // merged into every message
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Segment separator for topics and patterns.
    /// Default: "."
    delimiter: String,

    /// When true, a failing listener's error is stored in its result slot
    /// and dispatch continues. When false, the first failure aborts `emit`.
    /// Default: true
    ignore_errors: bool,

    /// Static meta merged underneath every emitted message.
    /// Default: empty
    meta: Meta,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            delimiter: ".".to_string(),
            ignore_errors: true,
            meta: Meta::new(),
        }
    }
}

impl Config {
    /// Set the topic segment separator.
    ///
    /// # Panics
    ///
    /// Panics if `delimiter` is empty.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        let delimiter = delimiter.into();
        assert!(!delimiter.is_empty(), "topic delimiter must not be empty");
        self.delimiter = delimiter;
        self
    }

    /// Returns the topic segment separator.
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Choose between swallowing listener errors into the result sequence
    /// (`true`) and aborting `emit` on the first one (`false`).
    pub fn with_ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    pub fn ignore_errors(&self) -> bool {
        self.ignore_errors
    }

    /// Set the static meta merged into every message.
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }
}
