use std::marker::PhantomData;

use crate::{Config, Emitter, Error, Meta, emitter::Hooks};

/// Builder for an [`Emitter`] with lifecycle and diagnostic hooks.
///
/// Returned by [`Emitter::builder`]. Starts from [`Config::default`].
///
/// # Examples
///
/// ```rust
/// use std::{cell::Cell, rc::Rc};
/// use trellis::{Config, Emitter};
///
/// let added = Rc::new(Cell::new(0));
/// let a = added.clone();
///
/// let emitter = Emitter::<u8>::builder()
///     .config(Config::default().with_delimiter("/"))
///     .on_add_listener(move |_pattern| a.set(a.get() + 1))
///     .on_listener_error(|topic, err| eprintln!("listener on {topic} failed: {err}"))
///     .build();
///
/// emitter.on("a/b", |_| Ok(()))?;
/// assert_eq!(added.get(), 1);
/// # Ok::<(), trellis::Error>(())
/// ```
pub struct EmitterBuilder<P, R = ()> {
    config: Config,
    hooks: Hooks,
    _types: PhantomData<fn() -> (P, R)>,
}

impl<P: Clone + 'static, R: 'static> EmitterBuilder<P, R> {
    pub(crate) fn new() -> Self {
        Self {
            config: Config::default(),
            hooks: Hooks::default(),
            _types: PhantomData,
        }
    }

    /// Replace the entire [`Config`].
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Transform the current [`Config`] with a closure.
    ///
    /// ```rust,ignore
    /// Emitter::<u8>::builder()
    ///     .with_config(|c| c.with_ignore_errors(false))
    ///     .build();
    /// ```
    pub fn with_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Config) -> Config,
    {
        self.config = f(self.config);
        self
    }

    /// Shorthand for [`Config::with_delimiter`].
    pub fn delimiter(mut self, delimiter: &str) -> Self {
        self.config = self.config.with_delimiter(delimiter);
        self
    }

    /// Shorthand for [`Config::with_ignore_errors`].
    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.config = self.config.with_ignore_errors(ignore);
        self
    }

    /// Shorthand for [`Config::with_meta`].
    pub fn meta(mut self, meta: Meta) -> Self {
        self.config = self.config.with_meta(meta);
        self
    }

    /// Called with `(topic, error)` for every listener failure, whether or
    /// not errors are ignored. Purely observational.
    pub fn on_listener_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &Error) + 'static,
    {
        self.hooks.on_listener_error = Some(Box::new(hook));
        self
    }

    /// Called with the full pattern after each registration.
    pub fn on_add_listener<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + 'static,
    {
        self.hooks.on_add_listener = Some(Box::new(hook));
        self
    }

    /// Called with the full pattern after each removal, including
    /// once-listeners consumed by dispatch and subtree clears.
    pub fn on_remove_listener<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + 'static,
    {
        self.hooks.on_remove_listener = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> Emitter<P, R> {
        Emitter::with_hooks(self.config, self.hooks)
    }
}

impl<P: Clone + 'static, R: 'static> Default for EmitterBuilder<P, R> {
    fn default() -> Self {
        Self::new()
    }
}
