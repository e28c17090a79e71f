use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt,
    future::Future,
    rc::{Rc, Weak},
    sync::Arc,
    time::Duration,
};

use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::{
    Config, Emission, EmitterBuilder, Error, ListenerId, ListenerResult, Message, Outcome, Result,
    Scope, Subscription,
    internal::{Tree, invoke},
    listener::{Callback, Entry, Location, boxed},
    subscription::{Detach, SubscriptionGuard},
    topic::{MULTI_WILDCARD, Pattern, Topic},
};

pub(crate) type ErrorHook = Box<dyn Fn(&str, &Error)>;
pub(crate) type LifecycleHook = Box<dyn Fn(&str)>;

#[derive(Default)]
pub(crate) struct Hooks {
    pub(crate) on_listener_error: Option<ErrorHook>,
    pub(crate) on_add_listener: Option<LifecycleHook>,
    pub(crate) on_remove_listener: Option<LifecycleHook>,
}

pub(crate) struct Shared<P, R> {
    tree: RefCell<Tree<P, R>>,
    config: Config,
    hooks: Hooks,
}

impl<P, R> Shared<P, R> {
    fn report(&self, topic: &str, error: &Error) {
        if let Some(hook) = &self.hooks.on_listener_error {
            hook(topic, error);
        }
    }

    fn notify_added(&self, pattern: &str) {
        if let Some(hook) = &self.hooks.on_add_listener {
            hook(pattern);
        }
    }

    fn notify_removed(&self, pattern: &str) {
        if let Some(hook) = &self.hooks.on_remove_listener {
            hook(pattern);
        }
    }

    fn notify_removed_all(&self, removed: Vec<Rc<Entry<P, R>>>) -> usize {
        let count = removed.len();
        for entry in removed {
            self.notify_removed(&entry.pattern);
        }
        count
    }
}

impl<P, R> Detach for Shared<P, R> {
    fn detach(&self, location: &Location, id: ListenerId) -> bool {
        let removed = self.tree.borrow_mut().remove(location, id);
        match removed {
            Some(entry) => {
                debug!(pattern = %entry.pattern, listener = %id, "listener removed");
                self.notify_removed(&entry.pattern);
                true
            }
            None => false,
        }
    }
}

/// Hierarchical topic-based publish/subscribe engine.
///
/// Listeners subscribe to delimiter-separated patterns, publishers emit
/// payloads on concrete topics and every matching listener is invoked
/// synchronously, in a fixed order, before `emit` returns.
///
/// # Patterns
///
/// - `sensor.kitchen.temp` matches exactly that topic
/// - `sensor.*.temp` matches any single segment in the middle
/// - `sensor.**` matches `sensor.kitchen` and `sensor.kitchen.temp`, but not `sensor`
///
/// # Dispatch order
///
/// At every level the literal branch is walked first, then `*`, then `**`,
/// depth first. Within a node, permanent listeners fire before
/// once-listeners, each in registration order. Listeners registered with
/// [`on_any`](Self::on_any) fire last.
///
/// # Results
///
/// `emit` returns one [`Outcome`] per invoked listener. With the default
/// configuration a failing listener (returned `Err` or panic) leaves its
/// error in its slot and dispatch continues. With
/// [`Config::with_ignore_errors(false)`](Config::with_ignore_errors) the
/// first failure stops dispatch and is returned from `emit`.
///
/// # Example
///
/// ```rust
/// use std::{cell::Cell, rc::Rc};
/// use trellis::Emitter;
///
/// let emitter = Emitter::<f64>::default();
/// let seen = Rc::new(Cell::new(0.0));
///
/// let s = seen.clone();
/// emitter.on("sensor.*.temp", move |msg| {
///     s.set(*msg.payload());
///     Ok(())
/// })?;
///
/// emitter.emit("sensor.kitchen.temp", 21.5)?;
/// assert_eq!(seen.get(), 21.5);
/// # Ok::<(), trellis::Error>(())
/// ```
///
/// `Emitter` is single-threaded. Clones share the same subscription tree.
pub struct Emitter<P, R = ()> {
    shared: Rc<Shared<P, R>>,
}

impl<P: Clone + 'static, R: 'static> Emitter<P, R> {
    /// Create a new emitter with the given configuration and no hooks.
    pub fn new(config: Config) -> Self {
        Self::with_hooks(config, Hooks::default())
    }

    pub(crate) fn with_hooks(config: Config, hooks: Hooks) -> Self {
        Self {
            shared: Rc::new(Shared {
                tree: RefCell::new(Tree::default()),
                config,
                hooks,
            }),
        }
    }

    /// Start building an emitter with hooks.
    ///
    /// ```rust
    /// use trellis::Emitter;
    ///
    /// let emitter = Emitter::<String>::builder()
    ///     .delimiter("/")
    ///     .on_listener_error(|topic, err| eprintln!("{topic}: {err}"))
    ///     .build();
    /// ```
    pub fn builder() -> EmitterBuilder<P, R> {
        EmitterBuilder::new()
    }

    /// Returns the emitter's configuration.
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn delimiter(&self) -> &str {
        self.shared.config.delimiter()
    }

    /// Register a permanent listener on `pattern`.
    ///
    /// If the pattern has no wildcard and a message is retained on that
    /// exact topic, the listener is invoked once with it before this
    /// returns. A failure during that replay is reported to the
    /// `on_listener_error` hook and logged, never returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] if the pattern is empty or malformed.
    pub fn on<F>(&self, pattern: &str, listener: F) -> Result<Subscription>
    where
        F: Fn(&Message<P>) -> ListenerResult<R> + 'static,
    {
        self.subscribe("", pattern, boxed(listener), false)
    }

    /// Register a listener that is removed after its first invocation.
    ///
    /// Once-listeners never receive a retained-message replay.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] if the pattern is empty or malformed.
    pub fn once<F>(&self, pattern: &str, listener: F) -> Result<Subscription>
    where
        F: Fn(&Message<P>) -> ListenerResult<R> + 'static,
    {
        self.subscribe("", pattern, boxed(listener), true)
    }

    /// Register a listener fired for every emitted topic, after all
    /// pattern matches.
    pub fn on_any<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Message<P>) -> ListenerResult<R> + 'static,
    {
        self.register(MULTI_WILDCARD.into(), Location::Any, boxed(listener), false)
    }

    /// Emit `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] if the topic is empty, malformed or
    /// contains a wildcard, and [`Error::Listener`] for the first failing
    /// listener when errors are not ignored.
    pub fn emit(&self, topic: &str, payload: P) -> Result<Vec<Outcome<R>>> {
        self.dispatch(Emission::new(topic, payload))
    }

    /// Emit and store the message as the retained value of `topic`.
    ///
    /// # Errors
    ///
    /// Same as [`emit`](Self::emit).
    pub fn emit_retained(&self, topic: &str, payload: P) -> Result<Vec<Outcome<R>>> {
        self.dispatch(Emission::new(topic, payload).retain())
    }

    /// Emit a fully specified [`Emission`] or a pre-built [`Message`].
    ///
    /// # Errors
    ///
    /// Same as [`emit`](Self::emit).
    pub fn emit_with<M: Into<Emission<P>>>(&self, emission: M) -> Result<Vec<Outcome<R>>> {
        self.dispatch(emission.into())
    }

    /// Wait for the first message matching `pattern`.
    ///
    /// The listener is registered before this returns, so a message
    /// emitted right after the call is not missed even if the future has
    /// not been polled yet. Dropping the future unsubscribes.
    ///
    /// A timeout requires a Tokio runtime with the time driver enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] immediately for a malformed pattern.
    /// The future resolves to [`Error::Timeout`] when `timeout` elapses
    /// first, or to [`Error::Cancelled`] if the listener is removed by
    /// `off_all`/`clear` while waiting.
    pub fn wait_for(
        &self,
        pattern: &str,
        timeout: Option<Duration>,
    ) -> Result<impl Future<Output = Result<Message<P>>> + use<P, R>> {
        self.wait_in("", pattern, timeout)
    }

    /// Remove a registration by id, wherever it lives.
    pub fn off(&self, id: ListenerId) -> bool {
        let removed = self.shared.tree.borrow_mut().remove_anywhere(id);
        self.removed_one(removed)
    }

    /// Remove a registration by id from the node of `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] if the pattern is malformed.
    pub fn off_at(&self, pattern: &str, id: ListenerId) -> Result<bool> {
        let location = Location::Path(self.pattern(pattern)?.segments().to_vec());
        let removed = self.shared.tree.borrow_mut().remove(&location, id);
        Ok(self.removed_one(removed))
    }

    /// Remove every listener registered with exactly `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] if the pattern is malformed.
    pub fn off_pattern(&self, pattern: &str) -> Result<usize> {
        let parsed = self.pattern(pattern)?;
        let removed = self.shared.tree.borrow_mut().remove_all_at(parsed.segments());
        debug!(pattern, removed = removed.len(), "pattern cleared");
        Ok(self.shared.notify_removed_all(removed))
    }

    /// Remove everything below `prefix` (or everything, for `None`),
    /// retained messages included. Returns the number of removed listeners.
    ///
    /// Listeners registered on exactly `prefix` are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] if the prefix is malformed.
    pub fn off_all(&self, prefix: Option<&str>) -> Result<usize> {
        match prefix {
            None => Ok(self.clear()),
            Some(prefix) => {
                let path = self.pattern(prefix)?;
                Ok(self.clear_under(path.segments()))
            }
        }
    }

    /// Drop every listener and retained message. Returns the number of
    /// removed listeners.
    pub fn clear(&self) -> usize {
        let removed = self.shared.tree.borrow_mut().clear();
        debug!(removed = removed.len(), "emitter cleared");
        self.shared.notify_removed_all(removed)
    }

    /// Create a namespaced view whose topics are prefixed with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] if the prefix is empty, malformed or
    /// contains a wildcard.
    pub fn scope(&self, prefix: &str) -> Result<Scope<P, R>> {
        Scope::new(self.clone(), prefix, Default::default())
    }

    /// Total number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.shared.tree.borrow().count()
    }

    /// Number of listeners registered with exactly `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] if the pattern is malformed.
    pub fn listener_count_at(&self, pattern: &str) -> Result<usize> {
        let location = Location::Path(self.pattern(pattern)?.segments().to_vec());
        Ok(self.shared.tree.borrow().count_at(&location))
    }

    /// All retained messages keyed by topic.
    pub fn retained_messages(&self) -> BTreeMap<String, Message<P>> {
        self.shared
            .tree
            .borrow()
            .retained()
            .into_iter()
            .map(|m| (m.topic().to_string(), m.clone()))
            .collect()
    }

    /// Retained messages whose topic matches `pattern`, ordered by topic.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`] if the pattern is malformed.
    pub fn retained(&self, pattern: &str) -> Result<Vec<Message<P>>> {
        let pattern = self.pattern(pattern)?;
        let delimiter = self.delimiter();
        Ok(self
            .retained_messages()
            .into_values()
            .filter(|m| {
                Topic::parse(m.topic(), delimiter).is_ok_and(|t| pattern.matches(&t))
            })
            .collect())
    }

    pub(crate) fn pattern(&self, pattern: &str) -> Result<Pattern> {
        Pattern::parse(pattern, self.delimiter())
    }

    /// Register `callback` on `prefix + pattern`, stripping `prefix` from
    /// every topic the callback sees.
    pub(crate) fn subscribe(
        &self,
        prefix: &str,
        pattern: &str,
        callback: Callback<P, R>,
        once: bool,
    ) -> Result<Subscription> {
        let full = format!("{prefix}{pattern}");
        let segments = self.pattern(&full)?.segments().to_vec();
        Ok(self.register(
            full,
            Location::Path(segments),
            strip_prefix(prefix, callback),
            once,
        ))
    }

    fn register(
        &self,
        pattern: String,
        location: Location,
        callback: Callback<P, R>,
        once: bool,
    ) -> Subscription {
        let pattern: Arc<str> = Arc::from(pattern);
        let (entry, replay) = {
            let mut tree = self.shared.tree.borrow_mut();
            let entry = Rc::new(Entry {
                id: tree.next_id(),
                pattern: pattern.clone(),
                location,
                once,
                callback,
            });
            let replay = tree.insert(entry.clone());
            (entry, replay)
        };

        debug!(pattern = %pattern, listener = %entry.id, once, "listener added");
        self.shared.notify_added(&pattern);

        if let Some(message) = replay {
            self.replay(&entry, &message);
        }

        let owner = Rc::downgrade(&self.shared) as Weak<dyn Detach>;
        Subscription::new(owner, entry.id, entry.location.clone(), pattern)
    }

    fn replay(&self, entry: &Entry<P, R>, message: &Message<P>) {
        let topic: Arc<str> = Arc::from(message.topic());
        trace!(topic = %topic, listener = %entry.id, "replaying retained message");
        if let Err(e) = invoke(entry, message, &topic) {
            warn!(topic = %topic, listener = %entry.id, error = %e.cause(), "listener failed on retained replay");
            self.shared.report(&topic, &Error::from(e));
        }
    }

    pub(crate) fn dispatch(&self, emission: Emission<P>) -> Result<Vec<Outcome<R>>> {
        let (message, retain) = emission.into_message(self.shared.config.meta());
        let topic = Topic::parse(message.topic(), self.delimiter())?;
        let name: Arc<str> = Arc::from(message.topic());

        let entries = self.shared.tree.borrow_mut().collect(&topic);
        trace!(topic = %name, message = %message.id(), listeners = entries.len(), retain, "emit");

        let ignore_errors = self.shared.config.ignore_errors();
        let mut results = Vec::with_capacity(entries.len());
        let mut consumed = Vec::new();
        let mut failure = None;
        let mut queue = entries.into_iter();

        for entry in queue.by_ref() {
            if entry.once {
                if !self.shared.tree.borrow_mut().settle(entry.id) {
                    continue;
                }
                consumed.push(entry.pattern.clone());
            }
            match invoke(&entry, &message, &name) {
                Ok(Some(value)) => results.push(Ok(value)),
                Ok(None) => {}
                Err(e) => {
                    warn!(topic = %name, listener = %entry.id, error = %e.cause(), "listener failed");
                    let error = Error::from(e.clone());
                    self.shared.report(&name, &error);
                    if ignore_errors {
                        results.push(Err(e));
                    } else {
                        failure = Some(error);
                        break;
                    }
                }
            }
        }

        let unreached: Vec<_> = queue.filter(|e| e.once).collect();
        if !unreached.is_empty() {
            self.shared.tree.borrow_mut().restore_once(unreached);
        }
        for pattern in consumed {
            self.shared.notify_removed(&pattern);
        }

        if retain {
            self.shared.tree.borrow_mut().retain(&topic, message);
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(results),
        }
    }

    pub(crate) fn wait_in(
        &self,
        prefix: &str,
        pattern: &str,
        timeout: Option<Duration>,
    ) -> Result<impl Future<Output = Result<Message<P>>> + use<P, R>> {
        let (tx, rx) = oneshot::channel::<Message<P>>();
        let slot = RefCell::new(Some(tx));
        let waiter: Callback<P, R> = Rc::new(move |message: &Message<P>| -> Option<ListenerResult<R>> {
            if let Some(tx) = slot.borrow_mut().take() {
                let _ = tx.send(message.clone());
            }
            None
        });
        let guard = SubscriptionGuard::new(self.subscribe(prefix, pattern, waiter, true)?);

        Ok(async move {
            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, rx).await {
                    Ok(received) => received.map_err(|_| Error::Cancelled),
                    Err(_) => Err(Error::Timeout(limit)),
                },
                None => rx.await.map_err(|_| Error::Cancelled),
            };
            drop(guard);
            outcome
        })
    }

    /// Remove a registration by id only if it lives strictly below `path`.
    pub(crate) fn off_under(&self, path: &[String], id: ListenerId) -> bool {
        let removed = self.shared.tree.borrow_mut().remove_under(path, id);
        self.removed_one(removed)
    }

    pub(crate) fn clear_under(&self, path: &[String]) -> usize {
        let removed = self.shared.tree.borrow_mut().clear_under(path);
        debug!(prefix = ?path, removed = removed.len(), "subtree cleared");
        self.shared.notify_removed_all(removed)
    }

    pub(crate) fn count_under(&self, path: &[String]) -> usize {
        self.shared.tree.borrow().count_under(path)
    }

    pub(crate) fn retained_under(&self, path: &[String]) -> Vec<Message<P>> {
        self.shared
            .tree
            .borrow()
            .retained_under(path)
            .into_iter()
            .cloned()
            .collect()
    }

    fn removed_one(&self, removed: Option<Rc<Entry<P, R>>>) -> bool {
        match removed {
            Some(entry) => {
                debug!(pattern = %entry.pattern, listener = %entry.id, "listener removed");
                self.shared.notify_removed(&entry.pattern);
                true
            }
            None => false,
        }
    }
}

fn strip_prefix<P: Clone + 'static, R: 'static>(
    prefix: &str,
    callback: Callback<P, R>,
) -> Callback<P, R> {
    if prefix.is_empty() {
        return callback;
    }
    let prefix = prefix.to_string();
    Rc::new(move |message: &Message<P>| {
        match message.topic().strip_prefix(prefix.as_str()) {
            Some(local) => callback(&message.retopic(local)),
            None => callback(message),
        }
    })
}

impl<P, R> Clone for Emitter<P, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<P: Clone + 'static, R: 'static> Default for Emitter<P, R> {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl<P, R> fmt::Debug for Emitter<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("config", &self.shared.config)
            .field("listeners", &self.shared.tree.try_borrow().map(|t| t.count()).ok())
            .finish_non_exhaustive()
    }
}
