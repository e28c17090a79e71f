use std::{collections::BTreeMap, fmt, future::Future, time::Duration};

use crate::{
    Emission, Emitter, Error, ListenerId, ListenerResult, Message, Meta, Outcome, Result, Subscription,
    listener::boxed,
    topic::{MULTI_WILDCARD, Topic},
};

/// A namespaced view over an [`Emitter`].
///
/// Every pattern and topic passed to a scope is prefixed with the scope's
/// prefix before reaching the owning emitter, and every topic a scoped
/// listener receives has the prefix stripped again. Deeper segments stay
/// visible.
///
/// A scope owns no storage: listeners, retained messages and listener
/// counts all live in the one tree of the root emitter. Scopes of scopes
/// concatenate their prefixes.
///
/// ```rust
/// use std::{cell::RefCell, rc::Rc};
/// use trellis::Emitter;
///
/// let emitter = Emitter::<u32>::default();
/// let kitchen = emitter.scope("home")?.scope("kitchen")?;
///
/// let topics = Rc::new(RefCell::new(Vec::new()));
/// let t = topics.clone();
/// kitchen.on("*.temp", move |msg| {
///     t.borrow_mut().push(msg.topic().to_string());
///     Ok(())
/// })?;
///
/// emitter.emit("home.kitchen.oven.temp", 180)?;
/// assert_eq!(*topics.borrow(), ["oven.temp"]);
/// # Ok::<(), trellis::Error>(())
/// ```
pub struct Scope<P, R = ()> {
    owner: Emitter<P, R>,
    prefix: String,
    path: Vec<String>,
    meta: Meta,
}

impl<P: Clone + 'static, R: 'static> Scope<P, R> {
    pub(crate) fn new(owner: Emitter<P, R>, prefix: &str, meta: Meta) -> Result<Self> {
        let delimiter = owner.delimiter();
        let trimmed = prefix.strip_suffix(delimiter).unwrap_or(prefix);
        let topic = Topic::parse(trimmed, delimiter)?;
        let prefix = format!("{}{delimiter}", topic.join(delimiter));
        let path = topic.segments().to_vec();
        Ok(Self {
            owner,
            prefix,
            path,
            meta,
        })
    }

    /// The normalized, delimiter-terminated prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The root emitter this scope delegates to.
    pub fn emitter(&self) -> &Emitter<P, R> {
        &self.owner
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Meta injected into every message emitted through this scope, between
    /// the emitter's static meta and per-emit meta.
    #[must_use]
    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta.extend(&meta);
        self
    }

    /// Scoped [`Emitter::on`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`](crate::Error::InvalidTopic) if the
    /// pattern is empty or malformed.
    pub fn on<F>(&self, pattern: &str, listener: F) -> Result<Subscription>
    where
        F: Fn(&Message<P>) -> ListenerResult<R> + 'static,
    {
        self.owner
            .subscribe(&self.prefix, pattern, boxed(listener), false)
    }

    /// Scoped [`Emitter::once`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`](crate::Error::InvalidTopic) if the
    /// pattern is empty or malformed.
    pub fn once<F>(&self, pattern: &str, listener: F) -> Result<Subscription>
    where
        F: Fn(&Message<P>) -> ListenerResult<R> + 'static,
    {
        self.owner
            .subscribe(&self.prefix, pattern, boxed(listener), true)
    }

    /// Listener for every topic below this scope's prefix.
    pub fn on_any<F>(&self, listener: F) -> Result<Subscription>
    where
        F: Fn(&Message<P>) -> ListenerResult<R> + 'static,
    {
        self.owner
            .subscribe(&self.prefix, MULTI_WILDCARD, boxed(listener), false)
    }

    /// Scoped [`Emitter::emit`].
    ///
    /// # Errors
    ///
    /// Same as [`Emitter::emit`].
    pub fn emit(&self, topic: &str, payload: P) -> Result<Vec<Outcome<R>>> {
        self.emit_with(Emission::new(topic, payload))
    }

    /// Scoped [`Emitter::emit_retained`].
    ///
    /// # Errors
    ///
    /// Same as [`Emitter::emit`].
    pub fn emit_retained(&self, topic: &str, payload: P) -> Result<Vec<Outcome<R>>> {
        self.emit_with(Emission::new(topic, payload).retain())
    }

    /// Scoped [`Emitter::emit_with`].
    ///
    /// # Errors
    ///
    /// Same as [`Emitter::emit`].
    pub fn emit_with<M: Into<Emission<P>>>(&self, emission: M) -> Result<Vec<Outcome<R>>> {
        let emission = emission
            .into()
            .prefixed(&self.prefix)
            .under_meta(&self.meta);
        self.owner.dispatch(emission)
    }

    /// Scoped [`Emitter::wait_for`]. The resolved message carries the
    /// scope-relative topic.
    ///
    /// # Errors
    ///
    /// Same as [`Emitter::wait_for`].
    pub fn wait_for(
        &self,
        pattern: &str,
        timeout: Option<Duration>,
    ) -> Result<impl Future<Output = Result<Message<P>>> + use<P, R>> {
        self.owner.wait_in(&self.prefix, pattern, timeout)
    }

    /// Remove a registration by id. Registrations outside this scope are
    /// left alone and yield false.
    pub fn off(&self, id: ListenerId) -> bool {
        self.owner.off_under(&self.path, id)
    }

    /// Remove a registration by id from the node of the scoped `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`](crate::Error::InvalidTopic) if the
    /// pattern is malformed.
    pub fn off_at(&self, pattern: &str, id: ListenerId) -> Result<bool> {
        self.owner.off_at(&self.scoped(pattern), id)
    }

    /// Remove every listener registered with exactly the scoped `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`](crate::Error::InvalidTopic) if the
    /// pattern is malformed.
    pub fn off_pattern(&self, pattern: &str) -> Result<usize> {
        self.owner.off_pattern(&self.scoped(pattern))
    }

    /// Remove everything below this scope (or below `prefix` inside it).
    ///
    /// Siblings and listeners registered on exactly the scope prefix by the
    /// parent are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`](crate::Error::InvalidTopic) if
    /// `prefix` is malformed.
    pub fn off_all(&self, prefix: Option<&str>) -> Result<usize> {
        match prefix {
            None => Ok(self.owner.clear_under(&self.path)),
            Some(prefix) => self.owner.off_all(Some(&self.scoped(prefix))),
        }
    }

    /// Alias for `off_all(None)`.
    pub fn clear(&self) -> usize {
        self.owner.clear_under(&self.path)
    }

    /// A nested scope. Prefixes concatenate and scope meta is inherited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTopic`](crate::Error::InvalidTopic) if the
    /// prefix is empty, malformed or contains a wildcard.
    pub fn scope(&self, prefix: &str) -> Result<Scope<P, R>> {
        if prefix.is_empty() {
            return Err(Error::invalid_topic(prefix, "topic is empty"));
        }
        Scope::new(
            self.owner.clone(),
            &self.scoped(prefix),
            self.meta.clone(),
        )
    }

    /// Number of listeners registered below this scope.
    pub fn listener_count(&self) -> usize {
        self.owner.count_under(&self.path)
    }

    /// Retained messages below this scope, keyed and delivered by
    /// scope-relative topic.
    pub fn retained_messages(&self) -> BTreeMap<String, Message<P>> {
        self.owner
            .retained_under(&self.path)
            .into_iter()
            .filter_map(|m| {
                let local = m.topic().strip_prefix(self.prefix.as_str())?.to_string();
                let message = m.retopic(&local);
                Some((local, message))
            })
            .collect()
    }

    fn scoped(&self, pattern: &str) -> String {
        format!("{}{pattern}", self.prefix)
    }
}

impl<P, R> Clone for Scope<P, R> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            prefix: self.prefix.clone(),
            path: self.path.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<P, R> fmt::Debug for Scope<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("prefix", &self.prefix)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::Spy;

    #[test]
    fn prefix_is_normalized() {
        let emitter = Emitter::<u32>::default();
        assert_eq!(emitter.scope("user").unwrap().prefix(), "user.");
        assert_eq!(emitter.scope("user.").unwrap().prefix(), "user.");
        assert_eq!(
            emitter.scope("a").unwrap().scope("b.c").unwrap().prefix(),
            "a.b.c."
        );
        assert!(emitter.scope("").is_err());
        assert!(emitter.scope("a").unwrap().scope("").is_err());
    }

    #[test]
    fn scoped_listeners_see_relative_topics() {
        let emitter = Emitter::<u32>::default();
        let user = emitter.scope("user").unwrap();
        let spy = Spy::new();
        user.on("*.login", spy.listener()).unwrap();

        emitter.emit("user.alice.login", 1).unwrap();
        user.emit("bob.login", 2).unwrap();
        emitter.emit("admin.carol.login", 3).unwrap();

        assert_eq!(spy.topics(), ["alice.login", "bob.login"]);
    }

    #[test]
    fn root_listeners_see_full_topics_of_scoped_emits() {
        let emitter = Emitter::<u32>::default();
        let spy = Spy::new();
        emitter.on("user.**", spy.listener()).unwrap();

        emitter.scope("user").unwrap().emit("x.y", 1).unwrap();

        assert_eq!(spy.topics(), ["user.x.y"]);
    }

    #[test]
    fn scope_on_any_covers_only_its_subtree() {
        let emitter = Emitter::<u32>::default();
        let spy = Spy::new();
        emitter.scope("svc").unwrap().on_any(spy.listener()).unwrap();

        emitter.emit("svc", 0).unwrap();
        emitter.emit("svc.a", 1).unwrap();
        emitter.emit("svc.a.b", 2).unwrap();
        emitter.emit("other", 3).unwrap();

        assert_eq!(spy.topics(), ["a", "a.b"]);
    }

    #[test]
    fn off_all_is_isolated_to_the_scope() {
        let emitter = Emitter::<u32>::default();
        let user = emitter.scope("user").unwrap();
        let deep = emitter.scope("user.profile").unwrap();
        let spy = Spy::new();

        user.on("login", spy.listener()).unwrap();
        user.on("*", spy.listener()).unwrap();
        deep.on("name", spy.listener()).unwrap();
        emitter.on("admin.login", spy.listener()).unwrap();
        emitter.on("user", spy.listener()).unwrap();

        assert_eq!(emitter.listener_count(), 5);
        assert_eq!(user.listener_count(), 3);

        assert_eq!(user.off_all(None).unwrap(), 3);
        assert_eq!(emitter.listener_count(), 2);
        assert_eq!(emitter.listener_count_at("admin.login").unwrap(), 1);
        assert_eq!(emitter.listener_count_at("user").unwrap(), 1);
        assert_eq!(deep.listener_count(), 0);
    }

    #[test]
    fn off_all_with_relative_prefix() {
        let emitter = Emitter::<u32>::default();
        let user = emitter.scope("user").unwrap();
        let spy = Spy::new();
        user.on("a.x", spy.listener()).unwrap();
        user.on("b.x", spy.listener()).unwrap();

        assert_eq!(user.off_all(Some("a")).unwrap(), 1);
        assert_eq!(user.listener_count(), 1);
        assert_eq!(user.off_pattern("b.x").unwrap(), 1);
        assert_eq!(user.clear(), 0);
    }

    #[test]
    fn retained_messages_are_keyed_relative() {
        let emitter = Emitter::<u32>::default();
        let dev = emitter.scope("dev").unwrap();
        dev.emit_retained("lamp.state", 1).unwrap();
        emitter.emit_retained("other.state", 2).unwrap();

        let retained = dev.retained_messages();
        assert_eq!(retained.len(), 1);
        assert_eq!(retained["lamp.state"].topic(), "lamp.state");

        let spy = Spy::new();
        dev.on("lamp.state", spy.listener()).unwrap();
        assert_eq!(spy.topics(), ["lamp.state"]);
        assert_eq!(emitter.retained_messages().len(), 2);
    }

    #[test]
    fn scope_meta_sits_between_config_and_emit() {
        let emitter = Emitter::<u32>::new(
            crate::Config::default().with_meta(Meta::new().with("layer", "config").with("app", "x")),
        );
        let scope = emitter
            .scope("svc")
            .unwrap()
            .with_meta(Meta::new().with("layer", "scope").with("svc", "billing"));
        let spy = Spy::new();
        emitter.on("svc.*", spy.listener()).unwrap();

        scope.emit("tick", 1).unwrap();
        scope
            .emit_with(Emission::new("tock", 2).meta("layer", "emit"))
            .unwrap();

        let first = spy.payloads().len();
        assert_eq!(first, 2);
        let messages = spy.matching(|_| true);
        assert_eq!(messages[0].meta().get("layer"), Some(&json!("scope")));
        assert_eq!(messages[0].meta().get("app"), Some(&json!("x")));
        assert_eq!(messages[1].meta().get("layer"), Some(&json!("emit")));
        assert_eq!(messages[1].meta().get("svc"), Some(&json!("billing")));

        let nested = scope.scope("inner").unwrap();
        assert_eq!(nested.meta().get("svc"), Some(&json!("billing")));
    }

    #[test]
    fn prebuilt_message_meta_overrides_scope_meta() {
        let emitter = Emitter::<u32>::default();
        let scope = emitter
            .scope("svc")
            .unwrap()
            .with_meta(Meta::new().with("layer", "scope").with("svc", "billing"));
        let spy = Spy::new();
        emitter.on("svc.x", spy.listener()).unwrap();

        scope
            .emit_with(Message::new("x", 1).with_meta(Meta::new().with("layer", "emit")))
            .unwrap();

        let meta = spy.last().unwrap().meta().clone();
        assert_eq!(meta.get("layer"), Some(&json!("emit")));
        assert_eq!(meta.get("svc"), Some(&json!("billing")));
    }

    #[test]
    fn off_only_reaches_registrations_inside_the_scope() {
        let emitter = Emitter::<u32>::default();
        let svc = emitter.scope("svc").unwrap();
        let outside = emitter.on("other.a", |_| Ok(())).unwrap();
        let own = emitter.on("svc", |_| Ok(())).unwrap();
        let inside = svc.on("a.b", |_| Ok(())).unwrap();

        assert!(!svc.off(outside.id()));
        assert!(!svc.off(own.id()));
        assert!(svc.off(inside.id()));
        assert!(!svc.off(inside.id()));
        assert_eq!(emitter.listener_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scoped_wait_for_resolves_with_relative_topic() {
        let emitter = Emitter::<u32>::default();
        let jobs = emitter.scope("jobs").unwrap();
        let waiting = jobs.wait_for("*.done", Some(Duration::from_secs(1))).unwrap();

        emitter.emit("jobs.42.done", 42).unwrap();

        let message = waiting.await.unwrap();
        assert_eq!(message.topic(), "42.done");
        assert_eq!(*message.payload(), 42);
    }
}
