use std::{fmt, rc::Rc, sync::Arc};

use crate::{BoxError, ListenerError, Message};

/// What a listener returns: a value of the emitter's result type, or an error.
pub type ListenerResult<R> = std::result::Result<R, BoxError>;

/// One slot of the sequence returned by `emit`: the listener's value, or
/// the error it raised tagged with the emitted topic.
pub type Outcome<R> = std::result::Result<R, ListenerError>;

/// Identity of one registration.
///
/// Two registrations of the same closure get distinct ids; removal always
/// targets exactly one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type-erased listener as stored in the tree.
///
/// Returns `None` for internal waiters that do not contribute a result slot.
pub(crate) type Callback<P, R> = Rc<dyn Fn(&Message<P>) -> Option<ListenerResult<R>>>;

pub(crate) fn boxed<P: 'static, R: 'static, F>(listener: F) -> Callback<P, R>
where
    F: Fn(&Message<P>) -> ListenerResult<R> + 'static,
{
    Rc::new(move |message: &Message<P>| Some(listener(message)))
}

/// Where a registration lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Location {
    /// Root-level listener fired for every topic after all path matches.
    Any,
    /// Node reached by following these segments from the root.
    Path(Vec<String>),
}

pub(crate) struct Entry<P, R> {
    pub(crate) id: ListenerId,
    pub(crate) pattern: Arc<str>,
    pub(crate) location: Location,
    pub(crate) once: bool,
    pub(crate) callback: Callback<P, R>,
}

impl<P, R> fmt::Debug for Entry<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}
