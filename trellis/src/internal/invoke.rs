use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use crate::{ListenerError, ListenerPanic, Message, listener::Entry};

/// Run one listener, turning a returned error or a panic into a
/// [`ListenerError`] tagged with the emitted topic.
///
/// `Ok(None)` means the entry is an internal waiter with no result slot.
pub(crate) fn invoke<P, R>(
    entry: &Entry<P, R>,
    message: &Message<P>,
    topic: &Arc<str>,
) -> Result<Option<R>, ListenerError> {
    match catch_unwind(AssertUnwindSafe(|| (entry.callback)(message))) {
        Ok(None) => Ok(None),
        Ok(Some(Ok(value))) => Ok(Some(value)),
        Ok(Some(Err(e))) => Err(ListenerError::new(topic.clone(), e)),
        Err(panic) => Err(ListenerError::new(
            topic.clone(),
            Box::new(ListenerPanic(panic_message(panic.as_ref()))),
        )),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
