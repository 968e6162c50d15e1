use std::{
    fmt,
    sync::{Arc, Weak},
};

/// Non-owning handle to a host object that may be destroyed at any time.
///
/// A failed [`WeakSlot::resolve`] is the normal "object went away" case.
/// Callers skip whatever depended on the object.
pub struct WeakSlot<T: ?Sized> {
    handle: Option<Weak<T>>,
}

impl<T: ?Sized> WeakSlot<T> {
    /// An empty slot.
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Replaces the tracked object. Binding `None` leaves the slot empty.
    pub fn bind(&mut self, object: Option<&Arc<T>>) {
        self.release();
        self.handle = object.map(Arc::downgrade);
    }

    /// Upgrades to a strong reference. Drop it before returning to the host.
    pub fn resolve(&self) -> Option<Arc<T>> {
        self.handle.as_ref().and_then(Weak::upgrade)
    }

    /// Forgets the tracked object. The object itself is unaffected.
    pub fn release(&mut self) {
        self.handle = None;
    }

    /// Whether a handle is held, regardless of whether it is still alive.
    #[cfg(test)]
    pub fn is_bound(&self) -> bool {
        self.handle.is_some()
    }
}

impl<T: ?Sized> Default for WeakSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for WeakSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.handle {
            None => "empty",
            Some(handle) if handle.strong_count() > 0 => "live",
            Some(_) => "stale",
        };
        f.debug_struct("WeakSlot").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_while_object_is_alive() {
        let object = Arc::new(7_u32);
        let mut slot = WeakSlot::new();
        slot.bind(Some(&object));
        assert_eq!(slot.resolve().as_deref(), Some(&7));
        assert_eq!(Arc::strong_count(&object), 1);
    }

    #[test]
    fn stale_handle_resolves_to_none() {
        let object = Arc::new(String::from("scene"));
        let mut slot: WeakSlot<String> = WeakSlot::new();
        slot.bind(Some(&object));
        drop(object);
        assert!(slot.is_bound());
        assert!(slot.resolve().is_none());
    }

    #[test]
    fn rebinding_replaces_previous_handle() {
        let first = Arc::new(1_u8);
        let second = Arc::new(2_u8);
        let mut slot = WeakSlot::new();
        slot.bind(Some(&first));
        slot.bind(Some(&second));
        assert_eq!(Arc::weak_count(&first), 0);
        assert_eq!(slot.resolve().as_deref(), Some(&2));

        slot.bind(None);
        assert!(!slot.is_bound());
        assert_eq!(Arc::weak_count(&second), 0);
    }
}
