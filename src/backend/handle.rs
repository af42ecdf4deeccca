// Scoped handles - automatic cleanup of raw Vulkan objects
//
// A `Scoped` owns exactly one raw handle and the function that destroys it.
// The destroy function runs once per live handle: on reassignment, on
// `release_and_get_slot`, or when the wrapper is dropped.
//
// Vulkan has three destroy shapes:
//   vkDestroyXXX(object, allocator)
//   vkDestroyXXX(instance, object, allocator)
//   vkDestroyXXX(device, object, allocator)
// All three are stored as one `Fn(T)`; the parent handle (if any) is
// borrowed and read when the child is released.

use std::fmt;

/// Owning wrapper around a raw handle. `T::default()` is the empty value
/// (`VK_NULL_HANDLE` for every `ash::vk` handle type).
pub struct Scoped<'a, T: Copy + PartialEq + Default> {
    object: T,
    release: Box<dyn Fn(T) + 'a>,
}

impl<'a, T: Copy + PartialEq + Default> Scoped<'a, T> {
    /// Empty handle with a release function that does nothing.
    pub fn new() -> Self {
        Self::with_release(|_| {})
    }

    /// `vkDestroyXXX(object, allocator)`
    pub fn with_release(release: impl Fn(T) + 'a) -> Self {
        Self {
            object: T::default(),
            release: Box::new(release),
        }
    }

    /// `vkDestroyXXX(parent, object, allocator)`
    ///
    /// The parent is borrowed, not owned. Its value is read at release time,
    /// and the borrow keeps it alive until this handle is gone, so children
    /// are always destroyed before their parent.
    ///
    /// ```compile_fail
    /// use vulkanize::backend::Scoped;
    ///
    /// let child;
    /// {
    ///     let mut parent = Scoped::<u64>::new();
    ///     parent.set(1);
    ///     child = Scoped::<u64>::with_context(&parent, |_, _| {});
    /// } // parent would be released while child still needs it
    /// drop(child);
    /// ```
    pub fn with_context<'c, C>(
        context: &'a Scoped<'c, C>,
        release: impl Fn(C, T) + 'a,
    ) -> Self
    where
        'c: 'a,
        C: Copy + PartialEq + Default + 'a,
    {
        Self::with_release(move |object| release(context.get(), object))
    }

    /// Current value (possibly empty).
    pub fn get(&self) -> T {
        self.object
    }

    pub fn is_empty(&self) -> bool {
        self.object == T::default()
    }

    pub fn equals(&self, other: T) -> bool {
        self.object == other
    }

    /// Store a new value, releasing the held one first. Assigning the value
    /// that is already held does nothing.
    pub fn set(&mut self, object: T) {
        if object != self.object {
            self.cleanup();
            self.object = object;
        }
    }

    /// Release the held value and hand out the (now empty) slot so an
    /// out-parameter create call can write straight into the wrapper.
    pub fn release_and_get_slot(&mut self) -> &mut T {
        self.cleanup();
        &mut self.object
    }

    fn cleanup(&mut self) {
        if !self.is_empty() {
            (self.release)(self.object);
        }
        self.object = T::default();
    }
}

impl<T: Copy + PartialEq + Default> Default for Scoped<'_, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + PartialEq + Default> PartialEq<T> for Scoped<'_, T> {
    fn eq(&self, other: &T) -> bool {
        self.equals(*other)
    }
}

impl<T: Copy + PartialEq + Default + fmt::Debug> fmt::Debug for Scoped<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Scoped").field(&self.object).finish()
    }
}

impl<T: Copy + PartialEq + Default> Drop for Scoped<'_, T> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::Scoped;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    fn recorder(log: &Log, name: &'static str) -> impl Fn(u64) + 'static {
        let log = log.clone();
        move |object| log.borrow_mut().push(format!("{name}:{object}"))
    }

    #[test]
    fn drop_releases_assigned_value_once() {
        let log = Log::default();
        {
            let mut handle = Scoped::with_release(recorder(&log, "h"));
            handle.set(7);
            assert_eq!(handle.get(), 7);
            assert!(handle == 7);
        }
        assert_eq!(*log.borrow(), ["h:7"]);
    }

    #[test]
    fn assigning_same_value_is_idempotent() {
        let log = Log::default();
        {
            let mut handle = Scoped::with_release(recorder(&log, "h"));
            handle.set(3);
            handle.set(3);
            assert!(log.borrow().is_empty());
        }
        assert_eq!(*log.borrow(), ["h:3"]);
    }

    #[test]
    fn assigning_new_value_releases_previous() {
        let log = Log::default();
        let mut handle = Scoped::with_release(recorder(&log, "h"));
        handle.set(1);
        handle.set(2);
        assert_eq!(*log.borrow(), ["h:1"]);
        drop(handle);
        assert_eq!(*log.borrow(), ["h:1", "h:2"]);
    }

    #[test]
    fn replace_releases_before_returning_slot() {
        let log = Log::default();
        let mut handle = Scoped::with_release(recorder(&log, "h"));
        handle.set(5);

        let slot = handle.release_and_get_slot();
        assert_eq!(*slot, 0);
        *slot = 9;
        assert_eq!(*log.borrow(), ["h:5"]);
        assert!(handle.equals(9));

        drop(handle);
        assert_eq!(*log.borrow(), ["h:5", "h:9"]);
    }

    #[test]
    fn replace_on_empty_handle_does_not_release() {
        let log = Log::default();
        let mut handle = Scoped::with_release(recorder(&log, "h"));
        *handle.release_and_get_slot() = 4;
        assert_eq!(handle.get(), 4);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn empty_handles_never_release() {
        let log = Log::default();
        {
            let _untouched = Scoped::<u64>::with_release(recorder(&log, "a"));
            let mut cleared = Scoped::with_release(recorder(&log, "b"));
            cleared.set(0);
            let default: Scoped<u64> = Scoped::default();
            assert!(default.is_empty());
        }
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn children_release_before_their_context() {
        let log = Log::default();
        {
            let mut instance = Scoped::with_release(recorder(&log, "instance"));
            instance.set(1);

            let child_log = log.clone();
            let mut messenger = Scoped::with_context(&instance, move |parent: u64, object: u64| {
                // a released parent would read back as the empty value here
                assert_ne!(parent, 0, "context released before its child");
                child_log.borrow_mut().push(format!("messenger:{object}@{parent}"));
            });
            messenger.set(10);
        }
        assert_eq!(*log.borrow(), ["messenger:10@1", "instance:1"]);
    }

    #[test]
    fn device_context_is_read_at_release_time() {
        let log = Log::default();
        {
            let mut device = Scoped::with_release(recorder(&log, "device"));
            device.set(20);

            let child_log = log.clone();
            let mut pool = Scoped::with_context(&device, move |parent: u64, object: u64| {
                child_log.borrow_mut().push(format!("pool:{object}@{parent}"));
            });
            pool.set(21);
            pool.set(22);
        }
        assert_eq!(*log.borrow(), ["pool:21@20", "pool:22@20", "device:20"]);
    }
}
