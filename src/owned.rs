//! An owning queue of [`Linked`] records, split into [`Producer`] and
//! [`Consumer`] handles.

use core::fmt;
use core::marker::PhantomData;
use core::pin::Pin;
use core::sync::atomic::Ordering;

use alloc::boxed::Box;

use crate::linked::Linked;
use crate::raw::RawQueue;
use crate::sync::{fence, Arc};
use crate::trace::debug;

/// Creates a new empty queue for records of type `T` and returns its
/// producer and consumer halves.
///
/// The [`Producer`] can be cloned and shared among any number of threads,
/// the [`Consumer`] is unique, which ensures that there is only ever a single
/// thread removing records from the queue.
///
/// # Examples
///
/// ```
/// use std::thread;
///
/// use intrusive_mpsc::Entry;
///
/// let (producer, mut consumer) = intrusive_mpsc::new::<Entry<u32>>();
///
/// let handles: Vec<_> = (0..4)
///     .map(|id| {
///         let producer = producer.clone();
///         thread::spawn(move || producer.push(Entry::boxed(id)))
///     })
///     .collect();
///
/// let mut received = Vec::new();
/// while received.len() < 4 {
///     match consumer.pop() {
///         Some(entry) => received.push(entry.into_inner()),
///         None => thread::yield_now(),
///     }
/// }
///
/// for handle in handles {
///     handle.join().unwrap();
/// }
///
/// received.sort();
/// assert_eq!(received, [0, 1, 2, 3]);
/// ```
#[inline]
pub fn new<T: Linked>() -> (Producer<T>, Consumer<T>) {
    let mut raw = Box::pin(RawQueue::new());
    raw.as_mut().init();

    let shared = Arc::new(Shared { raw, _marker: PhantomData });
    (Producer { shared: Arc::clone(&shared) }, Consumer { shared })
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Producer
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The sending half of a queue created by [`new`].
pub struct Producer<T: Linked> {
    shared: Arc<Shared<T>>,
}

/********** impl inherent *************************************************************************/

impl<T: Linked> Producer<T> {
    /// Pushes the record owned by `handle` to the back of the queue.
    ///
    /// The queue takes ownership of the record until it is popped again, or
    /// until it is dropped along with the queue. This never blocks or fails.
    #[inline]
    pub fn push(&self, handle: T::Handle) {
        let ptr = T::into_ptr(handle);
        unsafe {
            // safety: the record is leaked and exclusively owned by the queue
            // until it is popped, the queue is initialized and pinned
            self.shared.raw().push(T::node(ptr));
        }
    }
}

/********** impl Clone ****************************************************************************/

impl<T: Linked> Clone for Producer<T> {
    #[inline]
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

/********** impl Debug ****************************************************************************/

impl<T: Linked> fmt::Debug for Producer<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer").field("queue", &*self.shared.raw).finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Consumer
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The receiving half of a queue created by [`new`].
///
/// There is exactly one `Consumer` per queue and popping requires `&mut self`,
/// so concurrent pops are ruled out at compile time.
pub struct Consumer<T: Linked> {
    shared: Arc<Shared<T>>,
}

/********** impl inherent *************************************************************************/

impl<T: Linked> Consumer<T> {
    /// Pops the record at the front of the queue.
    ///
    /// Returns `None` if the queue is empty, or if a concurrent push is still
    /// in progress and the record at the front is not yet linked.
    /// In both cases the caller may simply retry later, this method never
    /// waits.
    #[inline]
    pub fn pop(&mut self) -> Option<T::Handle> {
        unsafe {
            // safety: `&mut self` on the unique consumer excludes concurrent
            // pops, every queued node was pushed through `Producer::push`
            self.shared.raw().pop().map(|node| T::from_ptr(T::from_node(node)))
        }
    }

    /// Returns an iterator that pops records until the queue is reported as
    /// empty.
    #[inline]
    pub fn drain(&mut self) -> Drain<'_, T> {
        Drain { consumer: self }
    }

    /// Returns `true` if there is at least one [`Producer`] left.
    ///
    /// Once this returns `false`, all pushes have completed and every
    /// remaining record can be popped without any transient gaps.
    #[inline]
    pub fn has_producers(&self) -> bool {
        let producers = Arc::strong_count(&self.shared) > 1;
        // synchronizes with the release decrement of dropped producers
        fence(Ordering::Acquire);
        producers
    }
}

/********** impl Debug ****************************************************************************/

impl<T: Linked> fmt::Debug for Consumer<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("queue", &*self.shared.raw).finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Drain
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An iterator popping records from a queue, returned by [`Consumer::drain`].
///
/// Iteration stops at the first empty result, records pushed after that
/// remain in the queue.
pub struct Drain<'a, T: Linked> {
    consumer: &'a mut Consumer<T>,
}

impl<T: Linked> Iterator for Drain<'_, T> {
    type Item = T::Handle;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.consumer.pop()
    }
}

impl<T: Linked> fmt::Debug for Drain<'_, T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drain").field("consumer", &self.consumer).finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Shared
////////////////////////////////////////////////////////////////////////////////////////////////////

struct Shared<T: Linked> {
    raw: Pin<Box<RawQueue>>,
    _marker: PhantomData<T::Handle>,
}

impl<T: Linked> Shared<T> {
    #[inline]
    fn raw(&self) -> Pin<&RawQueue> {
        self.raw.as_ref()
    }
}

// records only ever move between threads, they are never accessed concurrently
unsafe impl<T: Linked> Send for Shared<T> where T::Handle: Send {}
unsafe impl<T: Linked> Sync for Shared<T> where T::Handle: Send {}

impl<T: Linked> Drop for Shared<T> {
    #[inline]
    fn drop(&mut self) {
        debug!("dropping queue, releasing all records that were never popped");
        // with all handles gone no push can be in progress, so the queue
        // drains completely without any transient gaps
        while let Some(node) = unsafe { self.raw().pop() } {
            drop(unsafe { T::from_ptr(T::from_node(node)) });
        }
    }
}
