//! The lock-free intrusive queue operating on raw [`Node`] pointers.
//!
//! Producers link a node in two steps: they first swap it into the `tail`
//! (the linearization point of the push) and only afterwards store it into
//! the `next` link of the previous tail. In between, the previous tail still
//! appears to be the last node. A consumer popping right at that moment
//! reports the queue as empty although a node has logically been pushed.
//! This *transient link gap* is inherent to the algorithm and is resolved by
//! the consumer simply retrying later.
//!
//! The queue embeds a sentinel node, which is pushed back by the consumer
//! whenever the last real node is popped, so that `head` and `tail` never
//! refer to a node that has already been handed back to the caller.

use core::fmt;
use core::pin::Pin;
use core::ptr::{self, NonNull};
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};

use crossbeam_utils::CachePadded;

use crate::node::Node;
use crate::sync::AtomicPtr;
use crate::trace::trace;

#[cfg(debug_assertions)]
use crate::sync::AtomicBool;

////////////////////////////////////////////////////////////////////////////////////////////////////
// RawQueue
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An intrusive multi-producer, single-consumer queue of [`Node`]s.
///
/// The queue never allocates, owns or frees the nodes it links together, it
/// only ever manipulates their `next` links.
/// Any number of threads may [`push`][RawQueue::push] concurrently, but only
/// a single thread at a time may [`pop`][RawQueue::pop].
///
/// Since the queue contains its own sentinel node, whose address is stored in
/// its `head` and `tail`, it must not be moved once it has been initialized.
/// This is why all operations require a pinned reference.
///
/// # Examples
///
/// ```
/// use core::pin::pin;
/// use core::ptr::NonNull;
///
/// use intrusive_mpsc::{Node, RawQueue};
///
/// let (a, b) = (Node::new(), Node::new());
///
/// let mut queue = pin!(RawQueue::new());
/// queue.as_mut().init();
/// let queue = queue.into_ref();
///
/// unsafe {
///     queue.push(NonNull::from(&a));
///     queue.push(NonNull::from(&b));
///
///     assert_eq!(queue.pop(), Some(NonNull::from(&a)));
///     assert_eq!(queue.pop(), Some(NonNull::from(&b)));
///     assert_eq!(queue.pop(), None);
/// }
/// ```
pub struct RawQueue {
    head: CachePadded<AtomicPtr<Node>>,
    tail: CachePadded<AtomicPtr<Node>>,
    sentinel: Node,
    /// Set while a `pop` is in progress, only used for detecting overlapping
    /// consumers.
    #[cfg(debug_assertions)]
    popping: AtomicBool,
}

/********** impl inherent *************************************************************************/

impl RawQueue {
    /// Creates a new uninitialized queue.
    ///
    /// The queue has to be pinned and [`init`][RawQueue::init]-ialized before
    /// it can be used, pushing to or popping from an uninitialized queue is
    /// undefined behaviour.
    #[cfg(not(loom))]
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            tail: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            sentinel: Node::new(),
            #[cfg(debug_assertions)]
            popping: AtomicBool::new(false),
        }
    }

    /// Creates a new uninitialized queue, which must be
    /// [`init`][RawQueue::init]-ialized before use.
    #[cfg(loom)]
    #[inline]
    pub fn new() -> Self {
        Self {
            head: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            tail: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            sentinel: Node::new(),
            #[cfg(debug_assertions)]
            popping: AtomicBool::new(false),
        }
    }

    /// Initializes the queue as empty, with `head` and `tail` both referring
    /// to the queue's own sentinel node.
    ///
    /// This must be called once before any call to [`push`][RawQueue::push]
    /// or [`pop`][RawQueue::pop].
    /// Initializing a queue again discards all nodes that are still linked
    /// into it, without touching them.
    #[inline]
    pub fn init(self: Pin<&mut Self>) {
        // exclusive access, any later sharing of the queue synchronizes
        let this = self.into_ref().get_ref();
        let sentinel = this.sentinel_ptr();

        this.sentinel.set_next(None, Relaxed);
        this.head.store(sentinel.as_ptr(), Relaxed);
        this.tail.store(sentinel.as_ptr(), Relaxed);
    }

    /// Pushes `node` to the back of the queue.
    ///
    /// This is safe to call from any number of threads in parallel and never
    /// blocks or fails.
    ///
    /// # Safety
    ///
    /// The caller has to ensure that:
    ///
    /// - the queue has been [`init`][RawQueue::init]-ialized
    /// - `node` points to a valid [`Node`] that is not currently linked into
    ///   this or any other queue
    /// - `node` stays valid, is not moved and not otherwise accessed until it
    ///   is returned again by [`pop`][RawQueue::pop]
    #[inline]
    pub unsafe fn push(self: Pin<&Self>, node: NonNull<Node>) {
        debug_assert_ne!(node, self.sentinel_ptr(), "the queue's sentinel must never be pushed");
        self.push_unchecked(node);
    }

    /// Pops the node at the front of the queue.
    ///
    /// Returns `None` if the queue is empty or if a concurrent push has not
    /// yet linked its node (a *transient link gap*, see the [crate docs][crate]).
    /// Both cases are transient from the caller's perspective and are
    /// resolved by calling `pop` again later, this method never waits.
    /// A `None` is never returned while the node at the front is fully linked.
    ///
    /// Once a node has been returned, the caller regains full ownership of
    /// it and may reuse, push again or free it.
    ///
    /// # Safety
    ///
    /// The caller has to ensure that the queue has been
    /// [`init`][RawQueue::init]-ialized and that no other thread calls `pop`
    /// on the same queue concurrently.
    #[inline]
    pub unsafe fn pop(self: Pin<&Self>) -> Option<NonNull<Node>> {
        #[cfg(debug_assertions)]
        let _consumer = self.enter_consumer();

        let sentinel = self.sentinel_ptr();

        let mut head = self.load_head();
        // (RQ:3) this `Acquire` load synchronizes with the `Release` store (RQ:2)
        let mut next = head.as_ref().next(Acquire);

        if head == sentinel {
            // the queue is either empty or the push of the first node has not
            // been linked yet
            let first = next?;
            self.head.store(first.as_ptr(), Relaxed);
            head = first;
            // (RQ:4) this `Acquire` load synchronizes with the `Release` store (RQ:2)
            next = head.as_ref().next(Acquire);
        }

        if let Some(next) = next {
            return Some(self.advance(head, next));
        }

        // (RQ:5) this `Acquire` load synchronizes with the `AcqRel` swap (RQ:1)
        if self.tail.load(Acquire) != head.as_ptr() {
            trace!("pop: tail moved past head but its link is still pending");
            return None;
        }

        // `head` is the last node, so the sentinel has to take its place
        // before it can be handed out
        trace!("pop: re-pushing sentinel behind the last node");
        self.push_unchecked(sentinel);

        // (RQ:6) this `Acquire` load synchronizes with the `Release` store (RQ:2)
        head.as_ref().next(Acquire).map(|next| self.advance(head, next))
    }

    #[inline]
    unsafe fn push_unchecked(&self, node: NonNull<Node>) {
        // the node is not yet reachable by any other thread
        node.as_ref().set_next(None, Relaxed);
        // (RQ:1) this `AcqRel` swap is the linearization point of the push, it
        // publishes the cleared link of `node` and synchronizes with the swap
        // that previously inserted `prev`
        let prev = self.tail.swap(node.as_ptr(), AcqRel);
        debug_assert!(!prev.is_null(), "push on a queue that has not been initialized");
        // (RQ:2) this `Release` store synchronizes with the `Acquire` loads
        // (RQ:3), (RQ:4) and (RQ:6)
        (*prev).next.store(node.as_ptr(), Release);
    }

    #[inline]
    unsafe fn advance(&self, head: NonNull<Node>, next: NonNull<Node>) -> NonNull<Node> {
        self.head.store(next.as_ptr(), Relaxed);
        head.as_ref().set_next(None, Relaxed);
        head
    }

    #[inline]
    fn load_head(&self) -> NonNull<Node> {
        // only the consumer ever writes the `head`
        let head = self.head.load(Relaxed);
        debug_assert!(!head.is_null(), "pop on a queue that has not been initialized");
        // safety: `head` is never null once the queue is initialized
        unsafe { NonNull::new_unchecked(head) }
    }

    #[inline]
    fn sentinel_ptr(&self) -> NonNull<Node> {
        NonNull::from(&self.sentinel)
    }

    #[cfg(debug_assertions)]
    #[inline]
    fn enter_consumer(&self) -> ConsumerGuard<'_> {
        let busy = self.popping.swap(true, Acquire);
        debug_assert!(!busy, "concurrent `pop` calls on a single-consumer queue");
        ConsumerGuard(&self.popping)
    }

    /// Returns `true` if the queue is in the same state as a freshly
    /// initialized one.
    #[cfg(test)]
    pub(crate) fn is_reset(&self) -> bool {
        let sentinel = self.sentinel_ptr().as_ptr();
        self.head.load(Relaxed) == sentinel
            && self.tail.load(Relaxed) == sentinel
            && self.sentinel.next(Relaxed).is_none()
    }
}

/********** impl Default **************************************************************************/

/// Equivalent to [`RawQueue::new`], the returned queue still has to be pinned
/// and [`init`][RawQueue::init]-ialized before it can be used.
impl Default for RawQueue {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl Debug ****************************************************************************/

impl fmt::Debug for RawQueue {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawQueue")
            .field("head", &self.head.load(Relaxed))
            .field("tail", &self.tail.load(Relaxed))
            .field("sentinel", &self.sentinel_ptr())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ConsumerGuard
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Resets the `popping` flag when a `pop` returns.
#[cfg(debug_assertions)]
struct ConsumerGuard<'a>(&'a AtomicBool);

#[cfg(debug_assertions)]
impl Drop for ConsumerGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.0.store(false, Release);
    }
}


#[cfg(all(test, loom))]
mod loom_tests {
    use std::pin::Pin;
    use std::ptr::NonNull;

    use loom::sync::Arc;
    use loom::thread;

    use super::RawQueue;
    use crate::Node;

    struct Shared {
        queue: Pin<Box<RawQueue>>,
        nodes: Box<[Node]>,
    }

    impl Shared {
        fn new(nodes: usize) -> Arc<Self> {
            let mut queue = Box::pin(RawQueue::new());
            queue.as_mut().init();
            Arc::new(Self { queue, nodes: (0..nodes).map(|_| Node::new()).collect() })
        }

        fn push(&self, idx: usize) {
            unsafe { self.queue.as_ref().push(NonNull::from(&self.nodes[idx])) };
        }

        fn index_of(&self, node: NonNull<Node>) -> usize {
            self.nodes
                .iter()
                .position(|n| NonNull::from(n) == node)
                .expect("popped a node that was never pushed")
        }

        fn pop_until(&self, count: usize) -> Vec<usize> {
            let mut popped = Vec::with_capacity(count);
            while popped.len() < count {
                match unsafe { self.queue.as_ref().pop() } {
                    Some(node) => popped.push(self.index_of(node)),
                    None => thread::yield_now(),
                }
            }

            popped
        }
    }

    #[test]
    fn two_producers() {
        loom::model(|| {
            let shared = Shared::new(2);

            let producers: Vec<_> = (0..2)
                .map(|idx| {
                    let shared = Arc::clone(&shared);
                    thread::spawn(move || shared.push(idx))
                })
                .collect();

            let mut popped = shared.pop_until(2);
            for producer in producers {
                producer.join().unwrap();
            }

            popped.sort();
            assert_eq!(popped, [0, 1]);
            assert_eq!(unsafe { shared.queue.as_ref().pop() }, None);
            assert!(shared.queue.is_reset());
        });
    }

    #[test]
    fn producer_order() {
        loom::model(|| {
            let shared = Shared::new(2);

            let producer = {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    shared.push(0);
                    shared.push(1);
                })
            };

            assert_eq!(shared.pop_until(2), [0, 1]);
            producer.join().unwrap();
            assert!(shared.queue.is_reset());
        });
    }

    #[test]
    fn push_races_last_node() {
        loom::model(|| {
            let shared = Shared::new(2);
            // the consumer will have to re-push the sentinel behind node 0
            // while node 1 may be pushed concurrently
            shared.push(0);

            let producer = {
                let shared = Arc::clone(&shared);
                thread::spawn(move || shared.push(1))
            };

            assert_eq!(shared.pop_until(2), [0, 1]);
            producer.join().unwrap();
            assert_eq!(unsafe { shared.queue.as_ref().pop() }, None);
        });
    }
}
