//! A lock-free, intrusive, multi-producer single-consumer queue.
//!
//! Any number of threads may push nodes concurrently while a single thread
//! pops them in FIFO order, without ever taking a lock.
//! The design follows the classic node-based intrusive MPSC queue by Dmitry
//! Vyukov [[1]]: a push consists of a single atomic swap on the queue's tail
//! followed by a single store linking the new node to its predecessor, so
//! producers never wait and never fail.
//!
//! # Intrusive Nodes
//!
//! The queue does not allocate.
//! Instead, every queued element embeds a [`Node`], which contains nothing but
//! the link to the next node.
//! The queue only ever manipulates these links, it neither owns nor frees the
//! memory of the elements linked into it.
//!
//! Two levels of abstraction are provided:
//!
//! - [`RawQueue`] operates directly on `NonNull<Node>` pointers.
//!   Its `push` and `pop` methods are `unsafe`, since the caller has to
//!   guarantee that nodes outlive their time in the queue and that only a
//!   single thread pops at any time.
//!   A record embedding a node can be recovered from a popped node pointer
//!   with the [`container_of!`] macro.
//! - With the `alloc` feature, [`new`] creates a queue of owned records,
//!   split into a cloneable [`Producer`] and a unique [`Consumer`].
//!   Record types describe how their owning handle (e.g. a `Box`) maps to
//!   their embedded node by implementing [`Linked`].
//!   [`Entry<T>`][Entry] is a ready-made record for arbitrary values.
//!
//! # Transient Link Gaps
//!
//! Between a producer's swap of the tail and the store linking its node, the
//! queue is logically non-empty but the new node is not yet reachable from
//! the front.
//! A concurrent pop observing this state reports the queue as empty.
//! This is inherent to the algorithm: an empty result is never final and
//! callers are expected to retry (by spinning, yielding or backing off), the
//! queue itself provides no means for waiting.
//! No node is ever lost or returned twice.
//!
//! # Features
//!
//! - `std` (default): implies `alloc`
//! - `alloc`: enables the owning [`Producer`]/[`Consumer`] queue and
//!   [`Entry`]
//! - `tracing`: emits trace events for transient gaps and sentinel recycling
//! - `nightly`: enables the benchmarks
//!
//! [1]: http://www.1024cores.net/home/lock-free-algorithms/queues/intrusive-mpsc-node-based-queue

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]

#[cfg(feature = "alloc")]
extern crate alloc;

mod linked;
mod node;
#[cfg(feature = "alloc")]
mod owned;
mod raw;
mod sync;
mod trace;


pub use crate::linked::{Entry, Linked};
pub use crate::node::Node;
#[cfg(feature = "alloc")]
pub use crate::owned::{new, Consumer, Drain, Producer};
pub use crate::raw::RawQueue;

/// Recovers a pointer to the record that embeds a [`Node`] as one of its
/// fields.
///
/// Given a `NonNull<Node>` pointing to the field `$field` of a `$Record`,
/// this evaluates to a `NonNull<$Record>` pointing to the enclosing record.
///
/// # Safety
///
/// The macro must be invoked in an `unsafe` context and the node pointer must
/// actually point at the `$field` of a valid `$Record`, otherwise the result
/// is undefined behaviour.
///
/// # Examples
///
/// ```
/// use core::pin::pin;
/// use core::ptr::{self, NonNull};
///
/// use intrusive_mpsc::{container_of, Node, RawQueue};
///
/// struct Message {
///     text: &'static str,
///     node: Node,
/// }
///
/// let message = Message { text: "hello", node: Node::new() };
/// let record = NonNull::from(&message);
///
/// let mut queue = pin!(RawQueue::new());
/// queue.as_mut().init();
/// let queue = queue.into_ref();
///
/// unsafe {
///     // derive the node pointer from the record, so it may access all of it
///     queue.push(NonNull::new_unchecked(ptr::addr_of_mut!((*record.as_ptr()).node)));
///     let node = queue.pop().unwrap();
///     let popped = container_of!(node, Message, node);
///     assert_eq!(popped.as_ref().text, "hello");
/// }
/// ```
#[macro_export]
macro_rules! container_of {
    ($node:expr, $Record:ty, $field:ident) => {{
        let node: ::core::ptr::NonNull<$crate::Node> = $node;
        let offset = ::core::mem::offset_of!($Record, $field);
        ::core::ptr::NonNull::new_unchecked(
            node.as_ptr().cast::<u8>().sub(offset).cast::<$Record>(),
        )
    }};
}
