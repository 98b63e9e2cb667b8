//! Typed access to intrusive nodes embedded in caller-defined records.

use core::fmt;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

#[cfg(feature = "alloc")]
use alloc::boxed::Box;
#[cfg(feature = "alloc")]
use core::ptr;

use crate::node::Node;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Linked (trait)
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A trait for record types that embed a [`Node`] and can be owned through a
/// `Handle` while they are enqueued.
///
/// On push, the handle is leaked into a raw pointer and the queue
/// (conceptually) takes ownership of the record. On pop the pointer is
/// converted back into the handle and ownership returns to the caller.
///
/// # Safety
///
/// Implementations must guarantee that:
///
/// - `into_ptr` and `from_ptr` are inverses of each other and the record
///   behind the pointer neither moves nor is deallocated in between
/// - `node` returns a pointer to a `Node` contained within the record, always
///   the same one for the same record
/// - `from_node` is the inverse of `node`
/// - a `Handle` uniquely owns its record, so at most one handle to a record
///   exists at any time and converting it with `into_ptr` gives up that
///   ownership
/// - a record for which a handle exists is never linked into any queue
///
/// `Box<Self>` satisfies the last two requirements, while shared handles
/// such as `&'static Self` or `Arc<Self>` do not: they would allow pushing a
/// record that is still linked, which overwrites its link in the middle of
/// the queue and loses all nodes behind it.
///
/// Since pushing consumes the handle, a boxed record can not be pushed twice:
///
/// ```compile_fail
/// use intrusive_mpsc::Entry;
///
/// let (producer, _consumer) = intrusive_mpsc::new::<Entry<u8>>();
/// let entry = Entry::boxed(1);
/// producer.push(entry);
/// producer.push(entry);
/// ```
///
/// # Examples
///
/// ```
/// use core::ptr::{self, NonNull};
///
/// use intrusive_mpsc::{container_of, Linked, Node};
///
/// struct Job {
///     id: u32,
///     node: Node,
/// }
///
/// unsafe impl Linked for Job {
///     type Handle = Box<Job>;
///
///     fn into_ptr(handle: Box<Job>) -> NonNull<Job> {
///         NonNull::from(Box::leak(handle))
///     }
///
///     unsafe fn from_ptr(ptr: NonNull<Job>) -> Box<Job> {
///         Box::from_raw(ptr.as_ptr())
///     }
///
///     unsafe fn node(ptr: NonNull<Job>) -> NonNull<Node> {
///         NonNull::new_unchecked(ptr::addr_of_mut!((*ptr.as_ptr()).node))
///     }
///
///     unsafe fn from_node(node: NonNull<Node>) -> NonNull<Job> {
///         container_of!(node, Job, node)
///     }
/// }
///
/// let (producer, mut consumer) = intrusive_mpsc::new::<Job>();
/// producer.push(Box::new(Job { id: 7, node: Node::new() }));
/// assert_eq!(consumer.pop().map(|job| job.id), Some(7));
/// ```
pub unsafe trait Linked {
    /// The owning handle of a record, e.g. `Box<Self>`.
    type Handle;

    /// Converts an owning handle into a raw pointer, without dropping it.
    fn into_ptr(handle: Self::Handle) -> NonNull<Self>;

    /// Converts a raw pointer back into its owning handle.
    ///
    /// # Safety
    ///
    /// `ptr` must have been obtained from [`into_ptr`][Linked::into_ptr] and
    /// must not be converted back more than once.
    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle;

    /// Returns a pointer to the record's embedded [`Node`].
    ///
    /// # Safety
    ///
    /// `ptr` must point to a valid record.
    unsafe fn node(ptr: NonNull<Self>) -> NonNull<Node>;

    /// Returns a pointer to the record enclosing `node`.
    ///
    /// # Safety
    ///
    /// `node` must have been obtained from [`node`][Linked::node].
    unsafe fn from_node(node: NonNull<Node>) -> NonNull<Self>;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Entry
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A generic record that owns a value alongside its [`Node`].
///
/// With the `alloc` feature, `Entry<T>` implements [`Linked`] with
/// `Box<Entry<T>>` handles, so arbitrary values can be queued without any
/// custom record type.
#[repr(C)]
pub struct Entry<T> {
    // must remain the first field, records are recovered from their nodes by
    // a plain pointer cast
    node: Node,
    value: T,
}

/********** impl inherent *************************************************************************/

impl<T> Entry<T> {
    /// Creates a new unlinked `Entry` containing `value`.
    #[cfg(not(loom))]
    #[inline]
    pub const fn new(value: T) -> Self {
        Self { node: Node::new(), value }
    }

    /// Creates a new unlinked `Entry` containing `value`.
    #[cfg(loom)]
    #[inline]
    pub fn new(value: T) -> Self {
        Self { node: Node::new(), value }
    }

    /// Creates a new heap allocated `Entry` containing `value`.
    #[cfg(feature = "alloc")]
    #[inline]
    pub fn boxed(value: T) -> Box<Self> {
        Box::new(Self::new(value))
    }

    /// Consumes the `Entry` and returns the contained value.
    #[inline]
    pub fn into_inner(self) -> T {
        self.value
    }
}

/********** impl Deref ****************************************************************************/

impl<T> Deref for Entry<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

/********** impl DerefMut *************************************************************************/

impl<T> DerefMut for Entry<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/********** impl Debug ****************************************************************************/

impl<T: fmt::Debug> fmt::Debug for Entry<T> {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry").field("value", &self.value).finish()
    }
}

/********** impl Linked ***************************************************************************/

// safety: a `Box` is the unique owner of its entry and is given up on push
#[cfg(feature = "alloc")]
unsafe impl<T> Linked for Entry<T> {
    type Handle = Box<Self>;

    #[inline]
    fn into_ptr(handle: Self::Handle) -> NonNull<Self> {
        NonNull::from(Box::leak(handle))
    }

    #[inline]
    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        Box::from_raw(ptr.as_ptr())
    }

    #[inline]
    unsafe fn node(ptr: NonNull<Self>) -> NonNull<Node> {
        NonNull::new_unchecked(ptr::addr_of_mut!((*ptr.as_ptr()).node))
    }

    #[inline]
    unsafe fn from_node(node: NonNull<Node>) -> NonNull<Self> {
        // `#[repr(C)]` places the node at offset zero
        node.cast()
    }
}
