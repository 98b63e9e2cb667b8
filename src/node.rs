use core::fmt;
use core::marker::PhantomPinned;
use core::ptr::{self, NonNull};
use core::sync::atomic::Ordering;

use crate::sync::AtomicPtr;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Node
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An intrusive link for a [`RawQueue`][crate::RawQueue].
///
/// A `Node` carries no payload of its own. To queue data, embed a `Node` in
/// your own type and recover the enclosing value from a popped node pointer,
/// either with [`container_of!`][crate::container_of] or through the
/// [`Linked`][crate::Linked] trait.
///
/// The queue identifies a node by its address, so a node must neither move
/// nor be freed while it is enqueued. `Node` is `!Unpin` for that reason.
pub struct Node {
    pub(crate) next: AtomicPtr<Node>,
    _pin: PhantomPinned,
}

/********** impl inherent *************************************************************************/

impl Node {
    /// Creates a new unlinked `Node`.
    #[cfg(not(loom))]
    #[inline]
    pub const fn new() -> Self {
        Self { next: AtomicPtr::new(ptr::null_mut()), _pin: PhantomPinned }
    }

    /// Creates a new unlinked `Node`.
    #[cfg(loom)]
    #[inline]
    pub fn new() -> Self {
        Self { next: AtomicPtr::new(ptr::null_mut()), _pin: PhantomPinned }
    }

    #[inline]
    pub(crate) fn next(&self, order: Ordering) -> Option<NonNull<Node>> {
        NonNull::new(self.next.load(order))
    }

    #[inline]
    pub(crate) fn set_next(&self, next: Option<NonNull<Node>>, order: Ordering) {
        self.next.store(next.map_or(ptr::null_mut(), NonNull::as_ptr), order);
    }
}

/********** impl Default **************************************************************************/

impl Default for Node {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/********** impl Debug ****************************************************************************/

impl fmt::Debug for Node {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node").field("next", &self.next.load(Ordering::Relaxed)).finish()
    }
}
