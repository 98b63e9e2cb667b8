//! Atomic primitives and the shared pointer used by the queue, swapped for
//! their model-checked counterparts when compiled with `--cfg loom`.

cfg_if::cfg_if! {
    if #[cfg(loom)] {
        #[allow(unused_imports)]
        pub(crate) use ::loom::sync::atomic::{fence, AtomicBool, AtomicPtr};
        #[allow(unused_imports)]
        pub(crate) use ::loom::sync::Arc;
    } else {
        #[allow(unused_imports)]
        pub(crate) use core::sync::atomic::{fence, AtomicBool, AtomicPtr};
        #[cfg(feature = "alloc")]
        pub(crate) use alloc::sync::Arc;
    }
}
