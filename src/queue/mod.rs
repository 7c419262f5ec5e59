//! Cross-cadence handoff primitive
//!
//! A [`ThreadQueue`] is owned by exactly one consumer cadence. Any number of producers hold a
//! cloned [`QueueHandle`] and push deferred actions into it. The consumer runs them during its
//! own cycle, handing each action a mutable reference to the state it keeps confined:
//!
//! ```text
//! render cadence ─┐
//!                 ├─[QueueHandle::enqueue]─► ThreadQueue<C> ──drain_all(&mut C)──► consumer cadence
//! other producer ─┘
//! ```

pub mod thread_queue;

pub use thread_queue::{Action, QueueHandle, ThreadQueue};
