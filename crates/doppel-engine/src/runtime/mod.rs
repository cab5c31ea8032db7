//! Call-time execution: member dispatch, body evaluation, and instance
//! construction.
//!
//! Nothing here takes a lock for the duration of a call. Dispatch clones the
//! type entry's handle out of the registry and works against that snapshot;
//! per-call state (argument bags, call records, pending handles) is
//! allocated fresh on every invocation and shared with nothing.

mod call;
mod eval;

pub use call::call_member;
pub use eval::construct_instance;
