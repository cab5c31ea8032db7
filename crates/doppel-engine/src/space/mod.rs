//! Runtime Type Space
//!
//! The registry synthesized proxy types are defined into and member calls
//! dispatch against. A space holds native implementation classes registered
//! by integrators next to the proxy types the synthesis backend writes, and
//! answers the lookups the runtime needs: type by name or id, member by
//! name, field layout, subtype checks.
//!
//! ## Lifecycle
//!
//! | State | Meaning |
//! |-------|---------|
//! | `Building` | Shape is open: fields, members, and constructors may be added |
//! | `Activated` | Shape is frozen: instances may be created, members called |
//!
//! Types move from `Building` to `Activated` exactly once, after every
//! member is in place. Native classes register directly as `Activated`.

mod instance;
mod member;
mod native;
mod registry;

pub use instance::Instance;
pub use member::{
    CtorBody, InterceptorCell, InterceptorFactory, MemberAttributes, MemberBody, NativeCtor,
    NativeMethod, RuntimeCtor, RuntimeMember, WrapperPlan,
};
pub use native::NativeClass;
pub use registry::{FieldSlot, RuntimeType, TypeSpace, TypeState};
