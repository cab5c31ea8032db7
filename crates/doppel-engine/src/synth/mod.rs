//! Proxy type synthesis.
//!
//! Synthesis is a two-stage pipeline. [`ProxyTypeBuilder`] is the type
//! engine: it validates the request, picks the proxy strategy, defines the
//! type shell with its fields and constructors, and selects the member set.
//! [`ProxyMethodBuilder`] is the member engine: for each selected member it
//! resolves attributes, emits the private trampoline when a real
//! implementation is reachable, and defines the interception wrapper.
//!
//! Both engines talk to the type system only through [`SynthesisBackend`],
//! so the whole pipeline can be pointed at a recording backend in tests.
//! [`SpaceBackend`] is the real implementation over a
//! [`TypeSpace`](crate::space::TypeSpace).
//!
//! Synthesized bodies are built with [`BodyEmitter`], which validates its
//! instruction sequence before handing out an immutable [`EmittedBody`].
//! User extension happens through [`StagePipeline`]: ordered, pure stages
//! observing each member and contributing extra fields and members.

mod backend;
mod body;
mod hooks;
mod method_builder;
mod type_builder;

pub use backend::{SpaceBackend, SynthesisBackend};
pub use body::{BodyEmitter, EmittedBody, Inst, ValidationResult};
pub use hooks::{StageAdditions, StagePipeline, StageView, SynthStage};
pub use method_builder::ProxyMethodBuilder;
pub use type_builder::{
    InterceptorBinding, ProxyRequest, ProxyStrategy, ProxyTypeBuilder, TypeSynthesis,
};
