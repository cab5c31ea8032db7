//! Doppel Proxy Engine
//!
//! This crate synthesizes, at process runtime, concrete types that stand in
//! for an abstract contract and route every member call through an
//! interceptor:
//! - **Descriptors**: declarative type/member model (`descriptor` module)
//! - **Discovery**: member and property enumeration (`discovery` module)
//! - **Type space**: runtime type registry and instances (`space` module)
//! - **Synthesis**: the type and member synthesis engines (`synth` module)
//! - **Runtime**: body evaluation and member dispatch (`runtime` module)
//! - **Factory**: the one-stop facade (`factory` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use doppel_engine::ProxyFactory;
//! use doppel_engine::synth::InterceptorBinding;
//! use doppel_sdk::{Passthrough, Value};
//!
//! let factory = ProxyFactory::new();
//! factory.space().register_type(greeter_contract())?;
//! factory.space().register_type(greeter_impl())?;
//!
//! let proxy_type = factory.create_proxy(
//!     "Greeter",
//!     "GreeterImpl",
//!     InterceptorBinding::of::<Passthrough>(),
//! )?;
//! let instance = factory.instantiate(proxy_type)?;
//! let reply = factory.call(&instance, "greet", &[Value::str("Ada")])?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Descriptor module: declarative type, member, and signature model
pub mod descriptor;

/// Discovery module: member/property enumeration over descriptors
pub mod discovery;

/// Space module: runtime type registry, instances, and lifecycle
pub mod space;

/// Synthesis module: emitted bodies, backend, hooks, and both engines
pub mod synth;

/// Runtime module: body evaluation, conversion, and member dispatch
pub mod runtime;

/// Factory module: the proxy synthesis facade
pub mod factory;

// ============================================================================
// Re-exports
// ============================================================================

pub use descriptor::{
    MethodDescriptor, ParamDescriptor, PropertyDescriptor, TypeDescriptor, TypeKind, TypeRef,
    Visibility,
};
pub use discovery::{DescriptorDiscovery, MemberDiscovery};
pub use factory::ProxyFactory;
pub use space::{Instance, TypeSpace, TypeState};
pub use synth::{
    InterceptorBinding, ProxyMethodBuilder, ProxyRequest, ProxyStrategy, ProxyTypeBuilder,
    SpaceBackend, SynthesisBackend, TypeSynthesis,
};

// ============================================================================
// Errors
// ============================================================================

/// Synthesis-time errors.
///
/// Everything here is fatal to the `create` call that raised it and is never
/// retried internally: synthesis is deterministic, so the same inputs
/// reproduce the same failure. Call-time failures use
/// [`doppel_sdk::CallError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// A required synthesis input was absent
    #[error("Missing construction input: {param}")]
    MissingInput {
        /// Name of the absent parameter
        param: &'static str,
    },

    /// The target type shape cannot be proxied at all
    #[error("Cannot proxy '{type_name}': {reason}")]
    UnsupportedTarget {
        /// The offending type
        type_name: String,
        /// Why the shape is rejected
        reason: String,
    },

    /// A member shape the engine does not handle
    #[error("Cannot proxy member '{member}': {reason}")]
    UnsupportedMember {
        /// The offending member
        member: String,
        /// Why the member is rejected
        reason: String,
    },

    /// A type with this name already exists in the space
    #[error("Duplicate type name: '{name}'")]
    DuplicateType {
        /// The colliding name
        name: String,
    },

    /// A field or member with this name already exists on the type
    #[error("Type '{type_name}' already defines '{member}'")]
    DuplicateMember {
        /// Declaring type
        type_name: String,
        /// The colliding field or member name
        member: String,
    },

    /// Lookup of a type by name or id failed
    #[error("Unknown type: '{name}'")]
    UnknownType {
        /// The name or id that failed to resolve
        name: String,
    },

    /// Lookup of a member on a known type failed
    #[error("Type '{type_name}' has no member '{member}'")]
    UnknownMember {
        /// Type the lookup ran against
        type_name: String,
        /// Member that was requested
        member: String,
    },

    /// Operation not valid in the type's current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An emitted body failed validation
    #[error("Invalid body: {0}")]
    InvalidBody(String),
}

/// Synthesis result type
pub type SynthResult<T> = Result<T, SynthesisError>;
