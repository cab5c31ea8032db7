//! Runtime member and constructor entries.
//!
//! A [`RuntimeMember`] is one callable slot in a type's member table. Bodies
//! come in four forms: native closures (registered implementation classes),
//! emitted instruction sequences (generated trampolines), wrapper plans
//! (generated interception members), and abstract placeholders (contract
//! members with nothing to run).

use std::fmt;
use std::sync::Arc;

use doppel_sdk::{CallResult, Interceptor, Value};

use crate::descriptor::{TypeRef, Visibility};
use crate::synth::EmittedBody;
use crate::space::TypeSpace;

/// A native member body: receiver plus positional arguments in, value out.
///
/// The space handle is passed so bodies can allocate instances or call other
/// members without holding their own registry reference.
pub type NativeMethod = Arc<dyn Fn(&TypeSpace, &Value, &[Value]) -> CallResult<Value> + Send + Sync>;

/// A native constructor body: positional arguments in, the type's own field
/// values out (in declaration order).
pub type NativeCtor = Arc<dyn Fn(&TypeSpace, &[Value]) -> CallResult<Vec<Value>> + Send + Sync>;

/// No-argument interceptor constructor bound to a synthesized type
pub type InterceptorFactory = Arc<dyn Fn() -> Arc<dyn Interceptor> + Send + Sync>;

/// Object payload holding a live interceptor instance.
///
/// Interceptor instances travel as ordinary object values inside instance
/// fields; this cell is the payload the dispatch path downcasts to.
pub struct InterceptorCell(pub Arc<dyn Interceptor>);

/// Attributes resolved for a synthesized (or registered) member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberAttributes {
    /// Visibility of the member
    pub visibility: Visibility,
    /// Whether the member dispatches virtually
    pub is_virtual: bool,
    /// Whether further overriding is forbidden
    pub is_final: bool,
    /// Whether the member takes a fresh dispatch slot instead of overriding
    pub is_new_slot: bool,
}

impl MemberAttributes {
    /// Public, non-virtual, concrete member
    pub fn public() -> Self {
        Self {
            visibility: Visibility::Public,
            is_virtual: false,
            is_final: false,
            is_new_slot: false,
        }
    }

    /// Private member (generated trampolines)
    pub fn private() -> Self {
        Self {
            visibility: Visibility::Private,
            is_virtual: false,
            is_final: false,
            is_new_slot: false,
        }
    }

    /// Mark virtual
    pub fn as_virtual(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// Mark final
    pub fn as_final(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Mark newly slotted
    pub fn as_new_slot(mut self) -> Self {
        self.is_new_slot = true;
        self
    }
}

/// Fixed interception plan baked into a synthesized wrapper member.
///
/// Every decision the member engine made is recorded here at synthesis time;
/// the dispatch path only executes it. `trampoline` is the member-table index
/// of the generated helper performing the real call, absent when no real
/// implementation exists (pure-interface and abstract members are
/// placeholder-backed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapperPlan {
    /// Member-table index of the trampoline on the owning type, if any
    pub trampoline: Option<usize>,
    /// Absolute field index of the decorator instance, if one exists
    pub decorator_field: Option<usize>,
    /// Absolute field index of the interceptor instance
    pub interceptor_field: usize,
}

/// Body of a runtime member
#[derive(Clone)]
pub enum MemberBody {
    /// Registered native closure
    Native(NativeMethod),
    /// Generated instruction sequence
    Emitted(Arc<EmittedBody>),
    /// Generated interception wrapper
    Wrapper(WrapperPlan),
    /// No body (contract member)
    Abstract,
}

impl fmt::Debug for MemberBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberBody::Native(_) => write!(f, "Native(..)"),
            MemberBody::Emitted(body) => write!(f, "Emitted({} insts)", body.insts.len()),
            MemberBody::Wrapper(plan) => write!(f, "Wrapper({plan:?})"),
            MemberBody::Abstract => write!(f, "Abstract"),
        }
    }
}

/// One callable slot in a type's member table
#[derive(Debug, Clone)]
pub struct RuntimeMember {
    /// Member name (unique within the owning type)
    pub name: String,
    /// Resolved attributes
    pub attributes: MemberAttributes,
    /// Declared parameter types, in order
    pub params: Vec<TypeRef>,
    /// Declared return type (`Void` when none)
    pub return_type: TypeRef,
    /// The body to run
    pub body: MemberBody,
}

impl RuntimeMember {
    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Body of a runtime constructor
#[derive(Clone)]
pub enum CtorBody {
    /// Registered native closure
    Native(NativeCtor),
    /// Generated instruction sequence
    Emitted(Arc<EmittedBody>),
}

impl fmt::Debug for CtorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CtorBody::Native(_) => write!(f, "Native(..)"),
            CtorBody::Emitted(body) => write!(f, "Emitted({} insts)", body.insts.len()),
        }
    }
}

/// One constructor in a type's constructor table
#[derive(Debug, Clone)]
pub struct RuntimeCtor {
    /// Declared parameter types, in order
    pub params: Vec<TypeRef>,
    /// The body to run
    pub body: CtorBody,
}

impl RuntimeCtor {
    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}
