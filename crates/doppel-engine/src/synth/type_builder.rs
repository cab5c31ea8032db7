//! The type synthesis engine.
//!
//! `ProxyTypeBuilder::create` turns an abstract contract, a concrete
//! implementation, and an interceptor binding into a new proxy type: it
//! selects the generation strategy, defines the shell (fields and
//! constructors) through the backend, picks the member set, and hands each
//! member to the member engine.

use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use doppel_sdk::Interceptor;
use rustc_hash::FxHashSet;

use crate::descriptor::{MethodDescriptor, TypeDescriptor, TypeRef};
use crate::discovery::MemberDiscovery;
use crate::space::{CtorBody, InterceptorFactory, RuntimeCtor};
use crate::synth::backend::SynthesisBackend;
use crate::synth::body::BodyEmitter;
use crate::synth::hooks::StagePipeline;
use crate::synth::method_builder::ProxyMethodBuilder;
use crate::{SynthResult, SynthesisError};

/// How the proxy type relates to the implementation it fronts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStrategy {
    /// Implementation is sealed: the proxy owns it in a decorator field
    Decoration,
    /// Implementation is an open class: the proxy extends it
    Subclassing,
    /// Implementation is an interface: no real calls exist anywhere
    PureInterface,
}

/// A named no-argument interceptor constructor to bind to a proxy type.
///
/// The name keys the factory-level proxy cache, so two bindings with the
/// same name are treated as the same interceptor kind.
#[derive(Clone)]
pub struct InterceptorBinding {
    name: String,
    factory: InterceptorFactory,
}

impl InterceptorBinding {
    /// Bind an interceptor type constructible via `Default`
    pub fn of<T: Interceptor + Default + 'static>() -> Self {
        Self {
            name: std::any::type_name::<T>().to_string(),
            factory: Arc::new(|| Arc::new(T::default()) as Arc<dyn Interceptor>),
        }
    }

    /// Bind a custom constructor under an explicit name
    pub fn from_factory(
        name: impl Into<String>,
        factory: impl Fn() -> Arc<dyn Interceptor> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    /// The binding's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Clone out the constructor
    pub fn factory(&self) -> InterceptorFactory {
        self.factory.clone()
    }
}

impl fmt::Debug for InterceptorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorBinding")
            .field("name", &self.name)
            .finish()
    }
}

/// Inputs to one `create` call.
///
/// Every required input sits in an `Option` slot; `create` reports the first
/// absent one as a `MissingInput` naming the parameter.
#[derive(Default)]
pub struct ProxyRequest<'a> {
    /// The contract the proxy must satisfy
    pub contract: Option<&'a TypeDescriptor>,
    /// The implementation providing real behavior (may equal the contract)
    pub implementation: Option<&'a TypeDescriptor>,
    /// The interceptor to bind
    pub interceptor: Option<InterceptorBinding>,
    /// The backend to define the type through
    pub backend: Option<&'a mut dyn SynthesisBackend>,
    /// Suffix appended to the generated type name
    pub name_suffix: String,
}

impl<'a> ProxyRequest<'a> {
    /// Empty request
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the contract
    pub fn with_contract(mut self, contract: &'a TypeDescriptor) -> Self {
        self.contract = Some(contract);
        self
    }

    /// Set the implementation
    pub fn with_implementation(mut self, implementation: &'a TypeDescriptor) -> Self {
        self.implementation = Some(implementation);
        self
    }

    /// Set the interceptor binding
    pub fn with_interceptor(mut self, binding: InterceptorBinding) -> Self {
        self.interceptor = Some(binding);
        self
    }

    /// Set the backend
    pub fn with_backend(mut self, backend: &'a mut dyn SynthesisBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the generated name suffix
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.name_suffix = suffix.into();
        self
    }
}

/// Everything one `create` call decided, returned to the caller.
///
/// The type referenced by `type_id` is still in the building state; the
/// caller finalizes it through the backend once it is satisfied.
#[derive(Debug, Clone)]
pub struct TypeSynthesis {
    /// Registry id of the new proxy type
    pub type_id: usize,
    /// Generated type name
    pub proxy_name: String,
    /// Selected strategy
    pub strategy: ProxyStrategy,
    /// Whether the implementation is an interface
    pub is_interface: bool,
    /// Whether the implementation is sealed
    pub is_sealed: bool,
    /// Whether the implementation is abstract
    pub is_abstract: bool,
    /// Absolute index of the decorator field, under decoration
    pub decorator_field: Option<usize>,
    /// Absolute index of the interceptor field
    pub interceptor_field: usize,
    /// The member set selected for proxying
    pub members: Vec<MethodDescriptor>,
}

/// The type synthesis engine
pub struct ProxyTypeBuilder<'a> {
    discovery: &'a dyn MemberDiscovery,
    pipeline: &'a StagePipeline,
    counter: &'a AtomicUsize,
}

impl<'a> ProxyTypeBuilder<'a> {
    /// Engine over a discovery source, a stage pipeline, and the shared
    /// creation counter
    pub fn new(
        discovery: &'a dyn MemberDiscovery,
        pipeline: &'a StagePipeline,
        counter: &'a AtomicUsize,
    ) -> Self {
        Self {
            discovery,
            pipeline,
            counter,
        }
    }

    /// Synthesize a proxy type for the request.
    ///
    /// On success the type is fully shaped but not yet activated; complete
    /// it through the backend before instantiating.
    pub fn create(&self, request: ProxyRequest<'_>) -> SynthResult<TypeSynthesis> {
        let contract = request
            .contract
            .ok_or(SynthesisError::MissingInput {
                param: "abstract_contract",
            })?;
        let implementation = request
            .implementation
            .ok_or(SynthesisError::MissingInput {
                param: "concrete_implementation",
            })?;
        let binding = request.interceptor.ok_or(SynthesisError::MissingInput {
            param: "interceptor_capability",
        })?;
        let backend = request.backend.ok_or(SynthesisError::MissingInput {
            param: "backend",
        })?;

        // a sealed contract with no distinct implementation cannot be
        // proxied by any strategy
        if contract.is_sealed && contract.name == implementation.name {
            return Err(SynthesisError::UnsupportedTarget {
                type_name: contract.name.clone(),
                reason: "sealed type with no distinct implementation".to_string(),
            });
        }

        let strategy = if implementation.is_sealed {
            ProxyStrategy::Decoration
        } else if implementation.is_class() {
            ProxyStrategy::Subclassing
        } else {
            ProxyStrategy::PureInterface
        };

        let proxy_name = format!("Proxy{}{}", contract.name, request.name_suffix);

        let (parent, contracts): (Option<&str>, Vec<String>) = match strategy {
            ProxyStrategy::Decoration => {
                if contract.is_class() {
                    (Some(contract.name.as_str()), Vec::new())
                } else {
                    (None, vec![contract.name.clone()])
                }
            }
            ProxyStrategy::Subclassing => {
                (Some(implementation.name.as_str()), vec![contract.name.clone()])
            }
            ProxyStrategy::PureInterface => (None, vec![contract.name.clone()]),
        };

        // parent constructor chaining must be possible before anything is
        // defined, so a rejected target leaves no partial type behind
        let chain_parent = parent.is_some();
        if let Some(parent_name) = parent {
            let parent_id = backend.resolve_type(parent_name)?;
            if !backend.has_ctor(parent_id, 0) {
                return Err(SynthesisError::UnsupportedTarget {
                    type_name: parent_name.to_string(),
                    reason: "parent has no parameterless constructor to chain".to_string(),
                });
            }
        }

        let type_id = backend.define_type(&proxy_name, parent, &contracts)?;

        let decorator_field = match strategy {
            ProxyStrategy::Decoration => Some(backend.define_field(
                type_id,
                "_decorator",
                TypeRef::Named(implementation.name.clone()),
            )?),
            _ => None,
        };
        let interceptor_field = backend.define_field(type_id, "_interceptor", TypeRef::Any)?;

        backend.bind_interceptor(type_id, binding.factory())?;

        match strategy {
            ProxyStrategy::Decoration => {
                let implementation_id = backend.resolve_type(&implementation.name)?;
                if backend.has_ctor(implementation_id, 0) {
                    let mut emitter = BodyEmitter::new(format!("{proxy_name}::ctor/0"), 0);
                    if chain_parent {
                        emitter.emit_invoke_parent_ctor(0)?;
                    }
                    emitter.emit_new_object(implementation_id, 0)?;
                    emitter.emit_store_field(decorator_slot(decorator_field)?)?;
                    emitter.emit_new_interceptor()?;
                    emitter.emit_store_field(interceptor_field)?;
                    emitter.emit_return_void()?;
                    backend.define_ctor(
                        type_id,
                        RuntimeCtor {
                            params: Vec::new(),
                            body: CtorBody::Emitted(Arc::new(emitter.build()?)),
                        },
                    )?;
                }

                // wrap a caller-supplied instance instead of a fresh one
                let mut emitter = BodyEmitter::new(format!("{proxy_name}::ctor/1"), 1);
                if chain_parent {
                    emitter.emit_invoke_parent_ctor(0)?;
                }
                emitter.emit_load_arg(0)?;
                emitter.emit_convert(TypeRef::Named(contract.name.clone()))?;
                emitter.emit_store_field(decorator_slot(decorator_field)?)?;
                emitter.emit_new_interceptor()?;
                emitter.emit_store_field(interceptor_field)?;
                emitter.emit_return_void()?;
                backend.define_ctor(
                    type_id,
                    RuntimeCtor {
                        params: vec![TypeRef::Named(contract.name.clone())],
                        body: CtorBody::Emitted(Arc::new(emitter.build()?)),
                    },
                )?;
            }
            ProxyStrategy::Subclassing => {
                let mut emitter = BodyEmitter::new(format!("{proxy_name}::ctor/0"), 0);
                emitter.emit_invoke_parent_ctor(0)?;
                emitter.emit_new_interceptor()?;
                emitter.emit_store_field(interceptor_field)?;
                emitter.emit_return_void()?;
                backend.define_ctor(
                    type_id,
                    RuntimeCtor {
                        params: Vec::new(),
                        body: CtorBody::Emitted(Arc::new(emitter.build()?)),
                    },
                )?;
            }
            ProxyStrategy::PureInterface => {
                let mut emitter = BodyEmitter::new(format!("{proxy_name}::ctor/0"), 0);
                emitter.emit_new_interceptor()?;
                emitter.emit_store_field(interceptor_field)?;
                emitter.emit_return_void()?;
                backend.define_ctor(
                    type_id,
                    RuntimeCtor {
                        params: Vec::new(),
                        body: CtorBody::Emitted(Arc::new(emitter.build()?)),
                    },
                )?;
            }
        }

        let members = self.select_members(contract, implementation);

        let synthesis = TypeSynthesis {
            type_id,
            proxy_name,
            strategy,
            is_interface: implementation.is_interface(),
            is_sealed: implementation.is_sealed,
            is_abstract: implementation.is_abstract,
            decorator_field,
            interceptor_field,
            members,
        };

        let method_builder = ProxyMethodBuilder::new(self.pipeline, self.counter);
        for member in &synthesis.members {
            method_builder.build_member(backend, &synthesis, member)?;
        }

        Ok(synthesis)
    }

    /// The member set to proxy: everything the implementation declares when
    /// it is an interface, otherwise only implementation members whose name
    /// also appears on the contract.
    fn select_members(
        &self,
        contract: &TypeDescriptor,
        implementation: &TypeDescriptor,
    ) -> Vec<MethodDescriptor> {
        let mut members = self.discovery.methods(implementation);
        for property in self.discovery.properties(implementation) {
            members.extend(self.discovery.accessors(&property));
        }
        if implementation.is_interface() {
            return members;
        }

        let mut contract_names: FxHashSet<String> = self
            .discovery
            .methods(contract)
            .into_iter()
            .map(|m| m.name)
            .collect();
        for property in self.discovery.properties(contract) {
            for accessor in self.discovery.accessors(&property) {
                contract_names.insert(accessor.name);
            }
        }
        members.retain(|m| contract_names.contains(&m.name));
        members
    }
}

fn decorator_slot(decorator_field: Option<usize>) -> SynthResult<usize> {
    decorator_field.ok_or_else(|| {
        SynthesisError::InvalidState("decoration strategy without a decorator field".to_string())
    })
}

// ============================================================================
// Tests
// ============================================================================
