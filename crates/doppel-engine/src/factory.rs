//! The proxy factory facade.
//!
//! A [`ProxyFactory`] owns a type space, a synthesis stage pipeline, and the
//! trampoline name counter, and drives the two synthesis engines end to end:
//! look up descriptors, run [`ProxyTypeBuilder`] against a [`SpaceBackend`],
//! activate the finished type, and hand back its id. Construction and
//! dispatch delegate to the runtime module over the same space.
//!
//! Synthesized types are cached per factory, keyed by contract,
//! implementation, and interceptor binding name. There is no process-global
//! state: two factories never share synthesized types unless they share a
//! space on purpose.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use doppel_sdk::{CallResult, Value};

use crate::discovery::DescriptorDiscovery;
use crate::runtime;
use crate::space::TypeSpace;
use crate::synth::{
    InterceptorBinding, ProxyRequest, ProxyTypeBuilder, SpaceBackend, StageAdditions,
    StagePipeline, StageView, SynthesisBackend,
};
use crate::{SynthResult, SynthesisError};

type CacheKey = (String, String, String);

/// Facade over contract registration, proxy synthesis, and dispatch.
pub struct ProxyFactory {
    space: TypeSpace,
    discovery: DescriptorDiscovery,
    pipeline: StagePipeline,
    counter: AtomicUsize,
    type_serial: AtomicUsize,
    cache: Mutex<FxHashMap<CacheKey, usize>>,
}

impl ProxyFactory {
    /// Factory over a fresh, empty type space
    pub fn new() -> Self {
        Self::with_space(TypeSpace::new())
    }

    /// Factory over an existing space.
    ///
    /// Useful when native classes were registered elsewhere or when several
    /// factories should resolve against the same hierarchy.
    pub fn with_space(space: TypeSpace) -> Self {
        ProxyFactory {
            space,
            discovery: DescriptorDiscovery,
            pipeline: StagePipeline::new(),
            counter: AtomicUsize::new(0),
            type_serial: AtomicUsize::new(0),
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// The underlying type space
    pub fn space(&self) -> &TypeSpace {
        &self.space
    }

    /// Register a stage that runs before each member's trampoline exists
    pub fn add_pre_init(
        &mut self,
        stage: impl Fn(&StageView<'_>) -> StageAdditions + Send + Sync + 'static,
    ) {
        self.pipeline.add_pre_init(stage);
    }

    /// Register a stage that runs before each member's wrapper is defined
    pub fn add_pre_invoke(
        &mut self,
        stage: impl Fn(&StageView<'_>) -> StageAdditions + Send + Sync + 'static,
    ) {
        self.pipeline.add_pre_invoke(stage);
    }

    /// Register a stage that runs after each member's wrapper is defined
    pub fn add_post_invoke(
        &mut self,
        stage: impl Fn(&StageView<'_>) -> StageAdditions + Send + Sync + 'static,
    ) {
        self.pipeline.add_post_invoke(stage);
    }

    /// Synthesize (or fetch) the proxy type for a contract, implementation,
    /// and interceptor binding.
    ///
    /// Identical triples return the already synthesized type. Two threads
    /// racing on a cold key may both synthesize; both results are complete
    /// types and the later one wins the cache slot.
    pub fn create_proxy(
        &self,
        contract: &str,
        implementation: &str,
        binding: InterceptorBinding,
    ) -> SynthResult<usize> {
        let key = (
            contract.to_string(),
            implementation.to_string(),
            binding.name().to_string(),
        );
        if let Some(&id) = self.cache.lock().get(&key) {
            return Ok(id);
        }
        let id = self.create_proxy_uncached(contract, implementation, binding)?;
        self.cache.lock().insert(key, id);
        Ok(id)
    }

    /// Synthesize a proxy type, bypassing the cache.
    ///
    /// Every call produces a distinct, independently usable type.
    pub fn create_proxy_uncached(
        &self,
        contract: &str,
        implementation: &str,
        binding: InterceptorBinding,
    ) -> SynthResult<usize> {
        let contract_desc =
            self.space
                .descriptor_of(contract)
                .ok_or_else(|| SynthesisError::UnknownType {
                    name: contract.to_string(),
                })?;
        let impl_desc = self.space.descriptor_of(implementation).ok_or_else(|| {
            SynthesisError::UnknownType {
                name: implementation.to_string(),
            }
        })?;
        let suffix = format!("_{}", self.type_serial.fetch_add(1, Ordering::Relaxed));

        let mut backend = SpaceBackend::new(self.space.clone());
        let builder = ProxyTypeBuilder::new(&self.discovery, &self.pipeline, &self.counter);
        let synthesis = builder.create(
            ProxyRequest::new()
                .with_contract(&contract_desc)
                .with_implementation(&impl_desc)
                .with_interceptor(binding)
                .with_backend(&mut backend)
                .with_suffix(suffix),
        )?;
        backend.complete_type(synthesis.type_id)?;
        Ok(synthesis.type_id)
    }

    /// Construct an instance of a synthesized type with its parameterless
    /// constructor
    pub fn instantiate(&self, type_id: usize) -> CallResult<Value> {
        runtime::construct_instance(&self.space, type_id, &[])
    }

    /// Construct an instance, passing constructor arguments.
    ///
    /// Decoration proxies take the pre-built implementation instance as the
    /// single argument.
    pub fn instantiate_with(&self, type_id: usize, args: &[Value]) -> CallResult<Value> {
        runtime::construct_instance(&self.space, type_id, args)
    }

    /// Call a member on an instance
    pub fn call(&self, receiver: &Value, member: &str, args: &[Value]) -> CallResult<Value> {
        runtime::call_member(&self.space, receiver, member, args)
    }
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProxyFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyFactory")
            .field("types", &self.space.len())
            .field("cached", &self.cache.lock().len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
