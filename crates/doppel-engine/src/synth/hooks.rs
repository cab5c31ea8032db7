//! Build-time synthesis stages.
//!
//! Three ordered stage lists run once per member while a proxy type is being
//! built: pre-init (before trampoline synthesis), pre-invoke (after the
//! trampoline, before the wrapper member lands), and post-invoke (after the
//! wrapper member lands). Stages are pure: each receives a read-only
//! [`StageView`] of the build and returns the [`StageAdditions`] it wants
//! applied to the type. Additions are applied after the current member
//! completes, so a stage only ever shapes what comes after it.

use std::fmt;
use std::sync::Arc;

use crate::descriptor::MethodDescriptor;
use crate::space::{FieldSlot, RuntimeMember};
use crate::synth::type_builder::ProxyStrategy;

/// Read-only view of one member build, handed to every stage
#[derive(Debug, Clone, Copy)]
pub struct StageView<'a> {
    /// Name of the proxy type being built
    pub proxy_name: &'a str,
    /// Strategy the type engine selected
    pub strategy: ProxyStrategy,
    /// The source member being wrapped
    pub member: &'a MethodDescriptor,
    /// Absolute index of the decorator field, when the strategy has one
    pub decorator_field: Option<usize>,
    /// Absolute index of the interceptor field
    pub interceptor_field: usize,
    /// Current value of the shared creation counter
    pub serial: usize,
}

/// What a stage wants added to the proxy type
#[derive(Debug, Default)]
pub struct StageAdditions {
    /// Extra fields to define
    pub fields: Vec<FieldSlot>,
    /// Extra members to define
    pub members: Vec<RuntimeMember>,
}

impl StageAdditions {
    /// No additions
    pub fn none() -> Self {
        Self::default()
    }

    /// Add a field.
    ///
    /// Constructors are emitted before additions apply, so a stage field
    /// starts unset; it holds a value only once a stage-added member writes
    /// one.
    pub fn with_field(mut self, slot: FieldSlot) -> Self {
        self.fields.push(slot);
        self
    }

    /// Add a member
    pub fn with_member(mut self, member: RuntimeMember) -> Self {
        self.members.push(member);
        self
    }

    /// True when nothing was requested
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.members.is_empty()
    }

    /// Fold another batch of additions in, preserving order
    pub fn merge(&mut self, other: StageAdditions) {
        self.fields.extend(other.fields);
        self.members.extend(other.members);
    }
}

/// One build-time stage
pub type SynthStage = Arc<dyn Fn(&StageView<'_>) -> StageAdditions + Send + Sync>;

/// The ordered stage lists for one factory
#[derive(Clone, Default)]
pub struct StagePipeline {
    pre_init: Vec<SynthStage>,
    pre_invoke: Vec<SynthStage>,
    post_invoke: Vec<SynthStage>,
}

impl StagePipeline {
    /// Empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pre-init stage
    pub fn add_pre_init(
        &mut self,
        stage: impl Fn(&StageView<'_>) -> StageAdditions + Send + Sync + 'static,
    ) {
        self.pre_init.push(Arc::new(stage));
    }

    /// Append a pre-invoke stage
    pub fn add_pre_invoke(
        &mut self,
        stage: impl Fn(&StageView<'_>) -> StageAdditions + Send + Sync + 'static,
    ) {
        self.pre_invoke.push(Arc::new(stage));
    }

    /// Append a post-invoke stage
    pub fn add_post_invoke(
        &mut self,
        stage: impl Fn(&StageView<'_>) -> StageAdditions + Send + Sync + 'static,
    ) {
        self.post_invoke.push(Arc::new(stage));
    }

    /// True when no stages are registered anywhere
    pub fn is_empty(&self) -> bool {
        self.pre_init.is_empty() && self.pre_invoke.is_empty() && self.post_invoke.is_empty()
    }

    fn run(stages: &[SynthStage], view: &StageView<'_>) -> StageAdditions {
        let mut merged = StageAdditions::none();
        for stage in stages {
            merged.merge(stage(view));
        }
        merged
    }

    /// Run the pre-init stages in registration order
    pub fn run_pre_init(&self, view: &StageView<'_>) -> StageAdditions {
        Self::run(&self.pre_init, view)
    }

    /// Run the pre-invoke stages in registration order
    pub fn run_pre_invoke(&self, view: &StageView<'_>) -> StageAdditions {
        Self::run(&self.pre_invoke, view)
    }

    /// Run the post-invoke stages in registration order
    pub fn run_post_invoke(&self, view: &StageView<'_>) -> StageAdditions {
        Self::run(&self.post_invoke, view)
    }
}

impl fmt::Debug for StagePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagePipeline")
            .field("pre_init", &self.pre_init.len())
            .field("pre_invoke", &self.pre_invoke.len())
            .field("post_invoke", &self.post_invoke.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
