//! The member synthesis engine.
//!
//! For one source member this engine resolves the generated member's
//! attributes, synthesizes the private trampoline when a real implementation
//! is reachable, and defines the interception wrapper. The wrapper itself is
//! a fixed [`WrapperPlan`]: every decision is made here, once, and the
//! dispatch path only executes the plan.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::descriptor::{MethodDescriptor, TypeRef, Visibility};
use crate::space::{MemberAttributes, MemberBody, RuntimeMember, WrapperPlan};
use crate::synth::backend::SynthesisBackend;
use crate::synth::body::BodyEmitter;
use crate::synth::hooks::{StagePipeline, StageView};
use crate::synth::type_builder::{ProxyStrategy, TypeSynthesis};
use crate::{SynthResult, SynthesisError};

/// The member synthesis engine, sharing one creation counter and stage
/// pipeline across every member of a `create` call
pub struct ProxyMethodBuilder<'a> {
    pipeline: &'a StagePipeline,
    counter: &'a AtomicUsize,
}

impl<'a> ProxyMethodBuilder<'a> {
    /// Engine over the shared pipeline and counter
    pub fn new(pipeline: &'a StagePipeline, counter: &'a AtomicUsize) -> Self {
        Self { pipeline, counter }
    }

    /// Build one member of the proxy type.
    ///
    /// Fails with `UnsupportedMember` on members carrying their own type
    /// parameters; the failure aborts the whole type's synthesis.
    pub fn build_member(
        &self,
        backend: &mut dyn SynthesisBackend,
        synthesis: &TypeSynthesis,
        member: &MethodDescriptor,
    ) -> SynthResult<()> {
        if !member.type_params.is_empty() {
            return Err(SynthesisError::UnsupportedMember {
                member: member.name.clone(),
                reason: "type-parameterized members are not supported".to_string(),
            });
        }

        let attributes = self.resolve_attributes(synthesis, member);

        let trampoline = if !member.is_abstract && (!synthesis.is_interface || synthesis.is_sealed)
        {
            Some(self.build_trampoline(backend, synthesis, member)?)
        } else {
            None
        };

        let view = StageView {
            proxy_name: &synthesis.proxy_name,
            strategy: synthesis.strategy,
            member,
            decorator_field: synthesis.decorator_field,
            interceptor_field: synthesis.interceptor_field,
            serial: self.counter.load(Ordering::Relaxed),
        };

        let mut additions = self.pipeline.run_pre_init(&view);
        additions.merge(self.pipeline.run_pre_invoke(&view));

        let wrapper = RuntimeMember {
            name: member.name.clone(),
            attributes,
            params: member.params.iter().map(|p| p.ty.clone()).collect(),
            return_type: member.return_type.clone(),
            body: MemberBody::Wrapper(WrapperPlan {
                trampoline,
                decorator_field: synthesis.decorator_field,
                interceptor_field: synthesis.interceptor_field,
            }),
        };
        backend.define_member(synthesis.type_id, wrapper)?;

        additions.merge(self.pipeline.run_post_invoke(&view));

        for slot in additions.fields {
            backend.define_field(synthesis.type_id, &slot.name, slot.ty)?;
        }
        for extra in additions.members {
            backend.define_member(synthesis.type_id, extra)?;
        }
        Ok(())
    }

    /// Attribute resolution: pure-interface proxies pin members public and
    /// final; abstract source members become public and overridable;
    /// everything else keeps the source member's visibility and virtuality.
    fn resolve_attributes(
        &self,
        synthesis: &TypeSynthesis,
        member: &MethodDescriptor,
    ) -> MemberAttributes {
        if synthesis.strategy == ProxyStrategy::PureInterface {
            MemberAttributes {
                visibility: Visibility::Public,
                is_virtual: true,
                is_final: true,
                is_new_slot: true,
            }
        } else if member.is_abstract {
            MemberAttributes {
                visibility: Visibility::Public,
                is_virtual: true,
                is_final: false,
                is_new_slot: true,
            }
        } else {
            MemberAttributes {
                visibility: member.visibility,
                is_virtual: member.is_virtual,
                is_final: member.is_final,
                is_new_slot: false,
            }
        }
    }

    /// Synthesize the private helper performing the real call.
    ///
    /// The trampoline takes the positional argument bag as its only formal
    /// argument, unpacks and narrows each element to the declared parameter
    /// type, performs the real call, and returns the raw result.
    fn build_trampoline(
        &self,
        backend: &mut dyn SynthesisBackend,
        synthesis: &TypeSynthesis,
        member: &MethodDescriptor,
    ) -> SynthResult<usize> {
        let serial = self.counter.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}_execute_{}", member.name, serial);
        let mut emitter = BodyEmitter::new(name.clone(), 1);

        match synthesis.strategy {
            ProxyStrategy::Decoration => {
                let decorator = synthesis.decorator_field.ok_or_else(|| {
                    SynthesisError::InvalidState(
                        "decoration strategy without a decorator field".to_string(),
                    )
                })?;
                emitter.emit_load_field(decorator)?;
                for (index, param) in member.params.iter().enumerate() {
                    emitter.emit_load_arg(0)?;
                    emitter.emit_load_element(index)?;
                    emitter.emit_convert(param.ty.clone())?;
                }
                emitter.emit_call_virtual(member.name.as_str(), member.params.len())?;
            }
            ProxyStrategy::Subclassing => {
                for (index, param) in member.params.iter().enumerate() {
                    emitter.emit_load_arg(0)?;
                    emitter.emit_load_element(index)?;
                    emitter.emit_convert(param.ty.clone())?;
                }
                emitter.emit_call_parent(member.name.as_str(), member.params.len())?;
            }
            ProxyStrategy::PureInterface => {
                return Err(SynthesisError::InvalidState(
                    "no real implementation to trampoline to".to_string(),
                ));
            }
        }
        emitter.emit_return()?;
        let body = emitter.build()?;

        backend.define_member(
            synthesis.type_id,
            RuntimeMember {
                name,
                attributes: MemberAttributes::private(),
                params: vec![TypeRef::Any],
                return_type: TypeRef::Any,
                body: MemberBody::Emitted(Arc::new(body)),
            },
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ParamDescriptor;
    use crate::synth::body::Inst;
    use crate::synth::type_builder::ProxyStrategy;

    fn synthesis_for(strategy: ProxyStrategy) -> TypeSynthesis {
        TypeSynthesis {
            type_id: 0,
            proxy_name: "ProxyThing_0".to_string(),
            strategy,
            is_interface: strategy == ProxyStrategy::PureInterface,
            is_sealed: strategy == ProxyStrategy::Decoration,
            is_abstract: false,
            decorator_field: match strategy {
                ProxyStrategy::Decoration => Some(0),
                _ => None,
            },
            interceptor_field: match strategy {
                ProxyStrategy::Decoration => 1,
                _ => 0,
            },
            members: Vec::new(),
        }
    }

    struct RecordingBackend {
        members: Vec<RuntimeMember>,
        fields: Vec<String>,
    }

    impl RecordingBackend {
        fn new() -> Self {
            Self {
                members: Vec::new(),
                fields: Vec::new(),
            }
        }
    }

    impl SynthesisBackend for RecordingBackend {
        fn resolve_type(&self, name: &str) -> SynthResult<usize> {
            Err(SynthesisError::UnknownType {
                name: name.to_string(),
            })
        }

        fn has_ctor(&self, _type_id: usize, _argc: usize) -> bool {
            false
        }

        fn define_type(
            &mut self,
            _name: &str,
            _parent: Option<&str>,
            _contracts: &[String],
        ) -> SynthResult<usize> {
            Ok(0)
        }

        fn define_field(&mut self, _type_id: usize, name: &str, _ty: TypeRef) -> SynthResult<usize> {
            self.fields.push(name.to_string());
            Ok(self.fields.len() - 1)
        }

        fn define_member(&mut self, _type_id: usize, member: RuntimeMember) -> SynthResult<usize> {
            self.members.push(member);
            Ok(self.members.len() - 1)
        }

        fn define_ctor(
            &mut self,
            _type_id: usize,
            _ctor: crate::space::RuntimeCtor,
        ) -> SynthResult<usize> {
            Ok(0)
        }

        fn bind_interceptor(
            &mut self,
            _type_id: usize,
            _factory: crate::space::InterceptorFactory,
        ) -> SynthResult<()> {
            Ok(())
        }

        fn complete_type(&mut self, type_id: usize) -> SynthResult<usize> {
            Ok(type_id)
        }
    }

    fn concrete_member() -> MethodDescriptor {
        MethodDescriptor::new("fetch")
            .with_param(ParamDescriptor::new("key", TypeRef::Str))
            .with_param(ParamDescriptor::new("limit", TypeRef::I32))
            .returns(TypeRef::Str)
            .as_virtual()
    }

    #[test]
    fn test_decoration_trampoline_unpacks_through_decorator() {
        let pipeline = StagePipeline::new();
        let counter = AtomicUsize::new(0);
        let builder = ProxyMethodBuilder::new(&pipeline, &counter);
        let mut backend = RecordingBackend::new();

        builder
            .build_member(&mut backend, &synthesis_for(ProxyStrategy::Decoration), &concrete_member())
            .unwrap();

        assert_eq!(backend.members.len(), 2);
        let trampoline = &backend.members[0];
        assert_eq!(trampoline.name, "fetch_execute_0");
        assert_eq!(trampoline.params, vec![TypeRef::Any]);
        let body = match &trampoline.body {
            MemberBody::Emitted(body) => body,
            other => panic!("expected emitted body, got {other:?}"),
        };
        assert_eq!(body.insts[0], Inst::LoadField(0));
        assert_eq!(
            body.insts[body.insts.len() - 2],
            Inst::CallVirtual {
                member: "fetch".to_string(),
                argc: 2
            }
        );
        assert_eq!(body.insts[body.insts.len() - 1], Inst::Ret);
        // bag unpacking narrows each element to the declared parameter type
        assert!(body.insts.contains(&Inst::Convert(TypeRef::Str)));
        assert!(body.insts.contains(&Inst::Convert(TypeRef::I32)));
    }

    #[test]
    fn test_subclassing_trampoline_calls_parent() {
        let pipeline = StagePipeline::new();
        let counter = AtomicUsize::new(0);
        let builder = ProxyMethodBuilder::new(&pipeline, &counter);
        let mut backend = RecordingBackend::new();

        builder
            .build_member(&mut backend, &synthesis_for(ProxyStrategy::Subclassing), &concrete_member())
            .unwrap();

        let trampoline = &backend.members[0];
        let body = match &trampoline.body {
            MemberBody::Emitted(body) => body,
            other => panic!("expected emitted body, got {other:?}"),
        };
        assert!(body.insts.iter().any(|inst| matches!(
            inst,
            Inst::CallParent { member, argc: 2 } if member == "fetch"
        )));
        assert!(!body.insts.iter().any(|inst| matches!(inst, Inst::LoadField(_))));
    }

    #[test]
    fn test_abstract_member_gets_no_trampoline_and_stays_overridable() {
        let pipeline = StagePipeline::new();
        let counter = AtomicUsize::new(0);
        let builder = ProxyMethodBuilder::new(&pipeline, &counter);
        let mut backend = RecordingBackend::new();

        let member = MethodDescriptor::new("ping").as_abstract();
        builder
            .build_member(&mut backend, &synthesis_for(ProxyStrategy::Subclassing), &member)
            .unwrap();

        assert_eq!(backend.members.len(), 1);
        let wrapper = &backend.members[0];
        match &wrapper.body {
            MemberBody::Wrapper(plan) => assert!(plan.trampoline.is_none()),
            other => panic!("expected wrapper, got {other:?}"),
        }
        assert!(wrapper.attributes.is_virtual);
        assert!(!wrapper.attributes.is_final);
        assert!(wrapper.attributes.is_new_slot);
    }

    #[test]
    fn test_concrete_member_keeps_source_attributes() {
        let pipeline = StagePipeline::new();
        let counter = AtomicUsize::new(0);
        let builder = ProxyMethodBuilder::new(&pipeline, &counter);
        let mut backend = RecordingBackend::new();

        let member = concrete_member().as_final();
        builder
            .build_member(&mut backend, &synthesis_for(ProxyStrategy::Subclassing), &member)
            .unwrap();

        let wrapper = &backend.members[1];
        assert_eq!(wrapper.name, "fetch");
        assert!(wrapper.attributes.is_virtual);
        assert!(wrapper.attributes.is_final);
        assert!(!wrapper.attributes.is_new_slot);
    }

    #[test]
    fn test_stage_additions_applied_after_member() {
        use crate::space::FieldSlot;
        use crate::synth::hooks::StageAdditions;

        let mut pipeline = StagePipeline::new();
        pipeline.add_pre_init(|view| {
            StageAdditions::none().with_field(FieldSlot::new(
                format!("_trace_{}", view.member.name),
                TypeRef::Any,
            ))
        });
        let counter = AtomicUsize::new(0);
        let builder = ProxyMethodBuilder::new(&pipeline, &counter);
        let mut backend = RecordingBackend::new();

        builder
            .build_member(&mut backend, &synthesis_for(ProxyStrategy::Subclassing), &concrete_member())
            .unwrap();

        assert_eq!(backend.fields, vec!["_trace_fetch".to_string()]);
        // wrapper landed before the stage's field was applied
        assert_eq!(backend.members.last().unwrap().name, "fetch");
    }

    #[test]
    fn test_generic_member_rejected() {
        let pipeline = StagePipeline::new();
        let counter = AtomicUsize::new(0);
        let builder = ProxyMethodBuilder::new(&pipeline, &counter);
        let mut backend = RecordingBackend::new();

        let member = MethodDescriptor::new("map").with_type_param("T");
        let err = builder
            .build_member(&mut backend, &synthesis_for(ProxyStrategy::Subclassing), &member)
            .unwrap_err();
        assert!(matches!(err, SynthesisError::UnsupportedMember { .. }));
        assert!(backend.members.is_empty());
    }

    #[test]
    fn test_pure_interface_strategy() {
        let pipeline = StagePipeline::new();
        let counter = AtomicUsize::new(0);
        let builder = ProxyMethodBuilder::new(&pipeline, &counter);
        let mut backend = RecordingBackend::new();

        // interface members are abstract, so no trampoline is attempted
        let member = MethodDescriptor::new("greet")
            .with_param(ParamDescriptor::new("name", TypeRef::Str))
            .returns(TypeRef::Str)
            .as_abstract();
        builder
            .build_member(&mut backend, &synthesis_for(ProxyStrategy::PureInterface), &member)
            .unwrap();

        assert_eq!(backend.members.len(), 1);
        let wrapper = &backend.members[0];
        assert!(wrapper.attributes.is_final);
        assert_eq!(wrapper.attributes.visibility, Visibility::Public);
    }

    #[test]
    fn test_counter_is_shared_across_builds() {
        let pipeline = StagePipeline::new();
        let counter = AtomicUsize::new(0);
        let builder = ProxyMethodBuilder::new(&pipeline, &counter);
        let mut backend = RecordingBackend::new();

        let synthesis = synthesis_for(ProxyStrategy::Subclassing);
        let first = MethodDescriptor::new("alpha").returns(TypeRef::I32);
        let second = MethodDescriptor::new("beta").returns(TypeRef::I32);
        builder.build_member(&mut backend, &synthesis, &first).unwrap();
        builder.build_member(&mut backend, &synthesis, &second).unwrap();

        let names: Vec<_> = backend
            .members
            .iter()
            .filter(|m| matches!(m.body, MemberBody::Emitted(_)))
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(names, ["alpha_execute_0", "beta_execute_1"]);
    }
}
