//! Integration tests for the proxy synthesis pipeline
//!
//! Drives the type and member engines through the public backend seam and
//! checks strategy selection, the shape of synthesized types, and the
//! synthesis error taxonomy.

use std::sync::atomic::AtomicUsize;

use doppel_engine::space::{MemberBody, NativeClass, WrapperPlan};
use doppel_engine::synth::StagePipeline;
use doppel_engine::{
    DescriptorDiscovery, InterceptorBinding, MethodDescriptor, ParamDescriptor,
    PropertyDescriptor, ProxyRequest, ProxyStrategy, ProxyTypeBuilder, SpaceBackend,
    SynthesisBackend, SynthesisError, TypeDescriptor, TypeRef, TypeSpace, TypeSynthesis,
    Visibility,
};
use doppel_sdk::{Passthrough, Value};

// ============================================================================
// Helpers
// ============================================================================

fn greeter_contract() -> TypeDescriptor {
    TypeDescriptor::interface("Greeter").with_method(
        MethodDescriptor::new("greet")
            .with_param(ParamDescriptor::new("name", TypeRef::Str))
            .returns(TypeRef::Str),
    )
}

fn greeter_method() -> MethodDescriptor {
    MethodDescriptor::new("greet")
        .with_param(ParamDescriptor::new("name", TypeRef::Str))
        .returns(TypeRef::Str)
        .as_virtual()
}

fn greeter_class(name: &str, sealed: bool) -> NativeClass {
    let mut descriptor = TypeDescriptor::class(name).with_method(greeter_method());
    if sealed {
        descriptor = descriptor.as_sealed();
    }
    NativeClass::new(descriptor)
        .implements("Greeter")
        .with_ctor(vec![], |_, _| Ok(vec![]))
        .with_method("greet", |_, _, args| {
            Ok(Value::str(format!(
                "Hello, {}",
                args[0].as_str().unwrap_or("?")
            )))
        })
}

fn synthesize_with_suffix(
    space: &TypeSpace,
    contract: &TypeDescriptor,
    implementation: &TypeDescriptor,
    suffix: &str,
) -> Result<TypeSynthesis, SynthesisError> {
    let pipeline = StagePipeline::new();
    let counter = AtomicUsize::new(0);
    let mut backend = SpaceBackend::new(space.clone());
    let builder = ProxyTypeBuilder::new(&DescriptorDiscovery, &pipeline, &counter);
    let synthesis = builder.create(
        ProxyRequest::new()
            .with_contract(contract)
            .with_implementation(implementation)
            .with_interceptor(InterceptorBinding::of::<Passthrough>())
            .with_backend(&mut backend)
            .with_suffix(suffix),
    )?;
    backend.complete_type(synthesis.type_id)?;
    Ok(synthesis)
}

fn synthesize(
    space: &TypeSpace,
    contract: &TypeDescriptor,
    implementation: &TypeDescriptor,
) -> Result<TypeSynthesis, SynthesisError> {
    synthesize_with_suffix(space, contract, implementation, "")
}

// ============================================================================
// Strategy selection
// ============================================================================

mod strategy_selection {
    use super::*;

    #[test]
    fn test_open_class_subclasses() {
        let space = TypeSpace::new();
        space.register_type(greeter_contract()).unwrap();
        let impl_id = space
            .register_class(greeter_class("GreeterImpl", false))
            .unwrap();

        let contract = greeter_contract();
        let implementation = space.descriptor_of("GreeterImpl").unwrap();
        let synthesis = synthesize(&space, &contract, &implementation).unwrap();

        assert_eq!(synthesis.strategy, ProxyStrategy::Subclassing);
        assert!(synthesis.decorator_field.is_none());

        let ty = space.get(synthesis.type_id).unwrap();
        assert_eq!(ty.parent_id, Some(impl_id));
        assert_eq!(ty.contracts, vec!["Greeter".to_string()]);
        assert!(ty.is_activated());
    }

    #[test]
    fn test_sealed_class_decorates() {
        let space = TypeSpace::new();
        space.register_type(greeter_contract()).unwrap();
        space
            .register_class(greeter_class("SealedGreeter", true))
            .unwrap();

        let contract = greeter_contract();
        let implementation = space.descriptor_of("SealedGreeter").unwrap();
        let synthesis = synthesize(&space, &contract, &implementation).unwrap();

        assert_eq!(synthesis.strategy, ProxyStrategy::Decoration);
        assert!(synthesis.decorator_field.is_some());

        let ty = space.get(synthesis.type_id).unwrap();
        assert_eq!(ty.parent_id, None);
        assert_eq!(ty.ctors.len(), 2);
    }

    #[test]
    fn test_interface_implementation_goes_pure() {
        let space = TypeSpace::new();
        space.register_type(greeter_contract()).unwrap();

        let contract = greeter_contract();
        let synthesis = synthesize(&space, &contract, &contract).unwrap();

        assert_eq!(synthesis.strategy, ProxyStrategy::PureInterface);
        let ty = space.get(synthesis.type_id).unwrap();
        let (_, wrapper) = ty.member("greet").unwrap();
        match &wrapper.body {
            MemberBody::Wrapper(WrapperPlan { trampoline, .. }) => {
                assert!(trampoline.is_none())
            }
            other => panic!("expected wrapper, got {other:?}"),
        }
    }

    #[test]
    fn test_sealed_contract_without_distinct_impl_is_fatal() {
        let space = TypeSpace::new();
        space
            .register_class(greeter_class("LockedGreeter", true))
            .unwrap();
        let before = space.len();

        let locked = space.descriptor_of("LockedGreeter").unwrap();
        let err = synthesize(&space, &locked, &locked).unwrap_err();
        assert!(matches!(err, SynthesisError::UnsupportedTarget { .. }));
        assert_eq!(space.len(), before);
    }
}

// ============================================================================
// Generated shape
// ============================================================================

mod generated_shape {
    use super::*;

    #[test]
    fn test_subclassing_wrapper_and_trampoline() {
        let space = TypeSpace::new();
        space.register_type(greeter_contract()).unwrap();
        space
            .register_class(greeter_class("GreeterImpl", false))
            .unwrap();

        let contract = greeter_contract();
        let implementation = space.descriptor_of("GreeterImpl").unwrap();
        let synthesis = synthesize(&space, &contract, &implementation).unwrap();

        let ty = space.get(synthesis.type_id).unwrap();
        assert_eq!(ty.name, "ProxyGreeter");

        let (_, trampoline) = ty.member("greet_execute_0").unwrap();
        assert_eq!(trampoline.attributes.visibility, Visibility::Private);
        assert_eq!(trampoline.params, vec![TypeRef::Any]);
        assert!(matches!(trampoline.body, MemberBody::Emitted(_)));

        let (trampoline_index, _) = ty.member("greet_execute_0").unwrap();
        let (_, wrapper) = ty.member("greet").unwrap();
        match &wrapper.body {
            MemberBody::Wrapper(plan) => {
                assert_eq!(plan.trampoline, Some(trampoline_index));
                assert_eq!(plan.decorator_field, None);
                assert_eq!(plan.interceptor_field, synthesis.interceptor_field);
            }
            other => panic!("expected wrapper, got {other:?}"),
        }
    }

    #[test]
    fn test_decoration_fields_in_order() {
        let space = TypeSpace::new();
        space.register_type(greeter_contract()).unwrap();
        space
            .register_class(greeter_class("SealedGreeter", true))
            .unwrap();

        let contract = greeter_contract();
        let implementation = space.descriptor_of("SealedGreeter").unwrap();
        let synthesis = synthesize(&space, &contract, &implementation).unwrap();

        let ty = space.get(synthesis.type_id).unwrap();
        assert_eq!(ty.fields.len(), 2);
        assert_eq!(ty.fields[0].name, "_decorator");
        assert_eq!(ty.fields[0].ty, TypeRef::Named("SealedGreeter".into()));
        assert_eq!(ty.fields[1].name, "_interceptor");
        assert_eq!(synthesis.decorator_field, Some(0));
        assert_eq!(synthesis.interceptor_field, 1);
    }

    #[test]
    fn test_member_set_intersects_contract_names() {
        let space = TypeSpace::new();
        space.register_type(greeter_contract()).unwrap();
        let wide = NativeClass::new(
            TypeDescriptor::class("WideGreeter")
                .with_method(greeter_method())
                .with_method(MethodDescriptor::new("extra").returns(TypeRef::I32).as_virtual()),
        )
        .implements("Greeter")
        .with_ctor(vec![], |_, _| Ok(vec![]))
        .with_method("greet", |_, _, _| Ok(Value::str("hi")))
        .with_method("extra", |_, _, _| Ok(Value::I32(1)));
        space.register_class(wide).unwrap();

        let contract = greeter_contract();
        let implementation = space.descriptor_of("WideGreeter").unwrap();
        let synthesis = synthesize(&space, &contract, &implementation).unwrap();

        let names: Vec<_> = synthesis.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["greet"]);

        let ty = space.get(synthesis.type_id).unwrap();
        assert!(ty.member("extra").is_none());
    }

    #[test]
    fn test_property_accessors_synthesized() {
        let space = TypeSpace::new();
        let contract = TypeDescriptor::interface("Labeled")
            .with_property(PropertyDescriptor::new("label", TypeRef::Str));
        space.register_type(contract.clone()).unwrap();

        let synthesis = synthesize(&space, &contract, &contract).unwrap();
        let names: Vec<_> = synthesis.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["get_label", "set_label"]);

        let ty = space.get(synthesis.type_id).unwrap();
        let (_, getter) = ty.member("get_label").unwrap();
        assert_eq!(getter.return_type, TypeRef::Str);
        let (_, setter) = ty.member("set_label").unwrap();
        assert_eq!(setter.params, vec![TypeRef::Str]);
        assert_eq!(setter.return_type, TypeRef::Void);
    }

    #[test]
    fn test_trampoline_names_unique_across_types() {
        let space = TypeSpace::new();
        space.register_type(greeter_contract()).unwrap();
        space
            .register_class(greeter_class("GreeterImpl", false))
            .unwrap();
        let contract = greeter_contract();
        let implementation = space.descriptor_of("GreeterImpl").unwrap();

        // one engine, one counter, two types
        let pipeline = StagePipeline::new();
        let counter = AtomicUsize::new(0);
        let builder = ProxyTypeBuilder::new(&DescriptorDiscovery, &pipeline, &counter);

        let mut backend = SpaceBackend::new(space.clone());
        let first = builder
            .create(
                ProxyRequest::new()
                    .with_contract(&contract)
                    .with_implementation(&implementation)
                    .with_interceptor(InterceptorBinding::of::<Passthrough>())
                    .with_backend(&mut backend)
                    .with_suffix("_0"),
            )
            .unwrap();
        let second = builder
            .create(
                ProxyRequest::new()
                    .with_contract(&contract)
                    .with_implementation(&implementation)
                    .with_interceptor(InterceptorBinding::of::<Passthrough>())
                    .with_backend(&mut backend)
                    .with_suffix("_1"),
            )
            .unwrap();

        let first_ty = space.get(first.type_id).unwrap();
        let second_ty = space.get(second.type_id).unwrap();
        assert!(first_ty.member("greet_execute_0").is_some());
        assert!(second_ty.member("greet_execute_1").is_some());
        assert!(second_ty.member("greet_execute_0").is_none());
    }
}

// ============================================================================
// Error taxonomy
// ============================================================================

mod error_taxonomy {
    use super::*;

    #[test]
    fn test_missing_inputs_are_named_in_order() {
        let contract = greeter_contract();
        let pipeline = StagePipeline::new();
        let counter = AtomicUsize::new(0);
        let builder = ProxyTypeBuilder::new(&DescriptorDiscovery, &pipeline, &counter);

        let err = builder.create(ProxyRequest::new()).unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::MissingInput {
                param: "abstract_contract"
            }
        ));

        let err = builder
            .create(ProxyRequest::new().with_contract(&contract))
            .unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::MissingInput {
                param: "concrete_implementation"
            }
        ));

        let err = builder
            .create(
                ProxyRequest::new()
                    .with_contract(&contract)
                    .with_implementation(&contract),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::MissingInput {
                param: "interceptor_capability"
            }
        ));

        let err = builder
            .create(
                ProxyRequest::new()
                    .with_contract(&contract)
                    .with_implementation(&contract)
                    .with_interceptor(InterceptorBinding::of::<Passthrough>()),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            SynthesisError::MissingInput { param: "backend" }
        ));
    }

    #[test]
    fn test_generic_member_aborts_type() {
        let space = TypeSpace::new();
        let contract = TypeDescriptor::interface("Mapper").with_method(
            MethodDescriptor::new("map")
                .with_type_param("T")
                .returns(TypeRef::Any),
        );
        space.register_type(contract.clone()).unwrap();

        let err = synthesize(&space, &contract, &contract).unwrap_err();
        assert!(matches!(err, SynthesisError::UnsupportedMember { .. }));

        // the aborted type never becomes activatable
        let leftover = space.get_by_name("ProxyMapper").unwrap();
        assert!(!leftover.is_activated());
    }

    #[test]
    fn test_subclassing_requires_parent_parameterless_ctor() {
        let space = TypeSpace::new();
        space.register_type(greeter_contract()).unwrap();
        let impl_class = NativeClass::new(
            TypeDescriptor::class("TaggedGreeter").with_method(greeter_method()),
        )
        .implements("Greeter")
        .with_field("tag", TypeRef::Str)
        .with_ctor(vec![TypeRef::Str], |_, args| Ok(vec![args[0].clone()]))
        .with_method("greet", |_, _, _| Ok(Value::str("hi")));
        space.register_class(impl_class).unwrap();
        let before = space.len();

        let contract = greeter_contract();
        let implementation = space.descriptor_of("TaggedGreeter").unwrap();
        let err = synthesize(&space, &contract, &implementation).unwrap_err();
        match err {
            SynthesisError::UnsupportedTarget { type_name, .. } => {
                assert_eq!(type_name, "TaggedGreeter")
            }
            other => panic!("expected UnsupportedTarget, got {other}"),
        }
        // rejected before anything was defined
        assert_eq!(space.len(), before);
    }

    #[test]
    fn test_lifecycle_rejects_definitions_after_complete() {
        let space = TypeSpace::new();
        let mut backend = SpaceBackend::new(space.clone());
        let type_id = backend.define_type("Late", None, &[]).unwrap();
        backend.complete_type(type_id).unwrap();

        let err = backend
            .define_field(type_id, "_extra", TypeRef::Any)
            .unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidState(_)));
    }
}
