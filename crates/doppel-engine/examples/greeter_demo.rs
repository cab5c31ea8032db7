//! End-to-end proxy synthesis walkthrough
//!
//! Registers a greeting contract with open, sealed, and interface-only
//! implementations, synthesizes a proxy type for each, and shows
//! interceptors forwarding, substituting, and observing calls.
//!
//! Run with:
//!   cargo run --example greeter_demo

use std::sync::Arc;

use doppel_engine::space::{MemberAttributes, MemberBody, NativeClass, RuntimeMember};
use doppel_engine::synth::StageAdditions;
use doppel_engine::{
    InterceptorBinding, MethodDescriptor, ParamDescriptor, ProxyFactory, TypeDescriptor, TypeRef,
};
use doppel_sdk::{CallError, FnInterceptor, Interceptor, Passthrough, PendingResult, Value};

// ============================================================================
// Registration helpers
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

fn open_impl() -> NativeClass {
    NativeClass::new(TypeDescriptor::class("GreeterImpl").with_method(greeter_method()))
        .implements("Greeter")
        .with_ctor(vec![], |_, _| Ok(vec![]))
        .with_method("greet", |_, _, args| {
            Ok(Value::str(format!(
                "Hello, {}",
                args[0].as_str().unwrap_or("?")
            )))
        })
}

fn sealed_impl() -> NativeClass {
    NativeClass::new(
        TypeDescriptor::class("ShoutingGreeter")
            .as_sealed()
            .with_method(greeter_method()),
    )
    .implements("Greeter")
    .with_ctor(vec![], |_, _| Ok(vec![]))
    .with_method("greet", |_, _, args| {
        Ok(Value::str(format!(
            "HELLO, {}!",
            args[0].as_str().unwrap_or("?").to_uppercase()
        )))
    })
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    println!("=================================================================");
    println!("  Doppel proxy synthesis demo");
    println!("=================================================================\n");

    // -------------------------------------------------------------------
    // 1. Subclassing: open class, passthrough interceptor
    // -------------------------------------------------------------------
    println!("--- Subclassing an open class ---\n");

    let factory = ProxyFactory::new();
    factory.space().register_type(greeter_contract()).unwrap();
    factory.space().register_class(open_impl()).unwrap();

    let proxy_type = factory
        .create_proxy("Greeter", "GreeterImpl", InterceptorBinding::of::<Passthrough>())
        .unwrap();
    let proxy = factory.instantiate(proxy_type).unwrap();
    let reply = factory.call(&proxy, "greet", &[Value::str("Ada")]).unwrap();
    println!("  passthrough reply: {:?}\n", reply.as_str().unwrap_or(""));

    // -------------------------------------------------------------------
    // 2. Substitution and gating
    // -------------------------------------------------------------------
    println!("--- Substituting and gating with interceptors ---\n");

    let canned = InterceptorBinding::from_factory("Canned", || {
        Arc::new(FnInterceptor::new(|_| {
            PendingResult::ready(Value::str("intercepted"))
        })) as Arc<dyn Interceptor>
    });
    let canned_type = factory.create_proxy("Greeter", "GreeterImpl", canned).unwrap();
    let canned_proxy = factory.instantiate(canned_type).unwrap();
    let reply = factory
        .call(&canned_proxy, "greet", &[Value::str("Ada")])
        .unwrap();
    println!("  substituted reply: {:?}", reply.as_str().unwrap_or(""));

    let gate = InterceptorBinding::from_factory("Gate", || {
        Arc::new(FnInterceptor::new(|call| {
            let caller = call.arg(0).and_then(|v| v.as_str().map(str::to_string));
            if caller.as_deref() == Some("Mallory") {
                PendingResult::failed(CallError::Failed("not welcome".into()))
            } else {
                call.pending().clone()
            }
        })) as Arc<dyn Interceptor>
    });
    let gated_type = factory.create_proxy("Greeter", "GreeterImpl", gate).unwrap();
    let gated_proxy = factory.instantiate(gated_type).unwrap();
    let ok = factory
        .call(&gated_proxy, "greet", &[Value::str("Ada")])
        .unwrap();
    let denied = factory
        .call(&gated_proxy, "greet", &[Value::str("Mallory")])
        .unwrap_err();
    println!("  gate passed:  {:?}", ok.as_str().unwrap_or(""));
    println!("  gate refused: {denied}\n");

    // -------------------------------------------------------------------
    // 3. Decoration: sealed class behind a stored instance
    // -------------------------------------------------------------------
    println!("--- Decorating a sealed class ---\n");

    factory.space().register_class(sealed_impl()).unwrap();
    let sealed_type = factory
        .create_proxy("Greeter", "ShoutingGreeter", InterceptorBinding::of::<Passthrough>())
        .unwrap();

    // fresh decorator built by the proxy constructor
    let fresh = factory.instantiate(sealed_type).unwrap();
    let reply = factory.call(&fresh, "greet", &[Value::str("Ada")]).unwrap();
    println!("  fresh decorator:    {:?}", reply.as_str().unwrap_or(""));

    // pre-built decorator supplied by the caller
    let impl_id = factory.space().id_of("ShoutingGreeter").unwrap();
    let prebuilt = factory.instantiate(impl_id).unwrap();
    let wrapped = factory.instantiate_with(sealed_type, &[prebuilt]).unwrap();
    let reply = factory.call(&wrapped, "greet", &[Value::str("Ada")]).unwrap();
    println!("  supplied decorator: {:?}\n", reply.as_str().unwrap_or(""));

    // -------------------------------------------------------------------
    // 4. Pure interface: no implementation anywhere
    // -------------------------------------------------------------------
    println!("--- Proxying a bare interface ---\n");

    let answering = InterceptorBinding::from_factory("Answering", || {
        Arc::new(FnInterceptor::new(|call| match call.member() {
            "greet" => PendingResult::ready(Value::str(format!(
                "synthesized for {}",
                call.arg(0)
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_default()
            ))),
            _ => PendingResult::ready(Value::Null),
        })) as Arc<dyn Interceptor>
    });
    let pure_type = factory.create_proxy("Greeter", "Greeter", answering).unwrap();
    let pure_proxy = factory.instantiate(pure_type).unwrap();
    let reply = factory
        .call(&pure_proxy, "greet", &[Value::str("Ada")])
        .unwrap();
    println!("  interface reply: {:?}\n", reply.as_str().unwrap_or(""));

    // -------------------------------------------------------------------
    // 5. Synthesis stages: extra members woven in at build time
    // -------------------------------------------------------------------
    println!("--- Adding members through a synthesis stage ---\n");

    let mut staged = ProxyFactory::new();
    staged.space().register_type(greeter_contract()).unwrap();
    staged.space().register_class(open_impl()).unwrap();
    staged.add_post_invoke(|view| {
        StageAdditions::none().with_member(RuntimeMember {
            name: format!("{}_signature", view.member.name),
            attributes: MemberAttributes::public(),
            params: vec![],
            return_type: TypeRef::Str,
            body: MemberBody::Native(Arc::new(|_, _, _| {
                Ok(Value::str("greet(name: str) -> str"))
            })),
        })
    });

    let staged_type = staged
        .create_proxy("Greeter", "GreeterImpl", InterceptorBinding::of::<Passthrough>())
        .unwrap();
    let staged_proxy = staged.instantiate(staged_type).unwrap();
    let signature = staged
        .call(&staged_proxy, "greet_signature", &[])
        .unwrap();
    println!("  stage member: {:?}", signature.as_str().unwrap_or(""));
    let reply = staged
        .call(&staged_proxy, "greet", &[Value::str("Ada")])
        .unwrap();
    println!("  wrapper still intact: {:?}\n", reply.as_str().unwrap_or(""));

    println!("=================================================================");
    println!("  Demo complete.");
    println!("=================================================================");
}
