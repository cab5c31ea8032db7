//! Standalone proxy synthesis and dispatch benchmark
//!
//! Measures type synthesis throughput, instantiation cost per strategy,
//! and the dispatch overhead a proxied call adds over a direct native call.
//!
//! Run with:
//!   cargo run --example proxy_bench --release
//!
//! All timings are measured via std::time::Instant (no external dependencies).

use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

use doppel_engine::space::NativeClass;
use doppel_engine::{
    InterceptorBinding, MethodDescriptor, ParamDescriptor, ProxyFactory, TypeDescriptor, TypeRef,
};
use doppel_sdk::{FnInterceptor, Interceptor, Passthrough, PendingResult, Value};

// ============================================================================
// Workload generators
// ============================================================================

/// A contract with `members` string-to-string methods named m0..mN.
fn contract_with(members: usize) -> TypeDescriptor {
    let mut descriptor = TypeDescriptor::interface("Wide");
    for index in 0..members {
        descriptor = descriptor.with_method(
            MethodDescriptor::new(format!("m{index}"))
                .with_param(ParamDescriptor::new("input", TypeRef::Str))
                .returns(TypeRef::Str),
        );
    }
    descriptor
}

/// An open class implementing every method of [`contract_with`].
fn implementation_with(members: usize) -> NativeClass {
    let mut descriptor = TypeDescriptor::class("WideImpl");
    for index in 0..members {
        descriptor = descriptor.with_method(
            MethodDescriptor::new(format!("m{index}"))
                .with_param(ParamDescriptor::new("input", TypeRef::Str))
                .returns(TypeRef::Str)
                .as_virtual(),
        );
    }
    let mut class = NativeClass::new(descriptor)
        .implements("Wide")
        .with_ctor(vec![], |_, _| Ok(vec![]));
    for index in 0..members {
        class = class.with_method(format!("m{index}"), |_, _, args| {
            Ok(args[0].clone())
        });
    }
    class
}

fn wide_factory(members: usize) -> ProxyFactory {
    let factory = ProxyFactory::new();
    factory.space().register_type(contract_with(members)).unwrap();
    factory
        .space()
        .register_class(implementation_with(members))
        .unwrap();
    factory
}

// ============================================================================
// Benchmark harness
// ============================================================================

struct Timing {
    name: String,
    iterations: u64,
    total: Duration,
}

impl Timing {
    fn per_iter(&self) -> Duration {
        self.total / self.iterations as u32
    }

    fn report(&self) {
        let nanos = self.per_iter().as_nanos();
        let (scaled, unit) = if nanos >= 1_000_000 {
            (nanos as f64 / 1_000_000.0, "ms")
        } else if nanos >= 1_000 {
            (nanos as f64 / 1_000.0, "us")
        } else {
            (nanos as f64, "ns")
        };
        println!(
            "  {:<45} {:>10.2} {:<3} ({} iters, {:.2?} total)",
            self.name, scaled, unit, self.iterations, self.total
        );
    }
}

fn bench(name: &str, warmup: u64, iterations: u64, mut f: impl FnMut() -> u64) -> Timing {
    for _ in 0..warmup {
        black_box(f());
    }

    let start = Instant::now();
    for _ in 0..iterations {
        black_box(f());
    }
    Timing {
        name: name.to_string(),
        iterations,
        total: start.elapsed(),
    }
}

fn reply_len(factory: &ProxyFactory, receiver: &Value, member: &str, arg: &Value) -> u64 {
    factory
        .call(receiver, member, std::slice::from_ref(arg))
        .ok()
        .and_then(|v| v.as_str().map(|s| s.len() as u64))
        .unwrap_or(0)
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    println!("=================================================================");
    println!("  Doppel proxy synthesis benchmark");
    println!("=================================================================\n");

    // -------------------------------------------------------------------
    // 1. Synthesis throughput
    // -------------------------------------------------------------------
    println!("--- Type synthesis (descriptor -> activated proxy type) ---\n");

    for &members in &[1, 4, 16] {
        let factory = wide_factory(members);
        let result = bench(
            &format!("synthesize subclassing proxy ({members} members)"),
            10,
            200,
            || {
                factory
                    .create_proxy_uncached("Wide", "WideImpl", InterceptorBinding::of::<Passthrough>())
                    .unwrap() as u64
            },
        );
        result.report();
    }

    {
        let factory = wide_factory(4);
        let result = bench("synthesize pure interface proxy (4 members)", 10, 200, || {
            factory
                .create_proxy_uncached("Wide", "Wide", InterceptorBinding::of::<Passthrough>())
                .unwrap() as u64
        });
        result.report();

        let cached = bench("cache hit (4 members)", 10, 10_000, || {
            factory
                .create_proxy("Wide", "WideImpl", InterceptorBinding::of::<Passthrough>())
                .unwrap() as u64
        });
        cached.report();
    }

    println!();

    // -------------------------------------------------------------------
    // 2. Instantiation
    // -------------------------------------------------------------------
    println!("--- Instantiation (constructor run + interceptor creation) ---\n");

    {
        let factory = wide_factory(4);
        let impl_id = factory.space().id_of("WideImpl").unwrap();
        let subclassing = factory
            .create_proxy("Wide", "WideImpl", InterceptorBinding::of::<Passthrough>())
            .unwrap();
        let pure = factory
            .create_proxy("Wide", "Wide", InterceptorBinding::of::<Passthrough>())
            .unwrap();

        bench("instantiate native class", 100, 100_000, || {
            factory.instantiate(impl_id).is_ok() as u64
        })
        .report();
        bench("instantiate subclassing proxy", 100, 100_000, || {
            factory.instantiate(subclassing).is_ok() as u64
        })
        .report();
        bench("instantiate pure interface proxy", 100, 100_000, || {
            factory.instantiate(pure).is_ok() as u64
        })
        .report();
    }

    println!();

    // -------------------------------------------------------------------
    // 3. Dispatch overhead
    // -------------------------------------------------------------------
    println!("--- Dispatch (one string-returning member call) ---\n");

    {
        let factory = wide_factory(1);
        let impl_id = factory.space().id_of("WideImpl").unwrap();
        let direct = factory.instantiate(impl_id).unwrap();

        let passthrough_type = factory
            .create_proxy("Wide", "WideImpl", InterceptorBinding::of::<Passthrough>())
            .unwrap();
        let passthrough = factory.instantiate(passthrough_type).unwrap();

        let canned = InterceptorBinding::from_factory("Canned", || {
            Arc::new(FnInterceptor::new(|_| {
                PendingResult::ready(Value::str("canned"))
            })) as Arc<dyn Interceptor>
        });
        let canned_type = factory.create_proxy("Wide", "WideImpl", canned).unwrap();
        let substituting = factory.instantiate(canned_type).unwrap();

        let arg = Value::str("payload");
        bench("direct native call", 1_000, 200_000, || {
            reply_len(&factory, &direct, "m0", &arg)
        })
        .report();
        bench("proxied call, passthrough interceptor", 1_000, 200_000, || {
            reply_len(&factory, &passthrough, "m0", &arg)
        })
        .report();
        bench("proxied call, substituting interceptor", 1_000, 200_000, || {
            reply_len(&factory, &substituting, "m0", &arg)
        })
        .report();
    }

    println!();

    // -------------------------------------------------------------------
    // 4. Correctness verification
    // -------------------------------------------------------------------
    println!("--- Correctness Verification ---\n");

    {
        let factory = wide_factory(4);
        let impl_id = factory.space().id_of("WideImpl").unwrap();
        let direct = factory.instantiate(impl_id).unwrap();
        let proxy_type = factory
            .create_proxy("Wide", "WideImpl", InterceptorBinding::of::<Passthrough>())
            .unwrap();
        let proxy = factory.instantiate(proxy_type).unwrap();

        for payload in ["alpha", "beta", "gamma"] {
            let arg = Value::str(payload);
            let expect = factory.call(&direct, "m2", &[arg.clone()]).unwrap();
            let got = factory.call(&proxy, "m2", &[arg]).unwrap();
            let ok = expect == got;
            println!(
                "  m2({payload:?}): direct={:?}, proxied={:?} {}",
                expect.as_str().unwrap_or(""),
                got.as_str().unwrap_or(""),
                if ok { "[OK]" } else { "[MISMATCH!]" }
            );
        }
    }

    println!();
    println!("=================================================================");
    println!("  Benchmark complete.");
    println!("=================================================================");
}
