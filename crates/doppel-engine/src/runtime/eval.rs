//! Evaluation of synthesized bodies, value conversion, and instance
//! construction.
//!
//! Bodies are straight-line instruction sequences over a small operand
//! stack. The emitter validated balance and bounds at build time; the
//! evaluator still refuses rather than panics when an invariant does not
//! hold, since native code can hand it arbitrary values.

use doppel_sdk::{CallError, CallResult, ListRef, Value};

use crate::descriptor::TypeRef;
use crate::space::{CtorBody, Instance, InterceptorCell, RuntimeCtor, RuntimeType, TypeSpace};
use crate::synth::{EmittedBody, Inst};

use super::call;

/// Borrow the value as a runtime instance
pub(crate) fn as_instance(value: &Value) -> CallResult<&Instance> {
    value
        .as_object()
        .and_then(|obj| obj.downcast_ref::<Instance>())
        .ok_or_else(|| CallError::TypeMismatch {
            expected: "instance".to_string(),
            got: value.kind().to_string(),
        })
}

/// Error for a read of a field slot that no constructor wrote
pub(crate) fn field_unset(space: &TypeSpace, instance: &Instance, index: usize) -> CallError {
    if index >= instance.field_count() {
        return CallError::Failed(format!("field index {index} out of range"));
    }
    let (type_name, field) = space
        .field_name(instance.type_id(), index)
        .unwrap_or_else(|| (space.type_name(instance.type_id()), format!("#{index}")));
    CallError::FieldUnset { type_name, field }
}

fn field_write_refused(space: &TypeSpace, instance: &Instance, index: usize) -> CallError {
    match space.field_name(instance.type_id(), index) {
        Some((type_name, field)) => CallError::Failed(format!(
            "field '{field}' of '{type_name}' is already set"
        )),
        None => CallError::Failed(format!("field index {index} out of range")),
    }
}

fn pop(stack: &mut Vec<Value>) -> CallResult<Value> {
    stack
        .pop()
        .ok_or_else(|| CallError::Failed("operand stack underflow".to_string()))
}

fn pop_many(stack: &mut Vec<Value>, count: usize) -> CallResult<Vec<Value>> {
    let at = stack
        .len()
        .checked_sub(count)
        .ok_or_else(|| CallError::Failed("operand stack underflow".to_string()))?;
    Ok(stack.split_off(at))
}

fn mismatch(expected: impl Into<String>, got: &Value) -> CallError {
    CallError::TypeMismatch {
        expected: expected.into(),
        got: got.kind().to_string(),
    }
}

/// Convert a value to a declared type.
///
/// `Any` passes everything through untouched. Primitive targets unbox
/// strictly. `Str` and `Named` targets let `Null` through. A `Named` target
/// checks instances against the runtime hierarchy; object payloads that are
/// not instances (placeholders, foreign handles) pass as opaque references.
pub(crate) fn convert(space: &TypeSpace, value: Value, target: &TypeRef) -> CallResult<Value> {
    match target {
        TypeRef::Any => Ok(value),
        TypeRef::Void => match value {
            Value::Null => Ok(Value::Null),
            other => Err(mismatch("void", &other)),
        },
        TypeRef::Bool => match value {
            Value::Bool(_) => Ok(value),
            other => Err(mismatch("bool", &other)),
        },
        TypeRef::I32 => match value {
            Value::I32(_) => Ok(value),
            other => Err(mismatch("i32", &other)),
        },
        TypeRef::I64 => match value {
            Value::I64(_) => Ok(value),
            other => Err(mismatch("i64", &other)),
        },
        TypeRef::F64 => match value {
            Value::F64(_) => Ok(value),
            other => Err(mismatch("f64", &other)),
        },
        TypeRef::Str => match value {
            Value::Null | Value::Str(_) => Ok(value),
            other => Err(mismatch("str", &other)),
        },
        TypeRef::Named(name) => match &value {
            Value::Null => Ok(value),
            Value::Object(obj) => match obj.downcast_ref::<Instance>() {
                Some(instance) => {
                    if space.satisfies(instance.type_id(), name) {
                        Ok(value)
                    } else {
                        Err(CallError::TypeMismatch {
                            expected: name.clone(),
                            got: space.type_name(instance.type_id()),
                        })
                    }
                }
                None => Ok(value),
            },
            other => Err(mismatch(name.as_str(), other)),
        },
    }
}

/// Run one emitted body against a receiver and argument slice.
///
/// `owner` is the type the body was defined on; parent-relative
/// instructions resolve against it, not against the receiver's dynamic
/// type.
pub(crate) fn run_body(
    space: &TypeSpace,
    owner: &RuntimeType,
    body: &EmittedBody,
    this: &Value,
    args: &[Value],
) -> CallResult<Value> {
    let mut stack: Vec<Value> = Vec::with_capacity(body.max_stack);

    for inst in &body.insts {
        match inst {
            Inst::LoadThis => stack.push(this.clone()),
            Inst::LoadArg(index) => match args.get(*index) {
                Some(value) => stack.push(value.clone()),
                None => {
                    return Err(CallError::Failed(format!(
                        "argument index {index} out of range"
                    )))
                }
            },
            Inst::Const(value) => stack.push(value.clone()),
            Inst::LoadField(index) => {
                let instance = as_instance(this)?;
                match instance.field(*index) {
                    Some(value) => stack.push(value),
                    None => return Err(field_unset(space, instance, *index)),
                }
            }
            Inst::StoreField(index) => {
                let value = pop(&mut stack)?;
                let instance = as_instance(this)?;
                if !instance.set_field(*index, value) {
                    return Err(field_write_refused(space, instance, *index));
                }
            }
            Inst::NewList(len) => stack.push(Value::List(ListRef::new(*len))),
            Inst::LoadElement(index) => {
                let target = pop(&mut stack)?;
                let list = target
                    .as_list()
                    .ok_or_else(|| mismatch("list", &target))?;
                match list.get(*index) {
                    Some(value) => stack.push(value),
                    None => {
                        return Err(CallError::Failed(format!(
                            "list index {index} out of range"
                        )))
                    }
                }
            }
            Inst::StoreElement(index) => {
                let value = pop(&mut stack)?;
                let target = pop(&mut stack)?;
                let list = target
                    .as_list()
                    .ok_or_else(|| mismatch("list", &target))?;
                if !list.set(*index, value) {
                    return Err(CallError::Failed(format!(
                        "list index {index} out of range"
                    )));
                }
            }
            Inst::NewObject { type_id, argc } => {
                let call_args = pop_many(&mut stack, *argc)?;
                stack.push(construct_instance(space, *type_id, &call_args)?);
            }
            Inst::NewInterceptor => {
                let factory = owner.interceptor_factory.as_ref().ok_or_else(|| {
                    CallError::Failed(format!(
                        "type '{}' has no interceptor binding",
                        owner.name
                    ))
                })?;
                stack.push(Value::object(InterceptorCell(factory())));
            }
            Inst::InvokeParentCtor { argc } => {
                let call_args = pop_many(&mut stack, *argc)?;
                let parent_id = owner.parent_id.ok_or_else(|| {
                    CallError::Failed(format!("type '{}' has no parent", owner.name))
                })?;
                let parent = space.get(parent_id).ok_or_else(|| {
                    CallError::Failed(format!("unknown type id {parent_id}"))
                })?;
                let (_, ctor) = parent.ctor_by_arity(call_args.len()).ok_or_else(|| {
                    CallError::MissingMember {
                        type_name: parent.name.clone(),
                        member: format!("constructor({} args)", call_args.len()),
                    }
                })?;
                run_ctor(space, &parent, ctor, this, &call_args)?;
            }
            Inst::CallVirtual { member, argc } => {
                let call_args = pop_many(&mut stack, *argc)?;
                let receiver = pop(&mut stack)?;
                stack.push(call::call_member(space, &receiver, member, &call_args)?);
            }
            Inst::CallParent { member, argc } => {
                let call_args = pop_many(&mut stack, *argc)?;
                let parent_id = owner.parent_id.ok_or_else(|| {
                    CallError::Failed(format!("type '{}' has no parent", owner.name))
                })?;
                let (owner_id, index) =
                    space.find_member(parent_id, member).ok_or_else(|| {
                        CallError::MissingMember {
                            type_name: space.type_name(parent_id),
                            member: member.clone(),
                        }
                    })?;
                stack.push(call::invoke_at(space, owner_id, index, this, &call_args)?);
            }
            Inst::Convert(target) => {
                let value = pop(&mut stack)?;
                stack.push(convert(space, value, target)?);
            }
            Inst::Pop => {
                pop(&mut stack)?;
            }
            Inst::Ret => return pop(&mut stack),
            Inst::RetVoid => return Ok(Value::Null),
        }
    }
    Err(CallError::Failed(format!(
        "body '{}' ended without a return",
        body.name
    )))
}

/// Construct an instance of an activated type.
///
/// Selects the constructor by argument count, allocates the field frame,
/// and runs the constructor against it. The returned value is the instance
/// wrapped in a fresh object reference.
pub fn construct_instance(
    space: &TypeSpace,
    type_id: usize,
    args: &[Value],
) -> CallResult<Value> {
    let ty = space
        .get(type_id)
        .ok_or_else(|| CallError::Failed(format!("unknown type id {type_id}")))?;
    if !ty.is_activated() {
        return Err(CallError::Failed(format!(
            "type '{}' is still building",
            ty.name
        )));
    }
    if let Some(descriptor) = &ty.descriptor {
        if descriptor.is_interface() {
            return Err(CallError::Failed(format!(
                "'{}' is an interface and cannot be instantiated",
                ty.name
            )));
        }
        if descriptor.is_abstract {
            return Err(CallError::Failed(format!(
                "'{}' is abstract and cannot be instantiated",
                ty.name
            )));
        }
    }
    let (_, ctor) = ty
        .ctor_by_arity(args.len())
        .ok_or_else(|| CallError::MissingMember {
            type_name: ty.name.clone(),
            member: format!("constructor({} args)", args.len()),
        })?;

    let this = Value::object(Instance::new(type_id, ty.total_fields()));
    run_ctor(space, &ty, ctor, &this, args)?;
    Ok(this)
}

/// Run one constructor against an already allocated instance.
///
/// Native constructors return their own field values in declaration order;
/// the engine writes them and then chains the parent's parameterless
/// constructor. Emitted constructors write fields and chain the parent
/// themselves.
pub(crate) fn run_ctor(
    space: &TypeSpace,
    ty: &RuntimeType,
    ctor: &RuntimeCtor,
    this: &Value,
    args: &[Value],
) -> CallResult<()> {
    if args.len() != ctor.arity() {
        return Err(CallError::ArityMismatch {
            member: format!("{}::constructor", ty.name),
            expected: ctor.arity(),
            got: args.len(),
        });
    }
    match &ctor.body {
        CtorBody::Native(native) => {
            let values = native(space, args)?;
            if values.len() != ty.fields.len() {
                return Err(CallError::Failed(format!(
                    "constructor of '{}' produced {} field value(s), expected {}",
                    ty.name,
                    values.len(),
                    ty.fields.len()
                )));
            }
            let instance = as_instance(this)?;
            for (offset, value) in values.into_iter().enumerate() {
                let index = ty.field_offset + offset;
                if !instance.set_field(index, value) {
                    return Err(field_write_refused(space, instance, index));
                }
            }
            chain_parent_ctor(space, ty, this)
        }
        CtorBody::Emitted(body) => run_body(space, ty, body, this, args).map(|_| ()),
    }
}

fn chain_parent_ctor(space: &TypeSpace, ty: &RuntimeType, this: &Value) -> CallResult<()> {
    let parent_id = match ty.parent_id {
        Some(id) => id,
        None => return Ok(()),
    };
    let parent = space
        .get(parent_id)
        .ok_or_else(|| CallError::Failed(format!("unknown type id {parent_id}")))?;
    match parent.ctor_by_arity(0) {
        Some((_, ctor)) => run_ctor(space, &parent, ctor, this, &[]),
        // a parent with no constructors and no state needs no chaining
        None if parent.ctors.is_empty() && parent.total_fields() == 0 => Ok(()),
        None => Err(CallError::MissingMember {
            type_name: parent.name.clone(),
            member: "constructor(0 args)".to_string(),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{MethodDescriptor, ParamDescriptor, TypeDescriptor};
    use crate::space::{NativeClass, TypeState};
    use crate::synth::BodyEmitter;

    fn blank_space_with(class: NativeClass) -> (TypeSpace, usize) {
        let space = TypeSpace::new();
        let id = space.register_class(class).unwrap();
        (space, id)
    }

    fn plain_class(name: &str) -> NativeClass {
        NativeClass::new(TypeDescriptor::class(name))
    }

    #[test]
    fn test_constant_body() {
        let (space, id) = blank_space_with(plain_class("Blank"));
        let owner = space.get(id).unwrap();

        let mut emitter = BodyEmitter::new("constant", 0);
        emitter.emit_const(Value::I32(7)).unwrap();
        emitter.emit_return().unwrap();
        let body = emitter.build().unwrap();

        let result = run_body(&space, &owner, &body, &Value::Null, &[]).unwrap();
        assert_eq!(result, Value::I32(7));
    }

    #[test]
    fn test_argument_conversion() {
        let (space, id) = blank_space_with(plain_class("Blank"));
        let owner = space.get(id).unwrap();

        let mut emitter = BodyEmitter::new("narrow", 1);
        emitter.emit_load_arg(0).unwrap();
        emitter.emit_convert(TypeRef::Str).unwrap();
        emitter.emit_return().unwrap();
        let body = emitter.build().unwrap();

        let ok = run_body(&space, &owner, &body, &Value::Null, &[Value::str("x")]).unwrap();
        assert_eq!(ok, Value::str("x"));

        let err = run_body(&space, &owner, &body, &Value::Null, &[Value::I32(3)]).unwrap_err();
        assert!(matches!(err, CallError::TypeMismatch { .. }));
    }

    #[test]
    fn test_field_load_after_native_ctor() {
        let class = NativeClass::new(TypeDescriptor::class("Holder"))
            .with_field("val", TypeRef::I32)
            .with_ctor(vec![],|_, _| Ok(vec![Value::I32(5)]));
        let (space, id) = blank_space_with(class);
        let owner = space.get(id).unwrap();

        let this = construct_instance(&space, id, &[]).unwrap();

        let mut emitter = BodyEmitter::new("read", 0);
        emitter.emit_load_field(0).unwrap();
        emitter.emit_return().unwrap();
        let body = emitter.build().unwrap();

        assert_eq!(run_body(&space, &owner, &body, &this, &[]).unwrap(), Value::I32(5));
    }

    #[test]
    fn test_unset_field_read_is_an_error() {
        let class = NativeClass::new(TypeDescriptor::class("Holder"))
            .with_field("val", TypeRef::I32)
            .with_ctor(vec![],|_, _| Ok(vec![Value::I32(5)]));
        let (space, id) = blank_space_with(class);
        let owner = space.get(id).unwrap();

        // bypass the constructor so the slot stays unset
        let this = Value::object(Instance::new(id, 1));

        let mut emitter = BodyEmitter::new("read", 0);
        emitter.emit_load_field(0).unwrap();
        emitter.emit_return().unwrap();
        let body = emitter.build().unwrap();

        let err = run_body(&space, &owner, &body, &this, &[]).unwrap_err();
        match err {
            CallError::FieldUnset { type_name, field } => {
                assert_eq!(type_name, "Holder");
                assert_eq!(field, "val");
            }
            other => panic!("expected FieldUnset, got {other}"),
        }
    }

    #[test]
    fn test_named_conversion_checks_hierarchy() {
        let space = TypeSpace::new();
        space
            .register_type(
                TypeDescriptor::interface("Greeter").with_method(
                    MethodDescriptor::new("greet")
                        .with_param(ParamDescriptor::new("name", TypeRef::Str))
                        .returns(TypeRef::Str),
                ),
            )
            .unwrap();
        let impl_id = space
            .register_class(
                NativeClass::new(
                    TypeDescriptor::class("GreeterImpl").with_method(
                        MethodDescriptor::new("greet")
                            .with_param(ParamDescriptor::new("name", TypeRef::Str))
                            .returns(TypeRef::Str)
                            .as_virtual(),
                    ),
                )
                .implements("Greeter")
                .with_ctor(vec![],|_, _| Ok(vec![]))
                .with_method("greet", |_, _, args| {
                    Ok(Value::str(format!(
                        "Hello, {}",
                        args[0].as_str().unwrap_or("?")
                    )))
                }),
            )
            .unwrap();

        let instance = construct_instance(&space, impl_id, &[]).unwrap();
        assert!(convert(&space, instance.clone(), &TypeRef::Named("Greeter".into())).is_ok());
        assert!(convert(&space, instance, &TypeRef::Named("Sorter".into())).is_err());

        // null and non-instance objects pass through a named target
        assert!(convert(&space, Value::Null, &TypeRef::Named("Greeter".into())).is_ok());
        assert!(convert(&space, Value::opaque(), &TypeRef::Named("Greeter".into())).is_ok());
    }

    #[test]
    fn test_construct_rejects_interface_and_abstract() {
        let space = TypeSpace::new();
        let iface = space
            .register_type(TypeDescriptor::interface("Greeter"))
            .unwrap();
        let err = construct_instance(&space, iface, &[]).unwrap_err();
        assert!(err.to_string().contains("interface"));

        let abstract_id = space
            .register_class(NativeClass::new(
                TypeDescriptor::class("Base").as_abstract(),
            ))
            .unwrap();
        let err = construct_instance(&space, abstract_id, &[]).unwrap_err();
        assert!(err.to_string().contains("abstract"));
    }

    #[test]
    fn test_construct_rejects_type_still_building() {
        let space = TypeSpace::new();
        let id = space
            .insert_type("Draft", None, Vec::new(), None, TypeState::Building)
            .unwrap();
        let err = construct_instance(&space, id, &[]).unwrap_err();
        assert!(err.to_string().contains("still building"));
    }

    #[test]
    fn test_native_ctor_chains_parent() {
        let space = TypeSpace::new();
        space
            .register_class(
                NativeClass::new(TypeDescriptor::class("Base"))
                    .with_field("base_val", TypeRef::Str)
                    .with_ctor(vec![],|_, _| Ok(vec![Value::str("base")])),
            )
            .unwrap();
        let child_id = space
            .register_class(
                NativeClass::new(TypeDescriptor::class("Child"))
                    .extends("Base")
                    .with_field("child_val", TypeRef::I32)
                    .with_ctor(vec![],|_, _| Ok(vec![Value::I32(1)])),
            )
            .unwrap();

        let this = construct_instance(&space, child_id, &[]).unwrap();
        let instance = as_instance(&this).unwrap();
        assert_eq!(instance.field(0), Some(Value::str("base")));
        assert_eq!(instance.field(1), Some(Value::I32(1)));
    }

    #[test]
    fn test_missing_ctor_arity() {
        let (space, id) = blank_space_with(
            plain_class("Holder").with_ctor(vec![],|_, _| Ok(vec![])),
        );
        let err = construct_instance(&space, id, &[Value::I32(1)]).unwrap_err();
        assert!(matches!(err, CallError::MissingMember { .. }));
    }
}
