//! Member dispatch.
//!
//! `call_member` is the public entry point: it resolves the member against
//! the receiver's dynamic type, enforces visibility and arity, and runs the
//! body. Wrapper bodies execute the interception sequence assembled at
//! synthesis time; everything they need was frozen into the member's
//! [`WrapperPlan`], so dispatch allocates only per-call state.

use doppel_sdk::{CallError, CallRecord, CallResult, ListRef, PendingResult, Value};

use crate::descriptor::{TypeRef, Visibility};
use crate::space::{InterceptorCell, MemberBody, RuntimeMember, RuntimeType, TypeSpace, WrapperPlan};

use super::eval;

/// Call a public member on a receiver.
///
/// Lookup is virtual: the member is resolved against the receiver's runtime
/// type, walking the parent chain child first. Private members are invisible
/// here and report as missing.
pub fn call_member(
    space: &TypeSpace,
    receiver: &Value,
    member: &str,
    args: &[Value],
) -> CallResult<Value> {
    let instance = eval::as_instance(receiver)?;
    let (owner_id, index) =
        space
            .find_member(instance.type_id(), member)
            .ok_or_else(|| CallError::MissingMember {
                type_name: space.type_name(instance.type_id()),
                member: member.to_string(),
            })?;
    let owner = space
        .get(owner_id)
        .ok_or_else(|| CallError::Failed(format!("unknown type id {owner_id}")))?;
    let resolved = owner
        .member_at(index)
        .ok_or_else(|| CallError::Failed(format!("member index {index} out of range")))?;

    if resolved.attributes.visibility == Visibility::Private {
        return Err(CallError::MissingMember {
            type_name: owner.name.clone(),
            member: member.to_string(),
        });
    }
    if args.len() != resolved.arity() {
        return Err(CallError::ArityMismatch {
            member: member.to_string(),
            expected: resolved.arity(),
            got: args.len(),
        });
    }
    dispatch(space, &owner, resolved, receiver, args)
}

/// Call a member by (type, slot), bypassing the visibility filter.
///
/// This is the path synthesized bodies use to reach private trampolines and
/// parent implementations directly.
pub(crate) fn invoke_at(
    space: &TypeSpace,
    owner_id: usize,
    index: usize,
    receiver: &Value,
    args: &[Value],
) -> CallResult<Value> {
    let owner = space
        .get(owner_id)
        .ok_or_else(|| CallError::Failed(format!("unknown type id {owner_id}")))?;
    let member = owner
        .member_at(index)
        .ok_or_else(|| CallError::Failed(format!("member index {index} out of range")))?;
    if args.len() != member.arity() {
        return Err(CallError::ArityMismatch {
            member: member.name.clone(),
            expected: member.arity(),
            got: args.len(),
        });
    }
    dispatch(space, &owner, member, receiver, args)
}

fn dispatch(
    space: &TypeSpace,
    owner: &RuntimeType,
    member: &RuntimeMember,
    receiver: &Value,
    args: &[Value],
) -> CallResult<Value> {
    match &member.body {
        MemberBody::Native(native) => native(space, receiver, args),
        MemberBody::Emitted(body) => eval::run_body(space, owner, body, receiver, args),
        MemberBody::Wrapper(plan) => run_wrapper(space, owner, member, *plan, receiver, args),
        MemberBody::Abstract => Err(CallError::Failed(format!(
            "member '{}' of '{}' is abstract and has no implementation",
            member.name, owner.name
        ))),
    }
}

/// Execute the interception sequence for one call on a wrapper member.
///
/// The order is fixed: capture the arguments into a fresh bag, prepare the
/// pending handle for the real call (a placeholder when no trampoline
/// exists), assemble the call record, hand it to the instance's
/// interceptor, then adapt whatever the interceptor resolved to against the
/// declared return type. Interceptor failures propagate unchanged.
fn run_wrapper(
    space: &TypeSpace,
    owner: &RuntimeType,
    member: &RuntimeMember,
    plan: WrapperPlan,
    receiver: &Value,
    args: &[Value],
) -> CallResult<Value> {
    let instance = eval::as_instance(receiver)?;

    let bag = ListRef::from_values(args.iter().cloned());

    let pending = match plan.trampoline {
        None => PendingResult::ready(Value::opaque()),
        Some(index) => {
            let thunk_space = space.clone();
            let thunk_receiver = receiver.clone();
            let thunk_bag = bag.clone();
            let owner_id = owner.id;
            PendingResult::deferred(move || {
                invoke_at(
                    &thunk_space,
                    owner_id,
                    index,
                    &thunk_receiver,
                    &[Value::List(thunk_bag)],
                )
            })
        }
    };

    let decorator = match plan.decorator_field {
        Some(index) => match instance.field(index) {
            Some(value) => Some(value),
            None => return Err(eval::field_unset(space, instance, index)),
        },
        None => None,
    };

    let record = CallRecord::new(
        receiver.clone(),
        decorator,
        member.name.as_str(),
        bag,
        pending,
    );

    let cell_value = instance
        .field(plan.interceptor_field)
        .ok_or_else(|| eval::field_unset(space, instance, plan.interceptor_field))?;
    let cell = cell_value
        .as_object()
        .and_then(|obj| obj.downcast_arc::<InterceptorCell>())
        .ok_or_else(|| CallError::TypeMismatch {
            expected: "interceptor".to_string(),
            got: cell_value.kind().to_string(),
        })?;

    let result = cell.0.invoke(record).wait()?;

    if member.return_type == TypeRef::Void {
        Ok(Value::Null)
    } else {
        eval::convert(space, result, &member.return_type)
    }
}

// ============================================================================
// Tests
// ============================================================================
