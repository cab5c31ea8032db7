//! Native class registration.
//!
//! Implementation classes and contracts enter a [`TypeSpace`] through
//! [`NativeClass`]: a descriptor for the shape plus Rust closures for the
//! bodies. Registration lowers the descriptor into the runtime member table
//! (properties become accessor methods) and activates the type in one step.

use std::sync::Arc;

use doppel_sdk::{CallResult, Value};
use rustc_hash::FxHashMap;

use crate::descriptor::{MethodDescriptor, TypeDescriptor, TypeRef};
use crate::discovery::{DescriptorDiscovery, MemberDiscovery};
use crate::space::member::{
    CtorBody, MemberAttributes, MemberBody, NativeCtor, NativeMethod, RuntimeCtor, RuntimeMember,
};
use crate::space::registry::{FieldSlot, TypeSpace, TypeState};
use crate::{SynthResult, SynthesisError};

/// A class (or contract) described declaratively and implemented natively.
///
/// Build one with the chained setters, then hand it to
/// [`TypeSpace::register_class`]. Interfaces are registered the same way with
/// no bodies attached: every member lowers to an abstract placeholder.
pub struct NativeClass {
    descriptor: TypeDescriptor,
    parent: Option<String>,
    contracts: Vec<String>,
    fields: Vec<FieldSlot>,
    ctors: Vec<(Vec<TypeRef>, NativeCtor)>,
    bodies: Vec<(String, NativeMethod)>,
}

impl NativeClass {
    /// Start from a descriptor
    pub fn new(descriptor: TypeDescriptor) -> Self {
        Self {
            descriptor,
            parent: None,
            contracts: Vec::new(),
            fields: Vec::new(),
            ctors: Vec::new(),
            bodies: Vec::new(),
        }
    }

    /// Extend a previously registered type
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Declare an implemented contract by name
    pub fn implements(mut self, contract: impl Into<String>) -> Self {
        self.contracts.push(contract.into());
        self
    }

    /// Declare an own field
    pub fn with_field(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.fields.push(FieldSlot::new(name, ty));
        self
    }

    /// Attach a constructor. The body receives the call arguments and returns
    /// the type's own field values in declaration order.
    pub fn with_ctor(
        mut self,
        params: Vec<TypeRef>,
        body: impl Fn(&TypeSpace, &[Value]) -> CallResult<Vec<Value>> + Send + Sync + 'static,
    ) -> Self {
        self.ctors.push((params, Arc::new(body)));
        self
    }

    /// Attach a member body by name. The name must match a descriptor method
    /// or a lowered property accessor (`get_x` / `set_x`).
    pub fn with_method(
        mut self,
        name: impl Into<String>,
        body: impl Fn(&TypeSpace, &Value, &[Value]) -> CallResult<Value> + Send + Sync + 'static,
    ) -> Self {
        self.bodies.push((name.into(), Arc::new(body)));
        self
    }
}

fn lowered_members(descriptor: &TypeDescriptor) -> Vec<MethodDescriptor> {
    let discovery = DescriptorDiscovery;
    let mut out = descriptor.methods.clone();
    for property in &descriptor.properties {
        out.extend(discovery.accessors(property));
    }
    out
}

impl TypeSpace {
    /// Register a native class or contract.
    ///
    /// The whole registration is validated before the space is touched, so a
    /// rejected class leaves no partial entry behind. The type comes out
    /// `Activated`.
    pub fn register_class(&self, class: NativeClass) -> SynthResult<usize> {
        let NativeClass {
            descriptor,
            parent,
            contracts,
            fields,
            ctors,
            bodies,
        } = class;
        let type_name = descriptor.name.clone();

        let parent_id = match &parent {
            Some(name) => Some(self.id_of(name).ok_or_else(|| SynthesisError::UnknownType {
                name: name.clone(),
            })?),
            None => None,
        };

        if descriptor.is_interface() && !(fields.is_empty() && ctors.is_empty() && bodies.is_empty())
        {
            return Err(SynthesisError::UnsupportedTarget {
                type_name,
                reason: "an interface carries no fields, constructors, or bodies".to_string(),
            });
        }

        let mut body_map: FxHashMap<String, NativeMethod> = FxHashMap::default();
        for (name, body) in bodies {
            if body_map.insert(name.clone(), body).is_some() {
                return Err(SynthesisError::DuplicateMember {
                    type_name,
                    member: name,
                });
            }
        }

        let mut members = Vec::new();
        for method in lowered_members(&descriptor) {
            let body = match body_map.remove(&method.name) {
                Some(native) => MemberBody::Native(native),
                None if method.is_abstract => MemberBody::Abstract,
                None => {
                    return Err(SynthesisError::UnsupportedMember {
                        member: method.name,
                        reason: "concrete member registered without a body".to_string(),
                    })
                }
            };
            let attributes = MemberAttributes {
                visibility: method.visibility,
                is_virtual: method.is_virtual,
                is_final: method.is_final,
                is_new_slot: false,
            };
            members.push(RuntimeMember {
                name: method.name,
                attributes,
                params: method.params.iter().map(|p| p.ty.clone()).collect(),
                return_type: method.return_type,
                body,
            });
        }

        if let Some(stray) = body_map.into_keys().next() {
            return Err(SynthesisError::UnknownMember {
                type_name,
                member: stray,
            });
        }

        let mut seen_arities = Vec::new();
        for (params, _) in &ctors {
            if seen_arities.contains(&params.len()) {
                return Err(SynthesisError::DuplicateMember {
                    type_name,
                    member: format!("constructor/{}", params.len()),
                });
            }
            seen_arities.push(params.len());
        }

        let id = self.insert_type(
            &type_name,
            parent_id,
            contracts,
            Some(descriptor),
            TypeState::Building,
        )?;
        self.mutate(id, |ty| {
            for slot in fields {
                ty.add_field(slot)?;
            }
            for member in members {
                ty.add_member(member)?;
            }
            for (params, body) in ctors {
                ty.add_ctor(RuntimeCtor {
                    params,
                    body: CtorBody::Native(body),
                });
            }
            Ok(())
        })?;
        self.activate(id)?;
        Ok(id)
    }

    /// Register a bodiless type (contracts, abstract shapes) straight from a
    /// descriptor
    pub fn register_type(&self, descriptor: TypeDescriptor) -> SynthResult<usize> {
        self.register_class(NativeClass::new(descriptor))
    }
}

// ============================================================================
// Tests
// ============================================================================
