//! Member Discovery
//!
//! The enumeration collaborator the type synthesis engine consumes: given a
//! type descriptor, produce its public callable surface with full
//! signatures. Properties are lowered here into their accessor method
//! descriptors (`get_name`, `set_name`) so the member engine can treat them
//! like any other member.

use crate::descriptor::{
    MethodDescriptor, ParamDescriptor, PropertyDescriptor, TypeDescriptor, Visibility,
};

/// Enumerates the proxyable surface of a type.
///
/// The default implementation reads descriptors directly; the seam exists so
/// other metadata sources (loaded models, test doubles) can feed the engine.
pub trait MemberDiscovery: Send + Sync {
    /// Public callable members of the type, accessor methods not included
    fn methods(&self, ty: &TypeDescriptor) -> Vec<MethodDescriptor>;

    /// Public properties of the type
    fn properties(&self, ty: &TypeDescriptor) -> Vec<PropertyDescriptor>;

    /// Lower a property into its accessor method descriptors
    fn accessors(&self, property: &PropertyDescriptor) -> Vec<MethodDescriptor> {
        let mut out = Vec::new();
        if property.has_getter {
            let mut getter = MethodDescriptor::new(format!("get_{}", property.name))
                .returns(property.ty.clone());
            getter.is_abstract = property.is_abstract;
            getter.is_virtual = property.is_abstract;
            out.push(getter);
        }
        if property.has_setter {
            let mut setter = MethodDescriptor::new(format!("set_{}", property.name))
                .with_param(ParamDescriptor::new("value", property.ty.clone()));
            setter.is_abstract = property.is_abstract;
            setter.is_virtual = property.is_abstract;
            out.push(setter);
        }
        out
    }
}

/// Discovery backed directly by the descriptor model
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorDiscovery;

impl MemberDiscovery for DescriptorDiscovery {
    fn methods(&self, ty: &TypeDescriptor) -> Vec<MethodDescriptor> {
        ty.methods
            .iter()
            .filter(|m| m.visibility == Visibility::Public)
            .cloned()
            .collect()
    }

    fn properties(&self, ty: &TypeDescriptor) -> Vec<PropertyDescriptor> {
        ty.properties.clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
