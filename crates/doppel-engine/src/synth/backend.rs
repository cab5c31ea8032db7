//! The type synthesis backend seam.
//!
//! The type engine never writes into a registry directly; it drives a
//! [`SynthesisBackend`]. [`SpaceBackend`] is the stock implementation over a
//! [`TypeSpace`]: types are defined in the `Building` state, shaped through
//! the `define_*` calls, and become observable to callers only after
//! `complete_type` activates them.

use crate::descriptor::TypeRef;
use crate::space::{FieldSlot, InterceptorFactory, RuntimeCtor, RuntimeMember, TypeSpace, TypeState};
use crate::{SynthResult, SynthesisError};

/// Facility that allocates new type definitions and attaches their parts.
///
/// All `define_*` calls on a type must happen between `define_type` and
/// `complete_type`; implementations reject anything else as an invalid
/// state.
pub trait SynthesisBackend {
    /// Resolve an existing type by name
    fn resolve_type(&self, name: &str) -> SynthResult<usize>;

    /// Whether the type has a constructor with the given parameter count
    fn has_ctor(&self, type_id: usize, argc: usize) -> bool;

    /// Allocate a new type definition in the building state
    fn define_type(
        &mut self,
        name: &str,
        parent: Option<&str>,
        contracts: &[String],
    ) -> SynthResult<usize>;

    /// Add a field to a building type; returns its absolute index
    fn define_field(&mut self, type_id: usize, name: &str, ty: TypeRef) -> SynthResult<usize>;

    /// Add a member to a building type; returns its member-table index
    fn define_member(&mut self, type_id: usize, member: RuntimeMember) -> SynthResult<usize>;

    /// Add a constructor to a building type; returns its table index
    fn define_ctor(&mut self, type_id: usize, ctor: RuntimeCtor) -> SynthResult<usize>;

    /// Bind the interceptor constructor for a building type
    fn bind_interceptor(&mut self, type_id: usize, factory: InterceptorFactory) -> SynthResult<()>;

    /// Freeze the type and make it instantiable
    fn complete_type(&mut self, type_id: usize) -> SynthResult<usize>;
}

/// Backend writing synthesized types into a [`TypeSpace`]
pub struct SpaceBackend {
    space: TypeSpace,
}

impl SpaceBackend {
    /// Create a backend over the given space
    pub fn new(space: TypeSpace) -> Self {
        Self { space }
    }

    /// The space this backend writes into
    pub fn space(&self) -> &TypeSpace {
        &self.space
    }

    fn open_mutate<R>(
        &self,
        type_id: usize,
        f: impl FnOnce(&mut crate::space::RuntimeType) -> SynthResult<R>,
    ) -> SynthResult<R> {
        self.space.mutate(type_id, |ty| {
            if ty.state != TypeState::Building {
                return Err(SynthesisError::InvalidState(format!(
                    "type '{}' is no longer building",
                    ty.name
                )));
            }
            f(ty)
        })
    }
}

impl SynthesisBackend for SpaceBackend {
    fn resolve_type(&self, name: &str) -> SynthResult<usize> {
        self.space
            .id_of(name)
            .ok_or_else(|| SynthesisError::UnknownType {
                name: name.to_string(),
            })
    }

    fn has_ctor(&self, type_id: usize, argc: usize) -> bool {
        self.space
            .get(type_id)
            .map(|ty| ty.ctor_by_arity(argc).is_some())
            .unwrap_or(false)
    }

    fn define_type(
        &mut self,
        name: &str,
        parent: Option<&str>,
        contracts: &[String],
    ) -> SynthResult<usize> {
        let parent_id = match parent {
            Some(parent_name) => Some(self.resolve_type(parent_name)?),
            None => None,
        };
        self.space.insert_type(
            name,
            parent_id,
            contracts.to_vec(),
            None,
            TypeState::Building,
        )
    }

    fn define_field(&mut self, type_id: usize, name: &str, ty: TypeRef) -> SynthResult<usize> {
        self.open_mutate(type_id, |entry| entry.add_field(FieldSlot::new(name, ty)))
    }

    fn define_member(&mut self, type_id: usize, member: RuntimeMember) -> SynthResult<usize> {
        self.open_mutate(type_id, |entry| entry.add_member(member))
    }

    fn define_ctor(&mut self, type_id: usize, ctor: RuntimeCtor) -> SynthResult<usize> {
        self.open_mutate(type_id, |entry| Ok(entry.add_ctor(ctor)))
    }

    fn bind_interceptor(&mut self, type_id: usize, factory: InterceptorFactory) -> SynthResult<()> {
        self.open_mutate(type_id, |entry| {
            if entry.interceptor_factory.is_some() {
                return Err(SynthesisError::InvalidState(format!(
                    "type '{}' already has an interceptor bound",
                    entry.name
                )));
            }
            entry.interceptor_factory = Some(factory);
            Ok(())
        })
    }

    fn complete_type(&mut self, type_id: usize) -> SynthResult<usize> {
        self.space.activate(type_id)?;
        Ok(type_id)
    }
}

// ============================================================================
// Tests
// ============================================================================
