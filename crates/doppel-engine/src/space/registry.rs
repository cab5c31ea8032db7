//! Type registry: the shared table behind a [`TypeSpace`].

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::descriptor::{TypeDescriptor, TypeRef};
use crate::space::member::{InterceptorFactory, RuntimeCtor, RuntimeMember};
use crate::{SynthResult, SynthesisError};

/// Lifecycle state of a runtime type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeState {
    /// Shape is open: fields, members, constructors may still be added
    Building,
    /// Shape is frozen: instances may be created and members called
    Activated,
}

/// One field slot in a type's own layout
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSlot {
    /// Field name (unique within the declaring type)
    pub name: String,
    /// Declared field type
    pub ty: TypeRef,
}

impl FieldSlot {
    /// Create a new field slot
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A type registered in a space: native class, contract, or synthesized
/// proxy.
///
/// Field indices are absolute across the inheritance chain: a type's own
/// fields start at `field_offset` (the parent chain's total) so one flat
/// instance frame serves the whole hierarchy.
#[derive(Clone)]
pub struct RuntimeType {
    /// Registry id
    pub id: usize,
    /// Type name (unique within the space)
    pub name: String,
    /// Parent type id, when extending
    pub parent_id: Option<usize>,
    /// Names of implemented contracts
    pub contracts: Vec<String>,
    /// The descriptor this type was registered from, when known
    pub descriptor: Option<TypeDescriptor>,
    /// Lifecycle state
    pub state: TypeState,
    /// Absolute index of the first own field
    pub field_offset: usize,
    /// Own field slots, in declaration order
    pub fields: Vec<FieldSlot>,
    /// Own member table
    pub members: Vec<RuntimeMember>,
    /// Own member name index
    pub member_index: FxHashMap<String, usize>,
    /// Constructor table
    pub ctors: Vec<RuntimeCtor>,
    /// Bound interceptor constructor (synthesized proxy types only)
    pub interceptor_factory: Option<InterceptorFactory>,
}

impl fmt::Debug for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeType")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("parent_id", &self.parent_id)
            .field("contracts", &self.contracts)
            .field("state", &self.state)
            .field("field_offset", &self.field_offset)
            .field("fields", &self.fields)
            .field("members", &self.members.len())
            .field("ctors", &self.ctors.len())
            .field(
                "interceptor_factory",
                &self.interceptor_factory.as_ref().map(|_| ".."),
            )
            .finish()
    }
}

impl RuntimeType {
    fn new(
        id: usize,
        name: String,
        parent_id: Option<usize>,
        contracts: Vec<String>,
        descriptor: Option<TypeDescriptor>,
        state: TypeState,
        field_offset: usize,
    ) -> Self {
        Self {
            id,
            name,
            parent_id,
            contracts,
            descriptor,
            state,
            field_offset,
            fields: Vec::new(),
            members: Vec::new(),
            member_index: FxHashMap::default(),
            ctors: Vec::new(),
            interceptor_factory: None,
        }
    }

    /// Total field count: own fields plus the parent chain's
    pub fn total_fields(&self) -> usize {
        self.field_offset + self.fields.len()
    }

    /// True once the type has been activated
    #[inline]
    pub fn is_activated(&self) -> bool {
        self.state == TypeState::Activated
    }

    /// Look up an own member by name
    pub fn member(&self, name: &str) -> Option<(usize, &RuntimeMember)> {
        let index = *self.member_index.get(name)?;
        Some((index, &self.members[index]))
    }

    /// Own member by table index
    pub fn member_at(&self, index: usize) -> Option<&RuntimeMember> {
        self.members.get(index)
    }

    /// Append an own field; returns its absolute index
    pub fn add_field(&mut self, slot: FieldSlot) -> SynthResult<usize> {
        if self.fields.iter().any(|f| f.name == slot.name) {
            return Err(SynthesisError::DuplicateMember {
                type_name: self.name.clone(),
                member: slot.name,
            });
        }
        self.fields.push(slot);
        Ok(self.field_offset + self.fields.len() - 1)
    }

    /// Append an own member; returns its table index
    pub fn add_member(&mut self, member: RuntimeMember) -> SynthResult<usize> {
        if self.member_index.contains_key(&member.name) {
            return Err(SynthesisError::DuplicateMember {
                type_name: self.name.clone(),
                member: member.name,
            });
        }
        let index = self.members.len();
        self.member_index.insert(member.name.clone(), index);
        self.members.push(member);
        Ok(index)
    }

    /// Append a constructor; returns its table index
    pub fn add_ctor(&mut self, ctor: RuntimeCtor) -> usize {
        self.ctors.push(ctor);
        self.ctors.len() - 1
    }

    /// Find a constructor by parameter count
    pub fn ctor_by_arity(&self, argc: usize) -> Option<(usize, &RuntimeCtor)> {
        self.ctors
            .iter()
            .enumerate()
            .find(|(_, ctor)| ctor.arity() == argc)
    }

    /// Name of an own field by absolute index
    pub fn own_field_name(&self, absolute: usize) -> Option<&str> {
        if absolute < self.field_offset {
            return None;
        }
        self.fields
            .get(absolute - self.field_offset)
            .map(|slot| slot.name.as_str())
    }
}

struct SpaceInner {
    types: Vec<Arc<RuntimeType>>,
    name_to_id: FxHashMap<String, usize>,
}

/// Shared, append-only registry of runtime types.
///
/// Cheap to clone; all clones observe the same table. Reads clone the
/// `Arc<RuntimeType>` out of the lock, so dispatch never holds the registry
/// lock while running member bodies (nested calls cannot deadlock on it).
#[derive(Clone)]
pub struct TypeSpace {
    inner: Arc<RwLock<SpaceInner>>,
}

impl TypeSpace {
    /// Create an empty space
    pub fn new() -> Self {
        TypeSpace {
            inner: Arc::new(RwLock::new(SpaceInner {
                types: Vec::new(),
                name_to_id: FxHashMap::default(),
            })),
        }
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.inner.read().types.len()
    }

    /// True when no types are registered
    pub fn is_empty(&self) -> bool {
        self.inner.read().types.is_empty()
    }

    /// Insert a new type entry. Fields, members, and constructors are added
    /// afterwards through mutation while the type is `Building` (or, for
    /// native registration, before the entry is frozen).
    pub(crate) fn insert_type(
        &self,
        name: &str,
        parent_id: Option<usize>,
        contracts: Vec<String>,
        descriptor: Option<TypeDescriptor>,
        state: TypeState,
    ) -> SynthResult<usize> {
        let mut inner = self.inner.write();
        if inner.name_to_id.contains_key(name) {
            return Err(SynthesisError::DuplicateType {
                name: name.to_string(),
            });
        }
        let field_offset = match parent_id {
            Some(parent) => {
                let parent_ty =
                    inner
                        .types
                        .get(parent)
                        .ok_or_else(|| SynthesisError::UnknownType {
                            name: format!("type#{parent}"),
                        })?;
                parent_ty.total_fields()
            }
            None => 0,
        };
        let id = inner.types.len();
        inner.types.push(Arc::new(RuntimeType::new(
            id,
            name.to_string(),
            parent_id,
            contracts,
            descriptor,
            state,
            field_offset,
        )));
        inner.name_to_id.insert(name.to_string(), id);
        Ok(id)
    }

    /// Look up a type by id
    pub fn get(&self, id: usize) -> Option<Arc<RuntimeType>> {
        self.inner.read().types.get(id).cloned()
    }

    /// Look up a type by name
    pub fn get_by_name(&self, name: &str) -> Option<Arc<RuntimeType>> {
        let inner = self.inner.read();
        let id = *inner.name_to_id.get(name)?;
        inner.types.get(id).cloned()
    }

    /// Resolve a name to a type id
    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.inner.read().name_to_id.get(name).copied()
    }

    /// Clone out the descriptor a type was registered from
    pub fn descriptor_of(&self, name: &str) -> Option<TypeDescriptor> {
        self.get_by_name(name)?.descriptor.clone()
    }

    /// Display name for a type id
    pub fn type_name(&self, id: usize) -> String {
        match self.get(id) {
            Some(ty) => ty.name.clone(),
            None => format!("type#{id}"),
        }
    }

    /// Mutate a type entry in place.
    ///
    /// Used by registration and the synthesis backend while a type is being
    /// shaped. Readers holding the old `Arc` keep their stale snapshot; the
    /// registry always serves the updated entry.
    pub(crate) fn mutate<R>(
        &self,
        id: usize,
        f: impl FnOnce(&mut RuntimeType) -> SynthResult<R>,
    ) -> SynthResult<R> {
        let mut inner = self.inner.write();
        let slot = inner
            .types
            .get_mut(id)
            .ok_or_else(|| SynthesisError::UnknownType {
                name: format!("type#{id}"),
            })?;
        f(Arc::make_mut(slot))
    }

    /// Flip a type from `Building` to `Activated`.
    ///
    /// Members, fields, and constructors are frozen from here on; instances
    /// may now be created.
    pub fn activate(&self, id: usize) -> SynthResult<()> {
        self.mutate(id, |ty| match ty.state {
            TypeState::Building => {
                ty.state = TypeState::Activated;
                Ok(())
            }
            TypeState::Activated => Err(SynthesisError::InvalidState(format!(
                "type '{}' is already activated",
                ty.name
            ))),
        })
    }

    /// Whether `type_id` satisfies the named target: itself, an ancestor, or
    /// an implemented contract anywhere up the chain.
    pub fn satisfies(&self, type_id: usize, target: &str) -> bool {
        let mut current = match self.get(type_id) {
            Some(ty) => ty,
            None => return false,
        };
        loop {
            if current.name == target || current.contracts.iter().any(|c| c == target) {
                return true;
            }
            match current.parent_id {
                Some(parent) => match self.get(parent) {
                    Some(ty) => current = ty,
                    None => return false,
                },
                None => return false,
            }
        }
    }

    /// Virtual member lookup: search `type_id`'s own table, then the parent
    /// chain. Returns the owning type id and the member's table index there.
    pub fn find_member(&self, type_id: usize, name: &str) -> Option<(usize, usize)> {
        let mut current = self.get(type_id)?;
        loop {
            if let Some((index, _)) = current.member(name) {
                return Some((current.id, index));
            }
            match current.parent_id {
                Some(parent) => current = self.get(parent)?,
                None => return None,
            }
        }
    }

    /// Resolve an absolute field index to its declaring type and field name
    pub fn field_name(&self, type_id: usize, absolute: usize) -> Option<(String, String)> {
        let mut current = self.get(type_id)?;
        loop {
            if let Some(name) = current.own_field_name(absolute) {
                return Some((current.name.clone(), name.to_string()));
            }
            match current.parent_id {
                Some(parent) => current = self.get(parent)?,
                None => return None,
            }
        }
    }
}

impl Default for TypeSpace {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Visibility;
    use crate::space::member::{MemberAttributes, MemberBody};

    fn plain_member(name: &str) -> RuntimeMember {
        RuntimeMember {
            name: name.to_string(),
            attributes: MemberAttributes::public(),
            params: Vec::new(),
            return_type: TypeRef::Void,
            body: MemberBody::Abstract,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let space = TypeSpace::new();
        let id = space
            .insert_type("Base", None, Vec::new(), None, TypeState::Activated)
            .unwrap();
        assert_eq!(space.len(), 1);
        assert_eq!(space.id_of("Base"), Some(id));
        assert_eq!(space.get(id).unwrap().name, "Base");
        assert!(space.get_by_name("Missing").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let space = TypeSpace::new();
        space
            .insert_type("Base", None, Vec::new(), None, TypeState::Activated)
            .unwrap();
        let err = space
            .insert_type("Base", None, Vec::new(), None, TypeState::Activated)
            .unwrap_err();
        assert!(matches!(err, SynthesisError::DuplicateType { .. }));
    }

    #[test]
    fn test_field_offsets_follow_parent_chain() {
        let space = TypeSpace::new();
        let base = space
            .insert_type("Base", None, Vec::new(), None, TypeState::Building)
            .unwrap();
        space
            .mutate(base, |ty| {
                ty.add_field(FieldSlot::new("a", TypeRef::I32))?;
                ty.add_field(FieldSlot::new("b", TypeRef::Str))?;
                Ok(())
            })
            .unwrap();

        let child = space
            .insert_type("Child", Some(base), Vec::new(), None, TypeState::Building)
            .unwrap();
        let index = space
            .mutate(child, |ty| ty.add_field(FieldSlot::new("c", TypeRef::Bool)))
            .unwrap();
        assert_eq!(index, 2);
        assert_eq!(space.get(child).unwrap().total_fields(), 3);
        assert_eq!(
            space.field_name(child, 0),
            Some(("Base".to_string(), "a".to_string()))
        );
        assert_eq!(
            space.field_name(child, 2),
            Some(("Child".to_string(), "c".to_string()))
        );
    }

    #[test]
    fn test_member_lookup_walks_parents() {
        let space = TypeSpace::new();
        let base = space
            .insert_type("Base", None, Vec::new(), None, TypeState::Building)
            .unwrap();
        space
            .mutate(base, |ty| ty.add_member(plain_member("shared")))
            .unwrap();
        let child = space
            .insert_type("Child", Some(base), Vec::new(), None, TypeState::Building)
            .unwrap();
        space
            .mutate(child, |ty| ty.add_member(plain_member("own")))
            .unwrap();

        assert_eq!(space.find_member(child, "own"), Some((child, 0)));
        assert_eq!(space.find_member(child, "shared"), Some((base, 0)));
        assert_eq!(space.find_member(child, "missing"), None);
    }

    #[test]
    fn test_member_shadowing_prefers_child() {
        let space = TypeSpace::new();
        let base = space
            .insert_type("Base", None, Vec::new(), None, TypeState::Building)
            .unwrap();
        space
            .mutate(base, |ty| ty.add_member(plain_member("m")))
            .unwrap();
        let child = space
            .insert_type("Child", Some(base), Vec::new(), None, TypeState::Building)
            .unwrap();
        space
            .mutate(child, |ty| ty.add_member(plain_member("m")))
            .unwrap();
        assert_eq!(space.find_member(child, "m"), Some((child, 0)));
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let space = TypeSpace::new();
        let id = space
            .insert_type("T", None, Vec::new(), None, TypeState::Building)
            .unwrap();
        space
            .mutate(id, |ty| ty.add_member(plain_member("m")))
            .unwrap();
        let err = space
            .mutate(id, |ty| ty.add_member(plain_member("m")))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::DuplicateMember { .. }));
    }

    #[test]
    fn test_satisfies_contract_and_ancestry() {
        let space = TypeSpace::new();
        let base = space
            .insert_type(
                "Base",
                None,
                vec!["Greeter".to_string()],
                None,
                TypeState::Activated,
            )
            .unwrap();
        let child = space
            .insert_type("Child", Some(base), Vec::new(), None, TypeState::Activated)
            .unwrap();

        assert!(space.satisfies(child, "Child"));
        assert!(space.satisfies(child, "Base"));
        assert!(space.satisfies(child, "Greeter"));
        assert!(!space.satisfies(child, "Other"));
    }

    #[test]
    fn test_activation_is_one_way() {
        let space = TypeSpace::new();
        let id = space
            .insert_type("T", None, Vec::new(), None, TypeState::Building)
            .unwrap();
        assert!(!space.get(id).unwrap().is_activated());
        space.activate(id).unwrap();
        assert!(space.get(id).unwrap().is_activated());
        assert!(matches!(
            space.activate(id),
            Err(SynthesisError::InvalidState(_))
        ));
    }

    #[test]
    fn test_visibility_recorded_on_members() {
        let mut member = plain_member("t");
        member.attributes = MemberAttributes::private();
        assert_eq!(member.attributes.visibility, Visibility::Private);
    }
}
