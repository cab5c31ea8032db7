//! Type and Member Descriptors
//!
//! Declarative model of the contracts and implementations the synthesis
//! engines consume. Descriptors are plain data: they say what a type looks
//! like (kind, sealedness, members, signatures) without saying how it runs.
//! Runtime behavior is attached separately when a type is registered in a
//! [`TypeSpace`](crate::space::TypeSpace).
//!
//! All descriptor types derive serde traits so contract models can be loaded
//! from data files as well as built in code.

use serde::{Deserialize, Serialize};

/// Type kind enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    /// Class types (may be sealed, abstract, or open)
    Class,
    /// Interface types (all members abstract, never sealed)
    Interface,
}

/// Member visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    /// Callable from outside the owning type
    Public,
    /// Internal to the owning type (generated trampolines)
    Private,
}

/// Declared type of a parameter, return value, or field.
///
/// `Void` is only meaningful as a return type. `Any` opts out of
/// conversion entirely; `Named` types convert by narrowing cast against the
/// runtime type hierarchy, everything else by strict unboxing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeRef {
    /// No value (return position only)
    Void,
    /// Boolean
    Bool,
    /// 32-bit integer
    I32,
    /// 64-bit integer
    I64,
    /// 64-bit float
    F64,
    /// String
    Str,
    /// Instance of a named class or interface
    Named(String),
    /// Anything; no conversion applied
    Any,
}

impl TypeRef {
    /// Display name, for diagnostics and mismatch errors
    pub fn name(&self) -> &str {
        match self {
            TypeRef::Void => "void",
            TypeRef::Bool => "bool",
            TypeRef::I32 => "i32",
            TypeRef::I64 => "i64",
            TypeRef::F64 => "f64",
            TypeRef::Str => "str",
            TypeRef::Named(name) => name,
            TypeRef::Any => "any",
        }
    }

    /// True for types converted by strict unboxing
    pub fn is_value_like(&self) -> bool {
        matches!(self, TypeRef::Bool | TypeRef::I32 | TypeRef::I64 | TypeRef::F64)
    }

    /// True for the void return type
    #[inline]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Void)
    }
}

/// Parameter descriptor for member signatures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    /// Parameter name
    pub name: String,
    /// Declared parameter type
    pub ty: TypeRef,
}

impl ParamDescriptor {
    /// Create a new parameter descriptor
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Descriptor for one callable member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Member name
    pub name: String,
    /// Parameter descriptors, in declaration order
    pub params: Vec<ParamDescriptor>,
    /// Declared return type (`Void` when none)
    pub return_type: TypeRef,
    /// Declared visibility
    pub visibility: Visibility,
    /// Whether the member has no body of its own
    pub is_abstract: bool,
    /// Whether the member dispatches virtually
    pub is_virtual: bool,
    /// Whether the member forbids further overriding
    pub is_final: bool,
    /// Names of the member's own type parameters (unsupported when non-empty)
    pub type_params: Vec<String>,
}

impl MethodDescriptor {
    /// Create a new method descriptor with defaults: no parameters, void
    /// return, public, concrete, non-virtual
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            return_type: TypeRef::Void,
            visibility: Visibility::Public,
            is_abstract: false,
            is_virtual: false,
            is_final: false,
            type_params: Vec::new(),
        }
    }

    /// Set the return type
    pub fn returns(mut self, ty: TypeRef) -> Self {
        self.return_type = ty;
        self
    }

    /// Add a parameter
    pub fn with_param(mut self, param: ParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    /// Set the visibility
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Mark as abstract (no body to forward to)
    pub fn as_abstract(mut self) -> Self {
        self.is_abstract = true;
        self.is_virtual = true;
        self
    }

    /// Mark as virtual
    pub fn as_virtual(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// Mark as final
    pub fn as_final(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Add a type parameter of the member's own
    pub fn with_type_param(mut self, name: impl Into<String>) -> Self {
        self.type_params.push(name.into());
        self
    }

    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// Descriptor for one property.
///
/// Properties never dispatch directly; member enumeration lowers each into
/// its accessor methods (`get_name`, `set_name`) which are then proxied like
/// any other member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    /// Property name
    pub name: String,
    /// Declared value type
    pub ty: TypeRef,
    /// Whether a getter accessor exists
    pub has_getter: bool,
    /// Whether a setter accessor exists
    pub has_setter: bool,
    /// Whether the accessors are abstract
    pub is_abstract: bool,
}

impl PropertyDescriptor {
    /// Create a new read-write property descriptor
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            has_getter: true,
            has_setter: true,
            is_abstract: false,
        }
    }

    /// Drop the setter accessor
    pub fn read_only(mut self) -> Self {
        self.has_setter = false;
        self
    }

    /// Drop the getter accessor
    pub fn write_only(mut self) -> Self {
        self.has_getter = false;
        self
    }

    /// Mark the accessors abstract
    pub fn as_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }
}

/// Descriptor for one type: the shape the synthesis engines inspect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// Type name (unique within a space)
    pub name: String,
    /// Class or interface
    pub kind: TypeKind,
    /// Whether the type forbids subclassing (classes only)
    pub is_sealed: bool,
    /// Whether the type cannot be instantiated directly
    pub is_abstract: bool,
    /// Callable members
    pub methods: Vec<MethodDescriptor>,
    /// Properties (lowered to accessors during enumeration)
    pub properties: Vec<PropertyDescriptor>,
}

impl TypeDescriptor {
    /// Create a class descriptor
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Class,
            is_sealed: false,
            is_abstract: false,
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Create an interface descriptor; interface members are forced abstract
    /// and virtual when added
    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Interface,
            is_sealed: false,
            is_abstract: true,
            methods: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Mark the type sealed
    pub fn as_sealed(mut self) -> Self {
        self.is_sealed = true;
        self
    }

    /// Mark the type abstract
    pub fn as_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Add a member. On interfaces the member is forced abstract.
    pub fn with_method(mut self, mut method: MethodDescriptor) -> Self {
        if self.kind == TypeKind::Interface {
            method.is_abstract = true;
            method.is_virtual = true;
        }
        self.methods.push(method);
        self
    }

    /// Add a property. On interfaces the property is forced abstract.
    pub fn with_property(mut self, mut property: PropertyDescriptor) -> Self {
        if self.kind == TypeKind::Interface {
            property.is_abstract = true;
        }
        self.properties.push(property);
        self
    }

    /// True for interface descriptors
    #[inline]
    pub fn is_interface(&self) -> bool {
        self.kind == TypeKind::Interface
    }

    /// True for class descriptors
    #[inline]
    pub fn is_class(&self) -> bool {
        self.kind == TypeKind::Class
    }

    /// Look up a method by name
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Look up a property by name
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Whether a method or property with this name exists
    pub fn has_member(&self, name: &str) -> bool {
        self.method(name).is_some() || self.property(name).is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================
