//! Instances of runtime types.
//!
//! Field slots are once-set: constructors write each slot exactly once and
//! nothing mutates a slot afterwards. Reading an unwritten slot is an error
//! surfaced by the dispatch path, which is how the "no constructor may leave
//! a field unset" guarantee is enforced at runtime.

use once_cell::sync::OnceCell;

use doppel_sdk::Value;

/// An instance of a runtime type: a flat once-set field frame.
///
/// Instances travel wrapped in [`doppel_sdk::ObjectRef`]; object identity
/// comes from the wrapping ref, not from the instance itself.
#[derive(Debug)]
pub struct Instance {
    type_id: usize,
    fields: Box<[OnceCell<Value>]>,
}

impl Instance {
    /// Allocate an instance with `total_fields` unset slots
    pub fn new(type_id: usize, total_fields: usize) -> Self {
        let mut fields = Vec::with_capacity(total_fields);
        fields.resize_with(total_fields, OnceCell::new);
        Instance {
            type_id,
            fields: fields.into_boxed_slice(),
        }
    }

    /// Id of the instance's runtime type
    #[inline]
    pub fn type_id(&self) -> usize {
        self.type_id
    }

    /// Total number of field slots (own plus inherited)
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Read a field by absolute index; `None` when out of range or unset
    pub fn field(&self, index: usize) -> Option<Value> {
        self.fields.get(index).and_then(|cell| cell.get()).cloned()
    }

    /// True when the slot exists and has been written
    pub fn field_is_set(&self, index: usize) -> bool {
        self.fields
            .get(index)
            .map(|cell| cell.get().is_some())
            .unwrap_or(false)
    }

    /// Write a field by absolute index.
    ///
    /// Returns false when the slot is out of range or was already written;
    /// slots are set exactly once.
    pub fn set_field(&self, index: usize, value: Value) -> bool {
        match self.fields.get(index) {
            Some(cell) => cell.set(value).is_ok(),
            None => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
