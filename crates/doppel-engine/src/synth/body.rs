//! Instruction emission for generated member bodies.
//!
//! Trampolines and synthesized constructors are straight-line instruction
//! sequences over a small stack machine. [`BodyEmitter`] is the emission
//! surface the synthesis engines write through: emit instructions, then
//! `build()` validates the sequence and freezes it into an [`EmittedBody`]
//! the runtime can evaluate.

use doppel_sdk::Value;

use crate::descriptor::TypeRef;
use crate::{SynthResult, SynthesisError};

/// One instruction of a generated body.
///
/// The machine is stack-based. Arguments to calls are pushed left to right;
/// call instructions pop them back off together with the receiver where one
/// is explicit.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// Push the receiver
    LoadThis,
    /// Push the formal argument at the given position
    LoadArg(usize),
    /// Push a constant
    Const(Value),
    /// Push a field of the receiver by absolute index
    LoadField(usize),
    /// Pop a value and write it into a receiver field (slots are once-set)
    StoreField(usize),
    /// Push a freshly allocated list of the given length
    NewList(usize),
    /// Pop a list, push its element at the given position
    LoadElement(usize),
    /// Pop a value and a list, write the value at the given position
    StoreElement(usize),
    /// Pop `argc` arguments, allocate an instance of the type and run its
    /// matching constructor, push the new object
    NewObject {
        /// Registry id of the type to instantiate
        type_id: usize,
        /// Number of constructor arguments to pop
        argc: usize,
    },
    /// Instantiate the interceptor bound to the owning type, push the object
    NewInterceptor,
    /// Pop `argc` arguments and run the parent constructor of the owning
    /// type against the receiver
    InvokeParentCtor {
        /// Number of constructor arguments to pop
        argc: usize,
    },
    /// Pop `argc` arguments and a receiver, dispatch the named member
    /// virtually, push the result (`Null` for void members)
    CallVirtual {
        /// Member name to dispatch
        member: String,
        /// Number of call arguments to pop
        argc: usize,
    },
    /// Pop `argc` arguments, call the named member resolved from the owning
    /// type's parent chain with the receiver as `this`, push the result
    CallParent {
        /// Member name to resolve upward
        member: String,
        /// Number of call arguments to pop
        argc: usize,
    },
    /// Pop a value, convert or narrow it to the given type, push the result
    Convert(TypeRef),
    /// Pop and discard
    Pop,
    /// Pop the return value and finish
    Ret,
    /// Finish with no value
    RetVoid,
}

impl Inst {
    /// Stack effect as (pops, pushes)
    fn effect(&self) -> (usize, usize) {
        match self {
            Inst::LoadThis | Inst::LoadArg(_) | Inst::Const(_) | Inst::LoadField(_) => (0, 1),
            Inst::StoreField(_) => (1, 0),
            Inst::NewList(_) => (0, 1),
            Inst::LoadElement(_) => (1, 1),
            Inst::StoreElement(_) => (2, 0),
            Inst::NewObject { argc, .. } => (*argc, 1),
            Inst::NewInterceptor => (0, 1),
            Inst::InvokeParentCtor { argc } => (*argc, 0),
            Inst::CallVirtual { argc, .. } => (*argc + 1, 1),
            Inst::CallParent { argc, .. } => (*argc, 1),
            Inst::Convert(_) => (1, 1),
            Inst::Pop => (1, 0),
            Inst::Ret => (1, 0),
            Inst::RetVoid => (0, 0),
        }
    }

    fn is_return(&self) -> bool {
        matches!(self, Inst::Ret | Inst::RetVoid)
    }
}

/// A validated, frozen instruction sequence ready for evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedBody {
    /// Name of the member or constructor this body belongs to
    pub name: String,
    /// Number of formal arguments the body expects
    pub param_count: usize,
    /// Whether the body finishes with `Ret` (as opposed to `RetVoid`)
    pub returns_value: bool,
    /// Maximum operand stack depth reached
    pub max_stack: usize,
    /// The instruction sequence
    pub insts: Vec<Inst>,
}

/// Result of validating an emitted sequence
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether validation passed
    pub is_valid: bool,
    /// Validation errors
    pub errors: Vec<String>,
}

/// Emission surface for generated bodies.
///
/// Once `build()` succeeds the emitter is finalized and refuses further
/// emission.
#[derive(Debug)]
pub struct BodyEmitter {
    /// Name of the member or constructor being emitted
    pub name: String,
    /// Number of formal arguments the body will receive
    pub param_count: usize,
    insts: Vec<Inst>,
    finalized: bool,
}

impl BodyEmitter {
    /// Start an empty body
    pub fn new(name: impl Into<String>, param_count: usize) -> Self {
        Self {
            name: name.into(),
            param_count,
            insts: Vec::with_capacity(16),
            finalized: false,
        }
    }

    fn push(&mut self, inst: Inst) -> SynthResult<()> {
        if self.finalized {
            return Err(SynthesisError::InvalidState(
                "cannot modify a finalized body emitter".to_string(),
            ));
        }
        self.insts.push(inst);
        Ok(())
    }

    /// Emit `LoadThis`
    pub fn emit_load_this(&mut self) -> SynthResult<()> {
        self.push(Inst::LoadThis)
    }

    /// Emit `LoadArg`
    pub fn emit_load_arg(&mut self, index: usize) -> SynthResult<()> {
        self.push(Inst::LoadArg(index))
    }

    /// Emit `Const`
    pub fn emit_const(&mut self, value: Value) -> SynthResult<()> {
        self.push(Inst::Const(value))
    }

    /// Emit `LoadField`
    pub fn emit_load_field(&mut self, absolute: usize) -> SynthResult<()> {
        self.push(Inst::LoadField(absolute))
    }

    /// Emit `StoreField`
    pub fn emit_store_field(&mut self, absolute: usize) -> SynthResult<()> {
        self.push(Inst::StoreField(absolute))
    }

    /// Emit `NewList`
    pub fn emit_new_list(&mut self, len: usize) -> SynthResult<()> {
        self.push(Inst::NewList(len))
    }

    /// Emit `LoadElement`
    pub fn emit_load_element(&mut self, index: usize) -> SynthResult<()> {
        self.push(Inst::LoadElement(index))
    }

    /// Emit `StoreElement`
    pub fn emit_store_element(&mut self, index: usize) -> SynthResult<()> {
        self.push(Inst::StoreElement(index))
    }

    /// Emit `NewObject`
    pub fn emit_new_object(&mut self, type_id: usize, argc: usize) -> SynthResult<()> {
        self.push(Inst::NewObject { type_id, argc })
    }

    /// Emit `NewInterceptor`
    pub fn emit_new_interceptor(&mut self) -> SynthResult<()> {
        self.push(Inst::NewInterceptor)
    }

    /// Emit `InvokeParentCtor`
    pub fn emit_invoke_parent_ctor(&mut self, argc: usize) -> SynthResult<()> {
        self.push(Inst::InvokeParentCtor { argc })
    }

    /// Emit `CallVirtual`
    pub fn emit_call_virtual(&mut self, member: impl Into<String>, argc: usize) -> SynthResult<()> {
        self.push(Inst::CallVirtual {
            member: member.into(),
            argc,
        })
    }

    /// Emit `CallParent`
    pub fn emit_call_parent(&mut self, member: impl Into<String>, argc: usize) -> SynthResult<()> {
        self.push(Inst::CallParent {
            member: member.into(),
            argc,
        })
    }

    /// Emit `Convert`
    pub fn emit_convert(&mut self, ty: TypeRef) -> SynthResult<()> {
        self.push(Inst::Convert(ty))
    }

    /// Emit `Pop`
    pub fn emit_pop(&mut self) -> SynthResult<()> {
        self.push(Inst::Pop)
    }

    /// Emit `Ret`
    pub fn emit_return(&mut self) -> SynthResult<()> {
        self.push(Inst::Ret)
    }

    /// Emit `RetVoid`
    pub fn emit_return_void(&mut self) -> SynthResult<()> {
        self.push(Inst::RetVoid)
    }

    /// Validate the sequence: exactly one return as the final instruction,
    /// argument indices in range, and a balanced operand stack.
    pub fn validate(&self) -> ValidationResult {
        let mut errors = Vec::new();

        match self.insts.last() {
            None => errors.push("body is empty".to_string()),
            Some(last) if !last.is_return() => {
                errors.push("body does not end with a return".to_string())
            }
            Some(_) => {}
        }

        let mut depth: usize = 0;
        let mut max_depth: usize = 0;
        for (offset, inst) in self.insts.iter().enumerate() {
            if inst.is_return() && offset + 1 != self.insts.len() {
                errors.push(format!("return before the final instruction at {offset}"));
            }
            if let Inst::LoadArg(index) = inst {
                if *index >= self.param_count {
                    errors.push(format!(
                        "argument index {index} out of range ({} declared)",
                        self.param_count
                    ));
                }
            }
            let (pops, pushes) = inst.effect();
            if pops > depth {
                errors.push(format!("operand stack underflow at {offset}"));
                depth = 0;
            } else {
                depth -= pops;
            }
            depth += pushes;
            max_depth = max_depth.max(depth);
        }

        if depth != 0 {
            errors.push(format!("stack not balanced: {depth} values remaining"));
        }

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Maximum operand stack depth of the current sequence
    fn max_stack(&self) -> usize {
        let mut depth: usize = 0;
        let mut max_depth: usize = 0;
        for inst in &self.insts {
            let (pops, pushes) = inst.effect();
            depth = depth.saturating_sub(pops) + pushes;
            max_depth = max_depth.max(depth);
        }
        max_depth
    }

    /// Validate and freeze the sequence
    pub fn build(&mut self) -> SynthResult<EmittedBody> {
        if self.finalized {
            return Err(SynthesisError::InvalidState(
                "body emitter already finalized".to_string(),
            ));
        }
        let validation = self.validate();
        if !validation.is_valid {
            return Err(SynthesisError::InvalidBody(format!(
                "validation of '{}' failed: {}",
                self.name,
                validation.errors.join("; ")
            )));
        }
        self.finalized = true;
        let returns_value = matches!(self.insts.last(), Some(Inst::Ret));
        Ok(EmittedBody {
            name: self.name.clone(),
            param_count: self.param_count,
            returns_value,
            max_stack: self.max_stack(),
            insts: self.insts.clone(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
