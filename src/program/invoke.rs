//! Invocation declarations: the `invokeDecls` section of the program blob
//! (spec §6), resolved into an immutable in-memory form.

use crate::types::TypeId;

use super::opcode::Opcode;

/// A process-unique invocation identifier (an index into
/// [`super::Program::invocations`]).
pub type InvokeId = u32;

/// One globally-interned field/property declaration (spec §6 `fieldDecls`).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub fkey: u32,
    pub fname: String,
    pub declared_type: TypeId,
    pub is_optional: bool,
}

/// One formal parameter of an invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    /// Declared static type.
    pub ptype: TypeId,
    /// Byte offset of this parameter's slot within the callee's frame.
    pub frame_offset: u32,
    /// Whether this is an optional parameter (tracked via the caller's
    /// optional-argument mask, spec §4.4 "Masks").
    pub is_optional: bool,
}

/// A body invocation's code: `stackBytes`, the frame's mask-slot count,
/// parameter layout, result slot, and opcode stream (spec §6 `invokeDecls`
/// body variant).
#[derive(Debug, Clone, PartialEq)]
pub struct BodyInvocation {
    pub name: String,
    pub stack_bytes: u32,
    pub mask_slots: u32,
    pub params: Vec<ParamInfo>,
    pub result_type: TypeId,
    pub result_offset: u32,
    pub body: Vec<Opcode>,
}

/// A primitive invocation: a C-style dispatch on an implementation tag
/// rather than an opcode body (spec §6 `invokeDecls` primitive variant,
/// §4.4 "Primitive built-ins").
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveInvocation {
    pub name: String,
    /// The built-in tag, e.g. `"number_nattoint"`, `"s_list_push_back"`.
    pub implkey: String,
    /// Type bindings the primitive is instantiated with (e.g. the element
    /// type of a generic list operation).
    pub binds: Vec<TypeId>,
    pub params: Vec<ParamInfo>,
    pub result_type: TypeId,
}

/// One invocation declaration: either a full opcode body or a primitive
/// dispatch (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationDecl {
    Body(BodyInvocation),
    Primitive(PrimitiveInvocation),
}

impl InvocationDecl {
    /// The declared parameter list, regardless of variant.
    pub fn params(&self) -> &[ParamInfo] {
        match self {
            InvocationDecl::Body(b) => &b.params,
            InvocationDecl::Primitive(p) => &p.params,
        }
    }

    /// The declared result type, regardless of variant.
    pub fn result_type(&self) -> TypeId {
        match self {
            InvocationDecl::Body(b) => b.result_type,
            InvocationDecl::Primitive(p) => p.result_type,
        }
    }

    /// Declared name, for diagnostics.
    pub fn name(&self) -> &str {
        match self {
            InvocationDecl::Body(b) => &b.name,
            InvocationDecl::Primitive(p) => &p.name,
        }
    }
}
