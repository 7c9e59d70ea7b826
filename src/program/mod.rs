//! The loaded program model (spec §4.8, §6 "Program blob"): type registry,
//! invocation table, constant pool, and the entry point — built once at
//! load time and never mutated afterward, threaded explicitly through the
//! evaluator rather than kept as process-wide state (Design Notes §9).

mod blob;
mod constpool;
mod invoke;
mod opcode;

pub use blob::load_program;
pub use constpool::{ConstDecl, ConstPool};
pub use invoke::{BodyInvocation, FieldDecl, InvocationDecl, InvokeId, ParamInfo, PrimitiveInvocation};
pub use opcode::{
    ArgKind, ArgRef, CheckedArithOp, FieldKey, FieldShape, FieldUpdate, Guard, InterpOp, KeyCompareMode, Opcode,
    SourceInfo, StatementGuard, TargetVar,
};

use crate::error::FatalReason;
use crate::types::TypeRegistry;

/// The fully-resolved, immutable program: everything the evaluator needs
/// to run `primaryEntry`.
#[derive(Debug, Clone)]
pub struct Program {
    pub registry: TypeRegistry,
    invocations: Vec<InvocationDecl>,
    pub const_pool: ConstPool,
    pub field_decls: Vec<FieldDecl>,
    primary_entry: InvokeId,
}

impl Program {
    /// Assemble a program from its already-decoded parts (called by
    /// [`blob::load_program`]).
    pub fn new(
        registry: TypeRegistry,
        invocations: Vec<InvocationDecl>,
        const_pool: ConstPool,
        field_decls: Vec<FieldDecl>,
        primary_entry: InvokeId,
    ) -> Self {
        Program { registry, invocations, const_pool, field_decls, primary_entry }
    }

    /// Look up an invocation declaration by id.
    pub fn invocation(&self, id: InvokeId) -> Result<&InvocationDecl, FatalReason> {
        self.invocations
            .get(id as usize)
            .ok_or_else(|| FatalReason::MissingMember(format!("InvokeID {id}")))
    }

    /// The program's designated entry point (`main`).
    pub fn primary_entry(&self) -> InvokeId {
        self.primary_entry
    }

    /// Number of declared invocations, for diagnostics.
    pub fn invocation_count(&self) -> usize {
        self.invocations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_minimal_program() {
        let json = r#"{
            "typeDecls": [
                {"tid": 4, "name": "Nat", "category": "Register", "heapSize": 0, "inlineSize": 8, "assignSize": 8, "heapMask": "", "inlineMask": "1", "keyComparable": true}
            ],
            "fieldDecls": [],
            "invokeDecls": [
                {"name": "main", "params": [], "resultType": 4, "resultArg": 0, "stackBytes": 8, "maskSlots": 0,
                 "body": [
                    {"tag": "LoadConst", "sinfo": {"line": 1, "column": 1}, "ssrc": "42", "dst": {"offset": 0}, "constRef": 0, "type": 4},
                    {"tag": "ReturnAssign", "sinfo": {"line": 1, "column": 1}, "ssrc": "return 42", "dst": {"offset": 0}, "src": {"kind": "local", "location": 0}}
                 ]}
            ],
            "constDecls": [{"ttype": 4, "offset": 0, "len": 8}],
            "constPool": [42, 0, 0, 0, 0, 0, 0, 0],
            "primaryEntry": 0
        }"#;

        let program = load_program(json).expect("valid blob");
        assert_eq!(program.primary_entry(), 0);
        assert_eq!(program.invocation_count(), 1);
        let main = program.invocation(0).unwrap();
        assert_eq!(main.name(), "main");
        match main {
            InvocationDecl::Body(b) => assert_eq!(b.body.len(), 2),
            InvocationDecl::Primitive(_) => panic!("expected body"),
        }
    }
}
