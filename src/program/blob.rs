//! Program blob decode: the JSON wire format of spec §6, converted once
//! into the immutable in-memory [`super::Program`].
//!
//! Grounded on the teacher's `checked_transaction.rs` pattern: a serde
//! external representation is parsed, then converted in one pass into an
//! internal type that is never re-serialized and carries no residual serde
//! dependency in its own shape. Opcodes are decoded field-by-field from
//! [`serde_json::Value`] rather than via a derived `#[serde(tag = "tag")]`
//! enum, since the wire fields vary per tag in ways a single derive can't
//! express cleanly (e.g. `sguard` being present only on some variants);
//! this mirrors the hand-written `TryFrom` conversions the teacher uses
//! for its own external-to-internal transaction types.

use serde::Deserialize;
use serde_json;

use crate::error::FatalReason;
use crate::types::{
    Category, EntityLayout, EphemeralListLayout, RecordLayout, ReferenceMask, SizeInfo, TupleLayout, TypeDescriptor,
    TypeId, TypeRegistry, UnionLayout,
};

use super::constpool::{ConstDecl, ConstPool};
use super::invoke::{BodyInvocation, FieldDecl, InvocationDecl, InvokeId, ParamInfo, PrimitiveInvocation};
use super::opcode::{
    ArgKind, ArgRef, CheckedArithOp, FieldKey, FieldShape, FieldUpdate, Guard, InterpOp, KeyCompareMode, Opcode,
    SourceInfo, StatementGuard, TargetVar,
};
use super::Program;

/// Top-level raw wire shape of a program blob (spec §6).
#[derive(Debug, Deserialize)]
struct RawBlob {
    #[serde(rename = "typeDecls")]
    type_decls: Vec<RawTypeDecl>,
    #[serde(rename = "fieldDecls", default)]
    field_decls: Vec<RawFieldDecl>,
    #[serde(rename = "invokeDecls")]
    invoke_decls: Vec<RawInvokeDecl>,
    #[serde(rename = "constDecls")]
    const_decls: Vec<RawConstDecl>,
    #[serde(rename = "constPool")]
    const_pool: Vec<u8>,
    #[serde(rename = "primaryEntry")]
    primary_entry: InvokeId,
}

#[derive(Debug, Deserialize)]
struct RawTypeDecl {
    tid: TypeId,
    name: String,
    category: String,
    #[serde(rename = "heapSize", default)]
    heap_size: u32,
    #[serde(rename = "inlineSize", default)]
    inline_size: u32,
    #[serde(rename = "assignSize", default)]
    assign_size: u32,
    #[serde(rename = "heapMask", default)]
    heap_mask: String,
    #[serde(rename = "inlineMask", default)]
    inline_mask: String,
    #[serde(default)]
    vtable: Vec<InvokeId>,
    #[serde(rename = "keyComparable", default)]
    key_comparable: bool,
    #[serde(rename = "boxedEnvelope", default)]
    boxed_envelope: Option<TypeId>,
    // Category-specific extension fields; only the ones matching `category`
    // are expected to be present.
    #[serde(default)]
    idxs: Vec<TypeId>,
    #[serde(rename = "idxOffsets", default)]
    idx_offsets: Vec<u32>,
    #[serde(default)]
    props: Vec<u32>,
    #[serde(rename = "propTypes", default)]
    prop_types: Vec<TypeId>,
    #[serde(rename = "propOffsets", default)]
    prop_offsets: Vec<u32>,
    #[serde(default)]
    fields: Vec<u32>,
    #[serde(rename = "fieldTypes", default)]
    field_types: Vec<TypeId>,
    #[serde(rename = "fieldOffsets", default)]
    field_offsets: Vec<u32>,
    #[serde(default)]
    subtypes: Vec<TypeId>,
}

#[derive(Debug, Deserialize)]
struct RawFieldDecl {
    fkey: u32,
    fname: String,
    #[serde(rename = "declaredType")]
    declared_type: TypeId,
    #[serde(rename = "isOptional")]
    is_optional: bool,
}

#[derive(Debug, Deserialize)]
struct RawParamInfo {
    ptype: TypeId,
    #[serde(rename = "frameOffset")]
    frame_offset: u32,
    #[serde(rename = "isOptional", default)]
    is_optional: bool,
}

#[derive(Debug, Deserialize)]
struct RawInvokeDecl {
    name: String,
    params: Vec<RawParamInfo>,
    #[serde(rename = "resultType")]
    result_type: TypeId,
    #[serde(rename = "resultArg", default)]
    result_offset: u32,
    #[serde(rename = "stackBytes", default)]
    stack_bytes: Option<u32>,
    #[serde(rename = "maskSlots", default)]
    mask_slots: Option<u32>,
    #[serde(default)]
    body: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    implkey: Option<String>,
    #[serde(default)]
    binds: Option<Vec<TypeId>>,
}

#[derive(Debug, Deserialize)]
struct RawConstDecl {
    ttype: TypeId,
    offset: u32,
    len: u32,
}

/// Parse a program blob's raw JSON text into an immutable [`Program`].
pub fn load_program(json: &str) -> Result<Program, FatalReason> {
    let raw: RawBlob = serde_json::from_str(json).map_err(|e| FatalReason::MissingMember(e.to_string()))?;

    let mut descriptors = raw
        .type_decls
        .iter()
        .map(decode_type_decl)
        .collect::<Result<Vec<_>, _>>()?;
    // The string engine's K-repr/concat-node heap layout is an
    // implementation detail never carried on the wire; inject it
    // regardless of what this particular blob declares.
    descriptors.extend(crate::strings::internal_type_descriptors());
    descriptors.extend(crate::strings::bytebuffer::internal_type_descriptors());
    let registry = TypeRegistry::new(descriptors);

    let invocations = raw
        .invoke_decls
        .into_iter()
        .map(decode_invoke_decl)
        .collect::<Result<Vec<_>, _>>()?;

    let const_decls = raw
        .const_decls
        .into_iter()
        .map(|c| ConstDecl { ttype: c.ttype, offset: c.offset, len: c.len })
        .collect();
    let const_pool = ConstPool::new(const_decls, raw.const_pool);

    let field_decls = raw
        .field_decls
        .into_iter()
        .map(|f| FieldDecl { fkey: f.fkey, fname: f.fname, declared_type: f.declared_type, is_optional: f.is_optional })
        .collect();

    Ok(Program::new(registry, invocations, const_pool, field_decls, raw.primary_entry))
}

fn decode_type_decl(raw: &RawTypeDecl) -> Result<TypeDescriptor, FatalReason> {
    let heap_mask = ReferenceMask::parse(&raw.heap_mask)
        .ok_or_else(|| FatalReason::MissingMember(format!("malformed heapMask on TypeID {}", raw.tid)))?;
    let inline_mask = ReferenceMask::parse(&raw.inline_mask)
        .ok_or_else(|| FatalReason::MissingMember(format!("malformed inlineMask on TypeID {}", raw.tid)))?;

    let category = match raw.category.as_str() {
        "Empty" => Category::Empty,
        "Register" => Category::Register,
        "BigNum" => Category::BigNum,
        "String" => Category::String,
        "ByteBuffer" => Category::ByteBuffer,
        "Collection" => Category::Collection,
        "Struct" => Category::Struct(decode_struct_shape(raw)?),
        "BoxedStruct" => Category::BoxedStruct(decode_struct_shape(raw)?),
        "Ref" => Category::Ref(decode_struct_shape(raw)?),
        "UnionRef" => Category::UnionRef(UnionLayout { subtypes: raw.subtypes.clone() }),
        "UnionInline" => Category::UnionInline(UnionLayout { subtypes: raw.subtypes.clone() }),
        "UnionUniversal" => Category::UnionUniversal(UnionLayout { subtypes: raw.subtypes.clone() }),
        other => return Err(FatalReason::MissingMember(format!("unknown category {other}"))),
    };

    Ok(TypeDescriptor {
        tid: raw.tid,
        name: raw.name.clone(),
        category,
        size_info: SizeInfo {
            heap_size: raw.heap_size,
            inline_size: raw.inline_size,
            assign_size: raw.assign_size,
        },
        heap_mask,
        inline_mask,
        vtable: raw.vtable.clone(),
        key_comparable: raw.key_comparable,
        boxed_envelope: raw.boxed_envelope,
    })
}

fn decode_struct_shape(raw: &RawTypeDecl) -> Result<crate::types::StructShape, FatalReason> {
    use crate::types::StructShape;
    if !raw.idxs.is_empty() || !raw.idx_offsets.is_empty() {
        return Ok(StructShape::Tuple(TupleLayout {
            max_index: raw.idxs.len().saturating_sub(1) as u32,
            ttypes: raw.idxs.clone(),
            idx_offsets: raw.idx_offsets.clone(),
        }));
    }
    if !raw.props.is_empty() {
        return Ok(StructShape::Record(RecordLayout {
            property_ids: raw.props.clone(),
            rtypes: raw.prop_types.clone(),
            property_offsets: raw.prop_offsets.clone(),
        }));
    }
    if !raw.fields.is_empty() {
        return Ok(StructShape::Entity(EntityLayout {
            field_ids: raw.fields.clone(),
            field_offsets: raw.field_offsets.clone(),
            ftypes: raw.field_types.clone(),
        }));
    }
    Ok(StructShape::EphemeralList(EphemeralListLayout {
        etypes: raw.idxs.clone(),
        idx_offsets: raw.idx_offsets.clone(),
    }))
}

fn decode_invoke_decl(raw: RawInvokeDecl) -> Result<InvocationDecl, FatalReason> {
    let params = raw
        .params
        .iter()
        .map(|p| ParamInfo { ptype: p.ptype, frame_offset: p.frame_offset, is_optional: p.is_optional })
        .collect::<Vec<_>>();

    if let Some(body) = raw.body {
        let ops = body.iter().map(decode_opcode).collect::<Result<Vec<_>, _>>()?;
        Ok(InvocationDecl::Body(BodyInvocation {
            name: raw.name,
            stack_bytes: raw.stack_bytes.unwrap_or(0),
            mask_slots: raw.mask_slots.unwrap_or(0),
            params,
            result_type: raw.result_type,
            result_offset: raw.result_offset,
            body: ops,
        }))
    } else {
        let implkey = raw
            .implkey
            .ok_or_else(|| FatalReason::MissingMember(format!("invocation {} has neither body nor implkey", raw.name)))?;
        Ok(InvocationDecl::Primitive(PrimitiveInvocation {
            name: raw.name,
            implkey,
            binds: raw.binds.unwrap_or_default(),
            params,
            result_type: raw.result_type,
        }))
    }
}

fn get_u32(v: &serde_json::Value, key: &str) -> Result<u32, FatalReason> {
    v.get(key)
        .and_then(|x| x.as_u64())
        .map(|x| x as u32)
        .ok_or_else(|| FatalReason::MissingMember(format!("opcode missing field {key}")))
}

fn get_i32(v: &serde_json::Value, key: &str) -> Result<i32, FatalReason> {
    v.get(key)
        .and_then(|x| x.as_i64())
        .map(|x| x as i32)
        .ok_or_else(|| FatalReason::MissingMember(format!("opcode missing field {key}")))
}

fn get_str<'a>(v: &'a serde_json::Value, key: &str) -> Result<&'a str, FatalReason> {
    v.get(key)
        .and_then(|x| x.as_str())
        .ok_or_else(|| FatalReason::MissingMember(format!("opcode missing field {key}")))
}

fn get_bool(v: &serde_json::Value, key: &str) -> Result<bool, FatalReason> {
    v.get(key)
        .and_then(|x| x.as_bool())
        .ok_or_else(|| FatalReason::MissingMember(format!("opcode missing field {key}")))
}

fn get_obj<'a>(v: &'a serde_json::Value, key: &str) -> Result<&'a serde_json::Value, FatalReason> {
    v.get(key)
        .ok_or_else(|| FatalReason::MissingMember(format!("opcode missing field {key}")))
}

fn decode_arg_ref(v: &serde_json::Value) -> Result<ArgRef, FatalReason> {
    let kind = match get_str(v, "kind")? {
        "constant" => ArgKind::Constant,
        "parameter" => ArgKind::Parameter,
        "local" => ArgKind::Local,
        "register" => ArgKind::Register,
        other => return Err(FatalReason::MissingMember(format!("unknown arg kind {other}"))),
    };
    Ok(ArgRef { kind, location: get_u32(v, "location")? })
}

fn decode_arg_list(v: &serde_json::Value, key: &str) -> Result<Vec<ArgRef>, FatalReason> {
    get_obj(v, key)?
        .as_array()
        .ok_or_else(|| FatalReason::MissingMember(format!("opcode field {key} is not an array")))?
        .iter()
        .map(decode_arg_ref)
        .collect()
}

fn decode_target(v: &serde_json::Value, key: &str) -> Result<TargetVar, FatalReason> {
    let t = get_obj(v, key)?;
    Ok(TargetVar { offset: get_u32(t, "offset")? })
}

fn decode_guard(v: &serde_json::Value) -> Result<Guard, FatalReason> {
    Ok(Guard {
        mask_offset: get_u32(v, "gmaskoffset")?,
        index: get_u32(v, "gindex")?,
        var_offset: get_u32(v, "gvaroffset")?,
    })
}

fn decode_sguard(v: &serde_json::Value) -> Option<StatementGuard> {
    let sg = v.get("sguard")?;
    let guard = decode_guard(sg).ok()?;
    Some(StatementGuard {
        guard,
        default_var: sg.get("defaultvar").and_then(|x| x.as_u64()).unwrap_or(0) as u32,
        use_default_on: sg.get("usedefaulton").and_then(|x| x.as_bool()).unwrap_or(false),
        enabled: sg.get("enabled").and_then(|x| x.as_bool()).unwrap_or(true),
    })
}

fn decode_field_shape(tag: &str) -> FieldShape {
    if tag.contains("Tuple") {
        FieldShape::Tuple
    } else if tag.contains("Record") {
        FieldShape::Record
    } else if tag.contains("Entity") {
        FieldShape::Entity
    } else {
        FieldShape::EphemeralList
    }
}

fn decode_field_key(v: &serde_json::Value) -> Result<FieldKey, FatalReason> {
    Ok(FieldKey { key: get_u32(v, "key")?, offset: get_u32(v, "offset")?, ttype: get_u32(v, "ttype")? })
}

fn decode_sourceinfo(v: &serde_json::Value) -> SourceInfo {
    let sinfo = v.get("sinfo");
    SourceInfo {
        line: sinfo.and_then(|s| s.get("line")).and_then(|x| x.as_u64()).unwrap_or(0) as u32,
        column: sinfo.and_then(|s| s.get("column")).and_then(|x| x.as_u64()).unwrap_or(0) as u32,
    }
}

/// Decode one wire opcode object into an [`Opcode`].
fn decode_opcode(v: &serde_json::Value) -> Result<Opcode, FatalReason> {
    let tag = get_str(v, "tag")?;
    let sinfo = decode_sourceinfo(v);
    let ssrc = v.get("ssrc").and_then(|x| x.as_str()).unwrap_or("").to_string();

    let op = match tag {
        "DeadFlow" => InterpOp::DeadFlow,
        "Abort" => InterpOp::Abort { msg: get_str(v, "msg")?.to_string() },
        "Assert" => InterpOp::Assert { arg: decode_arg_ref(get_obj(v, "arg")?)?, msg: get_str(v, "msg")?.to_string() },
        "Debug" => InterpOp::Debug { arg: v.get("arg").map(decode_arg_ref).transpose()? },

        "LoadUninit" => InterpOp::LoadUninit { dst: decode_target(v, "dst")?, ttype: get_u32(v, "type")? },
        "NoneInitUnion" => {
            InterpOp::NoneInitUnion { dst: decode_target(v, "dst")?, union_type: get_u32(v, "unionType")? }
        }
        "LoadConst" => InterpOp::LoadConst {
            dst: decode_target(v, "dst")?,
            const_ref: get_u32(v, "constRef")?,
            ttype: get_u32(v, "type")?,
        },
        "StoreConstantMask" => InterpOp::StoreConstantMask {
            mask_offset: get_u32(v, "maskOffset")?,
            index: get_u32(v, "index")?,
            flag: get_bool(v, "flag")?,
        },

        "DirectAssign" => InterpOp::DirectAssign {
            dst: decode_target(v, "dst")?,
            into: get_u32(v, "into")?,
            src: decode_arg_ref(get_obj(v, "src")?)?,
            sguard: decode_sguard(v),
        },
        "Box" => InterpOp::Box {
            dst: decode_target(v, "dst")?,
            into: get_u32(v, "into")?,
            src: decode_arg_ref(get_obj(v, "src")?)?,
            from: get_u32(v, "fromDesc")?,
            sguard: decode_sguard(v),
        },
        "Extract" => InterpOp::Extract {
            dst: decode_target(v, "dst")?,
            into: get_u32(v, "into")?,
            src: decode_arg_ref(get_obj(v, "src")?)?,
            from: get_u32(v, "fromDesc")?,
            sguard: decode_sguard(v),
        },

        t if t.starts_with("Load") && (t.contains("Index") || t.contains("Property") || t.contains("Field")) => {
            InterpOp::LoadField {
                shape: decode_field_shape(t),
                dst: decode_target(v, "dst")?,
                arg: decode_arg_ref(get_obj(v, "arg")?)?,
                arg_type: get_u32(v, "argType")?,
                field: decode_field_key(get_obj(v, "field")?)?,
                virtual_access: t.contains("Virtual"),
                set_guard: if t.contains("SetGuard") { v.get("guard").map(decode_guard).transpose()? } else { None },
            }
        }

        t if t.starts_with("Project") => InterpOp::Project {
            shape: decode_field_shape(t),
            trgt: decode_target(v, "trgt")?,
            trgt_ephemeral_type: get_u32(v, "trgtEL")?,
            arg: decode_arg_ref(get_obj(v, "arg")?)?,
            arg_type: get_u32(v, "argType")?,
            picks: get_obj(v, "picks")?
                .as_array()
                .ok_or_else(|| FatalReason::MissingMember("picks not an array".into()))?
                .iter()
                .map(decode_field_key)
                .collect::<Result<_, _>>()?,
        },

        t if t.starts_with("Update") => InterpOp::Update {
            shape: decode_field_shape(t),
            trgt: decode_target(v, "trgt")?,
            trgt_type: get_u32(v, "trgtType")?,
            arg: decode_arg_ref(get_obj(v, "arg")?)?,
            arg_type: get_u32(v, "argType")?,
            updates: get_obj(v, "updates")?
                .as_array()
                .ok_or_else(|| FatalReason::MissingMember("updates not an array".into()))?
                .iter()
                .map(|u| {
                    Ok(FieldUpdate {
                        field: decode_field_key(get_obj(u, "field")?)?,
                        value: decode_arg_ref(get_obj(u, "value")?)?,
                    })
                })
                .collect::<Result<_, FatalReason>>()?,
        },

        t if t.starts_with("Constructor") => InterpOp::Constructor {
            shape: decode_field_shape(t),
            trgt: decode_target(v, "trgt")?,
            oftype: get_u32(v, "oftype")?,
            args: decode_arg_list(v, "args")?,
            from_ephemeral: t.contains("FromEphemeralList"),
        },
        "EphemeralListExtendOp" => InterpOp::EphemeralListExtendOp {
            trgt: decode_target(v, "trgt")?,
            base: decode_arg_ref(get_obj(v, "base")?)?,
            base_type: get_u32(v, "baseType")?,
            extra: decode_arg_list(v, "extra")?,
        },

        "InvokeFixedFunction" | "InvokeVirtualFunction" => InterpOp::Invoke {
            trgt: decode_target(v, "trgt")?,
            invoke_id: get_u32(v, "invokeID")?,
            args: decode_arg_list(v, "args")?,
            sguard: decode_sguard(v),
            optmask_offset: v.get("optmaskOffset").and_then(|x| x.as_u64()).map(|x| x as u32),
            virtual_dispatch: tag == "InvokeVirtualFunction",
        },

        "Jump" => InterpOp::Jump { offset: get_i32(v, "off")? },
        "JumpCond" => InterpOp::JumpCond {
            arg: decode_arg_ref(get_obj(v, "arg")?)?,
            t_offset: get_i32(v, "t")?,
            f_offset: get_i32(v, "f")?,
        },
        "JumpNone" => InterpOp::JumpNone {
            arg: decode_arg_ref(get_obj(v, "arg")?)?,
            layout: get_u32(v, "layout")?,
            n_offset: get_i32(v, "n")?,
            s_offset: get_i32(v, "s")?,
        },

        "PrefixNot" => InterpOp::PrefixNot { dst: decode_target(v, "dst")?, arg: decode_arg_ref(get_obj(v, "arg")?)? },
        "AllTrue" => InterpOp::AllTrue { dst: decode_target(v, "dst")?, args: decode_arg_list(v, "args")? },
        "SomeTrue" => InterpOp::SomeTrue { dst: decode_target(v, "dst")?, args: decode_arg_list(v, "args")? },

        "KeyEqFast" | "KeyEqStatic" | "KeyEqVirtual" => InterpOp::KeyEq {
            dst: decode_target(v, "dst")?,
            mode: decode_key_mode(tag),
            lhs: decode_arg_ref(get_obj(v, "lhs")?)?,
            rhs: decode_arg_ref(get_obj(v, "rhs")?)?,
            lhs_type: get_u32(v, "lhsType")?,
            rhs_type: get_u32(v, "rhsType")?,
        },
        "KeyLessFast" | "KeyLessStatic" | "KeyLessVirtual" => InterpOp::KeyLess {
            dst: decode_target(v, "dst")?,
            mode: decode_key_mode(tag),
            lhs: decode_arg_ref(get_obj(v, "lhs")?)?,
            rhs: decode_arg_ref(get_obj(v, "rhs")?)?,
            lhs_type: get_u32(v, "lhsType")?,
            rhs_type: get_u32(v, "rhsType")?,
        },

        "IsNone" => InterpOp::IsNone { dst: decode_target(v, "dst")?, arg: decode_arg_ref(get_obj(v, "arg")?)? },
        "IsSome" => InterpOp::IsSome { dst: decode_target(v, "dst")?, arg: decode_arg_ref(get_obj(v, "arg")?)? },
        "IsNothing" => InterpOp::IsNothing { dst: decode_target(v, "dst")?, arg: decode_arg_ref(get_obj(v, "arg")?)? },
        "TypeTagIs" => {
            InterpOp::TypeTagIs { dst: decode_target(v, "dst")?, arg: decode_arg_ref(get_obj(v, "arg")?)?, of: get_u32(v, "of")? }
        }
        "TypeTagSubtypeOf" => InterpOp::TypeTagSubtypeOf {
            dst: decode_target(v, "dst")?,
            arg: decode_arg_ref(get_obj(v, "arg")?)?,
            of: get_u32(v, "of")?,
        },

        "ReturnAssign" => InterpOp::ReturnAssign { dst: decode_target(v, "dst")?, src: decode_arg_ref(get_obj(v, "src")?)? },
        "ReturnAssignOfCons" => InterpOp::ReturnAssignOfCons {
            dst: decode_target(v, "dst")?,
            args: decode_arg_list(v, "args")?,
            entity_type: get_u32(v, "entityType")?,
        },

        "CheckedNegate" | "CheckedAdd" | "CheckedSub" | "CheckedMul" | "CheckedDiv" => InterpOp::CheckedArith {
            dst: decode_target(v, "dst")?,
            op: match tag {
                "CheckedNegate" => CheckedArithOp::Negate,
                "CheckedAdd" => CheckedArithOp::Add,
                "CheckedSub" => CheckedArithOp::Sub,
                "CheckedMul" => CheckedArithOp::Mul,
                _ => CheckedArithOp::Div,
            },
            ttype: get_u32(v, "type")?,
            lhs: decode_arg_ref(get_obj(v, "lhs")?)?,
            rhs: v.get("rhs").map(decode_arg_ref).transpose()?,
        },
        "FloatLess" | "FloatLessEq" => InterpOp::FloatOrder {
            dst: decode_target(v, "dst")?,
            less_or_equal: tag == "FloatLessEq",
            lhs: decode_arg_ref(get_obj(v, "lhs")?)?,
            rhs: decode_arg_ref(get_obj(v, "rhs")?)?,
        },

        "Builtin" => InterpOp::Builtin {
            dst: decode_target(v, "dst")?,
            tag: get_str(v, "builtinTag")?.to_string(),
            args: decode_arg_list(v, "args")?,
        },

        other => return Err(FatalReason::UnknownOpcodeTag(other.to_string())),
    };

    Ok(Opcode { op, sinfo, ssrc })
}

fn decode_key_mode(tag: &str) -> KeyCompareMode {
    if tag.ends_with("Fast") {
        KeyCompareMode::Fast
    } else if tag.ends_with("Static") {
        KeyCompareMode::Static
    } else {
        KeyCompareMode::Virtual
    }
}
