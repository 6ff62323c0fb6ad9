//! Flattening a [`Value`] into a [`ControlState`](Value::ControlState):
//! the dotted-path `name -> term` map an entry point's evaluation
//! ultimately produces (§3 "Flattening to a ControlState", §6 ControlState
//! output contract).

use p4z3_ast::Type;
use p4z3_smt::{Term, TermContext};

use super::value::Value;

/// Recursively walks `value`, naming every scalar leaf with its dotted
/// path from `prefix`. A header's validity gate is computed once per
/// header instance and applied to every field beneath it, not
/// recomputed per leaf.
pub fn flatten(prefix: &str, value: &Value, ctx: &TermContext, out: &mut Vec<(String, Term)>) {
    flatten_typed(prefix, value, None, ctx, out)
}

/// `declared` is this node's own static type, when known — it lets an
/// `IntLiteral` leaf be cast to its declared bit width before being
/// pushed, since the `ControlState` entry's sort must match the static
/// field type rather than whatever sort the value happened to compute in.
fn flatten_typed(prefix: &str, value: &Value, declared: Option<&Type>, ctx: &TermContext, out: &mut Vec<(String, Term)>) {
    match value {
        Value::Bitvector(b) => out.push((prefix.to_string(), b.term.clone())),
        Value::IntLiteral(i) => out.push((prefix.to_string(), cast_int_literal(i, declared, ctx))),
        Value::Struct(s) => {
            for (name, field) in &s.fields {
                flatten_typed(&format!("{prefix}.{name}"), field, s.field_types.get(name), ctx, out);
            }
        }
        Value::Header(h) => {
            for (name, field) in &h.fields {
                let field_ty = h.field_types.get(name);
                let gated = gate_field(field, &h.valid, field_ty, ctx);
                flatten_typed(&format!("{prefix}.{name}"), &gated, field_ty, ctx, out);
            }
        }
        Value::Enum(e) | Value::ErrorSet(e) => out.push((prefix.to_string(), e.term.clone())),
        Value::List(l) => {
            for (index, element) in l.elements.iter().enumerate() {
                flatten_typed(&format!("{prefix}[{index}]"), element, None, ctx, out);
            }
        }
        Value::Declaration(_) | Value::Table(_) | Value::Extern(_) | Value::FunctionHandle(_) | Value::Void => {}
        Value::ControlState(entries) => out.extend(entries.iter().cloned()),
    }
}

fn cast_int_literal(i: &super::value::IntLiteral, declared: Option<&Type>, ctx: &TermContext) -> Term {
    match declared {
        Some(Type::Bits { width, .. }) => ctx.int_to_bv(i.term.clone(), *width),
        _ => i.term.clone(),
    }
}

/// Wraps a (possibly aggregate) field value in `ite(valid, field, undef)`
/// at every scalar leaf, without re-deriving `valid` per leaf. `declared`
/// is threaded through the same way as in `flatten_typed`, so an
/// `IntLiteral` field is cast to its declared width before gating.
fn gate_field(value: &Value, valid: &Term, declared: Option<&Type>, ctx: &TermContext) -> Value {
    match value {
        Value::Bitvector(b) => {
            let undef = ctx.fresh("undef", b.term.sort());
            let gated = ctx.ite(valid.clone(), b.term.clone(), undef).unwrap_or_else(|_| b.term.clone());
            Value::Bitvector(super::value::Bitvector { term: gated, signed: b.signed })
        }
        Value::IntLiteral(i) => {
            let term = cast_int_literal(i, declared, ctx);
            let undef = ctx.fresh("undef", term.sort());
            let gated = ctx.ite(valid.clone(), term.clone(), undef).unwrap_or(term);
            Value::Bitvector(super::value::Bitvector { term: gated, signed: false })
        }
        Value::Struct(s) => {
            let fields = s.fields.iter().map(|(n, v)| (n.clone(), gate_field(v, valid, s.field_types.get(n), ctx))).collect();
            Value::Struct(super::value::StructValue { fields, ..s.clone() })
        }
        Value::Header(h) => {
            let fields = h.fields.iter().map(|(n, v)| (n.clone(), gate_field(v, valid, h.field_types.get(n), ctx))).collect();
            let combined = ctx.bin(p4z3_smt::BinOp::And, valid.clone(), h.valid.clone());
            Value::Header(super::value::HeaderValue { fields, valid: combined, ..h.clone() })
        }
        other => other.clone(),
    }
}

/// Builds a [`Value::ControlState`] from the flattened entries, giving
/// callers a single value that carries an entry point's full observable
/// output (§6 ControlState output contract).
pub fn to_control_state(prefix: &str, value: &Value, ctx: &TermContext) -> Value {
    let mut entries = Vec::new();
    flatten(prefix, value, ctx, &mut entries);
    Value::ControlState(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::value::{Bitvector, HeaderValue, StructValue};
    use indexmap::IndexMap;
    use p4z3_ast::DeclId;

    #[test]
    fn flatten_struct_produces_dotted_paths() {
        let ctx = TermContext::new();
        let mut fields = IndexMap::new();
        fields.insert("a".to_string(), Value::Bitvector(Bitvector { term: ctx.bv_val(8u32, 1u32), signed: false }));
        let s = Value::Struct(StructValue { decl: DeclId(0), type_name: "S".into(), member_id: 0, width: 8, fields, field_types: IndexMap::new() });
        let mut out = Vec::new();
        flatten("hdr", &s, &ctx, &mut out);
        assert_eq!(out[0].0, "hdr.a");
    }

    #[test]
    fn flatten_invalid_header_gates_field_with_valid() {
        let ctx = TermContext::new();
        let mut fields = IndexMap::new();
        fields.insert("x".to_string(), Value::Bitvector(Bitvector { term: ctx.bv_val(8u32, 5u32), signed: false }));
        let h = Value::Header(HeaderValue {
            decl: DeclId(0),
            type_name: "H".into(),
            member_id: 0,
            width: 8,
            fields,
            field_types: IndexMap::new(),
            valid: ctx.bool_val(false),
        });
        let mut out = Vec::new();
        flatten("h", &h, &ctx, &mut out);
        let simplified = ctx.simplify(&out[0].1);
        assert_ne!(simplified, ctx.bv_val(8u32, 5u32));
    }

    #[test]
    fn flatten_invalid_header_gates_int_literal_field_after_casting_to_declared_width() {
        use crate::interpreter::value::IntLiteral;
        use p4z3_ast::Type;

        let ctx = TermContext::new();
        let mut fields = IndexMap::new();
        fields.insert("x".to_string(), Value::IntLiteral(IntLiteral { term: ctx.int_val_from_decimal("5").unwrap() }));
        let mut field_types = IndexMap::new();
        field_types.insert("x".to_string(), Type::Bits { width: 8, signed: false });
        let h = Value::Header(HeaderValue {
            decl: DeclId(0),
            type_name: "H".into(),
            member_id: 0,
            width: 8,
            fields,
            field_types,
            valid: ctx.bool_val(false),
        });
        let mut out = Vec::new();
        flatten("h", &h, &ctx, &mut out);
        assert_eq!(out[0].1.sort(), p4z3_smt::Sort::Bv(8));
        let simplified = ctx.simplify(&out[0].1);
        assert_ne!(simplified, ctx.bv_val(8u32, 5u32));
    }
}
