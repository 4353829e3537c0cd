//! Expression evaluator (§4.4).
//!
//! Evaluates a takatori-style scalar expression tree over a [`VariableTable`]
//! (and, optionally, a host-variable table) producing a discriminated
//! [`EvalResult`]. Grounded on the teacher's typed-closure operator dispatch
//! pattern, generalized from "one stateless op over a partition" to "one scalar
//! expression over a variable table."
//!
//! `Coalesce` and `Case` are supplemented from the original implementation's
//! expression tree (SPEC_FULL.md §4.4) since the join-predicate scenarios in §8
//! (e.g. an `IS NULL` guard feeding a left-outer join) read naturally with them.

use crate::error::{ErrorCode, ErrorInfo};
use crate::record::FieldValue;
use crate::variable_table::{Variable, VariableTable};

/// Comparison operators for [`Expr::Compare`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Binary arithmetic/logical operators for [`Expr::Binary`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
}

/// Unary operators for [`Expr::Unary`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Target cast kind for [`Expr::Cast`]. Reuses the same closed field-type domain
/// as record metadata.
pub use crate::record::FieldType as CastType;

/// A scalar expression tree.
#[derive(Clone, Debug)]
pub enum Expr {
    Immediate(FieldValue),
    VariableRef(Variable),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Cast(CastType, Box<Expr>),
    IsNull(Box<Expr>),
    /// First non-null argument, or null if all are null/empty.
    Coalesce(Vec<Expr>),
    /// `when`/`then` pairs evaluated in order; `else_` used if none match.
    Case {
        when_then: Vec<(Expr, Expr)>,
        else_: Option<Box<Expr>>,
    },
}

/// Result of evaluating an [`Expr`]: a typed scalar, an explicit null, or an
/// error. Errors propagate upward and cancel the current operator invocation
/// (§4.4) — they are not caught mid-tree.
#[derive(Clone, Debug)]
pub enum EvalResult {
    Value(FieldValue),
    Null,
    Error(ErrorInfo),
}

impl EvalResult {
    pub fn is_error(&self) -> bool {
        matches!(self, EvalResult::Error(_))
    }

    pub fn is_truthy(&self) -> Option<bool> {
        match self {
            EvalResult::Value(FieldValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }
}

fn value_eval_error(msg: impl Into<String>) -> EvalResult {
    EvalResult::Error(ErrorInfo::new(ErrorCode::ValueEvaluationException, msg))
}

/// Evaluate `expr` against `vars` (and optionally `host_vars` for host-variable
/// references, modeled here as a second lookup table of the same shape).
pub fn evaluate(
    expr: &Expr,
    vars: &mut VariableTable,
    host_vars: Option<&mut VariableTable>,
) -> EvalResult {
    let mut host_vars = host_vars;
    eval_inner(expr, vars, &mut host_vars)
}

fn eval_inner(
    expr: &Expr,
    vars: &mut VariableTable,
    host_vars: &mut Option<&mut VariableTable>,
) -> EvalResult {
    match expr {
        Expr::Immediate(v) => {
            if matches!(v, FieldValue::Null) {
                EvalResult::Null
            } else {
                EvalResult::Value(v.clone())
            }
        }
        Expr::VariableRef(var) => {
            let v = if let Some(hv) = host_vars.as_deref_mut().filter(|hv| hv.try_info(*var).is_some()) {
                hv.get(*var)
            } else {
                vars.get(*var)
            };
            if matches!(v, FieldValue::Null) {
                EvalResult::Null
            } else {
                EvalResult::Value(v)
            }
        }
        Expr::Unary(op, inner) => {
            let v = eval_inner(inner, vars, host_vars);
            match v {
                EvalResult::Error(_) => v,
                EvalResult::Null => EvalResult::Null,
                EvalResult::Value(fv) => apply_unary(*op, fv),
            }
        }
        Expr::Binary(op, l, r) => {
            let lv = eval_inner(l, vars, host_vars);
            if lv.is_error() {
                return lv;
            }
            let rv = eval_inner(r, vars, host_vars);
            if rv.is_error() {
                return rv;
            }
            match (lv, rv) {
                (EvalResult::Null, _) | (_, EvalResult::Null) => EvalResult::Null,
                (EvalResult::Value(a), EvalResult::Value(b)) => apply_binary(*op, a, b),
                _ => unreachable!(),
            }
        }
        Expr::Compare(op, l, r) => {
            let lv = eval_inner(l, vars, host_vars);
            if lv.is_error() {
                return lv;
            }
            let rv = eval_inner(r, vars, host_vars);
            if rv.is_error() {
                return rv;
            }
            match (lv, rv) {
                (EvalResult::Null, _) | (_, EvalResult::Null) => EvalResult::Null,
                (EvalResult::Value(a), EvalResult::Value(b)) => apply_compare(*op, &a, &b),
                _ => unreachable!(),
            }
        }
        Expr::Cast(target, inner) => {
            let v = eval_inner(inner, vars, host_vars);
            match v {
                EvalResult::Error(_) | EvalResult::Null => v,
                EvalResult::Value(fv) => apply_cast(*target, fv),
            }
        }
        Expr::IsNull(inner) => {
            let v = eval_inner(inner, vars, host_vars);
            match v {
                EvalResult::Error(_) => v,
                EvalResult::Null => EvalResult::Value(FieldValue::Boolean(true)),
                EvalResult::Value(_) => EvalResult::Value(FieldValue::Boolean(false)),
            }
        }
        Expr::Coalesce(args) => {
            for a in args {
                let v = eval_inner(a, vars, host_vars);
                match v {
                    EvalResult::Error(_) => return v,
                    EvalResult::Value(_) => return v,
                    EvalResult::Null => continue,
                }
            }
            EvalResult::Null
        }
        Expr::Case { when_then, else_ } => {
            for (when, then) in when_then {
                let w = eval_inner(when, vars, host_vars);
                match w {
                    EvalResult::Error(_) => return w,
                    EvalResult::Value(FieldValue::Boolean(true)) => return eval_inner(then, vars, host_vars),
                    _ => continue,
                }
            }
            match else_ {
                Some(e) => eval_inner(e, vars, host_vars),
                None => EvalResult::Null,
            }
        }
    }
}

fn apply_unary(op: UnaryOp, v: FieldValue) -> EvalResult {
    match (op, v) {
        (UnaryOp::Neg, FieldValue::Int8(n)) => EvalResult::Value(FieldValue::Int8(-n)),
        (UnaryOp::Neg, FieldValue::Int4(n)) => EvalResult::Value(FieldValue::Int4(-n)),
        (UnaryOp::Neg, FieldValue::Float8(n)) => EvalResult::Value(FieldValue::Float8(-n)),
        (UnaryOp::Not, FieldValue::Boolean(b)) => EvalResult::Value(FieldValue::Boolean(!b)),
        (op, v) => value_eval_error(format!("unary {:?} not applicable to {:?}", op, v)),
    }
}

fn apply_binary(op: BinaryOp, a: FieldValue, b: FieldValue) -> EvalResult {
    use BinaryOp::*;
    use FieldValue::*;
    match (op, a, b) {
        (And, Boolean(a), Boolean(b)) => EvalResult::Value(Boolean(a && b)),
        (Or, Boolean(a), Boolean(b)) => EvalResult::Value(Boolean(a || b)),
        (Add, Int8(a), Int8(b)) => a.checked_add(b).map(Int8).map(EvalResult::Value).unwrap_or_else(|| {
            value_eval_error("int8 overflow in add")
        }),
        (Sub, Int8(a), Int8(b)) => a.checked_sub(b).map(Int8).map(EvalResult::Value).unwrap_or_else(|| {
            value_eval_error("int8 overflow in sub")
        }),
        (Mul, Int8(a), Int8(b)) => a.checked_mul(b).map(Int8).map(EvalResult::Value).unwrap_or_else(|| {
            value_eval_error("int8 overflow in mul")
        }),
        (Div, Int8(a), Int8(b)) => {
            if b == 0 {
                value_eval_error("division by zero")
            } else {
                EvalResult::Value(Int8(a / b))
            }
        }
        (Add, Float8(a), Float8(b)) => EvalResult::Value(Float8(a + b)),
        (Sub, Float8(a), Float8(b)) => EvalResult::Value(Float8(a - b)),
        (Mul, Float8(a), Float8(b)) => EvalResult::Value(Float8(a * b)),
        (Div, Float8(a), Float8(b)) => EvalResult::Value(Float8(a / b)),
        (op, a, b) => value_eval_error(format!("binary {:?} not applicable to ({:?}, {:?})", op, a, b)),
    }
}

fn apply_compare(op: CompareOp, a: &FieldValue, b: &FieldValue) -> EvalResult {
    use std::cmp::Ordering::*;
    let ord = match (a, b) {
        (FieldValue::Int8(a), FieldValue::Int8(b)) => a.cmp(b),
        (FieldValue::Int4(a), FieldValue::Int4(b)) => a.cmp(b),
        (FieldValue::Float8(a), FieldValue::Float8(b)) => a.cmp(b),
        (FieldValue::Float4(a), FieldValue::Float4(b)) => a.cmp(b),
        (FieldValue::Character(a), FieldValue::Character(b)) => a.cmp(b),
        (FieldValue::Boolean(a), FieldValue::Boolean(b)) => a.cmp(b),
        _ => return value_eval_error(format!("incomparable operands ({:?}, {:?})", a, b)),
    };
    let result = match op {
        CompareOp::Eq => ord == Equal,
        CompareOp::Ne => ord != Equal,
        CompareOp::Lt => ord == Less,
        CompareOp::Le => ord != Greater,
        CompareOp::Gt => ord == Greater,
        CompareOp::Ge => ord != Less,
    };
    EvalResult::Value(FieldValue::Boolean(result))
}

fn apply_cast(target: CastType, v: FieldValue) -> EvalResult {
    use crate::record::FieldType::*;
    match (target, v) {
        (Int8, FieldValue::Int4(n)) => EvalResult::Value(FieldValue::Int8(n as i64)),
        (Int4, FieldValue::Int8(n)) => match i32::try_from(n) {
            Ok(v) => EvalResult::Value(FieldValue::Int4(v)),
            Err(_) => value_eval_error("int8 to int4 cast overflow"),
        },
        (Float8, FieldValue::Int8(n)) => EvalResult::Value(FieldValue::Float8(ordered_float::OrderedFloat(n as f64))),
        (t, v) if std::mem::discriminant(&t) == field_type_discriminant(&v) => EvalResult::Value(v),
        (t, v) => value_eval_error(format!("unsupported cast to {:?} from {:?}", t, v)),
    }
}

fn field_type_discriminant(v: &FieldValue) -> std::mem::Discriminant<crate::record::FieldType> {
    use crate::record::FieldType;
    let placeholder = match v {
        FieldValue::Boolean(_) => FieldType::Boolean,
        FieldValue::Int4(_) => FieldType::Int4,
        FieldValue::Int8(_) => FieldType::Int8,
        FieldValue::Float4(_) => FieldType::Float4,
        FieldValue::Float8(_) => FieldType::Float8,
        _ => FieldType::Unknown,
    };
    std::mem::discriminant(&placeholder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldType;

    fn vars_with(i8: i64) -> VariableTable {
        let mut vt = VariableTable::with_explicit_slots(vec![(Variable(0), FieldType::Int8)]);
        vt.set(Variable(0), FieldValue::Int8(i8));
        vt
    }

    #[test]
    fn compare_and_filter_predicate() {
        let mut vt = vars_with(200);
        let expr = Expr::Compare(
            CompareOp::Gt,
            Box::new(Expr::VariableRef(Variable(0))),
            Box::new(Expr::Immediate(FieldValue::Int8(150))),
        );
        match evaluate(&expr, &mut vt, None) {
            EvalResult::Value(FieldValue::Boolean(true)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn divide_by_zero_is_an_error() {
        let mut vt = vars_with(1);
        let expr = Expr::Binary(
            BinaryOp::Div,
            Box::new(Expr::VariableRef(Variable(0))),
            Box::new(Expr::Immediate(FieldValue::Int8(0))),
        );
        assert!(evaluate(&expr, &mut vt, None).is_error());
    }

    #[test]
    fn coalesce_skips_nulls() {
        let mut vt = vars_with(0);
        let expr = Expr::Coalesce(vec![
            Expr::Immediate(FieldValue::Null),
            Expr::Immediate(FieldValue::Int8(9)),
        ]);
        match evaluate(&expr, &mut vt, None) {
            EvalResult::Value(FieldValue::Int8(9)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn is_null_on_null_literal() {
        let mut vt = vars_with(0);
        let expr = Expr::IsNull(Box::new(Expr::Immediate(FieldValue::Null)));
        match evaluate(&expr, &mut vt, None) {
            EvalResult::Value(FieldValue::Boolean(true)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
