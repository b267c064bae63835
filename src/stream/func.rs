//! Pushdown function expressions.
//!
//! Stream transformations and terminals ship their functions inside the
//! range read that carries them to the stores, so the functions must be
//! closed serializable values. [`FuncExpr`] is the minimal form the
//! operator set needs: argument references, constants, field projection,
//! addition, and comparisons. The full query-language evaluator sits a
//! layer above and lowers to this form.
//!
//! Expressions are evaluated against a positional argument list:
//! elementwise functions are called with one argument (the current row),
//! reduction functions with two (accumulator, element).

use crate::core::error::{TesseraError, TesseraResult};
use crate::kv::datum::Datum;
use crate::protocol::cache::TemporaryCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A closed, serializable function over datums.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FuncExpr {
    /// The i-th argument of the call.
    Arg(u8),
    /// A constant value.
    Const(Datum),
    /// Project a field out of an object.
    Field(Box<FuncExpr>, String),
    /// Add numbers, concatenate strings or arrays.
    Add(Box<FuncExpr>, Box<FuncExpr>),
    /// Structural equality.
    Eq(Box<FuncExpr>, Box<FuncExpr>),
    /// Strict less-than in the datum total order.
    Lt(Box<FuncExpr>, Box<FuncExpr>),
}

impl FuncExpr {
    /// The current row (first argument).
    pub fn row() -> Self {
        Self::Arg(0)
    }

    /// Project `name` out of the current row.
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(Box::new(Self::row()), name.into())
    }

    /// A constant.
    pub fn constant(value: impl Into<Datum>) -> Self {
        Self::Const(value.into())
    }

    /// `a + b`.
    pub fn add(a: FuncExpr, b: FuncExpr) -> Self {
        Self::Add(Box::new(a), Box::new(b))
    }

    /// `a == b`.
    pub fn eq(a: FuncExpr, b: FuncExpr) -> Self {
        Self::Eq(Box::new(a), Box::new(b))
    }

    /// `a < b`.
    pub fn lt(a: FuncExpr, b: FuncExpr) -> Self {
        Self::Lt(Box::new(a), Box::new(b))
    }

    /// The two-argument accumulator `acc + x`, the usual reduction
    /// function.
    pub fn fold_add() -> Self {
        Self::Add(Box::new(Self::Arg(0)), Box::new(Self::Arg(1)))
    }

    /// Evaluate against a positional argument list.
    pub fn eval(&self, args: &[Datum]) -> TesseraResult<Datum> {
        match self {
            Self::Arg(i) => args.get(*i as usize).cloned().ok_or_else(|| {
                TesseraError::invariant(format!(
                    "function referenced argument {} of {}",
                    i,
                    args.len()
                ))
            }),
            Self::Const(value) => Ok(value.clone()),
            Self::Field(base, name) => {
                let base = base.eval(args)?;
                match &base {
                    Datum::Obj(_) => base.get(name).cloned().ok_or_else(|| {
                        TesseraError::user_query(format!("No attribute `{}` in object.", name))
                    }),
                    other => Err(TesseraError::user_query(format!(
                        "Cannot get attribute `{}` of {}.",
                        name,
                        other.type_name()
                    ))),
                }
            }
            Self::Add(a, b) => {
                let a = a.eval(args)?;
                let b = b.eval(args)?;
                match (&a, &b) {
                    (Datum::Num(x), Datum::Num(y)) => Ok(Datum::Num(x + y)),
                    (Datum::Str(x), Datum::Str(y)) => Ok(Datum::Str(format!("{}{}", x, y))),
                    (Datum::Arr(x), Datum::Arr(y)) => {
                        let mut out = x.clone();
                        out.extend(y.iter().cloned());
                        Ok(Datum::Arr(out))
                    }
                    (x, y) => Err(TesseraError::user_query(format!(
                        "Cannot add {} to {}.",
                        x.type_name(),
                        y.type_name()
                    ))),
                }
            }
            Self::Eq(a, b) => Ok(Datum::Bool(a.eval(args)? == b.eval(args)?)),
            Self::Lt(a, b) => Ok(Datum::Bool(a.eval(args)? < b.eval(args)?)),
        }
    }

    /// Call as an elementwise function.
    pub fn call1(&self, row: &Datum) -> TesseraResult<Datum> {
        self.eval(std::slice::from_ref(row))
    }

    /// Call as a reduction function.
    pub fn call2(&self, acc: &Datum, elem: &Datum) -> TesseraResult<Datum> {
        self.eval(&[acc.clone(), elem.clone()])
    }

    fn references_args(&self) -> bool {
        match self {
            Self::Arg(_) => true,
            Self::Const(_) => false,
            Self::Field(base, _) => base.references_args(),
            Self::Add(a, b) | Self::Eq(a, b) | Self::Lt(a, b) => {
                a.references_args() || b.references_args()
            }
        }
    }

    /// Constant-fold closed subtrees. Subtrees whose evaluation fails are
    /// left intact so the error surfaces at call time.
    pub fn folded(&self) -> FuncExpr {
        if !self.references_args() && !matches!(self, Self::Const(_)) {
            if let Ok(value) = self.eval(&[]) {
                return Self::Const(value);
            }
        }
        match self {
            Self::Arg(_) | Self::Const(_) => self.clone(),
            Self::Field(base, name) => Self::Field(Box::new(base.folded()), name.clone()),
            Self::Add(a, b) => Self::Add(Box::new(a.folded()), Box::new(b.folded())),
            Self::Eq(a, b) => Self::Eq(Box::new(a.folded()), Box::new(b.folded())),
            Self::Lt(a, b) => Self::Lt(Box::new(a.folded()), Box::new(b.folded())),
        }
    }

    /// The compiled (constant-folded) form of this function, pooled in
    /// the temporary cache keyed by structural identity. The cache is
    /// semantically inert: a fresh cache and a long-lived shared one
    /// produce the same compiled form.
    pub fn compile(&self, cache: &TemporaryCache) -> Arc<FuncExpr> {
        let pool = cache.get_or_init(FuncPool::default);
        pool.get_or_compile(self)
    }
}

/// Process-wide pool of compiled functions, stored in the temporary
/// cache.
#[derive(Default)]
pub struct FuncPool {
    compiled: Mutex<HashMap<FuncExpr, Arc<FuncExpr>>>,
}

impl FuncPool {
    fn get_or_compile(&self, expr: &FuncExpr) -> Arc<FuncExpr> {
        let mut compiled = self.compiled.lock();
        if let Some(hit) = compiled.get(expr) {
            return Arc::clone(hit);
        }
        let built = Arc::new(expr.folded());
        compiled.insert(expr.clone(), Arc::clone(&built));
        built
    }

    /// Number of compiled functions currently pooled.
    pub fn len(&self) -> usize {
        self.compiled.lock().len()
    }

    /// Check whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.compiled.lock().is_empty()
    }
}
