//   Copyright (c) 2024-2026 Anton Kundenko <singaraiona@gmail.com>
//   All rights reserved.
//
//   Permission is hereby granted, free of charge, to any person obtaining a copy
//   of this software and associated documentation files (the "Software"), to deal
//   in the Software without restriction, including without limitation the rights
//   to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
//   copies of the Software, and to permit persons to whom the Software is
//   furnished to do so, subject to the following conditions:
//
//   The above copyright notice and this permission notice shall be included in all
//   copies or substantial portions of the Software.
//
//   THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
//   IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//   FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//   AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//   LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//   OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
//   SOFTWARE.

//! Plan capture and graph emission.
//!
//! A query runs in two phases. Capture happens on the caller's thread: the
//! chainable [`Query`] builder records an ordered list of [`PlanStep`]s and
//! validates every column reference against the table's schema. Emission
//! happens on the worker thread: the captured plan is walked step by step,
//! graph nodes are emitted with the engine's builders, and the optimized
//! graph is executed.

use std::collections::HashSet;
use std::ffi::CString;
use std::ptr;

use crate::error::{Error, Result};
use crate::expr::{AggFunc, BinaryOp, Expr, Literal, UnaryOp};
use crate::ffi;
use crate::table::Table;
use crate::value::RawVal;

/// One stage of a captured plan. Step order defines pipeline order.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    /// Keep rows matching the predicate.
    Filter(Expr),
    /// Group by key columns and reduce each aggregate expression per group.
    Group { keys: Vec<String>, aggs: Vec<Expr> },
    /// Order rows by the given columns; `descs` is position-matched.
    Sort { cols: Vec<String>, descs: Vec<bool> },
    /// Keep the first `n` rows.
    Head(i64),
}

// ---------------------------------------------------------------------------
// Capture-phase validation (caller thread)
// ---------------------------------------------------------------------------

fn check_column(name: &str, columns: Option<&HashSet<String>>) -> Result<()> {
    match columns {
        Some(cols) if !cols.contains(name) => Err(Error::UnknownColumn(name.to_owned())),
        _ => Ok(()),
    }
}

fn check_expr(expr: &Expr, columns: Option<&HashSet<String>>) -> Result<()> {
    match expr {
        Expr::Column(name) => check_column(name, columns),
        Expr::Literal(Literal::Str(s)) => {
            if s.contains('\0') {
                Err(Error::InvalidInput("string literal contains NUL".into()))
            } else {
                Ok(())
            }
        }
        Expr::Literal(_) => Ok(()),
        Expr::Binary { left, right, .. } => {
            check_expr(left, columns)?;
            check_expr(right, columns)
        }
        Expr::Unary { arg, .. } | Expr::Agg { arg, .. } => check_expr(arg, columns),
        Expr::Alias { name, arg } => {
            if name.contains('\0') {
                return Err(Error::InvalidInput("alias name contains NUL".into()));
            }
            check_expr(arg, columns)
        }
    }
}

/// Validate a captured plan against the table schema before any work is
/// submitted: unknown columns and malformed step shapes are caller-thread
/// errors, never engine errors.
///
/// Column-existence checks stop at the first group step — grouping changes
/// the pipeline schema, and the group output's column names are decided by
/// the engine. Shape checks still apply everywhere.
pub(crate) fn validate_plan(plan: &[PlanStep], columns: &HashSet<String>) -> Result<()> {
    let mut schema = Some(columns);
    for step in plan {
        match step {
            PlanStep::Filter(expr) => check_expr(expr, schema)?,
            PlanStep::Group { keys, aggs } => {
                if keys.len() > u8::MAX as usize || aggs.len() > u8::MAX as usize {
                    return Err(Error::InvalidInput(
                        "too many group keys or aggregates".into(),
                    ));
                }
                for key in keys {
                    check_column(key, schema)?;
                }
                for expr in aggs {
                    check_expr(expr, schema)?;
                }
                schema = None;
            }
            PlanStep::Sort { cols, descs } => {
                if cols.len() != descs.len() {
                    return Err(Error::InvalidInput(
                        "sort columns and descending flags differ in length".into(),
                    ));
                }
                if cols.len() > u8::MAX as usize {
                    return Err(Error::InvalidInput("too many sort columns".into()));
                }
                for c in cols {
                    check_column(c, schema)?;
                }
            }
            PlanStep::Head(_) => {}
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Graph emission (worker thread)
// ---------------------------------------------------------------------------

/// Emission failures carry the sentinel to propagate as the plan result.
type Emit<T> = std::result::Result<T, *mut ffi::td_t>;

fn op(node: *mut ffi::td_op_t) -> Emit<*mut ffi::td_op_t> {
    if node.is_null() {
        // SAFETY: encoding an error code as a sentinel pointer.
        Err(unsafe { ffi::td_err_ptr(ffi::td_err_t::TD_ERR_OOM) })
    } else {
        Ok(node)
    }
}

unsafe fn scan_named(g: *mut ffi::td_graph_t, name: &str) -> Emit<*mut ffi::td_op_t> {
    let c_name = match CString::new(name) {
        Ok(c) => c,
        Err(_) => return Err(unsafe { ffi::td_err_ptr(ffi::td_err_t::TD_ERR_DOMAIN) }),
    };
    op(unsafe { ffi::td_scan(g, c_name.as_ptr()) })
}

/// Emit graph nodes for one expression tree.
///
/// # Safety
/// Must run on the worker thread; `g` must be a live graph.
unsafe fn emit_expr(g: *mut ffi::td_graph_t, node: &Expr) -> Emit<*mut ffi::td_op_t> {
    match node {
        Expr::Column(name) => unsafe { scan_named(g, name) },
        Expr::Literal(lit) => match lit {
            Literal::Int(v) => op(unsafe { ffi::td_const_i64(g, *v) }),
            Literal::Float(v) => op(unsafe { ffi::td_const_f64(g, *v) }),
            Literal::Bool(v) => op(unsafe { ffi::td_const_bool(g, *v) }),
            Literal::Str(s) => {
                let c_val = match CString::new(s.as_str()) {
                    Ok(c) => c,
                    Err(_) => return Err(unsafe { ffi::td_err_ptr(ffi::td_err_t::TD_ERR_DOMAIN) }),
                };
                op(unsafe { ffi::td_const_str(g, c_val.as_ptr()) })
            }
        },
        Expr::Binary { op: bin, left, right } => {
            let l = unsafe { emit_expr(g, left) }?;
            let r = unsafe { emit_expr(g, right) }?;
            let raw = unsafe {
                match bin {
                    BinaryOp::Add => ffi::td_add(g, l, r),
                    BinaryOp::Sub => ffi::td_sub(g, l, r),
                    BinaryOp::Mul => ffi::td_mul(g, l, r),
                    BinaryOp::Div => ffi::td_div(g, l, r),
                    BinaryOp::Mod => ffi::td_mod(g, l, r),
                    BinaryOp::Eq => ffi::td_eq(g, l, r),
                    BinaryOp::Ne => ffi::td_ne(g, l, r),
                    BinaryOp::Lt => ffi::td_lt(g, l, r),
                    BinaryOp::Le => ffi::td_le(g, l, r),
                    BinaryOp::Gt => ffi::td_gt(g, l, r),
                    BinaryOp::Ge => ffi::td_ge(g, l, r),
                    BinaryOp::And => ffi::td_and(g, l, r),
                    BinaryOp::Or => ffi::td_or(g, l, r),
                }
            };
            op(raw)
        }
        Expr::Unary { op: un, arg } => {
            let a = unsafe { emit_expr(g, arg) }?;
            let raw = unsafe {
                match un {
                    UnaryOp::Neg => ffi::td_neg(g, a),
                    UnaryOp::Abs => ffi::td_abs(g, a),
                    UnaryOp::Not => ffi::td_not(g, a),
                    UnaryOp::Sqrt => ffi::td_sqrt_op(g, a),
                    UnaryOp::Log => ffi::td_log_op(g, a),
                    UnaryOp::Exp => ffi::td_exp_op(g, a),
                    UnaryOp::Ceil => ffi::td_ceil_op(g, a),
                    UnaryOp::Floor => ffi::td_floor_op(g, a),
                    UnaryOp::IsNull => ffi::td_isnull(g, a),
                }
            };
            op(raw)
        }
        Expr::Agg { func, arg } => {
            let a = unsafe { emit_expr(g, arg) }?;
            let raw = unsafe {
                match func {
                    AggFunc::Sum => ffi::td_sum(g, a),
                    AggFunc::Prod => ffi::td_prod(g, a),
                    AggFunc::Min => ffi::td_min_op(g, a),
                    AggFunc::Max => ffi::td_max_op(g, a),
                    AggFunc::Count => ffi::td_count(g, a),
                    AggFunc::Avg => ffi::td_avg(g, a),
                    AggFunc::First => ffi::td_first(g, a),
                    AggFunc::Last => ffi::td_last(g, a),
                }
            };
            op(raw)
        }
        Expr::Alias { name, arg } => {
            let a = unsafe { emit_expr(g, arg) }?;
            let c_name = match CString::new(name.as_str()) {
                Ok(c) => c,
                Err(_) => return Err(unsafe { ffi::td_err_ptr(ffi::td_err_t::TD_ERR_DOMAIN) }),
            };
            op(unsafe { ffi::td_alias(g, a, c_name.as_ptr()) })
        }
    }
}

/// Decompose one entry of a group step's aggregate list into an
/// (opcode, input-node) pair for `td_group`.
///
/// One outer alias wrapper is unwrapped; the alias name itself is not
/// applied inside grouping. A non-aggregate entry (bare column or computed
/// expression) defaults to first-value per group so it can appear in group
/// output without being an error.
///
/// # Safety
/// Must run on the worker thread; `g` must be a live graph.
unsafe fn decompose_agg(g: *mut ffi::td_graph_t, expr: &Expr) -> Emit<(u16, *mut ffi::td_op_t)> {
    let inner = match expr {
        Expr::Alias { arg, .. } => arg.as_ref(),
        other => other,
    };

    if let Expr::Agg { func, arg } = inner {
        let input = unsafe { emit_expr(g, arg) }?;
        return Ok((func.opcode(), input));
    }

    let target = expr.child().unwrap_or(expr);
    let input = unsafe { emit_expr(g, target) }?;
    Ok((ffi::OP_FIRST, input))
}

unsafe fn emit_plan(
    g: *mut ffi::td_graph_t,
    tbl: *mut ffi::td_t,
    plan: &[PlanStep],
    pinned: &mut Vec<Box<dyn std::any::Any>>,
) -> Emit<*mut ffi::td_op_t> {
    let mut current: *mut ffi::td_op_t = ptr::null_mut();
    let mut pending: *mut ffi::td_op_t = ptr::null_mut();

    for step in plan {
        match step {
            PlanStep::Filter(expr) => {
                let pred = unsafe { emit_expr(g, expr) }?;
                if current.is_null() {
                    // Leading filters accumulate conjunctively until a
                    // structural step consumes them.
                    pending = if pending.is_null() {
                        pred
                    } else {
                        op(unsafe { ffi::td_and(g, pending, pred) })?
                    };
                } else {
                    current = op(unsafe { ffi::td_filter(g, current, pred) })?;
                }
            }
            PlanStep::Group { keys, aggs } => {
                // Materialize the accumulated predicate into a selection
                // mask active for the rest of this graph.
                if !pending.is_null() {
                    let mask = unsafe { ffi::td_execute(g, pending) };
                    if ffi::td_is_err(mask) {
                        return Err(mask);
                    }
                    unsafe {
                        ffi::td_retain(mask);
                        (*g).selection = mask;
                    }
                    pending = ptr::null_mut();
                }

                let mut key_nodes = Vec::with_capacity(keys.len());
                for key in keys {
                    key_nodes.push(unsafe { scan_named(g, key) }?);
                }

                let mut agg_ops = Vec::with_capacity(aggs.len());
                let mut agg_ins = Vec::with_capacity(aggs.len());
                for expr in aggs {
                    let (opcode, input) = unsafe { decompose_agg(g, expr) }?;
                    agg_ops.push(opcode);
                    agg_ins.push(input);
                }

                current = op(unsafe {
                    ffi::td_group(
                        g,
                        key_nodes.as_mut_ptr(),
                        keys.len() as u8,
                        agg_ops.as_mut_ptr(),
                        agg_ins.as_mut_ptr(),
                        aggs.len() as u8,
                    )
                })?;
                // td_group stores the array pointers; keep them alive until
                // the graph has executed.
                pinned.push(Box::new(key_nodes));
                pinned.push(Box::new(agg_ops));
                pinned.push(Box::new(agg_ins));
            }
            PlanStep::Sort { cols, descs } => {
                let mut node = if current.is_null() {
                    op(unsafe { ffi::td_const_table(g, tbl) })?
                } else {
                    current
                };
                if !pending.is_null() {
                    node = op(unsafe { ffi::td_filter(g, node, pending) })?;
                    pending = ptr::null_mut();
                }

                let mut key_nodes = Vec::with_capacity(cols.len());
                for c in cols {
                    key_nodes.push(unsafe { scan_named(g, c) }?);
                }
                let mut desc_flags: Vec<u8> = descs.iter().map(|&d| d as u8).collect();

                current = op(unsafe {
                    ffi::td_sort_op(
                        g,
                        node,
                        key_nodes.as_mut_ptr(),
                        desc_flags.as_mut_ptr(),
                        ptr::null_mut(),
                        cols.len() as u8,
                    )
                })?;
                pinned.push(Box::new(key_nodes));
                pinned.push(Box::new(desc_flags));
            }
            PlanStep::Head(n) => {
                if current.is_null() {
                    current = op(unsafe { ffi::td_const_table(g, tbl) })?;
                }
                if !pending.is_null() {
                    current = op(unsafe { ffi::td_filter(g, current, pending) })?;
                    pending = ptr::null_mut();
                }
                current = op(unsafe { ffi::td_head(g, current, *n) })?;
            }
        }
    }

    // A plan with no structural step reads the table itself.
    if current.is_null() {
        current = op(unsafe { ffi::td_const_table(g, tbl) })?;
    }
    if !pending.is_null() {
        current = op(unsafe { ffi::td_filter(g, current, pending) })?;
    }
    Ok(current)
}

/// Emit, optimize, and execute a captured plan against `tbl`.
///
/// Returns the engine result, which may be an error sentinel. The graph
/// context is released on every path.
///
/// # Safety
/// Must run on the worker thread; `tbl` must be a valid table value kept
/// alive for the duration of the call.
pub(crate) unsafe fn execute_plan(tbl: *mut ffi::td_t, plan: &[PlanStep]) -> *mut ffi::td_t {
    let g = unsafe { ffi::td_graph_new(tbl) };
    if g.is_null() {
        return unsafe { ffi::td_err_ptr(ffi::td_err_t::TD_ERR_OOM) };
    }

    // Arrays handed to td_group/td_sort_op are read again at execution
    // time; they must outlive td_execute.
    let mut pinned: Vec<Box<dyn std::any::Any>> = Vec::new();

    let result = match unsafe { emit_plan(g, tbl, plan, &mut pinned) } {
        Ok(root) => {
            let optimized = unsafe { ffi::td_optimize(g, root) };
            if optimized.is_null() {
                unsafe { ffi::td_err_ptr(ffi::td_err_t::TD_ERR_OOM) }
            } else {
                unsafe { ffi::td_execute(g, optimized) }
            }
        }
        Err(sentinel) => sentinel,
    };

    unsafe { ffi::td_graph_free(g) };
    result
}

// ---------------------------------------------------------------------------
// Query — chainable capture-side builder
// ---------------------------------------------------------------------------

/// A declarative query over a [`Table`]. Steps are captured on the calling
/// thread; nothing touches the engine until `collect`.
pub struct Query<'a> {
    table: &'a Table,
    steps: Vec<PlanStep>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(table: &'a Table) -> Self {
        Query {
            table,
            steps: Vec::new(),
        }
    }

    /// Keep rows matching `expr`.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.steps.push(PlanStep::Filter(expr));
        self
    }

    /// Start a group-by; finish it with [`GroupBy::agg`].
    pub fn group_by<I, S>(self, keys: I) -> GroupBy<'a>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        GroupBy {
            query: self,
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Order by a single column.
    pub fn sort(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.steps.push(PlanStep::Sort {
            cols: vec![column.into()],
            descs: vec![descending],
        });
        self
    }

    /// Order by several columns; each pair is (column, descending).
    pub fn sort_by<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let (cols, descs): (Vec<String>, Vec<bool>) =
            keys.into_iter().map(|(c, d)| (c.into(), d)).unzip();
        self.steps.push(PlanStep::Sort { cols, descs });
        self
    }

    /// Keep the first `n` rows.
    pub fn head(mut self, n: i64) -> Self {
        self.steps.push(PlanStep::Head(n));
        self
    }

    /// Append a pre-built step.
    pub fn step(mut self, step: PlanStep) -> Self {
        self.steps.push(step);
        self
    }

    fn validate(&self) -> Result<()> {
        self.table.check_alive()?;
        let columns: HashSet<String> = self.table.column_names()?.into_iter().collect();
        validate_plan(&self.steps, &columns)
    }

    /// Run the plan, blocking the calling thread until the worker finishes.
    pub fn collect_sync(self) -> Result<Table> {
        self.validate()?;
        let dispatcher = self.table.dispatcher_arc();
        let tbl = RawVal(self.table.as_raw());
        let steps = self.steps;
        let raw = dispatcher.run_sync(Box::new(move || {
            let tbl = tbl; // capture the whole Send `RawVal`, not the raw pointer field
            RawVal(unsafe { execute_plan(tbl.0, &steps) })
        }))?;
        Table::from_result(raw, &dispatcher)
    }

    /// Run the plan without blocking; resolves when the worker delivers
    /// the result.
    pub async fn collect(self) -> Result<Table> {
        self.validate()?;
        let dispatcher = self.table.dispatcher_arc();
        let tbl = RawVal(self.table.as_raw());
        let steps = self.steps;

        // Keep the source table alive for the duration of execution even
        // if the caller drops its handle while the item is queued.
        unsafe { ffi::td_retain(tbl.0) };
        let rx = match dispatcher.run_async(Box::new(move || {
            let tbl = tbl; // capture the whole Send `RawVal`, not the raw pointer field
            let result = unsafe { execute_plan(tbl.0, &steps) };
            unsafe { ffi::td_release(tbl.0) };
            RawVal(result)
        })) {
            Ok(rx) => rx,
            Err(e) => {
                unsafe { ffi::td_release(tbl.0) };
                return Err(e);
            }
        };

        let raw = rx.await.map_err(|_| Error::WorkerGone)?;
        Table::from_result(raw, &dispatcher)
    }
}

/// Intermediate builder produced by [`Query::group_by`].
pub struct GroupBy<'a> {
    query: Query<'a>,
    keys: Vec<String>,
}

impl<'a> GroupBy<'a> {
    /// Attach the aggregate expressions and return to the query chain.
    pub fn agg(mut self, aggs: impl IntoIterator<Item = Expr>) -> Query<'a> {
        self.query.steps.push(PlanStep::Group {
            keys: self.keys,
            aggs: aggs.into_iter().collect(),
        });
        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit};

    fn schema(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn unknown_column_is_rejected_at_capture() {
        let plan = vec![PlanStep::Filter(col("missing").gt(lit(1.0)))];
        let err = validate_plan(&plan, &schema(&["a", "b"])).unwrap_err();
        match err {
            Error::UnknownColumn(name) => assert_eq!(name, "missing"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_group_key_is_rejected() {
        let plan = vec![PlanStep::Group {
            keys: vec!["nope".into()],
            aggs: vec![col("a").sum()],
        }];
        assert!(matches!(
            validate_plan(&plan, &schema(&["a"])),
            Err(Error::UnknownColumn(_))
        ));
    }

    #[test]
    fn sort_length_mismatch_is_rejected() {
        let plan = vec![PlanStep::Sort {
            cols: vec!["a".into(), "b".into()],
            descs: vec![false],
        }];
        assert!(matches!(
            validate_plan(&plan, &schema(&["a", "b"])),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn columns_after_group_are_not_checked() {
        // Grouping changes the schema; later steps may name group output
        // columns the source table does not have.
        let plan = vec![
            PlanStep::Group {
                keys: vec!["a".into()],
                aggs: vec![col("b").sum()],
            },
            PlanStep::Sort {
                cols: vec!["anything".into()],
                descs: vec![true],
            },
        ];
        assert!(validate_plan(&plan, &schema(&["a", "b"])).is_ok());
    }

    #[test]
    fn valid_plan_passes() {
        let plan = vec![
            PlanStep::Filter(col("a").gt(lit(0.0)).and(col("a").lt(lit(10.0)))),
            PlanStep::Group {
                keys: vec!["b".into()],
                aggs: vec![col("a").sum().alias("total"), col("b")],
            },
            PlanStep::Sort {
                cols: vec!["b".into()],
                descs: vec![true],
            },
            PlanStep::Head(5),
        ];
        assert!(validate_plan(&plan, &schema(&["a", "b"])).is_ok());
    }
}
