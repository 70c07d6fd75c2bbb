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

//! Captured expression trees.
//!
//! Expressions are built on the caller's thread, are immutable once built,
//! and cross the worker-thread boundary by move. The worker walks them
//! during graph emission; nothing here touches the engine.

use crate::ffi;

/// A captured expression node. Children are owned exclusively — the tree
/// has no sharing and no cycles.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Reference to a table column by name.
    Column(String),
    /// A constant.
    Literal(Literal),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Agg {
        func: AggFunc,
        arg: Box<Expr>,
    },
    /// Output-name annotation.
    Alias {
        name: String,
        arg: Box<Expr>,
    },
}

/// A captured constant.
///
/// Numeric literals are disambiguated at capture time: a value exactly
/// representable as a 64-bit signed integer is captured as `Int` so it
/// emits an integer constant downstream (the engine distinguishes integer
/// and floating columns); everything else stays `Float`.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

const I64_EXACT_BOUND: f64 = 9.22e18;

impl From<f64> for Literal {
    fn from(v: f64) -> Literal {
        if v == (v as i64) as f64 && (-I64_EXACT_BOUND..=I64_EXACT_BOUND).contains(&v) {
            Literal::Int(v as i64)
        } else {
            Literal::Float(v)
        }
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Literal {
        Literal::Int(v)
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Literal {
        Literal::Int(v as i64)
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Literal {
        Literal::Bool(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Literal {
        Literal::Str(v.to_owned())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Literal {
        Literal::Str(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Abs,
    Not,
    Sqrt,
    Log,
    Exp,
    Ceil,
    Floor,
    IsNull,
}

/// Aggregation function variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Prod,
    Min,
    Max,
    Count,
    Avg,
    First,
    Last,
}

impl AggFunc {
    pub(crate) fn opcode(self) -> u16 {
        match self {
            AggFunc::Sum => ffi::OP_SUM,
            AggFunc::Prod => ffi::OP_PROD,
            AggFunc::Min => ffi::OP_MIN,
            AggFunc::Max => ffi::OP_MAX,
            AggFunc::Count => ffi::OP_COUNT,
            AggFunc::Avg => ffi::OP_AVG,
            AggFunc::First => ffi::OP_FIRST,
            AggFunc::Last => ffi::OP_LAST,
        }
    }
}

/// Reference a column by name.
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

/// Capture a constant.
pub fn lit(value: impl Into<Literal>) -> Expr {
    Expr::Literal(value.into())
}

macro_rules! binary_methods {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(self, other: impl Into<Expr>) -> Expr {
                Expr::Binary {
                    op: BinaryOp::$op,
                    left: Box::new(self),
                    right: Box::new(other.into()),
                }
            }
        )*
    };
}

macro_rules! unary_methods {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(self) -> Expr {
                Expr::Unary {
                    op: UnaryOp::$op,
                    arg: Box::new(self),
                }
            }
        )*
    };
}

macro_rules! agg_methods {
    ($($name:ident => $func:ident),* $(,)?) => {
        $(
            pub fn $name(self) -> Expr {
                Expr::Agg {
                    func: AggFunc::$func,
                    arg: Box::new(self),
                }
            }
        )*
    };
}

impl Expr {
    binary_methods! {
        add => Add, sub => Sub, mul => Mul, div => Div, modulo => Mod,
        eq => Eq, ne => Ne, lt => Lt, le => Le, gt => Gt, ge => Ge,
        and => And, or => Or,
    }

    unary_methods! {
        neg => Neg, abs => Abs, not => Not, sqrt => Sqrt, log => Log,
        exp => Exp, ceil => Ceil, floor => Floor, is_null => IsNull,
    }

    agg_methods! {
        sum => Sum, prod => Prod, min => Min, max => Max,
        count => Count, mean => Avg, first => First, last => Last,
    }

    /// Attach an output name.
    pub fn alias(self, name: impl Into<String>) -> Expr {
        Expr::Alias {
            name: name.into(),
            arg: Box::new(self),
        }
    }

    /// First child of this node, if any. Used by aggregate decomposition.
    pub(crate) fn child(&self) -> Option<&Expr> {
        match self {
            Expr::Column(_) | Expr::Literal(_) => None,
            Expr::Binary { left, .. } => Some(left),
            Expr::Unary { arg, .. } | Expr::Agg { arg, .. } | Expr::Alias { arg, .. } => Some(arg),
        }
    }

}

impl From<f64> for Expr {
    fn from(v: f64) -> Expr {
        Expr::Literal(v.into())
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Expr {
        Expr::Literal(v.into())
    }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Expr {
        Expr::Literal(v.into())
    }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Expr {
        Expr::Literal(v.into())
    }
}

impl From<&str> for Expr {
    fn from(v: &str) -> Expr {
        Expr::Literal(v.into())
    }
}

impl From<String> for Expr {
    fn from(v: String) -> Expr {
        Expr::Literal(v.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_literal_routing() {
        // Whole-valued floats capture as integers.
        assert_eq!(Literal::from(5.0), Literal::Int(5));
        assert_eq!(Literal::from(-3.0), Literal::Int(-3));
        assert_eq!(Literal::from(0.0), Literal::Int(0));
        // Fractional values stay floating.
        assert_eq!(Literal::from(5.5), Literal::Float(5.5));
        // Values past the int64 range stay floating.
        assert_eq!(Literal::from(1e30), Literal::Float(1e30));
        assert_eq!(Literal::from(-1e19), Literal::Float(-1e19));
        // Non-finite values stay floating.
        assert!(matches!(Literal::from(f64::INFINITY), Literal::Float(_)));
        assert!(matches!(Literal::from(f64::NAN), Literal::Float(_)));
    }

    #[test]
    fn builder_shapes() {
        let e = col("x").gt(5.0).and(col("x").lt(lit(10i64)));
        match e {
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                assert!(matches!(
                    *left,
                    Expr::Binary {
                        op: BinaryOp::Gt,
                        ..
                    }
                ));
                assert!(matches!(
                    *right,
                    Expr::Binary {
                        op: BinaryOp::Lt,
                        ..
                    }
                ));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn alias_wraps_aggregate() {
        let e = col("v").sum().alias("total");
        match e {
            Expr::Alias { name, arg } => {
                assert_eq!(name, "total");
                assert!(matches!(
                    *arg,
                    Expr::Agg {
                        func: AggFunc::Sum,
                        ..
                    }
                ));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

}
