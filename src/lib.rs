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

//! teidedb: embeddable dataframe bridge for the Teide C17 columnar engine.
//!
//! The engine is single-threaded and reference-counted; this crate drives
//! it from multi-threaded host programs. A [`Context`] owns one dedicated
//! worker thread through which every engine call is serialized. Queries are
//! captured on the caller's thread as immutable plans (filter / group /
//! sort / head over expression trees), compiled to the engine's operation
//! graph on the worker, and executed there. Results come back as [`Table`]
//! handles whose columns expose their native memory as zero-copy views.
//!
//! ```no_run
//! use teidedb::{col, Context};
//!
//! # fn main() -> teidedb::Result<()> {
//! let mut ctx = Context::new()?;
//! let trades = ctx.read_csv_sync("trades.csv")?;
//! let top = trades
//!     .filter(col("price").gt(100.0))
//!     .sort("price", true)
//!     .head(10)
//!     .collect_sync()?;
//! let by_sym = trades
//!     .group_by(["sym"])
//!     .agg([col("qty").sum()])
//!     .collect_sync()?;
//! println!("{} rows, {} groups", top.nrows()?, by_sym.nrows()?);
//! ctx.destroy();
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

mod context;
mod dispatch;
mod error;
mod expr;
mod ffi;
mod query;
mod series;
mod table;
mod value;

pub use context::{Context, CsvOptions};
pub use error::{EngineError, Error, Result};
pub use expr::{col, lit, AggFunc, BinaryOp, Expr, Literal, UnaryOp};
pub use query::{GroupBy, PlanStep, Query};
pub use series::{ColumnData, NullBitmap, Series, SymIndices};
pub use table::Table;

/// Engine column type tags.
pub mod types {
    pub const BOOL: i8 = super::ffi::TD_BOOL;
    pub const U8: i8 = super::ffi::TD_U8;
    pub const I16: i8 = super::ffi::TD_I16;
    pub const I32: i8 = super::ffi::TD_I32;
    pub const I64: i8 = super::ffi::TD_I64;
    pub const F64: i8 = super::ffi::TD_F64;
    pub const DATE: i8 = super::ffi::TD_DATE;
    pub const TIME: i8 = super::ffi::TD_TIME;
    pub const TIMESTAMP: i8 = super::ffi::TD_TIMESTAMP;
    pub const TABLE: i8 = super::ffi::TD_TABLE;
    pub const SYM: i8 = super::ffi::TD_SYM;
}
