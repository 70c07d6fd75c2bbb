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

//! Table facade: a retained engine table paired with its dispatcher.

use std::ffi::CString;
use std::marker::PhantomData;
use std::os::raw::c_char;
use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::error::{check_ptr, EngineError, Error, Result};
use crate::expr::Expr;
use crate::ffi;
use crate::query::{GroupBy, Query};
use crate::series::{resolve_data_ptr, Series};
use crate::value::{RawVal, ValueGuard};

/// A columnar table produced by ingestion or by a query.
///
/// Holds one retain on the underlying engine value; the retain is released
/// on drop only while the engine is still alive.
pub struct Table {
    guard: ValueGuard,
    dispatcher: Arc<Dispatcher>,
    // Facade handles stay on the host thread that created them.
    _not_send_sync: PhantomData<*mut ()>,
}

impl Table {
    /// Wrap an owned result pointer (rc already counted for us).
    pub(crate) fn from_owned(raw: *mut ffi::td_t, dispatcher: &Arc<Dispatcher>) -> Table {
        Table {
            guard: ValueGuard::from_owned(raw, dispatcher.alive_flag()),
            dispatcher: Arc::clone(dispatcher),
            _not_send_sync: PhantomData,
        }
    }

    /// Convert a worker result into a `Table`, decoding error sentinels.
    pub(crate) fn from_result(raw: RawVal, dispatcher: &Arc<Dispatcher>) -> Result<Table> {
        let ptr = check_ptr(raw.0)?;
        Ok(Table::from_owned(ptr, dispatcher))
    }

    pub(crate) fn check_alive(&self) -> Result<()> {
        if self.guard.is_alive() {
            Ok(())
        } else {
            Err(Error::ContextDestroyed)
        }
    }

    pub(crate) fn as_raw(&self) -> *mut ffi::td_t {
        self.guard.as_ptr()
    }

    pub(crate) fn dispatcher_arc(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Number of rows.
    pub fn nrows(&self) -> Result<i64> {
        self.check_alive()?;
        Ok(unsafe { ffi::td_table_nrows(self.as_raw()) })
    }

    /// Number of columns.
    pub fn ncols(&self) -> Result<i64> {
        self.check_alive()?;
        Ok(unsafe { ffi::td_table_ncols(self.as_raw()) })
    }

    /// Column names in table order. Unnamed columns fall back to `V{idx}`.
    pub fn column_names(&self) -> Result<Vec<String>> {
        self.check_alive()?;
        let tbl = self.as_raw();
        let ncols = unsafe { ffi::td_table_ncols(tbl) };
        let mut names = Vec::with_capacity(ncols as usize);
        for i in 0..ncols {
            let name_id = unsafe { ffi::td_table_col_name(tbl, i) };
            let sym = unsafe { ffi::td_sym_str(name_id) };
            if sym.is_null() {
                names.push(format!("V{i}"));
            } else {
                names.push(unsafe { sym_to_string(sym) });
            }
        }
        Ok(names)
    }

    /// Look up a column by name.
    pub fn col(&self, name: &str) -> Result<Series> {
        self.check_alive()?;
        // Only look the symbol up — interning here would grow the symbol
        // table for names that do not exist.
        let name_id =
            unsafe { ffi::td_sym_find(name.as_ptr() as *const c_char, name.len()) };
        if name_id < 0 {
            return Err(Error::UnknownColumn(name.to_owned()));
        }
        let col = unsafe { ffi::td_table_get_col(self.as_raw(), name_id) };
        if col.is_null() || ffi::td_is_err(col) {
            return Err(Error::UnknownColumn(name.to_owned()));
        }
        let dtype = unsafe { ffi::td_type(col) };
        // SAFETY: `col` is a live column of a live table; the engine is up.
        Ok(unsafe { Series::retain(col, name.to_owned(), dtype, self.guard.alive_flag().clone()) })
    }

    /// Read an i64 value from column `col`, row `row`.
    pub fn get_i64(&self, col: usize, row: usize) -> Option<i64> {
        let vec = self.get_col_idx(col as i64)?;
        let t = unsafe { ffi::td_type(vec) };
        let len = unsafe { ffi::td_len(vec) } as usize;
        if row >= len {
            return None;
        }
        let data = unsafe { resolve_data_ptr(vec, t) };
        match t {
            ffi::TD_I64 | ffi::TD_TIME | ffi::TD_TIMESTAMP => {
                let p = data as *const i64;
                Some(unsafe { *p.add(row) })
            }
            ffi::TD_BOOL => Some(unsafe { *data.add(row) } as i64),
            ffi::TD_I32 | ffi::TD_DATE => {
                let p = data as *const i32;
                Some(unsafe { *p.add(row) } as i64)
            }
            ffi::TD_SYM => {
                let attrs = unsafe { ffi::td_attrs(vec) };
                Some(unsafe { ffi::read_sym(data, row, t, attrs) })
            }
            _ => None,
        }
    }

    /// Read an f64 value from column `col`, row `row`.
    pub fn get_f64(&self, col: usize, row: usize) -> Option<f64> {
        let vec = self.get_col_idx(col as i64)?;
        let t = unsafe { ffi::td_type(vec) };
        if t != ffi::TD_F64 {
            return None;
        }
        let len = unsafe { ffi::td_len(vec) } as usize;
        if row >= len {
            return None;
        }
        unsafe {
            let data = resolve_data_ptr(vec, t) as *const f64;
            Some(*data.add(row))
        }
    }

    /// Read a string value from a SYM column at `col`, `row`.
    pub fn get_str(&self, col: usize, row: usize) -> Option<String> {
        let vec = self.get_col_idx(col as i64)?;
        let t = unsafe { ffi::td_type(vec) };
        if t != ffi::TD_SYM {
            return None;
        }
        let len = unsafe { ffi::td_len(vec) } as usize;
        if row >= len {
            return None;
        }
        let sym_id = unsafe {
            let data = resolve_data_ptr(vec, t);
            let attrs = ffi::td_attrs(vec);
            ffi::read_sym(data, row, t, attrs)
        };
        let atom = unsafe { ffi::td_sym_str(sym_id) };
        if atom.is_null() {
            return None;
        }
        Some(unsafe { sym_to_string(atom) })
    }

    /// Write this table to a CSV file.
    pub fn write_csv(&self, path: &str) -> Result<()> {
        self.check_alive()?;
        let c_path =
            CString::new(path).map_err(|_| Error::InvalidInput("path contains NUL".into()))?;
        let tbl = RawVal(self.as_raw());
        let code = self.dispatcher.run_sync(Box::new(move || {
            let tbl = tbl; // capture the whole Send `RawVal`, not the raw pointer field
            let err = unsafe { ffi::td_write_csv(tbl.0, c_path.as_ptr()) };
            RawVal(unsafe { ffi::td_err_ptr(err) })
        }))?;
        match ffi::td_err_code(code.0) {
            ffi::td_err_t::TD_OK => Ok(()),
            c => Err(Error::Engine(EngineError::from_code(c))),
        }
    }

    /// Start an empty query over this table.
    pub fn query(&self) -> Query<'_> {
        Query::new(self)
    }

    /// Start a query with a filter step.
    pub fn filter(&self, expr: Expr) -> Query<'_> {
        self.query().filter(expr)
    }

    /// Start a query with a group-by step.
    pub fn group_by<I, S>(&self, keys: I) -> GroupBy<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query().group_by(keys)
    }

    /// Start a query with a sort step.
    pub fn sort(&self, column: impl Into<String>, descending: bool) -> Query<'_> {
        self.query().sort(column, descending)
    }

    /// Start a query with a head step.
    pub fn head(&self, n: i64) -> Query<'_> {
        self.query().head(n)
    }

    fn get_col_idx(&self, idx: i64) -> Option<*mut ffi::td_t> {
        if !self.guard.is_alive() {
            return None;
        }
        let p = unsafe { ffi::td_table_get_col_idx(self.as_raw(), idx) };
        if p.is_null() || ffi::td_is_err(p) {
            None
        } else {
            Some(p)
        }
    }
}

/// Copy an engine string atom into an owned `String`.
///
/// # Safety
/// `atom` must be a valid, non-null string atom.
pub(crate) unsafe fn sym_to_string(atom: *mut ffi::td_t) -> String {
    unsafe {
        let ptr = ffi::td_str_ptr(atom);
        let len = ffi::td_str_len(atom);
        let slice = std::slice::from_raw_parts(ptr as *const u8, len);
        std::str::from_utf8(slice).unwrap_or("").to_owned()
    }
}
