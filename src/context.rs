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

//! Engine context: owns the worker thread and the ingestion entry points.

use std::ffi::CString;
use std::marker::PhantomData;
use std::os::raw::c_char;
use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::ffi;
use crate::table::Table;
use crate::value::RawVal;

/// CSV ingestion options.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: char,
    pub header: bool,
    /// Explicit column types (see [`crate::types`]); `None` infers from a
    /// sample.
    pub col_types: Option<Vec<i8>>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: ',',
            header: true,
            col_types: None,
        }
    }
}

/// An engine instance. Construction spawns the worker thread, which brings
/// the engine up; [`Context::destroy`] (or drop) drains the worker and
/// tears the engine down.
///
/// The engine keeps process-global state, so only one `Context` may be
/// live at a time; constructing a second returns [`Error::EngineBusy`].
pub struct Context {
    dispatcher: Arc<Dispatcher>,
    destroyed: bool,
    // Facade handles stay on the host thread that created them.
    _not_send_sync: PhantomData<*mut ()>,
}

impl Context {
    pub fn new() -> Result<Context> {
        Ok(Context {
            dispatcher: Dispatcher::spawn()?,
            destroyed: false,
            _not_send_sync: PhantomData,
        })
    }

    fn check_alive(&self) -> Result<()> {
        if self.destroyed {
            Err(Error::ContextDestroyed)
        } else {
            Ok(())
        }
    }

    fn csv_path(path: &str) -> Result<CString> {
        CString::new(path).map_err(|_| Error::InvalidInput("path contains NUL".into()))
    }

    /// Read a CSV file into a [`Table`], blocking until ingestion finishes.
    pub fn read_csv_sync(&self, path: &str) -> Result<Table> {
        self.check_alive()?;
        let c_path = Self::csv_path(path)?;
        let raw = self
            .dispatcher
            .run_sync(Box::new(move || {
                RawVal(unsafe { ffi::td_read_csv(c_path.as_ptr()) })
            }))?;
        Table::from_result(raw, &self.dispatcher)
    }

    /// Read a CSV file into a [`Table`] without blocking the caller.
    pub async fn read_csv(&self, path: &str) -> Result<Table> {
        self.check_alive()?;
        let c_path = Self::csv_path(path)?;
        let rx = self
            .dispatcher
            .run_async(Box::new(move || {
                RawVal(unsafe { ffi::td_read_csv(c_path.as_ptr()) })
            }))?;
        let raw = rx.await.map_err(|_| Error::WorkerGone)?;
        Table::from_result(raw, &self.dispatcher)
    }

    /// Read a CSV file with explicit options.
    pub fn read_csv_opts_sync(&self, path: &str, opts: &CsvOptions) -> Result<Table> {
        self.check_alive()?;
        let c_path = Self::csv_path(path)?;
        let delimiter = opts.delimiter as c_char;
        let header = opts.header;
        let col_types = opts.col_types.clone();
        let raw = self
            .dispatcher
            .run_sync(Box::new(move || {
                let (types_ptr, n_types) = match &col_types {
                    Some(t) => (t.as_ptr(), t.len() as i32),
                    None => (std::ptr::null(), 0),
                };
                RawVal(unsafe {
                    ffi::td_read_csv_opts(c_path.as_ptr(), delimiter, header, types_ptr, n_types)
                })
            }))?;
        Table::from_result(raw, &self.dispatcher)
    }

    /// Drain pending work and tear the engine down. Idempotent.
    ///
    /// Tables, series, and views created against this context remain safe
    /// to hold and drop afterwards; their releases are skipped once the
    /// engine is gone.
    pub fn destroy(&mut self) {
        if !self.destroyed {
            self.dispatcher.shutdown();
            self.destroyed = true;
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.destroy();
    }
}
