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

//! Error taxonomy for the bridge: engine sentinels, capture-time plan
//! errors, lifecycle violations, and unsupported zero-copy layouts.

use crate::ffi;

/// Error codes surfaced by the Teide engine as pointer sentinels.
///
/// The mapping to strings is static on the Rust side so formatting an
/// error never calls back into the engine (which may already be torn down).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    Oom,
    Type,
    Range,
    Length,
    Rank,
    Domain,
    Nyi,
    Io,
    Schema,
    Corrupt,
    Cancel,
}

impl EngineError {
    pub(crate) fn from_code(code: ffi::td_err_t) -> Self {
        match code {
            ffi::td_err_t::TD_ERR_OOM => EngineError::Oom,
            ffi::td_err_t::TD_ERR_TYPE => EngineError::Type,
            ffi::td_err_t::TD_ERR_RANGE => EngineError::Range,
            ffi::td_err_t::TD_ERR_LENGTH => EngineError::Length,
            ffi::td_err_t::TD_ERR_RANK => EngineError::Rank,
            ffi::td_err_t::TD_ERR_DOMAIN => EngineError::Domain,
            ffi::td_err_t::TD_ERR_NYI => EngineError::Nyi,
            ffi::td_err_t::TD_ERR_IO => EngineError::Io,
            ffi::td_err_t::TD_ERR_SCHEMA => EngineError::Schema,
            ffi::td_err_t::TD_ERR_CORRUPT => EngineError::Corrupt,
            ffi::td_err_t::TD_ERR_CANCEL => EngineError::Cancel,
            _ => EngineError::Corrupt,
        }
    }

    /// Human-readable description matching the engine's `td_err_str` table.
    pub fn as_str(self) -> &'static str {
        match self {
            EngineError::Oom => "out of memory",
            EngineError::Type => "type error",
            EngineError::Range => "range error",
            EngineError::Length => "length error",
            EngineError::Rank => "rank error",
            EngineError::Domain => "domain error",
            EngineError::Nyi => "not yet implemented",
            EngineError::Io => "I/O error",
            EngineError::Schema => "schema error",
            EngineError::Corrupt => "corrupt data",
            EngineError::Cancel => "query cancelled",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the bridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A native operation returned an error sentinel.
    #[error("engine error: {0}")]
    Engine(EngineError),

    /// A plan or expression referenced a column the table does not have.
    #[error("column '{0}' not found")]
    UnknownColumn(String),

    /// An operation was attempted on a context that was already destroyed.
    #[error("context has been destroyed")]
    ContextDestroyed,

    /// Work was submitted after the dispatcher finished shutting down.
    #[error("engine worker has shut down")]
    Shutdown,

    /// Another engine context is live; the engine keeps process-global state.
    #[error("an engine context is already running")]
    EngineBusy,

    /// The worker thread could not be spawned.
    #[error("failed to spawn engine worker: {0}")]
    Spawn(std::io::Error),

    /// The worker exited without delivering a result for a submitted item.
    #[error("engine worker terminated before delivering a result")]
    WorkerGone,

    /// Malformed host input (embedded NUL in a path or name, etc.).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The column's type has no zero-copy layout mapping.
    #[error("unsupported column type {0} for zero-copy data access")]
    UnsupportedDtype(i8),

    /// The symbol column stores indices at a width the bridge cannot view.
    #[error("unsupported symbol index width")]
    UnsupportedSymWidth,

    /// Raw data was requested from a symbol column.
    #[error("symbol columns expose indices/dictionary, not raw data")]
    SymbolColumnData,

    /// A symbol-only accessor was used on a non-symbol column.
    #[error("indices and dictionary are only available on symbol columns")]
    NotSymbolColumn,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Check a `td_t*` return for null / error sentinel.
pub(crate) fn check_ptr(ptr: *mut ffi::td_t) -> Result<*mut ffi::td_t> {
    if ptr.is_null() {
        return Err(Error::Engine(EngineError::Oom));
    }
    if ffi::td_is_err(ptr) {
        Err(Error::Engine(EngineError::from_code(ffi::td_err_code(ptr))))
    } else {
        Ok(ptr)
    }
}
