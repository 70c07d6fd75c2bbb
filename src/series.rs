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

//! Column facade and zero-copy buffer bridge.
//!
//! A [`Series`] pairs one retained column vector with views over its native
//! memory. Data and index views alias engine memory directly — no copy —
//! and each view holds its own retain on the vector, released (engine-alive
//! permitting) when the series is dropped. Views are computed at most once
//! per series and cached.

use std::cell::OnceCell;
use std::marker::PhantomData;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::ffi;
use crate::table::sym_to_string;
use crate::value::ValueGuard;

/// A zero-copy window over engine memory. The guard keeps the owning
/// vector retained for exactly as long as the view exists.
struct Buffer {
    data: *const u8,
    len: usize,
    _guard: ValueGuard,
}

impl Buffer {
    fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }

    /// # Safety
    /// The underlying region must hold `n` properly aligned values of `T`.
    unsafe fn typed<T>(&self, n: usize) -> &[T] {
        unsafe { std::slice::from_raw_parts(self.data as *const T, n) }
    }
}

/// Typed zero-copy view of a column's values.
#[derive(Debug, Clone, Copy)]
pub enum ColumnData<'a> {
    F64(&'a [f64]),
    I64(&'a [i64]),
    I32(&'a [i32]),
    I16(&'a [i16]),
    U8(&'a [u8]),
}

/// Zero-copy view of a symbol column's dictionary indices, at the width
/// the engine stores them.
#[derive(Debug, Clone, Copy)]
pub enum SymIndices<'a> {
    W8(&'a [u8]),
    W16(&'a [u16]),
    W32(&'a [u32]),
}

/// Validity bitmap of a column (one bit per row, LSB-first).
pub struct NullBitmap(BitmapRepr);

enum BitmapRepr {
    /// External nullmap vector, viewed without copying.
    View(Buffer),
    /// Inline header bitmap; the 16 header bytes alias slice metadata, so
    /// viewing them in place would be unsound. Copied instead.
    Copied(Vec<u8>),
}

impl NullBitmap {
    pub fn as_bytes(&self) -> &[u8] {
        match &self.0 {
            BitmapRepr::View(buf) => buf.as_bytes(),
            BitmapRepr::Copied(bytes) => bytes,
        }
    }
}

enum DataKind {
    F64,
    I64,
    I32,
    I16,
    U8,
}

/// A single named column of a [`crate::Table`].
pub struct Series {
    guard: ValueGuard,
    name: String,
    dtype: i8,
    data: OnceCell<Buffer>,
    indices: OnceCell<Buffer>,
    nulls: OnceCell<Option<NullBitmap>>,
    dictionary: OnceCell<Vec<String>>,
    // Facade handles stay on the host thread that created them.
    _not_send_sync: PhantomData<*mut ()>,
}

impl Series {
    /// Retain `vec` for the lifetime of the facade.
    ///
    /// # Safety
    /// `vec` must be a live column vector and the engine must be up.
    pub(crate) unsafe fn retain(
        vec: *mut ffi::td_t,
        name: String,
        dtype: i8,
        alive: Arc<AtomicBool>,
    ) -> Series {
        Series {
            guard: unsafe { ValueGuard::retain(vec, alive) },
            name,
            dtype,
            data: OnceCell::new(),
            indices: OnceCell::new(),
            nulls: OnceCell::new(),
            dictionary: OnceCell::new(),
            _not_send_sync: PhantomData,
        }
    }

    fn check_alive(&self) -> Result<()> {
        if self.guard.is_alive() {
            Ok(())
        } else {
            Err(Error::ContextDestroyed)
        }
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Engine type tag of the column.
    pub fn dtype(&self) -> i8 {
        self.dtype
    }

    /// Human-readable type tag.
    pub fn dtype_str(&self) -> String {
        match self.dtype {
            ffi::TD_BOOL => "bool".into(),
            ffi::TD_U8 => "u8".into(),
            ffi::TD_CHAR => "char".into(),
            ffi::TD_I16 => "i16".into(),
            ffi::TD_I32 => "i32".into(),
            ffi::TD_I64 => "i64".into(),
            ffi::TD_F64 => "f64".into(),
            ffi::TD_DATE => "date".into(),
            ffi::TD_TIME => "time".into(),
            ffi::TD_TIMESTAMP => "timestamp".into(),
            ffi::TD_GUID => "guid".into(),
            ffi::TD_SYM => "sym".into(),
            other => format!("unknown({other})"),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> Result<i64> {
        self.check_alive()?;
        Ok(unsafe { ffi::td_len(self.guard.as_ptr()) })
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Zero-copy typed view of the column's raw values.
    ///
    /// Symbol columns do not expose raw data — use [`Series::indices`] and
    /// [`Series::dictionary`]. The view is valid while the owning context
    /// is alive.
    pub fn data(&self) -> Result<ColumnData<'_>> {
        self.check_alive()?;
        if self.dtype == ffi::TD_SYM {
            return Err(Error::SymbolColumnData);
        }
        let (elem_size, kind) = match self.dtype {
            ffi::TD_F64 => (8, DataKind::F64),
            ffi::TD_I64 | ffi::TD_TIMESTAMP => (8, DataKind::I64),
            ffi::TD_I32 | ffi::TD_DATE => (4, DataKind::I32),
            ffi::TD_I16 => (2, DataKind::I16),
            ffi::TD_BOOL | ffi::TD_U8 => (1, DataKind::U8),
            other => return Err(Error::UnsupportedDtype(other)),
        };
        let buf = self.cached_view(&self.data, elem_size)?;
        let n = buf.len / elem_size;
        // SAFETY: elem size and kind were derived from the column's declared
        // type; the engine guarantees the layout matches.
        Ok(unsafe {
            match kind {
                DataKind::F64 => ColumnData::F64(buf.typed(n)),
                DataKind::I64 => ColumnData::I64(buf.typed(n)),
                DataKind::I32 => ColumnData::I32(buf.typed(n)),
                DataKind::I16 => ColumnData::I16(buf.typed(n)),
                DataKind::U8 => ColumnData::U8(buf.typed(n)),
            }
        })
    }

    /// Validity bitmap, or `None` when the column has no nulls.
    pub fn null_bitmap(&self) -> Result<Option<&NullBitmap>> {
        self.check_alive()?;
        if let Some(cached) = self.nulls.get() {
            return Ok(cached.as_ref());
        }

        let vec = self.guard.as_ptr();
        let attrs = unsafe { ffi::td_attrs(vec) };
        let computed = if attrs & ffi::TD_ATTR_HAS_NULLS == 0 {
            None
        } else if attrs & ffi::TD_ATTR_NULLMAP_EXT != 0 {
            let ext = unsafe { (*vec).head.ext.ext_nullmap };
            if ext.is_null() {
                None
            } else {
                let nbytes = ((unsafe { ffi::td_len(vec) } + 7) / 8) as usize;
                let guard =
                    unsafe { ValueGuard::retain(vec, self.guard.alive_flag().clone()) };
                Some(NullBitmap(BitmapRepr::View(Buffer {
                    data: unsafe { ffi::td_data(ext) as *const u8 },
                    len: nbytes,
                    _guard: guard,
                })))
            }
        } else {
            // Inline nullmap: up to 16 bytes in the header.
            let mut nbytes = ((unsafe { ffi::td_len(vec) } + 7) / 8) as usize;
            if nbytes > 16 {
                nbytes = 16;
            }
            let head = unsafe { (*vec).head.nullmap };
            Some(NullBitmap(BitmapRepr::Copied(head[..nbytes].to_vec())))
        };
        Ok(self.nulls.get_or_init(|| computed).as_ref())
    }

    /// Zero-copy view of a symbol column's dictionary indices.
    pub fn indices(&self) -> Result<SymIndices<'_>> {
        self.check_alive()?;
        if self.dtype != ffi::TD_SYM {
            return Err(Error::NotSymbolColumn);
        }
        let attrs = unsafe { ffi::td_attrs(self.guard.as_ptr()) };
        let elem_size = match attrs & ffi::TD_SYM_W_MASK {
            ffi::TD_SYM_W8 => 1,
            ffi::TD_SYM_W16 => 2,
            ffi::TD_SYM_W32 => 4,
            _ => return Err(Error::UnsupportedSymWidth),
        };
        let buf = self.cached_view(&self.indices, elem_size)?;
        let n = buf.len / elem_size;
        // SAFETY: width was read from the column's own attrs.
        Ok(unsafe {
            match elem_size {
                1 => SymIndices::W8(buf.typed(n)),
                2 => SymIndices::W16(buf.typed(n)),
                _ => SymIndices::W32(buf.typed(n)),
            }
        })
    }

    /// The interned-symbol dictionary as owned strings, indexed by symbol id.
    pub fn dictionary(&self) -> Result<&[String]> {
        self.check_alive()?;
        if self.dtype != ffi::TD_SYM {
            return Err(Error::NotSymbolColumn);
        }
        if let Some(dict) = self.dictionary.get() {
            return Ok(dict);
        }
        let count = unsafe { ffi::td_sym_count() };
        let mut out = Vec::with_capacity(count as usize);
        for i in 0..count {
            let s = unsafe { ffi::td_sym_str(i as i64) };
            if s.is_null() {
                out.push(String::new());
            } else {
                out.push(unsafe { sym_to_string(s) });
            }
        }
        Ok(self.dictionary.get_or_init(|| out))
    }

    fn cached_view<'a>(&self, cell: &'a OnceCell<Buffer>, elem_size: usize) -> Result<&'a Buffer> {
        if let Some(buf) = cell.get() {
            return Ok(buf);
        }
        let vec = self.guard.as_ptr();
        let len = unsafe { ffi::td_len(vec) } as usize;
        let data = unsafe { resolve_data_ptr(vec, self.dtype) };
        // One retain pairs with the view; the guarded release runs when the
        // view is dropped, and is skipped after engine teardown.
        let guard = unsafe { ValueGuard::retain(vec, self.guard.alive_flag().clone()) };
        Ok(cell.get_or_init(|| Buffer {
            data,
            len: len * elem_size,
            _guard: guard,
        }))
    }
}

/// Resolve the data pointer of a possibly-sliced vector.
///
/// # Safety
/// `vec` must be a live vector.
pub(crate) unsafe fn resolve_data_ptr(vec: *mut ffi::td_t, dtype: i8) -> *const u8 {
    let attrs = unsafe { ffi::td_attrs(vec) };
    if attrs & ffi::TD_ATTR_SLICE != 0 {
        let slice = unsafe { (*vec).head.slice };
        let esz = ffi::td_stored_elem_size(dtype, attrs);
        unsafe {
            (ffi::td_data(slice.slice_parent) as *const u8)
                .add(slice.slice_offset as usize * esz)
        }
    } else {
        unsafe { ffi::td_data(vec) as *const u8 }
    }
}
