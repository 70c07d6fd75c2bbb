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

// Raw FFI bindings to the Teide C17 engine
// Hand-written from include/teide/td.h, restricted to the surface the
// bridge consumes: refcounting, error sentinels, heap/symbol lifecycle,
// CSV ingestion, table/column introspection, and the operation graph.
#![allow(non_camel_case_types, non_upper_case_globals, dead_code)]

use std::os::raw::{c_char, c_double, c_void};
use std::sync::atomic::AtomicU32;

// ===== Type Constants =====

pub const TD_LIST: i8 = 0;
pub const TD_BOOL: i8 = 1;
pub const TD_U8: i8 = 2;
pub const TD_CHAR: i8 = 3;
pub const TD_I16: i8 = 4;
pub const TD_I32: i8 = 5;
pub const TD_I64: i8 = 6;
pub const TD_F64: i8 = 7;
pub const TD_DATE: i8 = 9;
pub const TD_TIME: i8 = 10;
pub const TD_TIMESTAMP: i8 = 11;
pub const TD_GUID: i8 = 12;
pub const TD_TABLE: i8 = 13;
pub const TD_SEL: i8 = 16;
pub const TD_SYM: i8 = 20;

pub const TD_TYPE_COUNT: usize = 21;

// ===== Symbol Width Constants =====

pub const TD_SYM_W_MASK: u8 = 0x03;
pub const TD_SYM_W8: u8 = 0x00;
pub const TD_SYM_W16: u8 = 0x01;
pub const TD_SYM_W32: u8 = 0x02;
pub const TD_SYM_W64: u8 = 0x03;

/// Read a sym index at the correct width.
/// # Safety
/// `data` must point to valid column data, `row` must be in bounds.
#[inline]
pub unsafe fn read_sym(data: *const u8, row: usize, _t: i8, attrs: u8) -> i64 {
    match attrs & TD_SYM_W_MASK {
        TD_SYM_W8 => (unsafe { *data.add(row) }) as i64,
        TD_SYM_W16 => (unsafe { *(data as *const u16).add(row) }) as i64,
        TD_SYM_W32 => (unsafe { *(data as *const u32).add(row) }) as i64,
        _ => unsafe { *(data as *const i64).add(row) },
    }
}

/// Stored element width of a column, accounting for narrow sym indices.
pub fn td_stored_elem_size(t: i8, attrs: u8) -> usize {
    if t == TD_SYM {
        match attrs & TD_SYM_W_MASK {
            TD_SYM_W8 => 1,
            TD_SYM_W16 => 2,
            TD_SYM_W32 => 4,
            _ => 8,
        }
    } else {
        // SAFETY: td_type_sizes is a static table initialized by the engine.
        unsafe { td_elem_size(t) as usize }
    }
}

// ===== Attribute Flags =====

pub const TD_ATTR_SLICE: u8 = 0x10;
pub const TD_ATTR_NULLMAP_EXT: u8 = 0x20;
pub const TD_ATTR_HAS_NULLS: u8 = 0x40;

// ===== Aggregate Opcode Constants (passed to td_group) =====

pub const OP_SUM: u16 = 50;
pub const OP_PROD: u16 = 51;
pub const OP_MIN: u16 = 52;
pub const OP_MAX: u16 = 53;
pub const OP_COUNT: u16 = 54;
pub const OP_AVG: u16 = 55;
pub const OP_FIRST: u16 = 56;
pub const OP_LAST: u16 = 57;

// ===== Error Handling =====

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum td_err_t {
    TD_OK = 0,
    TD_ERR_OOM = 1,
    TD_ERR_TYPE = 2,
    TD_ERR_RANGE = 3,
    TD_ERR_LENGTH = 4,
    TD_ERR_RANK = 5,
    TD_ERR_DOMAIN = 6,
    TD_ERR_NYI = 7,
    TD_ERR_IO = 8,
    TD_ERR_SCHEMA = 9,
    TD_ERR_CORRUPT = 10,
    TD_ERR_CANCEL = 11,
}

/// Equivalent to C macro: `TD_ERR_PTR(e)` — cast error code to pointer.
///
/// # Safety
/// The returned pointer is an encoded error sentinel and must never be dereferenced.
#[inline]
pub unsafe fn td_err_ptr(e: td_err_t) -> *mut td_t {
    e as usize as *mut td_t
}

/// Equivalent to C macro: `TD_IS_ERR(p)` — true if pointer is an error sentinel.
#[inline]
pub fn td_is_err(p: *const td_t) -> bool {
    (p as usize) < 32
}

/// Equivalent to C macro: `TD_ERR_CODE(p)` — extract error code from error pointer.
#[inline]
pub fn td_err_code(p: *const td_t) -> td_err_t {
    match p as usize as u32 {
        0 => td_err_t::TD_OK,
        1 => td_err_t::TD_ERR_OOM,
        2 => td_err_t::TD_ERR_TYPE,
        3 => td_err_t::TD_ERR_RANGE,
        4 => td_err_t::TD_ERR_LENGTH,
        5 => td_err_t::TD_ERR_RANK,
        6 => td_err_t::TD_ERR_DOMAIN,
        7 => td_err_t::TD_ERR_NYI,
        8 => td_err_t::TD_ERR_IO,
        9 => td_err_t::TD_ERR_SCHEMA,
        10 => td_err_t::TD_ERR_CORRUPT,
        11 => td_err_t::TD_ERR_CANCEL,
        _ => td_err_t::TD_ERR_CORRUPT,
    }
}

// ===== Core Type: td_t (32-byte block header) =====

/// Bytes 0-15 union: nullmap / slice / ext_nullmap
#[repr(C)]
#[derive(Copy, Clone)]
pub union td_t_head {
    pub nullmap: [u8; 16],
    pub slice: td_t_slice,
    pub ext: td_t_ext_nullmap,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct td_t_slice {
    pub slice_parent: *mut td_t,
    pub slice_offset: i64,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct td_t_ext_nullmap {
    pub ext_nullmap: *mut td_t,
    pub _reserved: i64,
}

/// Bytes 24-31 value union
#[repr(C)]
#[derive(Copy, Clone)]
pub union td_t_val {
    pub b8: u8,
    pub u8_: u8,
    pub c8: c_char,
    pub i16_: i16,
    pub i32_: i32,
    pub u32_: u32,
    pub i64_: i64,
    pub f64_: c_double,
    pub obj: *mut td_t,
    pub len: i64,
}

/// The 32-byte block header. Layout must match C exactly.
///
/// Not `Copy`/`Clone` because the `rc` field is `AtomicU32` (matching the C
/// `_Atomic(uint32_t)`). This is fine — Rust code only ever handles `td_t`
/// through `*mut td_t` pointers, never by value.
#[repr(C)]
pub struct td_t {
    /// Bytes 0-15
    pub head: td_t_head,
    /// Byte 16
    pub mmod: u8,
    /// Byte 17
    pub order: u8,
    /// Byte 18
    pub type_: i8,
    /// Byte 19
    pub attrs: u8,
    /// Bytes 20-23: reference count.
    /// All atomic operations on `rc` go through the C FFI (`td_retain`,
    /// `td_release`); Rust never manipulates this field directly.
    pub rc: AtomicU32,
    /// Bytes 24-31
    pub val: td_t_val,
}

// ===== Inline Accessors =====

/// Get the type tag of a td_t.
///
/// # Safety
/// `v` must be a valid non-null pointer to a live `td_t`.
#[inline]
pub unsafe fn td_type(v: *const td_t) -> i8 {
    unsafe { (*v).type_ }
}

/// Get the length (for vectors).
///
/// # Safety
/// `v` must be a valid non-null pointer to a live `td_t`.
#[inline]
pub unsafe fn td_len(v: *const td_t) -> i64 {
    unsafe { (*v).val.len }
}

/// Get the attrs field of a td_t.
///
/// # Safety
/// `v` must be a valid non-null pointer to a live `td_t`.
#[inline]
pub unsafe fn td_attrs(v: *const td_t) -> u8 {
    unsafe { (*v).attrs }
}

/// Get pointer to data payload (byte 32 onward).
///
/// # Safety
/// `v` must be a valid non-null pointer to a live `td_t`.
#[inline]
pub unsafe fn td_data(v: *mut td_t) -> *mut c_void {
    unsafe { (v as *mut u8).add(32) as *mut c_void }
}

/// Element size for a given type tag.
///
/// Returns 0 if `t` is out of range (instead of panicking), which is safe
/// because callers already treat 0 as an error indicator.
///
/// # Safety
/// Caller must ensure the C runtime is initialized so `td_type_sizes` is valid.
#[inline]
pub unsafe fn td_elem_size(t: i8) -> u8 {
    if (t as usize) >= TD_TYPE_COUNT {
        return 0;
    }
    unsafe { td_type_sizes[t as usize] }
}

// ===== Operation Node =====

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct td_op_t {
    pub opcode: u16,
    pub arity: u8,
    pub flags: u8,
    pub out_type: i8,
    pub pad: [u8; 3],
    pub id: u32,
    pub est_rows: u32,
    pub inputs: [*mut td_op_t; 2],
}

// Extended op node — opaque (104 bytes, complex unions).
#[repr(C)]
pub struct td_op_ext_t {
    _opaque: [u8; 104],
}

// ===== Operation Graph =====

#[repr(C)]
pub struct td_graph_t {
    pub nodes: *mut td_op_t,
    pub node_count: u32,
    pub node_cap: u32,
    pub table: *mut td_t,
    pub ext_nodes: *mut *mut td_op_ext_t,
    pub ext_count: u32,
    pub ext_cap: u32,
    pub selection: *mut td_t,
}

// ===== Extern: type sizes table =====

extern "C" {
    pub static td_type_sizes: [u8; TD_TYPE_COUNT];
}

// ===== Extern "C" Function Declarations =====

extern "C" {
    // --- Error ---
    pub fn td_err_str(e: td_err_t) -> *const c_char;

    // --- Memory Allocator / Heap API ---
    pub fn td_heap_init();
    pub fn td_heap_destroy();

    // --- COW / Ref Counting API ---
    pub fn td_retain(v: *mut td_t);
    pub fn td_release(v: *mut td_t);

    // --- String API ---
    pub fn td_str_ptr(s: *mut td_t) -> *const c_char;
    pub fn td_str_len(s: *mut td_t) -> usize;

    // --- Symbol Intern Table API ---
    pub fn td_sym_init();
    pub fn td_sym_destroy();
    pub fn td_sym_intern(s: *const c_char, len: usize) -> i64;
    pub fn td_sym_find(s: *const c_char, len: usize) -> i64;
    pub fn td_sym_str(id: i64) -> *mut td_t;
    pub fn td_sym_count() -> u32;

    // --- Table API ---
    pub fn td_table_get_col(tbl: *mut td_t, name_id: i64) -> *mut td_t;
    pub fn td_table_get_col_idx(tbl: *mut td_t, idx: i64) -> *mut td_t;
    pub fn td_table_col_name(tbl: *mut td_t, idx: i64) -> i64;
    pub fn td_table_ncols(tbl: *mut td_t) -> i64;
    pub fn td_table_nrows(tbl: *mut td_t) -> i64;

    // --- Operation Graph API ---
    pub fn td_graph_new(tbl: *mut td_t) -> *mut td_graph_t;
    pub fn td_graph_free(g: *mut td_graph_t);

    // Source ops
    pub fn td_scan(g: *mut td_graph_t, col_name: *const c_char) -> *mut td_op_t;
    pub fn td_const_f64(g: *mut td_graph_t, val: c_double) -> *mut td_op_t;
    pub fn td_const_i64(g: *mut td_graph_t, val: i64) -> *mut td_op_t;
    pub fn td_const_bool(g: *mut td_graph_t, val: bool) -> *mut td_op_t;
    pub fn td_const_str(g: *mut td_graph_t, s: *const c_char) -> *mut td_op_t;
    pub fn td_const_table(g: *mut td_graph_t, table: *mut td_t) -> *mut td_op_t;

    // Unary element-wise ops
    pub fn td_neg(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_abs(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_not(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_sqrt_op(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_log_op(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_exp_op(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_ceil_op(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_floor_op(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_isnull(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;

    // Binary element-wise ops
    pub fn td_add(g: *mut td_graph_t, a: *mut td_op_t, b: *mut td_op_t) -> *mut td_op_t;
    pub fn td_sub(g: *mut td_graph_t, a: *mut td_op_t, b: *mut td_op_t) -> *mut td_op_t;
    pub fn td_mul(g: *mut td_graph_t, a: *mut td_op_t, b: *mut td_op_t) -> *mut td_op_t;
    pub fn td_div(g: *mut td_graph_t, a: *mut td_op_t, b: *mut td_op_t) -> *mut td_op_t;
    pub fn td_mod(g: *mut td_graph_t, a: *mut td_op_t, b: *mut td_op_t) -> *mut td_op_t;
    pub fn td_eq(g: *mut td_graph_t, a: *mut td_op_t, b: *mut td_op_t) -> *mut td_op_t;
    pub fn td_ne(g: *mut td_graph_t, a: *mut td_op_t, b: *mut td_op_t) -> *mut td_op_t;
    pub fn td_lt(g: *mut td_graph_t, a: *mut td_op_t, b: *mut td_op_t) -> *mut td_op_t;
    pub fn td_le(g: *mut td_graph_t, a: *mut td_op_t, b: *mut td_op_t) -> *mut td_op_t;
    pub fn td_gt(g: *mut td_graph_t, a: *mut td_op_t, b: *mut td_op_t) -> *mut td_op_t;
    pub fn td_ge(g: *mut td_graph_t, a: *mut td_op_t, b: *mut td_op_t) -> *mut td_op_t;
    pub fn td_and(g: *mut td_graph_t, a: *mut td_op_t, b: *mut td_op_t) -> *mut td_op_t;
    pub fn td_or(g: *mut td_graph_t, a: *mut td_op_t, b: *mut td_op_t) -> *mut td_op_t;

    // Reduction ops
    pub fn td_sum(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_prod(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_min_op(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_max_op(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_count(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_avg(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_first(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;
    pub fn td_last(g: *mut td_graph_t, a: *mut td_op_t) -> *mut td_op_t;

    // Structural ops
    pub fn td_filter(
        g: *mut td_graph_t,
        input: *mut td_op_t,
        predicate: *mut td_op_t,
    ) -> *mut td_op_t;

    pub fn td_sort_op(
        g: *mut td_graph_t,
        df_node: *mut td_op_t,
        keys: *mut *mut td_op_t,
        descs: *mut u8,
        nulls_first: *mut u8,
        n_cols: u8,
    ) -> *mut td_op_t;

    pub fn td_group(
        g: *mut td_graph_t,
        keys: *mut *mut td_op_t,
        n_keys: u8,
        agg_ops: *mut u16,
        agg_ins: *mut *mut td_op_t,
        n_aggs: u8,
    ) -> *mut td_op_t;

    pub fn td_head(g: *mut td_graph_t, input: *mut td_op_t, n: i64) -> *mut td_op_t;
    pub fn td_alias(g: *mut td_graph_t, input: *mut td_op_t, name: *const c_char) -> *mut td_op_t;

    // --- Optimizer API ---
    pub fn td_optimize(g: *mut td_graph_t, root: *mut td_op_t) -> *mut td_op_t;

    // --- Executor API ---
    pub fn td_execute(g: *mut td_graph_t, root: *mut td_op_t) -> *mut td_t;

    // --- CSV API ---
    pub fn td_read_csv(path: *const c_char) -> *mut td_t;
    pub fn td_read_csv_opts(
        path: *const c_char,
        delimiter: c_char,
        header: bool,
        col_types: *const i8,
        n_types: i32,
    ) -> *mut td_t;
    pub fn td_write_csv(table: *mut td_t, path: *const c_char) -> td_err_t;

    // --- Pool / Parallel API ---
    pub fn td_pool_destroy();
}

// ===== Compile-time layout assertions =====

const _: () = {
    assert!(std::mem::size_of::<td_t>() == 32);
    assert!(std::mem::size_of::<td_op_t>() == 32);
    assert!(std::mem::size_of::<td_op_ext_t>() == 104);
    assert!(std::mem::size_of::<td_graph_t>() == 48);
};
