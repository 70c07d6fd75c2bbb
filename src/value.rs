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

//! Ownership plumbing for refcounted engine values.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ffi;

/// A raw engine pointer that may cross the worker-thread boundary.
///
/// The pointer is only ever dereferenced on the worker thread; off-worker
/// code restricts itself to header reads and the atomic retain/release
/// entry points, which the engine permits from any thread.
#[derive(Clone, Copy)]
pub(crate) struct RawVal(pub *mut ffi::td_t);

unsafe impl Send for RawVal {}

/// RAII ownership of one retain on an engine value.
///
/// Dropping the guard releases the value *only if* the engine is still
/// alive. Once the worker has torn the heap down, the release is skipped:
/// the pointer may already be invalid and calling into the engine would be
/// unsafe. This is how host-side handles survive being reclaimed after
/// `Context::destroy`.
pub(crate) struct ValueGuard {
    raw: *mut ffi::td_t,
    alive: Arc<AtomicBool>,
}

// The guard may be dropped from any thread: `td_release` is an atomic
// refcount decrement and the alive flag is itself atomic.
unsafe impl Send for ValueGuard {}
unsafe impl Sync for ValueGuard {}

impl ValueGuard {
    /// Take ownership of an already-counted reference (no extra retain).
    pub fn from_owned(raw: *mut ffi::td_t, alive: Arc<AtomicBool>) -> Self {
        ValueGuard { raw, alive }
    }

    /// Retain `raw` and guard the new reference.
    ///
    /// # Safety
    /// `raw` must be a valid, non-sentinel engine value and the engine must
    /// still be alive.
    pub unsafe fn retain(raw: *mut ffi::td_t, alive: Arc<AtomicBool>) -> Self {
        unsafe { ffi::td_retain(raw) };
        ValueGuard { raw, alive }
    }

    pub fn as_ptr(&self) -> *mut ffi::td_t {
        self.raw
    }

    pub fn alive_flag(&self) -> &Arc<AtomicBool> {
        &self.alive
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl Drop for ValueGuard {
    fn drop(&mut self) {
        if !self.raw.is_null() && !ffi::td_is_err(self.raw) && self.alive.load(Ordering::Acquire) {
            unsafe { ffi::td_release(self.raw) };
        }
    }
}
