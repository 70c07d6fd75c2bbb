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

//! Dedicated worker thread serializing all access to the engine.
//!
//! The C engine is single-threaded: heap, symbol table, and graph state are
//! process-global and non-reentrant. Every engine call is funneled through
//! one worker per context; callers either block on a one-shot rendezvous or
//! receive the result through a future.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use futures::channel::oneshot;
use log::{debug, error};

use crate::error::{Error, Result};
use crate::ffi;
use crate::value::RawVal;

/// One live dispatcher per process — the engine keeps global state.
static ENGINE_RUNNING: AtomicBool = AtomicBool::new(false);

pub(crate) type Work = Box<dyn FnOnce() -> RawVal + Send + 'static>;

struct WorkItem {
    work: Work,
    done: oneshot::Sender<RawVal>,
}

struct QueueState {
    items: VecDeque<WorkItem>,
    shutdown: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    cv: Condvar,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the worker thread and the FIFO work queue.
pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    alive: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn the worker thread. The worker brings the engine up (heap +
    /// symbol table) before entering its loop.
    pub fn spawn() -> Result<Arc<Dispatcher>> {
        if ENGINE_RUNNING
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::EngineBusy);
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                items: VecDeque::new(),
                shutdown: false,
            }),
            cv: Condvar::new(),
        });
        let alive = Arc::new(AtomicBool::new(true));

        let worker = {
            let shared = Arc::clone(&shared);
            let alive = Arc::clone(&alive);
            std::thread::Builder::new()
                .name("teide-worker".into())
                .spawn(move || worker_main(shared, alive))
                .map_err(|e| {
                    ENGINE_RUNNING.store(false, Ordering::Release);
                    Error::Spawn(e)
                })?
        };

        Ok(Arc::new(Dispatcher {
            shared,
            alive,
            worker: Mutex::new(Some(worker)),
        }))
    }

    /// True while the engine heap is safe to call into. Shared with every
    /// facade handle and zero-copy view created against this dispatcher.
    pub fn alive_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    /// Enqueue `work` and block until the worker has executed it.
    pub fn run_sync(&self, work: Work) -> Result<RawVal> {
        let rx = self.enqueue(work)?;
        futures::executor::block_on(rx).map_err(|_| Error::WorkerGone)
    }

    /// Enqueue `work` without blocking; the returned receiver resolves
    /// exactly once with the result.
    pub fn run_async(&self, work: Work) -> Result<oneshot::Receiver<RawVal>> {
        self.enqueue(work)
    }

    fn enqueue(&self, work: Work) -> Result<oneshot::Receiver<RawVal>> {
        let (tx, rx) = oneshot::channel();
        {
            let mut q = lock(&self.shared.queue);
            if q.shutdown {
                return Err(Error::Shutdown);
            }
            q.items.push_back(WorkItem { work, done: tx });
        }
        self.shared.cv.notify_one();
        Ok(rx)
    }

    /// Stop the worker, drain the queue, and tear the engine down.
    ///
    /// Idempotent: a second call finds the worker already joined and
    /// returns immediately.
    pub fn shutdown(&self) {
        {
            let mut q = lock(&self.shared.queue);
            q.shutdown = true;
        }
        self.shared.cv.notify_one();

        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("engine worker panicked during shutdown");
            }
            ENGINE_RUNNING.store(false, Ordering::Release);
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_main(shared: Arc<Shared>, alive: Arc<AtomicBool>) {
    // SAFETY: this thread is the only one that touches engine state other
    // than retain/release, which are atomic.
    unsafe {
        ffi::td_heap_init();
        ffi::td_sym_init();
    }
    debug!("engine worker started");

    loop {
        let item = {
            let mut q = lock(&shared.queue);
            loop {
                if let Some(item) = q.items.pop_front() {
                    break Some(item);
                }
                if q.shutdown {
                    break None;
                }
                q = shared
                    .cv
                    .wait(q)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        let Some(item) = item else { break };

        let result = (item.work)();
        if let Err(unclaimed) = item.done.send(result) {
            // The submitter dropped its future; nothing will ever own the
            // produced value, so drop the reference here on the worker.
            let p = unclaimed.0;
            if !p.is_null() && !ffi::td_is_err(p) {
                unsafe { ffi::td_release(p) };
            }
        }
    }

    // Teardown order: the pool joins its own threads, the symbol table may
    // reference heap memory, and the alive flag must flip before the heap
    // (the only state guarded releases touch) disappears.
    unsafe {
        ffi::td_pool_destroy();
        ffi::td_sym_destroy();
    }
    alive.store(false, Ordering::Release);
    unsafe {
        ffi::td_heap_destroy();
    }
    debug!("engine worker exited");
}
