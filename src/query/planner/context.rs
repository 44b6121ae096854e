// Compilation Context
//
// What one query compilation hands to the rewrite passes: the catalog
// snapshot and the cooperative interrupt check of the enclosing compiler.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::catalog::Catalog;
use crate::query::planner::error::{RewriteError, RewriteResult};

/// Cooperative cancellation check, polled at every node a pass visits
pub trait Interrupt: Send + Sync {
    fn check(&self) -> RewriteResult<()>;
}

/// Never fires
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverInterrupt;

impl Interrupt for NeverInterrupt {
    fn check(&self) -> RewriteResult<()> {
        Ok(())
    }
}

/// Shared flag another thread can raise to cancel the compilation
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Interrupt for CancellationToken {
    fn check(&self) -> RewriteResult<()> {
        if self.is_cancelled() {
            Err(RewriteError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Wall-clock deadline for the compilation
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Deadline { at }
    }

    pub fn after(timeout: Duration) -> Self {
        Deadline { at: Instant::now() + timeout }
    }
}

impl Interrupt for Deadline {
    fn check(&self) -> RewriteResult<()> {
        if Instant::now() >= self.at {
            Err(RewriteError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }
}

/// Per-compilation inputs of the rewrite passes
#[derive(Clone)]
pub struct CompilationContext {
    catalog: Arc<Catalog>,
    interrupt: Arc<dyn Interrupt>,
}

impl CompilationContext {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        CompilationContext {
            catalog,
            interrupt: Arc::new(NeverInterrupt),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Arc<dyn Interrupt>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn interrupt(&self) -> &dyn Interrupt {
        self.interrupt.as_ref()
    }

    pub fn check_interrupt(&self) -> RewriteResult<()> {
        self.interrupt.check()
    }
}

impl fmt::Debug for CompilationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationContext")
            .field("catalog_version", &self.catalog.version())
            .finish()
    }
}
