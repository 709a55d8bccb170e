use parking_lot::Mutex;

use super::Context;

/// Upper bound on idle contexts kept for reuse.
const MAX_IDLE: usize = 1024;

/// Free list of request contexts.
///
/// Purely an allocation optimisation: a disabled pool hands out fresh
/// contexts and drops returned ones, with identical observable behavior.
pub(crate) struct ContextPool {
    idle: Mutex<Vec<Context>>,
    enabled: bool,
}

impl ContextPool {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            enabled,
        }
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.idle.get_mut().clear();
        }
    }

    /// Take an idle context or build a new one. Callers must
    /// [`reset`](Context::reset) it before use.
    pub(crate) fn acquire(&self) -> Context {
        if !self.enabled {
            return Context::default();
        }
        self.idle.lock().pop().unwrap_or_default()
    }

    /// Return a finished context, clearing everything it holds.
    pub(crate) fn release(&self, mut ctx: Context) {
        if !self.enabled {
            return;
        }
        ctx.recycle();
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE {
            idle.push(ctx);
        }
    }

    #[cfg(test)]
    pub(crate) fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }
}
