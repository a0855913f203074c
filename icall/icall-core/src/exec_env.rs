//! Scoped execution-environment acquisition.
//!
//! An execution environment is an engine-native resource: it must be destroyed
//! exactly once, on every exit path of the dispatch that created it.
//! [`ScopedExecEnv`] ties that to `Drop`, and the engine's destroy capability
//! takes the environment by value, so neither a leak nor a double destroy can
//! be written against this API.

use tracing::{debug, warn};

use crate::engine::{Callee, Engine, ExceptionRaised};
use crate::error::DispatchError;

/// An execution environment owned for the duration of one dispatch attempt.
pub struct ScopedExecEnv<'e, E: Engine> {
    engine: &'e mut E,
    // Some(..) from acquire until Drop takes it.
    env: Option<E::ExecEnv>,
}

impl<'e, E: Engine> ScopedExecEnv<'e, E> {
    /// Create an execution environment for `instance` with `stack_size` bytes
    /// of stack.
    pub fn acquire(
        engine: &'e mut E,
        instance: &E::Instance,
        stack_size: u32,
    ) -> Result<Self, DispatchError> {
        match engine.create_exec_env(instance, stack_size) {
            Some(env) => {
                debug!(stack_size, "execution context acquired");
                Ok(Self { engine, env: Some(env) })
            }
            None => {
                warn!(stack_size, "engine refused to create an execution context");
                Err(DispatchError::ContextCreationFailed { stack_size })
            }
        }
    }

    /// Shared access to the engine, for lookups and exception queries.
    pub fn engine(&self) -> &E {
        &*self.engine
    }

    /// Call into the engine on this environment.
    pub fn call(
        &mut self,
        callee: Callee<'_, E::Function>,
        args: &[u32],
        results: &mut [u32],
    ) -> Result<(), ExceptionRaised> {
        let Self { engine, env } = self;
        match env.as_mut() {
            Some(env) => engine.call(env, callee, args, results),
            None => Err(ExceptionRaised),
        }
    }

    /// Release the environment now rather than at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl<E: Engine> Drop for ScopedExecEnv<'_, E> {
    fn drop(&mut self) {
        if let Some(env) = self.env.take() {
            self.engine.destroy_exec_env(env);
            debug!("execution context released");
        }
    }
}
