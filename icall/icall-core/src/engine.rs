//! Capability surface consumed from a WebAssembly execution engine.
//!
//! Handles are opaque to this crate: instances, execution environments and
//! resolved functions are whatever the engine says they are. The protocol only
//! needs to create and destroy an execution environment, look up an export by
//! name, call either an export or a table slot, and ask the instance what went
//! wrong after a call raised an exception.

/// Slot in a module instance's indirect function table.
pub type TableIndex = u32;

/// Target of a call through [`Engine::call`].
#[derive(Debug)]
pub enum Callee<'a, F> {
    /// A function previously resolved by export name.
    Export(&'a F),
    /// Whatever function currently occupies this slot of the instance's table.
    TableSlot(TableIndex),
}

impl<F> Clone for Callee<'_, F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for Callee<'_, F> {}

/// Returned by [`Engine::call`] when the engine raised an exception.
///
/// Carries no detail on purpose: the message lives on the module instance and
/// is read back through [`Engine::exception`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionRaised;

/// Execution engine capabilities used by the dispatcher.
pub trait Engine {
    /// A live, instantiated guest module.
    type Instance;
    /// Call stack and register state for one logical call chain.
    type ExecEnv;
    /// A function resolved from an instance's exports.
    type Function;

    /// Create an execution environment bound to `instance` with a stack of
    /// `stack_size` bytes. `None` on resource exhaustion, an invalid instance,
    /// or a stack size the engine does not accept.
    fn create_exec_env(&mut self, instance: &Self::Instance, stack_size: u32) -> Option<Self::ExecEnv>;

    /// Destroy an execution environment. Consumes it, so a second destroy of
    /// the same environment does not type-check.
    fn destroy_exec_env(&mut self, env: Self::ExecEnv);

    /// Look up an exported function by name.
    fn lookup_function(&self, instance: &Self::Instance, name: &str) -> Option<Self::Function>;

    /// Call `callee` with `args`, writing its results into `results`.
    ///
    /// On `Err` the engine has recorded an exception on the instance the
    /// environment is bound to.
    fn call(
        &mut self,
        env: &mut Self::ExecEnv,
        callee: Callee<'_, Self::Function>,
        args: &[u32],
        results: &mut [u32],
    ) -> Result<(), ExceptionRaised>;

    /// Human-readable message of the most recent exception on `instance`.
    fn exception(&self, instance: &Self::Instance) -> Option<String>;
}
