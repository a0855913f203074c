//! [`Runtime`]: the reference engine behind the `icall_core::Engine` trait.

use std::collections::HashSet;

use icall_core::{Callee, Engine, ExceptionRaised};
use tracing::{debug, warn};

use super::{instantiate, InstanceHandle, LoadedModule, Store};
use crate::config::{ConfigError, RuntimeConfig};
use crate::error::{InvokeError, LinkError, LoadError, Trap};
use crate::exec_env::{ExecEnv, StackBudget};
use crate::host::ImportResolver;
use crate::model::{FuncType, ValType, Value};
use crate::vm::interpreter;

/// A function resolved from an instance's exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionRef {
    instance: InstanceHandle,
    addr: usize,
}

impl FunctionRef {
    pub fn instance(&self) -> InstanceHandle {
        self.instance
    }
}

/// Owns the store and every execution environment handed out for it.
#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    store: Store,
    live_envs: HashSet<u64>,
    next_env_id: u64,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, store: Store::new(), live_envs: HashSet::new(), next_env_id: 1 })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Decode, validate and compile a binary module.
    pub fn load(&self, bytes: &[u8]) -> Result<LoadedModule, LoadError> {
        let loaded = LoadedModule::from_bytes(bytes)?;
        debug!(
            bytes = bytes.len(),
            functions = loaded.module().total_funcs(),
            exports = loaded.module().exports.len(),
            "module loaded"
        );
        Ok(loaded)
    }

    pub fn instantiate(&mut self, loaded: &LoadedModule, resolver: &impl ImportResolver) -> Result<InstanceHandle, LinkError> {
        let budget = self.default_budget();
        instantiate(&mut self.store, loaded, resolver, budget)
    }

    /// Tear down an instance and free its memories, tables, globals and
    /// functions. Environments still bound to it stop working and further
    /// calls on it trap. Returns false if it was already gone.
    pub fn deinstantiate(&mut self, instance: InstanceHandle) -> bool {
        if self.store.module(instance.0).is_err() {
            return false;
        }
        self.store.free_instance(instance.0);
        debug!(instance = instance.0, "module deinstantiated");
        true
    }

    /// Call an export by name on a fresh stack of the default size. Traps are
    /// also recorded as the instance's exception.
    pub fn invoke(&mut self, instance: InstanceHandle, name: &str, args: &[Value]) -> Result<Vec<Value>, InvokeError> {
        let f = self.lookup_function(&instance, name).ok_or_else(|| InvokeError::ExportNotFound(name.to_string()))?;
        self.set_exception(instance, None);
        let budget = self.default_budget();
        interpreter::invoke(&mut self.store, f.addr, args, budget).map_err(|trap| {
            self.record_trap(instance, &trap);
            InvokeError::Trap(trap)
        })
    }

    /// Number of execution environments created and not yet destroyed.
    pub fn live_exec_envs(&self) -> usize {
        self.live_envs.len()
    }

    /// Contents of the instance's memory, if it has one.
    pub fn memory(&self, instance: InstanceHandle) -> Option<&[u8]> {
        let addr = self.store.module(instance.0).ok()?.memory_addr()?;
        self.store.memory(addr).map(|m| m.data())
    }

    /// Bytes of linear memory held by live instances.
    pub fn resident_memory_bytes(&self) -> usize {
        self.store.memory_bytes()
    }

    fn default_budget(&self) -> StackBudget {
        StackBudget::new(self.config.default_stack_size, self.config.max_call_depth)
    }

    /// The exception slot survives deinstantiation so a failed call on a dead
    /// instance can still be reported.
    fn set_exception(&mut self, instance: InstanceHandle, message: Option<String>) {
        if let Some(m) = self.store.module_record_mut(instance.0) {
            m.exception = message;
        }
    }

    fn record_trap(&mut self, instance: InstanceHandle, trap: &Trap) {
        warn!(instance = instance.0, %trap, "wasm trap");
        self.set_exception(instance, Some(format!("Exception: {trap}")));
    }

    fn run_call(&mut self, env: &ExecEnv, callee: Callee<'_, FunctionRef>, args: &[u32], results: &mut [u32]) -> Result<(), Trap> {
        let instance = env.instance();
        self.store.module(instance.0)?;
        let expected = FuncType::cells(args.len(), results.len());
        let addr = match callee {
            Callee::Export(f) => {
                self.store.module(f.instance.0)?;
                let found = self.store.func(f.addr)?.ty();
                if *found != expected {
                    return Err(Trap::SignatureMismatch { expected, found: found.clone() });
                }
                f.addr
            }
            Callee::TableSlot(index) => {
                let addr = self.store.table_of(instance.0)?.slot(index)?;
                let found = self.store.func(addr)?.ty();
                if *found != expected {
                    return Err(Trap::IndirectCallTypeMismatch { expected, found: found.clone() });
                }
                addr
            }
        };
        let values: Vec<Value> = args.iter().map(|&a| Value::from(a)).collect();
        let out = interpreter::invoke(&mut self.store, addr, &values, env.budget(self.config.max_call_depth))?;
        for (slot, v) in results.iter_mut().zip(out) {
            *slot = v.as_u32().ok_or(Trap::OperandTypeMismatch(ValType::I32))?;
        }
        Ok(())
    }
}

impl Engine for Runtime {
    type Instance = InstanceHandle;
    type ExecEnv = ExecEnv;
    type Function = FunctionRef;

    fn create_exec_env(&mut self, instance: &InstanceHandle, stack_size: u32) -> Option<ExecEnv> {
        if self.store.module(instance.0).is_err() {
            warn!(instance = instance.0, "execution environment requested for a dead instance");
            return None;
        }
        if !self.config.accepts_stack_size(stack_size) {
            warn!(
                stack_size,
                min = self.config.min_stack_size,
                max = self.config.max_stack_size,
                "execution environment stack size out of range"
            );
            return None;
        }
        let id = self.next_env_id;
        self.next_env_id += 1;
        self.live_envs.insert(id);
        debug!(env = id, instance = instance.0, stack_size, "execution environment created");
        Some(ExecEnv::new(id, *instance, stack_size))
    }

    fn destroy_exec_env(&mut self, env: ExecEnv) {
        if self.live_envs.remove(&env.id()) {
            debug!(env = env.id(), "execution environment destroyed");
        } else {
            warn!(env = env.id(), "destroying an execution environment this runtime does not own");
        }
    }

    fn lookup_function(&self, instance: &InstanceHandle, name: &str) -> Option<FunctionRef> {
        let addr = self.store.module(instance.0).ok()?.export_func(name)?;
        Some(FunctionRef { instance: *instance, addr })
    }

    fn call(
        &mut self,
        env: &mut ExecEnv,
        callee: Callee<'_, FunctionRef>,
        args: &[u32],
        results: &mut [u32],
    ) -> Result<(), ExceptionRaised> {
        let instance = env.instance();
        self.set_exception(instance, None);
        self.run_call(env, callee, args, results).map_err(|trap| {
            self.record_trap(instance, &trap);
            ExceptionRaised
        })
    }

    fn exception(&self, instance: &InstanceHandle) -> Option<String> {
        self.store.module_record(instance.0)?.exception.clone()
    }
}
