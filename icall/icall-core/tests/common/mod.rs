#![allow(dead_code)]
//! Recording engine used by the protocol tests.
//!
//! Every capability call is appended to an event log, and misuse of an
//! execution environment (use after destroy, destroy twice, unknown id) panics
//! so the offending test fails loudly.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use icall_core::{Callee, Engine, ExceptionRaised};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Create { stack_size: u32, granted: Option<u64> },
    Destroy(u64),
    Lookup(String),
    CallExport { env: u64, name: String },
    CallSlot { env: u64, index: u32, args: Vec<u32> },
}

/// What the resolver export does when called.
#[derive(Debug, Clone)]
pub enum Export {
    Returns(u32),
    Traps(&'static str),
}

/// What a table slot does when called.
#[derive(Debug, Clone)]
pub enum Slot {
    Accepts,
    Traps(&'static str),
    WrongSignature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instance(pub u32);

#[derive(Debug)]
pub struct Env {
    id: u64,
    instance: u32,
}

#[derive(Debug, Clone)]
pub struct Func(String);

#[derive(Debug)]
pub struct RecordingEngine {
    pub min_stack: u32,
    pub refuse_contexts: bool,
    pub exports: HashMap<String, Export>,
    pub table: Vec<Option<Slot>>,
    events: RefCell<Vec<Event>>,
    pub suppress_messages: bool,
    live: BTreeSet<u64>,
    destroyed: BTreeSet<u64>,
    next_id: u64,
    exception: Option<String>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            min_stack: 1024,
            refuse_contexts: false,
            exports: HashMap::new(),
            table: Vec::new(),
            events: RefCell::new(Vec::new()),
            suppress_messages: false,
            live: BTreeSet::new(),
            destroyed: BTreeSet::new(),
            next_id: 1,
            exception: None,
        }
    }

    /// Module shaped like the canonical guest: `addr` returns `index`, and the
    /// table has two slots of which slot 1 accepts a single u32.
    pub fn canonical(index: u32) -> Self {
        let mut engine = Self::new();
        engine.exports.insert("addr".into(), Export::Returns(index));
        engine.table = vec![Some(Slot::Accepts), Some(Slot::Accepts)];
        engine
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn creates(&self) -> usize {
        self.events.borrow().iter().filter(|e| matches!(e, Event::Create { granted: Some(_), .. })).count()
    }

    pub fn create_attempts(&self) -> usize {
        self.events.borrow().iter().filter(|e| matches!(e, Event::Create { .. })).count()
    }

    pub fn destroys(&self) -> usize {
        self.events.borrow().iter().filter(|e| matches!(e, Event::Destroy(_))).count()
    }

    pub fn live_contexts(&self) -> usize {
        self.live.len()
    }

    pub fn slot_calls(&self) -> Vec<(u32, Vec<u32>)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::CallSlot { index, args, .. } => Some((*index, args.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn export_calls(&self) -> usize {
        self.events.borrow().iter().filter(|e| matches!(e, Event::CallExport { .. })).count()
    }

    fn record(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    fn raise(&mut self, msg: String) -> Result<(), ExceptionRaised> {
        self.exception = if self.suppress_messages { None } else { Some(msg) };
        Err(ExceptionRaised)
    }
}

impl Engine for RecordingEngine {
    type Instance = Instance;
    type ExecEnv = Env;
    type Function = Func;

    fn create_exec_env(&mut self, instance: &Instance, stack_size: u32) -> Option<Env> {
        if self.refuse_contexts || stack_size < self.min_stack {
            self.record(Event::Create { stack_size, granted: None });
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id);
        self.record(Event::Create { stack_size, granted: Some(id) });
        Some(Env { id, instance: instance.0 })
    }

    fn destroy_exec_env(&mut self, env: Env) {
        assert!(self.live.remove(&env.id), "destroying unknown or dead context {}", env.id);
        assert!(self.destroyed.insert(env.id), "context {} destroyed twice", env.id);
        self.record(Event::Destroy(env.id));
    }

    fn lookup_function(&self, _instance: &Instance, name: &str) -> Option<Func> {
        self.record(Event::Lookup(name.to_string()));
        self.exports.get(name).map(|_| Func(name.to_string()))
    }

    fn call(
        &mut self,
        env: &mut Env,
        callee: Callee<'_, Func>,
        args: &[u32],
        results: &mut [u32],
    ) -> Result<(), ExceptionRaised> {
        assert!(self.live.contains(&env.id), "call on dead context {}", env.id);
        assert_eq!(env.instance, 0, "context bound to the wrong instance");
        self.exception = None;
        match callee {
            Callee::Export(Func(name)) => {
                self.record(Event::CallExport { env: env.id, name: name.clone() });
                assert!(args.is_empty(), "direct leg takes no arguments");
                assert_eq!(results.len(), 1, "direct leg expects one result");
                match self.exports.get(name).cloned() {
                    Some(Export::Returns(v)) => {
                        results[0] = v;
                        Ok(())
                    }
                    Some(Export::Traps(msg)) => self.raise(format!("Exception: {msg}")),
                    None => self.raise("Exception: function vanished".into()),
                }
            }
            Callee::TableSlot(index) => {
                self.record(Event::CallSlot { env: env.id, index, args: args.to_vec() });
                assert!(results.is_empty(), "indirect leg expects no result");
                let size = self.table.len();
                match self.table.get(index as usize).cloned() {
                    None => self.raise(format!(
                        "Exception: undefined element: table index {index} is out of bounds (table size {size})"
                    )),
                    Some(None) => self.raise(format!("Exception: uninitialized element {index}")),
                    Some(Some(Slot::Accepts)) if args.len() == 1 => Ok(()),
                    Some(Some(Slot::Accepts)) | Some(Some(Slot::WrongSignature)) => {
                        self.raise("Exception: indirect call type mismatch".into())
                    }
                    Some(Some(Slot::Traps(msg))) => self.raise(format!("Exception: {msg}")),
                }
            }
        }
    }

    fn exception(&self, _instance: &Instance) -> Option<String> {
        self.exception.clone()
    }
}
