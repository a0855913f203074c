//! Linking and instantiation of a [`LoadedModule`] into a [`Store`].

use std::collections::HashMap;

use tracing::{debug, warn};

use super::{
    instance::{FuncInstance, ModuleInstance, RuntimeExportDesc},
    GlobalInstance, InstanceHandle, LoadedModule, MemoryInstance, Store, TableInstance,
};
use crate::binary::cursor::Cursor;
use crate::error::LinkError;
use crate::exec_env::StackBudget;
use crate::host::ImportResolver;
use crate::model::{DataMode, ElementMode, ExportDesc, Expr, ImportDesc, Value};
use crate::vm::interpreter;

/// Evaluate a constant expression. `globals` are the store addresses of the
/// globals visible so far.
fn eval_const(store: &Store, globals: &[usize], expr: &Expr) -> Result<Value, LinkError> {
    const MALFORMED: LinkError = LinkError::ConstExpr("malformed constant expression");
    let mut cur = Cursor::new(&expr.body);
    let value = match cur.read_u8().map_err(|_| MALFORMED)? {
        0x41 => Value::I32(cur.read_var_i32().map_err(|_| MALFORMED)?),
        0x42 => Value::I64(cur.read_var_i64().map_err(|_| MALFORMED)?),
        0x43 => Value::F32(cur.read_u32_le().map_err(|_| MALFORMED)?),
        0x44 => Value::F64(cur.read_u64_le().map_err(|_| MALFORMED)?),
        0x23 => {
            let idx = cur.read_var_u32().map_err(|_| MALFORMED)?;
            let addr = globals.get(idx as usize).ok_or(LinkError::ConstExpr("global.get of an unknown global"))?;
            store.global(*addr).ok_or(LinkError::ConstExpr("dangling global"))?.get()
        }
        _ => return Err(LinkError::ConstExpr("unsupported constant instruction")),
    };
    match cur.read_u8() {
        Ok(0x0B) if cur.is_eof() => Ok(value),
        _ => Err(MALFORMED),
    }
}

fn const_offset(store: &Store, globals: &[usize], expr: &Expr) -> Result<u32, LinkError> {
    match eval_const(store, globals, expr)? {
        Value::I32(v) => Ok(v as u32),
        _ => Err(LinkError::ConstExpr("segment offset must be i32")),
    }
}

/// Instantiate `loaded`, resolving its function imports through `resolver`.
///
/// The instance slot is allocated first and only marked alive once
/// segments are applied and the start function (if any) has returned. On any
/// failure everything allocated for it is freed again.
pub fn instantiate(
    store: &mut Store,
    loaded: &LoadedModule,
    resolver: &impl ImportResolver,
    budget: StackBudget,
) -> Result<InstanceHandle, LinkError> {
    let handle = store.alloc_module(ModuleInstance::default());
    let mut inst = ModuleInstance { module_ir: loaded.module_arc(), ..ModuleInstance::default() };
    if let Err(err) = link(store, handle, loaded, resolver, &mut inst) {
        store.set_module(handle, inst);
        store.free_instance(handle.0);
        return Err(err);
    }
    let start = loaded.module().start.and_then(|s| inst.func_addr(s));
    inst.alive = true;
    store.set_module(handle, inst);

    if let Some(addr) = start {
        if let Err(trap) = interpreter::invoke(store, addr, &[], budget) {
            warn!(%trap, "start function trapped");
            store.free_instance(handle.0);
            return Err(LinkError::StartTrap(trap));
        }
    }
    debug!(instance = handle.0, "module instantiated");
    Ok(handle)
}

/// Allocate the instance's functions, tables, memories and globals, recording
/// each address in `inst` as it is taken, then apply segments and exports.
fn link(
    store: &mut Store,
    handle: InstanceHandle,
    loaded: &LoadedModule,
    resolver: &impl ImportResolver,
    inst: &mut ModuleInstance,
) -> Result<(), LinkError> {
    let module = loaded.module();
    for imp in &module.imports {
        let ImportDesc::Func(type_idx) = &imp.desc else {
            return Err(LinkError::UnsupportedImport {
                module: imp.module.clone(),
                name: imp.name.clone(),
                kind: imp.desc.kind(),
            });
        };
        let ty = module.types.get(*type_idx as usize).ok_or(LinkError::ConstExpr("import of an unknown type"))?;
        let host = resolver
            .resolve_func(&imp.module, &imp.name, ty)
            .ok_or_else(|| LinkError::UnresolvedImport { module: imp.module.clone(), name: imp.name.clone() })?;
        if host.ty != *ty {
            return Err(LinkError::TypeMismatch {
                context: "function import",
                expected: ty.to_string(),
                found: host.ty.to_string(),
            });
        }
        debug!(module = %imp.module, name = %imp.name, "import resolved");
        inst.funcs.push(store.alloc_func(FuncInstance::Host { ty: host.ty, f: host.f }));
    }
    for body in loaded.bodies() {
        inst.funcs.push(store.alloc_func(FuncInstance::Wasm { body: body.clone(), module: handle.0 }));
    }

    for t in &module.tables {
        inst.tables.push(store.alloc_table(TableInstance::new(t)));
    }
    for m in &module.memories {
        inst.memories.push(store.alloc_memory(MemoryInstance::new(m)));
    }
    for g in &module.globals {
        let init = eval_const(store, &inst.globals, &g.init)?;
        inst.globals.push(store.alloc_global(GlobalInstance::new(g.ty, init)));
    }

    for seg in &module.elements {
        let ElementMode::Active { table, offset } = &seg.mode else { continue };
        let offset = const_offset(store, &inst.globals, offset)?;
        let items: Vec<Option<usize>> = seg.init.iter().map(|f| f.and_then(|f| inst.func_addr(f))).collect();
        let addr = *inst.tables.get(*table as usize).ok_or(LinkError::ElemOutOfBounds)?;
        let target = store.table_mut(addr).ok_or(LinkError::ElemOutOfBounds)?;
        if !target.init(offset, &items) {
            warn!(offset, len = items.len(), size = target.size(), "element segment does not fit");
            return Err(LinkError::ElemOutOfBounds);
        }
    }

    for seg in &module.data {
        let DataMode::Active { memory, offset } = &seg.mode else { continue };
        let offset = const_offset(store, &inst.globals, offset)?;
        let addr = *inst.memories.get(*memory as usize).ok_or(LinkError::DataOutOfBounds)?;
        let target = store.memory_mut(addr).ok_or(LinkError::DataOutOfBounds)?;
        target.write(u64::from(offset), &seg.init).map_err(|_| LinkError::DataOutOfBounds)?;
    }

    inst.exports = module
        .exports
        .iter()
        .filter_map(|e| {
            let desc = match e.desc {
                ExportDesc::Func(i) => RuntimeExportDesc::Func(inst.func_addr(i)?),
                ExportDesc::Table(i) => RuntimeExportDesc::Table(*inst.tables.get(i as usize)?),
                ExportDesc::Memory(i) => RuntimeExportDesc::Memory(*inst.memories.get(i as usize)?),
                ExportDesc::Global(i) => RuntimeExportDesc::Global(*inst.globals.get(i as usize)?),
            };
            Some((e.name.clone(), desc))
        })
        .collect::<HashMap<_, _>>();
    Ok(())
}
