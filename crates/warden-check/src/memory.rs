//! Memory models.
//!
//! The translator delegates every pointer-flavored instruction here
//! through the [`MemoryModel`] trait. Two models are provided:
//!
//! - [`SimpleMemoryModel`] (`-memory=simple`, the default): pointers
//!   are 64-bit bitvectors with fixed addresses for globals and
//!   allocas left unconstrained; loads havoc their result. Sound for
//!   reachability, imprecise for anything that reads memory.
//! - [`FlatMemoryModel`] (`-memory=flat`): one flat `[Bv64 -> Bv64]`
//!   array threaded through the path. Stores produce a new array term
//!   (`ArrayWrite`), loads read the current term, allocas and globals
//!   get distinct constant addresses. Sub-word accesses are adjusted
//!   with `zext`/`extract`; float-typed memory traffic is out of scope.

use indexmap::IndexMap;

use warden_core::{Context, ExprId, TypeId, VarId, VariableAssignment};
use warden_ir::{Function, GlobalInit, IrType, Module};

use crate::error::CheckError;
use crate::translate::{as_bool, as_bv};

/// Pointer representation width shared by both models.
pub const PTR_BITS: u32 = 64;

const GLOBAL_BASE: u128 = 0x100;
const ALLOCA_BASE: u128 = 0x1000;
const CELL_STRIDE: u128 = 8;

/// Result of delegating one instruction to the memory model.
pub struct MemOutcome {
    pub formula: ExprId,
    pub assignment: Option<VariableAssignment>,
}

impl MemOutcome {
    fn trivial(ctx: &mut Context) -> MemOutcome {
        MemOutcome {
            formula: ctx.true_expr(),
            assignment: None,
        }
    }

    fn bind(ctx: &mut Context, var: VarId, value: ExprId) -> MemOutcome {
        let var_ref = ctx.var_ref(var);
        let formula = if ctx.ty(ctx.expr_ty(var_ref)).is_float() {
            ctx.f_eq(var_ref, value)
        } else {
            ctx.eq(var_ref, value)
        };
        MemOutcome {
            formula,
            assignment: Some(VariableAssignment::new(ctx, var, value)),
        }
    }
}

/// Interface between the translator and a memory representation.
///
/// `initialize` runs once per function and may declare synthetic
/// variables; `begin_path` resets per-path state before each path
/// encoding.
pub trait MemoryModel {
    fn initialize(
        &mut self,
        ctx: &mut Context,
        module: &Module,
        func: &Function,
    ) -> Result<(), CheckError>;

    /// The core type representing IR pointer values.
    fn pointer_type(&self, ctx: &mut Context) -> TypeId;

    fn begin_path(&mut self, ctx: &mut Context);

    fn global_address(&mut self, ctx: &mut Context, name: &str) -> Result<ExprId, CheckError>;

    fn null_pointer(&mut self, ctx: &mut Context) -> ExprId;

    fn handle_load(
        &mut self,
        ctx: &mut Context,
        result: VarId,
        address: ExprId,
    ) -> Result<MemOutcome, CheckError>;

    fn handle_store(
        &mut self,
        ctx: &mut Context,
        value: ExprId,
        address: ExprId,
    ) -> Result<MemOutcome, CheckError>;

    fn handle_alloca(&mut self, ctx: &mut Context, result: VarId)
        -> Result<MemOutcome, CheckError>;

    fn handle_getelementptr(
        &mut self,
        ctx: &mut Context,
        result: VarId,
        base: ExprId,
        indices: &[ExprId],
    ) -> Result<MemOutcome, CheckError>;

    fn handle_pointer_cast(
        &mut self,
        ctx: &mut Context,
        result: VarId,
        value: ExprId,
    ) -> Result<MemOutcome, CheckError>;

    /// Calls the translator cannot interpret (unknown external
    /// functions). The result variable, if any, is left unconstrained.
    fn handle_call(
        &mut self,
        ctx: &mut Context,
        result: Option<VarId>,
    ) -> Result<MemOutcome, CheckError>;
}

// ---------------------------------------------------------------------------
// Shared address bookkeeping
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AddressMap {
    globals: IndexMap<String, u128>,
    allocas: IndexMap<VarId, u128>,
    next: u128,
}

impl AddressMap {
    fn assign_globals(&mut self, module: &Module) {
        self.next = GLOBAL_BASE;
        for name in module.globals.keys() {
            self.globals.insert(name.clone(), self.next);
            self.next += CELL_STRIDE;
        }
        self.next = ALLOCA_BASE;
    }

    fn global(&self, name: &str) -> Result<u128, CheckError> {
        self.globals.get(name).copied().ok_or_else(|| {
            CheckError::Translation(format!("reference to unknown global '@{name}'"))
        })
    }

    fn alloca(&mut self, var: VarId) -> u128 {
        if let Some(addr) = self.allocas.get(&var) {
            return *addr;
        }
        let addr = self.next;
        self.next += CELL_STRIDE;
        self.allocas.insert(var, addr);
        addr
    }
}

// ---------------------------------------------------------------------------
// Simple (havoc) model
// ---------------------------------------------------------------------------

/// Pointers are opaque 64-bit values; memory contents are
/// unconstrained. Every load havocs its result.
#[derive(Default)]
pub struct SimpleMemoryModel {
    addresses: AddressMap,
}

impl SimpleMemoryModel {
    pub fn new() -> SimpleMemoryModel {
        SimpleMemoryModel::default()
    }
}

impl MemoryModel for SimpleMemoryModel {
    fn initialize(
        &mut self,
        _ctx: &mut Context,
        module: &Module,
        _func: &Function,
    ) -> Result<(), CheckError> {
        self.addresses.assign_globals(module);
        Ok(())
    }

    fn pointer_type(&self, ctx: &mut Context) -> TypeId {
        ctx.bv_type(PTR_BITS)
    }

    fn begin_path(&mut self, _ctx: &mut Context) {}

    fn global_address(&mut self, ctx: &mut Context, name: &str) -> Result<ExprId, CheckError> {
        let addr = self.addresses.global(name)?;
        Ok(ctx.bv_lit(addr, PTR_BITS))
    }

    fn null_pointer(&mut self, ctx: &mut Context) -> ExprId {
        ctx.bv_lit(0, PTR_BITS)
    }

    fn handle_load(
        &mut self,
        ctx: &mut Context,
        _result: VarId,
        _address: ExprId,
    ) -> Result<MemOutcome, CheckError> {
        // Havoc: the loaded value stays a free variable.
        Ok(MemOutcome::trivial(ctx))
    }

    fn handle_store(
        &mut self,
        ctx: &mut Context,
        _value: ExprId,
        _address: ExprId,
    ) -> Result<MemOutcome, CheckError> {
        Ok(MemOutcome::trivial(ctx))
    }

    fn handle_alloca(
        &mut self,
        ctx: &mut Context,
        result: VarId,
    ) -> Result<MemOutcome, CheckError> {
        let addr = self.addresses.alloca(result);
        let addr = ctx.bv_lit(addr, PTR_BITS);
        Ok(MemOutcome::bind(ctx, result, addr))
    }

    fn handle_getelementptr(
        &mut self,
        ctx: &mut Context,
        _result: VarId,
        _base: ExprId,
        _indices: &[ExprId],
    ) -> Result<MemOutcome, CheckError> {
        Ok(MemOutcome::trivial(ctx))
    }

    fn handle_pointer_cast(
        &mut self,
        ctx: &mut Context,
        result: VarId,
        value: ExprId,
    ) -> Result<MemOutcome, CheckError> {
        Ok(MemOutcome::bind(ctx, result, value))
    }

    fn handle_call(
        &mut self,
        ctx: &mut Context,
        _result: Option<VarId>,
    ) -> Result<MemOutcome, CheckError> {
        Ok(MemOutcome::trivial(ctx))
    }
}

// ---------------------------------------------------------------------------
// Flat array model
// ---------------------------------------------------------------------------

/// One flat `[Bv64 -> Bv64]` array threaded along the path.
pub struct FlatMemoryModel {
    addresses: AddressMap,
    initial: Option<ExprId>,
    current: Option<ExprId>,
}

impl FlatMemoryModel {
    pub fn new() -> FlatMemoryModel {
        FlatMemoryModel {
            addresses: AddressMap::default(),
            initial: None,
            current: None,
        }
    }

    fn current(&self) -> Result<ExprId, CheckError> {
        self.current
            .ok_or_else(|| CheckError::Translation("memory model used before begin_path".into()))
    }

    /// Widens a stored value to the 64-bit cell representation.
    fn to_cell(&self, ctx: &mut Context, value: ExprId) -> Result<ExprId, CheckError> {
        let ty = *ctx.ty(ctx.expr_ty(value));
        match ty {
            warden_core::Type::Bool => Ok(as_bv(ctx, value, PTR_BITS)),
            warden_core::Type::Bv { width } if width == PTR_BITS => Ok(value),
            warden_core::Type::Bv { width } if width < PTR_BITS => Ok(ctx.zext(value, PTR_BITS)),
            other => Err(CheckError::Unsupported(format!(
                "store of {other:?}-typed value under the flat memory model"
            ))),
        }
    }

    /// Narrows a 64-bit cell value to the loaded type.
    fn from_cell(
        &self,
        ctx: &mut Context,
        cell: ExprId,
        ty: TypeId,
    ) -> Result<ExprId, CheckError> {
        match *ctx.ty(ty) {
            warden_core::Type::Bool => {
                let bit = ctx.extract(cell, 0, 1);
                Ok(as_bool(ctx, bit))
            }
            warden_core::Type::Bv { width } if width == PTR_BITS => Ok(cell),
            warden_core::Type::Bv { width } if width < PTR_BITS => {
                Ok(ctx.extract(cell, 0, width))
            }
            other => Err(CheckError::Unsupported(format!(
                "load of {other:?}-typed value under the flat memory model"
            ))),
        }
    }
}

impl Default for FlatMemoryModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryModel for FlatMemoryModel {
    fn initialize(
        &mut self,
        ctx: &mut Context,
        module: &Module,
        func: &Function,
    ) -> Result<(), CheckError> {
        self.addresses.assign_globals(module);

        let index_ty = ctx.bv_type(PTR_BITS);
        let array_ty = ctx.array_type(index_ty, index_ty);
        let mem_name = format!("{}/mem", func.name);
        let mem = ctx.declare_variable(&mem_name, array_ty).map_err(|_| {
            CheckError::Translation(format!("memory variable '{mem_name}' already declared"))
        })?;

        // Seed the initial memory with the global initializers.
        let mut memory = ctx.var_ref(mem);
        for global in module.globals.values() {
            let addr = self.addresses.global(&global.name)?;
            let cell = match (global.init, global.ty) {
                (GlobalInit::Int(v), IrType::Int { bits }) => {
                    warden_ir::mask_to(v, bits.min(PTR_BITS))
                }
                (GlobalInit::Zero, _) => 0,
                (GlobalInit::Float(_), _) | (GlobalInit::Int(_), _) => {
                    // Float-typed globals are not representable in the
                    // integer cell; leave the cell unconstrained.
                    continue;
                }
            };
            let addr = ctx.bv_lit(addr, PTR_BITS);
            let value = ctx.bv_lit(cell, PTR_BITS);
            memory = ctx.array_write(memory, addr, value);
        }
        self.initial = Some(memory);
        self.current = Some(memory);
        Ok(())
    }

    fn pointer_type(&self, ctx: &mut Context) -> TypeId {
        ctx.bv_type(PTR_BITS)
    }

    fn begin_path(&mut self, _ctx: &mut Context) {
        self.current = self.initial;
    }

    fn global_address(&mut self, ctx: &mut Context, name: &str) -> Result<ExprId, CheckError> {
        let addr = self.addresses.global(name)?;
        Ok(ctx.bv_lit(addr, PTR_BITS))
    }

    fn null_pointer(&mut self, ctx: &mut Context) -> ExprId {
        ctx.bv_lit(0, PTR_BITS)
    }

    fn handle_load(
        &mut self,
        ctx: &mut Context,
        result: VarId,
        address: ExprId,
    ) -> Result<MemOutcome, CheckError> {
        let memory = self.current()?;
        let cell = ctx.array_read(memory, address);
        let ty = ctx.var(result).ty();
        let value = self.from_cell(ctx, cell, ty)?;
        Ok(MemOutcome::bind(ctx, result, value))
    }

    fn handle_store(
        &mut self,
        ctx: &mut Context,
        value: ExprId,
        address: ExprId,
    ) -> Result<MemOutcome, CheckError> {
        let memory = self.current()?;
        let cell = self.to_cell(ctx, value)?;
        self.current = Some(ctx.array_write(memory, address, cell));
        Ok(MemOutcome::trivial(ctx))
    }

    fn handle_alloca(
        &mut self,
        ctx: &mut Context,
        result: VarId,
    ) -> Result<MemOutcome, CheckError> {
        let addr = self.addresses.alloca(result);
        let addr = ctx.bv_lit(addr, PTR_BITS);
        Ok(MemOutcome::bind(ctx, result, addr))
    }

    fn handle_getelementptr(
        &mut self,
        ctx: &mut Context,
        result: VarId,
        base: ExprId,
        indices: &[ExprId],
    ) -> Result<MemOutcome, CheckError> {
        let mut addr = base;
        for &index in indices {
            let wide = match *ctx.ty(ctx.expr_ty(index)) {
                warden_core::Type::Bv { width } if width == PTR_BITS => index,
                warden_core::Type::Bv { width } if width < PTR_BITS => {
                    ctx.sext(index, PTR_BITS)
                }
                other => {
                    return Err(CheckError::Unsupported(format!(
                        "getelementptr index of type {other:?}"
                    )))
                }
            };
            let stride = ctx.bv_lit(CELL_STRIDE, PTR_BITS);
            let scaled = ctx.mul(wide, stride);
            addr = ctx.add(addr, scaled);
        }
        Ok(MemOutcome::bind(ctx, result, addr))
    }

    fn handle_pointer_cast(
        &mut self,
        ctx: &mut Context,
        result: VarId,
        value: ExprId,
    ) -> Result<MemOutcome, CheckError> {
        Ok(MemOutcome::bind(ctx, result, value))
    }

    fn handle_call(
        &mut self,
        ctx: &mut Context,
        _result: Option<VarId>,
    ) -> Result<MemOutcome, CheckError> {
        Ok(MemOutcome::trivial(ctx))
    }
}

/// Memory model selection, mirrored by the CLI's `--memory` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryModelKind {
    #[default]
    Simple,
    Flat,
}

impl MemoryModelKind {
    pub fn instantiate(&self) -> Box<dyn MemoryModel> {
        match self {
            MemoryModelKind::Simple => Box::new(SimpleMemoryModel::new()),
            MemoryModelKind::Flat => Box::new(FlatMemoryModel::new()),
        }
    }
}

impl std::str::FromStr for MemoryModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(MemoryModelKind::Simple),
            "flat" => Ok(MemoryModelKind::Flat),
            other => Err(format!(
                "unknown memory model '{other}', expected 'simple' or 'flat'"
            )),
        }
    }
}
