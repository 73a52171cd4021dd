//! Modules, globals, and the textual printer.
//!
//! The printer emits the same `.ll`-style syntax the parser accepts, so
//! `-show-final-cfg` output is both human-readable and re-parseable.

use std::fmt;

use indexmap::IndexMap;

use crate::func::{BlockId, Function};
use crate::inst::{InstKind, Operand, Terminator};
use crate::types::IrType;

/// Initializer of a global variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GlobalInit {
    Int(u128),
    Float(f64),
    Zero,
}

/// A module-level global variable of scalar type.
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub ty: IrType,
    pub init: GlobalInit,
}

/// A translation unit: globals plus functions, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub globals: IndexMap<String, Global>,
    pub functions: IndexMap<String, Function>,
}

impl Module {
    pub fn new() -> Module {
        Module::default()
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// `true` if `name` refers to a function definition in this module.
    pub fn is_defined(&self, name: &str) -> bool {
        self.functions
            .get(name)
            .map(|f| !f.is_declaration())
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Printing
// ---------------------------------------------------------------------------

struct OperandPrinter<'a> {
    func: &'a Function,
    op: &'a Operand,
}

impl fmt::Display for OperandPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Operand::Value(v) => write!(f, "%{}", self.func.value(*v).name),
            Operand::ConstInt { bits: 1, value } => {
                write!(f, "{}", if *value != 0 { "true" } else { "false" })
            }
            Operand::ConstInt { value, .. } => write!(f, "{value}"),
            Operand::ConstFloat { double: true, bits } => {
                write!(f, "{:?}", f64::from_bits(*bits))
            }
            Operand::ConstFloat { double: false, bits } => {
                write!(f, "{:?}", f32::from_bits(*bits as u32))
            }
            Operand::Global(name) => write!(f, "@{name}"),
            Operand::NullPtr => write!(f, "null"),
            Operand::Undef(_) => write!(f, "undef"),
        }
    }
}

impl Module {
    fn write_function(&self, f: &mut fmt::Formatter<'_>, func: &Function) -> fmt::Result {
        let params = func
            .params
            .iter()
            .map(|p| format!("{} %{}", p.ty, p.name))
            .collect::<Vec<_>>()
            .join(", ");

        if func.is_declaration() {
            return writeln!(f, "declare {} @{}({})", func.ret_ty, func.name, params);
        }

        writeln!(f, "define {} @{}({}) {{", func.ret_ty, func.name, params)?;
        for id in func.block_ids() {
            self.write_block(f, func, id)?;
        }
        writeln!(f, "}}")
    }

    fn write_block(&self, f: &mut fmt::Formatter<'_>, func: &Function, id: BlockId) -> fmt::Result {
        let block = func.block(id);
        writeln!(f, "{}:", block.label)?;
        let p = |op: &Operand| OperandPrinter { func, op }.to_string();
        let ty_of = |op: &Operand| operand_ty(func, op);

        for inst in &block.insts {
            match &inst.kind {
                InstKind::Binary {
                    op,
                    nsw,
                    result,
                    lhs,
                    rhs,
                } => {
                    let nsw = if *nsw { " nsw" } else { "" };
                    writeln!(
                        f,
                        "  %{} = {}{} {} {}, {}",
                        func.value(*result).name,
                        op.mnemonic(),
                        nsw,
                        func.value_ty(*result),
                        p(lhs),
                        p(rhs)
                    )?;
                }
                InstKind::ICmp {
                    pred,
                    result,
                    lhs,
                    rhs,
                } => writeln!(
                    f,
                    "  %{} = icmp {} {} {}, {}",
                    func.value(*result).name,
                    pred.mnemonic(),
                    ty_of(lhs),
                    p(lhs),
                    p(rhs)
                )?,
                InstKind::FCmp {
                    pred,
                    result,
                    lhs,
                    rhs,
                } => writeln!(
                    f,
                    "  %{} = fcmp {} {} {}, {}",
                    func.value(*result).name,
                    pred.mnemonic(),
                    ty_of(lhs),
                    p(lhs),
                    p(rhs)
                )?,
                InstKind::Select {
                    result,
                    cond,
                    then_value,
                    else_value,
                } => writeln!(
                    f,
                    "  %{} = select i1 {}, {} {}, {} {}",
                    func.value(*result).name,
                    p(cond),
                    ty_of(then_value),
                    p(then_value),
                    ty_of(else_value),
                    p(else_value)
                )?,
                InstKind::Cast { op, result, value } => writeln!(
                    f,
                    "  %{} = {} {} {} to {}",
                    func.value(*result).name,
                    op.mnemonic(),
                    ty_of(value),
                    p(value),
                    func.value_ty(*result)
                )?,
                InstKind::Phi { result, incoming } => {
                    let arms = incoming
                        .iter()
                        .map(|(op, pred)| {
                            format!("[ {}, %{} ]", p(op), func.block(*pred).label)
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    writeln!(
                        f,
                        "  %{} = phi {} {}",
                        func.value(*result).name,
                        func.value_ty(*result),
                        arms
                    )?;
                }
                InstKind::Call {
                    result,
                    callee,
                    args,
                } => {
                    let args = args
                        .iter()
                        .map(|a| format!("{} {}", ty_of(a), p(a)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    match result {
                        Some(r) => writeln!(
                            f,
                            "  %{} = call {} @{}({})",
                            func.value(*r).name,
                            func.value_ty(*r),
                            callee,
                            args
                        )?,
                        None => writeln!(f, "  call void @{callee}({args})")?,
                    }
                }
                InstKind::Load { result, address } => writeln!(
                    f,
                    "  %{} = load {}, ptr {}",
                    func.value(*result).name,
                    func.value_ty(*result),
                    p(address)
                )?,
                InstKind::Store { value, address } => writeln!(
                    f,
                    "  store {} {}, ptr {}",
                    ty_of(value),
                    p(value),
                    p(address)
                )?,
                InstKind::Alloca { result, allocated } => writeln!(
                    f,
                    "  %{} = alloca {}",
                    func.value(*result).name,
                    allocated
                )?,
                InstKind::GetElementPtr {
                    result,
                    base,
                    indices,
                } => {
                    let idx = indices
                        .iter()
                        .map(|i| format!(", {} {}", ty_of(i), p(i)))
                        .collect::<String>();
                    writeln!(
                        f,
                        "  %{} = getelementptr i8, ptr {}{}",
                        func.value(*result).name,
                        p(base),
                        idx
                    )?;
                }
                InstKind::PtrCast { result, value } => writeln!(
                    f,
                    "  %{} = bitcast ptr {} to ptr",
                    func.value(*result).name,
                    p(value)
                )?,
            }
        }

        match &block.terminator {
            Terminator::Br { target } => {
                writeln!(f, "  br label %{}", func.block(*target).label)?
            }
            Terminator::CondBr {
                cond,
                then_target,
                else_target,
            } => writeln!(
                f,
                "  br i1 {}, label %{}, label %{}",
                p(cond),
                func.block(*then_target).label,
                func.block(*else_target).label
            )?,
            Terminator::Switch {
                value,
                bits,
                default,
                cases,
            } => {
                let arms = cases
                    .iter()
                    .map(|(k, b)| format!("i{} {}, label %{}", bits, k, func.block(*b).label))
                    .collect::<Vec<_>>()
                    .join(" ");
                writeln!(
                    f,
                    "  switch i{} {}, label %{} [ {} ]",
                    bits,
                    p(value),
                    func.block(*default).label,
                    arms
                )?;
            }
            Terminator::Ret { value: Some(v) } => {
                writeln!(f, "  ret {} {}", ty_of(v), p(v))?
            }
            Terminator::Ret { value: None } => writeln!(f, "  ret void")?,
            Terminator::Unreachable => writeln!(f, "  unreachable")?,
        }
        Ok(())
    }
}

fn operand_ty(func: &Function, op: &Operand) -> IrType {
    match op {
        Operand::Value(v) => func.value_ty(*v),
        Operand::ConstInt { bits, .. } => IrType::Int { bits: *bits },
        Operand::ConstFloat { double: true, .. } => IrType::Float64,
        Operand::ConstFloat { double: false, .. } => IrType::Float32,
        Operand::Global(_) | Operand::NullPtr => IrType::Ptr,
        Operand::Undef(ty) => *ty,
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for global in self.globals.values() {
            match global.init {
                GlobalInit::Int(v) => {
                    writeln!(f, "@{} = global {} {}", global.name, global.ty, v)?
                }
                GlobalInit::Float(v) => {
                    writeln!(f, "@{} = global {} {:?}", global.name, global.ty, v)?
                }
                GlobalInit::Zero => {
                    writeln!(f, "@{} = global {} zeroinitializer", global.name, global.ty)?
                }
            }
        }
        if !self.globals.is_empty() {
            writeln!(f)?;
        }
        for (i, func) in self.functions.values().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            self.write_function(f, func)?;
        }
        Ok(())
    }
}
