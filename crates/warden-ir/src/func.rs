//! Functions, basic blocks, and the per-function value table.
//!
//! SSA values are `u32` indices into the function's value table, which
//! records each value's name, IR type, and (when the value corresponds
//! to a source-level variable) the source name the trace reconstructor
//! reports. Blocks are indexed by [`BlockId`]; the entry block is always
//! block 0.

use indexmap::IndexMap;

use crate::inst::{Inst, Terminator};
use crate::types::IrType;

/// Index of an SSA value in its function's value table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Index of a basic block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// Metadata of one SSA value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInfo {
    pub name: String,
    pub ty: IrType,
    /// Source-level variable name, when debug information maps this
    /// value back to one. Drives `Assign` trace events.
    pub source_name: Option<String>,
    /// Name of the inlined function this value originated from; `None`
    /// for values native to the enclosing function. Drives function
    /// entry/return trace events.
    pub scope: Option<String>,
}

/// A formal parameter and its SSA value.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: IrType,
    pub value: ValueId,
}

/// A basic block: straight-line instructions plus one terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
    pub terminator: Terminator,
    /// Set on error blocks created by check instrumentation; the value
    /// is the registered check's error code.
    pub error_code: Option<u32>,
    /// Source line of the violated operation, when known.
    pub error_line: Option<u32>,
}

impl Block {
    pub fn new(label: impl Into<String>) -> Block {
        Block {
            label: label.into(),
            insts: Vec::new(),
            terminator: Terminator::Unreachable,
            error_code: None,
            error_line: None,
        }
    }

    pub fn is_error_block(&self) -> bool {
        self.error_code.is_some()
    }
}

/// A function definition (or declaration, when `blocks` is empty).
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret_ty: IrType,
    pub values: Vec<ValueInfo>,
    pub blocks: Vec<Block>,
}

impl Function {
    pub fn new(name: impl Into<String>, ret_ty: IrType) -> Function {
        Function {
            name: name.into(),
            params: Vec::new(),
            ret_ty,
            values: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The entry block; valid only for definitions.
    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    // -----------------------------------------------------------------------
    // Values
    // -----------------------------------------------------------------------

    /// Adds a fresh SSA value. Values whose name is a plain identifier
    /// (no dot, not purely numeric) are treated as source-level
    /// variables for trace reporting.
    pub fn add_value(&mut self, name: impl Into<String>, ty: IrType) -> ValueId {
        let name = name.into();
        let source_name = if Self::is_source_name(&name) {
            Some(name.clone())
        } else {
            None
        };
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueInfo {
            name,
            ty,
            source_name,
            scope: None,
        });
        id
    }

    /// Adds a compiler-generated value that never maps to a source
    /// variable (instrumentation temporaries).
    pub fn add_synthetic_value(&mut self, name: impl Into<String>, ty: IrType) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueInfo {
            name: name.into(),
            ty,
            source_name: None,
            scope: None,
        });
        id
    }

    fn is_source_name(name: &str) -> bool {
        !name.is_empty()
            && !name.contains('.')
            && !name.chars().all(|c| c.is_ascii_digit())
    }

    pub fn value(&self, id: ValueId) -> &ValueInfo {
        &self.values[id.0 as usize]
    }

    pub fn value_ty(&self, id: ValueId) -> IrType {
        self.values[id.0 as usize].ty
    }

    /// Adds a formal parameter (and its value).
    pub fn add_param(&mut self, name: &str, ty: IrType) -> ValueId {
        let value = self.add_value(name, ty);
        self.params.push(Param {
            name: name.to_string(),
            ty,
            value,
        });
        value
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    pub fn add_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(label));
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    /// A block label not yet in use, derived from `prefix`.
    pub fn fresh_label(&self, prefix: &str) -> String {
        let mut n = 0usize;
        loop {
            let candidate = format!("{prefix}{n}");
            if !self.blocks.iter().any(|b| b.label == candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Creates an error block tagged with `code`, labelled
    /// `error.<kind><n>`.
    pub fn create_error_block(&mut self, kind: &str, code: u32) -> BlockId {
        let label = self.fresh_label(&format!("error.{kind}"));
        let id = self.add_block(label);
        self.block_mut(id).terminator = Terminator::Unreachable;
        self.block_mut(id).error_code = Some(code);
        id
    }

    /// Splits `block` before instruction `at`: instructions from `at`
    /// onward and the terminator move to a fresh block, and `block`
    /// falls through to it. Returns the new block.
    ///
    /// Phi instructions in *other* blocks keep referring to `block`,
    /// which stays the predecessor on every original in-edge; only the
    /// split-off tail's successors see the new block as predecessor, so
    /// their phis are rewritten.
    pub fn split_block(&mut self, block: BlockId, at: usize) -> BlockId {
        let label = self.fresh_label(&format!("{}.split", self.block(block).label));
        let new_id = self.add_block(label);

        let old = &mut self.blocks[block.0 as usize];
        let tail: Vec<Inst> = old.insts.split_off(at);
        let terminator = std::mem::replace(&mut old.terminator, Terminator::Br { target: new_id });

        let successors = terminator.successors();
        let new_block = &mut self.blocks[new_id.0 as usize];
        new_block.insts = tail;
        new_block.terminator = terminator;

        // Phis in the moved-out tail's successors named the old block as
        // predecessor; the edge now originates from the new block.
        for succ in successors {
            for inst in &mut self.blocks[succ.0 as usize].insts {
                if let crate::inst::InstKind::Phi { incoming, .. } = &mut inst.kind {
                    for (_, pred) in incoming.iter_mut() {
                        if *pred == block {
                            *pred = new_id;
                        }
                    }
                }
            }
        }

        new_id
    }

    /// Looks up a block by label.
    pub fn block_by_label(&self, label: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|b| b.label == label)
            .map(|i| BlockId(i as u32))
    }
}

/// Map from value names to ids, used by the parser and the transforms.
pub(crate) type ValueNames = IndexMap<String, ValueId>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::{InstKind, Operand};

    #[test]
    fn source_names_require_plain_identifiers() {
        let mut f = Function::new("main", IrType::I32);
        let user = f.add_value("count", IrType::I32);
        let temp = f.add_value("count.0", IrType::I32);
        let numbered = f.add_value("7", IrType::I32);
        assert_eq!(f.value(user).source_name.as_deref(), Some("count"));
        assert_eq!(f.value(temp).source_name, None);
        assert_eq!(f.value(numbered).source_name, None);
    }

    #[test]
    fn synthetic_values_never_map_to_source() {
        let mut f = Function::new("main", IrType::I32);
        let v = f.add_synthetic_value("ovr_check", IrType::I1);
        assert_eq!(f.value(v).source_name, None);
    }

    #[test]
    fn split_block_moves_tail_and_falls_through() {
        let mut f = Function::new("main", IrType::Void);
        let entry = f.add_block("entry");
        let a = f.add_value("a", IrType::I32);
        let b = f.add_value("b", IrType::I32);
        f.block_mut(entry).insts.push(Inst::new(InstKind::Binary {
            op: crate::inst::BinOp::Add,
            nsw: false,
            result: a,
            lhs: Operand::ConstInt { bits: 32, value: 1 },
            rhs: Operand::ConstInt { bits: 32, value: 2 },
        }));
        f.block_mut(entry).insts.push(Inst::new(InstKind::Binary {
            op: crate::inst::BinOp::Mul,
            nsw: false,
            result: b,
            lhs: Operand::Value(a),
            rhs: Operand::ConstInt { bits: 32, value: 3 },
        }));
        f.block_mut(entry).terminator = Terminator::Ret { value: None };

        let tail = f.split_block(entry, 1);
        assert_eq!(f.block(entry).insts.len(), 1);
        assert_eq!(f.block(tail).insts.len(), 1);
        assert_eq!(
            f.block(entry).terminator,
            Terminator::Br { target: tail }
        );
        assert_eq!(f.block(tail).terminator, Terminator::Ret { value: None });
    }

    #[test]
    fn error_blocks_carry_their_code() {
        let mut f = Function::new("main", IrType::Void);
        f.add_block("entry");
        let err = f.create_error_block("divzero", 2);
        assert!(f.block(err).is_error_block());
        assert_eq!(f.block(err).error_code, Some(2));
        assert!(f.block(err).label.starts_with("error.divzero"));

        // A second error block gets a distinct label.
        let err2 = f.create_error_block("divzero", 2);
        assert_ne!(f.block(err).label, f.block(err2).label);
    }

    #[test]
    fn fresh_label_avoids_collisions() {
        let mut f = Function::new("main", IrType::Void);
        f.add_block("bb0");
        let label = f.fresh_label("bb");
        assert_ne!(label, "bb0");
    }
}
