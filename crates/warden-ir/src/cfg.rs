//! Control-flow graph over a function's blocks.
//!
//! A thin petgraph wrapper: nodes are blocks, edge weights are successor
//! indices (the position of the target in the terminator's successor
//! list, which the translator needs to pick the right branch guard).

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::func::{BlockId, Function};

/// Per-function CFG; rebuild after instrumentation mutates the function.
pub struct Cfg {
    graph: DiGraph<BlockId, usize>,
    nodes: Vec<NodeIndex>,
}

impl Cfg {
    pub fn new(function: &Function) -> Cfg {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = function
            .block_ids()
            .map(|id| graph.add_node(id))
            .collect();
        for id in function.block_ids() {
            let succs = function.block(id).terminator.successors();
            for (index, succ) in succs.into_iter().enumerate() {
                graph.add_edge(nodes[id.0 as usize], nodes[succ.0 as usize], index);
            }
        }
        Cfg { graph, nodes }
    }

    /// Successors of a block with their successor indices, in
    /// terminator order.
    pub fn successors(&self, block: BlockId) -> Vec<(BlockId, usize)> {
        let mut out: Vec<(BlockId, usize)> = self
            .graph
            .edges_directed(self.nodes[block.0 as usize], Direction::Outgoing)
            .map(|e| (self.graph[e.target()], *e.weight()))
            .collect();
        out.sort_by_key(|(_, index)| *index);
        out
    }

    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        self.graph
            .neighbors_directed(self.nodes[block.0 as usize], Direction::Incoming)
            .map(|n| self.graph[n])
            .collect()
    }

    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::{Operand, Terminator};
    use crate::types::IrType;

    #[test]
    fn successor_indices_follow_terminator_order() {
        let mut f = Function::new("main", IrType::Void);
        let entry = f.add_block("entry");
        let then_bb = f.add_block("then");
        let else_bb = f.add_block("else");
        let c = f.add_value("c", IrType::I1);
        f.block_mut(entry).terminator = Terminator::CondBr {
            cond: Operand::Value(c),
            then_target: then_bb,
            else_target: else_bb,
        };
        f.block_mut(then_bb).terminator = Terminator::Ret { value: None };
        f.block_mut(else_bb).terminator = Terminator::Ret { value: None };

        let cfg = Cfg::new(&f);
        assert_eq!(cfg.successors(entry), vec![(then_bb, 0), (else_bb, 1)]);
        assert_eq!(cfg.predecessors(then_bb), vec![entry]);
        assert!(cfg.successors(then_bb).is_empty());
    }

    #[test]
    fn switch_default_is_successor_zero() {
        let mut f = Function::new("main", IrType::Void);
        let entry = f.add_block("entry");
        let default = f.add_block("default");
        let case1 = f.add_block("case1");
        let v = f.add_value("v", IrType::I32);
        f.block_mut(entry).terminator = Terminator::Switch {
            value: Operand::Value(v),
            bits: 32,
            default,
            cases: vec![(1, case1)],
        };
        f.block_mut(default).terminator = Terminator::Ret { value: None };
        f.block_mut(case1).terminator = Terminator::Ret { value: None };

        let cfg = Cfg::new(&f);
        assert_eq!(cfg.successors(entry), vec![(default, 0), (case1, 1)]);
    }
}
