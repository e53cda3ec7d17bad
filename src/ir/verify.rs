//! Whole-graph consistency checking.

use crate::{
    ir::{BlockId, Graph, InstrId, Use},
    Result,
};

impl Graph {
    /// Checks the structural and def-use invariants of the graph.
    ///
    /// Verified properties:
    /// - successor and predecessor lists mirror each other
    /// - body lists are well linked and every member names its block
    /// - control-flow instructions only appear last in a block
    /// - phis have one input per predecessor
    /// - every input edge has exactly one matching use record and vice versa,
    ///   for regular and environment slots alike
    /// - no live instruction refers to a removed one
    /// - while the derived analyses are valid, every definition dominates
    ///   its uses (a phi input must dominate the matching predecessor)
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvariantViolation`] describing the first
    /// violation found.
    pub fn verify(&self) -> Result<()> {
        if let Some(exit) = self.exit_block() {
            if self.get_block(exit).is_none() {
                return Err(invariant_error!("exit block {} is not live", exit));
            }
        }
        for block in self.block_ids() {
            self.verify_edges(block)?;
            self.verify_body(block)?;
            self.verify_phis(block)?;
        }
        for instr in &self.instructions {
            if instr.is_attached() {
                self.verify_def_use(instr.id())?;
                if self.analyses_valid {
                    self.verify_dominance(instr.id())?;
                }
            }
        }
        Ok(())
    }

    fn verify_dominance(&self, id: InstrId) -> Result<()> {
        let instr = self.instr(id);
        let Some(block) = instr.block() else {
            return Ok(());
        };
        if !self.is_reachable(block) {
            return Ok(());
        }
        for (slot, &input) in instr.inputs().iter().enumerate() {
            let dominated = if instr.is_phi() {
                let pred = self.block(block).predecessors().get(slot).copied();
                match (self.instr(input).block(), pred) {
                    (_, Some(pred)) if !self.is_reachable(pred) => true,
                    (Some(def_block), Some(pred)) => self.dominates(def_block, pred),
                    _ => false,
                }
            } else {
                self.strictly_dominates(input, id)
            };
            if !dominated {
                return Err(invariant_error!("{} does not dominate its use by {}", input, id));
            }
        }
        Ok(())
    }

    fn verify_edges(&self, block: BlockId) -> Result<()> {
        let b = self.block(block);
        for &succ in b.successors() {
            let Some(s) = self.get_block(succ) else {
                return Err(invariant_error!("{} has removed successor {}", block, succ));
            };
            let forward = b.successors().iter().filter(|&&x| x == succ).count();
            let backward = s.predecessors().iter().filter(|&&x| x == block).count();
            if forward != backward {
                return Err(invariant_error!(
                    "edge {} -> {} recorded {} times forward, {} times backward",
                    block,
                    succ,
                    forward,
                    backward
                ));
            }
        }
        for &pred in b.predecessors() {
            let listed = self
                .get_block(pred)
                .is_some_and(|p| p.successors().contains(&block));
            if !listed {
                return Err(invariant_error!("{} lists {} as predecessor without edge", block, pred));
            }
        }
        Ok(())
    }

    fn verify_body(&self, block: BlockId) -> Result<()> {
        let b = self.block(block);
        let mut prev: Option<InstrId> = None;
        let mut cursor = b.first_instruction();
        while let Some(id) = cursor {
            let instr = self.instr(id);
            if instr.block() != Some(block) {
                return Err(invariant_error!("{} is linked into {} but names {:?}", id, block, instr.block()));
            }
            if instr.is_phi() {
                return Err(invariant_error!("phi {} is linked into the body of {}", id, block));
            }
            if instr.prev() != prev {
                return Err(invariant_error!("{} has broken prev link", id));
            }
            if instr.kind().is_control_flow() && instr.next().is_some() {
                return Err(invariant_error!("control-flow {} is not last in {}", id, block));
            }
            prev = Some(id);
            cursor = instr.next();
        }
        if b.last_instruction() != prev {
            return Err(invariant_error!("{} has a stale last instruction", block));
        }
        Ok(())
    }

    fn verify_phis(&self, block: BlockId) -> Result<()> {
        let b = self.block(block);
        for &phi in b.phis() {
            let instr = self.instr(phi);
            if !instr.is_phi() || instr.block() != Some(block) {
                return Err(invariant_error!("{} is listed as phi of {}", phi, block));
            }
            if instr.inputs().len() != b.predecessors().len() {
                return Err(invariant_error!(
                    "phi {} has {} inputs for {} predecessors",
                    phi,
                    instr.inputs().len(),
                    b.predecessors().len()
                ));
            }
        }
        Ok(())
    }

    fn verify_def_use(&self, id: InstrId) -> Result<()> {
        let instr = self.instr(id);
        for (slot, &input) in instr.inputs().iter().enumerate() {
            let value = self.instr(input);
            if !value.is_attached() {
                return Err(invariant_error!("{} input {} is removed value {}", id, slot, input));
            }
            let record = Use { user: id, slot };
            let matches = value.uses().iter().filter(|&&u| u == record).count();
            if matches != 1 {
                return Err(invariant_error!(
                    "{} has {} use records for ({}, {})",
                    input,
                    matches,
                    id,
                    slot
                ));
            }
        }
        for record in instr.uses() {
            let user = self.instr(record.user);
            if !user.is_attached() || user.inputs().get(record.slot) != Some(&id) {
                return Err(invariant_error!(
                    "{} has dangling use record ({}, {})",
                    id,
                    record.user,
                    record.slot
                ));
            }
        }

        if let Some(env) = instr.environment() {
            for (slot, value) in env.values().iter().enumerate() {
                let Some(value) = *value else { continue };
                let v = self.instr(value);
                if !v.is_attached() {
                    return Err(invariant_error!("{} environment slot {} holds removed {}", id, slot, value));
                }
                let record = Use { user: id, slot };
                if v.env_uses().iter().filter(|&&u| u == record).count() != 1 {
                    return Err(invariant_error!(
                        "{} lacks environment use record ({}, {})",
                        value,
                        id,
                        slot
                    ));
                }
            }
        }
        for record in instr.env_uses() {
            let holder = self.instr(record.user);
            let holds = holder
                .environment()
                .and_then(|env| env.values().get(record.slot).copied().flatten())
                == Some(id);
            if !holder.is_attached() || !holds {
                return Err(invariant_error!(
                    "{} has dangling environment use ({}, {})",
                    id,
                    record.user,
                    record.slot
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{BinaryOp, DataType, Graph, InstructionKind, Use};

    #[test]
    fn detects_missing_use_record() {
        let mut graph = Graph::new("broken");
        let p = graph.add_parameter(DataType::Int32).unwrap();
        let entry = graph.entry_block();
        let ret = graph
            .append(entry, InstructionKind::Return, DataType::Void, vec![p])
            .unwrap();
        graph.verify().unwrap();

        graph.instructions[p.index()].uses.clear();
        assert!(graph.verify().is_err());
        graph.instructions[p.index()].uses.push(Use { user: ret, slot: 0 });
        graph.verify().unwrap();
    }

    #[test]
    fn detects_phi_arity_mismatch() {
        let mut graph = Graph::new("phi");
        let entry = graph.entry_block();
        let join = graph.add_block();
        graph.add_edge(entry, join).unwrap();
        let c = graph.int_constant(1).unwrap();
        graph.add_phi(join, DataType::Int32, vec![c, c]).unwrap();
        assert!(graph.verify().is_err());
    }

    #[test]
    fn detects_use_before_definition() {
        let mut graph = Graph::new("order");
        let entry = graph.entry_block();
        let p = graph.add_parameter(DataType::Int32).unwrap();
        let add = InstructionKind::Binary(BinaryOp::Add);
        let first = graph.append(entry, add, DataType::Int32, vec![p, p]).unwrap();
        let second = graph.append(entry, add, DataType::Int32, vec![first, p]).unwrap();
        graph.append(entry, InstructionKind::Return, DataType::Void, vec![second]).unwrap();
        graph.rebuild_analyses().unwrap();
        graph.verify().unwrap();

        graph.move_after(first, second).unwrap();
        assert!(graph.verify().is_err());
    }
}
