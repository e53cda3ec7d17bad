//! The per-method instruction graph and its mutation API.
//!
//! [`Graph`] owns every block and instruction of one method. Instructions
//! live in an arena indexed by [`InstrId`]; blocks live in a table indexed by
//! [`BlockId`]. All edits that touch an input slot go through the methods in
//! this file, which update the forward input and the reverse use record in
//! the same call:
//!
//! ```text
//!   user.inputs[slot] == value   <=>   value.uses contains (user, slot)
//! ```
//!
//! Structural edits (adding blocks or edges) clear the derived-analysis flag;
//! see [`Graph::rebuild_analyses`].

use rustc_hash::FxHashMap;

use crate::{
    ir::{
        BasicBlock, BinaryOp, BlockId, ConditionKind, ConstValue, DataType, Environment,
        InstrId, Instruction, InstructionKind, LoopInformation, SideEffects, Use,
        WriteBarrierKind,
    },
    Error, Result,
};

/// The SSA graph of one method.
#[derive(Debug, Clone)]
pub struct Graph {
    name: String,
    pub(crate) blocks: Vec<Option<BasicBlock>>,
    pub(crate) instructions: Vec<Instruction>,
    entry: BlockId,
    exit: Option<BlockId>,
    pub(crate) reverse_post_order: Vec<BlockId>,
    pub(crate) loops: Vec<LoopInformation>,
    pub(crate) analyses_valid: bool,
    constants: FxHashMap<(DataType, u64), InstrId>,
    parameters: Vec<InstrId>,
}

impl Graph {
    /// Creates a graph holding only an empty entry block.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let entry = BlockId::new(0);
        Self {
            name: name.into(),
            blocks: vec![Some(BasicBlock::new(entry))],
            instructions: Vec::new(),
            entry,
            exit: None,
            reverse_post_order: Vec::new(),
            loops: Vec::new(),
            analyses_valid: false,
            constants: FxHashMap::default(),
            parameters: Vec::new(),
        }
    }

    /// Returns the method name, used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the entry block.
    #[must_use]
    pub const fn entry_block(&self) -> BlockId {
        self.entry
    }

    /// Returns the exit block, absent for methods that never return.
    #[must_use]
    pub const fn exit_block(&self) -> Option<BlockId> {
        self.exit
    }

    /// Designates `block` as the unique exit block.
    pub fn set_exit_block(&mut self, block: BlockId) {
        self.exit = Some(block);
        self.analyses_valid = false;
    }

    /// Returns the block `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` does not name a live block.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        match self.blocks.get(id.index()) {
            Some(Some(block)) => block,
            _ => panic!("{id} is not a live block"),
        }
    }

    /// Returns the block `id` if it is live.
    #[must_use]
    pub fn get_block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index()).and_then(Option::as_ref)
    }

    fn block_mut(&mut self, id: BlockId) -> Result<&mut BasicBlock> {
        self.blocks
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(Error::InvalidBlock(id))
    }

    /// Iterates the ids of all live blocks in index order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.iter().flatten().map(BasicBlock::id)
    }

    /// Returns the size of the block index space, including holes.
    #[must_use]
    pub fn block_capacity(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the instruction `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never allocated in this graph.
    #[must_use]
    pub fn instr(&self, id: InstrId) -> &Instruction {
        &self.instructions[id.index()]
    }

    /// Returns the size of the instruction id space.
    #[must_use]
    pub fn instruction_capacity(&self) -> usize {
        self.instructions.len()
    }

    /// Returns the parameters in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[InstrId] {
        &self.parameters
    }

    /// Iterates the body instructions of `block` in program order.
    pub fn instructions(&self, block: BlockId) -> impl Iterator<Item = InstrId> + '_ {
        std::iter::successors(self.block(block).first, move |&id| self.instr(id).next)
    }

    /// Returns `true` if derived analyses are up to date.
    #[must_use]
    pub const fn analyses_valid(&self) -> bool {
        self.analyses_valid
    }

    /// Marks dominance, ordering and loop data stale.
    pub fn invalidate_analyses(&mut self) {
        self.analyses_valid = false;
    }

    /// Fails with [`Error::StaleAnalysis`] if derived data must be rebuilt first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleAnalysis`] after a structural edit.
    pub fn check_analyses(&self) -> Result<()> {
        if self.analyses_valid {
            Ok(())
        } else {
            Err(Error::StaleAnalysis)
        }
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    /// Adds an empty block.
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(Some(BasicBlock::new(id)));
        self.analyses_valid = false;
        id
    }

    /// Adds a control-flow edge. Edge order determines successor and
    /// predecessor positions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBlock`] if either block is not live.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) -> Result<()> {
        self.block_mut(to)?;
        self.block_mut(from)?.successors.push(to);
        self.block_mut(to)?.predecessors.push(from);
        self.analyses_valid = false;
        Ok(())
    }

    /// Removes the first edge `from -> to`, dropping the matching phi inputs of `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if either block is not live or the edge does not exist.
    pub fn remove_edge(&mut self, from: BlockId, to: BlockId) -> Result<()> {
        let succ_pos = self
            .block_mut(from)?
            .successors
            .iter()
            .position(|&s| s == to)
            .ok_or_else(|| invariant_error!("no edge {} -> {}", from, to))?;
        let pred_pos = self
            .block_mut(to)?
            .predecessor_index(from)
            .ok_or_else(|| invariant_error!("{} is not a predecessor of {}", from, to))?;

        self.block_mut(from)?.successors.remove(succ_pos);
        self.block_mut(to)?.predecessors.remove(pred_pos);
        for phi in self.block(to).phis.clone() {
            self.remove_input(phi, pred_pos)?;
        }
        self.analyses_valid = false;
        Ok(())
    }

    /// Inserts a new block holding a single `Goto` on the edge `from -> to`.
    ///
    /// Edge positions are preserved on both sides, so phis of `to` keep their
    /// input order.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge does not exist.
    pub fn split_edge(&mut self, from: BlockId, to: BlockId) -> Result<BlockId> {
        let succ_pos = self
            .block_mut(from)?
            .successors
            .iter()
            .position(|&s| s == to)
            .ok_or_else(|| invariant_error!("no edge {} -> {}", from, to))?;
        let pred_pos = self
            .block_mut(to)?
            .predecessor_index(from)
            .ok_or_else(|| invariant_error!("{} is not a predecessor of {}", from, to))?;

        let middle = self.add_block();
        self.block_mut(from)?.successors[succ_pos] = middle;
        self.block_mut(to)?.predecessors[pred_pos] = middle;
        let block = self.block_mut(middle)?;
        block.predecessors.push(from);
        block.successors.push(to);
        self.append(middle, InstructionKind::Goto, DataType::Void, vec![])?;
        Ok(middle)
    }

    /// Flags `block` as an exception handler entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBlock`] if the block is not live.
    pub fn mark_catch_block(&mut self, block: BlockId) -> Result<()> {
        self.block_mut(block)?.is_catch = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Instruction creation and placement
    // ------------------------------------------------------------------

    fn allocate(&mut self, kind: InstructionKind, ty: DataType, inputs: Vec<InstrId>) -> Result<InstrId> {
        let id = InstrId::new(self.instructions.len());
        for &input in &inputs {
            let value = self
                .instructions
                .get(input.index())
                .ok_or(Error::InvalidInstruction(input))?;
            if !value.is_attached() {
                return Err(invariant_error!("{} uses removed value {}", id, input));
            }
        }
        for (slot, &input) in inputs.iter().enumerate() {
            self.instructions[input.index()].uses.push(Use { user: id, slot });
        }
        self.instructions.push(Instruction::new(id, kind, ty, inputs));
        Ok(id)
    }

    fn link(&mut self, block: BlockId, id: InstrId, after: Option<InstrId>) -> Result<()> {
        let next = match after {
            Some(prev) => self.instructions[prev.index()].next,
            None => self.block_mut(block)?.first,
        };
        {
            let instr = &mut self.instructions[id.index()];
            instr.block = Some(block);
            instr.prev = after;
            instr.next = next;
        }
        match after {
            Some(prev) => self.instructions[prev.index()].next = Some(id),
            None => self.block_mut(block)?.first = Some(id),
        }
        match next {
            Some(next) => self.instructions[next.index()].prev = Some(id),
            None => self.block_mut(block)?.last = Some(id),
        }
        Ok(())
    }

    fn unlink(&mut self, id: InstrId) -> Result<()> {
        let (block, prev, next) = {
            let instr = &self.instructions[id.index()];
            let block = instr.block.ok_or(Error::InvalidInstruction(id))?;
            (block, instr.prev, instr.next)
        };
        if self.instructions[id.index()].is_phi() {
            self.block_mut(block)?.phis.retain(|&p| p != id);
        } else {
            match prev {
                Some(prev) => self.instructions[prev.index()].next = next,
                None => self.block_mut(block)?.first = next,
            }
            match next {
                Some(next) => self.instructions[next.index()].prev = prev,
                None => self.block_mut(block)?.last = prev,
            }
        }
        let instr = &mut self.instructions[id.index()];
        instr.block = None;
        instr.prev = None;
        instr.next = None;
        Ok(())
    }

    /// Appends an instruction to the end of `block`.
    ///
    /// # Errors
    ///
    /// Returns an error if the block is not live or an input was removed.
    pub fn append(
        &mut self,
        block: BlockId,
        kind: InstructionKind,
        ty: DataType,
        inputs: Vec<InstrId>,
    ) -> Result<InstrId> {
        let last = self.block_mut(block)?.last;
        let id = self.allocate(kind, ty, inputs)?;
        self.link(block, id, last)?;
        Ok(id)
    }

    /// Inserts an instruction immediately before `anchor`.
    ///
    /// # Errors
    ///
    /// Returns an error if `anchor` is not attached to a block.
    pub fn insert_before(
        &mut self,
        anchor: InstrId,
        kind: InstructionKind,
        ty: DataType,
        inputs: Vec<InstrId>,
    ) -> Result<InstrId> {
        let (block, prev) = self.placement(anchor)?;
        let id = self.allocate(kind, ty, inputs)?;
        self.link(block, id, prev)?;
        Ok(id)
    }

    /// Inserts an instruction immediately after `anchor`.
    ///
    /// # Errors
    ///
    /// Returns an error if `anchor` is not attached to a block.
    pub fn insert_after(
        &mut self,
        anchor: InstrId,
        kind: InstructionKind,
        ty: DataType,
        inputs: Vec<InstrId>,
    ) -> Result<InstrId> {
        let (block, _) = self.placement(anchor)?;
        let id = self.allocate(kind, ty, inputs)?;
        self.link(block, id, Some(anchor))?;
        Ok(id)
    }

    fn placement(&self, anchor: InstrId) -> Result<(BlockId, Option<InstrId>)> {
        let instr = self
            .instructions
            .get(anchor.index())
            .ok_or(Error::InvalidInstruction(anchor))?;
        if instr.is_phi() {
            return Err(invariant_error!("cannot place body instructions around phi {}", anchor));
        }
        let block = instr.block.ok_or(Error::InvalidInstruction(anchor))?;
        Ok((block, instr.prev))
    }

    /// Adds a phi to `block`; `inputs` are matched to predecessors positionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the block is not live or an input was removed.
    pub fn add_phi(&mut self, block: BlockId, ty: DataType, inputs: Vec<InstrId>) -> Result<InstrId> {
        self.block_mut(block)?;
        let id = self.allocate(InstructionKind::Phi, ty, inputs)?;
        self.instructions[id.index()].block = Some(block);
        self.block_mut(block)?.phis.push(id);
        Ok(id)
    }

    /// Sets phi input `slot`, used to close loop phis after the back edge value exists.
    ///
    /// # Errors
    ///
    /// Returns an error if `phi` is not a phi.
    pub fn set_phi_input(&mut self, phi: InstrId, slot: usize, value: InstrId) -> Result<()> {
        if !self.instr(phi).is_phi() {
            return Err(invariant_error!("{} is not a phi", phi));
        }
        if slot == self.instr(phi).inputs.len() {
            self.instructions[phi.index()].inputs.push(value);
            self.instructions[value.index()].uses.push(Use { user: phi, slot });
            Ok(())
        } else {
            self.replace_input(phi, slot, value)
        }
    }

    /// Adds a parameter at the end of the entry block.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry block was removed.
    pub fn add_parameter(&mut self, ty: DataType) -> Result<InstrId> {
        self.add_parameter_with(ty, false)
    }

    /// Adds a parameter, optionally known to be a non-null reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry block was removed.
    pub fn add_parameter_with(&mut self, ty: DataType, non_null: bool) -> Result<InstrId> {
        let kind = InstructionKind::Parameter {
            index: self.parameters.len() as u16,
            non_null,
        };
        let id = self.insert_in_entry(kind, ty)?;
        self.parameters.push(id);
        Ok(id)
    }

    /// Links a new input-less instruction at the head of the entry block,
    /// after the parameters, so that it dominates every body instruction.
    fn insert_in_entry(&mut self, kind: InstructionKind, ty: DataType) -> Result<InstrId> {
        let entry = self.entry;
        let mut after = None;
        let mut cursor = self.block_mut(entry)?.first;
        while let Some(id) = cursor {
            if !matches!(self.instr(id).kind, InstructionKind::Parameter { .. }) {
                break;
            }
            after = Some(id);
            cursor = self.instr(id).next;
        }
        let id = self.allocate(kind, ty, vec![])?;
        self.link(entry, id, after)?;
        Ok(id)
    }

    /// Returns the interned constant `value` of type `ty`, creating it in the
    /// entry block on first request.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is not representable in `ty`.
    pub fn constant(&mut self, value: ConstValue, ty: DataType) -> Result<InstrId> {
        if !value.fits(ty) {
            return Err(invariant_error!("constant {} does not fit {}", value, ty));
        }
        let key = (ty, value.bits());
        if let Some(&id) = self.constants.get(&key) {
            if self.instr(id).is_attached() {
                return Ok(id);
            }
        }
        let id = self.insert_in_entry(InstructionKind::Constant(value), ty)?;
        self.constants.insert(key, id);
        Ok(id)
    }

    /// Returns the `Int32` constant `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry block was removed.
    pub fn int_constant(&mut self, value: i32) -> Result<InstrId> {
        self.constant(ConstValue::Int(value), DataType::Int32)
    }

    /// Returns the `Int64` constant `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry block was removed.
    pub fn long_constant(&mut self, value: i64) -> Result<InstrId> {
        self.constant(ConstValue::Long(value), DataType::Int64)
    }

    /// Returns the `Float32` constant `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry block was removed.
    pub fn float_constant(&mut self, value: f32) -> Result<InstrId> {
        self.constant(ConstValue::Float(value), DataType::Float32)
    }

    /// Returns the `Float64` constant `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry block was removed.
    pub fn double_constant(&mut self, value: f64) -> Result<InstrId> {
        self.constant(ConstValue::Double(value), DataType::Float64)
    }

    /// Returns the null constant.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry block was removed.
    pub fn null_constant(&mut self) -> Result<InstrId> {
        self.constant(ConstValue::Null, DataType::Reference)
    }

    /// Overrides the side effects computed from the instruction kind.
    pub fn set_side_effects(&mut self, id: InstrId, effects: SideEffects) {
        self.instructions[id.index()].side_effects = effects;
    }

    /// Records the bytecode program counter of `id`.
    pub fn set_dex_pc(&mut self, id: InstrId, dex_pc: u32) {
        self.instructions[id.index()].dex_pc = dex_pc;
    }

    /// Attaches a deoptimization snapshot to `holder`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if a recorded value was removed.
    pub fn set_environment(&mut self, holder: InstrId, values: Vec<Option<InstrId>>) -> Result<()> {
        self.clear_environment(holder);
        for (slot, value) in values.iter().enumerate() {
            if let Some(value) = *value {
                let instr = self
                    .instructions
                    .get_mut(value.index())
                    .ok_or(Error::InvalidInstruction(value))?;
                instr.env_uses.push(Use { user: holder, slot });
            }
        }
        self.instructions[holder.index()].environment = Some(Environment { values });
        Ok(())
    }

    fn clear_environment(&mut self, holder: InstrId) {
        if let Some(env) = self.instructions[holder.index()].environment.take() {
            for (slot, value) in env.values.iter().enumerate() {
                if let Some(value) = *value {
                    let record = Use { user: holder, slot };
                    self.instructions[value.index()].env_uses.retain(|u| *u != record);
                }
            }
        }
    }

    /// Sets the write barrier requirement of a store. Returns `true` if it changed.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not a field or array store.
    pub fn set_write_barrier_kind(&mut self, id: InstrId, kind: WriteBarrierKind) -> Result<bool> {
        match &mut self.instructions[id.index()].kind {
            InstructionKind::InstanceFieldSet { write_barrier, .. }
            | InstructionKind::StaticFieldSet { write_barrier, .. }
            | InstructionKind::ArraySet { write_barrier, .. } => {
                let changed = *write_barrier != kind;
                *write_barrier = kind;
                Ok(changed)
            }
            _ => Err(invariant_error!("{} carries no write barrier", id)),
        }
    }

    /// Sets whether an instance field read emits its own read barrier.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not an instance field read.
    pub fn set_needs_read_barrier(&mut self, id: InstrId, needs: bool) -> Result<bool> {
        match &mut self.instructions[id.index()].kind {
            InstructionKind::InstanceFieldGet {
                needs_read_barrier, ..
            } => {
                let changed = *needs_read_barrier != needs;
                *needs_read_barrier = needs;
                Ok(changed)
            }
            _ => Err(invariant_error!("{} is not an instance field read", id)),
        }
    }

    // ------------------------------------------------------------------
    // Def-use mutation
    // ------------------------------------------------------------------

    /// Points input `slot` of `user` at `value`, updating both use lists.
    ///
    /// # Errors
    ///
    /// Returns an error if `slot` is out of range or the use record is missing.
    pub fn replace_input(&mut self, user: InstrId, slot: usize, value: InstrId) -> Result<()> {
        let old = *self.instructions[user.index()]
            .inputs
            .get(slot)
            .ok_or_else(|| invariant_error!("{} has no input slot {}", user, slot))?;
        if !self.instr(value).is_attached() {
            return Err(invariant_error!("{} would use removed value {}", user, value));
        }
        let record = Use { user, slot };
        let uses = &mut self.instructions[old.index()].uses;
        let pos = uses
            .iter()
            .position(|u| *u == record)
            .ok_or_else(|| invariant_error!("{} lacks use record ({}, {})", old, user, slot))?;
        uses.remove(pos);
        self.instructions[user.index()].inputs[slot] = value;
        self.instructions[value.index()].uses.push(record);
        Ok(())
    }

    fn remove_input(&mut self, user: InstrId, slot: usize) -> Result<()> {
        let inputs = self.instructions[user.index()].inputs.clone();
        let old = *inputs
            .get(slot)
            .ok_or_else(|| invariant_error!("{} has no input slot {}", user, slot))?;
        self.instructions[old.index()]
            .uses
            .retain(|u| *u != Use { user, slot });
        // Later inputs shift down by one slot.
        for (later_slot, &value) in inputs.iter().enumerate().skip(slot + 1) {
            for record in &mut self.instructions[value.index()].uses {
                if record.user == user && record.slot == later_slot {
                    record.slot = later_slot - 1;
                    break;
                }
            }
        }
        self.instructions[user.index()].inputs.remove(slot);
        Ok(())
    }

    /// Redirects every use of `old`, including environment uses, to `new`.
    pub fn replace_uses_with(&mut self, old: InstrId, new: InstrId) {
        if old == new {
            return;
        }
        let uses = std::mem::take(&mut self.instructions[old.index()].uses);
        for record in &uses {
            self.instructions[record.user.index()].inputs[record.slot] = new;
        }
        self.instructions[new.index()].uses.extend(uses);

        let env_uses = std::mem::take(&mut self.instructions[old.index()].env_uses);
        for record in &env_uses {
            if let Some(env) = self.instructions[record.user.index()].environment.as_mut() {
                env.values[record.slot] = Some(new);
            }
        }
        self.instructions[new.index()].env_uses.extend(env_uses);
    }

    /// Redirects the regular uses of `old` that execute only after control
    /// entered `dominator` to `new`. Returns the number of replaced uses.
    ///
    /// A use is covered when its user's block is dominated by `dominator`, or
    /// when the user is a (non-catch) phi whose input arrives over an edge from
    /// a block dominated by `dominator`. Environment uses are left unchanged.
    pub fn replace_uses_dominated_by(&mut self, old: InstrId, new: InstrId, dominator: BlockId) -> usize {
        if old == new {
            return 0;
        }
        let mut replaced = Vec::new();
        for record in &self.instr(old).uses {
            let user = self.instr(record.user);
            let Some(block) = user.block else {
                continue;
            };
            let covered = if self.dominates(dominator, block) {
                true
            } else if user.is_phi() && !self.block(block).is_catch {
                self.block(block)
                    .predecessors
                    .get(record.slot)
                    .is_some_and(|&pred| self.dominates(dominator, pred))
            } else {
                false
            };
            if covered {
                replaced.push(*record);
            }
        }
        for record in &replaced {
            self.instructions[old.index()].uses.retain(|u| u != record);
            self.instructions[record.user.index()].inputs[record.slot] = new;
            self.instructions[new.index()].uses.push(*record);
        }
        replaced.len()
    }

    /// Detaches `id` from its block and drops it from its inputs' use lists.
    ///
    /// # Errors
    ///
    /// Returns an error if the instruction is still used or already removed.
    pub fn remove_instruction(&mut self, id: InstrId) -> Result<()> {
        let instr = self.instr(id);
        if !instr.is_attached() {
            return Err(Error::InvalidInstruction(id));
        }
        if instr.has_uses() {
            return Err(invariant_error!(
                "cannot remove {} with {} uses and {} environment uses",
                id,
                instr.uses.len(),
                instr.env_uses.len()
            ));
        }
        let inputs = instr.inputs.clone();
        for (slot, input) in inputs.into_iter().enumerate() {
            let record = Use { user: id, slot };
            self.instructions[input.index()].uses.retain(|u| *u != record);
        }
        self.clear_environment(id);
        self.unlink(id)
    }

    /// Inserts a new instruction before `old`, moves every use and the
    /// environment of `old` to it, and removes `old`.
    ///
    /// # Errors
    ///
    /// Returns an error if `old` is not an attached body instruction.
    pub fn replace_with_new(
        &mut self,
        old: InstrId,
        kind: InstructionKind,
        ty: DataType,
        inputs: Vec<InstrId>,
    ) -> Result<InstrId> {
        let new = self.insert_before(old, kind, ty, inputs)?;
        self.instructions[new.index()].dex_pc = self.instr(old).dex_pc;
        if let Some(env) = self.instr(old).environment.clone() {
            self.clear_environment(old);
            self.set_environment(new, env.values)?;
        }
        self.replace_uses_with(old, new);
        self.remove_instruction(old)?;
        Ok(new)
    }

    /// Moves body instruction `id` to immediately after `anchor`, possibly
    /// into another block.
    ///
    /// # Errors
    ///
    /// Returns an error if either instruction is not an attached body instruction.
    pub fn move_after(&mut self, id: InstrId, anchor: InstrId) -> Result<()> {
        if id == anchor {
            return Ok(());
        }
        let (block, _) = self.placement(anchor)?;
        self.placement(id)?;
        self.unlink(id)?;
        self.link(block, id, Some(anchor))
    }

    // ------------------------------------------------------------------
    // Queries shared by several passes
    // ------------------------------------------------------------------

    /// Strips null checks, type refinements and address computations to find
    /// the reference they all alias.
    #[must_use]
    pub fn original_reference(&self, mut id: InstrId) -> InstrId {
        loop {
            let instr = self.instr(id);
            match instr.kind {
                InstructionKind::NullCheck
                | InstructionKind::BoundType { .. }
                | InstructionKind::IntermediateAddress { .. } => match instr.inputs.first() {
                    Some(&input) => id = input,
                    None => return id,
                },
                _ => return id,
            }
        }
    }

    /// Returns `true` if the two-operand instruction `id` may swap its operands.
    fn is_commutative(&self, id: InstrId) -> bool {
        match self.instr(id).kind {
            InstructionKind::Binary(op) => op.is_commutative(),
            InstructionKind::Condition { kind, .. } => {
                matches!(kind, ConditionKind::Equal | ConditionKind::NotEqual)
            }
            _ => false,
        }
    }

    /// Returns the constant operand of a two-operand instruction: the right
    /// one, or the left one when the operation is commutative.
    #[must_use]
    pub fn constant_right(&self, id: InstrId) -> Option<InstrId> {
        let inputs = self.instr(id).inputs();
        let [lhs, rhs] = *inputs else {
            return None;
        };
        if self.instr(rhs).as_constant().is_some() {
            Some(rhs)
        } else if self.is_commutative(id) && self.instr(lhs).as_constant().is_some() {
            Some(lhs)
        } else {
            None
        }
    }

    /// Returns the operand that [`Graph::constant_right`] did not pick, or the
    /// left operand when there is no constant.
    #[must_use]
    pub fn least_constant_left(&self, id: InstrId) -> Option<InstrId> {
        let inputs = self.instr(id).inputs();
        let [lhs, rhs] = *inputs else {
            return None;
        };
        match self.constant_right(id) {
            Some(c) if c == lhs && c != rhs => Some(rhs),
            _ => Some(lhs),
        }
    }

    /// Returns `true` if `id` is a `Binary` instruction of kind `op`.
    #[must_use]
    pub fn is_binary(&self, id: InstrId, op: BinaryOp) -> bool {
        self.instr(id).kind.as_binary() == Some(op)
    }
}
