//! Heap locations and the aliasing relation between them.

use rustc_hash::FxHashMap;
use strum::Display;

use crate::{
    analysis::load_store::{
        escape::{calculate_escape, is_allocation, visit_escapes},
        subgraph::ExecutionSubgraph,
    },
    ir::{BinaryOp, BlockId, DataType, FieldInfo, Graph, InstrId, InstructionKind},
    utils::BitSet,
    Error, Result,
};

/// Vector length of a scalar access.
pub const SCALAR: u32 = 1;

/// A reference that is the base of heap accesses, with its escape facts.
#[derive(Debug, Clone)]
pub struct ReferenceInfo {
    reference: InstrId,
    position: usize,
    is_singleton: bool,
    is_singleton_and_not_returned: bool,
    is_singleton_and_not_deopt_visible: bool,
    subgraph: ExecutionSubgraph,
}

impl ReferenceInfo {
    /// Analyzes `reference`, recorded at `position` in the collector.
    #[must_use]
    pub fn new(graph: &Graph, reference: InstrId, position: usize) -> Self {
        let state = calculate_escape(graph, reference);
        let mut info = Self {
            reference,
            position,
            is_singleton: state.is_singleton,
            is_singleton_and_not_returned: state.is_singleton_and_not_returned,
            is_singleton_and_not_deopt_visible: state.is_singleton_and_not_deopt_visible,
            subgraph: ExecutionSubgraph::new(graph),
        };
        if is_allocation(graph.instr(reference).kind()) {
            info.collect_partial_escapes(graph);
            info.subgraph.finalize(graph);
        } else {
            // Anything not allocated here was visible before the method started.
            info.subgraph.invalidate();
        }
        info
    }

    /// Removes from the subgraph every block where the reference escapes.
    ///
    /// Phis that merge the reference are escapes in their own right and
    /// their escapes are followed too.
    fn collect_partial_escapes(&mut self, graph: &Graph) {
        let mut seen = BitSet::new(graph.instruction_capacity());
        let mut pending = vec![self.reference];
        while let Some(reference) = pending.pop() {
            visit_escapes(graph, reference, |escape| {
                let instr = graph.instr(escape);
                if let Some(block) = instr.block() {
                    self.subgraph.remove_block(graph, block);
                }
                if instr.is_phi() && seen.insert(escape.index()) {
                    pending.push(escape);
                }
                true
            });
        }

        // Values cannot be tracked through irreducible loops.
        for info in graph.loops() {
            if info.is_irreducible() {
                self.subgraph.remove_block(graph, info.header());
            }
        }
    }

    /// Returns the reference instruction.
    #[must_use]
    pub const fn reference(&self) -> InstrId {
        self.reference
    }

    /// Returns the position of this record in the collector.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Returns `true` if the reference is the only name of a local object.
    #[must_use]
    pub const fn is_singleton(&self) -> bool {
        self.is_singleton
    }

    /// Returns `true` for singletons that are not returned.
    #[must_use]
    pub const fn is_singleton_and_not_returned(&self) -> bool {
        self.is_singleton_and_not_returned
    }

    /// Returns `true` for singletons invisible to deoptimization.
    #[must_use]
    pub const fn is_singleton_and_not_deopt_visible(&self) -> bool {
        self.is_singleton_and_not_deopt_visible
    }

    /// Returns the executions in which the reference has not escaped.
    #[must_use]
    pub const fn subgraph(&self) -> &ExecutionSubgraph {
        &self.subgraph
    }

    /// Returns `true` if the object escapes on some paths but not on all of them.
    #[must_use]
    pub fn is_partial_singleton(&self) -> bool {
        self.subgraph.is_valid() && !self.subgraph.excluded_cohorts().is_empty()
    }
}

/// What part of an object a heap location names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum HeapLocationKind {
    /// A field of an instance.
    InstanceField,
    /// A static field, based on the class object.
    StaticField,
    /// One or more consecutive array elements.
    ArrayElement,
}

/// One memory cell class: a base reference plus a field or an element range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapLocation {
    ref_info: usize,
    kind: HeapLocationKind,
    offset: Option<u32>,
    index: Option<InstrId>,
    vector_length: u32,
    declaring_class: Option<u32>,
    has_aliased_locations: bool,
}

impl HeapLocation {
    /// Returns the position of the base reference's [`ReferenceInfo`].
    #[must_use]
    pub const fn ref_info(&self) -> usize {
        self.ref_info
    }

    /// Returns the location kind.
    #[must_use]
    pub const fn kind(&self) -> HeapLocationKind {
        self.kind
    }

    /// Returns the field offset, `None` for array elements.
    #[must_use]
    pub const fn offset(&self) -> Option<u32> {
        self.offset
    }

    /// Returns the index value, `None` for fields.
    #[must_use]
    pub const fn index(&self) -> Option<InstrId> {
        self.index
    }

    /// Returns the number of consecutive elements accessed, [`SCALAR`] for
    /// anything but vector accesses.
    #[must_use]
    pub const fn vector_length(&self) -> u32 {
        self.vector_length
    }

    /// Returns the class declaring the field, `None` for array elements.
    #[must_use]
    pub const fn declaring_class(&self) -> Option<u32> {
        self.declaring_class
    }

    /// Returns `true` for array element locations.
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.kind == HeapLocationKind::ArrayElement
    }

    /// Returns `true` if some other location may alias this one.
    #[must_use]
    pub const fn has_aliased_locations(&self) -> bool {
        self.has_aliased_locations
    }
}

/// Returns `true` if `[l1, l1 + len1 - 1]` and `[l2, l2 + len2 - 1]` intersect.
fn can_integer_ranges_overlap(l1: i64, len1: u32, l2: i64, len2: u32) -> bool {
    let h1 = l1 + i64::from(len1) - 1;
    let h2 = l2 + i64::from(len2) - 1;
    l1.max(l2) <= h1.min(h2)
}

fn int_constant(graph: &Graph, id: InstrId) -> Option<i64> {
    let instr = graph.instr(id);
    if instr.ty() != DataType::Int32 {
        return None;
    }
    instr.as_constant()?.as_i64()
}

/// For `base + c` or `base - c` with an `Int32` constant `c`, returns the
/// non-constant operand and the signed offset. `None` when `index` is not a
/// binary operation with a constant operand; the offset is `None` when the
/// operation or constant cannot be reasoned about.
fn offset_form(graph: &Graph, index: InstrId) -> Option<(InstrId, Option<i64>)> {
    let op = graph.instr(index).kind().as_binary()?;
    let constant = graph.constant_right(index)?;
    let base = graph.least_constant_left(index)?;
    let offset = match op {
        BinaryOp::Add => int_constant(graph, constant),
        BinaryOp::Sub => int_constant(graph, constant).map(|c| -c),
        _ => None,
    };
    Some((base, offset))
}

/// Returns `true` if accesses of `len1` elements at `index1` and `len2`
/// elements at `index2` of the same array may overlap.
///
/// | Indices | Answer |
/// |---------|--------|
/// | `i` and `i` | may alias |
/// | `c1` and `c2` | ranges `[c1, c1 + len1 - 1]`, `[c2, c2 + len2 - 1]` overlap |
/// | `i + c` and `i` | ranges `[c, ..]` and `[0, ..]` overlap |
/// | `i + c1` and `i + c2` | ranges `[c1, ..]` and `[c2, ..]` overlap |
/// | anything else | may alias |
///
/// `i - c` counts as `i + (-c)`.
#[must_use]
pub fn can_array_elements_alias(
    graph: &Graph,
    index1: InstrId,
    len1: u32,
    index2: InstrId,
    len2: u32,
) -> bool {
    debug_assert!(len1 >= SCALAR && len2 >= SCALAR);
    if index1 == index2 {
        return true;
    }

    if let (Some(l1), Some(l2)) = (int_constant(graph, index1), int_constant(graph, index2)) {
        return can_integer_ranges_overlap(l1, len1, l2, len2);
    }

    match (offset_form(graph, index1), offset_form(graph, index2)) {
        (Some((base1, offset1)), _) if base1 == index2 => {
            offset1.map_or(true, |l1| can_integer_ranges_overlap(l1, len1, 0, len2))
        }
        (_, Some((base2, offset2))) if base2 == index1 => {
            offset2.map_or(true, |l2| can_integer_ranges_overlap(l2, len2, 0, len1))
        }
        (Some((base1, Some(l1))), Some((base2, Some(l2)))) if base1 == base2 => {
            can_integer_ranges_overlap(l1, len1, l2, len2)
        }
        _ => true,
    }
}

/// Lookup key of a heap location.
type LocationKey = (usize, HeapLocationKind, Option<u32>, Option<InstrId>, u32, Option<u32>);

/// Collects the heap locations of a method and computes which may alias.
#[derive(Debug, Clone)]
pub struct HeapLocationCollector {
    ref_infos: Vec<ReferenceInfo>,
    ref_info_of: FxHashMap<InstrId, usize>,
    heap_locations: Vec<HeapLocation>,
    location_of: FxHashMap<LocationKey, usize>,
    aliasing_matrix: BitSet,
    max_locations: usize,
    overflowed: bool,
    has_heap_stores: bool,
    has_volatile: bool,
    has_monitor_operations: bool,
}

impl HeapLocationCollector {
    /// Creates a collector that gives up beyond `max_locations` locations.
    #[must_use]
    pub fn new(max_locations: usize) -> Self {
        Self {
            ref_infos: Vec::new(),
            ref_info_of: FxHashMap::default(),
            heap_locations: Vec::new(),
            location_of: FxHashMap::default(),
            aliasing_matrix: BitSet::new(0),
            max_locations,
            overflowed: false,
            has_heap_stores: false,
            has_volatile: false,
            has_monitor_operations: false,
        }
    }

    /// Records the heap accesses of every instruction in `block`.
    pub fn visit_block(&mut self, graph: &Graph, block: BlockId) {
        for id in graph.instructions(block) {
            if self.overflowed {
                return;
            }
            self.visit_instruction(graph, id);
        }
    }

    fn visit_instruction(&mut self, graph: &Graph, id: InstrId) {
        let instr = graph.instr(id);
        match *instr.kind() {
            InstructionKind::InstanceFieldGet { field, .. } => {
                self.visit_field(graph, instr.input(0), &field, HeapLocationKind::InstanceField);
            }
            InstructionKind::InstanceFieldSet { field, .. } => {
                self.visit_field(graph, instr.input(0), &field, HeapLocationKind::InstanceField);
                self.has_heap_stores = true;
            }
            InstructionKind::StaticFieldGet { field } => {
                self.visit_field(graph, instr.input(0), &field, HeapLocationKind::StaticField);
            }
            InstructionKind::StaticFieldSet { field, .. } => {
                self.visit_field(graph, instr.input(0), &field, HeapLocationKind::StaticField);
                self.has_heap_stores = true;
            }
            InstructionKind::ArrayGet => {
                self.visit_array(graph, instr.input(0), instr.input(1), SCALAR);
            }
            InstructionKind::ArraySet { .. } => {
                self.visit_array(graph, instr.input(0), instr.input(1), SCALAR);
                self.has_heap_stores = true;
            }
            InstructionKind::VecLoad(shape) => {
                self.visit_array(graph, instr.input(0), instr.input(1), shape.vector_length);
            }
            InstructionKind::VecStore(shape) => {
                self.visit_array(graph, instr.input(0), instr.input(1), shape.vector_length);
                self.has_heap_stores = true;
            }
            InstructionKind::MonitorOperation(_) => self.has_monitor_operations = true,
            InstructionKind::NewInstance { .. } | InstructionKind::NewArray { .. } => {
                self.get_or_create_reference_info(graph, id);
            }
            _ => {}
        }
    }

    fn visit_field(&mut self, graph: &Graph, object: InstrId, field: &FieldInfo, kind: HeapLocationKind) {
        if field.is_volatile {
            self.has_volatile = true;
        }
        let ref_info = self.get_or_create_reference_info(graph, object);
        self.add_location(HeapLocation {
            ref_info,
            kind,
            offset: Some(field.offset),
            index: None,
            vector_length: SCALAR,
            declaring_class: Some(field.declaring_class),
            has_aliased_locations: false,
        });
    }

    fn visit_array(&mut self, graph: &Graph, array: InstrId, index: InstrId, vector_length: u32) {
        let ref_info = self.get_or_create_reference_info(graph, array);
        self.add_location(HeapLocation {
            ref_info,
            kind: HeapLocationKind::ArrayElement,
            offset: None,
            index: Some(index),
            vector_length,
            declaring_class: None,
            has_aliased_locations: false,
        });
    }

    fn get_or_create_reference_info(&mut self, graph: &Graph, reference: InstrId) -> usize {
        let original = graph.original_reference(reference);
        if let Some(&position) = self.ref_info_of.get(&original) {
            return position;
        }
        let position = self.ref_infos.len();
        self.ref_infos.push(ReferenceInfo::new(graph, original, position));
        self.ref_info_of.insert(original, position);
        position
    }

    fn key(location: &HeapLocation) -> LocationKey {
        (
            location.ref_info,
            location.kind,
            location.offset,
            location.index,
            location.vector_length,
            location.declaring_class,
        )
    }

    fn add_location(&mut self, location: HeapLocation) {
        let key = Self::key(&location);
        if self.location_of.contains_key(&key) {
            return;
        }
        if self.heap_locations.len() >= self.max_locations {
            self.overflowed = true;
            return;
        }
        self.location_of.insert(key, self.heap_locations.len());
        self.heap_locations.push(location);
    }

    /// Returns `true` if more locations were seen than the collector tracks.
    #[must_use]
    pub const fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Returns `true` if the method stores to the heap.
    #[must_use]
    pub const fn has_heap_stores(&self) -> bool {
        self.has_heap_stores
    }

    /// Returns `true` if the method accesses a volatile field.
    #[must_use]
    pub const fn has_volatile(&self) -> bool {
        self.has_volatile
    }

    /// Returns `true` if the method enters or exits a monitor.
    #[must_use]
    pub const fn has_monitor_operations(&self) -> bool {
        self.has_monitor_operations
    }

    /// Returns the number of collected locations.
    #[must_use]
    pub fn number_of_heap_locations(&self) -> usize {
        self.heap_locations.len()
    }

    /// Returns all collected locations in discovery order.
    #[must_use]
    pub fn heap_locations(&self) -> &[HeapLocation] {
        &self.heap_locations
    }

    /// Returns location `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeapLocationOverflow`] if `index` was not collected.
    pub fn heap_location(&self, index: usize) -> Result<&HeapLocation> {
        self.heap_locations.get(index).ok_or(Error::HeapLocationOverflow {
            index,
            count: self.heap_locations.len(),
        })
    }

    /// Returns the analyzed base references.
    #[must_use]
    pub fn reference_infos(&self) -> &[ReferenceInfo] {
        &self.ref_infos
    }

    /// Returns the record of `reference`, looking through null checks and
    /// type refinements.
    #[must_use]
    pub fn find_reference_info_of(&self, graph: &Graph, reference: InstrId) -> Option<&ReferenceInfo> {
        let original = graph.original_reference(reference);
        self.ref_info_of.get(&original).map(|&p| &self.ref_infos[p])
    }

    /// Returns the location index of field `field` of `object`.
    #[must_use]
    pub fn field_heap_location(&self, graph: &Graph, object: InstrId, field: &FieldInfo) -> Option<usize> {
        let ref_info = self.find_reference_info_of(graph, object)?.position();
        let kind = if matches!(graph.instr(graph.original_reference(object)).kind(), InstructionKind::LoadClass { .. }) {
            HeapLocationKind::StaticField
        } else {
            HeapLocationKind::InstanceField
        };
        self.location_of
            .get(&(ref_info, kind, Some(field.offset), None, SCALAR, Some(field.declaring_class)))
            .copied()
    }

    /// Returns the location index accessed by an array or vector access.
    #[must_use]
    pub fn array_heap_location(&self, graph: &Graph, access: InstrId) -> Option<usize> {
        let instr = graph.instr(access);
        let vector_length = match instr.kind() {
            InstructionKind::ArrayGet | InstructionKind::ArraySet { .. } => SCALAR,
            InstructionKind::VecLoad(shape) | InstructionKind::VecStore(shape) => shape.vector_length,
            _ => return None,
        };
        let ref_info = self.find_reference_info_of(graph, instr.input(0))?.position();
        self.location_of
            .get(&(
                ref_info,
                HeapLocationKind::ArrayElement,
                None,
                Some(instr.input(1)),
                vector_length,
                None,
            ))
            .copied()
    }

    /// Returns `true` if the objects behind two references may be the same.
    fn can_references_alias(&self, graph: &Graph, a: usize, b: usize) -> bool {
        if a == b {
            return true;
        }
        let (a, b) = (&self.ref_infos[a], &self.ref_infos[b]);
        if a.is_singleton() || b.is_singleton() {
            return false;
        }
        let fresh = |info: &ReferenceInfo| is_allocation(graph.instr(info.reference()).kind());
        let preexisting =
            |info: &ReferenceInfo| matches!(graph.instr(info.reference()).kind(), InstructionKind::Parameter { .. });
        // Distinct allocation sites never produce the same object, and an
        // allocation is never one of the objects the method was called with.
        !((fresh(a) && fresh(b)) || (fresh(a) && preexisting(b)) || (preexisting(a) && fresh(b)))
    }

    fn compute_may_alias(&self, graph: &Graph, i: usize, j: usize) -> bool {
        let (a, b) = (&self.heap_locations[i], &self.heap_locations[j]);
        if a.kind != b.kind || a.offset != b.offset || a.declaring_class != b.declaring_class {
            return false;
        }
        if !self.can_references_alias(graph, a.ref_info, b.ref_info) {
            return false;
        }
        if let (Some(index1), Some(index2)) = (a.index, b.index) {
            return can_array_elements_alias(graph, index1, a.vector_length, index2, b.vector_length);
        }
        true
    }

    fn matrix_position(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < j);
        let n = self.heap_locations.len();
        n * i - (1 + i) * i / 2 + (j - i - 1)
    }

    /// Fills the aliasing matrix for every pair of collected locations.
    pub fn build_aliasing_matrix(&mut self, graph: &Graph) {
        let n = self.heap_locations.len();
        self.aliasing_matrix = BitSet::new(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in i + 1..n {
                if self.compute_may_alias(graph, i, j) {
                    let position = self.matrix_position(i, j);
                    self.aliasing_matrix.insert(position);
                    self.heap_locations[i].has_aliased_locations = true;
                    self.heap_locations[j].has_aliased_locations = true;
                }
            }
        }
    }

    /// Returns `true` if locations `i` and `j` may name the same memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HeapLocationOverflow`] if either index was not collected.
    pub fn may_alias(&self, i: usize, j: usize) -> Result<bool> {
        let count = self.heap_locations.len();
        for index in [i, j] {
            if index >= count {
                return Err(Error::HeapLocationOverflow { index, count });
            }
        }
        if i == j {
            return Ok(true);
        }
        let (low, high) = if i < j { (i, j) } else { (j, i) };
        Ok(self.aliasing_matrix.contains(self.matrix_position(low, high)))
    }
}
