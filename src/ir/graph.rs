// This module implements the arena-backed circuit graph: a Module owns Vec arenas of
// operations, values, blocks and regions, all addressed by u32 index handles. Values
// keep explicit use lists (owning operation + operand index) that every mutation API
// keeps in sync: building an operation registers uses, set_operand and
// replace_all_uses_with rewire them, erase_op unregisters them and tombstones the
// slots. Relocation helpers (move_before/move_after/move_to) splice operation handles
// between the ordered op lists of blocks. Regions are tagged Graph (module-body style,
// no inherent statement order) or Procedural (sequential execution), which is the
// single fact the legalization rules branch on most. Handles are never reused within
// one module, so a tombstoned slot reliably reports an operation as dead.

//! Arena-of-indices circuit graph.

use crate::ir::ops::OpKind;
use crate::ir::types::Type;

/// Handle of an operation in the module arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId(u32);

/// Handle of a value (operation result or block argument).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(u32);

/// Handle of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u32);

/// Handle of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(u32);

impl OpId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}
impl ValueId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}
impl BlockId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}
impl RegionId {
    fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Whether statement order inside a region is semantically meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Value-dependency graph with no required statement order (module body).
    Graph,
    /// Sequential execution order; declarations must lead (procedural body).
    Procedural,
}

/// Where a value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    OpResult { op: OpId, index: usize },
    BlockArg { block: BlockId, index: usize },
}

/// One use of a value: the owning operation and the operand slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Use {
    pub op: OpId,
    pub operand: usize,
}

/// An operation node: kind, operands, results, attributes, nested regions.
#[derive(Debug)]
pub struct OpData {
    pub kind: OpKind,
    pub operands: Vec<ValueId>,
    pub results: Vec<ValueId>,
    pub regions: Vec<RegionId>,
    pub block: BlockId,
    /// Human-readable name suggestion consumed by the external printer.
    pub name_hint: Option<String>,
    /// Marks two-state (X-free) arithmetic; survives rebalancing on the
    /// top node only.
    pub two_state: bool,
}

#[derive(Debug)]
struct ValueData {
    ty: Type,
    def: ValueDef,
    uses: Vec<Use>,
}

#[derive(Debug)]
struct BlockData {
    region: RegionId,
    ops: Vec<OpId>,
    args: Vec<ValueId>,
}

#[derive(Debug)]
struct RegionData {
    kind: RegionKind,
    /// Operation owning this region; `None` for the module body.
    parent: Option<OpId>,
    block: BlockId,
}

/// A named module port, realized as a block argument of the body block.
#[derive(Debug, Clone)]
pub struct Port {
    pub name: String,
    pub value: ValueId,
}

/// Insertion position for newly built operations.
#[derive(Debug, Clone, Copy)]
pub enum InsertPoint {
    AtStart(BlockId),
    AtEnd(BlockId),
    Before(OpId),
    After(OpId),
}

/// The top-level container: arenas plus a body graph region and ports.
#[derive(Debug)]
pub struct Module {
    ops: Vec<Option<OpData>>,
    values: Vec<Option<ValueData>>,
    blocks: Vec<BlockData>,
    regions: Vec<RegionData>,
    body: RegionId,
    ports: Vec<Port>,
}

impl Module {
    /// Create a module whose ports become block arguments of the body block.
    pub fn new(ports: Vec<(&str, Type)>) -> Self {
        let mut module = Module {
            ops: Vec::new(),
            values: Vec::new(),
            blocks: Vec::new(),
            regions: Vec::new(),
            body: RegionId(0),
            ports: Vec::new(),
        };
        let body = module.new_region(RegionKind::Graph, None);
        module.body = body;
        let block = module.regions[body.idx()].block;
        for (index, (name, ty)) in ports.into_iter().enumerate() {
            let value = module.new_value(ty, ValueDef::BlockArg { block, index });
            module.blocks[block.idx()].args.push(value);
            module.ports.push(Port {
                name: name.to_string(),
                value,
            });
        }
        module
    }

    fn new_region(&mut self, kind: RegionKind, parent: Option<OpId>) -> RegionId {
        let region = RegionId(self.regions.len() as u32);
        let block = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockData {
            region,
            ops: Vec::new(),
            args: Vec::new(),
        });
        self.regions.push(RegionData {
            kind,
            parent,
            block,
        });
        region
    }

    fn new_value(&mut self, ty: Type, def: ValueDef) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(Some(ValueData {
            ty,
            def,
            uses: Vec::new(),
        }));
        id
    }

    // --- accessors -------------------------------------------------------

    pub fn body_region(&self) -> RegionId {
        self.body
    }

    pub fn body_block(&self) -> BlockId {
        self.regions[self.body.idx()].block
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn port(&self, index: usize) -> ValueId {
        self.ports[index].value
    }

    pub fn is_live(&self, op: OpId) -> bool {
        self.ops[op.idx()].is_some()
    }

    pub fn op(&self, op: OpId) -> &OpData {
        self.ops[op.idx()].as_ref().expect("use of erased operation")
    }

    pub fn op_mut(&mut self, op: OpId) -> &mut OpData {
        self.ops[op.idx()].as_mut().expect("use of erased operation")
    }

    fn value_data(&self, value: ValueId) -> &ValueData {
        self.values[value.idx()].as_ref().expect("use of erased value")
    }

    pub fn value_type(&self, value: ValueId) -> &Type {
        &self.value_data(value).ty
    }

    pub fn value_def(&self, value: ValueId) -> ValueDef {
        self.value_data(value).def
    }

    /// The operation defining this value, or `None` for block arguments.
    pub fn defining_op(&self, value: ValueId) -> Option<OpId> {
        match self.value_data(value).def {
            ValueDef::OpResult { op, .. } => Some(op),
            ValueDef::BlockArg { .. } => None,
        }
    }

    pub fn uses(&self, value: ValueId) -> &[Use] {
        &self.value_data(value).uses
    }

    pub fn use_count(&self, value: ValueId) -> usize {
        self.value_data(value).uses.len()
    }

    pub fn has_one_use(&self, value: ValueId) -> bool {
        self.use_count(value) == 1
    }

    /// Total use count across all results of an operation.
    pub fn op_use_count(&self, op: OpId) -> usize {
        self.op(op)
            .results
            .iter()
            .map(|&r| self.use_count(r))
            .sum()
    }

    pub fn result(&self, op: OpId, index: usize) -> ValueId {
        self.op(op).results[index]
    }

    pub fn block_ops(&self, block: BlockId) -> &[OpId] {
        &self.blocks[block.idx()].ops
    }

    pub fn block_args(&self, block: BlockId) -> &[ValueId] {
        &self.blocks[block.idx()].args
    }

    pub fn block_region(&self, block: BlockId) -> RegionId {
        self.blocks[block.idx()].region
    }

    pub fn region_kind(&self, region: RegionId) -> RegionKind {
        self.regions[region.idx()].kind
    }

    pub fn region_block(&self, region: RegionId) -> BlockId {
        self.regions[region.idx()].block
    }

    /// Operation owning the region this block belongs to; `None` at the
    /// module body.
    pub fn parent_op(&self, block: BlockId) -> Option<OpId> {
        self.regions[self.blocks[block.idx()].region.idx()].parent
    }

    pub fn block_is_procedural(&self, block: BlockId) -> bool {
        self.region_kind(self.block_region(block)) == RegionKind::Procedural
    }

    pub fn op_in_procedural_region(&self, op: OpId) -> bool {
        self.block_is_procedural(self.op(op).block)
    }

    /// Lexical position of an operation within its block.
    pub fn position(&self, op: OpId) -> usize {
        let block = self.op(op).block;
        self.blocks[block.idx()]
            .ops
            .iter()
            .position(|&o| o == op)
            .expect("operation not in its block's op list")
    }

    /// Walk `op` up through its ancestors until reaching the operation
    /// directly inside `block`; `None` if `op` is not nested under it.
    pub fn ancestor_in_block(&self, mut op: OpId, block: BlockId) -> Option<OpId> {
        loop {
            if self.op(op).block == block {
                return Some(op);
            }
            op = self.parent_op(self.op(op).block)?;
        }
    }

    // --- construction ----------------------------------------------------

    /// Build an operation at the given insertion point, creating one result
    /// value per entry of `result_types`.
    pub fn build_op(
        &mut self,
        point: InsertPoint,
        kind: OpKind,
        operands: &[ValueId],
        result_types: Vec<Type>,
    ) -> OpId {
        let op = OpId(self.ops.len() as u32);
        let block = self.block_of_point(point);
        self.ops.push(Some(OpData {
            kind,
            operands: operands.to_vec(),
            results: Vec::new(),
            regions: Vec::new(),
            block,
            name_hint: None,
            two_state: false,
        }));
        for (index, ty) in result_types.into_iter().enumerate() {
            let value = self.new_value(ty, ValueDef::OpResult { op, index });
            self.ops[op.idx()].as_mut().unwrap().results.push(value);
        }
        for (operand, &value) in operands.iter().enumerate() {
            self.record_use(value, Use { op, operand });
        }
        let at = self.index_of_point(point);
        self.blocks[block.idx()].ops.insert(at, op);
        op
    }

    /// Attach a nested region of the given kind to `op`.
    pub fn add_region(&mut self, op: OpId, kind: RegionKind) -> RegionId {
        let region = self.new_region(kind, Some(op));
        self.op_mut(op).regions.push(region);
        region
    }

    fn block_of_point(&self, point: InsertPoint) -> BlockId {
        match point {
            InsertPoint::AtStart(block) | InsertPoint::AtEnd(block) => block,
            InsertPoint::Before(op) | InsertPoint::After(op) => self.op(op).block,
        }
    }

    fn index_of_point(&self, point: InsertPoint) -> usize {
        match point {
            InsertPoint::AtStart(_) => 0,
            InsertPoint::AtEnd(block) => self.blocks[block.idx()].ops.len(),
            InsertPoint::Before(op) => self.position(op),
            InsertPoint::After(op) => self.position(op) + 1,
        }
    }

    fn record_use(&mut self, value: ValueId, us: Use) {
        self.values[value.idx()]
            .as_mut()
            .expect("use of erased value")
            .uses
            .push(us);
    }

    fn remove_use(&mut self, value: ValueId, us: Use) {
        let uses = &mut self.values[value.idx()]
            .as_mut()
            .expect("use of erased value")
            .uses;
        let at = uses
            .iter()
            .position(|u| *u == us)
            .expect("use not registered");
        uses.swap_remove(at);
    }

    // --- mutation --------------------------------------------------------

    /// Replace one operand, keeping use lists in sync.
    pub fn set_operand(&mut self, op: OpId, operand: usize, value: ValueId) {
        let old = self.op(op).operands[operand];
        if old == value {
            return;
        }
        self.remove_use(old, Use { op, operand });
        self.op_mut(op).operands[operand] = value;
        self.record_use(value, Use { op, operand });
    }

    /// Redirect every use of `from` to `to`.
    pub fn replace_all_uses_with(&mut self, from: ValueId, to: ValueId) {
        debug_assert_ne!(from, to);
        let uses = std::mem::take(
            &mut self.values[from.idx()]
                .as_mut()
                .expect("use of erased value")
                .uses,
        );
        for us in uses {
            self.op_mut(us.op).operands[us.operand] = to;
            self.record_use(to, us);
        }
    }

    fn unlink(&mut self, op: OpId) {
        let block = self.op(op).block;
        let at = self.position(op);
        self.blocks[block.idx()].ops.remove(at);
    }

    /// Move an operation to an absolute position in a (possibly different)
    /// block.
    pub fn move_to(&mut self, op: OpId, block: BlockId, index: usize) {
        self.unlink(op);
        self.blocks[block.idx()].ops.insert(index, op);
        self.op_mut(op).block = block;
    }

    pub fn move_before(&mut self, op: OpId, target: OpId) {
        debug_assert_ne!(op, target);
        self.unlink(op);
        let block = self.op(target).block;
        let at = self.position(target);
        self.blocks[block.idx()].ops.insert(at, op);
        self.op_mut(op).block = block;
    }

    pub fn move_after(&mut self, op: OpId, target: OpId) {
        debug_assert_ne!(op, target);
        self.unlink(op);
        let block = self.op(target).block;
        let at = self.position(target) + 1;
        self.blocks[block.idx()].ops.insert(at, op);
        self.op_mut(op).block = block;
    }

    pub fn move_to_block_start(&mut self, op: OpId) {
        let block = self.op(op).block;
        self.move_to(op, block, 0);
    }

    /// Clone an operation (kind, operands, attributes) immediately before
    /// `target`. Only region-free operations can be cloned.
    pub fn clone_op_before(&mut self, op: OpId, target: OpId) -> OpId {
        debug_assert!(
            self.op(op).regions.is_empty(),
            "cannot clone an operation with nested regions"
        );
        let kind = self.op(op).kind.clone();
        let operands = self.op(op).operands.clone();
        let result_types: Vec<Type> = self
            .op(op)
            .results
            .iter()
            .map(|&r| self.value_type(r).clone())
            .collect();
        let name_hint = self.op(op).name_hint.clone();
        let two_state = self.op(op).two_state;
        let new_op = self.build_op(InsertPoint::Before(target), kind, &operands, result_types);
        self.op_mut(new_op).name_hint = name_hint;
        self.op_mut(new_op).two_state = two_state;
        new_op
    }

    /// Erase an operation (and recursively everything in its nested
    /// regions). All result values must be unused.
    pub fn erase_op(&mut self, op: OpId) {
        let regions = self.op(op).regions.clone();
        for region in regions {
            let block = self.regions[region.idx()].block;
            // Erase in reverse so defs outlive their uses.
            let ops: Vec<OpId> = self.blocks[block.idx()].ops.clone();
            for &nested in ops.iter().rev() {
                if self.is_live(nested) {
                    self.erase_op(nested);
                }
            }
        }
        let operands = self.op(op).operands.clone();
        for (operand, value) in operands.into_iter().enumerate() {
            self.remove_use(value, Use { op, operand });
        }
        self.unlink(op);
        let results = self.op(op).results.clone();
        for result in results {
            debug_assert!(
                self.use_count(result) == 0,
                "erasing operation whose result is still in use"
            );
            self.values[result.idx()] = None;
        }
        self.ops[op.idx()] = None;
    }

    /// All live operations, in arena order. Intended for whole-module
    /// verification in tests rather than rewriting.
    pub fn live_ops(&self) -> impl Iterator<Item = OpId> + '_ {
        (0..self.ops.len() as u32)
            .map(OpId)
            .filter(|&op| self.is_live(op))
    }
}
