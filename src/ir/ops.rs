//! The closed operator vocabulary accepted by the legalization pass.
//!
//! Earlier compiler stages guarantee that everything reaching this pass is
//! one of these kinds; `Unknown` stands for an operator that escaped
//! lowering and is the one fatal input condition.

/// Operator kind of an operation in the circuit graph.
///
/// The vocabulary is deliberately closed: classification facts about each
/// kind live in an exhaustively-matched table (see `classify`), so adding a
/// kind forces every consumer to state how it behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    // Variadic associative expressions, rebalanced into binary trees when
    // they grow past two operands.
    Add,
    Mul,
    And,
    Or,
    Xor,

    /// Binary subtraction; produced by the negative-constant-add rewrite.
    Sub,
    /// Ternary select: condition, then-value, else-value.
    Mux,
    /// Bit slice starting at `low_bit`; result width comes from the type.
    Extract { low_bit: u32 },
    /// Variadic concatenation. Associative but not commutative, so it is
    /// never rebalanced.
    Concat,

    /// Compile-time integer constant, two's complement in the result width.
    Constant { value: i64 },
    /// Read of a storage handle (wire, register, local variable). The
    /// target syntax forbids naming these, so they are always inline.
    ReadStorage,

    /// Extract one field of a struct value.
    StructExtract { field: usize },
    /// Destructure a struct into one result per field; exploded into
    /// per-field extracts during legalization.
    StructExplode,

    /// Opaque target-language expression with no side effects.
    VerbatimExpr { text: String },
    /// Opaque target-language expression with side effects (system calls,
    /// file I/O and the like).
    VerbatimExprSe { text: String },

    // Storage declarations. Zero operands, one storage-typed result,
    // freely relocatable within their block.
    Wire,
    Reg,
    /// An "automatic" local variable, only legal inside procedural scope
    /// and only at the head of its block.
    LocalVariable,

    /// Continuous assignment driving a storage handle in a graph region.
    ContinuousAssign,
    /// Non-blocking procedural assignment inside sequential scope.
    ProceduralAssign,
    /// Terminal drive of module output ports.
    Output,
    /// Structural entity instantiation. Operands are input ports, results
    /// are output ports, both named positionally.
    Instance {
        name: String,
        input_ports: Vec<String>,
        output_ports: Vec<String>,
    },

    /// Event-controlled procedural block; operands are the clock and an
    /// optional reset, the nested region is sequential.
    AlwaysBlock,
    /// Procedural block executed once at start of simulation.
    Initial,
    /// Procedural conditional; one or two nested sequential regions.
    If,
    /// Conditional-compilation wrapper. Purely a macro guard: its region
    /// inherits the sequential/non-sequential nature of the parent scope
    /// and is skipped when placing declarations.
    IfDef { guard: String },

    /// An operator the upstream lowering failed to legalize. Fatal.
    Unknown { name: String },
}

impl OpKind {
    /// Short mnemonic used in logs and debug output.
    pub fn mnemonic(&self) -> &str {
        match self {
            OpKind::Add => "add",
            OpKind::Mul => "mul",
            OpKind::And => "and",
            OpKind::Or => "or",
            OpKind::Xor => "xor",
            OpKind::Sub => "sub",
            OpKind::Mux => "mux",
            OpKind::Extract { .. } => "extract",
            OpKind::Concat => "concat",
            OpKind::Constant { .. } => "constant",
            OpKind::ReadStorage => "read",
            OpKind::StructExtract { .. } => "struct_extract",
            OpKind::StructExplode => "struct_explode",
            OpKind::VerbatimExpr { .. } => "verbatim",
            OpKind::VerbatimExprSe { .. } => "verbatim_se",
            OpKind::Wire => "wire",
            OpKind::Reg => "reg",
            OpKind::LocalVariable => "local_variable",
            OpKind::ContinuousAssign => "assign",
            OpKind::ProceduralAssign => "passign",
            OpKind::Output => "output",
            OpKind::Instance { .. } => "instance",
            OpKind::AlwaysBlock => "always",
            OpKind::Initial => "initial",
            OpKind::If => "if",
            OpKind::IfDef { .. } => "ifdef",
            OpKind::Unknown { name } => name,
        }
    }
}
