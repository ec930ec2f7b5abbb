//! Statement trees at the interface boundary.
//!
//! The expression trees themselves are built by an upstream scheduling layer;
//! this module only defines the shape this crate reads. A [`Statement`] is an
//! ordered array of nodes, each node combining a left operand, an operation
//! and a right operand. Operands are either leaves (runtime scalars, vectors,
//! matrices and their symbolic variants) or references to another node of the
//! same statement, which is how sub-expressions compose.
//!
//! Every leaf carries a [`MemoryId`]: a stable identity token assigned at
//! tree construction for the backing device storage. Two leaves with the same
//! `MemoryId` are the *same* runtime operand and collapse to one kernel
//! parameter, no matter how often they appear in a batch.

use crate::error::GenerationError;

/// Stable identity token for the backing storage of a leaf operand.
///
/// Used as the deduplication key throughout mapping, signature synthesis and
/// binding, instead of raw host addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryId(pub u64);

/// Element type of an operand, with a fixed byte width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    F32,
    F64,
}

impl ScalarType {
    /// Byte width of one element.
    pub fn byte_width(&self) -> usize {
        match self {
            ScalarType::F32 => 4,
            ScalarType::F64 => 8,
        }
    }

    /// OpenCL type name of the scalar element.
    pub fn opencl_name(&self) -> &'static str {
        match self {
            ScalarType::F32 => "float",
            ScalarType::F64 => "double",
        }
    }

    /// OpenCL type name at the given vector width (`float`, `float4`, ...).
    pub fn vectorized(&self, width: u32) -> String {
        if width <= 1 {
            self.opencl_name().to_string()
        } else {
            format!("{}{}", self.opencl_name(), width)
        }
    }
}

/// Runtime value of a host-side scalar operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarValue {
    F32(f32),
    F64(f64),
}

/// Static presence flags for one addressing dimension of a strided operand.
///
/// Whether an offset or stride kernel parameter exists is decided when the
/// tree is constructed, never from the runtime values: the generated
/// signature must stay fixed across launches even when a particular launch
/// happens to use offset 0 or stride 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessPattern {
    /// The operand may start at a nonzero element offset.
    pub may_offset: bool,
    /// The operand may have an element stride greater than one.
    pub may_stride: bool,
}

impl AccessPattern {
    /// Fixed-layout operand: no offset or stride parameters.
    pub const fn contiguous() -> Self {
        Self {
            may_offset: false,
            may_stride: false,
        }
    }

    /// Fully general operand: both offset and stride parameters.
    pub const fn general() -> Self {
        Self {
            may_offset: true,
            may_stride: true,
        }
    }
}

/// A leaf operand of a statement node.
///
/// Each variant carries the static facts that shape the kernel signature
/// (scalar type, access pattern, value/index presence) together with the
/// runtime payload bound at dispatch time.
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    /// Scalar passed to the kernel by value.
    HostScalar {
        id: MemoryId,
        scalar_type: ScalarType,
        value: ScalarValue,
    },
    /// Scalar living in device memory, passed by handle.
    DeviceScalar { id: MemoryId, scalar_type: ScalarType },
    /// Dense vector: handle plus optional offset/stride parameters.
    Vector {
        id: MemoryId,
        scalar_type: ScalarType,
        pattern: AccessPattern,
        offset: u32,
        stride: u32,
    },
    /// Dense matrix: handle plus optional offset/stride parameters per
    /// dimension.
    Matrix {
        id: MemoryId,
        scalar_type: ScalarType,
        patterns: [AccessPattern; 2],
        offsets: [u32; 2],
        strides: [u32; 2],
    },
    /// Parametric vector (e.g. a range or constant fill) that may contribute
    /// a value argument, an index argument, both, or nothing at all.
    SymbolicVector {
        id: MemoryId,
        scalar_type: ScalarType,
        value: Option<ScalarValue>,
        index: Option<u32>,
    },
}

impl Leaf {
    /// Identity token of the backing storage.
    pub fn id(&self) -> MemoryId {
        match self {
            Leaf::HostScalar { id, .. }
            | Leaf::DeviceScalar { id, .. }
            | Leaf::Vector { id, .. }
            | Leaf::Matrix { id, .. }
            | Leaf::SymbolicVector { id, .. } => *id,
        }
    }

    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Leaf::HostScalar { scalar_type, .. }
            | Leaf::DeviceScalar { scalar_type, .. }
            | Leaf::Vector { scalar_type, .. }
            | Leaf::Matrix { scalar_type, .. }
            | Leaf::SymbolicVector { scalar_type, .. } => *scalar_type,
        }
    }
}

/// Operation of a statement node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    InnerProd,
    MatVecProd,
    MatMatProd,
}

/// One operand slot of a statement node.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Leaf(Leaf),
    /// Reference to another node of the same statement (a sub-expression).
    Node(usize),
}

/// One node of a statement tree: `lhs op rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementNode {
    pub lhs: Operand,
    pub op: Op,
    pub rhs: Operand,
}

/// One expression tree, stored as an ordered node array.
///
/// Node 0 is the root. Composite operands reference other nodes by index.
/// The tree is owned by the caller and only ever read here.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub nodes: Vec<StatementNode>,
}

impl Statement {
    pub fn new(nodes: Vec<StatementNode>) -> Self {
        Self { nodes }
    }

    /// Visits every leaf operand in traversal order: node by node starting at
    /// the root, left operand before right, recursing into a composite
    /// operand's sub-tree before the parent's remaining operands. Producer
    /// operands are therefore always visited no later than their consumers.
    ///
    /// Fails with [`GenerationError::MalformedBatch`] on an empty statement,
    /// an out-of-range node reference or a reference cycle.
    pub fn for_each_leaf<'a, F>(&'a self, f: &mut F) -> Result<(), GenerationError>
    where
        F: FnMut(&'a Leaf),
    {
        if self.nodes.is_empty() {
            return Err(GenerationError::malformed("statement has no nodes"));
        }
        let mut in_progress = vec![false; self.nodes.len()];
        self.visit_node(0, &mut in_progress, f)
    }

    fn visit_node<'a, F>(
        &'a self,
        index: usize,
        in_progress: &mut [bool],
        f: &mut F,
    ) -> Result<(), GenerationError>
    where
        F: FnMut(&'a Leaf),
    {
        let node = self.nodes.get(index).ok_or_else(|| {
            GenerationError::malformed(format!(
                "node reference {} out of range ({} nodes)",
                index,
                self.nodes.len()
            ))
        })?;
        if in_progress[index] {
            return Err(GenerationError::malformed(format!(
                "node {} participates in a reference cycle",
                index
            )));
        }
        in_progress[index] = true;
        for operand in [&node.lhs, &node.rhs] {
            match operand {
                Operand::Leaf(leaf) => f(leaf),
                Operand::Node(child) => self.visit_node(*child, in_progress, f)?,
            }
        }
        in_progress[index] = false;
        Ok(())
    }
}
