//! Operand mapping: from statement leaves to symbolic kernel operands.
//!
//! One mapping pass runs per generate/bind cycle and is shared by signature
//! synthesis, body emission and argument binding. The pass walks every
//! statement of the batch in traversal order and assigns each *distinct*
//! operand (by [`MemoryId`], not by tree position) one [`MappedOperand`] with
//! a unique symbolic name. Repeated operands, within one statement or across
//! the batch, collapse to the same entry.

use crate::error::GenerationError;
use crate::ir::{AccessPattern, Leaf, MemoryId, ScalarType, Statement};
use log::debug;
use std::collections::HashMap;

/// Static shape of a mapped operand, as seen by the signature synthesizer
/// and the binder. Runtime payloads stay on the tree leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappedKind {
    HostScalar {
        scalar_type: ScalarType,
    },
    DeviceScalar {
        scalar_type: ScalarType,
    },
    Vector {
        scalar_type: ScalarType,
        pattern: AccessPattern,
    },
    Matrix {
        scalar_type: ScalarType,
        patterns: [AccessPattern; 2],
    },
    SymbolicVector {
        scalar_type: ScalarType,
        has_value: bool,
        has_index: bool,
    },
}

impl MappedKind {
    fn from_leaf(leaf: &Leaf) -> Self {
        match leaf {
            Leaf::HostScalar { scalar_type, .. } => MappedKind::HostScalar {
                scalar_type: *scalar_type,
            },
            Leaf::DeviceScalar { scalar_type, .. } => MappedKind::DeviceScalar {
                scalar_type: *scalar_type,
            },
            Leaf::Vector {
                scalar_type,
                pattern,
                ..
            } => MappedKind::Vector {
                scalar_type: *scalar_type,
                pattern: *pattern,
            },
            Leaf::Matrix {
                scalar_type,
                patterns,
                ..
            } => MappedKind::Matrix {
                scalar_type: *scalar_type,
                patterns: *patterns,
            },
            Leaf::SymbolicVector {
                scalar_type,
                value,
                index,
                ..
            } => MappedKind::SymbolicVector {
                scalar_type: *scalar_type,
                has_value: value.is_some(),
                has_index: index.is_some(),
            },
        }
    }

    fn name_prefix(&self) -> &'static str {
        match self {
            MappedKind::HostScalar { .. } => "val",
            MappedKind::DeviceScalar { .. } => "scal",
            MappedKind::Vector { .. } => "vec",
            MappedKind::Matrix { .. } => "mat",
            MappedKind::SymbolicVector { .. } => "sym",
        }
    }

    /// Whether emitted parameter/body text for this kind depends on the
    /// configured vector width.
    pub fn width_sensitive(&self) -> bool {
        matches!(self, MappedKind::Vector { .. } | MappedKind::Matrix { .. })
    }
}

/// The symbolic, deduplicated representative of one distinct runtime operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedOperand {
    pub id: MemoryId,
    /// Unique symbolic name used in the signature and kernel bodies.
    pub name: String,
    pub kind: MappedKind,
    /// Vector width, propagated by the generation driver before any text is
    /// emitted. Stays 1 for width-insensitive kinds.
    pub simd_width: u32,
}

/// Result of one mapping pass over a statement batch.
///
/// Owned exclusively by one generate/bind cycle; never cached across
/// configurations or shared between calls.
#[derive(Debug, Clone)]
pub struct OperandMap {
    operands: Vec<MappedOperand>,
    index: HashMap<MemoryId, usize>,
    /// Per statement: the operand index of every leaf visit, in traversal
    /// order and *including* repeat visits. Signature synthesis and binding
    /// both replay these lists with their own first-sight dedup, which is
    /// what keeps the two in lock-step.
    visit_orders: Vec<Vec<usize>>,
}

impl OperandMap {
    pub fn operands(&self) -> &[MappedOperand] {
        &self.operands
    }

    pub fn operand(&self, index: usize) -> &MappedOperand {
        &self.operands[index]
    }

    pub fn lookup(&self, id: MemoryId) -> Option<&MappedOperand> {
        self.index.get(&id).map(|&i| &self.operands[i])
    }

    /// Leaf visitation order of statement `statement_index`.
    pub fn visit_order(&self, statement_index: usize) -> &[usize] {
        &self.visit_orders[statement_index]
    }

    pub fn num_statements(&self) -> usize {
        self.visit_orders.len()
    }

    /// Propagates the configured vector width into every width-sensitive
    /// operand. Must run before signature synthesis or body emission so that
    /// width-dependent text decisions see the final value.
    pub fn set_simd_width(&mut self, width: u32) {
        for operand in &mut self.operands {
            if operand.kind.width_sensitive() {
                operand.simd_width = width;
            }
        }
    }
}

/// Maps a statement batch, sharing one identity table across all statements.
pub fn map_batch(batch: &[Statement]) -> Result<OperandMap, GenerationError> {
    if batch.is_empty() {
        return Err(GenerationError::malformed("statement batch is empty"));
    }

    let mut operands: Vec<MappedOperand> = Vec::new();
    let mut index: HashMap<MemoryId, usize> = HashMap::new();
    let mut visit_orders: Vec<Vec<usize>> = Vec::with_capacity(batch.len());

    for statement in batch {
        let mut order = Vec::new();
        statement.for_each_leaf(&mut |leaf| {
            let idx = *index.entry(leaf.id()).or_insert_with(|| {
                let kind = MappedKind::from_leaf(leaf);
                let name = format!("{}{}", kind.name_prefix(), operands.len());
                operands.push(MappedOperand {
                    id: leaf.id(),
                    name,
                    kind,
                    simd_width: 1,
                });
                operands.len() - 1
            });
            order.push(idx);
        })?;
        visit_orders.push(order);
    }

    debug!(
        "mapped {} statements onto {} distinct operands",
        batch.len(),
        operands.len()
    );

    Ok(OperandMap {
        operands,
        index,
        visit_orders,
    })
}
