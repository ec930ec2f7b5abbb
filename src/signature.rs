//! Kernel signature synthesis.
//!
//! Derives the parameter list of every generated kernel entry from the
//! operand mapping: one parameter block per distinct operand, emitted at
//! first sight in traversal order, with conditional offset/stride parameters
//! decided by the operand's static access pattern. The launch binder replays
//! the same order and the same presence rules, so the text produced here and
//! the argument slots filled at dispatch stay aligned slot for slot.

use crate::error::GenerationError;
use crate::ir::MemoryId;
use crate::mapping::{MappedKind, MappedOperand, OperandMap};

/// One declared parameter block of the signature (text-free form).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    pub id: MemoryId,
    pub name: String,
    /// Number of kernel argument slots this operand occupies.
    pub slots: usize,
}

/// The declared parameter blocks in first-sight order, without any text.
///
/// Shared with the binder to verify that binding stays in lock-step with the
/// synthesized signature.
#[derive(Debug, Clone, Default)]
pub struct SignatureLayout {
    pub entries: Vec<LayoutEntry>,
}

impl SignatureLayout {
    /// Total argument slots occupied by operand parameters.
    pub fn total_slots(&self) -> usize {
        self.entries.iter().map(|e| e.slots).sum()
    }

    /// Looks up the declared parameter block of an operand by identity.
    pub fn entry(&self, id: MemoryId) -> Option<&LayoutEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

/// Parameter declarations of one mapped operand, in slot order.
fn operand_parameters(operand: &MappedOperand) -> Vec<String> {
    let name = &operand.name;
    let mut params = Vec::new();
    match &operand.kind {
        MappedKind::HostScalar { scalar_type } => {
            params.push(format!("{} {}", scalar_type.opencl_name(), name));
        }
        MappedKind::DeviceScalar { scalar_type } => {
            params.push(format!("__global {}* {}", scalar_type.opencl_name(), name));
        }
        MappedKind::Vector {
            scalar_type,
            pattern,
        } => {
            params.push(format!(
                "__global {}* {}",
                scalar_type.vectorized(operand.simd_width),
                name
            ));
            if pattern.may_offset {
                params.push(format!("unsigned int {}_offset", name));
            }
            if pattern.may_stride {
                params.push(format!("unsigned int {}_stride", name));
            }
        }
        MappedKind::Matrix {
            scalar_type,
            patterns,
        } => {
            params.push(format!(
                "__global {}* {}",
                scalar_type.vectorized(operand.simd_width),
                name
            ));
            for (dim, pattern) in patterns.iter().enumerate() {
                if pattern.may_offset {
                    params.push(format!("unsigned int {}_offset{}", name, dim));
                }
                if pattern.may_stride {
                    params.push(format!("unsigned int {}_stride{}", name, dim));
                }
            }
        }
        MappedKind::SymbolicVector {
            scalar_type,
            has_value,
            has_index,
        } => {
            if *has_value {
                params.push(format!("{} {}_value", scalar_type.opencl_name(), name));
            }
            if *has_index {
                params.push(format!("unsigned int {}_index", name));
            }
        }
    }
    params
}

/// Derives the text-free layout: parameter blocks at first sight, in batch
/// traversal order.
pub fn layout(map: &OperandMap) -> SignatureLayout {
    let mut entries: Vec<LayoutEntry> = Vec::new();
    let mut seen = vec![false; map.operands().len()];
    for statement_index in 0..map.num_statements() {
        for &operand_index in map.visit_order(statement_index) {
            if seen[operand_index] {
                continue;
            }
            seen[operand_index] = true;
            let operand = map.operand(operand_index);
            entries.push(LayoutEntry {
                id: operand.id,
                name: operand.name.clone(),
                slots: operand_parameters(operand).len(),
            });
        }
    }
    SignatureLayout { entries }
}

/// Synthesizes the full parameter-list text.
///
/// `extra` holds template-contributed parameters, declared ahead of every
/// operand block (their runtime values are bound by the template's
/// pre-binding hook in the same order). An entirely empty list is a
/// configuration error: no well-formed kernel can be emitted from it.
pub fn synthesize(map: &OperandMap, extra: &[String]) -> Result<String, GenerationError> {
    let mut params: Vec<String> = extra.to_vec();
    let mut seen = vec![false; map.operands().len()];
    for statement_index in 0..map.num_statements() {
        for &operand_index in map.visit_order(statement_index) {
            if seen[operand_index] {
                continue;
            }
            seen[operand_index] = true;
            params.extend(operand_parameters(map.operand(operand_index)));
        }
    }
    if params.is_empty() {
        return Err(GenerationError::InvalidProgram);
    }
    Ok(params.join(", "))
}
