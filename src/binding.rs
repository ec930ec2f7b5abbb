//! Launch-time argument binding.
//!
//! At dispatch the binder walks the statement batch in the same traversal
//! order the signature synthesizer used and collects the runtime value of
//! every leaf operand into an ordered argument list, honoring the same
//! offset/stride presence rules and the same identity dedup. Slot numbers
//! are assigned afterwards by a separate indexing pass over that list, and
//! the resulting assignments are written into the externally owned kernel
//! objects through [`ArgSink`].

use crate::error::GenerationError;
use crate::ir::{Leaf, MemoryId, ScalarValue, Statement};
use std::collections::HashSet;

/// One runtime kernel argument value.
///
/// `Mem` carries the identity token of a device allocation; the external
/// kernel wrapper resolves it to the actual memory object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArg {
    Mem(MemoryId),
    Uint(u32),
    F32(f32),
    F64(f64),
}

impl From<ScalarValue> for KernelArg {
    fn from(value: ScalarValue) -> Self {
        match value {
            ScalarValue::F32(v) => KernelArg::F32(v),
            ScalarValue::F64(v) => KernelArg::F64(v),
        }
    }
}

/// The calls this crate issues into the external kernel-object wrapper.
///
/// One sink corresponds to one kernel object of the launch batch. Argument
/// slots are written in the exact order the generated signature declared
/// them; the work-group shape is set once per configure call.
pub trait ArgSink {
    fn set_arg(&mut self, slot: u32, value: KernelArg);
    fn set_local_work_size(&mut self, sizes: [usize; 2]);
}

/// Per-launch identity state: which operands have already been bound.
///
/// Scoped to one configure call and discarded afterwards; never shared
/// between concurrent generation/binding calls.
#[derive(Debug, Default)]
pub struct BindingSession {
    seen: HashSet<MemoryId>,
}

impl BindingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an operand as bound. Returns `true` at first sight.
    fn mark(&mut self, id: MemoryId) -> bool {
        self.seen.insert(id)
    }

    fn clear(&mut self) {
        self.seen.clear();
    }
}

/// Controls how operand-identity dedup is scoped across the kernels of one
/// configure call.
pub trait BindingPolicy {
    /// Returns the session the given kernel index binds against.
    fn session(&mut self, kernel_index: usize) -> &mut BindingSession;
}

/// Every kernel invocation binds independently: an operand bound by kernel 0
/// is bound again by kernel 1.
#[derive(Debug, Default)]
pub struct KernelScoped {
    session: BindingSession,
}

impl KernelScoped {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BindingPolicy for KernelScoped {
    fn session(&mut self, _kernel_index: usize) -> &mut BindingSession {
        self.session.clear();
        &mut self.session
    }
}

/// One shared identity scope across the whole batch: an operand bound by an
/// earlier kernel is skipped by later ones.
#[derive(Debug, Default)]
pub struct BatchScoped {
    session: BindingSession,
}

impl BatchScoped {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BindingPolicy for BatchScoped {
    fn session(&mut self, _kernel_index: usize) -> &mut BindingSession {
        &mut self.session
    }
}

/// Argument values of one leaf operand, in slot order. Mirrors the parameter
/// blocks of the signature synthesizer exactly.
fn leaf_args(leaf: &Leaf, args: &mut Vec<KernelArg>) {
    match leaf {
        Leaf::HostScalar { value, .. } => args.push((*value).into()),
        Leaf::DeviceScalar { id, .. } => args.push(KernelArg::Mem(*id)),
        Leaf::Vector {
            id,
            pattern,
            offset,
            stride,
            ..
        } => {
            args.push(KernelArg::Mem(*id));
            if pattern.may_offset {
                args.push(KernelArg::Uint(*offset));
            }
            if pattern.may_stride {
                args.push(KernelArg::Uint(*stride));
            }
        }
        Leaf::Matrix {
            id,
            patterns,
            offsets,
            strides,
            ..
        } => {
            args.push(KernelArg::Mem(*id));
            for dim in 0..2 {
                if patterns[dim].may_offset {
                    args.push(KernelArg::Uint(offsets[dim]));
                }
                if patterns[dim].may_stride {
                    args.push(KernelArg::Uint(strides[dim]));
                }
            }
        }
        Leaf::SymbolicVector { value, index, .. } => {
            if let Some(value) = value {
                args.push((*value).into());
            }
            if let Some(index) = index {
                args.push(KernelArg::Uint(*index));
            }
        }
    }
}

/// Collects the argument values of one statement into `args`, in traversal
/// order, skipping operands the session has already bound. Each newly bound
/// operand is also recorded in `groups` as `(identity, slots consumed)` so
/// the driver can verify lock-step with the signature layout.
pub fn collect_statement_args(
    statement: &Statement,
    session: &mut BindingSession,
    args: &mut Vec<KernelArg>,
    groups: &mut Vec<(MemoryId, usize)>,
) -> Result<(), GenerationError> {
    statement.for_each_leaf(&mut |leaf| {
        if session.mark(leaf.id()) {
            let before = args.len();
            leaf_args(leaf, args);
            groups.push((leaf.id(), args.len() - before));
        }
    })
}

/// Pure slot assignment: pairs every collected value with its argument slot.
pub fn assign_slots(args: Vec<KernelArg>) -> Vec<(u32, KernelArg)> {
    args.into_iter()
        .enumerate()
        .map(|(slot, value)| (slot as u32, value))
        .collect()
}
