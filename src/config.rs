//! Kernel execution configuration.

use crate::ir::ScalarType;

/// Vector widths OpenCL actually provides (`float`, `float2`, ... `float16`).
pub const SUPPORTED_SIMD_WIDTHS: [u32; 5] = [1, 2, 4, 8, 16];

/// Execution configuration of one generation unit.
///
/// A plain `Copy` value: the generator snapshots it at construction and reads
/// only its own copy afterwards, so the emitted `reqd_work_group_size`
/// attribute and the launch work sizes always agree. Callers probing for a
/// valid configuration build a fresh value per attempt rather than editing
/// one a generator already holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfiguration {
    /// Element type of the generated kernels.
    pub scalar_type: ScalarType,
    /// Vector width used for wide loads/stores and vectorized parameters.
    pub simd_width: u32,
    /// Work-group shape (two sizes; the third dimension is always 1).
    pub local_work_size: [usize; 2],
    /// Number of kernel entry points this unit generates and launches.
    pub num_kernels: usize,
}

impl KernelConfiguration {
    pub fn new(
        scalar_type: ScalarType,
        simd_width: u32,
        local_work_size: [usize; 2],
        num_kernels: usize,
    ) -> Self {
        Self {
            scalar_type,
            simd_width,
            local_work_size,
            num_kernels,
        }
    }

    /// Total number of work items in one work-group.
    pub fn work_group_elements(&self) -> usize {
        self.local_work_size[0] * self.local_work_size[1]
    }

    /// Whether the configured vector width is one OpenCL provides.
    pub fn simd_width_supported(&self) -> bool {
        SUPPORTED_SIMD_WIDTHS.contains(&self.simd_width)
    }

    /// The work-group-size attribute emitted above every kernel entry.
    pub fn reqd_work_group_size_attribute(&self) -> String {
        format!(
            "__attribute__((reqd_work_group_size({},{},1)))",
            self.local_work_size[0], self.local_work_size[1]
        )
    }
}
