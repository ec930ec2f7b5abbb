//! Device capability snapshot.
//!
//! The configuration validator never reads an ambient "current device":
//! callers pass an explicit, read-only [`DeviceSnapshot`]. With the `opencl`
//! feature enabled a snapshot can be queried from a live `ocl` device; in all
//! other builds (and in tests) snapshots are constructed directly.

/// PCI vendor id of AMD. AMD GPUs execute 64-wide wavefronts, every other
/// vendor is treated as 32-wide. This is deliberately not generalized to
/// other 64-wide architectures; the id check is the documented behavior.
pub const AMD_VENDOR_ID: u32 = 4098;

/// Broad device class as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Cpu,
    Gpu,
    Accelerator,
}

/// Read-only facts about the target accelerator, queried fresh per validity
/// check. This crate never caches a snapshot between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    /// Maximum total work items per work-group.
    pub max_work_group_size: usize,
    /// Maximum work items along each of the first two dimensions.
    pub max_work_item_sizes: [usize; 2],
    /// Local (workgroup-shared) memory available, in bytes.
    pub local_mem_size: usize,
    pub device_class: DeviceClass,
    /// Numeric PCI vendor id.
    pub vendor_id: u32,
}

impl DeviceSnapshot {
    /// Hardware SIMD granularity: 32 lanes, except 64 on AMD GPUs.
    ///
    /// Only meaningful for [`DeviceClass::Gpu`]; the warp-alignment check is
    /// skipped entirely for other device classes.
    pub fn warp_size(&self) -> usize {
        if self.vendor_id == AMD_VENDOR_ID { 64 } else { 32 }
    }
}

#[cfg(feature = "opencl")]
impl DeviceSnapshot {
    /// Queries a snapshot from a live OpenCL device.
    ///
    /// Missing or malformed driver answers fall back to conservative
    /// defaults rather than failing the query.
    pub fn query(device: &ocl::Device) -> Self {
        use ocl::core::{DeviceInfo, DeviceInfoResult};

        let max_work_group_size = match device.info(DeviceInfo::MaxWorkGroupSize) {
            Ok(DeviceInfoResult::MaxWorkGroupSize(n)) => n,
            _ => 256,
        };
        let max_work_item_sizes = match device.info(DeviceInfo::MaxWorkItemSizes) {
            Ok(DeviceInfoResult::MaxWorkItemSizes(sizes)) => [
                sizes.first().copied().unwrap_or(1),
                sizes.get(1).copied().unwrap_or(1),
            ],
            _ => [max_work_group_size, max_work_group_size],
        };
        let local_mem_size = match device.info(DeviceInfo::LocalMemSize) {
            Ok(DeviceInfoResult::LocalMemSize(n)) => n as usize,
            _ => 16 * 1024,
        };
        let vendor_id = match device.info(DeviceInfo::VendorId) {
            Ok(DeviceInfoResult::VendorId(id)) => id,
            _ => 0,
        };
        let device_class = match device.info(DeviceInfo::Type) {
            Ok(DeviceInfoResult::Type(t)) if t.contains(ocl::DeviceType::CPU) => DeviceClass::Cpu,
            Ok(DeviceInfoResult::Type(t)) if t.contains(ocl::DeviceType::ACCELERATOR) => {
                DeviceClass::Accelerator
            }
            _ => DeviceClass::Gpu,
        };

        Self {
            max_work_group_size,
            max_work_item_sizes,
            local_mem_size,
            device_class,
            vendor_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warp_size_by_vendor() {
        let mut snapshot = DeviceSnapshot {
            max_work_group_size: 1024,
            max_work_item_sizes: [1024, 1024],
            local_mem_size: 32 * 1024,
            device_class: DeviceClass::Gpu,
            vendor_id: 0,
        };
        assert_eq!(snapshot.warp_size(), 32);

        snapshot.vendor_id = AMD_VENDOR_ID;
        assert_eq!(snapshot.warp_size(), 64);

        // NVIDIA's vendor id is not the reserved one.
        snapshot.vendor_id = 4318;
        assert_eq!(snapshot.warp_size(), 32);
    }
}
