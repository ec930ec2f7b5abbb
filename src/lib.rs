//! oclgen: device-specific OpenCL kernel generation for linear algebra
//! statement batches.
//!
//! Given a batch of expression trees from the upstream scheduling layer and
//! an execution configuration, this crate generates compilable OpenCL kernel
//! source text, validates the configuration against a target device, and
//! binds runtime operands into kernel argument slots at dispatch time.
//!
//! # Architecture
//!
//! - **ir**: the statement-tree shape read at the interface boundary
//! - **mapping**: deduplicated symbolic operands shared by all passes
//! - **signature**: kernel parameter-list synthesis
//! - **generator**: body-emission templates, the configuration validator and
//!   the generation driver
//! - **binding**: launch-time argument binding and its scoping policies
//! - **device**: the explicit device capability snapshot
//!
//! # Feature Flags
//!
//! - `opencl`: query [`DeviceSnapshot`] from a live `ocl` device
//!
//! # Usage
//!
//! ```ignore
//! use oclgen::{KernelConfiguration, KernelGenerator, ScalarType};
//!
//! let config = KernelConfiguration::new(ScalarType::F32, 4, [64, 1], 1);
//! let generator = KernelGenerator::new(my_template, config, "kernel_");
//!
//! if generator.is_valid(&snapshot) {
//!     let source = generator.generate(&batch)?;
//!     // compile `source` with the device wrapper, then:
//!     generator.configure(&batch, &mut kernels, &mut policy)?;
//! }
//! ```

pub mod binding;
pub mod config;
pub mod device;
pub mod error;
pub mod generator;
pub mod ir;
pub mod mapping;
pub mod signature;

pub use binding::{ArgSink, BatchScoped, BindingPolicy, BindingSession, KernelArg, KernelScoped};
pub use config::{KernelConfiguration, SUPPORTED_SIMD_WIDTHS};
pub use device::{AMD_VENDOR_ID, DeviceClass, DeviceSnapshot};
pub use error::GenerationError;
pub use generator::{CodeBuffer, KernelGenerator, KernelTemplate};
pub use ir::{
    AccessPattern, Leaf, MemoryId, Op, Operand, ScalarType, ScalarValue, Statement, StatementNode,
};
pub use mapping::{MappedKind, MappedOperand, OperandMap, map_batch};
pub use signature::{LayoutEntry, SignatureLayout};
