//! Kernel generation driver, configuration validator and the body-emission
//! template hook.
//!
//! A [`KernelGenerator`] owns one immutable [`KernelConfiguration`] and one
//! [`KernelTemplate`]. It exposes the three entry points of this crate:
//! checking a configuration against a device snapshot, generating the full
//! kernel source text for a statement batch, and binding runtime arguments
//! into the launch kernels. Generation and binding both start from the same
//! mapping pass, which is what keeps the emitted parameter list and the
//! argument slots in lock-step.

use crate::binding::{self, ArgSink, BindingPolicy, KernelArg};
use crate::config::KernelConfiguration;
use crate::device::{DeviceClass, DeviceSnapshot};
use crate::error::GenerationError;
use crate::ir::Statement;
use crate::mapping::{OperandMap, map_batch};
use crate::signature;
use log::debug;

/// Indented kernel source writer.
#[derive(Debug, Default)]
pub struct CodeBuffer {
    buf: String,
    indent_level: usize,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one line at the current indentation.
    pub fn line(&mut self, text: &str) {
        for _ in 0..self.indent_level {
            self.buf.push_str("  ");
        }
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

/// The per-operation strategy plugged into the generation driver.
///
/// Concrete statement lowering (how a reduction or a product becomes kernel
/// statements) lives entirely behind this trait; the driver only supplies
/// the enclosing function signature, attributes and the loop over kernel
/// indices. Implementations must be deterministic for identical inputs: the
/// generated text is cached upstream by content.
pub trait KernelTemplate {
    /// Emits the executable statements of kernel `kernel_index`, referencing
    /// operands only through the symbolic names in `map`.
    fn emit_body(
        &self,
        kernel_index: usize,
        buf: &mut CodeBuffer,
        map: &OperandMap,
        batch: &[Statement],
    );

    /// Workgroup-shared scratch the emitted body needs, in bytes, as a
    /// function of the scalar byte width only.
    fn local_mem_used(&self, _scalar_byte_width: usize) -> usize {
        0
    }

    /// Extra, strategy-specific rejection of a configuration (e.g. a product
    /// kernel whose tile dimension the local size must divide). `true`
    /// rejects.
    fn reject(&self, _config: &KernelConfiguration, _device: &DeviceSnapshot) -> bool {
        false
    }

    /// Template-contributed kernel parameters (e.g. problem dimensions),
    /// declared ahead of every operand parameter.
    fn extra_parameters(&self, _config: &KernelConfiguration) -> Vec<String> {
        Vec::new()
    }

    /// Binds the runtime values of [`Self::extra_parameters`], in the same
    /// order, for kernel `kernel_index`. The two must stay in lock-step; the
    /// driver verifies the counts and refuses to launch on a mismatch.
    fn bind_extra(&self, _kernel_index: usize, _args: &mut Vec<KernelArg>) {}
}

/// Drives one generation unit: configuration validity, source generation and
/// launch configuration for one statement batch.
///
/// Holds no state besides the configuration and the template; every call
/// owns its own mapping pass and binding session, so independent generators
/// may run on separate threads.
pub struct KernelGenerator<T: KernelTemplate> {
    template: T,
    config: KernelConfiguration,
    kernel_prefix: String,
}

impl<T: KernelTemplate> KernelGenerator<T> {
    pub fn new(template: T, config: KernelConfiguration, kernel_prefix: impl Into<String>) -> Self {
        Self {
            template,
            config,
            kernel_prefix: kernel_prefix.into(),
        }
    }

    pub fn config(&self) -> &KernelConfiguration {
        &self.config
    }

    pub fn template(&self) -> &T {
        &self.template
    }

    /// Checks whether the configuration is legal and suitable for the given
    /// device. Pure; an invalid configuration is a normal refusal the caller
    /// answers by probing another configuration, never by "fixing up" this
    /// one.
    pub fn is_valid(&self, device: &DeviceSnapshot) -> bool {
        let config = &self.config;
        let [size0, size1] = config.local_work_size;
        let elements = config.work_group_elements();

        if !config.simd_width_supported() {
            return false;
        }

        if elements > device.max_work_group_size
            || size0 > device.max_work_item_sizes[0]
            || size1 > device.max_work_item_sizes[1]
        {
            return false;
        }

        // Misaligned work-groups waste SIMD lanes on GPUs; other device
        // classes schedule work items individually.
        if device.device_class == DeviceClass::Gpu && elements % device.warp_size() != 0 {
            return false;
        }

        let scalar_width = config.scalar_type.byte_width();
        if self.template.local_mem_used(scalar_width) > device.local_mem_size {
            return false;
        }

        !self.template.reject(config, device)
    }

    /// Generates the kernel source text for the batch: one decorated entry
    /// point per configured kernel index, all sharing one synthesized
    /// parameter list.
    ///
    /// The output is well-formed independent of any particular device and is
    /// byte-identical across calls with the same batch and configuration.
    pub fn generate(&self, batch: &[Statement]) -> Result<String, GenerationError> {
        let mut map = map_batch(batch)?;
        map.set_simd_width(self.config.simd_width);

        let extra = self.template.extra_parameters(&self.config);
        let parameters = signature::synthesize(&map, &extra)?;

        let mut buf = CodeBuffer::new();
        for kernel_index in 0..self.config.num_kernels {
            buf.line(&self.config.reqd_work_group_size_attribute());
            buf.line(&format!(
                "__kernel void {}{}({})",
                self.kernel_prefix, kernel_index, parameters
            ));
            buf.line("{");
            buf.indent();
            self.template.emit_body(kernel_index, &mut buf, &map, batch);
            buf.dedent();
            buf.line("}");
        }

        let source = buf.into_string();
        debug!(
            "generated {} kernel(s), {} bytes of source",
            self.config.num_kernels,
            source.len()
        );
        Ok(source)
    }

    /// Binds runtime arguments and the work-group shape into the launch
    /// kernels, one sink per configured kernel index.
    ///
    /// Arguments are bound in the exact order the generated signature
    /// declared them: template extras first, then every statement's leaves in
    /// traversal order, deduplicated under `policy`'s identity scope. Any
    /// divergence from the signature layout aborts with
    /// [`GenerationError::SlotDesynchronization`] before a wrong launch can
    /// happen.
    pub fn configure<S, P>(
        &self,
        batch: &[Statement],
        sinks: &mut [S],
        policy: &mut P,
    ) -> Result<(), GenerationError>
    where
        S: ArgSink,
        P: BindingPolicy,
    {
        if sinks.len() != self.config.num_kernels {
            return Err(GenerationError::desynchronized(format!(
                "{} kernel objects supplied for {} configured kernels",
                sinks.len(),
                self.config.num_kernels
            )));
        }

        let map = map_batch(batch)?;
        let layout = signature::layout(&map);
        let extra_count = self.template.extra_parameters(&self.config).len();

        for (kernel_index, sink) in sinks.iter_mut().enumerate() {
            sink.set_local_work_size(self.config.local_work_size);

            let mut args = Vec::new();
            self.template.bind_extra(kernel_index, &mut args);
            if args.len() != extra_count {
                return Err(GenerationError::desynchronized(format!(
                    "template bound {} extra argument(s) but declared {} extra parameter(s)",
                    args.len(),
                    extra_count
                )));
            }

            let session = policy.session(kernel_index);
            let mut groups = Vec::new();
            for statement in batch {
                binding::collect_statement_args(statement, session, &mut args, &mut groups)?;
            }

            for (id, slots) in &groups {
                match layout.entry(*id) {
                    Some(entry) if entry.slots == *slots => {}
                    Some(entry) => {
                        return Err(GenerationError::desynchronized(format!(
                            "operand {:?} bound {} slot(s) but the signature declared {}",
                            id, slots, entry.slots
                        )));
                    }
                    None => {
                        return Err(GenerationError::desynchronized(format!(
                            "operand {:?} bound but never declared in the signature",
                            id
                        )));
                    }
                }
            }

            debug!(
                "kernel {}: bound {} argument(s) in {} operand group(s)",
                kernel_index,
                args.len(),
                groups.len()
            );
            for (slot, value) in binding::assign_slots(args) {
                sink.set_arg(slot, value);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::KernelScoped;
    use crate::ir::{
        AccessPattern, Leaf, MemoryId, Op, Operand, ScalarType, StatementNode,
    };

    /// Minimal elementwise template used to exercise the driver.
    struct NoopTemplate;

    impl KernelTemplate for NoopTemplate {
        fn emit_body(
            &self,
            _kernel_index: usize,
            buf: &mut CodeBuffer,
            _map: &OperandMap,
            _batch: &[Statement],
        ) {
            buf.line("// no-op");
        }
    }

    /// Template with a local-memory footprint and an extra rejection rule.
    struct TiledTemplate {
        tile: usize,
    }

    impl KernelTemplate for TiledTemplate {
        fn emit_body(
            &self,
            _kernel_index: usize,
            buf: &mut CodeBuffer,
            _map: &OperandMap,
            _batch: &[Statement],
        ) {
            buf.line("// tiled");
        }

        fn local_mem_used(&self, scalar_byte_width: usize) -> usize {
            self.tile * self.tile * scalar_byte_width
        }

        fn reject(&self, config: &KernelConfiguration, _device: &DeviceSnapshot) -> bool {
            self.tile % config.local_work_size[0] != 0
        }
    }

    fn gpu_device() -> DeviceSnapshot {
        DeviceSnapshot {
            max_work_group_size: 1024,
            max_work_item_sizes: [1024, 1024],
            local_mem_size: 32 * 1024,
            device_class: DeviceClass::Gpu,
            vendor_id: 0,
        }
    }

    fn config(simd_width: u32, local: [usize; 2]) -> KernelConfiguration {
        KernelConfiguration::new(ScalarType::F32, simd_width, local, 1)
    }

    fn vector(id: u64) -> Operand {
        Operand::Leaf(Leaf::Vector {
            id: MemoryId(id),
            scalar_type: ScalarType::F32,
            pattern: AccessPattern::contiguous(),
            offset: 0,
            stride: 1,
        })
    }

    fn add_statement() -> Statement {
        Statement::new(vec![
            StatementNode {
                lhs: vector(1),
                op: Op::Assign,
                rhs: Operand::Node(1),
            },
            StatementNode {
                lhs: vector(2),
                op: Op::Add,
                rhs: vector(3),
            },
        ])
    }

    #[derive(Default)]
    struct RecordingSink {
        args: Vec<(u32, KernelArg)>,
        local_work_size: Option<[usize; 2]>,
    }

    impl ArgSink for RecordingSink {
        fn set_arg(&mut self, slot: u32, value: KernelArg) {
            self.args.push((slot, value));
        }

        fn set_local_work_size(&mut self, sizes: [usize; 2]) {
            self.local_work_size = Some(sizes);
        }
    }

    #[test]
    fn test_valid_configuration_on_plain_gpu() {
        let generator = KernelGenerator::new(NoopTemplate, config(4, [64, 1]), "k");
        assert!(generator.is_valid(&gpu_device()));
    }

    #[test]
    fn test_oversized_work_group_is_invalid() {
        let generator = KernelGenerator::new(NoopTemplate, config(4, [64, 32]), "k");
        assert!(!generator.is_valid(&gpu_device())); // 2048 > 1024

        let mut device = gpu_device();
        device.max_work_item_sizes = [32, 1024];
        let generator = KernelGenerator::new(NoopTemplate, config(4, [64, 1]), "k");
        assert!(!generator.is_valid(&device)); // dim 0 over its per-dim max
    }

    #[test]
    fn test_unsupported_simd_width_is_invalid_regardless_of_device() {
        for width in [0, 3, 5, 7, 32] {
            let generator = KernelGenerator::new(NoopTemplate, config(width, [64, 1]), "k");
            assert!(!generator.is_valid(&gpu_device()));

            let mut cpu = gpu_device();
            cpu.device_class = DeviceClass::Cpu;
            assert!(!generator.is_valid(&cpu));
        }
    }

    #[test]
    fn test_warp_alignment_rule() {
        // Vendor 0: warp 32. 96 is a multiple, 100 is not.
        let generator = KernelGenerator::new(NoopTemplate, config(1, [96, 1]), "k");
        assert!(generator.is_valid(&gpu_device()));
        let generator = KernelGenerator::new(NoopTemplate, config(1, [100, 1]), "k");
        assert!(!generator.is_valid(&gpu_device()));

        // AMD: wavefront 64. 128 is a multiple, 96 is not.
        let mut amd = gpu_device();
        amd.vendor_id = crate::device::AMD_VENDOR_ID;
        let generator = KernelGenerator::new(NoopTemplate, config(1, [128, 1]), "k");
        assert!(generator.is_valid(&amd));
        let generator = KernelGenerator::new(NoopTemplate, config(1, [96, 1]), "k");
        assert!(!generator.is_valid(&amd));
    }

    #[test]
    fn test_no_warp_alignment_check_on_non_gpu() {
        let mut cpu = gpu_device();
        cpu.device_class = DeviceClass::Cpu;
        let generator = KernelGenerator::new(NoopTemplate, config(1, [100, 1]), "k");
        assert!(generator.is_valid(&cpu));
    }

    #[test]
    fn test_local_memory_budget() {
        // 64x64 f32 tile = 16KB: fits in 32KB, not in 8KB.
        let generator =
            KernelGenerator::new(TiledTemplate { tile: 64 }, config(1, [64, 1]), "k");
        assert!(generator.is_valid(&gpu_device()));

        let mut small = gpu_device();
        small.local_mem_size = 8 * 1024;
        assert!(!generator.is_valid(&small));
    }

    #[test]
    fn test_template_rejection_hook() {
        // Local size 96 does not divide the 64-wide tile.
        let generator =
            KernelGenerator::new(TiledTemplate { tile: 64 }, config(1, [96, 1]), "k");
        assert!(!generator.is_valid(&gpu_device()));
    }

    #[test]
    fn test_generated_text_is_idempotent() {
        let generator = KernelGenerator::new(NoopTemplate, config(4, [64, 1]), "kernel_");
        let batch = [add_statement()];
        let first = generator.generate(&batch).unwrap();
        let second = generator.generate(&batch).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_generator_snapshots_configuration_at_construction() {
        let mut cfg = config(4, [64, 1]);
        let generator = KernelGenerator::new(NoopTemplate, cfg, "k");
        cfg.local_work_size = [128, 1];
        cfg.num_kernels = 3;

        let source = generator.generate(&[add_statement()]).unwrap();
        assert_eq!(source.matches("__kernel void").count(), 1);
        assert!(source.contains("__attribute__((reqd_work_group_size(64,1,1)))"));
    }

    #[test]
    fn test_generated_text_shape() {
        let mut cfg = config(4, [64, 1]);
        cfg.num_kernels = 2;
        let generator = KernelGenerator::new(NoopTemplate, cfg, "kernel_");
        let source = generator.generate(&[add_statement()]).unwrap();

        assert_eq!(
            source
                .matches("__attribute__((reqd_work_group_size(64,1,1)))")
                .count(),
            2
        );
        assert!(source.contains("__kernel void kernel_0(__global float4* vec0"));
        assert!(source.contains("__kernel void kernel_1(__global float4* vec0"));
    }

    #[test]
    fn test_configure_sets_sizes_and_slots_in_signature_order() {
        let generator = KernelGenerator::new(NoopTemplate, config(4, [64, 1]), "k");
        let batch = [add_statement()];
        let mut sinks = [RecordingSink::default()];
        generator
            .configure(&batch, &mut sinks, &mut KernelScoped::new())
            .unwrap();

        assert_eq!(sinks[0].local_work_size, Some([64, 1]));
        assert_eq!(
            sinks[0].args,
            vec![
                (0, KernelArg::Mem(MemoryId(1))),
                (1, KernelArg::Mem(MemoryId(2))),
                (2, KernelArg::Mem(MemoryId(3))),
            ]
        );
    }

    #[test]
    fn test_configure_rejects_wrong_kernel_count() {
        let generator = KernelGenerator::new(NoopTemplate, config(4, [64, 1]), "k");
        let batch = [add_statement()];
        let mut sinks: [RecordingSink; 2] = Default::default();
        let err = generator
            .configure(&batch, &mut sinks, &mut KernelScoped::new())
            .unwrap_err();
        assert!(matches!(err, GenerationError::SlotDesynchronization { .. }));
    }

    #[test]
    fn test_mismatched_extra_binding_is_detected() {
        // Declares one extra parameter but binds two values for it.
        struct Shearing;
        impl KernelTemplate for Shearing {
            fn emit_body(
                &self,
                _kernel_index: usize,
                buf: &mut CodeBuffer,
                _map: &OperandMap,
                _batch: &[Statement],
            ) {
                buf.line("// shearing");
            }

            fn extra_parameters(&self, _config: &KernelConfiguration) -> Vec<String> {
                vec!["unsigned int N".to_string()]
            }

            fn bind_extra(&self, _kernel_index: usize, args: &mut Vec<KernelArg>) {
                args.push(KernelArg::Uint(16));
                args.push(KernelArg::Uint(32));
            }
        }

        let generator = KernelGenerator::new(Shearing, config(4, [64, 1]), "k");
        let batch = [add_statement()];
        let mut sinks = [RecordingSink::default()];
        let err = generator
            .configure(&batch, &mut sinks, &mut KernelScoped::new())
            .unwrap_err();
        assert!(matches!(err, GenerationError::SlotDesynchronization { .. }));
    }

    #[test]
    fn test_extra_arguments_precede_operand_arguments() {
        struct Sized;
        impl KernelTemplate for Sized {
            fn emit_body(
                &self,
                _kernel_index: usize,
                buf: &mut CodeBuffer,
                _map: &OperandMap,
                _batch: &[Statement],
            ) {
                buf.line("// sized");
            }

            fn extra_parameters(&self, _config: &KernelConfiguration) -> Vec<String> {
                vec!["unsigned int N".to_string()]
            }

            fn bind_extra(&self, _kernel_index: usize, args: &mut Vec<KernelArg>) {
                args.push(KernelArg::Uint(4096));
            }
        }

        let generator = KernelGenerator::new(Sized, config(4, [64, 1]), "k");
        let batch = [add_statement()];
        let mut sinks = [RecordingSink::default()];
        generator
            .configure(&batch, &mut sinks, &mut KernelScoped::new())
            .unwrap();
        assert_eq!(sinks[0].args[0], (0, KernelArg::Uint(4096)));
        assert_eq!(sinks[0].args[1], (1, KernelArg::Mem(MemoryId(1))));
    }
}
