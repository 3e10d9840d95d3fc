//! Per-frame resource sets.
//!
//! A [`FrameResources`] owns everything the CPU writes while recording one
//! frame: its own command context, the pass constants, one constant block
//! per material, and the instance buffer the culler compacts into. No two
//! slots of a ring share a buffer, so the CPU can fill slot `K` while the GPU
//! still reads slot `K - 1`.

use tracing::debug;

use cullframe_resources::ubo::{InstanceConstants, MaterialConstants, PassConstants};
use cullframe_rhi::{BindPoint, BufferUsage, CommandContext, Device, RhiResult, UploadBuffer};

/// Command context and dynamic buffers for one ring slot.
pub struct FrameResources<D: Device> {
    slot: usize,
    commands: D::CommandContext,
    pass_constants: UploadBuffer<D::Buffer, PassConstants>,
    material_constants: UploadBuffer<D::Buffer, MaterialConstants>,
    instances: UploadBuffer<D::Buffer, InstanceConstants>,
    /// Fence value signalled after this slot's last submission. Zero if
    /// the slot was never submitted.
    stamp: u64,
}

impl<D: Device> FrameResources<D> {
    /// Allocates the resources for ring slot `slot`.
    ///
    /// # Arguments
    ///
    /// * `device` - Device that owns the buffers and command context
    /// * `slot` - Ring index, used for debug labels and material tracking
    /// * `material_count` - Number of material constant blocks
    /// * `instance_capacity` - Number of instance entries across all render items
    ///
    /// # Errors
    ///
    /// Returns an error if buffer or command context creation fails.
    pub fn new(
        device: &D,
        slot: usize,
        material_count: usize,
        instance_capacity: usize,
    ) -> RhiResult<Self> {
        let commands = device.create_command_context()?;
        let pass_constants =
            UploadBuffer::new(device, BufferUsage::Uniform, 1, &format!("pass constants {slot}"))?;
        let material_constants = UploadBuffer::new(
            device,
            BufferUsage::Uniform,
            material_count,
            &format!("material constants {slot}"),
        )?;
        let instances = UploadBuffer::new(
            device,
            BufferUsage::Storage,
            instance_capacity,
            &format!("instances {slot}"),
        )?;

        debug!(
            "Frame resources {} created: {} materials, {} instances",
            slot, material_count, instance_capacity
        );

        Ok(Self {
            slot,
            commands,
            pass_constants,
            material_constants,
            instances,
            stamp: 0,
        })
    }

    /// Overwrites the pass constants.
    pub fn update_pass_constants(&self, data: &PassConstants) -> RhiResult<()> {
        self.pass_constants.copy_data(0, data)
    }

    /// Overwrites the constant block of material `index`.
    pub fn update_material_constants(&self, index: usize, data: &MaterialConstants) -> RhiResult<()> {
        self.material_constants.copy_data(index, data)
    }

    /// Overwrites instance entry `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ElementOutOfRange`](cullframe_rhi::RhiError::ElementOutOfRange)
    /// if `index` is past the instance capacity.
    pub fn update_instance(&self, index: usize, data: &InstanceConstants) -> RhiResult<()> {
        self.instances.copy_data(index, data)
    }

    /// Binds the pass, material and instance buffers for subsequent draws.
    pub fn bind_buffers(&mut self) -> RhiResult<()> {
        self.commands
            .bind_buffer(BindPoint::Pass, self.pass_constants.buffer())?;
        self.commands
            .bind_buffer(BindPoint::Materials, self.material_constants.buffer())?;
        self.commands
            .bind_buffer(BindPoint::Instances, self.instances.buffer())
    }

    /// Ring index this set was allocated for.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub fn commands(&self) -> &D::CommandContext {
        &self.commands
    }

    #[inline]
    pub fn commands_mut(&mut self) -> &mut D::CommandContext {
        &mut self.commands
    }

    #[inline]
    pub fn pass_constants(&self) -> &UploadBuffer<D::Buffer, PassConstants> {
        &self.pass_constants
    }

    #[inline]
    pub fn material_constants(&self) -> &UploadBuffer<D::Buffer, MaterialConstants> {
        &self.material_constants
    }

    #[inline]
    pub fn instances(&self) -> &UploadBuffer<D::Buffer, InstanceConstants> {
        &self.instances
    }

    /// Number of instance entries the slot can hold.
    #[inline]
    pub fn instance_capacity(&self) -> usize {
        self.instances.len()
    }

    /// Fence value of the last submission, or zero.
    #[inline]
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    #[inline]
    pub(crate) fn set_stamp(&mut self, stamp: u64) {
        self.stamp = stamp;
    }
}
