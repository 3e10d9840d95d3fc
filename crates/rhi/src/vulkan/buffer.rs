//! Host-visible buffers backed by gpu-allocator.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use super::VulkanShared;
use crate::buffer::{BufferId, BufferUsage, GpuBuffer, check_range};
use crate::error::{RhiError, RhiResult};

/// Converts a usage to Vulkan buffer usage flags.
///
/// Every buffer is addressable from shaders by device address.
pub(crate) fn to_vk_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let base = match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
        BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        BufferUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
    };
    base | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
}

/// GPU buffer wrapper with persistently mapped memory.
pub struct VulkanBuffer {
    shared: Arc<VulkanShared>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    address: vk::DeviceAddress,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl VulkanBuffer {
    pub(crate) fn new(
        shared: Arc<VulkanShared>,
        usage: BufferUsage,
        size: vk::DeviceSize,
        label: &str,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(to_vk_usage(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { shared.device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { shared.device.get_buffer_memory_requirements(buffer) };

        let allocation = {
            let mut guard = shared.allocator.lock();
            let allocator = guard
                .as_mut()
                .ok_or_else(|| RhiError::InvalidHandle("Allocator destroyed".to_string()))?;
            allocator.allocate(&AllocationCreateDesc {
                name: label,
                requirements,
                location: MemoryLocation::CpuToGpu,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
        };
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { shared.device.destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        unsafe {
            shared
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        let address = unsafe {
            shared
                .device
                .get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(buffer))
        };

        debug!("Created {} buffer '{}': {} bytes", usage.name(), label, size);

        Ok(Self {
            shared,
            buffer,
            allocation: Some(allocation),
            address,
            size,
            usage,
        })
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Shader-visible device address.
    #[inline]
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.address
    }

    fn mapped_ptr(&self) -> RhiResult<*mut u8> {
        let allocation = self.allocation.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("Buffer allocation is not available".to_string())
        })?;
        allocation
            .mapped_ptr()
            .map(|ptr| ptr.as_ptr() as *mut u8)
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))
    }
}

impl GpuBuffer for VulkanBuffer {
    fn id(&self) -> BufferId {
        use ash::vk::Handle;
        BufferId(self.buffer.as_raw())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn write(&self, offset: u64, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        check_range(offset, data.len(), self.size)?;
        let base = self.mapped_ptr()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), base.add(offset as usize), data.len());
        }
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> RhiResult<()> {
        if out.is_empty() {
            return Ok(());
        }
        check_range(offset, out.len(), self.size)?;
        let base = self.mapped_ptr()?;
        unsafe {
            std::ptr::copy_nonoverlapping(base.add(offset as usize), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        // Free allocation first, then destroy buffer
        if let Some(allocation) = self.allocation.take() {
            if let Some(allocator) = self.shared.allocator.lock().as_mut() {
                if let Err(e) = allocator.free(allocation) {
                    error!("Failed to free buffer allocation: {:?}", e);
                }
            }
        }

        unsafe {
            self.shared.device.destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_flags_include_device_address() {
        for usage in [
            BufferUsage::Vertex,
            BufferUsage::Index,
            BufferUsage::Uniform,
            BufferUsage::Storage,
        ] {
            assert!(to_vk_usage(usage).contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS));
        }
        assert!(to_vk_usage(BufferUsage::Uniform).contains(vk::BufferUsageFlags::UNIFORM_BUFFER));
        assert!(to_vk_usage(BufferUsage::Storage).contains(vk::BufferUsageFlags::STORAGE_BUFFER));
    }
}
