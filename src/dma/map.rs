//! Buffer mapping for device access

use core::ptr::NonNull;

use super::regs::DeviceAddress;

/// Which way the data moves across a mapping.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MapDirection {
    /// CPU wrote the buffer, device reads it.
    ToDevice,
    /// Device writes the buffer, CPU reads it afterwards.
    FromDevice,
}

/// Cache and address translation service for DMA buffers.
///
/// On cache-coherent parts with identity-mapped memory, `map` can return the
/// buffer address and the other two calls can be no-ops.
pub trait DmaMap: Sync {
    /// Make `bytes` bytes at `buf` visible to the device and return the bus
    /// address the DMA engine must use.
    fn map(&self, buf: NonNull<u32>, bytes: usize, dir: MapDirection) -> DeviceAddress;

    /// Release a mapping made by [`DmaMap::map`].
    fn unmap(&self, addr: DeviceAddress, bytes: usize, dir: MapDirection);

    /// Make device writes to a mapped buffer visible to the CPU.
    fn sync_for_cpu(&self, addr: DeviceAddress, bytes: usize, dir: MapDirection);
}

impl<T: DmaMap + ?Sized> DmaMap for &T {
    fn map(&self, buf: NonNull<u32>, bytes: usize, dir: MapDirection) -> DeviceAddress {
        (**self).map(buf, bytes, dir)
    }

    fn unmap(&self, addr: DeviceAddress, bytes: usize, dir: MapDirection) {
        (**self).unmap(addr, bytes, dir)
    }

    fn sync_for_cpu(&self, addr: DeviceAddress, bytes: usize, dir: MapDirection) {
        (**self).sync_for_cpu(addr, bytes, dir)
    }
}
