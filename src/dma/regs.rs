//! GDD register access
//!
//! The bit-level layout of the GDD register block differs between the OMAP
//! parts carrying it, so the DMA core talks to it through [`Registers`]. An
//! implementation is expected to be a thin MMIO wrapper; every method is a
//! single bus access (or a read-modify-write of one register) and is assumed
//! atomic at the bus level.

use super::Slot;
use crate::port::{ChannelId, Direction};

/// Bus address of a buffer as seen by the DMA engine.
pub type DeviceAddress = u32;

/// Transfer element size.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DataType {
    /// 8-bit elements
    S8,
    /// 16-bit elements
    S16,
    /// 32-bit elements
    S32,
}

impl DataType {
    /// Element size in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            Self::S8 => 1,
            Self::S16 => 2,
            Self::S32 => 4,
        }
    }
}

/// Which bus port a transfer endpoint sits on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusPort {
    /// System memory
    Memory,
    /// HSI/SSI peripheral FIFO
    Peripheral,
}

/// Address generation for one endpoint.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressMode {
    /// Address stays put for every element
    Constant,
    /// Address advances by one element after every access
    PostIncrement,
}

/// One side of a transfer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Endpoint {
    /// Bus port of the endpoint
    pub port: BusPort,
    /// Address generation mode
    pub mode: AddressMode,
    /// Start address. For the peripheral side this is the HSI channel index.
    pub address: DeviceAddress,
}

/// Interrupt sources armed on a slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptSources {
    /// Block transfer complete
    pub block: bool,
    /// Transfer timeout
    pub timeout: bool,
}

/// Transfer descriptor committed to a slot before it is enabled.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Descriptor {
    /// Host-side direction
    pub direction: Direction,
    /// Element size
    pub data_type: DataType,
    /// Source endpoint
    pub src: Endpoint,
    /// Destination endpoint
    pub dst: Endpoint,
    /// Synchronization tag, see [`super::sync::sync_tag`]
    pub sync: u8,
    /// Element count
    pub count: u16,
    /// Interrupt sources
    pub interrupts: InterruptSources,
}

impl Descriptor {
    /// Build the descriptor for a transfer between `buffer` and the FIFO of
    /// `channel`.
    ///
    /// The memory side always post-increments and the peripheral side stays
    /// constant; which of the two is the source depends on `direction`.
    pub fn new(direction: Direction, channel: ChannelId, buffer: DeviceAddress, count: u16, sync: u8) -> Self {
        let memory = Endpoint {
            port: BusPort::Memory,
            mode: AddressMode::PostIncrement,
            address: buffer,
        };
        let peripheral = Endpoint {
            port: BusPort::Peripheral,
            mode: AddressMode::Constant,
            address: channel.channel() as DeviceAddress,
        };
        let (src, dst) = match direction {
            Direction::Write => (memory, peripheral),
            Direction::Read => (peripheral, memory),
        };

        Self {
            direction,
            data_type: DataType::S32,
            src,
            dst,
            sync,
            count,
            interrupts: InterruptSources {
                block: true,
                timeout: true,
            },
        }
    }

    /// Address of the memory-side endpoint.
    pub fn memory_address(&self) -> DeviceAddress {
        match self.direction {
            Direction::Write => self.src.address,
            Direction::Read => self.dst.address,
        }
    }
}

/// Latched completion status of a slot (the `CSR` register).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelStatus {
    /// Block transfer complete
    pub block: bool,
    /// Transfer timed out
    pub timeout: bool,
}

/// Register primitives of the GDD block.
pub trait Registers {
    /// Write the descriptor fields (`CSDP`, `CCR` without the enable bit,
    /// `CICR`, `CSSA`, `CDSA`, `CEN`) of `slot`.
    fn program(&self, slot: Slot, desc: &Descriptor);

    /// Set or clear the `CCR` enable bit of `slot`.
    fn set_channel_enable(&self, slot: Slot, enable: bool);

    /// Read the `CCR` enable bit of `slot`.
    fn channel_enabled(&self, slot: Slot) -> bool;

    /// Read the `CSR` register of `slot`.
    fn channel_status(&self, slot: Slot) -> ChannelStatus;

    /// Read back the source address (`CSSA`) of `slot`.
    fn source_address(&self, slot: Slot) -> DeviceAddress;

    /// Read back the destination address (`CDSA`) of `slot`.
    fn destination_address(&self, slot: Slot) -> DeviceAddress;

    /// Read back the element count (`CEN`) of `slot`.
    fn element_count(&self, slot: Slot) -> u16;

    /// Read the MPU IRQ status bitmap, one bit per slot.
    fn irq_status(&self) -> u32;

    /// Acknowledge the status bits set in `mask`.
    fn clear_irq_status(&self, mask: u32);

    /// Read the MPU IRQ enable bitmap, one bit per slot.
    fn irq_enable_mask(&self) -> u32;

    /// Set or clear the MPU IRQ enable bit of `slot`.
    fn set_irq_enable(&self, slot: Slot, enable: bool);

    /// Clear the data-valid indicator of `channel` in the port buffer-state
    /// register for `direction`. Parts without such a register do nothing.
    fn clear_buffer_state(&self, channel: ChannelId, direction: Direction);
}

impl<T: Registers + ?Sized> Registers for &T {
    fn program(&self, slot: Slot, desc: &Descriptor) {
        (**self).program(slot, desc)
    }

    fn set_channel_enable(&self, slot: Slot, enable: bool) {
        (**self).set_channel_enable(slot, enable)
    }

    fn channel_enabled(&self, slot: Slot) -> bool {
        (**self).channel_enabled(slot)
    }

    fn channel_status(&self, slot: Slot) -> ChannelStatus {
        (**self).channel_status(slot)
    }

    fn source_address(&self, slot: Slot) -> DeviceAddress {
        (**self).source_address(slot)
    }

    fn destination_address(&self, slot: Slot) -> DeviceAddress {
        (**self).destination_address(slot)
    }

    fn element_count(&self, slot: Slot) -> u16 {
        (**self).element_count(slot)
    }

    fn irq_status(&self) -> u32 {
        (**self).irq_status()
    }

    fn clear_irq_status(&self, mask: u32) {
        (**self).clear_irq_status(mask)
    }

    fn irq_enable_mask(&self) -> u32 {
        (**self).irq_enable_mask()
    }

    fn set_irq_enable(&self, slot: Slot, enable: bool) {
        (**self).set_irq_enable(slot, enable)
    }

    fn clear_buffer_state(&self, channel: ChannelId, direction: Direction) {
        (**self).clear_buffer_state(channel, direction)
    }
}
