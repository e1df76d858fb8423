//! Programming and cancelling transfers

use core::ptr::NonNull;

use super::channel::State;
use super::map::{DmaMap, MapDirection};
use super::regs::{Descriptor, DeviceAddress, Registers};
use super::sync::sync_tag;
use super::{Error, Result, Slot, SlotState};
use crate::port::{ChannelId, Direction, PortHandler};

/// The controller with its lock held. Obtained from [`super::Gdd::lock`].
pub struct Locked<'a, 'd, R: Registers> {
    pub(crate) regs: &'a R,
    pub(crate) map: &'d dyn DmaMap,
    pub(crate) ports: &'d dyn PortHandler,
    pub(crate) state: &'a mut State<'d>,
}

impl<'a, 'd, R: Registers> Locked<'a, 'd, R> {
    /// Program a write of `words` 32-bit words from `data` to `channel` and
    /// start it. Completion is reported to the channel owner's `write_done`.
    ///
    /// # Safety
    ///
    /// `data` must stay valid for reads, and must not be written, until the
    /// channel owner's `write_done` runs or the transfer is cancelled.
    pub unsafe fn submit_write(&mut self, channel: ChannelId, data: *const u32, words: usize) -> Result<Slot> {
        self.submit(channel, Direction::Write, data.cast_mut(), words)
    }

    /// Program a read of `words` 32-bit words from `channel` into `data` and
    /// start it. Completion is reported to the channel owner's `read_done`.
    ///
    /// The default receive interrupt of the channel is off until the read
    /// completes or is cancelled.
    ///
    /// # Safety
    ///
    /// `data` must stay valid for writes, and must not be accessed, until the
    /// channel owner's `read_done` runs or the transfer is cancelled.
    pub unsafe fn submit_read(&mut self, channel: ChannelId, data: *mut u32, words: usize) -> Result<Slot> {
        self.submit(channel, Direction::Read, data, words)
    }

    /// Stop the write in flight on `channel`.
    ///
    /// Does nothing if no write is bound, or if the hardware already finished
    /// it (the dispatcher then reports the completion).
    pub fn cancel_write(&mut self, channel: ChannelId) {
        self.cancel(channel, Direction::Write)
    }

    /// Stop the read in flight on `channel` and restore its default receive
    /// interrupt.
    ///
    /// Does nothing if no read is bound, or if the hardware already finished
    /// it (the dispatcher then reports the completion).
    pub fn cancel_read(&mut self, channel: ChannelId) {
        self.cancel(channel, Direction::Read)
    }

    fn submit(&mut self, channel: ChannelId, direction: Direction, data: *mut u32, words: usize) -> Result<Slot> {
        let buf = NonNull::new(data).ok_or(Error::InvalidArgument)?;
        let count = match u16::try_from(words) {
            Ok(count) if count >= 1 => count,
            _ => return Err(Error::InvalidArgument),
        };

        let ch = self.state.channel(channel);
        if ch.owner.is_none() {
            warn!("DMA {:?} on {:?} without an owner", direction, channel);
            return Err(Error::InvalidArgument);
        }
        if ch.record(direction).slot.is_some() {
            return Err(Error::ChannelBusy);
        }

        let Some(slot) = self.state.allocate_slot() else {
            error!("No free GDD logical channels");
            return Err(Error::ResourceExhausted);
        };

        // keep the legacy "data available" event quiet while DMA drains the FIFO
        if direction == Direction::Read {
            self.ports.disable_rx_interrupt(channel);
        }

        self.state.channel_mut(channel).record_mut(direction).slot = Some(slot);

        let sync = sync_tag(direction, channel);
        let bytes = words * 4;
        let addr = self.map.map(buf, bytes, map_direction(direction));
        let desc = Descriptor::new(direction, channel, addr, count, sync);
        self.regs.program(slot, &desc);

        self.claim(slot, channel, direction);
        self.regs.set_channel_enable(slot, true);

        trace!("GDD slot {} armed: {:?} {:?}, {} words", slot.index(), channel, direction, words);
        Ok(slot)
    }

    fn cancel(&mut self, channel: ChannelId, direction: Direction) {
        let Some(slot) = self.state.channel(channel).record(direction).slot else {
            return;
        };

        if direction == Direction::Read {
            self.ports.enable_rx_interrupt(channel);
        }

        if !self.regs.channel_enabled(slot) {
            debug!(
                "{:?} cancel on not enabled GDD slot {} ({:?})",
                direction,
                slot.index(),
                channel
            );
            return;
        }

        self.regs.set_channel_enable(slot, false);
        self.release(slot);
        self.regs.clear_irq_status(slot.bit());
        self.regs.clear_buffer_state(channel, direction);
        self.unmap(slot, direction);
        self.state.channel_mut(channel).record_mut(direction).slot = None;

        debug!("GDD slot {} cancelled ({:?} {:?})", slot.index(), channel, direction);
    }

    /// Stop every bound transfer regardless of hardware state and refuse
    /// further allocations.
    pub(crate) fn close(&mut self) {
        for channel in ChannelId::iter() {
            for direction in [Direction::Read, Direction::Write] {
                let Some(slot) = self.state.channel(channel).record(direction).slot else {
                    continue;
                };

                self.regs.set_channel_enable(slot, false);
                self.release(slot);
                self.regs.clear_irq_status(slot.bit());
                self.unmap(slot, direction);
                self.state.channel_mut(channel).record_mut(direction).slot = None;
                if direction == Direction::Read {
                    self.ports.enable_rx_interrupt(channel);
                }
            }
        }
        self.state.closed = true;
    }

    /// Mark `slot` owned. The IRQ enable bit follows the software state.
    pub(crate) fn claim(&mut self, slot: Slot, channel: ChannelId, direction: Direction) {
        self.state.slots[slot.0 as usize] = SlotState::Owned { channel, direction };
        self.regs.set_irq_enable(slot, true);
    }

    /// Mark `slot` free. The IRQ enable bit follows the software state.
    pub(crate) fn release(&mut self, slot: Slot) {
        self.state.slots[slot.0 as usize] = SlotState::Free;
        self.regs.set_irq_enable(slot, false);
    }

    /// Undo the mapping made at submit time, using the address and count
    /// programmed into `slot`.
    pub(crate) fn unmap(&mut self, slot: Slot, direction: Direction) {
        let (addr, words) = self.programmed_buffer(slot, direction);
        self.map.unmap(addr, words * 4, map_direction(direction));
    }

    /// Memory-side address and element count read back from `slot`.
    pub(crate) fn programmed_buffer(&self, slot: Slot, direction: Direction) -> (DeviceAddress, usize) {
        let addr = match direction {
            Direction::Read => self.regs.destination_address(slot),
            Direction::Write => self.regs.source_address(slot),
        };
        (addr, self.regs.element_count(slot) as usize)
    }
}

pub(crate) fn map_direction(direction: Direction) -> MapDirection {
    match direction {
        Direction::Write => MapDirection::ToDevice,
        Direction::Read => MapDirection::FromDevice,
    }
}
