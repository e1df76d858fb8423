//! GDD interrupt handling
//!
//! The interrupt handler itself only masks the GDD line and kicks the
//! [`Dispatcher`]. The dispatcher walks the IRQ status bitmap, tears down
//! every finished slot under the controller lock, then calls the owners with
//! the lock released. If new completions latched meanwhile it reschedules
//! itself; otherwise it unmasks the line again.

use core::sync::atomic::Ordering;

use embassy_sync::blocking_mutex::raw::RawMutex;

use super::regs::Registers;
use super::transfer::{map_direction, Locked};
use super::{Error, Gdd, Result, Slot};
use crate::fmt::Bitmap;
use crate::port::{ChannelOwner, Direction, PortEvent, PortId};

/// Platform interrupt controller.
///
/// Used from the interrupt handler as well as from the dispatcher.
pub trait InterruptController: Sync {
    /// Unmask interrupt line `irq`.
    fn enable(&self, irq: u16);

    /// Mask interrupt line `irq` without waiting for running handlers.
    fn disable(&self, irq: u16);
}

impl<T: InterruptController + ?Sized> InterruptController for &T {
    fn enable(&self, irq: u16) {
        (**self).enable(irq)
    }

    fn disable(&self, irq: u16) {
        (**self).disable(irq)
    }
}

/// Outcome of tearing down one slot, acted upon once the lock is dropped.
pub(crate) enum Completion<'d> {
    Read {
        owner: Option<&'d dyn ChannelOwner>,
        words: usize,
    },
    Write {
        owner: Option<&'d dyn ChannelOwner>,
        words: usize,
    },
    Error {
        port: PortId,
    },
}

impl<'d, M: RawMutex, R: Registers> Gdd<'d, M, R> {
    /// GDD interrupt entry point.
    ///
    /// Call this from the interrupt vector bound to the GDD line. It masks the
    /// line and schedules the [`Dispatcher`]; scheduling again before the
    /// dispatcher ran is harmless.
    pub fn on_interrupt(&self) {
        self.intc.disable(self.irq);
        self.scheduled.signal(());
    }

    /// Take the dispatcher of this controller.
    ///
    /// There is only one; later calls return `None`.
    pub fn dispatcher(&self) -> Option<Dispatcher<'_, 'd, M, R>> {
        if self.dispatcher_taken.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Dispatcher { gdd: self })
        }
    }

    /// One pass over the IRQ status bitmap. Returns whether more work latched
    /// while servicing.
    fn service_pass(&self) -> bool {
        let pool = self.pool_mask();
        let status = self.regs.irq_status() & pool;
        trace!("GDD irq status {:?}", Bitmap(status));

        for idx in 0..self.pool_size {
            let slot = Slot(idx);
            if status & slot.bit() != 0 {
                self.complete(slot);
            }
        }

        let pending = self.regs.irq_status() & self.regs.irq_enable_mask() & pool;
        pending != 0
    }

    fn complete(&self, slot: Slot) {
        match self.lock(|locked| locked.complete_slot(slot)) {
            // logged and acknowledged, nobody to call
            Err(Error::InternalInconsistency) => {}
            Err(e) => error!("GDD slot {} completion failed: {:?}", slot.index(), e),
            Ok(Completion::Read { owner, words }) => match owner {
                Some(owner) => owner.read_done(words),
                None => warn!("GDD slot {} read finished with no owner", slot.index()),
            },
            Ok(Completion::Write { owner, words }) => match owner {
                Some(owner) => owner.write_done(words),
                None => warn!("GDD slot {} write finished with no owner", slot.index()),
            },
            Ok(Completion::Error { port }) => self.ports.port_event(port, PortEvent::Error),
        }
    }
}

impl<'a, 'd, R: Registers> Locked<'a, 'd, R> {
    /// Tear down a slot whose completion bit is set.
    ///
    /// The status bit is acknowledged here, before the slot can be handed out
    /// again. A slot no channel is bound to is acknowledged and otherwise left
    /// alone.
    pub(crate) fn complete_slot(&mut self, slot: Slot) -> Result<Completion<'d>> {
        let Some((channel, direction)) = self.state.find_owner(slot) else {
            error!("Unable to match GDD slot {} with an HSI channel", slot.index());
            self.regs.clear_irq_status(slot.bit());
            return Err(Error::InternalInconsistency);
        };
        trace!("GDD event on slot {}: {:?} {:?}", slot.index(), channel, direction);

        self.release(slot);
        self.regs.clear_irq_status(slot.bit());

        let status = self.regs.channel_status(slot);
        let (addr, words) = self.programmed_buffer(slot, direction);
        let bytes = words * 4;
        if direction == Direction::Read && !status.timeout {
            self.map.sync_for_cpu(addr, bytes, map_direction(direction));
        }
        self.map.unmap(addr, bytes, map_direction(direction));

        let ch = self.state.channel_mut(channel);
        ch.record_mut(direction).slot = None;
        let owner = ch.owner;

        if direction == Direction::Read {
            // back to the default polling mode
            self.ports.enable_rx_interrupt(channel);
        }

        if status.timeout {
            error!("Error on GDD transfer on slot {} ({:?} {:?})", slot.index(), channel, direction);
            return Ok(Completion::Error { port: channel.port() });
        }

        Ok(match direction {
            Direction::Read => Completion::Read { owner, words },
            Direction::Write => Completion::Write { owner, words },
        })
    }
}

/// Deferred half of the GDD interrupt.
///
/// Obtained once from [`Gdd::dispatcher`]. Every servicing method takes
/// `&mut self`, so two passes never overlap.
pub struct Dispatcher<'a, 'd, M: RawMutex, R: Registers> {
    gdd: &'a Gdd<'d, M, R>,
}

impl<'a, 'd, M: RawMutex, R: Registers> Dispatcher<'a, 'd, M, R> {
    /// Service completions forever. Spawn this as a task.
    pub async fn run(&mut self) -> ! {
        loop {
            self.next().await;
        }
    }

    /// Wait until the dispatcher is scheduled, then do one pass.
    pub async fn next(&mut self) {
        self.gdd.scheduled.wait().await;
        self.service();
    }

    /// Do one pass if the dispatcher is scheduled. Returns whether it was.
    pub fn try_service(&mut self) -> bool {
        match self.gdd.scheduled.try_take() {
            Some(()) => {
                self.service();
                true
            }
            None => false,
        }
    }

    fn service(&mut self) {
        if self.gdd.shut_down.load(Ordering::Acquire) {
            return;
        }

        if self.gdd.service_pass() {
            // more completions latched meanwhile; run again before unmasking
            self.gdd.scheduled.signal(());
        } else {
            self.gdd.intc.enable(self.gdd.irq);
        }
    }
}
