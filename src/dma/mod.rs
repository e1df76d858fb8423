//! GDD DMA logical channels
//!
//! The GDD engine of the HSI controller has a small pool of DMA logical
//! channels ("slots") shared by every logical channel of every port. [`Gdd`]
//! hands slots out to read and write requests, programs and arms them, and
//! routes their completion interrupts back to the owning channel.
//!
//! Request paths run under the controller lock (see [`Gdd::lock`]). Completion
//! runs in two halves: [`Gdd::on_interrupt`] only masks the interrupt line and
//! schedules the [`Dispatcher`], which does the actual work outside interrupt
//! context and hands the line back once nothing is pending.

mod channel;
pub mod interrupt;
pub mod map;
pub mod regs;
pub mod sync;
mod transfer;

#[cfg(test)]
pub(crate) mod mock;

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use self::channel::State;
use self::interrupt::InterruptController;
use self::map::DmaMap;
use self::regs::Registers;
use crate::config::Config;
use crate::port::{ChannelId, ChannelOwner, Direction, PortHandler};

pub use self::interrupt::Dispatcher;
pub use self::transfer::Locked;

/// Upper bound on the pool size: one bit per slot in the 32-bit IRQ registers.
pub const MAX_SLOTS: usize = 32;

/// DMA errors
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// Every slot of the pool is in use. Retry once a transfer finishes.
    ResourceExhausted,
    /// Zero or oversized word count, null buffer, or no owner attached to the
    /// channel.
    InvalidArgument,
    /// The channel already has a transfer in flight in that direction.
    ChannelBusy,
    /// Slot and channel bookkeeping disagree.
    InternalInconsistency,
    /// Pool size is not a power of two between 1 and [`MAX_SLOTS`].
    InvalidConfig,
}

/// DMA result type
pub type Result<T> = core::result::Result<T, Error>;

/// A GDD logical channel, 0-based.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Slot(pub(crate) u8);

impl Slot {
    /// Construct a slot from its index.
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < MAX_SLOTS {
            Some(Self(index))
        } else {
            None
        }
    }

    /// Slot index.
    pub const fn index(self) -> u8 {
        self.0
    }

    /// Bit of this slot in the IRQ status and enable registers.
    pub const fn bit(self) -> u32 {
        1 << self.0
    }
}

/// Ownership of a slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotState {
    /// Available for allocation; IRQ enable bit clear.
    Free,
    /// Carrying a transfer; IRQ enable bit set.
    Owned {
        /// Logical channel the transfer belongs to
        channel: ChannelId,
        /// Transfer direction
        direction: Direction,
    },
}

/// GDD driver.
///
/// `M` picks the raw mutex backing the controller lock and the dispatcher
/// signal; it has to keep the interrupt handler out, so on a single core
/// this is normally [`CriticalSectionRawMutex`](embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex).
///
/// With a `Sync` register block the driver is `Sync` as well, so it can live
/// in a `static` shared by the interrupt vector, the dispatcher task and
/// submitters.
pub struct Gdd<'d, M: RawMutex, R: Registers> {
    regs: R,
    map: &'d dyn DmaMap,
    ports: &'d dyn PortHandler,
    intc: &'d dyn InterruptController,
    irq: u16,
    pool_size: u8,
    state: Mutex<M, RefCell<State<'d>>>,
    scheduled: Signal<M, ()>,
    dispatcher_taken: AtomicBool,
    shut_down: AtomicBool,
}

impl<'d, M: RawMutex, R: Registers> Gdd<'d, M, R> {
    /// Bring up the GDD.
    ///
    /// Every slot of the pool is disabled, latched status is acknowledged and
    /// the interrupt line is enabled.
    pub fn new(
        config: Config,
        regs: R,
        map: &'d dyn DmaMap,
        ports: &'d dyn PortHandler,
        intc: &'d dyn InterruptController,
    ) -> Result<Self> {
        let pool_size = config.pool_size;
        if pool_size == 0 || pool_size as usize > MAX_SLOTS || !pool_size.is_power_of_two() {
            error!("invalid GDD pool size {}", pool_size);
            return Err(Error::InvalidConfig);
        }

        let gdd = Self {
            regs,
            map,
            ports,
            intc,
            irq: config.irq,
            pool_size,
            state: Mutex::new(RefCell::new(State::new(pool_size))),
            scheduled: Signal::new(),
            dispatcher_taken: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        };

        for idx in 0..pool_size {
            gdd.regs.set_channel_enable(Slot(idx), false);
            gdd.regs.set_irq_enable(Slot(idx), false);
        }
        gdd.regs.clear_irq_status(gdd.pool_mask());
        gdd.intc.enable(gdd.irq);

        info!("GDD init: {} logical channels, irq {}", pool_size, gdd.irq);
        Ok(gdd)
    }

    /// Tear the GDD down.
    ///
    /// The interrupt line is disabled, every transfer still bound to a
    /// channel is stopped without a completion callback, and the
    /// [`Dispatcher`] stops servicing. Later submissions fail with
    /// [`Error::ResourceExhausted`]. Calling this twice is harmless.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.intc.disable(self.irq);
        self.lock(|locked| locked.close());

        info!("GDD shutdown");
    }

    /// Run `f` with the controller lock held.
    ///
    /// Allocation and binding of a slot happen inside one critical section,
    /// so a request path that needs several steps to be atomic with respect
    /// to other requests and to the dispatcher does all of them in `f`.
    pub fn lock<U>(&self, f: impl FnOnce(&mut Locked<'_, 'd, R>) -> U) -> U {
        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            let mut locked = Locked {
                regs: &self.regs,
                map: self.map,
                ports: self.ports,
                state: &mut *state,
            };
            f(&mut locked)
        })
    }

    /// Attach the completion callbacks of a logical channel.
    ///
    /// Replaces any previously attached owner.
    pub fn attach(&self, channel: ChannelId, owner: &'d dyn ChannelOwner) {
        self.lock(|locked| locked.state.channel_mut(channel).owner = Some(owner));
    }

    /// Program a write of `words` 32-bit words from `data` to `channel`.
    ///
    /// Takes the controller lock for the duration of the call.
    ///
    /// # Safety
    ///
    /// `data` must stay valid for reads, and must not be written, until the
    /// channel owner's `write_done` runs or the transfer is cancelled.
    pub unsafe fn submit_write(&self, channel: ChannelId, data: *const u32, words: usize) -> Result<Slot> {
        // SAFETY: forwarded to the caller
        self.lock(|locked| unsafe { locked.submit_write(channel, data, words) })
    }

    /// Program a read of `words` 32-bit words from `channel` into `data`.
    ///
    /// Takes the controller lock for the duration of the call.
    ///
    /// # Safety
    ///
    /// `data` must stay valid for writes, and must not be accessed, until the
    /// channel owner's `read_done` runs or the transfer is cancelled.
    pub unsafe fn submit_read(&self, channel: ChannelId, data: *mut u32, words: usize) -> Result<Slot> {
        // SAFETY: forwarded to the caller
        self.lock(|locked| unsafe { locked.submit_read(channel, data, words) })
    }

    /// Stop the write in flight on `channel`, if any.
    pub fn cancel_write(&self, channel: ChannelId) {
        self.lock(|locked| locked.cancel_write(channel))
    }

    /// Stop the read in flight on `channel`, if any.
    pub fn cancel_read(&self, channel: ChannelId) {
        self.lock(|locked| locked.cancel_read(channel))
    }

    /// Find the channel and direction `slot` is bound to.
    pub fn find_owner(&self, slot: Slot) -> Option<(ChannelId, Direction)> {
        self.lock(|locked| locked.state.find_owner(slot))
    }

    /// Slot bound to `channel` in `direction`, if a transfer is in flight.
    pub fn bound_slot(&self, channel: ChannelId, direction: Direction) -> Option<Slot> {
        self.lock(|locked| locked.state.channel(channel).record(direction).slot)
    }

    /// Ownership of `slot`.
    pub fn slot_state(&self, slot: Slot) -> SlotState {
        if slot.0 >= self.pool_size {
            return SlotState::Free;
        }
        self.lock(|locked| locked.state.slots[slot.0 as usize])
    }

    /// Bitmap of owned slots.
    pub fn owned_mask(&self) -> u32 {
        self.lock(|locked| locked.state.owned_mask())
    }

    /// Number of slots in the pool.
    pub fn pool_size(&self) -> u8 {
        self.pool_size
    }

    /// Interrupt line of the GDD.
    pub fn irq(&self) -> u16 {
        self.irq
    }

    fn pool_mask(&self) -> u32 {
        if self.pool_size as usize == MAX_SLOTS {
            u32::MAX
        } else {
            (1 << self.pool_size) - 1
        }
    }
}
