//! In-memory stand-ins for the GDD register block and the collaborators
//! around it.
//!
//! Everything here is `Sync`, the same as real hardware wrappers, so a
//! [`Gdd`] built on them can be shared across contexts.

use core::cell::RefCell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::collections::HashMap;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::CriticalSectionMutex as Mutex;

use super::interrupt::InterruptController;
use super::map::{DmaMap, MapDirection};
use super::regs::{ChannelStatus, Descriptor, DeviceAddress, Registers};
use super::{Gdd, Slot, MAX_SLOTS};
use crate::config::Config;
use crate::port::{ChannelId, ChannelOwner, Direction, PortEvent, PortHandler, PortId};

/// Mutable mock state behind a critical section.
struct Shared<T>(Mutex<RefCell<T>>);

impl<T> Shared<T> {
    fn new(value: T) -> Self {
        Self(Mutex::new(RefCell::new(value)))
    }

    fn with<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        self.0.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[derive(Copy, Clone, Default)]
struct SlotRegs {
    desc: Option<Descriptor>,
    enabled: bool,
    status: ChannelStatus,
}

#[derive(Default)]
struct RegFile {
    slots: [SlotRegs; MAX_SLOTS],
    irq_status: u32,
    irq_enable: u32,
    buffer_state_clears: Vec<(ChannelId, Direction)>,
}

/// GDD register file. The hardware side of a transfer is driven by hand with
/// [`MockRegs::finish`] and [`MockRegs::time_out`].
#[derive(Default)]
pub(crate) struct MockRegs {
    file: Shared<RegFile>,
}

impl MockRegs {
    /// The engine moved every element of `slot`.
    pub(crate) fn finish(&self, slot: Slot) {
        self.latch(slot, ChannelStatus { block: true, timeout: false });
    }

    /// The transfer on `slot` timed out.
    pub(crate) fn time_out(&self, slot: Slot) {
        self.latch(slot, ChannelStatus { block: false, timeout: true });
    }

    /// Raise the status bit of `slot` with nothing programmed in it.
    pub(crate) fn spurious(&self, slot: Slot) {
        self.file.with(|file| file.irq_status |= slot.bit());
    }

    fn latch(&self, slot: Slot, status: ChannelStatus) {
        self.file.with(|file| {
            let regs = &mut file.slots[slot.index() as usize];
            regs.enabled = false;
            regs.status = status;
            file.irq_status |= slot.bit();
        });
    }

    pub(crate) fn descriptor(&self, slot: Slot) -> Option<Descriptor> {
        self.file.with(|file| file.slots[slot.index() as usize].desc)
    }

    pub(crate) fn enabled(&self, slot: Slot) -> bool {
        self.file.with(|file| file.slots[slot.index() as usize].enabled)
    }

    pub(crate) fn irq_enabled(&self, slot: Slot) -> bool {
        self.file.with(|file| file.irq_enable & slot.bit() != 0)
    }

    pub(crate) fn raw_irq_status(&self) -> u32 {
        self.file.with(|file| file.irq_status)
    }

    pub(crate) fn buffer_state_clears(&self) -> Vec<(ChannelId, Direction)> {
        self.file.with(|file| file.buffer_state_clears.clone())
    }
}

impl Registers for MockRegs {
    fn program(&self, slot: Slot, desc: &Descriptor) {
        self.file.with(|file| {
            let regs = &mut file.slots[slot.index() as usize];
            regs.desc = Some(*desc);
            regs.status = ChannelStatus::default();
        });
    }

    fn set_channel_enable(&self, slot: Slot, enable: bool) {
        self.file.with(|file| file.slots[slot.index() as usize].enabled = enable);
    }

    fn channel_enabled(&self, slot: Slot) -> bool {
        self.enabled(slot)
    }

    fn channel_status(&self, slot: Slot) -> ChannelStatus {
        self.file.with(|file| file.slots[slot.index() as usize].status)
    }

    fn source_address(&self, slot: Slot) -> DeviceAddress {
        self.descriptor(slot).map_or(0, |d| d.src.address)
    }

    fn destination_address(&self, slot: Slot) -> DeviceAddress {
        self.descriptor(slot).map_or(0, |d| d.dst.address)
    }

    fn element_count(&self, slot: Slot) -> u16 {
        self.descriptor(slot).map_or(0, |d| d.count)
    }

    fn irq_status(&self) -> u32 {
        self.raw_irq_status()
    }

    fn clear_irq_status(&self, mask: u32) {
        self.file.with(|file| file.irq_status &= !mask);
    }

    fn irq_enable_mask(&self) -> u32 {
        self.file.with(|file| file.irq_enable)
    }

    fn set_irq_enable(&self, slot: Slot, enable: bool) {
        self.file.with(|file| {
            if enable {
                file.irq_enable |= slot.bit();
            } else {
                file.irq_enable &= !slot.bit();
            }
        });
    }

    fn clear_buffer_state(&self, channel: ChannelId, direction: Direction) {
        self.file.with(|file| file.buffer_state_clears.push((channel, direction)));
    }
}

/// Hands out made-up bus addresses and tracks which mappings are live.
pub(crate) struct MockMap {
    next: AtomicU32,
    live: Shared<HashMap<DeviceAddress, (usize, MapDirection)>>,
    synced: Shared<Vec<DeviceAddress>>,
}

impl Default for MockMap {
    fn default() -> Self {
        Self {
            next: AtomicU32::new(0x8000_0000),
            live: Shared::default(),
            synced: Shared::default(),
        }
    }
}

impl MockMap {
    pub(crate) fn live(&self) -> usize {
        self.live.with(|live| live.len())
    }

    pub(crate) fn synced(&self) -> Vec<DeviceAddress> {
        self.synced.with(|synced| synced.clone())
    }
}

impl DmaMap for MockMap {
    fn map(&self, _buf: NonNull<u32>, bytes: usize, dir: MapDirection) -> DeviceAddress {
        let addr = self.next.fetch_add(0x1000, Ordering::Relaxed);
        self.live.with(|live| live.insert(addr, (bytes, dir)));
        addr
    }

    fn unmap(&self, addr: DeviceAddress, bytes: usize, dir: MapDirection) {
        let mapping = self.live.with(|live| live.remove(&addr));
        assert_eq!(mapping, Some((bytes, dir)), "unmap of {:#x} does not match a live mapping", addr);
    }

    fn sync_for_cpu(&self, addr: DeviceAddress, bytes: usize, dir: MapDirection) {
        let mapping = self.live.with(|live| live.get(&addr).copied());
        assert_eq!(mapping, Some((bytes, dir)));
        self.synced.with(|synced| synced.push(addr));
    }
}

/// Records port events and the receive interrupt state of every channel.
#[derive(Default)]
pub(crate) struct MockPorts {
    events: Shared<Vec<(PortId, PortEvent)>>,
    rx_masked: Shared<HashMap<ChannelId, bool>>,
}

impl MockPorts {
    pub(crate) fn events(&self) -> Vec<(PortId, PortEvent)> {
        self.events.with(|events| events.clone())
    }

    pub(crate) fn rx_masked(&self, channel: ChannelId) -> bool {
        self.rx_masked.with(|masked| masked.get(&channel).copied().unwrap_or(false))
    }
}

impl PortHandler for MockPorts {
    fn port_event(&self, port: PortId, event: PortEvent) {
        self.events.with(|events| events.push((port, event)));
    }

    fn disable_rx_interrupt(&self, channel: ChannelId) {
        self.rx_masked.with(|masked| masked.insert(channel, true));
    }

    fn enable_rx_interrupt(&self, channel: ChannelId) {
        self.rx_masked.with(|masked| masked.insert(channel, false));
    }
}

#[derive(Default)]
pub(crate) struct MockIntc {
    enabled: AtomicBool,
    enables: AtomicUsize,
}

impl MockIntc {
    pub(crate) fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn enables(&self) -> usize {
        self.enables.load(Ordering::Relaxed)
    }
}

impl InterruptController for MockIntc {
    fn enable(&self, _irq: u16) {
        self.enabled.store(true, Ordering::Relaxed);
        self.enables.fetch_add(1, Ordering::Relaxed);
    }

    fn disable(&self, _irq: u16) {
        self.enabled.store(false, Ordering::Relaxed);
    }
}

type Hook<'a> = Box<dyn Fn() + Send + 'a>;

/// Channel owner counting its completions. The hook, if any, runs after each
/// one is recorded.
#[derive(Default)]
pub(crate) struct MockOwner<'a> {
    reads: Shared<Vec<usize>>,
    writes: Shared<Vec<usize>>,
    hook: Shared<Option<Hook<'a>>>,
}

impl<'a> MockOwner<'a> {
    pub(crate) fn reads(&self) -> Vec<usize> {
        self.reads.with(|reads| reads.clone())
    }

    pub(crate) fn writes(&self) -> Vec<usize> {
        self.writes.with(|writes| writes.clone())
    }

    pub(crate) fn set_hook(&self, hook: impl Fn() + Send + 'a) {
        self.hook.with(|slot| *slot = Some(Box::new(hook)));
    }

    fn run_hook(&self) {
        // taken out for the call, the hook may re-enter the driver
        let Some(hook) = self.hook.with(|slot| slot.take()) else {
            return;
        };
        hook();
        self.hook.with(|slot| *slot = Some(hook));
    }
}

impl ChannelOwner for MockOwner<'_> {
    fn read_done(&self, words: usize) {
        self.reads.with(|reads| reads.push(words));
        self.run_hook();
    }

    fn write_done(&self, words: usize) {
        self.writes.with(|writes| writes.push(words));
        self.run_hook();
    }
}

/// Everything a [`Gdd`] borrows besides its registers.
#[derive(Default)]
pub(crate) struct Env {
    pub(crate) regs: MockRegs,
    pub(crate) map: MockMap,
    pub(crate) ports: MockPorts,
    pub(crate) intc: MockIntc,
}

pub(crate) type TestGdd<'d> = Gdd<'d, CriticalSectionRawMutex, &'d MockRegs>;

impl Env {
    pub(crate) fn gdd(&self, pool_size: u8) -> TestGdd<'_> {
        Gdd::new(Config::new(pool_size, 67), &self.regs, &self.map, &self.ports, &self.intc).unwrap()
    }
}
