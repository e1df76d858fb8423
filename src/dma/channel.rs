//! Logical channel records and slot bookkeeping
//!
//! Everything in here lives inside the controller lock.

use super::{Slot, SlotState, MAX_SLOTS};
use crate::port::{ChannelId, ChannelOwner, Direction, CHANNELS_PER_PORT, MAX_PORTS};

/// DMA binding of one (logical channel, direction) pair.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct TransferRecord {
    pub(crate) slot: Option<Slot>,
}

pub(crate) struct LogicalChannel<'d> {
    pub(crate) owner: Option<&'d dyn ChannelOwner>,
    pub(crate) read: TransferRecord,
    pub(crate) write: TransferRecord,
}

impl<'d> LogicalChannel<'d> {
    fn new() -> Self {
        Self {
            owner: None,
            read: TransferRecord { slot: None },
            write: TransferRecord { slot: None },
        }
    }

    pub(crate) fn record(&self, direction: Direction) -> &TransferRecord {
        match direction {
            Direction::Read => &self.read,
            Direction::Write => &self.write,
        }
    }

    pub(crate) fn record_mut(&mut self, direction: Direction) -> &mut TransferRecord {
        match direction {
            Direction::Read => &mut self.read,
            Direction::Write => &mut self.write,
        }
    }
}

/// Shared mutable state of the controller.
pub(crate) struct State<'d> {
    /// Pool size, a power of two no larger than [`MAX_SLOTS`].
    pub(crate) pool_size: u8,
    /// Rotation cursor: the slot handed out last.
    pub(crate) last_allocated: u8,
    /// Set by shutdown; no further allocations succeed.
    pub(crate) closed: bool,
    pub(crate) slots: [SlotState; MAX_SLOTS],
    pub(crate) channels: [[LogicalChannel<'d>; CHANNELS_PER_PORT]; MAX_PORTS],
}

impl<'d> State<'d> {
    pub(crate) fn new(pool_size: u8) -> Self {
        Self {
            pool_size,
            // first allocation lands on slot 0
            last_allocated: pool_size - 1,
            closed: false,
            slots: [SlotState::Free; MAX_SLOTS],
            channels: core::array::from_fn(|_| core::array::from_fn(|_| LogicalChannel::new())),
        }
    }

    pub(crate) fn channel(&self, id: ChannelId) -> &LogicalChannel<'d> {
        &self.channels[id.port().index()][id.channel() as usize]
    }

    pub(crate) fn channel_mut(&mut self, id: ChannelId) -> &mut LogicalChannel<'d> {
        &mut self.channels[id.port().index()][id.channel() as usize]
    }

    /// Pick a free slot, scanning round-robin from the one after the last
    /// slot handed out.
    ///
    /// The slot is not marked owned here; the caller does that while still
    /// holding the lock.
    pub(crate) fn allocate_slot(&mut self) -> Option<Slot> {
        if self.closed {
            return None;
        }

        let mask = self.pool_size - 1;
        for i in 1..=self.pool_size {
            let idx = self.last_allocated.wrapping_add(i) & mask;
            if self.slots[idx as usize] == SlotState::Free {
                self.last_allocated = idx;
                return Some(Slot(idx));
            }
        }

        None
    }

    /// Find the (channel, direction) holding `slot`.
    ///
    /// Channels are scanned in table order, read before write. A channel
    /// holding the same slot in both directions means the bookkeeping is
    /// corrupt, and is fatal.
    pub(crate) fn find_owner(&self, slot: Slot) -> Option<(ChannelId, Direction)> {
        for id in ChannelId::iter() {
            let ch = self.channel(id);
            if ch.read.slot == Some(slot) {
                if ch.write.slot == Some(slot) {
                    panic!("GDD slot {} bound to both directions of {:?}", slot.index(), id);
                }
                return Some((id, Direction::Read));
            }
            if ch.write.slot == Some(slot) {
                return Some((id, Direction::Write));
            }
        }

        None
    }

    /// Bitmap of owned slots.
    pub(crate) fn owned_mask(&self) -> u32 {
        self.slots[..self.pool_size as usize]
            .iter()
            .enumerate()
            .filter(|(_, s)| **s != SlotState::Free)
            .fold(0, |mask, (idx, _)| mask | 1 << idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(port: u8, channel: u8) -> ChannelId {
        ChannelId::new(port, channel).unwrap()
    }

    #[test]
    fn rotation_hands_out_distinct_slots() {
        let mut state = State::new(16);
        let mut seen = 0u32;
        for _ in 0..16 {
            let slot = state.allocate_slot().unwrap();
            assert_eq!(seen & slot.bit(), 0, "slot {} handed out twice", slot.index());
            seen |= slot.bit();
        }
        assert_eq!(seen, 0xffff);
    }

    #[test]
    fn rotation_starts_after_cursor() {
        let mut state = State::new(8);
        state.last_allocated = 5;
        assert_eq!(state.allocate_slot(), Some(Slot(6)));
        assert_eq!(state.allocate_slot(), Some(Slot(7)));
        assert_eq!(state.allocate_slot(), Some(Slot(0)));
    }

    #[test]
    fn allocation_skips_owned_slots() {
        let mut state = State::new(4);
        let owner = SlotState::Owned {
            channel: ch(1, 0),
            direction: Direction::Write,
        };
        state.slots[0] = owner;
        state.slots[1] = owner;
        state.slots[3] = owner;
        assert_eq!(state.allocate_slot(), Some(Slot(2)));
        state.slots[2] = owner;
        assert_eq!(state.allocate_slot(), None);
        // cursor untouched by a failed scan
        assert_eq!(state.last_allocated, 2);
    }

    #[test]
    fn closed_pool_refuses() {
        let mut state = State::new(4);
        state.closed = true;
        assert_eq!(state.allocate_slot(), None);
    }

    #[test]
    fn single_slot_pool() {
        let mut state = State::new(1);
        assert_eq!(state.allocate_slot(), Some(Slot(0)));
        assert_eq!(state.allocate_slot(), Some(Slot(0)));
    }

    #[test]
    fn find_owner_reports_direction() {
        let mut state = State::new(16);
        state.channel_mut(ch(2, 4)).write.slot = Some(Slot(9));
        state.channel_mut(ch(1, 1)).read.slot = Some(Slot(3));

        assert_eq!(state.find_owner(Slot(9)), Some((ch(2, 4), Direction::Write)));
        assert_eq!(state.find_owner(Slot(3)), Some((ch(1, 1), Direction::Read)));
        assert_eq!(state.find_owner(Slot(4)), None);
    }

    #[test]
    #[should_panic]
    fn find_owner_rejects_slot_bound_twice() {
        let mut state = State::new(16);
        let id = ch(1, 6);
        state.channel_mut(id).read.slot = Some(Slot(2));
        state.channel_mut(id).write.slot = Some(Slot(2));
        let _ = state.find_owner(Slot(2));
    }

    #[test]
    fn owned_mask_tracks_slot_states() {
        let mut state = State::new(8);
        assert_eq!(state.owned_mask(), 0);
        state.slots[1] = SlotState::Owned {
            channel: ch(1, 2),
            direction: Direction::Read,
        };
        state.slots[7] = SlotState::Owned {
            channel: ch(2, 2),
            direction: Direction::Write,
        };
        assert_eq!(state.owned_mask(), 0b1000_0010);
    }
}
