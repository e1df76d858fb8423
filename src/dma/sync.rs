//! Synchronization tags
//!
//! The GDD needs a sync tag in `CCR` to pair a logical channel with the
//! right SSI request line. HSI parts ignore it, but it costs nothing to
//! program it everywhere.

use crate::port::{ChannelId, Direction, CHANNELS_PER_PORT, MAX_PORTS};

static SYNC_TABLE: [[[u8; CHANNELS_PER_PORT]; MAX_PORTS]; 2] = [
    // write
    [
        [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08],
        [0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x00],
    ],
    // read
    [
        [0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17],
        [0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e, 0x1f],
    ],
];

/// Sync tag for a transfer in `direction` on `channel`.
pub fn sync_tag(direction: Direction, channel: ChannelId) -> u8 {
    let dir = match direction {
        Direction::Write => 0,
        Direction::Read => 1,
    };
    SYNC_TABLE[dir][channel.port().index()][channel.channel() as usize]
}
