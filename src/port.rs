//! HSI ports, logical channels and the hooks into the port layer.
//!
//! The port state machine (buffer bookkeeping, flow control, framing) lives
//! above this crate. It plugs in through two capability traits:
//! [`ChannelOwner`], attached to each logical channel, receives transfer
//! completions, and [`PortHandler`], shared by the whole controller, receives
//! port events and toggles the word-by-word receive interrupt.

/// Number of ports on the controller.
pub const MAX_PORTS: usize = 2;

/// Number of logical channels per port.
pub const CHANNELS_PER_PORT: usize = 8;

/// A port on the serial controller.
///
/// Ports are numbered from 1, the way the hardware documentation numbers them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortId(u8);

impl PortId {
    /// Construct a port identifier from its 1-based number.
    pub const fn new(number: u8) -> Option<Self> {
        match number {
            1..=2 => Some(Self(number)),
            _ => None,
        }
    }

    /// 1-based port number.
    pub const fn number(&self) -> u8 {
        self.0
    }

    /// 0-based index into per-port tables.
    pub(crate) const fn index(&self) -> usize {
        self.0 as usize - 1
    }
}

/// A logical channel: a channel index on a given port.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId {
    port: PortId,
    channel: u8,
}

impl ChannelId {
    /// Construct a channel identifier, checking both the port number and the
    /// channel index against the controller geometry.
    pub const fn new(port: u8, channel: u8) -> Option<Self> {
        let port = match PortId::new(port) {
            Some(port) => port,
            None => return None,
        };

        if (channel as usize) < CHANNELS_PER_PORT {
            Some(Self { port, channel })
        } else {
            None
        }
    }

    /// The port this channel belongs to.
    pub const fn port(&self) -> PortId {
        self.port
    }

    /// Channel index within the port, from 0.
    pub const fn channel(&self) -> u8 {
        self.channel
    }

    pub(crate) fn iter() -> impl Iterator<Item = ChannelId> {
        (0..MAX_PORTS).flat_map(|port| {
            (0..CHANNELS_PER_PORT).map(move |channel| ChannelId {
                port: PortId(port as u8 + 1),
                channel: channel as u8,
            })
        })
    }
}

/// Transfer direction, seen from the host.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Peripheral to memory (receive).
    Read,
    /// Memory to peripheral (transmit).
    Write,
}

/// Events reported to the port layer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum PortEvent {
    /// A DMA transfer on this port ended with a timeout or a bus error.
    ///
    /// The direction is not reported; retry policy belongs to the port layer.
    Error,
}

/// Completion callbacks of one logical channel.
///
/// Each method is called at most once per submitted transfer, never for a
/// cancelled one, and always outside the controller lock, from whichever
/// context runs the [`Dispatcher`](crate::Dispatcher).
pub trait ChannelOwner: Sync {
    /// A DMA read finished; `words` 32-bit words landed in the buffer.
    fn read_done(&self, words: usize);

    /// A DMA write finished; `words` 32-bit words were handed to the port.
    fn write_done(&self, words: usize);
}

/// Port-level hooks used by the DMA core.
///
/// Called both from submitters and from the dispatcher.
pub trait PortHandler: Sync {
    /// Deliver an event to the port.
    fn port_event(&self, port: PortId, event: PortEvent);

    /// Turn off the default "data available" receive interrupt of a channel
    /// while a DMA read owns it.
    fn disable_rx_interrupt(&self, channel: ChannelId);

    /// Restore the default receive interrupt of a channel.
    fn enable_rx_interrupt(&self, channel: ChannelId);
}
