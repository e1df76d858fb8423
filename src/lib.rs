#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]

//! ## Feature flags
#![doc = document_features::document_features!(feature_label = r#"<span class="stab portability"><code>{feature}</code></span>"#)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod dma;
pub mod port;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

// Reexports
pub use dma::interrupt::InterruptController;
pub use dma::map::{DmaMap, MapDirection};
pub use dma::regs::Registers;
pub use dma::{Dispatcher, Error, Gdd, Slot};
pub use port::{ChannelId, ChannelOwner, Direction, PortEvent, PortHandler, PortId};

/// GDD configuration.
pub mod config {
    /// GDD configuration passed when initializing.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    #[cfg_attr(feature = "defmt", derive(defmt::Format))]
    #[non_exhaustive]
    pub struct Config {
        /// Number of DMA logical channels in the pool. Must be a power of two
        /// no larger than [`crate::dma::MAX_SLOTS`].
        pub pool_size: u8,
        /// Interrupt line of the GDD.
        pub irq: u16,
    }

    impl Default for Config {
        fn default() -> Self {
            Self { pool_size: 16, irq: 0 }
        }
    }

    impl Config {
        /// Create a new configuration for a pool of `pool_size` slots on
        /// interrupt line `irq`.
        pub fn new(pool_size: u8, irq: u16) -> Self {
            Self { pool_size, irq }
        }
    }
}

/// Bring up the GDD with the provided configuration, locking with critical
/// sections.
///
/// Take the [`Dispatcher`] from the returned driver and run it from a task,
/// and route the GDD interrupt vector to [`Gdd::on_interrupt`].
pub fn init<'d, R: Registers>(
    config: config::Config,
    regs: R,
    map: &'d dyn DmaMap,
    ports: &'d dyn PortHandler,
    intc: &'d dyn InterruptController,
) -> dma::Result<Gdd<'d, CriticalSectionRawMutex, R>> {
    Gdd::new(config, regs, map, ports, intc)
}
