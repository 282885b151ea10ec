//! Firmware-provided interrupt routing inputs.
//!
//! The platform's table parser (BIOS/MP-table code, outside this crate)
//! reduces whatever the firmware reported to the types here: a list of
//! interrupt source entries, the routing controllers it found, the legacy
//! default-configuration kind for table-less machines, and the EISA
//! edge/level register snapshot. Everything is plain data, fixed-capacity,
//! and immutable once handed to the routing subsystem.

#![no_std]

pub mod elcr;
pub mod irqsrc;

pub use elcr::ElcrSnapshot;
pub use irqsrc::{
    BusKind, ControllerInfo, ControllerList, DefaultConfigKind, InterruptSourceEntry,
    MAX_CONTROLLERS, MAX_SOURCE_ENTRIES, PirqOverride, PirqOverrideTable, PlatformIrqInfo,
    Polarity, PolarityOverride, SourceEntryList, SourceKind, SourceListFull, Trigger,
    TriggerOverride,
};
