use crate::elcr::ElcrSnapshot;

/// Capacity of the source entry list. Firmware reporting more than this
/// is malformed beyond repair; the builder treats overflow as fatal.
pub const MAX_SOURCE_ENTRIES: usize = 128;

/// Maximum routing controllers (IO-APICs) per platform.
pub const MAX_CONTROLLERS: usize = 8;

/// Bus a source entry originates from. Determines default polarity and
/// trigger semantics when the entry carries no explicit override.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusKind {
    Isa,
    Eisa,
    Pci,
    /// Bus type the parser did not recognize. Kept rather than dropped so
    /// the resolver can log the defect and pick a storm-safe default.
    Other,
}

/// Delivery class of a source entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// Ordinary vectored interrupt, routed through the table.
    Int,
    /// Passthrough from the legacy controller; never gets a vector or a
    /// pin link, only matters to timer fallback handling.
    ExtInt,
}

/// Per-entry trigger override, `Default` meaning "conforms to bus".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerOverride {
    Default,
    Edge,
    Level,
}

/// Per-entry polarity override, `Default` meaning "conforms to bus".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolarityOverride {
    Default,
    ActiveHigh,
    ActiveLow,
}

/// Resolved trigger mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    Edge,
    Level,
}

/// Resolved signal polarity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

/// One firmware interrupt source: which bus line feeds which controller
/// pin, plus optional polarity/trigger overrides. Immutable once built.
#[derive(Clone, Copy, Debug)]
pub struct InterruptSourceEntry {
    pub bus: BusKind,
    pub bus_irq: u8,
    pub controller: u8,
    pub pin: u8,
    pub kind: SourceKind,
    pub trigger: TriggerOverride,
    pub polarity: PolarityOverride,
}

impl InterruptSourceEntry {
    /// Plain ISA entry with bus-conforming signaling.
    pub const fn isa(bus_irq: u8, controller: u8, pin: u8) -> Self {
        Self {
            bus: BusKind::Isa,
            bus_irq,
            controller,
            pin,
            kind: SourceKind::Int,
            trigger: TriggerOverride::Default,
            polarity: PolarityOverride::Default,
        }
    }

    /// PCI entry with bus-conforming signaling.
    pub const fn pci(bus_irq: u8, controller: u8, pin: u8) -> Self {
        Self {
            bus: BusKind::Pci,
            bus_irq,
            controller,
            pin,
            kind: SourceKind::Int,
            trigger: TriggerOverride::Default,
            polarity: PolarityOverride::Default,
        }
    }

    /// Legacy-controller passthrough entry.
    pub const fn ext_int(bus_irq: u8, controller: u8, pin: u8) -> Self {
        Self {
            bus: BusKind::Isa,
            bus_irq,
            controller,
            pin,
            kind: SourceKind::ExtInt,
            trigger: TriggerOverride::Default,
            polarity: PolarityOverride::Default,
        }
    }
}

/// Returned when the source list is at capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceListFull;

/// Fixed-capacity, append-only list of source entries.
#[derive(Clone, Copy)]
pub struct SourceEntryList {
    entries: [InterruptSourceEntry; MAX_SOURCE_ENTRIES],
    len: usize,
}

impl SourceEntryList {
    pub const fn empty() -> Self {
        Self {
            entries: [InterruptSourceEntry::isa(0, 0, 0); MAX_SOURCE_ENTRIES],
            len: 0,
        }
    }

    pub fn push(&mut self, entry: InterruptSourceEntry) -> Result<(), SourceListFull> {
        if self.len >= MAX_SOURCE_ENTRIES {
            return Err(SourceListFull);
        }
        self.entries[self.len] = entry;
        self.len += 1;
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[InterruptSourceEntry] {
        &self.entries[..self.len]
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterruptSourceEntry> {
        self.as_slice().iter()
    }
}

impl Default for SourceEntryList {
    fn default() -> Self {
        Self::empty()
    }
}

/// Legacy default wiring for machines whose firmware reports no source
/// entries at all. Distilled from the firmware default-configuration byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DefaultConfigKind {
    /// Classic AT wiring: the timer output reaches the controller on
    /// pin 2, pin 0 is unconnected.
    AtWired,
    /// The timer is not wired to any routed pin; pin 0 runs legacy
    /// passthrough instead.
    TimerNotWired,
}

/// One routing controller as discovered by firmware: identity, where its
/// pin range starts in global IRQ space, and the pre-mapped register
/// window base. Pin count is read from the chip itself at probe time.
#[derive(Clone, Copy, Debug)]
pub struct ControllerInfo {
    pub id: u8,
    pub first_gsi: u32,
    pub window_base: u64,
}

/// Fixed-capacity controller list.
#[derive(Clone, Copy)]
pub struct ControllerList {
    infos: [ControllerInfo; MAX_CONTROLLERS],
    len: usize,
}

impl ControllerList {
    pub const fn empty() -> Self {
        Self {
            infos: [ControllerInfo {
                id: 0,
                first_gsi: 0,
                window_base: 0,
            }; MAX_CONTROLLERS],
            len: 0,
        }
    }

    /// Silently ignores controllers past capacity; eight chips is already
    /// beyond anything this kernel targets.
    pub fn push(&mut self, info: ControllerInfo) {
        if self.len < MAX_CONTROLLERS {
            self.infos[self.len] = info;
            self.len += 1;
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[ControllerInfo] {
        &self.infos[..self.len]
    }
}

impl Default for ControllerList {
    fn default() -> Self {
        Self::empty()
    }
}

/// Operator override for one onboard PCI pin (global lines 16-23).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PirqOverride {
    /// No override; the pin maps by position.
    None,
    /// Route the pin to this explicit legacy IRQ.
    Irq(u8),
    /// Leave the pin unrouted.
    Disabled,
}

/// Static operator remapping of onboard PCI pins 16-23.
#[derive(Clone, Copy)]
pub struct PirqOverrideTable {
    slots: [PirqOverride; 8],
}

impl PirqOverrideTable {
    pub const FIRST_PIN: u8 = 16;

    pub const fn empty() -> Self {
        Self {
            slots: [PirqOverride::None; 8],
        }
    }

    /// Install an override for a global line in 16..=23. Out-of-range
    /// lines are ignored; the table covers only the onboard pins.
    pub fn set(&mut self, line: u8, value: PirqOverride) {
        if (Self::FIRST_PIN..Self::FIRST_PIN + 8).contains(&line) {
            self.slots[(line - Self::FIRST_PIN) as usize] = value;
        }
    }

    pub fn lookup(&self, line: u8) -> PirqOverride {
        if (Self::FIRST_PIN..Self::FIRST_PIN + 8).contains(&line) {
            self.slots[(line - Self::FIRST_PIN) as usize]
        } else {
            PirqOverride::None
        }
    }
}

impl Default for PirqOverrideTable {
    fn default() -> Self {
        Self::empty()
    }
}

/// Everything the routing subsystem consumes at boot, gathered by the
/// platform layer before the subsystem runs.
#[derive(Clone, Copy)]
pub struct PlatformIrqInfo {
    pub controllers: ControllerList,
    pub sources: SourceEntryList,
    pub default_cfg: DefaultConfigKind,
    pub elcr: ElcrSnapshot,
    pub pirq: PirqOverrideTable,
    /// Operator kill switch: skip routing setup entirely and stay on pure
    /// legacy delivery.
    pub skip_ioapic_setup: bool,
    /// Local APIC id of the boot processor; redirection entries target it
    /// in physical destination mode.
    pub boot_apic_id: u8,
    /// Pre-mapped local APIC register window base.
    pub lapic_window_base: u64,
}
