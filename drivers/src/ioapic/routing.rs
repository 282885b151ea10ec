//! Routing table construction and source resolution.
//!
//! Three boot-time jobs live here: building the source table (firmware
//! entries verbatim, or the synthesized legacy default for table-less
//! machines), resolving each source's polarity and trigger mode, and
//! turning the table into a full routing plan — pin chains, per-line
//! signaling, and vector assignments — before a single register is
//! programmed.

use kestrel_core::irq::{IRQ_LINES, LEGACY_LINES};
use kestrel_firmware::{
    BusKind, DefaultConfigKind, ElcrSnapshot, InterruptSourceEntry, MAX_SOURCE_ENTRIES,
    PirqOverride, PirqOverrideTable, Polarity, PolarityOverride, SourceEntryList, SourceKind,
    Trigger, TriggerOverride,
};
use kestrel_lib::{klog_debug, klog_info, klog_warn};

use super::pins::PinMap;
use super::vectors::VectorAllocator;

/// The interrupt source table routing works from.
pub(crate) struct RoutingTable {
    entries: SourceEntryList,
    synthesized: bool,
}

fn push_entry(list: &mut SourceEntryList, entry: InterruptSourceEntry) {
    if list.push(entry).is_err() {
        panic!(
            "ioapic: interrupt source table overflow (>{} entries)",
            MAX_SOURCE_ENTRIES
        );
    }
}

impl RoutingTable {
    /// Use the firmware's entry list as-is, or synthesize the legacy
    /// default when it is empty: one ISA entry per legacy IRQ on
    /// controller 0, pin = IRQ, with two wiring quirks. On AT-wired
    /// boards the timer output arrives on pin 2 (and the cascade line 2
    /// itself is never routed); on boards whose timer is not wired into
    /// the routing chip at all, pin 0 runs legacy passthrough instead.
    pub(crate) fn build(sources: &SourceEntryList, default_cfg: DefaultConfigKind) -> Self {
        if !sources.is_empty() {
            return Self {
                entries: *sources,
                synthesized: false,
            };
        }

        let mut entries = SourceEntryList::empty();
        match default_cfg {
            DefaultConfigKind::TimerNotWired => {
                push_entry(&mut entries, InterruptSourceEntry::ext_int(0, 0, 0));
                for irq in 1..LEGACY_LINES {
                    push_entry(&mut entries, InterruptSourceEntry::isa(irq, 0, irq));
                }
            }
            DefaultConfigKind::AtWired => {
                for irq in 0..LEGACY_LINES {
                    if irq == 2 {
                        continue;
                    }
                    let pin = if irq == 0 { 2 } else { irq };
                    push_entry(&mut entries, InterruptSourceEntry::isa(irq, 0, pin));
                }
            }
        }

        Self {
            entries,
            synthesized: true,
        }
    }

    #[inline]
    pub(crate) fn entries(&self) -> &[InterruptSourceEntry] {
        self.entries.as_slice()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) fn synthesized(&self) -> bool {
        self.synthesized
    }
}

/// Resolve polarity and trigger for one source entry.
///
/// Pure: same entry and snapshot always give the same answer. Explicit
/// overrides win outright. Bus-conforming entries follow the bus: ISA is
/// high/edge no matter what, PCI is low/level no matter what, EISA takes
/// its trigger from the ELCR snapshot. An unrecognized bus is a logged
/// firmware defect and gets low/level, the storm-resistant choice.
pub(crate) fn resolve(entry: &InterruptSourceEntry, elcr: &ElcrSnapshot) -> (Polarity, Trigger) {
    let polarity = match entry.polarity {
        PolarityOverride::ActiveHigh => Polarity::ActiveHigh,
        PolarityOverride::ActiveLow => Polarity::ActiveLow,
        PolarityOverride::Default => match entry.bus {
            BusKind::Isa | BusKind::Eisa => Polarity::ActiveHigh,
            BusKind::Pci | BusKind::Other => Polarity::ActiveLow,
        },
    };

    let trigger = match entry.trigger {
        TriggerOverride::Edge => Trigger::Edge,
        TriggerOverride::Level => Trigger::Level,
        TriggerOverride::Default => match entry.bus {
            BusKind::Isa => Trigger::Edge,
            BusKind::Eisa => {
                if entry.bus_irq < LEGACY_LINES {
                    if elcr.level_triggered(entry.bus_irq) {
                        Trigger::Level
                    } else {
                        Trigger::Edge
                    }
                } else {
                    klog_warn!(
                        "ioapic: EISA source IRQ {} outside ELCR range, assuming edge",
                        entry.bus_irq
                    );
                    Trigger::Edge
                }
            }
            BusKind::Pci => Trigger::Level,
            BusKind::Other => {
                klog_warn!(
                    "ioapic: unrecognized source bus for IRQ {}, assuming low/level",
                    entry.bus_irq
                );
                Trigger::Level
            }
        },
    };

    (polarity, trigger)
}

/// Controller geometry the planner needs.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ControllerMeta {
    pub id: u8,
    pub first_gsi: u32,
    pub pins: u32,
}

/// One fully planned line: everything resolved before programming.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LineInfo {
    pub vector: u8,
    pub polarity: Polarity,
    pub trigger: Trigger,
}

/// Routing decisions for the whole table.
pub(crate) struct RoutingPlan {
    pub pins: PinMap,
    pub lines: [Option<LineInfo>; IRQ_LINES],
    pub skipped_unmatched: u32,
    pub skipped_ext_int: u32,
    pub pirq_redirected: u32,
}

enum EntryTarget {
    Line(u8),
    PirqDisabled,
    Unmatched,
}

/// Logical line for an entry. ISA-family buses carry their own IRQ
/// numbering; PCI (and anything unrecognized) maps by pin position in
/// global IRQ space, subject to the operator's PIRQ overrides on the
/// onboard pins.
fn target_line(entry: &InterruptSourceEntry, meta: &ControllerMeta, pirq: &PirqOverrideTable) -> EntryTarget {
    match entry.bus {
        BusKind::Isa | BusKind::Eisa => EntryTarget::Line(entry.bus_irq),
        BusKind::Pci | BusKind::Other => {
            let gsi = meta.first_gsi + entry.pin as u32;
            if gsi >= PirqOverrideTable::FIRST_PIN as u32 && gsi < PirqOverrideTable::FIRST_PIN as u32 + 8 {
                match pirq.lookup(gsi as u8) {
                    PirqOverride::Irq(irq) => {
                        klog_info!("ioapic: PIRQ override routes pin {} to IRQ {}", gsi, irq);
                        return EntryTarget::Line(irq);
                    }
                    PirqOverride::Disabled => {
                        klog_info!("ioapic: PIRQ override disables pin {}", gsi);
                        return EntryTarget::PirqDisabled;
                    }
                    PirqOverride::None => {}
                }
            }
            if gsi < IRQ_LINES as u32 {
                EntryTarget::Line(gsi as u8)
            } else {
                EntryTarget::Unmatched
            }
        }
    }
}

/// Walk the table and produce the complete plan. Every line that ends up
/// with at least one pin link leaves here with resolved signaling and a
/// unique non-zero vector — the invariant the mask driver relies on.
///
/// Resource exhaustion (pin spill region, vector bands) is unrecoverable
/// at this point in boot and panics.
pub(crate) fn plan(
    table: &RoutingTable,
    controllers: &[ControllerMeta],
    elcr: &ElcrSnapshot,
    pirq: &PirqOverrideTable,
) -> RoutingPlan {
    let mut plan = RoutingPlan {
        pins: PinMap::new(),
        lines: [None; IRQ_LINES],
        skipped_unmatched: 0,
        skipped_ext_int: 0,
        pirq_redirected: 0,
    };
    let mut vectors = VectorAllocator::new();

    for entry in table.entries() {
        if entry.kind == SourceKind::ExtInt {
            plan.skipped_ext_int += 1;
            continue;
        }

        let Some(meta) = controllers.iter().find(|m| m.id == entry.controller) else {
            plan.skipped_unmatched += 1;
            continue;
        };
        if entry.pin as u32 >= meta.pins {
            plan.skipped_unmatched += 1;
            continue;
        }

        let line = match target_line(entry, meta, pirq) {
            EntryTarget::Line(line) if (line as usize) < IRQ_LINES => {
                if !matches!(entry.bus, BusKind::Isa | BusKind::Eisa)
                    && line as u32 != meta.first_gsi + entry.pin as u32
                {
                    plan.pirq_redirected += 1;
                }
                line
            }
            EntryTarget::Line(_) | EntryTarget::Unmatched => {
                plan.skipped_unmatched += 1;
                continue;
            }
            EntryTarget::PirqDisabled => {
                plan.pirq_redirected += 1;
                continue;
            }
        };

        if plan.pins.contains(entry.controller, entry.pin) {
            klog_debug!(
                "ioapic: duplicate source entry for controller {} pin {}, keeping first",
                entry.controller,
                entry.pin
            );
            continue;
        }

        if plan.pins.add_link(line, entry.controller, entry.pin).is_err() {
            panic!("ioapic: pin map exhausted while chaining line {}", line);
        }

        let (polarity, trigger) = resolve(entry, elcr);
        match plan.lines[line as usize] {
            None => {
                let Ok(vector) = vectors.assign(line) else {
                    panic!("ioapic: vector space exhausted at line {}", line);
                };
                plan.lines[line as usize] = Some(LineInfo {
                    vector,
                    polarity,
                    trigger,
                });
            }
            Some(existing) => {
                if existing.polarity != polarity || existing.trigger != trigger {
                    klog_warn!(
                        "ioapic: conflicting signaling for shared line {}, keeping first",
                        line
                    );
                }
            }
        }
    }

    debug_assert!(plan_vectors_consistent(&plan, &vectors));

    if plan.skipped_unmatched > 0 {
        klog_warn!(
            "ioapic: {} source entr{} matched no routed pin, excluded from dispatch",
            plan.skipped_unmatched,
            if plan.skipped_unmatched == 1 { "y" } else { "ies" }
        );
    }
    if plan.skipped_ext_int > 0 {
        klog_debug!(
            "ioapic: {} passthrough source(s) left to the legacy controller",
            plan.skipped_ext_int
        );
    }

    plan
}

fn plan_vectors_consistent(plan: &RoutingPlan, vectors: &VectorAllocator) -> bool {
    (0..IRQ_LINES as u16).all(|line| {
        let line = line as u8;
        match plan.lines[line as usize] {
            Some(info) => vectors.vector_of(line) == Some(info.vector),
            None => true,
        }
    })
}
