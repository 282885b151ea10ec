//! Routing subsystem tests.
//!
//! Table building, resolution, vector allocation, and pin chaining are
//! pure and run against locally constructed objects. Mask behavior needs
//! live controller hardware and passes vacuously when routing never came
//! up (headless test configs).

use kestrel_core::irq::{IRQ_LINES, LineController, LineStatus};
use kestrel_firmware::{
    BusKind, DefaultConfigKind, ElcrSnapshot, InterruptSourceEntry, PirqOverride,
    PirqOverrideTable, Polarity, PolarityOverride, SourceEntryList, SourceKind, Trigger,
    TriggerOverride,
};
use kestrel_lib::testing::TestResult;

use super::pins::{PIN_MAP_SIZE, PinMap, PinMapFull};
use super::routing::{ControllerMeta, RoutingTable, plan, resolve};
use super::vectors::{
    FIRST_DEVICE_VECTOR, FIRST_SYSTEM_VECTOR, SYSCALL_VECTOR, VectorAllocator,
    VectorSpaceExhausted,
};
use super::{is_ready, lifecycle, line_fully_masked, set_masked};

fn fail(msg: &str) -> TestResult {
    kestrel_lib::klog_info!("IOAPIC_TEST: BUG - {}", msg);
    TestResult::Fail
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub fn test_resolve_isa_is_high_edge() -> TestResult {
    let entry = InterruptSourceEntry::isa(4, 0, 4);
    // ELCR claims level for every line; ISA must not care.
    let elcr = ElcrSnapshot::from_raw(0xFFFF);
    if resolve(&entry, &elcr) != (Polarity::ActiveHigh, Trigger::Edge) {
        return fail("ISA entry did not resolve to high/edge");
    }
    TestResult::Pass
}

pub fn test_resolve_pci_is_low_level() -> TestResult {
    let entry = InterruptSourceEntry::pci(18, 0, 18);
    if resolve(&entry, &ElcrSnapshot::all_edge()) != (Polarity::ActiveLow, Trigger::Level) {
        return fail("conforming PCI entry did not resolve to low/level");
    }
    TestResult::Pass
}

pub fn test_resolve_explicit_override_wins() -> TestResult {
    let mut entry = InterruptSourceEntry::isa(5, 0, 5);
    entry.trigger = TriggerOverride::Level;
    entry.polarity = PolarityOverride::ActiveLow;
    if resolve(&entry, &ElcrSnapshot::all_edge()) != (Polarity::ActiveLow, Trigger::Level) {
        return fail("explicit override not returned verbatim");
    }
    TestResult::Pass
}

pub fn test_resolve_eisa_uses_elcr() -> TestResult {
    let mut entry = InterruptSourceEntry::isa(9, 0, 9);
    entry.bus = BusKind::Eisa;

    let level_snapshot = ElcrSnapshot::from_raw(1 << 9);
    if resolve(&entry, &level_snapshot) != (Polarity::ActiveHigh, Trigger::Level) {
        return fail("EISA entry ignored ELCR level bit");
    }
    if resolve(&entry, &ElcrSnapshot::all_edge()) != (Polarity::ActiveHigh, Trigger::Edge) {
        return fail("EISA entry ignored ELCR edge bit");
    }
    TestResult::Pass
}

pub fn test_resolve_eisa_out_of_range_defaults_edge() -> TestResult {
    let mut entry = InterruptSourceEntry::isa(20, 0, 20);
    entry.bus = BusKind::Eisa;
    if resolve(&entry, &ElcrSnapshot::from_raw(0xFFFF)) != (Polarity::ActiveHigh, Trigger::Edge) {
        return fail("out-of-range EISA query did not default to edge");
    }
    TestResult::Pass
}

pub fn test_resolve_unknown_bus_defaults_low_level() -> TestResult {
    let mut entry = InterruptSourceEntry::isa(7, 0, 7);
    entry.bus = BusKind::Other;
    if resolve(&entry, &ElcrSnapshot::all_edge()) != (Polarity::ActiveLow, Trigger::Level) {
        return fail("unknown bus did not get the storm-safe default");
    }
    TestResult::Pass
}

pub fn test_resolve_is_pure() -> TestResult {
    let entry = InterruptSourceEntry::pci(3, 0, 19);
    let elcr = ElcrSnapshot::from_raw(0x0204);
    if resolve(&entry, &elcr) != resolve(&entry, &elcr) {
        return fail("same inputs resolved differently");
    }
    TestResult::Pass
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub fn test_build_default_timer_not_wired() -> TestResult {
    let table = RoutingTable::build(&SourceEntryList::empty(), DefaultConfigKind::TimerNotWired);
    if !table.synthesized() || table.len() != 16 {
        return fail("synthesized table has wrong shape");
    }

    let entries = table.entries();
    if entries[0].pin != 0 || entries[0].kind != SourceKind::ExtInt {
        return fail("pin-0 entry not marked as passthrough");
    }
    for entry in &entries[1..] {
        if entry.kind != SourceKind::Int
            || entry.pin != entry.bus_irq
            || entry.controller != 0
            || entry.bus != BusKind::Isa
        {
            return fail("non-timer entry not a 1:1 identity mapping");
        }
    }
    TestResult::Pass
}

pub fn test_build_default_at_wired() -> TestResult {
    let table = RoutingTable::build(&SourceEntryList::empty(), DefaultConfigKind::AtWired);
    if !table.synthesized() || table.len() != 15 {
        return fail("AT default table has wrong shape");
    }

    let entries = table.entries();
    if entries[0].bus_irq != 0 || entries[0].pin != 2 {
        return fail("timer IRQ not carried on pin 2");
    }
    if entries.iter().any(|e| e.bus_irq == 2) {
        return fail("cascade line 2 should not be routed");
    }
    if entries
        .iter()
        .any(|e| e.bus_irq != 0 && e.pin != e.bus_irq)
    {
        return fail("non-timer entry not an identity mapping");
    }
    TestResult::Pass
}

pub fn test_build_keeps_firmware_entries() -> TestResult {
    let mut sources = SourceEntryList::empty();
    let _ = sources.push(InterruptSourceEntry::pci(11, 0, 19));
    let table = RoutingTable::build(&sources, DefaultConfigKind::AtWired);
    if table.synthesized() || table.len() != 1 || table.entries()[0].pin != 19 {
        return fail("non-empty firmware table was not used as-is");
    }
    TestResult::Pass
}

// ---------------------------------------------------------------------------
// Vector allocator
// ---------------------------------------------------------------------------

pub fn test_vector_assign_idempotent() -> TestResult {
    let mut vectors = VectorAllocator::new();
    let first = vectors.assign(6);
    let second = vectors.assign(6);
    if first != second || first.is_err() {
        return fail("repeated assign returned a different vector");
    }
    if vectors.vector_of(6) != first.ok() {
        return fail("vector_of disagrees with assign");
    }
    TestResult::Pass
}

pub fn test_vector_assign_distinct_and_in_range() -> TestResult {
    let mut vectors = VectorAllocator::new();
    let mut seen = [false; 256];
    for line in 0..64u8 {
        let Ok(vector) = vectors.assign(line) else {
            return fail("vector space exhausted far too early");
        };
        if vector == 0 || vector == SYSCALL_VECTOR {
            return fail("reserved vector handed out");
        }
        if vector < FIRST_DEVICE_VECTOR || vector >= FIRST_SYSTEM_VECTOR {
            return fail("vector outside the device range");
        }
        if seen[vector as usize] {
            return fail("vector handed out twice");
        }
        seen[vector as usize] = true;
    }
    TestResult::Pass
}

pub fn test_vector_space_exhaustion_is_reported() -> TestResult {
    let mut vectors = VectorAllocator::new();
    let mut granted = 0u32;
    let mut exhausted = false;
    for line in 0..IRQ_LINES as u16 {
        match vectors.assign(line as u8) {
            Ok(_) => granted += 1,
            Err(VectorSpaceExhausted) => {
                exhausted = true;
                break;
            }
        }
    }
    if !exhausted {
        return fail("allocator never reported exhaustion");
    }
    // All bands together hold a bit under 190 usable vectors.
    if !(150..224).contains(&granted) {
        return fail("implausible number of vectors before exhaustion");
    }
    TestResult::Pass
}

// ---------------------------------------------------------------------------
// Pin map
// ---------------------------------------------------------------------------

pub fn test_pin_map_chains_and_restarts() -> TestResult {
    let mut map = PinMap::new();
    if map.add_link(7, 0, 7).is_err()
        || map.add_link(7, 0, 15).is_err()
        || map.add_link(7, 1, 3).is_err()
    {
        return fail("chaining three pins failed");
    }

    let expected = [(0u8, 7u8), (0, 15), (1, 3)];
    for _round in 0..2 {
        let mut count = 0;
        for (got, want) in map.links(7).zip(expected.iter()) {
            if got != *want {
                return fail("chain order not preserved");
            }
            count += 1;
        }
        if count != 3 {
            return fail("chain iterator lost links");
        }
    }

    if !map.contains(0, 15) || map.contains(2, 15) {
        return fail("contains() disagrees with chains");
    }
    if map.has_links(8) {
        return fail("unrelated line reports links");
    }
    TestResult::Pass
}

pub fn test_pin_map_head_slots_do_not_spill() -> TestResult {
    let mut map = PinMap::new();
    for line in 0..32u8 {
        if map.add_link(line, 0, line).is_err() {
            return fail("head-slot link failed");
        }
    }
    for line in 0..32u8 {
        if map.links(line).count() != 1 {
            return fail("head slot lost its link");
        }
    }
    TestResult::Pass
}

pub fn test_pin_map_exhaustion_is_reported() -> TestResult {
    let mut map = PinMap::new();
    let spill_slots = PIN_MAP_SIZE - IRQ_LINES;

    // Head slot plus the whole spill region on one shared line.
    if map.add_link(0, 0, 0).is_err() {
        return fail("head link failed");
    }
    for i in 0..spill_slots {
        if map.add_link(0, 1, i as u8).is_err() {
            return fail("spill filled earlier than capacity");
        }
    }
    if map.add_link(0, 2, 0) != Err(PinMapFull) {
        return fail("exhaustion not reported");
    }
    if map.links(0).count() != spill_slots + 1 {
        return fail("links lost after exhaustion");
    }
    TestResult::Pass
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

fn one_controller() -> [ControllerMeta; 1] {
    [ControllerMeta {
        id: 0,
        first_gsi: 0,
        pins: 24,
    }]
}

pub fn test_plan_mixed_isa_pci_scenario() -> TestResult {
    let mut sources = SourceEntryList::empty();
    let _ = sources.push(InterruptSourceEntry::isa(1, 0, 1));
    let _ = sources.push(InterruptSourceEntry::isa(3, 0, 3));
    let _ = sources.push(InterruptSourceEntry::isa(4, 0, 4));
    let _ = sources.push(InterruptSourceEntry::pci(2, 0, 18));

    let table = RoutingTable::build(&sources, DefaultConfigKind::AtWired);
    let plan = plan(
        &table,
        &one_controller(),
        &ElcrSnapshot::all_edge(),
        &PirqOverrideTable::empty(),
    );

    let mut vectors = [0u8; 4];
    for (slot, line) in [1u8, 3, 4, 18].iter().enumerate() {
        let Some(info) = plan.lines[*line as usize] else {
            return fail("expected line not planned");
        };
        if info.vector == 0 {
            return fail("planned line without a vector");
        }
        vectors[slot] = info.vector;
        if !plan.pins.has_links(*line) {
            return fail("planned line without a pin link");
        }

        let expect_level = *line == 18;
        if (info.trigger == Trigger::Level) != expect_level {
            return fail("wrong trigger for planned line");
        }
        if (info.polarity == Polarity::ActiveLow) != expect_level {
            return fail("wrong polarity for planned line");
        }
    }

    for i in 0..4 {
        for j in i + 1..4 {
            if vectors[i] == vectors[j] {
                return fail("two lines share a vector");
            }
        }
    }
    TestResult::Pass
}

pub fn test_plan_applies_pirq_overrides() -> TestResult {
    let mut pirq = PirqOverrideTable::empty();
    pirq.set(18, PirqOverride::Irq(5));
    pirq.set(19, PirqOverride::Disabled);

    let mut sources = SourceEntryList::empty();
    let _ = sources.push(InterruptSourceEntry::pci(2, 0, 18));
    let _ = sources.push(InterruptSourceEntry::pci(3, 0, 19));

    let table = RoutingTable::build(&sources, DefaultConfigKind::AtWired);
    let plan = plan(
        &table,
        &one_controller(),
        &ElcrSnapshot::all_edge(),
        &pirq,
    );

    if !plan.pins.has_links(5) || plan.lines[5].is_none() {
        return fail("redirected pin did not land on its override line");
    }
    if plan.pins.has_links(18) || plan.pins.has_links(19) {
        return fail("overridden pins still mapped by position");
    }
    if plan.pirq_redirected != 2 {
        return fail("override accounting wrong");
    }
    if plan.skipped_unmatched != 0 {
        return fail("overrides miscounted as unmatched");
    }
    TestResult::Pass
}

pub fn test_plan_skips_unmatched_and_passthrough() -> TestResult {
    let mut sources = SourceEntryList::empty();
    let _ = sources.push(InterruptSourceEntry::isa(1, 9, 1)); // no such controller
    let _ = sources.push(InterruptSourceEntry::isa(3, 0, 30)); // pin out of range
    let _ = sources.push(InterruptSourceEntry::ext_int(0, 0, 0));
    let _ = sources.push(InterruptSourceEntry::isa(4, 0, 4));

    let table = RoutingTable::build(&sources, DefaultConfigKind::AtWired);
    let plan = plan(
        &table,
        &one_controller(),
        &ElcrSnapshot::all_edge(),
        &PirqOverrideTable::empty(),
    );

    if plan.skipped_unmatched != 2 {
        return fail("unmatched entries miscounted");
    }
    if plan.skipped_ext_int != 1 {
        return fail("passthrough entry miscounted");
    }
    if plan.pins.has_links(1) || plan.pins.has_links(3) {
        return fail("unmatched entry still got a pin link");
    }
    if !plan.pins.has_links(4) {
        return fail("good entry lost alongside the bad ones");
    }
    TestResult::Pass
}

pub fn test_plan_ignores_duplicate_pins() -> TestResult {
    let mut sources = SourceEntryList::empty();
    let _ = sources.push(InterruptSourceEntry::isa(6, 0, 6));
    let _ = sources.push(InterruptSourceEntry::isa(6, 0, 6));

    let table = RoutingTable::build(&sources, DefaultConfigKind::AtWired);
    let plan = plan(
        &table,
        &one_controller(),
        &ElcrSnapshot::all_edge(),
        &PirqOverrideTable::empty(),
    );

    if plan.pins.links(6).count() != 1 {
        return fail("duplicate entry chained the same pin twice");
    }
    TestResult::Pass
}

// ---------------------------------------------------------------------------
// Mask driver and strategies (live hardware required)
// ---------------------------------------------------------------------------

pub fn test_mask_bit_reaches_every_pin() -> TestResult {
    if !is_ready() {
        return TestResult::Skipped;
    }
    let line = 1u8;
    if line_fully_masked(line).is_none() {
        return TestResult::Skipped;
    }

    set_masked(line, true);
    if line_fully_masked(line) != Some(true) {
        return fail("mask bit not visible on every pin");
    }
    set_masked(line, false);
    if line_fully_masked(line) != Some(false) {
        return fail("unmask did not clear every pin");
    }
    TestResult::Pass
}

pub fn test_edge_ack_masks_only_disabled_pending_lines() -> TestResult {
    if !is_ready() {
        return TestResult::Skipped;
    }
    let line = 1u8;
    if line_fully_masked(line).is_none() {
        return TestResult::Skipped;
    }
    let edge = lifecycle::strategy_for(Trigger::Edge);

    set_masked(line, false);
    edge.ack(line, LineStatus::PENDING);
    if line_fully_masked(line) != Some(false) {
        return fail("ack masked a live line");
    }

    edge.ack(line, LineStatus::PENDING | LineStatus::DISABLED);
    if line_fully_masked(line) != Some(true) {
        return fail("storming disabled line not masked");
    }

    set_masked(line, false);
    TestResult::Pass
}

pub fn test_level_end_always_unmasks() -> TestResult {
    if !is_ready() {
        return TestResult::Skipped;
    }
    let line = 1u8;
    if line_fully_masked(line).is_none() {
        return TestResult::Skipped;
    }
    let level = lifecycle::strategy_for(Trigger::Level);

    set_masked(line, true);
    level.end(line);
    if line_fully_masked(line) != Some(false) {
        return fail("end did not unmask a masked line");
    }

    level.end(line);
    if line_fully_masked(line) != Some(false) {
        return fail("end flipped an already-unmasked line");
    }
    TestResult::Pass
}

kestrel_lib::define_test_suite!(
    ioapic,
    [
        test_resolve_isa_is_high_edge,
        test_resolve_pci_is_low_level,
        test_resolve_explicit_override_wins,
        test_resolve_eisa_uses_elcr,
        test_resolve_eisa_out_of_range_defaults_edge,
        test_resolve_unknown_bus_defaults_low_level,
        test_resolve_is_pure,
        test_build_default_timer_not_wired,
        test_build_default_at_wired,
        test_build_keeps_firmware_entries,
        test_vector_assign_idempotent,
        test_vector_assign_distinct_and_in_range,
        test_vector_space_exhaustion_is_reported,
        test_pin_map_chains_and_restarts,
        test_pin_map_head_slots_do_not_spill,
        test_pin_map_exhaustion_is_reported,
        test_plan_mixed_isa_pci_scenario,
        test_plan_applies_pirq_overrides,
        test_plan_skips_unmatched_and_passthrough,
        test_plan_ignores_duplicate_pins,
        test_mask_bit_reaches_every_pin,
        test_edge_ack_masks_only_disabled_pending_lines,
        test_level_end_always_unmasks,
    ]
);
