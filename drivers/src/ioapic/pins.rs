//! Pin↔line mapping store.
//!
//! Most logical lines drive exactly one controller pin, so each line owns
//! a head slot indexed by its own number. Shared legacy lines chain extra
//! pins through a spill region above the head slots, allocated by a
//! forward-only cursor. Nodes are never freed; the map is append-only
//! during boot and read-only afterwards.

use kestrel_core::irq::IRQ_LINES;

/// Spill capacity for chained pins beyond the per-line head slots.
const SPILL_SLOTS: usize = 64;

pub(crate) const PIN_MAP_SIZE: usize = IRQ_LINES + SPILL_SLOTS;

/// The spill region is full. Indicates firmware reporting more shared
/// wiring than any supported platform has; there is no safe way to route
/// around it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinMapFull;

#[derive(Clone, Copy)]
struct PinLink {
    apic: u8,
    pin: u8,
    used: bool,
    next: Option<u16>,
}

impl PinLink {
    const fn vacant() -> Self {
        Self {
            apic: 0,
            pin: 0,
            used: false,
            next: None,
        }
    }
}

pub(crate) struct PinMap {
    links: [PinLink; PIN_MAP_SIZE],
    next_spill: usize,
}

impl PinMap {
    pub(crate) const fn new() -> Self {
        Self {
            links: [PinLink::vacant(); PIN_MAP_SIZE],
            next_spill: IRQ_LINES,
        }
    }

    /// Attach `(apic, pin)` to a line: head slot if the line has none
    /// yet, otherwise a spill node chained at the tail.
    pub(crate) fn add_link(&mut self, line: u8, apic: u8, pin: u8) -> Result<(), PinMapFull> {
        let head = line as usize;
        debug_assert!(head < IRQ_LINES);

        if !self.links[head].used {
            self.links[head] = PinLink {
                apic,
                pin,
                used: true,
                next: None,
            };
            return Ok(());
        }

        let mut tail = head;
        while let Some(next) = self.links[tail].next {
            tail = next as usize;
        }

        if self.next_spill >= PIN_MAP_SIZE {
            return Err(PinMapFull);
        }
        let slot = self.next_spill;
        self.next_spill += 1;

        self.links[slot] = PinLink {
            apic,
            pin,
            used: true,
            next: None,
        };
        self.links[tail].next = Some(slot as u16);
        Ok(())
    }

    /// Whether this exact pin already hangs off some line. A pin may
    /// appear in at most one chain.
    pub(crate) fn contains(&self, apic: u8, pin: u8) -> bool {
        self.links[..self.next_spill]
            .iter()
            .any(|link| link.used && link.apic == apic && link.pin == pin)
    }

    #[inline]
    pub(crate) fn has_links(&self, line: u8) -> bool {
        (line as usize) < IRQ_LINES && self.links[line as usize].used
    }

    /// Restartable iterator over the `(apic, pin)` pairs of a line.
    pub(crate) fn links(&self, line: u8) -> PinLinks<'_> {
        let start = if self.has_links(line) {
            Some(line as usize)
        } else {
            None
        };
        PinLinks {
            map: self,
            cursor: start,
        }
    }
}

pub(crate) struct PinLinks<'a> {
    map: &'a PinMap,
    cursor: Option<usize>,
}

impl Iterator for PinLinks<'_> {
    type Item = (u8, u8);

    fn next(&mut self) -> Option<(u8, u8)> {
        let index = self.cursor?;
        let link = &self.map.links[index];
        self.cursor = link.next.map(usize::from);
        Some((link.apic, link.pin))
    }
}
