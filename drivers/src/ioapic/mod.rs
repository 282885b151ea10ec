//! I/O APIC interrupt routing.
//!
//! Maps firmware interrupt sources onto controller redirection entries:
//! builds the source table, chains pins to logical lines, resolves
//! signaling, assigns CPU vectors, and programs the chips — all during
//! single-threaded boot. Afterwards the only mutation that ever reaches
//! this module is the mask bit, driven by the per-line delivery
//! strategies in [`lifecycle`].
//!
//! Each controller is an index/data register window. The index write and
//! the data access form a critical pair, so every register transaction
//! in this module runs under one global `IrqMutex`, which also keeps
//! local interrupts off for the pair's duration.

pub mod lifecycle;
pub mod timer_check;

pub(crate) mod pins;
pub(crate) mod regs;
pub(crate) mod routing;
pub(crate) mod vectors;

#[cfg(feature = "itests")]
pub mod tests;

use spin::Once;

use kestrel_core::irq::IRQ_LINES;
use kestrel_firmware::{ControllerInfo, PlatformIrqInfo, Polarity, SourceKind, Trigger};
use kestrel_lib::{InitFlag, IrqMutex, MmioWindow, StateFlag, klog_info};

use regs::*;
use routing::{ControllerMeta, RoutingPlan, RoutingTable};

pub(crate) use kestrel_firmware::MAX_CONTROLLERS;

/// Guards every index/data transaction on every controller window.
static REGISTER_LOCK: IrqMutex<()> = IrqMutex::new(());

struct IoApic {
    id: u8,
    first_gsi: u32,
    pins: u32,
    version: u32,
    window: MmioWindow,
}

impl IoApic {
    /// Probe one controller: wrap its window and read the version
    /// register to learn how many pins it actually has.
    fn probe(info: &ControllerInfo) -> Option<IoApic> {
        if info.window_base == 0 {
            return None;
        }
        // SAFETY: the platform layer maps each controller window before
        // handing its base over; WINDOW_SIZE covers index + data.
        let window = unsafe { MmioWindow::new(info.window_base, WINDOW_SIZE) };
        let mut apic = IoApic {
            id: info.id,
            first_gsi: info.first_gsi,
            pins: 0,
            version: 0,
            window,
        };

        let raw = {
            let _guard = REGISTER_LOCK.lock();
            apic.read_reg(REG_VERSION)
        };
        apic.version = raw & 0xFF;
        apic.pins = ((raw >> 16) & 0xFF) + 1;
        Some(apic)
    }

    /// REGISTER_LOCK must be held: index write + data read are a pair.
    fn read_reg(&self, reg: u8) -> u32 {
        self.window.write_u32(WINDOW_INDEX, reg as u32);
        self.window.read_u32(WINDOW_DATA)
    }

    /// REGISTER_LOCK must be held: index write + data write are a pair.
    fn write_reg(&self, reg: u8, value: u32) {
        self.window.write_u32(WINDOW_INDEX, reg as u32);
        self.window.write_u32(WINDOW_DATA, value);
    }

    /// REGISTER_LOCK must be held.
    fn read_entry(&self, pin: u32) -> (u32, u32) {
        (self.read_reg(redir_low(pin)), self.read_reg(redir_high(pin)))
    }

    /// REGISTER_LOCK must be held. High dword first, so the target is in
    /// place before the low dword can unmask anything.
    fn write_entry(&self, pin: u32, low: u32, high: u32) {
        self.write_reg(redir_high(pin), high);
        self.write_reg(redir_low(pin), low);
    }
}

struct Controllers {
    apics: [Option<IoApic>; MAX_CONTROLLERS],
    count: usize,
}

impl Controllers {
    fn probe_all(infos: &[ControllerInfo]) -> Self {
        let mut controllers = Self {
            apics: [const { None }; MAX_CONTROLLERS],
            count: 0,
        };
        for info in infos {
            if controllers.count >= MAX_CONTROLLERS {
                break;
            }
            if let Some(apic) = IoApic::probe(info) {
                controllers.apics[controllers.count] = Some(apic);
                controllers.count += 1;
            }
        }
        controllers
    }

    fn by_id(&self, id: u8) -> Option<&IoApic> {
        self.iter().find(|apic| apic.id == id)
    }

    fn iter(&self) -> impl Iterator<Item = &IoApic> {
        self.apics.iter().filter_map(Option::as_ref)
    }

    fn metas(&self) -> ([ControllerMeta; MAX_CONTROLLERS], usize) {
        let mut metas = [ControllerMeta {
            id: 0,
            first_gsi: 0,
            pins: 0,
        }; MAX_CONTROLLERS];
        let mut count = 0;
        for apic in self.iter() {
            metas[count] = ControllerMeta {
                id: apic.id,
                first_gsi: apic.first_gsi,
                pins: apic.pins,
            };
            count += 1;
        }
        (metas, count)
    }
}

/// Everything routing decided at boot, frozen after install.
pub(crate) struct RoutingState {
    controllers: Controllers,
    table: RoutingTable,
    pub(crate) plan: RoutingPlan,
}

static ROUTING: Once<RoutingState> = Once::new();
static IOAPIC_READY: InitFlag = InitFlag::new();
static INIT_IN_PROGRESS: StateFlag = StateFlag::new();

pub(crate) fn routing_state() -> Option<&'static RoutingState> {
    if IOAPIC_READY.is_set() {
        ROUTING.get()
    } else {
        None
    }
}

#[inline]
pub fn is_ready() -> bool {
    IOAPIC_READY.is_set()
}

fn log_controller(apic: &IoApic) {
    klog_info!(
        "IOAPIC: controller {:#x} at {:#x}, pins {} (GSI {}-{}), version {:#x}",
        apic.id,
        apic.window.virt_base(),
        apic.pins,
        apic.first_gsi,
        apic.first_gsi + apic.pins.saturating_sub(1),
        apic.version
    );
}

/// Program every planned redirection entry, masked. The mask stays on
/// until the dispatch framework starts a line up through its strategy.
fn program_entries(controllers: &Controllers, table: &RoutingTable, plan: &RoutingPlan, boot_apic_id: u8) {
    let _guard = REGISTER_LOCK.lock();

    for line in 0..IRQ_LINES as u16 {
        let line = line as u8;
        let Some(info) = plan.lines[line as usize] else {
            continue;
        };
        for (apic_id, pin) in plan.pins.links(line) {
            let Some(apic) = controllers.by_id(apic_id) else {
                continue;
            };
            let mut low = info.vector as u32 | REDIR_DELIVERY_FIXED | REDIR_DEST_PHYSICAL | REDIR_MASKED;
            if info.polarity == Polarity::ActiveLow {
                low |= REDIR_POLARITY_LOW;
            }
            if info.trigger == Trigger::Level {
                low |= REDIR_TRIGGER_LEVEL;
            }
            let high = (boot_apic_id as u32) << REDIR_DEST_SHIFT;
            apic.write_entry(pin as u32, low, high);
        }
    }

    // Passthrough sources keep their pin, but as a masked ExtINT entry:
    // the legacy controller supplies the vector if the pin is ever opened.
    for entry in table.entries() {
        if entry.kind != SourceKind::ExtInt {
            continue;
        }
        let Some(apic) = controllers.by_id(entry.controller) else {
            continue;
        };
        if (entry.pin as u32) < apic.pins {
            apic.write_entry(entry.pin as u32, REDIR_DELIVERY_EXTINT | REDIR_MASKED, 0);
        }
    }
}

/// Discover controllers, build and program the routing table, and freeze
/// the result. Returns whether routed delivery is available.
pub fn init(platform: &PlatformIrqInfo) -> bool {
    if IOAPIC_READY.is_set() {
        return true;
    }
    if !INIT_IN_PROGRESS.enter() {
        while !IOAPIC_READY.is_set() {
            core::hint::spin_loop();
        }
        return true;
    }

    let controllers = Controllers::probe_all(platform.controllers.as_slice());
    if controllers.count == 0 {
        klog_info!("IOAPIC: no usable controller found");
        INIT_IN_PROGRESS.leave();
        return false;
    }
    for apic in controllers.iter() {
        log_controller(apic);
    }

    let table = RoutingTable::build(&platform.sources, platform.default_cfg);
    klog_info!(
        "IOAPIC: routing {} source entries{}",
        table.len(),
        if table.synthesized() {
            " (synthesized default)"
        } else {
            ""
        }
    );

    let (metas, meta_count) = controllers.metas();
    let plan = routing::plan(&table, &metas[..meta_count], &platform.elcr, &platform.pirq);

    program_entries(&controllers, &table, &plan, platform.boot_apic_id);

    ROUTING.call_once(|| RoutingState {
        controllers,
        table,
        plan,
    });
    IOAPIC_READY.mark_set();
    INIT_IN_PROGRESS.leave();
    klog_info!("IOAPIC: routing table programmed");
    true
}

/// Apply the mask bit across every pin chained to a line.
///
/// Masking ends with a synchronizing read-back of the last pin touched:
/// the write posts through the window, and the caller needs it latched in
/// the chip before relying on the line being quiet. Unmasking has no such
/// deadline. No software copy of the mask state is kept; hardware is the
/// only truth.
pub fn set_masked(line: u8, masked: bool) {
    let Some(state) = routing_state() else {
        return;
    };
    if !state.plan.pins.has_links(line) {
        return;
    }

    let _guard = REGISTER_LOCK.lock();
    let mut last_touched = None;
    for (apic_id, pin) in state.plan.pins.links(line) {
        let Some(apic) = state.controllers.by_id(apic_id) else {
            continue;
        };
        let reg = redir_low(pin as u32);
        let mut low = apic.read_reg(reg);
        if masked {
            low |= REDIR_MASKED;
        } else {
            low &= !REDIR_MASKED;
        }
        apic.write_reg(reg, low);
        last_touched = Some((apic, reg));
    }

    if masked {
        if let Some((apic, reg)) = last_touched {
            let _ = apic.read_reg(reg);
        }
    }
}

/// Live mask state of a line: `Some(true)` when every chained pin has
/// its mask bit set in hardware. Diagnostics and tests only.
pub fn line_fully_masked(line: u8) -> Option<bool> {
    let state = routing_state()?;
    if !state.plan.pins.has_links(line) {
        return None;
    }
    let _guard = REGISTER_LOCK.lock();
    let mut all_masked = true;
    for (apic_id, pin) in state.plan.pins.links(line) {
        let Some(apic) = state.controllers.by_id(apic_id) else {
            continue;
        };
        if apic.read_reg(redir_low(pin as u32)) & REDIR_MASKED == 0 {
            all_masked = false;
        }
    }
    Some(all_masked)
}

/// Dump the routing table and live redirection entries. Entries are read
/// from hardware at dump time, not from any cached copy.
pub fn dump_state() {
    klog_info!("=== IOAPIC STATE ===");
    let Some(state) = routing_state() else {
        klog_info!("IOAPIC: not initialized");
        klog_info!("=== END IOAPIC STATE ===");
        return;
    };

    klog_info!(
        "source table: {} entries{}, {} unmatched, {} passthrough, {} PIRQ-overridden",
        state.table.len(),
        if state.table.synthesized() {
            " (synthesized)"
        } else {
            ""
        },
        state.plan.skipped_unmatched,
        state.plan.skipped_ext_int,
        state.plan.pirq_redirected
    );

    for apic in state.controllers.iter() {
        log_controller(apic);
        for pin in 0..apic.pins {
            let (low, high) = {
                let _guard = REGISTER_LOCK.lock();
                apic.read_entry(pin)
            };
            klog_info!(
                "  pin {:02}: vector {:#04x} dest {:#04x}{}{}{}{}",
                pin,
                low & REDIR_VECTOR_MASK,
                high >> REDIR_DEST_SHIFT,
                if low & REDIR_TRIGGER_LEVEL != 0 { " level" } else { " edge" },
                if low & REDIR_POLARITY_LOW != 0 { " low" } else { " high" },
                if low & REDIR_MASKED != 0 { " masked" } else { "" },
                if low & REDIR_REMOTE_IRR != 0 { " irr" } else { "" }
            );
        }
    }

    for line in 0..IRQ_LINES as u16 {
        let line = line as u8;
        let Some(info) = state.plan.lines[line as usize] else {
            continue;
        };
        for (apic_id, pin) in state.plan.pins.links(line) {
            klog_info!(
                "  line {:3} -> controller {:#x} pin {:02}, vector {:#04x}",
                line,
                apic_id,
                pin,
                info.vector
            );
        }
    }

    klog_info!("=== END IOAPIC STATE ===");
}
