//! Generic IRQ line dispatch framework.
//!
//! Owns the per-line descriptor table: registered controller strategy,
//! handler, lifecycle status bits, and nesting depth. The hardware-facing
//! side (how a line is actually masked, acknowledged or re-armed) is
//! behind the [`LineController`] trait; the routing driver registers one
//! strategy per line at boot and never changes it afterwards.
//!
//! Per-line serialization lives here: every descriptor sits behind an
//! `IrqMutex`, so a controller's `ack`/`end` callbacks never race with
//! `enable`/`disable` on the same line. Different lines proceed in
//! parallel.

use core::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;
use kestrel_lib::{IrqMutex, klog_debug, klog_warn};

/// Number of logical IRQ lines the framework tracks.
pub const IRQ_LINES: usize = 224;

/// Lines 0..16 additionally exist on the legacy controller pair.
pub const LEGACY_LINES: u8 = 16;

pub const LEGACY_IRQ_TIMER: u8 = 0;

bitflags! {
    /// Per-line lifecycle state. A line starts shut down (`DISABLED`,
    /// depth 1), becomes ready at handler registration, and cycles
    /// through `PENDING`/`IN_PROGRESS` per delivery.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct LineStatus: u32 {
        /// Line is logically off; deliveries are not handled.
        const DISABLED = 1 << 0;
        /// An event arrived and has not been handled yet.
        const PENDING = 1 << 1;
        /// A handler is running for this line right now.
        const IN_PROGRESS = 1 << 2;
        /// The pending event was latched before startup and is being
        /// replayed rather than freshly delivered.
        const REPLAY = 1 << 3;
    }
}

/// Hardware strategy for one line, selected once at registration.
pub trait LineController: Sync {
    /// Bring the line up. Returns `true` if an event was already latched
    /// in hardware, so the framework can replay it.
    fn startup(&self, line: u8) -> bool;
    fn shutdown(&self, line: u8);
    fn enable(&self, line: u8);
    fn disable(&self, line: u8);
    /// Acknowledge a delivery. Receives the descriptor status as of the
    /// moment of delivery; storm-prevention decisions key off it.
    fn ack(&self, line: u8, status: LineStatus);
    /// Delivery is fully handled; re-arm the source if the strategy
    /// requires it.
    fn end(&self, line: u8);
}

pub type LineHandler = fn(line: u8);

struct LineDesc {
    controller: Option<&'static dyn LineController>,
    handler: Option<LineHandler>,
    status: LineStatus,
    depth: u32,
    count: u64,
    unhandled_reported: bool,
}

impl LineDesc {
    const fn new() -> Self {
        Self {
            controller: None,
            handler: None,
            status: LineStatus::DISABLED,
            depth: 1,
            count: 0,
            unhandled_reported: false,
        }
    }
}

static LINES: [IrqMutex<LineDesc>; IRQ_LINES] =
    [const { IrqMutex::new(LineDesc::new()) }; IRQ_LINES];

const NO_LINE: u8 = 0xFF;

static VECTOR_MAP: IrqMutex<[u8; 256]> = IrqMutex::new([NO_LINE; 256]);

/// Global timer tick counter, fed by the timer line handler. Relaxed is
/// enough; consumers only need eventual consistency.
static TIMER_TICKS: AtomicU64 = AtomicU64::new(0);

#[inline]
pub fn timer_ticks() -> u64 {
    TIMER_TICKS.load(Ordering::Relaxed)
}

#[inline]
pub fn note_timer_tick() {
    TIMER_TICKS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterError {
    BadLine,
    AlreadyRegistered,
    VectorInUse,
    NotRegistered,
}

/// Attach a controller strategy and CPU vector to a line.
///
/// Called exactly once per logical line during boot; a second call for
/// the same line or vector is rejected. The line stays shut down until a
/// handler arrives.
pub fn register_line(
    line: u8,
    vector: u8,
    controller: &'static dyn LineController,
) -> Result<(), RegisterError> {
    if line as usize >= IRQ_LINES {
        return Err(RegisterError::BadLine);
    }

    let mut map = VECTOR_MAP.lock();
    if map[vector as usize] != NO_LINE {
        return Err(RegisterError::VectorInUse);
    }

    let mut desc = LINES[line as usize].lock();
    if desc.controller.is_some() {
        return Err(RegisterError::AlreadyRegistered);
    }
    desc.controller = Some(controller);
    desc.status = LineStatus::DISABLED;
    desc.depth = 1;
    map[vector as usize] = line;

    klog_debug!("IRQ: line {} registered on vector {:#x}", line, vector);
    Ok(())
}

/// Map an additional vector onto an already-registered line.
///
/// Boot-time re-routing (the timer fallback path) can move a line onto a
/// delivery path that arrives with a different vector; the original
/// mapping stays valid. Idempotent for a vector already owned by the
/// same line.
pub fn alias_vector(vector: u8, line: u8) -> Result<(), RegisterError> {
    if line as usize >= IRQ_LINES {
        return Err(RegisterError::BadLine);
    }
    let mut map = VECTOR_MAP.lock();
    match map[vector as usize] {
        NO_LINE => {
            map[vector as usize] = line;
            Ok(())
        }
        owner if owner == line => Ok(()),
        _ => Err(RegisterError::VectorInUse),
    }
}

/// Install a handler and start the line up.
///
/// Returns whether an event was already latched at startup (the
/// controller's pending flag); the event stays marked `PENDING` in the
/// descriptor for replay.
pub fn register_handler(line: u8, handler: LineHandler) -> Result<bool, RegisterError> {
    if line as usize >= IRQ_LINES {
        return Err(RegisterError::BadLine);
    }
    let mut desc = LINES[line as usize].lock();
    let Some(controller) = desc.controller else {
        return Err(RegisterError::NotRegistered);
    };

    desc.handler = Some(handler);
    desc.unhandled_reported = false;
    desc.depth = 0;
    desc.status.remove(LineStatus::DISABLED);

    let pending = controller.startup(line);
    if pending {
        desc.status.insert(LineStatus::PENDING | LineStatus::REPLAY);
        klog_debug!("IRQ: line {} had a latched event at startup", line);
    }
    Ok(pending)
}

/// Detach the handler and shut the line down.
pub fn unregister_handler(line: u8) {
    if line as usize >= IRQ_LINES {
        return;
    }
    let mut desc = LINES[line as usize].lock();
    let Some(controller) = desc.controller else {
        return;
    };
    desc.handler = None;
    desc.status = LineStatus::DISABLED;
    desc.depth = 1;
    controller.shutdown(line);
}

/// Disable a line, nesting-aware.
pub fn disable_line(line: u8) {
    if line as usize >= IRQ_LINES {
        return;
    }
    let mut desc = LINES[line as usize].lock();
    let Some(controller) = desc.controller else {
        return;
    };
    if desc.depth == 0 {
        desc.status.insert(LineStatus::DISABLED);
        controller.disable(line);
    }
    desc.depth += 1;
}

/// Re-enable a line, undoing one matching [`disable_line`].
pub fn enable_line(line: u8) {
    if line as usize >= IRQ_LINES {
        return;
    }
    let mut desc = LINES[line as usize].lock();
    let Some(controller) = desc.controller else {
        return;
    };
    match desc.depth {
        0 => klog_warn!("IRQ: unbalanced enable for line {}", line),
        1 => {
            desc.depth = 0;
            desc.status.remove(LineStatus::DISABLED);
            desc.unhandled_reported = false;
            controller.enable(line);
        }
        _ => desc.depth -= 1,
    }
}

fn note_unhandled(desc: &mut LineDesc, line: u8) {
    desc.status.insert(LineStatus::DISABLED);
    desc.depth = desc.depth.saturating_add(1);
    if !desc.unhandled_reported {
        desc.unhandled_reported = true;
        klog_warn!("IRQ: no handler for line {}, disabling", line);
    }
}

/// Main delivery path, called from the vector stub.
///
/// Acknowledge through the line's strategy, then run the handler as long
/// as further deliveries pile up behind it (`PENDING` set while
/// `IN_PROGRESS`), then let the strategy re-arm the source.
pub fn dispatch(vector: u8) {
    let line = {
        let map = VECTOR_MAP.lock();
        map[vector as usize]
    };
    if line == NO_LINE {
        klog_warn!("IRQ: spurious vector {:#x}", vector);
        return;
    }

    let desc_lock = &LINES[line as usize];
    let mut desc = desc_lock.lock();
    desc.count = desc.count.wrapping_add(1);

    let Some(controller) = desc.controller else {
        klog_warn!("IRQ: vector {:#x} hit unregistered line {}", vector, line);
        return;
    };

    controller.ack(line, desc.status);

    desc.status.remove(LineStatus::REPLAY);
    desc.status.insert(LineStatus::PENDING);

    let mut to_run = None;
    if !desc
        .status
        .intersects(LineStatus::DISABLED | LineStatus::IN_PROGRESS)
    {
        if let Some(handler) = desc.handler {
            desc.status.remove(LineStatus::PENDING);
            desc.status.insert(LineStatus::IN_PROGRESS);
            to_run = Some(handler);
        } else {
            note_unhandled(&mut desc, line);
        }
    }

    let Some(handler) = to_run else {
        return;
    };

    loop {
        drop(desc);
        handler(line);
        desc = desc_lock.lock();

        // Another delivery may have arrived while the handler ran on a
        // different CPU's behalf; drain it before ending.
        if !desc.status.contains(LineStatus::PENDING) || desc.status.contains(LineStatus::DISABLED)
        {
            break;
        }
        desc.status.remove(LineStatus::PENDING);
    }

    desc.status.remove(LineStatus::IN_PROGRESS);
    controller.end(line);
}

/// Snapshot a line's status bits (diagnostics and tests).
pub fn line_status(line: u8) -> Option<LineStatus> {
    if line as usize >= IRQ_LINES {
        return None;
    }
    Some(LINES[line as usize].lock().status)
}

/// Delivery count for a line.
pub fn line_count(line: u8) -> u64 {
    if line as usize >= IRQ_LINES {
        return 0;
    }
    LINES[line as usize].lock().count
}

/// Whether a line has a registered controller strategy.
pub fn line_is_registered(line: u8) -> bool {
    if line as usize >= IRQ_LINES {
        return false;
    }
    LINES[line as usize].lock().controller.is_some()
}
