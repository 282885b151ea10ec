//! 8254 interval timer, channel 0 only.
//!
//! The routing subsystem does not consume ticks itself; it programs the
//! timer so the boot-time delivery validation has something to observe.

use kestrel_lib::klog_debug;
use kestrel_lib::ports::{
    PIT_BASE_FREQUENCY_HZ, PIT_CHANNEL0, PIT_COMMAND, PIT_COMMAND_ACCESS_LOHI,
    PIT_COMMAND_BINARY, PIT_COMMAND_CHANNEL0, PIT_COMMAND_MODE_SQUARE,
};

/// Program channel 0 as a periodic square wave at (approximately) the
/// requested frequency.
pub fn init(frequency_hz: u32) {
    let frequency_hz = frequency_hz.max(19);
    let divisor = (PIT_BASE_FREQUENCY_HZ / frequency_hz).clamp(2, u16::MAX as u32) as u16;

    // SAFETY: standard channel-0 programming sequence; command byte
    // first, then divisor low/high on the data port.
    unsafe {
        PIT_COMMAND.write(
            PIT_COMMAND_CHANNEL0
                | PIT_COMMAND_ACCESS_LOHI
                | PIT_COMMAND_MODE_SQUARE
                | PIT_COMMAND_BINARY,
        );
        PIT_CHANNEL0.write((divisor & 0xFF) as u8);
        PIT_CHANNEL0.write((divisor >> 8) as u8);
    }

    klog_debug!("pit: channel 0 at {} Hz (divisor {})", frequency_hz, divisor);
}
