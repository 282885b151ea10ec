//! COM1 console driver.
//!
//! Owns the UART behind an `IrqMutex` and registers itself as the klog
//! backend, replacing the raw-port early-boot fallback. One lock
//! acquisition per log line keeps output from different CPUs whole.

use core::fmt::{self, Write};

use uart_16550::SerialPort;

use kestrel_lib::{IrqMutex, klog_debug, klog_register_backend};

const COM1_BASE: u16 = 0x3F8;

static CONSOLE: IrqMutex<Option<SerialPort>> = IrqMutex::new(None);

fn console_backend(args: fmt::Arguments<'_>) {
    let mut console = CONSOLE.lock();
    if let Some(port) = console.as_mut() {
        let _ = port.write_fmt(args);
        let _ = port.write_str("\r\n");
    }
}

/// Initialise the UART and take over klog output.
pub fn init() {
    // SAFETY: COM1_BASE is the standard COM1 register block; nothing else
    // drives it once this driver owns the port.
    let mut port = unsafe { SerialPort::new(COM1_BASE) };
    port.init();
    *CONSOLE.lock() = Some(port);
    klog_register_backend(console_backend);
    klog_debug!("serial: console ready on COM1");
}
