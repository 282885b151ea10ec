#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]

pub mod apic;
pub mod ioapic;
pub mod irq;
pub mod pic;
pub mod pit;
pub mod serial;
