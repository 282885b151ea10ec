#![no_std]

pub mod irq;
