// This file is part of zpulink, a host-side driver for the ZPU soft-core FIFO link and MUXBUS register bridge.
//
// Copyright 2025 Canonical Ltd.
//
// SPDX-License-Identifier: GPL-3.0-only
//
// zpulink is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License version 3, as published by the Free Software Foundation.
//
// zpulink is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranties of MERCHANTABILITY, SATISFACTORY QUALITY, or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with this program.  If not, see http://www.gnu.org/licenses/.

//! Device-resident FIFO rings and their host-visible memory image.
//!
//! The host has full access to ZPU RAM at any time through the register
//! window, so the shared state is simply a struct the firmware keeps in RAM:
//! a flags word, the TX ring (device to host) and the RX ring (host to
//! device), each with a producer-owned `put` and consumer-owned `get`
//! cursor. [`FifoMirror`] owns that struct and exposes it two ways: ring
//! operations for firmware code ([`push_tx`](FifoMirror::push_tx),
//! [`pop_rx`](FifoMirror::pop_rx)), and the byte-exact RAM image
//! ([`load`](FifoMirror::load)/[`store`](FifoMirror::store)) that a register
//! transport addresses the same way the I2C window does.
//!
//! The field layout is part of the wire contract with deployed host tools
//! and must not change: big-endian 32-bit `flags`, `tx_put`, `tx_get`, then
//! the TX data bytes, then `rx_put`, `rx_get` and the RX data bytes.

use core::fmt;

/// TX (device-to-host) ring capacity. Holds up to two full burst responses.
pub const TX_CAP: usize = 256;

/// RX (host-to-device) ring capacity. Requests are at most 5 bytes, so a
/// small ring keeps the RAM cost down.
pub const RX_CAP: usize = 16;

/// Flags bit the host sets to release TX flow control. While clear, a full
/// TX ring stalls the firmware instead of dropping data.
pub const FLAG_NOFLOW: u32 = 1 << 25;

/// Flags bit reserved for firmware applications to request host attention.
pub const FLAG_ATTENTION: u32 = 1 << 26;

/// ZPU-relative address of the bootstrap pointer the host discovers the
/// descriptor through. Sits in the unused interrupt vector table.
pub const BOOTSTRAP_OFS: usize = 0x3C;

const TX_PUT_OFS: usize = 4;
const TX_GET_OFS: usize = 8;
const TX_DAT_OFS: usize = 12;
const RX_PUT_OFS: usize = TX_DAT_OFS + TX_CAP;
const RX_GET_OFS: usize = RX_PUT_OFS + 4;
const RX_DAT_OFS: usize = RX_GET_OFS + 4;

/// Total size of the descriptor in device RAM.
pub const DESCRIPTOR_LEN: usize = RX_DAT_OFS + RX_CAP;

/// The TX ring is full and flow control is active; the producer must wait
/// for the host to drain it. On hardware the firmware raises the doorbell
/// and busy-waits here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("TX ring full with flow control active")]
pub struct TxFull;

/// The shared FIFO descriptor, owned by firmware, read and written by the
/// host through the register window.
pub struct FifoMirror {
    flags: u32,
    tx_put: u32,
    tx_get: u32,
    tx_dat: [u8; TX_CAP],
    rx_put: u32,
    rx_get: u32,
    rx_dat: [u8; RX_CAP],
    /// ZPU-relative address of this descriptor, published at the bootstrap
    /// slot.
    base: u16,
}

impl FifoMirror {
    /// Create the descriptor at ZPU-relative address `base` and publish the
    /// bootstrap pointer. Flow control starts disabled, as firmware must not
    /// stall before a host ever connects; the host picks its policy at
    /// session init.
    pub fn new(base: u16) -> Self {
        FifoMirror {
            flags: TX_CAP as u32 | (RX_CAP as u32) << 12 | FLAG_NOFLOW,
            tx_put: 0,
            tx_get: 0,
            tx_dat: [0; TX_CAP],
            rx_put: 0,
            rx_get: 0,
            rx_dat: [0; RX_CAP],
            base,
        }
    }

    /// Current flags word.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Whether the host has asked the device to stall on a full TX ring
    /// rather than drop data.
    pub fn flow_control_enabled(&self) -> bool {
        self.flags & FLAG_NOFLOW == 0
    }

    /// Free TX slots. One slot always stays vacant so that a full ring and
    /// an empty ring remain distinguishable.
    pub fn tx_free(&self) -> usize {
        TX_CAP - 1 - (self.tx_put.wrapping_sub(self.tx_get) as usize % TX_CAP)
    }

    /// Bytes currently queued by the host and not yet consumed.
    pub fn rx_len(&self) -> usize {
        self.rx_put.wrapping_sub(self.rx_get) as usize % RX_CAP
    }

    /// Queue one byte for the host.
    ///
    /// With flow control active a push that would make `put` collide with
    /// `get` is refused; the caller decides how to wait. With flow control
    /// released the cursor advances regardless and the oldest unread byte is
    /// lost, which is the documented trade the host accepted when it set the
    /// no-flow bit.
    pub fn push_tx(&mut self, c: u8) -> Result<(), TxFull> {
        let put = self.tx_put as usize;
        let next = (put + 1) % TX_CAP;
        if next as u32 == self.tx_get && self.flow_control_enabled() {
            return Err(TxFull);
        }
        self.tx_dat[put] = c;
        self.tx_put = next as u32;
        Ok(())
    }

    /// Take one byte off the RX ring, if the host has queued any. This is
    /// the firmware's polling point; it never blocks.
    pub fn pop_rx(&mut self) -> Option<u8> {
        let get = self.rx_get as usize;
        if get as u32 == self.rx_put {
            return None;
        }
        let c = self.rx_dat[get];
        self.rx_get = ((get + 1) % RX_CAP) as u32;
        Some(c)
    }

    /// Read one byte of the RAM image at ZPU-relative address `ofs`.
    ///
    /// Covers the bootstrap pointer and every descriptor field; addresses
    /// outside both read as zero, like uninitialized RAM.
    pub fn load(&self, ofs: u16) -> u8 {
        let o = ofs as usize;
        if (BOOTSTRAP_OFS..BOOTSTRAP_OFS + 4).contains(&o) {
            return (self.base as u32).to_be_bytes()[o - BOOTSTRAP_OFS];
        }
        let Some(d) = o.checked_sub(self.base as usize) else {
            return 0;
        };
        if d < TX_PUT_OFS {
            self.flags.to_be_bytes()[d]
        } else if d < TX_GET_OFS {
            self.tx_put.to_be_bytes()[d - TX_PUT_OFS]
        } else if d < TX_DAT_OFS {
            self.tx_get.to_be_bytes()[d - TX_GET_OFS]
        } else if d < RX_PUT_OFS {
            self.tx_dat[d - TX_DAT_OFS]
        } else if d < RX_GET_OFS {
            self.rx_put.to_be_bytes()[d - RX_PUT_OFS]
        } else if d < RX_DAT_OFS {
            self.rx_get.to_be_bytes()[d - RX_GET_OFS]
        } else if d < DESCRIPTOR_LEN {
            self.rx_dat[d - RX_DAT_OFS]
        } else {
            0
        }
    }

    /// Write one byte of the RAM image at ZPU-relative address `ofs`.
    ///
    /// The protocol only has the host writing the flags MSB, its two cursor
    /// LSBs and the RX data bytes, but this is plain RAM on hardware, so
    /// every descriptor byte accepts a store. The bootstrap slot is left
    /// read-only; the firmware publishes it exactly once.
    pub fn store(&mut self, ofs: u16, val: u8) {
        let Some(d) = (ofs as usize).checked_sub(self.base as usize) else {
            return;
        };
        if d < TX_PUT_OFS {
            set_be_byte(&mut self.flags, d, val);
        } else if d < TX_GET_OFS {
            set_be_byte(&mut self.tx_put, d - TX_PUT_OFS, val);
        } else if d < TX_DAT_OFS {
            set_be_byte(&mut self.tx_get, d - TX_GET_OFS, val);
        } else if d < RX_PUT_OFS {
            self.tx_dat[d - TX_DAT_OFS] = val;
        } else if d < RX_GET_OFS {
            set_be_byte(&mut self.rx_put, d - RX_PUT_OFS, val);
        } else if d < RX_DAT_OFS {
            set_be_byte(&mut self.rx_get, d - RX_GET_OFS, val);
        } else if d < DESCRIPTOR_LEN {
            self.rx_dat[d - RX_DAT_OFS] = val;
        }
    }
}

fn set_be_byte(word: &mut u32, idx: usize, val: u8) {
    let mut bytes = word.to_be_bytes();
    bytes[idx] = val;
    *word = u32::from_be_bytes(bytes);
}

/// Text output through the TX ring, for firmware that logs to the host the
/// way the demo applications do.
///
/// A formatted write that hits a full ring under flow control surfaces as
/// `fmt::Error`; on hardware the firmware would instead raise the doorbell
/// and spin until the host drains or releases flow control.
pub struct TxConsole<'a> {
    fifo: &'a mut FifoMirror,
}

impl<'a> TxConsole<'a> {
    pub fn new(fifo: &'a mut FifoMirror) -> Self {
        TxConsole { fifo }
    }
}

impl fmt::Write for TxConsole<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for &b in s.as_bytes() {
            self.fifo.push_tx(b).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}
