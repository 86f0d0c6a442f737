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

//! Board and protocol constants.
//!
//! Addresses here are from the perspective of the FPGA top-level decode, i.e.
//! what the register transport sees. ZPU-internal addresses are the same
//! values minus [`ZPU_RAM_START`].

/// Start of the ZPU RAM window in the FPGA register map.
pub const ZPU_RAM_START: u16 = 0x2000;

/// Size of the ZPU RAM window in bytes.
pub const ZPU_RAM_SZ: u16 = 0x2000;

/// ZPU-relative offset of the 4-byte bootstrap pointer to the FIFO
/// descriptor. The slot sits inside the ZPU interrupt vector table, which the
/// firmware does not otherwise use.
pub const BOOTSTRAP_OFS: u16 = 0x3C;

/// Upper bound on either ring capacity. A descriptor advertising more than
/// this is assumed to be corrupt or incompatible.
pub const FIFO_MAX_CAP: u16 = 256;

/// Bits 11:0 of the descriptor flags word hold the TX ring capacity.
pub const FLAG_TX_CAP_MASK: u32 = 0xFFF;

/// Bits 23:12 of the descriptor flags word hold the RX ring capacity.
pub const FLAG_RX_CAP_SHIFT: u32 = 12;

/// Flags bit the host sets to release the device from TX flow control.
/// While clear, the device stalls rather than drop TX data.
pub const FLAG_NOFLOW: u32 = 1 << 25;

/// Flags bit reserved for firmware applications to request host attention.
pub const FLAG_ATTENTION: u32 = 1 << 26;

/// Byte offset of the TX `put` cursor LSB from the descriptor base.
pub const OFS_TX_PUT_LSB: u16 = 7;

/// Byte offset of the TX `get` cursor LSB from the descriptor base.
pub const OFS_TX_GET_LSB: u16 = 11;

/// Byte offset of the TX data array from the descriptor base. The RX field
/// offsets depend on the TX capacity and are derived at session init.
pub const OFS_TX_DAT: u16 = 12;

/// Request byte bit 0: 1 = MUXBUS read, 0 = MUXBUS write.
pub const MB_READ: u8 = 1 << 0;

/// Request byte bit 0 cleared: MUXBUS write.
pub const MB_WRITE: u8 = 0;

/// Request byte bit 1: 1 = 16-bit access. No deployed firmware implements
/// 8-bit access.
pub const MB_16BIT: u8 = 1 << 1;

/// Request byte bits 7:2 hold the burst word count minus one (reads only).
pub const MB_BURST_SHIFT: u8 = 2;

/// Largest read burst a single request can carry, limited by the 6-bit count
/// field.
pub const MB_MAX_BURST: usize = 64;
