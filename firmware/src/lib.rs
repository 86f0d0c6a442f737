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

//! Device-side model of the ZPU FIFO link and MUXBUS bridge.
//!
//! This crate is the firmware half of the protocol the `zpulink` host crate
//! speaks: the shared-RAM FIFO descriptor as the ZPU publishes it, and the
//! request parser plus bus executor of the MUXBUS bridge application. It is
//! `no_std` so the same code serves both the soft-core build and, linked
//! into host tests, as a cycle-free stand-in for real hardware.

#![cfg_attr(not(test), no_std)]

pub mod fifo;
pub mod muxbus;

pub use fifo::{FifoMirror, TxConsole, TxFull, RX_CAP, TX_CAP};
pub use muxbus::{step, Access, Action, BusDriver, Command, Completion, MuxbusServer, ServerError, State};
