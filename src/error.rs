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

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ZpulinkError {
    /// The bootstrap pointer was absent or outside ZPU RAM. Compatible
    /// firmware is not running; reload it before retrying.
    #[error("ZpulinkError::ConnectionRefused: {0}")]
    ConnectionRefused(String),
    /// The discovered FIFO descriptor is malformed (e.g. a ring capacity
    /// above the supported maximum).
    #[error("ZpulinkError::Descriptor: FIFO descriptor is not usable: {0}")]
    Descriptor(String),
    #[error(
        "ZpulinkError::BusRead: An IO error occurred when reading {len} bytes at {addr:#06x}: {e}"
    )]
    BusRead {
        addr: u16,
        len: usize,
        e: std::io::Error,
    },
    #[error(
        "ZpulinkError::BusWrite: An IO error occurred when writing {len} bytes at {addr:#06x}: {e}"
    )]
    BusWrite {
        addr: u16,
        len: usize,
        e: std::io::Error,
    },
    #[error("ZpulinkError::Doorbell: An IO error occurred waiting on the doorbell line: {e}")]
    Doorbell { e: std::io::Error },
    /// The device did not raise the doorbell within the caller-supplied
    /// timeout. The session is poisoned; reinitialize it before reuse.
    #[error("ZpulinkError::Timeout: device did not complete the transaction within {0:?}")]
    Timeout(Duration),
    /// A ring cursor invariant was violated, or an operation was attempted on
    /// a poisoned session. Fatal; the session must be reinitialized.
    #[error("ZpulinkError::Desync: {0}")]
    Desync(String),
    #[error("ZpulinkError::Argument: {0}")]
    Argument(String),
}
