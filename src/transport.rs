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

//! Register transport and doorbell seams.
//!
//! The FIFO session does not talk to hardware directly. It consumes two
//! traits: [`Transport`], a byte-addressed register window (on deployed
//! boards an I2C bridge into the FPGA decode), and [`Doorbell`], the
//! edge-triggered interrupt line the ZPU raises when one protocol unit of
//! work is complete (on deployed boards a GPIO configured for rising-edge
//! events).
//!
//! This module also provides the error-wrapping access helpers the session
//! and client are built on, converting raw `std::io::Error`s into
//! [`ZpulinkError`] values that carry the bus address and length context.

use crate::error::ZpulinkError;
use log::trace;
use std::time::Duration;

/// A byte-addressed register window shared between host and device.
///
/// Implementations are expected to be slow (hundreds of microseconds per
/// transaction is normal for an I2C-mapped window); the session above this
/// trait is written to minimize the number of calls, not the number of bytes.
pub trait Transport {
    /// Read `buf.len()` consecutive bytes starting at `addr`.
    fn bus_read(&mut self, addr: u16, buf: &mut [u8]) -> std::io::Result<()>;

    /// Write `data` to consecutive addresses starting at `addr`.
    fn bus_write(&mut self, addr: u16, data: &[u8]) -> std::io::Result<()>;
}

/// The edge-triggered completion line driven by the device.
///
/// The FPGA deasserts the line automatically once the host reads the register
/// the device armed it with, so implementations only need to surface edges;
/// they never write to the device.
pub trait Doorbell {
    /// Block until the device raises the line, or until `timeout` expires.
    ///
    /// # Returns: `std::io::Result<bool>`
    /// * `Ok(true)` - An edge arrived
    /// * `Ok(false)` - The timeout expired first (never returned when
    ///   `timeout` is `None`)
    /// * `Err(e)` - The underlying event source failed
    fn wait_for_edge(&mut self, timeout: Option<Duration>) -> std::io::Result<bool>;

    /// Discard any edge that is already pending, so a later
    /// [`wait_for_edge`](Doorbell::wait_for_edge) only observes new activity.
    fn drain_pending(&mut self) -> std::io::Result<()>;
}

/// Read a single register byte.
///
/// # Returns: `Result<u8, ZpulinkError>`
/// * `Ok(u8)` - The byte at `addr`
/// * `Err(ZpulinkError::BusRead)` - The transport failed
pub(crate) fn peek8(t: &mut impl Transport, addr: u16) -> Result<u8, ZpulinkError> {
    let mut buf = [0u8; 1];
    trace!("peek8 {addr:#06x}");
    t.bus_read(addr, &mut buf)
        .map_err(|e| ZpulinkError::BusRead { addr, len: 1, e })?;
    Ok(buf[0])
}

/// Write a single register byte.
///
/// # Returns: `Result<(), ZpulinkError>`
/// * `Ok(())` - Write succeeded
/// * `Err(ZpulinkError::BusWrite)` - The transport failed
pub(crate) fn poke8(t: &mut impl Transport, addr: u16, val: u8) -> Result<(), ZpulinkError> {
    trace!("poke8 {addr:#06x} <- {val:#04x}");
    t.bus_write(addr, &[val])
        .map_err(|e| ZpulinkError::BusWrite { addr, len: 1, e })
}

/// Read a big-endian 32-bit word, as the ZPU lays its descriptor fields out.
///
/// # Returns: `Result<u32, ZpulinkError>`
/// * `Ok(u32)` - The word at `addr`
/// * `Err(ZpulinkError::BusRead)` - The transport failed
pub(crate) fn peek32_be(t: &mut impl Transport, addr: u16) -> Result<u32, ZpulinkError> {
    let mut buf = [0u8; 4];
    trace!("peek32 {addr:#06x}");
    t.bus_read(addr, &mut buf)
        .map_err(|e| ZpulinkError::BusRead { addr, len: 4, e })?;
    Ok(u32::from_be_bytes(buf))
}

/// Read a contiguous byte stream into `buf`.
///
/// # Returns: `Result<(), ZpulinkError>`
/// * `Ok(())` - `buf` filled
/// * `Err(ZpulinkError::BusRead)` - The transport failed
pub(crate) fn peek_stream(
    t: &mut impl Transport,
    addr: u16,
    buf: &mut [u8],
) -> Result<(), ZpulinkError> {
    trace!("peek_stream {addr:#06x} len {}", buf.len());
    t.bus_read(addr, buf).map_err(|e| ZpulinkError::BusRead {
        addr,
        len: buf.len(),
        e,
    })
}

/// Write a contiguous byte stream from `data`.
///
/// # Returns: `Result<(), ZpulinkError>`
/// * `Ok(())` - Write succeeded
/// * `Err(ZpulinkError::BusWrite)` - The transport failed
pub(crate) fn poke_stream(
    t: &mut impl Transport,
    addr: u16,
    data: &[u8],
) -> Result<(), ZpulinkError> {
    trace!("poke_stream {addr:#06x} len {}", data.len());
    t.bus_write(addr, data).map_err(|e| ZpulinkError::BusWrite {
        addr,
        len: data.len(),
        e,
    })
}
