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

//! MUXBUS remote-register client.
//!
//! Requests are 3 bytes (read) or 5 bytes (write): a command byte carrying
//! the read/write flag, the 16-bit width flag and the burst-count-minus-one,
//! then the big-endian register address, then (writes only) the big-endian
//! data word. The device answers a read burst of N words with exactly 2N
//! bytes and one doorbell; a write is acknowledged by the doorbell alone, and
//! the host performs an empty FIFO read purely to clear the interrupt.
//!
//! The protocol has no request identifier and no pipelining: at most one
//! request may be outstanding. Holding the client by `&mut` is what enforces
//! that here; putting the client behind a `Mutex` is the caller's job when
//! several logical users share one session.

use crate::config;
use crate::error::ZpulinkError;
use crate::fifo::FifoSession;
use crate::transport::{Doorbell, Transport};
use log::trace;
use std::time::Duration;

/// Synchronous 16-bit register access over an established [`FifoSession`].
pub struct MuxbusClient<T: Transport, D: Doorbell> {
    session: FifoSession<T, D>,
    timeout: Option<Duration>,
}

impl<T: Transport, D: Doorbell> MuxbusClient<T, D> {
    /// Wrap a FIFO session. With no timeout configured, a completed request
    /// is waited for indefinitely, matching the original driver.
    pub fn new(session: FifoSession<T, D>) -> Self {
        MuxbusClient {
            session,
            timeout: None,
        }
    }

    /// Bound every doorbell wait. A device that misses the deadline yields
    /// [`ZpulinkError::Timeout`] and poisons the session, because a wedged
    /// transaction leaves the rings in an unknowable state.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Read one 16-bit register.
    ///
    /// # Arguments
    ///
    /// * `addr` - Remote MUXBUS register address
    ///
    /// # Returns: `Result<u16, ZpulinkError>`
    /// * `Ok(u16)` - The register value
    /// * `Err(ZpulinkError::Timeout)` - Doorbell deadline missed (session
    ///   poisoned)
    /// * `Err(ZpulinkError::Desync)` - Response shorter than promised, or
    ///   the session was already poisoned
    pub fn read16(&mut self, addr: u16) -> Result<u16, ZpulinkError> {
        trace!("muxbus read16 {addr:#06x}");
        let req = [
            config::MB_READ | config::MB_16BIT,
            (addr >> 8) as u8,
            addr as u8,
        ];
        let mut resp = [0u8; 2];
        self.transact(&req, &mut resp)?;
        Ok(u16::from_be_bytes(resp))
    }

    /// Write one 16-bit register.
    ///
    /// Returns only after the device signals that the remote bus write
    /// strobe has completed; there is no partial success.
    ///
    /// # Arguments
    ///
    /// * `addr` - Remote MUXBUS register address
    /// * `data` - Value to write
    ///
    /// # Returns: `Result<(), ZpulinkError>`
    /// * `Ok(())` - Write strobed on the remote bus
    /// * `Err(ZpulinkError::Timeout)` - Doorbell deadline missed (session
    ///   poisoned)
    pub fn write16(&mut self, addr: u16, data: u16) -> Result<(), ZpulinkError> {
        trace!("muxbus write16 {addr:#06x} <- {data:#06x}");
        let req = [
            config::MB_WRITE | config::MB_16BIT,
            (addr >> 8) as u8,
            addr as u8,
            (data >> 8) as u8,
            data as u8,
        ];
        self.put_all(&req)?;
        self.session.wait_doorbell(self.timeout)?;
        // No payload follows a write; the FIFO read is still required so the
        // FPGA deasserts the interrupt line.
        let mut scratch = [0u8; 2];
        self.session.get(&mut scratch)?;
        Ok(())
    }

    /// Read `count` consecutive 16-bit words in one burst.
    ///
    /// The device latches the address once and strobes `count` reads against
    /// it, so this is only meaningful for registers whose peripheral
    /// auto-advances an internal pointer (e.g. sample stream windows). The
    /// whole burst completes under a single doorbell event.
    ///
    /// # Arguments
    ///
    /// * `addr` - Remote MUXBUS register address, latched once
    /// * `count` - Words to read, `1..=`[`config::MB_MAX_BURST`]
    ///
    /// # Returns: `Result<Vec<u16>, ZpulinkError>`
    /// * `Ok(Vec<u16>)` - Exactly `count` words in request order
    /// * `Err(ZpulinkError::Argument)` - `count` outside `1..=64`; rejected
    ///   before anything touches the transport
    /// * `Err(ZpulinkError::Timeout)` - Doorbell deadline missed (session
    ///   poisoned)
    pub fn read16_burst(&mut self, addr: u16, count: usize) -> Result<Vec<u16>, ZpulinkError> {
        if count == 0 || count > config::MB_MAX_BURST {
            return Err(ZpulinkError::Argument(format!(
                "burst count {count} is outside 1..={}",
                config::MB_MAX_BURST
            )));
        }
        trace!("muxbus read16 burst of {count} at {addr:#06x}");
        let req = [
            config::MB_READ | config::MB_16BIT | (((count - 1) as u8) << config::MB_BURST_SHIFT),
            (addr >> 8) as u8,
            addr as u8,
        ];
        let mut resp = vec![0u8; 2 * count];
        self.transact(&req, &mut resp)?;
        Ok(resp
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Borrow the underlying session, e.g. to inspect ring capacities.
    pub fn session(&self) -> &FifoSession<T, D> {
        &self.session
    }

    /// Give the raw byte-stream session back, for firmware that frames the
    /// FIFO itself instead of speaking MUXBUS.
    pub fn into_session(self) -> FifoSession<T, D> {
        self.session
    }

    /// Send a request, wait for the single doorbell covering it, and collect
    /// the exact response length into `resp`.
    fn transact(&mut self, req: &[u8], resp: &mut [u8]) -> Result<(), ZpulinkError> {
        self.put_all(req)?;
        self.session.wait_doorbell(self.timeout)?;
        let mut filled = 0usize;
        while filled < resp.len() {
            let n = self.session.get(&mut resp[filled..])?;
            if n == 0 {
                // The doorbell promised a fully queued response.
                self.session.poison();
                return Err(ZpulinkError::Desync(format!(
                    "doorbell raised but only {filled} of {} response bytes were queued",
                    resp.len()
                )));
            }
            filled += n;
        }
        Ok(())
    }

    /// Deliver the whole request, looping over the partial writes the RX
    /// ring's free space dictates.
    fn put_all(&mut self, data: &[u8]) -> Result<(), ZpulinkError> {
        let mut sent = 0usize;
        while sent < data.len() {
            sent += self.session.put(&data[sent..])?;
        }
        Ok(())
    }
}
