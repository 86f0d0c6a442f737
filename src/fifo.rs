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

//! Host side of the bidirectional FIFO link into ZPU RAM.
//!
//! The ZPU firmware keeps a pair of single-producer/single-consumer byte
//! rings in its RAM and publishes their location through a bootstrap pointer.
//! Because the host can only reach that RAM through discrete register
//! transactions, each side caches the other's cursor and refreshes it with an
//! explicit bus read; staleness between refreshes is part of the design.
//! Each cursor has exactly one writer: the device owns TX `put` and RX `get`,
//! the host owns TX `get` and RX `put`.
//!
//! TX and RX are named from the ZPU's point of view throughout: TX carries
//! device-to-host data, RX carries host-to-device data.

use crate::config;
use crate::error::ZpulinkError;
use crate::transport::{Doorbell, Transport, peek8, peek32_be, peek_stream, poke8, poke_stream};
use log::{debug, info, trace};
use std::time::Duration;

/// Whether the device may stall waiting for the host to drain its TX ring.
///
/// With flow control enabled no device output is lost, but firmware that
/// produces faster than the host consumes will busy-wait. With it disabled
/// the device keeps running and the oldest unread TX data is overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    Enabled,
    Disabled,
}

/// An established link to the FIFO descriptor of running ZPU firmware.
///
/// All six ring addresses are derived once, at init, from the discovered
/// descriptor base; they are never re-read afterwards. The session holds the
/// transport and doorbell exclusively, which is what makes the
/// one-writer-per-cursor rule hold: no other code can touch the rings while
/// the session lives.
#[derive(Debug)]
pub struct FifoSession<T: Transport, D: Doorbell> {
    transport: T,
    doorbell: D,
    /// Cached copy of the descriptor flags word, as read at init and patched
    /// with the requested flow-control bit.
    flags: u32,
    desc_addr: u16,
    tx_cap: u16,
    rx_cap: u16,
    tx_put_addr: u16,
    tx_get_addr: u16,
    tx_dat_addr: u16,
    rx_put_addr: u16,
    rx_get_addr: u16,
    rx_dat_addr: u16,
    /// Host-owned tail into the device TX ring.
    tx_get: u16,
    /// Host-owned head into the device RX ring.
    rx_put: u16,
    /// Last-known free space in the device RX ring. Allowed to be stale; it
    /// only ever understates the real free space.
    rx_space: u16,
    /// Set on a fatal protocol error. Every later operation fails with
    /// `Desync` until the caller builds a fresh session.
    poisoned: bool,
}

impl<T: Transport, D: Doorbell> FifoSession<T, D> {
    /// Discover the FIFO descriptor and establish a session.
    ///
    /// Reads the bootstrap pointer, validates it, patches the flow-control
    /// bit in the flags word, derives the ring addresses, and primes the
    /// cursors: the TX tail is forced to the device's current TX head
    /// (discarding anything a previous session left queued) and the RX free
    /// space is computed from the device's RX cursors. Any doorbell edge
    /// already pending is drained so the first wait only sees new activity.
    ///
    /// # Arguments
    ///
    /// * `transport` - Register window reaching the ZPU RAM
    /// * `doorbell` - Completion line driven by the ZPU
    /// * `flow` - Whether the device may stall on a full TX ring
    ///
    /// # Returns: `Result<FifoSession, ZpulinkError>`
    /// * `Ok(FifoSession)` - Link established
    /// * `Err(ZpulinkError::ConnectionRefused)` - Bootstrap pointer absent or
    ///   outside ZPU RAM; firmware is not running
    /// * `Err(ZpulinkError::Descriptor)` - Advertised ring capacity is zero
    ///   or above [`config::FIFO_MAX_CAP`], or a device cursor lies outside
    ///   the advertised rings
    /// * `Err(ZpulinkError::BusRead)`/`Err(ZpulinkError::BusWrite)` - The
    ///   transport failed
    pub fn init(mut transport: T, mut doorbell: D, flow: FlowControl) -> Result<Self, ZpulinkError> {
        let ptr = peek32_be(&mut transport, config::ZPU_RAM_START + config::BOOTSTRAP_OFS)?;
        if ptr == 0 || ptr >= config::ZPU_RAM_SZ as u32 {
            return Err(ZpulinkError::ConnectionRefused(format!(
                "bootstrap pointer {ptr:#010x} is outside ZPU RAM; is the ZPU application loaded and running?"
            )));
        }
        let desc_addr = config::ZPU_RAM_START + ptr as u16;
        debug!("FIFO descriptor at {desc_addr:#06x}");

        let mut flags = peek32_be(&mut transport, desc_addr)?;
        match flow {
            FlowControl::Enabled => flags &= !config::FLAG_NOFLOW,
            FlowControl::Disabled => flags |= config::FLAG_NOFLOW,
        }
        // Only the flags MSB is writable from the host; the capacity fields
        // below it belong to the firmware.
        poke8(&mut transport, desc_addr, (flags >> 24) as u8)?;

        let tx_cap = (flags & config::FLAG_TX_CAP_MASK) as u16;
        let rx_cap = ((flags >> config::FLAG_RX_CAP_SHIFT) & config::FLAG_TX_CAP_MASK) as u16;
        for (name, cap) in [("TX", tx_cap), ("RX", rx_cap)] {
            if cap == 0 || cap > config::FIFO_MAX_CAP {
                return Err(ZpulinkError::Descriptor(format!(
                    "{name} capacity {cap} is outside 1..={}",
                    config::FIFO_MAX_CAP
                )));
            }
        }

        let tx_put_addr = desc_addr + config::OFS_TX_PUT_LSB;
        let tx_get_addr = desc_addr + config::OFS_TX_GET_LSB;
        let tx_dat_addr = desc_addr + config::OFS_TX_DAT;
        let rx_put_addr = tx_dat_addr + tx_cap + 3;
        let rx_get_addr = rx_put_addr + 4;
        let rx_dat_addr = rx_get_addr + 1;

        // Prime the cursors: adopt the device's RX head, and zero out the TX
        // ring by setting our tail to the device's head.
        let rx_put = peek8(&mut transport, rx_put_addr)? as u16;
        let tx_get = peek8(&mut transport, tx_put_addr)? as u16;
        if tx_get >= tx_cap || rx_put >= rx_cap {
            return Err(ZpulinkError::Descriptor(format!(
                "device cursors (TX head {tx_get}, RX head {rx_put}) are outside the advertised rings"
            )));
        }
        poke8(&mut transport, tx_get_addr, tx_get as u8)?;

        doorbell
            .drain_pending()
            .map_err(|e| ZpulinkError::Doorbell { e })?;

        let mut session = FifoSession {
            transport,
            doorbell,
            flags,
            desc_addr,
            tx_cap,
            rx_cap,
            tx_put_addr,
            tx_get_addr,
            tx_dat_addr,
            rx_put_addr,
            rx_get_addr,
            rx_dat_addr,
            tx_get,
            rx_put,
            rx_space: 0,
            poisoned: false,
        };
        session.recalc_rx_space()?;
        info!("FIFO session up: descriptor {desc_addr:#06x}, tx cap {tx_cap}, rx cap {rx_cap}");
        Ok(session)
    }

    /// Read available device-to-host bytes into `buf`, without blocking.
    ///
    /// Refreshes the device's TX head, copies whatever sits between our tail
    /// and that head (wrapping at the ring boundary in at most two bus
    /// reads), and writes the advanced tail back. That write-back is the
    /// acknowledgment that returns the space to the device-side producer.
    ///
    /// # Arguments
    ///
    /// * `buf` - Destination; at most `buf.len()` bytes are copied
    ///
    /// # Returns: `Result<usize, ZpulinkError>`
    /// * `Ok(0)` - The ring is empty (not an error) or `buf` is empty
    /// * `Ok(n)` - `n` bytes copied
    /// * `Err(ZpulinkError::Desync)` - The device's TX head is outside the
    ///   ring, or the cursors differ but nothing could be copied; the session
    ///   is poisoned
    /// * `Err(ZpulinkError::BusRead)`/`Err(ZpulinkError::BusWrite)` - The
    ///   transport failed
    pub fn get(&mut self, buf: &mut [u8]) -> Result<usize, ZpulinkError> {
        self.check_poisoned()?;
        let tx_put = peek8(&mut self.transport, self.tx_put_addr)? as u16;
        if tx_put >= self.tx_cap {
            self.poisoned = true;
            return Err(ZpulinkError::Desync(format!(
                "device TX head {tx_put} is outside its {}-byte ring",
                self.tx_cap
            )));
        }
        if tx_put == self.tx_get || buf.is_empty() {
            return Ok(0);
        }

        let mut copied = 0usize;
        // Head behind tail: drain the chunk through the end of the ring
        // first, which may leave the tail wrapped to zero.
        if tx_put < self.tx_get {
            let n = ((self.tx_cap - self.tx_get) as usize).min(buf.len());
            peek_stream(
                &mut self.transport,
                self.tx_dat_addr + self.tx_get,
                &mut buf[..n],
            )?;
            self.tx_get = (self.tx_get + n as u16) % self.tx_cap;
            copied = n;
        }
        if tx_put >= self.tx_get {
            let n = ((tx_put - self.tx_get) as usize).min(buf.len() - copied);
            if n > 0 {
                peek_stream(
                    &mut self.transport,
                    self.tx_dat_addr + self.tx_get,
                    &mut buf[copied..copied + n],
                )?;
                self.tx_get += n as u16;
                copied += n;
            }
        }
        poke8(&mut self.transport, self.tx_get_addr, self.tx_get as u8)?;

        if copied == 0 {
            // Cannot happen with consistent cursors; treat as corruption.
            self.poisoned = true;
            return Err(ZpulinkError::Desync(format!(
                "TX cursors differ (put {tx_put}, get {}) but no bytes were copied",
                self.tx_get
            )));
        }
        trace!("fifo get: {copied} bytes");
        Ok(copied)
    }

    /// Write host-to-device bytes from `data`, without blocking.
    ///
    /// At most the last-known RX free space is written, in at most two bus
    /// writes when the chunk wraps the ring boundary, then the advanced head
    /// is published and the free space recomputed from a fresh read of the
    /// device's RX tail. A short (or zero) count is an expected outcome, not
    /// an error; callers deliver large payloads by looping.
    ///
    /// # Arguments
    ///
    /// * `data` - Bytes to queue for the device
    ///
    /// # Returns: `Result<usize, ZpulinkError>`
    /// * `Ok(n)` - `n` bytes queued (possibly 0 when the ring is full)
    /// * `Err(ZpulinkError::BusRead)`/`Err(ZpulinkError::BusWrite)` - The
    ///   transport failed
    pub fn put(&mut self, data: &[u8]) -> Result<usize, ZpulinkError> {
        self.check_poisoned()?;
        let mut remaining = data.len().min(self.rx_space as usize);
        let mut written = 0usize;
        if remaining > 0 {
            if self.rx_put as usize + remaining > self.rx_cap as usize {
                let n = (self.rx_cap - self.rx_put) as usize;
                poke_stream(
                    &mut self.transport,
                    self.rx_dat_addr + self.rx_put,
                    &data[..n],
                )?;
                self.rx_put = 0;
                written = n;
                remaining -= n;
            }
            if remaining > 0 {
                poke_stream(
                    &mut self.transport,
                    self.rx_dat_addr + self.rx_put,
                    &data[written..written + remaining],
                )?;
                self.rx_put = (self.rx_put + remaining as u16) % self.rx_cap;
                written += remaining;
            }
            self.rx_space -= written as u16;
            poke8(&mut self.transport, self.rx_put_addr, self.rx_put as u8)?;
        }
        self.recalc_rx_space()?;
        trace!("fifo put: {written} of {} bytes", data.len());
        Ok(written)
    }

    /// Tear the session down.
    ///
    /// Sets the flow-control-disable bit and publishes it, so the device can
    /// never again stall waiting for a host that is gone. Queued data is not
    /// flushed. The doorbell resource is released with the session.
    ///
    /// # Returns: `Result<(), ZpulinkError>`
    /// * `Ok(())` - Flags published
    /// * `Err(ZpulinkError::BusWrite)` - The transport failed
    pub fn deinit(mut self) -> Result<(), ZpulinkError> {
        self.flags |= config::FLAG_NOFLOW;
        poke8(
            &mut self.transport,
            self.desc_addr,
            (self.flags >> 24) as u8,
        )?;
        info!("FIFO session closed");
        Ok(())
    }

    /// TX (device-to-host) ring capacity advertised by the descriptor.
    pub fn tx_capacity(&self) -> u16 {
        self.tx_cap
    }

    /// RX (host-to-device) ring capacity advertised by the descriptor.
    pub fn rx_capacity(&self) -> u16 {
        self.rx_cap
    }

    /// Last-known free space in the device's RX ring. May understate the real
    /// value until the next [`put`](FifoSession::put) refreshes it.
    pub fn rx_free_space(&self) -> u16 {
        self.rx_space
    }

    /// Recompute the cached RX free space from the device's RX tail.
    ///
    /// Skips the bus read while the cached value already reports the ring
    /// completely empty; it cannot get any better than that. A tail outside
    /// the ring would otherwise inflate the free space and let `put` overrun,
    /// so it is fatal.
    fn recalc_rx_space(&mut self) -> Result<(), ZpulinkError> {
        if self.rx_space == self.rx_cap - 1 {
            return Ok(());
        }
        let rx_get = peek8(&mut self.transport, self.rx_get_addr)? as u16;
        if rx_get >= self.rx_cap {
            self.poisoned = true;
            return Err(ZpulinkError::Desync(format!(
                "device RX tail {rx_get} is outside its {}-byte ring",
                self.rx_cap
            )));
        }
        self.rx_space = if rx_get <= self.rx_put {
            self.rx_cap - (self.rx_put - rx_get) - 1
        } else {
            rx_get - self.rx_put - 1
        };
        Ok(())
    }

    /// Block until the device raises the doorbell.
    ///
    /// With `timeout` of `None` this waits forever, exactly like the original
    /// driver. On expiry the session is poisoned: a missing doorbell means
    /// the device is wedged mid-transaction and the rings can no longer be
    /// trusted.
    pub(crate) fn wait_doorbell(&mut self, timeout: Option<Duration>) -> Result<(), ZpulinkError> {
        self.check_poisoned()?;
        match self.doorbell.wait_for_edge(timeout) {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.poisoned = true;
                Err(ZpulinkError::Timeout(timeout.unwrap_or_default()))
            }
            Err(e) => Err(ZpulinkError::Doorbell { e }),
        }
    }

    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }

    fn check_poisoned(&self) -> Result<(), ZpulinkError> {
        if self.poisoned {
            return Err(ZpulinkError::Desync(
                "session is poisoned by an earlier fatal error; reinitialize it".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat RAM image standing in for the FPGA register window.
    struct RamTransport {
        ram: Vec<u8>,
    }

    impl RamTransport {
        fn new() -> Self {
            RamTransport {
                ram: vec![0; 2 * config::ZPU_RAM_SZ as usize],
            }
        }

        fn store32_be(&mut self, addr: u16, val: u32) {
            self.ram[addr as usize..addr as usize + 4].copy_from_slice(&val.to_be_bytes());
        }
    }

    impl Transport for RamTransport {
        fn bus_read(&mut self, addr: u16, buf: &mut [u8]) -> std::io::Result<()> {
            let a = addr as usize;
            buf.copy_from_slice(&self.ram[a..a + buf.len()]);
            Ok(())
        }

        fn bus_write(&mut self, addr: u16, data: &[u8]) -> std::io::Result<()> {
            let a = addr as usize;
            self.ram[a..a + data.len()].copy_from_slice(data);
            Ok(())
        }
    }

    struct NullDoorbell;

    impl Doorbell for NullDoorbell {
        fn wait_for_edge(&mut self, _timeout: Option<Duration>) -> std::io::Result<bool> {
            Ok(false)
        }

        fn drain_pending(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn ram_with_descriptor(desc_ofs: u32, flags: u32) -> RamTransport {
        let mut ram = RamTransport::new();
        ram.store32_be(config::ZPU_RAM_START + config::BOOTSTRAP_OFS, desc_ofs);
        ram.store32_be(config::ZPU_RAM_START + desc_ofs as u16, flags);
        ram
    }

    #[test]
    fn init_rejects_null_bootstrap_pointer() {
        let err = FifoSession::init(RamTransport::new(), NullDoorbell, FlowControl::Enabled)
            .err()
            .unwrap();
        assert!(matches!(err, ZpulinkError::ConnectionRefused(_)), "{err}");
    }

    #[test]
    fn init_rejects_pointer_outside_ram() {
        let mut ram = RamTransport::new();
        ram.store32_be(
            config::ZPU_RAM_START + config::BOOTSTRAP_OFS,
            config::ZPU_RAM_SZ as u32,
        );
        let err = FifoSession::init(ram, NullDoorbell, FlowControl::Enabled)
            .err()
            .unwrap();
        assert!(matches!(err, ZpulinkError::ConnectionRefused(_)), "{err}");
    }

    #[test]
    fn init_rejects_oversized_capacity() {
        // 2048-byte TX ring: legal in the flags encoding, rejected by policy.
        let ram = ram_with_descriptor(0x100, 0x800 | 16 << config::FLAG_RX_CAP_SHIFT);
        let err = FifoSession::init(ram, NullDoorbell, FlowControl::Enabled)
            .err()
            .unwrap();
        assert!(matches!(err, ZpulinkError::Descriptor(_)), "{err}");
    }

    #[test]
    fn init_rejects_zero_capacity() {
        let ram = ram_with_descriptor(0x100, 256);
        let err = FifoSession::init(ram, NullDoorbell, FlowControl::Enabled)
            .err()
            .unwrap();
        assert!(matches!(err, ZpulinkError::Descriptor(_)), "{err}");
    }

    #[test]
    fn init_publishes_flow_control_choice() {
        let flags = 256 | 16 << config::FLAG_RX_CAP_SHIFT | config::FLAG_NOFLOW;
        let session = FifoSession::init(
            ram_with_descriptor(0x100, flags),
            NullDoorbell,
            FlowControl::Enabled,
        )
        .unwrap();
        // Enabled flow control clears the no-flow bit in the published MSB.
        let msb = session.transport.ram[(config::ZPU_RAM_START + 0x100) as usize];
        assert_eq!(msb & ((config::FLAG_NOFLOW >> 24) as u8), 0);
        assert_eq!(session.tx_capacity(), 256);
        assert_eq!(session.rx_capacity(), 16);
        assert_eq!(session.rx_free_space(), 15);
    }

    #[test]
    fn init_discards_stale_tx_data() {
        let flags = 256 | 16 << config::FLAG_RX_CAP_SHIFT;
        let mut ram = ram_with_descriptor(0x100, flags);
        // Device TX head mid-ring, as left by a previous session.
        let desc = config::ZPU_RAM_START + 0x100;
        ram.ram[(desc + config::OFS_TX_PUT_LSB) as usize] = 42;
        let mut session = FifoSession::init(ram, NullDoorbell, FlowControl::Enabled).unwrap();
        // Tail was forced to the head, so nothing is readable.
        let mut buf = [0u8; 8];
        assert_eq!(session.get(&mut buf).unwrap(), 0);
        // And the acknowledgment was written back to the device.
        assert_eq!(
            session.transport.ram[(desc + config::OFS_TX_GET_LSB) as usize],
            42
        );
    }

    #[test]
    fn init_rejects_cursor_outside_ring() {
        // 32-byte TX ring, but the device TX head claims slot 40.
        let flags = 32 | 16 << config::FLAG_RX_CAP_SHIFT;
        let mut ram = ram_with_descriptor(0x100, flags);
        let desc = config::ZPU_RAM_START + 0x100;
        ram.ram[(desc + config::OFS_TX_PUT_LSB) as usize] = 40;
        let err = FifoSession::init(ram, NullDoorbell, FlowControl::Enabled)
            .err()
            .unwrap();
        assert!(matches!(err, ZpulinkError::Descriptor(_)), "{err}");
    }

    #[test]
    fn get_poisons_on_corrupt_tx_head() {
        let flags = 32 | 16 << config::FLAG_RX_CAP_SHIFT;
        let mut session = FifoSession::init(
            ram_with_descriptor(0x100, flags),
            NullDoorbell,
            FlowControl::Enabled,
        )
        .unwrap();
        // Device corrupts its own TX head mid-session.
        let desc = config::ZPU_RAM_START + 0x100;
        session.transport.ram[(desc + config::OFS_TX_PUT_LSB) as usize] = 40;
        let err = session.get(&mut [0u8; 8]).unwrap_err();
        assert!(matches!(err, ZpulinkError::Desync(_)), "{err}");
        // The session stays dead afterwards.
        assert!(matches!(
            session.put(&[1]),
            Err(ZpulinkError::Desync(_))
        ));
    }

    #[test]
    fn put_poisons_on_corrupt_rx_tail() {
        let flags = 32 | 16 << config::FLAG_RX_CAP_SHIFT;
        let mut session = FifoSession::init(
            ram_with_descriptor(0x100, flags),
            NullDoorbell,
            FlowControl::Enabled,
        )
        .unwrap();
        // Device corrupts its RX tail; 16-byte ring, slot 200 claimed.
        let rx_get_addr = config::ZPU_RAM_START + 0x100 + config::OFS_TX_DAT + 32 + 3 + 4;
        session.transport.ram[rx_get_addr as usize] = 200;
        let err = session.put(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ZpulinkError::Desync(_)), "{err}");
        assert!(matches!(
            session.get(&mut [0u8; 8]),
            Err(ZpulinkError::Desync(_))
        ));
    }

    #[test]
    fn poisoned_session_refuses_everything() {
        let flags = 256 | 16 << config::FLAG_RX_CAP_SHIFT;
        let mut session = FifoSession::init(
            ram_with_descriptor(0x100, flags),
            NullDoorbell,
            FlowControl::Enabled,
        )
        .unwrap();
        session.poison();
        assert!(matches!(
            session.get(&mut [0u8; 4]),
            Err(ZpulinkError::Desync(_))
        ));
        assert!(matches!(
            session.put(&[1, 2, 3]),
            Err(ZpulinkError::Desync(_))
        ));
    }
}
