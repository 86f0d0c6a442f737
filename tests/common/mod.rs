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

//! In-process mock of the FPGA side of the link.
//!
//! [`MockDevice`] wires the firmware crate's [`FifoMirror`] and
//! [`MuxbusServer`] behind the host crate's [`Transport`] and [`Doorbell`]
//! traits, so a [`zpulink::FifoSession`] talks to real firmware logic with
//! no hardware, threads, or sleeps. Register reads and writes land in an
//! [`EchoBus`]; the bridge is pumped synchronously whenever a host store
//! completes, which makes every doorbell observable and countable.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use zpulink::config::ZPU_RAM_START;
use zpulink::{Doorbell, Transport};
use zpulink_firmware::{Access, BusDriver, FifoMirror, MuxbusServer};

/// ZPU-relative address the mock publishes its descriptor at.
pub const DESC_OFS: u16 = 0x40;

/// Register file behind the bridge. Reads at the configured stream address
/// return an incrementing counter, modelling peripherals whose read pointer
/// auto-advances under burst access.
#[derive(Default)]
pub struct EchoBus {
    regs: HashMap<u16, u16>,
    stream: Option<(u16, u16)>,
    latched: Option<(u16, Access)>,
    pub latch_count: u32,
}

impl EchoBus {
    pub fn preload(&mut self, adr: u16, dat: u16) {
        self.regs.insert(adr, dat);
    }

    pub fn stream_at(&mut self, adr: u16, first: u16) {
        self.stream = Some((adr, first));
    }

    pub fn reg(&self, adr: u16) -> Option<u16> {
        self.regs.get(&adr).copied()
    }
}

impl BusDriver for EchoBus {
    fn latch(&mut self, adr: u16, access: Access) {
        self.latched = Some((adr, access));
        self.latch_count += 1;
    }

    fn write(&mut self, dat: u16) {
        let (adr, _) = self.latched.expect("write strobe without latch");
        self.regs.insert(adr, dat);
    }

    fn read(&mut self) -> u16 {
        let (adr, _) = self.latched.expect("read strobe without latch");
        if let Some((stream_adr, next)) = self.stream
            && stream_adr == adr
        {
            self.stream = Some((stream_adr, next.wrapping_add(1)));
            return next;
        }
        self.regs.get(&adr).copied().unwrap_or(0)
    }
}

pub struct MockDevice {
    pub fifo: FifoMirror,
    pub server: MuxbusServer,
    pub bus: EchoBus,
    /// Doorbell edges raised but not yet consumed by the host.
    pending_edges: u32,
    pub total_doorbells: u32,
    /// When false the bridge never runs; raw-FIFO tests drive the rings
    /// directly instead.
    pub server_enabled: bool,
    /// When false the RAM image reads as all zeroes, like a ZPU with no
    /// application loaded.
    pub bootstrapped: bool,
}

impl MockDevice {
    fn new() -> Self {
        MockDevice {
            fifo: FifoMirror::new(DESC_OFS),
            server: MuxbusServer::new(),
            bus: EchoBus::default(),
            pending_edges: 0,
            total_doorbells: 0,
            server_enabled: true,
            bootstrapped: true,
        }
    }

    fn pump(&mut self) {
        if !self.server_enabled {
            return;
        }
        let mut doorbells = 0;
        self.server
            .service(&mut self.bus, &mut self.fifo, || doorbells += 1)
            .expect("mock bridge faulted");
        self.pending_edges += doorbells;
        self.total_doorbells += doorbells;
    }
}

/// Shared handle to the mock; clones are both the session's transport and
/// its doorbell line.
#[derive(Clone)]
pub struct MockHandle(Rc<RefCell<MockDevice>>);

impl std::fmt::Debug for MockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHandle").finish_non_exhaustive()
    }
}

impl MockHandle {
    pub fn new() -> Self {
        MockHandle(Rc::new(RefCell::new(MockDevice::new())))
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockDevice) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }

    /// Queue device-to-host bytes and raise one doorbell, the way firmware
    /// console output would.
    pub fn device_push(&self, data: &[u8]) {
        let mut dev = self.0.borrow_mut();
        for &b in data {
            dev.fifo.push_tx(b).expect("mock TX ring overrun");
        }
        dev.pending_edges += 1;
        dev.total_doorbells += 1;
    }

    /// Drain everything the host has queued on the RX ring.
    pub fn device_pop_all(&self) -> Vec<u8> {
        let mut dev = self.0.borrow_mut();
        let mut out = Vec::new();
        while let Some(b) = dev.fifo.pop_rx() {
            out.push(b);
        }
        out
    }
}

impl Transport for MockHandle {
    fn bus_read(&mut self, addr: u16, buf: &mut [u8]) -> io::Result<()> {
        let dev = self.0.borrow();
        for (i, slot) in buf.iter_mut().enumerate() {
            let ofs = addr - ZPU_RAM_START + i as u16;
            *slot = if dev.bootstrapped { dev.fifo.load(ofs) } else { 0 };
        }
        Ok(())
    }

    fn bus_write(&mut self, addr: u16, data: &[u8]) -> io::Result<()> {
        {
            let mut dev = self.0.borrow_mut();
            for (i, &b) in data.iter().enumerate() {
                dev.fifo.store(addr - ZPU_RAM_START + i as u16, b);
            }
        }
        self.0.borrow_mut().pump();
        Ok(())
    }
}

impl Doorbell for MockHandle {
    fn wait_for_edge(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        let mut dev = self.0.borrow_mut();
        if dev.pending_edges > 0 {
            dev.pending_edges -= 1;
            return Ok(true);
        }
        match timeout {
            Some(_) => Ok(false),
            None => panic!("indefinite doorbell wait with no edge pending; the mock would hang"),
        }
    }

    fn drain_pending(&mut self) -> io::Result<()> {
        self.0.borrow_mut().pending_edges = 0;
        Ok(())
    }
}
