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

//! MUXBUS bridge state machine.
//!
//! The firmware's only job in the bridge application is to pull request
//! bytes off the RX ring, drive the external MUXBUS with the mandated
//! signal timing, and queue response bytes on the TX ring. The protocol
//! logic is a pure transition function, [`step`], over an explicit
//! [`State`]; everything with a side effect (bus strobes, ring pushes, the
//! doorbell) happens in [`MuxbusServer`], which executes the [`Action`]s
//! `step` emits. That split keeps the protocol testable without hardware or
//! timing delays.
//!
//! A burst read latches the address once and strobes the bus repeatedly,
//! which serves peripherals whose internal read pointer auto-advances. All
//! 2N response bytes are queued before the single doorbell for the burst,
//! so the host never observes a partial word.

use crate::fifo::{FifoMirror, TxFull};

/// Request byte bit 0: 1 = read, 0 = write.
pub const MB_READ: u8 = 1 << 0;

/// Request byte bit 1: 1 = 16-bit. The bridge implements nothing else; the
/// TS-8820 it was built for has 16-bit registers only.
pub const MB_16BIT: u8 = 1 << 1;

/// Request byte bits 7:2: burst word count minus one.
pub const MB_BURST_SHIFT: u8 = 2;

// MUXBUS signal timing in main-clock (63 MHz) counts, derived from the
// worst-case 0xF0FF standard MUXBUS configuration word. Each guideline count
// is in 12.5 MHz bus clocks; 6 main clocks per bus clock rounds the 5.04
// ratio up.
pub const TP_ALE: u16 = (0x07 + 1) * 6;
pub const TH_ADR: u16 = (0x21 + 1) * 6;
pub const TSU_DAT: u16 = (0x03 + 1) * 6;
pub const TP_CS: u16 = (0x03 + 1) * 6;
pub const TH_DAT: u16 = (0x03 + 1) * 6;

/// Transfer direction, decoded from the command byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// A decoded command byte. `words` is the burst length (1..=64); it is
/// carried for writes too but only reads use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub access: Access,
    pub words: u8,
}

/// Parser position within a request packet. Accumulated bytes ride along in
/// the state, so `(State, byte)` is all a transition needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    GetCmd,
    GetAdrHigh {
        cmd: Command,
    },
    GetAdrLow {
        cmd: Command,
        adr_hi: u8,
    },
    GetDatHigh,
    GetDatLow {
        dat_hi: u8,
    },
}

/// Side effect a transition asks its executor to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    /// Drive the address latch sequence. For a read command the executor
    /// follows up with the full burst immediately; no further request bytes
    /// are coming.
    Latch { adr: u16, cmd: Command },
    /// Drive the write strobe with the accumulated data word, then raise
    /// the doorbell.
    Write { dat: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ServerError {
    /// The command byte requested an 8-bit access, which no bridge firmware
    /// implements.
    #[error("8-bit MUXBUS access is not implemented (command byte {0:#04x})")]
    UnsupportedWidth(u8),
    /// The TX ring cannot hold the full burst response while flow control
    /// is active. On hardware the firmware stalls until the host drains;
    /// the model refuses instead so the condition is observable.
    #[error("TX ring cannot hold a {words}-word response under flow control")]
    Backpressure { words: u8 },
}

/// Advance the request parser by one byte.
///
/// Pure: no bus access, no ring access, no timing. The executor interprets
/// the returned [`Action`].
///
/// # Returns: `Result<(State, Action), ServerError>`
/// * `Ok((next, action))` - Parser advanced
/// * `Err(ServerError::UnsupportedWidth)` - Command byte selected an 8-bit
///   access
pub fn step(state: State, byte: u8) -> Result<(State, Action), ServerError> {
    match state {
        State::GetCmd => {
            if byte & MB_16BIT == 0 {
                return Err(ServerError::UnsupportedWidth(byte));
            }
            let cmd = Command {
                access: if byte & MB_READ != 0 {
                    Access::Read
                } else {
                    Access::Write
                },
                // 6-bit field: the decoded burst can never exceed 64, so an
                // oversized burst is unrepresentable past this point.
                words: (byte >> MB_BURST_SHIFT) + 1,
            };
            Ok((State::GetAdrHigh { cmd }, Action::None))
        }
        State::GetAdrHigh { cmd } => Ok((State::GetAdrLow { cmd, adr_hi: byte }, Action::None)),
        State::GetAdrLow { cmd, adr_hi } => {
            let adr = u16::from_be_bytes([adr_hi, byte]);
            let next = match cmd.access {
                // Read: the burst completes inside the executor.
                Access::Read => State::GetCmd,
                Access::Write => State::GetDatHigh,
            };
            Ok((next, Action::Latch { adr, cmd }))
        }
        State::GetDatHigh => Ok((State::GetDatLow { dat_hi: byte }, Action::None)),
        State::GetDatLow { dat_hi } => Ok((
            State::GetCmd,
            Action::Write {
                dat: u16::from_be_bytes([dat_hi, byte]),
            },
        )),
    }
}

/// External register bus driven by the bridge.
///
/// Implementations own the pin wiggling and the TP_ALE/TH_ADR/TSU_DAT/
/// TP_CS/TH_DAT delays; the state machine only dictates the order of
/// operations. `read` and `write` strobe against the most recently latched
/// address, and a burst calls `read` repeatedly without re-latching.
pub trait BusDriver {
    /// Drive the address latch sequence and set the transfer direction.
    fn latch(&mut self, adr: u16, access: Access);

    /// Strobe a 16-bit write of `dat` at the latched address.
    fn write(&mut self, dat: u16);

    /// Strobe a 16-bit read at the latched address.
    fn read(&mut self) -> u16;
}

/// One protocol unit of work finished; the doorbell must be raised exactly
/// once per completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// A write strobed on the remote bus. No payload was queued; the
    /// doorbell alone tells the host.
    WriteDone,
    /// A read burst fully queued `words * 2` response bytes.
    ReadDone { words: u8 },
}

/// Executor tying [`step`] to a [`BusDriver`] and the [`FifoMirror`].
#[derive(Debug, Default)]
pub struct MuxbusServer {
    state: State,
}

impl MuxbusServer {
    pub fn new() -> Self {
        MuxbusServer::default()
    }

    /// Current parser state, for diagnostics.
    pub fn state(&self) -> State {
        self.state
    }

    /// Feed one request byte through the parser and execute the resulting
    /// action.
    ///
    /// # Returns: `Result<Option<Completion>, ServerError>`
    /// * `Ok(None)` - Byte consumed, transaction still in flight
    /// * `Ok(Some(completion))` - A transaction finished; raise the doorbell
    /// * `Err(e)` - Typed fault; the parser resets to `GetCmd`, but a torn
    ///   packet has no in-protocol resynchronization short of a device reset
    pub fn feed(
        &mut self,
        byte: u8,
        bus: &mut impl BusDriver,
        fifo: &mut FifoMirror,
    ) -> Result<Option<Completion>, ServerError> {
        let (next, action) = match step(self.state, byte) {
            Ok(r) => r,
            Err(e) => {
                self.state = State::GetCmd;
                return Err(e);
            }
        };
        self.state = next;
        match action {
            Action::None => Ok(None),
            Action::Write { dat } => {
                bus.write(dat);
                Ok(Some(Completion::WriteDone))
            }
            Action::Latch { adr, cmd } => {
                bus.latch(adr, cmd.access);
                match cmd.access {
                    Access::Write => Ok(None),
                    Access::Read => self.run_burst(cmd.words, bus, fifo).map(Some),
                }
            }
        }
    }

    /// Drain every queued request byte, raising `doorbell` once per
    /// completion. This is the body of the firmware main loop; the loop
    /// itself just spins on it.
    pub fn service(
        &mut self,
        bus: &mut impl BusDriver,
        fifo: &mut FifoMirror,
        mut doorbell: impl FnMut(),
    ) -> Result<(), ServerError> {
        while let Some(byte) = fifo.pop_rx() {
            if self.feed(byte, bus, fifo)?.is_some() {
                doorbell();
            }
        }
        Ok(())
    }

    /// Strobe `words` reads at the latched address and queue the response,
    /// high byte first per word. The whole response is queued before the
    /// completion is reported, so the doorbell covers a fully readable
    /// burst.
    fn run_burst(
        &mut self,
        words: u8,
        bus: &mut impl BusDriver,
        fifo: &mut FifoMirror,
    ) -> Result<Completion, ServerError> {
        if fifo.flow_control_enabled() && fifo.tx_free() < 2 * words as usize {
            self.state = State::GetCmd;
            return Err(ServerError::Backpressure { words });
        }
        for _ in 0..words {
            let dat = bus.read();
            let [hi, lo] = dat.to_be_bytes();
            self.push(hi, words, fifo)?;
            self.push(lo, words, fifo)?;
        }
        Ok(Completion::ReadDone { words })
    }

    fn push(&mut self, byte: u8, words: u8, fifo: &mut FifoMirror) -> Result<(), ServerError> {
        fifo.push_tx(byte).map_err(|TxFull| {
            self.state = State::GetCmd;
            ServerError::Backpressure { words }
        })
    }
}
