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

//! Host-side driver for the ZPU soft-core FIFO link and MUXBUS bridge.
//!
//! A family of single-board computers carries an FPGA-resident soft
//! processor (the ZPU) whose RAM the host can only reach through a slow
//! I2C-mapped register window. This crate implements the host half of the
//! transport that makes the ZPU usable: a pair of shared-memory byte rings
//! discovered through a bootstrap pointer ([`fifo::FifoSession`]), and the
//! synchronous 16-bit remote-register protocol layered on top of them
//! ([`muxbus::MuxbusClient`]).
//!
//! The physical bus and interrupt line are consumed through the
//! [`transport::Transport`] and [`transport::Doorbell`] traits, so board
//! glue (I2C bridges, libgpiod event lines) stays outside this crate, and
//! tests can run against a simulated device. The device half lives in the
//! companion `zpulink-firmware` crate.
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (`trace`, `debug`, `info`, `warn`,
//!   `error` or `off`) in binaries that install `env_logger`
//!
//! # Examples
//!
//! ```rust,no_run
//! # use zpulink::fifo::{FifoSession, FlowControl};
//! # use zpulink::muxbus::MuxbusClient;
//! # fn example(
//! #     i2c: impl zpulink::transport::Transport,
//! #     irq: impl zpulink::transport::Doorbell,
//! # ) -> Result<(), zpulink::error::ZpulinkError> {
//! let session = FifoSession::init(i2c, irq, FlowControl::Enabled)?;
//! let mut mb = MuxbusClient::new(session);
//! let id = mb.read16(0x0000)?;
//! mb.write16(0x0002, 0xBEEF)?;
//! mb.into_session().deinit()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fifo;
pub mod muxbus;
pub mod transport;

pub use error::ZpulinkError;
pub use fifo::{FifoSession, FlowControl};
pub use muxbus::MuxbusClient;
pub use transport::{Doorbell, Transport};
