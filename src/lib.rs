//! # Roverlink
//!
//! Communication layer of the vehicle: the links that feed the control loop
//! and carry its output to the motor controller.
//!
//! ## Features
//!
//! - **Instruction channel**: newline-delimited JSON over TCP, classified into
//!   five instruction categories with newest-wins, flag-gated hand-off
//! - **Emergency stop**: a literal `STOP` line halts the channel and raises a
//!   lock-free predicate
//! - **Bus slave engine**: interrupt-driven I2C slave exchanging name/value
//!   batches with a length-prefixed, two-phase read handshake
//! - **Embedded-friendly bus side**: no heap, fixed 32-byte buffers, all
//!   foreground access inside critical sections; builds without `std`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roverlink::{ChannelConfig, InstructionChannel};
//!
//! # async fn run() -> Result<(), roverlink::channel::ChannelError> {
//! let channel = InstructionChannel::listen(&ChannelConfig::default()).await?;
//!
//! while !channel.has_lost_connection() && !channel.emergency_received() {
//!     if channel.new_manual_instruction() {
//!         let inst = channel.manual_drive_instruction();
//!         println!("throttle {} steering {}", inst.throttle, inst.steering);
//!     }
//!     tokio::time::sleep(std::time::Duration::from_millis(20)).await;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`channel`] - TCP reader task, getters, predicates and response writers
//! - [`instruction`] - instruction records and frame classification
//! - [`mailbox`] - single-slot, newest-wins hand-off
//! - [`bus`] - TWI slave state machine, frame codec and register glue
//! - [`config`] - channel and bus configuration

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod bus;
pub mod config;

#[cfg(feature = "std")]
pub mod channel;
#[cfg(feature = "std")]
pub mod instruction;
#[cfg(feature = "std")]
pub mod mailbox;

// Re-export main public types for convenience
pub use bus::{BusSlave, MessagePair, SharedBusSlave};
pub use config::BusConfig;

#[cfg(feature = "std")]
pub use channel::InstructionChannel;
#[cfg(feature = "std")]
pub use config::ChannelConfig;
#[cfg(feature = "std")]
pub use instruction::{Instruction, InstructionKind};
