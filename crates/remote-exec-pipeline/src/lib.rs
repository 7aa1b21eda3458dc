//! Code transmission pipeline for connected devices.
//!
//! Provides:
//! - Device type table (primitive allow-lists, language configuration)
//! - `Compiler` trait and `LanguageContext`
//! - Compiled program model and binary assembler
//! - Display protocol mapping

pub mod compiler;
pub mod device_types;
pub mod display;
pub mod program;
pub mod transmit;

pub use compiler::{Compiler, LanguageContext, SourceFiles};
pub use device_types::{DeviceType, InternalFunction};
pub use display::display_notification;
pub use program::{AssembleError, CompiledProgram, Function, Instruction, Opcode, Operand, assemble};
pub use transmit::prepare;
