//! Compiled program model and the binary assembler.
//!
//! Layout (little-endian):
//!
//! ```text
//! "SVM1" | u32 entry | u32 function_count | function*
//! function    = u8 stack_size | u8 env_size | u8 num_args | u32 count | instruction*
//! instruction = u8 opcode | operand*
//! operand     = i32 | f64 | u32 len + utf8
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header magic.
pub const MAGIC: &[u8; 4] = b"SVM1";

/// Operand shape required by an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    Int,
    Float,
    Str,
}

/// Instruction operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Int(i32),
    Float(f64),
    Str(String),
}

impl Operand {
    const fn operand_type(&self) -> OperandType {
        match self {
            Self::Int(_) => OperandType::Int,
            Self::Float(_) => OperandType::Float,
            Self::Str(_) => OperandType::Str,
        }
    }
}

/// VM opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    /// Push an integer constant.
    Lgci = 1,
    /// Push a float constant.
    Lgcf64 = 2,
    Lgcb0 = 3,
    Lgcb1 = 4,
    /// Push `undefined`.
    Lgcu = 5,
    /// Push `null`.
    Lgcn = 6,
    /// Push a string constant.
    Lgcs = 7,
    Popg = 8,
    Addg = 9,
    Subg = 10,
    Mulg = 11,
    Divg = 12,
    Modg = 13,
    Notg = 14,
    Ltg = 15,
    Gtg = 16,
    Leg = 17,
    Geg = 18,
    Eqg = 19,
    Neqg = 20,
    /// Load local `index`.
    Ldlg = 21,
    /// Store local `index`.
    Stlg = 22,
    /// Load `index` from the environment `depth` levels up.
    Ldpg = 23,
    Stpg = 24,
    /// Branch by `offset` if true.
    Brt = 25,
    /// Branch by `offset` if false.
    Brf = 26,
    Br = 27,
    /// Create a closure over function `index`.
    Newc = 28,
    /// Call a closure with `argc` arguments.
    Call = 29,
    /// Call VM primitive `index` with `argc` arguments.
    Callp = 30,
    /// Call device primitive `index` with `argc` arguments.
    Callv = 31,
    Retg = 32,
    Retu = 33,
    Dup = 34,
}

impl Opcode {
    /// Operands this opcode takes, in order.
    #[must_use]
    pub const fn operands(self) -> &'static [OperandType] {
        use OperandType::{Float, Int, Str};
        match self {
            Self::Lgci | Self::Ldlg | Self::Stlg | Self::Brt | Self::Brf | Self::Br
            | Self::Newc | Self::Call => &[Int],
            Self::Lgcf64 => &[Float],
            Self::Lgcs => &[Str],
            Self::Ldpg | Self::Stpg | Self::Callp | Self::Callv => &[Int, Int],
            _ => &[],
        }
    }
}

/// One instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    #[serde(default)]
    pub operands: Vec<Operand>,
}

impl Instruction {
    #[must_use]
    pub const fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            operands: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_operands(opcode: Opcode, operands: impl IntoIterator<Item = Operand>) -> Self {
        Self {
            opcode,
            operands: operands.into_iter().collect(),
        }
    }
}

/// One compiled function.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Function {
    pub stack_size: u8,
    pub env_size: u8,
    pub num_args: u8,
    pub instructions: Vec<Instruction>,
}

/// Compiler output for a whole program.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompiledProgram {
    /// Index of the entry function.
    pub entry: u32,
    pub functions: Vec<Function>,
}

/// Assembly error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssembleError {
    #[error("Entry function {entry} out of range ({count} functions)")]
    Entry { entry: u32, count: usize },
    #[error("Function {function}, instruction {index}: {opcode:?} expects {expected} operand(s)")]
    Operands {
        function: usize,
        index: usize,
        opcode: Opcode,
        expected: usize,
    },
    #[error("Program too large")]
    TooLarge,
}

fn len_u32(len: usize) -> Result<u32, AssembleError> {
    u32::try_from(len).map_err(|_| AssembleError::TooLarge)
}

/// Serialize a compiled program into the device's binary format.
///
/// # Errors
/// Returns error if the entry index is out of range, an instruction's
/// operands do not match its opcode, or a length overflows `u32`.
pub fn assemble(program: &CompiledProgram) -> Result<Bytes, AssembleError> {
    let count = program.functions.len();
    if program.entry as usize >= count {
        return Err(AssembleError::Entry {
            entry: program.entry,
            count,
        });
    }

    let mut buf = BytesMut::with_capacity(16 + count * 32);
    buf.put_slice(MAGIC);
    buf.put_u32_le(program.entry);
    buf.put_u32_le(len_u32(count)?);

    for (function_index, function) in program.functions.iter().enumerate() {
        buf.put_u8(function.stack_size);
        buf.put_u8(function.env_size);
        buf.put_u8(function.num_args);
        buf.put_u32_le(len_u32(function.instructions.len())?);

        for (index, instruction) in function.instructions.iter().enumerate() {
            let expected = instruction.opcode.operands();
            let matches = expected.len() == instruction.operands.len()
                && expected
                    .iter()
                    .zip(&instruction.operands)
                    .all(|(want, got)| *want == got.operand_type());
            if !matches {
                return Err(AssembleError::Operands {
                    function: function_index,
                    index,
                    opcode: instruction.opcode,
                    expected: expected.len(),
                });
            }

            buf.put_u8(instruction.opcode as u8);
            for operand in &instruction.operands {
                match operand {
                    Operand::Int(v) => buf.put_i32_le(*v),
                    Operand::Float(v) => buf.put_f64_le(*v),
                    Operand::Str(s) => {
                        buf.put_u32_le(len_u32(s.len())?);
                        buf.put_slice(s.as_bytes());
                    }
                }
            }
        }
    }

    Ok(buf.freeze())
}
