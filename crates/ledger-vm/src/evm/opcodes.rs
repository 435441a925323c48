//! # Opcodes
//!
//! The closed instruction set and its decode table.
//!
//! Decoding goes through [`OPCODE_TABLE`], a 256-entry array indexed by the
//! raw byte. Bytes without an instruction map to `None`, which the
//! interpreter reports as `InvalidOpcode`.

use crate::domain::entities::EvmVersion;

/// One decoded instruction.
///
/// The numbered families carry their index: `Push(n)` reads `n` immediate
/// bytes (0..=32), `Dup(n)` / `Swap(n)` use 1..=16, `Log(n)` has `n` topics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Opcode {
    // 0x00 - Stop and Arithmetic
    Stop,
    Add,
    Mul,
    Sub,
    Div,
    SDiv,
    Mod,
    SMod,
    AddMod,
    MulMod,
    Exp,
    SignExtend,

    // 0x10 - Comparison & Bitwise
    Lt,
    Gt,
    SLt,
    SGt,
    Eq,
    IsZero,
    And,
    Or,
    Xor,
    Not,
    Byte,
    Shl,
    Shr,
    Sar,

    // 0x20
    Keccak256,

    // 0x30 - Environment
    Address,
    Balance,
    Origin,
    Caller,
    CallValue,
    CallDataLoad,
    CallDataSize,
    CallDataCopy,
    CodeSize,
    CodeCopy,
    GasPrice,
    ExtCodeSize,
    ExtCodeCopy,
    ReturnDataSize,
    ReturnDataCopy,
    ExtCodeHash,

    // 0x40 - Block
    BlockHash,
    Coinbase,
    Timestamp,
    Number,
    PrevRandao,
    GasLimit,
    ChainId,
    SelfBalance,
    BaseFee,

    // 0x50 - Stack, Memory, Storage, Flow
    Pop,
    MLoad,
    MStore,
    MStore8,
    SLoad,
    SStore,
    Jump,
    JumpI,
    Pc,
    MSize,
    Gas,
    JumpDest,

    // 0x5F..0x9F
    Push(u8),
    Dup(u8),
    Swap(u8),

    // 0xA0
    Log(u8),

    // 0xF0 - System
    Create,
    Call,
    CallCode,
    Return,
    DelegateCall,
    Create2,
    StaticCall,
    Revert,
    Invalid,
    SelfDestruct,
}

impl Opcode {
    /// Decodes one byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => Self::Stop,
            0x01 => Self::Add,
            0x02 => Self::Mul,
            0x03 => Self::Sub,
            0x04 => Self::Div,
            0x05 => Self::SDiv,
            0x06 => Self::Mod,
            0x07 => Self::SMod,
            0x08 => Self::AddMod,
            0x09 => Self::MulMod,
            0x0A => Self::Exp,
            0x0B => Self::SignExtend,

            0x10 => Self::Lt,
            0x11 => Self::Gt,
            0x12 => Self::SLt,
            0x13 => Self::SGt,
            0x14 => Self::Eq,
            0x15 => Self::IsZero,
            0x16 => Self::And,
            0x17 => Self::Or,
            0x18 => Self::Xor,
            0x19 => Self::Not,
            0x1A => Self::Byte,
            0x1B => Self::Shl,
            0x1C => Self::Shr,
            0x1D => Self::Sar,

            0x20 => Self::Keccak256,

            0x30 => Self::Address,
            0x31 => Self::Balance,
            0x32 => Self::Origin,
            0x33 => Self::Caller,
            0x34 => Self::CallValue,
            0x35 => Self::CallDataLoad,
            0x36 => Self::CallDataSize,
            0x37 => Self::CallDataCopy,
            0x38 => Self::CodeSize,
            0x39 => Self::CodeCopy,
            0x3A => Self::GasPrice,
            0x3B => Self::ExtCodeSize,
            0x3C => Self::ExtCodeCopy,
            0x3D => Self::ReturnDataSize,
            0x3E => Self::ReturnDataCopy,
            0x3F => Self::ExtCodeHash,

            0x40 => Self::BlockHash,
            0x41 => Self::Coinbase,
            0x42 => Self::Timestamp,
            0x43 => Self::Number,
            0x44 => Self::PrevRandao,
            0x45 => Self::GasLimit,
            0x46 => Self::ChainId,
            0x47 => Self::SelfBalance,
            0x48 => Self::BaseFee,

            0x50 => Self::Pop,
            0x51 => Self::MLoad,
            0x52 => Self::MStore,
            0x53 => Self::MStore8,
            0x54 => Self::SLoad,
            0x55 => Self::SStore,
            0x56 => Self::Jump,
            0x57 => Self::JumpI,
            0x58 => Self::Pc,
            0x59 => Self::MSize,
            0x5A => Self::Gas,
            0x5B => Self::JumpDest,

            0x5F..=0x7F => Self::Push(byte - 0x5F),
            0x80..=0x8F => Self::Dup(byte - 0x7F),
            0x90..=0x9F => Self::Swap(byte - 0x8F),
            0xA0..=0xA4 => Self::Log(byte - 0xA0),

            0xF0 => Self::Create,
            0xF1 => Self::Call,
            0xF2 => Self::CallCode,
            0xF3 => Self::Return,
            0xF4 => Self::DelegateCall,
            0xF5 => Self::Create2,
            0xFA => Self::StaticCall,
            0xFD => Self::Revert,
            0xFE => Self::Invalid,
            0xFF => Self::SelfDestruct,

            _ => return None,
        })
    }

    /// Number of stack words the instruction consumes.
    #[must_use]
    pub const fn stack_inputs(self) -> usize {
        match self {
            Self::Stop
            | Self::Address
            | Self::Origin
            | Self::Caller
            | Self::CallValue
            | Self::CallDataSize
            | Self::CodeSize
            | Self::GasPrice
            | Self::ReturnDataSize
            | Self::Coinbase
            | Self::Timestamp
            | Self::Number
            | Self::PrevRandao
            | Self::GasLimit
            | Self::ChainId
            | Self::SelfBalance
            | Self::BaseFee
            | Self::Pc
            | Self::MSize
            | Self::Gas
            | Self::JumpDest
            | Self::Push(_)
            | Self::Invalid => 0,

            Self::IsZero
            | Self::Not
            | Self::Balance
            | Self::CallDataLoad
            | Self::ExtCodeSize
            | Self::ExtCodeHash
            | Self::BlockHash
            | Self::Pop
            | Self::MLoad
            | Self::SLoad
            | Self::Jump
            | Self::SelfDestruct => 1,

            Self::Add
            | Self::Mul
            | Self::Sub
            | Self::Div
            | Self::SDiv
            | Self::Mod
            | Self::SMod
            | Self::Exp
            | Self::SignExtend
            | Self::Lt
            | Self::Gt
            | Self::SLt
            | Self::SGt
            | Self::Eq
            | Self::And
            | Self::Or
            | Self::Xor
            | Self::Byte
            | Self::Shl
            | Self::Shr
            | Self::Sar
            | Self::Keccak256
            | Self::MStore
            | Self::MStore8
            | Self::SStore
            | Self::JumpI
            | Self::Return
            | Self::Revert => 2,

            Self::AddMod
            | Self::MulMod
            | Self::CallDataCopy
            | Self::CodeCopy
            | Self::ReturnDataCopy
            | Self::Create => 3,

            Self::ExtCodeCopy | Self::Create2 => 4,
            Self::DelegateCall | Self::StaticCall => 6,
            Self::Call | Self::CallCode => 7,

            Self::Dup(n) => n as usize,
            Self::Swap(n) => n as usize + 1,
            Self::Log(n) => n as usize + 2,
        }
    }

    /// Returns true if this opcode terminates execution.
    #[must_use]
    pub const fn is_terminating(self) -> bool {
        matches!(
            self,
            Self::Stop | Self::Return | Self::Revert | Self::Invalid | Self::SelfDestruct
        )
    }

    /// Instructions rejected in a static frame. CALL is rejected only
    /// when it carries value.
    #[must_use]
    pub const fn is_state_modifying(self) -> bool {
        matches!(
            self,
            Self::SStore | Self::Log(_) | Self::Create | Self::Create2 | Self::SelfDestruct
        )
    }

    /// First revision that defines the instruction.
    #[must_use]
    pub const fn introduced_in(self) -> EvmVersion {
        match self {
            Self::Push(0) => EvmVersion::Shanghai,
            Self::BaseFee => EvmVersion::London,
            _ => EvmVersion::Berlin,
        }
    }
}

/// Decode table indexed by opcode byte.
#[allow(clippy::cast_possible_truncation)]
pub const OPCODE_TABLE: [Option<Opcode>; 256] = {
    let mut table = [None; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = Opcode::from_byte(i as u8);
        i += 1;
    }
    table
};

/// Decodes `byte` for `version`; instructions from later revisions are
/// undefined.
#[must_use]
pub fn decode(byte: u8, version: EvmVersion) -> Option<Opcode> {
    OPCODE_TABLE[byte as usize].filter(|op| op.introduced_in() <= version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_from_byte() {
        assert_eq!(Opcode::from_byte(0x00), Some(Opcode::Stop));
        assert_eq!(Opcode::from_byte(0x01), Some(Opcode::Add));
        assert_eq!(Opcode::from_byte(0x5F), Some(Opcode::Push(0)));
        assert_eq!(Opcode::from_byte(0x60), Some(Opcode::Push(1)));
        assert_eq!(Opcode::from_byte(0x7F), Some(Opcode::Push(32)));
        assert_eq!(Opcode::from_byte(0x80), Some(Opcode::Dup(1)));
        assert_eq!(Opcode::from_byte(0x9F), Some(Opcode::Swap(16)));
        assert_eq!(Opcode::from_byte(0xA4), Some(Opcode::Log(4)));
        assert_eq!(Opcode::from_byte(0xF1), Some(Opcode::Call));
        assert_eq!(Opcode::from_byte(0x0C), None);
        assert_eq!(Opcode::from_byte(0x5C), None);
        assert_eq!(Opcode::from_byte(0xA5), None);
    }

    #[test]
    fn test_table_matches_decoder() {
        for byte in 0..=255u8 {
            assert_eq!(OPCODE_TABLE[byte as usize], Opcode::from_byte(byte));
        }
        let defined = OPCODE_TABLE.iter().filter(|op| op.is_some()).count();
        assert_eq!(defined, 144);
    }

    #[test]
    fn test_stack_inputs() {
        assert_eq!(Opcode::Add.stack_inputs(), 2);
        assert_eq!(Opcode::Dup(1).stack_inputs(), 1);
        assert_eq!(Opcode::Dup(16).stack_inputs(), 16);
        assert_eq!(Opcode::Swap(1).stack_inputs(), 2);
        assert_eq!(Opcode::Log(4).stack_inputs(), 6);
        assert_eq!(Opcode::Call.stack_inputs(), 7);
        assert_eq!(Opcode::StaticCall.stack_inputs(), 6);
    }

    #[test]
    fn test_version_gating() {
        assert_eq!(decode(0x5F, EvmVersion::Berlin), None);
        assert_eq!(decode(0x5F, EvmVersion::Shanghai), Some(Opcode::Push(0)));
        assert_eq!(decode(0x48, EvmVersion::Berlin), None);
        assert_eq!(decode(0x48, EvmVersion::London), Some(Opcode::BaseFee));
        assert_eq!(decode(0x60, EvmVersion::Berlin), Some(Opcode::Push(1)));
    }

    #[test]
    fn test_flags() {
        assert!(Opcode::Stop.is_terminating());
        assert!(Opcode::Revert.is_terminating());
        assert!(!Opcode::Add.is_terminating());
        assert!(Opcode::SStore.is_state_modifying());
        assert!(Opcode::Log(0).is_state_modifying());
        assert!(!Opcode::SLoad.is_state_modifying());
        assert!(!Opcode::Call.is_state_modifying());
    }
}
