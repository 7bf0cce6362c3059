//! Opcodes, opcode classes and data types.

/// An instruction opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[derive(strum::IntoStaticStr, strum::EnumString, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Op {
    // Moves
    Mov,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Mad,
    Fma,
    Min,
    Max,
    Abs,
    Neg,

    // Logic and shifts
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,

    // Comparison and selection
    Set,
    Selp,

    Cvt,

    // Special function unit
    Rcp,
    Rsq,
    Sin,
    Cos,
    Ex2,
    Lg2,
    Linterp,
    Pinterp,

    // Bitfield
    Popcnt,
    Bfind,
    Extbf,
    Insbf,

    // Memory
    Ld,
    St,
    Atom,
    Tex,
    Txq,
    Suld,
    Sust,

    // Control flow
    Bra,
    Call,
    Ret,
    Exit,
    Brk,
    Cont,
    Join,

    // Fences
    Bar,
    Membar,

    // Quad control
    Quadon,
    Quadpop,

    Discard,
    Emit,

    // Other
    Nop,
    Shfl,
    Rdsv,
    Quadop,
    Vote,
    Pixld,
    Afetch,
}

impl Op {
    /// Returns the assembly mnemonic.
    #[inline]
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Returns the functional class.
    #[must_use]
    pub const fn class(self) -> OpClass {
        match self {
            Self::Mov => OpClass::Move,
            Self::Add
            | Self::Sub
            | Self::Mul
            | Self::Mad
            | Self::Fma
            | Self::Min
            | Self::Max
            | Self::Abs
            | Self::Neg => OpClass::Arith,
            Self::And | Self::Or | Self::Xor | Self::Not => OpClass::Logic,
            Self::Shl | Self::Shr => OpClass::Shift,
            Self::Set | Self::Selp => OpClass::Compare,
            Self::Cvt => OpClass::Convert,
            Self::Rcp
            | Self::Rsq
            | Self::Sin
            | Self::Cos
            | Self::Ex2
            | Self::Lg2
            | Self::Linterp
            | Self::Pinterp => OpClass::Sfu,
            Self::Popcnt | Self::Bfind | Self::Extbf | Self::Insbf => OpClass::Bitfield,
            Self::Ld => OpClass::Load,
            Self::St => OpClass::Store,
            Self::Atom => OpClass::Atomic,
            Self::Tex | Self::Txq => OpClass::Texture,
            Self::Suld | Self::Sust => OpClass::Surface,
            Self::Bra
            | Self::Call
            | Self::Ret
            | Self::Exit
            | Self::Brk
            | Self::Cont
            | Self::Join => OpClass::Flow,
            Self::Bar | Self::Membar => OpClass::Barrier,
            Self::Quadon | Self::Quadpop | Self::Discard | Self::Emit => OpClass::Control,
            Self::Nop
            | Self::Shfl
            | Self::Rdsv
            | Self::Quadop
            | Self::Vote
            | Self::Pixld
            | Self::Afetch => OpClass::Other,
        }
    }

    /// Returns `true` for fences, which must drain the pipeline before the next instruction.
    #[inline]
    #[must_use]
    pub const fn is_fence(self) -> bool {
        matches!(self.class(), OpClass::Barrier)
    }
}

/// The functional class of an [`Op`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpClass {
    Move,
    Arith,
    Logic,
    Shift,
    Compare,
    Convert,
    Sfu,
    Bitfield,
    Load,
    Store,
    Atomic,
    Texture,
    Surface,
    Flow,
    Control,
    Barrier,
    Other,
}

/// The data type an instruction operates on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, derive_more::Display)]
pub enum DataType {
    #[default]
    #[display("u32")]
    U32,
    #[display("s32")]
    S32,
    #[display("f32")]
    F32,
    #[display("u64")]
    U64,
    #[display("s64")]
    S64,
    #[display("f64")]
    F64,
}

impl DataType {
    /// Size of a value of this type, in bytes.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::U32 | Self::S32 | Self::F32 => 4,
            Self::U64 | Self::S64 | Self::F64 => 8,
        }
    }

    /// Returns `true` for floating point types.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }
}
