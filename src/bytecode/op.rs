
// =============================================================================
// OPCODE - Bytecode instructions
// =============================================================================

/// One VM instruction. The numeric value is what is stored in the code
/// stream; operands follow it as plain `u32` words (see [`Opcode::arity`]).
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// `LOAD_CONST k`: push `constants[k]`.
    LoadConst = 1,
    LoadNull = 2,
    LoadTrue = 3,
    LoadFalse = 4,
    /// `LOAD_VAR depth slot`: push `chain[len-1-depth][slot]`.
    LoadVar = 5,
    /// `STORE_VAR depth slot`: pop into `chain[len-1-depth][slot]`.
    StoreVar = 6,
    PrintItem = 7,
    PrintNewline = 8,

    // ==========================================================================
    // Control flow: absolute addresses
    // ==========================================================================
    Jmp = 9,
    /// Pop; jump only if the value is exactly `true`.
    JmpTrue = 10,
    /// Pop; jump only if the value is exactly `false`.
    JmpFalse = 11,
    Pop = 12,

    // ==========================================================================
    // Scopes and calls
    // ==========================================================================
    /// `ENTER_SCOPE n`: push a frame of `n` nulls.
    EnterScope = 13,
    LeaveScope = 14,
    /// `CALL id`: call the function with descriptor id `id`.
    Call = 15,
    Return = 16,
    ReturnValue = 17,
    /// `CALL_PRIMITIVE k`: `constants[k]` names a host external.
    CallPrimitive = 18,
    /// `CALL_VALUE argc`: pop a function id, then call it with `argc` args.
    CallValue = 19,

    // ==========================================================================
    // Operators
    // ==========================================================================
    UnaryNeg = 101,
    UnaryNot = 102,

    BinaryAdd = 111,
    BinarySub = 112,
    BinaryMul = 113,
    BinaryDiv = 114,
    BinaryMod = 115,
    BinaryPow = 116,
    BinaryEq = 117,
    BinaryNe = 118,
    BinaryLt = 119,
    BinaryGe = 120,
}

impl Opcode {
    pub const ALL: [Opcode; 31] = [
        Opcode::LoadConst,
        Opcode::LoadNull,
        Opcode::LoadTrue,
        Opcode::LoadFalse,
        Opcode::LoadVar,
        Opcode::StoreVar,
        Opcode::PrintItem,
        Opcode::PrintNewline,
        Opcode::Jmp,
        Opcode::JmpTrue,
        Opcode::JmpFalse,
        Opcode::Pop,
        Opcode::EnterScope,
        Opcode::LeaveScope,
        Opcode::Call,
        Opcode::Return,
        Opcode::ReturnValue,
        Opcode::CallPrimitive,
        Opcode::CallValue,
        Opcode::UnaryNeg,
        Opcode::UnaryNot,
        Opcode::BinaryAdd,
        Opcode::BinarySub,
        Opcode::BinaryMul,
        Opcode::BinaryDiv,
        Opcode::BinaryMod,
        Opcode::BinaryPow,
        Opcode::BinaryEq,
        Opcode::BinaryNe,
        Opcode::BinaryLt,
        Opcode::BinaryGe,
    ];

    /// Number of operand words following the opcode.
    pub fn arity(self) -> usize {
        use Opcode::*;
        match self {
            LoadVar | StoreVar => 2,
            LoadConst | EnterScope | Jmp | JmpTrue | JmpFalse | Call | CallPrimitive
            | CallValue => 1,
            _ => 0,
        }
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_u32(code: u32) -> Option<Opcode> {
        Opcode::ALL.iter().copied().find(|op| op.code() == code)
    }

    /// Mnemonic used by the disassembler.
    pub fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            LoadConst => "LOAD_CONST",
            LoadNull => "LOAD_NULL",
            LoadTrue => "LOAD_TRUE",
            LoadFalse => "LOAD_FALSE",
            LoadVar => "LOAD_VAR",
            StoreVar => "STORE_VAR",
            PrintItem => "PRINT_ITEM",
            PrintNewline => "PRINT_NEWLINE",
            Jmp => "JMP",
            JmpTrue => "JMP_TRUE",
            JmpFalse => "JMP_FALSE",
            Pop => "POP",
            EnterScope => "ENTER_SCOPE",
            LeaveScope => "LEAVE_SCOPE",
            Call => "CALL",
            Return => "RETURN",
            ReturnValue => "RETURN_VALUE",
            CallPrimitive => "CALL_PRIMITIVE",
            CallValue => "CALL_VALUE",
            UnaryNeg => "UNARY_NEG",
            UnaryNot => "UNARY_NOT",
            BinaryAdd => "BINARY_ADD",
            BinarySub => "BINARY_SUB",
            BinaryMul => "BINARY_MUL",
            BinaryDiv => "BINARY_DIV",
            BinaryMod => "BINARY_MOD",
            BinaryPow => "BINARY_POW",
            BinaryEq => "BINARY_EQ",
            BinaryNe => "BINARY_NE",
            BinaryLt => "BINARY_LT",
            BinaryGe => "BINARY_GE",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_wire_numbers() {
        assert_eq!(Opcode::LoadConst.code(), 1);
        assert_eq!(Opcode::CallPrimitive.code(), 18);
        assert_eq!(Opcode::UnaryNeg.code(), 101);
        assert_eq!(Opcode::BinaryGe.code(), 120);
    }

    #[test]
    fn test_from_u32_covers_every_opcode() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_u32(op.code()), Some(op));
        }
        assert_eq!(Opcode::from_u32(0), None);
        assert_eq!(Opcode::from_u32(99), None);
        assert_eq!(Opcode::from_u32(u32::MAX), None);
    }

    #[test]
    fn test_arity_table() {
        assert_eq!(Opcode::LoadVar.arity(), 2);
        assert_eq!(Opcode::StoreVar.arity(), 2);
        assert_eq!(Opcode::JmpFalse.arity(), 1);
        assert_eq!(Opcode::CallValue.arity(), 1);
        assert_eq!(Opcode::BinaryAdd.arity(), 0);
        assert_eq!(Opcode::LeaveScope.arity(), 0);
    }
}
