//! AArch64 opcodes and their descriptors.
//!
//! Operand shapes:
//!
//! - Three-address arithmetic: `[dst, lhs, rhs]`; `ri` forms `[dst, lhs, imm]`.
//! - Loads: `[dst, base, imm]`; `Lo12` loads: `[dst, base, sym]`;
//!   scaled: `[dst, base, index]` (`lsl #3` implied).
//! - Stores: `[base, imm, src]`.
//! - `StpPre`: `[r1, r2, base, imm]` pre-indexed; `LdpPost` mirrored.
//! - `Adrp`: `[dst, sym]`; `AddLo12`: `[dst, src, sym]`.

use crate::isa::instinfo::{InstDesc, Restriction};

macro_rules! opcodes {
    ($($name:ident),* $(,)?) => {
        /// The AArch64 opcode set used by this backend.
        #[repr(u32)]
        #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
        #[allow(missing_docs)]
        pub enum Opcode {
            $($name),*
        }

        impl Opcode {
            /// The raw opcode value stored in machine instructions.
            pub const fn u(self) -> u32 {
                self as u32
            }

            /// Recover the opcode from its raw value.
            pub fn from_u32(raw: u32) -> Option<Opcode> {
                static ALL: &[Opcode] = &[$(Opcode::$name),*];
                ALL.get(raw as usize).copied()
            }
        }
    }
}

opcodes! {
    MovRR64, MovRR32, FMovRR64, FMovRR32,
    Mov64i, Mov32i, LdrLit64, LdrLit32,
    Ldr64, Ldr32, Ldrh, Ldrb, LdrF64, LdrF32,
    Str64, Str32, Strh, Strb, StrF64, StrF32,
    Ldr64Scaled,
    LdrF64Lo12, LdrF32Lo12,
    Adrp, AddLo12,
    Add64rr, Add32rr, Add64ri, Add32ri,
    Sub64rr, Sub32rr, Sub64ri, Sub32ri,
    And64rr, And32rr, Orr64rr, Orr32rr, Eor64rr, Eor32rr,
    Lsl64rr, Lsl32rr, Lsr64rr, Lsr32rr, Asr64rr, Asr32rr,
    Lsl64ri, Lsl32ri, Lsr64ri, Lsr32ri, Asr64ri, Asr32ri,
    Mul64, Mul32, Sdiv64, Sdiv32, Udiv64, Udiv32, Msub64, Msub32,
    Cmp64rr, Cmp32rr, Cmp64ri, Cmp32ri, FcmpD, FcmpS,
    CsetEq, CsetNe, CsetGt, CsetGe, CsetLt, CsetLe, CsetHi, CsetHs, CsetLo, CsetLs,
    Beq, Bne, Bgt, Bge, Blt, Ble, Bhi, Bhs, Blo, Bls, B, Br,
    Bl, Blr, Ret,
    StpPre64, LdpPost64, StrPreF64, LdrPostF64,
    Sxtb64, Sxth64, Sxtw64, Sxtb32, Sxth32, Uxtb32, Uxth32,
    FaddD, FaddS, FsubD, FsubS, FmulD, FmulS, FdivD, FdivS,
    FcvtDS, FcvtSD,
    ScvtfDX, ScvtfDW, ScvtfSX, ScvtfSW, UcvtfDX, UcvtfDW, UcvtfSX, UcvtfSW,
    FcvtzsXD, FcvtzsWD, FcvtzsXS, FcvtzsWS, FcvtzuXD, FcvtzuWD, FcvtzuXS, FcvtzuWS,
    FmovXD, FmovDX, FmovWS, FmovSW,
}

static DEF_RESTRICTIONS: &[Restriction] = &[Restriction::reg_def()];

static D_DEF: InstDesc = InstDesc {
    name: "def",
    num_defs: 1,
    restrictions: DEF_RESTRICTIONS,
    clobbers: &[],
    is_return: false,
    is_jump: false,
    is_call: false,
};
static D_READ: InstDesc = InstDesc::simple("read");
static D_JMP: InstDesc = InstDesc {
    name: "branch",
    num_defs: 0,
    restrictions: &[],
    clobbers: &[],
    is_return: false,
    is_jump: true,
    is_call: false,
};
static D_RET: InstDesc = InstDesc {
    name: "ret",
    num_defs: 0,
    restrictions: &[],
    clobbers: &[],
    is_return: true,
    is_jump: false,
    is_call: false,
};
static D_CALL: InstDesc = InstDesc {
    name: "call",
    num_defs: 0,
    restrictions: &[],
    clobbers: &[],
    is_return: false,
    is_jump: false,
    is_call: true,
};
static PAIR_RESTRICTIONS: &[Restriction] = &[Restriction::reg_use(), Restriction::reg_use()];
static D_PAIR_STORE: InstDesc = InstDesc {
    name: "store-pair",
    num_defs: 0,
    restrictions: PAIR_RESTRICTIONS,
    clobbers: &[],
    is_return: false,
    is_jump: false,
    is_call: false,
};
static PAIR_LOAD_RESTRICTIONS: &[Restriction] =
    &[Restriction::reg_def(), Restriction::reg_def()];
static D_PAIR_LOAD: InstDesc = InstDesc {
    name: "load-pair",
    num_defs: 2,
    restrictions: PAIR_LOAD_RESTRICTIONS,
    clobbers: &[],
    is_return: false,
    is_jump: false,
    is_call: false,
};

/// The descriptor of an AArch64 opcode.
pub fn desc(raw: u32) -> &'static InstDesc {
    use Opcode::*;
    let opcode = match Opcode::from_u32(raw) {
        Some(opcode) => opcode,
        None => return &D_READ,
    };
    match opcode {
        MovRR64 | MovRR32 | FMovRR64 | FMovRR32 | Mov64i | Mov32i | LdrLit64 | LdrLit32
        | Ldr64 | Ldr32 | Ldrh | Ldrb | LdrF64 | LdrF32 | Ldr64Scaled | LdrF64Lo12
        | LdrF32Lo12 | Adrp | AddLo12 | Add64rr | Add32rr | Add64ri | Add32ri | Sub64rr
        | Sub32rr | Sub64ri | Sub32ri | And64rr | And32rr | Orr64rr | Orr32rr | Eor64rr
        | Eor32rr | Lsl64rr | Lsl32rr | Lsr64rr | Lsr32rr | Asr64rr | Asr32rr | Lsl64ri
        | Lsl32ri | Lsr64ri | Lsr32ri | Asr64ri | Asr32ri | Mul64 | Mul32 | Sdiv64
        | Sdiv32 | Udiv64 | Udiv32 | Msub64 | Msub32 | CsetEq | CsetNe | CsetGt | CsetGe
        | CsetLt | CsetLe | CsetHi | CsetHs | CsetLo | CsetLs | Sxtb64 | Sxth64 | Sxtw64
        | Sxtb32 | Sxth32 | Uxtb32 | Uxth32 | FaddD | FaddS | FsubD | FsubS | FmulD
        | FmulS | FdivD | FdivS | FcvtDS | FcvtSD | ScvtfDX | ScvtfDW | ScvtfSX
        | ScvtfSW | UcvtfDX | UcvtfDW | UcvtfSX | UcvtfSW | FcvtzsXD | FcvtzsWD
        | FcvtzsXS | FcvtzsWS | FcvtzuXD | FcvtzuWD | FcvtzuXS | FcvtzuWS | FmovXD
        | FmovDX | FmovWS | FmovSW | LdrPostF64 => &D_DEF,
        Str64 | Str32 | Strh | Strb | StrF64 | StrF32 | Cmp64rr | Cmp32rr | Cmp64ri
        | Cmp32ri | FcmpD | FcmpS | StrPreF64 => &D_READ,
        Beq | Bne | Bgt | Bge | Blt | Ble | Bhi | Bhs | Blo | Bls | B | Br => &D_JMP,
        Ret => &D_RET,
        Bl | Blr => &D_CALL,
        StpPre64 => &D_PAIR_STORE,
        LdpPost64 => &D_PAIR_LOAD,
    }
}

/// The printed mnemonic of an opcode.
pub fn mnemonic(opcode: Opcode) -> &'static str {
    use Opcode::*;
    match opcode {
        MovRR64 | MovRR32 | Mov64i | Mov32i => "mov",
        FMovRR64 | FMovRR32 | FmovXD | FmovDX | FmovWS | FmovSW => "fmov",
        LdrLit64 | LdrLit32 | Ldr64 | Ldr32 | LdrF64 | LdrF32 | Ldr64Scaled
        | LdrF64Lo12 | LdrF32Lo12 | LdrPostF64 => "ldr",
        Ldrh => "ldrh",
        Ldrb => "ldrb",
        Str64 | Str32 | StrF64 | StrF32 | StrPreF64 => "str",
        Strh => "strh",
        Strb => "strb",
        Adrp => "adrp",
        AddLo12 | Add64rr | Add32rr | Add64ri | Add32ri => "add",
        Sub64rr | Sub32rr | Sub64ri | Sub32ri => "sub",
        And64rr | And32rr => "and",
        Orr64rr | Orr32rr => "orr",
        Eor64rr | Eor32rr => "eor",
        Lsl64rr | Lsl32rr | Lsl64ri | Lsl32ri => "lsl",
        Lsr64rr | Lsr32rr | Lsr64ri | Lsr32ri => "lsr",
        Asr64rr | Asr32rr | Asr64ri | Asr32ri => "asr",
        Mul64 | Mul32 => "mul",
        Sdiv64 | Sdiv32 => "sdiv",
        Udiv64 | Udiv32 => "udiv",
        Msub64 | Msub32 => "msub",
        Cmp64rr | Cmp32rr | Cmp64ri | Cmp32ri => "cmp",
        FcmpD | FcmpS => "fcmp",
        CsetEq | CsetNe | CsetGt | CsetGe | CsetLt | CsetLe | CsetHi | CsetHs | CsetLo
        | CsetLs => "cset",
        Beq => "b.eq",
        Bne => "b.ne",
        Bgt => "b.gt",
        Bge => "b.ge",
        Blt => "b.lt",
        Ble => "b.le",
        Bhi => "b.hi",
        Bhs => "b.hs",
        Blo => "b.lo",
        Bls => "b.ls",
        B => "b",
        Br => "br",
        Bl => "bl",
        Blr => "blr",
        Ret => "ret",
        StpPre64 => "stp",
        LdpPost64 => "ldp",
        Sxtb64 | Sxtb32 => "sxtb",
        Sxth64 | Sxth32 => "sxth",
        Sxtw64 => "sxtw",
        Uxtb32 => "uxtb",
        Uxth32 => "uxth",
        FaddD | FaddS => "fadd",
        FsubD | FsubS => "fsub",
        FmulD | FmulS => "fmul",
        FdivD | FdivS => "fdiv",
        FcvtDS | FcvtSD => "fcvt",
        ScvtfDX | ScvtfDW | ScvtfSX | ScvtfSW => "scvtf",
        UcvtfDX | UcvtfDW | UcvtfSX | UcvtfSW => "ucvtf",
        FcvtzsXD | FcvtzsWD | FcvtzsXS | FcvtzsWS => "fcvtzs",
        FcvtzuXD | FcvtzuWD | FcvtzuXS | FcvtzuWS => "fcvtzu",
    }
}

/// The condition suffix of a `cset` opcode.
pub fn cset_cond(opcode: Opcode) -> &'static str {
    use Opcode::*;
    match opcode {
        CsetEq => "eq",
        CsetNe => "ne",
        CsetGt => "gt",
        CsetGe => "ge",
        CsetLt => "lt",
        CsetLe => "le",
        CsetHi => "hi",
        CsetHs => "hs",
        CsetLo => "lo",
        CsetLs => "ls",
        _ => unreachable!("not a cset"),
    }
}
