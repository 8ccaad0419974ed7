//! Machine IR: target instructions over physical and virtual registers.
//!
//! Instruction selection produces machine IR with unbounded virtual
//! registers and pseudo-opcodes for the high-level actions (calls, returns,
//! switches, φ-resolution, va_start/va_end). Target lowering expands the
//! pseudos; register allocation then removes every virtual register.

pub mod block;
pub mod frame;
pub mod function;
pub mod inst;
pub mod operand;

pub use self::block::BlockData;
pub use self::frame::{StackFrame, StackSlotData};
pub use self::function::{
    CallLoweringInfo, CallSite, Function, LiveRange, PoolConstData, VRegInfo, VaSaveArea,
};
pub use self::inst::{pseudo, InstData, MirInst};
pub use self::operand::{
    ImmSize, MirBlock, MultiValue, Operand, PoolConst, Reg, RegFlags, StackSlot, VREG_START,
};
