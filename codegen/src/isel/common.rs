//! Patterns shared by every back-end.
//!
//! Leaf value nodes (registers, constants, frame indices, arguments) and
//! the chain nodes that lower to target-independent pseudo-instructions
//! (return, switch, φ, call, va_start/va_end) emit the same way on every
//! target; the per-target tables register these alongside their own
//! machine-specific patterns.

use crate::isel::dag::{Node, NodeKind, NodePayload};
use crate::isel::pattern::MatchArgs;
use crate::isel::select::Isel;
use crate::mir::{CallLoweringInfo, ImmSize, MirBlock, Operand, pseudo};
use crate::result::{CodegenError, CodegenResult};

/// Matcher that accepts any node.
pub fn always(_: &MatchArgs, _: Node) -> bool {
    true
}

/// A root lowers to its machine block.
pub fn emit_root(isel: &mut Isel, node: Node, _block: MirBlock) -> CodegenResult<Option<Operand>> {
    let ir_block = isel.dag.root_block(node);
    Ok(Some(Operand::Block(isel.mir_block(ir_block))))
}

/// A register node allocates a fresh virtual register.
pub fn emit_register(
    isel: &mut Isel,
    node: Node,
    _block: MirBlock,
) -> CodegenResult<Option<Operand>> {
    let ty = isel.node_ty(node);
    let reg = isel.vreg_for(ty);
    Ok(Some(Operand::reg(reg)))
}

/// An integer constant lowers to an interned immediate sized by its type.
pub fn emit_constant_int(
    isel: &mut Isel,
    node: Node,
    _block: MirBlock,
) -> CodegenResult<Option<Operand>> {
    let value = match isel.dag.nodes[node].payload {
        NodePayload::Imm(value) => value,
        _ => unreachable!("constant node without payload"),
    };
    let size = ImmSize::from_bytes(isel.node_size(node).max(1));
    Ok(Some(isel.ctx.imm(value, size)))
}

/// A frame index lowers to its symbolic slot.
pub fn emit_frame_index(
    isel: &mut Isel,
    node: Node,
    _block: MirBlock,
) -> CodegenResult<Option<Operand>> {
    match isel.dag.nodes[node].payload {
        NodePayload::Slot(slot) => Ok(Some(Operand::Frame(slot))),
        _ => unreachable!("frame index without slot"),
    }
}

/// A formal argument resolves to the operand chosen at function setup.
pub fn emit_function_argument(
    isel: &mut Isel,
    node: Node,
    _block: MirBlock,
) -> CodegenResult<Option<Operand>> {
    let index = match isel.dag.nodes[node].payload {
        NodePayload::Arg(index) => index as usize,
        _ => unreachable!("argument node without index"),
    };
    isel.func.args[index]
        .ok_or_else(|| CodegenError::BadOperand(format!("argument {index} was not lowered")))
        .map(Some)
}

/// A multi-value bundles its lanes' operands.
pub fn emit_multi_value(
    isel: &mut Isel,
    node: Node,
    block: MirBlock,
) -> CodegenResult<Option<Operand>> {
    let lanes: Vec<Node> = isel.dag.multi_values(node).to_vec();
    let mut ops = Vec::with_capacity(lanes.len());
    for lane in lanes {
        ops.push(isel.emit_value(lane, block)?);
    }
    let multi = isel.func.make_multi(ops);
    Ok(Some(Operand::Multi(multi)))
}

/// Return lowers to the `RETURN_LOWER` pseudo; placement of the value into
/// the convention's registers happens in target lowering.
pub fn emit_return(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    if let Some(&value_node) = isel.dag.nodes[node].operands.first() {
        let value = isel.emit_value(value_node, block)?;
        isel.push(block, pseudo::RETURN_LOWER, &[value]);
    } else {
        isel.push(block, pseudo::RETURN_LOWER, &[]);
    }
    Ok(None)
}

/// Switch lowers to the `SWITCH_LOWER` pseudo.
pub fn emit_switch(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let operands: Vec<Node> = isel.dag.nodes[node].operands.iter().copied().collect();
    let mut ops = Vec::with_capacity(operands.len());
    let cond = isel.emit_value(operands[0], block)?;
    if !matches!(cond, Operand::Reg(..) | Operand::Imm(..)) {
        return Err(CodegenError::BadOperand(format!(
            "switch condition {cond:?}"
        )));
    }
    ops.push(cond);
    for &operand in &operands[1..] {
        ops.push(isel.emit_value(operand, block)?);
    }
    isel.push(block, pseudo::SWITCH_LOWER, &ops);
    Ok(None)
}

/// A φ queues one parallel-copy pair on each predecessor, to be resolved
/// just before the predecessors' terminators during target lowering.
pub fn emit_phi(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let result = isel.dag.nodes[node].result.expand().expect("phi result");
    let dst = isel.emit_value(result, block)?;
    let pairs: Vec<(Node, Node)> = isel.dag.nodes[node]
        .operands
        .chunks_exact(2)
        .map(|pair| (pair[0], pair[1]))
        .collect();
    for (value_node, root) in pairs {
        let pred_ir = isel.dag.root_block(root);
        let pred_block = isel.mir_block(pred_ir);
        let src = isel.emit_value(value_node, pred_block)?;
        isel.func.blocks[pred_block].phi_copies.push((dst, src));
    }
    Ok(Some(dst))
}

/// Accepts calls whose callee is a known global.
pub fn match_call_direct(args: &MatchArgs, node: Node) -> bool {
    args.dag.kind(args.dag.nodes[node].operands[0]) == NodeKind::LoadGlobal
}

fn call_types(isel: &Isel, node: Node) -> Vec<crate::ir::types::Type> {
    let mut types = Vec::with_capacity(isel.dag.nodes[node].operands.len());
    types.push(isel.node_ty(node));
    for &arg in &isel.dag.nodes[node].operands[1..] {
        let value = isel.dag.extract_value(arg, false);
        types.push(isel.node_ty(value));
    }
    types
}

fn emit_call_common(
    isel: &mut Isel,
    node: Node,
    block: MirBlock,
    callee: Operand,
) -> CodegenResult<Option<Operand>> {
    let (conv, vararg, result_used) = match isel.dag.nodes[node].payload {
        NodePayload::Call {
            conv,
            vararg,
            result_used,
        } => (conv, vararg, result_used),
        _ => unreachable!("call without payload"),
    };
    let result = match isel.dag.nodes[node].result.expand() {
        Some(result) if result_used => Some(isel.emit_value(result, block)?),
        _ => None,
    };
    let args: Vec<Node> = isel.dag.nodes[node].operands[1..].to_vec();
    let mut ops = vec![callee];
    for arg in args {
        ops.push(isel.emit_value(arg, block)?);
    }
    let types = call_types(isel, node);
    let inst = isel.push(block, pseudo::CALL_LOWER, &ops);
    isel.func.call_lowerings.insert(
        inst,
        CallLoweringInfo {
            types,
            vararg,
            call_conv: conv,
            result,
        },
    );
    Ok(result)
}

/// Direct call: the callee symbol rides on the pseudo, bypassing the
/// address materialization of its `LoadGlobal` operand.
pub fn emit_call_direct(
    isel: &mut Isel,
    node: Node,
    block: MirBlock,
) -> CodegenResult<Option<Operand>> {
    let load_global = isel.dag.nodes[node].operands[0];
    let global = isel.dag.nodes[load_global].operands[0];
    let value = match isel.dag.nodes[global].payload {
        NodePayload::Global(value) => value,
        _ => unreachable!("direct call without global"),
    };
    emit_call_common(isel, node, block, Operand::Global(value))
}

/// Indirect call through a register.
pub fn emit_call_indirect(
    isel: &mut Isel,
    node: Node,
    block: MirBlock,
) -> CodegenResult<Option<Operand>> {
    let callee = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    emit_call_common(isel, node, block, callee)
}

/// `va_start` lowers to its pseudo.
pub fn emit_va_start(
    isel: &mut Isel,
    node: Node,
    block: MirBlock,
) -> CodegenResult<Option<Operand>> {
    let list = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    isel.push(block, pseudo::VA_START_LOWER, &[list]);
    Ok(None)
}

/// `va_end` lowers to its pseudo.
pub fn emit_va_end(isel: &mut Isel, node: Node, block: MirBlock) -> CodegenResult<Option<Operand>> {
    let list = isel.emit_value(isel.dag.nodes[node].operands[0], block)?;
    isel.push(block, pseudo::VA_END_LOWER, &[list]);
    Ok(None)
}
