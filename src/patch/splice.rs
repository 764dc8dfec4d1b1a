//! Instruction Splicer: placing synthesized instructions into the stream and repointing branches.
//!
//! All functions operate on identities. Instructions to insert must have been created in
//! the same body (see [`MethodBody::create`]) and must not already be part of the stream.
//! Inserting never changes the identity of any instruction, so every existing branch keeps
//! pointing at the same instruction; moving the flow into a hook is an explicit
//! [`retarget`].

use std::collections::HashSet;

use crate::{
    assembly::{InstrId, OpCode, Operand},
    metadata::MethodBody,
    Error, Result,
};

fn check_insertable(body: &MethodBody, ids: &[InstrId]) -> Result<()> {
    let in_stream: HashSet<InstrId> = body.ids().iter().copied().collect();
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !body.owns(*id) || in_stream.contains(id) || !seen.insert(*id) {
            return Err(Error::ForeignInstruction(id.to_string()));
        }
    }
    Ok(())
}

/// Inserts `ids` before the instruction at `index`, or appends them when `index == len`.
///
/// # Errors
///
/// Returns [`Error::IndexOutOfRange`] if `index > len` and [`Error::ForeignInstruction`]
/// if an id does not belong to the arena of `body`, is already placed, or is repeated.
pub fn insert_at(body: &mut MethodBody, index: usize, ids: &[InstrId]) -> Result<()> {
    if index > body.len() {
        return Err(Error::IndexOutOfRange {
            index,
            len: body.len(),
        });
    }
    check_insertable(body, ids)?;
    body.order_mut().splice(index..index, ids.iter().copied());
    Ok(())
}

/// Inserts `ids` immediately before `anchor`.
///
/// # Errors
///
/// Returns [`Error::ForeignInstruction`] if `anchor` is not part of the stream, plus the
/// errors of [`insert_at`].
pub fn insert_before(body: &mut MethodBody, anchor: InstrId, ids: &[InstrId]) -> Result<()> {
    let index = body
        .position_of(anchor)
        .ok_or_else(|| Error::ForeignInstruction(anchor.to_string()))?;
    insert_at(body, index, ids)
}

/// Repoints the single-target branch `branch` at `new_target`, returning the previous target.
///
/// # Errors
///
/// Returns [`Error::NotABranch`] if `branch` has no single branch target and
/// [`Error::ForeignInstruction`] if either id does not belong to `body`.
pub fn retarget(body: &mut MethodBody, branch: InstrId, new_target: InstrId) -> Result<InstrId> {
    if !body.owns(new_target) {
        return Err(Error::ForeignInstruction(new_target.to_string()));
    }
    let instruction = body
        .get_mut(branch)
        .ok_or_else(|| Error::ForeignInstruction(branch.to_string()))?;
    match &mut instruction.operand {
        Operand::Target(target) => Ok(std::mem::replace(target, new_target)),
        _ => Err(Error::NotABranch(instruction.to_string())),
    }
}

/// Repoints every target of `branch` that equals `old_target`; works for switch tables too.
///
/// Returns the number of repointed cases.
///
/// # Errors
///
/// Returns [`Error::NotABranch`] if `branch` has no targets and
/// [`Error::ForeignInstruction`] if either id does not belong to `body`.
pub fn retarget_case(
    body: &mut MethodBody,
    branch: InstrId,
    old_target: InstrId,
    new_target: InstrId,
) -> Result<usize> {
    if !body.owns(new_target) {
        return Err(Error::ForeignInstruction(new_target.to_string()));
    }
    let instruction = body
        .get_mut(branch)
        .ok_or_else(|| Error::ForeignInstruction(branch.to_string()))?;
    if !instruction.is_branch() {
        return Err(Error::NotABranch(instruction.to_string()));
    }

    let mut changed = 0;
    for target in instruction.targets_mut() {
        if *target == old_target {
            *target = new_target;
            changed += 1;
        }
    }
    Ok(changed)
}

/// Inserts `ids` before the last `ret` of the stream and moves every branch that jumped to
/// that `ret` onto the first inserted instruction, so the hook runs on every return path
/// that goes through it.
///
/// Returns the position the sequence was inserted at.
///
/// # Errors
///
/// Returns [`Error::ShapeNotFound`] if the body has no `ret`, plus the errors of [`insert_at`].
pub fn insert_before_return(body: &mut MethodBody, ids: &[InstrId]) -> Result<usize> {
    let position = body
        .opcodes()
        .iter()
        .rposition(|opcode| *opcode == OpCode::Ret)
        .ok_or_else(|| Error::ShapeNotFound {
            context: "method body".to_string(),
            pattern: "[ret]".to_string(),
        })?;
    let Some(ret) = body.id_at(position) else {
        return Err(Error::IndexOutOfRange {
            index: position,
            len: body.len(),
        });
    };

    insert_at(body, position, ids)?;
    if let Some(&entry) = ids.first() {
        for branch in body.branches_to(ret) {
            if !ids.contains(&branch) {
                retarget_case(body, branch, ret, entry)?;
            }
        }
    }
    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::Instruction,
        test::factories::body_of,
    };

    // 0: ldarg.0, 1: brfalse -> 3, 2: nop, 3: ret
    fn guarded() -> (MethodBody, InstrId, InstrId) {
        let mut body = MethodBody::new();
        body.push(Instruction::op(OpCode::Ldarg0));
        let ret = body.create(Instruction::op(OpCode::Ret));
        let branch = body.push(Instruction::branch(OpCode::Brfalse, ret));
        body.push(Instruction::op(OpCode::Nop));
        body.order_mut().push(ret);
        (body, branch, ret)
    }

    #[test]
    fn insertion_keeps_branch_identity() {
        let (mut body, branch, ret) = guarded();
        let hook = vec![
            body.create(Instruction::op(OpCode::Nop)),
            body.create(Instruction::op(OpCode::Nop)),
        ];
        insert_at(&mut body, 0, &hook).unwrap();

        assert_eq!(body.len(), 6);
        assert_eq!(body.get(branch).unwrap().targets(), &[ret]);
        assert_eq!(body.position_of(ret), Some(5));
        assert_eq!(body.listing().lines().nth(3), Some("IL_0003: brfalse IL_0005"));
    }

    #[test]
    fn insertion_bounds() {
        let mut body = body_of(&[OpCode::Nop, OpCode::Ret]);
        let extra = body.create(Instruction::op(OpCode::Nop));
        assert!(matches!(
            insert_at(&mut body, 3, &[extra]),
            Err(Error::IndexOutOfRange { index: 3, len: 2 })
        ));

        insert_at(&mut body, 2, &[extra]).unwrap();
        assert_eq!(body.id_at(2), Some(extra));
        assert!(matches!(
            insert_at(&mut body, 0, &[extra]),
            Err(Error::ForeignInstruction(_))
        ));

        let other = MethodBody::new().create(Instruction::op(OpCode::Nop));
        let mut small = MethodBody::new();
        assert!(insert_at(&mut small, 0, &[other]).is_err());
    }

    #[test]
    fn retarget_and_insert_before() {
        let (mut body, branch, ret) = guarded();
        let hook = vec![body.create(Instruction::op(OpCode::Nop))];
        insert_before(&mut body, ret, &hook).unwrap();
        assert_eq!(retarget(&mut body, branch, hook[0]).unwrap(), ret);
        assert_eq!(body.get(branch).unwrap().targets(), &[hook[0]]);

        let first = body.id_at(0).unwrap();
        assert!(matches!(retarget(&mut body, first, ret), Err(Error::NotABranch(_))));
    }

    #[test]
    fn switch_cases() {
        let mut body = MethodBody::new();
        let a = body.create(Instruction::op(OpCode::Nop));
        let b = body.create(Instruction::op(OpCode::Ret));
        let switch = body.push(Instruction::new(OpCode::Switch, Operand::Switch(vec![a, b, a])).unwrap());
        body.order_mut().extend([a, b]);

        let hook = body.create(Instruction::op(OpCode::Nop));
        assert_eq!(retarget_case(&mut body, switch, a, hook).unwrap(), 2);
        assert_eq!(body.get(switch).unwrap().targets(), &[hook, b, hook]);
        assert!(matches!(retarget(&mut body, switch, a), Err(Error::NotABranch(_))));
    }

    #[test]
    fn before_return_moves_incoming_branches() {
        let (mut body, branch, ret) = guarded();
        let hook = vec![
            body.create(Instruction::op(OpCode::Nop)),
            body.create(Instruction::op(OpCode::Pop)),
        ];
        assert_eq!(insert_before_return(&mut body, &hook).unwrap(), 3);
        assert_eq!(body.get(branch).unwrap().targets(), &[hook[0]]);
        assert_eq!(body.id_at(5), Some(ret));

        let mut empty = MethodBody::new();
        assert!(matches!(
            insert_before_return(&mut empty, &[]),
            Err(Error::ShapeNotFound { .. })
        ));
    }
}
