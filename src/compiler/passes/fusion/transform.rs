//! Splicing two legal candidates into one loop.
//!
//! Both entry points follow the same protocol: re-key phi operands, rewrite
//! terminators, queue the touched edges as one batch, flush, then fold the
//! loop-forest entries of the second loop into the first. The dominance trees
//! only ever see the graph before and after the whole splice.

use log::debug;

use crate::{
    analysis::{DomUpdate, LoopId, Operand, PhiNode, PhiOperand, ValueId},
    compiler::{passes::fusion::FusionCandidate, EventKind, FusionConfig, FusionContext},
    utils::graph::NodeId,
    Result,
};

/// Anchors of a valid candidate, unwrapped once.
#[derive(Debug, Clone, Copy)]
struct Anchors {
    loop_id: LoopId,
    preheader: NodeId,
    header: NodeId,
    exiting: NodeId,
    exit: NodeId,
    latch: NodeId,
}

impl Anchors {
    fn of(fc: &FusionCandidate) -> Result<Self> {
        match (
            fc.preheader(),
            fc.header(),
            fc.exiting_block(),
            fc.exit_block(),
            fc.latch(),
        ) {
            (Some(preheader), Some(header), Some(exiting), Some(exit), Some(latch))
                if fc.is_valid() =>
            {
                Ok(Self {
                    loop_id: fc.loop_id(),
                    preheader,
                    header,
                    exiting,
                    exit,
                    latch,
                })
            }
            _ => Err(invariant_error!("cannot fuse invalid candidate {}", fc)),
        }
    }
}

/// Fuses `fc1` into `fc0` and returns the surviving loop.
///
/// `fc0` must dominate and be adjacent to `fc1`, and the pair must have
/// passed every legality check.
///
/// # Errors
///
/// Returns an error if a rewrite does not match the function, or if
/// verification is enabled and fails afterwards.
pub fn perform_fusion(
    ctx: &mut FusionContext<'_>,
    config: &FusionConfig,
    fc0: &FusionCandidate,
    fc1: &FusionCandidate,
) -> Result<LoopId> {
    debug!("Fusion candidate 0: {fc0}");
    debug!("Fusion candidate 1: {fc1}");

    if fc0.is_guarded() {
        return fuse_guarded_loops(ctx, config, fc0, fc1);
    }

    let a = Anchors::of(fc0)?;
    let b = Anchors::of(fc1)?;
    if b.preheader != a.exit {
        return Err(invariant_error!("{} does not start at the exit of {}", b.loop_id, a.loop_id));
    }

    let original_phis = original_header_phis(ctx, &a)?;
    rekey_header_phis(ctx, &a, &b)?;

    let mut updates = Vec::with_capacity(8);

    // Reach the second header even when the first loop takes no backedge.
    ctx.func.replace_successor(a.exiting, b.preheader, b.header)?;
    updates.push(DomUpdate::Delete(a.exiting, b.preheader));
    updates.push(DomUpdate::Insert(a.exiting, b.header));

    ctx.func.make_unreachable(b.preheader)?;
    updates.push(DomUpdate::Delete(b.preheader, b.header));

    move_header_phis(ctx, &a, &b)?;
    insert_after_phis(ctx, &a, &b, &original_phis)?;
    swap_latches(ctx, &a, &b, &mut updates)?;

    ctx.dtu.apply_updates(&updates);
    ctx.forest.remove_block(b.preheader);
    delete_blocks(ctx, &[b.preheader])?;

    finish(ctx, config, &a, &b)
}

/// Guarded variant: the first guard takes over the second, and the first
/// exit block and the second guard block disappear along with the second
/// preheader.
fn fuse_guarded_loops(
    ctx: &mut FusionContext<'_>,
    config: &FusionConfig,
    fc0: &FusionCandidate,
    fc1: &FusionCandidate,
) -> Result<LoopId> {
    let a = Anchors::of(fc0)?;
    let b = Anchors::of(fc1)?;
    let (Some(guard0), Some(guard1), Some(non_loop0), Some(non_loop1)) = (
        fc0.guard_block(),
        fc1.guard_block(),
        fc0.non_loop_block(),
        fc1.non_loop_block(),
    ) else {
        return Err(invariant_error!("{} and {} are not both guarded", a.loop_id, b.loop_id));
    };
    if non_loop0 != guard1 {
        return Err(invariant_error!("{} and {} are not adjacent", a.loop_id, b.loop_id));
    }

    let mut updates = Vec::with_capacity(12);

    // One guard now covers both loops.
    ctx.func.replace_successor(guard0, non_loop0, non_loop1)?;
    ctx.func.replace_successor(a.exit, guard1, b.header)?;
    ctx.func.make_unreachable(guard1)?;
    updates.extend([
        DomUpdate::Delete(guard1, b.preheader),
        DomUpdate::Delete(guard1, non_loop1),
        DomUpdate::Delete(guard0, guard1),
        DomUpdate::Insert(guard0, non_loop1),
    ]);
    ctx.func.replace_phi_predecessor(non_loop1, guard1, guard0)?;

    let original_phis = original_header_phis(ctx, &a)?;
    rekey_header_phis(ctx, &a, &b)?;

    ctx.func.replace_successor(a.exiting, a.exit, b.header)?;
    updates.push(DomUpdate::Delete(a.exiting, a.exit));
    updates.push(DomUpdate::Insert(a.exiting, b.header));

    ctx.func.make_unreachable(a.exit)?;
    updates.push(DomUpdate::Delete(a.exit, b.header));

    ctx.func.make_unreachable(b.preheader)?;
    updates.push(DomUpdate::Delete(b.preheader, b.header));

    move_header_phis(ctx, &a, &b)?;
    insert_after_phis(ctx, &a, &b, &original_phis)?;
    swap_latches(ctx, &a, &b, &mut updates)?;

    ctx.dtu.apply_updates(&updates);
    for block in [b.preheader, a.exit, guard1] {
        ctx.forest.remove_block(block);
    }
    delete_blocks(ctx, &[b.preheader, a.exit, guard1])?;

    finish(ctx, config, &a, &b)
}

/// Header phis of the first loop that need a bridging phi in the second
/// header. Only loops exiting somewhere other than their latch have any.
fn original_header_phis(ctx: &FusionContext<'_>, a: &Anchors) -> Result<Vec<ValueId>> {
    if a.exiting == a.latch {
        return Ok(Vec::new());
    }
    Ok(ctx
        .func
        .block_checked(a.header)?
        .phi_nodes()
        .iter()
        .map(PhiNode::result)
        .collect())
}

fn rekey_header_phis(ctx: &mut FusionContext<'_>, a: &Anchors, b: &Anchors) -> Result<()> {
    ctx.func.replace_successors_phi_uses_with(b.preheader, a.preheader)?;
    ctx.func.replace_successors_phi_uses_with(a.latch, b.latch)
}

/// Moves every used phi of the second header to the top of the first header
/// and drops the rest.
fn move_header_phis(ctx: &mut FusionContext<'_>, a: &Anchors, b: &Anchors) -> Result<()> {
    let phis = ctx.func.take_phis(b.header)?;
    let (kept, dropped): (Vec<PhiNode>, Vec<PhiNode>) = phis
        .into_iter()
        .partition(|phi| ctx.func.has_uses(phi.result()));
    for phi in &dropped {
        debug!("Dropping unused phi {}", ctx.func.value_name(phi.result()));
    }
    ctx.func.prepend_phis(a.header, kept)
}

/// For every loop-carried phi of the first header, routes the value arriving
/// from the second latch through a new phi in the second header that is
/// undefined when entered straight from the first exiting block.
fn insert_after_phis(
    ctx: &mut FusionContext<'_>,
    a: &Anchors,
    b: &Anchors,
    original_phis: &[ValueId],
) -> Result<()> {
    let mut bridges = Vec::with_capacity(original_phis.len());
    for &result in original_phis {
        let phi = ctx.func.phi_mut(a.header, result)?;
        let index = phi.incoming_index(b.latch).ok_or_else(|| {
            invariant_error!("loop-carried value of {} was not rewired", result)
        })?;
        let carried = phi.operands()[index].value();

        let bridge = ctx.func.new_value();
        let name = format!("{}.afterFC0", ctx.func.value_name(result));
        ctx.func.set_value_name(bridge, name);

        let mut node = PhiNode::new(bridge);
        node.add_operand(PhiOperand::new(carried, a.latch));
        node.add_operand(PhiOperand::new(Operand::Undef, a.exiting));
        bridges.push(node);

        ctx.func
            .phi_mut(a.header, result)?
            .set_incoming_value(index, Operand::Value(bridge));
    }
    if bridges.is_empty() {
        return Ok(());
    }
    ctx.func.prepend_phis(b.header, bridges)
}

fn swap_latches(
    ctx: &mut FusionContext<'_>,
    a: &Anchors,
    b: &Anchors,
    updates: &mut Vec<DomUpdate>,
) -> Result<()> {
    ctx.func.replace_successor(a.latch, a.header, b.header)?;
    ctx.func.replace_successor(b.latch, b.header, a.header)?;

    if a.latch != a.exiting {
        updates.push(DomUpdate::Insert(a.latch, b.header));
    }
    updates.extend([
        DomUpdate::Delete(a.latch, a.header),
        DomUpdate::Insert(b.latch, a.header),
        DomUpdate::Delete(b.latch, b.header),
    ]);
    Ok(())
}

fn delete_blocks(ctx: &mut FusionContext<'_>, blocks: &[NodeId]) -> Result<()> {
    let names: Vec<String> = blocks.iter().map(|&b| ctx.func.block_name(b)).collect();
    for &block in blocks {
        ctx.dtu.delete_block(block);
    }
    ctx.dtu.flush(ctx.func)?;
    for name in names {
        ctx.events
            .record(EventKind::BlockRemoved)
            .function(ctx.func.name())
            .block(name);
    }
    Ok(())
}

fn finish(
    ctx: &mut FusionContext<'_>,
    config: &FusionConfig,
    a: &Anchors,
    b: &Anchors,
) -> Result<LoopId> {
    ctx.scev.forget_loop(b.loop_id, a.loop_id);
    ctx.forest.merge_loops(a.loop_id, b.loop_id)?;

    if config.verify {
        ctx.verify()?;
    }
    debug!("Fusion done: {} absorbed {}", a.loop_id, b.loop_id);
    Ok(a.loop_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{
            AffineEvolution, BaseDisjointDependence, DomTreeUpdater, Function, LoopForest,
        },
        compiler::EventLog,
        test::{guarded_pair, header_exiting_pair, two_adjacent_loops},
    };

    fn fuse_first_pair(func: &mut Function) -> (LoopForest, EventLog) {
        let mut forest = LoopForest::analyze(func);
        let mut dtu = DomTreeUpdater::new(func);
        let mut se = AffineEvolution::analyze(func, &forest);
        let oracle = BaseDisjointDependence::new();
        let events = EventLog::new();
        let top = forest.top_level();
        let fc0 = FusionCandidate::new(top[0], func, &forest, &events);
        let fc1 = FusionCandidate::new(top[1], func, &forest, &events);

        let config = FusionConfig::default().with_verify(true);
        let survivor = {
            let mut ctx =
                FusionContext::new(func, &mut forest, &mut dtu, &mut se, &oracle, &events);
            perform_fusion(&mut ctx, &config, &fc0, &fc1).unwrap()
        };
        assert_eq!(survivor, top[0]);
        assert!(forest.is_erased(top[1]));
        (forest, events)
    }

    #[test]
    fn test_unguarded_fusion() {
        let mut func = two_adjacent_loops();
        let (forest, events) = fuse_first_pair(&mut func);

        assert_eq!(forest.top_level().len(), 1);
        let fused = forest.get(forest.top_level()[0]).unwrap();
        assert_eq!(fused.body.len(), 2);
        let header = func.block(fused.header).unwrap();
        assert_eq!(header.phi_nodes().len(), 2);
        assert_eq!(events.count_kind(EventKind::BlockRemoved), 1);
        assert!(func.verify().is_ok());
    }

    #[test]
    fn test_guarded_fusion_removes_three_blocks() {
        let mut func = guarded_pair();
        let before = func.live_block_count();
        let (forest, events) = fuse_first_pair(&mut func);

        assert_eq!(func.live_block_count(), before - 3);
        assert_eq!(events.count_kind(EventKind::BlockRemoved), 3);
        let fused = forest.get(forest.top_level()[0]).unwrap();
        assert!(fused.guard_block(&func).is_some());
    }

    #[test]
    fn test_header_exiting_loops_get_bridge_phis() {
        let mut func = header_exiting_pair();
        let (forest, _) = fuse_first_pair(&mut func);

        let fused = forest.get(forest.top_level()[0]).unwrap();
        let bridged = func
            .blocks()
            .flat_map(|b| b.phi_nodes().iter())
            .filter(|phi| func.value_name(phi.result()).ends_with(".afterFC0"))
            .count();
        assert_eq!(bridged, 1);
        assert!(fused.latch(&func).is_some());
    }
}
