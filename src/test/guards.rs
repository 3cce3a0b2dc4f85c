use crate::{
    analysis::{CmpPredicate, Function, FunctionBuilder, Operand},
    test::{induction, load_at, step_and_branch, store_at},
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Shape {
    Clean,
    BusyExit,
    BusyGuard,
    OtherBound,
    SharedArray,
    PhiGuard,
}

// Two loops each skipped when 0 >= n; the first skip edge lands on the second guard.
// Only SharedArray has the second loop read what the first one wrote.
fn guarded_loops(name: &str, shape: Shape) -> Function {
    FunctionBuilder::new(name)
        .build_with(|f| {
            let n = f.arg("n");
            let m = f.arg("m");
            let a = f.arg("a");
            let b = f.arg("b");
            let (next0, next1) = (f.value(), f.value());

            f.named_block(0, "guard0", |bb| {
                let c = bb.cmp(CmpPredicate::Slt, 0, n);
                bb.branch(c, 1, 4);
            });
            f.named_block(1, "pre0", |bb| bb.jump(2));
            f.named_block(2, "loop0", |bb| {
                let i = induction(bb, 1, 2, next0);
                store_at(bb, a, i, i);
                step_and_branch(bb, i, next0, n, 2, 3);
            });
            f.named_block(3, "exit0", |bb| {
                if shape == Shape::BusyExit {
                    bb.add(n, 1);
                }
                bb.jump(4);
            });
            f.named_block(4, "guard1", |bb| {
                if shape == Shape::BusyGuard {
                    bb.add(n, 1);
                }
                let c = if shape == Shape::PhiGuard {
                    bb.phi(&[(3, Operand::Const(1)), (0, Operand::Const(0))])
                } else {
                    let bound = if shape == Shape::OtherBound { m } else { n };
                    bb.cmp(CmpPredicate::Slt, 0, bound)
                };
                bb.branch(c, 5, 8);
            });
            f.named_block(5, "pre1", |bb| bb.jump(6));
            f.named_block(6, "loop1", |bb| {
                let j = induction(bb, 5, 6, next1);
                if shape == Shape::SharedArray {
                    let v = load_at(bb, a, j);
                    store_at(bb, b, j, v);
                } else {
                    store_at(bb, b, j, j);
                }
                step_and_branch(bb, j, next1, n, 6, 7);
            });
            f.named_block(7, "exit1", |bb| bb.jump(8));
            f.named_block(8, "tail", |bb| bb.ret());
        })
        .unwrap()
}

pub(crate) fn guarded_pair() -> Function {
    guarded_loops("guarded", Shape::Clean)
}

// The first exit block computes something before falling into the second guard
pub(crate) fn non_empty_exit_pair() -> Function {
    guarded_loops("busy_exit", Shape::BusyExit)
}

// The second guard block holds more than its compare
pub(crate) fn non_empty_guard_pair() -> Function {
    guarded_loops("busy_guard", Shape::BusyGuard)
}

// The second guard tests m instead of n
pub(crate) fn mismatched_guards() -> Function {
    guarded_loops("mismatched", Shape::OtherBound)
}

// The second loop copies a into b, so it reads what the first loop stored
pub(crate) fn guarded_shared_pair() -> Function {
    guarded_loops("guarded_shared", Shape::SharedArray)
}

// The second guard branches on a phi instead of a compare
pub(crate) fn phi_guard_pair() -> Function {
    guarded_loops("phi_guard", Shape::PhiGuard)
}
