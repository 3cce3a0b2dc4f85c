use crate::{
    analysis::{CmpPredicate, Function, FunctionBuilder, MemoryEffects, Operand},
    test::{induction, load_at, step_and_branch, store_at},
};

// A[i] = i, then B[j] = A[j], with the first exit doubling as the second preheader
pub(crate) fn two_adjacent_loops() -> Function {
    FunctionBuilder::new("adjacent")
        .build_with(|f| {
            let n = f.arg("n");
            let a = f.arg("a");
            let b = f.arg("b");
            let (next0, next1) = (f.value(), f.value());

            f.named_block(0, "entry", |bb| bb.jump(1));
            f.named_block(1, "pre0", |bb| bb.jump(2));
            f.named_block(2, "loop0", |bb| {
                let i = induction(bb, 1, 2, next0);
                store_at(bb, a, i, i);
                step_and_branch(bb, i, next0, n, 2, 3);
            });
            f.named_block(3, "pre1", |bb| bb.jump(4));
            f.named_block(4, "loop1", |bb| {
                let j = induction(bb, 3, 4, next1);
                let v = load_at(bb, a, j);
                store_at(bb, b, j, v);
                step_and_branch(bb, j, next1, n, 4, 5);
            });
            f.named_block(5, "exit", |bb| bb.ret());
        })
        .unwrap()
}

// Adjacent loops running to n + extra0 and n + extra1
pub(crate) fn adjacent_loops_with_bounds(extra0: i64, extra1: i64) -> Function {
    FunctionBuilder::new("bounds")
        .build_with(|f| {
            let n = f.arg("n");
            let a = f.arg("a");
            let b = f.arg("b");
            let (bound0, bound1) = (f.value(), f.value());
            let (next0, next1) = (f.value(), f.value());

            f.named_block(0, "entry", |bb| {
                bb.add_into(bound0, n, extra0);
                bb.add_into(bound1, n, extra1);
                bb.jump(1);
            });
            f.named_block(1, "pre0", |bb| bb.jump(2));
            f.named_block(2, "loop0", |bb| {
                let i = induction(bb, 1, 2, next0);
                store_at(bb, a, i, i);
                step_and_branch(bb, i, next0, bound0, 2, 3);
            });
            f.named_block(3, "pre1", |bb| bb.jump(4));
            f.named_block(4, "loop1", |bb| {
                let j = induction(bb, 3, 4, next1);
                store_at(bb, b, j, j);
                step_and_branch(bb, j, next1, bound1, 4, 5);
            });
            f.named_block(5, "exit", |bb| bb.ret());
        })
        .unwrap()
}

// A[i] = i, then A[j + offset] = A[j + offset] + 1
pub(crate) fn loops_with_offset(offset: i64) -> Function {
    FunctionBuilder::new("offset")
        .build_with(|f| {
            let n = f.arg("n");
            let a = f.arg("a");
            let (next0, next1) = (f.value(), f.value());

            f.named_block(0, "entry", |bb| bb.jump(1));
            f.named_block(1, "pre0", |bb| bb.jump(2));
            f.named_block(2, "loop0", |bb| {
                let i = induction(bb, 1, 2, next0);
                store_at(bb, a, i, i);
                step_and_branch(bb, i, next0, n, 2, 3);
            });
            f.named_block(3, "pre1", |bb| bb.jump(4));
            f.named_block(4, "loop1", |bb| {
                let j = induction(bb, 3, 4, next1);
                let index = bb.add(j, offset);
                let v = load_at(bb, a, index);
                let w = bb.add(v, 1);
                store_at(bb, a, index, w);
                step_and_branch(bb, j, next1, n, 4, 5);
            });
            f.named_block(5, "exit", |bb| bb.ret());
        })
        .unwrap()
}

// The second loop stores a value computed in the first
pub(crate) fn value_flow_pair() -> Function {
    FunctionBuilder::new("flow")
        .build_with(|f| {
            let n = f.arg("n");
            let a = f.arg("a");
            let b = f.arg("b");
            let (next0, next1) = (f.value(), f.value());
            let doubled = f.named_value("doubled");

            f.named_block(0, "entry", |bb| bb.jump(1));
            f.named_block(1, "pre0", |bb| bb.jump(2));
            f.named_block(2, "loop0", |bb| {
                let i = induction(bb, 1, 2, next0);
                bb.mul_into(doubled, i, 2);
                store_at(bb, a, i, doubled);
                step_and_branch(bb, i, next0, n, 2, 3);
            });
            f.named_block(3, "pre1", |bb| bb.jump(4));
            f.named_block(4, "loop1", |bb| {
                let j = induction(bb, 3, 4, next1);
                store_at(bb, b, j, doubled);
                step_and_branch(bb, j, next1, n, 4, 5);
            });
            f.named_block(5, "exit", |bb| bb.ret());
        })
        .unwrap()
}

// Loops that test their condition in the header and branch back from a separate latch
pub(crate) fn header_exiting_pair() -> Function {
    FunctionBuilder::new("header_exiting")
        .build_with(|f| {
            let n = f.arg("n");
            let a = f.arg("a");
            let b = f.arg("b");
            let (i, j) = (f.named_value("i"), f.named_value("j"));
            let (next0, next1) = (f.value(), f.value());

            f.named_block(0, "entry", |bb| bb.jump(1));
            f.named_block(1, "pre0", |bb| bb.jump(2));
            f.named_block(2, "header0", |bb| {
                bb.phi_into(i, &[(1, Operand::Const(0)), (3, next0.into())]);
                let c = bb.cmp(CmpPredicate::Slt, i, n);
                bb.branch(c, 3, 4);
            });
            f.named_block(3, "latch0", |bb| {
                store_at(bb, a, i, i);
                bb.add_into(next0, i, 1);
                bb.jump(2);
            });
            f.named_block(4, "pre1", |bb| bb.jump(5));
            f.named_block(5, "header1", |bb| {
                bb.phi_into(j, &[(4, Operand::Const(0)), (6, next1.into())]);
                let c = bb.cmp(CmpPredicate::Slt, j, n);
                bb.branch(c, 6, 7);
            });
            f.named_block(6, "latch1", |bb| {
                store_at(bb, b, j, j);
                bb.add_into(next1, j, 1);
                bb.jump(5);
            });
            f.named_block(7, "exit", |bb| bb.ret());
        })
        .unwrap()
}

// Three adjacent loops: A[i] = i, B[j] = A[j], C[k] = B[k]
pub(crate) fn three_loop_chain() -> Function {
    FunctionBuilder::new("chain")
        .build_with(|f| {
            let n = f.arg("n");
            let a = f.arg("a");
            let b = f.arg("b");
            let c = f.arg("c");
            let (next0, next1, next2) = (f.value(), f.value(), f.value());

            f.named_block(0, "entry", |bb| bb.jump(1));
            f.named_block(1, "pre0", |bb| bb.jump(2));
            f.named_block(2, "loop0", |bb| {
                let i = induction(bb, 1, 2, next0);
                store_at(bb, a, i, i);
                step_and_branch(bb, i, next0, n, 2, 3);
            });
            f.named_block(3, "pre1", |bb| bb.jump(4));
            f.named_block(4, "loop1", |bb| {
                let j = induction(bb, 3, 4, next1);
                let v = load_at(bb, a, j);
                store_at(bb, b, j, v);
                step_and_branch(bb, j, next1, n, 4, 5);
            });
            f.named_block(5, "pre2", |bb| bb.jump(6));
            f.named_block(6, "loop2", |bb| {
                let k = induction(bb, 5, 6, next2);
                let v = load_at(bb, b, k);
                store_at(bb, c, k, v);
                step_and_branch(bb, k, next2, n, 6, 7);
            });
            f.named_block(7, "exit", |bb| bb.ret());
        })
        .unwrap()
}

// One outer loop over i holding two adjacent inner loops over j and k
pub(crate) fn nested_pair() -> Function {
    FunctionBuilder::new("nested")
        .build_with(|f| {
            let n = f.arg("n");
            let m = f.arg("m");
            let a = f.arg("a");
            let b = f.arg("b");
            let i = f.named_value("i");
            let (next_i, next_j, next_k) = (f.value(), f.value(), f.value());

            f.named_block(0, "entry", |bb| bb.jump(1));
            f.named_block(1, "outer.pre", |bb| bb.jump(2));
            f.named_block(2, "outer", |bb| {
                bb.phi_into(i, &[(1, Operand::Const(0)), (7, next_i.into())]);
                bb.jump(3);
            });
            f.named_block(3, "inner0.pre", |bb| bb.jump(4));
            f.named_block(4, "inner0", |bb| {
                let j = induction(bb, 3, 4, next_j);
                store_at(bb, a, j, i);
                step_and_branch(bb, j, next_j, m, 4, 5);
            });
            f.named_block(5, "inner1.pre", |bb| bb.jump(6));
            f.named_block(6, "inner1", |bb| {
                let k = induction(bb, 5, 6, next_k);
                store_at(bb, b, k, i);
                step_and_branch(bb, k, next_k, m, 6, 7);
            });
            f.named_block(7, "outer.latch", |bb| {
                step_and_branch(bb, i, next_i, n, 2, 8);
            });
            f.named_block(8, "exit", |bb| bb.ret());
        })
        .unwrap()
}

// Two adjacent outer loops, each holding one inner loop
pub(crate) fn outer_pair() -> Function {
    FunctionBuilder::new("outer")
        .build_with(|f| {
            let n = f.arg("n");
            let m = f.arg("m");
            let a = f.arg("a");
            let b = f.arg("b");
            let (i, k) = (f.named_value("i"), f.named_value("k"));
            let (next_i, next_j, next_k, next_l) = (f.value(), f.value(), f.value(), f.value());

            f.named_block(0, "entry", |bb| bb.jump(1));
            f.named_block(1, "outer0.pre", |bb| bb.jump(2));
            f.named_block(2, "outer0", |bb| {
                bb.phi_into(i, &[(1, Operand::Const(0)), (5, next_i.into())]);
                bb.jump(3);
            });
            f.named_block(3, "inner0.pre", |bb| bb.jump(4));
            f.named_block(4, "inner0", |bb| {
                let j = induction(bb, 3, 4, next_j);
                store_at(bb, a, j, i);
                step_and_branch(bb, j, next_j, m, 4, 5);
            });
            f.named_block(5, "outer0.latch", |bb| {
                step_and_branch(bb, i, next_i, n, 2, 6);
            });
            f.named_block(6, "outer1.pre", |bb| bb.jump(7));
            f.named_block(7, "outer1", |bb| {
                bb.phi_into(k, &[(6, Operand::Const(0)), (10, next_k.into())]);
                bb.jump(8);
            });
            f.named_block(8, "inner1.pre", |bb| bb.jump(9));
            f.named_block(9, "inner1", |bb| {
                let l = induction(bb, 8, 9, next_l);
                store_at(bb, b, l, k);
                step_and_branch(bb, l, next_l, m, 9, 10);
            });
            f.named_block(10, "outer1.latch", |bb| {
                step_and_branch(bb, k, next_k, n, 7, 11);
            });
            f.named_block(11, "exit", |bb| bb.ret());
        })
        .unwrap()
}

// The second loop only runs when m > 0, so the loops are not control-flow equivalent
pub(crate) fn conditional_second_loop() -> Function {
    FunctionBuilder::new("conditional")
        .build_with(|f| {
            let n = f.arg("n");
            let m = f.arg("m");
            let a = f.arg("a");
            let b = f.arg("b");
            let (next0, next1) = (f.value(), f.value());

            f.named_block(0, "entry", |bb| bb.jump(1));
            f.named_block(1, "pre0", |bb| bb.jump(2));
            f.named_block(2, "loop0", |bb| {
                let i = induction(bb, 1, 2, next0);
                store_at(bb, a, i, i);
                step_and_branch(bb, i, next0, n, 2, 3);
            });
            f.named_block(3, "check", |bb| {
                let c = bb.cmp(CmpPredicate::Slt, 0, m);
                bb.branch(c, 4, 7);
            });
            f.named_block(4, "pre1", |bb| bb.jump(5));
            f.named_block(5, "loop1", |bb| {
                let j = induction(bb, 4, 5, next1);
                store_at(bb, b, j, j);
                step_and_branch(bb, j, next1, n, 5, 6);
            });
            f.named_block(6, "exit1", |bb| bb.jump(8));
            f.named_block(7, "skip", |bb| bb.jump(8));
            f.named_block(8, "tail", |bb| bb.ret());
        })
        .unwrap()
}

// A single loop calling `sink` with the given effects before it writes anything
pub(crate) fn loop_with_call(effects: MemoryEffects) -> Function {
    FunctionBuilder::new("call")
        .build_with(|f| {
            let n = f.arg("n");
            let a = f.arg("a");
            let next = f.value();

            f.named_block(0, "entry", |bb| bb.jump(1));
            f.named_block(1, "pre", |bb| bb.jump(2));
            f.named_block(2, "loop", |bb| {
                let i = induction(bb, 1, 2, next);
                bb.call_void("sink", &[i.into()], effects);
                store_at(bb, a, i, i);
                step_and_branch(bb, i, next, n, 2, 3);
            });
            f.named_block(3, "exit", |bb| bb.ret());
        })
        .unwrap()
}

pub(crate) fn loop_with_volatile_store() -> Function {
    FunctionBuilder::new("volatile")
        .build_with(|f| {
            let n = f.arg("n");
            let a = f.arg("a");
            let next = f.value();

            f.named_block(0, "entry", |bb| bb.jump(1));
            f.named_block(1, "pre", |bb| bb.jump(2));
            f.named_block(2, "loop", |bb| {
                let i = induction(bb, 1, 2, next);
                let p = bb.add(a, i);
                bb.store_volatile(p, i);
                step_and_branch(bb, i, next, n, 2, 3);
            });
            f.named_block(3, "exit", |bb| bb.ret());
        })
        .unwrap()
}

// Adjacent loops with a stray computation in the second preheader
pub(crate) fn non_empty_preheader_pair() -> Function {
    FunctionBuilder::new("busy_preheader")
        .build_with(|f| {
            let n = f.arg("n");
            let a = f.arg("a");
            let b = f.arg("b");
            let (next0, next1) = (f.value(), f.value());

            f.named_block(0, "entry", |bb| bb.jump(1));
            f.named_block(1, "pre0", |bb| bb.jump(2));
            f.named_block(2, "loop0", |bb| {
                let i = induction(bb, 1, 2, next0);
                store_at(bb, a, i, i);
                step_and_branch(bb, i, next0, n, 2, 3);
            });
            f.named_block(3, "pre1", |bb| {
                bb.add(n, 1);
                bb.jump(4);
            });
            f.named_block(4, "loop1", |bb| {
                let j = induction(bb, 3, 4, next1);
                store_at(bb, b, j, j);
                step_and_branch(bb, j, next1, n, 4, 5);
            });
            f.named_block(5, "exit", |bb| bb.ret());
        })
        .unwrap()
}

// Adjacent loops whose second header is the target of an indirect branch
pub(crate) fn address_taken_pair() -> Function {
    FunctionBuilder::new("address_taken")
        .build_with(|f| {
            let n = f.arg("n");
            let a = f.arg("a");
            let b = f.arg("b");
            let (next0, next1) = (f.value(), f.value());

            f.named_block(0, "entry", |bb| bb.jump(1));
            f.named_block(1, "pre0", |bb| bb.jump(2));
            f.named_block(2, "loop0", |bb| {
                let i = induction(bb, 1, 2, next0);
                store_at(bb, a, i, i);
                step_and_branch(bb, i, next0, n, 2, 3);
            });
            f.named_block(3, "pre1", |bb| bb.jump(4));
            f.named_block(4, "loop1", |bb| {
                bb.address_taken();
                let j = induction(bb, 3, 4, next1);
                store_at(bb, b, j, j);
                step_and_branch(bb, j, next1, n, 4, 5);
            });
            f.named_block(5, "exit", |bb| bb.ret());
        })
        .unwrap()
}
