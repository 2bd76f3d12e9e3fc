use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pyc_dec_rs::{CodeObject, Decompiler, InstructionBuilder, JumpGraph, OperationKind as Op};

/// `count` sequential `while` loops, each holding an `if`/`else`
fn loops_listing(count: usize) -> CodeObject {
    let mut b = InstructionBuilder::new();
    for n in 0..count {
        let (end, head, exit, other, join) = (
            format!("end{}", n),
            format!("head{}", n),
            format!("exit{}", n),
            format!("else{}", n),
            format!("join{}", n),
        );
        b.jump(Op::SetupLoop, &end)
            .label(&head)
            .load_name("a")
            .jump(Op::PopJumpIfFalse, &exit)
            .load_name("b")
            .jump(Op::PopJumpIfFalse, &other)
            .load_name("c")
            .pop_top()
            .jump(Op::JumpForward, &join)
            .label(&other)
            .load_name("d")
            .pop_top()
            .label(&join)
            .jump(Op::JumpAbsolute, &head)
            .label(&exit)
            .op(Op::PopBlock)
            .label(&end);
    }
    b.return_none();
    b.build_code("<module>").unwrap()
}

fn decompilation_benchmark(c: &mut Criterion) {
    let decompiler = Decompiler::new();

    c.bench_function("decompiler_creation", |b| {
        b.iter(|| {
            black_box(Decompiler::new());
        });
    });

    let code = loops_listing(200);
    c.bench_function("decompile_200_loops", |b| {
        b.iter(|| {
            black_box(decompiler.decompile_module(black_box(&code)).unwrap());
        });
    });

    c.bench_function("jump_graph_200_loops", |b| {
        b.iter(|| {
            let graph = JumpGraph::build(black_box(&code.instructions));
            black_box(graph.back_edges());
        });
    });
}

criterion_group!(benches, decompilation_benchmark);
criterion_main!(benches);
