use criterion::{Criterion, criterion_group, criterion_main};
use ft_audit::{AuditSession, TrackedValue, operand_kinds};
use ft_core::TensorValue;
use std::collections::BTreeMap;

fn benchmark_dispatch(c: &mut Criterion) {
    c.bench_function("audit/dispatch_add", |b| {
        b.iter(|| {
            let mut session = AuditSession::builtin();
            let args = [
                TrackedValue::checked(
                    TensorValue::vector_i64(&[1, 2]).expect("vector should build"),
                )
                .expect("wrap should succeed"),
                TrackedValue::checked(
                    TensorValue::vector_i64(&[3, 4]).expect("vector should build"),
                )
                .expect("wrap should succeed"),
            ];

            let out = session
                .dispatch("add", &operand_kinds(&args), &args, &BTreeMap::new())
                .expect("audit benchmark dispatch should succeed");
            assert_eq!(
                out.as_checked()
                    .expect("result should be wrapped")
                    .inner()
                    .to_i64_vec(),
                Some(vec![4, 6])
            );
        });
    });
}

criterion_group!(audit_benches, benchmark_dispatch);
criterion_main!(audit_benches);
