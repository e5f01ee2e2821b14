use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use planner_core::RichMemory;
use shared_types::{AgentTag, EntryPayload, ExecutionEntryData};
use uuid::Uuid;

fn exec_entry() -> ExecutionEntryData {
    ExecutionEntryData {
        plan_id: Uuid::new_v4(),
        thought: "thinking".into(),
        step: "write file".into(),
        tool: Some("write_file".into()),
        inputs: serde_json::json!({}),
        observation: "ok".into(),
        success: true,
        execution_time_ms: 5,
        score_at_dispatch: Some(0.5),
        realized_scenario: None,
        metadata: None,
    }
}

fn memory_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("rich_memory");

    let entry_counts = vec![100usize, 1_000, 10_000];
    for count in entry_counts {
        group.bench_with_input(BenchmarkId::new("add_entry", count), &count, |b, &count| {
            b.iter(|| {
                let memory = RichMemory::new();
                memory.start_task_context("benchmark task");
                for i in 0..count {
                    memory.add_entry(
                        AgentTag::Main,
                        i as u32,
                        0.5,
                        vec!["execution".to_string()],
                        EntryPayload::Execution(exec_entry()),
                    );
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("query_capped", count), &count, |b, &count| {
            let memory = RichMemory::new();
            memory.start_task_context("benchmark task");
            for i in 0..count {
                memory.add_entry(
                    AgentTag::Main,
                    i as u32,
                    0.5,
                    vec!["execution".to_string()],
                    EntryPayload::Execution(exec_entry()),
                );
            }
            b.iter(|| memory.query(Some(&["execution"]), 20, true, None));
        });
    }

    group.finish();
}

criterion_group!(benches, memory_benchmarks);
criterion_main!(benches);
