//! Hand-off and resolution benchmarks.
//!
//! Run: cargo bench -p notifier-runtime --bench handoff

use std::hint::black_box;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};

use notifier_runtime::{
    run_notifier_cycle, submit_and_wait, ExecutorHandle, LocalExecutor, RequestNotifier,
    RequestStatus, RequestTable,
};

/// Executor parked on its own thread until `stop` is called.
struct ExecutorThread {
    handle: ExecutorHandle,
    table: Arc<RequestTable>,
    stop_id: notifier_runtime::RequestId,
    join: thread::JoinHandle<()>,
}

impl ExecutorThread {
    fn start() -> Self {
        let table = Arc::new(RequestTable::new(0));
        let (stop_id, stop_fut) = table.register();
        let (tx, rx) = mpsc::channel();

        let join = thread::Builder::new()
            .name("bench-executor".into())
            .spawn(move || {
                let ex = LocalExecutor::new();
                tx.send(ex.handle()).expect("bench handle channel");
                ex.block_on(stop_fut);
            })
            .expect("spawn executor thread");

        let handle = rx.recv().expect("executor handle");
        Self { handle, table, stop_id, join }
    }

    fn stop(self) {
        self.table
            .complete(self.stop_id, RequestStatus::Cancelled)
            .expect("stop request");
        let table = Arc::clone(&self.table);
        submit_and_wait(&self.handle, move || table.notify_pending()).expect("stop hand-off");
        self.join.join().expect("executor thread");
    }
}

fn bench_handoff(c: &mut Criterion) {
    let exec = ExecutorThread::start();

    c.bench_function("handoff/submit_and_wait", |b| {
        b.iter(|| submit_and_wait(&exec.handle, || black_box(1u64)).expect("hand-off"))
    });

    exec.stop();
}

fn bench_resolution(c: &mut Criterion) {
    let table = RequestTable::new(64);

    c.bench_function("request/register_complete_notify", |b| {
        b.iter(|| {
            let (id, fut) = table.register();
            table
                .complete(id, RequestStatus::Completed(black_box(512)))
                .expect("complete");
            let n = table.notify_pending();
            drop(fut);
            n
        })
    });

    c.bench_function("cycle/ready", |b| {
        b.iter(|| {
            let (id, _fut) = table.register();
            table.complete(id, RequestStatus::Completed(1)).expect("complete");
            run_notifier_cycle(&table, Duration::from_millis(10)).expect("cycle")
        })
    });
}

criterion_group!(benches, bench_handoff, bench_resolution);
criterion_main!(benches);
