//! Request Notifier End-to-End Smoke Test
//!
//! Tests the full stack:
//!   Part A: Configuration: defaults, environment, validation
//!   Part B: Notifier cycle: populate, wait, resolve without a driver
//!   Part C: Driver thread: resolution through the local executor
//!   Part D: Shutdown: control message, worker shutdown, unknown tokens
//!
//! Run: ./target/release/notifier-smoke
//! Set NOTIFIER_LOG_LEVEL=debug for driver logs.

use notifier_core::log;
use notifier_core::{NotifyError, RequestNotifier, WaitOutcome};

use notifier_runtime::{
    control_channel, run_notifier_cycle, submit_and_wait, CycleOutcome, LocalExecutor,
    NotifierConfig, NotifierThread, RequestStatus, RequestTable, StopReason, TaskOutcome,
};

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// ── Report ──

const RULE: &str = "════════════════════════════════════════════════════════════";

/// Collects check results per part and lists the failures at the end.
struct Report {
    part: &'static str,
    checks: usize,
    failures: Vec<(&'static str, String, String)>,
}

impl Report {
    fn new() -> Self {
        Self { part: "", checks: 0, failures: Vec::new() }
    }

    fn part(&mut self, name: &'static str) {
        self.part = name;
        println!("\n{}\n {}\n{}", RULE, name, RULE);
    }

    fn ok(&mut self, name: &str) {
        self.checks += 1;
        println!("  {:>3}  ok    {}", self.checks, name);
    }

    fn bad(&mut self, name: &str, reason: &str) {
        self.checks += 1;
        println!("  {:>3}  FAIL  {} ({})", self.checks, name, reason);
        self.failures.push((self.part, name.to_string(), reason.to_string()));
    }

    fn expect(&mut self, name: &str, ok: bool, reason: &str) {
        if ok {
            self.ok(name)
        } else {
            self.bad(name, reason)
        }
    }

    /// Print the tally and return the process exit code.
    fn finish(&self) -> i32 {
        println!("\n{}", RULE);
        println!(" {} checks, {} failed", self.checks, self.failures.len());
        for (part, name, reason) in &self.failures {
            println!("   [{}] {}: {}", part, name, reason);
        }
        println!("{}", RULE);
        if self.failures.is_empty() { 0 } else { 1 }
    }
}

/// Keep the executor turning until the driver thread exits.
fn drain_until_finished(ex: &LocalExecutor, driver: &NotifierThread, limit: Duration) -> bool {
    let start = Instant::now();
    while !driver.is_finished() {
        if start.elapsed() > limit {
            return false;
        }
        ex.run_until_idle();
        thread::sleep(Duration::from_millis(1));
    }
    true
}

fn smoke_config(name: &str) -> NotifierConfig {
    NotifierConfig::new()
        .wait_timeout(Duration::from_millis(20))
        .pool_size(8)
        .thread_name(name)
}

// ════════════════════════════════════════════════════════════
// Part A: Configuration
// ════════════════════════════════════════════════════════════

fn test_config(t: &mut Report) {
    t.part("Part A: Configuration");

    let config = NotifierConfig::from_env();
    config.print();
    t.expect("from_env() validates", config.validate().is_ok(), "invalid environment config");

    let zero = NotifierConfig::new().wait_timeout(Duration::ZERO);
    t.expect("zero wait timeout rejected", zero.validate().is_err(), "accepted");

    let no_name = NotifierConfig::new().thread_name("");
    t.expect("empty thread name rejected", no_name.validate().is_err(), "accepted");

    let small_stack = NotifierConfig::new().stack_size(4096);
    t.expect("tiny stack rejected", small_stack.validate().is_err(), "accepted");

    let (_tx, rx) = control_channel(1);
    let table = Arc::new(RequestTable::new(1));
    let ex = LocalExecutor::new();
    let res = NotifierThread::spawn(table, ex.handle(), rx, &zero);
    t.expect(
        "spawn refuses bad config",
        matches!(res, Err(NotifyError::Config(_))),
        "driver started",
    );
}

// ════════════════════════════════════════════════════════════
// Part B: Notifier cycle
// ════════════════════════════════════════════════════════════

fn test_cycle(t: &mut Report) {
    t.part("Part B: Notifier cycle");

    let table = RequestTable::new(4);
    let ex = LocalExecutor::new();
    let timeout = Duration::from_millis(10);

    let start = Instant::now();
    let out = run_notifier_cycle(&table, timeout);
    t.expect(
        "idle cycle times out",
        matches!(out, Ok(CycleOutcome::Continue)) && start.elapsed() >= timeout,
        &format!("{:?}", out),
    );
    t.expect("populate fills pool", table.pool_len() == 4, &format!("pool={}", table.pool_len()));

    let (id, fut) = table.register();
    let completed = table.complete(id, RequestStatus::Completed(42));
    t.expect("complete registered request", completed.is_ok(), &format!("{:?}", completed));

    let out = run_notifier_cycle(&table, timeout);
    t.expect("ready cycle continues", matches!(out, Ok(CycleOutcome::Continue)), &format!("{:?}", out));

    let status = ex.block_on(fut);
    t.expect(
        "future resolved by cycle",
        status == RequestStatus::Completed(42),
        &format!("{:?}", status),
    );

    let unknown = table.complete(id, RequestStatus::Cancelled);
    t.expect(
        "second completion rejected",
        unknown == Err(NotifyError::UnknownRequest(id.0)),
        &format!("{:?}", unknown),
    );

    table.stop();
    let out = run_notifier_cycle(&table, timeout);
    t.expect("stopped worker finishes cycle", matches!(out, Ok(CycleOutcome::Finished)), &format!("{:?}", out));
}

// ════════════════════════════════════════════════════════════
// Part C: Driver thread
// ════════════════════════════════════════════════════════════

fn test_driver(t: &mut Report) {
    t.part("Part C: Driver thread");

    let config = smoke_config("notifier-smoke-c");
    let table = Arc::new(RequestTable::new(config.pool_size));
    let ex = LocalExecutor::new();
    let (tx, rx) = control_channel(config.control_capacity);

    let driver = match NotifierThread::spawn(Arc::clone(&table), ex.handle(), rx, &config) {
        Ok(d) => { t.ok("spawn driver"); d }
        Err(e) => { t.bad("spawn driver", &e.to_string()); return; }
    };
    t.expect("driver thread named", driver.name() == "notifier-smoke-c", driver.name());

    const N: usize = 32;
    let mut futs = Vec::with_capacity(N);
    let mut ids = Vec::with_capacity(N);
    for _ in 0..N {
        let (id, fut) = table.register();
        ids.push(id);
        futs.push(fut);
    }

    let progress_table = Arc::clone(&table);
    let progress = thread::spawn(move || {
        for (i, id) in ids.into_iter().enumerate() {
            if i % 4 == 0 {
                thread::sleep(Duration::from_millis(2));
            }
            let _ = progress_table.complete(id, RequestStatus::Completed(i));
        }
    });

    let results = ex.block_on(async move {
        let mut out = Vec::with_capacity(N);
        for fut in futs {
            out.push(fut.await);
        }
        out
    });
    let _ = progress.join();

    let in_order = results
        .iter()
        .enumerate()
        .all(|(i, s)| *s == RequestStatus::Completed(i));
    t.expect(&format!("{} requests resolved", N), in_order, "wrong statuses");

    // Hand-off of an arbitrary task through the same executor
    let handle = ex.handle();
    let side = thread::spawn(move || submit_and_wait(&handle, || thread::current().name().map(str::to_string)));
    let start = Instant::now();
    while !side.is_finished() && start.elapsed() < Duration::from_secs(5) {
        ex.run_until_idle();
        thread::sleep(Duration::from_millis(1));
    }
    match side.join() {
        Ok(Ok(TaskOutcome::Completed(_))) => t.ok("submit_and_wait round trip"),
        other => t.bad("submit_and_wait round trip", &format!("{:?}", other)),
    }

    let _ = tx.shutdown();
    if !drain_until_finished(&ex, &driver, Duration::from_secs(5)) {
        t.bad("driver stops on shutdown", "timed out");
        return;
    }
    match driver.join() {
        Ok(stats) => {
            t.expect(
                "stop reason is shutdown message",
                stats.stop_reason == Some(StopReason::ShutdownMessage),
                &format!("{:?}", stats.stop_reason),
            );
            t.expect(
                "resolved count matches",
                stats.resolved == N as u64,
                &format!("resolved={}", stats.resolved),
            );
            println!("       {:?}", stats);
        }
        Err(e) => t.bad("driver joins cleanly", &e.to_string()),
    }
}

// ════════════════════════════════════════════════════════════
// Part D: Shutdown paths
// ════════════════════════════════════════════════════════════

fn test_shutdown(t: &mut Report) {
    t.part("Part D: Shutdown paths");

    // D1: worker shutdown
    let config = smoke_config("notifier-smoke-d1");
    let table = Arc::new(RequestTable::new(config.pool_size));
    let ex = LocalExecutor::new();
    let (tx, rx) = control_channel(config.control_capacity);
    match NotifierThread::spawn(Arc::clone(&table), ex.handle(), rx, &config) {
        Ok(driver) => {
            let _ = tx.send("ping");
            thread::sleep(Duration::from_millis(50));
            table.stop();
            let stopped = drain_until_finished(&ex, &driver, Duration::from_secs(5));
            t.expect("driver stops on worker shutdown", stopped, "timed out");
            match driver.join() {
                Ok(stats) => {
                    t.expect(
                        "stop reason is worker shutdown",
                        stats.stop_reason == Some(StopReason::WorkerShutdown),
                        &format!("{:?}", stats.stop_reason),
                    );
                    t.expect(
                        "unknown token counted",
                        stats.unknown_messages == 1,
                        &format!("unknown={}", stats.unknown_messages),
                    );
                }
                Err(e) => t.bad("driver joins cleanly", &e.to_string()),
            }
        }
        Err(e) => t.bad("spawn driver", &e.to_string()),
    }

    // D2: shutdown latency is bounded by the wait timeout
    let config = smoke_config("notifier-smoke-d2").wait_timeout(Duration::from_millis(50));
    let table = Arc::new(RequestTable::new(config.pool_size));
    let ex = LocalExecutor::new();
    let (tx, rx) = control_channel(config.control_capacity);
    match NotifierThread::spawn(Arc::clone(&table), ex.handle(), rx, &config) {
        Ok(driver) => {
            thread::sleep(Duration::from_millis(20));
            let start = Instant::now();
            let _ = tx.shutdown();
            let stopped = drain_until_finished(&ex, &driver, Duration::from_secs(5));
            let elapsed = start.elapsed();
            t.expect(
                "shutdown within one timeout period",
                stopped && elapsed < Duration::from_millis(500),
                &format!("{:?}", elapsed),
            );
            let _ = driver.join();
        }
        Err(e) => t.bad("spawn driver", &e.to_string()),
    }

    // D3: closed scheduler is fatal for the driver
    let config = smoke_config("notifier-smoke-d3");
    let table = Arc::new(RequestTable::new(config.pool_size));
    let ex = LocalExecutor::new();
    let handle = ex.handle();
    handle.close();
    let (_tx, rx) = control_channel(config.control_capacity);
    match NotifierThread::spawn(Arc::clone(&table), handle, rx, &config) {
        Ok(driver) => {
            let (id, _fut) = table.register();
            let _ = table.complete(id, RequestStatus::Completed(1));
            let res = driver.join();
            t.expect(
                "closed scheduler stops driver",
                res == Err(NotifyError::SchedulerClosed),
                &format!("{:?}", res),
            );
        }
        Err(e) => t.bad("spawn driver", &e.to_string()),
    }

    let outcome = table.wait(Duration::ZERO);
    t.expect(
        "undrained completion still visible",
        matches!(outcome, Ok(WaitOutcome::Ready)),
        &format!("{:?}", outcome),
    );
}

fn main() {
    log::init();
    log::init_tracing();
    println!("=== Request Notifier End-to-End Smoke Test ===");

    let mut t = Report::new();

    test_config(&mut t);
    test_cycle(&mut t);
    test_driver(&mut t);
    test_shutdown(&mut t);

    std::process::exit(t.finish());
}
