// src/main.rs
// Demo binary: runs the seed scenarios against the engine's own reference specs.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use lincheck::{Actor, ExecutionScenario, LincheckEngine, ManagedScheduler, Outcome, StrategyConfig};
use lincheck_lts::fixtures::{increment_actor, offer_actor, poll_actor, ReentrantCounterSpec};
use tracing::info;

/// S2: two threads incrementing a real `AtomicI64`-backed counter, checked
/// against [`ReentrantCounterSpec`].
fn run_counter_demo() {
    let scenario = ExecutionScenario::new(
        vec![],
        vec![
            vec![increment_actor().unwrap(), increment_actor().unwrap()],
            vec![increment_actor().unwrap(), increment_actor().unwrap()],
        ],
        vec![],
        None,
    )
    .unwrap();

    let counter = Arc::new(AtomicI64::new(0));
    let dispatcher = {
        let counter = Arc::clone(&counter);
        Arc::new(move |_tid: usize, _actor: &Actor, _scheduler: &ManagedScheduler| -> Outcome {
            Outcome::Value(serde_json::json!(counter.fetch_add(1, Ordering::SeqCst) + 1))
        })
    };

    let engine: LincheckEngine<ReentrantCounterSpec> = LincheckEngine::new(StrategyConfig::default());
    let report = engine.check_scenario(&scenario, dispatcher);

    info!(passed = report.passed(), "reentrant counter demo finished");
    println!("reentrant counter: {}", if report.passed() { "linearizable" } else { "FAILED" });
}

/// S1: a non-blocking FIFO queue guarded by a single mutex, checked against
/// [`lincheck_lts::fixtures::FifoQueueSpec`].
fn run_fifo_demo() {
    use lincheck_lts::fixtures::FifoQueueSpec;
    use std::sync::Mutex;
    use std::collections::VecDeque;

    let scenario = ExecutionScenario::new(
        vec![],
        vec![vec![offer_actor(1).unwrap(), offer_actor(2).unwrap()], vec![poll_actor().unwrap(), poll_actor().unwrap()]],
        vec![],
        None,
    )
    .unwrap();

    let queue: Arc<Mutex<VecDeque<i64>>> = Arc::new(Mutex::new(VecDeque::new()));
    let dispatcher = {
        let queue = Arc::clone(&queue);
        Arc::new(move |_tid: usize, a: &Actor, _scheduler: &ManagedScheduler| -> Outcome {
            let mut q = queue.lock().unwrap();
            match a.method() {
                "offer" => {
                    let lincheck::ArgValue::Int(v) = &a.args()[0] else { unreachable!() };
                    q.push_back(*v);
                    Outcome::Void
                }
                "poll" => match q.pop_front() {
                    Some(v) => Outcome::Value(serde_json::json!(v)),
                    None => Outcome::Value(serde_json::Value::Null),
                },
                other => panic!("unknown method {other}"),
            }
        })
    };

    let engine: LincheckEngine<FifoQueueSpec> = LincheckEngine::new(StrategyConfig::default());
    let report = engine.check_scenario(&scenario, dispatcher);

    info!(passed = report.passed(), "fifo queue demo finished");
    println!("fifo queue: {}", if report.passed() { "linearizable" } else { "FAILED" });
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    println!("lincheck demo — scenarios S1 and S2");
    run_fifo_demo();
    run_counter_demo();
}
