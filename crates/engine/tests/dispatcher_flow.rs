//! End-to-end dispatcher flows against recording doubles.

use callmeter_config::{InstrumentationConfig, InstrumentationEnv, apply_env_overrides};
use callmeter_domain::{InvocationType, MetricKey, MetricKind, OperationName};
use callmeter_engine::{EngineDeps, InstrumentedDispatcher, RequestLine, TimerClient};
use callmeter_ports::{IdentityError, IdentityPort, UserId};
use callmeter_testkit::{CapturingLogger, FixedCpuClock, ManualClock, RecordingSink};
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::{Arc, Barrier};

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct Bob;

impl IdentityPort for Bob {
    fn current_user_id(&self) -> Result<UserId, IdentityError> {
        UserId::parse("bob").map_err(IdentityError::Invalid)
    }
}

struct World {
    clock: Arc<ManualClock>,
    sink: Arc<RecordingSink>,
    dispatcher: InstrumentedDispatcher,
}

fn world(config: InstrumentationConfig) -> Result<World, Box<dyn std::error::Error>> {
    let config = apply_env_overrides(config, &InstrumentationEnv::default())?;
    let clock = Arc::new(ManualClock::new(1_000_000));
    let sink = Arc::new(RecordingSink::new());
    let deps = EngineDeps {
        clock: clock.clone(),
        cpu_clock: Arc::new(FixedCpuClock::new(0)),
        logger: Arc::new(CapturingLogger::new()),
    };
    let client = Arc::new(TimerClient::new(
        "default",
        &deps,
        sink.clone(),
        config.metrics.window_ms,
    ));
    let dispatcher = InstrumentedDispatcher::from_config(&config, client, Arc::new(Bob), &deps);
    Ok(World {
        clock,
        sink,
        dispatcher,
    })
}

#[test]
fn concurrent_invocations_see_distinct_levels() -> TestResult {
    const WORKERS: usize = 8;
    let world = world(InstrumentationConfig::default())?;
    let operation = OperationName::parse("search")?;
    let barrier = Barrier::new(WORKERS);

    std::thread::scope(|scope| {
        for _ in 0..WORKERS {
            scope.spawn(|| {
                let _: Result<(), ()> = world.dispatcher.instrument_rpc(&operation, || {
                    barrier.wait();
                    Ok(())
                });
            });
        }
    });

    let mut levels: Vec<i64> = world
        .sink
        .emissions_for(&MetricKey::parse("server/rpc/_concurrency")?)
        .into_iter()
        .filter_map(|(_, values)| values.first().copied())
        .collect();
    levels.sort_unstable();
    assert_eq!(levels, (1..=8).collect::<Vec<i64>>());
    assert_eq!(world.dispatcher.in_flight(&InvocationType::rpc()), 0);
    assert_eq!(
        world
            .sink
            .emissions_for(&MetricKey::parse("server/rpc/search")?)
            .len(),
        WORKERS
    );
    Ok(())
}

#[test]
fn errors_pass_through_with_one_decrement() -> TestResult {
    #[derive(Debug, PartialEq, Eq)]
    struct Declined(u16);

    let world = world(InstrumentationConfig::default())?;
    let operation = OperationName::parse("charge")?;

    for _ in 0..3 {
        let outcome: Result<(), Declined> =
            world.dispatcher.instrument_rpc(&operation, || Err(Declined(402)));
        assert_eq!(outcome, Err(Declined(402)));
        assert_eq!(world.dispatcher.in_flight(&InvocationType::rpc()), 0);
    }

    assert_eq!(
        world
            .sink
            .emissions_for(&MetricKey::parse("server/rpc/charge/_errors")?),
        vec![(MetricKind::CounterDelta, vec![1]); 3]
    );
    assert_eq!(
        world
            .dispatcher
            .client()
            .registry()
            .counter(&MetricKey::parse("server/rpc/charge/_errors")?)
            .value(),
        3
    );
    Ok(())
}

#[test]
fn panics_still_finalize() -> TestResult {
    let world = world(InstrumentationConfig::default())?;
    let operation = OperationName::parse("explode")?;

    let unwound = catch_unwind(AssertUnwindSafe(|| {
        let _: Result<(), ()> = world
            .dispatcher
            .instrument_rpc(&operation, || resume_unwind(Box::new("boom")));
    }));

    assert!(unwound.is_err());
    assert_eq!(world.dispatcher.in_flight(&InvocationType::rpc()), 0);
    assert_eq!(world.dispatcher.client().timer().depth(), 0);
    assert_eq!(
        world.sink.flushed(),
        vec![
            "server/rpc/explode".to_string(),
            "user:bob/server/rpc/explode".to_string()
        ]
    );
    Ok(())
}

#[test]
fn nested_invocations_time_independently() -> TestResult {
    let world = world(InstrumentationConfig::default())?;
    let outer = OperationName::parse("checkout")?;
    let inner = OperationName::parse("reserve")?;

    let _: Result<(), ()> = world.dispatcher.instrument_rpc(&outer, || {
        world.clock.advance(5);
        let nested = world.dispatcher.instrument_rpc(&inner, || {
            world.clock.advance(20);
            Ok(())
        });
        world.clock.advance(5);
        nested
    });

    assert_eq!(
        world
            .sink
            .emissions_for(&MetricKey::parse("server/rpc/reserve")?),
        vec![(MetricKind::ElapsedCpu, vec![20, 0])]
    );
    assert_eq!(
        world
            .sink
            .emissions_for(&MetricKey::parse("server/rpc/checkout")?),
        vec![(MetricKind::ElapsedCpu, vec![30, 0])]
    );
    Ok(())
}

#[test]
fn configured_layout_is_respected() -> TestResult {
    let mut config = InstrumentationConfig::default();
    config.dispatcher.component_key = "gateway".to_string();
    config.dispatcher.user_prefix = "u.".to_string();
    let world = world(config)?;

    let request = RequestLine {
        method: "get",
        path: "orders",
    };
    let _: Result<(), ()> = world.dispatcher.instrument_http(&request, || Ok(()));

    let names = world.sink.emitted_names();
    assert!(names.iter().any(|name| name == "gateway/GET/orders"));
    assert!(names.iter().any(|name| name == "u.bob/gateway/GET/orders"));
    assert!(names.iter().any(|name| name == "gateway/GET/_total"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_invocations_keep_their_own_frames() -> TestResult {
    let world = Arc::new(world(InstrumentationConfig::default())?);
    let rpc = InvocationType::rpc();

    let mut handles = Vec::new();
    for n in 0..4 {
        let world = Arc::clone(&world);
        let rpc = rpc.clone();
        handles.push(tokio::spawn(async move {
            let operation = OperationName::parse(format!("task{n}"))?;
            let outcome: Result<u32, ()> = world
                .dispatcher
                .instrument_async(&rpc, &operation, async move {
                    tokio::task::yield_now().await;
                    Ok(n)
                })
                .await;
            Ok::<_, callmeter_domain::PrimitiveError>(outcome)
        }));
    }

    for (n, handle) in (0..4).zip(handles) {
        assert_eq!(handle.await??, Ok(n));
    }
    for n in 0..4 {
        let key = MetricKey::parse(format!("server/rpc/task{n}"))?;
        assert_eq!(world.sink.emissions_for(&key).len(), 1);
    }
    assert_eq!(
        world
            .sink
            .emissions_for(&MetricKey::parse("server/rpc/_concurrency")?)
            .len(),
        4
    );
    Ok(())
}
