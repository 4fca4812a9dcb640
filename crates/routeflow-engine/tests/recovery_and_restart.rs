//! Recovery-route interposition, error forwarding, cancellation and warm
//! restart from persisted snapshots.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, mpsc};

use serde_json::json;

use routeflow_core::{
    Context, MACHINE_STATUS_KEY, MachineStatus, RunStatus, Snapshot, StepError,
};
use routeflow_engine::{CancelToken, Orchestrator, RECOVERY_ROUTE_ID, RunError};
use routeflow_journal::{Caretaker, FileCaretaker, MemoryCaretaker};
use routeflow_route::{NonTransactionalRoute, SagaStep, TransactionalRoute};

type OpLog = Arc<Mutex<Vec<String>>>;

struct CountingStep {
    name: &'static str,
    calls: Arc<AtomicUsize>,
}

impl SagaStep for CountingStep {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, _ctx: &Context) -> Result<(), StepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct LoggedStep {
    name: &'static str,
    log: OpLog,
    fail: bool,
}

impl SagaStep for LoggedStep {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, _ctx: &Context) -> Result<(), StepError> {
        push(&self.log, format!("do {}", self.name));
        if self.fail {
            return Err(format!("{} blew up", self.name).into());
        }
        Ok(())
    }

    fn compensate(&self, _ctx: &Context) {
        push(&self.log, format!("undo {}", self.name));
    }
}

struct CancellingStep {
    name: &'static str,
    token: CancelToken,
}

impl SagaStep for CancellingStep {
    fn name(&self) -> &str {
        self.name
    }

    fn execute(&self, _ctx: &Context) -> Result<(), StepError> {
        self.token.cancel();
        Ok(())
    }
}

fn push(log: &OpLog, entry: String) {
    log.lock().unwrap_or_else(PoisonError::into_inner).push(entry);
}

fn entries(log: &OpLog) -> Vec<String> {
    log.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

fn counting(name: &'static str, calls: &Arc<AtomicUsize>) -> CountingStep {
    CountingStep {
        name,
        calls: Arc::clone(calls),
    }
}

fn ok(name: &'static str, log: &OpLog) -> LoggedStep {
    LoggedStep {
        name,
        log: Arc::clone(log),
        fail: false,
    }
}

fn failing(name: &'static str, log: &OpLog) -> LoggedStep {
    LoggedStep {
        name,
        log: Arc::clone(log),
        fail: true,
    }
}

fn orchestrator_with_journal() -> (Orchestrator, Arc<MemoryCaretaker>) {
    let caretaker = Arc::new(MemoryCaretaker::new());
    let orchestrator = Orchestrator::new(Box::new(Arc::clone(&caretaker)));
    (orchestrator, caretaker)
}

#[test]
fn recovery_route_runs_once_per_failure_and_errors_reach_the_sink() -> anyhow::Result<()> {
    let log: OpLog = Arc::default();
    let recoveries = Arc::new(AtomicUsize::new(0));
    let (mut orchestrator, _caretaker) = orchestrator_with_journal();

    orchestrator.register(
        TransactionalRoute::new("main")
            .add_next_step(ok("prepare", &log))
            .add_next_step(failing("commit", &log))
            .build()?,
    )?;

    let recovery = {
        let recoveries = Arc::clone(&recoveries);
        NonTransactionalRoute::new("cleanup")
            .add_next_step("alert", move |_ctx| {
                recoveries.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()?
    };
    orchestrator.initialize(Some(recovery))?;

    let (sink, drain) = mpsc::channel();
    let status = orchestrator.exec("main", &Context::new(), Some(&sink))?;
    drop(sink);

    assert_eq!(status, RunStatus::Fail);
    assert_eq!(recoveries.load(Ordering::SeqCst), 1);
    assert_eq!(
        entries(&log),
        vec!["do prepare", "do commit", "undo prepare"]
    );

    let forwarded: Vec<RunError> = drain.iter().collect();
    assert_eq!(forwarded.len(), 1);
    assert!(matches!(
        &forwarded[0],
        RunError::Step { route, state, .. }
            if route == "main" && state == "main_commit"
    ));
    Ok(())
}

#[test]
fn recovery_errors_are_forwarded_but_never_recurse() -> anyhow::Result<()> {
    let log: OpLog = Arc::default();
    let recovery_attempts = Arc::new(AtomicUsize::new(0));
    let (mut orchestrator, _caretaker) = orchestrator_with_journal();

    orchestrator.register(
        TransactionalRoute::new("main")
            .add_next_step(ok("prepare", &log))
            .add_next_step(failing("commit", &log))
            .build()?,
    )?;

    let recovery = {
        let recovery_attempts = Arc::clone(&recovery_attempts);
        NonTransactionalRoute::new("cleanup")
            .add_next_step("broken_alert", move |_ctx| {
                recovery_attempts.fetch_add(1, Ordering::SeqCst);
                Err("pager is down".into())
            })
            .build()?
    };
    orchestrator.initialize(Some(recovery))?;

    let (sink, drain) = mpsc::channel();
    let status = orchestrator.exec("main", &Context::new(), Some(&sink))?;
    drop(sink);

    assert_eq!(status, RunStatus::Fail);
    assert_eq!(recovery_attempts.load(Ordering::SeqCst), 1);
    // the main rollback still completed
    assert!(entries(&log).contains(&"undo prepare".to_string()));

    let forwarded: Vec<RunError> = drain.iter().collect();
    assert!(forwarded.iter().any(|error| matches!(
        error,
        RunError::Step { route, .. } if route == RECOVERY_ROUTE_ID
    )));
    Ok(())
}

#[test]
fn recovery_sees_the_failure_context_but_its_writes_stay_isolated() -> anyhow::Result<()> {
    struct TaggingStep {
        log: OpLog,
    }

    impl SagaStep for TaggingStep {
        fn name(&self) -> &str {
            "tag"
        }

        fn execute(&self, ctx: &Context) -> Result<(), StepError> {
            push(&self.log, "do tag".to_string());
            ctx.set_variable("order", "o-99");
            Ok(())
        }
    }

    let log: OpLog = Arc::default();
    let observed = Arc::new(Mutex::new(None));
    let (mut orchestrator, _caretaker) = orchestrator_with_journal();

    orchestrator.register(
        TransactionalRoute::new("main")
            .add_next_step(TaggingStep {
                log: Arc::clone(&log),
            })
            .add_next_step(failing("commit", &log))
            .build()?,
    )?;

    let recovery = {
        let observed = Arc::clone(&observed);
        NonTransactionalRoute::new("cleanup")
            .add_next_step("inspect", move |ctx| {
                *observed.lock().unwrap_or_else(PoisonError::into_inner) =
                    ctx.variable("order");
                ctx.set_variable("recovery_note", "paged on-call");
                Ok(())
            })
            .build()?
    };
    orchestrator.initialize(Some(recovery))?;

    let ctx = Context::new();
    orchestrator.exec("main", &ctx, None)?;

    let seen = observed
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    assert_eq!(seen, Some(serde_json::Value::from("o-99")));
    // the diversion ran on a copy; the live context is untouched
    assert_eq!(ctx.variable("recovery_note"), None);
    Ok(())
}

#[test]
fn warm_up_resumes_a_mid_route_snapshot() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let (mut orchestrator, caretaker) = orchestrator_with_journal();

    orchestrator.register(
        TransactionalRoute::new("staged")
            .add_next_step(counting("one", &calls))
            .add_next_step(counting("two", &calls))
            .add_next_step(counting("three", &calls))
            .build()?,
    )?;
    orchestrator.initialize(None)?;

    // a crash left the walk parked on the second state
    let parked = json!({
        "route_id": "staged",
        "step": 1,
        "state": 1,
        "machine": "IN_PROGRESS",
        "status": "UNKNOWN",
        "context": {
            "gid": "resume-gid",
            "variables": { MACHINE_STATUS_KEY: "IN_PROGRESS" },
            "constants": {}
        }
    });
    caretaker.persist("staged", &parked.to_string())?;

    let status = orchestrator.warm_up("staged", None)?;

    assert_eq!(status, Some(RunStatus::Success));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let data = caretaker
        .get("staged")?
        .ok_or_else(|| anyhow::anyhow!("terminal snapshot missing"))?;
    let terminal: Snapshot = serde_json::from_str(&data)?;
    assert_eq!(terminal.step, 3);
    assert_eq!(terminal.machine, MachineStatus::Closed);
    assert_eq!(terminal.status, RunStatus::Success);
    assert_eq!(terminal.context.gid, "resume-gid");
    Ok(())
}

#[test]
fn warm_up_without_a_snapshot_starts_cold() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let (mut orchestrator, _caretaker) = orchestrator_with_journal();

    orchestrator.register(
        TransactionalRoute::new("staged")
            .add_next_step(counting("one", &calls))
            .build()?,
    )?;
    orchestrator.initialize(None)?;

    assert_eq!(orchestrator.warm_up("staged", None)?, None);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn warm_up_degrades_invalid_snapshots_to_cold_start() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let (mut orchestrator, caretaker) = orchestrator_with_journal();

    orchestrator.register(
        TransactionalRoute::new("staged")
            .add_next_step(counting("one", &calls))
            .build()?,
    )?;
    orchestrator.initialize(None)?;

    let context = json!({
        "gid": "g",
        "variables": {},
        "constants": {}
    });
    let rejected = [
        // not a snapshot at all
        json!("scrambled bytes").to_string(),
        // empty route id
        json!({
            "route_id": "", "step": 0, "state": 0,
            "machine": "IN_PROGRESS", "status": "UNKNOWN", "context": context
        })
        .to_string(),
        // rollback underflow sentinel
        json!({
            "route_id": "staged", "step": -1, "state": 0,
            "machine": "CLOSED", "status": "FAIL", "context": context
        })
        .to_string(),
        // machine state outside the enum
        json!({
            "route_id": "staged", "step": 0, "state": 0,
            "machine": "HALTED", "status": "UNKNOWN", "context": context
        })
        .to_string(),
        // state reference outside the registered graph
        json!({
            "route_id": "staged", "step": 0, "state": 9999,
            "machine": "IN_PROGRESS", "status": "UNKNOWN", "context": context
        })
        .to_string(),
    ];

    for payload in rejected {
        caretaker.persist("staged", &payload)?;
        assert_eq!(
            orchestrator.warm_up("staged", None)?,
            None,
            "payload must degrade to cold start: {payload}"
        );
    }

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn cancellation_stops_the_walk_between_steps() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let token = CancelToken::new();
    let (mut orchestrator, _caretaker) = orchestrator_with_journal();

    orchestrator.register(
        TransactionalRoute::new("cancellable")
            .add_next_step(CancellingStep {
                name: "trip",
                token: token.clone(),
            })
            .add_next_step(counting("after", &calls))
            .build()?,
    )?;
    orchestrator.initialize(None)?;

    let status = orchestrator.exec_with_cancel("cancellable", &Context::new(), None, &token)?;

    assert_eq!(status, RunStatus::Fail);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn a_pre_cancelled_token_prevents_any_step() -> anyhow::Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let token = CancelToken::new();
    token.cancel();
    let (mut orchestrator, _caretaker) = orchestrator_with_journal();

    orchestrator.register(
        TransactionalRoute::new("cancellable")
            .add_next_step(counting("one", &calls))
            .build()?,
    )?;
    orchestrator.initialize(None)?;

    let status = orchestrator.exec_with_cancel("cancellable", &Context::new(), None, &token)?;

    assert_eq!(status, RunStatus::Fail);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn file_backed_journal_records_the_failed_run() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let caretaker = FileCaretaker::new(dir.path())?;
    let log: OpLog = Arc::default();

    let mut orchestrator = Orchestrator::new(Box::new(caretaker));
    orchestrator.register(
        TransactionalRoute::new("order")
            .add_next_step(ok("reserve", &log))
            .add_next_step(failing("charge", &log))
            .build()?,
    )?;
    orchestrator.initialize(None)?;

    let status = orchestrator.exec("order", &Context::new(), None)?;
    orchestrator.shutdown()?;

    assert_eq!(status, RunStatus::Fail);

    let reader = FileCaretaker::new(dir.path())?;
    let data = reader
        .get("order")?
        .ok_or_else(|| anyhow::anyhow!("journal is empty"))?;
    let terminal: Snapshot = serde_json::from_str(&data)?;
    assert_eq!(terminal.step, -1);
    assert_eq!(terminal.machine, MachineStatus::Closed);
    assert_eq!(terminal.status, RunStatus::Fail);
    Ok(())
}
