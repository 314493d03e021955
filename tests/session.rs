mod common;

use std::sync::atomic::AtomicBool;

use classfile_inspector::interpreter::{SessionConfig, SessionState, StopReason, Value};
use classfile_inspector::{Engine, EngineConfig, EngineError, SessionError};

use common::calc_class;

fn engine() -> Engine {
    Engine::open(&calc_class().bytes(), EngineConfig::default()).unwrap()
}

fn engine_with(session: SessionConfig) -> Engine {
    let config = EngineConfig {
        session,
        ..EngineConfig::default()
    };
    Engine::open(&calc_class().bytes(), config).unwrap()
}

#[test]
fn stepping_walks_every_instruction() {
    let engine = engine();
    let mut session = engine.start_session("add", vec![Value::Int(2), Value::Int(3)]).unwrap();
    assert_eq!(session.state(), SessionState::Idle);

    let first = session.step().unwrap();
    assert_eq!(first.state, SessionState::Paused);
    assert_eq!(first.stop_reason, Some(StopReason::Step));
    assert_eq!(first.pc, Some(1));
    assert_eq!(first.line, Some(10));
    assert_eq!(first.top().unwrap().stack, [Value::Int(2)]);

    session.step().unwrap();
    let third = session.step().unwrap();
    assert_eq!(third.pc, Some(3));
    assert_eq!(third.line, Some(11));
    assert_eq!(third.top().unwrap().stack, [Value::Int(5)]);

    let last = session.step().unwrap();
    assert_eq!(last.state, SessionState::Terminated);
    assert_eq!(last.stop_reason, Some(StopReason::Terminated));
    assert_eq!(last.return_value, Some(Value::Int(5)));
    assert!(last.frames.is_empty());
    assert_eq!(last.steps, 4);
}

#[test]
fn terminated_session_refuses_commands_until_reset() {
    let engine = engine();
    let mut session = engine.start_session("add", vec![Value::Int(1), Value::Int(1)]).unwrap();
    session.run().unwrap();
    assert_eq!(session.state(), SessionState::Terminated);
    assert!(matches!(
        session.step(),
        Err(SessionError::NotRunnable {
            state: SessionState::Terminated
        })
    ));
    assert!(session.run().is_err());

    let fresh = session.reset();
    assert_eq!(fresh.state, SessionState::Idle);
    assert_eq!(session.run().unwrap().return_value, Some(Value::Int(2)));
}

#[test]
fn breakpoint_stops_at_line_start() {
    let engine = engine();
    let mut session = engine.start_session("add", vec![Value::Int(4), Value::Int(6)]).unwrap();
    session.set_breakpoint(11).unwrap();

    let hit = session.run().unwrap();
    assert_eq!(hit.state, SessionState::Paused);
    assert_eq!(hit.stop_reason, Some(StopReason::Breakpoint { line: 11 }));
    assert_eq!(hit.pc, Some(2));
    assert_eq!(hit.top().unwrap().stack, [Value::Int(4), Value::Int(6)]);

    let done = session.run().unwrap();
    assert_eq!(done.state, SessionState::Terminated);
    assert_eq!(done.return_value, Some(Value::Int(10)));
}

#[test]
fn breakpoint_on_unmapped_line_is_rejected() {
    let engine = engine();
    let mut session = engine.start_session("add", vec![]).unwrap();
    assert_eq!(
        session.set_breakpoint(999),
        Err(SessionError::InvalidBreakpoint { line: 999 })
    );
    assert!(session.breakpoints().is_empty());
}

#[test]
fn loop_breakpoint_hits_every_iteration() {
    let engine = engine();
    let mut session = engine.start_session("sumTo", vec![Value::Int(3)]).unwrap();
    session.set_breakpoint(22).unwrap();

    let mut sums = Vec::new();
    loop {
        let snapshot = session.run().unwrap();
        match snapshot.stop_reason {
            Some(StopReason::Breakpoint { line: 22 }) => {
                let top = snapshot.top().unwrap();
                let sum = top.locals.iter().find(|l| l.name.as_deref() == Some("sum")).unwrap();
                sums.push(sum.value.clone());
            }
            _ => {
                assert_eq!(snapshot.return_value, Some(Value::Int(6)));
                break;
            }
        }
    }
    assert_eq!(sums, [Value::Int(0), Value::Int(1), Value::Int(3)]);
}

#[test]
fn loop_computes_sum() {
    let engine = engine();
    let mut session = engine.start_session("sumTo", vec![Value::Int(4)]).unwrap();
    let done = session.run().unwrap();
    assert_eq!(done.state, SessionState::Terminated);
    assert_eq!(done.return_value, Some(Value::Int(10)));
}

#[test]
fn handler_catches_division_by_zero() {
    let engine = engine();
    let mut session = engine.start_session("divide", vec![Value::Int(7), Value::Int(0)]).unwrap();
    let done = session.run().unwrap();
    assert_eq!(done.return_value, Some(Value::Int(-1)));
    assert_eq!(done.uncaught_exception, None);

    let mut session = engine.start_session("divide", vec![Value::Int(7), Value::Int(2)]).unwrap();
    assert_eq!(session.run().unwrap().return_value, Some(Value::Int(3)));
}

#[test]
fn string_building_reaches_output() {
    let engine = engine();
    let mut session = engine
        .start_session("hello", vec![Value::Str("World".to_string())])
        .unwrap();
    let done = session.run().unwrap();
    assert_eq!(done.state, SessionState::Terminated);
    assert_eq!(done.output, "Hello, World\n");
    assert_eq!(done.return_value, None);
}

#[test]
fn calls_push_and_pop_frames() {
    let engine = engine();
    let mut session = engine.start_session("twice", vec![Value::Int(21)]).unwrap();
    for _ in 0..3 {
        session.step().unwrap();
    }
    let inside = session.snapshot();
    assert_eq!(inside.frames.len(), 2);
    assert_eq!(inside.method, "add:(II)I");
    assert_eq!(inside.pc, Some(0));
    assert_eq!(inside.frames[0].stack, Vec::<Value>::new());

    let done = session.run().unwrap();
    assert_eq!(done.return_value, Some(Value::Int(42)));
}

#[test]
fn breakpoint_in_callee_stops_there() {
    let engine = engine();
    let mut session = engine.start_session("twice", vec![Value::Int(5)]).unwrap();
    session.set_breakpoint(11).unwrap();
    let hit = session.run().unwrap();
    assert_eq!(hit.stop_reason, Some(StopReason::Breakpoint { line: 11 }));
    assert_eq!(hit.method, "add:(II)I");
    assert_eq!(hit.frames.len(), 2);
}

#[test]
fn runaway_loop_hits_iteration_bound() {
    let engine = engine_with(SessionConfig {
        max_iterations: 50,
        ..SessionConfig::default()
    });
    let mut session = engine.start_session("spin", vec![]).unwrap();
    let stopped = session.run().unwrap();
    assert_eq!(stopped.stop_reason, Some(StopReason::IterationBoundExceeded));
    assert_eq!(stopped.state, SessionState::Paused);
    assert_eq!(stopped.steps, 50);

    // the session stays usable
    let again = session.run().unwrap();
    assert_eq!(again.steps, 100);
}

#[test]
fn cancelled_run_stops_before_executing() {
    let engine = engine();
    let mut session = engine.start_session("spin", vec![]).unwrap();
    let cancel = AtomicBool::new(true);
    let stopped = session.run_with_cancel(&cancel).unwrap();
    assert_eq!(stopped.stop_reason, Some(StopReason::Cancelled));
    assert_eq!(stopped.steps, 0);
    assert_eq!(stopped.state, SessionState::Idle);
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn cancelling_a_paused_session_keeps_it_paused() {
    let engine = engine();
    let mut session = engine.start_session("add", vec![Value::Int(1), Value::Int(2)]).unwrap();
    session.step().unwrap();
    let stopped = session.run_with_cancel(&AtomicBool::new(true)).unwrap();
    assert_eq!(stopped.state, SessionState::Paused);
    assert_eq!(stopped.stop_reason, Some(StopReason::Cancelled));
    assert_eq!(stopped.steps, 1);
    assert_eq!(stopped.pc, Some(1));
}

#[test]
fn bad_jump_errors_the_session() {
    let engine = engine();
    let mut session = engine.start_session("escape", vec![]).unwrap();
    assert!(matches!(session.step(), Err(SessionError::Fault { pc: 0, .. })));
    assert_eq!(session.state(), SessionState::Errored);
    assert!(matches!(
        session.step(),
        Err(SessionError::NotRunnable {
            state: SessionState::Errored
        })
    ));
    assert_eq!(session.reset().state, SessionState::Idle);
}

#[test]
fn reset_restores_the_initial_snapshot() {
    let engine = engine();
    let mut session = engine.start_session("sumTo", vec![Value::Int(5)]).unwrap();
    session.set_breakpoint(24).unwrap();
    let initial = session.snapshot();

    session.step().unwrap();
    session.step().unwrap();
    let reset = session.reset();
    assert_eq!(reset, initial);
    assert_eq!(session.breakpoints(), [24]);

    let hit = session.run().unwrap();
    assert_eq!(hit.stop_reason, Some(StopReason::Breakpoint { line: 24 }));
    assert_eq!(hit.top().unwrap().locals[1].value, Value::Int(15));
}

#[test]
fn missing_arguments_are_symbolic() {
    let engine = engine();
    let mut session = engine.start_session("sumTo", vec![]).unwrap();
    let initial = session.snapshot();
    assert_eq!(initial.top().unwrap().locals[0].value, Value::Symbolic("n".to_string()));

    // a symbolic comparison does not take the branch, so the body runs once
    session.set_breakpoint(22).unwrap();
    let hit = session.run().unwrap();
    assert_eq!(hit.stop_reason, Some(StopReason::Breakpoint { line: 22 }));
}

#[test]
fn instance_method_reads_default_field() {
    let engine = engine();
    let mut session = engine.start_session("getValue", vec![]).unwrap();
    let initial = session.snapshot();
    assert!(matches!(initial.top().unwrap().locals[0].value, Value::Ref(_)));
    assert_eq!(session.run().unwrap().return_value, Some(Value::Int(0)));
}

#[test]
fn unknown_method_and_missing_code_are_reported() {
    let engine = engine();
    assert!(matches!(
        engine.start_session("nope", vec![]),
        Err(EngineError::Session(SessionError::MethodNotFound(_)))
    ));
    assert!(matches!(
        engine.start_session("area", vec![]),
        Err(EngineError::Session(SessionError::NoCode(_)))
    ));
}

#[test]
fn sessions_are_independent() {
    let engine = engine();
    let mut first = engine.start_session("sumTo", vec![Value::Int(3)]).unwrap();
    let mut second = engine.start_session("sumTo", vec![Value::Int(4)]).unwrap();
    first.step().unwrap();
    assert_eq!(second.snapshot().steps, 0);
    assert_eq!(second.run().unwrap().return_value, Some(Value::Int(10)));
    assert_eq!(first.run().unwrap().return_value, Some(Value::Int(6)));
}
