//! Driver sequencing: state-machine call order, bounded polling,
//! lookup policy, and cancellation, all observed through the in-memory
//! engine's call journal.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use common::*;
use visiontrain::engine::memory::Call;
use visiontrain::progress::{ChannelSink, NullSink, ProgressEvent};
use visiontrain::stages;

fn position<F>(calls: &[Call], from: usize, what: &str, pred: F) -> usize
where
    F: Fn(&Call) -> bool,
{
    calls
        .iter()
        .skip(from)
        .position(pred)
        .map(|i| i + from)
        .unwrap_or_else(|| panic!("call not found: {what}"))
}

#[test]
fn train_waits_for_flag_and_children_wait_for_final_process() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write_image(dir.path(), "good (1).png");
    write_image(dir.path(), "bad_defect (1).png");

    let child = Stage::new("Analyze", ToolKind::Analyze, stages::analyze_config())
        .with_label("'good'", "")
        .with_label("'bad'", "defect");
    let root = locate_stage(vec![entry("good (1).png")]).add_child(child);
    let plan = TrainingPlan::new(dir.path(), root);

    let mut engine = MemoryEngine::new("test");
    engine.polls_per_operation = 1;
    let sink = NullSink;
    PipelineDriver::new(&mut engine, &sink)
        .with_poll_interval(Duration::from_millis(1))
        .run(&plan)?;

    let calls = &engine.calls;
    let flag = position(calls, 0, "set_train_flag(0)", |c| {
        matches!(c, Call::SetTrainFlag { tool: 0, .. })
    });
    let train = position(calls, 0, "train(0)", |c| matches!(c, Call::Train(0)));
    assert!(flag < train, "train flag must be set before training starts");

    // The post-training process must fully complete before the child
    // tool exists.
    let train_done = position(calls, train, "train completion", |c| {
        matches!(c, Call::Wait { tool: 0, done: true })
    });
    let final_process = position(calls, train_done, "final process(0)", |c| {
        matches!(c, Call::Process(0))
    });
    let final_done = position(calls, final_process, "final process completion", |c| {
        matches!(c, Call::Wait { tool: 0, done: true })
    });
    let child_added = position(calls, 0, "child tool creation", |c| {
        matches!(c, Call::AddTool { parent: Some(0), .. })
    });
    assert!(
        final_done < child_added,
        "next cascade stage started before the parent's post-training process completed"
    );
    Ok(())
}

#[test]
fn polling_stops_exactly_when_wait_completes() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write_image(dir.path(), "good (1).png");

    let plan = TrainingPlan::new(dir.path(), locate_stage(vec![entry("good (1).png")]));

    let mut engine = MemoryEngine::new("test");
    engine.polls_per_operation = 3;
    let (tx, rx) = mpsc::channel();
    let sink = ChannelSink::new(tx);
    PipelineDriver::new(&mut engine, &sink)
        .with_poll_interval(Duration::from_millis(1))
        .run(&plan)?;

    // Three polled operations (process, train, final process), each
    // completing on its fourth wait.
    let waits: Vec<bool> = engine
        .calls
        .iter()
        .filter_map(|c| match c {
            Call::Wait { done, .. } => Some(*done),
            _ => None,
        })
        .collect();
    assert_eq!(waits.len(), 12);
    for chunk in waits.chunks(4) {
        assert_eq!(chunk, [false, false, false, true]);
    }

    // One tick per unfinished poll, none after completion.
    let ticks = rx
        .try_iter()
        .filter(|e| matches!(e, ProgressEvent::TrainingTick { .. }))
        .count();
    assert_eq!(ticks, 9);
    Ok(())
}

#[test]
fn lenient_lookup_skips_missing_samples() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write_image(dir.path(), "a.png");
    write_image(dir.path(), "b.png");
    write_image(dir.path(), "c.png");

    let entries = vec![entry("a.png"), entry("b.png"), entry("bogus.png")];
    let plan = TrainingPlan::new(dir.path(), locate_stage(entries));

    let mut engine = MemoryEngine::new("test");
    let (tx, rx) = mpsc::channel();
    let sink = ChannelSink::new(tx);
    let report = PipelineDriver::new(&mut engine, &sink)
        .with_poll_interval(Duration::from_millis(1))
        .with_lookup_policy(LookupPolicy::Lenient)
        .run(&plan)?;

    assert_eq!(report.stages[0].annotations_applied, 2);
    assert_eq!(report.stages[0].annotations_skipped, 1);
    assert!(engine.sample("a.png").unwrap().features.contains_key("object"));
    assert!(engine.sample("c.png").unwrap().features.is_empty());

    let skips: Vec<ProgressEvent> = rx
        .try_iter()
        .filter(|e| matches!(e, ProgressEvent::AnnotationSkipped { .. }))
        .collect();
    assert_eq!(skips.len(), 1);
    assert!(matches!(
        &skips[0],
        ProgressEvent::AnnotationSkipped { sample, .. } if sample == "bogus.png"
    ));
    Ok(())
}

#[test]
fn strict_lookup_aborts_on_first_miss() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write_image(dir.path(), "a.png");

    let entries = vec![entry("a.png"), entry("bogus.png")];
    let plan = TrainingPlan::new(dir.path(), locate_stage(entries));

    let mut engine = MemoryEngine::new("test");
    let sink = NullSink;
    let err = PipelineDriver::new(&mut engine, &sink)
        .with_poll_interval(Duration::from_millis(1))
        .with_lookup_policy(LookupPolicy::Strict)
        .run(&plan)
        .unwrap_err();

    assert!(matches!(
        &err,
        PipelineError::LookupMiss { sample, .. } if sample == "bogus.png"
    ));
    Ok(())
}

#[test]
fn cancellation_stops_polling_and_releases_the_engine() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    write_image(dir.path(), "a.png");
    let plan = TrainingPlan::new(dir.path(), locate_stage(vec![entry("a.png")]));

    let released = Arc::new(AtomicBool::new(false));
    let token = CancelToken::new();
    token.cancel();

    {
        let mut engine = MemoryEngine::new("test");
        engine.release_flag = Some(released.clone());
        let sink = NullSink;
        let err = PipelineDriver::new(&mut engine, &sink)
            .with_cancel_token(token)
            .run(&plan)
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled(_)));
        // Polling never started: a cancelled run makes no wait call.
        assert!(
            engine
                .calls
                .iter()
                .all(|c| !matches!(c, Call::Wait { .. }))
        );
    }

    assert!(released.load(Ordering::SeqCst), "engine must be released");
    Ok(())
}

#[test]
fn engine_rejects_training_without_flagged_samples() -> anyhow::Result<()> {
    let mut engine = engine_with_samples(&["a.png"]);
    let tool = engine.add_tool(None, "Locate", ToolKind::Locate)?;

    let err = engine.train(tool).unwrap_err();
    assert!(matches!(err, EngineError::InvalidOperation { .. }));

    // An idle tool completes a wait immediately.
    assert!(engine.wait(tool, Duration::from_millis(1))?);
    Ok(())
}
