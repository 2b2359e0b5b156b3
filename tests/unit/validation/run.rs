use super::*;

fn report(id: &str, verdict: CaseVerdict) -> CaseReport {
    CaseReport {
        verdict,
        ..CaseReport::new(CaseId::new(id), id, format!("{id} description"))
    }
}

#[test]
fn aggregation_prefers_fail_then_inconclusive() {
    use CaseVerdict::*;
    assert_eq!(RunVerdict::aggregate(&[Pass, Pass]), RunVerdict::Pass);
    assert_eq!(RunVerdict::aggregate(&[Pass, Skipped]), RunVerdict::Inconclusive);
    assert_eq!(RunVerdict::aggregate(&[Aborted, Fail]), RunVerdict::Fail);
    assert_eq!(RunVerdict::aggregate(&[Cancelled]), RunVerdict::Inconclusive);
    assert_eq!(RunVerdict::aggregate(std::iter::empty::<&CaseVerdict>()), RunVerdict::Pass);
}

#[test]
fn lifecycle_and_single_finalize() {
    let mut run = ValidationRun::new();
    assert_eq!(run.state(), RunState::Pending);
    assert!(run.record(report("early", CaseVerdict::Pass)).is_err());

    run.start().unwrap();
    assert!(run.start().is_err());
    run.record(report("a", CaseVerdict::Pass)).unwrap();
    run.record(report("b", CaseVerdict::Inconclusive)).unwrap();
    assert!(run.finalize(RunState::Running, None).is_err());

    run.finalize(RunState::Completed, None).unwrap();
    assert_eq!(run.verdict(), Some(RunVerdict::Inconclusive));
    assert!(run.is_finalized());

    let second = run.finalize(RunState::Aborted, Some("late".into()));
    assert!(matches!(second, Err(StageCheckError::RunState(_))));
    assert_eq!(run.state(), RunState::Completed);
    assert!(run.record(report("c", CaseVerdict::Pass)).is_err());
}

#[test]
fn pending_run_cannot_finalize() {
    let mut run = ValidationRun::new();
    assert!(run.finalize(RunState::Completed, None).is_err());
    assert_eq!(run.verdict(), None);
}

#[test]
fn report_rows_follow_case_order() {
    let mut run = ValidationRun::new();
    run.start().unwrap();
    let mut failed = report("wall", CaseVerdict::Fail);
    failed.diagnostics.push("node 'n2' frame 3: delta 40 > 2".into());
    run.record(report("ceiling", CaseVerdict::Pass)).unwrap();
    run.record(failed).unwrap();
    run.record(CaseReport::skipped(CaseId::new("floor"), "floor", "")).unwrap();
    assert!(run.report_rows().is_empty());
    run.finalize(RunState::Aborted, Some("quorum".into())).unwrap();

    let rows = run.report_rows();
    let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["ceiling", "wall", "floor"]);
    assert_eq!(rows[0].result, "pass");
    assert_eq!(rows[1].message, "node 'n2' frame 3: delta 40 > 2");
    assert_eq!(rows[2].result, "skipped");
    assert_eq!(rows[2].message, "not executed");
    assert_eq!(run.abort_reason(), Some("quorum"));
}

#[test]
fn finalized_run_round_trips_through_json() {
    let mut run = ValidationRun::new();
    run.start().unwrap();
    run.record(report("a", CaseVerdict::Pass)).unwrap();
    run.finalize(RunState::Completed, None).unwrap();

    let json = serde_json::to_string(&run).unwrap();
    let back: ValidationRun = serde_json::from_str(&json).unwrap();
    assert_eq!(back, run);
    assert_eq!(back.verdict(), Some(RunVerdict::Pass));
}
