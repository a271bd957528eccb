// tests/pipeline_driver.rs

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;

use tasksched::cli::CliArgs;
use tasksched::config::{PipelineFile, parse_and_validate};
use tasksched::exec::{DriveOptions, Pipeline, attempts, drive};
use tasksched::TaskState;
use tasksched_test_utils::builders::{PipelineBuilder, TaskSpecBuilder};
use tasksched_test_utils::with_timeout;
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn Error>>;

async fn run_pipeline(cfg: &PipelineFile) -> Result<(Pipeline, tasksched::exec::DriveOutcome), Box<dyn Error>> {
    let pipeline = Pipeline::build(cfg, tokio::runtime::Handle::current())?;
    pipeline.schedule()?;
    let outcome = drive(pipeline.scheduler(), &DriveOptions::from_section(&cfg.scheduler)).await;
    Ok((pipeline, outcome))
}

fn args_for(path: PathBuf, dry_run: bool) -> CliArgs {
    CliArgs {
        config: path.to_string_lossy().into_owned(),
        log_level: None,
        dry_run,
        cancel_after_ms: None,
    }
}

#[tokio::test]
async fn chain_runs_in_dependency_order() -> TestResult {
    with_timeout(async {
        init_tracing();

        let cfg = PipelineBuilder::new()
            .with_task("a", TaskSpecBuilder::new().build())
            .with_task("b", TaskSpecBuilder::new().after("a").build())
            .with_task("c", TaskSpecBuilder::new().after("b").delay_ms(2).build())
            .build();

        let (pipeline, outcome) = run_pipeline(&cfg).await?;

        assert!(!outcome.cancelled);
        assert_eq!(outcome.result, 0);
        assert!(pipeline.scheduler().is_finalized());

        let report = pipeline.report();
        for name in ["a", "b", "c"] {
            let t = report.task(name).unwrap();
            assert_eq!(t.state, TaskState::Completed, "{name}");
            assert_eq!(t.attempts, 1, "{name}");
        }
        Ok(())
    })
    .await
}

#[tokio::test]
async fn retries_rerun_the_body() -> TestResult {
    with_timeout(async {
        init_tracing();

        let cfg = PipelineBuilder::new()
            .with_task("flaky", TaskSpecBuilder::new().retries(2).build())
            .with_task("after", TaskSpecBuilder::new().after("flaky").build())
            .build();

        let (pipeline, outcome) = run_pipeline(&cfg).await?;

        assert_eq!(outcome.result, 0);
        assert_eq!(attempts(pipeline.task("flaky").unwrap()), 3);
        assert_eq!(attempts(pipeline.task("after").unwrap()), 1);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn latency_completes_asynchronously() -> TestResult {
    with_timeout(async {
        init_tracing();

        let cfg = PipelineBuilder::new()
            .with_task("slow", TaskSpecBuilder::new().latency_ms(10).retries(1).build())
            .with_task("next", TaskSpecBuilder::new().after("slow").build())
            .build();

        let (pipeline, outcome) = run_pipeline(&cfg).await?;

        assert!(!outcome.cancelled);
        assert!(outcome.ticks > 1, "completed in {} ticks", outcome.ticks);
        let report = pipeline.report();
        assert_eq!(report.task("slow").unwrap().attempts, 2);
        assert_eq!(report.task("next").unwrap().state, TaskState::Completed);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn failure_propagates_unless_opted_out() -> TestResult {
    with_timeout(async {
        init_tracing();

        let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let cfg = tasksched::config::load_and_validate(manifest.join("demos/failing.toml"))?;

        let (pipeline, outcome) = run_pipeline(&cfg).await?;

        assert_eq!(outcome.result, 3);
        let report = pipeline.report();
        assert_eq!(report.result, 3);
        assert_eq!(report.task("setup").unwrap().result, 0);
        assert_eq!(report.task("flaky").unwrap().result, 3);
        assert_eq!(report.task("report").unwrap().result, 3);
        assert_eq!(report.task("cleanup").unwrap().result, 0);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn barrier_waits_for_its_dependencies() -> TestResult {
    with_timeout(async {
        init_tracing();

        let cfg = PipelineBuilder::new()
            .with_task("left", TaskSpecBuilder::new().latency_ms(5).build())
            .with_task("right", TaskSpecBuilder::new().build())
            .with_task(
                "join",
                TaskSpecBuilder::new().after("left").after("right").barrier().build(),
            )
            .build();

        let pipeline = Pipeline::build(&cfg, tokio::runtime::Handle::current())?;
        pipeline.schedule()?;
        pipeline.scheduler().progress();

        let join = pipeline.task("join").unwrap();
        assert!(!join.is_completed());
        assert_eq!(join.dependency_count(), 1);

        let outcome = drive(pipeline.scheduler(), &DriveOptions::default()).await;
        assert_eq!(outcome.result, 0);
        assert!(join.is_completed());
        assert_eq!(attempts(join), 0);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn instant_task_runs_inside_schedule() -> TestResult {
    with_timeout(async {
        init_tracing();

        let cfg = parse_and_validate(
            r#"
[task.now]
instant = true

[task.later]
after = ["now"]
"#,
        )?;

        let pipeline = Pipeline::build(&cfg, tokio::runtime::Handle::current())?;
        pipeline.schedule()?;

        let now = pipeline.task("now").unwrap();
        assert!(now.is_completed());
        assert_eq!(attempts(now), 1);
        assert_eq!(attempts(pipeline.task("later").unwrap()), 0);

        let outcome = drive(pipeline.scheduler(), &DriveOptions::default()).await;
        assert_eq!(outcome.result, 0);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn deadline_cancels_the_pipeline() -> TestResult {
    with_timeout(async {
        init_tracing();

        let cfg = PipelineBuilder::new()
            .with_task("stuck", TaskSpecBuilder::new().latency_ms(60_000).build())
            .with_task("blocked", TaskSpecBuilder::new().after("stuck").build())
            .cancel_after_ms(20)
            .cancel_code(-9)
            .build();

        let (pipeline, outcome) = run_pipeline(&cfg).await?;

        assert!(outcome.cancelled);
        assert_eq!(outcome.result, -9);

        let report = pipeline.report();
        assert!(report.cancelled);
        for name in ["stuck", "blocked"] {
            let t = report.task(name).unwrap();
            assert_eq!(t.state, TaskState::Completed, "{name}");
            assert_eq!(t.result, -9, "{name}");
        }
        assert_eq!(report.task("blocked").unwrap().attempts, 0);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn run_entry_point_handles_dry_run_and_failures() -> TestResult {
    with_timeout(async {
        init_tracing();

        let mut ok_file = NamedTempFile::new()?;
        write!(ok_file, "[task.a]\n\n[task.b]\nafter = [\"a\"]\n")?;
        let mut bad_file = NamedTempFile::new()?;
        write!(bad_file, "[task.a]\nresult = 1\n")?;

        tasksched::run(args_for(ok_file.path().to_path_buf(), true)).await?;
        tasksched::run(args_for(ok_file.path().to_path_buf(), false)).await?;

        let err = tasksched::run(args_for(bad_file.path().to_path_buf(), false))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("result 1"), "got {err}");
        Ok(())
    })
    .await
}
