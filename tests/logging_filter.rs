use tasksched::cli::LogLevel;
use tasksched::logging::{DEFAULT_DIRECTIVES, filter_directives};

#[test]
fn test_default_filter_is_scoped_to_the_crate() {
    assert_eq!(filter_directives(None, None), DEFAULT_DIRECTIVES);
    assert_eq!(DEFAULT_DIRECTIVES, "tasksched=info");
}

#[test]
fn test_cli_level_wins_over_environment() {
    let directives = filter_directives(Some(LogLevel::Trace), Some("warn"));
    assert_eq!(directives, "tasksched=trace");
}

#[test]
fn test_environment_is_taken_as_directives() {
    assert_eq!(
        filter_directives(None, Some(" tasksched::sched=trace,tokio=warn ")),
        "tasksched::sched=trace,tokio=warn"
    );
    assert_eq!(filter_directives(None, Some("   ")), DEFAULT_DIRECTIVES);
}
