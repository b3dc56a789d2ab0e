//! JSONL file output through the global subscriber

use evlog_logging::{EvlogSubscriberBuilder, FileConfig, JobContextGuard, LogConfig, RotationStrategy};
use tempfile::TempDir;

#[test]
fn test_jsonl_file_output() {
    let dir = TempDir::new().unwrap();
    let config = LogConfig {
        default_level: "debug".to_string(),
        console: evlog_logging::ConsoleConfig {
            enabled: false,
            ..Default::default()
        },
        file: Some(FileConfig {
            directory: dir.path().to_path_buf(),
            prefix: "evlog-test".to_string(),
            rotation: RotationStrategy::Never,
            max_files: None,
        }),
        ..Default::default()
    };
    let guard = EvlogSubscriberBuilder::new()
        .with_config(config)
        .try_init()
        .unwrap()
        .expect("file output returns a guard");

    {
        let _ctx = JobContextGuard::new("security", "host1");
        let span = tracing::info_span!("import", job = "security", machine = "host1");
        let _entered = span.enter();
        tracing::info!(inserted = 3, "Import committed");
    }
    tracing::debug!("outside any job");
    drop(guard);

    // A second global subscriber is refused
    assert!(EvlogSubscriberBuilder::new().try_init().is_err());

    let text = std::fs::read_to_string(dir.path().join("evlog-test.log")).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);

    assert_eq!(lines[0]["message"], "Import committed");
    assert_eq!(lines[0]["inserted"], 3);
    assert_eq!(lines[0]["span"]["job"], "security");
    assert_eq!(lines[0]["level"], "INFO");
    assert_eq!(lines[1]["message"], "outside any job");
    assert!(lines[1].get("span").is_none());
}
