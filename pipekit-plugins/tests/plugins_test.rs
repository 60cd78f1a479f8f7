use std::fs;

use pipekit_core::{Error, Orchestrator, ProjectConfig, CONFIG_FILE_NAME};
use pipekit_plugins::project_invoker;
use tempfile::TempDir;

const PROJECT: &str = r#"
[imports]
pkg = "package.json"

[tasks]
default = ["bump:minor", "banner", "copy:release"]
lint = ["check:ok", "check:broken", "banner"]
install = "deps"

[plugins.banner]
command = "printf '%s' \"<%= this.options.text %>\" > banner.txt"

[plugins.check]
command = "test \"$PIPEKIT_TARGET\" = ok || { echo 'lint failed' >&2; exit 3; }"

[plugins.deps]
command = "cat > payload.json"
per_target = false

[config.bump.options]
updateConfigs = ["pkg"]

[config.banner.options]
text = "<%= pkg.name %> <%= pkg.version %>"

[config.banner.main]
dest = "unused"

[config.check.ok]
[config.check.broken]

[config.copy.release]
files = [{ src = ["banner.txt", "package.json"], dest = "release/<%= pkg.version %>/" }]
"#;

fn setup() -> (TempDir, Orchestrator) {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("package.json"),
        "{\n  \"name\": \"theme\",\n  \"version\": \"0.3.2\"\n}\n",
    )
    .unwrap();
    fs::write(temp.path().join(CONFIG_FILE_NAME), PROJECT).unwrap();

    let project = ProjectConfig::load(&temp.path().join(CONFIG_FILE_NAME)).unwrap();
    let invoker = project_invoker(&project, temp.path()).unwrap();
    let orchestrator = Orchestrator::from_project(&project, invoker).unwrap();
    (temp, orchestrator)
}

#[tokio::test]
async fn test_release_pipeline_sees_bumped_version() {
    let (temp, orchestrator) = setup();
    orchestrator.execute("default").await.unwrap();

    assert_eq!(
        fs::read_to_string(temp.path().join("banner.txt")).unwrap(),
        "theme 0.4.0"
    );
    let release = temp.path().join("release/0.4.0");
    assert!(release.join("banner.txt").is_file());
    assert!(fs::read_to_string(release.join("package.json"))
        .unwrap()
        .contains("\"version\": \"0.4.0\""));
}

#[tokio::test]
async fn test_failing_command_stops_the_run() {
    let (temp, orchestrator) = setup();
    let err = orchestrator.execute("lint").await.unwrap_err();

    match err {
        Error::PluginInvocation { task, source, .. } => {
            assert_eq!(task, "check:broken");
            let cause = source.to_string();
            assert!(cause.contains("status 3"), "{}", cause);
            assert!(cause.contains("lint failed"), "{}", cause);
        }
        other => panic!("expected invocation error, got {}", other),
    }
    assert!(!temp.path().join("banner.txt").exists());
}

#[tokio::test]
async fn test_single_invocation_command_receives_json_on_stdin() {
    let (temp, orchestrator) = setup();
    orchestrator.execute("install").await.unwrap();

    let payload: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(temp.path().join("payload.json")).unwrap())
            .unwrap();
    assert_eq!(payload["plugin"], "deps");
    assert!(payload["target"].is_null());
}

#[test]
fn test_demo_project_plans_every_task() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../demos/theme")
        .join(CONFIG_FILE_NAME);
    let project = ProjectConfig::load(&path).unwrap();
    let invoker = project_invoker(&project, &project.root_dir).unwrap();
    let orchestrator = Orchestrator::from_project(&project, invoker).unwrap();

    for task in project.tasks.keys() {
        orchestrator.plan(task).unwrap();
    }
    let patch: Vec<String> = orchestrator
        .plan("patch")
        .unwrap()
        .iter()
        .map(|i| i.to_string())
        .collect();
    assert_eq!(patch, vec!["bump:patch", "copy:build", "concat:build", "less:build"]);

    let config = orchestrator.config();
    assert_eq!(config.get("jshint.options.eqnull"), Some(&serde_json::json!(true)));
    assert_eq!(
        config.resolve_str("<%= less.dev.options.out %>").unwrap(),
        "css/theme.min.css"
    );
    assert_eq!(
        config.get("bower.all.rjsConfig"),
        Some(&serde_json::json!("js/global.js"))
    );
    assert!(orchestrator.invoker().contains("bower"));

    let bindings = orchestrator.watch_bindings(None).unwrap();
    assert_eq!(bindings.len(), 3);
    assert!(bindings.iter().all(|b| b.livereload));
    assert!(orchestrator
        .config()
        .resolve_str("<%= banner %>")
        .unwrap()
        .contains("Starter Theme 0.5.0"));
}
