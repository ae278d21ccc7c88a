use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use cadence_core::config::VendorAsset;
use cadence_core::{Config, Executor, Node, Project, Registry, TaskError, TaskName};
use cadence_pipeline::step::StepContext;
use cadence_pipeline::tasks::{builtin_step, register_builtin, register_config_tasks, BuildOptions};
use tempfile::TempDir;

const INDEX: &str = r#"<!doctype html>
<html>
  <head>
    {% include "cadence/styles.html" %}
  </head>
  <body>
    <!-- navigation -->
    {% include "_partials/nav.html" %}
    {% include "cadence/scripts.html" %}
  </body>
</html>
"#;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn fixture() -> (TempDir, Config) {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "src/index.html", INDEX);
    write(root, "src/_partials/nav.html", "<nav>  <a href=\"/\">Home</a>  </nav>");
    write(root, "src/scss/_vars.scss", "$accent: #ff0000;\n");
    write(
        root,
        "src/scss/style.scss",
        "@import 'vars';\n.btn {\n  color: $accent;\n  &:hover { transform: rotate(1deg); }\n}\n",
    );
    write(root, "src/js/a.js", "var first = 1; // one\n");
    write(root, "src/js/b.js", "var second = 2;\n");
    write(root, "src/static/robots.txt", "User-agent: *\n");
    write(root, "vendor/lib.js", "window.lib = {};\n");

    let mut config = Config::default();
    config.scripts.files = vec!["a.js".to_string(), "b.js".to_string()];
    config.vendor.push(VendorAsset {
        src: "vendor/lib.js".into(),
        dest: "scripts/vendor".into(),
    });
    (dir, config)
}

fn executor(project: Project, options: BuildOptions) -> Executor {
    let project = Arc::new(project);
    let mut registry = Registry::new();
    register_builtin(&mut registry, Arc::clone(&project), options).unwrap();
    register_config_tasks(&mut registry, &project).unwrap();
    Executor::new(Arc::new(registry))
}

fn top_level(dir: &Path) -> BTreeSet<String> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn build_produces_every_output() {
    let (dir, config) = fixture();
    let exec = executor(Project::new(dir.path(), config), BuildOptions::default());
    exec.run_task("build").await.unwrap();

    let dist = dir.path().join("dist");
    assert_eq!(
        top_level(&dist),
        BTreeSet::from(["index.html", "robots.txt", "scripts", "styles"].map(String::from))
    );

    let html = fs::read_to_string(dist.join("index.html")).unwrap();
    assert!(html.contains(r#"href="styles/style.css""#), "{html}");
    assert!(html.contains(r#"src="scripts/main.js""#), "{html}");
    assert!(html.contains("<nav><a href=\"/\">Home</a></nav>"), "{html}");
    assert!(!html.contains("navigation"), "{html}");

    let css = fs::read_to_string(dist.join("styles/style.css")).unwrap();
    assert!(css.contains(".btn{color:#ff0000"), "{css}");
    assert!(css.contains(".btn:hover{-webkit-transform:rotate(1deg)"), "{css}");

    let js = fs::read_to_string(dist.join("scripts/main.js")).unwrap();
    let first = js.find("first=1").expect("a.js in bundle");
    let second = js.find("second=2").expect("b.js in bundle");
    assert!(first < second, "{js}");
    assert!(!js.contains("// one"), "{js}");

    assert!(dist.join("scripts/vendor/lib.js").is_file());
    assert!(!dist.join("_partials").exists());
}

#[tokio::test]
async fn default_runs_build() {
    let (dir, config) = fixture();
    let exec = executor(Project::new(dir.path(), config), BuildOptions::default());
    exec.run_task("default").await.unwrap();
    assert!(dir.path().join("dist/index.html").is_file());
}

#[tokio::test]
async fn clean_removes_output_and_hashes() {
    let (dir, config) = fixture();
    let exec = executor(Project::new(dir.path(), config), BuildOptions::default());
    exec.run_task("build").await.unwrap();
    write(dir.path(), "dist/stale.txt", "old");
    assert!(dir.path().join(".cadence/hashes").is_dir());

    exec.run_task("clean").await.unwrap();
    assert!(!dir.path().join("dist").exists());
    assert!(!dir.path().join(".cadence/hashes").exists());

    exec.run_task("build").await.unwrap();
    assert!(!dir.path().join("dist/stale.txt").exists());
}

#[tokio::test]
async fn failing_style_compile_keeps_previous_output() {
    let (dir, config) = fixture();
    let exec = executor(Project::new(dir.path(), config), BuildOptions::default());
    exec.run_task("build").await.unwrap();
    let css_path = dir.path().join("dist/styles/style.css");
    let before = fs::read_to_string(&css_path).unwrap();

    write(dir.path(), "src/scss/style.scss", ".btn { color: $nope; }\n");
    let err = exec.run_task("styles").await.unwrap_err();
    assert_eq!(err.origin(), Some(&TaskName::from("styles")));
    assert!(err.to_string().contains("undefined variable $nope"), "{err}");
    assert_eq!(fs::read_to_string(&css_path).unwrap(), before);
}

#[tokio::test]
async fn failing_step_stops_the_build_series() {
    let (dir, config) = fixture();
    write(dir.path(), "src/scss/style.scss", ".btn { color: red;\n");
    let exec = executor(Project::new(dir.path(), config), BuildOptions::default());

    let err = exec.run_task("build").await.unwrap_err();
    assert_eq!(err.origin(), Some(&TaskName::from("styles")));
    let dist = dir.path().join("dist");
    assert!(dist.join("index.html").is_file());
    assert!(!dist.join("styles/style.css").exists());
    assert!(!dist.join("scripts").join("main.js").exists());
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let (dir, config) = fixture();
    let options = BuildOptions {
        dry_run: true,
        dev: false,
    };
    let exec = executor(Project::new(dir.path(), config), options);
    exec.run_task("build").await.unwrap();
    assert!(!dir.path().join("dist").exists());
    assert!(!dir.path().join(".cadence").exists());
}

#[test]
fn rebuilding_unchanged_sources_skips_writes() {
    let (dir, config) = fixture();
    let project = Project::new(dir.path(), config);
    let ctx = StepContext {
        state_dir: project.state_dir(),
        dry_run: false,
    };
    let step = builtin_step(&project, "scripts", BuildOptions::default())
        .unwrap()
        .unwrap();

    let first = step.run(&ctx).unwrap();
    assert_eq!((first.written(), first.unchanged()), (1, 0));
    let second = step.run(&ctx).unwrap();
    assert_eq!((second.written(), second.unchanged()), (0, 1));

    write(dir.path(), "src/js/b.js", "var second = 3;\n");
    let third = step.run(&ctx).unwrap();
    assert_eq!(third.written(), 1);
}

#[tokio::test]
async fn sprite_collects_icons_when_enabled() {
    let (dir, mut config) = fixture();
    config.sprite.enabled = true;
    write(
        dir.path(),
        "src/icons/star.svg",
        r#"<?xml version="1.0"?><svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24"><path d="M0 0h24"/></svg>"#,
    );
    let exec = executor(Project::new(dir.path(), config), BuildOptions::default());
    exec.run_task("build").await.unwrap();

    let sprite = fs::read_to_string(dir.path().join("dist/images/sprite.svg")).unwrap();
    assert!(sprite.contains(r#"<symbol id="icon-star" viewBox="0 0 24 24">"#), "{sprite}");
}

#[tokio::test]
async fn config_tasks_compose_builtins() {
    let (dir, mut config) = fixture();
    config.tasks.insert(
        TaskName::from("assets"),
        Node::parallel(["styles", "scripts"]),
    );
    let exec = executor(Project::new(dir.path(), config), BuildOptions::default());
    exec.run_task("assets").await.unwrap();

    let dist = dir.path().join("dist");
    assert!(dist.join("styles/style.css").is_file());
    assert!(dist.join("scripts/main.js").is_file());
    assert!(!dist.join("index.html").exists());
}

#[tokio::test]
async fn missing_explicit_script_is_reported() {
    let (dir, mut config) = fixture();
    config.scripts.files.push("missing.js".to_string());
    let exec = executor(Project::new(dir.path(), config), BuildOptions::default());
    let err = exec.run_task("scripts").await.unwrap_err();
    assert!(matches!(err, TaskError::Failed { .. }), "{err:?}");
    assert!(err.to_string().contains("missing.js"), "{err}");
}

#[tokio::test]
async fn rerunning_a_step_drops_pages_whose_source_was_deleted() {
    let (dir, config) = fixture();
    write(dir.path(), "src/about.html", "<p>about</p>");
    let exec = executor(Project::new(dir.path(), config), BuildOptions::default());
    exec.run_task("build").await.unwrap();
    assert!(dir.path().join("dist/about.html").is_file());

    fs::remove_file(dir.path().join("src/about.html")).unwrap();
    exec.run_task("markup").await.unwrap();
    assert!(!dir.path().join("dist/about.html").exists());
    assert!(dir.path().join("dist/index.html").is_file());
    assert!(dir.path().join("dist/robots.txt").is_file(), "other steps' outputs stay");
}
