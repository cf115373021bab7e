use anyhow::Result;
use async_trait::async_trait;
use liftoff::{
    AppOptions, Application, BootHook, Config, FrameworkConfig, LifecycleError, LifecycleState,
    PluginContext, PluginDeclarations, PluginFactory, PluginManifest, PluginSpec,
    SequencifyError,
};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

type Journal = Arc<Mutex<Vec<String>>>;

struct RecordingHook {
    name: String,
    journal: Journal,
}

#[async_trait]
impl BootHook for RecordingHook {
    fn config_did_load(&self) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:config_did_load", self.name));
        Ok(())
    }

    async fn will_ready(&self) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:will_ready", self.name));
        Ok(())
    }

    async fn before_close(&self) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:before_close", self.name));
        Ok(())
    }
}

struct RecordingFactory {
    journal: Journal,
    manifest: PluginManifest,
}

impl RecordingFactory {
    fn new(journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            journal: journal.clone(),
            manifest: PluginManifest::default(),
        })
    }
}

#[async_trait]
impl PluginFactory for RecordingFactory {
    fn manifest(&self) -> PluginManifest {
        self.manifest.clone()
    }

    async fn create_hook(&self, context: &PluginContext) -> Result<Arc<dyn BootHook>> {
        Ok(Arc::new(RecordingHook {
            name: context.plugin.name().to_string(),
            journal: self.journal.clone(),
        }))
    }
}

fn spec(dependencies: &[&str]) -> PluginSpec {
    PluginSpec {
        dependencies: Some(dependencies.iter().map(|d| d.to_string()).collect()),
        ..PluginSpec::default()
    }
}

/// `web` framework ships session -> cache -> api; the app disables session
fn web_config() -> Config {
    let mut framework = FrameworkConfig::new("web");
    framework.plugins.insert("session", spec(&[]));
    framework.plugins.insert("cache", spec(&["session"]));
    framework.plugins.insert("api", spec(&["cache"]));

    let mut config = Config {
        name: "shop".to_string(),
        ..Config::default()
    };
    config.frameworks.push(framework);
    config.plugins.insert("session", false);
    config
}

fn unittest() -> AppOptions {
    AppOptions {
        server_env: Some("unittest".to_string()),
        ..AppOptions::default()
    }
}

#[tokio::test]
async fn test_app_disabled_dependency_is_enabled_implicitly() {
    let mut app = Application::new(web_config(), unittest()).unwrap();
    let plugins = app.load_plugins().await.unwrap();

    let names: Vec<_> = plugins.iter().map(|p| p.name()).collect();
    assert_eq!(names, vec!["session", "cache", "api"]);

    let session = &plugins[0];
    assert!(session.enable);
    assert!(session.implicit_enable);
    assert_eq!(session.dependents, vec!["cache"]);
}

#[tokio::test]
async fn test_full_boot_and_reverse_teardown() {
    let journal = Journal::default();
    let mut app = Application::new(web_config(), unittest()).unwrap();
    for name in ["session", "cache", "api"] {
        app.register_plugin(name, RecordingFactory::new(&journal)).await;
    }
    app.add_app_hook(Arc::new(RecordingHook {
        name: "shop".to_string(),
        journal: journal.clone(),
    }));

    app.start().await.unwrap();
    app.ready().await.unwrap();
    app.server_did_ready().await;
    app.close().await.unwrap();

    let log = journal.lock().unwrap().clone();
    let config_order: Vec<_> = log
        .iter()
        .filter(|e| e.ends_with(":config_did_load"))
        .map(|e| e.split(':').next().unwrap())
        .collect();
    assert_eq!(config_order, vec!["session", "cache", "api", "shop"]);

    let close_order: Vec<_> = log
        .iter()
        .filter(|e| e.ends_with(":before_close"))
        .map(|e| e.split(':').next().unwrap())
        .collect();
    assert_eq!(close_order, vec!["shop", "api", "cache", "session"]);
    assert_eq!(app.lifecycle().state(), LifecycleState::Closed);
}

#[tokio::test]
async fn test_missing_dependency_fails_start_and_ready() {
    let mut config = Config::default();
    config.plugins.insert("c", spec(&["a1"]));

    let mut app = Application::new(config, unittest()).unwrap();
    let err = app.start().await.unwrap_err();
    assert!(err.to_string().contains("a1"));

    match app.ready().await.unwrap_err() {
        LifecycleError::Startup { cause } => {
            let resolution = cause.downcast_ref::<SequencifyError>().unwrap();
            assert_eq!(resolution.missing_names(), vec!["a1"]);
            assert_eq!(resolution.missing[0].required_by, vec!["c"]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_load_plugins_reports_cycle() {
    let mut config = Config::default();
    config.plugins.insert("a", spec(&["b"]));
    config.plugins.insert("b", spec(&["c"]));
    config.plugins.insert("c", spec(&["a"]));

    let mut app = Application::new(config, unittest()).unwrap();
    let err = app.load_plugins().await.unwrap_err();
    let resolution = err.downcast_ref::<SequencifyError>().unwrap();
    assert_eq!(resolution.cycles[0], vec!["a", "b", "c", "a"]);
}

#[tokio::test]
async fn test_env_filtered_plugin_is_skipped() {
    let mut config = Config::default();
    config.plugins.insert(
        "devtools",
        PluginSpec {
            env: Some(vec!["local".to_string()]),
            ..PluginSpec::default()
        },
    );
    config.plugins.insert(
        "api",
        PluginSpec {
            optional_dependencies: Some(vec!["devtools".to_string()]),
            ..PluginSpec::default()
        },
    );

    let mut prod = Application::new(
        config.clone(),
        AppOptions {
            server_env: Some("prod".to_string()),
            ..AppOptions::default()
        },
    )
    .unwrap();
    let names: Vec<_> = prod
        .load_plugins()
        .await
        .unwrap()
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(names, vec!["api"]);

    let mut local = Application::new(
        config,
        AppOptions {
            server_env: Some("local".to_string()),
            ..AppOptions::default()
        },
    )
    .unwrap();
    let names: Vec<_> = local
        .load_plugins()
        .await
        .unwrap()
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(names, vec!["devtools", "api"]);
}

#[tokio::test]
async fn test_manifest_dependencies_drive_order() {
    let journal = Journal::default();
    let mut config = Config::default();
    config.plugins.insert("cache", true);
    config.plugins.insert("session", true);

    let app = Application::new(config, unittest()).unwrap();
    app.register_plugin(
        "cache",
        Arc::new(RecordingFactory {
            journal: journal.clone(),
            manifest: PluginManifest::named("cache").with_dependencies(["session"]),
        }),
    )
    .await;

    let mut app = app;
    let names: Vec<_> = app
        .load_plugins()
        .await
        .unwrap()
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(names, vec!["session", "cache"]);
}

#[tokio::test]
async fn test_runtime_plugins_override_config() {
    let custom: PluginDeclarations = vec![("api", false)].into_iter().collect();
    let mut app = Application::new(
        web_config(),
        AppOptions {
            custom_plugins: Some(custom),
            ..unittest()
        },
    )
    .unwrap();

    let names: Vec<_> = app
        .load_plugins()
        .await
        .unwrap()
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(names, vec!["session", "cache"]);
}

#[tokio::test]
async fn test_config_file_to_resolution() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("liftoff.yaml");
    std::fs::write(
        &path,
        r#"
version: "1.0"
name: shop
frameworks:
  - name: web
    plugins:
      session: {}
      cache:
        package: cache-memory
        dependencies: [session]
plugins:
  api:
    path: ./plugins/api
    dependencies: [cache]
"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    let mut app = Application::new(config, unittest()).unwrap();
    app.load_plugins().await.unwrap();

    let units: Vec<_> = app
        .load_units()
        .into_iter()
        .map(|u| format!("{}:{}", u.kind, u.name))
        .collect();
    assert_eq!(
        units,
        vec!["plugin:session", "plugin:cache", "plugin:api", "framework:web", "app:shop"]
    );
}
