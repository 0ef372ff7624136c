//! Process Plugin Tests
//!
//! The host talking to the bundled `launcher-files-plugin` over stdio.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use launcher_plugins::contract::file::{FileDomain, FileQuery};
use launcher_plugins::ipc::ProcessTransport;
use launcher_plugins::plugin::ManifestIndex;
use launcher_plugins::{AppIdentity, QueryPluginClient};

const AUTHORITY: &str = "com.example.files";

fn install(root: &Path) {
    std::fs::create_dir_all(root.join("tree")).unwrap();
    std::fs::write(root.join("tree/notes.txt"), "x").unwrap();

    let package = root.join("plugins").join("com.example");
    std::fs::create_dir_all(&package).unwrap();
    let manifest = format!(
        r#"[package]
name = "com.example"

[[providers]]
class = "DirectorySearch"
authority = "{AUTHORITY}"
actions = ["launcher.plugin.action.PLUGIN"]

[providers.exec]
command = '{}'

[providers.exec.env]
FILES_PLUGIN_ROOT = '{}'
FILES_PLUGIN_DATA = '{}'
"#,
        env!("CARGO_BIN_EXE_launcher-files-plugin"),
        root.join("tree").display(),
        root.join("plugin-data").display(),
    );
    std::fs::write(package.join("plugin.toml"), manifest).unwrap();
}

fn names(files: &[launcher_plugins::contract::file::File]) -> Vec<&str> {
    files.iter().map(|f| f.display_name.as_str()).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_running_plugin_answers_and_sees_new_grants() {
    let temp = TempDir::new().unwrap();
    install(temp.path());

    let index = Arc::new(ManifestIndex::new(temp.path().join("plugins")));
    let transport = Arc::new(ProcessTransport::new(AppIdentity::new("launcher", "Launcher"), index));
    let client = QueryPluginClient::<FileDomain>::new(transport.clone(), AUTHORITY);
    let notes = FileQuery { query: "notes".to_string() };

    // the plugin has to read requests while its grant prompt exists
    assert!(client.config().await.is_some());
    assert!(client.search(&notes, CancellationToken::new()).await.is_empty());

    // granted out of band, e.g. by `grant-permission` in another process
    let data = temp.path().join("plugin-data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("grants"), "launcher\n").unwrap();

    let found = client.search(&notes, CancellationToken::new()).await;
    assert_eq!(names(&found), vec!["notes.txt"]);

    transport.shutdown().await;
}
