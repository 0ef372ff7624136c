//! File search plugin over one directory tree.
//!
//! Environment:
//! - `FILES_PLUGIN_ROOT`: directory to search (defaults to the home directory)
//! - `FILES_PLUGIN_DATA`: where the grant store lives

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use walkdir::{DirEntry, WalkDir};

use launcher_plugins::contract::file::{File, FileDomain, FileQuery};
use launcher_plugins::contract::PluginState;
use launcher_plugins::permissions::PermissionManager;
use launcher_plugins::provider::{run_plugin_main, ProviderEndpoint, SearchProvider};

const LABEL: &str = "Files";
const MAX_RESULTS: usize = 50;
const MAX_DEPTH: usize = 8;

struct DirectorySearch {
    root: PathBuf,
}

#[async_trait]
impl SearchProvider<FileDomain> for DirectorySearch {
    async fn search(&self, query: FileQuery, _allow_network: bool) -> Vec<File> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || find_files(&root, &query.query, MAX_RESULTS))
            .await
            .unwrap_or_default()
    }

    async fn get(&self, id: &str) -> Option<File> {
        let relative = Path::new(id);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        let path = self.root.join(relative);
        let metadata = std::fs::metadata(&path).ok()?;
        Some(to_file(&self.root, &path, metadata.is_dir(), Some(metadata.len())))
    }

    fn state(&self) -> PluginState {
        if self.root.is_dir() {
            PluginState::Ready { text: Some(format!("Searching {}", self.root.display())) }
        } else {
            PluginState::SetupRequired {
                setup_activity: "settings".to_string(),
                message: Some(format!("{} does not exist", self.root.display())),
            }
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

/// Entries below `root` whose name contains `term`, case-insensitively.
fn find_files(root: &Path, term: &str, limit: usize) -> Vec<File> {
    let term = term.to_lowercase();
    if term.is_empty() {
        return Vec::new();
    }

    WalkDir::new(root)
        .min_depth(1)
        .max_depth(MAX_DEPTH)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().to_lowercase().contains(&term))
        .take(limit)
        .map(|e| {
            let size = e.metadata().ok().filter(|m| m.is_file()).map(|m| m.len());
            to_file(root, e.path(), e.file_type().is_dir(), size)
        })
        .collect()
}

fn to_file(root: &Path, path: &Path, is_directory: bool, size: Option<u64>) -> File {
    let id = path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/");
    File {
        id,
        display_name: path.file_name().map_or_else(String::new, |n| n.to_string_lossy().into_owned()),
        content_uri: format!("file://{}", path.display()),
        mime_type: if is_directory { Some("inode/directory".to_string()) } else { mime_type(path) },
        size: size.and_then(|s| i64::try_from(s).ok()),
        path: Some(path.display().to_string()),
        thumbnail_uri: None,
        is_directory,
        owner: None,
    }
}

fn mime_type(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    let mime = match ext.as_str() {
        "txt" | "md" => "text/plain",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "zip" => "application/zip",
        _ => return None,
    };
    Some(mime.to_string())
}

fn main() {
    let root = std::env::var_os("FILES_PLUGIN_ROOT")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    let data_dir = std::env::var_os("FILES_PLUGIN_DATA")
        .map(PathBuf::from)
        .or_else(|| dirs::data_dir().map(|d| d.join("launcher-files-plugin")))
        .unwrap_or_else(|| PathBuf::from("."));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            std::process::exit(1);
        }
    };
    let permissions = match PermissionManager::open(data_dir.join("grants")) {
        Ok(permissions) => Arc::new(permissions),
        Err(e) => {
            eprintln!("Failed to open grant store: {e}");
            std::process::exit(1);
        }
    };

    let endpoint = ProviderEndpoint::new(DirectorySearch { root }, Arc::clone(&permissions), runtime.handle().clone());
    let code = run_plugin_main(Arc::new(endpoint), permissions, LABEL);

    drop(runtime);
    std::process::exit(code);
}
