//! File API for workspace file operations
//!
//! Provides secure file list/read/write/delete within workspace boundaries.
//! All functions are synchronous; callers run them on the blocking pool while
//! holding shared workspace access.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Maximum path length
pub const MAX_PATH_LENGTH: usize = 4096;

/// 列表中隐藏的目录
const HIDDEN_ENTRIES: &[&str] = &[".git"];

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNode {
    pub name: String,
    pub is_directory: bool,
    /// Workspace-relative, `/`-separated
    pub path: String,
    /// 仅递归列表中的目录携带
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
}

/// File API error types
#[derive(Debug)]
pub enum FileApiError {
    EmptyPath,
    PathEscape,
    PathTooLong,
    FileNotFound,
    IsDirectory,
    IoError(std::io::Error),
}

impl std::fmt::Display for FileApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileApiError::EmptyPath => write!(f, "Path must name an entry inside the workspace"),
            FileApiError::PathEscape => write!(f, "Path escapes workspace root"),
            FileApiError::PathTooLong => write!(f, "Path exceeds maximum length"),
            FileApiError::FileNotFound => write!(f, "File not found"),
            FileApiError::IsDirectory => write!(f, "Path is a directory"),
            FileApiError::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for FileApiError {}

impl From<std::io::Error> for FileApiError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            FileApiError::FileNotFound
        } else {
            FileApiError::IoError(e)
        }
    }
}

/// Normalize a client-supplied path into a relative path.
///
/// `.` and empty segments are dropped, `..` pops the previous segment, and
/// `..` segments that would climb above the root are stripped. Pure: never
/// touches the filesystem.
pub fn normalize_relative(relative_path: &str) -> Result<PathBuf, FileApiError> {
    if relative_path.len() > MAX_PATH_LENGTH {
        return Err(FileApiError::PathTooLong);
    }

    let mut components: Vec<&str> = Vec::new();
    for component in relative_path.split(['/', '\\']) {
        match component {
            "" | "." => continue,
            ".." => {
                // 根目录之上的 .. 直接丢弃
                components.pop();
            }
            c => components.push(c),
        }
    }

    Ok(components.iter().collect())
}

/// Validate and resolve path within workspace root.
///
/// The path must name an entry below the root (not the root itself). The
/// nearest existing ancestor is canonicalized to reject symlink escapes; the
/// returned path is not canonicalized, so a symlink inside the workspace
/// resolves to the link itself.
pub fn resolve_safe_path(
    workspace_root: &Path,
    relative_path: &str,
) -> Result<PathBuf, FileApiError> {
    let relative = normalize_relative(relative_path)?;
    if relative.as_os_str().is_empty() {
        return Err(FileApiError::EmptyPath);
    }
    // Windows 下 "C:" 之类的片段会被 join 成绝对路径
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(FileApiError::PathEscape);
    }

    let full_path = workspace_root.join(&relative);
    let root_canonical = workspace_root.canonicalize()?;

    // 从父目录开始找最近的已存在祖先，校验其真实路径仍在根目录下
    let mut ancestor = full_path.parent();
    while let Some(dir) = ancestor {
        if dir.exists() {
            let canonical = dir.canonicalize()?;
            if !canonical.starts_with(&root_canonical) {
                warn!(
                    "Path escape attempt: {:?} not under {:?}",
                    canonical, root_canonical
                );
                return Err(FileApiError::PathEscape);
            }
            break;
        }
        ancestor = dir.parent();
    }

    Ok(full_path)
}

fn relative_display(workspace_root: &Path, path: &Path) -> String {
    path.strip_prefix(workspace_root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// List the workspace root, flat or as a nested tree.
///
/// Entries keep the order the filesystem enumerates them in (unsorted).
pub fn list_files(workspace_root: &Path, recursive: bool) -> Result<Vec<FileNode>, FileApiError> {
    debug!("Listing files in: {:?} (recursive={})", workspace_root, recursive);
    if recursive {
        list_tree(workspace_root)
    } else {
        list_flat(workspace_root)
    }
}

fn list_flat(workspace_root: &Path) -> Result<Vec<FileNode>, FileApiError> {
    let mut nodes = Vec::new();
    for entry in fs::read_dir(workspace_root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if HIDDEN_ENTRIES.contains(&name.as_str()) {
            continue;
        }
        nodes.push(FileNode {
            is_directory: entry.file_type()?.is_dir(),
            path: name.clone(),
            name,
            children: None,
        });
    }
    Ok(nodes)
}

/// Depth-first walk; open directories sit on a stack until the walk leaves them
fn list_tree(workspace_root: &Path) -> Result<Vec<FileNode>, FileApiError> {
    let mut roots: Vec<FileNode> = Vec::new();
    let mut open_dirs: Vec<FileNode> = Vec::new();

    let walker = WalkDir::new(workspace_root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            let hidden = e.depth() == 1
                && e
                    .file_name()
                    .to_str()
                    .is_some_and(|name| HIDDEN_ENTRIES.contains(&name));
            !hidden
        });

    for entry in walker {
        let entry = entry.map_err(|e| match e.into_io_error() {
            Some(io) => FileApiError::from(io),
            None => FileApiError::IoError(std::io::Error::other("filesystem loop detected")),
        })?;

        // 离开的目录出栈并挂到父节点
        while open_dirs.len() >= entry.depth() {
            if let Some(done) = open_dirs.pop() {
                attach(&mut open_dirs, &mut roots, done);
            }
        }

        let is_directory = entry.file_type().is_dir();
        let node = FileNode {
            name: entry.file_name().to_string_lossy().to_string(),
            is_directory,
            path: relative_display(workspace_root, entry.path()),
            children: is_directory.then(Vec::new),
        };

        if is_directory {
            open_dirs.push(node);
        } else {
            attach(&mut open_dirs, &mut roots, node);
        }
    }

    while let Some(done) = open_dirs.pop() {
        attach(&mut open_dirs, &mut roots, done);
    }

    Ok(roots)
}

fn attach(open_dirs: &mut [FileNode], roots: &mut Vec<FileNode>, node: FileNode) {
    match open_dirs.last_mut() {
        Some(parent) => parent.children.get_or_insert_with(Vec::new).push(node),
        None => roots.push(node),
    }
}

/// Read raw file content
pub fn read_file(workspace_root: &Path, relative_path: &str) -> Result<Vec<u8>, FileApiError> {
    let file_path = resolve_safe_path(workspace_root, relative_path)?;

    debug!("Reading file: {:?}", file_path);

    // 读取会跟随链接，目标本身也必须在根目录下
    if !file_path.canonicalize()?.starts_with(workspace_root.canonicalize()?) {
        return Err(FileApiError::PathEscape);
    }

    let metadata = fs::metadata(&file_path)?;
    if metadata.is_dir() {
        return Err(FileApiError::IsDirectory);
    }

    Ok(fs::read(&file_path)?)
}

/// Create or fully overwrite a file, creating missing parent directories.
///
/// Content goes to a uniquely named sibling temp file first and is renamed
/// over the target, so readers never observe a half-written file.
pub fn write_file(
    workspace_root: &Path,
    relative_path: &str,
    content: &str,
) -> Result<u64, FileApiError> {
    let file_path = resolve_safe_path(workspace_root, relative_path)?;

    debug!("Writing file: {:?}", file_path);

    if file_path.is_dir() {
        return Err(FileApiError::IsDirectory);
    }

    // Create parent directories if needed
    let parent = file_path.parent().ok_or(FileApiError::PathEscape)?;
    fs::create_dir_all(parent)?;

    // 临时文件名长度固定，不随目标文件名变长
    let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4().simple()));
    {
        let mut temp_file = fs::File::create(&temp_path)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.sync_all()?;
    }

    if let Err(e) = fs::rename(&temp_path, &file_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok(content.len() as u64)
}

/// `mkdir -p` inside the workspace
pub fn create_dir(workspace_root: &Path, relative_path: &str) -> Result<(), FileApiError> {
    let dir_path = resolve_safe_path(workspace_root, relative_path)?;

    debug!("Creating directory: {:?}", dir_path);

    fs::create_dir_all(&dir_path)?;
    Ok(())
}

/// Remove a file, symlink or whole directory subtree
pub fn delete_path(workspace_root: &Path, relative_path: &str) -> Result<(), FileApiError> {
    let full_path = resolve_safe_path(workspace_root, relative_path)?;

    // symlink_metadata：不跟随链接，删除的是链接本身
    let metadata = fs::symlink_metadata(&full_path)?;

    debug!("Deleting: {:?}", full_path);

    if metadata.is_dir() {
        fs::remove_dir_all(&full_path)?;
    } else {
        fs::remove_file(&full_path)?;
    }

    Ok(())
}
