//! Standalone Goose toolkits
//!
//! Small, self-contained tool collections. Each one owns its state and is
//! registered with the [`crate::tools::ToolRegistry`] at startup.

pub mod artify;
pub mod complexity;
pub mod data;
pub mod dockerize;
pub mod filetype;
pub mod todo;

pub use artify::ArtifyToolkit;
pub use complexity::CodeComplexityToolkit;
pub use data::DataToolkit;
pub use dockerize::DockerizationToolkit;
pub use filetype::FileTypeAnalyzerToolkit;
pub use todo::TodoToolkit;

use std::io;
use std::path::{Path, PathBuf};

/// Files under `dir` in a stable order, descending into subdirectories when
/// `recursive`. Directories for which `skip` returns true are not entered.
///
/// Symlinked directories are never entered, so link cycles cannot repeat
/// files; symlinks to files are listed like regular files.
pub(crate) fn walk_files(
    dir: &Path,
    recursive: bool,
    skip: &dyn Fn(&Path) -> bool,
) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries: Vec<(PathBuf, std::fs::FileType)> = std::fs::read_dir(&current)?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_type().ok().map(|t| (e.path(), t)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut subdirs = Vec::new();
        for (path, kind) in entries {
            if skip(&path) {
                continue;
            }
            if kind.is_dir() {
                if recursive {
                    subdirs.push(path);
                }
            } else if kind.is_symlink() && path.is_dir() {
                continue;
            } else {
                files.push(path);
            }
        }
        pending.extend(subdirs.into_iter().rev());
    }

    Ok(files)
}
