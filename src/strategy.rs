//! Pluggable destinations for completed writers.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use indexmap::IndexMap;

use crate::ast::stmt::FileMode;
use crate::error::{ExecError, ExecResult};
use crate::indent::Indentation;
use crate::writer::{WriteTarget, Writer};

/// Creates writers for `file` blocks and commits them when the block closes.
/// Implementations serialise their internal mutation; a single strategy may
/// be shared by concurrent generation runs.
pub trait OutputStrategy: Send + Sync {
    fn create_writer(
        &self,
        url: &str,
        mode: FileMode,
        charset: &str,
        initial_indent: Indentation,
    ) -> ExecResult<Writer>;

    /// Atomically commit the writer's accumulated content to its target.
    fn finalize_writer(&self, writer: Writer) -> ExecResult<()>;

    /// Content previously generated at `url`, if any. Consulted before a
    /// `file` block opens so protected regions in the old output can be
    /// rescanned.
    fn existing_content(&self, url: &str) -> Option<String>;
}

fn ensure_supported_charset(charset: &str) -> ExecResult<()> {
    if charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("utf8") {
        Ok(())
    } else {
        Err(ExecError::file_error(format!("unsupported charset '{}'", charset)))
    }
}

fn target_of(writer: &Writer) -> ExecResult<WriteTarget> {
    writer
        .target()
        .cloned()
        .ok_or_else(|| ExecError::invalid_operation("cannot finalise the base writer"))
}

/// Keeps generated files in a url -> content map. The workhorse for tests and
/// for callers that post-process output themselves.
#[derive(Debug, Default)]
pub struct InMemoryStrategy {
    files: Mutex<IndexMap<String, String>>,
}

impl InMemoryStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self, url: &str) -> Option<String> {
        self.files.lock().unwrap().get(url).cloned()
    }

    pub fn files(&self) -> IndexMap<String, String> {
        self.files.lock().unwrap().clone()
    }

    /// Pre-populate a file, as if a previous generation had written it.
    pub fn seed(&self, url: &str, content: &str) {
        self.files.lock().unwrap().insert(url.to_string(), content.to_string());
    }
}

impl OutputStrategy for InMemoryStrategy {
    fn create_writer(
        &self,
        url: &str,
        mode: FileMode,
        charset: &str,
        initial_indent: Indentation,
    ) -> ExecResult<Writer> {
        ensure_supported_charset(charset)?;
        let files = self.files.lock().unwrap();
        if mode == FileMode::Create && files.contains_key(url) {
            return Err(ExecError::file_error(format!("target '{}' already exists", url)));
        }
        let target = WriteTarget {
            url: url.to_string(),
            mode,
            charset: charset.to_string(),
        };
        let mut writer = Writer::with_target(target, initial_indent);
        if mode == FileMode::Append {
            if let Some(existing) = files.get(url) {
                writer.preload(existing);
            }
        }
        Ok(writer)
    }

    fn finalize_writer(&self, writer: Writer) -> ExecResult<()> {
        let target = target_of(&writer)?;
        self.files.lock().unwrap().insert(target.url, writer.into_content());
        Ok(())
    }

    fn existing_content(&self, url: &str) -> Option<String> {
        self.content(url)
    }
}

/// Writes generated files under a base directory. Commits go through a
/// sibling temp file and a rename so readers never observe partial output.
#[derive(Debug)]
pub struct FileSystemStrategy {
    root: PathBuf,
    paths: Mutex<()>,
}

impl FileSystemStrategy {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), paths: Mutex::new(()) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, url: &str) -> PathBuf {
        self.root.join(url)
    }
}

impl OutputStrategy for FileSystemStrategy {
    fn create_writer(
        &self,
        url: &str,
        mode: FileMode,
        charset: &str,
        initial_indent: Indentation,
    ) -> ExecResult<Writer> {
        ensure_supported_charset(charset)?;
        let path = self.resolve(url);
        let _guard = self.paths.lock().unwrap();
        if mode == FileMode::Create && path.exists() {
            return Err(ExecError::file_error(format!(
                "target '{}' already exists",
                path.display()
            )));
        }
        let target = WriteTarget {
            url: url.to_string(),
            mode,
            charset: charset.to_string(),
        };
        let mut writer = Writer::with_target(target, initial_indent);
        if mode == FileMode::Append && path.exists() {
            let existing = std::fs::read_to_string(&path)
                .map_err(|e| ExecError::file_error(format!("{}: {}", path.display(), e)))?;
            writer.preload(&existing);
        }
        Ok(writer)
    }

    fn finalize_writer(&self, writer: Writer) -> ExecResult<()> {
        let target = target_of(&writer)?;
        let path = self.resolve(&target.url);
        let _guard = self.paths.lock().unwrap();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ExecError::file_error(format!("{}: {}", parent.display(), e)))?;
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ExecError::file_error(format!("invalid target '{}'", target.url)))?;
        let temp = path.with_file_name(format!(".{}.weft-tmp", file_name));
        std::fs::write(&temp, writer.into_content())
            .map_err(|e| ExecError::file_error(format!("{}: {}", temp.display(), e)))?;
        std::fs::rename(&temp, &path)
            .map_err(|e| ExecError::file_error(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    fn existing_content(&self, url: &str) -> Option<String> {
        std::fs::read_to_string(self.resolve(url)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_writer(strategy: &dyn OutputStrategy, url: &str, mode: FileMode) -> Writer {
        strategy
            .create_writer(url, mode, "UTF-8", Indentation::default())
            .unwrap()
    }

    #[test]
    fn in_memory_records_finalised_content() {
        let strategy = InMemoryStrategy::new();
        let mut writer = plain_writer(&strategy, "a.txt", FileMode::Overwrite);
        writer.write("hello", true);
        strategy.finalize_writer(writer).unwrap();
        assert_eq!(strategy.content("a.txt").as_deref(), Some("hello"));
    }

    #[test]
    fn create_mode_refuses_existing_target() {
        let strategy = InMemoryStrategy::new();
        strategy.seed("a.txt", "old");
        let err = strategy
            .create_writer("a.txt", FileMode::Create, "UTF-8", Indentation::default())
            .unwrap_err();
        assert!(matches!(err, ExecError::FileError { .. }));
    }

    #[test]
    fn append_mode_preloads_existing_content() {
        let strategy = InMemoryStrategy::new();
        strategy.seed("log.txt", "first\n");
        let mut writer = plain_writer(&strategy, "log.txt", FileMode::Append);
        writer.write("second", true);
        strategy.finalize_writer(writer).unwrap();
        assert_eq!(strategy.content("log.txt").as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn unsupported_charset_is_a_file_error() {
        let strategy = InMemoryStrategy::new();
        let err = strategy
            .create_writer("a.txt", FileMode::Overwrite, "latin-1", Indentation::default())
            .unwrap_err();
        assert!(matches!(err, ExecError::FileError { .. }));
    }

    #[test]
    fn file_system_strategy_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = FileSystemStrategy::new(dir.path());
        let mut writer = plain_writer(&strategy, "nested/deep/out.txt", FileMode::Overwrite);
        writer.write_line("content", true);
        strategy.finalize_writer(writer).unwrap();
        let written = std::fs::read_to_string(dir.path().join("nested/deep/out.txt")).unwrap();
        assert_eq!(written, "content\n");
    }

    #[test]
    fn file_system_append_and_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = FileSystemStrategy::new(dir.path());
        std::fs::write(dir.path().join("o.txt"), "was here\n").unwrap();
        assert_eq!(strategy.existing_content("o.txt").as_deref(), Some("was here\n"));
        let mut writer = plain_writer(&strategy, "o.txt", FileMode::Append);
        writer.write("more", true);
        strategy.finalize_writer(writer).unwrap();
        let written = std::fs::read_to_string(dir.path().join("o.txt")).unwrap();
        assert_eq!(written, "was here\nmore");
    }
}
