//! Benchmark workspace I/O
//!
//! Layout:
//!
//! ```text
//! <code_dir>/
//!   prompt.json        {"prompt": "..."}
//!   docs/  rtl/  verif/  rundir/
//! ```

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use refinement::ContextItem;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directories gathered as generation context, in priority order.
///
/// `rundir/` holds run artifacts (logs, simulator output, verdicts) and is
/// never read back as context.
pub const CONTEXT_DIRS: &[&str] = &["docs", "rtl", "verif"];

/// Top-level file names created when no empty placeholder exists.
pub const COMMON_TOP_NAMES: &[&str] = &[
    "top.sv",
    "top.v",
    "top_module.sv",
    "top_module.v",
    "design.sv",
    "design.v",
];

#[derive(Deserialize)]
struct PromptFile {
    #[serde(default)]
    prompt: String,
}

pub struct CodeWorkspace {
    root: PathBuf,
}

impl CodeWorkspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn rtl_dir(&self) -> PathBuf {
        self.root.join("rtl")
    }

    /// Task text from `prompt.json`. A missing `prompt` key reads as empty.
    pub fn read_prompt(&self) -> Result<String> {
        let path = self.root.join("prompt.json");
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Prompt file not found: {}", path.display()))?;
        let parsed: PromptFile = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid JSON in prompt file {}", path.display()))?;
        let preview: String = parsed.prompt.chars().take(150).collect();
        info!(path = %path.display(), %preview, "Read task");
        Ok(parsed.prompt)
    }

    /// Every readable file under the context directories, keyed by its
    /// path relative to the workspace root.
    pub fn gather_context(&self) -> Vec<ContextItem> {
        let mut items = Vec::new();
        for dir_name in CONTEXT_DIRS {
            let dir = self.root.join(dir_name);
            if !dir.is_dir() {
                debug!(dir = %dir_name, "Context directory not found");
                continue;
            }

            let mut files: Vec<PathBuf> = WalkBuilder::new(&dir)
                .hidden(true)
                .git_ignore(true)
                .build()
                .flatten()
                .map(|entry| entry.into_path())
                .filter(|path| path.is_file())
                .collect();
            files.sort();

            for path in files {
                let bytes = match std::fs::read(&path) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Could not read context file");
                        continue;
                    }
                };
                let content = String::from_utf8_lossy(&bytes).into_owned();
                let rel = self.relative(&path);
                debug!(path = %rel, bytes = content.len(), "Loaded context file");
                items.push(ContextItem::from_path(rel, content));
            }
        }
        info!(files = items.len(), "Gathered context");
        items
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// File the generated module is written to.
    ///
    /// First empty file in `rtl/`, else the first common top name that does
    /// not exist yet, else the first `.sv` then `.v` file, else `rtl/top.sv`.
    pub fn find_target_file(&self) -> Result<PathBuf> {
        let rtl = self.rtl_dir();
        if !rtl.is_dir() {
            std::fs::create_dir_all(&rtl)
                .with_context(|| format!("Failed to create {}", rtl.display()))?;
            info!(dir = %rtl.display(), "Created RTL directory");
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(&rtl)
            .with_context(|| format!("Failed to list {}", rtl.display()))?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        if let Some(empty) = files
            .iter()
            .find(|path| std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(false))
        {
            info!(target = %empty.display(), "Found empty target file");
            return Ok(empty.clone());
        }

        if let Some(name) = COMMON_TOP_NAMES.iter().find(|name| !rtl.join(name).exists()) {
            let path = rtl.join(name);
            info!(target = %path.display(), "Will create target file");
            return Ok(path);
        }

        for ext in ["sv", "v"] {
            if let Some(existing) = files
                .iter()
                .find(|path| path.extension().and_then(|e| e.to_str()) == Some(ext))
            {
                info!(target = %existing.display(), "Using existing file");
                return Ok(existing.clone());
            }
        }

        Ok(rtl.join("top.sv"))
    }

    /// Write `code` to `path`, creating parent directories.
    pub fn write_code(&self, path: &Path, code: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, code).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), bytes = code.len(), "Wrote code");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refinement::PriorityClass;

    fn workspace() -> (tempfile::TempDir, CodeWorkspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = CodeWorkspace::new(dir.path());
        (dir, ws)
    }

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_read_prompt() {
        let (dir, ws) = workspace();
        touch(dir.path(), "prompt.json", r#"{"prompt": "Design an 8-bit counter"}"#);
        assert_eq!(ws.read_prompt().unwrap(), "Design an 8-bit counter");
    }

    #[test]
    fn test_read_prompt_missing_key_is_empty() {
        let (dir, ws) = workspace();
        touch(dir.path(), "prompt.json", r#"{"task": "x"}"#);
        assert_eq!(ws.read_prompt().unwrap(), "");
    }

    #[test]
    fn test_read_prompt_errors() {
        let (dir, ws) = workspace();
        let err = ws.read_prompt().unwrap_err();
        assert!(err.to_string().contains("Prompt file not found"));

        touch(dir.path(), "prompt.json", "{not json");
        let err = ws.read_prompt().unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[test]
    fn test_gather_context_tags_priority_by_directory() {
        let (dir, ws) = workspace();
        touch(dir.path(), "docs/spec.md", "spec");
        touch(dir.path(), "rtl/top.sv", "");
        touch(dir.path(), "verif/tb.sv", "tb");
        touch(dir.path(), "other/ignored.txt", "nope");

        let items = ws.gather_context();
        let paths: Vec<_> = items.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["docs/spec.md", "rtl/top.sv", "verif/tb.sv"]);
        assert_eq!(items[0].priority, PriorityClass::Spec);
        assert_eq!(items[1].priority, PriorityClass::Design);
        assert_eq!(items[2].priority, PriorityClass::Verification);
    }

    #[test]
    fn test_gather_context_skips_run_artifacts() {
        let (dir, ws) = workspace();
        touch(dir.path(), "docs/spec.md", "spec");
        touch(dir.path(), "rundir/verdict.json", r#"{"success": true}"#);
        touch(dir.path(), "rundir/sim_build/results.xml", "<testsuites/>");
        touch(dir.path(), "rundir/agent.log", "log");

        let items = ws.gather_context();
        let paths: Vec<_> = items.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["docs/spec.md"]);
    }

    #[test]
    fn test_gather_context_empty_workspace() {
        let (_dir, ws) = workspace();
        assert!(ws.gather_context().is_empty());
    }

    #[test]
    fn test_target_prefers_empty_file() {
        let (dir, ws) = workspace();
        touch(dir.path(), "rtl/helper.sv", "module helper; endmodule");
        touch(dir.path(), "rtl/fifo.sv", "");
        assert_eq!(ws.find_target_file().unwrap(), dir.path().join("rtl/fifo.sv"));
    }

    #[test]
    fn test_target_creates_common_top_name() {
        let (dir, ws) = workspace();
        assert_eq!(ws.find_target_file().unwrap(), dir.path().join("rtl/top.sv"));
        assert!(dir.path().join("rtl").is_dir());

        touch(dir.path(), "rtl/top.sv", "module top; endmodule");
        assert_eq!(ws.find_target_file().unwrap(), dir.path().join("rtl/top.v"));
    }

    #[test]
    fn test_target_falls_back_to_existing_sv() {
        let (dir, ws) = workspace();
        for name in COMMON_TOP_NAMES {
            touch(dir.path(), &format!("rtl/{name}"), "module m; endmodule");
        }
        touch(dir.path(), "rtl/alu.sv", "module alu; endmodule");
        assert_eq!(ws.find_target_file().unwrap(), dir.path().join("rtl/alu.sv"));
    }

    #[test]
    fn test_write_code_creates_parents() {
        let (dir, ws) = workspace();
        let path = dir.path().join("rtl/deep/top.sv");
        ws.write_code(&path, "module top; endmodule\n").unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "module top; endmodule\n"
        );
    }
}
