//! Startup staging: copy the compiler and its support directories into
//! a scratch area so a rebuild of the tool cannot swap files out from
//! under running jobs. The area is removed when the server exits.

use anyhow::{ensure, Context, Result};
use runlib::ToolConfig;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug)]
pub struct Staging {
    _dir: TempDir,
    tool: ToolConfig,
    examples: PathBuf,
}

impl Staging {
    pub fn prepare(compiler: &Path, stdlib: &Path, examples: &Path) -> Result<Self> {
        ensure!(
            compiler.is_file(),
            "compiler binary not found: {}",
            compiler.display()
        );
        let dir = tempfile::Builder::new().prefix("icarus_").tempdir()?;
        let base = dir.path();

        let staged_binary = base.join("icarus");
        fs::copy(compiler, &staged_binary)
            .with_context(|| format!("copying {}", compiler.display()))?;
        fs::set_permissions(&staged_binary, fs::Permissions::from_mode(0o755))?;

        let staged_stdlib = base.join("stdlib");
        copy_dir(stdlib, &staged_stdlib)?;
        let staged_examples = base.join("examples");
        copy_dir(examples, &staged_examples)?;

        log::info!("staged compiler under {}", base.display());
        Ok(Self {
            tool: ToolConfig::new(staged_binary, staged_stdlib),
            examples: staged_examples,
            _dir: dir,
        })
    }

    pub fn tool_config(&self) -> ToolConfig {
        self.tool.clone()
    }

    pub fn examples_dir(&self) -> PathBuf {
        self.examples.clone()
    }
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from).with_context(|| format!("reading {}", from.display()))? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
