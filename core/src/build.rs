use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
};

use tokio::process::Command;

use crate::{config::BuildConfig, serdable::GlobPattern};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("No source files matching '{1}' found in '{}'", .0.to_string_lossy())]
    NoSources(PathBuf, GlobPattern),

    #[error(transparent)]
    Fs(#[from] fsutil::Error),

    #[error("Failed to spawn compiler '{}': {1}", .0.to_string_lossy())]
    Spawn(PathBuf, #[source] io::Error),

    #[error("Compilation failed: exitcode={0}")]
    Failed(i32),

    #[error("Compilation failed: compiler terminated by signal")]
    Killed,
}

/// `<compiler> <flags...> -o <output> <sources...>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    compiler: PathBuf,
    flags: Vec<String>,
}

impl BuildCommand {
    pub fn new(compiler: impl Into<PathBuf>, flags: Vec<String>) -> Self {
        Self {
            compiler: compiler.into(),
            flags,
        }
    }

    pub fn from_config(cfg: &BuildConfig) -> Self {
        Self::new(cfg.compiler.clone(), cfg.flags.clone())
    }

    pub fn get_compiler(&self) -> &Path {
        &self.compiler
    }

    pub fn find_sources(
        code_dir: impl AsRef<Path>,
        pattern: &GlobPattern,
    ) -> Result<Vec<PathBuf>, BuildError> {
        let sources = fsutil::find_files_matching(&code_dir, pattern)?;
        if sources.is_empty() {
            return Err(BuildError::NoSources(
                code_dir.as_ref().to_owned(),
                pattern.clone(),
            ));
        }
        Ok(sources)
    }

    pub fn command_line(&self, sources: &[PathBuf], output: &Path) -> String {
        let mut words = vec![self.compiler.to_string_lossy().into_owned()];
        words.extend(self.flags.iter().cloned());
        words.push("-o".to_owned());
        words.push(output.to_string_lossy().into_owned());
        words.extend(sources.iter().map(|s| s.to_string_lossy().into_owned()));
        words.join(" ")
    }

    /// Runs the compiler; its diagnostics go straight to our stderr.
    pub async fn compile(&self, sources: &[PathBuf], output: &Path) -> Result<(), BuildError> {
        log::info!("{}", self.command_line(sources, output));

        let status = Command::new(&self.compiler)
            .args(&self.flags)
            .arg("-o")
            .arg(output)
            .args(sources)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| BuildError::Spawn(self.compiler.clone(), e))?;

        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(BuildError::Failed(code)),
            None => Err(BuildError::Killed),
        }
    }
}
