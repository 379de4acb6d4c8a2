use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directories under the workspace that are never written.
const FORBIDDEN_IN_WORKSPACE: &[&str] = &[".git", ".venv", "venv", "node_modules", "__pycache__"];

/// Directories under the home directory that are never written.
const FORBIDDEN_IN_HOME: &[&str] = &[".pyenv", ".local/lib", ".cargo/registry", ".rustup"];

/// Workspace safety checks to prevent editing files outside the target workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Absolute path to workspace root
    workspace_root: PathBuf,
    /// Canonical paths to forbidden directories
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Path has no existing ancestor: {0}")]
    NoAncestor(PathBuf),

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl WorkspaceGuard {
    /// Create a new workspace guard with the given root.
    ///
    /// The workspace root will be canonicalized to handle symlinks correctly.
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let workspace_root = workspace_root.as_ref().canonicalize()?;

        let mut forbidden_paths: Vec<PathBuf> = FORBIDDEN_IN_WORKSPACE
            .iter()
            .filter_map(|dir| workspace_root.join(dir).canonicalize().ok())
            .collect();

        // Interpreter and package installs outside the project
        if let Some(home) = home::home_dir() {
            forbidden_paths.extend(
                FORBIDDEN_IN_HOME
                    .iter()
                    .filter_map(|dir| home.join(dir).canonicalize().ok()),
            );
        }

        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    /// Check if an existing path is safe to edit.
    ///
    /// Returns the canonicalized absolute path if safe.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let canonical = self.absolute(path.as_ref()).canonicalize()?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    /// Check a path that does not exist yet.
    ///
    /// The deepest existing ancestor is canonicalized and the missing
    /// components are appended to it, so a symlinked parent cannot smuggle
    /// the new file out of the workspace.
    pub fn validate_new_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let absolute = self.absolute(path.as_ref());
        let mut existing = absolute.as_path();
        let mut missing = Vec::new();
        while !existing.exists() {
            let name = existing
                .file_name()
                .ok_or_else(|| SafetyError::NoAncestor(absolute.clone()))?;
            missing.push(name.to_os_string());
            existing = existing
                .parent()
                .ok_or_else(|| SafetyError::NoAncestor(absolute.clone()))?;
        }

        let mut canonical = existing.canonicalize()?;
        for name in missing.iter().rev() {
            canonical.push(name);
        }
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    /// Re-validate a previously-validated canonical path.
    ///
    /// Call this immediately before write to close the TOCTOU window.
    pub fn revalidate(&self, path: &Path) -> Result<PathBuf, SafetyError> {
        if path.exists() {
            self.validate_path(path)
        } else {
            self.validate_new_path(path)
        }
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if !canonical.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: canonical.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }

        for forbidden in &self.forbidden_paths {
            if canonical.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: canonical.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(())
    }

    /// Get the workspace root.
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Create a guard with custom forbidden paths (for testing).
    #[cfg(test)]
    pub fn with_forbidden(
        workspace_root: impl AsRef<Path>,
        forbidden: Vec<PathBuf>,
    ) -> Result<Self, SafetyError> {
        let workspace_root = workspace_root.as_ref().canonicalize()?;
        Ok(Self {
            workspace_root,
            forbidden_paths: forbidden,
        })
    }
}
