// Process Tool
// Hosts a native compiler binary behind the tool seam: stages the
// unit's virtual filesystem into a scratch directory on disk, runs the
// binary there, and imports whatever it wrote back

use crate::error::{ServiceError, ServiceResult};
use crate::staging::{staged_path, WORKING_DIR};
use crate::tool::{Tool, ToolError, ToolIo};
use crate::vfs::VirtualFs;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

/// A [`Tool`] backed by a native executable.
///
/// Each invocation gets a fresh scratch directory that plays the role
/// of the unit's staging directory: staged files are materialized into
/// it, argument-vector paths under `/working` are rebased onto it, and
/// every regular file found there afterwards is imported back so the
/// output collector can probe it.
#[derive(Debug)]
pub struct ProcessTool {
    program: PathBuf,
}

impl ProcessTool {
    /// Wrap an explicit executable path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Locate `name` on the search path.
    pub fn resolve(name: &str) -> ServiceResult<Self> {
        let program =
            which::which(name).map_err(|_| ServiceError::ToolNotFound(name.to_string()))?;
        debug!(tool = name, path = %program.display(), "resolved tool binary");
        Ok(Self { program })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait::async_trait]
impl Tool for ProcessTool {
    async fn exec(
        &self,
        args: &[String],
        fs: &mut VirtualFs,
        io: &ToolIo,
    ) -> Result<(), ToolError> {
        let scratch = TempDir::new()
            .map_err(|e| ToolError::new(format!("failed to create scratch directory: {}", e)))?;

        materialize(fs, scratch.path())
            .await
            .map_err(|e| ToolError::new(format!("failed to materialize inputs: {}", e)))?;

        let args: Vec<String> = args.iter().map(|a| rebase_arg(a, scratch.path())).collect();

        let mut child = Command::new(&self.program)
            .args(&args)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ToolError::new(format!(
                    "failed to spawn '{}': {}",
                    self.program.display(),
                    e
                ))
            })?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");
        let stdout_handle = stream_lines(stdout, io.clone(), false);
        let stderr_handle = stream_lines(stderr, io.clone(), true);

        let status = child
            .wait()
            .await
            .map_err(|e| ToolError::new(format!("failed to wait for tool: {}", e)))?;
        let _ = stdout_handle.await;
        let _ = stderr_handle.await;

        import_outputs(fs, scratch.path())
            .await
            .map_err(|e| ToolError::new(format!("failed to import outputs: {}", e)))?;

        if status.success() {
            Ok(())
        } else {
            let mut err = ToolError::new(format!(
                "'{}' exited with {}",
                self.program.display(),
                status
            ));
            if let Some(code) = status.code() {
                err = err.with_errno(code);
            }
            Err(err)
        }
    }
}

/// Forward one output stream to the unit's log, line by line.
fn stream_lines<R>(reader: R, io: ToolIo, is_err: bool) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_err {
                io.print_err(line);
            } else {
                io.print(line);
            }
        }
    })
}

/// Rebase a `/working` path in the argument vector onto the scratch
/// directory.
fn rebase_arg(arg: &str, scratch: &Path) -> String {
    if arg == WORKING_DIR {
        scratch.display().to_string()
    } else if let Some(rest) = arg.strip_prefix("/working/") {
        scratch.join(rest).display().to_string()
    } else {
        arg.to_string()
    }
}

/// Write every staged file to disk under the scratch directory.
async fn materialize(fs: &VirtualFs, scratch: &Path) -> std::io::Result<()> {
    let entries = match fs.read_dir(WORKING_DIR) {
        Ok(entries) => entries,
        Err(_) => return Ok(()),
    };
    for entry in entries {
        if let Ok(bytes) = fs.read(&staged_path(&entry)) {
            tokio::fs::write(scratch.join(&entry), bytes).await?;
        }
    }
    Ok(())
}

/// Read every regular file in the scratch directory back into the
/// unit's filesystem, overwriting staged inputs with whatever the tool
/// rewrote in place.
async fn import_outputs(fs: &mut VirtualFs, scratch: &Path) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(scratch).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        let bytes = tokio::fs::read(entry.path()).await?;
        // Parent directory always exists after staging.
        let _ = fs.write(&staged_path(&name), bytes);
    }
    Ok(())
}
