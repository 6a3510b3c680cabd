use async_trait::async_trait;
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Side effect run after a checkpoint has been written. Failures are the
/// hook's own business; they never fail the save.
#[async_trait]
pub trait SaveHook: Send + Sync {
    async fn after_save(&self, path: &Path, message: &str);
}

struct SaveEvent {
    path: PathBuf,
    message: String,
}

/// Runs save hooks on a background task, one save at a time and in save
/// order, so the caller never waits on them between saves.
pub struct HookQueue {
    sender: Option<mpsc::UnboundedSender<SaveEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl HookQueue {
    pub fn start(hooks: Vec<Arc<dyn SaveHook>>) -> Self {
        if hooks.is_empty() {
            return HookQueue {
                sender: None,
                worker: None,
            };
        }

        let (sender, mut receiver) = mpsc::unbounded_channel::<SaveEvent>();
        let worker = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                for hook in &hooks {
                    hook.after_save(&event.path, &event.message).await;
                }
            }
        });

        HookQueue {
            sender: Some(sender),
            worker: Some(worker),
        }
    }

    pub fn notify(&self, path: &Path, message: &str) {
        let Some(sender) = &self.sender else {
            return;
        };
        let event = SaveEvent {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if sender.send(event).is_err() {
            warn!("Save hooks are no longer running; skipped {:?}", message);
        }
    }

    /// Waits until every queued save has been handed to the hooks.
    pub async fn finish(mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!("Save hook task failed: {}", e);
            }
        }
    }
}

/// Commits (and optionally pushes) the checkpoint file to the enclosing git
/// repository after every save.
#[derive(Debug, Clone)]
pub struct GitCommitHook {
    repo: PathBuf,
    push: bool,
}

impl GitCommitHook {
    pub fn new(repo: impl Into<PathBuf>, push: bool) -> Self {
        GitCommitHook {
            repo: repo.into(),
            push,
        }
    }

    async fn git(&self, args: &[&str]) -> std::io::Result<Output> {
        Command::new("git")
            .current_dir(&self.repo)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
    }
}

#[async_trait]
impl SaveHook for GitCommitHook {
    async fn after_save(&self, path: &Path, message: &str) {
        if !self.repo.join(".git").exists() {
            warn!("No .git directory in {:?}; skipping commit.", self.repo);
            return;
        }

        let path_arg = path.to_string_lossy();
        match self.git(&["add", path_arg.as_ref()]).await {
            Ok(out) if out.status.success() => {}
            Ok(out) => {
                error!("git add failed: {}", String::from_utf8_lossy(&out.stderr).trim());
                return;
            }
            Err(e) => {
                error!("Could not run git: {}", e);
                return;
            }
        }

        match self.git(&["commit", "-m", message]).await {
            Ok(out) if out.status.success() => info!("Committed: {}", message),
            Ok(_) => {
                info!("Nothing new to commit: {}", message);
                return;
            }
            Err(e) => {
                error!("git commit failed: {}", e);
                return;
            }
        }

        if self.push {
            match self.git(&["push"]).await {
                Ok(out) if out.status.success() => info!("Pushed: {}", message),
                Ok(out) => error!("git push failed: {}", String::from_utf8_lossy(&out.stderr).trim()),
                Err(e) => error!("git push failed: {}", e),
            }
        }
    }
}
