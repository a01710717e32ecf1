//! State swap engine
//!
//! Captures the target app's live state into named snapshots and restores them
//! over the live slot. All privileged file operations go through the channel.
//! A session holds the engine's single permit plus the lock file under the
//! storage root, so at most one operation on the device touches the live slot
//! at a time, whichever process it runs in.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

use crate::channel::{CommandOutcome, PrivilegedChannel};
use crate::extract::{friend_link, IdentityFields, IdentitySources};
use crate::swap::archive::{self, ArchiveError, BackupManifest};
use crate::swap::error::SwapError;
use crate::swap::layout::{Namespace, StorageLayout};
use crate::swap::lock::SlotLock;
use crate::swap::recorder::{NoopRecorder, ProfileRecorder};
use crate::swap::report::{
    CaptureOptions, CaptureReport, RestoreOptions, RestoreReport, TreeResult, TreeStatus,
};
use crate::swap::settle::{
    app_in_foreground, app_stopped, pause, wait_until, SettleOutcome, SettlePolicy,
};
use crate::swap::target::{TargetApp, TreeKind, TreeSpec};
use crate::util::shell::{is_numeric_id, is_valid_profile_name, quote, quote_path};

const EXISTS_TOKEN: &str = "exists";
const MISSING_TOKEN: &str = "missing";
const LOCK_POLL: Duration = Duration::from_millis(50);

/// What a second caller does while the live slot is held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exclusivity {
    /// Queue behind the running operation
    #[default]
    Wait,
    /// Fail immediately with [`SwapError::Busy`]
    Reject,
}

pub struct SwapEngine {
    channel: Arc<dyn PrivilegedChannel>,
    target: TargetApp,
    layout: StorageLayout,
    settle: SettlePolicy,
    exclusivity: Exclusivity,
    slot: Semaphore,
    recorder: Arc<dyn ProfileRecorder>,
}

impl SwapEngine {
    pub fn new(
        channel: Arc<dyn PrivilegedChannel>,
        target: TargetApp,
        layout: StorageLayout,
    ) -> Self {
        Self {
            channel,
            target,
            layout,
            settle: SettlePolicy::default(),
            exclusivity: Exclusivity::default(),
            slot: Semaphore::new(1),
            recorder: Arc::new(NoopRecorder),
        }
    }

    pub fn with_settle(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_exclusivity(mut self, exclusivity: Exclusivity) -> Self {
        self.exclusivity = exclusivity;
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn ProfileRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn channel(&self) -> &Arc<dyn PrivilegedChannel> {
        &self.channel
    }

    pub fn target(&self) -> &TargetApp {
        &self.target
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn settle_policy(&self) -> &SettlePolicy {
        &self.settle
    }

    /// Take the live slot for a series of operations
    pub async fn session(&self) -> Result<SwapSession<'_>, SwapError> {
        self.session_with_cancel(CancellationToken::new()).await
    }

    /// Take the live slot; waits inside the session stop early once `cancel` fires
    pub async fn session_with_cancel(
        &self,
        cancel: CancellationToken,
    ) -> Result<SwapSession<'_>, SwapError> {
        let permit = match self.exclusivity {
            Exclusivity::Wait => tokio::select! {
                _ = cancel.cancelled() => return Err(SwapError::Cancelled),
                permit = self.slot.acquire() => permit.map_err(|_| SwapError::Busy)?,
            },
            Exclusivity::Reject => self.slot.try_acquire().map_err(|_| SwapError::Busy)?,
        };
        let lock = self.lock_slot(&cancel).await?;
        Ok(SwapSession {
            engine: self,
            _permit: permit,
            _lock: lock,
            cancel,
        })
    }

    /// Take the lock file shared with other processes on this storage root
    async fn lock_slot(&self, cancel: &CancellationToken) -> Result<SlotLock, SwapError> {
        let path = self.layout.lock_path();
        let mut waiting = false;
        loop {
            if let Some(lock) = SlotLock::try_acquire(&path)? {
                return Ok(lock);
            }
            if self.exclusivity == Exclusivity::Reject {
                return Err(SwapError::Busy);
            }
            if !waiting {
                tracing::info!(path = %path.display(), "Live slot held by another process, waiting");
                waiting = true;
            }
            if !pause(LOCK_POLL, cancel).await {
                return Err(SwapError::Cancelled);
            }
        }
    }

    pub async fn capture(
        &self,
        namespace: Namespace,
        name: &str,
        options: CaptureOptions,
    ) -> Result<CaptureReport, SwapError> {
        ensure_valid_name(name)?;
        self.session().await?.capture(namespace, name, options).await
    }

    pub async fn restore(
        &self,
        namespace: Namespace,
        name: &str,
        options: RestoreOptions,
    ) -> Result<RestoreReport, SwapError> {
        ensure_valid_name(name)?;
        self.session().await?.restore(namespace, name, options).await
    }

    pub async fn stop_app(&self) -> Result<SettleOutcome, SwapError> {
        self.session().await?.stop_app().await
    }

    pub async fn launch_app(&self) -> Result<SettleOutcome, SwapError> {
        self.session().await?.launch_app().await
    }

    pub async fn open_friend_link(&self, user_id: &str) -> Result<SettleOutcome, SwapError> {
        self.session().await?.open_friend_link(user_id).await
    }

    /// Read identity fields from the live preference files
    pub async fn read_identity(&self) -> Result<IdentityFields, SwapError> {
        self.session().await?.read_identity().await
    }

    /// Profiles stored in a namespace
    pub fn list_profiles(&self, namespace: Namespace) -> Result<Vec<String>, SwapError> {
        Ok(self.layout.list_profiles(namespace)?)
    }
}

fn ensure_valid_name(name: &str) -> Result<(), SwapError> {
    if is_valid_profile_name(name) {
        Ok(())
    } else {
        Err(SwapError::InvalidProfileName(name.to_string()))
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Sibling path a file is written to before it replaces `path`
fn pending(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".pending");
    PathBuf::from(name)
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "Failed to remove pending file"),
    }
}

fn first_detail(outcomes: &[&CommandOutcome]) -> String {
    outcomes
        .iter()
        .map(|o| o.stderr_text())
        .find(|text| !text.trim().is_empty())
        .unwrap_or_else(|| "destination not present after copy".to_string())
}

struct StagedCapture {
    bytes: Vec<u8>,
    identity: IdentityFields,
    trees: Vec<TreeResult>,
}

/// Exclusive hold on the live slot
pub struct SwapSession<'a> {
    engine: &'a SwapEngine,
    _permit: SemaphorePermit<'a>,
    _lock: SlotLock,
    cancel: CancellationToken,
}

impl<'a> SwapSession<'a> {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    async fn run(&self, command: String) -> Result<CommandOutcome, SwapError> {
        Ok(self.engine.channel.execute(&command).await?)
    }

    async fn exists(&self, path: &Path, kind: TreeKind) -> Result<bool, SwapError> {
        let check = self
            .run(format!(
                "[ {} {} ] && echo {} || echo {}",
                kind.test_flag(),
                quote_path(path),
                EXISTS_TOKEN,
                MISSING_TOKEN
            ))
            .await?;
        if check.has_line(EXISTS_TOKEN) {
            return Ok(true);
        }
        if check.has_line(MISSING_TOKEN) {
            return Ok(false);
        }

        tracing::debug!(path = %path.display(), "Existence test ambiguous, listing instead");
        let listing = self.run(format!("ls -d {}", quote_path(path))).await?;
        Ok(listing.is_success() && listing.stdout.iter().any(|l| !l.trim().is_empty()))
    }

    async fn read_file(&self, path: &Path) -> Result<String, SwapError> {
        let outcome = self.run(format!("cat {}", quote_path(path))).await?;
        Ok(if outcome.is_success() {
            outcome.stdout_text()
        } else {
            String::new()
        })
    }

    /// Force-stop the app and wait until its process is gone
    pub async fn stop_app(&self) -> Result<SettleOutcome, SwapError> {
        let target = &self.engine.target;
        let outcome = self.run(target.stop_command()).await?;
        if !outcome.is_success() {
            tracing::warn!(
                package = %target.package,
                stderr = %outcome.stderr_text(),
                "Stop command reported failure"
            );
        }
        let probe = target.running_probe();
        let settle = wait_until(
            self.engine.channel.as_ref(),
            probe.as_deref(),
            app_stopped,
            &self.engine.settle.stop,
            &self.cancel,
        )
        .await;
        if let SettleOutcome::TimedOut { polls } = settle {
            tracing::warn!(polls, "App still running after stop, waiting the fallback delay");
            if !pause(self.engine.settle.stop.fallback, &self.cancel).await {
                return Ok(SettleOutcome::Cancelled);
            }
        }
        tracing::debug!(?settle, "App stop settled");
        Ok(settle)
    }

    /// Launch the app and wait until it reaches the foreground
    pub async fn launch_app(&self) -> Result<SettleOutcome, SwapError> {
        let target = &self.engine.target;
        let outcome = self.run(target.launch_command()).await?;
        if !outcome.is_success() {
            return Err(SwapError::CommandFailed {
                step: "launch",
                detail: outcome.stderr_text(),
            });
        }
        let probe = target.foreground_probe();
        let settle = wait_until(
            self.engine.channel.as_ref(),
            probe.as_deref(),
            app_in_foreground(&target.package),
            &self.engine.settle.launch,
            &self.cancel,
        )
        .await;
        tracing::debug!(?settle, "App launch settled");
        Ok(settle)
    }

    /// Fire the add-friend deep link for `user_id`, then wait the signal settle
    pub async fn open_friend_link(&self, user_id: &str) -> Result<SettleOutcome, SwapError> {
        if !is_numeric_id(user_id) {
            return Err(SwapError::InvalidUserId(user_id.to_string()));
        }
        let target = &self.engine.target;
        let uri = friend_link(&target.link_scheme, user_id);
        let outcome = self.run(target.view_command(&uri)).await?;
        if !outcome.is_success() {
            return Err(SwapError::CommandFailed {
                step: "open friend link",
                detail: outcome.stderr_text(),
            });
        }
        tracing::info!(%uri, "Friend link opened");
        if pause(self.engine.settle.signal, &self.cancel).await {
            Ok(SettleOutcome::FixedDelay)
        } else {
            Ok(SettleOutcome::Cancelled)
        }
    }

    pub async fn read_identity(&self) -> Result<IdentityFields, SwapError> {
        let target = &self.engine.target;
        let mut sources = IdentitySources {
            player_prefs: self.read_file(&target.resolve(&target.player_prefs)).await?,
            install_file: self
                .read_file(&target.resolve(&target.install_id_file))
                .await?,
            system_ssaid: self
                .read_file(&target.resolve(&target.system_ssaid_file))
                .await?,
            other_prefs: Vec::new(),
        };
        let fields = IdentityFields::from_sources(&sources, &target.package);
        if fields.ssaid.is_some() {
            return Ok(fields);
        }

        sources.other_prefs = self.read_other_prefs().await?;
        Ok(IdentityFields::from_sources(&sources, &target.package))
    }

    /// Contents of every preference file beside the player prefs
    async fn read_other_prefs(&self) -> Result<Vec<String>, SwapError> {
        let target = &self.engine.target;
        let player_prefs = target.resolve(&target.player_prefs);
        let Some(prefs_dir) = player_prefs.parent() else {
            return Ok(Vec::new());
        };
        let listing = self
            .run(format!(
                "find {} -name '*.xml' -type f 2>/dev/null",
                quote_path(prefs_dir)
            ))
            .await?;

        let mut contents = Vec::new();
        for line in listing.stdout.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
            let path = Path::new(line);
            if path == player_prefs {
                continue;
            }
            contents.push(self.read_file(path).await?);
        }
        Ok(contents)
    }

    async fn locate_live_file(&self) -> Result<PathBuf, SwapError> {
        let target = &self.engine.target;
        let primary = target.primary_path();
        if self.exists(&primary, TreeKind::File).await? {
            return Ok(primary);
        }
        for alt in &target.alternative_files {
            let alt = target.resolve(alt);
            if self.exists(&alt, TreeKind::File).await? {
                tracing::info!(path = %alt.display(), "Using alternative live path");
                return Ok(alt);
            }
        }

        let search = self
            .run(format!(
                "find {} -name {} -type f 2>/dev/null | head -n 1",
                quote_path(&target.data_dir),
                quote(&target.primary_file_name())
            ))
            .await?;
        if let Some(found) = search
            .stdout
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
        {
            let found = PathBuf::from(found);
            if self.exists(&found, TreeKind::File).await? {
                tracing::info!(path = %found.display(), "Found live file by search");
                return Ok(found);
            }
        }
        Err(SwapError::LiveStateMissing(target.data_dir.clone()))
    }

    /// Redirect copy, verified, with one `cp` fallback. Returns whether the fallback ran.
    async fn copy_primary(&self, from: &Path, to: &Path) -> Result<bool, SwapError> {
        let redirect = self
            .run(format!("cat {} > {}", quote_path(from), quote_path(to)))
            .await?;
        if redirect.is_success() && self.exists(to, TreeKind::File).await? {
            return Ok(false);
        }

        tracing::warn!(
            from = %from.display(),
            to = %to.display(),
            "Redirect copy not verified, retrying with cp"
        );
        let copy = self
            .run(format!("cp {} {}", quote_path(from), quote_path(to)))
            .await?;
        if copy.is_success() && self.exists(to, TreeKind::File).await? {
            return Ok(true);
        }
        Err(SwapError::CopyFailed {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            detail: first_detail(&[&copy, &redirect]),
        })
    }

    async fn fix_permissions(
        &self,
        path: &Path,
        mode: &str,
        recursive: bool,
    ) -> Result<(), SwapError> {
        let target = &self.engine.target;
        let chown = if recursive { "chown -R" } else { "chown" };
        let outcome = self
            .run(format!(
                "{} {} {} && chmod {} {}",
                chown,
                target.owner_expr(),
                quote_path(path),
                quote(mode),
                quote_path(path)
            ))
            .await?;
        if outcome.is_success() {
            Ok(())
        } else {
            Err(SwapError::PermissionFix {
                path: path.to_path_buf(),
                detail: outcome.stderr_text(),
            })
        }
    }

    async fn prepare_staging(&self, dir: &Path) -> Result<(), SwapError> {
        let q = quote_path(dir);
        let outcome = self
            .run(format!("rm -rf {q} && mkdir -p {q} && chmod 777 {q}"))
            .await?;
        if outcome.is_success() && self.exists(dir, TreeKind::Dir).await? {
            Ok(())
        } else {
            Err(SwapError::Staging {
                path: dir.to_path_buf(),
                detail: outcome.stderr_text(),
            })
        }
    }

    async fn cleanup_staging(&self, dir: &Path) {
        match self.run(format!("rm -rf {}", quote_path(dir))).await {
            Ok(outcome) if outcome.is_success() => {}
            Ok(outcome) => tracing::warn!(
                path = %dir.display(),
                stderr = %outcome.stderr_text(),
                "Failed to clean staging directory"
            ),
            Err(err) => tracing::warn!(
                path = %dir.display(),
                error = %err,
                "Failed to clean staging directory"
            ),
        }
    }

    /// Copy the live state into storage under `namespace/name`
    pub async fn capture(
        &self,
        namespace: Namespace,
        name: &str,
        options: CaptureOptions,
    ) -> Result<CaptureReport, SwapError> {
        ensure_valid_name(name)?;
        let engine = self.engine;
        tracing::info!(
            %namespace,
            profile = %name,
            extended = options.extended,
            "Capturing profile"
        );

        let stop_settle = self.stop_app().await?;
        if stop_settle.is_cancelled() {
            return Err(SwapError::Cancelled);
        }

        tokio::fs::create_dir_all(engine.layout.profile_dir(namespace, name)).await?;
        let source = self.locate_live_file().await?;
        let snapshot_path = engine.layout.primary_snapshot(namespace, name);
        let archive_path = engine.layout.archive_path(namespace, name);
        let staged_snapshot = pending(&snapshot_path);
        let staged_archive = pending(&archive_path);

        let staged = match self
            .stage_capture(name, &source, &staged_snapshot, &staged_archive, options)
            .await
        {
            Ok(staged) => staged,
            Err(err) => {
                discard(&staged_snapshot).await;
                discard(&staged_archive).await;
                return Err(err);
            }
        };

        // The stored snapshot only changes once every part is staged
        let archive_path = if options.extended {
            tokio::fs::rename(&staged_archive, &archive_path).await?;
            Some(archive_path)
        } else {
            if tokio::fs::try_exists(&archive_path).await? {
                tracing::info!(path = %archive_path.display(), "Removing stale archive");
                tokio::fs::remove_file(&archive_path).await?;
            }
            None
        };
        tokio::fs::rename(&staged_snapshot, &snapshot_path).await?;

        let (launch_settle, relaunch_error) = if options.relaunch {
            match self.launch_app().await {
                Ok(settle) => (Some(settle), None),
                Err(err) => {
                    tracing::warn!(profile = %name, error = %err, "Relaunch after capture failed");
                    (None, Some(err.to_string()))
                }
            }
        } else {
            (None, None)
        };

        let report = CaptureReport {
            namespace,
            name: name.to_string(),
            source,
            snapshot_path,
            digest: hex_digest(&staged.bytes),
            size_bytes: staged.bytes.len() as u64,
            archive_path,
            trees: staged.trees,
            identity: staged.identity,
            stop_settle,
            launch_settle,
            relaunch_error,
            captured_at: Utc::now(),
        };
        engine
            .recorder
            .record_capture(&report)
            .map_err(|e| SwapError::Recorder(e.to_string()))?;

        tracing::info!(
            %namespace,
            profile = %name,
            digest = %report.digest,
            user_id = ?report.identity.user_id,
            "Profile captured"
        );
        Ok(report)
    }

    /// Copy the primary file and pack the trees into their pending paths
    async fn stage_capture(
        &self,
        name: &str,
        source: &Path,
        staged_snapshot: &Path,
        staged_archive: &Path,
        options: CaptureOptions,
    ) -> Result<StagedCapture, SwapError> {
        let copy = self
            .run(format!(
                "cp {} {} && chmod 644 {}",
                quote_path(source),
                quote_path(staged_snapshot),
                quote_path(staged_snapshot)
            ))
            .await?;
        if !copy.is_success() || !self.exists(staged_snapshot, TreeKind::File).await? {
            return Err(SwapError::CopyFailed {
                from: source.to_path_buf(),
                to: staged_snapshot.to_path_buf(),
                detail: first_detail(&[&copy]),
            });
        }

        let bytes = tokio::fs::read(staged_snapshot).await?;
        let identity = self.read_identity().await?;
        if !identity.has_user_id() {
            tracing::warn!(profile = %name, "No user id found in captured preferences");
        }

        let trees = if options.extended {
            self.capture_trees(name, staged_archive, options, &identity)
                .await?
        } else {
            Vec::new()
        };
        Ok(StagedCapture {
            bytes,
            identity,
            trees,
        })
    }

    async fn capture_trees(
        &self,
        name: &str,
        archive_path: &Path,
        options: CaptureOptions,
        identity: &IdentityFields,
    ) -> Result<Vec<TreeResult>, SwapError> {
        let staging = self.engine.layout.staging_dir(name, "backup");
        self.prepare_staging(&staging).await?;
        let result = self
            .fill_and_pack(name, &staging, archive_path, options, identity)
            .await;
        self.cleanup_staging(&staging).await;
        result
    }

    async fn fill_and_pack(
        &self,
        name: &str,
        staging: &Path,
        archive_path: &Path,
        options: CaptureOptions,
        identity: &IdentityFields,
    ) -> Result<Vec<TreeResult>, SwapError> {
        let target = &self.engine.target;
        let mut trees = Vec::new();
        for tree in target
            .trees
            .iter()
            .filter(|t| options.include_opt_in || !t.opt_in)
        {
            let status = self.copy_tree_out(tree, &staging.join(&tree.name)).await;
            if let TreeStatus::Failed(detail) = &status {
                tracing::warn!(tree = %tree.name, %detail, "Tree capture failed");
            }
            trees.push(TreeResult::new(&tree.name, status));
        }

        let readable = self
            .run(format!("chmod -R 777 {}", quote_path(staging)))
            .await?;
        if !readable.is_success() {
            tracing::warn!(stderr = %readable.stderr_text(), "Could not open up staging permissions");
        }

        let manifest = BackupManifest {
            profile: name.to_string(),
            package: target.package.clone(),
            created_at: Utc::now(),
            user_id: identity.user_id.clone(),
            entries: trees
                .iter()
                .filter(|t| t.status == TreeStatus::Copied)
                .map(|t| t.name.clone())
                .collect(),
        };
        let staging_dir = staging.to_path_buf();
        let dest = archive_path.to_path_buf();
        let files = tokio::task::spawn_blocking(move || -> Result<usize, ArchiveError> {
            manifest.write_to(&staging_dir)?;
            archive::pack_dir(&staging_dir, &dest)
        })
        .await
        .map_err(|e| SwapError::Staging {
            path: staging.to_path_buf(),
            detail: e.to_string(),
        })??;
        tracing::debug!(files, archive = %archive_path.display(), "Trees archived");
        Ok(trees)
    }

    async fn copy_tree_out(&self, tree: &TreeSpec, dest: &Path) -> TreeStatus {
        let live = self.engine.target.resolve(&tree.path);
        match self.exists(&live, tree.kind).await {
            Ok(false) => return TreeStatus::Absent,
            Err(err) => return TreeStatus::Failed(err.to_string()),
            Ok(true) => {}
        }
        let flag = match tree.kind {
            TreeKind::File => "",
            TreeKind::Dir => " -r",
        };
        match self
            .run(format!("cp{} {} {}", flag, quote_path(&live), quote_path(dest)))
            .await
        {
            Ok(outcome) if outcome.is_success() => TreeStatus::Copied,
            Ok(outcome) => TreeStatus::Failed(outcome.stderr_text()),
            Err(err) => TreeStatus::Failed(err.to_string()),
        }
    }

    /// Copy the stored snapshot `namespace/name` over the live slot
    pub async fn restore(
        &self,
        namespace: Namespace,
        name: &str,
        options: RestoreOptions,
    ) -> Result<RestoreReport, SwapError> {
        ensure_valid_name(name)?;
        let engine = self.engine;
        let target = &engine.target;

        let snapshot_path = engine.layout.primary_snapshot(namespace, name);
        if !tokio::fs::try_exists(&snapshot_path).await? {
            return Err(SwapError::SnapshotMissing {
                namespace,
                name: name.to_string(),
            });
        }
        let archive_path = engine.layout.archive_path(namespace, name);
        let with_trees = options.trees && tokio::fs::try_exists(&archive_path).await?;
        tracing::info!(%namespace, profile = %name, with_trees, "Restoring profile");

        let stop_settle = self.stop_app().await?;
        if stop_settle.is_cancelled() {
            return Err(SwapError::Cancelled);
        }

        // Trees first: an archived directory may hold a copy of the primary file
        let trees = if with_trees {
            self.restore_trees(name, &archive_path).await?
        } else {
            Vec::new()
        };

        let live = target.primary_path();
        let used_fallback_copy = self.copy_primary(&snapshot_path, &live).await?;
        self.fix_permissions(&live, &target.file_mode, false).await?;

        let launch_settle = if options.relaunch {
            Some(self.launch_app().await?)
        } else {
            None
        };

        let report = RestoreReport {
            namespace,
            name: name.to_string(),
            snapshot_path,
            used_fallback_copy,
            trees,
            stop_settle,
            launch_settle,
            restored_at: Utc::now(),
        };
        if let Err(err) = engine.recorder.record_restore(&report) {
            tracing::warn!(profile = %name, error = %err, "Failed to record restore");
        }
        tracing::info!(%namespace, profile = %name, used_fallback_copy, "Profile restored");
        Ok(report)
    }

    async fn restore_trees(
        &self,
        name: &str,
        archive_path: &Path,
    ) -> Result<Vec<TreeResult>, SwapError> {
        let staging = self.engine.layout.staging_dir(name, "restore");
        self.prepare_staging(&staging).await?;
        let result = self.unpack_and_copy_back(&staging, archive_path).await;
        self.cleanup_staging(&staging).await;
        result
    }

    async fn unpack_and_copy_back(
        &self,
        staging: &Path,
        archive_path: &Path,
    ) -> Result<Vec<TreeResult>, SwapError> {
        let src = archive_path.to_path_buf();
        let dest = staging.to_path_buf();
        tokio::task::spawn_blocking(move || archive::unpack(&src, &dest))
            .await
            .map_err(|e| SwapError::Staging {
                path: staging.to_path_buf(),
                detail: e.to_string(),
            })??;

        let mut results = Vec::new();
        for tree in &self.engine.target.trees {
            if !tree.restore {
                results.push(TreeResult::new(&tree.name, TreeStatus::Skipped));
                continue;
            }
            let unpacked = staging.join(&tree.name);
            if !tokio::fs::try_exists(&unpacked).await.unwrap_or(false) {
                results.push(TreeResult::new(&tree.name, TreeStatus::Absent));
                continue;
            }
            let status = self.copy_tree_back(tree, &unpacked).await;
            if let TreeStatus::Failed(detail) = &status {
                tracing::warn!(tree = %tree.name, %detail, "Tree restore failed");
            }
            results.push(TreeResult::new(&tree.name, status));
        }
        Ok(results)
    }

    async fn copy_tree_back(&self, tree: &TreeSpec, unpacked: &Path) -> TreeStatus {
        let target = &self.engine.target;
        let live = target.resolve(&tree.path);
        let command = match tree.kind {
            TreeKind::File => format!("cp {} {}", quote_path(unpacked), quote_path(&live)),
            TreeKind::Dir => {
                if live == target.data_dir || live.parent().is_none() {
                    return TreeStatus::Failed(format!("refusing to replace {}", live.display()));
                }
                // Replace, never merge: leftovers would mix two profiles' state
                format!(
                    "rm -rf {live} && mkdir -p {live} && cp -r {} {live}",
                    quote_path(&unpacked.join(".")),
                    live = quote_path(&live)
                )
            }
        };
        match self.run(command).await {
            Ok(outcome) if outcome.is_success() => {}
            Ok(outcome) => return TreeStatus::Failed(outcome.stderr_text()),
            Err(err) => return TreeStatus::Failed(err.to_string()),
        }
        match self.exists(&live, tree.kind).await {
            Ok(true) => {}
            Ok(false) => return TreeStatus::Failed("not present after copy".to_string()),
            Err(err) => return TreeStatus::Failed(err.to_string()),
        }

        let (mode, recursive) = match tree.kind {
            TreeKind::File => (&target.file_mode, false),
            TreeKind::Dir => (&target.dir_mode, true),
        };
        match self.fix_permissions(&live, mode, recursive).await {
            Ok(()) => TreeStatus::Copied,
            Err(err) => TreeStatus::Failed(err.to_string()),
        }
    }
}
