//! Patch retrieval and external diff tool launch

use std::process::Stdio;

use crate::config::ToolSettings;
use crate::error::{GitMindError, Result};
use crate::models::CommitDiff;
use crate::services::cancellation::CancellationToken;
use crate::services::diff_parser::DiffParser;
use crate::services::git_service::GitRunner;
use crate::utils::create_command;

/// Patch of a single commit against its first parent
pub async fn commit_patch(
    runner: &GitRunner,
    commit_id: &str,
    token: &CancellationToken,
) -> Result<String> {
    let output = runner
        .run_checked(
            &["show", "--patch", "--find-renames", "--format=", commit_id],
            token,
        )
        .await?;
    Ok(output.stdout)
}

/// Patch between two revisions
pub async fn range_patch(
    runner: &GitRunner,
    from: &str,
    to: &str,
    token: &CancellationToken,
) -> Result<String> {
    let output = runner
        .run_checked(&["diff", "--find-renames", from, to], token)
        .await?;
    Ok(output.stdout)
}

/// Fetch a commit's patch and write its before/after files
pub async fn commit_diff(
    runner: &GitRunner,
    parser: &DiffParser,
    commit_id: &str,
    with_prefixes: bool,
    token: &CancellationToken,
) -> Result<CommitDiff> {
    let patch = commit_patch(runner, commit_id, token).await?;
    parser.parse(Some(commit_id), &patch, with_prefixes).await
}

/// Start the configured diff tool on a generated diff and return immediately
pub fn launch_diff_tool(tool: &ToolSettings, diff: &CommitDiff) -> Result<()> {
    if tool.path.trim().is_empty() {
        return Err(GitMindError::InvalidPath(
            "No diff tool configured".to_string(),
        ));
    }

    let args = tool.expand_arguments(&diff.left_path, &diff.right_path, None, None);
    tracing::info!("Launching diff tool: {} {}", tool.path, args.join(" "));

    let mut cmd = create_command(&tool.path);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    cmd.spawn().map_err(|e| {
        GitMindError::OperationFailed(format!("Failed to launch diff tool '{}': {}", tool.path, e))
    })?;
    Ok(())
}
