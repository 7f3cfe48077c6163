//! `run`, `status` and `sync`.

use std::io::Write;
use std::path::Path;

use anyhow::bail;
use mediabackup_catalog::{Catalog, ChunkPolicy, FileStatus, FileType};
use mediabackup_transfer::{Delivery, HttpTransport, RetryingClient, Sleeper, Transport};
use mediabackup_uploader::{RunReport, UploadEngine, UploadError, scan_directory, sync_manifest};

use crate::config::BackupRoot;
use crate::status::{StatusReport, progress_line, render_failed, render_status};

/// Scans, uploads and syncs the manifest.
pub async fn run(directory: &Path, endpoint: Option<&str>) -> anyhow::Result<()> {
    let root = open_root(directory, endpoint)?;
    let client = http_client(&root)?;
    run_backup(&root, &client).await?;
    Ok(())
}

/// Prints the status report without touching the network.
pub fn status(directory: &Path, endpoint: Option<&str>, json: bool) -> anyhow::Result<()> {
    let root = if json {
        BackupRoot::init(directory, endpoint)?
    } else {
        open_root(directory, endpoint)?
    };
    let catalog = root.open_catalog()?;
    let summary = catalog.summary()?;

    if json {
        let report = StatusReport::new(&root.config.backup_id, &summary);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Backup ID: {}", root.config.backup_id);
        print!("{}", render_status(&summary));
        print!("{}", render_failed(&catalog.records_with_status(FileStatus::Failed)?));
    }
    Ok(())
}

/// Pushes the manifest only.
pub async fn sync(directory: &Path, endpoint: Option<&str>) -> anyhow::Result<()> {
    let root = open_root(directory, endpoint)?;
    println!("Backup ID: {}\n", root.config.backup_id);

    let catalog = root.open_catalog()?;
    let client = http_client(&root)?;
    if !push_manifest(&client, &root.config.backup_id, &catalog).await {
        bail!("manifest sync failed");
    }
    Ok(())
}

fn open_root(directory: &Path, endpoint: Option<&str>) -> anyhow::Result<BackupRoot> {
    let root = BackupRoot::init(directory, endpoint)?;
    if root.created {
        println!("Initialized new backup in {}", root.state_dir().display());
    }
    Ok(root)
}

fn http_client(root: &BackupRoot) -> anyhow::Result<RetryingClient<HttpTransport>> {
    let transport = HttpTransport::new(&root.config.api_endpoint)?;
    Ok(RetryingClient::new(transport))
}

async fn run_backup<T: Transport, S: Sleeper>(
    root: &BackupRoot,
    client: &RetryingClient<T, S>,
) -> anyhow::Result<RunReport> {
    let backup_id = &root.config.backup_id;
    println!("Media Backup Tool");
    println!("Backup ID: {backup_id}\n");

    let mut catalog = root.open_catalog()?;
    let policy = root.chunk_policy(&catalog)?;
    push_manifest(client, backup_id, &catalog).await;

    print!("\nScanning... ");
    let _ = std::io::stdout().flush();
    let scan = scan_directory(&root.directory, &mut catalog, &policy)?;
    println!("found {} files", scan.total_added() + scan.skipped);
    for file_type in FileType::ALL {
        if let Some(&n) = scan.added.get(&file_type) {
            println!("  + {n} new {file_type}s");
        }
    }
    print!("{}", render_status(&catalog.summary()?));

    println!();
    let report = upload(root, client, &mut catalog, policy).await?;

    // Best effort even after a connection loss.
    println!();
    push_manifest(client, backup_id, &catalog).await;
    Ok(report)
}

async fn upload<T: Transport, S: Sleeper>(
    root: &BackupRoot,
    client: &RetryingClient<T, S>,
    catalog: &mut Catalog,
    policy: ChunkPolicy,
) -> anyhow::Result<RunReport> {
    if catalog.outstanding()? == 0 {
        println!("All files already uploaded.");
        return Ok(RunReport::default());
    }

    println!("Uploading (smallest first)...");
    let report = UploadEngine::new(
        catalog,
        client,
        &root.directory,
        &root.config.backup_id,
        policy,
    )
    .on_event(|event| println!("{}", progress_line(event)))
    .run()
    .await?;

    if report.halted {
        println!("Connection lost, stopping. Re-run to resume.");
    } else {
        println!("Done.");
    }
    Ok(report)
}

/// Reports the outcome on stdout; returns whether the remote accepted it.
async fn push_manifest<T: Transport, S: Sleeper>(
    client: &RetryingClient<T, S>,
    backup_id: &str,
    catalog: &Catalog,
) -> bool {
    print!("Syncing manifest to server... ");
    let _ = std::io::stdout().flush();

    match sync_manifest(client, backup_id, catalog).await {
        Ok(Delivery::Accepted { .. }) => {
            println!("done.");
            true
        }
        Ok(Delivery::Rejected { status }) => {
            println!("failed (status {status})");
            false
        }
        Err(UploadError::Transfer(e)) if e.is_connection() => {
            println!("failed (connection error)");
            false
        }
        Err(e) => {
            println!("failed ({e})");
            false
        }
    }
}
