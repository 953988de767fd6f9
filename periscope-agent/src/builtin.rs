//! Built-in workers
//!
//! Shipped so the agent binary is useful out of the box: an echo worker
//! that exercises the full transport, and two introspection workers that
//! read the stopped target's procfs state.

use serde_json::{json, Value as JsonValue};

use crate::worker::{Worker, WorkerContext, WorkerError};

/// Returns its parameter verbatim
pub struct EchoWorker;

impl Worker for EchoWorker {
    fn id(&self) -> &'static str {
        "diagnostics.echo"
    }

    fn run(&self, ctx: &WorkerContext<'_>) -> Result<JsonValue, WorkerError> {
        Ok(ctx.param().clone())
    }
}

/// Lists the target's memory regions from `/proc/<pid>/maps`
pub struct MemoryMapsWorker;

impl Worker for MemoryMapsWorker {
    fn id(&self) -> &'static str {
        "process.memory-maps"
    }

    fn run(&self, ctx: &WorkerContext<'_>) -> Result<JsonValue, WorkerError> {
        let raw = std::fs::read_to_string(format!("/proc/{}/maps", ctx.target_pid()))?;

        let mut regions = Vec::new();
        for line in raw.lines() {
            regions.push(parse_maps_line(line)?);
        }
        Ok(json!({ "regions": regions }))
    }
}

/// One `/proc/<pid>/maps` line: `start-end perms offset dev inode [path]`
fn parse_maps_line(line: &str) -> Result<JsonValue, WorkerError> {
    let mut fields = line.split_whitespace();

    let range = fields
        .next()
        .ok_or_else(|| WorkerError::Failed(format!("malformed maps line: {:?}", line)))?;
    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| WorkerError::Failed(format!("malformed address range: {:?}", range)))?;
    let perms = fields
        .next()
        .ok_or_else(|| WorkerError::Failed(format!("malformed maps line: {:?}", line)))?;

    // offset, dev, inode
    let path = fields.nth(3).map(str::to_string);

    Ok(json!({
        "start": format!("0x{}", start),
        "end": format!("0x{}", end),
        "perms": perms,
        "path": path,
    }))
}

/// Lists the target's threads from `/proc/<pid>/task`
pub struct ThreadsWorker;

impl Worker for ThreadsWorker {
    fn id(&self) -> &'static str {
        "process.threads"
    }

    fn run(&self, ctx: &WorkerContext<'_>) -> Result<JsonValue, WorkerError> {
        let pid = ctx.target_pid();
        let mut threads = Vec::new();

        for entry in std::fs::read_dir(format!("/proc/{}/task", pid))? {
            let entry = entry?;
            let tid = entry.file_name();
            let Some(tid) = tid.to_str().and_then(|t| t.parse::<u32>().ok()) else {
                continue;
            };

            // Threads can exit between the readdir and the status read.
            let Ok(status) = std::fs::read_to_string(entry.path().join("status")) else {
                continue;
            };
            let (name, state) = parse_status(&status);
            threads.push(json!({
                "tid": tid,
                "name": name,
                "state": state,
            }));
        }

        threads.sort_by_key(|t| t["tid"].as_u64());
        Ok(json!({ "threads": threads }))
    }
}

/// Pull `Name:` and `State:` out of a `/proc/.../status` blob
fn parse_status(status: &str) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut state = None;
    for line in status.lines() {
        if let Some(value) = line.strip_prefix("Name:") {
            name = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("State:") {
            state = Some(value.trim().to_string());
        }
        if name.is_some() && state.is_some() {
            break;
        }
    }
    (name, state)
}
