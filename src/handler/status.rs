//! `status`: process-level status report.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use sysinfo::{Pid, ProcessRefreshKind, System};
use tracing::{info, warn};

use super::CommandHandler;
use crate::message::{CommandResult, Message};

/// Handles `status` commands: uptime, memory and the caller's origin.
#[derive(Debug, Default)]
pub struct StatusCommandHandler;

impl StatusCommandHandler {
    pub const COMMAND: &'static str = "status";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandHandler for StatusCommandHandler {
    fn command(&self) -> &str {
        Self::COMMAND
    }

    fn description(&self) -> &str {
        "Get system status information"
    }

    async fn handle(&self, message: &Message) -> CommandResult {
        info!(source = message.source(), "status requested");

        let (uptime, memory) = match ProcessSnapshot::current() {
            Some(snapshot) => (
                json!(snapshot.run_time_secs),
                json!({ "rss": snapshot.rss_bytes, "virtual": snapshot.virtual_bytes }),
            ),
            None => {
                warn!("failed to read process stats");
                (Value::Null, Value::Null)
            }
        };

        CommandResult::ok(json!({
            "uptime": uptime,
            "memory": memory,
            "timestamp": Utc::now(),
            "source": message.source(),
            "messageType": message.kind(),
        }))
    }
}

/// Uptime and memory of this process.
struct ProcessSnapshot {
    /// Seconds since the process started.
    run_time_secs: u64,
    rss_bytes: u64,
    virtual_bytes: u64,
}

impl ProcessSnapshot {
    fn current() -> Option<Self> {
        let pid = Pid::from_u32(std::process::id());
        let mut sys = System::new();
        sys.refresh_process_specifics(pid, ProcessRefreshKind::new().with_memory());

        sys.process(pid).map(|process| Self {
            run_time_secs: process.run_time(),
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        })
    }
}
